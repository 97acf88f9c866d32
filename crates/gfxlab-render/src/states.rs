//! Mutable state shared between the pipeline and its state callbacks.

use std::collections::HashMap;

use crate::callbacks::CallbackError;
use crate::device::{RenderDevice, UniformValue};
use crate::handles::{BufferHandle, ProgramHandle, UniformLocation};

/// Uniform locations a callback has looked up for one program.
///
/// A cached `None` means the program has no such active uniform; writes to it
/// are dropped, the way the driver ignores location -1.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramRenderStates {
    pub uniform_locations: HashMap<String, Option<UniformLocation>>,
}

impl ProgramRenderStates {
    /// Look `name` up on `program` and remember the result.
    pub fn cache_location(
        &mut self,
        device: &mut dyn RenderDevice,
        program: ProgramHandle,
        name: &str,
    ) -> Option<UniformLocation> {
        if let Some(cached) = self.uniform_locations.get(name) {
            return *cached;
        }
        let location = device.uniform_location(program, name);
        if location.is_none() {
            log::debug!("program {program:?} has no active uniform '{name}'");
        }
        self.uniform_locations.insert(name.to_string(), location);
        location
    }

    pub fn location(&self, name: &str) -> Option<UniformLocation> {
        self.uniform_locations.get(name).copied().flatten()
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.uniform_locations.contains_key(name)
    }

    /// Write a cached uniform on the bound program.
    ///
    /// Fails if `name` was never cached.
    pub fn set(
        &self,
        device: &mut dyn RenderDevice,
        name: &str,
        value: UniformValue,
    ) -> Result<(), CallbackError> {
        match self.uniform_locations.get(name) {
            Some(Some(location)) => {
                device.set_uniform(*location, value);
                Ok(())
            }
            Some(None) => Ok(()),
            None => Err(CallbackError::MissingUniform {
                name: name.to_string(),
            }),
        }
    }
}

/// Program registry, uniform buffers and per-program uniform caches.
///
/// One per pipeline; lives as long as the pipeline does.
#[derive(Debug, Default)]
pub struct RenderStates {
    programs: HashMap<String, ProgramHandle>,
    program_names: HashMap<ProgramHandle, String>,
    /// Uniform buffers created by callbacks. Released with the pipeline.
    pub uniform_buffers: Vec<BufferHandle>,
    pub program_states: HashMap<ProgramHandle, ProgramRenderStates>,
}

impl RenderStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `program` under `name` in both directions.
    pub fn add_shader_program(&mut self, name: &str, program: ProgramHandle) {
        if let Some(previous) = self.programs.insert(name.to_string(), program)
            && previous != program
        {
            log::warn!("program '{name}' re-registered: {previous:?} -> {program:?}");
            self.program_names.remove(&previous);
        }
        self.program_names.insert(program, name.to_string());
    }

    pub fn program(&self, name: &str) -> Option<ProgramHandle> {
        self.programs.get(name).copied()
    }

    pub fn program_name(&self, program: ProgramHandle) -> Option<&str> {
        self.program_names.get(&program).map(String::as_str)
    }

    /// Registered programs in no particular order.
    pub fn programs(&self) -> impl Iterator<Item = (&str, ProgramHandle)> {
        self.programs.iter().map(|(name, p)| (name.as_str(), *p))
    }

    /// Cache for `program`, created empty on first access.
    pub fn program_states_mut(&mut self, program: ProgramHandle) -> &mut ProgramRenderStates {
        self.program_states.entry(program).or_default()
    }

    pub fn program_states(&self, program: ProgramHandle) -> Option<&ProgramRenderStates> {
        self.program_states.get(&program)
    }

    /// Move a program's cache out so it can be mutated next to a shared
    /// borrow of `self`. Pair with [`restore_program_states`](Self::restore_program_states).
    pub(crate) fn take_program_states(&mut self, program: ProgramHandle) -> ProgramRenderStates {
        self.program_states.remove(&program).unwrap_or_default()
    }

    pub(crate) fn restore_program_states(
        &mut self,
        program: ProgramHandle,
        states: ProgramRenderStates,
    ) {
        self.program_states.insert(program, states);
    }

    /// Uniform buffer number `index`, in creation order.
    pub fn uniform_buffer(&self, index: usize) -> Result<BufferHandle, CallbackError> {
        self.uniform_buffers
            .get(index)
            .copied()
            .ok_or(CallbackError::MissingUniformBuffer { index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{GpuCommand, HeadlessDevice};

    #[test]
    fn test_program_registry_is_bidirectional() {
        let mut states = RenderStates::new();
        states.add_shader_program("lighting", ProgramHandle(4));
        states.add_shader_program("display", ProgramHandle(5));
        assert_eq!(states.program("lighting"), Some(ProgramHandle(4)));
        assert_eq!(states.program_name(ProgramHandle(5)), Some("display"));
        assert_eq!(states.program("missing"), None);
        assert_eq!(states.programs().count(), 2);
    }

    #[test]
    fn test_reregistering_drops_stale_reverse_entry() {
        let mut states = RenderStates::new();
        states.add_shader_program("lighting", ProgramHandle(4));
        states.add_shader_program("lighting", ProgramHandle(9));
        assert_eq!(states.program("lighting"), Some(ProgramHandle(9)));
        assert_eq!(states.program_name(ProgramHandle(4)), None);
        assert_eq!(states.program_name(ProgramHandle(9)), Some("lighting"));
    }

    #[test]
    fn test_cache_location_queries_once() {
        let mut device = HeadlessDevice::new();
        let mut prog = ProgramRenderStates::default();
        let first = prog.cache_location(&mut device, ProgramHandle(1), "model");
        let second = prog.cache_location(&mut device, ProgramHandle(1), "model");
        assert!(first.is_some());
        assert_eq!(first, second);
        assert_eq!(prog.location("model"), first);
    }

    #[test]
    fn test_set_uncached_uniform_fails() {
        let mut device = HeadlessDevice::new();
        let prog = ProgramRenderStates::default();
        let err = prog
            .set(&mut device, "model", UniformValue::Float(1.0))
            .unwrap_err();
        assert!(matches!(err, CallbackError::MissingUniform { name } if name == "model"));
    }

    #[test]
    fn test_set_inactive_uniform_is_dropped() {
        let mut device = HeadlessDevice::new();
        device.hide_uniform("useTexture");
        let mut prog = ProgramRenderStates::default();
        assert_eq!(
            prog.cache_location(&mut device, ProgramHandle(1), "useTexture"),
            None
        );
        assert!(prog.is_cached("useTexture"));
        prog.set(&mut device, "useTexture", UniformValue::Int(1))
            .unwrap();
        assert_eq!(
            device.count(|c| matches!(c, GpuCommand::SetUniform { .. })),
            0
        );
    }

    #[test]
    fn test_take_and_restore_program_states() {
        let mut states = RenderStates::new();
        states
            .program_states_mut(ProgramHandle(2))
            .uniform_locations
            .insert("view".into(), Some(UniformLocation(0)));

        let taken = states.take_program_states(ProgramHandle(2));
        assert!(states.program_states(ProgramHandle(2)).is_none());
        states.restore_program_states(ProgramHandle(2), taken);
        assert!(
            states
                .program_states(ProgramHandle(2))
                .is_some_and(|p| p.is_cached("view"))
        );
    }

    #[test]
    fn test_missing_uniform_buffer() {
        let states = RenderStates::new();
        assert!(matches!(
            states.uniform_buffer(0),
            Err(CallbackError::MissingUniformBuffer { index: 0 })
        ));
    }
}
