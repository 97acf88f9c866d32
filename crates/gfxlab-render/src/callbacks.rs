//! State callbacks: user logic that feeds uniforms at four granularities.
//!
//! | kind     | runs                                     |
//! |----------|------------------------------------------|
//! | global   | once, before the first frame             |
//! | frame    | once per frame, before any pass          |
//! | program  | once per draw group, program bound       |
//! | geometry | once per geometry, right before its draw |
//!
//! Each kind holds an ordered list. Callbacks usually come from a
//! [`CallbackLibrary`], a named table of plain functions bound by symbol name
//! from the configuration.

use std::collections::HashMap;
use std::fmt;

use gfxlab_config::CallbackConfig;

use crate::device::RenderDevice;
use crate::handles::ProgramHandle;
use crate::scene::{Geometry, Scene};
use crate::states::{ProgramRenderStates, RenderStates};

/// Failure reported by a state callback. Aborts the frame.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("no shader program registered as '{name}'")]
    MissingProgram { name: String },

    #[error("uniform '{name}' was never looked up for this program")]
    MissingUniform { name: String },

    #[error("no uniform buffer at index {index}")]
    MissingUniformBuffer { index: usize },

    #[error("scene has no camera")]
    MissingCamera,

    #[error("{0}")]
    Custom(String),
}

pub type GlobalStateFn =
    fn(&Scene, &mut RenderStates, &mut dyn RenderDevice) -> Result<(), CallbackError>;
pub type FrameStateFn =
    fn(&Scene, &mut RenderStates, &mut dyn RenderDevice) -> Result<(), CallbackError>;
pub type ProgramStateFn = fn(
    &Scene,
    ProgramHandle,
    &RenderStates,
    &mut ProgramRenderStates,
    &mut dyn RenderDevice,
) -> Result<(), CallbackError>;
pub type GeometryStateFn =
    fn(&dyn Geometry, &mut ProgramRenderStates, &mut dyn RenderDevice) -> Result<(), CallbackError>;

type GlobalCallback =
    Box<dyn FnMut(&Scene, &mut RenderStates, &mut dyn RenderDevice) -> Result<(), CallbackError>>;
type ProgramCallback = Box<
    dyn FnMut(
        &Scene,
        ProgramHandle,
        &RenderStates,
        &mut ProgramRenderStates,
        &mut dyn RenderDevice,
    ) -> Result<(), CallbackError>,
>;
type GeometryCallback = Box<
    dyn FnMut(
        &dyn Geometry,
        &mut ProgramRenderStates,
        &mut dyn RenderDevice,
    ) -> Result<(), CallbackError>,
>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Global,
    Frame,
    Program,
    Geometry,
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Global => "global",
            Self::Frame => "per-frame",
            Self::Program => "per-program",
            Self::Geometry => "per-geometry",
        })
    }
}

/// An exported callback function.
#[derive(Clone, Copy)]
pub enum CallbackSymbol {
    Global(GlobalStateFn),
    Frame(FrameStateFn),
    Program(ProgramStateFn),
    Geometry(GeometryStateFn),
}

impl CallbackSymbol {
    pub fn kind(&self) -> CallbackKind {
        match self {
            Self::Global(_) => CallbackKind::Global,
            Self::Frame(_) => CallbackKind::Frame,
            Self::Program(_) => CallbackKind::Program,
            Self::Geometry(_) => CallbackKind::Geometry,
        }
    }
}

impl fmt::Debug for CallbackSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallbackSymbol({})", self.kind())
    }
}

/// Named table of callback functions.
#[derive(Debug, Clone, Default)]
pub struct CallbackLibrary {
    name: String,
    symbols: HashMap<String, CallbackSymbol>,
}

impl CallbackLibrary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbols: HashMap::new(),
        }
    }

    /// Builder-style [`export`](Self::export).
    pub fn with(mut self, symbol: &str, callback: CallbackSymbol) -> Self {
        self.export(symbol, callback);
        self
    }

    pub fn export(&mut self, symbol: &str, callback: CallbackSymbol) {
        self.symbols.insert(symbol.to_string(), callback);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self, symbol: &str) -> Option<CallbackSymbol> {
        self.symbols.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// The four ordered callback lists of a pipeline.
#[derive(Default)]
pub struct StateCallbacks {
    global: Vec<GlobalCallback>,
    frame: Vec<GlobalCallback>,
    program: Vec<ProgramCallback>,
    geometry: Vec<GeometryCallback>,
}

impl fmt::Debug for StateCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateCallbacks")
            .field("global", &self.global.len())
            .field("frame", &self.frame.len())
            .field("program", &self.program.len())
            .field("geometry", &self.geometry.len())
            .finish()
    }
}

impl StateCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_global<F>(&mut self, callback: F)
    where
        F: FnMut(&Scene, &mut RenderStates, &mut dyn RenderDevice) -> Result<(), CallbackError>
            + 'static,
    {
        self.global.push(Box::new(callback));
    }

    pub fn add_frame<F>(&mut self, callback: F)
    where
        F: FnMut(&Scene, &mut RenderStates, &mut dyn RenderDevice) -> Result<(), CallbackError>
            + 'static,
    {
        self.frame.push(Box::new(callback));
    }

    pub fn add_program<F>(&mut self, callback: F)
    where
        F: FnMut(
                &Scene,
                ProgramHandle,
                &RenderStates,
                &mut ProgramRenderStates,
                &mut dyn RenderDevice,
            ) -> Result<(), CallbackError>
            + 'static,
    {
        self.program.push(Box::new(callback));
    }

    pub fn add_geometry<F>(&mut self, callback: F)
    where
        F: FnMut(
                &dyn Geometry,
                &mut ProgramRenderStates,
                &mut dyn RenderDevice,
            ) -> Result<(), CallbackError>
            + 'static,
    {
        self.geometry.push(Box::new(callback));
    }

    /// Append one exported function to the list of its kind.
    pub fn add_symbol(&mut self, symbol: CallbackSymbol) {
        match symbol {
            CallbackSymbol::Global(f) => self.add_global(f),
            CallbackSymbol::Frame(f) => self.add_frame(f),
            CallbackSymbol::Program(f) => self.add_program(f),
            CallbackSymbol::Geometry(f) => self.add_geometry(f),
        }
    }

    /// Bind the symbols named in `config` from `library`, list by list.
    ///
    /// Names the library does not export are skipped; names exported with a
    /// different kind are skipped with a warning. Returns how many were bound.
    pub fn bind_library(&mut self, library: &CallbackLibrary, config: &CallbackConfig) -> usize {
        let lists = [
            (CallbackKind::Global, &config.global_state_cbs),
            (CallbackKind::Frame, &config.per_frame_cbs),
            (CallbackKind::Program, &config.per_program_cbs),
            (CallbackKind::Geometry, &config.per_geom_cbs),
        ];

        let mut bound = 0;
        for (kind, names) in lists {
            for name in names {
                let Some(symbol) = library.symbol(name) else {
                    log::debug!(
                        "callback library '{}' does not export '{name}'",
                        library.name()
                    );
                    continue;
                };
                if symbol.kind() != kind {
                    log::warn!(
                        "'{name}' in '{}' is a {} callback, wanted {kind}; skipped",
                        library.name(),
                        symbol.kind()
                    );
                    continue;
                }
                self.add_symbol(symbol);
                bound += 1;
            }
        }
        log::info!("Bound {bound} state callback(s) from '{}'", library.name());
        bound
    }

    pub fn len(&self, kind: CallbackKind) -> usize {
        match kind {
            CallbackKind::Global => self.global.len(),
            CallbackKind::Frame => self.frame.len(),
            CallbackKind::Program => self.program.len(),
            CallbackKind::Geometry => self.geometry.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty()
            && self.frame.is_empty()
            && self.program.is_empty()
            && self.geometry.is_empty()
    }

    pub fn clear(&mut self) {
        self.global.clear();
        self.frame.clear();
        self.program.clear();
        self.geometry.clear();
    }

    pub fn run_global(
        &mut self,
        scene: &Scene,
        states: &mut RenderStates,
        device: &mut dyn RenderDevice,
    ) -> Result<(), CallbackError> {
        for callback in &mut self.global {
            callback(scene, states, device)?;
        }
        Ok(())
    }

    pub fn run_frame(
        &mut self,
        scene: &Scene,
        states: &mut RenderStates,
        device: &mut dyn RenderDevice,
    ) -> Result<(), CallbackError> {
        for callback in &mut self.frame {
            callback(scene, states, device)?;
        }
        Ok(())
    }

    pub fn run_program(
        &mut self,
        scene: &Scene,
        program: ProgramHandle,
        states: &RenderStates,
        program_states: &mut ProgramRenderStates,
        device: &mut dyn RenderDevice,
    ) -> Result<(), CallbackError> {
        for callback in &mut self.program {
            callback(scene, program, states, program_states, device)?;
        }
        Ok(())
    }

    pub fn run_geometry(
        &mut self,
        geometry: &dyn Geometry,
        program_states: &mut ProgramRenderStates,
        device: &mut dyn RenderDevice,
    ) -> Result<(), CallbackError> {
        for callback in &mut self.geometry {
            callback(geometry, program_states, device)?;
        }
        Ok(())
    }
}
