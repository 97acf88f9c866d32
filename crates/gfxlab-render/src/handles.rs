//! Typed GPU object names.
//!
//! Every handle wraps the raw `u32` name the driver hands out. Zero is never a
//! live object: for framebuffers it means the visible framebuffer, for
//! programs and textures it means "nothing bound".

macro_rules! gpu_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub const NULL: Self = Self(0);

            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    };
}

gpu_handle!(
    /// Framebuffer object. [`FramebufferHandle::SCREEN`] is the visible framebuffer.
    FramebufferHandle
);
gpu_handle!(TextureHandle);
gpu_handle!(RenderbufferHandle);
gpu_handle!(ProgramHandle);
gpu_handle!(BufferHandle);
gpu_handle!(
    /// Uploaded vertex/index data ready for an indexed draw.
    MeshHandle
);

impl FramebufferHandle {
    pub const SCREEN: Self = Self::NULL;
}

/// Location of a named uniform inside a linked program.
///
/// Location 0 is valid, so absence is expressed with `Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);
