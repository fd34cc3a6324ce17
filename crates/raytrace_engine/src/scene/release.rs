//! Deferred release of device resources
//!
//! Scene mutations happen while frames may still be executing. Resources they
//! drop are parked here and destroyed during the next resolution, which only
//! runs after the previous frame's completion signal was awaited.

use crate::device::{BufferHandle, DeviceBackend, TextureHandle};

/// Resources waiting for their last reader to retire
#[derive(Debug, Default)]
pub struct ReleaseQueue {
    buffers: Vec<BufferHandle>,
    textures: Vec<TextureHandle>,
}

impl ReleaseQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Park buffers
    pub fn defer_buffers(&mut self, buffers: impl IntoIterator<Item = BufferHandle>) {
        self.buffers.extend(buffers);
    }

    /// Park textures
    pub fn defer_textures(&mut self, textures: impl IntoIterator<Item = TextureHandle>) {
        self.textures.extend(textures);
    }

    /// Number of parked resources
    pub fn len(&self) -> usize {
        self.buffers.len() + self.textures.len()
    }

    /// Whether nothing is parked
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.textures.is_empty()
    }

    /// Destroy everything parked; returns how many resources were freed
    pub fn flush<B: DeviceBackend>(&mut self, backend: &mut B) -> usize {
        let count = self.len();
        for buffer in self.buffers.drain(..) {
            backend.destroy_buffer(buffer);
        }
        for texture in self.textures.drain(..) {
            backend.destroy_texture(texture);
        }
        if count > 0 {
            log::debug!("Released {} deferred resources", count);
        }
        count
    }
}
