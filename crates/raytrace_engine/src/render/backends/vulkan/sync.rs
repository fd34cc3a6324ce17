//! Synchronization primitives
//!
//! RAII wrappers for fences and semaphores, plus the completion signal that
//! backs each frame-ring slot.

use ash::{vk, Device};

use super::context::{VulkanError, VulkanResult};

/// Semaphore wrapper with RAII cleanup
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let semaphore = unsafe { device.create_semaphore(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, semaphore })
    }

    /// Get semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let fence = unsafe { device.create_fence(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, fence })
    }

    /// Wait for fence to be signaled
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Reset fence to unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Get fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Completion signal of one frame-ring slot
///
/// The fence is what the host waits on. The semaphore chains the slot's
/// submission to the next frame's submission on the device.
pub struct CompletionSignal {
    /// Raised when the frame retires
    pub fence: Fence,
    /// Raised for the next frame's submission to wait on
    pub semaphore: Semaphore,
    /// Command buffer recorded for this slot
    pub command_buffer: vk::CommandBuffer,
    /// A submission is outstanding
    pub pending: bool,
}

impl CompletionSignal {
    /// Create an unsignaled completion signal
    pub fn new(device: &Device, command_buffer: vk::CommandBuffer) -> VulkanResult<Self> {
        Ok(Self {
            fence: Fence::new(device.clone(), false)?,
            semaphore: Semaphore::new(device.clone())?,
            command_buffer,
            pending: false,
        })
    }

    /// Block until the outstanding submission retires, then reset
    pub fn wait(&mut self, timeout: u64) -> VulkanResult<()> {
        if !self.pending {
            return Ok(());
        }
        self.fence.wait(timeout)?;
        self.fence.reset()?;
        self.pending = false;
        Ok(())
    }
}
