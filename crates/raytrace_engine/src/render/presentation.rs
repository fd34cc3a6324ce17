//! Presentation collaborator
//!
//! The trace writes into an output image owned by the renderer; a
//! [`PresentationTarget`] consumes that image each frame (post-process,
//! swapchain blit, file dump). A target reports a stale or suboptimal surface
//! instead of failing; the renderer answers by recreating the output image on
//! the next frame.

use crate::device::{DeviceResult, ImageHandle};

/// Result of handing a frame to the presentation target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Frame consumed
    Presented,
    /// Surface no longer matches the output; frame was dropped
    Stale,
    /// Frame consumed, but the surface should be recreated
    Suboptimal,
}

impl PresentOutcome {
    /// Whether the output surface must be recreated
    pub fn needs_refresh(&self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// Consumer of the completed trace output
pub trait PresentationTarget {
    /// Current surface extent in pixels
    fn extent(&self) -> (u32, u32);

    /// Hand over the output image of `frame_number`
    fn present(&mut self, output: ImageHandle, extent: (u32, u32), frame_number: u64) -> DeviceResult<PresentOutcome>;

    /// Surface was recreated; `output` replaces the previous image
    fn surface_recreated(&mut self, output: ImageHandle, extent: (u32, u32)) {
        let _ = (output, extent);
    }
}

/// Target without a window
///
/// Keeps the list of presented frames and can be resized, which makes the
/// next presentation report a stale surface.
#[derive(Debug, Default)]
pub struct OffscreenTarget {
    extent: (u32, u32),
    presented: Vec<u64>,
    stale: bool,
    recreations: usize,
}

impl OffscreenTarget {
    /// Create a target of the given size
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            extent: (width, height),
            ..Default::default()
        }
    }

    /// Change the surface size; the next frame is reported stale
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.extent != (width, height) {
            log::debug!("Offscreen target resized to {}x{}", width, height);
            self.extent = (width, height);
            self.stale = true;
        }
    }

    /// Frame numbers presented so far
    pub fn presented_frames(&self) -> &[u64] {
        &self.presented
    }

    /// How many times the output surface was recreated
    pub fn recreations(&self) -> usize {
        self.recreations
    }
}

impl PresentationTarget for OffscreenTarget {
    fn extent(&self) -> (u32, u32) {
        self.extent
    }

    fn present(&mut self, _output: ImageHandle, extent: (u32, u32), frame_number: u64) -> DeviceResult<PresentOutcome> {
        if self.stale || extent != self.extent {
            return Ok(PresentOutcome::Stale);
        }
        self.presented.push(frame_number);
        Ok(PresentOutcome::Presented)
    }

    fn surface_recreated(&mut self, _output: ImageHandle, extent: (u32, u32)) {
        self.stale = extent != self.extent;
        self.recreations += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_reports_stale_until_recreated() {
        let mut target = OffscreenTarget::new(64, 64);
        let image = ImageHandle(1);
        assert_eq!(target.present(image, (64, 64), 0).unwrap(), PresentOutcome::Presented);

        target.resize(128, 64);
        assert_eq!(target.present(image, (64, 64), 1).unwrap(), PresentOutcome::Stale);

        target.surface_recreated(ImageHandle(2), (128, 64));
        assert_eq!(target.present(ImageHandle(2), (128, 64), 2).unwrap(), PresentOutcome::Presented);
        assert_eq!(target.presented_frames(), &[0, 2]);
    }

    #[test]
    fn test_outcome_refresh_classification() {
        assert!(!PresentOutcome::Presented.needs_refresh());
        assert!(PresentOutcome::Stale.needs_refresh());
        assert!(PresentOutcome::Suboptimal.needs_refresh());
    }
}
