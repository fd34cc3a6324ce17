//! # Frame Synchronizer
//!
//! Bounds the number of frames in flight and gates every destructive resource
//! mutation behind the completion signal of the frames that may read it.
//!
//! ## Ring
//!
//! Each ring slot owns one completion signal and one uniform buffer. The
//! protocol per frame is:
//!
//! 1. [`begin_frame`](FrameSynchronizer::begin_frame) waits for the signal of
//!    the frame that last used the current slot, which frees the slot's
//!    uniform buffer for rewriting.
//! 2. Before any scene resource is mutated,
//!    [`wait_previous_frame`](FrameSynchronizer::wait_previous_frame) waits for
//!    the frame submitted just before, the last one that can still read them.
//! 3. [`submit`](FrameSynchronizer::submit) hands the frame to the device with
//!    a wait on the previous frame's signal and the slot's own signal to raise.
//! 4. [`advance`](FrameSynchronizer::advance) moves `previous` to `current`
//!    and `current` to the next slot.
//!
//! ## Refresh
//!
//! A stale or suboptimal presentation never fails the frame. It raises a
//! `needs_refresh` flag consumed at the start of the next frame.

use crate::device::{
    BufferDesc, BufferHandle, BufferUsage, DeviceBackend, DeviceResult, FrameSubmission, ImageHandle, SignalHandle,
};
use crate::render::presentation::PresentOutcome;
use crate::scene::SceneBindings;

/// One ring slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameSlot {
    signal: SignalHandle,
    uniforms: BufferHandle,
    /// Frame number last submitted from this slot and not yet awaited
    in_flight: Option<u64>,
    /// Signal raised by the last submission and not yet consumed by a device wait
    chained: bool,
}

/// Resources of the frame being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameContext {
    /// Ring slot
    pub slot: usize,
    /// Monotonic frame number
    pub frame_number: u64,
    /// Uniform buffer of this slot, free to rewrite
    pub uniforms: BufferHandle,
}

/// Ring of completion signals
#[derive(Debug)]
pub struct FrameSynchronizer {
    slots: Vec<FrameSlot>,
    current: usize,
    previous: Option<usize>,
    frame_number: u64,
    needs_refresh: bool,
}

impl FrameSynchronizer {
    /// Create `frames_in_flight` slots, each with a signal and a uniform buffer
    pub fn new<B: DeviceBackend>(backend: &mut B, frames_in_flight: usize, uniform_size: u64) -> DeviceResult<Self> {
        let mut sync = Self {
            slots: Vec::with_capacity(frames_in_flight),
            current: 0,
            previous: None,
            frame_number: 0,
            needs_refresh: false,
        };

        for slot in 0..frames_in_flight.max(1) {
            let signal = match backend.create_signal() {
                Ok(signal) => signal,
                Err(e) => {
                    sync.destroy(backend);
                    return Err(e);
                }
            };
            let label = format!("frame uniforms {}", slot);
            let uniforms = match backend.create_buffer(
                &BufferDesc::new(&label, uniform_size, BufferUsage::UNIFORM | BufferUsage::HOST_WRITE),
                None,
            ) {
                Ok(buffer) => buffer,
                Err(e) => {
                    backend.destroy_signal(signal);
                    sync.destroy(backend);
                    return Err(e);
                }
            };
            sync.slots.push(FrameSlot {
                signal,
                uniforms,
                in_flight: None,
                chained: false,
            });
        }

        log::debug!("Frame synchronizer created with {} slots", sync.slots.len());
        Ok(sync)
    }

    /// Wait until the current slot is free and return its resources
    pub fn begin_frame<B: DeviceBackend>(&mut self, backend: &mut B) -> DeviceResult<FrameContext> {
        self.wait_slot(backend, self.current)?;
        let slot = &self.slots[self.current];
        Ok(FrameContext {
            slot: self.current,
            frame_number: self.frame_number,
            uniforms: slot.uniforms,
        })
    }

    /// Wait for the previously submitted frame before mutating what it reads
    pub fn wait_previous_frame<B: DeviceBackend>(&mut self, backend: &mut B) -> DeviceResult<()> {
        match self.previous {
            Some(previous) => self.wait_slot(backend, previous),
            None => Ok(()),
        }
    }

    /// Whether the previously submitted frame has retired, without blocking
    pub fn previous_frame_retired<B: DeviceBackend>(&self, backend: &B) -> DeviceResult<bool> {
        match self.previous.map(|previous| &self.slots[previous]) {
            Some(slot) if slot.in_flight.is_some() => backend.signal_status(slot.signal),
            _ => Ok(true),
        }
    }

    fn wait_slot<B: DeviceBackend>(&mut self, backend: &mut B, index: usize) -> DeviceResult<()> {
        let slot = &mut self.slots[index];
        if let Some(frame) = slot.in_flight {
            backend.wait_signal(slot.signal).map_err(|e| {
                log::error!("Waiting for frame {} in slot {} failed: {}", frame, index, e);
                e
            })?;
            slot.in_flight = None;
            log::trace!("Frame {} retired from slot {}", frame, index);
        }
        Ok(())
    }

    /// Submit the current frame
    ///
    /// The device waits on the previous frame's signal, so frames execute in
    /// submission order.
    pub fn submit<B: DeviceBackend>(
        &mut self,
        backend: &mut B,
        output: ImageHandle,
        extent: (u32, u32),
        bindings: &SceneBindings,
    ) -> DeviceResult<()> {
        let wait_for = self
            .previous
            .filter(|&previous| self.slots[previous].chained)
            .map(|previous| self.slots[previous].signal);
        let slot = self.slots[self.current];

        backend.submit_frame(&FrameSubmission {
            slot: self.current,
            frame_number: self.frame_number,
            wait_for,
            signal: slot.signal,
            output,
            extent,
            uniforms: slot.uniforms,
            bindings,
        })?;

        if let Some(previous) = self.previous {
            self.slots[previous].chained = false;
        }
        let slot = &mut self.slots[self.current];
        slot.in_flight = Some(self.frame_number);
        slot.chained = true;
        Ok(())
    }

    /// Move to the next ring slot
    pub fn advance(&mut self) {
        self.previous = Some(self.current);
        self.current = (self.current + 1) % self.slots.len();
        self.frame_number += 1;
    }

    /// Block until every submitted frame retired
    pub fn wait_all<B: DeviceBackend>(&mut self, backend: &mut B) -> DeviceResult<()> {
        backend.wait_idle()?;
        for slot in &mut self.slots {
            slot.in_flight = None;
        }
        Ok(())
    }

    /// Record a presentation outcome
    pub fn handle_present(&mut self, outcome: PresentOutcome) {
        if outcome.needs_refresh() {
            self.mark_needs_refresh(match outcome {
                PresentOutcome::Stale => "output surface is stale",
                _ => "output surface is suboptimal",
            });
        }
    }

    /// Request a surface and pipeline refresh at the start of the next frame
    pub fn mark_needs_refresh(&mut self, reason: &str) {
        if !self.needs_refresh {
            log::info!("Refresh requested: {}", reason);
        }
        self.needs_refresh = true;
    }

    /// Consume the refresh request
    pub fn take_needs_refresh(&mut self) -> bool {
        std::mem::take(&mut self.needs_refresh)
    }

    /// Whether a refresh is pending
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh
    }

    /// Number of ring slots
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Slot of the frame being recorded
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Slot of the last submitted frame
    pub fn previous_slot(&self) -> Option<usize> {
        self.previous
    }

    /// Number of the frame being recorded
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Free signals and uniform buffers; the device must be idle
    pub fn destroy<B: DeviceBackend>(&mut self, backend: &mut B) {
        for slot in self.slots.drain(..) {
            backend.destroy_buffer(slot.uniforms);
            backend.destroy_signal(slot.signal);
        }
        self.previous = None;
        self.current = 0;
    }
}
