//! Scene-wide index instance encoding
//!
//! Each instance becomes one 64-byte record in the layout the device reads
//! for top-level builds: a row-major 3x4 transform, a 24-bit custom index
//! packed with an 8-bit visibility mask, a 24-bit hit-group offset packed
//! with 8 bits of instance flags, and the device address of the per-object
//! index.

use bitflags::bitflags;

use crate::device::DeviceAddress;
use crate::foundation::math::{Mat4, Mat4Ext};

bitflags! {
    /// Per-instance trace flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InstanceFlags: u8 {
        /// Trace both triangle faces
        const TRIANGLE_FACING_CULL_DISABLE = 0x01;
        /// Swap front and back faces
        const TRIANGLE_FLIP_FACING = 0x02;
        /// Treat all geometry as opaque (no any-hit)
        const FORCE_OPAQUE = 0x04;
        /// Treat all geometry as non-opaque
        const FORCE_NO_OPAQUE = 0x08;
    }
}

const LOW_24_BITS: u32 = 0x00FF_FFFF;

/// Device-layout instance record
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodedInstance {
    /// Object-to-world transform, top three rows, row-major
    pub transform: [f32; 12],
    /// Custom index (low 24 bits) and mask (high 8 bits)
    pub custom_index_and_mask: u32,
    /// Hit-group offset (low 24 bits) and flags (high 8 bits)
    pub sbt_offset_and_flags: u32,
    /// Device address of the per-object index
    pub structure_reference: DeviceAddress,
}

unsafe impl bytemuck::Pod for EncodedInstance {}
unsafe impl bytemuck::Zeroable for EncodedInstance {}

impl EncodedInstance {
    /// Pack an instance record
    pub fn new(
        transform: [f32; 12],
        custom_index: u32,
        mask: u8,
        flags: InstanceFlags,
        structure_reference: DeviceAddress,
    ) -> Self {
        Self {
            transform,
            custom_index_and_mask: (custom_index & LOW_24_BITS) | (u32::from(mask) << 24),
            sbt_offset_and_flags: u32::from(flags.bits()) << 24,
            structure_reference,
        }
    }

    /// Padding record that no ray can hit
    ///
    /// `structure_reference` must still name a live per-object index.
    pub fn inactive(structure_reference: DeviceAddress) -> Self {
        Self::new([0.0; 12], 0, 0, InstanceFlags::empty(), structure_reference)
    }

    /// Custom index read by the hit shader
    pub fn custom_index(&self) -> u32 {
        self.custom_index_and_mask & LOW_24_BITS
    }

    /// Visibility mask
    pub fn mask(&self) -> u8 {
        (self.custom_index_and_mask >> 24) as u8
    }

    /// Instance flags
    pub fn flags(&self) -> InstanceFlags {
        InstanceFlags::from_bits_truncate((self.sbt_offset_and_flags >> 24) as u8)
    }
}

/// How the scene-wide index is brought up to date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneBuildMode {
    /// New structure sized from a device size query
    FullBuild,
    /// In-place update of the previous structure
    Refit,
}

/// One instance handed to the builder
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneInstance {
    /// Per-object slot, also the custom index
    pub geometry_index: u32,
    /// Object-to-world transform
    pub transform: Mat4,
    /// Visibility mask
    pub mask: u8,
    /// Whether the geometry skips any-hit processing
    pub opaque: bool,
}

impl SceneInstance {
    /// Encode against the address of its per-object index
    pub fn encode(&self, structure_reference: DeviceAddress) -> EncodedInstance {
        let flags = if self.opaque {
            InstanceFlags::FORCE_OPAQUE | InstanceFlags::TRIANGLE_FACING_CULL_DISABLE
        } else {
            InstanceFlags::TRIANGLE_FACING_CULL_DISABLE
        };
        EncodedInstance::new(
            self.transform.to_row_major_3x4(),
            self.geometry_index,
            self.mask,
            flags,
            structure_reference,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_record_matches_device_layout() {
        assert_eq!(std::mem::size_of::<EncodedInstance>(), 64);
        assert_eq!(std::mem::offset_of!(EncodedInstance, structure_reference), 56);
    }

    #[test]
    fn test_packing_round_trips_fields() {
        let record = EncodedInstance::new([0.0; 12], 1234, 0xAB, InstanceFlags::FORCE_OPAQUE, 0x1000);
        assert_eq!(record.custom_index(), 1234);
        assert_eq!(record.mask(), 0xAB);
        assert_eq!(record.flags(), InstanceFlags::FORCE_OPAQUE);
    }

    #[test]
    fn test_custom_index_truncated_to_24_bits() {
        let record = EncodedInstance::new([0.0; 12], 0x0100_0001, 0xFF, InstanceFlags::empty(), 0);
        assert_eq!(record.custom_index(), 1);
        assert_eq!(record.mask(), 0xFF);
    }

    #[test]
    fn test_inactive_record_is_masked_out() {
        let record = EncodedInstance::inactive(0x4000);
        assert_eq!(record.mask(), 0);
        assert_eq!(record.structure_reference, 0x4000);
    }

    #[test]
    fn test_encode_uses_geometry_index_and_opacity() {
        let instance = SceneInstance {
            geometry_index: 7,
            transform: Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0)),
            mask: 0xFF,
            opaque: true,
        };
        let record = instance.encode(0x2000);

        assert_eq!(record.custom_index(), 7);
        assert_eq!(record.structure_reference, 0x2000);
        assert!(record.flags().contains(InstanceFlags::FORCE_OPAQUE));
        assert_eq!(record.transform[3], 1.0);
        assert_eq!(record.transform[11], 3.0);
    }
}
