//! Image data and environment maps
//!
//! Provides RGBA8 image loading for material textures and the environment
//! map sampled by rays that leave the scene.

use std::path::Path;

use super::error::{SceneError, SceneResult};

/// Decoded image ready for device upload
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    /// Raw RGBA pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Load an image from a file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> SceneResult<Self> {
        let path_ref = path.as_ref();
        log::debug!("Loading image from: {:?}", path_ref);

        let img = image::open(path_ref).map_err(|e| SceneError::TextureLoad {
            path: path_ref.display().to_string(),
            reason: e.to_string(),
        })?;

        // RGBA8 is the only upload format
        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();
        log::info!("Loaded image {}x{} from {:?}", width, height, path_ref);

        Ok(Self {
            data: rgba_img.into_raw(),
            width,
            height,
        })
    }

    /// Decode an encoded image held in memory
    pub fn from_bytes(bytes: &[u8]) -> SceneResult<Self> {
        let img = image::load_from_memory(bytes).map_err(|e| SceneError::TextureLoad {
            path: "<memory>".to_string(),
            reason: e.to_string(),
        })?;

        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();
        log::debug!("Loaded image {}x{} from memory", width, height);

        Ok(Self {
            data: rgba_img.into_raw(),
            width,
            height,
        })
    }

    /// Single-colour image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = (width * height) as usize;
        let mut data = Vec::with_capacity(pixel_count * 4);
        for _ in 0..pixel_count {
            data.extend_from_slice(&color);
        }
        Self { data, width, height }
    }

    /// Size of the pixel data in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Environment map sampled on ray miss
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentMap {
    /// Where the image came from, for logs
    pub source: String,
    /// Equirectangular RGBA8 image
    pub image: ImageData,
    /// Radiance multiplier
    pub intensity: f32,
}

impl EnvironmentMap {
    /// Wrap an already decoded image
    pub fn new(source: impl Into<String>, image: ImageData) -> Self {
        Self {
            source: source.into(),
            image,
            intensity: 1.0,
        }
    }

    /// Load an equirectangular image from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> SceneResult<Self> {
        let image = ImageData::from_file(path.as_ref())?;
        Ok(Self::new(path.as_ref().display().to_string(), image))
    }

    /// Set the radiance multiplier
    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_image() {
        let img = ImageData::solid_color(4, 4, [255, 0, 0, 255]);
        assert_eq!(img.size_bytes(), 4 * 4 * 4);
        assert_eq!(&img.data[0..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn test_missing_file_reports_path() {
        match ImageData::from_file("does/not/exist.png") {
            Err(SceneError::TextureLoad { path, .. }) => assert!(path.contains("exist.png")),
            other => panic!("Expected texture load error, got {:?}", other.map(|i| i.width)),
        }
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        assert!(ImageData::from_bytes(&[1, 2, 3, 4]).is_err());
    }
}
