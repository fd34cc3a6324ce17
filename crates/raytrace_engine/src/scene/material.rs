//! Materials and textures
//!
//! Materials are deduplicated by field-wise equality: two geometries submitted
//! with identical materials share one table slot and one texture load. Both
//! tables are bounded by [`SceneLimits`](crate::core::SceneLimits) and hand out
//! dense indices through a [`SequenceAllocator`].

use std::path::{Path, PathBuf};

use super::allocator::SequenceAllocator;
use super::environment::ImageData;
use super::error::{ResourceKind, SceneError, SceneResult};
use crate::device::TextureHandle;

/// Surface description of a triangle run
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Diffuse colour (RGBA, linear)
    pub diffuse: [f32; 4],
    /// Optional diffuse texture, loaded once per unique path
    pub diffuse_texture: Option<PathBuf>,
    /// Metalness in 0..1
    pub metallic: f32,
    /// Specular reflectance in 0..1
    pub specular: f32,
    /// Roughness in 0..1
    pub roughness: f32,
    /// Index of refraction
    pub ior: f32,
    /// Transmission in 0..1
    pub transmission: f32,
    /// Emitted radiance
    pub emission: [f32; 3],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            diffuse: [0.8, 0.8, 0.8, 1.0],
            diffuse_texture: None,
            metallic: 0.0,
            specular: 0.5,
            roughness: 0.5,
            ior: 1.5,
            transmission: 0.0,
            emission: [0.0; 3],
        }
    }
}

impl Material {
    /// Plain diffuse material
    pub fn diffuse(r: f32, g: f32, b: f32) -> Self {
        Self {
            diffuse: [r, g, b, 1.0],
            ..Default::default()
        }
    }

    /// Set the diffuse texture
    pub fn with_texture(mut self, path: impl Into<PathBuf>) -> Self {
        self.diffuse_texture = Some(path.into());
        self
    }

    /// Set metallic and roughness
    pub fn with_metallic_roughness(mut self, metallic: f32, roughness: f32) -> Self {
        self.metallic = metallic;
        self.roughness = roughness;
        self
    }

    /// Set emission
    pub fn with_emission(mut self, emission: [f32; 3]) -> Self {
        self.emission = emission;
        self
    }

    /// Set transmission and index of refraction
    pub fn with_transmission(mut self, transmission: f32, ior: f32) -> Self {
        self.transmission = transmission;
        self.ior = ior;
        self
    }
}

/// Material record in the device material buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuMaterial {
    /// Diffuse colour
    pub diffuse: [f32; 4],
    /// Emitted radiance
    pub emission: [f32; 3],
    /// Metalness
    pub metallic: f32,
    /// Specular reflectance
    pub specular: f32,
    /// Roughness
    pub roughness: f32,
    /// Index of refraction
    pub ior: f32,
    /// Transmission
    pub transmission: f32,
    /// Texture table index, -1 for none
    pub diffuse_texture: i32,
    /// Padding to 16-byte alignment
    pub _padding: [u32; 3],
}

unsafe impl bytemuck::Pod for GpuMaterial {}
unsafe impl bytemuck::Zeroable for GpuMaterial {}

impl GpuMaterial {
    fn new(material: &Material, texture: Option<u32>) -> Self {
        Self {
            diffuse: material.diffuse,
            emission: material.emission,
            metallic: material.metallic,
            specular: material.specular,
            roughness: material.roughness,
            ior: material.ior,
            transmission: material.transmission,
            diffuse_texture: texture.map_or(-1, |t| t as i32),
            _padding: [0; 3],
        }
    }
}

/// Global deduplicated material table
#[derive(Debug)]
pub struct MaterialTable {
    materials: Vec<Material>,
    records: Vec<GpuMaterial>,
    allocator: SequenceAllocator,
    limit: usize,
    dirty: bool,
}

impl MaterialTable {
    /// Create an empty table holding at most `limit` materials
    pub fn new(limit: usize) -> Self {
        Self {
            materials: Vec::new(),
            records: Vec::new(),
            allocator: SequenceAllocator::new(),
            limit,
            dirty: false,
        }
    }

    /// Index of an equal material already in the table
    pub fn find(&self, material: &Material) -> Option<u32> {
        self.materials.iter().position(|m| m == material).map(|i| i as u32)
    }

    /// Number of slots a batch of materials would add
    pub fn count_new<'a>(&self, materials: impl IntoIterator<Item = &'a Material>) -> usize {
        let mut fresh: Vec<&Material> = Vec::new();
        for material in materials {
            if self.find(material).is_none() && !fresh.contains(&material) {
                fresh.push(material);
            }
        }
        fresh.len()
    }

    /// Whether `additional` new materials fit
    pub fn check_capacity(&self, additional: usize) -> SceneResult<()> {
        if self.materials.len() + additional > self.limit {
            return Err(SceneError::CapacityExceeded {
                resource: ResourceKind::Material,
                limit: self.limit,
            });
        }
        Ok(())
    }

    /// Index of `material`, adding it when no equal material exists
    ///
    /// Entries live until [`clear`](Self::clear).
    pub fn intern(&mut self, material: &Material, texture: Option<u32>) -> SceneResult<u32> {
        if let Some(index) = self.find(material) {
            return Ok(index);
        }
        self.check_capacity(1)?;
        let index = self.allocator.allocate_index();
        self.materials.push(material.clone());
        self.records.push(GpuMaterial::new(material, texture));
        self.dirty = true;
        log::debug!("Material {} added ({} total)", index, self.materials.len());
        Ok(index)
    }

    /// Records in index order for upload
    pub fn records(&self) -> &[GpuMaterial] {
        &self.records
    }

    /// Number of unique materials
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Whether the table changed since the last upload
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the table as uploaded
    pub fn mark_uploaded(&mut self) {
        self.dirty = false;
    }

    /// Drop every material
    pub fn clear(&mut self) {
        let count = self.allocator.len();
        self.allocator.release_range(0..count);
        self.materials.clear();
        self.records.clear();
        self.dirty = true;
    }
}

/// One loaded texture
#[derive(Debug)]
struct TextureEntry {
    path: PathBuf,
    image: ImageData,
    handle: Option<TextureHandle>,
}

/// Texture table deduplicated by source path
#[derive(Debug)]
pub struct TextureTable {
    entries: Vec<TextureEntry>,
    allocator: SequenceAllocator,
    limit: usize,
}

impl TextureTable {
    /// Create an empty table holding at most `limit` textures
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            allocator: SequenceAllocator::new(),
            limit,
        }
    }

    /// Index of an already loaded path
    pub fn find(&self, path: &Path) -> Option<u32> {
        self.entries.iter().position(|e| e.path == path).map(|i| i as u32)
    }

    /// Whether `additional` new textures fit
    pub fn check_capacity(&self, additional: usize) -> SceneResult<()> {
        if self.entries.len() + additional > self.limit {
            return Err(SceneError::CapacityExceeded {
                resource: ResourceKind::Texture,
                limit: self.limit,
            });
        }
        Ok(())
    }

    /// Add an already decoded image under `path`
    pub fn insert(&mut self, path: PathBuf, image: ImageData) -> SceneResult<u32> {
        if let Some(index) = self.find(&path) {
            return Ok(index);
        }
        self.check_capacity(1)?;
        let index = self.allocator.allocate_index();
        log::debug!("Texture {} registered from {:?}", index, path);
        self.entries.push(TextureEntry { path, image, handle: None });
        Ok(index)
    }

    /// Textures not yet on the device, as (index, label, image)
    pub fn pending_uploads(&self) -> impl Iterator<Item = (usize, String, &ImageData)> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.handle.is_none())
            .map(|(i, e)| (i, e.path.to_string_lossy().into_owned(), &e.image))
    }

    /// Record the device handle of an uploaded texture
    pub fn set_handle(&mut self, index: usize, handle: TextureHandle) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.handle = Some(handle);
        }
    }

    /// Device handles in index order (uploaded entries only)
    pub fn handles(&self) -> Vec<TextureHandle> {
        self.entries.iter().filter_map(|e| e.handle).collect()
    }

    /// Number of textures
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every texture, returning device handles to release
    pub fn clear(&mut self) -> Vec<TextureHandle> {
        let handles = self.handles();
        let count = self.allocator.len();
        self.allocator.release_range(0..count);
        self.entries.clear();
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_materials_share_a_slot() {
        let mut table = MaterialTable::new(8);
        let red = Material::diffuse(1.0, 0.0, 0.0);

        let first = table.intern(&red, None).unwrap();
        let second = table.intern(&red.clone(), None).unwrap();

        assert_eq!(first, second);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_different_materials_get_dense_indices() {
        let mut table = MaterialTable::new(8);
        let a = table.intern(&Material::diffuse(1.0, 0.0, 0.0), None).unwrap();
        let b = table.intern(&Material::diffuse(0.0, 1.0, 0.0), None).unwrap();
        assert_eq!((a, b), (0, 1));
    }

    #[test]
    fn test_material_capacity() {
        let mut table = MaterialTable::new(1);
        table.intern(&Material::diffuse(1.0, 0.0, 0.0), None).unwrap();

        let result = table.intern(&Material::diffuse(0.0, 0.0, 1.0), None);
        assert!(matches!(
            result,
            Err(SceneError::CapacityExceeded { resource: ResourceKind::Material, limit: 1 })
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_count_new_ignores_duplicates_within_batch() {
        let mut table = MaterialTable::new(8);
        let grey = Material::default();
        table.intern(&grey, None).unwrap();

        let blue = Material::diffuse(0.0, 0.0, 1.0);
        assert_eq!(table.count_new([&grey, &blue, &blue]), 1);
    }

    #[test]
    fn test_texture_path_loaded_once() {
        let mut textures = TextureTable::new(4);
        let image = ImageData::solid_color(2, 2, [255, 255, 255, 255]);
        let a = textures.insert(PathBuf::from("albedo.png"), image.clone()).unwrap();
        let b = textures.insert(PathBuf::from("albedo.png"), image).unwrap();

        assert_eq!(a, b);
        assert_eq!(textures.len(), 1);
        assert_eq!(textures.pending_uploads().count(), 1);
    }

    #[test]
    fn test_gpu_material_layout() {
        assert_eq!(std::mem::size_of::<GpuMaterial>(), 64);
        let record = GpuMaterial::new(&Material::default(), None);
        assert_eq!(record.diffuse_texture, -1);
    }
}
