//! Sampled textures and the trace output image

use ash::{vk, Device};

use super::buffer::Buffer;
use super::commands::{transition_image_layout, CommandPool};
use super::context::{VulkanContext, VulkanError, VulkanResult};
use crate::device::BufferUsage;
use crate::scene::ImageData;

/// Image with bound memory and a view
struct ImageAllocation {
    image: vk::Image,
    view: vk::ImageView,
    memory: vk::DeviceMemory,
}

fn create_image(
    context: &VulkanContext,
    width: u32,
    height: u32,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
) -> VulkanResult<ImageAllocation> {
    let device = context.raw_device();
    let image_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .extent(vk::Extent3D { width, height, depth: 1 })
        .mip_levels(1)
        .array_layers(1)
        .format(format)
        .tiling(vk::ImageTiling::OPTIMAL)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .usage(usage)
        .samples(vk::SampleCountFlags::TYPE_1)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let image = unsafe { device.create_image(&image_info, None).map_err(VulkanError::Api)? };

    let mem_requirements = unsafe { device.get_image_memory_requirements(image) };
    let memory_type = match context.find_memory_type(mem_requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
        Ok(index) => index,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            return Err(e);
        }
    };
    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(mem_requirements.size)
        .memory_type_index(memory_type);

    let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            return Err(VulkanError::Api(e));
        }
    };

    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    let view = unsafe {
        device
            .bind_image_memory(image, memory, 0)
            .and_then(|_| device.create_image_view(&view_info, None))
    };
    match view {
        Ok(view) => Ok(ImageAllocation { image, view, memory }),
        Err(e) => {
            unsafe {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
            }
            Err(VulkanError::Api(e))
        }
    }
}

/// Sampled RGBA8 texture
pub struct Texture {
    device: Device,
    allocation: ImageAllocation,
    sampler: vk::Sampler,
}

impl Texture {
    /// Upload image data through a staging buffer
    pub fn from_image_data(context: &VulkanContext, pool: &CommandPool, image: &ImageData) -> VulkanResult<Self> {
        let device = context.raw_device().clone();
        let (width, height) = (image.width.max(1), image.height.max(1));

        let staging = Buffer::new(context, image.data.len() as u64, BufferUsage::HOST_WRITE)?;
        staging.write_data(0, &image.data)?;

        let allocation = create_image(
            context,
            width,
            height,
            vk::Format::R8G8B8A8_SRGB,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;

        let mut texture = Self {
            sampler: vk::Sampler::null(),
            allocation,
            device,
        };

        pool.submit_and_wait(context.queue(), u64::MAX, |command_buffer| {
            transition_image_layout(
                &texture.device,
                command_buffer,
                texture.allocation.image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            let region = vk::BufferImageCopy::builder()
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_extent(vk::Extent3D { width, height, depth: 1 })
                .build();
            unsafe {
                texture.device.cmd_copy_buffer_to_image(
                    command_buffer,
                    staging.handle(),
                    texture.allocation.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            transition_image_layout(
                &texture.device,
                command_buffer,
                texture.allocation.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        })?;

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR);

        texture.sampler = unsafe { texture.device.create_sampler(&sampler_info, None).map_err(VulkanError::Api)? };
        Ok(texture)
    }

    /// Image view for descriptor writes
    pub fn view(&self) -> vk::ImageView {
        self.allocation.view
    }

    /// Sampler for descriptor writes
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            if self.sampler != vk::Sampler::null() {
                self.device.destroy_sampler(self.sampler, None);
            }
            self.device.destroy_image_view(self.allocation.view, None);
            self.device.destroy_image(self.allocation.image, None);
            self.device.free_memory(self.allocation.memory, None);
        }
    }
}

/// Storage image written by the trace, kept in `GENERAL` layout
pub struct StorageImage {
    device: Device,
    allocation: ImageAllocation,
    extent: vk::Extent2D,
}

impl StorageImage {
    /// Format of the accumulated radiance
    pub const FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;

    /// Create and transition the output image
    pub fn new(context: &VulkanContext, pool: &CommandPool, width: u32, height: u32) -> VulkanResult<Self> {
        let extent = vk::Extent2D {
            width: width.max(1),
            height: height.max(1),
        };
        let allocation = create_image(
            context,
            extent.width,
            extent.height,
            Self::FORMAT,
            vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST,
        )?;
        let image = Self {
            device: context.raw_device().clone(),
            allocation,
            extent,
        };

        pool.submit_and_wait(context.queue(), u64::MAX, |command_buffer| {
            transition_image_layout(
                &image.device,
                command_buffer,
                image.allocation.image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::GENERAL,
            );
        })?;

        Ok(image)
    }

    /// Image handle
    pub fn image(&self) -> vk::Image {
        self.allocation.image
    }

    /// Image view for descriptor writes
    pub fn view(&self) -> vk::ImageView {
        self.allocation.view
    }

    /// Extent in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for StorageImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.allocation.view, None);
            self.device.destroy_image(self.allocation.image, None);
            self.device.free_memory(self.allocation.memory, None);
        }
    }
}
