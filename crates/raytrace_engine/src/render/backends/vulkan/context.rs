//! Vulkan context management
//!
//! Instance, physical-device selection and logical-device creation for ray
//! tracing. The context is headless: presentation belongs to the caller's
//! [`PresentationTarget`](crate::render::PresentationTarget), so no surface
//! or swapchain extension is requested.

use std::ffi::{CStr, CString};

use ash::extensions::khr::{AccelerationStructure, DeferredHostOperations, RayTracingPipeline};
#[cfg(debug_assertions)]
use ash::extensions::ext::DebugUtils;
use ash::{vk, Device, Entry, Instance};
use thiserror::Error;

use crate::device::DeviceError;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Resource with specified ID could not be found
    #[error("Resource not found: {id}")]
    ResourceNotFound {
        /// The unique identifier of the resource
        id: u64,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Memory allocation failed
    #[error("Out of memory: {requested} bytes")]
    OutOfMemory {
        /// Number of bytes that were requested
        requested: u64,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

impl VulkanError {
    /// Convert into a device error naming the failed operation
    pub fn during(self, operation: &'static str) -> DeviceError {
        match self {
            VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            | VulkanError::Api(vk::Result::ERROR_OUT_OF_HOST_MEMORY) => DeviceError::OutOfMemory {
                label: operation.to_string(),
                requested: 0,
            },
            VulkanError::Api(vk::Result::TIMEOUT) => DeviceError::Timeout(operation.to_string()),
            VulkanError::OutOfMemory { requested } => DeviceError::OutOfMemory {
                label: operation.to_string(),
                requested,
            },
            VulkanError::NoSuitableMemoryType => DeviceError::NoSuitableMemoryType,
            VulkanError::InitializationFailed(reason) => DeviceError::InitializationFailed(reason),
            other => DeviceError::operation(operation, other.to_string()),
        }
    }
}

impl From<VulkanError> for DeviceError {
    fn from(error: VulkanError) -> Self {
        error.during("vulkan")
    }
}

fn c_string(value: &str) -> VulkanResult<CString> {
    CString::new(value).map_err(|e| VulkanError::InitializationFailed(format!("Invalid name '{}': {}", value, e)))
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Debug utilities extension (debug builds)
    #[cfg(debug_assertions)]
    pub debug_utils: Option<DebugUtils>,
    /// Debug messenger handle (debug builds)
    #[cfg(debug_assertions)]
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Create a Vulkan 1.2 instance, optionally with validation layers
    pub fn new(app_name: &str, app_version: (u32, u32, u32), enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

        let app_name_cstr = c_string(app_name)?;
        let engine_name_cstr = c_string("RaytraceEngine")?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, app_version.0, app_version.1, app_version.2))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        #[allow(unused_mut)] // Mutable in debug builds for adding debug extensions
        let mut extensions: Vec<*const std::os::raw::c_char> = Vec::new();
        #[cfg(debug_assertions)]
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if cfg!(debug_assertions) && enable_validation {
            vec![c_string("VK_LAYER_KHRONOS_validation")?]
        } else {
            vec![]
        };
        let layer_names_ptrs: Vec<*const std::os::raw::c_char> = layer_names.iter().map(|name| name.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None).map_err(VulkanError::Api)? };

        #[cfg(debug_assertions)]
        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let debug_messenger = Self::setup_debug_messenger(&debug_utils)?;
            (Some(debug_utils), Some(debug_messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            #[cfg(debug_assertions)]
            debug_utils,
            #[cfg(debug_assertions)]
            debug_messenger,
        })
    }

    #[cfg(debug_assertions)]
    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            #[cfg(debug_assertions)]
            if let (Some(debug_utils), Some(debug_messenger)) = (&self.debug_utils, &self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(*debug_messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
#[cfg(debug_assertions)]
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let callback_data = *callback_data;
    let message = CStr::from_ptr(callback_data.p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Device extensions required for ray tracing
fn required_device_extensions() -> [&'static CStr; 3] {
    [
        AccelerationStructure::name(),
        RayTracingPipeline::name(),
        DeferredHostOperations::name(),
    ]
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Acceleration-structure limits
    pub acceleration_properties: vk::PhysicalDeviceAccelerationStructurePropertiesKHR,
    /// Index of the queue family used for builds and traces
    pub queue_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select the first device supporting ray tracing
    pub fn select_suitable_device(instance: &Instance) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };

        for device in devices {
            match Self::evaluate_device(instance, device) {
                Ok(device_info) => {
                    log::info!("Selected GPU: {}", unsafe {
                        CStr::from_ptr(device_info.properties.device_name.as_ptr()).to_string_lossy()
                    });
                    return Ok(device_info);
                }
                Err(e) => log::debug!("Skipping GPU: {}", e),
            }
        }

        Err(VulkanError::InitializationFailed("No GPU with ray tracing support found".to_string()))
    }

    fn evaluate_device(instance: &Instance, device: vk::PhysicalDevice) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let queue_family = queue_families
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE))
            .ok_or_else(|| VulkanError::InitializationFailed("No graphics/compute queue family found".to_string()))?
            as u32;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device).map_err(VulkanError::Api)? };
        let missing: Vec<_> = required_device_extensions()
            .iter()
            .filter(|required| {
                !extensions.iter().any(|available| {
                    let extension_name = unsafe { CStr::from_ptr(available.extension_name.as_ptr()) };
                    extension_name == **required
                })
            })
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        if !missing.is_empty() {
            return Err(VulkanError::InitializationFailed(format!(
                "Missing device extensions: {}",
                missing.join(", ")
            )));
        }

        let mut acceleration_properties = vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
        let mut properties2 = vk::PhysicalDeviceProperties2::builder().push_next(&mut acceleration_properties);
        unsafe { instance.get_physical_device_properties2(device, &mut properties2) };

        Ok(Self {
            device,
            properties,
            acceleration_properties,
            queue_family,
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Queue used for builds, uploads and traces
    pub queue: vk::Queue,
    /// Queue family of `queue`
    pub queue_family: u32,
    /// Acceleration-structure extension loader
    pub acceleration: AccelerationStructure,
}

impl LogicalDevice {
    /// Create a device with the ray tracing feature chain enabled
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical_device_info.queue_family)
            .queue_priorities(&priorities)
            .build()];

        let extension_names: Vec<*const std::os::raw::c_char> =
            required_device_extensions().iter().map(|name| name.as_ptr()).collect();

        let mut address_features = vk::PhysicalDeviceBufferDeviceAddressFeatures::builder().buffer_device_address(true);
        let mut acceleration_features =
            vk::PhysicalDeviceAccelerationStructureFeaturesKHR::builder().acceleration_structure(true);
        let mut pipeline_features = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::builder().ray_tracing_pipeline(true);
        let device_features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true).build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&device_features)
            .push_next(&mut address_features)
            .push_next(&mut acceleration_features)
            .push_next(&mut pipeline_features);

        let device = unsafe {
            instance
                .create_device(physical_device_info.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };
        let queue = unsafe { device.get_device_queue(physical_device_info.queue_family, 0) };
        let acceleration = AccelerationStructure::new(instance, &device);

        Ok(Self {
            device,
            queue,
            queue_family: physical_device_info.queue_family,
            acceleration,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Main Vulkan context that owns all core Vulkan resources
///
/// Fields drop in declaration order: device before instance.
pub struct VulkanContext {
    /// Logical device and queue
    pub device: LogicalDevice,
    /// Selected physical device information
    pub physical_device: PhysicalDeviceInfo,
    /// Memory types of the physical device
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Vulkan instance and debug utilities
    pub instance: VulkanInstance,
}

impl VulkanContext {
    /// Create a headless ray tracing context
    pub fn new(app_name: &str, app_version: (u32, u32, u32), enable_validation: bool) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(app_name, app_version, enable_validation)?;
        let physical_device = PhysicalDeviceInfo::select_suitable_device(&instance.instance)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device)?;
        let memory_properties = unsafe {
            instance
                .instance
                .get_physical_device_memory_properties(physical_device.device)
        };

        Ok(Self {
            device,
            physical_device,
            memory_properties,
            instance,
        })
    }

    /// Get the raw Device handle
    pub fn raw_device(&self) -> &Device {
        &self.device.device
    }

    /// Acceleration-structure extension loader
    pub fn acceleration(&self) -> &AccelerationStructure {
        &self.device.acceleration
    }

    /// Queue used for all submissions
    pub fn queue(&self) -> vk::Queue {
        self.device.queue
    }

    /// Queue family of [`queue`](Self::queue)
    pub fn queue_family(&self) -> u32 {
        self.device.queue_family
    }

    /// Required alignment of scratch buffer addresses
    pub fn scratch_alignment(&self) -> u64 {
        u64::from(
            self.physical_device
                .acceleration_properties
                .min_acceleration_structure_scratch_offset_alignment
                .max(1),
        )
    }

    /// Find a memory type with the required properties
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        let memory = &self.memory_properties;
        (0..memory.memory_type_count)
            .find(|&i| {
                (type_filter & (1 << i)) != 0 && memory.memory_types[i as usize].property_flags.contains(properties)
            })
            .ok_or(VulkanError::NoSuitableMemoryType)
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.raw_device().device_wait_idle().map_err(VulkanError::Api) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_memory_maps_to_device_out_of_memory() {
        let error = VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).during("create_buffer");
        assert!(matches!(error, DeviceError::OutOfMemory { .. }));
    }

    #[test]
    fn test_timeout_maps_to_device_timeout() {
        let error = VulkanError::Api(vk::Result::TIMEOUT).during("wait_signal");
        assert!(matches!(error, DeviceError::Timeout(op) if op == "wait_signal"));
    }

    #[test]
    fn test_other_errors_keep_operation_name() {
        match VulkanError::Api(vk::Result::ERROR_DEVICE_LOST).during("build_structures") {
            DeviceError::OperationFailed { operation, .. } => assert_eq!(operation, "build_structures"),
            other => panic!("Unexpected mapping {:?}", other),
        }
    }
}
