//! Vulkan context: the explicit handle every GPU component is created from
//!
//! Owns instance, surface, device and the shared command pools. Buffers,
//! swapchains and pipelines borrow it instead of reaching for global state.

use ash::extensions::khr::Surface;
use ash::{vk, Device, Instance};

use super::device::{LogicalDevice, PhysicalDeviceInfo, QueueFamilyIndices, QueueRole};
use super::instance::VulkanInstance;
use crate::config::RendererConfig;
use crate::render::backends::vulkan::resources::allocator::DeviceAllocator;
use crate::render::backends::vulkan::rendering::commands::CommandPool;
use crate::render::backends::vulkan::VulkanResult;
use crate::render::window::SurfaceWindow;

struct DeviceParts {
    graphics_pool: CommandPool,
    transfer_pool: CommandPool,
    device: LogicalDevice,
    physical_device: PhysicalDeviceInfo,
}

/// Main Vulkan context that owns all core Vulkan resources
///
/// Field order is drop order: pools and allocator go before the device, the
/// instance goes last. The surface is destroyed in `Drop` before any field.
pub struct VulkanContext {
    graphics_pool: CommandPool,
    transfer_pool: CommandPool,
    allocator: DeviceAllocator,
    device: LogicalDevice,
    physical_device: PhysicalDeviceInfo,
    surface: vk::SurfaceKHR,
    surface_loader: Surface,
    instance: VulkanInstance,
}

impl VulkanContext {
    /// Create instance, surface and device for `window`
    pub fn new(window: &mut dyn SurfaceWindow, config: &RendererConfig) -> VulkanResult<Self> {
        let window_extensions = window.required_instance_extensions()?;
        let instance = VulkanInstance::new(
            &config.application_name,
            config.application_version,
            &window_extensions,
            config.validation_enabled(),
        )?;

        let surface_loader = Surface::new(&instance.entry, &instance.instance);
        let surface = window.create_surface(instance.instance.handle())?;

        // The surface has no owner until Self exists; release it by hand on failure
        let parts = match Self::create_device(&instance, &surface_loader, surface, config) {
            Ok(parts) => parts,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };
        let DeviceParts {
            graphics_pool,
            transfer_pool,
            device,
            physical_device,
        } = parts;
        let allocator = DeviceAllocator::new(device.device.clone(), physical_device.memory_properties);

        Ok(Self {
            graphics_pool,
            transfer_pool,
            allocator,
            device,
            physical_device,
            surface,
            surface_loader,
            instance,
        })
    }

    fn create_device(
        instance: &VulkanInstance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
        config: &RendererConfig,
    ) -> VulkanResult<DeviceParts> {
        let physical_device = PhysicalDeviceInfo::select(&instance.instance, &config.device)?;
        let families = physical_device.resolve_queue_families(surface_loader, surface)?;
        let device = LogicalDevice::new(&instance.instance, &physical_device, families)?;
        let graphics_pool = CommandPool::resettable(device.device.clone(), families.graphics)?;
        let transfer_pool = CommandPool::transient(device.device.clone(), families.transfer)?;

        Ok(DeviceParts {
            graphics_pool,
            transfer_pool,
            device,
            physical_device,
        })
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance.instance
    }

    /// Get the logical device
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Get the logical device wrapper
    pub fn logical_device(&self) -> &LogicalDevice {
        &self.device
    }

    /// Selected physical device
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Resolved queue families
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.device.families
    }

    /// Queue serving `role`
    pub fn queue(&self, role: QueueRole) -> vk::Queue {
        self.device.queue(role)
    }

    /// Presentation surface
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Surface extension loader
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Memory allocator
    pub fn allocator(&self) -> &DeviceAllocator {
        &self.allocator
    }

    /// Pool for per-frame graphics command buffers
    pub fn graphics_pool(&self) -> &CommandPool {
        &self.graphics_pool
    }

    /// Pool for one-shot transfer command buffers
    pub fn transfer_pool(&self) -> &CommandPool {
        &self.transfer_pool
    }

    /// Block until the device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.device.wait_idle()
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        log::debug!("Destroying Vulkan context");
        unsafe {
            let _ = self.device.device.device_wait_idle();
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
