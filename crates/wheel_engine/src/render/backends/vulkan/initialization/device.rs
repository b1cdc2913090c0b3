//! Physical device selection, queue-family negotiation and the logical device
//!
//! Selection and family resolution are plain functions over the properties
//! Vulkan reports, so the policy can be exercised without a GPU. The
//! [`PhysicalDeviceInfo`] and [`LogicalDevice`] wrappers feed them from a real
//! instance.

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Instance};
use std::fmt;

use super::instance::c_chars_to_string;
use crate::config::DeviceRequirements;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Logical role a queue plays in the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    /// Draw commands
    Graphics,
    /// Swapchain presentation
    Present,
    /// Compute dispatches
    Compute,
    /// Buffer uploads
    Transfer,
}

impl QueueRole {
    /// Roles in the order they are assigned queue slots
    pub const ALL: [Self; 4] = [Self::Graphics, Self::Present, Self::Compute, Self::Transfer];

    /// Priority of this role's slot when it shares a family already in use
    fn shared_priority(self) -> f32 {
        match self {
            Self::Graphics | Self::Compute => 1.0,
            Self::Present => 0.25,
            Self::Transfer => 0.5,
        }
    }
}

impl fmt::Display for QueueRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Graphics => "graphics",
            Self::Present => "present",
            Self::Compute => "compute",
            Self::Transfer => "transfer",
        };
        f.write_str(name)
    }
}

/// Queue-family index per role, after fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Graphics family
    pub graphics: u32,
    /// Presentation family
    pub present: u32,
    /// Compute family; the graphics family when no dedicated one exists
    pub compute: u32,
    /// Transfer family; the graphics family when no dedicated one exists
    pub transfer: u32,
}

impl QueueFamilyIndices {
    /// Resolve every role from the family list
    ///
    /// The first graphics-capable family wins. Compute and transfer are only
    /// taken from families without graphics support, first match each.
    /// Presentation prefers the graphics family, then any family that can do
    /// both (which then also becomes the graphics family), then any family
    /// that can present at all.
    pub fn resolve(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> VulkanResult<bool>,
    ) -> VulkanResult<Self> {
        let mut graphics = None;
        let mut compute = None;
        let mut transfer = None;

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            let flags = family.queue_flags;
            if flags.contains(vk::QueueFlags::GRAPHICS) {
                graphics.get_or_insert(index);
            } else if flags.contains(vk::QueueFlags::COMPUTE) {
                compute.get_or_insert(index);
            } else if flags.contains(vk::QueueFlags::TRANSFER) {
                transfer.get_or_insert(index);
            }
        }

        let mut graphics = graphics.ok_or(VulkanError::QueueFamilyNotFound(QueueRole::Graphics))?;

        let present = if supports_present(graphics)? {
            graphics
        } else {
            let mut found = None;
            for index in graphics + 1..families.len() as u32 {
                let can_draw = families[index as usize].queue_flags.contains(vk::QueueFlags::GRAPHICS);
                if can_draw && supports_present(index)? {
                    graphics = index;
                    found = Some(index);
                    break;
                }
            }
            if found.is_none() {
                for index in 0..families.len() as u32 {
                    if supports_present(index)? {
                        found = Some(index);
                        break;
                    }
                }
            }
            found.ok_or(VulkanError::QueueFamilyNotFound(QueueRole::Present))?
        };

        Ok(Self {
            graphics,
            present,
            compute: compute.unwrap_or(graphics),
            transfer: transfer.unwrap_or(graphics),
        })
    }

    /// Family serving `role`
    pub fn family(&self, role: QueueRole) -> u32 {
        match role {
            QueueRole::Graphics => self.graphics,
            QueueRole::Present => self.present,
            QueueRole::Compute => self.compute,
            QueueRole::Transfer => self.transfer,
        }
    }
}

/// Where a role's queue lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSlot {
    /// Queue family index
    pub family: u32,
    /// Queue index within the family
    pub index: u32,
}

/// Queue slots requested from one family
#[derive(Debug, Clone, PartialEq)]
pub struct QueueFamilyRequest {
    /// Queue family index
    pub family: u32,
    /// One priority per requested queue
    pub priorities: Vec<f32>,
}

/// Device queue-create plan: one request per distinct family, one slot per role
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePlan {
    /// Requests in first-use order
    pub requests: Vec<QueueFamilyRequest>,
    slots: [QueueSlot; 4],
}

impl QueuePlan {
    /// Lay out queue slots for the resolved families
    ///
    /// A role opening a family gets slot 0 at priority 1.0. A role landing in
    /// a family that is already used takes the next slot at its shared
    /// priority; once the family's queue count is exhausted the last slot is
    /// reused.
    pub fn new(indices: &QueueFamilyIndices, families: &[vk::QueueFamilyProperties]) -> Self {
        let mut requests: Vec<QueueFamilyRequest> = Vec::new();
        let mut slots = [QueueSlot { family: 0, index: 0 }; 4];

        for (slot, role) in slots.iter_mut().zip(QueueRole::ALL) {
            let family = indices.family(role);
            let capacity = families
                .get(family as usize)
                .map_or(1, |props| props.queue_count.max(1)) as usize;

            let index = match requests.iter_mut().find(|request| request.family == family) {
                Some(request) if request.priorities.len() < capacity => {
                    request.priorities.push(role.shared_priority());
                    request.priorities.len() - 1
                }
                Some(_) => capacity - 1,
                None => {
                    requests.push(QueueFamilyRequest {
                        family,
                        priorities: vec![1.0],
                    });
                    0
                }
            };

            *slot = QueueSlot {
                family,
                index: index as u32,
            };
        }

        Self { requests, slots }
    }

    /// Slot assigned to `role`
    pub fn slot(&self, role: QueueRole) -> QueueSlot {
        let position = QueueRole::ALL.iter().position(|r| *r == role).unwrap_or(0);
        self.slots[position]
    }
}

/// What selection needs to know about one enumerated GPU
#[derive(Debug, Clone, Copy)]
pub struct DeviceCandidate {
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Whether `VK_KHR_swapchain` is available
    pub supports_swapchain: bool,
}

impl DeviceCandidate {
    /// Check the candidate against the selection policy
    pub fn is_suitable(&self, requirements: &DeviceRequirements) -> bool {
        let discrete = self.properties.device_type == vk::PhysicalDeviceType::DISCRETE_GPU;
        let geometry = self.features.geometry_shader == vk::TRUE;
        let api_ok = vk::api_version_major(self.properties.api_version) > 1
            || vk::api_version_minor(self.properties.api_version) >= 3;

        (discrete || !requirements.require_discrete)
            && (geometry || !requirements.require_geometry_shader)
            && api_ok
            && self.supports_swapchain
    }

    /// Device name as reported by the driver
    pub fn name(&self) -> String {
        c_chars_to_string(&self.properties.device_name)
    }
}

/// Index of the first suitable candidate in enumeration order
pub fn select_device_index(
    candidates: &[DeviceCandidate],
    requirements: &DeviceRequirements,
) -> VulkanResult<usize> {
    candidates
        .iter()
        .position(|candidate| candidate.is_suitable(requirements))
        .ok_or(VulkanError::NoSuitableDevice {
            examined: candidates.len(),
        })
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Available queue families
    pub queue_families: Vec<vk::QueueFamilyProperties>,
}

impl PhysicalDeviceInfo {
    /// Select the first GPU that satisfies `requirements`
    pub fn select(instance: &Instance, requirements: &DeviceRequirements) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices()? };

        let mut candidates = Vec::with_capacity(devices.len());
        for &device in &devices {
            let extensions = unsafe { instance.enumerate_device_extension_properties(device)? };
            let swapchain_name = SwapchainLoader::name().to_string_lossy();
            let supports_swapchain = extensions
                .iter()
                .any(|ext| c_chars_to_string(&ext.extension_name) == swapchain_name);

            let candidate = DeviceCandidate {
                properties: unsafe { instance.get_physical_device_properties(device) },
                features: unsafe { instance.get_physical_device_features(device) },
                supports_swapchain,
            };
            log::debug!(
                "Found GPU '{}' ({:?}), suitable: {}",
                candidate.name(),
                candidate.properties.device_type,
                candidate.is_suitable(requirements)
            );
            candidates.push(candidate);
        }

        let chosen = select_device_index(&candidates, requirements)?;
        let device = devices[chosen];
        let candidate = candidates[chosen];
        log::info!("Selected GPU: {}", candidate.name());

        Ok(Self {
            device,
            properties: candidate.properties,
            features: candidate.features,
            memory_properties: unsafe { instance.get_physical_device_memory_properties(device) },
            queue_families: unsafe { instance.get_physical_device_queue_family_properties(device) },
        })
    }

    /// Resolve queue families against `surface`
    pub fn resolve_queue_families(
        &self,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<QueueFamilyIndices> {
        QueueFamilyIndices::resolve(&self.queue_families, |family| unsafe {
            Ok(surface_loader.get_physical_device_surface_support(self.device, family, surface)?)
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Resolved family per role
    pub families: QueueFamilyIndices,
    /// Swapchain extension loader
    pub swapchain_loader: SwapchainLoader,
    queues: [vk::Queue; 4],
}

impl LogicalDevice {
    /// Create the logical device and fetch one queue per role
    pub fn new(
        instance: &Instance,
        physical: &PhysicalDeviceInfo,
        families: QueueFamilyIndices,
    ) -> VulkanResult<Self> {
        let plan = QueuePlan::new(&families, &physical.queue_families);
        log::debug!("Queue plan: {:?}", plan);

        // Priorities are borrowed by the create infos below
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = plan
            .requests
            .iter()
            .map(|request| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(request.family)
                    .queue_priorities(&request.priorities)
                    .build()
            })
            .collect();

        let extensions = [SwapchainLoader::name().as_ptr()];
        let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::builder()
            .dynamic_rendering(true)
            .synchronization2(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .push_next(&mut vulkan13_features);

        let device = unsafe { instance.create_device(physical.device, &create_info, None)? };

        let mut queues = [vk::Queue::null(); 4];
        for (queue, role) in queues.iter_mut().zip(QueueRole::ALL) {
            let slot = plan.slot(role);
            *queue = unsafe { device.get_device_queue(slot.family, slot.index) };
        }

        let swapchain_loader = SwapchainLoader::new(instance, &device);
        log::info!(
            "Created logical device (graphics {}, present {}, compute {}, transfer {})",
            families.graphics,
            families.present,
            families.compute,
            families.transfer
        );

        Ok(Self {
            device,
            families,
            swapchain_loader,
            queues,
        })
    }

    /// Queue serving `role`
    pub fn queue(&self, role: QueueRole) -> vk::Queue {
        let position = QueueRole::ALL.iter().position(|r| *r == role).unwrap_or(0);
        self.queues[position]
    }

    /// Block until every queue is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
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

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    fn all_flags() -> vk::QueueFlags {
        vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER
    }

    fn candidate(device_type: vk::PhysicalDeviceType, geometry: bool) -> DeviceCandidate {
        let properties = vk::PhysicalDeviceProperties {
            device_type,
            api_version: vk::API_VERSION_1_3,
            ..Default::default()
        };
        let features = vk::PhysicalDeviceFeatures {
            geometry_shader: if geometry { vk::TRUE } else { vk::FALSE },
            ..Default::default()
        };
        DeviceCandidate {
            properties,
            features,
            supports_swapchain: true,
        }
    }

    /// Test a GPU with one do-everything family gets all four roles there
    #[test]
    fn test_single_family_serves_every_role() {
        let families = [family(all_flags(), 16)];
        let indices = QueueFamilyIndices::resolve(&families, |_| Ok(true)).unwrap();

        assert_eq!(
            indices,
            QueueFamilyIndices {
                graphics: 0,
                present: 0,
                compute: 0,
                transfer: 0
            }
        );

        let plan = QueuePlan::new(&indices, &families);
        assert_eq!(plan.requests.len(), 1);
        assert_eq!(plan.requests[0].priorities, vec![1.0, 0.25, 1.0, 0.5]);
        let slots: Vec<u32> = QueueRole::ALL.iter().map(|r| plan.slot(*r).index).collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }

    /// Test slots stop growing at the family's queue count
    #[test]
    fn test_plan_clamps_to_family_capacity() {
        let families = [family(all_flags(), 2)];
        let indices = QueueFamilyIndices::resolve(&families, |_| Ok(true)).unwrap();
        let plan = QueuePlan::new(&indices, &families);

        assert_eq!(plan.requests[0].priorities, vec![1.0, 0.25]);
        assert_eq!(plan.slot(QueueRole::Graphics).index, 0);
        assert_eq!(plan.slot(QueueRole::Present).index, 1);
        assert_eq!(plan.slot(QueueRole::Compute).index, 1);
        assert_eq!(plan.slot(QueueRole::Transfer).index, 1);
    }

    #[test]
    fn test_dedicated_compute_and_transfer_families() {
        let families = [
            family(all_flags(), 16),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 8),
            family(vk::QueueFlags::TRANSFER, 2),
        ];
        let indices = QueueFamilyIndices::resolve(&families, |i| Ok(i == 0)).unwrap();

        assert_eq!(indices.graphics, 0);
        assert_eq!(indices.present, 0);
        assert_eq!(indices.compute, 1);
        assert_eq!(indices.transfer, 2);

        let plan = QueuePlan::new(&indices, &families);
        let requested: Vec<u32> = plan.requests.iter().map(|r| r.family).collect();
        assert_eq!(requested, vec![0, 1, 2]);
        assert_eq!(plan.slot(QueueRole::Compute), QueueSlot { family: 1, index: 0 });
        assert_eq!(plan.slot(QueueRole::Transfer), QueueSlot { family: 2, index: 0 });
    }

    /// Test discovery picks the first dedicated family of each kind
    #[test]
    fn test_first_match_wins() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(all_flags(), 1),
            family(all_flags(), 1),
            family(vk::QueueFlags::TRANSFER, 1),
        ];
        let indices = QueueFamilyIndices::resolve(&families, |_| Ok(true)).unwrap();
        assert_eq!(indices.graphics, 1);
        assert_eq!(indices.transfer, 0);
        assert_eq!(indices.compute, 1);
    }

    /// Test present moves graphics to a family that can do both
    #[test]
    fn test_present_prefers_combined_family() {
        let families = [
            family(all_flags(), 1),
            family(vk::QueueFlags::TRANSFER, 1),
            family(all_flags(), 1),
        ];
        let indices = QueueFamilyIndices::resolve(&families, |i| Ok(i != 0)).unwrap();
        assert_eq!(indices.graphics, 2);
        assert_eq!(indices.present, 2);
        assert_eq!(indices.compute, 2);
        assert_eq!(indices.transfer, 1);
    }

    #[test]
    fn test_present_only_family() {
        let families = [family(all_flags(), 4), family(vk::QueueFlags::TRANSFER, 1)];
        let indices = QueueFamilyIndices::resolve(&families, |i| Ok(i == 1)).unwrap();
        assert_eq!(indices.graphics, 0);
        assert_eq!(indices.present, 1);

        let plan = QueuePlan::new(&indices, &families);
        assert_eq!(plan.slot(QueueRole::Present), QueueSlot { family: 1, index: 0 });
        // transfer shares the present family here
        assert_eq!(plan.slot(QueueRole::Transfer), QueueSlot { family: 1, index: 0 });
        assert_eq!(plan.requests[1].priorities, vec![1.0]);
    }

    #[test]
    fn test_missing_graphics_is_fatal() {
        let families = [family(vk::QueueFlags::COMPUTE, 1)];
        let result = QueueFamilyIndices::resolve(&families, |_| Ok(true));
        assert!(matches!(result, Err(VulkanError::QueueFamilyNotFound(QueueRole::Graphics))));
    }

    #[test]
    fn test_missing_present_is_fatal() {
        let families = [family(all_flags(), 1)];
        let result = QueueFamilyIndices::resolve(&families, |_| Ok(false));
        assert!(matches!(result, Err(VulkanError::QueueFamilyNotFound(QueueRole::Present))));
    }

    /// Test an empty device list fails before anything else happens
    #[test]
    fn test_zero_devices() {
        let result = select_device_index(&[], &DeviceRequirements::default());
        assert!(matches!(result, Err(VulkanError::NoSuitableDevice { examined: 0 })));
    }

    #[test]
    fn test_selection_policy() {
        let candidates = [
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, true),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU, false),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU, true),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU, true),
        ];
        let strict = DeviceRequirements::default();
        assert_eq!(select_device_index(&candidates, &strict).unwrap(), 2);

        let relaxed = DeviceRequirements {
            require_discrete: false,
            require_geometry_shader: true,
        };
        assert_eq!(select_device_index(&candidates, &relaxed).unwrap(), 0);

        let only_integrated = [candidate(vk::PhysicalDeviceType::INTEGRATED_GPU, true)];
        assert!(matches!(
            select_device_index(&only_integrated, &strict),
            Err(VulkanError::NoSuitableDevice { examined: 1 })
        ));
    }

    #[test]
    fn test_old_api_version_rejected() {
        let mut old = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, true);
        old.properties.api_version = vk::API_VERSION_1_2;
        assert!(!old.is_suitable(&DeviceRequirements::default()));

        let mut no_swapchain = candidate(vk::PhysicalDeviceType::DISCRETE_GPU, true);
        no_swapchain.supports_swapchain = false;
        assert!(!no_swapchain.is_suitable(&DeviceRequirements::default()));
    }
}
