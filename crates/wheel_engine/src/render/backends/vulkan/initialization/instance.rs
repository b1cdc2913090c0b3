//! Vulkan instance creation, layer/extension checks and the debug messenger

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};
use std::ffi::{c_char, CStr, CString};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Name of the Khronos validation layer
pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

const ENGINE_NAME: &str = "Wheel";

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create a Vulkan 1.3 instance
    ///
    /// `window_extensions` are the extensions the window system needs for
    /// presentation. When `enable_validation` is set but the layer is not
    /// installed, a warning is logged and validation stays off.
    pub fn new(
        app_name: &str,
        app_version: (u32, u32, u32),
        window_extensions: &[String],
        enable_validation: bool,
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let available_layers: Vec<String> = entry
            .enumerate_instance_layer_properties()?
            .iter()
            .map(|layer| c_chars_to_string(&layer.layer_name))
            .collect();
        let validation = enable_validation && {
            let present = available_layers.iter().any(|name| name == VALIDATION_LAYER);
            if !present {
                log::warn!("{} requested but not installed; continuing without validation", VALIDATION_LAYER);
            }
            present
        };

        let mut extension_names: Vec<String> = window_extensions.to_vec();
        if validation {
            extension_names.push(DebugUtils::name().to_string_lossy().into_owned());
        }
        let layer_names: Vec<String> = if validation {
            vec![VALIDATION_LAYER.to_string()]
        } else {
            Vec::new()
        };

        let available_extensions: Vec<String> = entry
            .enumerate_instance_extension_properties(None)?
            .iter()
            .map(|ext| c_chars_to_string(&ext.extension_name))
            .collect();
        if let Some(missing) = first_missing(&extension_names, &available_extensions) {
            return Err(VulkanError::MissingExtension(missing.to_string()));
        }
        if let Some(missing) = first_missing(&layer_names, &available_layers) {
            return Err(VulkanError::MissingLayer(missing.to_string()));
        }

        let app_name_cstr = to_cstring(app_name)?;
        let engine_name_cstr = to_cstring(ENGINE_NAME)?;
        let (major, minor, patch) = app_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let extension_cstrs = extension_names
            .iter()
            .map(|name| to_cstring(name))
            .collect::<VulkanResult<Vec<_>>>()?;
        let layer_cstrs = layer_names
            .iter()
            .map(|name| to_cstring(name))
            .collect::<VulkanResult<Vec<_>>>()?;
        let extension_ptrs: Vec<*const c_char> = extension_cstrs.iter().map(|s| s.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = layer_cstrs.iter().map(|s| s.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None)? };
        log::info!(
            "Created Vulkan instance (validation {})",
            if validation { "on" } else { "off" }
        );

        let debug = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self { entry, instance, debug })
    }

    /// Whether the debug messenger is installed
    pub fn validation_enabled(&self) -> bool {
        self.debug.is_some()
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        Ok(unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? })
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::trace!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// First entry of `required` not present in `available`
pub fn first_missing<'a>(required: &'a [String], available: &[String]) -> Option<&'a str> {
    required
        .iter()
        .find(|name| !available.contains(name))
        .map(String::as_str)
}

/// Convert a fixed-size, NUL-terminated name array from Vulkan
pub(crate) fn c_chars_to_string(raw: &[c_char]) -> String {
    let bytes: Vec<u8> = raw.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn to_cstring(name: &str) -> VulkanResult<CString> {
    CString::new(name).map_err(|_| VulkanError::InitializationFailed(format!("Name contains NUL: {name:?}")))
}
