// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use ash::ext::{debug_utils, validation_features};
use ash::{vk, Entry, Instance};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

static BREAK_ON_ERROR: AtomicBool = AtomicBool::new(false);

pub(crate) struct DebugMessenger {
    loader: debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub(crate) unsafe fn destroy(self) {
        self.loader.destroy_debug_utils_messenger(self.handle, None);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Severity {
    Error,
    Warning,
    Info,
    Verbose,
}

fn classify(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Severity {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Severity::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Severity::Warning
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Severity::Info
    } else {
        Severity::Verbose
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    match classify(severity) {
        Severity::Error => {
            error!(target: "vulkan", ?types, "{msg}");
            if BREAK_ON_ERROR.load(Ordering::Relaxed) {
                std::process::abort();
            }
        }
        Severity::Warning => warn!(target: "vulkan", ?types, "{msg}"),
        Severity::Info => info!(target: "vulkan", ?types, "{msg}"),
        Severity::Verbose => debug!(target: "vulkan", ?types, "{msg}"),
    }
    vk::FALSE
}

unsafe fn has_layer(entry: &Entry, name: &CStr) -> Result<bool> {
    let layers = entry
        .enumerate_instance_layer_properties()
        .context("enumerate_instance_layer_properties")?;
    Ok(layers
        .iter()
        .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == name))
}

unsafe fn has_instance_extension(entry: &Entry, name: &CStr) -> bool {
    entry
        .enumerate_instance_extension_properties(None)
        .unwrap_or_default()
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == name)
}

/// Instance with the platform's WSI extensions. With `validate`, also the
/// Khronos validation layer and debug utils; a missing layer is fatal.
pub(crate) unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    validate: bool,
    checks_disabled: bool,
) -> Result<Instance> {
    let app = c"vkcube";
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: app.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let mut ext_vec = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();

    let mut layers = Vec::new();
    if validate {
        if !has_layer(entry, VALIDATION_LAYER)? {
            bail!("validation requested but {VALIDATION_LAYER:?} is not installed");
        }
        layers.push(VALIDATION_LAYER.as_ptr());
        ext_vec.push(debug_utils::NAME.as_ptr());
    }

    let disabled = [vk::ValidationFeatureDisableEXT::ALL];
    let features = vk::ValidationFeaturesEXT {
        s_type: vk::StructureType::VALIDATION_FEATURES_EXT,
        disabled_validation_feature_count: disabled.len() as u32,
        p_disabled_validation_features: disabled.as_ptr(),
        ..Default::default()
    };
    let disable_checks = validate && checks_disabled;
    if disable_checks {
        if !has_instance_extension(entry, validation_features::NAME) {
            bail!("--validate-checks-disabled needs VK_EXT_validation_features");
        }
        ext_vec.push(validation_features::NAME.as_ptr());
    }

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_next: if disable_checks {
            (&features as *const vk::ValidationFeaturesEXT).cast()
        } else {
            std::ptr::null()
        },
        p_application_info: &app_info,
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        enabled_extension_count: ext_vec.len() as u32,
        pp_enabled_extension_names: ext_vec.as_ptr(),
        ..Default::default()
    };

    let instance = entry
        .create_instance(&create_info, None)
        .context("create_instance")?;
    info!(validate, checks_disabled = disable_checks, "vulkan instance created");
    Ok(instance)
}

/// Routes validation output into `tracing`. With `use_break`, the first
/// validation error aborts the process so a debugger stops on it.
pub(crate) unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &Instance,
    use_break: bool,
) -> Result<DebugMessenger> {
    BREAK_ON_ERROR.store(use_break, Ordering::Relaxed);
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let handle = loader
        .create_debug_utils_messenger(&ci, None)
        .context("create_debug_utils_messenger")?;
    Ok(DebugMessenger { loader, handle })
}
