//! LADSPA plugin probing: load a shared object and read control port
//! metadata (names, bounds, defaults) straight from its descriptor
//! table, without instantiating the plugin.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_ulong, c_void};
use std::path::Path;

use libloading::{Library, Symbol};

use fretline_types::PortSpec;

// Port descriptor bits
const PORT_INPUT: c_int = 0x1;
const PORT_CONTROL: c_int = 0x4;

// Range hint bits
const HINT_BOUNDED_BELOW: c_int = 0x1;
const HINT_BOUNDED_ABOVE: c_int = 0x2;
const HINT_TOGGLED: c_int = 0x4;
const HINT_SAMPLE_RATE: c_int = 0x8;
const HINT_LOGARITHMIC: c_int = 0x10;
const HINT_INTEGER: c_int = 0x20;
const HINT_DEFAULT_MASK: c_int = 0x3C0;
const HINT_DEFAULT_MINIMUM: c_int = 0x40;
const HINT_DEFAULT_LOW: c_int = 0x80;
const HINT_DEFAULT_MIDDLE: c_int = 0xC0;
const HINT_DEFAULT_HIGH: c_int = 0x100;
const HINT_DEFAULT_MAXIMUM: c_int = 0x140;
const HINT_DEFAULT_0: c_int = 0x200;
const HINT_DEFAULT_1: c_int = 0x240;
const HINT_DEFAULT_100: c_int = 0x280;
const HINT_DEFAULT_440: c_int = 0x2C0;

#[repr(C)]
struct PortRangeHint {
    hint_descriptor: c_int,
    lower_bound: f32,
    upper_bound: f32,
}

/// Prefix of the LADSPA_Descriptor struct; the trailing function
/// pointers are opaque because probing never calls them.
#[repr(C)]
struct Descriptor {
    unique_id: c_ulong,
    label: *const c_char,
    properties: c_int,
    name: *const c_char,
    maker: *const c_char,
    copyright: *const c_char,
    port_count: c_ulong,
    port_descriptors: *const c_int,
    port_names: *const *const c_char,
    port_range_hints: *const PortRangeHint,
    implementation_data: *mut c_void,
    instantiate: *const c_void,
    connect_port: *const c_void,
    activate: *const c_void,
    run: *const c_void,
    run_adding: *const c_void,
    set_run_adding_gain: *const c_void,
    deactivate: *const c_void,
    cleanup: *const c_void,
}

type DescriptorFn = unsafe extern "C" fn(c_ulong) -> *const Descriptor;

/// Metadata for one plugin found in a shared object.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginInfo {
    pub label: String,
    pub name: String,
    pub ports: Vec<PortSpec>,
}

fn cstr_to_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_string_lossy()
        .into_owned()
}

/// Resolve a hint descriptor's declared default within its bounds.
fn hint_default(hint: c_int, lower: f32, upper: f32, logarithmic: bool) -> Option<f32> {
    let blend = |low_w: f32, high_w: f32| {
        if logarithmic && lower > 0.0 && upper > 0.0 {
            (lower.ln() * low_w + upper.ln() * high_w).exp()
        } else {
            lower * low_w + upper * high_w
        }
    };
    match hint & HINT_DEFAULT_MASK {
        x if x == HINT_DEFAULT_MINIMUM => Some(lower),
        x if x == HINT_DEFAULT_LOW => Some(blend(0.75, 0.25)),
        x if x == HINT_DEFAULT_MIDDLE => Some(blend(0.5, 0.5)),
        x if x == HINT_DEFAULT_HIGH => Some(blend(0.25, 0.75)),
        x if x == HINT_DEFAULT_MAXIMUM => Some(upper),
        x if x == HINT_DEFAULT_0 => Some(0.0),
        x if x == HINT_DEFAULT_1 => Some(1.0),
        x if x == HINT_DEFAULT_100 => Some(100.0),
        x if x == HINT_DEFAULT_440 => Some(440.0),
        _ => None,
    }
}

/// Build a `PortSpec` from one descriptor port.
fn port_spec(name: String, hint: &PortRangeHint, sample_rate: f32) -> PortSpec {
    let h = hint.hint_descriptor;
    let scale = if h & HINT_SAMPLE_RATE != 0 { sample_rate } else { 1.0 };
    let lower = (h & HINT_BOUNDED_BELOW != 0).then_some(hint.lower_bound * scale);
    let upper = (h & HINT_BOUNDED_ABOVE != 0).then_some(hint.upper_bound * scale);
    let logarithmic = h & HINT_LOGARITHMIC != 0;
    let default = hint_default(
        h,
        lower.unwrap_or(0.0),
        upper.unwrap_or(1.0),
        logarithmic,
    );
    PortSpec {
        name,
        toggled: h & HINT_TOGGLED != 0,
        integer: h & HINT_INTEGER != 0,
        logarithmic,
        lower,
        upper,
        default,
    }
}

unsafe fn describe(descriptor: &Descriptor, sample_rate: f32) -> PluginInfo {
    let mut ports = Vec::new();
    for i in 0..descriptor.port_count as usize {
        let port = *descriptor.port_descriptors.add(i);
        // Only input control ports are user-facing parameters.
        if port & PORT_INPUT == 0 || port & PORT_CONTROL == 0 {
            continue;
        }
        let name = cstr_to_string(*descriptor.port_names.add(i));
        let hint = &*descriptor.port_range_hints.add(i);
        ports.push(port_spec(name, hint, sample_rate));
    }
    PluginInfo {
        label: cstr_to_string(descriptor.label),
        name: cstr_to_string(descriptor.name),
        ports,
    }
}

/// Enumerate every plugin exported by one LADSPA shared object.
///
/// `sample_rate` resolves bounds declared relative to the sample rate.
pub fn read_plugins(path: &Path, sample_rate: f32) -> Result<Vec<PluginInfo>, String> {
    unsafe {
        let lib = Library::new(path).map_err(|e| e.to_string())?;
        let entry: Symbol<DescriptorFn> = lib
            .get(b"ladspa_descriptor")
            .map_err(|e| format!("{}: not a LADSPA plugin: {}", path.display(), e))?;

        let mut plugins = Vec::new();
        let mut index: c_ulong = 0;
        loop {
            let descriptor = entry(index);
            if descriptor.is_null() {
                break;
            }
            plugins.push(describe(&*descriptor, sample_rate));
            index += 1;
        }
        Ok(plugins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fretline_types::ParamKind;

    fn hint(descriptor: c_int, lower: f32, upper: f32) -> PortRangeHint {
        PortRangeHint { hint_descriptor: descriptor, lower_bound: lower, upper_bound: upper }
    }

    #[test]
    fn bounded_port_with_middle_default() {
        let h = hint(
            HINT_BOUNDED_BELOW | HINT_BOUNDED_ABOVE | HINT_DEFAULT_MIDDLE,
            0.0,
            2.0,
        );
        let spec = port_spec("Gain".to_string(), &h, 44100.0);
        assert_eq!(spec.lower, Some(0.0));
        assert_eq!(spec.upper, Some(2.0));
        assert_eq!(spec.default, Some(1.0));
        assert_eq!(ParamKind::classify(&spec), ParamKind::BoundedReal);
    }

    #[test]
    fn toggled_port_ignores_bounds() {
        let h = hint(HINT_TOGGLED | HINT_DEFAULT_1, 0.0, 0.0);
        let spec = port_spec("Bypass".to_string(), &h, 44100.0);
        assert!(spec.toggled);
        assert_eq!(spec.default, Some(1.0));
        assert_eq!(ParamKind::classify(&spec), ParamKind::Toggle);
    }

    #[test]
    fn sample_rate_bounds_are_scaled() {
        let h = hint(
            HINT_BOUNDED_BELOW | HINT_BOUNDED_ABOVE | HINT_SAMPLE_RATE | HINT_DEFAULT_MAXIMUM,
            0.0,
            0.5,
        );
        let spec = port_spec("Cutoff".to_string(), &h, 48000.0);
        assert_eq!(spec.upper, Some(24000.0));
        assert_eq!(spec.default, Some(24000.0));
    }

    #[test]
    fn logarithmic_low_default_blends_in_log_space() {
        let h = hint(
            HINT_BOUNDED_BELOW | HINT_BOUNDED_ABOVE | HINT_LOGARITHMIC | HINT_DEFAULT_LOW,
            10.0,
            10000.0,
        );
        let spec = port_spec("Freq".to_string(), &h, 44100.0);
        let expected = (10.0_f32.ln() * 0.75 + 10000.0_f32.ln() * 0.25).exp();
        let got = spec.default.unwrap();
        assert!((got - expected).abs() < 0.01, "got {}", got);
    }

    #[test]
    fn missing_library_is_an_error() {
        let err = read_plugins(Path::new("/nonexistent/plugin.so"), 44100.0).unwrap_err();
        assert!(!err.is_empty());
    }
}
