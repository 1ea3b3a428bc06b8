//! Input device enumeration.

use cpal::traits::{DeviceTrait, HostTrait};

use super::capture::CaptureError;

/// A capture-capable device as shown in the device selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceDescriptor {
    /// Identifier that is stable for the lifetime of the process:
    /// `"<enumeration index>:<name>"`.
    pub id: String,
    /// Human-readable device name reported by the host.
    pub name: String,
}

impl DeviceDescriptor {
    pub fn new(index: usize, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: format!("{index}:{name}"),
            name,
        }
    }

    /// Enumeration index encoded in [`id`](Self::id), if well-formed.
    pub fn index(&self) -> Option<usize> {
        self.id.split_once(':').and_then(|(i, _)| i.parse().ok())
    }
}

impl std::fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// List the input devices of `host` in provider order.
///
/// Devices whose name cannot be read are skipped.
pub fn list_input_devices(host: &cpal::Host) -> Result<Vec<DeviceDescriptor>, CaptureError> {
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::Enumeration(e.to_string()))?;

    let mut out = Vec::new();
    for (index, device) in devices.enumerate() {
        match device.name() {
            Ok(name) => out.push(DeviceDescriptor::new(index, name)),
            Err(e) => log::debug!("skipping input device #{index}: {e}"),
        }
    }
    Ok(out)
}

/// Resolve `descriptor` back to a live `cpal::Device`.
///
/// Matches on index and name first, then on name alone in case the device
/// order changed since enumeration.
pub fn find_input_device(
    host: &cpal::Host,
    descriptor: &DeviceDescriptor,
) -> Result<cpal::Device, CaptureError> {
    let unavailable = |reason: String| CaptureError::DeviceUnavailable {
        device: descriptor.name.clone(),
        reason,
    };

    let named: Vec<(usize, cpal::Device)> = host
        .input_devices()
        .map_err(|e| unavailable(e.to_string()))?
        .enumerate()
        .filter(|(_, d)| d.name().map(|n| n == descriptor.name).unwrap_or(false))
        .collect();

    let wanted = descriptor.index();
    let mut fallback = None;
    for (index, device) in named {
        if Some(index) == wanted {
            return Ok(device);
        }
        fallback.get_or_insert(device);
    }

    fallback.ok_or_else(|| unavailable("device not found".into()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_encodes_index_and_name() {
        let d = DeviceDescriptor::new(3, "USB Mic");
        assert_eq!(d.id, "3:USB Mic");
        assert_eq!(d.index(), Some(3));
        assert_eq!(d.to_string(), "USB Mic");
    }

    #[test]
    fn names_with_colons_keep_their_index() {
        let d = DeviceDescriptor::new(0, "hw:CARD=PCH,DEV=0");
        assert_eq!(d.index(), Some(0));
        assert_eq!(d.name, "hw:CARD=PCH,DEV=0");
    }

    #[test]
    fn malformed_id_has_no_index() {
        let d = DeviceDescriptor {
            id: "default".into(),
            name: "default".into(),
        };
        assert_eq!(d.index(), None);
    }
}
