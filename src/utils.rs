use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device};

/// What a capture node is good for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    Color,
    /// Delivers 16-bit depth (`Z16`)
    Depth,
}

// Detected capture device info
#[derive(Debug, Clone, Serialize)]
pub struct FoundDevice {
    pub path: String,
    pub card: String,
    pub role: DeviceRole,
    pub formats: Vec<String>,
}

/// Decide the role from the fourccs a node advertises. Depth wins over
/// color since RealSense depth nodes also expose a grey format.
pub fn classify_formats(fourccs: &[[u8; 4]]) -> Option<DeviceRole> {
    if fourccs.iter().any(|f| f == b"Z16 ") {
        return Some(DeviceRole::Depth);
    }
    let color = [b"MJPG", b"YUYV", b"RGB3", b"BGR3", b"NV12"];
    if fourccs.iter().any(|f| color.contains(&f)) {
        return Some(DeviceRole::Color);
    }
    None
}

/// Every `/dev/videoN` capture node with a usable format.
pub fn probe_devices() -> Vec<FoundDevice> {
    use std::path::Path;

    info!("Probing capture devices...");

    let mut found = Vec::new();
    for i in 0..16 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            debug!("Cannot open {}", path);
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        // Metadata nodes have no capture capability
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }
        let Ok(formats) = dev.enum_formats() else {
            continue;
        };

        let fourccs: Vec<[u8; 4]> = formats.iter().map(|f| f.fourcc.repr).collect();
        if let Some(role) = classify_formats(&fourccs) {
            info!("Found {:?} device: {} - {}", role, path, caps.card);
            found.push(FoundDevice {
                path,
                card: caps.card,
                role,
                formats: formats
                    .iter()
                    .map(|f| f.fourcc.str().unwrap_or("????").to_string())
                    .collect(),
            });
        }
    }

    found
}

/// First device with the given role.
pub fn find_device(role: DeviceRole) -> Result<FoundDevice> {
    probe_devices()
        .into_iter()
        .find(|d| d.role == role)
        .ok_or_else(|| eyre!("No {:?} capture device found", role))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn z16_nodes_are_depth() {
        assert_eq!(
            classify_formats(&[*b"GREY", *b"Z16 "]),
            Some(DeviceRole::Depth)
        );
        assert_eq!(
            classify_formats(&[*b"YUYV", *b"MJPG"]),
            Some(DeviceRole::Color)
        );
        assert_eq!(classify_formats(&[*b"GREY"]), None);
        assert_eq!(classify_formats(&[]), None);
    }
}
