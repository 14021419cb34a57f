use crate::{Result, constants::DEVICE_NODE_PREFIX, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity of a registered capture device.
///
/// Identities are small non-negative integers handed out by the device
/// registry. An identity is unique for as long as its registration lasts and
/// may be reused after the device is unregistered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u32);

impl DeviceId {
    pub const fn new(id: u32) -> Self {
        DeviceId(id)
    }

    /// Get the raw identity.
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Node name of the device, e.g. `fp0`.
    #[must_use]
    pub fn node_name(&self) -> String {
        format!("{DEVICE_NODE_PREFIX}{}", self.0)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = Error;

    /// Accepts either the bare identity (`3`) or the node name (`fp3`).
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix(DEVICE_NODE_PREFIX).unwrap_or(s);
        let id: u32 = digits
            .parse()
            .map_err(|_| Error::invalid_configuration(format!("Invalid device identity: {s}")))?;
        Ok(DeviceId(id))
    }
}

/// Image geometry of a capture device.
///
/// Geometry is fixed at registration time. Every dimension must be non-zero
/// for a device to be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    pub width: usize,
    pub height: usize,
    pub bytes_per_pixel: usize,
}

impl Geometry {
    pub const fn new(width: usize, height: usize, bytes_per_pixel: usize) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
        }
    }

    /// Check every dimension is non-zero and the frame size fits a `usize`.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfiguration` naming the first zero dimension,
    /// or reporting a frame size that overflows.
    pub fn validate(&self) -> Result<()> {
        let dimensions = [
            ("width", self.width),
            ("height", self.height),
            ("bytes per pixel", self.bytes_per_pixel),
        ];

        if let Some((label, _)) = dimensions.iter().find(|(_, value)| *value == 0) {
            return Err(Error::invalid_configuration(format!(
                "Device geometry {label} must be non-zero"
            )));
        }

        self.checked_frame_size().map(|_| ()).ok_or_else(|| {
            Error::invalid_configuration(format!("Device geometry {self} overflows the frame size"))
        })
    }

    /// Size of one full frame in bytes, or `None` on overflow.
    #[must_use]
    pub fn checked_frame_size(&self) -> Option<usize> {
        self.width
            .checked_mul(self.height)?
            .checked_mul(self.bytes_per_pixel)
    }

    /// Size of one full frame in bytes, saturating at `usize::MAX`.
    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.checked_frame_size().unwrap_or(usize::MAX)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}x{} ({} byte(s) per pixel)",
            self.width, self.height, self.bytes_per_pixel
        )
    }
}

/// Result of polling a capture device for presence edges.
///
/// Polling is edge-triggered with a single pending slot: only the most
/// recent edge since the previous poll is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollEvent {
    /// A finger was placed; a read will not wait.
    Readable,

    /// The finger was lifted.
    Hangup,

    /// No edge since the previous poll.
    NoChange,
}

impl fmt::Display for PollEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollEvent::Readable => write!(f, "readable"),
            PollEvent::Hangup => write!(f, "hangup"),
            PollEvent::NoChange => write!(f, "none"),
        }
    }
}

/// How a read behaves when no finger is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Wait for a finger.
    #[default]
    Blocking,

    /// Fail with `Error::WouldBlock`.
    NonBlocking,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0", 0)]
    #[case("fp3", 3)]
    #[case("1023", 1023)]
    fn test_device_id_parse(#[case] input: &str, #[case] expected: u32) {
        let id: DeviceId = input.parse().unwrap();
        assert_eq!(id.as_u32(), expected);
    }

    #[rstest]
    #[case("fp")]
    #[case("-1")]
    #[case("abc")]
    fn test_device_id_invalid(#[case] input: &str) {
        let result: Result<DeviceId> = input.parse();
        assert!(result.is_err());
    }

    #[test]
    fn test_device_id_node_name() {
        assert_eq!(DeviceId::new(7).node_name(), "fp7");
        assert_eq!(DeviceId::new(7).to_string(), "7");
    }

    #[rstest]
    #[case(192, 56, 1, 10752)]
    #[case(1, 1, 1, 1)]
    #[case(4, 3, 2, 24)]
    fn test_geometry_frame_size(
        #[case] width: usize,
        #[case] height: usize,
        #[case] bpp: usize,
        #[case] expected: usize,
    ) {
        let geometry = Geometry::new(width, height, bpp);
        assert!(geometry.validate().is_ok());
        assert_eq!(geometry.frame_size(), expected);
    }

    #[rstest]
    #[case(0, 56, 1, "width")]
    #[case(192, 0, 1, "height")]
    #[case(192, 56, 0, "bytes per pixel")]
    fn test_geometry_invalid(
        #[case] width: usize,
        #[case] height: usize,
        #[case] bpp: usize,
        #[case] label: &str,
    ) {
        let error = Geometry::new(width, height, bpp).validate().unwrap_err();
        assert!(matches!(error, Error::InvalidConfiguration(_)));
        assert!(error.to_string().contains(label));
    }

    #[rstest]
    #[case(usize::MAX / 2 + 1, 2, 1)]
    #[case(usize::MAX, 1, 2)]
    #[case(1 << 40, 1 << 40, 1)]
    fn test_geometry_frame_size_overflow(
        #[case] width: usize,
        #[case] height: usize,
        #[case] bpp: usize,
    ) {
        let geometry = Geometry::new(width, height, bpp);
        let error = geometry.validate().unwrap_err();
        assert!(matches!(error, Error::InvalidConfiguration(_)));
        assert!(error.to_string().contains("overflows"));
        assert_eq!(geometry.checked_frame_size(), None);
        assert_eq!(geometry.frame_size(), usize::MAX);
    }

    #[test]
    fn test_poll_event_serialization() {
        let json = serde_json::to_string(&PollEvent::NoChange).unwrap();
        assert_eq!(json, "\"no_change\"");
        assert_eq!(PollEvent::NoChange.to_string(), "none");
    }

    #[test]
    fn test_open_mode_default() {
        assert_eq!(OpenMode::default(), OpenMode::Blocking);
    }
}
