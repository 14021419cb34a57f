//! Class-wide constants shared by the registry, the capture devices and the
//! chip drivers.

/// Name of the device class all capture devices are registered under.
pub const CLASS_NAME: &str = "fingerprint";

/// Prefix of a capture device node name. Device `3` is exposed as `fp3`.
pub const DEVICE_NODE_PREFIX: &str = "fp";

/// Default size of the identity pool.
///
/// At most this many capture devices can be registered at the same time in
/// one registry. The pool is a hard cap and is never grown.
pub const DEFAULT_MAX_DEVICES: usize = 1024;

/// Attribute names exposed read-only for every capture device.
pub const DEVICE_ATTRIBUTES: [&str; 3] = ["name", "width", "height"];
