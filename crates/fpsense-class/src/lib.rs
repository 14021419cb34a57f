//! Capture device class layer for fingerprint sensors.
//!
//! This crate turns an interrupt-driven image sensor into a read-and-poll
//! interface. Chip drivers register a [`CaptureDevice`] together with a
//! [`Capability`] that knows how to capture a frame; consumers open the
//! device and either read frames or poll for finger presence edges.
//!
//! # Components
//!
//! - [`DeviceRegistry`]: bounded identity pool and identity → device map
//! - [`CaptureDevice`]: geometry, attributes and presence state of one sensor
//! - [`CaptureFile`]: an open handle with blocking/non-blocking reads and
//!   edge-triggered polling
//! - [`Capability`]: the one operation a chip driver provides
//!
//! # Data Flow
//!
//! ```text
//! ┌────────────┐  report_presence   ┌───────────────┐   read / poll   ┌──────────┐
//! │ Chip driver│───────────────────►│ CaptureDevice │◄────────────────│ Consumer │
//! └────────────┘                    └───────┬───────┘                 └──────────┘
//!       ▲                                   │ capture
//!       └───────────── Capability ──────────┘
//! ```
//!
//! # Error Handling
//!
//! All operations return [`fpsense_core::Result`]. Class-layer failures are
//! returned to the immediate caller and never retried.

pub mod device;
pub mod file;
pub mod mock;
pub mod registry;
pub mod traits;

pub use device::{CaptureDevice, DeviceAttributes, DeviceDescriptor};
pub use file::CaptureFile;
pub use registry::{DeviceRegistry, RegistryConfig};
pub use traits::Capability;
