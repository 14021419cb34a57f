//! Driver-facing capability trait.
//!
//! Every chip driver hands the class layer one [`Capability`] when it
//! registers a capture device. The class layer never talks to hardware
//! itself: a read waits for a finger and then asks the capability for a frame.
//!
//! # Object Safety
//!
//! Native `async fn` in traits is not object-safe, but the registry has to
//! hold devices backed by different drivers side by side. The capture method
//! therefore returns a [`BoxFuture`], which keeps `Arc<dyn Capability>`
//! usable while implementations still write ordinary `async` blocks.
//!
//! # Examples
//!
//! ```
//! use bytes::Bytes;
//! use fpsense_class::{Capability, CaptureDevice};
//! use fpsense_core::Result;
//! use futures::future::BoxFuture;
//! use tokio_util::sync::CancellationToken;
//!
//! struct BlankSensor;
//!
//! impl Capability for BlankSensor {
//!     fn capture<'a>(
//!         &'a self,
//!         device: &'a CaptureDevice,
//!         _cancel: &'a CancellationToken,
//!     ) -> BoxFuture<'a, Result<Bytes>> {
//!         Box::pin(async move { Ok(Bytes::from(vec![0u8; device.frame_size()])) })
//!     }
//! }
//! ```

use crate::device::CaptureDevice;
use bytes::Bytes;
use fpsense_core::Result;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Frame capture operation implemented once per driven chip.
///
/// Implementations close over their driver-private state. The returned
/// frame may be shorter than the device's frame size; the class layer only
/// delivers the bytes actually captured.
///
/// # Cancellation
///
/// Long hardware waits inside `capture` must observe `cancel` and fail with
/// `Error::Interrupted` once it fires.
pub trait Capability: Send + Sync {
    /// Capture one frame from the sensor behind `device`.
    ///
    /// # Errors
    ///
    /// Returns `Error::TransportFailure` if the wire exchange fails,
    /// `Error::Interrupted` if `cancel` fires during a wait, or
    /// `Error::NotFound` if the driver behind the device is gone.
    fn capture<'a>(
        &'a self,
        device: &'a CaptureDevice,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Bytes>>;
}
