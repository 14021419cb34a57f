//! Mock capability for testing and development.
//!
//! [`MockCapability`] returns a fixed frame on every capture, which makes
//! read behavior deterministic without any chip behind the device.

use crate::device::CaptureDevice;
use crate::traits::Capability;
use bytes::Bytes;
use fpsense_core::{Error, Result, TransportError};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// Capability that hands out a configured frame.
///
/// # Examples
///
/// ```
/// use fpsense_class::mock::MockCapability;
///
/// let capability = MockCapability::with_frame(vec![1, 2, 3, 4]);
/// assert_eq!(capability.capture_count(), 0);
///
/// capability.set_frame(vec![9; 4]);
/// capability.fail_next_capture();
/// ```
#[derive(Debug)]
pub struct MockCapability {
    frame: Mutex<Bytes>,
    captures: AtomicUsize,
    fail_next: AtomicBool,
}

impl MockCapability {
    /// Mock whose frame is `len` bytes counting up from zero (wrapping).
    pub fn new(len: usize) -> Self {
        Self::with_frame((0..len).map(|i| i as u8).collect::<Vec<_>>())
    }

    pub fn with_frame(frame: impl Into<Bytes>) -> Self {
        Self {
            frame: Mutex::new(frame.into()),
            captures: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Replace the frame returned by later captures.
    pub fn set_frame(&self, frame: impl Into<Bytes>) {
        *self.frame.lock() = frame.into();
    }

    /// Make the next capture fail with a transport error.
    pub fn fail_next_capture(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of capture invocations so far, failed ones included.
    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }
}

impl Capability for MockCapability {
    fn capture<'a>(
        &'a self,
        device: &'a CaptureDevice,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Bytes>> {
        Box::pin(async move {
            self.captures.fetch_add(1, Ordering::SeqCst);

            if cancel.is_cancelled() {
                return Err(Error::Interrupted);
            }
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(Error::transport(
                    format!("mock capture on {}", device.node_name()),
                    TransportError::bus("injected failure"),
                ));
            }

            Ok(self.frame.lock().clone())
        })
    }
}
