//! Capture capability registered with the class layer.

use crate::chip::Chip;
use crate::transport::{PowerControl, SpiTransport};
use bytes::Bytes;
use fpsense_class::{Capability, CaptureDevice};
use fpsense_core::{Error, Result};
use futures::future::BoxFuture;
use std::sync::Weak;
use tokio_util::sync::CancellationToken;

/// Holds the chip weakly; the chip owns the device that owns this.
pub(crate) struct Fpc1020Capture<T, P> {
    chip: Weak<Chip<T, P>>,
}

impl<T, P> Fpc1020Capture<T, P> {
    pub(crate) fn new(chip: Weak<Chip<T, P>>) -> Self {
        Self { chip }
    }
}

impl<T, P> Capability for Fpc1020Capture<T, P>
where
    T: SpiTransport,
    P: PowerControl,
{
    fn capture<'a>(
        &'a self,
        device: &'a CaptureDevice,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Bytes>> {
        Box::pin(async move {
            let chip = self
                .chip
                .upgrade()
                .ok_or_else(|| Error::not_found(device.node_name()))?;
            chip.capture(cancel).await
        })
    }
}
