//! Open handles: the read and poll surface of a capture device.
//!
//! A [`CaptureFile`] is what a consumer holds after opening a device. It
//! carries the consumer's position inside the current frame, its blocking
//! mode and the cancellation token that interrupts its waits.
//!
//! # Reading Frames
//!
//! Every `read` call waits for a finger and triggers one hardware capture.
//! The handle's offset lets a consumer collect one frame over several
//! smaller reads; once the whole frame has been delivered further reads
//! return `0`. Open the device again to read the next frame.
//!
//! ```no_run
//! use fpsense_class::DeviceRegistry;
//! use fpsense_core::{DeviceId, OpenMode};
//!
//! # async fn example(registry: &DeviceRegistry) -> fpsense_core::Result<Vec<u8>> {
//! let mut file = registry.open(DeviceId::new(0), OpenMode::Blocking)?;
//! let mut frame = vec![0u8; file.device().frame_size()];
//! let mut filled = 0;
//!
//! while filled < frame.len() {
//!     let n = file.read(&mut frame[filled..]).await?;
//!     if n == 0 {
//!         break;
//!     }
//!     filled += n;
//! }
//! # Ok(frame)
//! # }
//! ```
//!
//! # Polling
//!
//! [`CaptureFile::poll`] reports the most recent presence edge once. Edges
//! are not queued: if a finger is placed and lifted between two polls only
//! the lift is reported.

use crate::device::CaptureDevice;
use fpsense_core::{Error, OpenMode, PollEvent, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// An open capture device.
#[derive(Debug)]
pub struct CaptureFile {
    device: Arc<CaptureDevice>,
    offset: usize,
    mode: OpenMode,
    cancel: CancellationToken,
}

impl CaptureFile {
    pub(crate) fn new(device: Arc<CaptureDevice>, mode: OpenMode) -> Self {
        Self {
            device,
            offset: 0,
            mode,
            cancel: CancellationToken::new(),
        }
    }

    pub fn device(&self) -> &Arc<CaptureDevice> {
        &self.device
    }

    /// Bytes of the current frame already delivered.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn set_nonblocking(&mut self, nonblocking: bool) {
        self.mode = if nonblocking {
            OpenMode::NonBlocking
        } else {
            OpenMode::Blocking
        };
    }

    /// Token that interrupts this handle's waits when cancelled.
    ///
    /// Hand a clone to whichever task owns shutdown of the reader.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Read frame bytes into `buf`.
    ///
    /// Returns the number of bytes delivered, or `0` once the whole frame
    /// has been consumed.
    ///
    /// # Errors
    ///
    /// - `Error::WouldBlock` in non-blocking mode with no finger present
    /// - `Error::Interrupted` if the handle is cancelled while waiting
    /// - `Error::NotFound` if the device is unregistered
    /// - any error returned by the driver's capture
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.device.ensure_registered()?;

        let frame_size = self.device.frame_size();
        let len = frame_size.saturating_sub(self.offset).min(buf.len());
        if len == 0 {
            return Ok(0);
        }

        match self.mode {
            OpenMode::NonBlocking if !self.device.finger_present() => {
                return Err(Error::WouldBlock);
            }
            OpenMode::NonBlocking => {}
            OpenMode::Blocking => {
                self.device
                    .wait_presence(&self.cancel, |presence| presence.finger_present)
                    .await?;
            }
        }

        let frame = self.device.capture(&self.cancel).await?;

        let tail = frame.get(self.offset..).unwrap_or_default();
        let count = tail.len().min(len);
        buf[..count].copy_from_slice(&tail[..count]);
        self.offset += count;

        trace!(
            device = %self.device.node_name(),
            captured = frame.len(),
            count,
            offset = self.offset,
            "Frame read"
        );
        Ok(count)
    }

    /// Consume the pending presence edge without waiting.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the device is unregistered.
    pub fn poll(&self) -> Result<PollEvent> {
        self.device.ensure_registered()?;
        Ok(self.device.take_edge())
    }

    /// Wait for a presence edge, then consume it.
    ///
    /// Returns immediately if an edge is already pending.
    ///
    /// # Errors
    ///
    /// - `Error::Interrupted` if the handle is cancelled while waiting
    /// - `Error::NotFound` if the device is unregistered
    pub async fn wait_event(&self) -> Result<PollEvent> {
        self.device.ensure_registered()?;

        loop {
            self.device
                .wait_presence(&self.cancel, |presence| presence.changed)
                .await?;

            // Another handle may have consumed the edge in between.
            match self.device.take_edge() {
                PollEvent::NoChange => continue,
                event => return Ok(event),
            }
        }
    }
}
