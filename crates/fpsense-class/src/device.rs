//! Capture devices and their presence state.
//!
//! A [`CaptureDevice`] is what a chip driver gets back from the registry. The
//! driver reports finger presence into it from interrupt context; readers and
//! pollers observe that state through a [`CaptureFile`](crate::CaptureFile).
//!
//! Presence is kept in a `tokio::sync::watch` channel so that updating the
//! two flags and waking waiters happen under the same lock, and a waiter
//! checks the flags under that lock before sleeping.

use crate::traits::Capability;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use fpsense_core::{DeviceId, Error, Geometry, PollEvent, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Everything a driver declares about a device before registering it.
///
/// Nothing is validated until registration, so a descriptor may hold an
/// empty name or zero geometry; the registry rejects those.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Human-readable name, e.g. the chip model.
    pub name: String,

    /// Image geometry.
    pub geometry: Geometry,

    /// Bus identity of the driver that owns the device, e.g. `spi0.0`.
    pub parent: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(name: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            name: name.into(),
            geometry,
            parent: None,
        }
    }

    /// Set the parent bus identity.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::invalid_configuration("Device name must not be empty"));
        }
        self.geometry.validate()
    }
}

/// Read-only attribute set of a registered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAttributes {
    pub id: DeviceId,
    pub node: String,
    pub name: String,
    pub width: usize,
    pub height: usize,
    pub bytes_per_pixel: usize,
    pub parent: Option<String>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Presence {
    /// Edge marker, cleared by poll.
    pub(crate) changed: bool,
    /// Level state.
    pub(crate) finger_present: bool,
}

/// A registered sensor endpoint.
pub struct CaptureDevice {
    id: DeviceId,
    name: String,
    geometry: Geometry,
    parent: Option<String>,
    registered_at: DateTime<Utc>,
    capability: Arc<dyn Capability>,
    presence: watch::Sender<Presence>,
    removed: CancellationToken,
}

impl CaptureDevice {
    pub(crate) fn new(
        id: DeviceId,
        descriptor: DeviceDescriptor,
        capability: Arc<dyn Capability>,
    ) -> Self {
        Self {
            id,
            name: descriptor.name,
            geometry: descriptor.geometry,
            parent: descriptor.parent,
            registered_at: Utc::now(),
            capability,
            presence: watch::Sender::new(Presence::default()),
            removed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Node name, e.g. `fp0`.
    pub fn node_name(&self) -> String {
        self.id.node_name()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Size of one full frame in bytes.
    pub fn frame_size(&self) -> usize {
        self.geometry.frame_size()
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Snapshot of the read-only attributes.
    pub fn attributes(&self) -> DeviceAttributes {
        DeviceAttributes {
            id: self.id,
            node: self.node_name(),
            name: self.name.clone(),
            width: self.geometry.width,
            height: self.geometry.height,
            bytes_per_pixel: self.geometry.bytes_per_pixel,
            parent: self.parent.clone(),
            registered_at: self.registered_at,
        }
    }

    /// Render one attribute the way an attribute file reads: the value
    /// followed by a newline. Unknown attributes return `None`.
    pub fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "name" => Some(format!("{}\n", self.name)),
            "width" => Some(format!("{}\n", self.geometry.width)),
            "height" => Some(format!("{}\n", self.geometry.height)),
            _ => None,
        }
    }

    /// `false` once the device has been unregistered.
    pub fn is_registered(&self) -> bool {
        !self.removed.is_cancelled()
    }

    /// Current level state of the finger.
    pub fn finger_present(&self) -> bool {
        self.presence.borrow().finger_present
    }

    /// Record a presence edge and wake every waiter.
    ///
    /// Called by chip drivers; never fails.
    pub fn report_presence(&self, down: bool) {
        self.presence.send_modify(|presence| {
            presence.finger_present = down;
            presence.changed = true;
        });
        debug!(device = %self.node_name(), down, "Woke up poll");
    }

    /// Consume the pending edge, if any.
    pub(crate) fn take_edge(&self) -> PollEvent {
        let mut event = PollEvent::NoChange;
        self.presence.send_if_modified(|presence| {
            if presence.changed {
                presence.changed = false;
                event = if presence.finger_present {
                    PollEvent::Readable
                } else {
                    PollEvent::Hangup
                };
            }
            // Clearing the edge is not something waiters need to see.
            false
        });
        event
    }

    pub(crate) fn ensure_registered(&self) -> Result<()> {
        if self.is_registered() {
            Ok(())
        } else {
            Err(Error::not_found(self.node_name()))
        }
    }

    /// Wait until the presence state satisfies `condition`.
    ///
    /// Fails with `Error::NotFound` if the device is unregistered first and
    /// with `Error::Interrupted` if `cancel` fires first.
    pub(crate) async fn wait_presence<F>(
        &self,
        cancel: &CancellationToken,
        condition: F,
    ) -> Result<()>
    where
        F: FnMut(&Presence) -> bool,
    {
        let mut rx = self.presence.subscribe();
        let satisfied = async move { rx.wait_for(condition).await.map(|_| ()) };

        tokio::select! {
            biased;
            _ = self.removed.cancelled() => Err(Error::not_found(self.node_name())),
            _ = cancel.cancelled() => Err(Error::Interrupted),
            result = satisfied => result.map_err(|_| Error::not_found(self.node_name())),
        }
    }

    pub(crate) async fn capture(&self, cancel: &CancellationToken) -> Result<Bytes> {
        self.capability.capture(self, cancel).await
    }

    pub(crate) fn mark_removed(&self) {
        self.removed.cancel();
    }
}

impl fmt::Debug for CaptureDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureDevice")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("geometry", &self.geometry)
            .field("parent", &self.parent)
            .field("presence", &*self.presence.borrow())
            .field("registered", &self.is_registered())
            .finish()
    }
}
