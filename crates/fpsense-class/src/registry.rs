//! Device registry and identity pool.
//!
//! The registry is the single source of truth mapping an identity to its
//! capture device. It is an explicit instance: the process hosting the
//! sensor subsystem constructs one at startup and hands an `Arc` of it to
//! every chip driver and every consumer.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use fpsense_class::{DeviceDescriptor, DeviceRegistry};
//! use fpsense_class::mock::MockCapability;
//! use fpsense_core::{Geometry, OpenMode};
//!
//! let registry = DeviceRegistry::default();
//!
//! let descriptor = DeviceDescriptor::new("mock", Geometry::new(8, 8, 1));
//! let device = registry
//!     .register(descriptor, Arc::new(MockCapability::new(64)))
//!     .unwrap();
//! assert_eq!(device.node_name(), "fp0");
//!
//! let file = registry.open(device.id(), OpenMode::NonBlocking).unwrap();
//! assert_eq!(file.device().name(), "mock");
//!
//! registry.unregister(&device);
//! assert!(registry.lookup(device.id()).is_err());
//! ```

use crate::device::{CaptureDevice, DeviceDescriptor};
use crate::file::CaptureFile;
use crate::traits::Capability;
use fpsense_core::constants::DEFAULT_MAX_DEVICES;
use fpsense_core::{DeviceId, Error, OpenMode, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configuration for a device registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Size of the identity pool.
    pub max_devices: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_devices: DEFAULT_MAX_DEVICES,
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    allocated: BTreeSet<u32>,
    devices: BTreeMap<DeviceId, Arc<CaptureDevice>>,
}

/// Bounded mapping from identity to capture device.
#[derive(Debug)]
pub struct DeviceRegistry {
    max_devices: usize,
    inner: Mutex<RegistryInner>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl DeviceRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            max_devices: config.max_devices,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    pub fn max_devices(&self) -> usize {
        self.max_devices
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.inner.lock().devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().devices.is_empty()
    }

    /// Sorted snapshot of the registered identities.
    pub fn ids(&self) -> Vec<DeviceId> {
        self.inner.lock().devices.keys().copied().collect()
    }

    /// Reserve the smallest unused identity.
    ///
    /// # Errors
    ///
    /// Returns `Error::ResourceExhausted` when every identity below the
    /// maximum is in use.
    pub fn allocate_identity(&self) -> Result<DeviceId> {
        let mut inner = self.inner.lock();

        // `allocated` iterates in ascending order; the first gap is the answer.
        let mut candidate = 0u32;
        for &id in &inner.allocated {
            if id != candidate {
                break;
            }
            candidate += 1;
        }

        if candidate as usize >= self.max_devices {
            return Err(Error::ResourceExhausted {
                max: self.max_devices,
            });
        }

        inner.allocated.insert(candidate);
        Ok(DeviceId::new(candidate))
    }

    /// Return an identity to the pool.
    pub fn release_identity(&self, id: DeviceId) {
        if !self.inner.lock().allocated.remove(&id.as_u32()) {
            warn!(id = %id, "Released an identity that was not allocated");
        }
    }

    fn publish(&self, device: Arc<CaptureDevice>) -> Result<()> {
        let mut inner = self.inner.lock();
        let id = device.id();

        if !inner.allocated.contains(&id.as_u32()) {
            return Err(Error::invalid_configuration(format!(
                "Identity {id} was not allocated"
            )));
        }
        if inner.devices.contains_key(&id) {
            return Err(Error::invalid_configuration(format!(
                "Identity {id} is already published"
            )));
        }

        inner.devices.insert(id, device);
        Ok(())
    }

    /// Find a registered device.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no device holds `id`.
    pub fn lookup(&self, id: DeviceId) -> Result<Arc<CaptureDevice>> {
        self.inner
            .lock()
            .devices
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(id.node_name()))
    }

    /// Validate, allocate an identity for and publish a new capture device.
    ///
    /// The descriptor is validated before any identity is taken, so a
    /// rejected registration never consumes one.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfiguration` if the name is empty or any geometry
    ///   dimension is zero
    /// - `Error::ResourceExhausted` if the identity pool is full
    pub fn register(
        &self,
        descriptor: DeviceDescriptor,
        capability: Arc<dyn Capability>,
    ) -> Result<Arc<CaptureDevice>> {
        descriptor.validate()?;

        let id = self.allocate_identity()?;
        let device = Arc::new(CaptureDevice::new(id, descriptor, capability));

        if let Err(error) = self.publish(device.clone()) {
            self.release_identity(id);
            return Err(error);
        }

        info!(
            device = %device.node_name(),
            name = device.name(),
            parent = device.parent().unwrap_or("-"),
            geometry = %device.geometry(),
            "Registered capture device"
        );
        Ok(device)
    }

    /// Remove a device and return its identity to the pool.
    ///
    /// Outstanding waiters on the device fail with `Error::NotFound`.
    /// Unregistering a device twice is a no-op.
    pub fn unregister(&self, device: &CaptureDevice) {
        let removed = {
            let mut inner = self.inner.lock();
            let id = device.id();
            let is_same = inner
                .devices
                .get(&id)
                .is_some_and(|published| std::ptr::eq(published.as_ref(), device));

            if is_same {
                inner.devices.remove(&id);
                inner.allocated.remove(&id.as_u32());
            }
            is_same
        };

        device.mark_removed();

        if removed {
            info!(device = %device.node_name(), "Unregistered capture device");
        } else {
            debug!(device = %device.node_name(), "Device was not registered");
        }
    }

    /// Open a device for reading and polling.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if no device holds `id`.
    pub fn open(&self, id: DeviceId, mode: OpenMode) -> Result<CaptureFile> {
        let device = self.lookup(id)?;
        Ok(CaptureFile::new(device, mode))
    }
}
