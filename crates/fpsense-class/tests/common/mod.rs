//! Common test utilities for class layer integration tests.

#![allow(dead_code)]

use fpsense_class::mock::MockCapability;
use fpsense_class::{CaptureDevice, DeviceDescriptor, DeviceRegistry, RegistryConfig};
use fpsense_core::Geometry;
use std::sync::Arc;

/// Registry with a small identity pool.
pub fn small_registry(max_devices: usize) -> DeviceRegistry {
    DeviceRegistry::new(RegistryConfig { max_devices })
}

/// Deterministic frame of `len` bytes.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

/// Register a mock-backed device whose capture returns `pattern(frame_size)`.
pub fn register_mock(
    registry: &DeviceRegistry,
    geometry: Geometry,
) -> (Arc<CaptureDevice>, Arc<MockCapability>) {
    let capability = Arc::new(MockCapability::with_frame(pattern(geometry.frame_size())));
    let device = registry
        .register(DeviceDescriptor::new("mock", geometry), capability.clone())
        .expect("mock registration");
    (device, capability)
}

/// Single-threaded runtime for driving async code inside proptest bodies.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}
