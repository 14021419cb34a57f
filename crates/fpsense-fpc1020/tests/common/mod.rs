//! Common test utilities for driver integration tests.

#![allow(dead_code)]

use fpsense_class::{DeviceRegistry, RegistryConfig};
use fpsense_core::Result;
use fpsense_fpc1020::sim::{SimulatedChip, SimulatedPower};
use fpsense_fpc1020::{ChipConfig, Fpc1020, Timing};
use std::sync::Arc;
use std::time::Duration;

pub const PARENT: &str = "spi0.0";

pub type SimDriver = Fpc1020<SimulatedChip, SimulatedPower>;

/// A simulated chip that has not been probed yet.
pub struct Bench {
    pub registry: Arc<DeviceRegistry>,
    pub chip: SimulatedChip,
    pub power: SimulatedPower,
    irq: tokio::sync::mpsc::Receiver<()>,
}

impl Bench {
    pub fn new() -> Self {
        Self::with_registry(Arc::new(DeviceRegistry::new(RegistryConfig::default())))
    }

    /// A fresh chip sharing an existing registry.
    pub fn with_registry(registry: Arc<DeviceRegistry>) -> Self {
        let (chip, irq) = SimulatedChip::new();
        let power = SimulatedPower::new(&chip);
        Self {
            registry,
            chip,
            power,
            irq,
        }
    }

    pub async fn probe(self, config: ChipConfig) -> (Result<SimDriver>, Rig) {
        let result = Fpc1020::probe(
            self.registry.clone(),
            self.chip.clone(),
            self.power.clone(),
            self.irq,
            config,
            Timing::default(),
            PARENT,
        )
        .await;

        let rig = Rig {
            registry: self.registry,
            chip: self.chip,
            power: self.power,
        };
        (result, rig)
    }
}

/// Handles kept by a test after probing.
pub struct Rig {
    pub registry: Arc<DeviceRegistry>,
    pub chip: SimulatedChip,
    pub power: SimulatedPower,
}

/// Probe with the default configuration, panicking on failure.
pub async fn probed() -> (SimDriver, Rig) {
    let (result, rig) = Bench::new().probe(ChipConfig::default()).await;
    (result.expect("probe"), rig)
}

/// Deterministic frame of `len` bytes.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 13 % 256) as u8).collect()
}

/// Let the dispatcher and worker catch up, including settle delays.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
