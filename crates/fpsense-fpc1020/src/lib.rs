//! Driver for the Fingerprint Cards FPC1020 swipe/area sensor.
//!
//! The driver speaks the chip's command/register protocol over an abstract
//! SPI transport, reacts to its interrupt line and exposes the sensor as a
//! capture device of the [`fpsense_class`] layer.
//!
//! # Components
//!
//! - [`Fpc1020`]: probe, power management and removal
//! - [`SpiTransport`] / [`PowerControl`]: the collaborators the driver is
//!   generic over
//! - [`ChipConfig`] / [`Timing`]: probe-time settings
//! - [`sim`]: an in-memory chip for tests and demos
//!
//! # Example
//!
//! ```
//! use fpsense_class::{DeviceRegistry, RegistryConfig};
//! use fpsense_core::OpenMode;
//! use fpsense_fpc1020::sim::{SimulatedChip, SimulatedPower};
//! use fpsense_fpc1020::{ChipConfig, Fpc1020, Timing};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> fpsense_core::Result<()> {
//! let registry = Arc::new(DeviceRegistry::new(RegistryConfig::default()));
//! let (chip, irq) = SimulatedChip::new();
//! let power = SimulatedPower::new(&chip);
//!
//! let driver = Fpc1020::probe(
//!     registry.clone(),
//!     chip.clone(),
//!     power,
//!     irq,
//!     ChipConfig::default(),
//!     Timing::default(),
//!     "spi0.0",
//! )
//! .await?;
//!
//! let mut file = registry.open(driver.device().id(), OpenMode::Blocking)?;
//! chip.place_finger();
//!
//! let mut frame = vec![0u8; driver.device().frame_size()];
//! let n = file.read(&mut frame).await?;
//! assert_eq!(n, 10752);
//!
//! chip.lift_finger();
//! driver.remove().await;
//! # Ok(())
//! # }
//! ```

mod bus;
mod capture;
mod chip;
mod completion;
mod irq;
mod worker;

pub mod config;
pub mod constants;
pub mod phase;
pub mod sim;
pub mod status;
pub mod transport;

pub use chip::Fpc1020;
pub use config::{ChipConfig, Timing};
pub use phase::ChipPhase;
pub use status::{ChipType, InterruptStatus};
pub use transport::{PowerControl, Segment, SpiMessage, SpiTransport};
