//! FPC1020 chip driver.
//!
//! [`Fpc1020::probe`] powers the chip, waits for it to come out of reset,
//! identifies and configures it, registers a capture device and arms finger
//! detection. Two background tasks then run for the lifetime of the driver:
//!
//! - the interrupt dispatcher, which reads the status register on every
//!   interrupt and acts on each bit
//! - the finger query worker, which waits the settle delay and asks the
//!   chip whether a finger is still present
//!
//! Frame captures run on the reader's task through the capability the
//! driver registers with the device.
//!
//! # Presence Loop
//!
//! ```text
//! wait-for-finger ──finger down──► report present ──settle──► query
//!        ▲                                                      │
//!        └──── report absent ◄── mask == 0 ── command done ◄────┘
//!                                 mask != 0 ──► settle again
//! ```

use crate::bus::Fpc1020Bus;
use crate::capture::Fpc1020Capture;
use crate::completion::Completion;
use crate::config::{ChipConfig, Timing, check_adc_gain, check_adc_shift};
use crate::constants::{
    BYTES_PER_PIXEL, CMD_CAPTURE_IMAGE, CMD_DEEP_SLEEP, CMD_FINGER_PRESENT_QUERY, CMD_SLEEP,
    CMD_WAIT_FOR_FINGER, COLUMNS, DEVICE_NAME, IMAGE_DATA_LEN, REG_ADC_SHIFT_GAIN,
    REG_FINGER_DETECT_THRESHOLD, REG_FINGER_PRESENT_STATUS, REG_HWID, ROWS, SUPPLIES,
};
use crate::irq::{handle_interrupt, run_dispatcher};
use crate::phase::ChipPhase;
use crate::status::ChipType;
use crate::transport::{PowerControl, SpiTransport};
use crate::worker::{FingerQuery, run_worker};
use bytes::Bytes;
use fpsense_class::{CaptureDevice, DeviceDescriptor, DeviceRegistry};
use fpsense_core::{Error, Geometry, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Bits of the ADC register kept when the shift is written.
const ADC_SHIFT_KEEP_MASK: u16 = 0x00ff;

/// Bits of the ADC register kept when the gain is written.
const ADC_GAIN_KEEP_MASK: u16 = 0xff80;

/// Driver state shared by the dispatcher, the worker and captures.
pub(crate) struct Chip<T, P> {
    pub(crate) bus: Fpc1020Bus<T>,
    pub(crate) power: P,
    pub(crate) timing: Timing,
    pub(crate) label: String,

    pub(crate) ready: Completion,
    pub(crate) cmd_done: Completion,
    pub(crate) img_avail: Completion,

    pub(crate) finger_down: AtomicBool,
    pub(crate) irq_enabled: AtomicBool,
    /// An interrupt arrived while the line was disabled.
    pub(crate) irq_missed: AtomicBool,
    pub(crate) query: FingerQuery,

    phase: Mutex<ChipPhase>,
    chip_type: OnceLock<ChipType>,
    device: OnceLock<Arc<CaptureDevice>>,
    capture_lock: tokio::sync::Mutex<()>,
}

impl<T, P> Chip<T, P>
where
    T: SpiTransport,
    P: PowerControl,
{
    pub(crate) fn new(
        transport: T,
        power: P,
        timing: Timing,
        label: String,
    ) -> (Self, mpsc::Receiver<()>) {
        let (query, requests) = FingerQuery::new();
        let chip = Self {
            bus: Fpc1020Bus::new(transport),
            power,
            timing,
            label,
            ready: Completion::new(),
            cmd_done: Completion::new(),
            img_avail: Completion::new(),
            finger_down: AtomicBool::new(false),
            irq_enabled: AtomicBool::new(true),
            irq_missed: AtomicBool::new(false),
            query,
            phase: Mutex::new(ChipPhase::Reset),
            chip_type: OnceLock::new(),
            device: OnceLock::new(),
            capture_lock: tokio::sync::Mutex::new(()),
        };
        (chip, requests)
    }

    pub(crate) fn phase(&self) -> ChipPhase {
        *self.phase.lock()
    }

    /// Move to `target`. Unexpected transitions are logged, not refused.
    pub(crate) fn set_phase(&self, target: ChipPhase) {
        let mut phase = self.phase.lock();
        if *phase == target {
            return;
        }
        if !phase.can_transition_to(&target) {
            warn!(chip = %self.label, from = %*phase, to = %target, "Unexpected phase transition");
        }
        trace!(chip = %self.label, from = %*phase, to = %target, "Phase transition");
        *phase = target;
    }

    pub(crate) fn attach_device(&self, device: Arc<CaptureDevice>) {
        if self.device.set(device).is_err() {
            warn!(chip = %self.label, "Capture device already attached");
        }
    }

    /// Record a presence edge and forward it to the capture device.
    pub(crate) fn finger_presence_changed(&self, down: bool) {
        self.set_phase(if down {
            ChipPhase::FingerPresent
        } else {
            ChipPhase::Armed
        });
        match self.device.get() {
            Some(device) => device.report_presence(down),
            None => debug!(chip = %self.label, down, "Presence change before registration"),
        }
    }

    /// Send a command, logging failures with the command code.
    async fn command(&self, command: u8, action: &str) -> Result<()> {
        self.bus.send_command(command).await.inspect_err(|error| {
            error!(
                chip = %self.label,
                command = format_args!("{command:#04x}"),
                %error,
                "Failed to {action}"
            );
        })
    }

    /// Deferred half of the presence loop: ask whether the finger is still
    /// there. The answer arrives as a command-done interrupt.
    pub(crate) async fn query_finger(&self) {
        if !self.irq_enabled.load(Ordering::SeqCst) {
            debug!(chip = %self.label, "Skipping finger query while suspended");
            return;
        }
        self.set_phase(ChipPhase::Querying);
        let _ = self
            .command(CMD_FINGER_PRESENT_QUERY, "query finger presence")
            .await;
    }

    /// Interpret command-done for a presence query.
    pub(crate) async fn finger_query_done(&self) {
        let mask = match self.bus.read_u16(REG_FINGER_PRESENT_STATUS).await {
            Ok(mask) => mask,
            Err(error) => {
                error!(
                    chip = %self.label,
                    register = format_args!("{REG_FINGER_PRESENT_STATUS:#04x}"),
                    %error,
                    "Failed to read finger present status"
                );
                self.set_phase(ChipPhase::FingerPresent);
                self.query.schedule();
                return;
            }
        };
        trace!(chip = %self.label, mask = format_args!("{mask:#06x}"), "Finger present status");

        if mask == 0 {
            debug!(chip = %self.label, "Finger up");
            self.finger_down.store(false, Ordering::SeqCst);
            self.finger_presence_changed(false);
            let _ = self
                .command(CMD_WAIT_FOR_FINGER, "set wait for finger mode")
                .await;
        } else {
            self.set_phase(ChipPhase::FingerPresent);
            self.query.schedule();
        }
    }

    /// Capture one frame.
    ///
    /// Only one capture runs at a time. Whenever the capture command was
    /// accepted the presence query is rescheduled, whatever the outcome.
    pub(crate) async fn capture(&self, cancel: &CancellationToken) -> Result<Bytes> {
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Interrupted),
            guard = self.capture_lock.lock() => guard,
        };

        self.command(CMD_CAPTURE_IMAGE, "send capture command")
            .await?;

        let result = self.read_captured_image(cancel).await;
        self.query.schedule();
        result
    }

    async fn read_captured_image(&self, cancel: &CancellationToken) -> Result<Bytes> {
        self.img_avail.wait(cancel).await?;
        self.img_avail.reinit();

        let frame = self.bus.read_image(IMAGE_DATA_LEN).await.inspect_err(|error| {
            error!(chip = %self.label, %error, "Failed to read image data");
        })?;
        trace!(chip = %self.label, len = frame.len(), "Image captured");
        Ok(frame)
    }

    pub(crate) async fn set_adc_shift(&self, shift: u8) -> Result<()> {
        check_adc_shift(shift)?;
        let current = self.bus.read_u16(REG_ADC_SHIFT_GAIN).await?;
        let value = (current & ADC_SHIFT_KEEP_MASK) | (u16::from(shift) << 8);
        self.bus.write_u16(REG_ADC_SHIFT_GAIN, value).await
    }

    pub(crate) async fn set_adc_gain(&self, gain: u8) -> Result<()> {
        check_adc_gain(gain)?;
        let current = self.bus.read_u16(REG_ADC_SHIFT_GAIN).await?;
        let value = (current & ADC_GAIN_KEEP_MASK) | u16::from(gain);
        self.bus.write_u16(REG_ADC_SHIFT_GAIN, value).await
    }

    pub(crate) async fn set_det_threshold(&self, threshold: u8) -> Result<()> {
        self.bus.write_u8(REG_FINGER_DETECT_THRESHOLD, threshold).await
    }

    async fn configure(&self, config: &ChipConfig) -> Result<()> {
        if let Some(shift) = config.adc_shift {
            self.set_adc_shift(shift).await.inspect_err(|error| {
                error!(chip = %self.label, %error, "Failed to set ADC shift");
            })?;
            debug!(chip = %self.label, shift, "ADC shift set");
        }
        if let Some(gain) = config.adc_gain {
            self.set_adc_gain(gain).await.inspect_err(|error| {
                error!(chip = %self.label, %error, "Failed to set ADC gain");
            })?;
            debug!(chip = %self.label, gain, "ADC gain set");
        }
        if let Some(threshold) = config.det_threshold {
            self.set_det_threshold(threshold).await.inspect_err(|error| {
                error!(chip = %self.label, %error, "Failed to set detection threshold");
            })?;
            debug!(chip = %self.label, threshold, "Detection threshold set");
        }
        Ok(())
    }
}

/// A probed FPC1020.
///
/// Dropping the driver unregisters its capture device and stops the
/// background tasks; [`Fpc1020::remove`] additionally waits for the tasks
/// and powers the chip down.
///
/// # Examples
///
/// ```
/// use fpsense_class::{DeviceRegistry, RegistryConfig};
/// use fpsense_fpc1020::sim::{SimulatedChip, SimulatedPower};
/// use fpsense_fpc1020::{ChipConfig, Fpc1020, Timing};
/// use std::sync::Arc;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> fpsense_core::Result<()> {
/// let registry = Arc::new(DeviceRegistry::new(RegistryConfig::default()));
/// let (chip, irq) = SimulatedChip::new();
/// let power = SimulatedPower::new(&chip);
///
/// let driver = Fpc1020::probe(
///     registry.clone(),
///     chip,
///     power,
///     irq,
///     ChipConfig::default(),
///     Timing::default(),
///     "spi0.0",
/// )
/// .await?;
///
/// assert_eq!(driver.device().geometry().frame_size(), 10752);
/// driver.remove().await;
/// # Ok(())
/// # }
/// ```
pub struct Fpc1020<T, P>
where
    T: SpiTransport,
    P: PowerControl,
{
    chip: Arc<Chip<T, P>>,
    device: Arc<CaptureDevice>,
    registry: Arc<DeviceRegistry>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Background tasks of a driver being brought up.
struct BringUp<T, P> {
    chip: Arc<Chip<T, P>>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl<T, P> BringUp<T, P>
where
    T: SpiTransport,
    P: PowerControl,
{
    async fn abort(self, error: Error, powered: bool) -> Error {
        self.chip.set_phase(ChipPhase::Failed);
        error!(chip = %self.chip.label, %error, "Failed to probe chip");

        if powered
            && let Err(source) = self.chip.power.disable_supplies(SUPPLIES).await
        {
            error!(chip = %self.chip.label, error = %source, "Failed to disable supplies");
        }
        stop_tasks(&self.shutdown, self.tasks).await;
        error
    }
}

/// A freshly registered device, unregistered on drop unless disarmed.
struct Published<'a> {
    registry: &'a DeviceRegistry,
    device: Arc<CaptureDevice>,
    armed: bool,
}

impl<'a> Published<'a> {
    fn new(registry: &'a DeviceRegistry, device: Arc<CaptureDevice>) -> Self {
        Self {
            registry,
            device,
            armed: true,
        }
    }

    fn disarm(mut self) -> Arc<CaptureDevice> {
        self.armed = false;
        self.device.clone()
    }
}

impl Drop for Published<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.registry.unregister(&self.device);
        }
    }
}

async fn stop_tasks(shutdown: &CancellationToken, tasks: Vec<JoinHandle<()>>) {
    shutdown.cancel();
    for task in tasks {
        if let Err(error) = task.await {
            warn!(%error, "Background task ended abnormally");
        }
    }
}

impl<T, P> Fpc1020<T, P>
where
    T: SpiTransport,
    P: PowerControl,
{
    /// Bring up the chip and register its capture device.
    ///
    /// `irq` delivers one unit event per interrupt; `parent` labels the
    /// device's parent in its attributes and in logs.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidConfiguration` if `config` is out of range; the chip
    ///   is not touched
    /// - `Error::Timeout` if the chip does not signal ready in time
    /// - `Error::TransportFailure` if any exchange fails
    /// - any registration error from the registry
    ///
    /// On failure after power-on the supplies are disabled again and no
    /// device stays registered.
    pub async fn probe(
        registry: Arc<DeviceRegistry>,
        transport: T,
        power: P,
        irq: mpsc::Receiver<()>,
        config: ChipConfig,
        timing: Timing,
        parent: &str,
    ) -> Result<Self> {
        config.validate()?;

        let (chip, requests) = Chip::new(transport, power, timing, parent.to_string());
        let chip = Arc::new(chip);
        let shutdown = CancellationToken::new();
        // Stops the tasks if probe itself is dropped midway.
        let abandoned = shutdown.clone().drop_guard();
        let tasks = vec![
            tokio::spawn(run_dispatcher(chip.clone(), irq, shutdown.clone())),
            tokio::spawn(run_worker(chip.clone(), requests, shutdown.clone())),
        ];
        let bring_up = BringUp {
            chip: chip.clone(),
            shutdown: shutdown.clone(),
            tasks,
        };

        chip.set_phase(ChipPhase::Powering);
        if let Err(source) = chip.power.enable_supplies(SUPPLIES).await {
            let error = Error::transport("enable supplies", source);
            return Err(bring_up.abort(error, false).await);
        }

        let published = match Self::bring_up(&chip, &registry, &config).await {
            Ok(published) => published,
            Err(error) => return Err(bring_up.abort(error, true).await),
        };

        chip.set_phase(ChipPhase::Armed);
        let device = published.disarm();
        info!(chip = %chip.label, device = %device.node_name(), "Finger detection armed");

        abandoned.disarm();
        let BringUp {
            chip,
            shutdown,
            tasks,
        } = bring_up;
        Ok(Self {
            chip,
            device,
            registry,
            shutdown,
            tasks,
        })
    }

    async fn bring_up<'a>(
        chip: &Arc<Chip<T, P>>,
        registry: &'a DeviceRegistry,
        config: &ChipConfig,
    ) -> Result<Published<'a>> {
        chip.set_phase(ChipPhase::PulsingReset);
        chip.power
            .set_reset(true)
            .await
            .map_err(|source| Error::transport("reset line", source))?;
        tokio::time::sleep(chip.timing.reset_pulse).await;
        chip.power
            .set_reset(false)
            .await
            .map_err(|source| Error::transport("reset line", source))?;

        chip.set_phase(ChipPhase::AwaitingReady);
        chip.ready
            .wait_timeout(chip.timing.ready_timeout)
            .await
            .inspect_err(|error| {
                error!(chip = %chip.label, %error, "Failed to power-on chip");
            })?;

        chip.set_phase(ChipPhase::Identifying);
        let hardware_id = chip.bus.read_u16(REG_HWID).await.inspect_err(|error| {
            error!(
                chip = %chip.label,
                register = format_args!("{REG_HWID:#04x}"),
                %error,
                "Failed to read HW ID"
            );
        })?;
        let chip_type = ChipType::from_hardware_id(hardware_id);
        let _ = chip.chip_type.set(chip_type);
        info!(chip = %chip.label, "Chip type: {chip_type}");

        chip.set_phase(ChipPhase::Configuring);
        chip.configure(config).await?;

        let descriptor = DeviceDescriptor::new(
            DEVICE_NAME,
            Geometry::new(COLUMNS, ROWS, BYTES_PER_PIXEL),
        )
        .with_parent(chip.label.clone());
        let capability = Arc::new(Fpc1020Capture::new(Arc::downgrade(chip)));
        let published = Published::new(registry, registry.register(descriptor, capability)?);
        chip.attach_device(published.device.clone());

        chip.command(CMD_WAIT_FOR_FINGER, "start waiting for finger").await?;
        Ok(published)
    }

    /// The registered capture device.
    pub fn device(&self) -> &Arc<CaptureDevice> {
        &self.device
    }

    pub fn phase(&self) -> ChipPhase {
        self.chip.phase()
    }

    /// Chip type read during identification.
    pub fn chip_type(&self) -> Option<ChipType> {
        self.chip.chip_type.get().copied()
    }

    /// Code of the last command accepted by the chip.
    pub fn last_command(&self) -> u8 {
        self.chip.bus.last_command()
    }

    pub fn transport(&self) -> &T {
        self.chip.bus.transport()
    }

    /// Enter deep sleep and stop handling interrupts.
    ///
    /// Finger detection is off until [`resume`](Self::resume).
    pub async fn suspend(&self) -> Result<()> {
        self.chip
            .command(CMD_DEEP_SLEEP, "enter deep sleep")
            .await?;
        self.chip.irq_enabled.store(false, Ordering::SeqCst);
        self.chip.set_phase(ChipPhase::Sleeping);
        debug!(chip = %self.chip.label, "Suspended");
        Ok(())
    }

    /// Re-enable interrupts and re-arm finger detection.
    ///
    /// If an interrupt was discarded while suspended, the status register
    /// is read and dispatched once. A finger still marked present from
    /// before the suspend gets a fresh presence query so its removal is
    /// noticed.
    pub async fn resume(&self) -> Result<()> {
        self.chip.irq_enabled.store(true, Ordering::SeqCst);
        self.chip
            .command(CMD_WAIT_FOR_FINGER, "start waiting for finger")
            .await?;
        self.chip.set_phase(ChipPhase::Armed);

        if self.chip.irq_missed.swap(false, Ordering::SeqCst) {
            debug!(chip = %self.chip.label, "Dispatching interrupt missed while suspended");
            handle_interrupt(&self.chip).await;
        }

        if self.chip.finger_down.load(Ordering::SeqCst) {
            self.chip.query.schedule();
        }
        debug!(chip = %self.chip.label, "Resumed");
        Ok(())
    }

    /// Enter sleep mode, lowering the finger query frequency.
    pub async fn idle(&self) -> Result<()> {
        self.chip.command(CMD_SLEEP, "enter sleep").await?;
        self.chip.set_phase(ChipPhase::Idle);
        Ok(())
    }

    /// Unregister the device, stop the background tasks and power down.
    pub async fn remove(mut self) {
        self.registry.unregister(&self.device);

        let tasks = std::mem::take(&mut self.tasks);
        stop_tasks(&self.shutdown, tasks).await;

        if let Err(error) = self.chip.power.disable_supplies(SUPPLIES).await {
            error!(chip = %self.chip.label, %error, "Failed to disable supplies");
        }
        info!(chip = %self.chip.label, "Removed");
    }
}

impl<T, P> Drop for Fpc1020<T, P>
where
    T: SpiTransport,
    P: PowerControl,
{
    fn drop(&mut self) {
        self.registry.unregister(&self.device);
        self.shutdown.cancel();
    }
}
