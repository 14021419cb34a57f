//! Simulated FPC1020 for tests and the CLI.
//!
//! [`SimulatedChip`] answers SPI messages the way the sensor does and raises
//! interrupts on the channel returned by [`SimulatedChip::new`].
//! [`SimulatedPower`] drives its reset line and tracks the supplies.
//!
//! # Behaviour
//!
//! - Releasing reset raises the ready pattern (`0xff`).
//! - Every command except deep sleep raises command-done.
//! - Capture raises image-available together with command-done.
//! - Wait-for-finger and sleep arm finger detection; placing a finger on an
//!   armed chip raises finger-down.
//! - The presence status register reads non-zero while a finger is placed.
//! - Reading the interrupt clear register returns and clears pending bits.
//!
//! # Examples
//!
//! ```
//! use fpsense_fpc1020::sim::{SimulatedChip, SimulatedPower};
//!
//! let (chip, irq) = SimulatedChip::new();
//! let power = SimulatedPower::new(&chip);
//! chip.place_finger();
//! assert!(chip.finger_placed());
//! assert!(!power.supplies_enabled());
//! # drop(irq);
//! ```

use crate::constants::{
    CMD_CAPTURE_IMAGE, CMD_DEEP_SLEEP, CMD_FINGER_PRESENT_QUERY, CMD_READ_IMAGE_DATA, CMD_SLEEP,
    CMD_WAIT_FOR_FINGER, IMAGE_DATA_LEN, REG_ADC_SHIFT_GAIN, REG_FINGER_DETECT_THRESHOLD,
    REG_FINGER_PRESENT_STATUS, REG_HWID, REG_INTERRUPT, REG_INTERRUPT_CLEAR, STATUS_READY,
};
use crate::status::InterruptStatus;
use crate::transport::{PowerControl, Segment, SpiMessage, SpiTransport};
use bytes::{BufMut, Bytes, BytesMut};
use fpsense_core::TransportError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

const IRQ_CHANNEL_CAPACITY: usize = 16;

/// Presence status reported while a finger covers the sensor.
const FINGER_PRESENT_MASK: u16 = 0x0fff;

#[derive(Debug)]
struct SimState {
    pending: u8,
    registers: BTreeMap<u8, Vec<u8>>,
    frame: Vec<u8>,
    finger: bool,
    detecting: bool,
    in_reset: bool,
    respond_to_reset: bool,
    hold_image: bool,
    fail_transfers: bool,
    failing_registers: BTreeSet<u8>,
    failing_commands: BTreeSet<u8>,
    stalled_commands: BTreeSet<u8>,
    line_detached: bool,
    commands: Vec<u8>,
    register_writes: Vec<(u8, Vec<u8>)>,
}

impl Default for SimState {
    fn default() -> Self {
        let registers = BTreeMap::from([
            (REG_HWID, 0x020a_u16.to_be_bytes().to_vec()),
            (REG_ADC_SHIFT_GAIN, 0x0a05_u16.to_be_bytes().to_vec()),
            (REG_FINGER_DETECT_THRESHOLD, vec![0x50]),
        ]);

        Self {
            pending: 0,
            registers,
            frame: (0..IMAGE_DATA_LEN).map(|i| (i % 251) as u8).collect(),
            finger: false,
            detecting: false,
            in_reset: false,
            respond_to_reset: true,
            hold_image: false,
            fail_transfers: false,
            failing_registers: BTreeSet::new(),
            failing_commands: BTreeSet::new(),
            stalled_commands: BTreeSet::new(),
            line_detached: false,
            commands: Vec::new(),
            register_writes: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SimState>,
    irq: mpsc::Sender<()>,
}

/// In-memory FPC1020.
///
/// Cloning yields another handle to the same chip.
#[derive(Debug, Clone)]
pub struct SimulatedChip {
    shared: Arc<Shared>,
}

impl SimulatedChip {
    /// Create a chip and the interrupt line it raises.
    pub fn new() -> (Self, mpsc::Receiver<()>) {
        let (irq, irq_rx) = mpsc::channel(IRQ_CHANNEL_CAPACITY);
        let chip = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(SimState::default()),
                irq,
            }),
        };
        (chip, irq_rx)
    }

    /// Put a finger on the sensor.
    pub fn place_finger(&self) {
        let mut state = self.shared.state.lock();
        state.finger = true;
        if state.detecting {
            state.detecting = false;
            self.raise(&mut state, InterruptStatus::FINGER_DOWN.bits());
        }
    }

    /// Lift the finger. The chip only notices on the next presence query.
    pub fn lift_finger(&self) {
        self.shared.state.lock().finger = false;
    }

    pub fn finger_placed(&self) -> bool {
        self.shared.state.lock().finger
    }

    /// Set `bits` pending and pulse the interrupt line.
    pub fn raise_interrupt(&self, bits: u8) {
        let mut state = self.shared.state.lock();
        self.raise(&mut state, bits);
    }

    pub fn set_hardware_id(&self, id: u16) {
        self.set_register(REG_HWID, &id.to_be_bytes());
    }

    /// Overwrite a register without logging a write.
    pub fn set_register(&self, address: u8, value: &[u8]) {
        self.shared
            .state
            .lock()
            .registers
            .insert(address, value.to_vec());
    }

    pub fn register(&self, address: u8) -> Option<Vec<u8>> {
        self.shared.state.lock().registers.get(&address).cloned()
    }

    /// Image returned by the next read-image exchange.
    pub fn set_frame(&self, frame: impl Into<Vec<u8>>) {
        self.shared.state.lock().frame = frame.into();
    }

    /// Stay silent when reset is released.
    pub fn set_respond_to_reset(&self, respond: bool) {
        self.shared.state.lock().respond_to_reset = respond;
    }

    /// Withhold image-available after capture commands.
    pub fn hold_image(&self, hold: bool) {
        self.shared.state.lock().hold_image = hold;
    }

    /// Fail every transfer while `fail` is set.
    pub fn fail_transfers(&self, fail: bool) {
        self.shared.state.lock().fail_transfers = fail;
    }

    /// Fail every access to `address`.
    pub fn fail_register(&self, address: u8) {
        self.shared.state.lock().failing_registers.insert(address);
    }

    /// Fail every write of `command`.
    pub fn fail_command(&self, command: u8) {
        self.shared.state.lock().failing_commands.insert(command);
    }

    /// Never complete writes of `command`.
    pub fn stall_command(&self, command: u8) {
        self.shared.state.lock().stalled_commands.insert(command);
    }

    /// Latch status bits without signalling them on the interrupt line.
    pub fn detach_interrupt_line(&self, detached: bool) {
        self.shared.state.lock().line_detached = detached;
    }

    /// Commands received so far, in order.
    pub fn commands(&self) -> Vec<u8> {
        self.shared.state.lock().commands.clone()
    }

    /// Register writes received so far, in order.
    pub fn register_writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.shared.state.lock().register_writes.clone()
    }

    fn raise(&self, state: &mut SimState, bits: u8) {
        state.pending |= bits;
        trace!(pending = format_args!("{:#04x}", state.pending), "Raising interrupt");
        if state.line_detached {
            return;
        }
        // A full line still carries the merged bits on the next read.
        let _ = self.shared.irq.try_send(());
    }

    fn set_reset(&self, asserted: bool) {
        let mut state = self.shared.state.lock();
        if asserted {
            state.in_reset = true;
            state.pending = 0;
            state.detecting = false;
        } else if state.in_reset {
            state.in_reset = false;
            if state.respond_to_reset {
                self.raise(&mut state, STATUS_READY);
            }
        }
    }

    fn execute_command(&self, state: &mut SimState, command: u8) {
        state.commands.push(command);
        match command {
            CMD_DEEP_SLEEP => {
                state.detecting = false;
                return;
            }
            CMD_WAIT_FOR_FINGER | CMD_SLEEP => {
                if state.finger {
                    self.raise(state, InterruptStatus::FINGER_DOWN.bits());
                } else {
                    state.detecting = true;
                }
            }
            CMD_CAPTURE_IMAGE => {
                state.detecting = false;
                if !state.hold_image {
                    self.raise(state, InterruptStatus::IMAGE_AVAILABLE.bits());
                }
            }
            CMD_FINGER_PRESENT_QUERY => state.detecting = false,
            _ => {}
        }
        self.raise(state, InterruptStatus::COMMAND_DONE.bits());
    }

    fn read_register(state: &mut SimState, address: u8, len: usize) -> Vec<u8> {
        let mut value = match address {
            REG_INTERRUPT_CLEAR => vec![std::mem::take(&mut state.pending)],
            REG_INTERRUPT => vec![state.pending],
            REG_FINGER_PRESENT_STATUS => {
                let mask = if state.finger { FINGER_PRESENT_MASK } else { 0 };
                mask.to_be_bytes().to_vec()
            }
            _ => state.registers.get(&address).cloned().unwrap_or_default(),
        };
        value.resize(len, 0);
        value
    }

    fn read_image(state: &SimState, len: usize) -> Bytes {
        let mut reply = BytesMut::with_capacity(len + 1);
        reply.put_u8(0);
        let mut frame = state.frame.clone();
        frame.resize(len, 0);
        reply.put_slice(&frame);
        reply.freeze()
    }

    fn stalls(&self, message: &SpiMessage) -> bool {
        match message.segments.as_slice() {
            [Segment::Write { data, .. }] if data.len() == 1 => {
                self.shared.state.lock().stalled_commands.contains(&data[0])
            }
            _ => false,
        }
    }

    fn handle(&self, message: &SpiMessage) -> Result<Bytes, TransportError> {
        let mut state = self.shared.state.lock();
        if state.fail_transfers {
            return Err(TransportError::bus("simulated transfer failure"));
        }

        let (head, rest) = match message.segments.split_first() {
            Some((Segment::Write { data, .. }, rest)) if data.len() == 1 => (data[0], rest),
            _ => return Err(TransportError::bus("message must start with a one-byte write")),
        };

        match rest {
            [] => {
                if state.failing_commands.contains(&head) {
                    return Err(TransportError::bus(format!("command {head:#04x} rejected")));
                }
                self.execute_command(&mut state, head);
                Ok(Bytes::new())
            }
            [Segment::Read { .. }, Segment::Read { len, .. }] if head == CMD_READ_IMAGE_DATA => {
                Ok(Self::read_image(&state, *len))
            }
            [Segment::Read { len, .. }] => {
                if state.failing_registers.contains(&head) {
                    return Err(TransportError::bus(format!("register {head:#04x} not responding")));
                }
                Ok(Bytes::from(Self::read_register(&mut state, head, *len)))
            }
            [Segment::Write { data, .. }] => {
                if state.failing_registers.contains(&head) {
                    return Err(TransportError::bus(format!("register {head:#04x} not responding")));
                }
                state.registers.insert(head, data.to_vec());
                state.register_writes.push((head, data.to_vec()));
                Ok(Bytes::new())
            }
            _ => Err(TransportError::bus("unsupported message layout")),
        }
    }
}

impl SpiTransport for SimulatedChip {
    async fn transfer(&self, message: SpiMessage) -> Result<Bytes, TransportError> {
        if self.stalls(&message) {
            return std::future::pending().await;
        }
        self.handle(&message)
    }
}

#[derive(Debug, Default)]
struct PowerState {
    enabled: Vec<&'static str>,
    fail_enable: bool,
    enable_count: usize,
    disable_count: usize,
}

/// Supplies and reset line of a [`SimulatedChip`].
#[derive(Debug, Clone)]
pub struct SimulatedPower {
    chip: SimulatedChip,
    state: Arc<Mutex<PowerState>>,
}

impl SimulatedPower {
    pub fn new(chip: &SimulatedChip) -> Self {
        Self {
            chip: chip.clone(),
            state: Arc::new(Mutex::new(PowerState::default())),
        }
    }

    pub fn supplies_enabled(&self) -> bool {
        !self.state.lock().enabled.is_empty()
    }

    /// Names of the supplies currently on, in enable order.
    pub fn enabled_supplies(&self) -> Vec<&'static str> {
        self.state.lock().enabled.clone()
    }

    pub fn enable_count(&self) -> usize {
        self.state.lock().enable_count
    }

    pub fn disable_count(&self) -> usize {
        self.state.lock().disable_count
    }

    /// Make supply enable fail while `fail` is set.
    pub fn fail_enable(&self, fail: bool) {
        self.state.lock().fail_enable = fail;
    }
}

impl PowerControl for SimulatedPower {
    async fn enable_supplies(
        &self,
        supplies: &'static [&'static str],
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        if state.fail_enable {
            return Err(TransportError::bus("regulator refused to enable"));
        }
        state.enabled = supplies.to_vec();
        state.enable_count += 1;
        Ok(())
    }

    async fn disable_supplies(
        &self,
        supplies: &'static [&'static str],
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.enabled.retain(|name| !supplies.contains(name));
        state.disable_count += 1;
        Ok(())
    }

    async fn set_reset(&self, asserted: bool) -> Result<(), TransportError> {
        self.chip.set_reset(asserted);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SUPPLIES;

    fn command(code: u8) -> SpiMessage {
        SpiMessage::new(1_000_000).push(Segment::write(vec![code]))
    }

    fn read_status(chip: &SimulatedChip) -> u8 {
        let message = SpiMessage::new(1_000_000)
            .push(Segment::write(vec![REG_INTERRUPT_CLEAR]))
            .push(Segment::read(1));
        chip.handle(&message).unwrap()[0]
    }

    #[tokio::test]
    async fn test_reset_release_raises_ready() {
        let (chip, mut irq) = SimulatedChip::new();
        let power = SimulatedPower::new(&chip);

        power.set_reset(true).await.unwrap();
        power.set_reset(false).await.unwrap();

        assert_eq!(irq.try_recv(), Ok(()));
        assert_eq!(read_status(&chip), STATUS_READY);
        assert_eq!(read_status(&chip), 0);
    }

    #[tokio::test]
    async fn test_silent_reset() {
        let (chip, mut irq) = SimulatedChip::new();
        chip.set_respond_to_reset(false);
        let power = SimulatedPower::new(&chip);

        power.set_reset(true).await.unwrap();
        power.set_reset(false).await.unwrap();
        assert!(irq.try_recv().is_err());
    }

    #[test]
    fn test_finger_down_only_when_detecting() {
        let (chip, mut irq) = SimulatedChip::new();
        chip.place_finger();
        assert!(irq.try_recv().is_err());

        chip.lift_finger();
        chip.handle(&command(CMD_WAIT_FOR_FINGER)).unwrap();
        assert_eq!(read_status(&chip), InterruptStatus::COMMAND_DONE.bits());

        chip.place_finger();
        assert_eq!(read_status(&chip), InterruptStatus::FINGER_DOWN.bits());
    }

    #[test]
    fn test_capture_raises_image_available() {
        let (chip, _irq) = SimulatedChip::new();
        chip.handle(&command(CMD_CAPTURE_IMAGE)).unwrap();

        let status = InterruptStatus::from_bits_retain(read_status(&chip));
        assert!(status.contains(InterruptStatus::IMAGE_AVAILABLE | InterruptStatus::COMMAND_DONE));
    }

    #[test]
    fn test_deep_sleep_is_silent() {
        let (chip, _irq) = SimulatedChip::new();
        chip.handle(&command(CMD_DEEP_SLEEP)).unwrap();
        assert_eq!(read_status(&chip), 0);
        assert_eq!(chip.commands(), vec![CMD_DEEP_SLEEP]);
    }

    #[test]
    fn test_failing_command() {
        let (chip, _irq) = SimulatedChip::new();
        chip.fail_command(CMD_SLEEP);
        assert!(chip.handle(&command(CMD_SLEEP)).is_err());
        assert!(chip.commands().is_empty());
    }

    #[test]
    fn test_detached_line_still_latches() {
        let (chip, mut irq) = SimulatedChip::new();
        chip.detach_interrupt_line(true);
        chip.raise_interrupt(InterruptStatus::FINGER_DOWN.bits());

        assert!(irq.try_recv().is_err());
        assert_eq!(read_status(&chip), InterruptStatus::FINGER_DOWN.bits());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_command_never_completes() {
        let (chip, _irq) = SimulatedChip::new();
        chip.stall_command(CMD_SLEEP);

        let stalled = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            chip.transfer(command(CMD_SLEEP)),
        )
        .await;
        assert!(stalled.is_err());
        assert!(chip.commands().is_empty());

        chip.transfer(command(CMD_DEEP_SLEEP)).await.unwrap();
        assert_eq!(chip.commands(), vec![CMD_DEEP_SLEEP]);
    }

    #[tokio::test]
    async fn test_power_tracks_supplies() {
        let (chip, _irq) = SimulatedChip::new();
        let power = SimulatedPower::new(&chip);

        power.enable_supplies(SUPPLIES).await.unwrap();
        assert_eq!(power.enabled_supplies(), vec!["vcc", "vdda", "vddio"]);

        power.disable_supplies(SUPPLIES).await.unwrap();
        assert!(!power.supplies_enabled());
        assert_eq!(power.enable_count(), 1);
        assert_eq!(power.disable_count(), 1);
    }
}
