//! Interrupt dispatch.
//!
//! Each interrupt triggers one read of the clear-on-read status register.
//! The bits are then evaluated independently:
//!
//! | Bit             | Action                                              |
//! |-----------------|-----------------------------------------------------|
//! | ready (`0xff`)  | release the bring-up wait, nothing else             |
//! | error           | logged                                              |
//! | finger down     | report presence, schedule the presence query        |
//! | image available | release the capture wait                            |
//! | command done    | interpret against the last command, release waiters |
//!
//! `0xff` only means "ready" while the chip is being brought up. Once it is
//! running the same value is treated as every bit set.
//!
//! While the line is disabled the dispatcher only notes that an interrupt
//! arrived; the chip's status stays latched and is read on resume.

use crate::chip::Chip;
use crate::constants::{CMD_FINGER_PRESENT_QUERY, REG_INTERRUPT_CLEAR, STATUS_READY};
use crate::status::InterruptStatus;
use crate::transport::{PowerControl, SpiTransport};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Outcome of one interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IrqReturn {
    /// The status register could not be read.
    None,
    Handled,
}

pub(crate) async fn handle_interrupt<T, P>(chip: &Chip<T, P>) -> IrqReturn
where
    T: SpiTransport,
    P: PowerControl,
{
    let raw = match chip.bus.read_u8(REG_INTERRUPT_CLEAR).await {
        Ok(raw) => raw,
        Err(error) => {
            error!(
                chip = %chip.label,
                register = format_args!("{REG_INTERRUPT_CLEAR:#04x}"),
                %error,
                "Failed to read interrupt type"
            );
            return IrqReturn::None;
        }
    };
    trace!(chip = %chip.label, status = format_args!("{raw:#04x}"), "Interrupt");

    if raw == STATUS_READY && chip.phase().is_bring_up() {
        debug!(chip = %chip.label, "Chip came out of reset");
        chip.ready.complete_all();
        return IrqReturn::Handled;
    }

    let status = InterruptStatus::from_bits_retain(raw);

    if status.contains(InterruptStatus::ERROR) {
        error!(chip = %chip.label, "Received error interrupt");
    }

    let finger_down = status.contains(InterruptStatus::FINGER_DOWN);
    if finger_down && !chip.finger_down.swap(true, Ordering::SeqCst) {
        debug!(chip = %chip.label, "Finger down");
        chip.finger_presence_changed(true);
        chip.query.schedule();
    }

    if status.contains(InterruptStatus::IMAGE_AVAILABLE) {
        debug!(chip = %chip.label, "Image data available");
        chip.img_avail.complete_all();
    }

    if status.contains(InterruptStatus::COMMAND_DONE) {
        let command = chip.bus.last_command();
        trace!(chip = %chip.label, command = format_args!("{command:#04x}"), "Command done");

        if command == CMD_FINGER_PRESENT_QUERY {
            chip.finger_query_done().await;
        }
        chip.cmd_done.complete_all();
    }

    IrqReturn::Handled
}

pub(crate) async fn run_dispatcher<T, P>(
    chip: Arc<Chip<T, P>>,
    mut irq: mpsc::Receiver<()>,
    shutdown: CancellationToken,
) where
    T: SpiTransport,
    P: PowerControl,
{
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = irq.recv() => event,
        };

        if event.is_none() {
            debug!(chip = %chip.label, "Interrupt line closed");
            break;
        }

        if !chip.irq_enabled.load(Ordering::SeqCst) {
            trace!(chip = %chip.label, "Interrupt deferred while disabled");
            chip.irq_missed.store(true, Ordering::SeqCst);
            continue;
        }

        if handle_interrupt(&chip).await == IrqReturn::None {
            trace!(chip = %chip.label, "Interrupt not handled");
        }
    }
    debug!(chip = %chip.label, "Interrupt dispatcher stopped");
}
