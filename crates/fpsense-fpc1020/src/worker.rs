//! Deferred finger presence query.
//!
//! The dispatcher must not sleep, so the settle delay and the query command
//! run on a separate task. Requests coalesce: scheduling while a run is
//! already pending does nothing.

use crate::chip::Chip;
use crate::transport::{PowerControl, SpiTransport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Handle for scheduling the presence query.
#[derive(Debug)]
pub(crate) struct FingerQuery {
    requests: mpsc::Sender<()>,
}

impl FingerQuery {
    pub(crate) fn new() -> (Self, mpsc::Receiver<()>) {
        let (requests, rx) = mpsc::channel(1);
        (Self { requests }, rx)
    }

    pub(crate) fn schedule(&self) {
        match self.requests.try_send(()) {
            Ok(()) => trace!("Finger query scheduled"),
            Err(TrySendError::Full(())) => trace!("Finger query already pending"),
            Err(TrySendError::Closed(())) => debug!("Finger query worker stopped"),
        }
    }
}

pub(crate) async fn run_worker<T, P>(
    chip: Arc<Chip<T, P>>,
    mut requests: mpsc::Receiver<()>,
    shutdown: CancellationToken,
) where
    T: SpiTransport,
    P: PowerControl,
{
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            request = requests.recv() => {
                if request.is_none() {
                    break;
                }
            }
        }

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(chip.timing.finger_query_delay) => {}
        }

        chip.query_finger().await;
    }
    debug!(chip = %chip.label, "Finger query worker stopped");
}
