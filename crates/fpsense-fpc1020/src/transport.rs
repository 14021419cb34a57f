//! Collaborators the chip driver is built on.
//!
//! The driver never touches a bus or a GPIO directly. It is generic over an
//! [`SpiTransport`] that executes SPI messages and a [`PowerControl`] that
//! switches the supplies and drives the reset line. Interrupts arrive
//! separately, as unit events on an `mpsc` channel handed to
//! [`Fpc1020::probe`](crate::Fpc1020::probe).
//!
//! Both traits use return-position `impl Future + Send` so implementors can
//! write plain `async fn` while the driver can still run their futures on
//! spawned tasks.

use bytes::Bytes;
use fpsense_core::TransportError;
use std::future::Future;

/// One phase of an SPI message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Clock out `data`.
    Write { data: Bytes, bits_per_word: u8 },

    /// Clock in `len` bytes.
    Read { len: usize, bits_per_word: u8 },
}

impl Segment {
    /// Byte-wide write.
    pub fn write(data: impl Into<Bytes>) -> Self {
        Segment::Write {
            data: data.into(),
            bits_per_word: 8,
        }
    }

    /// Byte-wide read.
    pub fn read(len: usize) -> Self {
        Segment::Read {
            len,
            bits_per_word: 8,
        }
    }

    /// Word size for a register data phase of `len` bytes.
    ///
    /// 2- and 4-byte values are clocked as a single word so the controller
    /// keeps their byte order; anything else goes byte by byte.
    pub fn register_word_size(len: usize) -> u8 {
        if len % 2 == 0 && len <= 4 {
            (8 * len) as u8
        } else {
            8
        }
    }

    pub fn bits_per_word(&self) -> u8 {
        match self {
            Segment::Write { bits_per_word, .. } | Segment::Read { bits_per_word, .. } => {
                *bits_per_word
            }
        }
    }
}

/// Chip-select-framed sequence of segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiMessage {
    pub speed_hz: u32,
    pub segments: Vec<Segment>,
}

impl SpiMessage {
    pub fn new(speed_hz: u32) -> Self {
        Self {
            speed_hz,
            segments: Vec::new(),
        }
    }

    pub fn push(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    /// Total bytes clocked in by the read segments.
    pub fn read_len(&self) -> usize {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Read { len, .. } => *len,
                Segment::Write { .. } => 0,
            })
            .sum()
    }
}

/// Synchronous SPI message execution.
///
/// A message runs atomically with chip select held for its whole duration.
/// Implementations must tolerate calls from several tasks at once.
pub trait SpiTransport: Send + Sync + 'static {
    /// Run `message` and return the bytes of all its read segments,
    /// concatenated in order.
    fn transfer(
        &self,
        message: SpiMessage,
    ) -> impl Future<Output = Result<Bytes, TransportError>> + Send;
}

/// Supply and reset line control.
pub trait PowerControl: Send + Sync + 'static {
    /// Enable every named supply, in order.
    fn enable_supplies(
        &self,
        supplies: &'static [&'static str],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Disable every named supply.
    fn disable_supplies(
        &self,
        supplies: &'static [&'static str],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Drive the reset line; `true` holds the chip in reset.
    fn set_reset(&self, asserted: bool) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 8)]
    #[case(2, 16)]
    #[case(3, 8)]
    #[case(4, 32)]
    #[case(6, 8)]
    fn test_register_word_size(#[case] len: usize, #[case] expected: u8) {
        assert_eq!(Segment::register_word_size(len), expected);
    }

    #[test]
    fn test_message_read_len() {
        let message = SpiMessage::new(1_000_000)
            .push(Segment::write(vec![0xc4]))
            .push(Segment::read(1))
            .push(Segment::read(10));
        assert_eq!(message.read_len(), 11);
        assert_eq!(message.segments[0].bits_per_word(), 8);
    }
}
