//! Command and register access on top of an [`SpiTransport`].

use crate::constants::{CMD_READ_IMAGE_DATA, SPI_CLOCK_HZ};
use crate::transport::{Segment, SpiMessage, SpiTransport};
use bytes::Bytes;
use fpsense_core::{Error, Result, TransportError};
use std::sync::atomic::{AtomicU8, Ordering};

/// Direction and buffer of a register access.
#[derive(Debug)]
pub enum RegisterAccess<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

/// Command/register channel to one FPC1020.
///
/// Remembers the last command sent; the interrupt dispatcher uses it to
/// interpret the next command-done interrupt.
#[derive(Debug)]
pub struct Fpc1020Bus<T> {
    transport: T,
    speed_hz: u32,
    last_command: AtomicU8,
}

impl<T: SpiTransport> Fpc1020Bus<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            speed_hz: SPI_CLOCK_HZ,
            last_command: AtomicU8::new(0),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Code of the most recently accepted command, `0` before the first.
    pub fn last_command(&self) -> u8 {
        self.last_command.load(Ordering::SeqCst)
    }

    /// Send a single-byte command.
    ///
    /// The command is recorded before the write so a command-done interrupt
    /// racing the write's return is matched against it. A failed write
    /// restores the previous value.
    pub async fn send_command(&self, command: u8) -> Result<()> {
        let previous = self.last_command.swap(command, Ordering::SeqCst);

        let message = SpiMessage::new(self.speed_hz).push(Segment::write(vec![command]));
        if let Err(source) = self.transport.transfer(message).await {
            let _ = self.last_command.compare_exchange(
                command,
                previous,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            return Err(Error::transport(format!("command {command:#04x}"), source));
        }
        Ok(())
    }

    /// Read or write `address`; the buffer length is the access length.
    pub async fn access_register(&self, address: u8, access: RegisterAccess<'_>) -> Result<()> {
        let context = || format!("register {address:#04x}");

        let message = SpiMessage::new(self.speed_hz).push(Segment::write(vec![address]));
        match access {
            RegisterAccess::Read(buf) => {
                let data = self
                    .transport
                    .transfer(message.push(Segment::Read {
                        len: buf.len(),
                        bits_per_word: Segment::register_word_size(buf.len()),
                    }))
                    .await
                    .map_err(|source| Error::transport(context(), source))?;

                if data.len() != buf.len() {
                    return Err(Error::transport(
                        context(),
                        TransportError::bus(format!(
                            "short read: expected {} bytes, got {}",
                            buf.len(),
                            data.len()
                        )),
                    ));
                }
                buf.copy_from_slice(&data);
            }
            RegisterAccess::Write(data) => {
                self.transport
                    .transfer(message.push(Segment::Write {
                        data: Bytes::copy_from_slice(data),
                        bits_per_word: Segment::register_word_size(data.len()),
                    }))
                    .await
                    .map_err(|source| Error::transport(context(), source))?;
            }
        }
        Ok(())
    }

    pub async fn read_u8(&self, address: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.access_register(address, RegisterAccess::Read(&mut buf))
            .await?;
        Ok(buf[0])
    }

    pub async fn read_u16(&self, address: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.access_register(address, RegisterAccess::Read(&mut buf))
            .await?;
        Ok(u16::from_be_bytes(buf))
    }

    pub async fn write_u8(&self, address: u8, value: u8) -> Result<()> {
        self.access_register(address, RegisterAccess::Write(&[value]))
            .await
    }

    pub async fn write_u16(&self, address: u8, value: u16) -> Result<()> {
        self.access_register(address, RegisterAccess::Write(&value.to_be_bytes()))
            .await
    }

    /// Second half of a capture: write the read-image command, skip one
    /// dummy byte and read `len` bytes of image data in the same message.
    pub async fn read_image(&self, len: usize) -> Result<Bytes> {
        let message = SpiMessage::new(self.speed_hz)
            .push(Segment::write(vec![CMD_READ_IMAGE_DATA]))
            .push(Segment::read(1))
            .push(Segment::read(len));

        let mut data = self
            .transport
            .transfer(message)
            .await
            .map_err(|source| {
                Error::transport(format!("command {CMD_READ_IMAGE_DATA:#04x}"), source)
            })?;

        if data.len() != len + 1 {
            return Err(Error::transport(
                "image read",
                TransportError::bus(format!(
                    "short read: expected {} bytes, got {}",
                    len + 1,
                    data.len()
                )),
            ));
        }
        Ok(data.split_off(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CMD_CAPTURE_IMAGE, REG_HWID};
    use crate::sim::SimulatedChip;

    #[tokio::test]
    async fn test_send_command_records_last() {
        let (chip, _irq) = SimulatedChip::new();
        let bus = Fpc1020Bus::new(chip.clone());

        assert_eq!(bus.last_command(), 0);
        bus.send_command(CMD_CAPTURE_IMAGE).await.unwrap();
        assert_eq!(bus.last_command(), CMD_CAPTURE_IMAGE);
        assert_eq!(chip.commands(), vec![CMD_CAPTURE_IMAGE]);
    }

    #[tokio::test]
    async fn test_failed_command_restores_last() {
        let (chip, _irq) = SimulatedChip::new();
        let bus = Fpc1020Bus::new(chip.clone());

        bus.send_command(CMD_CAPTURE_IMAGE).await.unwrap();
        chip.fail_transfers(true);

        let error = bus.send_command(0x20).await.unwrap_err();
        assert!(error.to_string().contains("command 0x20"));
        assert_eq!(bus.last_command(), CMD_CAPTURE_IMAGE);
    }

    #[tokio::test]
    async fn test_read_u16_is_big_endian() {
        let (chip, _irq) = SimulatedChip::new();
        chip.set_hardware_id(0x020a);
        let bus = Fpc1020Bus::new(chip);

        assert_eq!(bus.read_u16(REG_HWID).await.unwrap(), 0x020a);
    }

    #[tokio::test]
    async fn test_register_write_then_read() {
        let (chip, _irq) = SimulatedChip::new();
        let bus = Fpc1020Bus::new(chip.clone());

        bus.write_u16(0xa0, 0x1234).await.unwrap();
        assert_eq!(bus.read_u16(0xa0).await.unwrap(), 0x1234);
        assert_eq!(chip.register_writes(), vec![(0xa0, vec![0x12, 0x34])]);
    }

    #[tokio::test]
    async fn test_read_image_strips_dummy_byte() {
        let (chip, _irq) = SimulatedChip::new();
        chip.set_frame(vec![7u8; 16]);
        let bus = Fpc1020Bus::new(chip);

        let image = bus.read_image(16).await.unwrap();
        assert_eq!(image.len(), 16);
        assert!(image.iter().all(|&b| b == 7));
    }
}
