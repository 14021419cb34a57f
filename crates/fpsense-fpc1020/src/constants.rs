//! FPC1020 wire protocol constants.
//!
//! Command codes are single bytes written on their own. Registers are
//! accessed with a one-byte address followed by the data phase; multi-byte
//! register values are big-endian on the wire.

use std::time::Duration;

// ============================================================================
// Timing
// ============================================================================

/// Time the chip may take to signal readiness after reset (TIRQVALID).
pub const READY_TIMEOUT: Duration = Duration::from_millis(1300);

/// Debounce before querying whether a finger is still present.
pub const FINGER_QUERY_DELAY: Duration = Duration::from_millis(20);

/// Width of the reset pulse.
pub const RESET_PULSE: Duration = Duration::from_millis(1);

/// SPI clock used for every transfer.
pub const SPI_CLOCK_HZ: u32 = 8_000_000;

// ============================================================================
// Geometry
// ============================================================================

pub const ROWS: usize = 56;
pub const COLUMNS: usize = 192;
pub const BYTES_PER_PIXEL: usize = 1;

/// Length of the image data phase of a read-image exchange.
pub const IMAGE_DATA_LEN: usize = ROWS * COLUMNS * BYTES_PER_PIXEL;

/// Name the capture device is registered under.
pub const DEVICE_NAME: &str = "fpc1020";

// ============================================================================
// Commands
// ============================================================================

pub const CMD_FINGER_PRESENT_QUERY: u8 = 0x20;
pub const CMD_WAIT_FOR_FINGER: u8 = 0x24;
pub const CMD_SLEEP: u8 = 0x28;
pub const CMD_DEEP_SLEEP: u8 = 0x2c;
pub const CMD_CAPTURE_IMAGE: u8 = 0xc0;
pub const CMD_READ_IMAGE_DATA: u8 = 0xc4;

// ============================================================================
// Registers
// ============================================================================

/// Pending interrupt bits, not cleared by reading.
pub const REG_INTERRUPT: u8 = 0x18;
/// Pending interrupt bits, cleared by reading.
pub const REG_INTERRUPT_CLEAR: u8 = 0x1c;
pub const REG_FINGER_DRIVE_CONF: u8 = 0x8c;
pub const REG_ADC_SHIFT_GAIN: u8 = 0xa0;
pub const REG_FINGER_PRESENT_STATUS: u8 = 0xd4;
pub const REG_FINGER_DETECT_THRESHOLD: u8 = 0xd8;
pub const REG_HWID: u8 = 0xfc;

pub const REG_INTERRUPT_SIZE: usize = 1;
pub const REG_ADC_SHIFT_GAIN_SIZE: usize = 2;
pub const REG_FINGER_PRESENT_STATUS_SIZE: usize = 2;
pub const REG_FINGER_DETECT_THRESHOLD_SIZE: usize = 1;
pub const REG_HWID_SIZE: usize = 2;

/// Interrupt status read right after the chip comes out of reset.
pub const STATUS_READY: u8 = 0xff;

// ============================================================================
// Configuration limits
// ============================================================================

pub const ADC_SHIFT_MAX: u8 = 0x1f;
pub const ADC_GAIN_MAX: u8 = 0x0f;

// ============================================================================
// Power
// ============================================================================

/// Supplies enabled together at power-on.
pub const SUPPLIES: &[&str] = &["vcc", "vdda", "vddio"];
