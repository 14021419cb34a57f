//! Interrupt status bits and hardware identification.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Bits of the interrupt status register.
    ///
    /// Several bits may be pending at once; each is handled independently.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InterruptStatus: u8 {
        const FINGER_DOWN = 1 << 0;
        const ERROR = 1 << 2;
        const IMAGE_AVAILABLE = 1 << 5;
        const COMMAND_DONE = 1 << 7;
    }
}

/// Chip type decoded from the hardware id register.
///
/// Displays as `FPC1` followed by the upper twelve bits in lower-case hex and
/// the low nibble in upper-case hex: `0x020a` is `FPC120A`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChipType(u16);

impl ChipType {
    pub fn from_hardware_id(id: u16) -> Self {
        Self(id)
    }

    pub fn hardware_id(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for ChipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FPC1{:x}{:X}", self.0 >> 4, self.0 & 0xf)
    }
}
