//! Probe-time configuration.

use crate::constants::{ADC_GAIN_MAX, ADC_SHIFT_MAX, FINGER_QUERY_DELAY, READY_TIMEOUT, RESET_PULSE};
use fpsense_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Optional analog front-end settings applied after identification.
///
/// Every field is optional; an absent value leaves the chip's reset default
/// in place. Keys are kebab-case (`adc-shift`, `adc-gain`, `det-threshold`).
///
/// # Examples
///
/// ```
/// use fpsense_fpc1020::ChipConfig;
///
/// let config: ChipConfig = serde_json::from_str(r#"{ "adc-gain": 10 }"#).unwrap();
/// assert_eq!(config.adc_gain, Some(10));
/// assert_eq!(config.adc_shift, None);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ChipConfig {
    /// ADC shift, 0–31.
    pub adc_shift: Option<u8>,

    /// ADC gain, 0–15.
    pub adc_gain: Option<u8>,

    /// Finger detection threshold.
    pub det_threshold: Option<u8>,
}

impl ChipConfig {
    /// Check present values are in range.
    ///
    /// # Errors
    /// Returns `Error::InvalidConfiguration` naming the offending value.
    pub fn validate(&self) -> Result<()> {
        if let Some(shift) = self.adc_shift {
            check_adc_shift(shift)?;
        }
        if let Some(gain) = self.adc_gain {
            check_adc_gain(gain)?;
        }
        Ok(())
    }
}

pub(crate) fn check_adc_shift(shift: u8) -> Result<()> {
    if shift > ADC_SHIFT_MAX {
        return Err(Error::invalid_configuration(format!(
            "ADC shift must be 0-{ADC_SHIFT_MAX}, got {shift}"
        )));
    }
    Ok(())
}

pub(crate) fn check_adc_gain(gain: u8) -> Result<()> {
    if gain > ADC_GAIN_MAX {
        return Err(Error::invalid_configuration(format!(
            "ADC gain must be 0-{ADC_GAIN_MAX}, got {gain}"
        )));
    }
    Ok(())
}

/// Delays used by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Bring-up window for the ready interrupt.
    pub ready_timeout: Duration,

    /// Settle delay before each finger presence query.
    pub finger_query_delay: Duration,

    /// Width of the reset pulse.
    pub reset_pulse: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            ready_timeout: READY_TIMEOUT,
            finger_query_delay: FINGER_QUERY_DELAY,
            reset_pulse: RESET_PULSE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_is_empty() {
        let config = ChipConfig::default();
        assert_eq!(config.adc_shift, None);
        assert_eq!(config.adc_gain, None);
        assert_eq!(config.det_threshold, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_kebab_case() {
        let config: ChipConfig =
            serde_json::from_str(r#"{ "adc-shift": 24, "adc-gain": 10, "det-threshold": 80 }"#)
                .unwrap();
        assert_eq!(
            config,
            ChipConfig {
                adc_shift: Some(24),
                adc_gain: Some(10),
                det_threshold: Some(80),
            }
        );
    }

    #[rstest]
    #[case(Some(32), None)]
    #[case(None, Some(16))]
    #[case(Some(255), Some(255))]
    fn test_validate_out_of_range(#[case] adc_shift: Option<u8>, #[case] adc_gain: Option<u8>) {
        let config = ChipConfig {
            adc_shift,
            adc_gain,
            det_threshold: None,
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[rstest]
    #[case(0, 0)]
    #[case(31, 15)]
    fn test_validate_bounds(#[case] shift: u8, #[case] gain: u8) {
        let config = ChipConfig {
            adc_shift: Some(shift),
            adc_gain: Some(gain),
            det_threshold: Some(255),
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timing_default() {
        let timing = Timing::default();
        assert_eq!(timing.ready_timeout, Duration::from_millis(1300));
        assert_eq!(timing.finger_query_delay, Duration::from_millis(20));
        assert_eq!(timing.reset_pulse, Duration::from_millis(1));
    }
}
