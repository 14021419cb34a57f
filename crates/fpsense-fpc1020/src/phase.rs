//! Chip lifecycle phases.
//!
//! # Valid Transitions
//!
//! - Reset → Powering → PulsingReset → AwaitingReady → Identifying →
//!   Configuring → Armed
//! - any bring-up phase → Failed
//! - Armed → FingerPresent → Querying → Armed | FingerPresent
//! - Armed | FingerPresent | Querying → Idle
//! - Idle → FingerPresent | Armed
//! - any running phase → Sleeping → Armed
//!
//! Transitions are driven by hardware events, so an unexpected one is logged
//! rather than refused.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipPhase {
    Reset,
    Powering,
    PulsingReset,
    AwaitingReady,
    Identifying,
    Configuring,
    Armed,
    FingerPresent,
    Querying,
    Idle,
    Sleeping,
    Failed,
}

impl fmt::Display for ChipPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            ChipPhase::Reset => "Reset",
            ChipPhase::Powering => "Powering",
            ChipPhase::PulsingReset => "PulsingReset",
            ChipPhase::AwaitingReady => "AwaitingReady",
            ChipPhase::Identifying => "Identifying",
            ChipPhase::Configuring => "Configuring",
            ChipPhase::Armed => "Armed",
            ChipPhase::FingerPresent => "FingerPresent",
            ChipPhase::Querying => "Querying",
            ChipPhase::Idle => "Idle",
            ChipPhase::Sleeping => "Sleeping",
            ChipPhase::Failed => "Failed",
        };
        write!(f, "{phase}")
    }
}

impl ChipPhase {
    /// `true` while the chip is being brought up.
    pub fn is_bring_up(&self) -> bool {
        matches!(
            self,
            ChipPhase::Reset
                | ChipPhase::Powering
                | ChipPhase::PulsingReset
                | ChipPhase::AwaitingReady
                | ChipPhase::Identifying
                | ChipPhase::Configuring
        )
    }

    /// `true` once the chip is armed and detecting fingers.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ChipPhase::Armed | ChipPhase::FingerPresent | ChipPhase::Querying | ChipPhase::Idle
        )
    }

    pub fn can_transition_to(&self, target: &ChipPhase) -> bool {
        if *target == ChipPhase::Failed {
            return self.is_bring_up();
        }
        if *target == ChipPhase::Sleeping {
            return self.is_running();
        }

        matches!(
            (self, target),
            (ChipPhase::Reset, ChipPhase::Powering)
                | (ChipPhase::Powering, ChipPhase::PulsingReset)
                | (ChipPhase::PulsingReset, ChipPhase::AwaitingReady)
                | (ChipPhase::AwaitingReady, ChipPhase::Identifying)
                | (ChipPhase::Identifying, ChipPhase::Configuring)
                | (ChipPhase::Configuring, ChipPhase::Armed)
                | (ChipPhase::Armed, ChipPhase::FingerPresent)
                | (ChipPhase::FingerPresent, ChipPhase::FingerPresent | ChipPhase::Querying)
                | (ChipPhase::Querying, ChipPhase::Armed | ChipPhase::FingerPresent)
                | (
                    ChipPhase::Armed | ChipPhase::FingerPresent | ChipPhase::Querying,
                    ChipPhase::Idle
                )
                | (ChipPhase::Idle, ChipPhase::FingerPresent | ChipPhase::Armed)
                | (ChipPhase::Sleeping, ChipPhase::Armed)
        )
    }
}
