//! Session security flags
//!
//! Tracks selection and PSC verification for the current session.

use serde::{Deserialize, Serialize};

/// Session-level conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityCondition {
    /// SELECT CARD TYPE succeeded
    Selected,
    /// Correct PSC presented
    PscVerified,
    /// PSC changed at least once (one-way latch)
    PscChanged,
}

/// Tracks security state for the current session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityState {
    selected: bool,
    psc_verified: bool,
    psc_ever_changed: bool,
}

impl SecurityState {
    /// Create a new security state
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore flags from saved values
    pub fn from_flags(selected: bool, psc_verified: bool, psc_ever_changed: bool) -> Self {
        Self {
            selected,
            psc_verified,
            psc_ever_changed,
        }
    }

    /// Set a condition
    pub fn set_verified(&mut self, condition: SecurityCondition) {
        match condition {
            SecurityCondition::Selected => self.selected = true,
            SecurityCondition::PscVerified => self.psc_verified = true,
            SecurityCondition::PscChanged => self.psc_ever_changed = true,
        }
    }

    /// Check a condition
    pub fn is_verified(&self, condition: SecurityCondition) -> bool {
        match condition {
            SecurityCondition::Selected => self.selected,
            SecurityCondition::PscVerified => self.psc_verified,
            SecurityCondition::PscChanged => self.psc_ever_changed,
        }
    }

    /// Clear a condition; the PSC-changed latch never clears
    pub fn clear(&mut self, condition: SecurityCondition) {
        match condition {
            SecurityCondition::Selected => self.selected = false,
            SecurityCondition::PscVerified => self.psc_verified = false,
            SecurityCondition::PscChanged => {}
        }
    }

    /// Clear selection and verification (card removed or reset)
    pub fn clear_all(&mut self) {
        self.selected = false;
        self.psc_verified = false;
    }
}
