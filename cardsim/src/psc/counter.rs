//! Error counter ladders
//!
//! Each family degrades its counter along a fixed ladder: one step per
//! wrong PSC, back to the top on a correct one. The last step blocks the
//! card for good.

use serde::{Deserialize, Serialize};

use crate::card::CardKind;

/// Stateless ladder arithmetic
pub struct ErrorCounterPolicy;

impl ErrorCounterPolicy {
    /// Index of the blocked step
    fn last_index(kind: CardKind) -> usize {
        kind.ladder().len() - 1
    }

    /// Counter byte at `index`, clamped to the blocked step
    pub fn value_at(kind: CardKind, index: usize) -> u8 {
        kind.ladder()[index.min(Self::last_index(kind))]
    }

    /// Whether `index` is the blocked step
    pub fn is_blocked(kind: CardKind, index: usize) -> bool {
        index >= Self::last_index(kind)
    }

    /// Wrong presentations left before the card blocks
    pub fn remaining_attempts(kind: CardKind, index: usize) -> u32 {
        Self::last_index(kind).saturating_sub(index) as u32
    }

    /// Index after a correct PSC
    pub fn on_success(_kind: CardKind) -> usize {
        0
    }

    /// Index after a wrong PSC; stays put once blocked
    pub fn on_failure(kind: CardKind, index: usize) -> usize {
        (index + 1).min(Self::last_index(kind))
    }

    /// Ladder index of a raw counter byte
    ///
    /// Unknown bytes map to the blocked step, never to an open one.
    pub fn index_of(kind: CardKind, raw: u8) -> usize {
        kind.ladder()
            .iter()
            .position(|&v| v == raw)
            .unwrap_or_else(|| Self::last_index(kind))
    }
}

/// Position of one card on its ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCounterState {
    kind: CardKind,
    index: usize,
}

impl ErrorCounterState {
    /// Fresh counter (all attempts available)
    pub fn new(kind: CardKind) -> Self {
        Self { kind, index: 0 }
    }

    /// Counter restored from a raw byte, fail-safe toward blocked
    pub fn from_raw(kind: CardKind, raw: u8) -> Self {
        Self {
            kind,
            index: ErrorCounterPolicy::index_of(kind, raw),
        }
    }

    /// Current raw counter byte
    pub fn value(&self) -> u8 {
        ErrorCounterPolicy::value_at(self.kind, self.index)
    }

    /// Current ladder index
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_blocked(&self) -> bool {
        ErrorCounterPolicy::is_blocked(self.kind, self.index)
    }

    pub fn remaining_attempts(&self) -> u32 {
        ErrorCounterPolicy::remaining_attempts(self.kind, self.index)
    }

    /// Record a correct PSC
    pub fn record_success(&mut self) {
        self.index = ErrorCounterPolicy::on_success(self.kind);
    }

    /// Record a wrong PSC
    pub fn record_failure(&mut self) {
        self.index = ErrorCounterPolicy::on_failure(self.kind, self.index);
    }

    /// Back to the top of the ladder
    pub fn reset(&mut self) {
        self.index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KINDS: [CardKind; 2] = [CardKind::Small256, CardKind::Large1K];

    #[test]
    fn test_failures_reach_blocked() {
        for kind in KINDS {
            let steps = kind.ladder().len() - 1;
            let mut index = 0;
            for _ in 0..steps {
                assert!(!ErrorCounterPolicy::is_blocked(kind, index));
                index = ErrorCounterPolicy::on_failure(kind, index);
            }
            assert!(ErrorCounterPolicy::is_blocked(kind, index));
            assert_eq!(ErrorCounterPolicy::value_at(kind, index), 0x00);
            // idempotent once blocked
            assert_eq!(ErrorCounterPolicy::on_failure(kind, index), index);
        }
    }

    #[test]
    fn test_success_resets() {
        for kind in KINDS {
            let mut state = ErrorCounterState::new(kind);
            for _ in 0..kind.ladder().len() {
                state.record_failure();
                let mut probe = state;
                probe.record_success();
                assert_eq!(probe.index(), 0);
            }
            assert_eq!(ErrorCounterPolicy::on_success(kind), 0);
            assert_eq!(
                ErrorCounterPolicy::remaining_attempts(kind, 0),
                (kind.ladder().len() - 1) as u32
            );
        }
    }

    #[test]
    fn test_small_ladder_values() {
        let kind = CardKind::Small256;
        let values: Vec<u8> = (0..4).map(|i| ErrorCounterPolicy::value_at(kind, i)).collect();
        assert_eq!(values, vec![0x07, 0x03, 0x01, 0x00]);
        assert_eq!(ErrorCounterPolicy::remaining_attempts(kind, 0), 3);
        assert_eq!(ErrorCounterPolicy::remaining_attempts(kind, 2), 1);
    }

    #[test]
    fn test_large_ladder_values() {
        let kind = CardKind::Large1K;
        assert_eq!(ErrorCounterPolicy::value_at(kind, 0), 0xFF);
        assert_eq!(ErrorCounterPolicy::value_at(kind, 1), 0x7F);
        assert_eq!(ErrorCounterPolicy::value_at(kind, 7), 0x40);
        assert_eq!(ErrorCounterPolicy::remaining_attempts(kind, 0), 7);
    }

    #[test]
    fn test_value_at_clamps() {
        assert_eq!(ErrorCounterPolicy::value_at(CardKind::Small256, 42), 0x00);
    }

    #[test]
    fn test_index_of() {
        assert_eq!(ErrorCounterPolicy::index_of(CardKind::Small256, 0x03), 1);
        assert_eq!(ErrorCounterPolicy::index_of(CardKind::Large1K, 0x7C), 3);
        // unknown values are treated as blocked
        assert_eq!(ErrorCounterPolicy::index_of(CardKind::Small256, 0x05), 3);
        assert_eq!(ErrorCounterPolicy::index_of(CardKind::Large1K, 0x3F), 8);
    }

    #[test]
    fn test_state_transitions() {
        let mut state = ErrorCounterState::new(CardKind::Small256);
        assert_eq!(state.value(), 0x07);
        state.record_failure();
        state.record_failure();
        assert_eq!(state.value(), 0x01);
        assert_eq!(state.remaining_attempts(), 1);
        state.record_success();
        assert_eq!(state.value(), 0x07);
        state.record_failure();
        state.record_failure();
        state.record_failure();
        assert!(state.is_blocked());
        state.reset();
        assert!(!state.is_blocked());
    }

    #[test]
    fn test_from_raw() {
        let state = ErrorCounterState::from_raw(CardKind::Large1K, 0x78);
        assert_eq!(state.index(), 4);
        assert!(ErrorCounterState::from_raw(CardKind::Large1K, 0x12).is_blocked());
    }
}
