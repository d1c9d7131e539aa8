//! Property-based tests for memory and counter invariants

use cardsim::card::{CardKind, MemoryStore};
use cardsim::psc::{ApduCommandProcessor, Command, ErrorCounterState};
use proptest::prelude::*;

fn any_kind() -> impl Strategy<Value = CardKind> {
    prop_oneof![Just(CardKind::Small256), Just(CardKind::Large1K)]
}

proptest! {
    #[test]
    fn prop_write_lands_only_on_writable_cells(
        kind in any_kind(),
        address in 0u16..0x420,
        data in prop::collection::vec(any::<u8>(), 1..64),
        locked in prop::collection::vec(0u16..0x400, 0..16),
    ) {
        let mut memory = MemoryStore::new(kind);
        for addr in &locked {
            memory.protect(*addr);
        }
        let before = memory.bytes().to_vec();
        let outcome = memory.write(address, &data);

        for (i, &value) in data.iter().enumerate() {
            let target = address as usize + i;
            if target >= kind.size() {
                continue;
            }
            if memory.is_protected(target as u16) {
                prop_assert_eq!(memory.bytes()[target], before[target]);
            } else {
                prop_assert_eq!(memory.bytes()[target], value);
            }
        }
        let in_range = data.len() - outcome.out_of_range;
        prop_assert_eq!(outcome.written.len() + outcome.protected().len(), in_range);
    }

    #[test]
    fn prop_bitmap_mirrors_protection(
        kind in any_kind(),
        locked in prop::collection::vec(0u16..0x400, 0..64),
    ) {
        let mut memory = MemoryStore::new(kind);
        for addr in &locked {
            memory.protect(*addr);
        }
        let nbits = kind.protection_bits();
        let bitmap = memory.protection_bitmap(nbits);
        prop_assert_eq!(bitmap.len(), nbits / 8);
        for address in 0..nbits {
            let writable = bitmap[address / 8] & (1 << (address % 8)) != 0;
            prop_assert_eq!(writable, !memory.is_protected(address as u16));
        }
    }

    #[test]
    fn prop_counter_blocks_for_good(
        kind in any_kind(),
        outcomes in prop::collection::vec(any::<bool>(), 1..32),
    ) {
        let mut counter = ErrorCounterState::new(kind);
        let mut was_blocked = false;
        for correct in outcomes {
            if counter.is_blocked() {
                was_blocked = true;
            }
            // a blocked card never sees the PSC compared
            if !counter.is_blocked() {
                if correct {
                    counter.record_success();
                } else {
                    counter.record_failure();
                }
            }
            if was_blocked {
                prop_assert!(counter.is_blocked());
                prop_assert_eq!(counter.value(), 0x00);
            }
        }
    }

    #[test]
    fn prop_blocked_card_memory_frozen(
        kind in any_kind(),
        address in 0u16..0x400,
        data in prop::collection::vec(any::<u8>(), 1..16),
    ) {
        let mut processor = ApduCommandProcessor::new(kind);
        let wrong = vec![0x00; kind.psc_length()];
        while !processor.is_blocked() {
            processor.execute(&Command::PresentPsc { psc: wrong.clone() });
        }
        let before = processor.memory().bytes().to_vec();

        for command in [
            Command::WriteMemory { address, data: data.clone() },
            Command::WriteProtect { address, pattern: data.clone() },
            Command::ChangePsc { new_psc: data.clone() },
            Command::PresentPsc { psc: kind.default_psc() },
        ] {
            let result = processor.execute(&command);
            prop_assert!(!result.success);
            prop_assert_eq!(result.status_word(), (0x69, 0x83));
        }
        prop_assert_eq!(processor.memory().bytes(), before.as_slice());
        prop_assert!(processor.is_blocked());
    }
}
