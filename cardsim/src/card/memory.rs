//! Card memory model
//!
//! A flat byte array addressed from 0, with the factory header, the
//! factory-readonly cells, runtime write protection and modification
//! tracking. Addresses past the end of memory behave like erased cells:
//! they read as `FF` and ignore writes.

use std::collections::BTreeSet;

use log::debug;
use serde::{Deserialize, Serialize};

use super::kind::CardKind;

/// Value of an erased cell
pub const ERASED: u8 = 0xFF;

/// Per-byte result of a WRITE MEMORY
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOutcome {
    /// Addresses that now hold the new value
    pub written: Vec<u16>,
    /// Addresses rejected because they are fixed at manufacture
    pub readonly_rejected: Vec<u16>,
    /// Addresses rejected because WRITE PROTECT locked them
    pub user_protected_rejected: Vec<u16>,
    /// Bytes that fell past the end of memory
    pub out_of_range: usize,
}

impl WriteOutcome {
    /// All rejected addresses, factory cells first
    pub fn protected(&self) -> Vec<u16> {
        let mut all = self.readonly_rejected.clone();
        all.extend_from_slice(&self.user_protected_rejected);
        all
    }

    /// True when every byte was written
    pub fn is_complete(&self) -> bool {
        self.readonly_rejected.is_empty()
            && self.user_protected_rejected.is_empty()
            && self.out_of_range == 0
    }
}

/// Display classification of one address, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressStatus {
    /// PSC cell (1K card only)
    Psc,
    /// Fixed at manufacture
    FactoryReadonly,
    /// Locked with WRITE PROTECT
    UserProtected,
    /// Differs from the factory image or was written this session
    Modified,
    /// Plain writable cell
    Writable,
}

/// Memory of one card
#[derive(Debug, Clone)]
pub struct MemoryStore {
    kind: CardKind,
    bytes: Vec<u8>,
    factory_snapshot: Vec<u8>,
    factory_readonly: BTreeSet<u16>,
    user_protected: BTreeSet<u16>,
    modified: BTreeSet<u16>,
    internal_psc: Option<Vec<u8>>,
}

impl MemoryStore {
    /// Create the memory of a card fresh from the factory
    pub fn new(kind: CardKind) -> Self {
        let image = Self::factory_image(kind);
        let internal_psc = match kind.psc_address() {
            Some(_) => None,
            None => Some(kind.default_psc()),
        };

        debug!("Initialized {} memory ({} bytes)", kind, kind.size());

        Self {
            kind,
            factory_snapshot: image.clone(),
            bytes: image,
            factory_readonly: kind.factory_readonly().into_iter().collect(),
            user_protected: BTreeSet::new(),
            modified: BTreeSet::new(),
            internal_psc,
        }
    }

    /// Memory content as it leaves the factory
    pub fn factory_image(kind: CardKind) -> Vec<u8> {
        let mut image = vec![ERASED; kind.size()];
        let header = kind.factory_header();
        image[..header.len()].copy_from_slice(&header);

        if let Some(addr) = kind.psc_address() {
            let start = addr as usize;
            image[start..start + kind.psc_length()].copy_from_slice(&kind.default_psc());
        }
        if let Some(addr) = kind.error_counter_address() {
            image[addr as usize] = kind.ladder()[0];
        }
        image
    }

    /// Card family
    pub fn kind(&self) -> CardKind {
        self.kind
    }

    /// Raw memory content
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Read `length` bytes from `address`; cells past the end read as `FF`
    pub fn read(&self, address: u16, length: usize) -> Vec<u8> {
        (0..length)
            .map(|i| {
                self.bytes
                    .get(address as usize + i)
                    .copied()
                    .unwrap_or(ERASED)
            })
            .collect()
    }

    /// Write `data` from `address`, gating every byte independently
    pub fn write(&mut self, address: u16, data: &[u8]) -> WriteOutcome {
        let mut outcome = WriteOutcome::default();

        for (i, &value) in data.iter().enumerate() {
            let target = address as usize + i;
            if target >= self.bytes.len() {
                outcome.out_of_range += 1;
                continue;
            }
            let addr = target as u16;
            if self.factory_readonly.contains(&addr) {
                outcome.readonly_rejected.push(addr);
            } else if self.user_protected.contains(&addr) {
                outcome.user_protected_rejected.push(addr);
            } else {
                self.bytes[target] = value;
                self.modified.insert(addr);
                outcome.written.push(addr);
            }
        }

        outcome
    }

    /// Factory-readonly or user-protected
    pub fn is_protected(&self, address: u16) -> bool {
        self.factory_readonly.contains(&address) || self.user_protected.contains(&address)
    }

    /// Fixed at manufacture
    pub fn is_factory_readonly(&self, address: u16) -> bool {
        self.factory_readonly.contains(&address)
    }

    /// Lock one address; addresses past the end are ignored
    pub fn protect(&mut self, address: u16) -> bool {
        if (address as usize) >= self.bytes.len() {
            return false;
        }
        self.user_protected.insert(address);
        true
    }

    /// Addresses locked with WRITE PROTECT
    pub fn user_protected(&self) -> &BTreeSet<u16> {
        &self.user_protected
    }

    /// Addresses written during this session
    pub fn modified(&self) -> &BTreeSet<u16> {
        &self.modified
    }

    /// Content differs from the factory image inside the user data area
    pub fn is_modified_from_factory(&self, address: u16) -> bool {
        let (start, end) = self.kind.user_area();
        if address < start || address > end {
            return false;
        }
        let idx = address as usize;
        match (self.bytes.get(idx), self.factory_snapshot.get(idx)) {
            (Some(current), Some(factory)) => current != factory,
            _ => false,
        }
    }

    /// Current PSC, wherever this family keeps it
    pub fn get_current_psc(&self) -> Vec<u8> {
        match (&self.internal_psc, self.kind.psc_address()) {
            (Some(psc), _) => psc.clone(),
            (None, Some(addr)) => self.read(addr, self.kind.psc_length()),
            (None, None) => self.kind.default_psc(),
        }
    }

    /// Replace the PSC; false (and no change) when the length is wrong
    ///
    /// # Panics
    ///
    /// Panics if `new_psc` has a length no card family uses.
    pub fn set_psc(&mut self, new_psc: &[u8]) -> bool {
        assert!(
            [CardKind::Small256, CardKind::Large1K]
                .iter()
                .any(|k| k.psc_length() == new_psc.len()),
            "PSC length {} matches no card family",
            new_psc.len()
        );

        if new_psc.len() != self.kind.psc_length() {
            return false;
        }

        match self.kind.psc_address() {
            None => {
                self.internal_psc = Some(new_psc.to_vec());
            }
            Some(addr) => {
                for (i, &b) in new_psc.iter().enumerate() {
                    let target = addr + i as u16;
                    self.bytes[target as usize] = b;
                    self.modified.insert(target);
                }
            }
        }
        true
    }

    /// Mirror the error counter into memory, if this family has a mirror cell
    pub fn mirror_counter(&mut self, value: u8) {
        if let Some(addr) = self.kind.error_counter_address() {
            if let Some(cell) = self.bytes.get_mut(addr as usize) {
                *cell = value;
            }
        }
    }

    /// Pack the protection state of the first `nbits` addresses
    ///
    /// Bit set means writable. Eight addresses per byte, LSB first.
    pub fn protection_bitmap(&self, nbits: usize) -> Vec<u8> {
        let mut bitmap = vec![0xFFu8; nbits.div_ceil(8)];
        for address in 0..nbits {
            if self.is_protected(address as u16) {
                bitmap[address / 8] &= !(1 << (address % 8));
            }
        }
        bitmap
    }

    /// Protection flag for every address
    pub fn protection_breakdown(&self) -> Vec<bool> {
        (0..self.bytes.len())
            .map(|addr| self.is_protected(addr as u16))
            .collect()
    }

    /// Classify an address for display
    pub fn address_status(&self, address: u16) -> AddressStatus {
        if let Some(psc) = self.kind.psc_address() {
            if (psc..psc + self.kind.psc_length() as u16).contains(&address) {
                return AddressStatus::Psc;
            }
        }
        if self.factory_readonly.contains(&address) {
            AddressStatus::FactoryReadonly
        } else if self.user_protected.contains(&address) {
            AddressStatus::UserProtected
        } else if self.is_modified_from_factory(address) || self.modified.contains(&address) {
            AddressStatus::Modified
        } else {
            AddressStatus::Writable
        }
    }

    /// Replace memory with a dump
    ///
    /// Short dumps are padded with erased cells; dumps larger than the card
    /// are rejected. The factory baseline is re-derived and the session's
    /// modification record cleared.
    pub fn load_dump(&mut self, dump: &[u8]) -> bool {
        if dump.len() > self.kind.size() {
            return false;
        }
        let mut bytes = dump.to_vec();
        bytes.resize(self.kind.size(), ERASED);

        self.bytes = bytes;
        self.factory_snapshot = Self::factory_image(self.kind);
        self.modified.clear();
        debug!("Loaded {} byte dump into {} memory", dump.len(), self.kind);
        true
    }

    /// Re-apply the session modification record (snapshot restore)
    pub(crate) fn mark_modified(&mut self, addresses: impl IntoIterator<Item = u16>) {
        let size = self.bytes.len();
        self.modified
            .extend(addresses.into_iter().filter(|&a| (a as usize) < size));
    }

    /// Internal PSC register (256-byte card only)
    pub(crate) fn internal_psc(&self) -> Option<&[u8]> {
        self.internal_psc.as_deref()
    }
}
