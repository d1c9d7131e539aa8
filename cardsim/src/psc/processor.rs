//! Memory-card command interpreter
//!
//! Builds the reader APDU for each command, runs it against the card's
//! memory and error counter, and reports a [`CommandResult`]. Protocol
//! failures (wrong PSC, blocked card, bad lengths) are results, never
//! errors.

use log::{debug, info, warn};

use crate::apdu::{ins, Response, APDU, SW};
use crate::card::{atr, CardKind, MemoryStore, WriteOutcome};
use crate::util::{format_hex, to_ascii};
use super::counter::ErrorCounterState;

/// Largest READ MEMORY transfer
pub const MAX_READ_LENGTH: usize = 256;

/// Largest data field of a short APDU
pub const MAX_DATA_LENGTH: usize = 255;

const BLOCKED_MESSAGE: &str = "Card is PERMANENTLY BLOCKED. Only SELECT and READ operations allowed.";

/// A memory-card command with its parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SelectCard,
    ReadMemory { address: u16, length: usize },
    PresentPsc { psc: Vec<u8> },
    WriteMemory { address: u16, data: Vec<u8> },
    ChangePsc { new_psc: Vec<u8> },
    ReadErrorCounter,
    ReadProtectionBits,
    WriteProtect { address: u16, pattern: Vec<u8> },
}

impl Command {
    /// Identifier used by the permission table
    pub fn name(&self) -> &'static str {
        match self {
            Command::SelectCard => "select_card",
            Command::ReadMemory { .. } => "read_memory",
            Command::PresentPsc { .. } => "present_psc",
            Command::WriteMemory { .. } => "write_memory",
            Command::ChangePsc { .. } => "change_psc",
            Command::ReadErrorCounter => "read_error_counter",
            Command::ReadProtectionBits => "read_protection_bits",
            Command::WriteProtect { .. } => "write_protect",
        }
    }

    /// Title used in the audit log
    pub fn title(&self) -> &'static str {
        match self {
            Command::SelectCard => "SELECT CARD",
            Command::ReadMemory { .. } => "READ MEMORY",
            Command::PresentPsc { .. } => "PRESENT PSC",
            Command::WriteMemory { .. } => "WRITE MEMORY",
            Command::ChangePsc { .. } => "CHANGE PSC",
            Command::ReadErrorCounter => "READ ERROR COUNTER",
            Command::ReadProtectionBits => "READ PROTECTION BITS",
            Command::WriteProtect { .. } => "WRITE PROTECT",
        }
    }

    /// Commands a blocked card still answers
    pub fn allowed_when_blocked(&self) -> bool {
        matches!(
            self,
            Command::SelectCard
                | Command::ReadMemory { .. }
                | Command::ReadErrorCounter
                | Command::ReadProtectionBits
        )
    }

    /// Memory address the command targets, if any
    pub fn address(&self) -> Option<u16> {
        match self {
            Command::ReadMemory { address, .. }
            | Command::WriteMemory { address, .. }
            | Command::WriteProtect { address, .. } => Some(*address),
            _ => None,
        }
    }

    /// Commands that need a verified PSC at the session layer
    pub fn requires_psc(&self) -> bool {
        matches!(
            self,
            Command::WriteMemory { .. } | Command::ChangePsc { .. } | Command::WriteProtect { .. }
        )
    }
}

/// State change reported alongside a result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Nothing changed
    None,
    /// Card answered the reset
    Selected,
    /// PSC compared against the card
    PscChecked {
        verified: bool,
        counter: u8,
        remaining: u32,
        blocked: bool,
        /// Correct PSC, shown after a failure while attempts remain
        hint: Option<Vec<u8>>,
    },
    /// WRITE MEMORY outcome per address
    Written(WriteOutcome),
    /// PSC replaced
    PscChanged,
    /// Counter value reported by READ ERROR COUNTER
    Counter { value: u8, remaining: u32 },
    /// WRITE PROTECT outcome
    Protected {
        addresses: Vec<u16>,
        unmatched: Vec<u16>,
    },
    /// Refused before touching the card
    Refused,
}

/// Outcome of one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Log title of the command
    pub command: &'static str,
    /// APDU bytes sent to the card (empty when refused locally)
    pub apdu: Vec<u8>,
    /// Response data and status word
    pub response: Response,
    pub success: bool,
    pub message: String,
    /// Printable rendering of read or written data
    pub ascii: Option<String>,
    pub effect: Effect,
}

impl CommandResult {
    fn new(command: &Command, apdu: Vec<u8>, response: Response, success: bool, message: String) -> Self {
        Self {
            command: command.title(),
            apdu,
            response,
            success,
            message,
            ascii: None,
            effect: Effect::None,
        }
    }

    /// Local refusal with no APDU sent
    pub fn refused(command: &Command, sw: u16, message: impl Into<String>) -> Self {
        let mut result = Self::new(command, Vec::new(), Response::error(sw), false, message.into());
        result.effect = Effect::Refused;
        result
    }

    fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = effect;
        self
    }

    fn with_ascii(mut self, data: &[u8]) -> Self {
        self.ascii = Some(to_ascii(data));
        self
    }

    /// Status word as (SW1, SW2)
    pub fn status_word(&self) -> (u8, u8) {
        self.response.status_word()
    }

    /// Response data bytes
    pub fn response_data(&self) -> &[u8] {
        &self.response.data
    }

    /// Card refused the command because it is blocked
    pub fn is_blocked(&self) -> bool {
        SW::is_blocked(self.response.sw())
    }
}

/// Interprets memory-card commands against one card
#[derive(Debug, Clone)]
pub struct ApduCommandProcessor {
    kind: CardKind,
    memory: MemoryStore,
    counter: ErrorCounterState,
}

impl ApduCommandProcessor {
    /// Processor for a factory-fresh card
    pub fn new(kind: CardKind) -> Self {
        let mut memory = MemoryStore::new(kind);
        let counter = ErrorCounterState::new(kind);
        memory.mirror_counter(counter.value());
        Self {
            kind,
            memory,
            counter,
        }
    }

    /// Build the reader APDU for a command
    ///
    /// Shared with the physical-card bridge so both targets see identical
    /// bytes. Data fields longer than a short APDU allows are truncated to
    /// [`MAX_DATA_LENGTH`]; the processor refuses such commands first.
    /// Addresses the card cannot encode must be rejected with
    /// [`CardKind::encodes_address`] before calling this.
    pub fn build_apdu(kind: CardKind, command: &Command) -> APDU {
        let data_field = |data: &[u8]| data[..data.len().min(MAX_DATA_LENGTH)].to_vec();

        match command {
            Command::SelectCard => {
                APDU::with_data(ins::SELECT_CARD_TYPE, 0x00, 0x00, vec![kind.select_code()])
            }
            Command::ReadMemory { address, length } => {
                let (p1, p2) = kind.address_bytes(*address);
                let le = (*length).clamp(1, MAX_READ_LENGTH) as u32;
                APDU::with_le(ins::READ_MEMORY, p1, p2, le)
            }
            Command::PresentPsc { psc } => {
                APDU::with_data(ins::PRESENT_PSC, 0x00, 0x00, data_field(psc))
            }
            Command::WriteMemory { address, data } => {
                let (p1, p2) = kind.address_bytes(*address);
                APDU::with_data(ins::WRITE_MEMORY, p1, p2, data_field(data))
            }
            Command::ChangePsc { new_psc } => match kind.psc_address() {
                // PSC held in an internal register
                None => APDU::with_data(ins::CHANGE_PSC, 0x00, 0x01, data_field(new_psc)),
                // PSC stored in memory: plain write to its cells
                Some(addr) => {
                    let (p1, p2) = kind.address_bytes(addr);
                    APDU::with_data(ins::WRITE_MEMORY, p1, p2, data_field(new_psc))
                }
            },
            Command::ReadErrorCounter => APDU::with_le(
                ins::READ_ERROR_COUNTER,
                0x00,
                0x00,
                kind.error_counter_response_len() as u32,
            ),
            Command::ReadProtectionBits => APDU::with_le(
                ins::READ_PROTECTION_BITS,
                0x00,
                0x00,
                kind.protection_bits().div_ceil(8) as u32,
            ),
            Command::WriteProtect { address, pattern } => {
                let (p1, p2) = kind.address_bytes(*address);
                APDU::with_data(ins::WRITE_PROTECTION, p1, p2, data_field(pattern))
            }
        }
    }

    /// Execute one command
    pub fn execute(&mut self, command: &Command) -> CommandResult {
        // Evaluated on every call, never cached
        if self.counter.is_blocked() && !command.allowed_when_blocked() {
            warn!("{} refused: card blocked", command.title());
            let sent = match command {
                Command::PresentPsc { .. } => Self::build_apdu(self.kind, command).to_bytes(),
                _ => Vec::new(),
            };
            return CommandResult::new(
                command,
                sent,
                Response::error(SW::CARD_BLOCKED),
                false,
                BLOCKED_MESSAGE.to_string(),
            )
            .with_effect(Effect::Refused);
        }

        if let Some(address) = command.address() {
            if !self.kind.encodes_address(address) {
                warn!("{} refused: 0x{:03X} not addressable on {}", command.title(), address, self.kind);
                return CommandResult::refused(
                    command,
                    SW::INCORRECT_P1_P2,
                    format!("Address 0x{:03X} is outside {}", address, self.kind),
                );
            }
        }
        if let Command::ReadMemory { length: 0, .. } = command {
            return CommandResult::refused(command, SW::WRONG_LENGTH, "Read length must be 1-256 bytes");
        }

        let apdu = Self::build_apdu(self.kind, command).to_bytes();
        debug!("{} {}: {}", self.kind, command.title(), format_hex(&apdu));

        match command {
            Command::SelectCard => self.select_card(command, apdu),
            Command::ReadMemory { address, length } => {
                self.read_memory(command, apdu, *address, *length)
            }
            Command::PresentPsc { psc } => self.present_psc(command, apdu, psc),
            Command::WriteMemory { address, data } => {
                self.write_memory(command, apdu, *address, data)
            }
            Command::ChangePsc { new_psc } => self.change_psc(command, apdu, new_psc),
            Command::ReadErrorCounter => self.read_error_counter(command, apdu),
            Command::ReadProtectionBits => self.read_protection_bits(command, apdu),
            Command::WriteProtect { address, pattern } => {
                self.write_protect(command, apdu, *address, pattern)
            }
        }
    }

    fn select_card(&self, command: &Command, apdu: Vec<u8>) -> CommandResult {
        CommandResult::new(
            command,
            apdu,
            Response::success(atr::SELECT_RESPONSE.to_vec()),
            true,
            "Card selected (RESET)".to_string(),
        )
        .with_effect(Effect::Selected)
    }

    fn read_memory(&self, command: &Command, apdu: Vec<u8>, address: u16, length: usize) -> CommandResult {
        let length = length.min(MAX_READ_LENGTH);
        let data = self.memory.read(address, length);
        let message = format!("Read {} bytes from 0x{:03X}", data.len(), address);
        CommandResult::new(command, apdu, Response::success(data.clone()), true, message)
            .with_ascii(&data)
    }

    fn present_psc(&mut self, command: &Command, apdu: Vec<u8>, psc: &[u8]) -> CommandResult {
        let current = self.memory.get_current_psc();

        if psc == current.as_slice() {
            self.counter.record_success();
            self.memory.mirror_counter(self.counter.value());
            info!("PSC accepted on {}", self.kind);

            let counter = self.counter.value();
            return CommandResult::new(
                command,
                apdu,
                Response::psc_status(counter),
                true,
                "PSC accepted. Write operations now enabled.".to_string(),
            )
            .with_effect(Effect::PscChecked {
                verified: true,
                counter,
                remaining: self.counter.remaining_attempts(),
                blocked: false,
                hint: None,
            });
        }

        self.counter.record_failure();
        self.memory.mirror_counter(self.counter.value());

        let counter = self.counter.value();
        let remaining = self.counter.remaining_attempts();
        let blocked = self.counter.is_blocked();
        warn!(
            "Wrong PSC on {}: counter 0x{:02X}, {} attempts left",
            self.kind, counter, remaining
        );

        let mut message = match remaining {
            0 => "Card PERMANENTLY BLOCKED. Only SELECT and READ operations allowed.".to_string(),
            1 => format!("Incorrect PSC. Error counter: 0x{:02X} (1 attempt remaining).", counter),
            n => format!(
                "Incorrect PSC. Error counter: 0x{:02X} ({} attempts remaining).",
                counter, n
            ),
        };

        let hint = if counter > 0 {
            message.push_str(&format!("\nHint: Current PSC is {}", format_hex(&current)));
            Some(current)
        } else {
            None
        };

        CommandResult::new(command, apdu, Response::psc_status(counter), false, message).with_effect(
            Effect::PscChecked {
                verified: false,
                counter,
                remaining,
                blocked,
                hint,
            },
        )
    }

    fn write_memory(&mut self, command: &Command, apdu: Vec<u8>, address: u16, data: &[u8]) -> CommandResult {
        if data.is_empty() || data.len() > MAX_DATA_LENGTH {
            return CommandResult::new(
                command,
                apdu,
                Response::error(SW::WRONG_LENGTH),
                false,
                format!("Write length must be 1-{} bytes, got {}", MAX_DATA_LENGTH, data.len()),
            )
            .with_effect(Effect::Refused);
        }

        let outcome = self.memory.write(address, data);
        let rejected = outcome.protected();
        let mut message = format!(
            "Wrote {} of {} bytes at 0x{:03X}",
            outcome.written.len(),
            data.len(),
            address
        );
        if !rejected.is_empty() {
            let list: Vec<String> = rejected.iter().map(|a| format!("0x{:03X}", a)).collect();
            message.push_str(&format!("; protected addresses unchanged: {}", list.join(", ")));
        }
        if outcome.out_of_range > 0 {
            message.push_str(&format!("; {} bytes past end of memory ignored", outcome.out_of_range));
        }

        CommandResult::new(command, apdu, Response::ok(), true, message)
            .with_ascii(data)
            .with_effect(Effect::Written(outcome))
    }

    fn change_psc(&mut self, command: &Command, apdu: Vec<u8>, new_psc: &[u8]) -> CommandResult {
        let expected = self.kind.psc_length();
        if new_psc.len() != expected || !self.memory.set_psc(new_psc) {
            warn!("CHANGE PSC rejected: {} bytes, {} expected", new_psc.len(), expected);
            return CommandResult::new(
                command,
                apdu,
                Response::error(SW::WRITE_PROTECTION_ERROR),
                false,
                format!(
                    "PSC change failed - wrong length (expected {} bytes, got {})",
                    expected,
                    new_psc.len()
                ),
            );
        }

        info!("PSC changed on {}", self.kind);
        CommandResult::new(
            command,
            apdu,
            Response::ok(),
            true,
            "PSC changed successfully".to_string(),
        )
        .with_effect(Effect::PscChanged)
    }

    fn read_error_counter(&self, command: &Command, apdu: Vec<u8>) -> CommandResult {
        let value = self.counter.value();
        let remaining = self.counter.remaining_attempts();

        let mut data = vec![0x00; self.kind.error_counter_response_len()];
        data[0] = value;
        // SW2 echoes the counter only on the 256-byte card
        let sw = match self.kind {
            CardKind::Small256 => SW::psc_status(value),
            CardKind::Large1K => SW::SUCCESS,
        };

        let message = format!(
            "Error counter: 0x{:02X} ({} attempts remaining)",
            value, remaining
        );
        CommandResult::new(command, apdu, Response::new(data, sw), true, message)
            .with_effect(Effect::Counter { value, remaining })
    }

    fn read_protection_bits(&self, command: &Command, apdu: Vec<u8>) -> CommandResult {
        let nbits = self.kind.protection_bits();
        let bitmap = self.memory.protection_bitmap(nbits);
        let message = format!(
            "Protection bits for 0x000-0x{:03X} (1 = writable)",
            nbits - 1
        );
        CommandResult::new(command, apdu, Response::success(bitmap), true, message)
    }

    fn write_protect(&mut self, command: &Command, apdu: Vec<u8>, address: u16, pattern: &[u8]) -> CommandResult {
        if pattern.is_empty() || pattern.len() > MAX_DATA_LENGTH {
            return CommandResult::new(
                command,
                apdu,
                Response::error(SW::WRONG_LENGTH),
                false,
                format!("Pattern length must be 1-{} bytes, got {}", MAX_DATA_LENGTH, pattern.len()),
            )
            .with_effect(Effect::Refused);
        }

        let limit = self.kind.protectable_limit();
        if address as usize + pattern.len() > limit && limit < self.kind.size() {
            return CommandResult::new(
                command,
                apdu,
                Response::error(SW::INCORRECT_P1_P2),
                false,
                format!("Write protect only covers addresses 0x00-0x{:02X}", limit - 1),
            )
            .with_effect(Effect::Refused);
        }

        let current = self.memory.read(address, pattern.len());
        let mut addresses = Vec::new();
        let mut unmatched = Vec::new();
        for (i, (&want, &have)) in pattern.iter().zip(current.iter()).enumerate() {
            let target = address as usize + i;
            if target > u16::MAX as usize {
                break;
            }
            let addr = target as u16;
            if want == have && self.memory.protect(addr) {
                addresses.push(addr);
            } else {
                unmatched.push(addr);
            }
        }

        debug!("Write protect matched {:?}, left {:?}", addresses, unmatched);
        let message = format!(
            "Protected {} of {} bytes at 0x{:03X}",
            addresses.len(),
            pattern.len(),
            address
        );
        CommandResult::new(command, apdu, Response::ok(), true, message)
            .with_effect(Effect::Protected { addresses, unmatched })
    }

    /// Card family
    pub fn kind(&self) -> CardKind {
        self.kind
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryStore {
        &mut self.memory
    }

    pub fn counter(&self) -> &ErrorCounterState {
        &self.counter
    }

    pub fn is_blocked(&self) -> bool {
        self.counter.is_blocked()
    }

    /// Instructor reset: back to a fresh counter
    pub fn reset_error_counter(&mut self) {
        self.counter.reset();
        self.memory.mirror_counter(self.counter.value());
    }

    /// Replace the counter (snapshot or dump restore)
    pub fn restore_counter(&mut self, counter: ErrorCounterState) {
        self.counter = counter;
        self.memory.mirror_counter(self.counter.value());
    }
}
