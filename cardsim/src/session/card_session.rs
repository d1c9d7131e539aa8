//! One open card
//!
//! A session owns the card's processor (memory + error counter), its
//! security flags and its audit log. Every command is logged as a request
//! entry followed by a response entry, whatever the outcome.

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::apdu::SW;
use crate::card::{AddressStatus, CardKind, CardSnapshot, MemoryStore};
use crate::error::StoreError;
use crate::psc::{
    ApduCommandProcessor, Command, CommandResult, Effect, ErrorCounterState, SecurityCondition,
    SecurityState,
};
use crate::util::{format_hex, parse_hex};
use super::audit::{AuditLog, LogEntry, LogKind};
use super::state::AppState;

/// Message for commands attempted before a correct PSC
pub const PSC_NOT_VERIFIED: &str = "PSC must be verified before this operation";

/// A simulated card and everything done to it
#[derive(Debug, Clone)]
pub struct CardSession {
    id: Uuid,
    name: String,
    created_at: DateTime<Local>,
    user_info: String,
    processor: ApduCommandProcessor,
    security: SecurityState,
    log: AuditLog,
}

impl CardSession {
    /// Create a factory-fresh card
    pub fn new(name: impl Into<String>, kind: CardKind) -> Self {
        let mut session = Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Local::now(),
            user_info: String::new(),
            processor: ApduCommandProcessor::new(kind),
            security: SecurityState::new(),
            log: AuditLog::new(),
        };
        info!("Created card session '{}' ({})", session.name, kind);
        let message = format!("Card session created: {} ({})", session.name, kind);
        session.add_log(LogEntry::new(LogKind::Info, message));
        session
    }

    /// Bring a session back from a snapshot
    pub fn from_snapshot(snapshot: CardSnapshot) -> Result<Self, StoreError> {
        snapshot.validate().map_err(StoreError::Invalid)?;
        let kind = snapshot.kind;

        let mut processor = ApduCommandProcessor::new(kind);
        let memory = processor.memory_mut();
        if !memory.load_dump(&snapshot.memory) {
            return Err(StoreError::Invalid("memory does not fit the card".to_string()));
        }
        for &addr in &snapshot.user_protected {
            memory.protect(addr);
        }
        memory.mark_modified(snapshot.modified.iter().copied());
        if !snapshot.internal_psc.is_empty() && !memory.set_psc(&snapshot.internal_psc) {
            return Err(StoreError::Invalid("internal PSC length".to_string()));
        }
        processor.restore_counter(ErrorCounterState::from_raw(kind, snapshot.error_counter));

        debug!("Restored session {} from snapshot", snapshot.session_id);
        Ok(Self {
            id: snapshot.session_id,
            name: snapshot.card_name,
            created_at: snapshot.created_at,
            user_info: snapshot.user_info,
            processor,
            security: SecurityState::from_flags(
                snapshot.selected,
                snapshot.psc_verified,
                snapshot.psc_ever_changed,
            ),
            log: snapshot.command_log,
        })
    }

    /// Capture the full session state
    pub fn snapshot(&self) -> CardSnapshot {
        let memory = self.processor.memory();
        CardSnapshot {
            session_id: self.id,
            card_name: self.name.clone(),
            kind: self.kind(),
            created_at: self.created_at,
            selected: self.security.is_verified(SecurityCondition::Selected),
            psc_verified: self.security.is_verified(SecurityCondition::PscVerified),
            psc_ever_changed: self.security.is_verified(SecurityCondition::PscChanged),
            user_info: self.user_info.clone(),
            memory: memory.bytes().to_vec(),
            internal_psc: memory.internal_psc().map(<[u8]>::to_vec).unwrap_or_default(),
            user_protected: memory.user_protected().iter().copied().collect(),
            modified: memory.modified().iter().copied().collect(),
            error_counter: self.processor.counter().value(),
            command_log: self.log.clone(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CardKind {
        self.processor.kind()
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn user_info(&self) -> &str {
        &self.user_info
    }

    pub fn set_user_info(&mut self, info: impl Into<String>) {
        self.user_info = info.into();
    }

    pub fn memory(&self) -> &MemoryStore {
        self.processor.memory()
    }

    pub fn error_counter(&self) -> &ErrorCounterState {
        self.processor.counter()
    }

    pub fn is_selected(&self) -> bool {
        self.security.is_verified(SecurityCondition::Selected)
    }

    pub fn is_psc_verified(&self) -> bool {
        self.security.is_verified(SecurityCondition::PscVerified)
    }

    pub fn psc_ever_changed(&self) -> bool {
        self.security.is_verified(SecurityCondition::PscChanged)
    }

    /// Run a command through the session
    ///
    /// Write-type commands need a verified PSC; a blocked card's refusal
    /// takes precedence over that check.
    pub fn execute(&mut self, command: Command) -> CommandResult {
        let needs_psc = command.requires_psc()
            && !self.is_psc_verified()
            && !self.processor.is_blocked();

        let result = if needs_psc {
            warn!("{} refused: PSC not verified", command.title());
            CommandResult::refused(&command, SW::CONDITIONS_NOT_SATISFIED, PSC_NOT_VERIFIED)
        } else {
            self.processor.execute(&command)
        };

        self.apply_effect(&result);
        self.log_exchange(&command, &result);
        result
    }

    fn apply_effect(&mut self, result: &CommandResult) {
        match &result.effect {
            Effect::Selected => {
                self.security.set_verified(SecurityCondition::Selected);
                info!("Card '{}' selected", self.name);
            }
            Effect::PscChecked { verified: true, .. } => {
                self.security.set_verified(SecurityCondition::PscVerified);
            }
            Effect::PscChanged => {
                self.security.set_verified(SecurityCondition::PscChanged);
            }
            _ => {}
        }
    }

    fn log_exchange(&mut self, command: &Command, result: &CommandResult) {
        let mut request = LogEntry::new(LogKind::ApduSend, command.title());
        if !result.apdu.is_empty() {
            request = request.with_field("apdu", self.apdu_for_log(command, &result.apdu));
        }
        self.add_log(request);

        let (sw1, sw2) = result.status_word();
        let kind = if result.apdu.is_empty() {
            LogKind::Error
        } else {
            LogKind::ApduResponse
        };
        let mut response = LogEntry::new(kind, result.message.clone())
            .with_field("sw", format!("{:02X} {:02X}", sw1, sw2));

        match command {
            Command::ChangePsc { .. } if result.success => {
                let location = match self.kind().psc_address() {
                    None => "internal register",
                    Some(_) => "memory",
                };
                response = response
                    .with_field("data", "(hidden)")
                    .with_field("internal", format!("Stored in {}", location));
            }
            Command::WriteMemory { address, data } if result.success => {
                response = response
                    .with_field("address", format!("0x{:03X}", address))
                    .with_field("data", format_hex(data));
            }
            _ if !result.response_data().is_empty() => {
                response = response.with_field("data", format_hex(result.response_data()));
            }
            _ => {}
        }
        if let Some(ascii) = &result.ascii {
            response = response.with_field("ascii", ascii.clone());
        }
        self.add_log(response);
    }

    /// APDU text for the log; a new PSC is never written out
    fn apdu_for_log(&self, command: &Command, apdu: &[u8]) -> String {
        match command {
            Command::ChangePsc { new_psc } => {
                let header = &apdu[..apdu.len().saturating_sub(new_psc.len())];
                let mut text = format_hex(header);
                for _ in 0..new_psc.len() {
                    text.push_str(" **");
                }
                text
            }
            _ => format_hex(apdu),
        }
    }

    /// Append an entry to the audit log
    pub fn add_log(&mut self, entry: LogEntry) {
        self.log.push(entry);
    }

    pub fn select_card(&mut self) -> CommandResult {
        self.execute(Command::SelectCard)
    }

    pub fn read_memory(&mut self, address: u16, length: usize) -> CommandResult {
        self.execute(Command::ReadMemory { address, length })
    }

    pub fn present_psc(&mut self, psc: &[u8]) -> CommandResult {
        self.execute(Command::PresentPsc { psc: psc.to_vec() })
    }

    /// Present a PSC typed as hex ("FF FF FF")
    ///
    /// Malformed text is refused locally and costs no attempt.
    pub fn present_psc_hex(&mut self, text: &str) -> CommandResult {
        match parse_hex(text) {
            Ok(psc) => self.present_psc(&psc),
            Err(e) => {
                let command = Command::PresentPsc { psc: Vec::new() };
                let result = CommandResult::refused(
                    &command,
                    SW::WRONG_DATA,
                    format!("Invalid hexadecimal format: {}", e),
                );
                self.log_exchange(&command, &result);
                result
            }
        }
    }

    pub fn write_memory(&mut self, address: u16, data: &[u8]) -> CommandResult {
        self.execute(Command::WriteMemory {
            address,
            data: data.to_vec(),
        })
    }

    pub fn change_psc(&mut self, new_psc: &[u8]) -> CommandResult {
        self.execute(Command::ChangePsc {
            new_psc: new_psc.to_vec(),
        })
    }

    pub fn read_error_counter(&mut self) -> CommandResult {
        self.execute(Command::ReadErrorCounter)
    }

    pub fn read_protection_bits(&mut self) -> CommandResult {
        self.execute(Command::ReadProtectionBits)
    }

    pub fn write_protect(&mut self, address: u16, pattern: &[u8]) -> CommandResult {
        self.execute(Command::WriteProtect {
            address,
            pattern: pattern.to_vec(),
        })
    }

    /// Instructor reset of the error counter; returns the new counter byte
    ///
    /// The PSC has to be presented again afterwards.
    pub fn reset_error_counter(&mut self) -> u8 {
        self.processor.reset_error_counter();
        self.security.clear(SecurityCondition::PscVerified);
        let value = self.processor.counter().value();
        info!("Error counter of '{}' reset to 0x{:02X}", self.name, value);
        self.add_log(LogEntry::new(
            LogKind::System,
            format!("Error counter reset to 0x{:02X}", value),
        ));
        value
    }

    /// Card lost power: selection and PSC verification are gone
    pub fn power_down(&mut self) {
        self.security.clear_all();
        self.add_log(LogEntry::new(LogKind::System, "Card powered down"));
    }

    /// Derived lifecycle stage
    pub fn current_app_state(&self) -> AppState {
        AppState::derive(
            true,
            self.is_selected(),
            self.processor.is_blocked(),
            self.is_psc_verified(),
        )
    }

    /// Current PSC bytes
    pub fn current_psc_display(&self) -> Vec<u8> {
        self.processor.memory().get_current_psc()
    }

    /// Whether a display may reveal the PSC
    ///
    /// The in-memory PSC of the 1K card shows once verified; the internal
    /// register of the 256-byte card also shows after it was changed.
    pub fn psc_visible(&self) -> bool {
        match self.kind() {
            CardKind::Small256 => self.is_psc_verified() || self.psc_ever_changed(),
            CardKind::Large1K => self.is_psc_verified(),
        }
    }

    /// Full raw memory
    pub fn memory_dump(&self) -> Vec<u8> {
        self.processor.memory().bytes().to_vec()
    }

    /// Replace memory with a dump (open from file)
    pub fn load_memory_dump(&mut self, dump: &[u8]) -> bool {
        self.load_memory_dump_with_psc(dump, None)
    }

    /// Replace memory with a dump, optionally overriding the internal PSC
    ///
    /// The override only applies to the 256-byte card. On the 1K card the
    /// counter is re-read from its mirror cell. Nothing changes on failure.
    pub fn load_memory_dump_with_psc(&mut self, dump: &[u8], internal_psc: Option<&[u8]>) -> bool {
        let kind = self.kind();
        if dump.len() > kind.size() {
            warn!("Dump of {} bytes does not fit {}", dump.len(), kind);
            return false;
        }
        if let Some(psc) = internal_psc {
            if kind.psc_address().is_some() || psc.len() != kind.psc_length() {
                warn!("Internal PSC override not applicable to {}", kind);
                return false;
            }
        }

        let memory = self.processor.memory_mut();
        if !memory.load_dump(dump) {
            return false;
        }
        if let Some(psc) = internal_psc {
            memory.set_psc(psc);
        }
        if let Some(addr) = kind.error_counter_address() {
            let raw = memory.read(addr, 1)[0];
            self.processor
                .restore_counter(ErrorCounterState::from_raw(kind, raw));
        }
        self.security.clear_all();

        self.add_log(LogEntry::new(
            LogKind::System,
            format!("Memory loaded ({} bytes)", dump.len()),
        ));
        true
    }

    /// Protection flag for every address
    pub fn protection_breakdown(&self) -> Vec<bool> {
        self.processor.memory().protection_breakdown()
    }

    /// Display class of one address
    pub fn address_status(&self, address: u16) -> AddressStatus {
        self.processor.memory().address_status(address)
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session() {
        let session = CardSession::new("Card 1", CardKind::Small256);
        assert_eq!(session.current_app_state(), AppState::CardLoaded);
        assert_eq!(session.audit_log().len(), 1);
        assert_eq!(
            session.audit_log().entries()[0].message,
            "Card session created: Card 1 (SLE5542 (256B))"
        );
    }

    #[test]
    fn test_select_then_present() {
        let mut session = CardSession::new("Card", CardKind::Large1K);
        assert!(session.select_card().success);
        assert_eq!(session.current_app_state(), AppState::CardSelected);

        assert!(session.present_psc(&[0xFF, 0xFF]).success);
        assert_eq!(session.current_app_state(), AppState::PscPresented);
    }

    #[test]
    fn test_write_requires_psc() {
        let mut session = CardSession::new("Card", CardKind::Small256);
        session.select_card();
        let before = session.audit_log().len();

        let result = session.write_memory(0x20, &[0x41]);
        assert!(!result.success);
        assert_eq!(result.message, PSC_NOT_VERIFIED);
        assert_eq!(result.status_word(), (0x69, 0x85));
        assert!(result.apdu.is_empty());
        assert_eq!(session.memory().read(0x20, 1), vec![0xFF]);

        let log = session.audit_log().entries();
        assert_eq!(log.len(), before + 2);
        assert_eq!(log[before].kind, LogKind::ApduSend);
        assert_eq!(log[before + 1].kind, LogKind::Error);
        assert_eq!(session.current_app_state(), AppState::CardSelected);
    }

    #[test]
    fn test_every_command_logs_request_and_response() {
        let mut session = CardSession::new("Card", CardKind::Small256);
        session.select_card();
        session.present_psc(&[0x00, 0x00, 0x00]);
        session.read_memory(0x00, 16);
        session.read_error_counter();
        // initial INFO + 4 commands x 2 entries
        assert_eq!(session.audit_log().len(), 9);
        let sends = session.audit_log().of_kind(LogKind::ApduSend).count();
        assert_eq!(sends, 4);
    }

    #[test]
    fn test_change_psc_masked_in_log() {
        let mut session = CardSession::new("Card", CardKind::Small256);
        session.select_card();
        session.present_psc(&[0xFF, 0xFF, 0xFF]);
        assert!(session.change_psc(&[0x12, 0x34, 0x56]).success);
        assert!(session.psc_ever_changed());

        let entries = session.audit_log().entries();
        let send = &entries[entries.len() - 2];
        assert_eq!(send.field("apdu"), Some("FF D2 00 01 03 ** ** **"));
        let response = &entries[entries.len() - 1];
        assert_eq!(response.field("data"), Some("(hidden)"));
        assert_eq!(response.field("internal"), Some("Stored in internal register"));
        assert!(!entries.iter().any(|e| e.to_string().contains("12 34 56")));
    }

    #[test]
    fn test_psc_visibility() {
        let mut small = CardSession::new("S", CardKind::Small256);
        assert!(!small.psc_visible());
        small.select_card();
        small.present_psc(&[0xFF, 0xFF, 0xFF]);
        small.change_psc(&[0x01, 0x02, 0x03]);
        small.reset_error_counter();
        // verification cleared, but the change latch keeps it visible
        assert!(!small.is_psc_verified());
        assert!(small.psc_visible());

        let mut large = CardSession::new("L", CardKind::Large1K);
        large.select_card();
        large.present_psc(&[0xFF, 0xFF]);
        large.change_psc(&[0x01, 0x02]);
        large.reset_error_counter();
        assert!(!large.psc_visible());
    }

    #[test]
    fn test_present_psc_hex() {
        let mut session = CardSession::new("Card", CardKind::Small256);
        session.select_card();
        assert!(session.present_psc_hex("ff ff ff").success);

        let bad = session.present_psc_hex("GG");
        assert!(!bad.success);
        assert_eq!(bad.status_word(), (0x6A, 0x80));
        assert_eq!(session.error_counter().value(), 0x07);
    }

    #[test]
    fn test_reset_error_counter() {
        let mut session = CardSession::new("Card", CardKind::Large1K);
        session.select_card();
        for _ in 0..8 {
            session.present_psc(&[0x00, 0x00]);
        }
        assert_eq!(session.current_app_state(), AppState::CardBlocked);

        assert_eq!(session.reset_error_counter(), 0xFF);
        assert_eq!(session.current_app_state(), AppState::CardSelected);
        assert_eq!(session.memory().read(0x3FD, 1), vec![0xFF]);
        assert_eq!(session.audit_log().last().unwrap().kind, LogKind::System);
    }

    #[test]
    fn test_load_memory_dump() {
        let mut session = CardSession::new("Card", CardKind::Large1K);
        session.select_card();
        let mut dump = session.memory_dump();
        dump[0x40] = 0x55;
        dump[0x3FD] = 0x70;

        assert!(session.load_memory_dump(&dump));
        assert_eq!(session.memory().read(0x40, 1), vec![0x55]);
        assert_eq!(session.error_counter().value(), 0x70);
        assert_eq!(session.error_counter().remaining_attempts(), 3);
        assert!(session.memory().modified().is_empty());
        assert_eq!(session.current_app_state(), AppState::CardLoaded);

        assert!(!session.load_memory_dump(&vec![0x00; 2048]));
    }

    #[test]
    fn test_load_memory_dump_with_psc() {
        let mut session = CardSession::new("Card", CardKind::Small256);
        let dump = vec![0xFF; 256];
        assert!(session.load_memory_dump_with_psc(&dump, Some(&[0x11, 0x22, 0x33])));
        assert_eq!(session.current_psc_display(), vec![0x11, 0x22, 0x33]);
        assert!(!session.load_memory_dump_with_psc(&dump, Some(&[0x11, 0x22])));
        assert_eq!(session.current_psc_display(), vec![0x11, 0x22, 0x33]);
    }

    #[test]
    fn test_snapshot_restore() {
        let mut session = CardSession::new("Card", CardKind::Small256);
        session.set_user_info("Group B");
        session.select_card();
        session.present_psc(&[0xFF, 0xFF, 0xFF]);
        session.write_memory(0x30, &[0x01, 0x02]);
        session.write_protect(0x00, &[0xA2]);
        session.change_psc(&[0x0A, 0x0B, 0x0C]);
        session.present_psc(&[0x00, 0x00, 0x00]);

        let restored = CardSession::from_snapshot(session.snapshot()).unwrap();
        assert_eq!(restored.id(), session.id());
        assert_eq!(restored.user_info(), "Group B");
        assert_eq!(restored.memory_dump(), session.memory_dump());
        assert_eq!(restored.current_psc_display(), vec![0x0A, 0x0B, 0x0C]);
        assert_eq!(restored.error_counter().value(), 0x03);
        assert!(restored.memory().modified().contains(&0x30));
        // compared against the factory image, not the restored bytes
        assert!(restored.memory().is_modified_from_factory(0x30));
        assert!(!restored.memory().is_modified_from_factory(0x40));
        assert!(restored.memory().user_protected().contains(&0x00));
        assert_eq!(restored.current_app_state(), session.current_app_state());
        assert_eq!(restored.audit_log(), session.audit_log());
    }
}
