//! Serialisable session snapshot
//!
//! Raw byte fields are stored as base64 strings.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::kind::CardKind;
use crate::session::AuditLog;

/// Custom serde module for base64 encoding of byte vectors
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if bytes.is_empty() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str(&STANDARD.encode(bytes))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: String = Deserialize::deserialize(deserializer)?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Everything needed to bring a card session back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSnapshot {
    pub session_id: Uuid,
    pub card_name: String,
    pub kind: CardKind,
    pub created_at: DateTime<Local>,
    pub selected: bool,
    pub psc_verified: bool,
    pub psc_ever_changed: bool,
    #[serde(default)]
    pub user_info: String,
    #[serde(with = "base64_bytes")]
    pub memory: Vec<u8>,
    /// PSC register of the 256-byte card; empty for the 1K card
    #[serde(with = "base64_bytes", default)]
    pub internal_psc: Vec<u8>,
    #[serde(default)]
    pub user_protected: Vec<u16>,
    #[serde(default)]
    pub modified: Vec<u16>,
    /// Raw counter byte
    pub error_counter: u8,
    #[serde(default)]
    pub command_log: AuditLog,
}

impl CardSnapshot {
    /// Check the snapshot can describe a card of its kind
    pub fn validate(&self) -> Result<(), String> {
        if self.memory.len() != self.kind.size() {
            return Err(format!(
                "{} memory must be {} bytes, got {}",
                self.kind,
                self.kind.size(),
                self.memory.len()
            ));
        }
        let psc_ok = match self.kind.psc_address() {
            None => self.internal_psc.len() == self.kind.psc_length(),
            Some(_) => self.internal_psc.is_empty(),
        };
        if !psc_ok {
            return Err(format!(
                "{} snapshot has a {}-byte internal PSC",
                self.kind,
                self.internal_psc.len()
            ));
        }
        Ok(())
    }
}
