//! Application state derived from a session's flags

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::psc::Command;

/// Lifecycle stage of the card shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    /// No card open
    Initial,
    /// Card open, not selected
    CardLoaded,
    /// Selected but permanently blocked
    CardBlocked,
    /// Selected, PSC not presented
    CardSelected,
    /// Selected with a verified PSC
    PscPresented,
}

impl AppState {
    /// Derive the state; blocked wins over the PSC flag
    pub fn derive(card_open: bool, selected: bool, blocked: bool, psc_verified: bool) -> Self {
        if !card_open {
            AppState::Initial
        } else if !selected {
            AppState::CardLoaded
        } else if blocked {
            AppState::CardBlocked
        } else if !psc_verified {
            AppState::CardSelected
        } else {
            AppState::PscPresented
        }
    }

    /// Whether an action (command name or file action) is enabled
    ///
    /// File actions: `new_card`, `open_card`, `save_card`, `clear_card`,
    /// `close_card`, `user_config`. Commands use [`Command::name`].
    pub fn permits(self, action: &str) -> bool {
        use AppState::*;

        match action {
            "new_card" | "open_card" | "user_config" => true,
            "save_card" | "clear_card" | "close_card" => self != Initial,
            "select_card" => self != Initial,
            "read_memory" | "read_error_counter" | "read_protection_bits" => {
                matches!(self, CardSelected | PscPresented | CardBlocked)
            }
            "present_psc" => matches!(self, CardSelected | PscPresented),
            "write_memory" | "change_psc" | "write_protect" => self == PscPresented,
            _ => false,
        }
    }

    /// Whether a command is enabled
    pub fn permits_command(self, command: &Command) -> bool {
        self.permits(command.name())
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AppState::Initial => "initial",
            AppState::CardLoaded => "card_loaded",
            AppState::CardBlocked => "card_blocked",
            AppState::CardSelected => "card_selected",
            AppState::PscPresented => "psc_presented",
        };
        f.write_str(label)
    }
}
