//! PSC handling and the memory-card command interpreter

pub mod counter;
pub mod processor;
pub mod security_state;

pub use counter::{ErrorCounterPolicy, ErrorCounterState};
pub use processor::{ApduCommandProcessor, Command, CommandResult, Effect};
pub use security_state::{SecurityCondition, SecurityState};
