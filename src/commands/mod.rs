//! Event handling module.
//!
//! Turns inbound updates into [`BotEvent`]s and answers them.
//! Commands are `/start [referrer]` and `/check`; everything else
//! arrives as inline button presses.

mod handler;
mod types;

pub use handler::EventHandler;
pub use types::{BotEvent, Incoming, Origin, Sender, callback};
