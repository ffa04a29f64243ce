//! Update dispatch module.
//!
//! Receives updates from Telegram and fans them out to the event handler.

mod runner;

pub use runner::{PollerMessage, UpdatePoller};
