//! Core types shared across the bot.

pub mod event;
pub mod message;

pub use event::*;
pub use message::*;
