//! Telegram adapter (teloxide).
//!
//! Lets chats verify with the passphrase and manage their GitLab event
//! subscriptions through `gwt-core`'s [`gwt_core::Context`].

pub mod handlers;
pub mod router;

pub use router::run_polling;
