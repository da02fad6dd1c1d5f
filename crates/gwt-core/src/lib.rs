//! Authorization and subscription state for the GitLab → Telegram bridge.
//!
//! This crate is framework-agnostic. The webhook listener and the Telegram
//! adapter only talk to [`context::Context`].

pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod store;
pub mod subscriptions;
pub mod verified;

pub use context::Context;
pub use errors::{Error, Result};
