//! Core domain + application logic for the contact-file converter bot.
//!
//! This crate is framework-agnostic. Telegram lives behind the messaging
//! port implemented in the adapter crate.

pub mod access;
pub mod batch;
pub mod codec;
pub mod config;
pub mod contact;
pub mod domain;
pub mod errors;
pub mod events;
pub mod files;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod naming;
pub mod session;
pub mod utils;

pub use errors::{Error, Result};
