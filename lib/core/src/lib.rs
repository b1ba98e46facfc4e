//! Core types shared across the huddle workspace.
//!
//! This crate provides the strongly-typed row identifiers and the
//! rootcause-based `Result` alias used by the other crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{CredentialId, ParseIdError, SessionTokenId, UserId};
