//! Huddle sign-in and session server.
//!
//! Handles OAuth callbacks from Google, Microsoft, Slack and Apple, issues
//! bearer session tokens, and serves the small authenticated API the
//! clients use afterwards.

pub mod app;
pub mod auth;
pub mod channel;
pub mod config;
pub mod error;
pub mod templates;
pub mod user;
