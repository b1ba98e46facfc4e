//! Sign-in domain for Huddle.
//!
//! This crate holds the provider-independent parts of the login flow:
//!
//! - [`state`]: the OAuth `state` parameter codec
//! - [`provider`]: provider names and resolved client configuration
//! - [`apple`]: Sign in with Apple client secret signing
//! - [`credential`]: provider tokens and the exchange cache entry
//! - [`allow_list`]: the email allow-list gate
//! - [`user`] and [`session`]: local accounts and bearer session tokens
//! - [`media`]: media channel credential minting
//! - [`store`]: persistence traits
//!
//! HTTP, provider network calls and the database live in the server crate.

pub mod allow_list;
pub mod apple;
pub mod credential;
pub mod error;
pub mod media;
pub mod provider;
pub mod session;
pub mod state;
pub mod store;
pub mod user;

pub use allow_list::AllowList;
pub use apple::AppleSecretSigner;
pub use credential::{CachedCredential, OAuthToken, TokenExtras};
pub use error::{AuthFlowError, ErrorClass, StoreError};
pub use media::{CredentialMinter, HmacTokenBuilder, MediaCredentials, MediaTokenBuilder, MediaTokenError};
pub use provider::{ProviderConfig, ProviderKind};
pub use session::{SessionToken, TokenValue};
pub use state::{AuthState, Platform, StateFields};
pub use store::{AccountStore, CredentialStore};
pub use user::{IdentityClaims, UserAccount};
