//! Strongly-typed row identifiers.
//!
//! Every persisted row is keyed by a ULID. The display form carries a short
//! type prefix (`usr_01H...`) so identifiers are recognisable in logs; parsing
//! accepts both the prefixed and the raw ULID form.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when parsing an ID from a string fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse.
    pub id_type: &'static str,
    /// The reason for the parse failure.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            const PREFIX: &'static str = concat!($prefix, "_");

            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", Self::PREFIX, self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_ulid(s.strip_prefix(Self::PREFIX).unwrap_or(s), stringify!($name))
                    .map(Self)
            }
        }
    };
}

fn parse_ulid(raw: &str, id_type: &'static str) -> Result<Ulid, ParseIdError> {
    Ulid::from_str(raw).map_err(|e| ParseIdError {
        id_type,
        reason: e.to_string(),
    })
}

define_id!(
    /// Identifier of a local user account.
    UserId,
    "usr"
);

define_id!(
    /// Identifier of a session token row (not the bearer value itself).
    SessionTokenId,
    "tok"
);

define_id!(
    /// Identifier of a cached provider credential row.
    CredentialId,
    "cred"
);
