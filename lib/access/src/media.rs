//! Media channel credentials.
//!
//! Each participant joining a channel gets a numeric uid and signed,
//! time-boxed tokens for the media SDK. Uids are drawn from disjoint
//! sub-ranges so dial-in, screen-share and regular participants never collide
//! within a channel.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Lowest random component of a uid (inclusive).
pub const UID_RANDOM_MIN: u32 = 10_000_000;
/// Upper bound of the random component of a uid (exclusive).
pub const UID_RANDOM_MAX: u32 = 99_999_999;

/// Base offsets of the uid sub-ranges.
pub const PSTN_UID_BASE: u32 = 100_000_000;
pub const PRIMARY_UID_BASE: u32 = 200_000_000;
pub const SCREEN_SHARE_UID_BASE: u32 = 300_000_000;

/// How long minted tokens stay valid.
pub const TOKEN_VALIDITY_SECONDS: i64 = 86_400;

/// The kind of participant a uid is minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    Pstn,
    Primary,
    ScreenShare,
}

impl Participant {
    #[must_use]
    pub fn uid_base(&self) -> u32 {
        match self {
            Self::Pstn => PSTN_UID_BASE,
            Self::Primary => PRIMARY_UID_BASE,
            Self::ScreenShare => SCREEN_SHARE_UID_BASE,
        }
    }

    /// Draws a uid in this participant's sub-range.
    #[must_use]
    pub fn random_uid(&self) -> u32 {
        rand::thread_rng().gen_range(UID_RANDOM_MIN..UID_RANDOM_MAX) + self.uid_base()
    }
}

/// Errors while minting media credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaTokenError {
    /// The channel name is empty.
    EmptyChannel,
    /// The builder could not sign the token.
    Signing { details: String },
}

impl fmt::Display for MediaTokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyChannel => write!(f, "channel name is empty"),
            Self::Signing { details } => write!(f, "signing media token failed: {details}"),
        }
    }
}

impl std::error::Error for MediaTokenError {}

/// Produces tokens for the media SDK.
///
/// The byte layout of the token belongs to the media vendor; implementations
/// adapt whichever library the deployment uses.
pub trait MediaTokenBuilder: Send + Sync {
    /// Token for joining `channel` as `uid` over RTC.
    fn rtc_token(
        &self,
        channel: &str,
        uid: u32,
        expires_at: DateTime<Utc>,
    ) -> Result<String, MediaTokenError>;

    /// Token for the RTM messaging surface, bound to `uid` only.
    fn rtm_token(&self, uid: u32, expires_at: DateTime<Utc>) -> Result<String, MediaTokenError>;
}

/// Claims signed into an [`HmacTokenBuilder`] token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaClaims {
    pub app_id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub uid: u32,
    pub exp: i64,
}

/// Signs a JSON claims payload with HMAC-SHA256 over the app certificate.
///
/// Token form: `base64url(claims).base64url(mac)`.
#[derive(Clone)]
pub struct HmacTokenBuilder {
    app_id: String,
    app_certificate: String,
}

impl HmacTokenBuilder {
    #[must_use]
    pub fn new(app_id: impl Into<String>, app_certificate: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_certificate: app_certificate.into(),
        }
    }

    fn sign(&self, claims: &MediaClaims) -> Result<String, MediaTokenError> {
        let payload = serde_json::to_vec(claims).map_err(|e| MediaTokenError::Signing {
            details: e.to_string(),
        })?;
        let mut mac = HmacSha256::new_from_slice(self.app_certificate.as_bytes()).map_err(|e| {
            MediaTokenError::Signing {
                details: e.to_string(),
            }
        })?;
        let encoded = URL_SAFE_NO_PAD.encode(&payload);
        mac.update(encoded.as_bytes());
        let signature = mac.finalize().into_bytes();
        Ok(format!("{encoded}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Checks a token's signature and returns its claims.
    ///
    /// Expiry is not checked; that is the media service's concern.
    #[must_use]
    pub fn verify(&self, token: &str) -> Option<MediaClaims> {
        let (encoded, signature) = token.split_once('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
        let mut mac = HmacSha256::new_from_slice(self.app_certificate.as_bytes()).ok()?;
        mac.update(encoded.as_bytes());
        mac.verify_slice(&signature).ok()?;
        let payload = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        serde_json::from_slice(&payload).ok()
    }
}

impl fmt::Debug for HmacTokenBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacTokenBuilder")
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl MediaTokenBuilder for HmacTokenBuilder {
    fn rtc_token(
        &self,
        channel: &str,
        uid: u32,
        expires_at: DateTime<Utc>,
    ) -> Result<String, MediaTokenError> {
        self.sign(&MediaClaims {
            app_id: self.app_id.clone(),
            kind: "rtc".to_string(),
            channel: Some(channel.to_string()),
            uid,
            exp: expires_at.timestamp(),
        })
    }

    fn rtm_token(&self, uid: u32, expires_at: DateTime<Utc>) -> Result<String, MediaTokenError> {
        self.sign(&MediaClaims {
            app_id: self.app_id.clone(),
            kind: "rtm".to_string(),
            channel: None,
            uid,
            exp: expires_at.timestamp(),
        })
    }
}

/// Credentials handed to a participant joining a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaCredentials {
    pub uid: u32,
    pub rtc_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtm_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Mints per-participant media credentials.
#[derive(Debug, Clone)]
pub struct CredentialMinter<B> {
    builder: B,
    validity: Duration,
}

impl<B: MediaTokenBuilder> CredentialMinter<B> {
    #[must_use]
    pub fn new(builder: B) -> Self {
        Self {
            builder,
            validity: Duration::seconds(TOKEN_VALIDITY_SECONDS),
        }
    }

    /// Mints credentials for an app participant.
    ///
    /// # Errors
    ///
    /// Returns [`MediaTokenError::EmptyChannel`] for an empty channel name, or
    /// the builder's error if signing fails.
    pub fn mint(
        &self,
        channel: &str,
        is_screen_share: bool,
        needs_rtm: bool,
    ) -> Result<MediaCredentials, MediaTokenError> {
        let participant = if is_screen_share {
            Participant::ScreenShare
        } else {
            Participant::Primary
        };
        self.mint_for(channel, participant, needs_rtm)
    }

    /// Mints RTC credentials for a dial-in caller bridged from the phone network.
    ///
    /// # Errors
    ///
    /// See [`CredentialMinter::mint`].
    pub fn mint_pstn(&self, channel: &str) -> Result<MediaCredentials, MediaTokenError> {
        self.mint_for(channel, Participant::Pstn, false)
    }

    fn mint_for(
        &self,
        channel: &str,
        participant: Participant,
        needs_rtm: bool,
    ) -> Result<MediaCredentials, MediaTokenError> {
        if channel.trim().is_empty() {
            return Err(MediaTokenError::EmptyChannel);
        }
        let uid = participant.random_uid();
        let expires_at = Utc::now() + self.validity;
        let rtc_token = self.builder.rtc_token(channel, uid, expires_at)?;
        let rtm_token = if needs_rtm {
            Some(self.builder.rtm_token(uid, expires_at)?)
        } else {
            None
        };
        Ok(MediaCredentials {
            uid,
            rtc_token,
            rtm_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minter() -> CredentialMinter<HmacTokenBuilder> {
        CredentialMinter::new(HmacTokenBuilder::new("app-1", "cert-secret"))
    }

    fn in_range(uid: u32, base: u32) -> bool {
        (base + UID_RANDOM_MIN..base + UID_RANDOM_MAX).contains(&uid)
    }

    #[test]
    fn uids_stay_in_their_sub_range() {
        let minter = minter();
        for _ in 0..200 {
            let primary = minter.mint("standup", false, false).expect("mints");
            assert!(in_range(primary.uid, PRIMARY_UID_BASE), "{}", primary.uid);
            let screen = minter.mint("standup", true, false).expect("mints");
            assert!(in_range(screen.uid, SCREEN_SHARE_UID_BASE), "{}", screen.uid);
            let pstn = minter.mint_pstn("standup").expect("mints");
            assert!(in_range(pstn.uid, PSTN_UID_BASE), "{}", pstn.uid);
        }
    }

    #[test]
    fn rtm_token_only_when_requested() {
        let minter = minter();
        assert!(minter.mint("standup", false, false).expect("mints").rtm_token.is_none());
        assert!(minter.mint("standup", false, true).expect("mints").rtm_token.is_some());
        assert!(minter.mint_pstn("standup").expect("mints").rtm_token.is_none());
    }

    #[test]
    fn rtc_token_binds_channel_and_uid() {
        let builder = HmacTokenBuilder::new("app-1", "cert-secret");
        let creds = CredentialMinter::new(builder.clone())
            .mint("standup", false, true)
            .expect("mints");

        let claims = builder.verify(&creds.rtc_token).expect("valid signature");
        assert_eq!(claims.kind, "rtc");
        assert_eq!(claims.channel.as_deref(), Some("standup"));
        assert_eq!(claims.uid, creds.uid);
        assert_eq!(claims.exp, creds.expires_at.timestamp());

        let rtm = builder
            .verify(creds.rtm_token.as_deref().expect("rtm token"))
            .expect("valid signature");
        assert_eq!(rtm.kind, "rtm");
        assert_eq!(rtm.channel, None);
    }

    #[test]
    fn tokens_are_valid_for_a_day() {
        let before = Utc::now();
        let creds = minter().mint("standup", false, false).expect("mints");
        let lifetime = creds.expires_at - before;
        assert!(lifetime <= Duration::seconds(TOKEN_VALIDITY_SECONDS));
        assert!(lifetime > Duration::seconds(TOKEN_VALIDITY_SECONDS - 5));
    }

    #[test]
    fn other_certificate_fails_verification() {
        let creds = minter().mint("standup", false, false).expect("mints");
        let other = HmacTokenBuilder::new("app-1", "another-secret");
        assert!(other.verify(&creds.rtc_token).is_none());
    }

    #[test]
    fn empty_channel_is_rejected() {
        assert_eq!(
            minter().mint("  ", false, false),
            Err(MediaTokenError::EmptyChannel)
        );
    }
}
