//! # Hatch Tokens
//!
//! Signed, self-contained capability tokens shared between this service and job-server.
//!
//! A token is `base64url(payload) "." base64url(mac)` where `payload` is the canonical JSON
//! encoding of [`TokenPayload`] and `mac` is HMAC-SHA256 over the payload bytes. The MAC key
//! is itself derived as `HMAC-SHA256(secret, salt)`, so one shared secret can back several
//! independent token families by varying the salt.
//!
//! Tokens are never stored. Expiry is the only bound on validity; rotating the shared secret
//! revokes every outstanding token at once.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use hatch_types::{ReleaseId, WorkspaceName};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Salt used for tokens exchanged with job-server.
pub const DEFAULT_SALT: &str = "hatch";

/// Minimum combined length of secret and salt, in bytes (exclusive).
const MIN_KEY_MATERIAL_LEN: usize = 32;

/// Errors produced while issuing or verifying tokens.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Malformed encoding, bad MAC, or an unparseable payload.
    #[error("invalid token: {0}")]
    InvalidToken(&'static str),

    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("secret and salt together must be longer than {MIN_KEY_MATERIAL_LEN} bytes")]
    WeakSecret,

    #[error("token ttl must be positive and end within the representable date range")]
    InvalidTtl,

    #[error("failed to serialize token payload: {0}")]
    Serialization(serde_json::Error),
}

pub type TokenResult<T> = std::result::Result<T, TokenError>;

/// What a token allows its bearer to do.
///
/// `Upload` is a superset of `Read`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScope {
    Read,
    Upload,
}

impl TokenScope {
    /// Returns true if a token carrying `self` may perform an operation needing `required`.
    pub fn allows(self, required: TokenScope) -> bool {
        self >= required
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenScope::Read => "read",
            TokenScope::Upload => "upload",
        }
    }
}

impl fmt::Display for TokenScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TokenScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(TokenScope::Read),
            "upload" => Ok(TokenScope::Upload),
            other => Err(format!("unknown token scope '{other}'")),
        }
    }
}

/// The signed body of a token. Field order is the canonical serialisation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenPayload {
    pub workspace: WorkspaceName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseId>,
    pub scope: TokenScope,
    pub user: String,
    pub issued_at: DateTime<Utc>,
    pub expiry: DateTime<Utc>,
}

/// The verified claims of a token.
pub type AuthContext = TokenPayload;

/// Shared secret used to derive the MAC key. `Debug` never prints the secret.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self(secret.into())
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Issues and verifies tokens for one (secret, salt) pair.
#[derive(Clone)]
pub struct TokenCodec {
    key: Vec<u8>,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Creates a codec from the shared secret and a salt partitioning this token family.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::WeakSecret`] if secret and salt together are 32 bytes or fewer.
    pub fn new(secret: &SigningSecret, salt: &str) -> TokenResult<Self> {
        if secret.as_bytes().len() + salt.len() <= MIN_KEY_MATERIAL_LEN {
            return Err(TokenError::WeakSecret);
        }

        let mut mac = new_mac(secret.as_bytes())?;
        mac.update(salt.as_bytes());
        Ok(Self {
            key: mac.finalize().into_bytes().to_vec(),
        })
    }

    /// Issues a token valid for `ttl` from the current time.
    pub fn issue(
        &self,
        workspace: &WorkspaceName,
        release: Option<ReleaseId>,
        scope: TokenScope,
        user: &str,
        ttl: Duration,
    ) -> TokenResult<String> {
        self.issue_at(workspace, release, scope, user, ttl, Utc::now())
    }

    /// Issues a token as if the current time were `now`.
    ///
    /// Identical inputs produce byte-identical tokens.
    pub fn issue_at(
        &self,
        workspace: &WorkspaceName,
        release: Option<ReleaseId>,
        scope: TokenScope,
        user: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> TokenResult<String> {
        if ttl <= Duration::zero() {
            return Err(TokenError::InvalidTtl);
        }
        let expiry = now.checked_add_signed(ttl).ok_or(TokenError::InvalidTtl)?;

        let payload = TokenPayload {
            workspace: workspace.clone(),
            release,
            scope,
            user: user.to_owned(),
            issued_at: now,
            expiry,
        };
        self.sign(&payload)
    }

    /// Signs an arbitrary payload. Exposed for tests and tooling that need exact control over
    /// the claims, such as minting already-expired tokens.
    pub fn sign(&self, payload: &TokenPayload) -> TokenResult<String> {
        let body = serde_json::to_vec(payload).map_err(TokenError::Serialization)?;
        let mac = self.mac(&body)?;
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&body),
            URL_SAFE_NO_PAD.encode(mac)
        ))
    }

    /// Verifies a token against the current time.
    pub fn verify(&self, token: &str) -> TokenResult<AuthContext> {
        self.verify_at(token, Utc::now())
    }

    /// Verifies a token as if the current time were `now`.
    ///
    /// The MAC is checked (in constant time) before the payload is parsed, and a token is
    /// expired from the instant `now` reaches its expiry.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> TokenResult<AuthContext> {
        let (body_b64, mac_b64) = token
            .trim()
            .split_once('.')
            .ok_or(TokenError::InvalidToken("missing signature separator"))?;

        let body = URL_SAFE_NO_PAD
            .decode(body_b64)
            .map_err(|_| TokenError::InvalidToken("payload is not base64url"))?;
        let provided = URL_SAFE_NO_PAD
            .decode(mac_b64)
            .map_err(|_| TokenError::InvalidToken("signature is not base64url"))?;

        let mut mac = new_mac(&self.key)?;
        mac.update(&body);
        mac.verify_slice(&provided)
            .map_err(|_| TokenError::InvalidToken("bad signature"))?;

        let payload: TokenPayload = serde_json::from_slice(&body)
            .map_err(|_| TokenError::InvalidToken("malformed payload"))?;

        if now >= payload.expiry {
            return Err(TokenError::Expired(payload.expiry));
        }

        Ok(payload)
    }

    fn mac(&self, body: &[u8]) -> TokenResult<Vec<u8>> {
        let mut mac = new_mac(&self.key)?;
        mac.update(body);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn new_mac(key: &[u8]) -> TokenResult<HmacSha256> {
    // HMAC accepts keys of any length; this only fails for fixed-size MACs.
    HmacSha256::new_from_slice(key).map_err(|_| TokenError::InvalidToken("invalid key length"))
}
