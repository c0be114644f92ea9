//! Request authorization.
//!
//! [`authorize`] is the only gate between an incoming token and the core services. A token
//! grants access to one workspace; a token that also names a release grants access to that
//! release only.

use chrono::{DateTime, Utc};
use hatch_tokens::{AuthContext, TokenCodec, TokenError, TokenScope};
use hatch_types::{ReleaseId, WorkspaceName};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

/// Strips an optional `Bearer ` prefix from an `Authorization` header value.
pub fn bearer_token(header: &str) -> &str {
    let header = header.trim();
    match header.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => header[7..].trim_start(),
        _ => header,
    }
}

/// Verifies `raw_token` and checks it grants `required` access to the requested resource.
///
/// # Errors
///
/// - [`AuthError::InvalidToken`] if the token is missing, malformed or wrongly signed
/// - [`AuthError::Expired`] if it has expired
/// - [`AuthError::Unauthorized`] if its scope is insufficient or it names a different
///   workspace or release
pub fn authorize(
    codec: &TokenCodec,
    raw_token: Option<&str>,
    required: TokenScope,
    workspace: &WorkspaceName,
    release: Option<ReleaseId>,
) -> Result<AuthContext, AuthError> {
    authorize_at(codec, raw_token, required, workspace, release, Utc::now())
}

/// [`authorize`] as if the current time were `now`.
pub fn authorize_at(
    codec: &TokenCodec,
    raw_token: Option<&str>,
    required: TokenScope,
    workspace: &WorkspaceName,
    release: Option<ReleaseId>,
    now: DateTime<Utc>,
) -> Result<AuthContext, AuthError> {
    let ctx = authenticate_at(codec, raw_token, now)?;
    permit(&ctx, required, workspace, release)?;
    Ok(ctx)
}

/// Verifies `raw_token` without checking what it grants access to.
///
/// Callers that must validate request input before they know the resource use this first,
/// so an unauthenticated request is rejected before anything about the input is revealed.
///
/// # Errors
///
/// - [`AuthError::InvalidToken`] if the token is missing, malformed or wrongly signed
/// - [`AuthError::Expired`] if it has expired
pub fn authenticate(codec: &TokenCodec, raw_token: Option<&str>) -> Result<AuthContext, AuthError> {
    authenticate_at(codec, raw_token, Utc::now())
}

/// [`authenticate`] as if the current time were `now`.
pub fn authenticate_at(
    codec: &TokenCodec,
    raw_token: Option<&str>,
    now: DateTime<Utc>,
) -> Result<AuthContext, AuthError> {
    let token = raw_token
        .map(bearer_token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidToken("missing Authorization header".into()))?;

    codec.verify_at(token, now).map_err(|e| {
        tracing::info!("auth failed: {}", e);
        match e {
            TokenError::Expired(at) => AuthError::Expired(at),
            other => AuthError::InvalidToken(other.to_string()),
        }
    })
}

/// Checks a verified token grants `required` access to the workspace and release.
///
/// # Errors
///
/// [`AuthError::Unauthorized`] if its scope is insufficient or it names a different workspace
/// or release.
pub fn permit(
    ctx: &AuthContext,
    required: TokenScope,
    workspace: &WorkspaceName,
    release: Option<ReleaseId>,
) -> Result<(), AuthError> {
    if &ctx.workspace != workspace {
        return Err(reject(
            ctx,
            format!("token is for workspace {}", ctx.workspace),
        ));
    }

    if let Some(granted) = ctx.release {
        if release != Some(granted) {
            return Err(reject(ctx, format!("token is for release {granted}")));
        }
    }

    if !ctx.scope.allows(required) {
        return Err(reject(
            ctx,
            format!("requires {required} scope"),
        ));
    }

    Ok(())
}

/// Rejects a verified token for a request whose target could not be parsed.
pub fn reject_malformed(ctx: &AuthContext, what: &str) -> AuthError {
    reject(ctx, format!("malformed {what} in request"))
}

fn reject(ctx: &AuthContext, reason: String) -> AuthError {
    tracing::warn!(
        "rejected token for user {} (workspace {}): {}",
        ctx.user,
        ctx.workspace,
        reason
    );
    AuthError::Unauthorized(reason)
}
