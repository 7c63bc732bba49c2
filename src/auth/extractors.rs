use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::warn;
use uuid::Uuid;

use super::tokens::{TokenIssuer, TokenKind};
use crate::error::ApiError;

/// Authenticated caller; anonymous requests get 401.
pub struct AuthUser(pub Uuid);

/// Caller identity on endpoints open to anonymous readers. A present but
/// invalid token is still a 401.
pub struct MaybeAuthUser(pub Option<Uuid>);

fn caller(parts: &Parts, issuer: &TokenIssuer) -> Result<Option<Uuid>, ApiError> {
    let Some(raw) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let token = raw
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Expected 'Bearer <token>'".into()))?;
    match issuer.decode(token.trim(), TokenKind::Access) {
        Ok(claims) => Ok(Some(claims.sub)),
        Err(e) => {
            warn!(error = %e, "token rejected");
            Err(ApiError::Unauthorized(e.to_string()))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<TokenIssuer>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let issuer = Arc::<TokenIssuer>::from_ref(state);
        caller(parts, &issuer)?
            .map(AuthUser)
            .ok_or_else(|| ApiError::Unauthorized("Authentication credentials were not provided".into()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    Arc<TokenIssuer>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let issuer = Arc::<TokenIssuer>::from_ref(state);
        caller(parts, &issuer).map(MaybeAuthUser)
    }
}
