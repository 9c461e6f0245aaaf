//! Bearer-token authentication.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

use super::AppState;
use super::response::ApiError;
use crate::models::{Principal, UserRole};
use crate::{Error, Result};

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| Error::Unauthorized("No token provided".to_string()))?;
        let mut storage = state.storage.lock().await;
        Ok(storage.authenticate_token(token)?)
    }
}

/// Fail with 403 unless the caller holds one of `roles`.
pub fn require_role(principal: &Principal, roles: &[UserRole]) -> Result<()> {
    if roles.contains(&principal.role) {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}

/// Team writes are limited to leadership roles.
pub fn require_team_manager(principal: &Principal) -> Result<()> {
    if principal.role.can_manage_teams() {
        Ok(())
    } else {
        Err(Error::Forbidden)
    }
}
