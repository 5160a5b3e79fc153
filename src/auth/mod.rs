//! Admin authentication.
//!
//! Admin endpoints present a shared secret as `x-admin-key` or `x-api-key`.
//! A missing key is 401, a mismatched key 403.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppState;

/// Extractor that gates a handler on the admin shared secret.
pub struct AdminKey;

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminKey {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let provided = parts
            .headers
            .get("x-admin-key")
            .or_else(|| parts.headers.get("x-api-key"))
            .and_then(|value| value.to_str().ok());

        match provided {
            None => Err(ApiError::Unauthorized),
            Some(key) if key == state.config.admin_api_key => Ok(AdminKey),
            Some(_) => {
                tracing::warn!("admin request with mismatched key rejected");
                Err(ApiError::Forbidden)
            }
        }
    }
}
