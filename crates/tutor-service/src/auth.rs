//! Write access for trusted callers.
//!
//! Every mutating route takes a [`ServiceAuth`]. The request must carry the
//! shared key in `x-api-key`; `x-service-name` is optional and only feeds the
//! audit lines the handlers log. With no key configured, writes are refused.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::error::ApiError;
use crate::state::AppState;

const API_KEY_HEADER: &str = "x-api-key";
const SERVICE_NAME_HEADER: &str = "x-service-name";

/// A caller that presented the service key.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// Name the caller reported, or `unknown`.
    pub service_name: String,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Compare without stopping at the first differing byte.
fn keys_match(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && presented
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let service_name = header(&parts.headers, SERVICE_NAME_HEADER)
            .unwrap_or("unknown")
            .to_string();

        let Some(expected) = state.config.service_api_key.as_deref() else {
            tracing::warn!(service = %service_name, "Write refused: no service key configured");
            return Err(ApiError::Unauthorized);
        };

        match header(&parts.headers, API_KEY_HEADER) {
            Some(presented) if keys_match(presented, expected) => Ok(Self { service_name }),
            Some(_) => {
                tracing::warn!(service = %service_name, "Write refused: wrong service key");
                Err(ApiError::Unauthorized)
            }
            None => {
                tracing::debug!(service = %service_name, "Write refused: no service key sent");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
