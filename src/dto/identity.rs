use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the display name.
pub const USER_NAME_HEADER: &str = "x-user-name";
/// Header carrying the user role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Caller identity as asserted by the gateway; trusted as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable user id.
    pub user_id: String,
    /// Display name.
    pub user_name: String,
    /// Free-form role, e.g. `player` or `admin`.
    pub role: String,
}

impl Identity {
    /// Build an identity, defaulting the name to the id and the role to `player`.
    pub fn new(user_id: impl Into<String>, user_name: Option<String>, role: Option<String>) -> Self {
        let user_id = user_id.into();
        Self {
            user_name: user_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| user_id.clone()),
            role: role
                .filter(|role| !role.trim().is_empty())
                .unwrap_or_else(|| "player".into()),
            user_id,
        }
    }

    /// Read the gateway headers; `None` when no usable user id is present.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let user_id = read(USER_ID_HEADER)?;
        Some(Self::new(user_id, read(USER_NAME_HEADER), read(USER_ROLE_HEADER)))
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Identity::from_headers(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized(format!("missing `{USER_ID_HEADER}` header")))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn headers_fill_identity_with_defaults() {
        let mut headers = HeaderMap::new();
        assert_eq!(Identity::from_headers(&headers), None);

        headers.insert(USER_ID_HEADER, HeaderValue::from_static(" u-42 "));
        let identity = Identity::from_headers(&headers).unwrap();
        assert_eq!(identity.user_id, "u-42");
        assert_eq!(identity.user_name, "u-42");
        assert_eq!(identity.role, "player");

        headers.insert(USER_NAME_HEADER, HeaderValue::from_static("Ada"));
        headers.insert(USER_ROLE_HEADER, HeaderValue::from_static("admin"));
        let identity = Identity::from_headers(&headers).unwrap();
        assert_eq!(identity.user_name, "Ada");
        assert_eq!(identity.role, "admin");
    }
}
