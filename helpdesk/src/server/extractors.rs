//! Caller identity extraction.
//!
//! Authentication happens upstream; the gateway forwards the verified
//! identity in two headers:
//!
//! - `x-user-id`: caller UUID (required)
//! - `x-user-role`: `customer` or `agent` (absent means customer)

use super::ApiError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use helpdesk_core::model::{Role, UserId};

/// Header carrying the caller id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the caller role.
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Authenticated caller of a ticket endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    /// Caller id
    pub user_id: UserId,
    /// Caller role
    pub role: Role,
}

impl Caller {
    /// Whether the caller is an agent.
    #[must_use]
    pub fn is_agent(&self) -> bool {
        self.role == Role::Agent
    }

    /// Id to read tickets as. Agents read with the nil id, which bypasses
    /// ownership checks.
    #[must_use]
    pub fn reader(&self) -> UserId {
        if self.is_agent() {
            UserId::NIL
        } else {
            self.user_id
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("user not found in context"))?
            .trim()
            .parse::<UserId>()
            .map_err(|_| ApiError::unauthorized("invalid user id"))?;

        let role = match parts.headers.get(USER_ROLE_HEADER) {
            None => Role::Customer,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|s| s.trim().to_ascii_lowercase().parse::<Role>().ok())
                .ok_or_else(|| ApiError::unauthorized("invalid user role"))?,
        };

        if user_id.is_nil() {
            return Err(ApiError::unauthorized("invalid user id"));
        }

        Ok(Self { user_id, role })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};

    async fn extract(headers: &[(&str, &str)]) -> Result<Caller, ApiError> {
        let mut builder = Request::builder().uri("/api/v1/tickets");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn role_defaults_to_customer() {
        let id = UserId::new();
        let caller = extract(&[(USER_ID_HEADER, &id.to_string())]).await.unwrap();

        assert_eq!(caller, Caller { user_id: id, role: Role::Customer });
        assert_eq!(caller.reader(), id);
    }

    #[tokio::test]
    async fn agents_read_with_the_nil_id() {
        let id = UserId::new();
        let caller = extract(&[(USER_ID_HEADER, &id.to_string()), (USER_ROLE_HEADER, "Agent")])
            .await
            .unwrap();

        assert!(caller.is_agent());
        assert!(caller.reader().is_nil());
    }

    #[tokio::test]
    async fn missing_or_malformed_identity_is_rejected() {
        let missing = extract(&[]).await.unwrap_err();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let malformed = extract(&[(USER_ID_HEADER, "not-a-uuid")]).await.unwrap_err();
        assert_eq!(malformed.status(), StatusCode::UNAUTHORIZED);

        let nil = extract(&[(USER_ID_HEADER, &UserId::NIL.to_string())]).await.unwrap_err();
        assert_eq!(nil.status(), StatusCode::UNAUTHORIZED);

        let id = UserId::new().to_string();
        let role = extract(&[(USER_ID_HEADER, &id), (USER_ROLE_HEADER, "admin")])
            .await
            .unwrap_err();
        assert_eq!(role.status(), StatusCode::UNAUTHORIZED);
    }
}
