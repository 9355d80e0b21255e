//! Tenant identity extractor.
//!
//! Authentication happens upstream; the auth layer forwards the resolved
//! tenant as the `X-Owner-Id` header.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the authenticated tenant id.
pub const OWNER_ID_HEADER: &str = "X-Owner-Id";

/// The tenant on whose behalf the request is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerId(pub Uuid);

impl OwnerId {
    /// Parses the header value; anything other than a UUID is rejected.
    pub fn parse(value: Option<&str>) -> Result<Self, ApiError> {
        value
            .map(str::trim)
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(OwnerId)
            .ok_or_else(|| ApiError::Unauthorized("Missing or invalid owner identity".to_string()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(OWNER_ID_HEADER)
            .and_then(|v| v.to_str().ok());
        Self::parse(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_parse_valid_owner() {
        let id = Uuid::new_v4();
        assert_eq!(OwnerId::parse(Some(&id.to_string())).unwrap(), OwnerId(id));
    }

    #[test]
    fn test_parse_missing_owner() {
        assert!(matches!(OwnerId::parse(None), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_parse_invalid_owner() {
        assert!(matches!(
            OwnerId::parse(Some("not-a-uuid")),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_from_request_parts() {
        let id = Uuid::new_v4();
        let request = Request::builder()
            .header(OWNER_ID_HEADER, id.to_string())
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let owner = OwnerId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(owner.0, id);
    }
}
