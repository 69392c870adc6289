use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use crate::model::UserContext;

/// Axum extractor for UserContext from request headers
///
/// This extractor looks for user information in request headers:
/// - X-User-Id: Required user identifier
/// - X-User-Email: Optional user email
/// - X-User-Name: Optional user display name
/// - X-User-Permissions: Optional comma separated resource ids the user may read
///
/// For development/testing, if no headers are present, returns a default user.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        let user = match extract_header_value(headers, "x-user-id") {
            Some(user_id) => {
                let user_email = extract_header_value(headers, "x-user-email");
                let user_name = extract_header_value(headers, "x-user-name");
                UserContext::with_details(user_id, user_email, user_name)
            }
            None => UserContext::default_user(),
        };

        Ok(match extract_header_value(headers, "x-user-permissions") {
            Some(permissions) => user.with_permissions(parse_permissions(&permissions)),
            None => user,
        })
    }
}

/// Extract header value as string
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string())
}

fn parse_permissions(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> UserContext {
        let (mut parts, _) = request.into_parts();
        UserContext::from_request_parts(&mut parts, &()).await.unwrap()
    }

    #[tokio::test]
    async fn test_user_context_extraction() {
        let request = Request::builder()
            .header("x-user-id", "test-user-123")
            .header("x-user-email", "test@example.com")
            .body(())
            .unwrap();

        let user = extract(request).await;
        assert_eq!(user.user_id, "test-user-123");
        assert_eq!(user.user_email, Some("test@example.com".to_string()));
        assert!(!user.is_restricted());
    }

    #[tokio::test]
    async fn test_default_user_without_headers() {
        let user = extract(Request::builder().body(()).unwrap()).await;
        assert_eq!(user, UserContext::default_user());
    }

    #[tokio::test]
    async fn test_permissions_header() {
        let request = Request::builder()
            .header("x-user-id", "reader")
            .header("x-user-permissions", "bundle-a, snomed ,,")
            .body(())
            .unwrap();

        let user = extract(request).await;
        let permissions = user.permissions.unwrap();
        assert_eq!(permissions.len(), 2);
        assert!(permissions.contains("bundle-a"));
        assert!(permissions.contains("snomed"));
    }
}
