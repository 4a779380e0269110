use crate::error::{AppError, AppResult};

/// Extract the token from an `Authorization: Bearer <token>` header value.
///
/// The header must be exactly two space-separated parts with a literal
/// `Bearer` scheme.
pub fn extract_bearer(header: Option<&str>) -> AppResult<&str> {
    let header = header
        .filter(|h| !h.trim().is_empty())
        .ok_or(AppError::MissingHeader)?;

    let mut parts = header.split(' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next();

    match (scheme, token, parts.next()) {
        ("Bearer", Some(token), None) if token.is_empty() => {
            Err(AppError::MalformedToken("bearer token is empty".to_string()))
        }
        ("Bearer", Some(token), None) => Ok(token),
        _ => Err(AppError::InvalidScheme),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_token() {
        assert_eq!(extract_bearer(Some("Bearer abc.def")).unwrap(), "abc.def");
    }

    #[test]
    fn test_missing_or_blank_header() {
        assert!(matches!(extract_bearer(None), Err(AppError::MissingHeader)));
        assert!(matches!(extract_bearer(Some("   ")), Err(AppError::MissingHeader)));
    }

    #[test]
    fn test_wrong_scheme() {
        assert!(matches!(
            extract_bearer(Some("Basic dXNlcjpwYXNz")),
            Err(AppError::InvalidScheme)
        ));
        assert!(matches!(
            extract_bearer(Some("bearer token")),
            Err(AppError::InvalidScheme)
        ));
    }

    #[test]
    fn test_scheme_without_token() {
        assert!(matches!(
            extract_bearer(Some("Bearer")),
            Err(AppError::InvalidScheme)
        ));
    }

    #[test]
    fn test_extra_parts() {
        assert!(matches!(
            extract_bearer(Some("Bearer a b")),
            Err(AppError::InvalidScheme)
        ));
    }

    #[test]
    fn test_trailing_space_leaves_empty_token() {
        assert!(matches!(
            extract_bearer(Some("Bearer ")),
            Err(AppError::MalformedToken(_))
        ));
    }
}
