use crate::error::{AppError, AppResult};

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length for job identifiers accepted from callers.
pub const MAX_JOB_ID_LENGTH: usize = 128;

/// Bounds for an STS `RoleSessionName`.
pub const MIN_SESSION_NAME_LENGTH: usize = 2;
pub const MAX_SESSION_NAME_LENGTH: usize = 64;

/// Maximum length for Tencent Cloud action names.
pub const MAX_ACTION_LENGTH: usize = 128;

/// Fail with `MissingParams` naming every absent or blank field.
///
/// All fields are checked before failing, so the caller learns the complete
/// list in one round trip.
pub fn require(fields: &[(&str, Option<&str>)]) -> AppResult<()> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, value)| value.is_none_or(|v| v.trim().is_empty()))
        .map(|(name, _)| *name)
        .collect();

    if !missing.is_empty() {
        return Err(AppError::MissingParams(missing.join(", ")));
    }

    Ok(())
}

/// Validate a provider job identifier.
///
/// Rules:
/// - Must be between 1 and 128 characters
/// - Must not contain whitespace or control characters
pub fn validate_job_id(id: &str) -> AppResult<()> {
    if id.is_empty() {
        return Err(AppError::MissingParams("id".to_string()));
    }

    if id.len() > MAX_JOB_ID_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Job id cannot exceed {MAX_JOB_ID_LENGTH} characters"
        )));
    }

    if let Some(pos) = id.chars().position(|c| c.is_control() || c.is_whitespace()) {
        return Err(AppError::BadRequest(format!(
            "Job id contains invalid character at position {pos}"
        )));
    }

    Ok(())
}

/// Validate an STS role session name.
///
/// Rules:
/// - Must be between 2 and 64 characters
/// - Can contain alphanumeric characters, dots, at signs, underscores, and hyphens
pub fn validate_role_session_name(name: &str) -> AppResult<()> {
    let len = name.chars().count();
    if !(MIN_SESSION_NAME_LENGTH..=MAX_SESSION_NAME_LENGTH).contains(&len) {
        return Err(AppError::BadRequest(format!(
            "roleSessionName must be between {MIN_SESSION_NAME_LENGTH} and \
             {MAX_SESSION_NAME_LENGTH} characters"
        )));
    }

    if let Some((i, c)) = name
        .chars()
        .enumerate()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '@' | '_' | '-')))
    {
        return Err(AppError::BadRequest(format!(
            "roleSessionName contains invalid character '{c}' at position {i}"
        )));
    }

    Ok(())
}

/// Validate a Tencent Cloud action name.
///
/// Action names travel in the `X-TC-Action` header and in the canonical
/// request, so only `PascalCase` ASCII alphanumerics are accepted.
pub fn validate_action(action: &str) -> AppResult<()> {
    if action.is_empty() {
        return Err(AppError::MissingParams("action".to_string()));
    }

    if action.len() > MAX_ACTION_LENGTH {
        return Err(AppError::BadRequest(format!(
            "Action cannot exceed {MAX_ACTION_LENGTH} characters"
        )));
    }

    if !action.starts_with(|c: char| c.is_ascii_uppercase()) {
        return Err(AppError::BadRequest(
            "Action must start with an uppercase letter".to_string(),
        ));
    }

    if !action.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest(
            "Action may only contain ASCII letters and digits".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_require_accepts_present_fields() {
        assert!(require(&[("fileUrl", Some("https://x")), ("fileName", Some("a.pdf"))]).is_ok());
    }

    #[test]
    fn test_require_lists_every_missing_field() {
        let err = require(&[
            ("accessKeyId", None),
            ("accessKeySecret", Some("  ")),
            ("roleArn", Some("acs:ram::1:role/r")),
            ("roleSessionName", None),
        ])
        .unwrap_err();

        match err {
            AppError::MissingParams(fields) => {
                assert_eq!(fields, "accessKeyId, accessKeySecret, roleSessionName")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_valid_job_ids() {
        assert!(validate_job_id("docmind-20240101-abc123").is_ok());
        assert!(validate_job_id("a").is_ok());
    }

    #[test]
    fn test_invalid_job_ids() {
        assert!(matches!(validate_job_id(""), Err(AppError::MissingParams(_))));
        assert!(validate_job_id(&"a".repeat(129)).is_err());
        assert!(
            validate_job_id("job id")
                .unwrap_err()
                .to_string()
                .contains("position 3")
        );
        assert!(validate_job_id("job\n").is_err());
    }

    #[test]
    fn test_role_session_names() {
        assert!(validate_role_session_name("gateway-session").is_ok());
        assert!(validate_role_session_name("user@example.com").is_ok());
        assert!(validate_role_session_name("a").is_err());
        assert!(validate_role_session_name(&"a".repeat(65)).is_err());
        assert!(
            validate_role_session_name("bad name")
                .unwrap_err()
                .to_string()
                .contains("invalid character")
        );
    }

    #[test]
    fn test_actions() {
        assert!(validate_action("GetReconstructDocumentResult").is_ok());
        assert!(validate_action("DescribeInstances").is_ok());
        assert!(matches!(validate_action(""), Err(AppError::MissingParams(_))));
        assert!(validate_action("describeInstances").is_err());
        assert!(validate_action("Describe-Instances").is_err());
        assert!(validate_action("Describe\nInstances").is_err());
    }
}
