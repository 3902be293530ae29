//! Input checks that run before anything reaches the session.

#[cfg(test)]
#[path = "compose_test.rs"]
mod compose_test;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("message is empty")]
    Empty,
    #[error("Message too long (max {max} characters)")]
    TooLong { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Please enter both username and password")]
pub struct MissingCredentials;

/// Sign-in form contents after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Trim the username and require both fields. The password is kept verbatim.
///
/// # Errors
///
/// [`MissingCredentials`] when either field is empty.
pub fn validate_credentials(username: &str, password: &str) -> Result<Credentials, MissingCredentials> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(MissingCredentials);
    }
    Ok(Credentials {
        username: username.to_owned(),
        password: password.to_owned(),
    })
}

/// Check a draft against the length bound and return the text to send.
///
/// The bound counts characters of the draft as typed; the returned text is
/// trimmed.
///
/// # Errors
///
/// [`DraftError::Empty`] for blank drafts, [`DraftError::TooLong`] past `max`.
pub fn validate_draft(draft: &str, max: usize) -> Result<&str, DraftError> {
    let trimmed = draft.trim();
    if trimmed.is_empty() {
        return Err(DraftError::Empty);
    }
    let len = draft.chars().count();
    if len > max {
        return Err(DraftError::TooLong { len, max });
    }
    Ok(trimmed)
}
