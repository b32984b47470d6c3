//! Utility functions for authentication.

/// Validate email address format.
///
/// Basic shape check, not full RFC 5322:
/// - exactly one `@` with non-empty local and domain parts
/// - at least one dot in the domain and no empty labels
/// - ASCII letters, digits and `.-+_` in the local part; letters, digits,
///   `.` and `-` in the domain
/// - between 3 and 254 characters
///
/// # Examples
///
/// ```
/// use agrogate_auth::utils::is_valid_email;
///
/// assert!(is_valid_email("grower@example.com"));
/// assert!(is_valid_email("grower+north@fields.example.co"));
/// assert!(!is_valid_email("invalid"));
/// assert!(!is_valid_email("@example.com"));
/// assert!(!is_valid_email("grower@"));
/// ```
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if !(3..=254).contains(&email.len()) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.contains('@') || !domain.contains('.') {
        return false;
    }

    let local_ok = local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'));
    let domain_ok = domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'));

    local_ok && domain_ok && domain.split('.').all(|label| !label.is_empty())
}
