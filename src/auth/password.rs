//! Signup input rules: email shape and password complexity.

use std::sync::LazyLock;

use regex::Regex;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static regex"));

/// Minimum password length in characters
pub const MIN_PASSWORD_LEN: usize = 8;

/// `local@domain.tld` with no whitespace and a single `@` on each side
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Every complexity rule `password` fails, in a fixed order. Empty means
/// the password is acceptable.
#[must_use]
pub fn unmet_password_rules(password: &str) -> Vec<String> {
    let rules: [(bool, &str); 5] = [
        (
            password.chars().count() >= MIN_PASSWORD_LEN,
            "Password must be at least 8 characters long",
        ),
        (
            password.chars().any(|c| c.is_ascii_uppercase()),
            "Password must contain at least one uppercase letter",
        ),
        (
            password.chars().any(|c| c.is_ascii_lowercase()),
            "Password must contain at least one lowercase letter",
        ),
        (
            password.chars().any(|c| c.is_ascii_digit()),
            "Password must contain at least one number",
        ),
        (
            password.chars().any(|c| !c.is_ascii_alphanumeric()),
            "Password must contain at least one special character",
        ),
    ];

    rules
        .into_iter()
        .filter(|(met, _)| !met)
        .map(|(_, message)| message.to_string())
        .collect()
}
