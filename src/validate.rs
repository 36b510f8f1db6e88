use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

// Mainland mobile numbers: 11 digits, 1[3-9] prefix.
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^1[3-9]\d{9}$").unwrap());

pub fn is_valid_email(s: &str) -> bool {
    EMAIL_RE.is_match(s)
}

pub fn is_valid_phone(s: &str) -> bool {
    PHONE_RE.is_match(s)
}

/// Display name fallback when registration supplies none.
pub fn default_username_for_email(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}

pub fn default_username_for_phone(phone: &str) -> String {
    let suffix = &phone[phone.len().saturating_sub(4)..];
    format!("user{suffix}")
}
