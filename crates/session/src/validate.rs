// crates/session/src/validate.rs
//! Local input validation. These run before any remote call; a failure
//! here means zero network traffic.

use regex_lite::Regex;
use std::sync::OnceLock;

pub const MIN_PASSWORD_LEN: usize = 6;

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"))
}

pub fn valid_email(email: &str) -> bool {
    email_re().is_match(email)
}

pub fn valid_password(password: &str) -> bool {
    password.len() >= MIN_PASSWORD_LEN
}
