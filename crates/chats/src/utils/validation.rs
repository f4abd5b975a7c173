//! Validation utilities.

use crate::types::{ChatError, ChatResult};
use once_cell::sync::Lazy;
use regex::Regex;

static EMAIL: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").ok());
static USERNAME: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").ok());

pub const MAX_MESSAGE_CHARS: usize = 2000;
pub const MAX_DESCRIPTION_CHARS: usize = 500;

pub struct Validator;

impl Validator {
    /// Trim and lower-case an email address.
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    pub fn email(email: &str) -> ChatResult<()> {
        if email.trim().is_empty() {
            return Err(ChatError::validation("email cannot be empty"));
        }
        if email.len() > 255 {
            return Err(ChatError::validation("email too long (max 255 characters)"));
        }
        match EMAIL.as_ref() {
            Some(pattern) if pattern.is_match(email.trim()) => Ok(()),
            _ => Err(ChatError::validation("invalid email format")),
        }
    }

    pub fn username(username: &str) -> ChatResult<()> {
        let length = username.chars().count();
        if !(3..=20).contains(&length) {
            return Err(ChatError::validation("username must be 3-20 characters"));
        }
        match USERNAME.as_ref() {
            Some(pattern) if pattern.is_match(username) => Ok(()),
            _ => Err(ChatError::validation(
                "username may only contain letters, digits, '.', '_' and '-'",
            )),
        }
    }

    pub fn password(password: &str) -> ChatResult<()> {
        if password.chars().count() < 6 {
            return Err(ChatError::validation("password must be at least 6 characters"));
        }
        Ok(())
    }

    pub fn room_name(name: &str) -> ChatResult<()> {
        let length = name.trim().chars().count();
        if !(3..=50).contains(&length) {
            return Err(ChatError::validation("room name must be 3-50 characters"));
        }
        Ok(())
    }

    pub fn workspace_name(name: &str) -> ChatResult<()> {
        let length = name.trim().chars().count();
        if !(3..=50).contains(&length) {
            return Err(ChatError::validation("workspace name must be 3-50 characters"));
        }
        Ok(())
    }

    pub fn description(description: Option<&str>) -> ChatResult<()> {
        if description.map_or(0, |d| d.chars().count()) > MAX_DESCRIPTION_CHARS {
            return Err(ChatError::validation("description too long (max 500 characters)"));
        }
        Ok(())
    }

    pub fn message_text(text: &str) -> ChatResult<()> {
        if text.trim().is_empty() {
            return Err(ChatError::validation("message cannot be empty"));
        }
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ChatError::validation("message too long (max 2000 characters)"));
        }
        Ok(())
    }

    pub fn capacity(max_members: u32) -> ChatResult<()> {
        if max_members == 0 {
            return Err(ChatError::validation("max_members must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_rules() {
        assert!(Validator::email("x@y.com").is_ok());
        assert!(Validator::email(" X@Y.COM ").is_ok());
        assert!(Validator::email("no-at-sign").is_err());
        assert!(Validator::email("").is_err());
        assert_eq!(Validator::normalize_email(" X@Y.COM "), "x@y.com");
    }

    #[test]
    fn message_text_bounds() {
        assert!(Validator::message_text("hi").is_ok());
        assert!(Validator::message_text("   ").is_err());
        assert!(Validator::message_text(&"a".repeat(MAX_MESSAGE_CHARS)).is_ok());
        assert!(Validator::message_text(&"a".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
    }

    #[test]
    fn room_name_bounds() {
        assert!(Validator::room_name("ab").is_err());
        assert!(Validator::room_name("abc").is_ok());
        assert!(Validator::room_name(&"x".repeat(51)).is_err());
    }

    #[test]
    fn username_charset() {
        assert!(Validator::username("alice_01").is_ok());
        assert!(Validator::username("al ice").is_err());
        assert!(Validator::username("al").is_err());
    }
}
