//! Repositories
//!
//! Repositories are stateless; every call takes the connection it runs on so
//! that services can compose several calls inside one transaction.

pub mod invite_repository;
pub mod message_repository;
pub mod room_repository;
pub mod user_repository;
pub mod workspace_repository;

pub use invite_repository::InviteRepository;
pub use message_repository::MessageRepository;
pub use room_repository::RoomRepository;
pub use user_repository::UserRepository;
pub use workspace_repository::WorkspaceRepository;

/// Build a `LIKE` pattern matching `fragment` anywhere, with wildcards escaped.
pub(crate) fn contains_pattern(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len() + 2);
    escaped.push('%');
    for ch in fragment.to_lowercase().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}


#[cfg(test)]
mod tests {
    use super::contains_pattern;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern("General"), "%general%");
    }
}
