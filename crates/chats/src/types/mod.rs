//! Shared types for the chat services.

pub mod errors;
pub mod events;
pub mod requests;
pub mod responses;

pub use errors::{ChatError, ChatResult, ErrorKind};
pub use events::{ChatEvent, Topic};
pub use requests::{
    CreateRoomRequest, LoginRequest, RegisterRequest, RoomSettingsInput, UpdateRoomRequest,
};
pub use responses::{AuthOutcome, CascadeOutcome, Page, UserProfile};
