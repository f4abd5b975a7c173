//! # Parley Chats Crate
//!
//! Domain services of the chat engine: the room roster, the per-room message
//! log, the workspace membership cascade, accounts and the membership index
//! that answers reverse lookups from the rosters.
//!
//! ## Architecture
//!
//! - **Services**: business rules; each mutation runs under the keyed locks in one transaction
//! - **Types**: errors, events, requests and responses shared with the gateway
//! - **Utils**: locks, clock, ids, permission and input checks
//!
//! ## Usage
//!
//! ```rust,no_run
//! # async fn demo(pool: sqlx::SqlitePool, tokens: parley_auth::TokenValidator) -> parley_chats::ChatResult<()> {
//! use parley_chats::{ChatServices, CreateRoomRequest};
//!
//! let services = ChatServices::new(pool, Default::default(), Default::default(), tokens);
//! let room = services
//!     .rooms
//!     .create(
//!         CreateRoomRequest {
//!             workspace_id: "ws".into(),
//!             name: "general".into(),
//!             description: None,
//!             settings: Default::default(),
//!         },
//!         "user-1",
//!     )
//!     .await?;
//! services.rooms.join(&room.id, "user-2").await?;
//! # Ok(())
//! # }
//! ```

pub mod services;
pub mod types;
pub mod utils;

pub use services::{
    AccountService, ChatServices, MembershipIndex, MessageLog, RoomRoster, WorkspaceCascade,
};
pub use types::{
    AuthOutcome, CascadeOutcome, ChatError, ChatEvent, ChatResult, CreateRoomRequest, ErrorKind,
    LoginRequest, Page, RegisterRequest, RoomSettingsInput, Topic, UpdateRoomRequest, UserProfile,
};
pub use utils::{Clock, EngineLocks, KeyedLocks, SystemClock};
