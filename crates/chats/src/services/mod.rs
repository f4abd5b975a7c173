//! Business logic services for the chat engine.
//!
//! Every service is cheap to clone and shares the pool, the keyed lock
//! registry and the clock with its siblings.

pub mod accounts;
pub mod membership_index;
pub mod message_log;
pub mod room_roster;
pub mod workspace_cascade;

pub use accounts::AccountService;
pub use membership_index::MembershipIndex;
pub use message_log::MessageLog;
pub use room_roster::RoomRoster;
pub use workspace_cascade::WorkspaceCascade;

use crate::utils::{Clock, EngineLocks, SystemClock};
use parley_auth::TokenValidator;
use parley_config::{InvitesConfig, RoomsConfig};
use sqlx::SqlitePool;
use std::sync::Arc;

/// The full set of domain services wired over one pool.
#[derive(Clone)]
pub struct ChatServices {
    pub rooms: RoomRoster,
    pub messages: MessageLog,
    pub workspaces: WorkspaceCascade,
    pub accounts: AccountService,
    pub index: MembershipIndex,
}

impl ChatServices {
    pub fn new(
        pool: SqlitePool,
        rooms: RoomsConfig,
        invites: InvitesConfig,
        tokens: TokenValidator,
    ) -> Self {
        Self::with_clock(pool, rooms, invites, tokens, Arc::new(SystemClock))
    }

    pub fn with_clock(
        pool: SqlitePool,
        rooms: RoomsConfig,
        invites: InvitesConfig,
        tokens: TokenValidator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let locks = EngineLocks::default();
        let index = MembershipIndex::new(pool.clone());
        let workspaces =
            WorkspaceCascade::new(pool.clone(), locks.clone(), clock.clone(), invites);

        Self {
            rooms: RoomRoster::new(pool.clone(), locks.clone(), clock.clone(), rooms.clone()),
            messages: MessageLog::new(pool.clone(), locks.clone(), clock.clone(), rooms),
            accounts: AccountService::new(
                pool,
                locks,
                tokens,
                workspaces.clone(),
                index.clone(),
                clock,
            ),
            workspaces,
            index,
        }
    }
}
