//! Reverse lookups over the rosters.
//!
//! Room and workspace rosters are the only record of who belongs where.
//! "Rooms of a user" and friends are answered by querying them, filtered to
//! active rooms and active memberships.

use crate::types::ChatResult;
use parley_database::{RoomRepository, WorkspaceRepository};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct MembershipIndex {
    pool: SqlitePool,
}

impl MembershipIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn joined_room_ids(&self, user_id: &str) -> ChatResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        let rooms = RoomRepository::list_for_user(&mut conn, user_id).await?;
        Ok(rooms.into_iter().map(|room| room.id).collect())
    }

    pub async fn admin_room_ids(&self, user_id: &str) -> ChatResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        let rooms = RoomRepository::list_admin(&mut conn, user_id).await?;
        Ok(rooms.into_iter().map(|room| room.id).collect())
    }

    pub async fn workspace_ids(&self, user_id: &str) -> ChatResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        let workspaces = WorkspaceRepository::list_for_user(&mut conn, user_id).await?;
        Ok(workspaces.into_iter().map(|workspace| workspace.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::services::test_support::Fixture;

    #[tokio::test]
    async fn admin_rooms_are_a_subset_of_joined_rooms() {
        let fx = Fixture::new().await;
        let a = fx.user("alice").await;
        let b = fx.user("bobby").await;
        let ws = fx.workspace("Acme", &a).await;
        let general = fx.room(&ws, "general", &a, None).await;
        let random = fx.room(&ws, "random", &a, None).await;
        fx.services.rooms.join(&general.id, &b).await.unwrap();
        fx.services.rooms.transfer_admin(&general.id, &a, &b).await.unwrap();

        for user in [&a, &b] {
            let joined = fx.services.index.joined_room_ids(user).await.unwrap();
            let admin = fx.services.index.admin_room_ids(user).await.unwrap();
            assert!(admin.iter().all(|id| joined.contains(id)), "{user}: {admin:?} ⊄ {joined:?}");
        }

        assert_eq!(fx.services.index.admin_room_ids(&b).await.unwrap(), vec![general.id.clone()]);
        assert_eq!(fx.services.index.admin_room_ids(&a).await.unwrap(), vec![random.id.clone()]);
        assert_eq!(fx.services.index.workspace_ids(&a).await.unwrap(), vec![ws]);
        assert!(fx.services.index.workspace_ids(&b).await.unwrap().is_empty());
    }
}
