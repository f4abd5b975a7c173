//! End-to-end domain scenarios over a fresh database.

use std::sync::Arc;

use parley_auth::{Identity, TokenValidator};
use parley_chats::{
    ChatError, ChatServices, CreateRoomRequest, ErrorKind, RegisterRequest, RoomSettingsInput,
    UpdateRoomRequest,
};
use parley_config::{DatabaseConfig, InvitesConfig, RoomsConfig};
use parley_database::{initialize_database, InviteStatus, Room};
use tempfile::TempDir;

struct World {
    services: ChatServices,
    _dir: Option<TempDir>,
}

impl World {
    async fn new() -> Self {
        Self::open("sqlite::memory:".to_string(), 1, None).await
    }

    /// A WAL file database behind a multi-connection pool.
    async fn on_disk() -> Self {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("scenarios.db").to_string_lossy());
        Self::open(url, 8, Some(dir)).await
    }

    async fn open(url: String, max_connections: u32, dir: Option<TempDir>) -> Self {
        let pool = initialize_database(&DatabaseConfig {
            url,
            max_connections,
        })
        .await
        .unwrap();
        let tokens = TokenValidator::new("scenario-secret", "parley", "parley-clients");
        Self {
            services: ChatServices::new(
                pool,
                RoomsConfig::default(),
                InvitesConfig::default(),
                tokens,
            ),
            _dir: dir,
        }
    }

    /// Register a user; returns (user id, personal workspace id).
    async fn register(&self, username: &str, email: &str) -> (String, Option<String>) {
        let outcome = self
            .services
            .accounts
            .register(RegisterRequest {
                username: username.to_string(),
                email: email.to_string(),
                password: "correct-horse".to_string(),
                display_name: None,
            })
            .await
            .unwrap();
        (outcome.user.id, outcome.workspace_id)
    }

    async fn room(&self, workspace_id: &str, name: &str, admin: &str, cap: Option<u32>) -> Room {
        self.services
            .rooms
            .create(
                CreateRoomRequest {
                    workspace_id: workspace_id.to_string(),
                    name: name.to_string(),
                    description: None,
                    settings: RoomSettingsInput {
                        max_members: cap,
                        ..Default::default()
                    },
                },
                admin,
            )
            .await
            .unwrap()
    }
}

fn identity(user_id: &str, name: &str) -> Identity {
    Identity {
        user_id: user_id.to_string(),
        display_name: name.to_string(),
    }
}

#[tokio::test]
async fn scenario_a_capacity_two_rejects_third_member() {
    let world = World::new().await;
    let (a, ws) = world.register("alice", "alice@example.com").await;
    let (b, _) = world.register("bobby", "bobby@example.com").await;
    let (c, _) = world.register("carol", "carol@example.com").await;

    let room = world.room(&ws.unwrap(), "general", &a, Some(2)).await;
    world.services.rooms.join(&room.id, &b).await.unwrap();

    let err = world.services.rooms.join(&room.id, &c).await.unwrap_err();
    assert!(matches!(err, ChatError::RoomFull { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn scenario_b_only_the_sender_edits() {
    let world = World::new().await;
    let (a, ws) = world.register("alice", "alice@example.com").await;
    let (b, _) = world.register("bobby", "bobby@example.com").await;
    let room = world.room(&ws.unwrap(), "general", &a, None).await;
    world.services.rooms.join(&room.id, &b).await.unwrap();

    let hi = world
        .services
        .messages
        .append(&room.id, &identity(&a, "alice"), "hi", None)
        .await
        .unwrap();

    let err = world.services.messages.edit(&hi.id, "hello", &b).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let edited = world.services.messages.edit(&hi.id, "hi all", &a).await.unwrap();
    assert!(edited.is_edited());
    assert_eq!(edited.body, "hi all");
}

#[tokio::test]
async fn scenario_c_registration_accepts_pending_invite() {
    let world = World::new().await;
    let (a, ws) = world.register("alice", "alice@example.com").await;
    let ws = ws.unwrap();
    let general = world.room(&ws, "general", &a, None).await;
    let random = world.room(&ws, "random", &a, None).await;

    let invite = world
        .services
        .workspaces
        .create_invite(&ws, "x@y.com", &a)
        .await
        .unwrap();

    let (x, joined_ws) = world.register("xavier", "x@y.com").await;
    assert_eq!(joined_ws.as_deref(), Some(ws.as_str()));

    assert!(world.services.workspaces.is_workspace_member(&ws, &x).await.unwrap());
    assert!(world.services.rooms.is_member(&general.id, &x).await.unwrap());
    assert!(world.services.rooms.is_member(&random.id, &x).await.unwrap());

    let invites = world.services.workspaces.list_invites(&ws, &a).await.unwrap();
    let stored = invites.iter().find(|i| i.id == invite.id).unwrap();
    assert_eq!(stored.status, InviteStatus::Accepted);
    assert!(stored.used_at.is_some());

    let profile = world.services.accounts.profile(&x).await.unwrap();
    assert_eq!(profile.room_ids.len(), 2);
    assert!(profile.admin_room_ids.is_empty());
}

#[tokio::test]
async fn scenario_d_deleted_room_disappears() {
    let world = World::new().await;
    let (a, ws) = world.register("alice", "alice@example.com").await;
    let (b, _) = world.register("bobby", "bobby@example.com").await;
    let (c, _) = world.register("carol", "carol@example.com").await;
    let room = world.room(&ws.unwrap(), "general", &a, None).await;
    world.services.rooms.join(&room.id, &b).await.unwrap();

    let deleted = world.services.rooms.delete(&room.id, &a).await.unwrap();
    assert!(!deleted.is_active());

    let err = world.services.rooms.join(&room.id, &c).await.unwrap_err();
    assert!(matches!(err, ChatError::RoomInactive { .. }));

    for user in [&a, &b] {
        let profile = world.services.accounts.profile(user).await.unwrap();
        assert!(!profile.room_ids.contains(&room.id));
        assert!(!profile.admin_room_ids.contains(&room.id));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn member_count_never_exceeds_capacity_under_mixed_operations() {
    let world = World::on_disk().await;
    let (admin, ws) = world.register("admin", "admin@example.com").await;
    let room = world.room(&ws.unwrap(), "busy", &admin, Some(3)).await;

    let mut users = Vec::new();
    for i in 0..6 {
        users.push(world.register(&format!("user{i}"), &format!("u{i}@example.com")).await.0);
    }

    let services = Arc::new(world.services.clone());
    let mut tasks = tokio::task::JoinSet::new();
    for (i, user) in users.iter().cloned().enumerate() {
        let services = services.clone();
        let room_id = room.id.clone();
        tasks.spawn(async move {
            let joined = match services.rooms.join(&room_id, &user).await {
                Ok(_) => true,
                Err(ChatError::RoomFull { .. }) => false,
                Err(other) => panic!("join failed: {other}"),
            };
            if joined && i % 2 == 0 {
                services.rooms.leave(&room_id, &user).await.unwrap();
            }
            let current = services.rooms.get(&room_id).await.unwrap();
            assert!(current.member_count <= i64::from(current.settings.max_members));
        });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap();
    }

    let room = world.services.rooms.get(&room.id).await.unwrap();
    assert!(room.member_count <= 3);
    let members = world.services.rooms.members(&room.id).await.unwrap();
    assert!(members.contains(&admin));

    let shrink = UpdateRoomRequest {
        settings: RoomSettingsInput {
            max_members: Some(1),
            ..Default::default()
        },
        ..Default::default()
    };
    if room.member_count > 1 {
        let err = world.services.rooms.update(&room.id, &admin, shrink).await.unwrap_err();
        assert!(matches!(err, ChatError::CapacityBelowMembers { .. }));
    }
}

#[tokio::test]
async fn former_members_cannot_list_messages() {
    let world = World::new().await;
    let (a, ws) = world.register("alice", "alice@example.com").await;
    let (b, _) = world.register("bobby", "bobby@example.com").await;
    let room = world.room(&ws.unwrap(), "general", &a, None).await;
    world.services.rooms.join(&room.id, &b).await.unwrap();

    let posted = world
        .services
        .messages
        .append(&room.id, &identity(&b, "bobby"), "before leaving", None)
        .await
        .unwrap();
    let page = world.services.messages.list_by_room(&room.id, &b, 0, 10).await.unwrap();
    assert_eq!(page.items[0].id, posted.id);

    world.services.rooms.leave(&room.id, &b).await.unwrap();
    let err = world.services.messages.list_by_room(&room.id, &b, 0, 10).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[tokio::test]
async fn room_created_after_invite_is_included_in_cascade() {
    let world = World::new().await;
    let (a, ws) = world.register("alice", "alice@example.com").await;
    let ws = ws.unwrap();
    let invite = world
        .services
        .workspaces
        .create_invite(&ws, "late@example.com", &a)
        .await
        .unwrap();
    let late_room = world.room(&ws, "late-room", &a, None).await;

    let (late, _) = world.register("late", "late@example.com").await;
    assert!(world.services.rooms.is_member(&late_room.id, &late).await.unwrap());

    let err = world.services.workspaces.accept_invite(&invite.id, &late).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}
