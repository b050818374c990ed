//! Chat core service tests
//!
//! Exercises the services through the same DI registrations the server uses, against a
//! fresh in-memory database per test. Serialized because they share the global test pool.

use chat_core::core::error::ChatError;
use chat_core::core::events::ChatEvent;
use chat_core::core::models::{MessageKind, MembershipUpdate, UploadFile};
use chat_core::core::traits::{
    Broadcaster, MessageLog, ParticipantDirectory, ReadTracker, RoomDirectory,
};
use chat_core::infrastructure::database::DatabaseConnection;
use chat_core::infrastructure::entities::{Room, Timestamp};
use chat_core::infrastructure::traits::RoomRepository;
use di::{Ref, ServiceProvider};
use serial_test::serial;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

static TEST_DB_COUNTER: AtomicU32 = AtomicU32::new(0);

struct TestChat {
    pool: SqlitePool,
    _root: ServiceProvider,
    scope: ServiceProvider,
}

impl TestChat {
    async fn new() -> TestChat {
        let db_num = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
        let db_url = format!("sqlite:file:coredb{}?mode=memory&cache=shared", db_num);

        let pool = SqlitePool::connect(&db_url).await.unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        DatabaseConnection::set_test_pool(pool.clone());

        let root = chat_core::services().build_provider().unwrap();
        let scope = root.create_scope();

        TestChat {
            pool,
            _root: root,
            scope,
        }
    }

    fn participants(&self) -> Ref<dyn ParticipantDirectory> {
        self.scope.get_required::<dyn ParticipantDirectory>()
    }

    fn rooms(&self) -> Ref<dyn RoomDirectory> {
        self.scope.get_required::<dyn RoomDirectory>()
    }

    fn messages(&self) -> Ref<dyn MessageLog> {
        self.scope.get_required::<dyn MessageLog>()
    }

    fn reads(&self) -> Ref<dyn ReadTracker> {
        self.scope.get_required::<dyn ReadTracker>()
    }

    fn broadcaster(&self) -> Ref<dyn Broadcaster> {
        self.scope.get_required::<dyn Broadcaster>()
    }

    async fn participant(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.participants()
            .register(id, name.to_owned())
            .await
            .unwrap();
        id
    }

    async fn say(&self, room_id: Uuid, author_id: Uuid, content: &str) -> Uuid {
        self.messages()
            .append(
                room_id,
                Some(author_id),
                MessageKind::User,
                content.to_owned(),
                Vec::new(),
            )
            .await
            .unwrap()
            .id
    }

    async fn contents(&self, room_id: Uuid, participant_id: Uuid) -> Vec<String> {
        self.messages()
            .list(room_id, participant_id, None, Some(100))
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect()
    }

    async fn membership_rows(&self, room_id: Uuid) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM memberships WHERE room_id = ?")
            .bind(room_id)
            .fetch_one(&self.pool)
            .await
            .unwrap();
        count
    }
}

impl Drop for TestChat {
    fn drop(&mut self) {
        DatabaseConnection::clear_test_pool();
    }
}

#[tokio::test]
#[serial]
async fn test_register_rejects_blank_name() {
    let chat = TestChat::new().await;

    let result = chat.participants().register(Uuid::new_v4(), "  ".to_owned()).await;

    assert!(matches!(result, Err(ChatError::InvalidArgument(_))));
}

#[tokio::test]
#[serial]
async fn test_register_renames_existing_participant() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;

    chat.participants()
        .register(alice, "Alicia".to_owned())
        .await
        .unwrap();

    assert_eq!(chat.participants().find(alice).await.unwrap().name, "Alicia");
}

#[tokio::test]
#[serial]
async fn test_direct_room_reused_from_both_sides() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;

    let first = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();
    let second = chat
        .rooms()
        .create_or_reuse_direct_room(bob, alice)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert!(!first.is_team);

    let summary = chat.rooms().room_summary(alice, first.id).await.unwrap();
    assert_eq!(summary.display_name, "Bob");
    assert_eq!(summary.counterpart_id, Some(bob));
    assert_eq!(summary.member_count, 2);
}

#[tokio::test]
#[serial]
async fn test_direct_room_with_self_rejected() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;

    let result = chat.rooms().create_or_reuse_direct_room(alice, alice).await;

    assert!(matches!(result, Err(ChatError::InvalidArgument(_))));
}

#[tokio::test]
#[serial]
async fn test_direct_room_never_exceeds_two_memberships() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;

    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    for round in 0..3 {
        chat.say(room.id, alice, &format!("round {round}")).await;
        chat.rooms().leave(room.id, bob).await.unwrap();
        let reopened = chat
            .rooms()
            .create_or_reuse_direct_room(bob, alice)
            .await
            .unwrap();
        assert_eq!(reopened.id, room.id);
        assert_eq!(chat.membership_rows(room.id).await, 2);
    }
}

#[tokio::test]
#[serial]
async fn test_deleted_direct_room_is_replaced() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;

    let old = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();
    chat.say(old.id, alice, "before").await;
    sqlx::query("UPDATE rooms SET is_deleted = 1 WHERE id = ?")
        .bind(old.id)
        .execute(&chat.pool)
        .await
        .unwrap();

    let fresh = chat
        .rooms()
        .create_or_reuse_direct_room(bob, alice)
        .await
        .unwrap();

    assert_ne!(fresh.id, old.id);
    assert!(!fresh.is_team);
    assert!(chat.contents(fresh.id, bob).await.is_empty());

    let (old_key,): (Option<String>,) = sqlx::query_as("SELECT direct_key FROM rooms WHERE id = ?")
        .bind(old.id)
        .fetch_one(&chat.pool)
        .await
        .unwrap();
    assert_eq!(old_key, None);

    let again = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();
    assert_eq!(again.id, fresh.id);
}

#[tokio::test]
#[serial]
async fn test_direct_key_insert_yields_to_existing_room() {
    let chat = TestChat::new().await;
    let rooms = chat.scope.get_required::<dyn RoomRepository>();
    let key = Room::direct_key(Uuid::new_v4(), Uuid::new_v4());
    let mut conn = chat.pool.acquire().await.unwrap();

    let winner = rooms
        .insert_direct(&mut conn, &key, Timestamp::now())
        .await
        .unwrap()
        .unwrap();
    let loser = rooms
        .insert_direct(&mut conn, &key, Timestamp::now())
        .await
        .unwrap();
    assert!(loser.is_none());

    let found = rooms.find_direct(&mut conn, &key).await.unwrap().unwrap();
    assert_eq!(found.id, winner.id);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
        .fetch_one(&mut *conn)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_direct_room_creation_yields_one_room() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;

    let (left, right) = (chat.rooms(), chat.rooms());
    let first = tokio::spawn(async move { left.create_or_reuse_direct_room(alice, bob).await });
    let second = tokio::spawn(async move { right.create_or_reuse_direct_room(bob, alice).await });

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();

    assert_eq!(first.id, second.id);
    let (rooms,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM rooms")
        .fetch_one(&chat.pool)
        .await
        .unwrap();
    assert_eq!(rooms, 1);
}

#[tokio::test]
#[serial]
async fn test_team_room_starts_without_unread() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let carol = chat.participant("Carol").await;

    let room = chat
        .rooms()
        .create_team_room(alice, "".to_owned(), vec![bob, carol, bob])
        .await
        .unwrap();

    assert!(room.is_team);
    assert_eq!(room.name, "Alice, Bob, Carol");
    assert_eq!(chat.membership_rows(room.id).await, 3);

    let messages = chat.messages().list(room.id, bob, None, None).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].kind, MessageKind::System);
    assert_eq!(messages[0].author_name, "SYSTEM");
    assert_eq!(messages[0].unread_count, 0);
    assert_eq!(chat.reads().total_unread_for_participant(bob).await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_team_room_needs_invitees() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;

    let result = chat
        .rooms()
        .create_team_room(alice, "solo".to_owned(), vec![alice])
        .await;

    assert!(matches!(result, Err(ChatError::InvalidArgument(_))));
}

#[tokio::test]
#[serial]
async fn test_outsider_is_forbidden() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let mallory = chat.participant("Mallory").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    let append = chat
        .messages()
        .append(room.id, Some(mallory), MessageKind::User, "hey".to_owned(), Vec::new())
        .await;
    assert!(matches!(append, Err(ChatError::Forbidden(_))));

    let summary = chat.rooms().room_summary(mallory, room.id).await;
    assert!(matches!(summary, Err(ChatError::Forbidden(_))));

    let missing = chat.rooms().room_summary(alice, Uuid::new_v4()).await;
    assert!(matches!(missing, Err(ChatError::NotFound("room"))));
}

#[tokio::test]
#[serial]
async fn test_hi_marks_one_unread_until_read() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    let hi = chat
        .messages()
        .append(room.id, Some(alice), MessageKind::User, "hi".to_owned(), Vec::new())
        .await
        .unwrap();
    assert_eq!(hi.unread_count, 1);
    assert_eq!(hi.author_name, "Alice");

    assert_eq!(chat.reads().total_unread_for_participant(bob).await.unwrap(), 1);
    assert_eq!(chat.reads().total_unread_for_participant(alice).await.unwrap(), 0);
    let rooms = chat.rooms().list_rooms(bob).await.unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].unread_count, 1);
    assert_eq!(rooms[0].last_message.as_ref().unwrap().content, "hi");

    let advance = chat
        .reads()
        .advance_read_pointer(room.id, bob, None)
        .await
        .unwrap();
    assert!(advance.advanced);
    assert_eq!(advance.last_read_message_id, Some(hi.id));
    assert_eq!(advance.receipts.len(), 1);
    assert_eq!(advance.receipts[0].message_id, hi.id);
    assert_eq!(advance.receipts[0].unread_count, 0);

    assert_eq!(chat.reads().total_unread_for_participant(bob).await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_reading_drops_unread_by_exactly_one() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let carol = chat.participant("Carol").await;
    let room = chat
        .rooms()
        .create_team_room(alice, "team".to_owned(), vec![bob, carol])
        .await
        .unwrap();

    let message = chat
        .messages()
        .append(room.id, Some(alice), MessageKind::User, "news".to_owned(), Vec::new())
        .await
        .unwrap();
    assert_eq!(message.unread_count, 2);

    let advance = chat
        .reads()
        .advance_read_pointer(room.id, bob, Some(message.id))
        .await
        .unwrap();
    assert_eq!(advance.receipts.len(), 1);
    assert_eq!(advance.receipts[0].unread_count, 1);

    let listed = chat.messages().list(room.id, carol, None, None).await.unwrap();
    let news = listed.iter().find(|m| m.id == message.id).unwrap();
    assert_eq!(news.unread_count, 1);
}

#[tokio::test]
#[serial]
async fn test_read_pointer_never_moves_backward() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();
    let first = chat.say(room.id, alice, "one").await;
    let second = chat.say(room.id, alice, "two").await;

    chat.reads()
        .advance_read_pointer(room.id, bob, Some(second))
        .await
        .unwrap();

    let backward = chat
        .reads()
        .advance_read_pointer(room.id, bob, Some(first))
        .await;
    assert!(matches!(backward, Err(ChatError::Conflict(_))));

    let again = chat
        .reads()
        .advance_read_pointer(room.id, bob, Some(second))
        .await
        .unwrap();
    assert!(!again.advanced);
    assert_eq!(again.last_read_message_id, Some(second));
    assert!(again.receipts.is_empty());

    let unknown = chat
        .reads()
        .advance_read_pointer(room.id, bob, Some(Uuid::new_v4()))
        .await;
    assert!(matches!(unknown, Err(ChatError::NotFound("message"))));
}

#[tokio::test]
#[serial]
async fn test_mark_read_in_empty_room_is_noop() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    let advance = chat
        .reads()
        .advance_read_pointer(room.id, bob, None)
        .await
        .unwrap();

    assert!(!advance.advanced);
    assert_eq!(advance.last_read_message_id, None);
}

#[tokio::test]
#[serial]
async fn test_total_unread_across_messages() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    for content in ["one", "two", "three"] {
        chat.say(room.id, alice, content).await;
    }
    assert_eq!(chat.reads().total_unread_for_participant(bob).await.unwrap(), 3);

    let advance = chat
        .reads()
        .advance_read_pointer(room.id, bob, None)
        .await
        .unwrap();
    assert_eq!(advance.receipts.len(), 3);
    assert!(advance.receipts.iter().all(|r| r.unread_count == 0));
    assert_eq!(chat.reads().total_unread_for_participant(bob).await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_sender_has_read_own_message() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    let from_bob = chat.say(room.id, bob, "first").await;
    chat.say(room.id, alice, "reply").await;

    // replying implies alice saw bob's message
    assert_eq!(chat.reads().total_unread_for_participant(alice).await.unwrap(), 0);
    let listed = chat.messages().list(room.id, bob, None, None).await.unwrap();
    let first = listed.iter().find(|m| m.id == from_bob).unwrap();
    assert_eq!(first.unread_count, 0);
}

#[tokio::test]
#[serial]
async fn test_rejoined_member_sees_only_new_history() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let carol = chat.participant("Carol").await;
    let dave = chat.participant("Dave").await;
    let room = chat
        .rooms()
        .create_team_room(alice, "team".to_owned(), vec![bob, carol])
        .await
        .unwrap();

    chat.say(room.id, alice, "before").await;
    chat.rooms().leave(room.id, carol).await.unwrap();
    assert!(chat.rooms().list_rooms(carol).await.unwrap().is_empty());

    chat.rooms().invite(room.id, alice, vec![dave]).await.unwrap();
    chat.say(room.id, alice, "while away").await;
    let gone = chat.messages().list(room.id, carol, None, None).await;
    assert!(matches!(gone, Err(ChatError::Forbidden(_))));

    chat.rooms().invite(room.id, bob, vec![carol]).await.unwrap();
    chat.say(room.id, alice, "welcome back").await;

    let seen = chat.contents(room.id, carol).await;
    assert_eq!(seen, vec!["welcome back".to_owned(), "Bob invited Carol".to_owned()]);
    assert_eq!(chat.reads().total_unread_for_participant(carol).await.unwrap(), 1);

    let history = chat.contents(room.id, alice).await;
    assert!(history.contains(&"Carol left the room".to_owned()));
    assert!(history.contains(&"before".to_owned()));
    assert!(history.contains(&"Alice invited Dave".to_owned()));
    assert_eq!(chat.membership_rows(room.id).await, 4);
}

#[tokio::test]
#[serial]
async fn test_inviting_into_direct_room_promotes_it() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let carol = chat.participant("Carol").await;
    let direct = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    chat.rooms().invite(direct.id, alice, vec![carol]).await.unwrap();

    let summary = chat.rooms().room_summary(carol, direct.id).await.unwrap();
    assert!(summary.is_team);
    assert_eq!(summary.member_count, 3);
    assert_eq!(summary.display_name, "Alice, Bob, Carol");

    // the pair gets a fresh direct room once theirs became a team room
    let fresh = chat
        .rooms()
        .create_or_reuse_direct_room(bob, alice)
        .await
        .unwrap();
    assert_ne!(fresh.id, direct.id);
    assert!(!fresh.is_team);

    // dropping back to two members keeps the team
    chat.rooms().leave(direct.id, carol).await.unwrap();
    let summary = chat.rooms().room_summary(alice, direct.id).await.unwrap();
    assert!(summary.is_team);
    assert_eq!(summary.member_count, 2);
}

#[tokio::test]
#[serial]
async fn test_reinviting_into_direct_room_keeps_it_direct() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    chat.rooms().leave(room.id, bob).await.unwrap();
    chat.rooms().invite(room.id, alice, vec![bob]).await.unwrap();

    let summary = chat.rooms().room_summary(bob, room.id).await.unwrap();
    assert!(!summary.is_team);
    assert_eq!(chat.membership_rows(room.id).await, 2);
}

#[tokio::test]
#[serial]
async fn test_invite_requires_active_inviter() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let carol = chat.participant("Carol").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    let result = chat.rooms().invite(room.id, carol, vec![carol, alice]).await;

    assert!(matches!(result, Err(ChatError::Forbidden(_))));
}

#[tokio::test]
#[serial]
async fn test_paging_walks_history_newest_first() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();
    for n in 1..=5 {
        chat.say(room.id, alice, &format!("m{n}")).await;
    }

    let first = chat.messages().list(room.id, bob, None, Some(2)).await.unwrap();
    let first: Vec<_> = first.into_iter().map(|m| (m.id, m.content)).collect();
    assert_eq!(first[0].1, "m5");
    assert_eq!(first[1].1, "m4");

    let second = chat
        .messages()
        .list(room.id, bob, Some(first[1].0.to_string()), Some(2))
        .await
        .unwrap();
    let second: Vec<_> = second.into_iter().map(|m| m.content).collect();
    assert_eq!(second, vec!["m3".to_owned(), "m2".to_owned()]);

    for size in [0, 101] {
        let result = chat.messages().list(room.id, bob, None, Some(size)).await;
        assert!(matches!(result, Err(ChatError::InvalidArgument(_))));
    }
    let garbage = chat
        .messages()
        .list(room.id, bob, Some("not-a-cursor".to_owned()), None)
        .await;
    assert!(matches!(garbage, Err(ChatError::InvalidArgument(_))));
    let unknown = chat
        .messages()
        .list(room.id, bob, Some(Uuid::new_v4().to_string()), None)
        .await;
    assert!(matches!(unknown, Err(ChatError::NotFound("message"))));
}

#[tokio::test]
#[serial]
async fn test_append_validation() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    let blank = chat
        .messages()
        .append(room.id, Some(alice), MessageKind::User, "   ".to_owned(), Vec::new())
        .await;
    assert!(matches!(blank, Err(ChatError::InvalidArgument(_))));

    let anonymous = chat
        .messages()
        .append(room.id, None, MessageKind::User, "who?".to_owned(), Vec::new())
        .await;
    assert!(matches!(anonymous, Err(ChatError::InvalidArgument(_))));

    let too_long = chat
        .messages()
        .append(room.id, Some(alice), MessageKind::User, "x".repeat(4097), Vec::new())
        .await;
    assert!(matches!(too_long, Err(ChatError::InvalidArgument(_))));

    let missing_room = chat
        .messages()
        .append(Uuid::new_v4(), Some(alice), MessageKind::User, "hi".to_owned(), Vec::new())
        .await;
    assert!(matches!(missing_room, Err(ChatError::NotFound("room"))));
}

#[tokio::test]
#[serial]
async fn test_system_message_counts_everyone_unread() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    let notice = chat
        .messages()
        .append(room.id, Some(alice), MessageKind::System, "maintenance".to_owned(), Vec::new())
        .await
        .unwrap();

    assert_eq!(notice.author_id, None);
    assert_eq!(notice.author_name, "SYSTEM");
    assert_eq!(notice.unread_count, 2);
    // system notices never count toward the badge
    assert_eq!(chat.reads().total_unread_for_participant(bob).await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_attachments_travel_with_message() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    let sent = chat
        .messages()
        .append(
            room.id,
            Some(alice),
            MessageKind::User,
            String::new(),
            vec![UploadFile {
                file_name: "notes.txt".to_owned(),
                content_type: "text/plain".to_owned(),
                data: b"remember the milk".to_vec(),
            }],
        )
        .await
        .unwrap();
    assert_eq!(sent.attachments.len(), 1);
    assert_eq!(sent.attachments[0].size, 17);

    let listed = chat.messages().list(room.id, bob, None, None).await.unwrap();
    assert_eq!(listed[0].attachments, sent.attachments);
}

#[tokio::test]
#[serial]
async fn test_removed_participant_shows_as_unknown() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();
    chat.say(room.id, bob, "bye").await;

    chat.participants().remove(bob).await.unwrap();

    let summary = chat.rooms().room_summary(alice, room.id).await.unwrap();
    assert_eq!(summary.display_name, "unknown");
    let listed = chat.messages().list(room.id, alice, None, None).await.unwrap();
    assert_eq!(listed[0].author_id, None);
    assert_eq!(listed[0].author_name, "unknown");

    let again = chat.participants().remove(bob).await;
    assert!(matches!(again, Err(ChatError::NotFound("participant"))));
}

#[tokio::test]
#[serial]
async fn test_membership_settings_update() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    let updated = chat
        .rooms()
        .update_membership(
            room.id,
            alice,
            MembershipUpdate {
                display_name: Some("Al".to_owned()),
                is_notify: Some(false),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.display_name, "Al");
    assert!(!updated.is_notify);

    let summary = chat.rooms().room_summary(bob, room.id).await.unwrap();
    assert_eq!(summary.display_name, "Al");

    let blank = chat
        .rooms()
        .update_membership(
            room.id,
            alice,
            MembershipUpdate {
                display_name: Some(" ".to_owned()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(blank, Err(ChatError::InvalidArgument(_))));
}

#[tokio::test]
#[serial]
async fn test_events_reach_room_members_only() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let mallory = chat.participant("Mallory").await;
    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();
    let mut receiver = chat.broadcaster().subscribe();

    let hi = chat.say(room.id, alice, "hi").await;

    let envelope = receiver.try_recv().unwrap();
    assert!(envelope.is_for(alice));
    assert!(envelope.is_for(bob));
    assert!(!envelope.is_for(mallory));
    match &*envelope.event {
        ChatEvent::MessageCreated { message } => assert_eq!(message.id, hi),
        other => panic!("unexpected event {other:?}"),
    }

    chat.reads()
        .advance_read_pointer(room.id, bob, None)
        .await
        .unwrap();

    let receipts = receiver.try_recv().unwrap();
    assert!(matches!(
        &*receipts.event,
        ChatEvent::ReadReceipts { reader_id, .. } if *reader_id == bob
    ));
    let total = receiver.try_recv().unwrap();
    assert!(total.is_for(bob) && !total.is_for(alice));
    assert!(matches!(&*total.event, ChatEvent::UnreadTotal { total: 0 }));
}

#[tokio::test]
#[serial]
async fn test_new_direct_room_announced_to_both_sides() {
    let chat = TestChat::new().await;
    let alice = chat.participant("Alice").await;
    let bob = chat.participant("Bob").await;
    let mallory = chat.participant("Mallory").await;
    let mut receiver = chat.broadcaster().subscribe();

    let room = chat
        .rooms()
        .create_or_reuse_direct_room(alice, bob)
        .await
        .unwrap();

    let joined = receiver.try_recv().unwrap();
    assert!(joined.is_for(alice));
    assert!(joined.is_for(bob));
    assert!(!joined.is_for(mallory));
    assert!(matches!(
        &*joined.event,
        ChatEvent::RoomJoined { room_id } if *room_id == room.id
    ));

    // reopening an active pair changes nothing, so nobody is told
    chat.rooms()
        .create_or_reuse_direct_room(bob, alice)
        .await
        .unwrap();
    assert!(receiver.try_recv().is_err());
}
