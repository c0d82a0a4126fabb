//! Integration Test: Full Messaging Flow
//!
//! Tests the complete flow:
//! 1. Two users start sessions (profiles + presence)
//! 2. They open an individual room (idempotently)
//! 3. They exchange messages and watch typing signals
//! 4. Unread counts accumulate and reset on open
//! 5. Sessions end and presence goes offline

use chat_core::{ChatCore, CoreError, MessageKind, OutgoingMessage, User};
use futures::StreamExt;

#[tokio::test]
async fn test_full_messaging_flow() -> anyhow::Result<()> {
    let core = ChatCore::in_memory();

    // ========== STEP 1: Sessions ==========
    let alice = User::new("alice", "alice@test.com").with_display_name("Alice");
    let bob = User::new("bob", "bob@test.com");

    let mut alice_session = core.start_session(&alice).await?;
    let mut bob_session = core.start_session(&bob).await?;

    assert_eq!(core.presence().online_now("alice").await?, vec!["bob"]);

    // ========== STEP 2: Individual room, idempotent both ways ==========
    let room = core
        .rooms()
        .get_or_create_individual_room("alice", "bob")
        .await?;
    let same = core
        .rooms()
        .get_or_create_individual_room("bob", "alice")
        .await?;
    assert_eq!(room.id, same.id);
    assert_eq!(room.participants.len(), 2);

    // ========== STEP 3: Messages and typing ==========
    let mut log_stream = core.chat().watch_messages(&room.id).await?;
    let history = log_stream.next().await.unwrap()?;
    assert!(history.is_empty(), "fresh room replays an empty log");

    core.typing().set_typing(&room.id, "alice", "Alice").await?;
    let typists = core.typing().typists(&room.id, "bob").await?;
    assert_eq!(typists.len(), 1);
    assert_eq!(typists[0].user_name, "Alice");

    let sent = core
        .chat()
        .send(&room.id, "alice", OutgoingMessage::text("Hey Bob!"))
        .await?;
    core.typing().clear_typing(&room.id, "alice").await?;

    let live = log_stream.next().await.unwrap()?;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, sent.id);
    assert_eq!(live[0].sender_name, "Alice");

    // Bob's display label falls back to the email local part.
    let reply = core
        .chat()
        .send(&room.id, "bob", OutgoingMessage::text("Hi Alice!"))
        .await?;
    assert_eq!(reply.sender_name, "bob");

    // Room preview follows the latest append.
    let current = core.rooms().get_room(&room.id).await?;
    assert_eq!(
        current.last_message.as_ref().map(|m| m.id.as_str()),
        Some(reply.id.as_str())
    );

    // ========== STEP 4: Unread accumulates, reset on open ==========
    // Neither user has the room open yet, so both appends counted for the
    // other side.
    assert_eq!(core.unread().total("bob").await?, 1);
    assert_eq!(core.unread().total("alice").await?, 1);

    core.unread().open_room("bob", &room.id).await?;
    assert_eq!(core.unread().total("bob").await?, 0);

    // With the room open, further messages do not count for Bob.
    core.chat()
        .send(&room.id, "alice", OutgoingMessage::text("still there?"))
        .await?;
    assert_eq!(core.unread().total("bob").await?, 0);

    core.unread().close_room("bob");
    core.chat()
        .send(&room.id, "alice", OutgoingMessage::text("ping"))
        .await?;
    assert_eq!(core.unread().total("bob").await?, 1);

    // ========== STEP 5: Attachment upload ==========
    let url = core
        .upload_attachment(
            "alice",
            MessageKind::Image,
            "photo.jpg",
            bytes::Bytes::from_static(b"fake-jpeg"),
            "image/jpeg",
        )
        .await?;
    let media = core
        .chat()
        .send(
            &room.id,
            "alice",
            OutgoingMessage::attachment(MessageKind::Image, url.clone(), "photo.jpg", ""),
        )
        .await?;
    assert_eq!(media.file_url.as_deref(), Some(url.as_str()));

    // ========== STEP 6: Sessions end ==========
    alice_session.end().await?;
    bob_session.end().await?;
    assert!(core.presence().online_now("nobody").await?.is_empty());

    // Profiles survive presence transitions.
    assert_eq!(core.users().get("alice").await?.display_name, "Alice");

    Ok(())
}

#[tokio::test]
async fn test_room_list_subscription_is_live_and_restartable() -> anyhow::Result<()> {
    let core = ChatCore::in_memory();
    core.users()
        .upsert_profile(&User::new("alice", "alice@test.com"))
        .await?;
    core.users()
        .upsert_profile(&User::new("bob", "bob@test.com"))
        .await?;

    let mut rooms_stream = core.rooms().watch_rooms_for_user("alice").await?;
    assert!(rooms_stream.next().await.unwrap()?.is_empty());

    let dm = core
        .rooms()
        .get_or_create_individual_room("alice", "bob")
        .await?;
    let after_create = rooms_stream.next().await.unwrap()?;
    assert_eq!(after_create.len(), 1);
    assert_eq!(after_create[0].id, dm.id);

    // A fresh subscription replays current state before live updates.
    let mut restarted = core.rooms().watch_rooms_for_user("alice").await?;
    let replay = restarted.next().await.unwrap()?;
    assert_eq!(replay.len(), 1);

    // Dropping the first stream must not disturb the second.
    drop(rooms_stream);
    let group = core
        .rooms()
        .create_group_room("alice", "devs", "", &["bob".to_string()])
        .await?;
    let after_group = restarted.next().await.unwrap()?;
    assert_eq!(after_group.len(), 2);
    assert!(after_group.iter().any(|r| r.id == group.id));

    Ok(())
}

#[tokio::test]
async fn test_clock_skew_orders_log_by_timestamp() -> anyhow::Result<()> {
    use serde_json::json;

    let core = ChatCore::in_memory();
    core.users()
        .upsert_profile(&User::new("a", "a@test.com"))
        .await?;
    core.users()
        .upsert_profile(&User::new("b", "b@test.com"))
        .await?;
    let room = core.rooms().get_or_create_individual_room("a", "b").await?;

    // A's clock says 100, B's skewed clock says 99; B's write arrives last.
    for (sender, content, ts) in [("a", "hi", 100), ("b", "yo", 99)] {
        core.store()
            .push(
                &format!("chats/{}/messages", room.id),
                json!({
                    "senderId": sender,
                    "senderName": sender,
                    "content": content,
                    "type": "text",
                    "timestamp": ts,
                }),
            )
            .await?;
    }

    let log = core.chat().messages(&room.id).await?;
    let contents: Vec<&str> = log.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(
        contents,
        vec!["yo", "hi"],
        "log order reflects writer timestamps, skew and all"
    );
    // And the sequence is non-decreasing in timestamp.
    assert!(log.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

    Ok(())
}

#[tokio::test]
async fn test_send_requires_known_sender_and_room() -> anyhow::Result<()> {
    let core = ChatCore::in_memory();
    core.users()
        .upsert_profile(&User::new("alice", "alice@test.com"))
        .await?;
    core.users()
        .upsert_profile(&User::new("bob", "bob@test.com"))
        .await?;
    let room = core
        .rooms()
        .get_or_create_individual_room("alice", "bob")
        .await?;

    let unknown_sender = core
        .chat()
        .send(&room.id, "ghost", OutgoingMessage::text("boo"))
        .await;
    assert!(matches!(unknown_sender, Err(CoreError::NotFound(_))));

    let unknown_room = core
        .chat()
        .send("no-such-room", "alice", OutgoingMessage::text("hi"))
        .await;
    assert!(matches!(unknown_room, Err(CoreError::NotFound(_))));

    // Failed sends left the log untouched.
    assert!(core.chat().messages(&room.id).await?.is_empty());

    Ok(())
}
