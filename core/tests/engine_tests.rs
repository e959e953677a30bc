/// Engine integration tests
/// Reconciliation, privacy, selection and notification behavior against the
/// in-memory backend
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use veilchat_core::{
    ChatEvent, EngineConfig, EngineError, MemoryBackend, MemorySettings, MessageKind,
    NotificationSink, SledSettings, SyncEngine, WEB_CHANNEL_ID,
};

/// Sink that records every emitted notification
#[derive(Default)]
struct RecordingSink {
    notifications: Mutex<Vec<(String, String, bool)>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }

    fn last(&self) -> Option<(String, String, bool)> {
        self.notifications.lock().unwrap().last().cloned()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, title: &str, body: &str, silent: bool) {
        self.notifications
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string(), silent));
    }
}

fn new_engine(backend: Arc<MemoryBackend>) -> (SyncEngine, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let engine = SyncEngine::new(
        EngineConfig::default(),
        backend,
        Arc::new(MemorySettings::new()),
        sink.clone(),
    );
    (engine, sink)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[tokio::test]
async fn priming_does_not_count_existing_history() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");
    backend.push_incoming_at("alice", "old one", now() - 100);
    backend.push_incoming_at("alice", "old two", now() - 90);

    let (engine, sink) = new_engine(backend);
    engine.reconcile_now().await.unwrap();

    assert_eq!(engine.unread_count("alice").await, 0);
    assert_eq!(engine.preview("alice").await.as_deref(), Some("old two"));
    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn idempotent_cycles_change_nothing() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");
    backend.push_incoming_at("alice", "first", now() - 50);

    let (engine, sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();
    backend.push_incoming("alice", "second");
    engine.reconcile_now().await.unwrap();

    let unread = engine.unread_count("alice").await;
    let preview = engine.preview("alice").await;
    let notified = sink.count();

    // unchanged backend data: the second run is a no-op
    engine.reconcile_now().await.unwrap();
    assert_eq!(engine.unread_count("alice").await, unread);
    assert_eq!(engine.preview("alice").await, preview);
    assert_eq!(sink.count(), notified);
}

#[tokio::test]
async fn unread_grows_by_observed_delta() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");
    backend.push_incoming_at("alice", "one", now() - 100);
    backend.push_incoming_at("alice", "two", now() - 90);

    let (engine, sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();
    assert_eq!(engine.unread_count("alice").await, 0);

    // last known count is 2; a poll returning 3 adds exactly 1
    backend.push_incoming("alice", "three");
    engine.reconcile_now().await.unwrap();
    assert_eq!(engine.unread_count("alice").await, 1);
    assert_eq!(engine.preview("alice").await.as_deref(), Some("three"));
    assert_eq!(sink.count(), 1);
    let (title, body, _) = sink.last().unwrap();
    assert_eq!(title, "Alice");
    assert_eq!(body, "three");
}

#[tokio::test]
async fn block_cutover_hides_later_messages_only() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("bob", "Bob");

    let (engine, _sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();

    engine.block_contact("bob").await.unwrap();
    let cutoff = now();
    backend.push_incoming_at("bob", "before the cutover", cutoff - 100);
    backend.push_incoming_at("bob", "after the cutover", cutoff + 100);

    engine.reconcile_now().await.unwrap();

    // only the earlier message is visible and counted
    assert_eq!(engine.unread_count("bob").await, 1);
    assert_eq!(
        engine.preview("bob").await.as_deref(),
        Some("before the cutover")
    );

    engine.select("bob").await.unwrap();
    let conversation = engine.conversation().await;
    assert_eq!(conversation.len(), 1);
    assert_eq!(conversation[0].text, "before the cutover");
}

#[tokio::test]
async fn unblock_restores_hidden_messages_for_selected_contact() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("bob", "Bob");
    backend.push_incoming_at("bob", "visible", now() - 200);

    let (engine, _sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();
    engine.block_contact("bob").await.unwrap();
    backend.push_incoming_at("bob", "hidden while blocked", now() + 100);
    engine.reconcile_now().await.unwrap();

    engine.select("bob").await.unwrap();
    assert_eq!(engine.conversation().await.len(), 1);

    let was_blocked = engine.unblock_contact("bob").await.unwrap();
    assert!(was_blocked);
    assert_eq!(engine.conversation().await.len(), 2);
    assert!(!engine.is_blocked("bob").await);
}

#[tokio::test]
async fn selection_clears_own_debt_and_leaves_others() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");
    backend.add_remote_contact("bob", "Bob");

    let (engine, _sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();
    backend.push_incoming("alice", "to alice");
    backend.push_incoming("bob", "to bob 1");
    backend.push_incoming("bob", "to bob 2");
    engine.reconcile_now().await.unwrap();

    assert_eq!(engine.unread_count("alice").await, 1);
    assert_eq!(engine.unread_count("bob").await, 2);

    engine.select("alice").await.unwrap();
    assert_eq!(engine.unread_count("alice").await, 0);
    assert_eq!(engine.unread_count("bob").await, 2);
    assert_eq!(engine.active_contact().await.as_deref(), Some("alice"));
}

#[tokio::test]
async fn mute_suppresses_notification_but_not_counting() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");

    let (engine, sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();
    engine.mute_contact("alice").await.unwrap();

    backend.push_incoming("alice", "quiet arrival");
    engine.reconcile_now().await.unwrap();

    assert_eq!(engine.unread_count("alice").await, 1);
    assert_eq!(engine.preview("alice").await.as_deref(), Some("quiet arrival"));
    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn new_contact_bumps_unread_once_and_notifies() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");

    let (engine, sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();

    // an unknown sender appears mid-run with one message
    backend.add_remote_contact("carol", "carol");
    backend.push_incoming("carol", "hi, we have not met");
    engine.reconcile_now().await.unwrap();

    assert!(engine.contact("carol").await.is_some());
    assert_eq!(engine.unread_count("carol").await, 1);
    assert_eq!(sink.count(), 1);
    let (title, body, _) = sink.last().unwrap();
    assert_eq!(title, "New message");
    assert_eq!(body, "hi, we have not met");

    // a second pass over unchanged data adds nothing
    engine.reconcile_now().await.unwrap();
    assert_eq!(engine.unread_count("carol").await, 1);
    assert_eq!(sink.count(), 1);
}

#[tokio::test]
async fn equal_count_swap_is_detected() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");
    backend.add_remote_contact("bob", "Bob");

    let (engine, _sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();

    // one contact replaces another at the same total count
    backend.remove_remote_contact("bob");
    backend.add_remote_contact("dave", "Dave");
    engine.reconcile_now().await.unwrap();

    assert!(engine.contact("bob").await.is_none());
    assert!(engine.contact("dave").await.is_some());
    assert_eq!(engine.unread_count("dave").await, 1);
}

#[tokio::test]
async fn one_failing_contact_does_not_abort_the_cycle() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");
    backend.add_remote_contact("bob", "Bob");

    let (engine, _sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();

    backend.push_incoming("alice", "for alice");
    backend.push_incoming("bob", "for bob");
    backend.fail_contact("alice");
    engine.reconcile_now().await.unwrap();

    assert_eq!(engine.unread_count("alice").await, 0);
    assert_eq!(engine.unread_count("bob").await, 1);

    // the next tick is the retry mechanism
    backend.heal_contact("alice");
    engine.reconcile_now().await.unwrap();
    assert_eq!(engine.unread_count("alice").await, 1);
}

#[tokio::test]
async fn positive_signal_precedes_contact_refresh() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");

    let (engine, _sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();

    let calls_before = backend.list_contacts_calls();
    backend.bump_signal(3);
    engine.reconcile_now().await.unwrap();
    assert!(backend.list_contacts_calls() > calls_before);
}

#[tokio::test]
async fn notifications_disabled_still_counts() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");

    let (engine, sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();
    engine.set_notifications_enabled(false).await.unwrap();

    backend.push_incoming("alice", "silent world");
    engine.reconcile_now().await.unwrap();

    assert_eq!(engine.unread_count("alice").await, 1);
    assert_eq!(sink.count(), 0);
}

#[tokio::test]
async fn focused_selected_conversation_suppresses_notification() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");

    let (engine, sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();
    engine.select("alice").await.unwrap();
    engine.set_window_focused(true).await;

    backend.push_incoming("alice", "while you watch");
    engine.reconcile_now().await.unwrap();
    assert_eq!(sink.count(), 0);

    // same conversation, window in the background: notify
    engine.set_window_focused(false).await;
    backend.push_incoming("alice", "while you are away");
    engine.reconcile_now().await.unwrap();
    assert_eq!(sink.count(), 1);
}

#[tokio::test]
async fn sound_setting_drives_silent_flag() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");

    let (engine, sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();
    engine.set_sound_enabled(false).await.unwrap();

    backend.push_incoming("alice", "hushed");
    engine.reconcile_now().await.unwrap();

    let (_, _, silent) = sink.last().unwrap();
    assert!(silent);
}

#[tokio::test]
async fn media_messages_preview_as_placeholders() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");

    let (engine, sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();

    backend.push_incoming_kind("alice", MessageKind::Audio, now());
    engine.reconcile_now().await.unwrap();

    assert_eq!(engine.preview("alice").await.as_deref(), Some("Audio Message"));
    let (_, body, _) = sink.last().unwrap();
    assert_eq!(body, "Audio Message");
}

#[tokio::test]
async fn web_channel_is_not_a_send_target() {
    let backend = Arc::new(MemoryBackend::with_web_channel());
    let (engine, _sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();

    let err = engine.send_message(WEB_CHANNEL_ID, "hello").await.unwrap_err();
    assert!(matches!(err, EngineError::InboundOnly));
    let err = engine.delete_chat(WEB_CHANNEL_ID).await.unwrap_err();
    assert!(matches!(err, EngineError::InboundOnly));
}

#[tokio::test]
async fn selecting_web_channel_resets_pending_indicator() {
    let backend = Arc::new(MemoryBackend::with_web_channel());
    backend.set_pending_inbound(4);

    let (engine, _sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();
    assert_eq!(engine.pending_inbound().await, 4);

    engine.select(WEB_CHANNEL_ID).await.unwrap();
    assert_eq!(engine.pending_inbound().await, 0);
}

#[tokio::test]
async fn clear_chat_drops_derived_state() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");

    let (engine, _sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();
    backend.push_incoming("alice", "one");
    backend.push_incoming("alice", "two");
    engine.reconcile_now().await.unwrap();
    assert_eq!(engine.unread_count("alice").await, 2);

    let removed = engine.clear_chat("alice").await.unwrap();
    assert_eq!(removed, 2);
    assert_eq!(engine.unread_count("alice").await, 0);
    assert_eq!(engine.preview("alice").await, None);

    // nothing resurrects on the next pass
    engine.reconcile_now().await.unwrap();
    assert_eq!(engine.unread_count("alice").await, 0);
}

#[tokio::test]
async fn delete_chat_removes_contact_and_selection() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");

    let (engine, _sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();
    engine.select("alice").await.unwrap();

    engine.delete_chat("alice").await.unwrap();
    assert!(engine.contact("alice").await.is_none());
    assert_eq!(engine.active_contact().await, None);
    assert!(engine.conversation().await.is_empty());

    engine.reconcile_now().await.unwrap();
    assert!(engine.contact("alice").await.is_none());
}

#[tokio::test]
async fn selection_resets_auxiliary_views() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");

    let (engine, _sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();

    engine.open_profile().await;
    assert!(engine.selection().await.profile_open());

    // the two auxiliary views are mutually exclusive
    engine.open_contact_details().await;
    let selection = engine.selection().await;
    assert!(selection.details_open());
    assert!(!selection.profile_open());

    engine.select("alice").await.unwrap();
    let selection = engine.selection().await;
    assert!(!selection.profile_open());
    assert!(!selection.details_open());

    engine.clear_selection().await;
    assert_eq!(engine.active_contact().await, None);
}

#[tokio::test]
async fn conversation_refresh_skips_when_unchanged() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");
    backend.push_incoming_at("alice", "hello", now() - 10);

    let (engine, _sink) = new_engine(backend.clone());
    engine.reconcile_now().await.unwrap();
    engine.select("alice").await.unwrap();

    let mut events = engine.subscribe();
    while events.try_recv().is_ok() {}

    // unchanged newest id and length: no refresh event
    engine.reconcile_now().await.unwrap();
    let mut refreshes = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ChatEvent::ConversationRefreshed { .. }) {
            refreshes += 1;
        }
    }
    assert_eq!(refreshes, 0);

    // a new message swaps the displayed list in silently
    backend.push_incoming("alice", "again");
    engine.reconcile_now().await.unwrap();
    let mut refreshes = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ChatEvent::ConversationRefreshed { .. }) {
            refreshes += 1;
        }
    }
    assert_eq!(refreshes, 1);
    assert_eq!(engine.conversation().await.len(), 2);
}

#[tokio::test]
async fn privacy_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");
    backend.add_remote_contact("bob", "Bob");

    {
        let settings = Arc::new(SledSettings::new(dir.path()).unwrap());
        let engine = SyncEngine::new(
            EngineConfig::default(),
            backend.clone(),
            settings,
            Arc::new(RecordingSink::default()),
        );
        engine.block_contact("alice").await.unwrap();
        engine.mute_contact("bob").await.unwrap();
        engine.set_notifications_enabled(false).await.unwrap();
    }

    let settings = Arc::new(SledSettings::new(dir.path()).unwrap());
    let engine = SyncEngine::new(
        EngineConfig::default(),
        backend,
        settings,
        Arc::new(RecordingSink::default()),
    );
    assert!(engine.is_blocked("alice").await);
    assert!(engine.is_muted("bob").await);
    assert!(!engine.notifications_enabled().await);
}

#[tokio::test]
async fn raw_display_names_are_sanitized() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Al\u{0007}i&ce\u{1F4A5}");

    let (engine, _sink) = new_engine(backend);
    engine.reconcile_now().await.unwrap();

    let contact = engine.contact("alice").await.unwrap();
    assert_eq!(contact.display_name, "Alice");
}

#[tokio::test]
async fn stopping_mid_run_leaves_state_resumable() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");

    let sink = Arc::new(RecordingSink::default());
    let engine = SyncEngine::new(
        EngineConfig {
            poll_interval: Duration::from_millis(50),
            ..Default::default()
        },
        backend.clone(),
        Arc::new(MemorySettings::new()),
        sink,
    );

    engine.start().await;
    sleep(Duration::from_millis(120)).await;
    engine.stop().await;

    // no further ticks observe this message
    backend.push_incoming("alice", "arrived while stopped");
    sleep(Duration::from_millis(150)).await;
    assert_eq!(engine.unread_count("alice").await, 0);

    // a fresh start resumes from existing state
    engine.start().await;
    sleep(Duration::from_millis(120)).await;
    engine.stop().await;
    assert_eq!(engine.unread_count("alice").await, 1);
}

#[tokio::test]
async fn contact_details_derive_from_history() {
    let backend = Arc::new(MemoryBackend::new());
    backend.add_remote_contact("alice", "Alice");
    backend.push_incoming_at("alice", "first", 1000);
    backend.push_incoming_at("alice", "latest", 2000);

    let (engine, _sink) = new_engine(backend);
    engine.reconcile_now().await.unwrap();

    let details = engine.contact_details("alice").await.unwrap();
    assert_eq!(details.total_messages, 2);
    assert_eq!(details.first_message_at, Some(1000));
    assert_eq!(details.last_message_at, Some(2000));
}
