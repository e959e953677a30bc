/// VeilChat sync engine - demo entry point
///
/// Drives the engine against a scripted in-memory backend so the poll /
/// reconcile / notify flow can be watched from the log.
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::EnvFilter;
use veilchat_core::{EngineConfig, LogSink, MemoryBackend, MemorySettings, SyncEngine};

const ALICE: &str = "alice7m2kq9v3xw4yj5znp6rbt8cde2fgh3ijk4lmn5opq6rst7uvw";
const BOB: &str = "bobx5n8p2qr4st6uv8wx3yz5ab7cd9ef2gh4ij6kl8mn3opq5rstu";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .init();

    let backend = Arc::new(MemoryBackend::with_web_channel());
    backend.add_remote_contact(ALICE, "Alice");

    let settings = Arc::new(MemorySettings::new());
    let config = EngineConfig {
        poll_interval: Duration::from_millis(500),
        ..Default::default()
    };
    let engine = SyncEngine::new(config, backend.clone(), settings, Arc::new(LogSink));

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!("event: {:?}", event);
        }
    });

    engine.start().await;

    // Scripted traffic: a message from a known contact, then an unknown
    // sender appearing mid-run.
    sleep(Duration::from_millis(700)).await;
    backend.push_incoming(ALICE, "hey, are you around?");

    sleep(Duration::from_millis(700)).await;
    backend.add_remote_contact(BOB, BOB);
    backend.push_incoming(BOB, "hello from an unknown sender");
    backend.set_pending_inbound(2);

    sleep(Duration::from_millis(1500)).await;

    for contact in engine.contacts().await {
        info!(
            "{}: unread {}, preview {:?}",
            contact.label(),
            engine.unread_count(&contact.id).await,
            engine.preview(&contact.id).await,
        );
    }
    info!("pending inbound: {}", engine.pending_inbound().await);

    engine.stop().await;
    Ok(())
}
