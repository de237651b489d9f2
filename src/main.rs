//! study-planner - run one interactive planning session
//!
//! Usage: `study-planner [opening message]`. Without an argument the opening
//! message is read from stdin.

use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use study_planner::agents::{ConsoleHuman, Participant};
use study_planner::calendar::GoogleCalendarClient;
use study_planner::config::AppConfig;
use study_planner::db::Database;
use study_planner::llm;
use study_planner::runtime::{
    BroadcastSink, SessionEvent, SessionManager, StandardParticipantFactory,
};
use study_planner::state_machine::{Message, NotificationKind, ParticipantId};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "study_planner=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = AppConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Arc::new(Database::open(&config.db_path)?);

    let Some(llm) = llm::from_config(&config.llm)? else {
        tracing::error!("No LLM credentials configured. Set ANTHROPIC_API_KEY or LLM_GATEWAY.");
        return Err("no LLM credentials configured".into());
    };
    tracing::info!(model = %llm.model_id(), "LLM service initialized");

    let token = config
        .calendar_token
        .clone()
        .ok_or("GOOGLE_CALENDAR_TOKEN is not set")?;
    let calendar = Arc::new(GoogleCalendarClient::new(token)?);

    let human = Arc::new(ConsoleHuman::stdin(
        config.session.termination_sentinel.clone(),
    ));

    let opening = match std::env::args().skip(1).collect::<Vec<_>>().join(" ") {
        args if !args.trim().is_empty() => args,
        _ => human.reply(&[]).await?.content,
    };

    let factory = StandardParticipantFactory::new(
        llm,
        human,
        db.clone(),
        calendar,
        config.tools.clone(),
    );
    let sink = Arc::new(BroadcastSink::new(64));
    let printer = tokio::spawn(print_messages(sink.subscribe()));

    let manager =
        SessionManager::new(Arc::new(factory), sink.clone()).with_snapshot_store(db.clone());
    let session_id = uuid::Uuid::new_v4().to_string();
    let handle = manager.create(&session_id, config.session.clone()).await;

    // Ctrl-C stops the session at the next turn boundary
    let outcome = {
        let run = handle.run(opening);
        tokio::pin!(run);
        loop {
            tokio::select! {
                outcome = &mut run => break outcome?,
                _ = tokio::signal::ctrl_c() => handle.cancel(),
            }
        }
    };

    if let Err(e) = manager.persist_snapshot(&session_id).await {
        tracing::warn!(session_id = %session_id, error = %e, "Failed to persist snapshot");
    }

    // Close the channel so the printer drains and exits
    drop(handle);
    drop(manager);
    drop(sink);
    printer.await?;

    eprintln!(
        "\nSession {} ended: {:?} after {} turns, {} messages",
        outcome.session_id,
        outcome.reason,
        outcome.turns,
        outcome.total_messages()
    );
    if let Some(error) = &outcome.error {
        eprintln!("Error: {error}");
    }

    Ok(())
}

/// Print every non-human message as it is appended
async fn print_messages(rx: broadcast::Receiver<SessionEvent>) {
    let mut events = BroadcastStream::new(rx);
    while let Some(event) = events.next().await {
        match event {
            Ok(event) if event.kind == NotificationKind::Stream => {
                match serde_json::from_value::<Message>(event.payload) {
                    Ok(message) if message.speaker != ParticipantId::Human => {
                        println!("{}: {}", message.speaker, message.content);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Undecodable message event"),
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Notification stream lagged"),
        }
    }
}
