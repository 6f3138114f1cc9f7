//! Conference Client
//!
//! Runs the client against the in-process loopback engine with a headless
//! renderer. Commands are read from stdin, one per line:
//!
//! - `play` - playback gesture (viewer)
//! - `flip` - switch camera (publisher)
//! - `output <device-id>` - select audio output (publisher)
//! - `peer <participant-id>` - simulate a remote participant with audio+video
//! - `bye <participant-id>` - simulate that participant leaving
//! - `status` - print the client state as JSON
//! - `quit` - tear down and exit
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Create the engine and renderer
//! 3. Spawn the `ConnectionSupervisor`
//! 4. Serve stdin commands until `quit`, EOF or ctrl-c
//! 5. Tear down

#![warn(clippy::pedantic)]

use conference_client::config::Config;
use conference_client::engine::loopback::LoopbackEngine;
use conference_client::model::{ParticipantId, TrackKind};
use conference_client::render::headless::HeadlessRenderer;
use conference_client::supervisor::{ClientHandle, ClientParts, ConnectionSupervisor};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "conference_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Conference Client");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        mode = %config.mode,
        room_id = %config.room_id,
        engine_domain = %config.engine_domain,
        capture_resolution = config.capture_resolution,
        capture_frame_rate = config.capture_frame_rate,
        capture_facing = config.capture_facing.as_str(),
        "Configuration loaded successfully"
    );

    let engine = LoopbackEngine::new(config.engine_options());
    let parts = ClientParts {
        transport: engine.transport(),
        devices: engine.devices(),
        renderer: Box::new(HeadlessRenderer::new()),
    };

    let cancel_token = CancellationToken::new();
    let client = ConnectionSupervisor::spawn(&config, parts, cancel_token.clone());
    let handle = client.handle;

    // Print notifications for the shell
    let mut notifications = client.notifications;
    let notification_task = tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            match serde_json::to_string(&notification) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "Failed to encode notification"),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for ctrl-c");
                }
                info!("Received ctrl-c, shutting down");
                break;
            }

            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !run_command(&handle, &engine, line.trim()).await {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Stdin closed, shutting down");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to read stdin");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = handle.shutdown().await {
        warn!(error = %e, "Shutdown command failed, cancelling");
        cancel_token.cancel();
    }
    if let Err(e) = client.task.await {
        error!(error = %e, "Supervisor task failed");
    }
    let _ = notification_task.await;

    info!("Conference Client stopped");
    Ok(())
}

/// Run one shell command. Returns `false` when the shell should exit.
async fn run_command(handle: &ClientHandle, engine: &LoopbackEngine, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or_default();
    let argument = parts.next();

    let result = match (command, argument) {
        ("", _) => Ok(()),
        ("quit", _) => return false,
        ("play", _) => handle.start_playback().await.map(|started| {
            info!(started, "Playback started");
        }),
        ("flip", _) => handle.switch_camera().await,
        ("output", Some(device_id)) => handle.select_audio_output(device_id.to_string()).await,
        ("peer", Some(participant_id)) => {
            engine.simulate_participant(
                &ParticipantId::new(participant_id),
                &[TrackKind::Audio, TrackKind::Video],
            );
            Ok(())
        }
        ("bye", Some(participant_id)) => {
            engine.simulate_participant_left(&ParticipantId::new(participant_id));
            Ok(())
        }
        ("status", _) => handle.snapshot().await.map(|snapshot| {
            match serde_json::to_string_pretty(&snapshot) {
                Ok(json) => println!("{json}"),
                Err(e) => warn!(error = %e, "Failed to encode snapshot"),
            }
        }),
        (other, _) => {
            warn!(command = %other, "Unknown command");
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!(command = %command, error = %e, "Command failed");
    }
    true
}
