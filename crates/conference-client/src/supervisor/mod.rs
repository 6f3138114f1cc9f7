//! `ConnectionSupervisor` - owns the transport lifecycle and the session.
//!
//! The supervisor is an actor: one task owns the transport, the
//! [`SessionStateMachine`] and the [`ModeController`], and multiplexes with
//! `tokio::select!`:
//!
//! - shell commands from the [`ClientHandle`] mailbox
//! - transport, conference and device events from engine subscriptions
//! - capture completions posted back by spawned capture tasks
//! - cancellation
//!
//! # Lifecycle
//!
//! 1. Subscribe to transport events and request a connection. Publisher mode
//!    starts capturing immediately, without waiting for the connection.
//! 2. On `Established`, create the conference for the room, subscribe to its
//!    events and request the join.
//! 3. Dispatch conference events into the session state machine.
//! 4. On shutdown or cancellation, tear down synchronously: release local
//!    tracks, leave, disconnect. Teardown runs at most once.
//!
//! Establishment failures are reported to the shell and not retried.

pub mod messages;

pub use messages::{ClientCommand, ClientNotification, ClientSnapshot};

use crate::config::Config;
use crate::devices::{AudioOutputOption, AudioOutputSelector};
use crate::engine::events::Subscription;
use crate::engine::{
    ConferenceEvent, DeviceEvent, MediaDevices, TransportEvent, TransportSession,
};
use crate::errors::ClientError;
use crate::mode::{CaptureCompletion, CaptureJob, CaptureOutcome, ModeController};
use crate::model::Mode;
use crate::observability::metrics;
use crate::render::{RenderBackend, RenderSurfaceBinder};
use crate::session::{SessionEvent, SessionState, SessionStateMachine};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the command mailbox.
const COMMAND_CHANNEL_BUFFER: usize = 64;

/// Handle to the supervisor actor.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    sender: mpsc::Sender<ClientCommand>,
    cancel_token: CancellationToken,
}

impl ClientHandle {
    /// Invert the camera facing and recapture.
    pub async fn switch_camera(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(ClientCommand::SwitchCamera { respond_to: tx })
            .await?;
        Self::receive(rx).await?
    }

    /// Report the playback gesture. Returns the number of surfaces started.
    pub async fn start_playback(&self) -> Result<usize, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(ClientCommand::StartPlayback { respond_to: tx })
            .await?;
        Self::receive(rx).await?
    }

    /// Switch the audio output device.
    pub async fn select_audio_output(&self, device_id: String) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(ClientCommand::SelectAudioOutput {
            device_id,
            respond_to: tx,
        })
        .await?;
        Self::receive(rx).await?
    }

    /// Get a snapshot of the client state.
    pub async fn snapshot(&self) -> Result<ClientSnapshot, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(ClientCommand::GetState { respond_to: tx }).await?;
        Self::receive(rx).await
    }

    /// Tear down and stop the actor.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.send(ClientCommand::Shutdown { respond_to: tx }).await?;
        Self::receive(rx).await?
    }

    /// Cancel the actor. Teardown still runs.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    async fn send(&self, command: ClientCommand) -> Result<(), ClientError> {
        self.sender
            .send(command)
            .await
            .map_err(|e| ClientError::Internal(format!("channel send failed: {e}")))
    }

    async fn receive<T>(rx: oneshot::Receiver<T>) -> Result<T, ClientError> {
        rx.await
            .map_err(|e| ClientError::Internal(format!("response receive failed: {e}")))
    }
}

/// Engine and rendering collaborators handed to [`ConnectionSupervisor::spawn`].
pub struct ClientParts {
    pub transport: Box<dyn TransportSession>,
    pub devices: Arc<dyn MediaDevices>,
    pub renderer: Box<dyn RenderBackend>,
}

/// Returned by [`ConnectionSupervisor::spawn`].
pub struct SpawnedClient {
    pub handle: ClientHandle,
    pub notifications: mpsc::UnboundedReceiver<ClientNotification>,
    pub task: JoinHandle<()>,
}

pub struct ConnectionSupervisor {
    room_id: String,
    transport: Box<dyn TransportSession>,
    transport_events: Option<Subscription<TransportEvent>>,
    conference_events: Option<Subscription<ConferenceEvent>>,
    device_events: Option<Subscription<DeviceEvent>>,
    machine: SessionStateMachine,
    mode: ModeController,
    audio_output: AudioOutputSelector,
    receiver: mpsc::Receiver<ClientCommand>,
    notifications: mpsc::UnboundedSender<ClientNotification>,
    capture_tx: mpsc::UnboundedSender<CaptureCompletion>,
    capture_rx: mpsc::UnboundedReceiver<CaptureCompletion>,
    cancel_token: CancellationToken,
    reported_state: SessionState,
    torn_down: bool,
}

impl ConnectionSupervisor {
    /// Spawn the supervisor for `config`.
    pub fn spawn(config: &Config, parts: ClientParts, cancel_token: CancellationToken) -> SpawnedClient {
        let (sender, receiver) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (capture_tx, capture_rx) = mpsc::unbounded_channel();

        let binder = RenderSurfaceBinder::new(parts.renderer);
        let machine = SessionStateMachine::new(config.mode, binder);
        let mode = ModeController::new(
            config.mode,
            config.capture_facing,
            config.capture_settings(),
            Arc::clone(&parts.devices),
        );

        let actor = Self {
            room_id: config.room_id.clone(),
            transport: parts.transport,
            transport_events: None,
            conference_events: None,
            device_events: None,
            machine,
            mode,
            audio_output: AudioOutputSelector::new(parts.devices),
            receiver,
            notifications: notify_tx,
            capture_tx,
            capture_rx,
            cancel_token: cancel_token.clone(),
            reported_state: SessionState::Disconnected,
            torn_down: false,
        };

        let task = tokio::spawn(actor.run());

        SpawnedClient {
            handle: ClientHandle {
                sender,
                cancel_token,
            },
            notifications: notify_rx,
            task,
        }
    }

    /// Run the actor loop.
    #[instrument(
        skip_all,
        name = "client.supervisor",
        fields(mode = %self.machine.mode(), room_id = %self.room_id)
    )]
    async fn run(mut self) {
        info!(
            target: "client.supervisor",
            mode = %self.machine.mode(),
            room_id = %self.room_id,
            "Conference client started"
        );

        self.start().await;

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "client.supervisor",
                        "Supervisor received cancellation signal"
                    );
                    self.teardown();
                    break;
                }

                event = next_event(&mut self.transport_events) => {
                    match event {
                        Some(event) => self.handle_transport_event(event),
                        None => self.transport_events = None,
                    }
                }

                event = next_event(&mut self.conference_events) => {
                    match event {
                        Some(event) => {
                            self.machine.handle(event);
                            self.report_state();
                        }
                        None => self.conference_events = None,
                    }
                }

                event = next_event(&mut self.device_events) => {
                    match event {
                        Some(DeviceEvent::DeviceListChanged(devices)) => {
                            let options = self.audio_output.options_for(&devices);
                            self.offer_audio_outputs(options);
                        }
                        None => self.device_events = None,
                    }
                }

                Some(completion) = self.capture_rx.recv() => {
                    self.handle_capture_completed(completion);
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(command) => {
                            if self.handle_command(command) {
                                break;
                            }
                        }
                        None => {
                            debug!(
                                target: "client.supervisor",
                                "All client handles dropped"
                            );
                            self.teardown();
                            break;
                        }
                    }
                }
            }
        }

        info!(target: "client.supervisor", "Conference client stopped");
    }

    async fn start(&mut self) {
        self.transport_events = Some(self.transport.events());

        if self.machine.mode() == Mode::Publisher {
            match self.mode.begin_capture() {
                Ok(job) => self.spawn_capture(job),
                Err(e) => warn!(target: "client.supervisor", error = %e, "Initial capture not started"),
            }

            if self.audio_output.is_available() {
                self.device_events = Some(self.audio_output.events());
                match self.audio_output.refresh().await {
                    Ok(options) => self.offer_audio_outputs(options),
                    Err(e) => warn!(
                        target: "client.devices",
                        error = %e,
                        "Failed to enumerate devices"
                    ),
                }
            }
        }

        if let Err(e) = self.machine.apply(SessionEvent::ConnectRequested) {
            error!(target: "client.supervisor", error = %e, "Cannot start connecting");
            return;
        }
        self.report_state();

        if let Err(e) = self.transport.connect() {
            self.connection_failed(&e.to_string());
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Established => self.on_established(),
            TransportEvent::Failed { reason } => self.connection_failed(&reason),
            TransportEvent::Disconnected => {
                info!(target: "client.supervisor", "Transport disconnected");
                self.drop_subscriptions();
                self.machine.on_transport_closed();
                self.report_state();
            }
        }
    }

    fn on_established(&mut self) {
        if let Err(e) = self.machine.apply(SessionEvent::TransportEstablished) {
            warn!(target: "client.supervisor", error = %e, "Unexpected transport established event");
            return;
        }
        info!(target: "client.supervisor", "Transport established");
        self.report_state();

        let conference = match self.transport.init_conference(&self.room_id) {
            Ok(conference) => conference,
            Err(e) => {
                self.establishment_failed(&e.to_string());
                return;
            }
        };
        self.machine.set_conference(conference);
        self.conference_events = self.machine.conference_mut().map(|c| c.events());

        if let Err(e) = self.machine.request_join() {
            self.establishment_failed(&e.to_string());
            return;
        }
        info!(
            target: "client.supervisor",
            room_id = %self.room_id,
            "Joining conference"
        );
        self.report_state();
    }

    fn connection_failed(&mut self, reason: &str) {
        if self.machine.state() == SessionState::Connecting {
            // Connecting accepts ConnectFailed.
            let _ = self.machine.apply(SessionEvent::ConnectFailed);
        } else {
            self.machine.on_transport_closed();
        }
        if let Some(subscription) = self.conference_events.take() {
            subscription.unsubscribe();
        }
        self.report_state();
        self.establishment_failed(reason);
    }

    fn establishment_failed(&mut self, reason: &str) {
        error!(
            target: "client.supervisor",
            reason = %reason,
            "Failed to establish conference session"
        );
        self.notify(ClientNotification::EstablishmentFailed {
            reason: reason.to_string(),
        });
    }

    fn handle_capture_completed(&mut self, completion: CaptureCompletion) {
        match self.mode.on_capture_completed(completion, &mut self.machine) {
            CaptureOutcome::Failed(e) => self.notify(ClientNotification::CaptureFailed {
                reason: e.to_string(),
            }),
            CaptureOutcome::Registered(_) | CaptureOutcome::Stale { .. } => {}
        }
    }

    fn spawn_capture(&self, job: CaptureJob) {
        let tx = self.capture_tx.clone();
        let devices = job.devices();
        tokio::spawn(async move {
            let completion = job.run().await;
            let generation = completion.generation;
            // Receiver is closed once the supervisor tore down; nobody will
            // register these tracks.
            if let Err(mpsc::error::SendError(completion)) = tx.send(completion) {
                let released = completion.release(devices.as_ref());
                info!(
                    target: "client.supervisor",
                    generation,
                    released,
                    "Released capture that finished after teardown"
                );
            }
        });
    }

    /// Handle one command. Returns `true` when the actor should exit.
    fn handle_command(&mut self, command: ClientCommand) -> bool {
        match command {
            ClientCommand::SwitchCamera { respond_to } => {
                let result = self
                    .mode
                    .switch_camera(&mut self.machine)
                    .map(|job| self.spawn_capture(job));
                let _ = respond_to.send(result);
            }

            ClientCommand::StartPlayback { respond_to } => {
                let result = self.mode.start_playback(&mut self.machine);
                let _ = respond_to.send(result);
            }

            ClientCommand::SelectAudioOutput {
                device_id,
                respond_to,
            } => {
                let result = if self.machine.mode() == Mode::Publisher {
                    self.audio_output.select(&device_id)
                } else {
                    Err(ClientError::WrongMode("select_audio_output"))
                };
                let _ = respond_to.send(result);
            }

            ClientCommand::GetState { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }

            ClientCommand::Shutdown { respond_to } => {
                info!(target: "client.supervisor", "Shutdown requested");
                self.teardown();
                let _ = respond_to.send(Ok(()));
                return true;
            }
        }
        false
    }

    fn offer_audio_outputs(&self, options: Vec<AudioOutputOption>) {
        if options.is_empty() {
            return;
        }
        info!(
            target: "client.devices",
            count = options.len(),
            "Audio output selection available"
        );
        self.notify(ClientNotification::AudioOutputOptions { options });
    }

    /// Release local tracks, leave and disconnect. Never waits on the engine;
    /// every failure is logged and counted. Runs at most once.
    fn teardown(&mut self) {
        if self.torn_down {
            debug!(target: "client.supervisor", "Teardown already done");
            return;
        }
        self.torn_down = true;
        info!(target: "client.supervisor", "Tearing down conference client");

        self.mode.abandon_capture();
        self.capture_rx.close();
        while let Ok(completion) = self.capture_rx.try_recv() {
            self.mode.on_capture_completed(completion, &mut self.machine);
        }
        self.mode.release_local_tracks(&mut self.machine);
        self.machine.leave_conference();
        self.report_state();

        if let Err(e) = self.transport.disconnect() {
            warn!(
                target: "client.supervisor",
                error = %e,
                "Failed to disconnect transport"
            );
            metrics::record_cleanup_failure("disconnect");
        }

        self.drop_subscriptions();
        if let Some(subscription) = self.device_events.take() {
            subscription.unsubscribe();
        }
        self.machine.on_transport_closed();
        self.report_state();
    }

    fn drop_subscriptions(&mut self) {
        if let Some(subscription) = self.transport_events.take() {
            subscription.unsubscribe();
        }
        if let Some(subscription) = self.conference_events.take() {
            subscription.unsubscribe();
        }
    }

    fn snapshot(&self) -> ClientSnapshot {
        let local_tracks = self.machine.local_tracks();
        let published_tracks = local_tracks
            .iter()
            .filter(|id| self.machine.is_published(id))
            .count();
        ClientSnapshot {
            mode: self.machine.mode(),
            state: self.machine.state(),
            room_id: self.room_id.clone(),
            session_id: self.machine.session_id(),
            facing: self.mode.facing(),
            local_tracks,
            published_tracks,
            participants: self.machine.participants().iter().cloned().collect(),
            surfaces: self.machine.binder().len(),
            playback_unlocked: self.machine.binder().is_playback_unlocked(),
            capture_in_flight: self.mode.capture_in_flight(),
            pending_tracks: self.machine.pending_count(),
        }
    }

    fn report_state(&mut self) {
        let state = self.machine.state();
        if state != self.reported_state {
            self.reported_state = state;
            self.notify(ClientNotification::StateChanged { state });
        }
    }

    fn notify(&self, notification: ClientNotification) {
        if self.notifications.send(notification).is_err() {
            debug!(target: "client.supervisor", "Notification receiver dropped");
        }
    }
}

/// Next event of an optional subscription; pends forever when absent.
async fn next_event<E>(subscription: &mut Option<Subscription<E>>) -> Option<E> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
