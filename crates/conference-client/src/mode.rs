//! `ModeController` - the publisher/viewer behavioural split.
//!
//! Publisher mode captures local audio+video and hands the result to the
//! session state machine, which publishes it now or on join. Capture is
//! asynchronous: [`ModeController::begin_capture`] returns a [`CaptureJob`]
//! the caller runs off the event loop, and the result comes back through
//! [`ModeController::on_capture_completed`]. At most one capture is in
//! flight; each job carries a generation and results for any other
//! generation are released without being registered.
//!
//! Viewer mode renders remote tracks as they arrive and starts playback on
//! the first user gesture.

use crate::engine::{CaptureConstraints, CapturedTrack, MediaDevices};
use crate::errors::{ClientError, EngineError};
use crate::model::{Facing, Mode, TrackId, TrackKind};
use crate::observability::metrics;
use crate::session::SessionStateMachine;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Capture quality constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Capture height in pixels.
    pub resolution: u32,
    pub frame_rate: u32,
}

/// A capture request ready to run.
pub struct CaptureJob {
    generation: u64,
    constraints: CaptureConstraints,
    devices: Arc<dyn MediaDevices>,
}

impl CaptureJob {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn constraints(&self) -> &CaptureConstraints {
        &self.constraints
    }

    /// Device backend the job captures from.
    #[must_use]
    pub fn devices(&self) -> Arc<dyn MediaDevices> {
        Arc::clone(&self.devices)
    }

    /// Ask the device backend for tracks. May wait on a permission prompt.
    pub async fn run(self) -> CaptureCompletion {
        let result = self.devices.create_local_tracks(self.constraints).await;
        CaptureCompletion {
            generation: self.generation,
            result,
        }
    }
}

impl fmt::Debug for CaptureJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureJob")
            .field("generation", &self.generation)
            .field("constraints", &self.constraints)
            .finish_non_exhaustive()
    }
}

/// Result of a [`CaptureJob`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCompletion {
    pub generation: u64,
    pub result: Result<Vec<CapturedTrack>, EngineError>,
}

impl CaptureCompletion {
    /// Dispose every captured track without registering it. Returns the
    /// number of tracks released.
    pub fn release(self, devices: &dyn MediaDevices) -> usize {
        match self.result {
            Ok(tracks) => {
                for track in &tracks {
                    dispose_track(devices, &track.track_id);
                }
                tracks.len()
            }
            Err(_) => 0,
        }
    }
}

/// What [`ModeController::on_capture_completed`] did with a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Tracks registered as local, in capture order.
    Registered(Vec<TrackId>),
    /// Result belonged to an abandoned request; its tracks were released.
    Stale { released: usize },
    /// The backend refused the capture.
    Failed(EngineError),
}

pub struct ModeController {
    mode: Mode,
    facing: Facing,
    settings: CaptureSettings,
    devices: Arc<dyn MediaDevices>,
    generation: u64,
    in_flight: Option<u64>,
}

impl ModeController {
    #[must_use]
    pub fn new(
        mode: Mode,
        facing: Facing,
        settings: CaptureSettings,
        devices: Arc<dyn MediaDevices>,
    ) -> Self {
        Self {
            mode,
            facing,
            settings,
            devices,
            generation: 0,
            in_flight: None,
        }
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn facing(&self) -> Facing {
        self.facing
    }

    #[must_use]
    pub fn capture_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Start a capture with the current facing.
    ///
    /// # Errors
    ///
    /// - `WrongMode` outside publisher mode
    /// - `CaptureInFlight` while a previous capture has not completed
    pub fn begin_capture(&mut self) -> Result<CaptureJob, ClientError> {
        self.ensure_can_capture("capture")?;

        self.generation += 1;
        self.in_flight = Some(self.generation);

        let constraints = CaptureConstraints {
            devices: vec![TrackKind::Audio, TrackKind::Video],
            resolution: self.settings.resolution,
            frame_rate: self.settings.frame_rate,
            facing: self.facing,
        };
        info!(
            target: "client.mode",
            generation = self.generation,
            facing = self.facing.as_str(),
            resolution = constraints.resolution,
            frame_rate = constraints.frame_rate,
            "Requesting local tracks"
        );

        Ok(CaptureJob {
            generation: self.generation,
            constraints,
            devices: Arc::clone(&self.devices),
        })
    }

    /// Tear down the current local tracks, invert the facing and start a new
    /// capture. The old tracks are gone before the new request is issued, so
    /// two local video tracks never coexist.
    ///
    /// # Errors
    ///
    /// - `WrongMode` outside publisher mode
    /// - `CaptureInFlight` while a previous capture has not completed; the
    ///   current tracks are left untouched
    pub fn switch_camera(
        &mut self,
        machine: &mut SessionStateMachine,
    ) -> Result<CaptureJob, ClientError> {
        self.ensure_can_capture("switch_camera")?;

        self.release_local_tracks(machine);
        self.facing = self.facing.inverted();
        info!(
            target: "client.mode",
            facing = self.facing.as_str(),
            "Switching camera"
        );
        self.begin_capture()
    }

    /// Apply a capture result.
    pub fn on_capture_completed(
        &mut self,
        completion: CaptureCompletion,
        machine: &mut SessionStateMachine,
    ) -> CaptureOutcome {
        if self.in_flight != Some(completion.generation) {
            let generation = completion.generation;
            let released = completion.release(self.devices.as_ref());
            warn!(
                target: "client.mode",
                generation,
                released,
                "Discarding stale capture result"
            );
            metrics::record_capture("stale");
            return CaptureOutcome::Stale { released };
        }
        self.in_flight = None;

        let tracks = match completion.result {
            Ok(tracks) => tracks,
            Err(e) => {
                error!(
                    target: "client.mode",
                    generation = completion.generation,
                    error = %e,
                    "Failed to create local tracks"
                );
                metrics::record_capture("error");
                return CaptureOutcome::Failed(e);
            }
        };

        let mut registered = Vec::with_capacity(tracks.len());
        for captured in tracks {
            if !captured.is_local {
                debug!(
                    target: "client.mode",
                    track_id = %captured.track_id,
                    "Skipping non-local track from capture"
                );
                continue;
            }
            let Some(kind) = TrackKind::parse(&captured.kind) else {
                warn!(
                    target: "client.mode",
                    track_id = %captured.track_id,
                    kind = %captured.kind,
                    "Unexpected local track type"
                );
                self.dispose(&captured.track_id);
                continue;
            };
            match machine.add_local_track(captured.track_id.clone(), kind) {
                Ok(()) => registered.push(captured.track_id),
                Err(e) => {
                    warn!(
                        target: "client.mode",
                        track_id = %captured.track_id,
                        error = %e,
                        "Failed to register local track"
                    );
                    self.dispose(&captured.track_id);
                }
            }
        }

        metrics::record_capture("success");
        info!(
            target: "client.mode",
            generation = completion.generation,
            tracks = registered.len(),
            "Local tracks created"
        );
        CaptureOutcome::Registered(registered)
    }

    /// Forget the pending capture; its result will be released on arrival.
    pub fn abandon_capture(&mut self) {
        if let Some(generation) = self.in_flight.take() {
            debug!(
                target: "client.mode",
                generation,
                "Abandoned pending capture"
            );
        }
    }

    /// Tear down all local tracks and release their media.
    pub fn release_local_tracks(&self, machine: &mut SessionStateMachine) {
        for track_id in machine.teardown_local_tracks() {
            self.dispose(&track_id);
        }
    }

    /// Start playback of every remote surface (viewer gesture). Surfaces
    /// attached later start on their own.
    ///
    /// # Errors
    ///
    /// `WrongMode` outside viewer mode.
    pub fn start_playback(&self, machine: &mut SessionStateMachine) -> Result<usize, ClientError> {
        if self.mode != Mode::Viewer {
            return Err(ClientError::WrongMode("start_playback"));
        }
        Ok(machine.binder_mut().unlock_playback())
    }

    fn ensure_can_capture(&self, operation: &'static str) -> Result<(), ClientError> {
        if self.mode != Mode::Publisher {
            return Err(ClientError::WrongMode(operation));
        }
        if self.in_flight.is_some() {
            return Err(ClientError::CaptureInFlight);
        }
        Ok(())
    }

    fn dispose(&self, track_id: &TrackId) {
        dispose_track(self.devices.as_ref(), track_id);
    }
}

fn dispose_track(devices: &dyn MediaDevices, track_id: &TrackId) {
    if let Err(e) = devices.dispose_track(track_id) {
        warn!(
            target: "client.mode",
            track_id = %track_id,
            error = %e,
            "Failed to dispose track"
        );
        metrics::record_cleanup_failure("dispose");
    }
}
