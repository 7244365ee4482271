use crate::detection::{DetectionError, DetectionResult, DetectionService};
use crate::image::ImageHandle;
use crate::permission::{PermissionGate, PermissionState};
use crate::source::{Acquisition, AcquisitionError, CameraFacing, ImageSource, SourceKind};
use crate::state::{Notice, SessionState};
use crate::telemetry::{AcquisitionOutcome, Metrics};
use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, watch};

const NOTICE_CAPACITY: usize = 16;

/// User intents the presentation layer can forward to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Capture,
    SelectFromLibrary,
    Reset,
    RetryUpload,
    ToggleCameraFacing,
}

enum Event {
    PermissionResolved(PermissionState),
    Acquired {
        epoch: u64,
        source: SourceKind,
        outcome: Result<Acquisition, AcquisitionError>,
    },
    Detected {
        epoch: u64,
        handle: ImageHandle,
        outcome: Result<DetectionResult, DetectionError>,
        elapsed: Duration,
    },
}

/// Read-only view of the session plus the commands the screen may issue.
///
/// Clones share one session. Once every handle is dropped the controller
/// stops and anything still in flight is abandoned.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    facing: watch::Receiver<CameraFacing>,
    notices: broadcast::Sender<Notice>,
}

impl SessionHandle {
    pub fn request_capture(&self) {
        self.send(Command::Capture);
    }

    pub fn request_library_selection(&self) {
        self.send(Command::SelectFromLibrary);
    }

    pub fn reset(&self) {
        self.send(Command::Reset);
    }

    pub fn retry_upload(&self) {
        self.send(Command::RetryUpload);
    }

    pub fn toggle_camera_facing(&self) {
        self.send(Command::ToggleCameraFacing);
    }

    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Session closed, dropping {:?}", command);
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn camera_facing(&self) -> CameraFacing {
        *self.facing.borrow()
    }

    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }
}

/// Owns the session state and is its only writer.
///
/// Permission, acquisition and upload futures are polled inside [`run`],
/// on the same task that handles commands. Each one is stamped with the
/// epoch current when it started; an outcome from an older epoch is dropped.
///
/// [`run`]: SessionController::run
pub struct SessionController {
    gate: Arc<PermissionGate>,
    camera: Arc<dyn ImageSource>,
    library: Arc<dyn ImageSource>,
    detector: Arc<dyn DetectionService>,
    metrics: Arc<Metrics>,
    state: watch::Sender<SessionState>,
    facing: watch::Sender<CameraFacing>,
    notices: broadcast::Sender<Notice>,
    commands: mpsc::UnboundedReceiver<Command>,
    pending: FuturesUnordered<BoxFuture<'static, Event>>,
    epoch: u64,
}

impl SessionController {
    pub fn new(
        gate: PermissionGate,
        camera: Arc<dyn ImageSource>,
        library: Arc<dyn ImageSource>,
        detector: Arc<dyn DetectionService>,
        metrics: Arc<Metrics>,
        facing: CameraFacing,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::AwaitingPermission);
        let (facing_tx, facing_rx) = watch::channel(facing);
        let (notices_tx, _) = broadcast::channel(NOTICE_CAPACITY);

        let handle = SessionHandle {
            commands: commands_tx,
            state: state_rx,
            facing: facing_rx,
            notices: notices_tx.clone(),
        };

        let controller = Self {
            gate: Arc::new(gate),
            camera,
            library,
            detector,
            metrics,
            state: state_tx,
            facing: facing_tx,
            notices: notices_tx,
            commands: commands_rx,
            pending: FuturesUnordered::new(),
            epoch: 0,
        };

        (controller, handle)
    }

    pub async fn run(mut self) {
        let gate = self.gate.clone();
        self.pending.push(
            async move { Event::PermissionResolved(gate.request_camera_permission().await) }
                .boxed(),
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        tracing::info!("All session handles dropped, closing session");
                        break;
                    }
                },
                Some(event) = self.pending.next(), if !self.pending.is_empty() => {
                    self.handle_event(event);
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        let current = self.state.borrow().clone();
        match (command, current) {
            (Command::Capture, SessionState::Ready) => {
                self.start_acquisition(self.camera.clone());
            }
            (Command::SelectFromLibrary, SessionState::Ready) => {
                self.start_acquisition(self.library.clone());
            }
            (Command::ToggleCameraFacing, SessionState::Ready) => {
                self.facing.send_modify(|facing| *facing = facing.flipped());
                tracing::info!(facing = self.facing.borrow().as_str(), "Camera facing toggled");
            }
            (Command::RetryUpload, SessionState::UploadFailed(handle, _)) => {
                self.start_upload(handle);
            }
            (Command::Reset, SessionState::Ready) => {}
            // A reset while uploading does not cancel the request, its
            // outcome is simply never applied.
            (
                Command::Reset,
                SessionState::Uploading(_)
                | SessionState::ResultReady(..)
                | SessionState::UploadFailed(..),
            ) => {
                self.epoch += 1;
                self.transition(SessionState::Ready);
            }
            (command, state) => {
                tracing::debug!("Ignoring {:?} while {}", command, state.name());
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::PermissionResolved(permission) => {
                if *self.state.borrow() != SessionState::AwaitingPermission {
                    return;
                }
                match permission {
                    PermissionState::Granted => self.transition(SessionState::Ready),
                    PermissionState::Denied | PermissionState::Unknown => {
                        self.transition(SessionState::PermissionDenied)
                    }
                }
            }
            Event::Acquired {
                epoch,
                source,
                outcome,
            } => {
                if epoch != self.epoch {
                    tracing::debug!("Discarding stale {} acquisition", source);
                    return;
                }
                self.on_acquired(source, outcome);
            }
            Event::Detected {
                epoch,
                handle,
                outcome,
                elapsed,
            } => {
                self.metrics.record_detection(
                    outcome.as_ref().map(|_| ()).map_err(DetectionError::kind),
                    elapsed.as_millis() as u64,
                );
                if epoch != self.epoch {
                    tracing::debug!("Discarding superseded detection for {:?}", handle);
                    return;
                }
                match outcome {
                    Ok(result) => self.transition(SessionState::ResultReady(handle, result)),
                    Err(e) => {
                        tracing::warn!("Upload failed: {}", e);
                        self.transition(SessionState::UploadFailed(handle, e.kind()));
                    }
                }
            }
        }
    }

    fn on_acquired(&mut self, source: SourceKind, outcome: Result<Acquisition, AcquisitionError>) {
        match outcome {
            Ok(Acquisition::Captured(handle)) => {
                self.metrics
                    .record_acquisition(source, AcquisitionOutcome::Captured);
                self.start_upload(handle);
            }
            Ok(Acquisition::Cancelled) => {
                self.metrics
                    .record_acquisition(source, AcquisitionOutcome::Cancelled);
                tracing::info!("{} cancelled by user", source);
                self.transition(SessionState::Ready);
            }
            Err(e) => {
                self.metrics
                    .record_acquisition(source, AcquisitionOutcome::Failed);
                tracing::error!("{} failed: {}", source, e);
                self.transition(SessionState::Ready);
                // Nobody listening is fine, the notice is transient.
                let _ = self.notices.send(Notice::AcquisitionFailed {
                    source,
                    message: e.to_string(),
                });
            }
        }
    }

    fn start_acquisition(&mut self, source: Arc<dyn ImageSource>) {
        self.epoch += 1;
        let epoch = self.epoch;
        let kind = source.kind();
        let facing = *self.facing.borrow();

        self.transition(SessionState::Capturing(kind));
        self.pending.push(
            async move {
                let outcome = source.acquire(facing).await;
                Event::Acquired {
                    epoch,
                    source: kind,
                    outcome,
                }
            }
            .boxed(),
        );
    }

    fn start_upload(&mut self, handle: ImageHandle) {
        self.epoch += 1;
        let epoch = self.epoch;
        let detector = self.detector.clone();

        self.transition(SessionState::Uploading(handle.clone()));
        self.pending.push(
            async move {
                let started = Instant::now();
                let outcome = detector.detect(&handle).await;
                Event::Detected {
                    epoch,
                    handle,
                    outcome,
                    elapsed: started.elapsed(),
                }
            }
            .boxed(),
        );
    }

    fn transition(&mut self, next: SessionState) {
        let previous = self.state.send_replace(next);
        tracing::info!(
            from = previous.name(),
            to = self.state.borrow().name(),
            epoch = self.epoch,
            "Session transition"
        );
    }
}
