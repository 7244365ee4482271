use crate::camera;
use crate::config::Config;
use crate::detection::HttpDetectionClient;
use crate::permission::PermissionGate;
use crate::picker::DialogPicker;
use crate::session::{SessionController, SessionHandle};
use crate::source::{LibrarySelection, LiveCapture};
use crate::state::{Notice, SessionState};
use crate::telemetry::Metrics;

use std::{error::Error, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    signal,
    sync::{
        broadcast::{self, error::RecvError},
        watch,
    },
};

const HELP: &str = "commands: capture | select | flip | retry | reset | metrics | quit";

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let metrics = Arc::new(Metrics::new()?);

    let detector = match HttpDetectionClient::new(&config.detection_service) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Failed to initialize detection client: {:?}", e);
            return Err(Box::new(e));
        }
    };

    match detector.check_available().await {
        Ok(()) => tracing::info!("Detection service reachable at {}", detector.endpoint()),
        Err(e) => tracing::warn!("Detection service not reachable yet: {}", e),
    }

    let camera = Arc::new(camera::webcam(config.camera.clone()));
    let (controller, session) = SessionController::new(
        PermissionGate::new(camera.clone()),
        Arc::new(LiveCapture::new(camera)),
        Arc::new(LibrarySelection::new(DialogPicker::new())),
        detector,
        metrics.clone(),
        config.camera.default_facing,
    );
    let controller_handle = tokio::spawn(controller.run());

    let (shutdown_tx, _) = broadcast::channel(1);
    let render_handle = tokio::spawn(render_session(
        session.subscribe(),
        session.notices(),
        shutdown_tx.subscribe(),
    ));

    println!("{}", HELP);
    tokio::select! {
        result = read_commands(session, metrics) => {
            if let Err(e) = result {
                tracing::error!("Failed to read commands: {:?}", e);
            }
        },
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received, closing session.");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = render_handle.await;
    let _ = controller_handle.await;

    Ok(())
}

async fn read_commands(session: SessionHandle, metrics: Arc<Metrics>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        if is_acquire(command) && session.state().is_busy() {
            println!("busy: {}", describe(&session.state()));
            continue;
        }

        match command {
            "capture" | "c" => session.request_capture(),
            "select" | "s" => session.request_library_selection(),
            "flip" | "f" => session.toggle_camera_facing(),
            "retry" | "r" => session.retry_upload(),
            "reset" => session.reset(),
            "metrics" => match metrics.render() {
                Ok(text) => println!("{}", text),
                Err(e) => tracing::error!("Failed to render metrics: {:?}", e),
            },
            "quit" | "q" => break,
            "" => {}
            other => println!("unknown command `{}`; {}", other, HELP),
        }
    }

    Ok(())
}

fn is_acquire(command: &str) -> bool {
    matches!(command, "capture" | "c" | "select" | "s")
}

async fn render_session(
    mut state: watch::Receiver<SessionState>,
    mut notices: broadcast::Receiver<Notice>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                println!("{}", describe(&current));
            },
            notice = notices.recv() => match notice {
                Ok(Notice::AcquisitionFailed { source, message }) => {
                    println!("! {} failed: {}", source, message);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Skipped {} notices", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = shutdown_rx.recv() => break,
        }
    }
}

fn describe(state: &SessionState) -> String {
    match state {
        SessionState::AwaitingPermission => "Checking camera permission...".to_string(),
        SessionState::PermissionDenied => {
            "No access to the camera. Allow access and restart to continue.".to_string()
        }
        SessionState::Ready => "Ready. capture, select or flip.".to_string(),
        SessionState::Capturing(source) => format!("Waiting for {}...", source),
        SessionState::Uploading(handle) => format!("Uploading {:?}...", handle),
        SessionState::ResultReady(handle, result) => {
            format!("Detections for {}:\n{}\n(reset to retake)", handle.filename(), result)
        }
        SessionState::UploadFailed(handle, kind) => format!(
            "Upload of {} failed: {}. retry or reset.",
            handle.filename(),
            kind
        ),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceKind;

    #[test]
    fn test_acquire_commands_wait_while_busy() {
        assert!(is_acquire("c") && is_acquire("select"));
        assert!(!is_acquire("reset") && !is_acquire("retry"));

        assert!(SessionState::Capturing(SourceKind::LibrarySelection).is_busy());
        assert!(!SessionState::Ready.is_busy());
        assert_eq!(
            describe(&SessionState::Capturing(SourceKind::LiveCapture)),
            "Waiting for live_capture..."
        );
    }
}
