#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use snap_detect::{
    telemetry::Metrics, AcquisitionError, CameraDevice, CameraFacing, CameraPermission,
    DetectionError, DetectionResult, DetectionService, GalleryPicker, ImageHandle,
    LibrarySelection, LiveCapture, Notice, PermissionError, PermissionGate, SessionController,
    SessionHandle, SessionState,
};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(2);

type Shot = Result<Option<ImageHandle>, AcquisitionError>;
type Reply = Result<DetectionResult, DetectionError>;

pub fn image(tag: u8) -> ImageHandle {
    ImageHandle::jpeg(vec![0xFF, 0xD8, tag, tag, 0xFF, 0xD9], format!("img-{}.jpg", tag))
}

pub struct ScriptedPermission(pub Result<(), PermissionError>);

#[async_trait]
impl CameraPermission for ScriptedPermission {
    async fn request_access(&self) -> Result<(), PermissionError> {
        self.0.clone()
    }
}

/// Camera that plays back queued shots. An empty queue means the user
/// backed out of the viewfinder.
pub struct FakeCamera {
    pub previewing: bool,
    shots: Mutex<VecDeque<Shot>>,
    facings: Mutex<Vec<CameraFacing>>,
}

impl FakeCamera {
    pub fn new() -> Self {
        Self {
            previewing: true,
            shots: Mutex::new(VecDeque::new()),
            facings: Mutex::new(Vec::new()),
        }
    }

    pub fn not_previewing() -> Self {
        Self {
            previewing: false,
            ..Self::new()
        }
    }

    pub fn push(&self, shot: Shot) {
        self.shots.lock().push_back(shot);
    }

    pub fn calls(&self) -> usize {
        self.facings.lock().len()
    }

    pub fn facings(&self) -> Vec<CameraFacing> {
        self.facings.lock().clone()
    }
}

#[async_trait]
impl CameraDevice for FakeCamera {
    fn is_previewing(&self) -> bool {
        self.previewing
    }

    async fn take_picture(&self, facing: CameraFacing) -> Shot {
        self.facings.lock().push(facing);
        self.shots.lock().pop_front().unwrap_or(Ok(None))
    }
}

/// Gallery that plays back queued picks. `hold` leaves the picker open until
/// the test answers through the returned sender.
pub struct FakeGallery {
    picks: Mutex<VecDeque<Shot>>,
    held: Mutex<VecDeque<oneshot::Receiver<Shot>>>,
    calls: Mutex<usize>,
}

impl FakeGallery {
    pub fn new() -> Self {
        Self {
            picks: Mutex::new(VecDeque::new()),
            held: Mutex::new(VecDeque::new()),
            calls: Mutex::new(0),
        }
    }

    pub fn hold(&self) -> oneshot::Sender<Shot> {
        let (tx, rx) = oneshot::channel();
        self.held.lock().push_back(rx);
        tx
    }

    pub fn push(&self, pick: Shot) {
        self.picks.lock().push_back(pick);
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

#[async_trait]
impl GalleryPicker for FakeGallery {
    async fn pick_image(&self) -> Shot {
        *self.calls.lock() += 1;
        let held = self.held.lock().pop_front();
        match held {
            Some(rx) => rx.await.unwrap_or(Ok(None)),
            None => self.picks.lock().pop_front().unwrap_or(Ok(None)),
        }
    }
}

/// Detection service whose replies are released by the test, one
/// `expect_call` per upload, in call order.
pub struct ScriptedDetector {
    calls: Mutex<Vec<ImageHandle>>,
    replies: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(VecDeque::new()),
        }
    }

    pub fn expect_call(&self) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().push_back(rx);
        tx
    }

    pub fn calls(&self) -> Vec<ImageHandle> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl DetectionService for ScriptedDetector {
    async fn detect(&self, handle: &ImageHandle) -> Reply {
        self.calls.lock().push(handle.clone());
        let reply = self.replies.lock().pop_front();
        match reply {
            Some(rx) => rx.await.expect("test dropped the reply sender"),
            None => panic!("unexpected detect call for {:?}", handle),
        }
    }
}

pub struct Harness {
    pub session: SessionHandle,
    pub camera: Arc<FakeCamera>,
    pub gallery: Arc<FakeGallery>,
    pub detector: Arc<ScriptedDetector>,
    pub notices: broadcast::Receiver<Notice>,
    pub task: JoinHandle<()>,
}

pub fn start(permission: Result<(), PermissionError>) -> Harness {
    start_with(permission, FakeCamera::new())
}

pub fn start_with(permission: Result<(), PermissionError>, camera: FakeCamera) -> Harness {
    let camera = Arc::new(camera);
    let gallery = Arc::new(FakeGallery::new());
    let detector = Arc::new(ScriptedDetector::new());

    let (controller, session) = SessionController::new(
        PermissionGate::new(ScriptedPermission(permission)),
        Arc::new(LiveCapture::new(camera.clone())),
        Arc::new(LibrarySelection::new(gallery.clone())),
        detector.clone(),
        Arc::new(Metrics::new().expect("metrics")),
        CameraFacing::Back,
    );
    let notices = session.notices();
    let task = tokio::spawn(controller.run());

    Harness {
        session,
        camera,
        gallery,
        detector,
        notices,
        task,
    }
}

pub async fn wait_for(
    session: &SessionHandle,
    mut predicate: impl FnMut(&SessionState) -> bool,
) -> SessionState {
    let mut state = session.subscribe();
    let current = timeout(WAIT, state.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for session state")
        .expect("session closed");
    current.clone()
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

/// Gives the controller task time to drain queued commands.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub async fn ready(permission: Result<(), PermissionError>) -> Harness {
    let harness = start(permission);
    wait_for(&harness.session, |s| *s == SessionState::Ready).await;
    harness
}

pub async fn within<F: Future>(future: F) -> F::Output {
    timeout(WAIT, future).await.expect("timed out")
}

/// Serves `app` on an ephemeral local port and returns its base URL.
pub async fn serve(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let address = listener.local_addr().expect("local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    format!("http://{}", address)
}
