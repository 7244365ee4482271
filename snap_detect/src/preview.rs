use crate::image::ImageHandle;
use crate::permission::{CameraPermission, PermissionError};
use crate::source::{AcquisitionError, CameraDevice, CameraFacing};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::task;

const CAPTURE_FILENAME: &str = "capture.jpg";

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera {index}: {reason}")]
    OpenCameraFailed { index: i32, reason: String },
    #[error("Camera {0} is not available")]
    NotOpened(i32),
    #[error("Failed to read frame: {0}")]
    ReadFrameFailed(String),
    #[error("Failed to encode frame: {0}")]
    EncodeFrameFailed(String),
    #[error("Camera worker failed: {0}")]
    Worker(#[from] task::JoinError),
}

impl From<CameraError> for AcquisitionError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::OpenCameraFailed { .. } | CameraError::NotOpened(_) => {
                AcquisitionError::Busy(err.to_string())
            }
            CameraError::ReadFrameFailed(_)
            | CameraError::EncodeFrameFailed(_)
            | CameraError::Worker(_) => AcquisitionError::Device(err.to_string()),
        }
    }
}

/// An opened video device. Calls block.
pub trait FrameGrabber: Send + 'static {
    fn grab_jpeg(&mut self) -> Result<Vec<u8>, CameraError>;
}

/// Opens the device behind a camera facing. Calls block.
pub trait DeviceOpener: Send + Sync + 'static {
    type Device: FrameGrabber;

    fn open(&self, facing: CameraFacing) -> Result<Self::Device, CameraError>;
}

struct Active<D> {
    facing: CameraFacing,
    device: D,
}

/// Camera that keeps one device streaming and switches facing on demand.
///
/// Opening, reading and encoding run on the blocking pool. A failed switch
/// keeps the previous device, so the preview survives it.
pub struct PreviewCamera<O: DeviceOpener> {
    opener: Arc<O>,
    active: Arc<Mutex<Option<Active<O::Device>>>>,
    // Serializes switches and grabs.
    busy: tokio::sync::Mutex<()>,
    default_facing: CameraFacing,
}

impl<O: DeviceOpener> PreviewCamera<O> {
    pub fn new(opener: O, default_facing: CameraFacing) -> Self {
        Self {
            opener: Arc::new(opener),
            active: Arc::new(Mutex::new(None)),
            busy: tokio::sync::Mutex::new(()),
            default_facing,
        }
    }

    pub fn facing(&self) -> Option<CameraFacing> {
        self.active.lock().as_ref().map(|active| active.facing)
    }

    pub async fn start_preview(&self, facing: CameraFacing) -> Result<(), CameraError> {
        let _busy = self.busy.lock().await;
        self.switch_to(facing).await
    }

    async fn switch_to(&self, facing: CameraFacing) -> Result<(), CameraError> {
        if self.facing() == Some(facing) {
            return Ok(());
        }

        let opener = self.opener.clone();
        let device = task::spawn_blocking(move || opener.open(facing)).await??;

        let previous = self.active.lock().replace(Active { facing, device });
        // Release the old device off the runtime too.
        if previous.is_some() {
            task::spawn_blocking(move || drop(previous));
        }
        tracing::info!(facing = facing.as_str(), "Camera preview started");
        Ok(())
    }

    pub async fn grab(&self, facing: CameraFacing) -> Result<Vec<u8>, CameraError> {
        let _busy = self.busy.lock().await;
        self.switch_to(facing).await?;

        let active = self.active.clone();
        task::spawn_blocking(move || {
            let mut slot = active.lock();
            match slot.as_mut() {
                Some(open) => open.device.grab_jpeg(),
                None => Err(CameraError::ReadFrameFailed("no device open".to_string())),
            }
        })
        .await?
    }
}

#[async_trait]
impl<O: DeviceOpener> CameraPermission for PreviewCamera<O> {
    async fn request_access(&self) -> Result<(), PermissionError> {
        self.start_preview(self.default_facing)
            .await
            .map_err(|e| match e {
                CameraError::NotOpened(_) => PermissionError::Denied,
                other => PermissionError::Unavailable(other.to_string()),
            })
    }
}

#[async_trait]
impl<O: DeviceOpener> CameraDevice for PreviewCamera<O> {
    fn is_previewing(&self) -> bool {
        self.active.lock().is_some()
    }

    async fn take_picture(
        &self,
        facing: CameraFacing,
    ) -> Result<Option<ImageHandle>, AcquisitionError> {
        let image_data = self.grab(facing).await?;
        Ok(Some(ImageHandle::jpeg(image_data, CAPTURE_FILENAME)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Acquisition, LiveCapture};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct MockDevice(CameraFacing);

    impl FrameGrabber for MockDevice {
        fn grab_jpeg(&mut self) -> Result<Vec<u8>, CameraError> {
            Ok(vec![0xFF, 0xD8, self.0 as u8, 0xFF, 0xD9])
        }
    }

    /// Laptop with a back camera only.
    #[derive(Default)]
    struct MockOpener {
        opens: AtomicUsize,
        delay: Option<Duration>,
        ticked: Arc<AtomicBool>,
        saw_tick: AtomicBool,
    }

    impl DeviceOpener for MockOpener {
        type Device = MockDevice;

        fn open(&self, facing: CameraFacing) -> Result<MockDevice, CameraError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
                self.saw_tick
                    .store(self.ticked.load(Ordering::SeqCst), Ordering::SeqCst);
            }
            match facing {
                CameraFacing::Back => Ok(MockDevice(facing)),
                CameraFacing::Front => Err(CameraError::NotOpened(1)),
            }
        }
    }

    #[tokio::test]
    async fn test_failed_switch_keeps_preview() {
        let camera = Arc::new(PreviewCamera::new(MockOpener::default(), CameraFacing::Back));
        camera.request_access().await.unwrap();
        let source = LiveCapture::new(camera.clone());

        let err = source.capture(CameraFacing::Front).await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Busy(_)));
        assert!(camera.is_previewing());
        assert_eq!(camera.facing(), Some(CameraFacing::Back));

        let acquisition = source.capture(CameraFacing::Back).await.unwrap();
        assert!(matches!(acquisition, Acquisition::Captured(ref h) if h.filename() == "capture.jpg"));
        // Back was opened once; the failed Front attempt did not close it.
        assert_eq!(camera.opener.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_default_camera_is_denied() {
        let camera = PreviewCamera::new(MockOpener::default(), CameraFacing::Front);

        assert_eq!(camera.request_access().await, Err(PermissionError::Denied));
        assert!(!camera.is_previewing());
    }

    #[tokio::test]
    async fn test_open_runs_off_the_runtime() {
        let ticked = Arc::new(AtomicBool::new(false));
        let camera = PreviewCamera::new(
            MockOpener {
                delay: Some(Duration::from_millis(300)),
                ticked: ticked.clone(),
                ..Default::default()
            },
            CameraFacing::Back,
        );

        let heartbeat = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ticked.store(true, Ordering::SeqCst);
        };
        let (opened, ()) = tokio::join!(camera.start_preview(CameraFacing::Back), heartbeat);

        opened.unwrap();
        assert!(camera.opener.saw_tick.load(Ordering::SeqCst));
    }
}
