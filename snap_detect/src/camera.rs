use crate::config::CameraConfig;
use crate::preview::{CameraError, DeviceOpener, FrameGrabber, PreviewCamera};
use crate::source::CameraFacing;
use opencv::{core::Mat, core::Vector, imgcodecs, prelude::*, videoio};

/// Webcam-backed camera. Opening the device doubles as the permission check:
/// on desktop the OS grants access when the device can be opened.
pub type Camera = PreviewCamera<WebcamOpener>;

pub fn webcam(config: CameraConfig) -> Camera {
    let default_facing = config.default_facing;
    PreviewCamera::new(WebcamOpener { config }, default_facing)
}

pub struct WebcamOpener {
    config: CameraConfig,
}

impl DeviceOpener for WebcamOpener {
    type Device = Webcam;

    fn open(&self, facing: CameraFacing) -> Result<Webcam, CameraError> {
        let index = self.config.device_index(facing);
        let open_failed = |e: opencv::Error| CameraError::OpenCameraFailed {
            index,
            reason: e.to_string(),
        };

        let capture = videoio::VideoCapture::new(index, videoio::CAP_ANY).map_err(open_failed)?;
        if !capture.is_opened().map_err(open_failed)? {
            return Err(CameraError::NotOpened(index));
        }
        Ok(Webcam { capture })
    }
}

pub struct Webcam {
    capture: videoio::VideoCapture,
}

impl FrameGrabber for Webcam {
    fn grab_jpeg(&mut self) -> Result<Vec<u8>, CameraError> {
        let mut frame = Mat::default();
        let grabbed = self
            .capture
            .read(&mut frame)
            .map_err(|e| CameraError::ReadFrameFailed(e.to_string()))?;
        if !grabbed || frame.empty() {
            return Err(CameraError::ReadFrameFailed(
                "camera returned an empty frame".to_string(),
            ));
        }

        let mut buf = Vector::<u8>::new();
        imgcodecs::imencode(".jpg", &frame, &mut buf, &Vector::new())
            .map_err(|e| CameraError::EncodeFrameFailed(e.to_string()))?;
        Ok(buf.into())
    }
}
