mod image;
mod permission;
mod preview;
mod source;
mod state;

pub mod config;
pub mod detection;
pub mod session;
pub mod telemetry;

#[cfg(feature = "desktop")]
mod camera;
#[cfg(feature = "desktop")]
mod picker;
#[cfg(feature = "desktop")]
pub mod app;

pub use detection::{
    DetectionError, DetectionErrorKind, DetectionResult, DetectionService, HttpDetectionClient,
};
pub use image::{mime_for_extension, ImageHandle};
pub use permission::{CameraPermission, PermissionError, PermissionGate, PermissionState};
pub use preview::{CameraError, DeviceOpener, FrameGrabber, PreviewCamera};
pub use session::{Command, SessionController, SessionHandle};
pub use source::{
    Acquisition, AcquisitionError, CameraDevice, CameraFacing, GalleryPicker, ImageSource,
    LibrarySelection, LiveCapture, SourceKind,
};
pub use state::{Notice, SessionState};
#[cfg(feature = "desktop")]
pub use app::start_app;
