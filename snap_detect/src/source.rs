use crate::image::ImageHandle;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Camera is not previewing")]
    NotPreviewing,
    #[error("Device busy: {0}")]
    Busy(String),
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device error: {0}")]
    Device(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    #[default]
    Back,
    Front,
}

impl CameraFacing {
    pub fn flipped(self) -> Self {
        match self {
            CameraFacing::Back => CameraFacing::Front,
            CameraFacing::Front => CameraFacing::Back,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraFacing::Back => "back",
            CameraFacing::Front => "front",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    LiveCapture,
    LibrarySelection,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::LiveCapture => "live_capture",
            SourceKind::LibrarySelection => "library_selection",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub enum Acquisition {
    Captured(ImageHandle),
    /// The user backed out. Not an error.
    Cancelled,
}

/// Anything the session can ask for a still image.
#[async_trait]
pub trait ImageSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn acquire(&self, facing: CameraFacing) -> Result<Acquisition, AcquisitionError>;
}

/// Device camera driver. `take_picture` resolves to `None` when the user
/// leaves the viewfinder without pressing the shutter.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    fn is_previewing(&self) -> bool;

    async fn take_picture(
        &self,
        facing: CameraFacing,
    ) -> Result<Option<ImageHandle>, AcquisitionError>;
}

/// Gallery picker UI. `pick_image` resolves to `None` on explicit cancel.
#[async_trait]
pub trait GalleryPicker: Send + Sync {
    async fn pick_image(&self) -> Result<Option<ImageHandle>, AcquisitionError>;
}

#[async_trait]
impl<T: CameraDevice + ?Sized> CameraDevice for Arc<T> {
    fn is_previewing(&self) -> bool {
        (**self).is_previewing()
    }

    async fn take_picture(
        &self,
        facing: CameraFacing,
    ) -> Result<Option<ImageHandle>, AcquisitionError> {
        (**self).take_picture(facing).await
    }
}

#[async_trait]
impl<T: GalleryPicker + ?Sized> GalleryPicker for Arc<T> {
    async fn pick_image(&self) -> Result<Option<ImageHandle>, AcquisitionError> {
        (**self).pick_image().await
    }
}

pub struct LiveCapture<D: CameraDevice> {
    device: D,
}

impl<D: CameraDevice> LiveCapture<D> {
    pub fn new(device: D) -> Self {
        Self { device }
    }

    pub async fn capture(&self, facing: CameraFacing) -> Result<Acquisition, AcquisitionError> {
        if !self.device.is_previewing() {
            return Err(AcquisitionError::NotPreviewing);
        }

        match self.device.take_picture(facing).await? {
            Some(handle) => {
                tracing::debug!(facing = facing.as_str(), "Captured {:?}", handle);
                Ok(Acquisition::Captured(handle))
            }
            None => Ok(Acquisition::Cancelled),
        }
    }
}

#[async_trait]
impl<D: CameraDevice> ImageSource for LiveCapture<D> {
    fn kind(&self) -> SourceKind {
        SourceKind::LiveCapture
    }

    async fn acquire(&self, facing: CameraFacing) -> Result<Acquisition, AcquisitionError> {
        self.capture(facing).await
    }
}

pub struct LibrarySelection<P: GalleryPicker> {
    picker: P,
}

impl<P: GalleryPicker> LibrarySelection<P> {
    pub fn new(picker: P) -> Self {
        Self { picker }
    }

    pub async fn select(&self) -> Result<Acquisition, AcquisitionError> {
        match self.picker.pick_image().await? {
            Some(handle) => {
                tracing::debug!("Selected {:?}", handle);
                Ok(Acquisition::Captured(handle))
            }
            None => Ok(Acquisition::Cancelled),
        }
    }
}

#[async_trait]
impl<P: GalleryPicker> ImageSource for LibrarySelection<P> {
    fn kind(&self) -> SourceKind {
        SourceKind::LibrarySelection
    }

    // The gallery has no notion of camera direction.
    async fn acquire(&self, _facing: CameraFacing) -> Result<Acquisition, AcquisitionError> {
        self.select().await
    }
}
