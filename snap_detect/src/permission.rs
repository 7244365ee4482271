use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Unknown,
    Granted,
    Denied,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermissionError {
    #[error("Camera access denied by the user")]
    Denied,
    #[error("Camera permission could not be resolved: {0}")]
    Unavailable(String),
}

/// OS-side camera authorization. `Ok(())` means access was granted.
#[async_trait]
pub trait CameraPermission: Send + Sync {
    async fn request_access(&self) -> Result<(), PermissionError>;
}

#[async_trait]
impl<T: CameraPermission + ?Sized> CameraPermission for Arc<T> {
    async fn request_access(&self) -> Result<(), PermissionError> {
        (**self).request_access().await
    }
}

/// Resolves camera access once per session and remembers the answer.
pub struct PermissionGate {
    permission: Box<dyn CameraPermission>,
    resolved: OnceCell<PermissionState>,
}

impl PermissionGate {
    pub fn new(permission: impl CameraPermission + 'static) -> Self {
        Self {
            permission: Box::new(permission),
            resolved: OnceCell::new(),
        }
    }

    /// Prompts on the first call only; later calls return the cached state.
    /// A failing OS call counts as a denial.
    pub async fn request_camera_permission(&self) -> PermissionState {
        *self
            .resolved
            .get_or_init(|| async {
                match self.permission.request_access().await {
                    Ok(()) => {
                        tracing::info!("Camera permission granted");
                        PermissionState::Granted
                    }
                    Err(PermissionError::Denied) => {
                        tracing::info!("Camera permission denied");
                        PermissionState::Denied
                    }
                    Err(e) => {
                        tracing::warn!("Treating camera permission as denied: {}", e);
                        PermissionState::Denied
                    }
                }
            })
            .await
    }

    pub fn state(&self) -> PermissionState {
        self.resolved
            .get()
            .copied()
            .unwrap_or(PermissionState::Unknown)
    }
}
