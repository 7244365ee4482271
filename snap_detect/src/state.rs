use crate::detection::{DetectionErrorKind, DetectionResult};
use crate::image::ImageHandle;
use crate::source::SourceKind;

/// Everything the screen can show. Only the session controller changes it.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    AwaitingPermission,
    PermissionDenied,
    Ready,
    Capturing(SourceKind),
    Uploading(ImageHandle),
    ResultReady(ImageHandle, DetectionResult),
    UploadFailed(ImageHandle, DetectionErrorKind),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::AwaitingPermission => "awaiting_permission",
            SessionState::PermissionDenied => "permission_denied",
            SessionState::Ready => "ready",
            SessionState::Capturing(_) => "capturing",
            SessionState::Uploading(_) => "uploading",
            SessionState::ResultReady(..) => "result_ready",
            SessionState::UploadFailed(..) => "upload_failed",
        }
    }

    /// The image the preview should show, if any.
    pub fn image(&self) -> Option<&ImageHandle> {
        match self {
            SessionState::Uploading(handle)
            | SessionState::ResultReady(handle, _)
            | SessionState::UploadFailed(handle, _) => Some(handle),
            _ => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            SessionState::AwaitingPermission
                | SessionState::Capturing(_)
                | SessionState::Uploading(_)
        )
    }
}

/// Transient, dismissible message for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    AcquisitionFailed { source: SourceKind, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_image_follows_result() {
        let handle = ImageHandle::jpeg(vec![7; 4], "photo.jpg");
        let state = SessionState::ResultReady(handle.clone(), json!({"boxes": []}).into());

        assert_eq!(state.image(), Some(&handle));
        assert_eq!(state.name(), "result_ready");
        assert!(!state.is_busy());
        assert_eq!(SessionState::Ready.image(), None);
        assert!(SessionState::Uploading(handle).is_busy());
    }
}
