use crate::image::ImageHandle;
use crate::source::{AcquisitionError, GalleryPicker};
use async_trait::async_trait;
use rfd::AsyncFileDialog;
use std::path::PathBuf;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "heic", "webp", "bmp"];

/// Native file dialog standing in for the photo gallery.
pub struct DialogPicker {
    start_dir: Option<PathBuf>,
}

impl DialogPicker {
    pub fn new() -> Self {
        Self {
            start_dir: default_pictures_dir(),
        }
    }
}

impl Default for DialogPicker {
    fn default() -> Self {
        Self::new()
    }
}

fn default_pictures_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join("Pictures"))
        .filter(|dir| dir.is_dir())
}

#[async_trait]
impl GalleryPicker for DialogPicker {
    async fn pick_image(&self) -> Result<Option<ImageHandle>, AcquisitionError> {
        let mut dialog = AsyncFileDialog::new()
            .set_title("Choose a photo")
            .add_filter("Images", IMAGE_EXTENSIONS);
        if let Some(dir) = &self.start_dir {
            dialog = dialog.set_directory(dir);
        }

        let Some(file) = dialog.pick_file().await else {
            return Ok(None);
        };

        let path = file.path().to_path_buf();
        let bytes = tokio::fs::read(&path).await?;
        tracing::debug!("Picked {} ({} bytes)", path.display(), bytes.len());

        Ok(Some(ImageHandle::from_file(&path, bytes)))
    }
}
