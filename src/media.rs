//! Durable image storage for diary entries.
//!
//! Picked or captured images are copied into the app image directory
//! under a generated filename; entries reference images by that
//! filename only.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Utc;
use uuid::Uuid;

use crate::error::MediaError;

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: PathBuf) -> Result<Self, MediaError> {
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Copies the source image into the store and returns the generated
    /// filename. The source must decode as an image; the check reads
    /// only the header, not the full pixel data.
    pub async fn persist(&self, source: &Path) -> Result<String, MediaError> {
        let source = source.to_path_buf();
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || persist_blocking(&root, &source))
            .await
            .map_err(|_| MediaError::Worker)?
    }

    /// Absolute path of a stored image.
    pub fn resolve(&self, image_ref: &str) -> PathBuf {
        self.root.join(image_ref)
    }

    /// Removes a stored image; missing files are not an error.
    pub fn remove(&self, image_ref: &str) -> Result<(), MediaError> {
        match fs::remove_file(self.root.join(image_ref)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(MediaError::Io(err)),
        }
    }
}

fn persist_blocking(root: &Path, source: &Path) -> Result<String, MediaError> {
    if !source.exists() {
        return Err(MediaError::SourceMissing(source.display().to_string()));
    }

    image::image_dimensions(source).map_err(|err| MediaError::NotAnImage(err.to_string()))?;

    let suffix = Uuid::new_v4().simple().to_string();
    let name = format!(
        "img_{}_{}.jpg",
        Utc::now().timestamp_millis(),
        &suffix[..8]
    );
    fs::copy(source, root.join(&name))?;

    Ok(name)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn write_test_image(dir: &Path) -> PathBuf {
        let path = dir.join("picked.png");
        image::RgbImage::new(2, 2).save(&path).unwrap();
        path
    }

    #[tokio::test]
    async fn persist_copies_and_resolves() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path().join("images")).unwrap();
        let source = write_test_image(dir.path());

        let image_ref = store.persist(&source).await.unwrap();

        assert!(image_ref.starts_with("img_"));
        assert!(store.resolve(&image_ref).exists());
    }

    #[tokio::test]
    async fn persist_rejects_non_image_sources() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path().join("images")).unwrap();

        let bogus = dir.path().join("notes.txt");
        fs::write(&bogus, "not pixels").unwrap();
        let err = store.persist(&bogus).await.unwrap_err();
        assert!(matches!(err, MediaError::NotAnImage(_)));

        let missing = dir.path().join("ghost.png");
        let err = store.persist(&missing).await.unwrap_err();
        assert!(matches!(err, MediaError::SourceMissing(_)));
    }

    #[tokio::test]
    async fn remove_is_a_noop_for_unknown_refs() {
        let dir = TempDir::new().unwrap();
        let store = MediaStore::new(dir.path().join("images")).unwrap();

        store.remove("img_never_saved.jpg").unwrap();

        let source = write_test_image(dir.path());
        let image_ref = store.persist(&source).await.unwrap();
        store.remove(&image_ref).unwrap();
        assert!(!store.resolve(&image_ref).exists());
    }
}
