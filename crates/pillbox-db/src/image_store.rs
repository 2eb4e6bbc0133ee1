//! Filesystem store for uploaded medication images.
//!
//! Images are written under a generated UUID with their original extension
//! and served back via a static mount. Writes are atomic (temp file +
//! rename); deletes are best-effort because a record removal must never
//! fail on an already-missing file.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use pillbox_core::{defaults, Error, Result};

/// Filesystem image store rooted at the upload directory.
pub struct ImageStore {
    base_dir: PathBuf,
    max_size: usize,
}

impl ImageStore {
    /// Create a new image store with the given base directory and size cap.
    pub fn new(base_dir: impl Into<PathBuf>, max_size: usize) -> Self {
        Self {
            base_dir: base_dir.into(),
            max_size,
        }
    }

    /// Create from environment variables (`UPLOAD_DIR`, `MAX_FILE_SIZE`).
    pub fn from_env() -> Self {
        let base_dir = std::env::var(defaults::ENV_UPLOAD_DIR)
            .unwrap_or_else(|_| defaults::UPLOAD_DIR.to_string());
        let max_size = std::env::var(defaults::ENV_MAX_FILE_SIZE)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::MAX_FILE_SIZE_BYTES);
        Self::new(base_dir, max_size)
    }

    /// The upload directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Maximum accepted upload size in bytes.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Validate that the store can write, read, and delete files.
    ///
    /// Performs a full round-trip at startup to catch filesystem issues
    /// (permission errors, read-only mounts, missing directories) early.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_file = self.base_dir.join(".health-check");

        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", self.base_dir, e))?;

        let data = b"storage-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_data != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;

        Ok(())
    }

    /// Store uploaded bytes under a fresh image id.
    ///
    /// Rejects payloads over the size cap. The suggested extension is kept
    /// when it is one of the known image extensions; anything else falls
    /// back to `.jpg`.
    pub async fn save(&self, data: &[u8], suggested_extension: Option<&str>) -> Result<String> {
        if data.len() > self.max_size {
            return Err(Error::SizeLimitExceeded {
                size: data.len(),
                limit: self.max_size,
            });
        }

        let ext = normalize_extension(suggested_extension);
        let image_id = Uuid::new_v4().to_string();
        let full_path = self.base_dir.join(format!("{}{}", image_id, ext));

        fs::create_dir_all(&self.base_dir).await?;

        // Atomic write: temp file + rename
        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp_path, &full_path).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        debug!(
            subsystem = "storage",
            component = "image_store",
            op = "save",
            image_id = %image_id,
            size = data.len(),
            "Stored uploaded image"
        );
        Ok(image_id)
    }

    /// Resolve an image id to its file path by probing known extensions
    /// in lookup order.
    pub async fn locate(&self, image_id: &str) -> Result<PathBuf> {
        for ext in defaults::KNOWN_IMAGE_EXTENSIONS {
            let candidate = self.base_dir.join(format!("{}{}", image_id, ext));
            if fs::try_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(Error::ImageNotFound(image_id.to_string()))
    }

    /// Resolve an image id and read its bytes.
    pub async fn load(&self, image_id: &str) -> Result<(PathBuf, Vec<u8>)> {
        let path = self.locate(image_id).await?;
        let data = fs::read(&path).await?;
        Ok((path, data))
    }

    /// Best-effort removal of a stored image by its public URL.
    ///
    /// Only the file name component is used, so stored URLs cannot escape
    /// the upload directory. A missing file or I/O failure is logged and
    /// swallowed.
    pub async fn remove_by_url(&self, url: &str) {
        let Some(file_name) = Path::new(url).file_name() else {
            return;
        };
        let path = self.base_dir.join(file_name);

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(
                    subsystem = "storage",
                    component = "image_store",
                    op = "remove",
                    path = %path.display(),
                    "Removed image file"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(
                    subsystem = "storage",
                    component = "image_store",
                    op = "remove",
                    path = %path.display(),
                    error = %e,
                    "Failed to remove image file"
                );
            }
        }
    }

    /// Public retrieval URL for a stored file path.
    pub fn public_url(path: &Path) -> String {
        let file_name = path
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        format!("{}/{}", defaults::UPLOADS_MOUNT, file_name)
    }
}

/// Keep a known extension (lowercased), otherwise fall back to `.jpg`.
fn normalize_extension(suggested: Option<&str>) -> String {
    let Some(ext) = suggested else {
        return defaults::FALLBACK_IMAGE_EXTENSION.to_string();
    };
    let ext = ext.to_lowercase();
    let ext = if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    };
    if defaults::KNOWN_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        ext
    } else {
        defaults::FALLBACK_IMAGE_EXTENSION.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_extension_known() {
        assert_eq!(normalize_extension(Some(".png")), ".png");
        assert_eq!(normalize_extension(Some("webp")), ".webp");
        assert_eq!(normalize_extension(Some(".JPEG")), ".jpeg");
    }

    #[test]
    fn test_normalize_extension_unknown_falls_back() {
        assert_eq!(normalize_extension(Some(".exe")), ".jpg");
        assert_eq!(normalize_extension(None), ".jpg");
        assert_eq!(normalize_extension(Some("")), ".jpg");
    }

    #[test]
    fn test_public_url_uses_file_name_only() {
        let url = ImageStore::public_url(Path::new("/srv/uploads/abc.png"));
        assert_eq!(url, "/uploads/abc.png");
    }
}
