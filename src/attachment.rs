use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Largest image accepted for upload, inclusive.
pub const MAX_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Reasons a submission or image is rejected before any request is made
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Please enter a message or select an image")]
    EmptySubmission,

    #[error("Please select a valid image file")]
    NotAnImage,

    #[error("Image size must be less than 10MB")]
    TooLarge { size: u64 },

    #[error("Could not read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An uploaded image, validated to be an `image/*` payload under the size limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    file_name: String,
    mime: String,
    bytes: Vec<u8>,
}

impl ImageBlob {
    /// Build a blob from raw bytes, sniffing the format from the leading bytes.
    pub fn from_bytes(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ValidationError> {
        let size = bytes.len() as u64;
        if size > MAX_IMAGE_BYTES {
            return Err(ValidationError::TooLarge { size });
        }

        let format = image::guess_format(&bytes).map_err(|_| ValidationError::NotAnImage)?;
        let mime = format.to_mime_type();
        if !mime.starts_with("image/") {
            return Err(ValidationError::NotAnImage);
        }

        Ok(Self {
            file_name: file_name.into(),
            mime: mime.to_string(),
            bytes,
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Human readable size, e.g. `34.2 KB`
    pub fn display_size(&self) -> String {
        let size = self.len() as f64;
        if size < 1024.0 {
            format!("{} B", self.len())
        } else if size < 1024.0 * 1024.0 {
            format!("{:.1} KB", size / 1024.0)
        } else {
            format!("{:.1} MB", size / (1024.0 * 1024.0))
        }
    }
}

/// Load and validate an image from a user supplied path.
///
/// The size limit is checked against file metadata before the contents are read.
pub fn load_image(path: &str) -> Result<ImageBlob, ValidationError> {
    let path = sanitize_path(path);

    let unreadable = |source: io::Error| ValidationError::Unreadable {
        path: path.clone(),
        source,
    };

    let metadata = fs::metadata(&path).map_err(unreadable)?;
    if !metadata.is_file() {
        return Err(ValidationError::NotAnImage);
    }
    if metadata.len() > MAX_IMAGE_BYTES {
        return Err(ValidationError::TooLarge { size: metadata.len() });
    }

    let bytes = fs::read(&path).map_err(unreadable)?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "image".to_string());

    tracing::debug!("Loaded image {} ({} bytes)", path.display(), bytes.len());

    ImageBlob::from_bytes(file_name, bytes)
}

/// Resolve a path argument: expands `~` and anchors relative paths at the
/// current working directory.
pub fn sanitize_path(path: &str) -> PathBuf {
    let path = path.trim();

    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            if path.len() == 1 {
                return home;
            } else if let Some(rest) = path.strip_prefix("~/") {
                return home.join(rest);
            }
        }
    }

    let path_buf = Path::new(path);
    if path_buf.is_relative() {
        if let Ok(current_dir) = std::env::current_dir() {
            return current_dir.join(path_buf);
        }
    }

    path_buf.to_path_buf()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    pub(crate) fn png(name: &str) -> ImageBlob {
        let mut bytes = PNG_HEADER.to_vec();
        bytes.extend_from_slice(&[0u8; 64]);
        ImageBlob::from_bytes(name, bytes).unwrap()
    }

    #[test]
    fn sniffs_png_mime() {
        let blob = png("leaf.png");
        assert_eq!(blob.mime(), "image/png");
        assert_eq!(blob.file_name(), "leaf.png");
    }

    #[test]
    fn sniffs_jpeg_regardless_of_name() {
        let blob = ImageBlob::from_bytes("photo.bin", b"\xFF\xD8\xFF\xE0\0\x10JFIF\0".to_vec()).unwrap();
        assert_eq!(blob.mime(), "image/jpeg");
    }

    #[test]
    fn rejects_non_image_bytes() {
        let err = ImageBlob::from_bytes("notes.txt", b"plain text, not a picture".to_vec()).unwrap_err();
        assert!(matches!(err, ValidationError::NotAnImage));
        assert_eq!(err.to_string(), "Please select a valid image file");
    }

    #[test]
    fn rejects_oversized_image() {
        let mut bytes = PNG_HEADER.to_vec();
        bytes.resize(MAX_IMAGE_BYTES as usize + 1, 0);
        let err = ImageBlob::from_bytes("huge.png", bytes).unwrap_err();
        assert!(matches!(err, ValidationError::TooLarge { size } if size == MAX_IMAGE_BYTES + 1));
    }

    #[test]
    fn accepts_image_of_exactly_the_limit() {
        let mut bytes = PNG_HEADER.to_vec();
        bytes.resize(MAX_IMAGE_BYTES as usize, 0);
        let blob = ImageBlob::from_bytes("exact.png", bytes).unwrap();
        assert_eq!(blob.len() as u64, MAX_IMAGE_BYTES);
        assert_eq!(blob.mime(), "image/png");
    }

    #[test]
    fn load_image_reports_missing_file() {
        let err = load_image("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, ValidationError::Unreadable { .. }));
    }

    #[test]
    fn load_image_reads_from_disk() {
        let path = std::env::temp_dir().join(format!("agri-chat-{}.png", uuid::Uuid::new_v4()));
        let mut bytes = PNG_HEADER.to_vec();
        bytes.extend_from_slice(&[1u8; 16]);
        fs::write(&path, &bytes).unwrap();

        let blob = load_image(path.to_str().unwrap()).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(blob.len(), bytes.len());
        assert_eq!(blob.mime(), "image/png");
        assert!(blob.file_name().ends_with(".png"));
    }

    #[test]
    fn display_size_scales_units() {
        let blob = png("a.png");
        assert!(blob.display_size().ends_with(" B"));
    }

    #[test]
    fn sanitize_path_anchors_relative_paths() {
        let resolved = sanitize_path("leaf.png");
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("leaf.png"));
    }
}
