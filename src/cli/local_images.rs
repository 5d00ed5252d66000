use std::collections::HashMap;
use std::fmt;

use uuid::Uuid;

use crate::attachment::ImageBlob;

/// Reference to an image held in a [`LocalImages`] registry, rendered as `blob:<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef(String);

impl ImageRef {
    fn generate() -> Self {
        Self(format!("blob:{}", Uuid::new_v4()))
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Locally displayable image resources.
///
/// Every `create` must be paired with a `revoke` once the owner (a message or
/// a preview) lets go of the reference; `len` exposes what is still held.
#[derive(Debug, Default)]
pub struct LocalImages {
    images: HashMap<ImageRef, ImageBlob>,
}

impl LocalImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, blob: ImageBlob) -> ImageRef {
        let image_ref = ImageRef::generate();
        self.images.insert(image_ref.clone(), blob);
        image_ref
    }

    pub fn resolve(&self, image_ref: &ImageRef) -> Option<&ImageBlob> {
        self.images.get(image_ref)
    }

    /// Release a resource. Returns false if it was already released.
    pub fn revoke(&mut self, image_ref: &ImageRef) -> bool {
        let released = self.images.remove(image_ref).is_some();
        if released {
            tracing::debug!("Revoked local image {}", image_ref);
        }
        released
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::tests::png;

    #[test]
    fn create_resolve_revoke() {
        let mut images = LocalImages::new();
        let image_ref = images.create(png("leaf.png"));

        assert!(image_ref.as_str().starts_with("blob:"));
        assert_eq!(images.resolve(&image_ref).map(|b| b.file_name()), Some("leaf.png"));
        assert_eq!(images.len(), 1);

        assert!(images.revoke(&image_ref));
        assert!(!images.revoke(&image_ref));
        assert!(images.resolve(&image_ref).is_none());
        assert!(images.is_empty());
    }

    #[test]
    fn references_are_unique() {
        let mut images = LocalImages::new();
        let a = images.create(png("a.png"));
        let b = images.create(png("a.png"));
        assert_ne!(a, b);
        assert_eq!(images.len(), 2);
    }
}
