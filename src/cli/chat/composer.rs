use crate::attachment::{self, ImageBlob, ValidationError};
use crate::cli::local_images::{ImageRef, LocalImages};

/// A validated user turn: trimmed text and at most one image, never both empty.
#[derive(Debug, Clone)]
pub struct Submission {
    text: String,
    image: Option<ImageBlob>,
}

impl Submission {
    pub fn new(text: &str, image: Option<ImageBlob>) -> Result<Self, ValidationError> {
        let text = text.trim();
        if text.is_empty() && image.is_none() {
            return Err(ValidationError::EmptySubmission);
        }
        Ok(Self {
            text: text.to_string(),
            image,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn image(&self) -> Option<&ImageBlob> {
        self.image.as_ref()
    }
}

/// Message input with one optional staged image.
///
/// The staged image is shown through a preview resource that is revoked
/// whenever the image is replaced, removed or sent.
#[derive(Debug, Default)]
pub struct Composer {
    staged: Option<(ImageBlob, ImageRef)>,
    previews: LocalImages,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage the image at `path`, replacing any previous one.
    pub fn attach_path(&mut self, path: &str) -> Result<&ImageBlob, ValidationError> {
        let blob = attachment::load_image(path)?;
        Ok(self.attach(blob))
    }

    pub fn attach(&mut self, blob: ImageBlob) -> &ImageBlob {
        self.detach();
        let preview = self.previews.create(blob.clone());
        tracing::debug!("Staged {} as {}", blob.file_name(), preview);
        let (blob, _) = self.staged.insert((blob, preview));
        blob
    }

    /// Drop the staged image. Returns whether there was one.
    pub fn detach(&mut self) -> bool {
        match self.staged.take() {
            Some((_, preview)) => {
                self.previews.revoke(&preview);
                true
            }
            None => false,
        }
    }

    pub fn staged(&self) -> Option<&ImageBlob> {
        self.staged.as_ref().map(|(blob, _)| blob)
    }

    #[cfg(test)]
    pub fn preview(&self) -> Option<&ImageRef> {
        self.staged.as_ref().map(|(_, preview)| preview)
    }

    #[cfg(test)]
    pub fn live_previews(&self) -> usize {
        self.previews.len()
    }

    /// Turn `text` plus the staged image into a submission.
    ///
    /// On rejection the staged image stays in place so the user can fix the input.
    pub fn submit(&mut self, text: &str) -> Result<Submission, ValidationError> {
        let submission = Submission::new(text, self.staged().cloned())?;
        self.detach();
        Ok(submission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachment::tests::png;

    #[test]
    fn empty_submission_is_rejected() {
        let err = Submission::new("   ", None).unwrap_err();
        assert!(matches!(err, ValidationError::EmptySubmission));
    }

    #[test]
    fn image_only_submission_is_accepted() {
        let submission = Submission::new("", Some(png("leaf.png"))).unwrap();
        assert_eq!(submission.text(), "");
        assert!(submission.image().is_some());
    }

    #[test]
    fn attaching_again_revokes_old_preview() {
        let mut composer = Composer::new();
        composer.attach(png("first.png"));
        let first = composer.preview().cloned().unwrap();

        composer.attach(png("second.png"));

        assert_eq!(composer.live_previews(), 1);
        assert_ne!(composer.preview(), Some(&first));
        assert_eq!(composer.staged().map(|b| b.file_name()), Some("second.png"));
    }

    #[test]
    fn submit_consumes_staged_image() {
        let mut composer = Composer::new();
        composer.attach(png("leaf.png"));

        let submission = composer.submit("  spots on leaves  ").unwrap();

        assert_eq!(submission.text(), "spots on leaves");
        assert_eq!(submission.image().map(|b| b.file_name()), Some("leaf.png"));
        assert!(composer.staged().is_none());
        assert_eq!(composer.live_previews(), 0);
    }

    #[test]
    fn submit_without_text_or_image_is_rejected() {
        let mut composer = Composer::new();
        assert!(composer.submit("").is_err());
        assert!(!composer.detach());
    }

    #[test]
    fn attach_path_surfaces_validation_errors() {
        let mut composer = Composer::new();
        let err = composer.attach_path("/no/such/leaf.png").unwrap_err();
        assert!(matches!(err, ValidationError::Unreadable { .. }));
        assert!(composer.staged().is_none());
    }
}
