use std::io::Write;

use eyre::Result;

use crate::agri_client::AgriApi;
use crate::attachment::{self, ImageBlob, ValidationError};
use crate::cli::local_images::{ImageRef, LocalImages};
use crate::cli::notice::Notice;
use crate::cli::render::render_markdown;

const DEFAULT_FAILURE: &str = "Failed to diagnose image";

/// Single-shot crop image diagnosis, kept apart from the chat transcript.
///
/// Holds at most one selected image (with its preview resource) and the
/// analysis of the last successful run.
#[derive(Debug, Default)]
pub struct DiagnosisPanel {
    selected: Option<(ImageBlob, ImageRef)>,
    previews: LocalImages,
    result: Option<String>,
    is_loading: bool,
}

impl DiagnosisPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a new image. The previous preview is released and any old result dropped.
    pub fn select(&mut self, blob: ImageBlob) {
        self.remove();
        let preview = self.previews.create(blob.clone());
        self.selected = Some((blob, preview));
    }

    pub fn select_path(&mut self, path: &str) -> Result<(), ValidationError> {
        let blob = attachment::load_image(path)?;
        self.select(blob);
        Ok(())
    }

    pub fn remove(&mut self) {
        if let Some((_, preview)) = self.selected.take() {
            self.previews.revoke(&preview);
        }
        self.result = None;
    }

    pub fn selected(&self) -> Option<&ImageBlob> {
        self.selected.as_ref().map(|(blob, _)| blob)
    }

    #[cfg(test)]
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    #[cfg(test)]
    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    #[cfg(test)]
    pub fn live_previews(&self) -> usize {
        self.previews.len()
    }

    /// Send the selected image to the diagnosis endpoint.
    ///
    /// Returns the analysis, or a message suitable for an error notice.
    pub async fn diagnose(&mut self, api: &dyn AgriApi) -> Result<&str, String> {
        if self.is_loading {
            return Err("Please wait for the current diagnosis".to_string());
        }
        let Some((image, _)) = &self.selected else {
            return Err("Please select an image first".to_string());
        };

        self.is_loading = true;
        let outcome = api.ask_image(image).await;
        self.is_loading = false;

        match outcome {
            Ok(response) => Ok(self.result.insert(response.analysis).as_str()),
            Err(err) => {
                tracing::error!("Diagnosis error: {}", err);
                if err.message.trim().is_empty() {
                    Err(DEFAULT_FAILURE.to_string())
                } else {
                    Err(err.message)
                }
            }
        }
    }
}

/// Run a diagnosis for `path` and print the result.
///
/// Returns false when the image was rejected or the call failed.
pub async fn run_diagnosis(
    output: &mut dyn Write,
    panel: &mut DiagnosisPanel,
    api: &dyn AgriApi,
    path: &str,
    styled: bool,
) -> Result<bool> {
    if let Err(e) = panel.select_path(path) {
        Notice::Error.write(output, &e.to_string())?;
        return Ok(false);
    }

    if let Some(image) = panel.selected() {
        Notice::Info.write(
            output,
            &format!("Analyzing {} ({})...", image.file_name(), image.display_size()),
        )?;
    }

    match panel.diagnose(api).await {
        Ok(analysis) => {
            let rendered = render_markdown(analysis, styled);
            writeln!(output, "\n{}\n", rendered)?;
            Notice::Success.write(output, "Diagnosis complete")?;
            Ok(true)
        }
        Err(message) => {
            Notice::Error.write(output, &message)?;
            Ok(false)
        }
    }
}
