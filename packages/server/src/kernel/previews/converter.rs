//! Conversion backend seam.
//!
//! Conversion is an opaque, slow, external operation: seconds to tens of
//! seconds per document, and failures are routine. The scheduler only sees
//! success (an opaque artifact reference) or failure.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::kernel::files::StoredFile;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("unsupported format: {0}")]
    Unsupported(String),
    #[error("conversion backend failed: {0}")]
    Backend(String),
}

/// External document conversion service.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Render a previewable artifact for the file.
    ///
    /// Returns an opaque artifact location on success. Must have no side
    /// effects observable by the scheduler beyond success or failure.
    async fn convert(&self, file: &StoredFile) -> Result<String, ConvertError>;
}

/// Conversion via a headless LibreOffice subprocess.
///
/// `soffice --headless --convert-to pdf` handles the office formats the
/// platform cannot preview natively. The call can hang; there is no
/// per-call timeout here, only the row-level staleness sweep.
pub struct LibreOfficeBackend {
    output_dir: PathBuf,
}

impl LibreOfficeBackend {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

#[async_trait]
impl ConversionBackend for LibreOfficeBackend {
    async fn convert(&self, file: &StoredFile) -> Result<String, ConvertError> {
        let stem = Path::new(&file.storage_path)
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConvertError::Unsupported(file.storage_path.clone()))?;

        let output = tokio::process::Command::new("soffice")
            .arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(&self.output_dir)
            .arg(&file.storage_path)
            .output()
            .await
            .map_err(|e| ConvertError::Backend(format!("failed to launch soffice: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ConvertError::Backend(stderr.trim().to_string()));
        }

        Ok(self
            .output_dir
            .join(format!("{stem}.pdf"))
            .to_string_lossy()
            .into_owned())
    }
}
