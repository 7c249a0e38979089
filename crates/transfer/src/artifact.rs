use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dumpdeploy_protocol::ArtifactKind;

use crate::TransferError;

/// Where an artifact pair came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactSource {
    /// Fetched from a hosted release.
    Remote,
    /// Supplied by the user from local files.
    LocalCustom,
}

/// The executable and config files deployed together to every target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPair {
    pub executable: PathBuf,
    pub config: PathBuf,
    pub version: String,
    pub source: ArtifactSource,
}

impl ArtifactPair {
    /// Builds a pair, rejecting missing, non-regular or empty files.
    pub fn new(
        executable: impl Into<PathBuf>,
        config: impl Into<PathBuf>,
        version: impl Into<String>,
        source: ArtifactSource,
    ) -> Result<Self, TransferError> {
        let pair = Self {
            executable: executable.into(),
            config: config.into(),
            version: version.into(),
            source,
        };
        pair.validate()?;
        Ok(pair)
    }

    /// Local path of one artifact.
    pub fn path(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Executable => &self.executable,
            ArtifactKind::Config => &self.config,
        }
    }

    /// Re-checks both files; they may have changed since construction.
    pub fn validate(&self) -> Result<(), TransferError> {
        for kind in ArtifactKind::ORDER {
            validate_file(kind, self.path(kind))?;
        }
        Ok(())
    }

    /// Current sizes of (executable, config).
    pub fn sizes(&self) -> Result<(u64, u64), TransferError> {
        Ok((
            validate_file(ArtifactKind::Executable, &self.executable)?,
            validate_file(ArtifactKind::Config, &self.config)?,
        ))
    }
}

fn validate_file(kind: ArtifactKind, path: &Path) -> Result<u64, TransferError> {
    let reject = |reason: &str| TransferError::InvalidArtifact {
        kind,
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let meta = std::fs::metadata(path).map_err(|e| reject(&e.to_string()))?;
    if !meta.is_file() {
        return Err(reject("not a regular file"));
    }
    if meta.len() == 0 {
        return Err(reject("file is empty"));
    }
    Ok(meta.len())
}
