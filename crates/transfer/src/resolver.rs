//! Supplies the artifact pair to deploy.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use crate::{ArtifactPair, ArtifactSource, TransferError};

/// Future returned by [`ReleaseResolver::resolve`].
pub type ResolveFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ArtifactPair, TransferError>> + Send + 'a>>;

/// Resolves a (possibly versioned) artifact pair to local files.
pub trait ReleaseResolver: Send + Sync {
    /// `None` asks for the latest release.
    fn resolve<'a>(&'a self, version: Option<&'a str>) -> ResolveFuture<'a>;
}

/// Resolves a pair of files the user picked locally.
#[derive(Debug, Clone)]
pub struct LocalReleaseResolver {
    executable: PathBuf,
    config: PathBuf,
    default_version: String,
}

impl LocalReleaseResolver {
    /// Version tag used when none is requested.
    pub const CUSTOM_VERSION: &'static str = "custom";

    pub fn new(executable: impl Into<PathBuf>, config: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            config: config.into(),
            default_version: Self::CUSTOM_VERSION.into(),
        }
    }
}

impl ReleaseResolver for LocalReleaseResolver {
    fn resolve<'a>(&'a self, version: Option<&'a str>) -> ResolveFuture<'a> {
        Box::pin(async move {
            let version = version.unwrap_or(&self.default_version);
            let pair = ArtifactPair::new(
                &self.executable,
                &self.config,
                version,
                ArtifactSource::LocalCustom,
            )?;
            tracing::debug!(
                version,
                executable = %self.executable.display(),
                config = %self.config.display(),
                "resolved local artifact pair"
            );
            Ok(pair)
        })
    }
}
