//! [`RemoteFs`] over the local filesystem, confined to one volume root.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::Duration;

use dumpdeploy_protocol::{Connector, RemoteError, RemoteFs, RemoteFuture, join_remote_path};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Opens [`LocalFs`] sessions on one volume. Host and port are ignored.
#[derive(Debug, Clone)]
pub struct LocalConnector {
    root: PathBuf,
}

impl LocalConnector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Connector for LocalConnector {
    fn open<'a>(
        &'a self,
        _host: &'a str,
        _port: u16,
        _timeout: Duration,
    ) -> RemoteFuture<'a, Box<dyn RemoteFs>> {
        Box::pin(async move {
            let root = self.root.display();
            match fs::metadata(&self.root).await {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => return Err(RemoteError::Connect(format!("{root} is not a directory"))),
                Err(e) => return Err(RemoteError::Connect(format!("{root}: {e}"))),
            }
            debug!(%root, "local volume opened");
            Ok(Box::new(LocalFs::new(self.root.clone())) as Box<dyn RemoteFs>)
        })
    }
}

struct OpenWrite {
    path: PathBuf,
    file: File,
}

/// A session on a mounted volume.
pub struct LocalFs {
    root: PathBuf,
    write: Option<OpenWrite>,
}

impl LocalFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write: None,
        }
    }

    /// Maps an absolute protocol path below the volume root.
    fn resolve(&self, path: &str) -> Result<PathBuf, RemoteError> {
        let mut resolved = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            if segment == ".." {
                return Err(RemoteError::Rejected {
                    code: 553,
                    message: format!("{path}: outside the volume"),
                });
            }
            resolved.push(segment);
        }
        Ok(resolved)
    }

    async fn enter(&self, path: &str) -> Result<(), RemoteError> {
        let dir = self.resolve(path)?;
        match fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(RemoteError::Unavailable(format!("{path}: not a directory"))),
            Err(e) => Err(io_error(path, e)),
        }
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, RemoteError> {
        let dir = self.resolve(path)?;
        let mut entries = fs::read_dir(&dir).await.map_err(|e| io_error(path, e))?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_error(path, e))? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn is_dir(&self, path: &str, name: &str) -> Result<bool, RemoteError> {
        let full = join_remote_path(path, name);
        match fs::metadata(self.resolve(&full)?).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&full, e)),
        }
    }

    async fn exists(&self, path: &str, name: &str) -> Result<bool, RemoteError> {
        let full = join_remote_path(path, name);
        fs::try_exists(self.resolve(&full)?)
            .await
            .map_err(|e| io_error(&full, e))
    }

    async fn size(&self, path: &str, name: &str) -> Result<Option<u64>, RemoteError> {
        let full = join_remote_path(path, name);
        match fs::metadata(self.resolve(&full)?).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&full, e)),
        }
    }

    async fn begin_write(&mut self, path: &str, name: &str) -> Result<(), RemoteError> {
        if self.write.is_some() {
            return Err(RemoteError::Protocol("a write is already open".into()));
        }
        self.enter(path).await?;
        let full = join_remote_path(path, name);
        let dest = self.resolve(&full)?;
        let file = File::create(&dest).await.map_err(|e| io_error(&full, e))?;
        debug!(path = %dest.display(), "local write started");
        self.write = Some(OpenWrite { path: dest, file });
        Ok(())
    }

    async fn append(&mut self, data: &[u8]) -> Result<(), RemoteError> {
        let write = self.write.as_mut().ok_or(RemoteError::NoActiveWrite)?;
        write
            .file
            .write_all(data)
            .await
            .map_err(|e| io_error(&write.path.display().to_string(), e))
    }

    async fn finish_write(&mut self) -> Result<(), RemoteError> {
        let OpenWrite { path, mut file } = self.write.take().ok_or(RemoteError::NoActiveWrite)?;
        let what = path.display().to_string();
        file.flush().await.map_err(|e| io_error(&what, e))?;
        file.sync_all().await.map_err(|e| io_error(&what, e))?;
        Ok(())
    }

    /// Closes the open write and removes the partial file.
    async fn abort_write(&mut self) -> Result<(), RemoteError> {
        let OpenWrite { path, file } = self.write.take().ok_or(RemoteError::NoActiveWrite)?;
        drop(file);
        match fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "partial file removed"),
            Err(e) => debug!(path = %path.display(), error = %e, "partial file left behind"),
        }
        Ok(())
    }

    /// A volume that disappeared (unplugged) ends the session.
    async fn check_volume(&self) -> Result<(), RemoteError> {
        match fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(RemoteError::Lost(format!(
                "volume {} is no longer mounted",
                self.root.display()
            ))),
        }
    }
}

/// Maps a filesystem error on `what` to the capability error set.
fn io_error(what: &str, err: io::Error) -> RemoteError {
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::NotADirectory => RemoteError::Unavailable(what.to_string()),
        ErrorKind::PermissionDenied => {
            RemoteError::Unavailable(format!("{what}: permission denied"))
        }
        ErrorKind::StorageFull => {
            RemoteError::Transfer(format!("{what}: not enough space on the volume"))
        }
        ErrorKind::ReadOnlyFilesystem => {
            RemoteError::Transfer(format!("{what}: the volume is read-only"))
        }
        _ => RemoteError::Transfer(format!("{what}: {err}")),
    }
}

impl RemoteFs for LocalFs {
    fn authenticate<'a>(
        &'a mut self,
        _username: &'a str,
        _password: &'a str,
    ) -> RemoteFuture<'a, ()> {
        Box::pin(self.check_volume())
    }

    fn set_transfer_mode(&mut self, _passive: bool) -> RemoteFuture<'_, ()> {
        Box::pin(async { Ok(()) })
    }

    fn change_directory<'a>(&'a mut self, path: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(self.enter(path))
    }

    fn list_entry_names<'a>(&'a mut self, path: &'a str) -> RemoteFuture<'a, Vec<String>> {
        Box::pin(self.list(path))
    }

    fn is_directory<'a>(&'a mut self, path: &'a str, name: &'a str) -> RemoteFuture<'a, bool> {
        Box::pin(self.is_dir(path, name))
    }

    fn file_exists<'a>(&'a mut self, path: &'a str, name: &'a str) -> RemoteFuture<'a, bool> {
        Box::pin(self.exists(path, name))
    }

    fn file_size<'a>(
        &'a mut self,
        path: &'a str,
        name: &'a str,
    ) -> RemoteFuture<'a, Option<u64>> {
        Box::pin(self.size(path, name))
    }

    fn write_begin<'a>(&'a mut self, path: &'a str, name: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(self.begin_write(path, name))
    }

    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> RemoteFuture<'a, ()> {
        Box::pin(self.append(data))
    }

    fn write_end(&mut self) -> RemoteFuture<'_, ()> {
        Box::pin(self.finish_write())
    }

    fn write_abort(&mut self) -> RemoteFuture<'_, ()> {
        Box::pin(self.abort_write())
    }

    fn ping(&mut self) -> RemoteFuture<'_, ()> {
        Box::pin(self.check_volume())
    }

    fn close(&mut self) -> RemoteFuture<'_, ()> {
        self.write = None;
        Box::pin(async { Ok(()) })
    }
}
