//! In-memory remote endpoint with fault injection.
//!
//! `MemoryFs` is a shared directory tree; every session opened through
//! [`MemoryConnector`] operates on the same tree, so tests can inspect
//! what a run left behind. Faults are keyed by absolute path.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::future::ready;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::remote::{Connector, RemoteError, RemoteFs, RemoteFuture, join_remote_path};

/// Failure injected into a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Timeout,
    Rejected,
    Transfer,
    Unavailable,
    /// Fails the operation and every later one with `Lost`.
    Lost,
}

impl Fault {
    fn to_error(self, what: &str) -> RemoteError {
        match self {
            Self::Timeout => RemoteError::Timeout(what.to_string()),
            Self::Rejected => RemoteError::Rejected {
                code: 550,
                message: format!("{what}: rejected"),
            },
            Self::Transfer => RemoteError::Transfer(what.to_string()),
            Self::Unavailable => RemoteError::Unavailable(what.to_string()),
            Self::Lost => RemoteError::Lost(what.to_string()),
        }
    }
}

type Hook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct FsState {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    denied: BTreeSet<String>,
    list_faults: HashMap<String, VecDeque<Fault>>,
    write_faults: HashMap<String, Fault>,
    chunk_faults: HashMap<(String, usize), Fault>,
    end_faults: HashMap<String, Fault>,
    write_hooks: HashMap<String, Vec<Hook>>,
    chunk_hooks: HashMap<(String, usize), Vec<Hook>>,
    commands: Vec<String>,
    lost: bool,
    completed_writes: usize,
}

/// Shared in-memory directory tree.
#[derive(Clone)]
pub struct MemoryFs {
    state: Arc<Mutex<FsState>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// Creates a tree containing only `/`.
    pub fn new() -> Self {
        let mut state = FsState::default();
        state.dirs.insert("/".into());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates `path` and all its ancestors.
    pub fn add_dir(&self, path: &str) {
        let mut state = self.lock();
        let mut current = String::new();
        for segment in normalize(path).split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            state.dirs.insert(current.clone());
        }
    }

    /// Stores a file, creating its parent directories.
    pub fn add_file(&self, path: &str, data: &[u8]) {
        let path = normalize(path);
        self.add_dir(&parent_of(&path));
        self.lock().files.insert(path, data.to_vec());
    }

    /// Makes `path` exist but refuse entry and listing.
    pub fn deny(&self, path: &str) {
        let path = normalize(path);
        self.add_dir(&path);
        self.lock().denied.insert(path);
    }

    /// Fails the next `times` listings of `path`.
    pub fn fail_list(&self, path: &str, fault: Fault, times: usize) {
        let mut state = self.lock();
        let queue = state.list_faults.entry(normalize(path)).or_default();
        queue.extend(std::iter::repeat_n(fault, times));
    }

    /// Fails every write to the file at `path`.
    pub fn fail_write(&self, path: &str, fault: Fault) {
        self.lock().write_faults.insert(normalize(path), fault);
    }

    /// Fails chunk `index` (zero-based) of every write to `path`.
    ///
    /// The write stays open, so the caller can still abort it.
    pub fn fail_chunk(&self, path: &str, index: usize, fault: Fault) {
        self.lock().chunk_faults.insert((normalize(path), index), fault);
    }

    /// Fails `write_end` of every write to `path`; nothing is stored.
    pub fn fail_write_end(&self, path: &str, fault: Fault) {
        self.lock().end_faults.insert(normalize(path), fault);
    }

    /// Runs `hook` after chunk `index` (zero-based) of a write to `path`
    /// has been accepted.
    pub fn on_chunk(&self, path: &str, index: usize, hook: impl Fn() + Send + Sync + 'static) {
        self.lock()
            .chunk_hooks
            .entry((normalize(path), index))
            .or_default()
            .push(Arc::new(hook));
    }

    /// Runs `hook` each time a write to `path` completes.
    pub fn on_write_complete(&self, path: &str, hook: impl Fn() + Send + Sync + 'static) {
        self.lock()
            .write_hooks
            .entry(normalize(path))
            .or_default()
            .push(Arc::new(hook));
    }

    /// Contents of the file at `path`.
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().files.get(&normalize(path)).cloned()
    }

    /// All commands issued so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.lock().commands.clone()
    }

    /// Number of chunks accepted for writes to `path`.
    pub fn chunks_written(&self, path: &str) -> usize {
        let entry = format!("DATA {}", normalize(path));
        self.lock().commands.iter().filter(|c| **c == entry).count()
    }

    /// Number of writes that reached `write_end`.
    pub fn completed_writes(&self) -> usize {
        self.lock().completed_writes
    }

    /// Drops the connection for every session on this tree.
    pub fn set_lost(&self) {
        self.lock().lost = true;
    }

    /// Session-level entry: records the command and checks the link.
    fn begin(&self, command: String) -> Result<MutexGuard<'_, FsState>, RemoteError> {
        let mut state = self.lock();
        state.commands.push(command.clone());
        if state.lost {
            return Err(RemoteError::Lost(format!("{command}: connection closed")));
        }
        Ok(state)
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".into()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent.to_string(),
        _ => "/".into(),
    }
}

/// Opens [`MemorySession`]s on a shared [`MemoryFs`].
pub struct MemoryConnector {
    fs: MemoryFs,
    password: Option<String>,
    refuse: bool,
    handshake_delay: Option<Duration>,
    opened: AtomicUsize,
}

impl MemoryConnector {
    pub fn new(fs: MemoryFs) -> Self {
        Self {
            fs,
            password: None,
            refuse: false,
            handshake_delay: None,
            opened: AtomicUsize::new(0),
        }
    }

    /// Requires this password on login (any password is accepted otherwise).
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Rejects every connection attempt as unreachable.
    pub fn refuse_connections(mut self) -> Self {
        self.refuse = true;
        self
    }

    /// Delays the handshake, e.g. to exceed the configured timeout.
    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = Some(delay);
        self
    }

    /// Number of connection attempts made so far.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn fs(&self) -> &MemoryFs {
        &self.fs
    }
}

impl Connector for MemoryConnector {
    fn open<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        _timeout: Duration,
    ) -> RemoteFuture<'a, Box<dyn RemoteFs>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if self.refuse {
                return Err(RemoteError::Connect(format!("{host}:{port} refused")));
            }
            if let Some(delay) = self.handshake_delay {
                tokio::time::sleep(delay).await;
            }
            let session = MemorySession {
                fs: self.fs.clone(),
                password: self.password.clone(),
                authenticated: false,
                pending: None,
            };
            Ok(Box::new(session) as Box<dyn RemoteFs>)
        })
    }
}

/// One open session on a [`MemoryFs`].
pub struct MemorySession {
    fs: MemoryFs,
    password: Option<String>,
    authenticated: bool,
    pending: Option<PendingWrite>,
}

struct PendingWrite {
    path: String,
    data: Vec<u8>,
    chunks: usize,
}

impl MemorySession {
    fn login(&mut self, username: &str, password: &str) -> Result<(), RemoteError> {
        let _state = self.fs.begin(format!("USER {username}"))?;
        if let Some(expected) = &self.password
            && expected != password
        {
            return Err(RemoteError::Auth(format!("login incorrect for {username}")));
        }
        self.authenticated = true;
        Ok(())
    }

    fn command(&self, command: String) -> Result<MutexGuard<'_, FsState>, RemoteError> {
        let state = self.fs.begin(command)?;
        if !self.authenticated {
            return Err(RemoteError::Rejected {
                code: 530,
                message: "not logged in".into(),
            });
        }
        Ok(state)
    }

    fn enter(&self, path: &str) -> Result<(), RemoteError> {
        let path = normalize(path);
        let state = self.command(format!("CWD {path}"))?;
        if state.denied.contains(&path) || !state.dirs.contains(&path) {
            return Err(RemoteError::Unavailable(path));
        }
        Ok(())
    }

    fn list(&self, path: &str) -> Result<Vec<String>, RemoteError> {
        let path = normalize(path);
        let mut state = self.command(format!("NLST {path}"))?;
        if let Some(fault) = state.list_faults.get_mut(&path).and_then(|q| q.pop_front()) {
            if fault == Fault::Lost {
                state.lost = true;
            }
            return Err(fault.to_error(&path));
        }
        if state.denied.contains(&path) || !state.dirs.contains(&path) {
            return Err(RemoteError::Unavailable(path));
        }
        let children = state
            .dirs
            .iter()
            .chain(state.files.keys())
            .filter(|p| p.as_str() != "/" && parent_of(p) == path)
            .filter_map(|p| p.rsplit('/').next().map(str::to_string))
            .collect::<BTreeSet<_>>();
        Ok(children.into_iter().collect())
    }

    fn is_dir(&self, path: &str, name: &str) -> Result<bool, RemoteError> {
        let full = normalize(&join_remote_path(path, name));
        let state = self.command(format!("CWD {full}"))?;
        Ok(state.dirs.contains(&full) && !state.denied.contains(&full))
    }

    fn exists(&self, path: &str, name: &str) -> Result<bool, RemoteError> {
        let full = normalize(&join_remote_path(path, name));
        let state = self.command(format!("NLST {full}"))?;
        Ok(state.files.contains_key(&full) || state.dirs.contains(&full))
    }

    fn size(&self, path: &str, name: &str) -> Result<Option<u64>, RemoteError> {
        let full = normalize(&join_remote_path(path, name));
        let state = self.command(format!("SIZE {full}"))?;
        Ok(state.files.get(&full).map(|data| data.len() as u64))
    }

    fn begin_write(&mut self, path: &str, name: &str) -> Result<(), RemoteError> {
        let full = normalize(&join_remote_path(path, name));
        {
            let mut state = self.command(format!("STOR {full}"))?;
            if let Some(&fault) = state.write_faults.get(&full) {
                if fault == Fault::Lost {
                    state.lost = true;
                }
                return Err(fault.to_error(&full));
            }
            if !state.dirs.contains(&parent_of(&full)) {
                return Err(RemoteError::Unavailable(full));
            }
        }
        self.pending = Some(PendingWrite {
            path: full,
            data: Vec::new(),
            chunks: 0,
        });
        Ok(())
    }

    fn append(&mut self, data: &[u8]) -> Result<(), RemoteError> {
        let pending = self.pending.as_mut().ok_or(RemoteError::NoActiveWrite)?;
        let key = (pending.path.clone(), pending.chunks);
        let hooks = {
            let mut state = self.fs.lock();
            if state.lost {
                return Err(RemoteError::Lost("data connection closed".into()));
            }
            if let Some(&fault) = state.chunk_faults.get(&key) {
                if fault == Fault::Lost {
                    state.lost = true;
                }
                return Err(fault.to_error(&format!("{} chunk {}", key.0, key.1)));
            }
            state.commands.push(format!("DATA {}", key.0));
            state.chunk_hooks.get(&key).cloned().unwrap_or_default()
        };
        pending.data.extend_from_slice(data);
        pending.chunks += 1;
        for hook in hooks {
            hook();
        }
        Ok(())
    }

    fn finish_write(&mut self, complete: bool) -> Result<(), RemoteError> {
        let PendingWrite { path, data, .. } =
            self.pending.take().ok_or(RemoteError::NoActiveWrite)?;
        let hooks = {
            let mut state = self.fs.begin(format!("{} {path}", if complete { "226" } else { "ABOR" }))?;
            if complete && let Some(&fault) = state.end_faults.get(&path) {
                if fault == Fault::Lost {
                    state.lost = true;
                }
                return Err(fault.to_error(&path));
            }
            state.files.insert(path.clone(), data);
            if !complete {
                return Ok(());
            }
            state.completed_writes += 1;
            state.write_hooks.get(&path).cloned().unwrap_or_default()
        };
        for hook in hooks {
            hook();
        }
        Ok(())
    }
}

impl RemoteFs for MemorySession {
    fn authenticate<'a>(
        &'a mut self,
        username: &'a str,
        password: &'a str,
    ) -> RemoteFuture<'a, ()> {
        Box::pin(ready(self.login(username, password)))
    }

    fn set_transfer_mode(&mut self, passive: bool) -> RemoteFuture<'_, ()> {
        let mode = if passive { "PASV" } else { "PORT" };
        let result = self.command(format!("MODE {mode}")).map(|_| ());
        Box::pin(ready(result))
    }

    fn change_directory<'a>(&'a mut self, path: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(ready(self.enter(path)))
    }

    fn list_entry_names<'a>(&'a mut self, path: &'a str) -> RemoteFuture<'a, Vec<String>> {
        Box::pin(ready(self.list(path)))
    }

    fn is_directory<'a>(&'a mut self, path: &'a str, name: &'a str) -> RemoteFuture<'a, bool> {
        Box::pin(ready(self.is_dir(path, name)))
    }

    fn file_exists<'a>(&'a mut self, path: &'a str, name: &'a str) -> RemoteFuture<'a, bool> {
        Box::pin(ready(self.exists(path, name)))
    }

    fn file_size<'a>(
        &'a mut self,
        path: &'a str,
        name: &'a str,
    ) -> RemoteFuture<'a, Option<u64>> {
        Box::pin(ready(self.size(path, name)))
    }

    fn write_begin<'a>(&'a mut self, path: &'a str, name: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(ready(self.begin_write(path, name)))
    }

    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> RemoteFuture<'a, ()> {
        Box::pin(ready(self.append(data)))
    }

    fn write_end(&mut self) -> RemoteFuture<'_, ()> {
        Box::pin(ready(self.finish_write(true)))
    }

    fn write_abort(&mut self) -> RemoteFuture<'_, ()> {
        Box::pin(ready(self.finish_write(false)))
    }

    fn ping(&mut self) -> RemoteFuture<'_, ()> {
        let result = self.command("NOOP".into()).map(|_| ());
        Box::pin(ready(result))
    }

    fn close(&mut self) -> RemoteFuture<'_, ()> {
        self.pending = None;
        self.fs.lock().commands.push("QUIT".into());
        Box::pin(ready(Ok(())))
    }
}
