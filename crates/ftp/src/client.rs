//! Stateful FTP client implementing [`RemoteFs`].
//!
//! Lifecycle: [`FtpConnector::open`] (TCP connect, 220 banner) →
//! `authenticate` (USER/PASS) → `set_transfer_mode` (TYPE I + data mode)
//! → commands → `close` (QUIT). Paths are always absolute, so the
//! server-side working directory is never relied on.

use std::net::IpAddr;
use std::time::Duration;

use dumpdeploy_protocol::{Connector, RemoteError, RemoteFs, RemoteFuture, join_remote_path};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::codec::FtpCodec;
use crate::data::DataChannel;
use crate::reply::is_unavailable_code;

/// Opens plain-TCP FTP control connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct FtpConnector;

impl FtpConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for FtpConnector {
    fn open<'a>(
        &'a self,
        host: &'a str,
        port: u16,
        limit: Duration,
    ) -> RemoteFuture<'a, Box<dyn RemoteFs>> {
        Box::pin(async move {
            let client = FtpClient::connect(host, port, limit).await?;
            Ok(Box::new(client) as Box<dyn RemoteFs>)
        })
    }
}

/// One FTP control connection plus the data stream of an open upload.
pub struct FtpClient {
    codec: FtpCodec,
    peer: IpAddr,
    local: IpAddr,
    passive: bool,
    upload: Option<TcpStream>,
}

impl FtpClient {
    /// Connects and consumes the welcome banner.
    pub async fn connect(host: &str, port: u16, limit: Duration) -> Result<Self, RemoteError> {
        let addr = format!("{host}:{port}");
        let tcp = timeout(limit, TcpStream::connect(&addr))
            .await
            .map_err(|_| RemoteError::Timeout(format!("TCP connect to {addr}")))?
            .map_err(|e| RemoteError::Connect(format!("TCP connect to {addr}: {e}")))?;
        tcp.set_nodelay(true).ok();
        let peer = tcp.peer_addr()?.ip();
        let local = tcp.local_addr()?.ip();

        let mut codec = FtpCodec::new(tcp, limit);
        let banner = codec.read_reply().await?;
        if !banner.is_success() {
            return Err(RemoteError::Connect(format!(
                "server refused session: {} {}",
                banner.code,
                banner.message()
            )));
        }
        tracing::debug!("connected to {addr}: {}", banner.message());

        Ok(Self {
            codec,
            peer,
            local,
            passive: true,
            upload: None,
        })
    }

    async fn login(&mut self, username: &str, password: &str) -> Result<(), RemoteError> {
        let user = self.codec.execute(&format!("USER {username}")).await?;
        if user.is_intermediate() {
            let pass = self.codec.execute(&format!("PASS {password}")).await?;
            if !pass.is_success() {
                return Err(RemoteError::Auth(format!("{} {}", pass.code, pass.message())));
            }
        } else if !user.is_success() {
            return Err(RemoteError::Auth(format!("{} {}", user.code, user.message())));
        }
        Ok(())
    }

    async fn cwd(&mut self, path: &str) -> Result<(), RemoteError> {
        let reply = self.codec.execute(&format!("CWD {path}")).await?;
        if reply.is_success() {
            Ok(())
        } else if is_unavailable_code(reply.code) {
            Err(RemoteError::Unavailable(format!("{path}: {}", reply.message())))
        } else {
            Err(reply.into_error())
        }
    }

    /// Runs a listing command and returns the raw data-connection body.
    async fn retrieve(&mut self, cmd: &str, path: &str) -> Result<Vec<u8>, RemoteError> {
        let channel = DataChannel::open(&mut self.codec, self.passive, self.peer, self.local).await?;
        let reply = self.codec.execute(cmd).await?;
        if reply.is_success() {
            return Ok(Vec::new());
        }
        if !reply.is_preliminary() {
            if is_unavailable_code(reply.code) {
                return Err(RemoteError::Unavailable(format!("{path}: {}", reply.message())));
            }
            return Err(reply.into_error());
        }

        let limit = self.codec.timeout();
        let body = match read_listing(channel, limit, path).await {
            Ok(body) => body,
            Err(e) => {
                self.codec.owe_reply();
                return Err(e);
            }
        };

        let done = self.codec.read_reply().await?;
        if !done.is_success() {
            return Err(done.into_error());
        }
        Ok(body)
    }

    async fn nlst(&mut self, path: &str) -> Result<Vec<String>, RemoteError> {
        let body = self.retrieve(&format!("NLST {path}"), path).await?;
        Ok(parse_names(&String::from_utf8_lossy(&body)))
    }

    async fn is_dir(&mut self, path: &str, name: &str) -> Result<bool, RemoteError> {
        match self.cwd(&join_remote_path(path, name)).await {
            Ok(()) => Ok(true),
            Err(RemoteError::Unavailable(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn exists(&mut self, path: &str, name: &str) -> Result<bool, RemoteError> {
        match self.nlst(path).await {
            Ok(names) => Ok(names.iter().any(|n| n == name)),
            Err(RemoteError::Unavailable(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn size(&mut self, path: &str, name: &str) -> Result<Option<u64>, RemoteError> {
        let full = join_remote_path(path, name);
        let reply = self.codec.execute(&format!("SIZE {full}")).await?;
        if reply.code == 213 {
            return Ok(reply.message().trim().parse::<u64>().ok());
        }
        if is_unavailable_code(reply.code) || reply.code == 500 || reply.code == 502 {
            return Ok(None);
        }
        Err(reply.into_error())
    }

    async fn begin_upload(&mut self, path: &str, name: &str) -> Result<(), RemoteError> {
        if self.upload.is_some() {
            return Err(RemoteError::Protocol("a write is already open".into()));
        }
        let full = join_remote_path(path, name);
        let channel = DataChannel::open(&mut self.codec, self.passive, self.peer, self.local).await?;
        let reply = self.codec.execute(&format!("STOR {full}")).await?;
        if !reply.is_preliminary() {
            return Err(reply.into_error());
        }
        match channel.establish(self.codec.timeout()).await {
            Ok(stream) => {
                self.upload = Some(stream);
                Ok(())
            }
            Err(e) => {
                self.codec.owe_reply();
                Err(e)
            }
        }
    }

    async fn send_chunk(&mut self, data: &[u8]) -> Result<(), RemoteError> {
        let limit = self.codec.timeout();
        let stream = self.upload.as_mut().ok_or(RemoteError::NoActiveWrite)?;
        timeout(limit, stream.write_all(data))
            .await
            .map_err(|_| RemoteError::Timeout("writing data chunk".into()))?
            .map_err(|e| RemoteError::Transfer(format!("data connection: {e}")))
    }

    async fn finish_upload(&mut self) -> Result<(), RemoteError> {
        let mut stream = self.upload.take().ok_or(RemoteError::NoActiveWrite)?;
        let limit = self.codec.timeout();
        let closed = timeout(limit, stream.shutdown())
            .await
            .map_err(|_| RemoteError::Timeout("closing data connection".into()))
            .and_then(|r| {
                r.map_err(|e| RemoteError::Transfer(format!("closing data connection: {e}")))
            });
        drop(stream);
        if let Err(e) = closed {
            self.codec.owe_reply();
            return Err(e);
        }

        let done = self.codec.read_reply().await?;
        if !done.is_success() {
            return Err(done.into_error());
        }
        Ok(())
    }

    /// Drops the data connection and consumes the server's final reply.
    async fn abort_upload(&mut self) -> Result<(), RemoteError> {
        let stream = self.upload.take().ok_or(RemoteError::NoActiveWrite)?;
        drop(stream);
        match self.codec.read_reply().await {
            Ok(reply) => {
                tracing::debug!("upload aborted: {} {}", reply.code, reply.message());
                Ok(())
            }
            Err(e) if e.is_session_fault() => Err(e),
            Err(e) => {
                tracing::debug!("no reply after aborted upload: {e}");
                Ok(())
            }
        }
    }

    async fn quit(&mut self) -> Result<(), RemoteError> {
        self.upload = None;
        if let Err(e) = self.codec.execute("QUIT").await {
            tracing::debug!("QUIT failed: {e}");
        }
        Ok(())
    }
}

async fn read_listing(
    channel: DataChannel,
    limit: Duration,
    path: &str,
) -> Result<Vec<u8>, RemoteError> {
    let mut stream = channel.establish(limit).await?;
    let mut body = Vec::new();
    timeout(limit, stream.read_to_end(&mut body))
        .await
        .map_err(|_| RemoteError::Timeout(format!("reading listing of {path}")))?
        .map_err(|e| RemoteError::Transfer(format!("listing of {path}: {e}")))?;
    Ok(body)
}

/// Splits an NLST body into entry names, keeping only the last segment.
fn parse_names(body: &str) -> Vec<String> {
    body.lines()
        .map(|line| line.trim_end_matches('\r').trim_end_matches('/'))
        .filter_map(|line| line.rsplit('/').next())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .map(str::to_string)
        .collect()
}

impl RemoteFs for FtpClient {
    fn authenticate<'a>(
        &'a mut self,
        username: &'a str,
        password: &'a str,
    ) -> RemoteFuture<'a, ()> {
        Box::pin(self.login(username, password))
    }

    fn set_transfer_mode(&mut self, passive: bool) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            self.passive = passive;
            self.codec.expect_ok("TYPE I").await?;
            Ok(())
        })
    }

    fn change_directory<'a>(&'a mut self, path: &'a str) -> RemoteFuture<'a, ()> {
        Box::pin(self.cwd(path))
    }

    fn list_entry_names<'a>(&'a mut self, path: &'a str) -> RemoteFuture<'a, Vec<String>> {
        Box::pin(self.nlst(path))
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
        Box::pin(self.begin_upload(path, name))
    }

    fn write_chunk<'a>(&'a mut self, data: &'a [u8]) -> RemoteFuture<'a, ()> {
        Box::pin(self.send_chunk(data))
    }

    fn write_end(&mut self) -> RemoteFuture<'_, ()> {
        Box::pin(self.finish_upload())
    }

    fn write_abort(&mut self) -> RemoteFuture<'_, ()> {
        Box::pin(self.abort_upload())
    }

    fn ping(&mut self) -> RemoteFuture<'_, ()> {
        Box::pin(async move {
            self.codec.expect_ok("NOOP").await?;
            Ok(())
        })
    }

    fn close(&mut self) -> RemoteFuture<'_, ()> {
        Box::pin(self.quit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nlst_names_keep_last_segment() {
        let body = "/data/homebrew/PPSA01234\r\nCUSA00001/\r\n.\r\n..\r\n\r\nhomebrew.js\r\n";
        assert_eq!(parse_names(body), vec!["PPSA01234", "CUSA00001", "homebrew.js"]);
    }
}
