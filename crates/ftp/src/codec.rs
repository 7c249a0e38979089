//! Control-connection codec: CRLF commands out, 3-digit replies in.
//!
//! Every read and write is bounded by the session timeout. A closed or
//! broken control connection is reported as [`RemoteError::Lost`].
//!
//! A reply that did not arrive in time is still owed by the server. The
//! codec counts owed replies and discards them before the next command
//! goes out, so a late `226` is never read as the answer to a later
//! command. If an owed reply does not show up within one more timeout,
//! the control channel is out of step for good and the session is lost.

use std::borrow::Cow;
use std::time::Duration;

use dumpdeploy_protocol::RemoteError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

use crate::reply::Reply;

pub(crate) struct FtpCodec {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
    /// Bytes of a reply line read before a timeout fired.
    partial: Vec<u8>,
    /// Final replies the server still has to send.
    owed: usize,
}

impl FtpCodec {
    pub fn new(stream: TcpStream, timeout: Duration) -> Self {
        let (rd, wr) = stream.into_split();
        Self {
            reader: BufReader::new(rd),
            writer: wr,
            timeout,
            partial: Vec::new(),
            owed: 0,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Records that a transfer was abandoned after its `1xx` reply, so
    /// its final reply is still on the way.
    pub fn owe_reply(&mut self) {
        self.owed += 1;
    }

    pub async fn send_command(&mut self, cmd: &str) -> Result<(), RemoteError> {
        self.resync().await?;
        let line = format!("{cmd}\r\n");
        match timeout(self.timeout, self.writer.write_all(line.as_bytes())).await {
            // Part of the line may be on the wire already.
            Err(_) => Err(RemoteError::Lost(format!("timed out sending {}", verb(cmd)))),
            Ok(Err(e)) => Err(RemoteError::Lost(format!("control write failed: {e}"))),
            Ok(Ok(())) => {
                tracing::trace!(">>> {}", redact(cmd));
                Ok(())
            }
        }
    }

    /// Discards every owed reply before a new command is sent.
    async fn resync(&mut self) -> Result<(), RemoteError> {
        while self.owed > 0 {
            let reply = self.next_reply().await.map_err(|e| match e {
                RemoteError::Timeout(_) => {
                    RemoteError::Lost("control channel out of step: late reply never came".into())
                }
                other => other,
            })?;
            tracing::debug!("discarded late reply {} {}", reply.code, reply.message());
            if !reply.is_preliminary() {
                self.owed -= 1;
            }
        }
        Ok(())
    }

    /// Reads one CRLF line. Bytes read before a timeout are kept for the
    /// next call.
    async fn read_line(&mut self) -> Result<String, RemoteError> {
        let n = match timeout(self.timeout, self.reader.read_until(b'\n', &mut self.partial)).await
        {
            Err(_) => return Err(RemoteError::Timeout("waiting for server reply".into())),
            Ok(Err(e)) => return Err(RemoteError::Lost(format!("control read failed: {e}"))),
            Ok(Ok(n)) => n,
        };
        if n == 0 {
            return Err(RemoteError::Lost("server closed connection".into()));
        }
        let raw = std::mem::take(&mut self.partial);
        Ok(String::from_utf8_lossy(&raw)
            .trim_end_matches(['\r', '\n'])
            .to_string())
    }

    /// Reads one reply, following `NNN-` continuation lines until `NNN `.
    ///
    /// A timeout before the reply starts leaves it owed; the caller gets
    /// [`RemoteError::Timeout`] and the session stays usable.
    pub async fn read_reply(&mut self) -> Result<Reply, RemoteError> {
        match self.next_reply().await {
            Err(RemoteError::Timeout(msg)) => {
                self.owed += 1;
                Err(RemoteError::Timeout(msg))
            }
            other => other,
        }
    }

    async fn next_reply(&mut self) -> Result<Reply, RemoteError> {
        let first = self.read_line().await?;
        let code = parse_code(&first)?;
        let mut lines = vec![first];

        if lines[0].as_bytes().get(3) == Some(&b'-') {
            let terminator = format!("{code} ");
            loop {
                let next = self.read_line().await.map_err(|e| match e {
                    RemoteError::Timeout(_) => RemoteError::Lost("reply cut off".into()),
                    other => other,
                })?;
                let done = next.starts_with(&terminator) || next == code.to_string();
                lines.push(next);
                if done {
                    break;
                }
            }
        }

        let reply = Reply { code, lines };
        tracing::trace!("<<< {} {}", reply.code, reply.message());
        Ok(reply)
    }

    pub async fn execute(&mut self, cmd: &str) -> Result<Reply, RemoteError> {
        self.send_command(cmd).await?;
        self.read_reply().await
    }

    /// Sends `cmd` and requires a 2xx reply.
    pub async fn expect_ok(&mut self, cmd: &str) -> Result<Reply, RemoteError> {
        let reply = self.execute(cmd).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        Ok(reply)
    }
}

fn parse_code(line: &str) -> Result<u16, RemoteError> {
    line.get(..3)
        .and_then(|digits| digits.parse::<u16>().ok())
        .filter(|code| (100..600).contains(code))
        .ok_or_else(|| RemoteError::Protocol(format!("malformed reply: '{line}'")))
}

fn verb(cmd: &str) -> &str {
    cmd.split_whitespace().next().unwrap_or(cmd)
}

/// Hides the argument of `PASS` in logs.
fn redact(cmd: &str) -> Cow<'_, str> {
    if verb(cmd).eq_ignore_ascii_case("PASS") {
        Cow::Borrowed("PASS ****")
    } else {
        Cow::Borrowed(cmd)
    }
}
