//! Data-connection setup for passive (PASV) and active (PORT) modes.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::LazyLock;
use std::time::Duration;

use dumpdeploy_protocol::RemoteError;
use regex::Regex;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use crate::codec::FtpCodec;

static PASV_ADDR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((\d+),(\d+),(\d+),(\d+),(\d+),(\d+)\)").expect("valid PASV pattern")
});

/// A data connection that is negotiated but possibly not yet connected.
///
/// In active mode the server only connects after the transfer command
/// has been sent, so [`DataChannel::establish`] must run after it.
pub(crate) enum DataChannel {
    Passive(TcpStream),
    Active(TcpListener),
}

impl DataChannel {
    /// Negotiates a data connection on the control channel.
    ///
    /// `peer` is the control connection's remote address; it replaces
    /// an unroutable PASV address. `local` is where PORT listens.
    pub async fn open(
        codec: &mut FtpCodec,
        passive: bool,
        peer: IpAddr,
        local: IpAddr,
    ) -> Result<Self, RemoteError> {
        if passive {
            open_pasv(codec, peer).await.map(Self::Passive)
        } else {
            open_port(codec, local).await.map(Self::Active)
        }
    }

    pub async fn establish(self, limit: Duration) -> Result<TcpStream, RemoteError> {
        match self {
            Self::Passive(stream) => Ok(stream),
            Self::Active(listener) => {
                let (stream, _) = timeout(limit, listener.accept())
                    .await
                    .map_err(|_| RemoteError::Timeout("waiting for active data connection".into()))?
                    .map_err(|e| RemoteError::Transfer(format!("PORT accept: {e}")))?;
                Ok(stream)
            }
        }
    }
}

async fn open_pasv(codec: &mut FtpCodec, peer: IpAddr) -> Result<TcpStream, RemoteError> {
    let reply = codec.expect_ok("PASV").await?;
    let mut addr = parse_pasv(&reply.lines.join(" "))?;
    if addr.ip().is_unspecified() || addr.ip().is_loopback() != peer.is_loopback() {
        addr.set_ip(peer);
    }
    let stream = timeout(codec.timeout(), TcpStream::connect(addr))
        .await
        .map_err(|_| RemoteError::Timeout(format!("PASV data connect to {addr}")))?
        .map_err(|e| RemoteError::Transfer(format!("PASV data connect to {addr}: {e}")))?;
    Ok(stream)
}

async fn open_port(codec: &mut FtpCodec, local: IpAddr) -> Result<TcpListener, RemoteError> {
    let IpAddr::V4(ip) = local else {
        return Err(RemoteError::Protocol("PORT requires an IPv4 control connection".into()));
    };
    let listener = TcpListener::bind(SocketAddr::new(local, 0))
        .await
        .map_err(|e| RemoteError::Transfer(format!("PORT bind: {e}")))?;
    let port = listener
        .local_addr()
        .map_err(|e| RemoteError::Transfer(format!("PORT local_addr: {e}")))?
        .port();
    codec.expect_ok(&port_command(ip, port)).await?;
    Ok(listener)
}

/// Parses `(h1,h2,h3,h4,p1,p2)` from a 227 reply.
fn parse_pasv(text: &str) -> Result<SocketAddr, RemoteError> {
    let caps = PASV_ADDR
        .captures(text)
        .ok_or_else(|| RemoteError::Protocol(format!("cannot parse PASV reply: {text}")))?;
    let mut nums = [0u8; 6];
    for (i, slot) in nums.iter_mut().enumerate() {
        *slot = caps[i + 1]
            .parse()
            .map_err(|_| RemoteError::Protocol("PASV number out of range".into()))?;
    }
    let ip = Ipv4Addr::new(nums[0], nums[1], nums[2], nums[3]);
    let port = u16::from(nums[4]) * 256 + u16::from(nums[5]);
    Ok(SocketAddr::new(IpAddr::V4(ip), port))
}

fn port_command(ip: Ipv4Addr, port: u16) -> String {
    let [a, b, c, d] = ip.octets();
    format!("PORT {a},{b},{c},{d},{},{}", port / 256, port % 256)
}
