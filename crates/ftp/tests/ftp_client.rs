//! FtpClient against an in-process FTP server.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dumpdeploy_ftp::FtpConnector;
use dumpdeploy_protocol::{Connector, RemoteError, RemoteFs};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const PASSWORD: &str = "secret";
const LIMIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct MockFs {
    dirs: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
    hang_up_on: Option<String>,
    /// Holds back the final reply of this verb for the given time.
    late_final: Option<(String, Duration)>,
}

impl MockFs {
    fn with_dirs(dirs: &[&str]) -> Self {
        let mut fs = Self::default();
        fs.dirs.insert("/".into());
        for dir in dirs {
            fs.dirs.insert(dir.to_string());
        }
        fs
    }

    fn children(&self, path: &str) -> Vec<String> {
        self.dirs
            .iter()
            .chain(self.files.keys())
            .filter(|p| p.as_str() != "/" && parent(p) == path)
            .map(|p| p.rsplit('/').next().unwrap_or_default().to_string())
            .collect()
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/".into() } else { trimmed.to_string() }
}

fn parent(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((p, _)) if !p.is_empty() => p.to_string(),
        _ => "/".into(),
    }
}

struct MockServer {
    addr: SocketAddr,
    fs: Arc<Mutex<MockFs>>,
}

impl MockServer {
    async fn start(fs: MockFs) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let fs = Arc::new(Mutex::new(fs));
        let shared = fs.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, shared.clone()));
            }
        });
        Self { addr, fs }
    }

    async fn connect(&self, passive: bool) -> Box<dyn RemoteFs> {
        self.connect_with_limit(passive, LIMIT).await
    }

    async fn connect_with_limit(&self, passive: bool, limit: Duration) -> Box<dyn RemoteFs> {
        let mut session = FtpConnector::new()
            .open("127.0.0.1", self.addr.port(), limit)
            .await
            .unwrap();
        session.authenticate("anonymous", PASSWORD).await.unwrap();
        session.set_transfer_mode(passive).await.unwrap();
        session
    }

    fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.fs.lock().unwrap().files.get(path).cloned()
    }
}

async fn open_data(pasv: &mut Option<TcpListener>, port: &mut Option<SocketAddr>) -> TcpStream {
    if let Some(listener) = pasv.take() {
        listener.accept().await.unwrap().0
    } else {
        TcpStream::connect(port.take().unwrap()).await.unwrap()
    }
}

async fn serve(stream: TcpStream, fs: Arc<Mutex<MockFs>>) {
    let (rd, mut wr) = stream.into_split();
    let mut lines = BufReader::new(rd).lines();
    let mut pasv: Option<TcpListener> = None;
    let mut port: Option<SocketAddr> = None;

    wr.write_all(b"220-Mock FTP\r\n220 Ready\r\n").await.unwrap();

    while let Ok(Some(line)) = lines.next_line().await {
        let (verb, arg) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let verb = verb.to_ascii_uppercase();
        if fs.lock().unwrap().hang_up_on.as_deref() == Some(verb.as_str()) {
            return;
        }
        let reply = match verb.as_str() {
            "USER" => "331 Password required".to_string(),
            "PASS" if arg == PASSWORD => "230 Logged in".to_string(),
            "PASS" => "530 Login incorrect".to_string(),
            "TYPE" => "200 Type set".to_string(),
            "NOOP" => "200 OK".to_string(),
            "PASV" => {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                let p = listener.local_addr().unwrap().port();
                pasv = Some(listener);
                format!("227 Entering Passive Mode (127,0,0,1,{},{})", p / 256, p % 256)
            }
            "PORT" => {
                let nums: Vec<u16> = arg.split(',').map(|n| n.parse().unwrap()).collect();
                let ip = format!("{}.{}.{}.{}", nums[0], nums[1], nums[2], nums[3]);
                port = Some(format!("{ip}:{}", nums[4] * 256 + nums[5]).parse().unwrap());
                "200 PORT command successful".to_string()
            }
            "CWD" => {
                if fs.lock().unwrap().dirs.contains(&normalize(arg)) {
                    "250 Directory changed".to_string()
                } else {
                    "550 No such directory".to_string()
                }
            }
            "SIZE" => match fs.lock().unwrap().files.get(&normalize(arg)) {
                Some(data) => format!("213 {}", data.len()),
                None => "550 No such file".to_string(),
            },
            "NLST" => {
                let path = normalize(arg);
                let names = {
                    let fs = fs.lock().unwrap();
                    fs.dirs.contains(&path).then(|| fs.children(&path))
                };
                match names {
                    None => {
                        pasv = None;
                        "550 No such directory".to_string()
                    }
                    Some(names) => {
                        wr.write_all(b"150 Opening data connection\r\n").await.unwrap();
                        let mut data = open_data(&mut pasv, &mut port).await;
                        let body: String = names.iter().map(|n| format!("{n}\r\n")).collect();
                        data.write_all(body.as_bytes()).await.unwrap();
                        drop(data);
                        "226 Transfer complete".to_string()
                    }
                }
            }
            "STOR" => {
                wr.write_all(b"150 Ok to send data\r\n").await.unwrap();
                let mut data = open_data(&mut pasv, &mut port).await;
                let mut body = Vec::new();
                data.read_to_end(&mut body).await.unwrap();
                let late = {
                    let mut fs = fs.lock().unwrap();
                    fs.files.insert(normalize(arg), body);
                    fs.late_final.clone()
                };
                if let Some((late_verb, delay)) = late
                    && late_verb == verb
                {
                    tokio::time::sleep(delay).await;
                }
                "226 Transfer complete".to_string()
            }
            "QUIT" => {
                let _ = wr.write_all(b"221 Goodbye\r\n").await;
                return;
            }
            _ => "502 Command not implemented".to_string(),
        };
        wr.write_all(format!("{reply}\r\n").as_bytes()).await.unwrap();
    }
}

fn console_tree() -> MockFs {
    let mut fs = MockFs::with_dirs(&["/data", "/data/homebrew", "/data/homebrew/PPSA01234"]);
    fs.files
        .insert("/data/homebrew/PPSA01234/eboot.bin".into(), vec![0u8; 16]);
    fs
}

#[tokio::test]
async fn passive_session_lists_probes_and_uploads() {
    let server = MockServer::start(console_tree()).await;
    let mut session = server.connect(true).await;

    session.change_directory("/data/homebrew/").await.unwrap();
    let names = session.list_entry_names("/data/homebrew/").await.unwrap();
    assert_eq!(names, vec!["PPSA01234"]);

    let target = "/data/homebrew/PPSA01234";
    assert!(session.is_directory("/data/homebrew/", "PPSA01234").await.unwrap());
    assert!(!session.is_directory(target, "eboot.bin").await.unwrap());
    assert!(!session.file_exists(target, "dump_runner.elf").await.unwrap());

    session.write_begin(target, "dump_runner.elf").await.unwrap();
    session.write_chunk(b"\x7fELF").await.unwrap();
    session.write_chunk(b" payload").await.unwrap();
    session.write_end().await.unwrap();

    assert!(session.file_exists(target, "dump_runner.elf").await.unwrap());
    assert_eq!(session.file_size(target, "dump_runner.elf").await.unwrap(), Some(12));
    assert_eq!(session.file_size(target, "homebrew.js").await.unwrap(), None);
    assert_eq!(
        server.file("/data/homebrew/PPSA01234/dump_runner.elf").unwrap(),
        b"\x7fELF payload"
    );
    session.close().await.unwrap();
}

#[tokio::test]
async fn active_mode_upload() {
    let server = MockServer::start(console_tree()).await;
    let mut session = server.connect(false).await;

    session
        .write_begin("/data/homebrew/PPSA01234", "homebrew.js")
        .await
        .unwrap();
    session.write_chunk(b"// config").await.unwrap();
    session.write_end().await.unwrap();

    assert_eq!(
        server.file("/data/homebrew/PPSA01234/homebrew.js").unwrap(),
        b"// config"
    );
    let names = session
        .list_entry_names("/data/homebrew/PPSA01234")
        .await
        .unwrap();
    assert!(names.contains(&"homebrew.js".to_string()));
}

#[tokio::test]
async fn aborted_upload_keeps_session_usable() {
    let server = MockServer::start(console_tree()).await;
    let mut session = server.connect(true).await;

    session
        .write_begin("/data/homebrew/PPSA01234", "dump_runner.elf")
        .await
        .unwrap();
    session.write_chunk(b"partial").await.unwrap();
    session.write_abort().await.unwrap();

    session.ping().await.unwrap();
    assert!(matches!(
        session.write_chunk(b"more").await,
        Err(RemoteError::NoActiveWrite)
    ));
}

#[tokio::test]
async fn missing_paths_are_unavailable() {
    let server = MockServer::start(console_tree()).await;
    let mut session = server.connect(true).await;

    let cwd = session.change_directory("/mnt/usb0/homebrew/").await;
    assert!(cwd.unwrap_err().is_unavailable());
    let list = session.list_entry_names("/mnt/usb0/homebrew/").await;
    assert!(list.unwrap_err().is_unavailable());

    // The session survives both refusals.
    session.ping().await.unwrap();
}

#[tokio::test]
async fn wrong_password_is_an_auth_error() {
    let server = MockServer::start(console_tree()).await;
    let mut session = FtpConnector::new()
        .open("127.0.0.1", server.addr.port(), LIMIT)
        .await
        .unwrap();
    let err = session.authenticate("anonymous", "guess").await.unwrap_err();
    assert!(matches!(err, RemoteError::Auth(_)));
}

#[tokio::test]
async fn dropped_control_connection_is_lost() {
    let mut fs = console_tree();
    fs.hang_up_on = Some("NOOP".into());
    let server = MockServer::start(fs).await;
    let mut session = server.connect(true).await;

    let err = session.ping().await.unwrap_err();
    assert!(err.is_session_fault(), "unexpected error: {err}");
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = FtpConnector::new().open("127.0.0.1", port, LIMIT).await;
    assert!(matches!(result, Err(RemoteError::Connect(_))));
}

#[tokio::test]
async fn late_transfer_reply_is_discarded_before_the_next_command() {
    let mut fs = console_tree();
    fs.late_final = Some(("STOR".into(), Duration::from_millis(450)));
    let server = MockServer::start(fs).await;
    let mut session = server
        .connect_with_limit(true, Duration::from_millis(300))
        .await;

    let target = "/data/homebrew/PPSA01234";
    session.write_begin(target, "dump_runner.elf").await.unwrap();
    session.write_chunk(b"\x7fELF").await.unwrap();
    let err = session.write_end().await.unwrap_err();
    assert!(matches!(err, RemoteError::Timeout(_)), "unexpected error: {err}");
    assert!(!err.is_session_fault());

    // Each command gets its own reply once the late 226 is swallowed.
    session.ping().await.unwrap();
    assert_eq!(session.file_size(target, "eboot.bin").await.unwrap(), Some(16));
    assert_eq!(session.file_size(target, "dump_runner.elf").await.unwrap(), Some(4));
    assert!(session.file_exists(target, "dump_runner.elf").await.unwrap());
}

#[tokio::test]
async fn transfer_reply_that_never_comes_loses_the_session() {
    let mut fs = console_tree();
    fs.late_final = Some(("STOR".into(), Duration::from_secs(5)));
    let server = MockServer::start(fs).await;
    let mut session = server
        .connect_with_limit(true, Duration::from_millis(200))
        .await;

    session
        .write_begin("/data/homebrew/PPSA01234", "homebrew.js")
        .await
        .unwrap();
    session.write_chunk(b"// config").await.unwrap();
    assert!(matches!(session.write_end().await, Err(RemoteError::Timeout(_))));

    let err = session.ping().await.unwrap_err();
    assert!(err.is_session_fault(), "unexpected error: {err}");
}
