//! Scan and deploy against a directory standing in for a mounted volume.

use std::path::Path;
use std::sync::Arc;

use dumpdeploy_deploy::{BatchState, BatchUploader};
use dumpdeploy_discovery::DirectoryScanner;
use dumpdeploy_local::LocalConnector;
use dumpdeploy_protocol::{InstallationStatus, Location, local_volume_roots};
use dumpdeploy_session::{SessionConfig, SessionError, SessionManager};
use dumpdeploy_transfer::{ArtifactPair, ArtifactSource, OfficialFingerprint, ProgressChannel};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const ELF_LEN: usize = 5000;
const JS: &[u8] = b"const payload = 'dump_runner';\n";

fn volume() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for game in ["homebrew/G1", "homebrew/G2", "etaHEN/games/G3"] {
        std::fs::create_dir_all(dir.path().join(game)).unwrap();
    }
    std::fs::write(dir.path().join("homebrew/G1/eboot.bin"), b"eboot").unwrap();
    std::fs::write(dir.path().join("homebrew/readme.txt"), b"hi").unwrap();
    dir
}

fn pair(dir: &Path) -> ArtifactPair {
    let elf = dir.join("dump_runner.elf");
    let js = dir.join("homebrew.js");
    std::fs::write(&elf, vec![0x7f; ELF_LEN]).unwrap();
    std::fs::write(&js, JS).unwrap();
    ArtifactPair::new(&elf, &js, "v1.3.0", ArtifactSource::LocalCustom).unwrap()
}

async fn connected(root: &Path) -> SessionManager {
    let session = SessionManager::new(Arc::new(LocalConnector::new(root)));
    session
        .connect(&SessionConfig::new("local"), "")
        .await
        .unwrap();
    session
}

fn scanner() -> DirectoryScanner {
    DirectoryScanner::new().with_roots(local_volume_roots())
}

#[tokio::test]
async fn scan_then_deploy_to_every_local_target() {
    let vol = volume();
    let artifacts = tempfile::tempdir().unwrap();
    let pair = pair(artifacts.path());
    let session = connected(vol.path()).await;

    let report = scanner().scan(&session).await.unwrap();
    let paths: Vec<_> = report.targets.iter().map(|t| t.path.as_str()).collect();
    assert_eq!(paths, vec!["/homebrew/G1", "/homebrew/G2", "/etaHEN/games/G3"]);
    assert!(report.targets.iter().all(|t| t.location == Location::LocalVolume));
    assert!(report.root_errors.is_empty());

    let (events, _rx) = ProgressChannel::new(1024);
    let batch = BatchUploader::new()
        .with_chunk_size(1024)
        .run(&session, report.targets.clone(), pair.clone(), &events, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(batch.state, BatchState::Completed);
    assert!(batch.summary().all_succeeded());

    for game in ["homebrew/G1", "homebrew/G2", "etaHEN/games/G3"] {
        let elf = std::fs::read(vol.path().join(game).join("dump_runner.elf")).unwrap();
        assert_eq!(elf.len(), ELF_LEN);
        let js = std::fs::read(vol.path().join(game).join("homebrew.js")).unwrap();
        assert_eq!(js, JS);
    }

    let official = OfficialFingerprint::from_pair(&pair).unwrap();
    let rescanned = scanner()
        .with_fingerprint(Some(official))
        .scan(&session)
        .await
        .unwrap();
    assert!(
        rescanned
            .targets
            .iter()
            .all(|t| t.status == InstallationStatus::Official)
    );
}

#[tokio::test]
async fn vanished_target_fails_alone() {
    let vol = volume();
    let artifacts = tempfile::tempdir().unwrap();
    let session = connected(vol.path()).await;
    let report = scanner().scan(&session).await.unwrap();

    std::fs::remove_dir_all(vol.path().join("homebrew/G2")).unwrap();

    let (events, _rx) = ProgressChannel::new(1024);
    let batch = BatchUploader::new()
        .run(&session, report.targets, pair(artifacts.path()), &events, &CancellationToken::new())
        .await
        .unwrap();

    let outcome: Vec<_> = batch.results.iter().map(|r| r.success).collect();
    assert_eq!(outcome, vec![true, false, true]);
    assert!(!vol.path().join("homebrew/G2").exists());
    assert!(session.is_connected());
}

#[tokio::test]
async fn missing_volume_is_a_connection_failure() {
    let vol = tempfile::tempdir().unwrap();
    let session = SessionManager::new(Arc::new(LocalConnector::new(vol.path().join("usb0"))));

    let err = session
        .connect(&SessionConfig::new("local"), "")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::ConnectionFailure(_)), "{err}");
}
