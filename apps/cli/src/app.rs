//! Wires settings, session, scanner and uploader together.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Utc;
use tracing::{info, warn};

use dumpdeploy_deploy::{BatchEvent, BatchUploader};
use dumpdeploy_discovery::{DirectoryScanner, ScanReport};
use dumpdeploy_ftp::FtpConnector;
use dumpdeploy_local::{LocalConnector, available_volumes};
use dumpdeploy_protocol::{Target, local_volume_roots};
use dumpdeploy_session::{CredentialStore, EnvCredentialStore, SessionConfig, SessionManager};
use dumpdeploy_settings::{AppSettings, SettingsStore};
use dumpdeploy_transfer::{
    ArtifactPair, ArtifactSource, LocalReleaseResolver, OfficialFingerprint, ReleaseResolver,
};

use crate::args::{Args, Command, DeployArgs, SettingsAction};
use crate::output;

/// Runs one command and returns the process exit code.
pub async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let store = match &args.settings_file {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::open_default()?,
    };
    let mut settings = store.load();

    match &args.command {
        Command::Settings { action } => {
            settings_command(&store, settings, action.as_ref())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Volumes => {
            output::print_volumes(&available_volumes());
            Ok(ExitCode::SUCCESS)
        }
        Command::Scan => {
            let session = connect(&args, &store, &mut settings).await?;
            let result = scanner(&args, &settings).scan(&session).await;
            session.disconnect().await;
            output::print_scan(&result?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Deploy(deploy_args) => {
            let resolver =
                LocalReleaseResolver::new(&deploy_args.executable, &deploy_args.config);
            let pair = resolver.resolve(deploy_args.version.as_deref()).await?;

            let session = connect(&args, &store, &mut settings).await?;
            let scanner = scanner(&args, &settings);
            let result = deploy(&session, &scanner, &settings, deploy_args, pair).await;
            session.disconnect().await;
            result
        }
    }
}

fn settings_command(
    store: &SettingsStore,
    mut settings: AppSettings,
    action: Option<&SettingsAction>,
) -> anyhow::Result<()> {
    match action {
        None | Some(SettingsAction::Show) => {}
        Some(SettingsAction::Reset) => {
            settings = store.reset()?;
            info!(path = %store.path().display(), "settings reset");
        }
        Some(SettingsAction::Official {
            executable,
            config,
            version,
        }) => {
            let pair = ArtifactPair::new(executable, config, version, ArtifactSource::Remote)?;
            let fingerprint = OfficialFingerprint::from_pair(&pair)?;
            info!(
                version = %fingerprint.version,
                executable_size = fingerprint.executable_size,
                config_size = fingerprint.config_size,
                "official fingerprint recorded"
            );
            settings.official = Some(fingerprint);
            store.save(&settings)?;
        }
    }
    output::print_settings(store.path(), &settings)
}

/// Session parameters from the saved settings with command-line overrides.
fn session_config(args: &Args, settings: &AppSettings) -> SessionConfig {
    let mut config = settings.to_session_config();
    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(user) = &args.user {
        config.username = user.clone();
    }
    if args.active {
        config.passive = false;
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    config
}

async fn connect(
    args: &Args,
    store: &SettingsStore,
    settings: &mut AppSettings,
) -> anyhow::Result<SessionManager> {
    if let Some(volume) = &args.local {
        return connect_local(volume).await;
    }
    let config = session_config(args, settings);
    if config.host.is_empty() {
        bail!("no host configured; pass --host");
    }
    let password = EnvCredentialStore::default()
        .get_password(&config.host, &config.username)
        .unwrap_or_default();

    let session = SessionManager::new(Arc::new(FtpConnector::new()));
    session
        .connect(&config, &password)
        .await
        .with_context(|| format!("connecting to {}:{}", config.host, config.port))?;

    settings.record_connection(&config, Utc::now());
    if let Err(e) = store.save(settings) {
        warn!(error = %e, "could not save settings");
    }
    Ok(session)
}

/// Opens a session on a mounted volume. Nothing is saved to settings.
async fn connect_local(volume: &Path) -> anyhow::Result<SessionManager> {
    let session = SessionManager::new(Arc::new(LocalConnector::new(volume)));
    session
        .connect(&SessionConfig::new("local"), "")
        .await
        .with_context(|| format!("opening volume {}", volume.display()))?;
    info!(volume = %volume.display(), "using local volume");
    Ok(session)
}

/// The console's candidate roots, or the target directories of the
/// volume given with `--local`.
fn scanner(args: &Args, settings: &AppSettings) -> DirectoryScanner {
    let scanner = DirectoryScanner::new().with_fingerprint(settings.official.clone());
    if args.local.is_some() {
        scanner.with_roots(local_volume_roots())
    } else {
        scanner
    }
}

async fn deploy(
    session: &SessionManager,
    scanner: &DirectoryScanner,
    settings: &AppSettings,
    args: &DeployArgs,
    pair: ArtifactPair,
) -> anyhow::Result<ExitCode> {
    let report = scanner.scan(session).await?;
    let (targets, skipped) = select_targets(&report, &args.targets, args.all, args.overwrite)?;
    for target in &skipped {
        info!(label = %target.label(), status = %target.status, "already installed, skipped");
    }
    if targets.is_empty() {
        println!("Nothing to deploy ({} installed target(s) skipped).", skipped.len());
        return Ok(ExitCode::SUCCESS);
    }

    let chunk_size = args
        .chunk_size
        .unwrap_or_else(|| settings.effective_chunk_size());
    let uploader = BatchUploader::new().with_chunk_size(chunk_size);
    let mut handle = uploader.submit(session, targets, pair)?;
    let Some(mut events) = handle.take_events() else {
        bail!("batch events already taken");
    };

    let mut cancelling = false;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if args.json {
                    println!("{}", serde_json::to_string(&event)?);
                } else {
                    output::print_event(&event);
                }
                if matches!(event, BatchEvent::Finished { .. }) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancelling => {
                warn!("interrupt received, cancelling after the current chunk");
                handle.cancel();
                cancelling = true;
            }
        }
    }

    let report = handle.wait().await?;
    let summary = report.summary();
    if args.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        output::print_summary(&report, &summary);
    }

    if summary.all_succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Chooses targets from a scan: explicit paths or all of them, minus
/// already installed ones unless `overwrite` is set.
///
/// Returns `(selected, skipped)`.
fn select_targets(
    report: &ScanReport,
    paths: &[String],
    all: bool,
    overwrite: bool,
) -> anyhow::Result<(Vec<Target>, Vec<Target>)> {
    let chosen: Vec<Target> = if all {
        report.targets.clone()
    } else if paths.is_empty() {
        bail!("choose targets with --target PATH or --all");
    } else {
        paths
            .iter()
            .map(|path| {
                report
                    .find(path)
                    .cloned()
                    .with_context(|| format!("target {path} was not found by the scan"))
            })
            .collect::<anyhow::Result<_>>()?
    };

    if overwrite {
        return Ok((chosen, Vec::new()));
    }
    Ok(chosen.into_iter().partition(|t| !t.status.is_installed()))
}
