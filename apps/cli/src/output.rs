//! Human-readable output.

use std::io::Write;
use std::path::Path;

use dumpdeploy_deploy::{BatchEvent, BatchReport, BatchState, BatchSummary};
use dumpdeploy_discovery::ScanReport;
use dumpdeploy_local::Volume;
use dumpdeploy_settings::AppSettings;

pub fn print_scan(report: &ScanReport) {
    if report.is_empty() {
        println!("No targets found.");
    } else {
        println!("Found {} target(s):", report.len());
        for target in &report.targets {
            println!(
                "  {:<28} {:<13} {}",
                target.label(),
                target.status.to_string(),
                target.path
            );
        }
    }
    if !report.root_errors.is_empty() {
        println!("Roots that could not be scanned:");
        for err in &report.root_errors {
            println!("  {} ({}): {}", err.path, err.location, err.message);
        }
    }
}

pub fn print_volumes(volumes: &[Volume]) {
    if volumes.is_empty() {
        println!("No mounted volumes found.");
        return;
    }
    for volume in volumes {
        println!(
            "  {:<24} {:<10} {}{}",
            volume.label,
            if volume.removable { "removable" } else { "fixed" },
            volume.path.display(),
            if volume.has_target_dirs() { "  (has targets)" } else { "" }
        );
    }
}

pub fn print_settings(path: &Path, settings: &AppSettings) -> anyhow::Result<()> {
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(settings)?);
    Ok(())
}

pub fn print_event(event: &BatchEvent) {
    match event {
        BatchEvent::Started { targets, .. } => println!("Deploying to {targets} target(s)"),
        BatchEvent::TargetStarted { index, total, path } => {
            println!("[{}/{}] {}", index + 1, total, path);
        }
        BatchEvent::Progress(p) => {
            let eta = p
                .eta
                .map(|eta| format!("{}s left", eta.as_secs()))
                .unwrap_or_default();
            eprint!(
                "\r  {:<10} {:>5.1}%  {}/s  {:<10}",
                p.artifact.to_string(),
                p.percent,
                format_bytes(p.bytes_per_second as u64),
                eta
            );
            let _ = std::io::stderr().flush();
        }
        BatchEvent::TargetFinished { result, .. } => {
            eprintln!();
            match &result.error {
                None => println!("  ok ({})", format_bytes(result.bytes_transferred)),
                Some(error) => println!("  FAILED: {error}"),
            }
        }
        BatchEvent::Finished { .. } => {}
    }
}

pub fn print_summary(report: &BatchReport, summary: &BatchSummary) {
    println!("{summary}");
    for failure in &summary.failures {
        println!("  {}: {}", failure.path, failure.error);
    }
    match report.state {
        BatchState::Cancelled => println!("Cancelled; remaining targets were not attempted."),
        _ if report.is_halted() => {
            println!("Stopped early: the connection was lost.");
        }
        _ => {}
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_scaled() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
