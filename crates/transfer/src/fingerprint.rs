//! Reference sizes of the last known official artifact pair and the
//! size-based installation classification built on them.

use serde::{Deserialize, Serialize};

use dumpdeploy_protocol::InstallationStatus;

use crate::{ArtifactPair, TransferError, calculate_file_checksum};

/// Exact sizes (and informational SHA-256) of an official release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfficialFingerprint {
    pub version: String,
    pub executable_size: u64,
    pub config_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_sha256: Option<String>,
}

impl OfficialFingerprint {
    /// Records the sizes and checksums of a local pair.
    pub fn from_pair(pair: &ArtifactPair) -> Result<Self, TransferError> {
        let (executable_size, config_size) = pair.sizes()?;
        Ok(Self {
            version: pair.version.clone(),
            executable_size,
            config_size,
            executable_sha256: Some(calculate_file_checksum(&pair.executable)?),
            config_sha256: Some(calculate_file_checksum(&pair.config)?),
        })
    }

    pub fn matches(&self, executable_size: u64, config_size: u64) -> bool {
        self.executable_size == executable_size && self.config_size == config_size
    }
}

/// What the probe found for one artifact in a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactProbe {
    Absent,
    /// Present; the size is `None` when the remote would not report it.
    Present(Option<u64>),
}

/// Classifies a target from what the probe found.
///
/// Best-effort: sizes are compared against the fingerprint, contents
/// never are.
pub fn classify_installation(
    executable: ArtifactProbe,
    config: ArtifactProbe,
    fingerprint: Option<&OfficialFingerprint>,
) -> InstallationStatus {
    use ArtifactProbe::{Absent, Present};

    match (executable, config, fingerprint) {
        (Absent, Absent, _) => InstallationStatus::NotInstalled,
        (Present(Some(exe)), Present(Some(cfg)), Some(fp)) => {
            if fp.matches(exe, cfg) {
                InstallationStatus::Official
            } else {
                InstallationStatus::Experimental
            }
        }
        _ => InstallationStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArtifactSource;

    fn fingerprint() -> OfficialFingerprint {
        OfficialFingerprint {
            version: "v1.0.0".into(),
            executable_size: 1000,
            config_size: 200,
            executable_sha256: None,
            config_sha256: None,
        }
    }

    #[test]
    fn neither_present_is_not_installed() {
        let status = classify_installation(ArtifactProbe::Absent, ArtifactProbe::Absent, None);
        assert_eq!(status, InstallationStatus::NotInstalled);
    }

    #[test]
    fn matching_sizes_are_official() {
        let fp = fingerprint();
        let status = classify_installation(
            ArtifactProbe::Present(Some(1000)),
            ArtifactProbe::Present(Some(200)),
            Some(&fp),
        );
        assert_eq!(status, InstallationStatus::Official);
    }

    #[test]
    fn differing_size_is_experimental() {
        let fp = fingerprint();
        let status = classify_installation(
            ArtifactProbe::Present(Some(1000)),
            ArtifactProbe::Present(Some(201)),
            Some(&fp),
        );
        assert_eq!(status, InstallationStatus::Experimental);
    }

    #[test]
    fn undecidable_cases_are_unknown() {
        let fp = fingerprint();
        let both = (ArtifactProbe::Present(Some(1000)), ArtifactProbe::Present(Some(200)));
        assert_eq!(classify_installation(both.0, both.1, None), InstallationStatus::Unknown);
        assert_eq!(
            classify_installation(ArtifactProbe::Present(None), both.1, Some(&fp)),
            InstallationStatus::Unknown
        );
        assert_eq!(
            classify_installation(both.0, ArtifactProbe::Absent, Some(&fp)),
            InstallationStatus::Unknown
        );
        assert_eq!(
            classify_installation(ArtifactProbe::Absent, both.1, Some(&fp)),
            InstallationStatus::Unknown
        );
    }

    #[test]
    fn fingerprint_from_local_pair() {
        let dir = tempfile::tempdir().unwrap();
        let elf = dir.path().join("dump_runner.elf");
        let js = dir.path().join("homebrew.js");
        std::fs::write(&elf, vec![7u8; 1000]).unwrap();
        std::fs::write(&js, vec![b'x'; 200]).unwrap();
        let pair = ArtifactPair::new(&elf, &js, "v1.0.0", ArtifactSource::Remote).unwrap();

        let fp = OfficialFingerprint::from_pair(&pair).unwrap();
        assert_eq!(fp.version, "v1.0.0");
        assert!(fp.matches(1000, 200));
        assert_eq!(fp.executable_sha256.as_deref().map(str::len), Some(64));

        let json = serde_json::to_string(&fp).unwrap();
        let back: OfficialFingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }
}
