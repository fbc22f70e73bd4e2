//! Process-wide engine flags (spec §6.3).
//!
//! Loaded the way the teacher runtime loads its actor manifest: a TOML file
//! deserialised with `serde`, with defaults for anything absent.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// `gcmode` (spec §4.5 / §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcMode {
    On,
    Off,
}

/// `gctrace` (spec §4.5 / §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GcTrace {
    Off,
    Terse,
    Verbose,
}

/// `current_compiling` (spec §6.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompilingMode {
    Unprofiled,
    Profiled,
}

/// The full set of process-wide engine flags named in spec §6.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineFlags {
    pub gcmode: GcMode,
    pub gctrace: GcTrace,
    /// Small-words margin reserved before a shift/GC is forced.
    pub gcmargin: usize,
    /// `current_radix`, 2..=36.
    pub current_radix: u32,
    pub current_prompt: String,
    /// `current_unknown`: `fail` or `error`, governing existence-error
    /// behaviour for undefined predicates.
    pub current_unknown: String,
    pub ferror_flag: String,
    pub quiet_flag: String,
    pub current_compiling: CompilingMode,
}

impl Default for EngineFlags {
    fn default() -> Self {
        EngineFlags {
            gcmode: GcMode::On,
            gctrace: GcTrace::Off,
            gcmargin: 4096,
            current_radix: 10,
            current_prompt: "?- ".to_string(),
            current_unknown: "error".to_string(),
            ferror_flag: "true".to_string(),
            quiet_flag: "off".to_string(),
            current_compiling: CompilingMode::Unprofiled,
        }
    }
}

impl EngineFlags {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let flags: EngineFlags = toml::from_str(&content)?;
        Ok(flags)
    }
}

/// The 7-tuple `version/7` primitive of spec §6.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub branch: String,
    pub commit_id: String,
    pub commit_date: String,
    pub commit_description: String,
}

impl VersionInfo {
    pub fn current() -> Self {
        VersionInfo {
            major: env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
            minor: env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
            patch: env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
            branch: option_env!("WAM_ENGINE_GIT_BRANCH").unwrap_or("unknown").to_string(),
            commit_id: option_env!("WAM_ENGINE_GIT_COMMIT").unwrap_or("unknown").to_string(),
            commit_date: option_env!("WAM_ENGINE_GIT_DATE").unwrap_or("unknown").to_string(),
            commit_description: option_env!("WAM_ENGINE_GIT_DESCRIBE")
                .unwrap_or("unknown")
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let flags = EngineFlags::default();
        assert_eq!(flags.current_radix, 10);
        assert!(matches!(flags.gcmode, GcMode::On));
        assert!(matches!(flags.gctrace, GcTrace::Off));
    }

    #[test]
    fn loads_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.toml");
        std::fs::write(&path, "current_radix = 16\ngcmode = \"off\"\n").unwrap();
        let flags = EngineFlags::from_file(&path).unwrap();
        assert_eq!(flags.current_radix, 16);
        assert!(matches!(flags.gcmode, GcMode::Off));
        // Unset fields still take their defaults.
        assert_eq!(flags.current_prompt, "?- ");
    }

    #[test]
    fn version_tracks_cargo_toml() {
        let v = VersionInfo::current();
        assert_eq!(v.major, 0);
        assert_eq!(v.minor, 1);
        assert_eq!(v.patch, 0);
    }
}
