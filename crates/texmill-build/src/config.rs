use crate::artifacts::{ArtifactKind, parse_requirements};
use crate::error::{BuildError, Result};
use crate::job::DEFAULT_MAX_ROUNDS;
use crate::tools::SystemProbe;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the configuration file looked up next to the main document.
pub const CONFIG_FILE_NAME: &str = "texmill.json";

/// Persistent build settings.
///
/// ```json
/// {
///   "max_rounds": 10,
///   "process_timeout_secs": 300,
///   "tools": { "pdflatex": "/opt/texlive/bin/pdflatex" },
///   "require": ["bibliography", "eps"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub max_rounds: u32,
    pub process_timeout_secs: Option<u64>,
    /// Executable name to path, consulted before `PATH`.
    pub tools: BTreeMap<String, PathBuf>,
    /// Requirement strings applied to every build.
    pub require: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            process_timeout_secs: None,
            tools: BTreeMap::new(),
            require: Vec::new(),
        }
    }
}

impl BuildConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| BuildError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `path` if given, else `texmill.json` beside `document` if present,
    /// else the defaults.
    pub fn discover(path: Option<&Path>, document: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = document
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|source| BuildError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, content).map_err(|source| BuildError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout_secs.map(Duration::from_secs)
    }

    /// Configured requirements merged with `extra`.
    pub fn requirements<I, S>(&self, extra: I) -> Result<BTreeSet<ArtifactKind>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kinds = parse_requirements(&self.require)?;
        kinds.extend(parse_requirements(extra)?);
        Ok(kinds)
    }

    pub fn probe(&self) -> SystemProbe {
        SystemProbe::with_overrides(self.tools.clone())
    }
}
