//! Wave manifest loader (spec.md §3 WaveManifest, §6 manifest file, §9
//! "manifest loading via reflection" redesign).
//!
//! Manifests are plain TOML, one file per wave, deserialized into a
//! versioned struct. Unknown fields are ignored with a `tracing::warn!`
//! rather than a hard error, mirroring the teacher's tolerant migration
//! loading in `storage::migrations`.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::wave::trigger::TriggerCondition;

/// Concurrency class a wave is scheduled under (spec.md §4.3, glossary "lane").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Fast,
    Default,
    Heavy,
}

impl Default for Lane {
    fn default() -> Self {
        Lane::Default
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaneSpec {
    pub name: Lane,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default)]
    pub priority: i32,
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for LaneSpec {
    fn default() -> Self {
        Self {
            name: Lane::Default,
            max_concurrency: default_max_concurrency(),
            priority: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmittedSignal {
    pub key: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Inclusive confidence range `[min, max]` this key is contractually
    /// emitted within.
    #[serde(default)]
    pub confidence_range: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Emits {
    #[serde(default)]
    pub on_start: Vec<String>,
    #[serde(default)]
    pub on_complete: Vec<EmittedSignal>,
    #[serde(default)]
    pub on_failure: Vec<String>,
    #[serde(default)]
    pub conditional: Vec<EmittedSignal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Listens {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSpec {
    #[serde(default)]
    pub emits: Vec<String>,
    #[serde(default)]
    pub uses: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigBinding {
    pub config_key: String,
    #[serde(default)]
    pub skip_if_false: bool,
}

/// Declarative per-wave configuration (spec.md §3 WaveManifest, §6 manifest file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveManifest {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub triggers: Vec<TriggerCondition>,
    #[serde(default)]
    pub emits: Emits,
    #[serde(default)]
    pub listens: Listens,
    #[serde(default)]
    pub cache: CacheSpec,
    #[serde(default)]
    pub config_bindings: Vec<ConfigBinding>,
    #[serde(default)]
    pub lane: LaneSpec,
    #[serde(default)]
    pub escalation_text_extraction: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_trigger_timeout_ms")]
    pub trigger_timeout_ms: u64,
    #[serde(default = "default_execution_timeout_ms")]
    pub execution_timeout_ms: u64,
    #[serde(default)]
    pub is_optional: bool,
    #[serde(default)]
    pub parameters: HashMap<String, toml::Value>,
}

fn default_true() -> bool {
    true
}

fn default_trigger_timeout_ms() -> u64 {
    50
}

fn default_execution_timeout_ms() -> u64 {
    2_000
}

/// The full set of manifests loaded at init, already validated acyclic.
#[derive(Debug, Clone, Default)]
pub struct WaveManifestSet {
    manifests: HashMap<String, WaveManifest>,
}

impl WaveManifestSet {
    pub fn from_manifests(manifests: Vec<WaveManifest>) -> Result<Self, ManifestError> {
        let mut set = HashMap::new();
        for manifest in manifests {
            set.insert(manifest.name.clone(), manifest);
        }
        let built = Self { manifests: set };
        built.check_acyclic()?;
        Ok(built)
    }

    /// Loads one manifest per `*.toml` file in `dir`. A file that fails to
    /// parse is skipped with a `tracing::warn!`, not a hard failure -
    /// matching the teacher's tolerance for unknown/malformed auxiliary data.
    pub fn load_dir(dir: &Path) -> Result<Self, ManifestError> {
        let mut manifests = Vec::new();
        let entries = std::fs::read_dir(dir).map_err(|source| ManifestError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| ManifestError::Io {
                path: dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let contents = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable wave manifest");
                    continue;
                }
            };
            match toml::from_str::<WaveManifest>(&contents) {
                Ok(manifest) => manifests.push(manifest),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping malformed wave manifest");
                }
            }
        }
        Self::from_manifests(manifests)
    }

    pub fn get(&self, name: &str) -> Option<&WaveManifest> {
        self.manifests.get(name)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &WaveManifest> {
        self.manifests.values().filter(|m| m.enabled)
    }

    /// Rejects manifest sets whose `listens.required` graph has a cycle
    /// (spec.md §4.3 step 2: "Cycles ⇒ reject at load time").
    fn check_acyclic(&self) -> Result<(), ManifestError> {
        #[derive(PartialEq, Clone, Copy)]
        enum Mark {
            Visiting,
            Done,
        }
        let mut marks: HashMap<&str, Mark> = HashMap::new();

        fn visit<'a>(
            name: &'a str,
            manifests: &'a HashMap<String, WaveManifest>,
            marks: &mut HashMap<&'a str, Mark>,
        ) -> Result<(), ManifestError> {
            match marks.get(name) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    return Err(ManifestError::CycleDetected {
                        wave: name.to_string(),
                    })
                }
                None => {}
            }
            marks.insert(name, Mark::Visiting);
            if let Some(manifest) = manifests.get(name) {
                // A required dependency is satisfied by whichever wave emits
                // it; we only have signal keys here, so conservatively treat
                // any other manifest claiming to emit that key as a parent.
                let required: HashSet<&str> =
                    manifest.listens.required.iter().map(|s| s.as_str()).collect();
                for other in manifests.values() {
                    if other.name == manifest.name {
                        continue;
                    }
                    let emits_required = other
                        .emits
                        .on_complete
                        .iter()
                        .any(|e| required.contains(e.key.as_str()));
                    if emits_required {
                        visit(&other.name, manifests, marks)?;
                    }
                }
            }
            marks.insert(name, Mark::Done);
            Ok(())
        }

        for name in self.manifests.keys() {
            visit(name, &self.manifests, &mut marks)?;
        }
        Ok(())
    }
}
