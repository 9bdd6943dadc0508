//! Repository layout: `<slug>.toml` at the top level, outcome snippets under
//! `outcomes/<platform>/<slug>.toml`.

use std::path::Path;

pub const OUTCOMES_DIR: &str = "outcomes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigPath {
    Experiment { slug: String },
    Outcome { platform: String, slug: String },
}

impl ConfigPath {
    /// Classify a path by its position relative to an outcomes directory.
    /// Works for absolute paths and paths relative to the repository root.
    pub fn classify(path: &Path) -> Option<Self> {
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            return None;
        }
        let slug = path.file_stem()?.to_str()?.to_string();
        let parent = path.parent();
        let platform_dir = parent.and_then(Path::file_name).and_then(|n| n.to_str());
        let outcomes_dir = parent
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .and_then(|n| n.to_str());

        match (outcomes_dir, platform_dir) {
            (Some(OUTCOMES_DIR), Some(platform)) => Some(ConfigPath::Outcome {
                platform: platform.to_string(),
                slug,
            }),
            _ => Some(ConfigPath::Experiment { slug }),
        }
    }

    pub fn slug(&self) -> &str {
        match self {
            ConfigPath::Experiment { slug } | ConfigPath::Outcome { slug, .. } => slug,
        }
    }
}
