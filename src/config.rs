//! Topic registry: the mapping from a button label to a source-list file.
//!
//! The registry is loaded once at startup from YAML:
//!
//! ```yaml
//! topics_dir: topics
//! topics:
//!   - label: "Мировые новости"
//!     file: world.txt
//!   - label: "Технологии"
//!     file: tech.txt
//! ```
//!
//! A relative `topics_dir` is resolved against the registry file's directory.
//! Topics keep their declaration order, which is also the keyboard order.

use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// One selectable topic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Topic {
    /// Text of the keyboard button, matched exactly against incoming messages.
    pub label: String,
    /// Source-list file name, relative to the topics directory.
    pub file: PathBuf,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    topics_dir: Option<PathBuf>,
    topics: Vec<Topic>,
}

/// All configured topics plus the directory their source files live in.
#[derive(Debug, Clone)]
pub struct TopicRegistry {
    topics_dir: PathBuf,
    topics: Vec<Topic>,
}

impl TopicRegistry {
    /// Load and validate a registry file.
    ///
    /// # Errors
    ///
    /// Fails when the file is unreadable, is not valid YAML, lists no topics,
    /// or repeats a label.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let registry = Self::from_yaml(&content, base).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            ConfigError::NoTopics(_) => ConfigError::NoTopics(path.to_path_buf()),
            other => other,
        })?;
        info!(
            topics = registry.topics.len(),
            topics_dir = %registry.topics_dir.display(),
            "Loaded topic registry"
        );
        Ok(registry)
    }

    /// Parse registry YAML, resolving a relative `topics_dir` against `base`.
    pub fn from_yaml(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let raw: RegistryFile =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: PathBuf::new(),
                source,
            })?;

        if raw.topics.is_empty() {
            return Err(ConfigError::NoTopics(PathBuf::new()));
        }
        let mut seen = HashSet::new();
        for topic in &raw.topics {
            if !seen.insert(topic.label.as_str()) {
                return Err(ConfigError::DuplicateTopic(topic.label.clone()));
            }
        }

        let dir = raw.topics_dir.unwrap_or_else(|| PathBuf::from("topics"));
        let topics_dir = if dir.is_absolute() { dir } else { base.join(dir) };
        Ok(Self {
            topics_dir,
            topics: raw.topics,
        })
    }

    /// Find a topic by its exact button label.
    pub fn get(&self, label: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.label == label)
    }

    /// Full path of a topic's source-list file.
    pub fn source_path(&self, topic: &Topic) -> PathBuf {
        self.topics_dir.join(&topic.file)
    }

    /// Button labels in declaration order.
    pub fn labels(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.label.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REGISTRY: &str = r#"
topics_dir: feeds
topics:
  - label: "Мировые новости"
    file: world.txt
  - label: "Технологии"
    file: tech.txt
"#;

    #[test]
    fn test_registry_keeps_order_and_resolves_paths() {
        let reg = TopicRegistry::from_yaml(REGISTRY, Path::new("/etc/bot")).unwrap();

        assert_eq!(reg.labels(), vec!["Мировые новости", "Технологии"]);
        let tech = reg.get("Технологии").unwrap();
        assert_eq!(reg.source_path(tech), PathBuf::from("/etc/bot/feeds/tech.txt"));
        assert!(reg.get("Спорт").is_none());
    }

    #[test]
    fn test_registry_default_topics_dir() {
        let yaml = "topics:\n  - label: A\n    file: a.txt\n";
        let reg = TopicRegistry::from_yaml(yaml, Path::new("cfg")).unwrap();
        let a = reg.get("A").unwrap();
        assert_eq!(reg.source_path(a), PathBuf::from("cfg/topics/a.txt"));
    }

    #[test]
    fn test_registry_rejects_empty_and_duplicates() {
        assert!(matches!(
            TopicRegistry::from_yaml("topics: []", Path::new(".")),
            Err(ConfigError::NoTopics(_))
        ));

        let dup = "topics:\n  - {label: A, file: a.txt}\n  - {label: A, file: b.txt}\n";
        assert!(matches!(
            TopicRegistry::from_yaml(dup, Path::new(".")),
            Err(ConfigError::DuplicateTopic(label)) if label == "A"
        ));
    }

    #[test]
    fn test_load_reports_path_on_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope.yaml");
        match TopicRegistry::load(&missing) {
            Err(ConfigError::Read { path, .. }) => assert_eq!(path, missing),
            other => panic!("expected read error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("topics.yaml");
        std::fs::write(&path, REGISTRY).unwrap();

        let reg = TopicRegistry::load(&path).unwrap();
        let world = reg.get("Мировые новости").unwrap();
        assert_eq!(reg.source_path(world), tmp.path().join("feeds").join("world.txt"));
    }
}
