//! `trellis.toml` configuration

use crate::error::ConfigError;
use crate::model::ProjectId;
use crate::resolver::Universe;
use crate::subgraph::TypeFilter;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "trellis.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrellisConfig {
    pub graph: GraphConfig,
    pub subgraph: SubgraphConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraphConfig {
    /// Leave out types that only exist in generated code.
    pub exclude_generated: bool,
    /// Projects to index; all projects when unset.
    pub included_projects: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubgraphConfig {
    pub exclude_nested_types: bool,
    /// How many ranked types to tag with an importance; 0 disables ranking.
    pub important_types: usize,
}

impl Default for SubgraphConfig {
    fn default() -> Self {
        SubgraphConfig {
            exclude_nested_types: false,
            important_types: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Quiet period after a document edit.
    pub document_idle_ms: u64,
    /// Quiet period before a full rebuild.
    pub graph_idle_ms: u64,
    /// Nodes visited between cancellation checks in traversals.
    pub traversal_check_interval: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        OrchestratorConfig {
            document_idle_ms: 300,
            graph_idle_ms: 1500,
            traversal_check_interval: 64,
        }
    }
}

impl OrchestratorConfig {
    pub fn document_idle(&self) -> Duration {
        Duration::from_millis(self.document_idle_ms)
    }

    pub fn graph_idle(&self) -> Duration {
        Duration::from_millis(self.graph_idle_ms)
    }
}

impl TrellisConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: TrellisConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let orchestrator = &self.orchestrator;
        if orchestrator.graph_idle_ms < orchestrator.document_idle_ms {
            return Err(ConfigError::Invalid {
                field: "orchestrator.graph_idle_ms",
                reason: format!(
                    "{} is shorter than document_idle_ms ({})",
                    orchestrator.graph_idle_ms, orchestrator.document_idle_ms
                ),
            });
        }
        if orchestrator.traversal_check_interval == 0 {
            return Err(ConfigError::Invalid {
                field: "orchestrator.traversal_check_interval",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(projects) = &self.graph.included_projects {
            if projects.iter().any(|p| p.trim().is_empty()) {
                return Err(ConfigError::Invalid {
                    field: "graph.included_projects",
                    reason: "project names must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The symbol universe this configuration describes.
    pub fn universe(&self) -> Universe {
        let mut universe = match &self.graph.included_projects {
            Some(projects) => Universe::with_projects(projects.iter().map(ProjectId::new)),
            None => Universe::all(),
        };
        universe.exclude_generated = self.graph.exclude_generated;
        universe
    }

    pub fn node_filter(&self) -> TypeFilter {
        TypeFilter {
            exclude_nested_types: self.subgraph.exclude_nested_types,
            exclude_generated: self.graph.exclude_generated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrellisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.subgraph.important_types, 10);
        assert!(config.universe().included_projects.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[graph]
exclude_generated = true
included_projects = ["Core"]

[orchestrator]
document_idle_ms = 50
"#
        )
        .unwrap();

        let config = TrellisConfig::load(file.path()).unwrap();
        assert!(config.graph.exclude_generated);
        assert_eq!(config.orchestrator.document_idle_ms, 50);
        assert_eq!(config.orchestrator.graph_idle_ms, 1500);
        let universe = config.universe();
        assert!(universe.includes_project(&ProjectId::new("Core")));
        assert!(!universe.includes_project(&ProjectId::new("App")));
        assert!(config.node_filter().exclude_generated);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let err = TrellisConfig::from_toml_str(
            "[orchestrator]\ndocument_idle_ms = 500\ngraph_idle_ms = 100\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "orchestrator.graph_idle_ms",
                ..
            }
        ));

        let err =
            TrellisConfig::from_toml_str("[orchestrator]\ntraversal_check_interval = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = TrellisConfig::from_toml_str("[graph]\nbogus = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrellisConfig::load_or_default(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, TrellisConfig::default());
    }
}
