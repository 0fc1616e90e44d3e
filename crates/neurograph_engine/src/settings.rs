// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine settings stored as RON.

use crate::aggregation::{self, Aggregator};
use crate::commands::AddWiresCommand;
use crate::graph::{Graph, GraphError};
use crate::history::{History, MAX_HISTORY};
use crate::node::{Node, NodeId};
use crate::wire::Wire;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Environment variable naming a settings file
pub const SETTINGS_ENV_VAR: &str = "NEUROGRAPH_SETTINGS";

/// Error loading or saving settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// File could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is not valid RON
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Settings could not be serialized
    #[error("Serialization error: {0}")]
    Serialize(#[from] ron::Error),

    /// File written by a newer version
    #[error("Settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Newest version understood
        supported: u32,
    },
}

/// Undo history settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Maximum number of undoable commands
    pub max_depth: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_depth: MAX_HISTORY,
        }
    }
}

/// Wiring settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WiringSettings {
    /// Weight given to new wires and macro connections
    pub default_weight: f64,
    /// Show every wire instead of collapsed group connections
    pub show_raw_connections: bool,
}

impl Default for WiringSettings {
    fn default() -> Self {
        Self {
            default_weight: 1.0,
            show_raw_connections: false,
        }
    }
}

/// Defaults for newly created nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDefaults {
    /// Pixel grid width
    pub pixel_width: usize,
    /// Pixel grid height
    pub pixel_height: usize,
    /// Tensor shape
    pub tensor_shape: Vec<usize>,
}

impl Default for NodeDefaults {
    fn default() -> Self {
        Self {
            pixel_width: 30,
            pixel_height: 30,
            tensor_shape: vec![3],
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG`
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "neurograph_engine=info".to_string(),
        }
    }
}

/// Complete engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Settings format version
    pub version: u32,
    /// Undo history
    #[serde(default)]
    pub history: HistorySettings,
    /// Wiring
    #[serde(default)]
    pub wiring: WiringSettings,
    /// Node defaults
    #[serde(default)]
    pub nodes: NodeDefaults,
    /// Logging
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            history: HistorySettings::default(),
            wiring: WiringSettings::default(),
            nodes: NodeDefaults::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl EngineSettings {
    /// Parse settings from RON text
    pub fn from_ron(content: &str) -> Result<Self, SettingsError> {
        let settings: EngineSettings = ron::from_str(content)?;

        // Version check
        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(SettingsError::UnsupportedVersion {
                found: settings.version,
                supported: SETTINGS_FORMAT_VERSION,
            });
        }
        Ok(settings)
    }

    /// Serialize settings to RON text
    pub fn to_ron(&self) -> Result<String, SettingsError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    /// Load from the path in `NEUROGRAPH_SETTINGS`, or use defaults
    pub fn from_env() -> Result<Self, SettingsError> {
        match std::env::var_os(SETTINGS_ENV_VAR) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    /// Undo history sized from these settings
    pub fn history(&self) -> History {
        History::with_max_depth(self.history.max_depth)
    }

    /// Aggregator configured from these settings
    pub fn aggregator(&self) -> Aggregator {
        let mut aggregator = Aggregator::new();
        aggregator.set_show_raw(self.wiring.show_raw_connections);
        aggregator
    }

    /// Blank pixel grid of the default size
    pub fn pixel_grid(&self) -> Node {
        Node::pixel_grid(self.nodes.pixel_width, self.nodes.pixel_height)
    }

    /// Zeroed tensor of the default shape
    pub fn tensor(&self) -> Node {
        Node::tensor(self.nodes.tensor_shape.clone())
    }

    /// Plain wire carrying the default weight
    pub fn wire(&self, source: NodeId, target: NodeId) -> Wire {
        Wire::new(source, target).with_weight(self.wiring.default_weight)
    }

    /// Macro connection between two groups using the default weight
    pub fn expand(&self, graph: &Graph, source: NodeId, target: NodeId) -> Result<AddWiresCommand, GraphError> {
        aggregation::expand(graph, source, target, self.wiring.default_weight)
    }
}
