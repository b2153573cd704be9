//! CLI configuration

use crate::error::{CliError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use trellis_core::skiplist::{SplitPredicate, DEFAULT_BRANCHING_FACTOR};
use trellis_core::TreeConfig;

/// How keys and values are written in input and output files
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Plain UTF-8 strings
    #[default]
    Utf8,
    /// Lowercase hex strings
    Hex,
}

impl Encoding {
    /// Decode a string from an input file into raw bytes
    pub fn decode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Hex => {
                hex::decode(text).map_err(|e| CliError::Decode(format!("{:?}: {}", text, e)))
            }
        }
    }

    /// Encode raw bytes for output.
    ///
    /// Bytes that are not valid UTF-8 fail under `Utf8`; use `Hex` for
    /// binary keys and values.
    pub fn encode(self, bytes: &[u8]) -> Result<String> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|_| {
                CliError::Encode(format!(
                    "{} as utf8, set encoding = \"hex\" for binary data",
                    hex::encode(bytes)
                ))
            }),
            Encoding::Hex => Ok(hex::encode(bytes)),
        }
    }
}

/// Settings shared by every subcommand
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Encoding of keys and values
    pub encoding: Encoding,
    /// Target fan-out of the trees built by the CLI
    pub branching_factor: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Utf8,
            branching_factor: DEFAULT_BRANCHING_FACTOR,
        }
    }
}

impl CliConfig {
    /// Load from an optional TOML file, then `TRELLIS_*` environment
    /// variables, which take precedence
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config: CliConfig = builder
            .add_source(config::Environment::with_prefix("TRELLIS").try_parsing(true))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings no tree can be built with
    pub fn validate(&self) -> Result<()> {
        SplitPredicate::new(self.branching_factor)?;
        Ok(())
    }

    /// Tree configuration for an in-memory tree
    pub fn tree_config(&self) -> TreeConfig {
        TreeConfig::default().with_branching_factor(self.branching_factor)
    }
}
