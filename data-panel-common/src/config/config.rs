use std::fs::File;
use std::io::Read;

use serde::Deserialize;
use serde::Serialize;

use crate::common::{ConfigError, Result};
use crate::config::rule::RuleConfiguration;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MeshConfig {
    #[serde(default)]
    props: KernelProps,
    #[serde(default)]
    rules: RuleConfiguration,
}

impl MeshConfig {
    pub fn new(props: KernelProps, rules: RuleConfiguration) -> Self {
        MeshConfig {
            props,
            rules,
        }
    }

    pub fn from_str(config_str: &str) -> Result<Self> {
        let config = toml::from_str(config_str).map_err(ConfigError::from)?;
        Ok(config)
    }

    pub fn from_file(config_file: &str) -> Result<Self> {
        let mut file = File::open(config_file).map_err(|source| ConfigError::Io {
            path: config_file.to_string(),
            source,
        })?;
        let mut config_str = String::new();
        file.read_to_string(&mut config_str)
            .map_err(|source| ConfigError::Io {
                path: config_file.to_string(),
                source,
            })?;
        log::debug!("loaded mesh config from {}", config_file);
        Self::from_str(&*config_str)
    }
}

impl MeshConfig {
    pub fn props(&self) -> &KernelProps {
        &self.props
    }

    pub fn rules(&self) -> &RuleConfiguration {
        &self.rules
    }
}

/// Switches of the route/rewrite kernel.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct KernelProps {
    /// Log logic and actual SQL of every statement.
    pub sql_show: bool,
    /// With `sql_show`, log only data sources and actual SQL without parameters.
    pub sql_simple: bool,
    /// Tables missing from metadata fail binding instead of binding unresolved.
    pub check_table_metadata_enabled: bool,
    /// Data source of tables the metadata does not place anywhere.
    pub default_data_source: Option<String>,
}
