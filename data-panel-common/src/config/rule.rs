//! Rule configurations as they are written in the mesh config file.
//!
//! Every map is a `BTreeMap` so that rules built from the same document
//! always iterate in the same order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::{ConfigError, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RuleConfiguration {
    pub sharding: Option<ShardingRuleConfiguration>,
    pub readwrite_splitting: Option<ReadwriteSplittingRuleConfiguration>,
    pub shadow: Option<ShadowRuleConfiguration>,
    pub encrypt: Option<EncryptRuleConfiguration>,
}

impl RuleConfiguration {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config = serde_yaml::from_str(yaml).map_err(ConfigError::from)?;
        Ok(config)
    }

    pub fn is_empty(&self) -> bool {
        self.sharding.is_none()
            && self.readwrite_splitting.is_none()
            && self.shadow.is_none()
            && self.encrypt.is_none()
    }
}

/// A property value of an algorithm.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Bool(v) => write!(f, "{}", v),
            PropValue::Int(v) => write!(f, "{}", v),
            PropValue::Float(v) => write!(f, "{}", v),
            PropValue::Text(v) => f.write_str(v),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct AlgorithmConfiguration {
    #[serde(rename = "type")]
    pub algorithm_type: String,
    #[serde(default)]
    pub props: BTreeMap<String, PropValue>,
}

impl AlgorithmConfiguration {
    pub fn new(algorithm_type: &str) -> Self {
        AlgorithmConfiguration {
            algorithm_type: algorithm_type.to_string(),
            props: BTreeMap::new(),
        }
    }

    pub fn with_prop(mut self, key: &str, value: PropValue) -> Self {
        self.props.insert(key.to_string(), value);
        self
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.props.get(key).map(|v| v.to_string())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.props.get(key)? {
            PropValue::Int(v) => Some(*v),
            PropValue::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.props.get(key)? {
            PropValue::Bool(v) => Some(*v),
            PropValue::Text(v) => v.trim().parse().ok(),
            _ => None,
        }
    }
}

// ---------------------
//  SHARDING
// ---------------------

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ShardingRuleConfiguration {
    pub tables: BTreeMap<String, ShardingTableRuleConfiguration>,
    pub binding_tables: Vec<Vec<String>>,
    pub broadcast_tables: Vec<String>,
    pub default_database_strategy: Option<ShardingStrategyConfiguration>,
    pub default_table_strategy: Option<ShardingStrategyConfiguration>,
    pub algorithms: BTreeMap<String, AlgorithmConfiguration>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ShardingTableRuleConfiguration {
    /// `ds.table` nodes, inline expressions such as `ds_${0..1}.t_order_${[0, 1]}` allowed.
    pub actual_data_nodes: Vec<String>,
    #[serde(default)]
    pub database_strategy: Option<ShardingStrategyConfiguration>,
    #[serde(default)]
    pub table_strategy: Option<ShardingStrategyConfiguration>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ShardingStrategyConfiguration {
    pub sharding_column: String,
    pub algorithm_name: String,
}

// ---------------------
//  READWRITE SPLITTING
// ---------------------

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ReadwriteSplittingRuleConfiguration {
    pub data_sources: BTreeMap<String, ReadwriteSplittingDataSourceConfiguration>,
    pub load_balancers: BTreeMap<String, AlgorithmConfiguration>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ReadwriteSplittingDataSourceConfiguration {
    pub write_data_source_name: String,
    pub read_data_source_names: Vec<String>,
    #[serde(default)]
    pub load_balancer_name: Option<String>,
}

// ---------------------
//  SHADOW
// ---------------------

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ShadowRuleConfiguration {
    pub data_sources: BTreeMap<String, ShadowDataSourceConfiguration>,
    pub tables: BTreeMap<String, ShadowTableConfiguration>,
    pub shadow_algorithms: BTreeMap<String, AlgorithmConfiguration>,
    pub default_shadow_algorithm_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ShadowDataSourceConfiguration {
    pub production_data_source_name: String,
    pub shadow_data_source_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ShadowTableConfiguration {
    pub data_source_names: Vec<String>,
    pub shadow_algorithm_names: Vec<String>,
}

// ---------------------
//  ENCRYPT
// ---------------------

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct EncryptRuleConfiguration {
    pub tables: BTreeMap<String, EncryptTableRuleConfiguration>,
    pub encryptors: BTreeMap<String, AlgorithmConfiguration>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EncryptTableRuleConfiguration {
    pub columns: BTreeMap<String, EncryptColumnRuleConfiguration>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct EncryptColumnRuleConfiguration {
    pub cipher_column: String,
    pub encryptor_name: String,
}
