pub mod algorithm;

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use data_panel_common::common::{ConfigError, Result};
use data_panel_common::config::{ShardingRuleConfiguration, ShardingStrategyConfiguration};
use data_panel_common::statement::Value;

use crate::rule::inline;
use crate::rule::registry::{AlgorithmRegistry, ShardingAlgorithm};

/// One physical table in one data source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataNode {
    pub data_source: String,
    pub table: String,
}

impl DataNode {
    pub fn new(data_source: &str, table: &str) -> Self {
        DataNode {
            data_source: data_source.to_string(),
            table: table.to_string(),
        }
    }

    /// `ds_0.t_order_0`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut parts = text.trim().splitn(2, '.');
        match (parts.next(), parts.next()) {
            (Some(data_source), Some(table)) if !data_source.is_empty() && !table.is_empty() => {
                Ok(DataNode::new(data_source, table))
            }
            _ => Err(ConfigError::InvalidDataNode(text.to_string()).into()),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.data_source, self.table)
    }
}

/// Values a sharding column is constrained to by one condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardingValue {
    /// `=` and `IN`.
    List(Vec<Value>),
    /// `BETWEEN` and comparisons.
    Range { lower: Bound<Value>, upper: Bound<Value> },
}

#[derive(Debug, Clone)]
pub struct ShardingStrategy {
    pub column: String,
    pub algorithm_name: String,
    algorithm: Arc<dyn ShardingAlgorithm>,
}

impl ShardingStrategy {
    /// Targets hit by `value`, in the order of `targets`.
    pub fn shard(&self, targets: &[String], logic_table: &str, value: &ShardingValue) -> Result<Vec<String>> {
        let hit = match value {
            ShardingValue::List(values) => {
                let mut hit = vec![];
                for value in values {
                    if let Some(target) = self.algorithm.shard_precise(targets, logic_table, &self.column, value)? {
                        hit.push(target);
                    }
                }
                hit
            }
            ShardingValue::Range { lower, upper } => {
                self.algorithm
                    .shard_range(targets, logic_table, &self.column, lower, upper)?
            }
        };
        Ok(targets.iter().filter(|target| hit.contains(target)).cloned().collect())
    }
}

#[derive(Debug, Clone)]
pub struct TableRule {
    pub logic_table: String,
    pub actual_data_nodes: Vec<DataNode>,
    pub database_strategy: Option<ShardingStrategy>,
    pub table_strategy: Option<ShardingStrategy>,
}

impl TableRule {
    /// Distinct data sources in data node order.
    pub fn actual_data_sources(&self) -> Vec<String> {
        let mut result: Vec<String> = vec![];
        for node in &self.actual_data_nodes {
            if !result.contains(&node.data_source) {
                result.push(node.data_source.clone());
            }
        }
        result
    }

    pub fn actual_tables(&self, data_source: &str) -> Vec<String> {
        self.actual_data_nodes
            .iter()
            .filter(|node| node.data_source == data_source)
            .map(|node| node.table.clone())
            .collect()
    }

    pub fn is_sharding_column(&self, column: &str) -> bool {
        self.database_strategy
            .iter()
            .chain(self.table_strategy.iter())
            .any(|strategy| strategy.column.eq_ignore_ascii_case(column))
    }

    /// Position of `actual_table` among the tables of `data_source`.
    pub fn actual_table_index(&self, data_source: &str, actual_table: &str) -> Option<usize> {
        self.actual_tables(data_source)
            .iter()
            .position(|table| table.eq_ignore_ascii_case(actual_table))
    }
}

#[derive(Debug, Clone)]
pub struct ShardingRule {
    tables: BTreeMap<String, TableRule>,
    binding_table_groups: Vec<Vec<String>>,
    broadcast_tables: Vec<String>,
    data_source_names: Vec<String>,
}

impl ShardingRule {
    pub fn new(config: &ShardingRuleConfiguration, registry: &AlgorithmRegistry) -> Result<Self> {
        let mut algorithms = BTreeMap::new();
        for (name, algorithm) in &config.algorithms {
            algorithms.insert(name.clone(), registry.sharding_algorithm(algorithm)?);
        }
        let strategy = |config: &Option<ShardingStrategyConfiguration>| -> Result<Option<ShardingStrategy>> {
            match config {
                None => Ok(None),
                Some(config) => {
                    let algorithm = algorithms
                        .get(&config.algorithm_name)
                        .ok_or_else(|| ConfigError::MissingAlgorithm {
                            algorithm: config.algorithm_name.clone(),
                        })?;
                    Ok(Some(ShardingStrategy {
                        column: config.sharding_column.clone(),
                        algorithm_name: config.algorithm_name.clone(),
                        algorithm: Arc::clone(algorithm),
                    }))
                }
            }
        };

        let mut tables = BTreeMap::new();
        let mut data_source_names: Vec<String> = vec![];
        for (logic_table, table_config) in &config.tables {
            if table_config.actual_data_nodes.is_empty() {
                return Err(ConfigError::InvalidDataNode(format!("{}: no actual data nodes", logic_table)).into());
            }
            let mut actual_data_nodes = vec![];
            for expression in &table_config.actual_data_nodes {
                for node in inline::expand(expression)? {
                    actual_data_nodes.push(DataNode::parse(&node)?);
                }
            }
            for node in &actual_data_nodes {
                if !data_source_names.contains(&node.data_source) {
                    data_source_names.push(node.data_source.clone());
                }
            }
            let database_strategy = if table_config.database_strategy.is_some() {
                strategy(&table_config.database_strategy)?
            } else {
                strategy(&config.default_database_strategy)?
            };
            let table_strategy = if table_config.table_strategy.is_some() {
                strategy(&table_config.table_strategy)?
            } else {
                strategy(&config.default_table_strategy)?
            };
            tables.insert(
                logic_table.to_ascii_lowercase(),
                TableRule {
                    logic_table: logic_table.clone(),
                    actual_data_nodes,
                    database_strategy,
                    table_strategy,
                },
            );
        }

        let mut binding_table_groups = vec![];
        for group in &config.binding_tables {
            let group: Vec<String> = group.iter().map(|table| table.to_ascii_lowercase()).collect();
            if let Some(unknown) = group.iter().find(|table| !tables.contains_key(*table)) {
                return Err(ConfigError::Invalid(format!("binding table `{}` has no sharding rule", unknown)).into());
            }
            binding_table_groups.push(group);
        }
        Ok(ShardingRule {
            tables,
            binding_table_groups,
            broadcast_tables: config.broadcast_tables.iter().map(|t| t.to_ascii_lowercase()).collect(),
            data_source_names,
        })
    }

    pub fn table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.tables.get(&logic_table.to_ascii_lowercase())
    }

    pub fn is_sharding_table(&self, logic_table: &str) -> bool {
        self.table_rule(logic_table).is_some()
    }

    pub fn is_broadcast_table(&self, logic_table: &str) -> bool {
        self.broadcast_tables.contains(&logic_table.to_ascii_lowercase())
    }

    /// Every data source some data node lives in.
    pub fn data_source_names(&self) -> &[String] {
        &self.data_source_names
    }

    /// Binding group containing `logic_table`, lower-cased.
    pub fn binding_table_group(&self, logic_table: &str) -> Option<&[String]> {
        let name = logic_table.to_ascii_lowercase();
        self.binding_table_groups
            .iter()
            .find(|group| group.contains(&name))
            .map(|group| group.as_slice())
    }

    /// More than one table and all of them in one binding group.
    pub fn is_all_binding_tables(&self, logic_tables: &[String]) -> bool {
        match logic_tables.first() {
            Some(first) if logic_tables.len() > 1 => self.binding_table_group(first).map_or(false, |group| {
                logic_tables
                    .iter()
                    .all(|table| group.contains(&table.to_ascii_lowercase()))
            }),
            _ => false,
        }
    }

    /// Actual table of `logic_table` bound to `primary_actual_table` of `primary`.
    pub fn binding_actual_table(
        &self,
        primary: &TableRule,
        primary_actual_table: &str,
        data_source: &str,
        logic_table: &str,
    ) -> Option<String> {
        let index = primary.actual_table_index(data_source, primary_actual_table)?;
        self.table_rule(logic_table)?
            .actual_tables(data_source)
            .get(index)
            .cloned()
    }
}
