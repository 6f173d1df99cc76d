use std::collections::BTreeMap;
use std::sync::Arc;

use data_panel_common::common::{ConfigError, Result, RoutingError};
use data_panel_common::config::{AlgorithmConfiguration, ReadwriteSplittingRuleConfiguration};

use crate::rule::registry::{AlgorithmRegistry, LoadBalanceAlgorithm};

/// Hint naming the replica the `HINT` load balancer reads from.
pub const READ_DATA_SOURCE_HINT: &str = "READ_DATA_SOURCE";

/// Always the replica at `index`, modulo the number of replicas.
#[derive(Debug, Clone)]
pub struct FixedLoadBalanceAlgorithm {
    index: usize,
}

impl FixedLoadBalanceAlgorithm {
    pub fn new(config: &AlgorithmConfiguration) -> Result<Self> {
        let index = config.get_i64("index").unwrap_or(0);
        if index < 0 {
            return Err(ConfigError::InvalidProperty {
                algorithm: config.algorithm_type.clone(),
                property: "index".to_string(),
            }
            .into());
        }
        Ok(FixedLoadBalanceAlgorithm { index: index as usize })
    }
}

impl LoadBalanceAlgorithm for FixedLoadBalanceAlgorithm {
    fn algorithm_type(&self) -> &str {
        "FIXED"
    }

    fn get_data_source(
        &self,
        group: &str,
        _write_data_source: &str,
        read_data_sources: &[String],
        _hints: &BTreeMap<String, String>,
    ) -> Result<String> {
        if read_data_sources.is_empty() {
            return Err(RoutingError::NoDataSource(group.to_string()).into());
        }
        Ok(read_data_sources[self.index % read_data_sources.len()].clone())
    }
}

/// Replica named by the `READ_DATA_SOURCE` hint, the first replica without it.
#[derive(Debug, Clone)]
pub struct HintLoadBalanceAlgorithm {
    hint_key: String,
}

impl HintLoadBalanceAlgorithm {
    pub fn new(config: &AlgorithmConfiguration) -> Self {
        HintLoadBalanceAlgorithm {
            hint_key: config
                .get_str("hint-key")
                .unwrap_or_else(|| READ_DATA_SOURCE_HINT.to_string())
                .to_ascii_uppercase(),
        }
    }
}

impl LoadBalanceAlgorithm for HintLoadBalanceAlgorithm {
    fn algorithm_type(&self) -> &str {
        "HINT"
    }

    fn get_data_source(
        &self,
        group: &str,
        _write_data_source: &str,
        read_data_sources: &[String],
        hints: &BTreeMap<String, String>,
    ) -> Result<String> {
        if let Some(name) = hints.get(&self.hint_key) {
            return read_data_sources
                .iter()
                .find(|each| each.eq_ignore_ascii_case(name))
                .cloned()
                .ok_or_else(|| RoutingError::NoDataSource(format!("{} (replica `{}`)", group, name)).into());
        }
        read_data_sources
            .first()
            .cloned()
            .ok_or_else(|| RoutingError::NoDataSource(group.to_string()).into())
    }
}

#[derive(Debug, Clone)]
pub struct ReadwriteSplittingGroup {
    pub name: String,
    pub write_data_source: String,
    pub read_data_sources: Vec<String>,
    load_balancer: Arc<dyn LoadBalanceAlgorithm>,
}

impl ReadwriteSplittingGroup {
    pub fn read_data_source(&self, hints: &BTreeMap<String, String>) -> Result<String> {
        self.load_balancer
            .get_data_source(&self.name, &self.write_data_source, &self.read_data_sources, hints)
    }
}

#[derive(Debug, Clone)]
pub struct ReadwriteSplittingRule {
    groups: BTreeMap<String, ReadwriteSplittingGroup>,
}

impl ReadwriteSplittingRule {
    pub fn new(config: &ReadwriteSplittingRuleConfiguration, registry: &AlgorithmRegistry) -> Result<Self> {
        let mut load_balancers = BTreeMap::new();
        for (name, algorithm) in &config.load_balancers {
            load_balancers.insert(name.clone(), registry.load_balancer(algorithm)?);
        }
        let default_balancer: Arc<dyn LoadBalanceAlgorithm> = Arc::new(FixedLoadBalanceAlgorithm { index: 0 });
        let mut groups = BTreeMap::new();
        for (name, group) in &config.data_sources {
            let load_balancer = match &group.load_balancer_name {
                Some(balancer) => Arc::clone(
                    load_balancers
                        .get(balancer)
                        .ok_or_else(|| ConfigError::MissingAlgorithm {
                            algorithm: balancer.clone(),
                        })?,
                ),
                None => Arc::clone(&default_balancer),
            };
            groups.insert(
                name.clone(),
                ReadwriteSplittingGroup {
                    name: name.clone(),
                    write_data_source: group.write_data_source_name.clone(),
                    read_data_sources: group.read_data_source_names.clone(),
                    load_balancer,
                },
            );
        }
        Ok(ReadwriteSplittingRule { groups })
    }

    /// Group whose logical name is `data_source`.
    pub fn group(&self, data_source: &str) -> Option<&ReadwriteSplittingGroup> {
        self.groups.get(data_source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_panel_common::config::RuleConfiguration;

    fn rule() -> ReadwriteSplittingRule {
        let config = RuleConfiguration::from_yaml_str(
            r#"
readwrite_splitting:
  data_sources:
    rw_ds: { write_data_source_name: primary, read_data_source_names: [replica_0, replica_1], load_balancer_name: fixed_1 }
    hint_ds: { write_data_source_name: primary, read_data_source_names: [replica_0, replica_1], load_balancer_name: hint }
    plain_ds: { write_data_source_name: primary, read_data_source_names: [replica_0, replica_1] }
  load_balancers:
    fixed_1: { type: FIXED, props: { index: 1 } }
    hint: { type: HINT }
"#,
        )
        .unwrap();
        ReadwriteSplittingRule::new(config.readwrite_splitting.as_ref().unwrap(), &AlgorithmRegistry::default()).unwrap()
    }

    #[test]
    fn test_fixed_load_balancer() {
        let rule = rule();
        let hints = BTreeMap::new();
        assert_eq!(rule.group("rw_ds").unwrap().read_data_source(&hints).unwrap(), "replica_1");
        assert_eq!(rule.group("plain_ds").unwrap().read_data_source(&hints).unwrap(), "replica_0");
        assert!(rule.group("ds_0").is_none());
    }

    #[test]
    fn test_hint_load_balancer() {
        let rule = rule();
        let group = rule.group("hint_ds").unwrap();
        let mut hints = BTreeMap::new();
        assert_eq!(group.read_data_source(&hints).unwrap(), "replica_0");
        hints.insert(READ_DATA_SOURCE_HINT.to_string(), "REPLICA_1".to_string());
        assert_eq!(group.read_data_source(&hints).unwrap(), "replica_1");
        hints.insert(READ_DATA_SOURCE_HINT.to_string(), "replica_9".to_string());
        assert!(group.read_data_source(&hints).is_err());
    }
}
