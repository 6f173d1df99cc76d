//! Immutable rule objects built once from [`RuleConfiguration`] and shared by
//! every statement routed against the same kernel snapshot.

pub mod encrypt;
pub mod inline;
pub mod readwrite;
pub mod registry;
pub mod shadow;
pub mod sharding;

use std::sync::Arc;

use data_panel_common::common::Result;
use data_panel_common::config::RuleConfiguration;

pub use encrypt::{EncryptColumn, EncryptRule};
pub use readwrite::{ReadwriteSplittingGroup, ReadwriteSplittingRule};
pub use registry::{
    AlgorithmRegistry, EncryptAlgorithm, LoadBalanceAlgorithm, ShadowAlgorithm, ShadowCondition, ShadowOperation,
    ShardingAlgorithm,
};
pub use shadow::{ShadowDataSource, ShadowRule};
pub use sharding::{DataNode, ShardingRule, ShardingStrategy, ShardingValue, TableRule};

#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub sharding: Option<Arc<ShardingRule>>,
    pub readwrite_splitting: Option<Arc<ReadwriteSplittingRule>>,
    pub shadow: Option<Arc<ShadowRule>>,
    pub encrypt: Option<Arc<EncryptRule>>,
}

impl RuleSet {
    pub fn new(config: &RuleConfiguration, registry: &AlgorithmRegistry) -> Result<Self> {
        let rules = RuleSet {
            sharding: match &config.sharding {
                Some(sharding) => Some(Arc::new(ShardingRule::new(sharding, registry)?)),
                None => None,
            },
            readwrite_splitting: match &config.readwrite_splitting {
                Some(readwrite) => Some(Arc::new(ReadwriteSplittingRule::new(readwrite, registry)?)),
                None => None,
            },
            shadow: match &config.shadow {
                Some(shadow) => Some(Arc::new(ShadowRule::new(shadow, registry)?)),
                None => None,
            },
            encrypt: match &config.encrypt {
                Some(encrypt) => Some(Arc::new(EncryptRule::new(encrypt, registry)?)),
                None => None,
            },
        };
        log::debug!(
            "built rules: sharding={} readwrite_splitting={} shadow={} encrypt={}",
            rules.sharding.is_some(),
            rules.readwrite_splitting.is_some(),
            rules.shadow.is_some(),
            rules.encrypt.is_some()
        );
        Ok(rules)
    }

    pub fn is_empty(&self) -> bool {
        self.sharding.is_none() && self.readwrite_splitting.is_none() && self.shadow.is_none() && self.encrypt.is_none()
    }
}
