//! Algorithm SPI and the registry that builds algorithm instances from
//! configuration.
//!
//! The registry is a plain value handed to [`RuleSet::new`](super::RuleSet::new);
//! two kernels with different registries never see each other's algorithms.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use data_panel_common::common::{ConfigError, Result};
use data_panel_common::config::AlgorithmConfiguration;
use data_panel_common::statement::Value;

use crate::rule::encrypt::{MD5EncryptAlgorithm, SHA256EncryptAlgorithm};
use crate::rule::readwrite::{FixedLoadBalanceAlgorithm, HintLoadBalanceAlgorithm};
use crate::rule::shadow::{RegexMatchShadowAlgorithm, SQLHintShadowAlgorithm, ValueMatchShadowAlgorithm};
use crate::rule::sharding::algorithm::{
    BoundaryRangeShardingAlgorithm, HashModShardingAlgorithm, InlineShardingAlgorithm, ModShardingAlgorithm,
};

pub trait ShardingAlgorithm: fmt::Debug + Send + Sync {
    fn algorithm_type(&self) -> &str;

    /// Target for one `=` / `IN` value, `None` when no target matches.
    fn shard_precise(&self, targets: &[String], logic_table: &str, column: &str, value: &Value) -> Result<Option<String>>;

    /// Targets a `BETWEEN` or comparison range may hit; all of them unless the
    /// algorithm knows better.
    fn shard_range(
        &self,
        targets: &[String],
        _logic_table: &str,
        _column: &str,
        _lower: &Bound<Value>,
        _upper: &Bound<Value>,
    ) -> Result<Vec<String>> {
        Ok(targets.to_vec())
    }
}

pub trait LoadBalanceAlgorithm: fmt::Debug + Send + Sync {
    fn algorithm_type(&self) -> &str;

    fn get_data_source(
        &self,
        group: &str,
        write_data_source: &str,
        read_data_sources: &[String],
        hints: &BTreeMap<String, String>,
    ) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowOperation {
    Select,
    Insert,
    Update,
    Delete,
}

impl ShadowOperation {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "select" => Some(ShadowOperation::Select),
            "insert" => Some(ShadowOperation::Insert),
            "update" => Some(ShadowOperation::Update),
            "delete" => Some(ShadowOperation::Delete),
            _ => None,
        }
    }
}

/// What a shadow algorithm is asked about.
#[derive(Debug, Clone, Copy)]
pub enum ShadowCondition<'c> {
    Hint {
        table: &'c str,
        hints: &'c BTreeMap<String, String>,
    },
    Column {
        table: &'c str,
        operation: ShadowOperation,
        column: &'c str,
        values: &'c [Value],
    },
}

pub trait ShadowAlgorithm: fmt::Debug + Send + Sync {
    fn algorithm_type(&self) -> &str;

    /// Hint algorithms only look at route hints, column algorithms at values.
    fn is_hint(&self) -> bool;

    fn is_shadow(&self, condition: &ShadowCondition<'_>) -> bool;
}

pub trait EncryptAlgorithm: fmt::Debug + Send + Sync {
    fn algorithm_type(&self) -> &str;

    fn encrypt(&self, plain: &Value) -> Result<Value>;
}

pub type Factory<T> = Arc<dyn Fn(&AlgorithmConfiguration) -> Result<Arc<T>> + Send + Sync>;

/// Algorithm type name to factory, per algorithm kind.
#[derive(Clone)]
pub struct AlgorithmRegistry {
    sharding: BTreeMap<String, Factory<dyn ShardingAlgorithm>>,
    load_balancers: BTreeMap<String, Factory<dyn LoadBalanceAlgorithm>>,
    shadow: BTreeMap<String, Factory<dyn ShadowAlgorithm>>,
    encrypt: BTreeMap<String, Factory<dyn EncryptAlgorithm>>,
}

impl AlgorithmRegistry {
    /// A registry without any algorithm.
    pub fn empty() -> Self {
        AlgorithmRegistry {
            sharding: BTreeMap::new(),
            load_balancers: BTreeMap::new(),
            shadow: BTreeMap::new(),
            encrypt: BTreeMap::new(),
        }
    }

    pub fn register_sharding<F>(&mut self, algorithm_type: &str, factory: F) -> &mut Self
    where
        F: Fn(&AlgorithmConfiguration) -> Result<Arc<dyn ShardingAlgorithm>> + Send + Sync + 'static,
    {
        self.sharding.insert(algorithm_type.to_ascii_uppercase(), Arc::new(factory));
        self
    }

    pub fn register_load_balancer<F>(&mut self, algorithm_type: &str, factory: F) -> &mut Self
    where
        F: Fn(&AlgorithmConfiguration) -> Result<Arc<dyn LoadBalanceAlgorithm>> + Send + Sync + 'static,
    {
        self.load_balancers.insert(algorithm_type.to_ascii_uppercase(), Arc::new(factory));
        self
    }

    pub fn register_shadow<F>(&mut self, algorithm_type: &str, factory: F) -> &mut Self
    where
        F: Fn(&AlgorithmConfiguration) -> Result<Arc<dyn ShadowAlgorithm>> + Send + Sync + 'static,
    {
        self.shadow.insert(algorithm_type.to_ascii_uppercase(), Arc::new(factory));
        self
    }

    pub fn register_encrypt<F>(&mut self, algorithm_type: &str, factory: F) -> &mut Self
    where
        F: Fn(&AlgorithmConfiguration) -> Result<Arc<dyn EncryptAlgorithm>> + Send + Sync + 'static,
    {
        self.encrypt.insert(algorithm_type.to_ascii_uppercase(), Arc::new(factory));
        self
    }

    pub fn sharding_algorithm(&self, config: &AlgorithmConfiguration) -> Result<Arc<dyn ShardingAlgorithm>> {
        create(&self.sharding, "sharding", config)
    }

    pub fn load_balancer(&self, config: &AlgorithmConfiguration) -> Result<Arc<dyn LoadBalanceAlgorithm>> {
        create(&self.load_balancers, "load balance", config)
    }

    pub fn shadow_algorithm(&self, config: &AlgorithmConfiguration) -> Result<Arc<dyn ShadowAlgorithm>> {
        create(&self.shadow, "shadow", config)
    }

    pub fn encrypt_algorithm(&self, config: &AlgorithmConfiguration) -> Result<Arc<dyn EncryptAlgorithm>> {
        create(&self.encrypt, "encrypt", config)
    }
}

fn create<T: ?Sized>(
    factories: &BTreeMap<String, Factory<T>>,
    kind: &str,
    config: &AlgorithmConfiguration,
) -> Result<Arc<T>> {
    let factory = factories
        .get(&config.algorithm_type.to_ascii_uppercase())
        .ok_or_else(|| ConfigError::UnknownAlgorithmType {
            kind: kind.to_string(),
            algorithm_type: config.algorithm_type.clone(),
        })?;
    factory(config)
}

impl Default for AlgorithmRegistry {
    /// Registry holding the built-in algorithms.
    fn default() -> Self {
        let mut registry = AlgorithmRegistry::empty();
        registry
            .register_sharding("MOD", |config| Ok(Arc::new(ModShardingAlgorithm::new(config)?)))
            .register_sharding("HASH_MOD", |config| Ok(Arc::new(HashModShardingAlgorithm::new(config)?)))
            .register_sharding("BOUNDARY_RANGE", |config| {
                Ok(Arc::new(BoundaryRangeShardingAlgorithm::new(config)?))
            })
            .register_sharding("INLINE", |config| Ok(Arc::new(InlineShardingAlgorithm::new(config)?)))
            .register_load_balancer("FIXED", |config| Ok(Arc::new(FixedLoadBalanceAlgorithm::new(config)?)))
            .register_load_balancer("HINT", |config| Ok(Arc::new(HintLoadBalanceAlgorithm::new(config))))
            .register_shadow("SQL_HINT", |config| Ok(Arc::new(SQLHintShadowAlgorithm::new(config))))
            .register_shadow("VALUE_MATCH", |config| Ok(Arc::new(ValueMatchShadowAlgorithm::new(config)?)))
            .register_shadow("REGEX_MATCH", |config| Ok(Arc::new(RegexMatchShadowAlgorithm::new(config)?)))
            .register_encrypt("MD5", |config| Ok(Arc::new(MD5EncryptAlgorithm::new(config))))
            .register_encrypt("SHA256", |config| Ok(Arc::new(SHA256EncryptAlgorithm::new(config))));
        registry
    }
}

impl fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("sharding", &self.sharding.keys().collect::<Vec<_>>())
            .field("load_balancers", &self.load_balancers.keys().collect::<Vec<_>>())
            .field("shadow", &self.shadow.keys().collect::<Vec<_>>())
            .field("encrypt", &self.encrypt.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Required property of an algorithm.
pub(crate) fn required_prop(config: &AlgorithmConfiguration, key: &str) -> Result<String> {
    config.get_str(key).ok_or_else(|| {
        ConfigError::InvalidProperty {
            algorithm: config.algorithm_type.clone(),
            property: key.to_string(),
        }
        .into()
    })
}

pub(crate) fn required_i64(config: &AlgorithmConfiguration, key: &str) -> Result<i64> {
    config.get_i64(key).ok_or_else(|| {
        ConfigError::InvalidProperty {
            algorithm: config.algorithm_type.clone(),
            property: key.to_string(),
        }
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_panel_common::config::PropValue;

    #[derive(Debug)]
    struct Always;

    impl ShadowAlgorithm for Always {
        fn algorithm_type(&self) -> &str {
            "ALWAYS"
        }

        fn is_hint(&self) -> bool {
            true
        }

        fn is_shadow(&self, _condition: &ShadowCondition<'_>) -> bool {
            true
        }
    }

    #[test]
    fn test_builtin_algorithms() {
        let registry = AlgorithmRegistry::default();
        let config = AlgorithmConfiguration::new("mod").with_prop("sharding-count", PropValue::Int(2));
        assert_eq!(registry.sharding_algorithm(&config).unwrap().algorithm_type(), "MOD");
        let err = registry.sharding_algorithm(&AlgorithmConfiguration::new("MOD")).unwrap_err();
        assert!(err.to_string().contains("sharding-count"));
        let err = registry.encrypt_algorithm(&AlgorithmConfiguration::new("AES")).unwrap_err();
        assert_eq!(err.to_string(), "unknown encrypt algorithm type `AES`");
    }

    #[test]
    fn test_registries_are_isolated() {
        let mut custom = AlgorithmRegistry::empty();
        custom.register_shadow("ALWAYS", |_| Ok(Arc::new(Always)));
        assert!(custom.shadow_algorithm(&AlgorithmConfiguration::new("ALWAYS")).is_ok());
        assert!(custom.shadow_algorithm(&AlgorithmConfiguration::new("SQL_HINT")).is_err());
        assert!(AlgorithmRegistry::default()
            .shadow_algorithm(&AlgorithmConfiguration::new("ALWAYS"))
            .is_err());
    }
}
