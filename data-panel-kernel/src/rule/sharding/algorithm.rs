use std::ops::Bound;

use data_panel_common::common::{ConfigError, Result, RoutingError};
use data_panel_common::config::AlgorithmConfiguration;
use data_panel_common::statement::Value;

use crate::rule::inline::InlineExpression;
use crate::rule::registry::{required_i64, required_prop, ShardingAlgorithm};

fn sharding_count(config: &AlgorithmConfiguration) -> Result<i64> {
    let count = required_i64(config, "sharding-count")?;
    if count <= 0 {
        return Err(ConfigError::InvalidProperty {
            algorithm: config.algorithm_type.clone(),
            property: "sharding-count".to_string(),
        }
        .into());
    }
    Ok(count)
}

fn long_value(algorithm: &str, value: &Value) -> Result<i64> {
    value.as_i64().ok_or_else(|| {
        RoutingError::Algorithm {
            algorithm: algorithm.to_string(),
            message: format!("sharding value `{}` is not an integer", value),
        }
        .into()
    })
}

/// Target named `<prefix><suffix>` where the prefix does not end in a digit,
/// so `1` picks `t_order_1` and not `t_order_11`.
pub(crate) fn find_target(targets: &[String], suffix: &str) -> Option<String> {
    targets
        .iter()
        .find(|target| {
            target.ends_with(suffix)
                && !target[..target.len() - suffix.len()]
                    .chars()
                    .last()
                    .map_or(false, |c| c.is_ascii_digit())
        })
        .cloned()
}

/// Inclusive integer bound. An excluded bound at the edge of `i64` leaves
/// nothing in the range.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LongBound {
    At(i64),
    Unbounded,
    Empty,
}

fn bound_value(algorithm: &str, bound: &Bound<Value>, lower: bool) -> Result<LongBound> {
    Ok(match bound {
        Bound::Included(value) => LongBound::At(long_value(algorithm, value)?),
        Bound::Excluded(value) => {
            let value = long_value(algorithm, value)?;
            let next = if lower { value.checked_add(1) } else { value.checked_sub(1) };
            next.map_or(LongBound::Empty, LongBound::At)
        }
        Bound::Unbounded => LongBound::Unbounded,
    })
}

/// `value % sharding-count` picks the target with that suffix.
#[derive(Debug, Clone)]
pub struct ModShardingAlgorithm {
    sharding_count: i64,
}

impl ModShardingAlgorithm {
    pub fn new(config: &AlgorithmConfiguration) -> Result<Self> {
        Ok(ModShardingAlgorithm {
            sharding_count: sharding_count(config)?,
        })
    }
}

impl ShardingAlgorithm for ModShardingAlgorithm {
    fn algorithm_type(&self) -> &str {
        "MOD"
    }

    fn shard_precise(&self, targets: &[String], _logic_table: &str, _column: &str, value: &Value) -> Result<Option<String>> {
        let suffix = (long_value("MOD", value)? % self.sharding_count).abs();
        Ok(find_target(targets, &suffix.to_string()))
    }

    fn shard_range(
        &self,
        targets: &[String],
        _logic_table: &str,
        _column: &str,
        lower: &Bound<Value>,
        upper: &Bound<Value>,
    ) -> Result<Vec<String>> {
        let (lower, upper) = match (bound_value("MOD", lower, true)?, bound_value("MOD", upper, false)?) {
            (LongBound::Empty, _) | (_, LongBound::Empty) => return Ok(vec![]),
            (LongBound::At(lower), LongBound::At(upper)) if upper < lower => return Ok(vec![]),
            (LongBound::At(lower), LongBound::At(upper)) => match upper.checked_sub(lower) {
                Some(span) if span < self.sharding_count - 1 => (lower, upper),
                _ => return Ok(targets.to_vec()),
            },
            _ => return Ok(targets.to_vec()),
        };
        let mut result = vec![];
        for value in lower..=upper {
            if let Some(target) = find_target(targets, &(value % self.sharding_count).abs().to_string()) {
                if !result.contains(&target) {
                    result.push(target);
                }
            }
        }
        Ok(result)
    }
}

/// Java `String#hashCode` of the value text, modulo the sharding count.
#[derive(Debug, Clone)]
pub struct HashModShardingAlgorithm {
    sharding_count: i64,
}

impl HashModShardingAlgorithm {
    pub fn new(config: &AlgorithmConfiguration) -> Result<Self> {
        Ok(HashModShardingAlgorithm {
            sharding_count: sharding_count(config)?,
        })
    }
}

fn string_hash_code(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

impl ShardingAlgorithm for HashModShardingAlgorithm {
    fn algorithm_type(&self) -> &str {
        "HASH_MOD"
    }

    fn shard_precise(&self, targets: &[String], _logic_table: &str, _column: &str, value: &Value) -> Result<Option<String>> {
        let hash = i64::from(string_hash_code(&value.to_string())).abs();
        Ok(find_target(targets, &(hash % self.sharding_count).to_string()))
    }
}

/// Partitions split at ascending boundaries: `1,5,10` gives partition 0 below
/// 1, partition 1 for `[1, 5)` and so on up to partition 3 from 10.
#[derive(Debug, Clone)]
pub struct BoundaryRangeShardingAlgorithm {
    boundaries: Vec<i64>,
}

impl BoundaryRangeShardingAlgorithm {
    pub fn new(config: &AlgorithmConfiguration) -> Result<Self> {
        let invalid = || ConfigError::InvalidProperty {
            algorithm: config.algorithm_type.clone(),
            property: "sharding-ranges".to_string(),
        };
        let mut boundaries = vec![];
        for each in required_prop(config, "sharding-ranges")?.split(',') {
            boundaries.push(each.trim().parse::<i64>().map_err(|_| invalid())?);
        }
        if boundaries.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(invalid().into());
        }
        Ok(BoundaryRangeShardingAlgorithm { boundaries })
    }

    fn partition(&self, value: i64) -> usize {
        self.boundaries.iter().filter(|boundary| value >= **boundary).count()
    }
}

impl ShardingAlgorithm for BoundaryRangeShardingAlgorithm {
    fn algorithm_type(&self) -> &str {
        "BOUNDARY_RANGE"
    }

    fn shard_precise(&self, targets: &[String], _logic_table: &str, _column: &str, value: &Value) -> Result<Option<String>> {
        let partition = self.partition(long_value("BOUNDARY_RANGE", value)?);
        Ok(find_target(targets, &partition.to_string()))
    }

    fn shard_range(
        &self,
        targets: &[String],
        _logic_table: &str,
        _column: &str,
        lower: &Bound<Value>,
        upper: &Bound<Value>,
    ) -> Result<Vec<String>> {
        let first = match bound_value("BOUNDARY_RANGE", lower, true)? {
            LongBound::At(value) => self.partition(value),
            LongBound::Unbounded => 0,
            LongBound::Empty => return Ok(vec![]),
        };
        let last = match bound_value("BOUNDARY_RANGE", upper, false)? {
            LongBound::At(value) => self.partition(value),
            LongBound::Unbounded => self.boundaries.len(),
            LongBound::Empty => return Ok(vec![]),
        };
        Ok((first..=last)
            .filter_map(|partition| find_target(targets, &partition.to_string()))
            .collect())
    }
}

/// Target named by a rhai inline expression such as `t_order_${order_id % 2}`.
#[derive(Debug)]
pub struct InlineShardingAlgorithm {
    expression: InlineExpression,
    allow_range_query: bool,
}

impl InlineShardingAlgorithm {
    pub fn new(config: &AlgorithmConfiguration) -> Result<Self> {
        Ok(InlineShardingAlgorithm {
            expression: InlineExpression::compile(&required_prop(config, "algorithm-expression")?)?,
            allow_range_query: config
                .get_bool("allow-range-query-with-inline-sharding")
                .unwrap_or(false),
        })
    }
}

impl ShardingAlgorithm for InlineShardingAlgorithm {
    fn algorithm_type(&self) -> &str {
        "INLINE"
    }

    fn shard_precise(&self, targets: &[String], _logic_table: &str, column: &str, value: &Value) -> Result<Option<String>> {
        let target = self.expression.evaluate(column, value)?;
        Ok(targets.iter().find(|each| each.eq_ignore_ascii_case(&target)).cloned())
    }

    fn shard_range(
        &self,
        targets: &[String],
        logic_table: &str,
        column: &str,
        _lower: &Bound<Value>,
        _upper: &Bound<Value>,
    ) -> Result<Vec<String>> {
        if !self.allow_range_query {
            return Err(RoutingError::Algorithm {
                algorithm: "INLINE".to_string(),
                message: format!("range query on `{}.{}` is not allowed", logic_table, column),
            }
            .into());
        }
        Ok(targets.to_vec())
    }
}
