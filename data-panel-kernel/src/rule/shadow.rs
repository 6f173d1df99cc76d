use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;

use data_panel_common::common::{ConfigError, Result};
use data_panel_common::config::{AlgorithmConfiguration, ShadowRuleConfiguration};

use crate::rule::registry::{required_prop, AlgorithmRegistry, ShadowAlgorithm, ShadowCondition, ShadowOperation};

/// Hint marking a statement as shadow traffic.
pub const SHADOW_HINT: &str = "SHADOW";

fn is_true(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

fn operation(config: &AlgorithmConfiguration) -> Result<ShadowOperation> {
    ShadowOperation::parse(&required_prop(config, "operation")?).ok_or_else(|| {
        ConfigError::InvalidProperty {
            algorithm: config.algorithm_type.clone(),
            property: "operation".to_string(),
        }
        .into()
    })
}

/// Matches statements carrying `SHADOW=true` in their hints.
#[derive(Debug, Clone)]
pub struct SQLHintShadowAlgorithm {
    shadow: bool,
}

impl SQLHintShadowAlgorithm {
    pub fn new(config: &AlgorithmConfiguration) -> Self {
        SQLHintShadowAlgorithm {
            shadow: config.get_bool("shadow").unwrap_or(true),
        }
    }
}

impl ShadowAlgorithm for SQLHintShadowAlgorithm {
    fn algorithm_type(&self) -> &str {
        "SQL_HINT"
    }

    fn is_hint(&self) -> bool {
        true
    }

    fn is_shadow(&self, condition: &ShadowCondition<'_>) -> bool {
        match condition {
            ShadowCondition::Hint { hints, .. } => {
                hints.get(SHADOW_HINT).map_or(false, |value| is_true(value) == self.shadow)
            }
            ShadowCondition::Column { .. } => false,
        }
    }
}

/// Matches when `column` of an `operation` carries `value`.
#[derive(Debug, Clone)]
pub struct ValueMatchShadowAlgorithm {
    column: String,
    operation: ShadowOperation,
    value: String,
}

impl ValueMatchShadowAlgorithm {
    pub fn new(config: &AlgorithmConfiguration) -> Result<Self> {
        Ok(ValueMatchShadowAlgorithm {
            column: required_prop(config, "column")?,
            operation: operation(config)?,
            value: required_prop(config, "value")?,
        })
    }
}

impl ShadowAlgorithm for ValueMatchShadowAlgorithm {
    fn algorithm_type(&self) -> &str {
        "VALUE_MATCH"
    }

    fn is_hint(&self) -> bool {
        false
    }

    fn is_shadow(&self, condition: &ShadowCondition<'_>) -> bool {
        match condition {
            ShadowCondition::Column {
                operation,
                column,
                values,
                ..
            } => {
                *operation == self.operation
                    && column.eq_ignore_ascii_case(&self.column)
                    && values.iter().any(|value| value.to_string() == self.value)
            }
            ShadowCondition::Hint { .. } => false,
        }
    }
}

/// Matches when `column` of an `operation` carries a value matching `regex` in full.
#[derive(Debug, Clone)]
pub struct RegexMatchShadowAlgorithm {
    column: String,
    operation: ShadowOperation,
    regex: Regex,
}

impl RegexMatchShadowAlgorithm {
    pub fn new(config: &AlgorithmConfiguration) -> Result<Self> {
        let pattern = required_prop(config, "regex")?;
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|_| ConfigError::InvalidProperty {
            algorithm: config.algorithm_type.clone(),
            property: "regex".to_string(),
        })?;
        Ok(RegexMatchShadowAlgorithm {
            column: required_prop(config, "column")?,
            operation: operation(config)?,
            regex,
        })
    }
}

impl ShadowAlgorithm for RegexMatchShadowAlgorithm {
    fn algorithm_type(&self) -> &str {
        "REGEX_MATCH"
    }

    fn is_hint(&self) -> bool {
        false
    }

    fn is_shadow(&self, condition: &ShadowCondition<'_>) -> bool {
        match condition {
            ShadowCondition::Column {
                operation,
                column,
                values,
                ..
            } => {
                *operation == self.operation
                    && column.eq_ignore_ascii_case(&self.column)
                    && values.iter().any(|value| self.regex.is_match(&value.to_string()))
            }
            ShadowCondition::Hint { .. } => false,
        }
    }
}

/// Production data source and the shadow data source its traffic may move to.
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowDataSource {
    pub name: String,
    pub production: String,
    pub shadow: String,
}

#[derive(Debug, Clone)]
pub struct ShadowTable {
    pub data_source_names: Vec<String>,
    pub algorithms: Vec<Arc<dyn ShadowAlgorithm>>,
}

#[derive(Debug, Clone)]
pub struct ShadowRule {
    data_sources: BTreeMap<String, ShadowDataSource>,
    tables: BTreeMap<String, ShadowTable>,
    default_algorithm: Option<Arc<dyn ShadowAlgorithm>>,
}

impl ShadowRule {
    pub fn new(config: &ShadowRuleConfiguration, registry: &AlgorithmRegistry) -> Result<Self> {
        let mut algorithms = BTreeMap::new();
        for (name, algorithm) in &config.shadow_algorithms {
            algorithms.insert(name.clone(), registry.shadow_algorithm(algorithm)?);
        }
        let find = |name: &String| -> Result<Arc<dyn ShadowAlgorithm>> {
            algorithms.get(name).cloned().ok_or_else(|| {
                ConfigError::MissingAlgorithm {
                    algorithm: name.clone(),
                }
                .into()
            })
        };

        let data_sources = config
            .data_sources
            .iter()
            .map(|(name, data_source)| {
                (
                    name.clone(),
                    ShadowDataSource {
                        name: name.clone(),
                        production: data_source.production_data_source_name.clone(),
                        shadow: data_source.shadow_data_source_name.clone(),
                    },
                )
            })
            .collect();
        let mut tables = BTreeMap::new();
        for (name, table) in &config.tables {
            let mut table_algorithms = vec![];
            for algorithm_name in &table.shadow_algorithm_names {
                table_algorithms.push(find(algorithm_name)?);
            }
            tables.insert(
                name.to_ascii_lowercase(),
                ShadowTable {
                    data_source_names: table.data_source_names.clone(),
                    algorithms: table_algorithms,
                },
            );
        }
        let default_algorithm = match &config.default_shadow_algorithm_name {
            Some(name) => {
                let algorithm = find(name)?;
                if !algorithm.is_hint() {
                    return Err(ConfigError::Invalid(format!(
                        "default shadow algorithm `{}` must be a hint algorithm",
                        name
                    ))
                    .into());
                }
                Some(algorithm)
            }
            None => None,
        };
        Ok(ShadowRule {
            data_sources,
            tables,
            default_algorithm,
        })
    }

    /// Shadow mapping whose production data source is `data_source`.
    pub fn find_by_production(&self, data_source: &str) -> Option<&ShadowDataSource> {
        self.data_sources
            .values()
            .find(|each| each.production.eq_ignore_ascii_case(data_source))
    }

    pub fn table(&self, logic_table: &str) -> Option<&ShadowTable> {
        self.tables.get(&logic_table.to_ascii_lowercase())
    }

    pub fn default_algorithm(&self) -> Option<&Arc<dyn ShadowAlgorithm>> {
        self.default_algorithm.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_panel_common::config::{PropValue, RuleConfiguration};
    use data_panel_common::statement::Value;

    #[test]
    fn test_sql_hint_algorithm() {
        let algorithm = SQLHintShadowAlgorithm::new(&AlgorithmConfiguration::new("SQL_HINT"));
        let mut hints = BTreeMap::new();
        assert!(!algorithm.is_shadow(&ShadowCondition::Hint { table: "t_order", hints: &hints }));
        hints.insert(SHADOW_HINT.to_string(), "TRUE".to_string());
        assert!(algorithm.is_shadow(&ShadowCondition::Hint { table: "t_order", hints: &hints }));
    }

    fn column_condition<'c>(operation: ShadowOperation, column: &'c str, values: &'c [Value]) -> ShadowCondition<'c> {
        ShadowCondition::Column {
            table: "t_order",
            operation,
            column,
            values,
        }
    }

    #[test]
    fn test_column_algorithms() {
        let value_match = ValueMatchShadowAlgorithm::new(
            &AlgorithmConfiguration::new("VALUE_MATCH")
                .with_prop("column", PropValue::Text("user_id".into()))
                .with_prop("operation", PropValue::Text("insert".into()))
                .with_prop("value", PropValue::Int(1)),
        )
        .unwrap();
        let values = [Value::Int(1)];
        assert!(value_match.is_shadow(&column_condition(ShadowOperation::Insert, "USER_ID", &values)));
        assert!(!value_match.is_shadow(&column_condition(ShadowOperation::Select, "user_id", &values)));

        let regex_match = RegexMatchShadowAlgorithm::new(
            &AlgorithmConfiguration::new("REGEX_MATCH")
                .with_prop("column", PropValue::Text("user_id".into()))
                .with_prop("operation", PropValue::Text("select".into()))
                .with_prop("regex", PropValue::Text("[1]".into())),
        )
        .unwrap();
        assert!(regex_match.is_shadow(&column_condition(ShadowOperation::Select, "user_id", &values)));
        let values = [Value::Int(11)];
        assert!(!regex_match.is_shadow(&column_condition(ShadowOperation::Select, "user_id", &values)));
    }

    #[test]
    fn test_shadow_rule_from_config() {
        let config = RuleConfiguration::from_yaml_str(
            r#"
shadow:
  data_sources:
    shadow_group: { production_data_source_name: ds_0, shadow_data_source_name: ds_0_shadow }
  tables:
    t_order: { data_source_names: [shadow_group], shadow_algorithm_names: [sql_hint] }
  shadow_algorithms:
    sql_hint: { type: SQL_HINT }
  default_shadow_algorithm_name: sql_hint
"#,
        )
        .unwrap();
        let rule = ShadowRule::new(config.shadow.as_ref().unwrap(), &AlgorithmRegistry::default()).unwrap();
        assert_eq!(rule.find_by_production("DS_0").map(|ds| ds.shadow.as_str()), Some("ds_0_shadow"));
        assert!(rule.find_by_production("ds_1").is_none());
        assert_eq!(rule.table("T_ORDER").unwrap().algorithms.len(), 1);
        assert!(rule.default_algorithm().is_some());
    }
}
