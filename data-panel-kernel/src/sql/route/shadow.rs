// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;

use data_panel_common::common::Result;
use data_panel_common::statement::{ColumnSegment, StatementKind, Value};

use crate::rule::{ShadowCondition, ShadowDataSource, ShadowOperation, ShadowRule, ShardingValue};
use crate::sql::analyse::SQLStatementContext;
use crate::sql::extract::expression::extract_and_predicates;
use crate::sql::route::condition::predicate_value;
use crate::sql::route::{RouteContext, RouteEnv, RouteReplacement, SQLRouteEngine};

/// Column values a statement writes or filters on.
struct ColumnValues {
    table: String,
    column: String,
    values: Vec<Value>,
}

/// Moves units on a production data source to its shadow data source when a
/// shadow algorithm matches the statement.
#[derive(Debug, Clone)]
pub struct ShadowRouteEngine {
    rule: Arc<ShadowRule>,
}

impl ShadowRouteEngine {
    pub fn new(rule: Arc<ShadowRule>) -> Self {
        ShadowRouteEngine { rule }
    }

    fn is_shadow(
        &self,
        ctx: &SQLStatementContext<'_>,
        hints: &BTreeMap<String, String>,
        data_source: &ShadowDataSource,
        column_values: &[ColumnValues],
    ) -> bool {
        let shadow_tables: Vec<&String> = ctx
            .tables()
            .table_names()
            .iter()
            .filter(|table| {
                self.rule.table(table).map_or(false, |shadow_table| {
                    shadow_table.data_source_names.is_empty()
                        || shadow_table.data_source_names.contains(&data_source.name)
                })
            })
            .collect();
        if shadow_tables.is_empty() {
            return self
                .rule
                .default_algorithm()
                .map_or(false, |algorithm| algorithm.is_shadow(&ShadowCondition::Hint { table: "", hints }));
        }
        let operation = operation(ctx.kind());
        for table in shadow_tables {
            let shadow_table = match self.rule.table(table) {
                Some(shadow_table) => shadow_table,
                None => continue,
            };
            for algorithm in &shadow_table.algorithms {
                let matched = if algorithm.is_hint() {
                    algorithm.is_shadow(&ShadowCondition::Hint { table, hints })
                } else {
                    match operation {
                        Some(operation) => column_values.iter().filter(|each| &each.table == table).any(|each| {
                            algorithm.is_shadow(&ShadowCondition::Column {
                                table,
                                operation,
                                column: &each.column,
                                values: &each.values,
                            })
                        }),
                        None => false,
                    }
                };
                if matched {
                    debug!("shadow algorithm {} matched table {}", algorithm.algorithm_type(), table);
                    return true;
                }
            }
        }
        false
    }
}

fn operation(kind: StatementKind) -> Option<ShadowOperation> {
    match kind {
        StatementKind::Select => Some(ShadowOperation::Select),
        StatementKind::Insert => Some(ShadowOperation::Insert),
        StatementKind::Update => Some(ShadowOperation::Update),
        StatementKind::Delete => Some(ShadowOperation::Delete),
        _ => None,
    }
}

fn column_table(ctx: &SQLStatementContext<'_>, column: &ColumnSegment) -> Option<String> {
    if let Some(table) = ctx.column_table(column) {
        return Some(table.to_ascii_lowercase());
    }
    if let Some(owner) = column.owner_name() {
        return ctx
            .tables()
            .find_table_by_qualifier(owner)
            .map(|table| table.name().to_ascii_lowercase());
    }
    match ctx.tables().table_names() {
        [only] => Some(only.clone()),
        _ => None,
    }
}

/// Insert row values per column, or the `=` / `IN` values of the WHERE.
fn column_values(ctx: &SQLStatementContext<'_>) -> Result<Vec<ColumnValues>> {
    let mut result = vec![];
    if let Some(insert) = ctx.insert_context() {
        let table = insert.table.name().to_ascii_lowercase();
        for (index, column) in insert.columns.iter().enumerate() {
            let values = insert
                .rows
                .iter()
                .filter_map(|row| row.value(index, ctx.parameters()))
                .collect();
            result.push(ColumnValues {
                table: table.clone(),
                column: column.clone(),
                values,
            });
        }
        return Ok(result);
    }
    for where_segment in ctx.where_segments() {
        for and_predicate in extract_and_predicates(&where_segment.expr) {
            for predicate in and_predicate.predicates {
                if let Some((column, ShardingValue::List(values))) = predicate_value(predicate, ctx.parameters())? {
                    if let Some(table) = column_table(ctx, column) {
                        result.push(ColumnValues {
                            table,
                            column: column.name().to_string(),
                            values,
                        });
                    }
                }
            }
        }
    }
    Ok(result)
}

impl SQLRouteEngine for ShadowRouteEngine {
    fn name(&self) -> &str {
        "shadow"
    }

    fn route(&self, route_context: &mut RouteContext, ctx: &SQLStatementContext<'_>, _: &RouteEnv<'_>) -> Result<()> {
        let column_values = column_values(ctx)?;
        let mut replacement = RouteReplacement::default();
        for unit in route_context.units() {
            let data_source = match self.rule.find_by_production(&unit.data_source_mapper().actual_name) {
                Some(data_source) => data_source,
                None => continue,
            };
            if self.is_shadow(ctx, route_context.hints(), data_source, &column_values) {
                debug!("unit {} routed to shadow data source {}", unit, data_source.shadow);
                replacement.replace(unit.clone(), unit.with_actual_data_source(&data_source.shadow));
            }
        }
        route_context.apply(replacement);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::metadata::MetaData;
    use crate::rule::{AlgorithmRegistry, RuleSet, ShadowAlgorithm};
    use crate::sql::route::{RouteMapper, RouteUnit};
    use data_panel_common::config::RuleConfiguration;
    use data_panel_common::statement::SQLStatement;

    #[derive(Debug)]
    struct AlwaysShadowAlgorithm;

    impl ShadowAlgorithm for AlwaysShadowAlgorithm {
        fn algorithm_type(&self) -> &str {
            "ALWAYS"
        }

        fn is_hint(&self) -> bool {
            true
        }

        fn is_shadow(&self, _: &ShadowCondition<'_>) -> bool {
            true
        }
    }

    fn engine(yaml: &str) -> ShadowRouteEngine {
        let mut registry = AlgorithmRegistry::default();
        registry.register_shadow("ALWAYS", |_| Ok(Arc::new(AlwaysShadowAlgorithm)));
        let config = RuleConfiguration::from_yaml_str(yaml).unwrap();
        ShadowRouteEngine::new(RuleSet::new(&config, &registry).unwrap().shadow.unwrap())
    }

    fn route(engine: &ShadowRouteEngine, statement: &SQLStatement, parameters: &[Value], hints: &[(&str, &str)]) -> RouteContext {
        let metadata = MetaData::default();
        let ctx = SQLStatementContext::bind(statement, &metadata, "logic_db", parameters).unwrap();
        let hints = hints.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        let mut route_context = RouteContext::new(hints);
        route_context.add_unit(RouteUnit::new(RouteMapper::identity("ds_0"), vec![RouteMapper::identity("t_order")]).unwrap());
        route_context.add_unit(RouteUnit::new(RouteMapper::identity("ds_1"), vec![RouteMapper::identity("t_order")]).unwrap());
        engine.route(&mut route_context, &ctx, &RouteEnv::new(&metadata, None)).unwrap();
        route_context
    }

    fn select_order() -> SQLStatement {
        let sql = "SELECT * FROM t_order";
        SQLStatement::Select(select(vec![star(sql)], table(sql, "t_order")))
    }

    #[test]
    fn test_matching_algorithm_moves_unit_to_shadow() {
        let engine = engine(
            r#"
shadow:
  data_sources:
    shadow_group: { production_data_source_name: ds_0, shadow_data_source_name: ds_0_shadow }
  tables:
    t_order: { data_source_names: [shadow_group], shadow_algorithm_names: [always] }
  shadow_algorithms:
    always: { type: ALWAYS }
"#,
        );
        let route_context = route(&engine, &select_order(), &[], &[]);
        let unit = &route_context.units()[0];
        assert_eq!(unit.data_source_mapper().actual_name, "ds_0_shadow");
        assert_eq!(unit.data_source_mapper().logic_name, "ds_0");
        assert_eq!(unit.actual_table_name("t_order"), Some("t_order"));
        assert_eq!(route_context.units()[1].data_source_mapper().actual_name, "ds_1");
    }

    #[test]
    fn test_column_algorithm_on_insert_values() {
        let engine = engine(
            r#"
shadow:
  data_sources:
    shadow_group: { production_data_source_name: ds_0, shadow_data_source_name: ds_0_shadow }
  tables:
    t_order: { data_source_names: [shadow_group], shadow_algorithm_names: [test_user] }
  shadow_algorithms:
    test_user: { type: VALUE_MATCH, props: { column: user_id, operation: insert, value: 0 } }
"#,
        );
        let sql = "INSERT INTO t_order (order_id, user_id) VALUES (?, ?)";
        let statement = SQLStatement::Insert(insert(
            table(sql, "t_order"),
            sql,
            &["order_id", "user_id"],
            vec![values_row(sql, "(?, ?)", vec![marker(sql, 0), marker(sql, 1)])],
        ));
        let shadowed = route(&engine, &statement, &[Value::Int(1), Value::Int(0)], &[]);
        assert_eq!(shadowed.actual_data_source_names(), vec!["ds_0_shadow", "ds_1"]);
        let production = route(&engine, &statement, &[Value::Int(1), Value::Int(7)], &[]);
        assert_eq!(production.actual_data_source_names(), vec!["ds_0", "ds_1"]);
    }

    #[test]
    fn test_default_hint_algorithm_for_other_tables() {
        let engine = engine(
            r#"
shadow:
  data_sources:
    shadow_group: { production_data_source_name: ds_0, shadow_data_source_name: ds_0_shadow }
  shadow_algorithms:
    sql_hint: { type: SQL_HINT }
  default_shadow_algorithm_name: sql_hint
"#,
        );
        assert_eq!(
            route(&engine, &select_order(), &[], &[]).actual_data_source_names(),
            vec!["ds_0", "ds_1"]
        );
        assert_eq!(
            route(&engine, &select_order(), &[], &[("SHADOW", "true")]).actual_data_source_names(),
            vec!["ds_0_shadow", "ds_1"]
        );
    }
}
