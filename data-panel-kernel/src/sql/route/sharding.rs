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

use std::sync::Arc;

use log::debug;

use data_panel_common::common::{Result, RoutingError};
use data_panel_common::statement::StatementKind;

use crate::rule::{DataNode, ShardingRule, ShardingStrategy, ShardingValue, TableRule};
use crate::sql::analyse::SQLStatementContext;
use crate::sql::route::condition::{insert_conditions, where_conditions, ShardingCondition};
use crate::sql::route::{RouteContext, RouteEnv, RouteMapper, RouteReplacement, RouteUnit, SQLRouteEngine};

/// Routes sharding and broadcast tables to their data nodes.
#[derive(Debug, Clone)]
pub struct ShardingRouteEngine {
    rule: Arc<ShardingRule>,
}

impl ShardingRouteEngine {
    pub fn new(rule: Arc<ShardingRule>) -> Self {
        ShardingRouteEngine { rule }
    }

    fn table_rule(&self, logic_table: &str) -> Result<&TableRule> {
        self.rule
            .table_rule(logic_table)
            .ok_or_else(|| RoutingError::UnknownLogicTable(logic_table.to_string()).into())
    }

    /// Data nodes of `table_rule` hit by any of the conditions, in data node
    /// order. Values written against any table of `group` apply. When every
    /// condition is unsatisfiable the first data node alone answers.
    fn route_table(
        &self,
        table_rule: &TableRule,
        group: &[String],
        conditions: &[ShardingCondition],
    ) -> Result<Vec<DataNode>> {
        if conditions.is_empty() {
            return Ok(table_rule.actual_data_nodes.clone());
        }
        if conditions.iter().all(ShardingCondition::is_always_false) {
            return Ok(table_rule.actual_data_nodes.iter().take(1).cloned().collect());
        }
        let mut hit = vec![];
        for condition in conditions.iter().filter(|condition| !condition.is_always_false()) {
            hit.extend(self.route_condition(table_rule, group, condition)?);
        }
        Ok(table_rule
            .actual_data_nodes
            .iter()
            .filter(|node| hit.contains(node))
            .cloned()
            .collect())
    }

    fn route_condition(
        &self,
        table_rule: &TableRule,
        group: &[String],
        condition: &ShardingCondition,
    ) -> Result<Vec<DataNode>> {
        let logic_table = table_rule.logic_table.as_str();
        let data_sources = shard(
            table_rule.database_strategy.as_ref(),
            &table_rule.actual_data_sources(),
            logic_table,
            group,
            condition,
        )?;
        let mut result = vec![];
        for data_source in data_sources {
            let tables = shard(
                table_rule.table_strategy.as_ref(),
                &table_rule.actual_tables(&data_source),
                logic_table,
                group,
                condition,
            )?;
            result.extend(tables.iter().map(|table| DataNode::new(&data_source, table)));
        }
        Ok(result)
    }

    /// One table, or tables of one binding group following the first of them.
    fn route_standard(
        &self,
        sharding_tables: &[String],
        broadcast_tables: &[String],
        conditions: &[ShardingCondition],
    ) -> Result<Vec<RouteUnit>> {
        let primary_name = &sharding_tables[0];
        let primary = self.table_rule(primary_name)?;
        let nodes = self.route_table(primary, sharding_tables, conditions)?;
        if nodes.is_empty() {
            return Err(RoutingError::NoDataNode {
                table: primary_name.clone(),
            }
            .into());
        }
        let mut units = Vec::with_capacity(nodes.len());
        for node in nodes {
            let mut mappers = vec![RouteMapper::new(primary_name, &node.table)];
            for binding_table in &sharding_tables[1..] {
                let actual = self
                    .rule
                    .binding_actual_table(primary, &node.table, &node.data_source, binding_table)
                    .ok_or_else(|| RoutingError::NoDataNode {
                        table: binding_table.clone(),
                    })?;
                mappers.push(RouteMapper::new(binding_table, &actual));
            }
            mappers.extend(broadcast_tables.iter().map(|table| RouteMapper::identity(table)));
            units.push(RouteUnit::new(RouteMapper::identity(&node.data_source), mappers)?);
        }
        Ok(units)
    }

    /// Unrelated sharding tables: every combination of their actual tables
    /// inside each data source they all reach.
    fn route_cartesian(
        &self,
        sharding_tables: &[String],
        broadcast_tables: &[String],
        conditions: &[ShardingCondition],
    ) -> Result<Vec<RouteUnit>> {
        let mut routed: Vec<(&String, Vec<DataNode>)> = Vec::with_capacity(sharding_tables.len());
        for table in sharding_tables {
            let table_rule = self.table_rule(table)?;
            let group = self
                .rule
                .binding_table_group(table)
                .map(|group| group.to_vec())
                .unwrap_or_else(|| vec![table.clone()]);
            routed.push((table, self.route_table(table_rule, &group, conditions)?));
        }
        let mut data_sources: Vec<String> = vec![];
        for node in &routed[0].1 {
            let reached_by_all = routed
                .iter()
                .all(|(_, nodes)| nodes.iter().any(|each| each.data_source == node.data_source));
            if reached_by_all && !data_sources.contains(&node.data_source) {
                data_sources.push(node.data_source.clone());
            }
        }
        if data_sources.is_empty() {
            return Err(RoutingError::CartesianUnavailable(sharding_tables.to_vec()).into());
        }

        let mut units = vec![];
        for data_source in &data_sources {
            let mut combinations: Vec<Vec<RouteMapper>> = vec![vec![]];
            for (table, nodes) in &routed {
                let actual_tables: Vec<&DataNode> = nodes.iter().filter(|node| &node.data_source == data_source).collect();
                combinations = combinations
                    .iter()
                    .flat_map(|prefix| {
                        actual_tables.iter().map(move |node| {
                            let mut mappers = prefix.clone();
                            mappers.push(RouteMapper::new(table, &node.table));
                            mappers
                        })
                    })
                    .collect();
            }
            for mut mappers in combinations {
                mappers.extend(broadcast_tables.iter().map(|table| RouteMapper::identity(table)));
                units.push(RouteUnit::new(RouteMapper::identity(data_source), mappers)?);
            }
        }
        Ok(units)
    }

    /// Each VALUES row to exactly one data node.
    fn route_insert(
        &self,
        route_context: &mut RouteContext,
        ctx: &SQLStatementContext<'_>,
        table: &str,
        broadcast_tables: &[String],
    ) -> Result<Vec<RouteUnit>> {
        let table_rule = self.table_rule(table)?;
        let group = vec![table.to_string()];
        let mut original_data_nodes = vec![];
        for condition in insert_conditions(ctx, &self.rule)? {
            let nodes = self.route_condition(table_rule, &group, &condition)?;
            match nodes.len() {
                0 => {
                    return Err(RoutingError::NoDataNode {
                        table: table.to_string(),
                    }
                    .into())
                }
                1 => original_data_nodes.push(nodes),
                count => {
                    return Err(RoutingError::InsertMultipleDataNodes {
                        table: table.to_string(),
                        count,
                    }
                    .into())
                }
            }
        }
        let mut units = vec![];
        for node in &table_rule.actual_data_nodes {
            if original_data_nodes.iter().any(|nodes| nodes.contains(node)) {
                let mut mappers = vec![RouteMapper::new(table, &node.table)];
                mappers.extend(broadcast_tables.iter().map(|table| RouteMapper::identity(table)));
                units.push(RouteUnit::new(RouteMapper::identity(&node.data_source), mappers)?);
            }
        }
        route_context.set_original_data_nodes(original_data_nodes);
        Ok(units)
    }

    /// Reads go to the first data source, everything else to all of them.
    fn route_broadcast(
        &self,
        ctx: &SQLStatementContext<'_>,
        env: &RouteEnv<'_>,
        broadcast_tables: &[String],
    ) -> Result<Vec<RouteUnit>> {
        let mut data_sources = self.rule.data_source_names().to_vec();
        if data_sources.is_empty() {
            if let Some(database) = env.metadata.database(ctx.current_database()) {
                data_sources = database.data_sources.clone();
            }
        }
        if data_sources.is_empty() {
            return Err(RoutingError::NoDataSource(broadcast_tables.join(", ")).into());
        }
        if !ctx.is_write() {
            data_sources.truncate(1);
        }
        let mut units = vec![];
        for data_source in &data_sources {
            let mappers = broadcast_tables.iter().map(|table| RouteMapper::identity(table)).collect();
            units.push(RouteUnit::new(RouteMapper::identity(data_source), mappers)?);
        }
        Ok(units)
    }
}

/// Targets a strategy picks for the condition, all targets without a
/// strategy or without a value for its column.
fn shard(
    strategy: Option<&ShardingStrategy>,
    targets: &[String],
    logic_table: &str,
    group: &[String],
    condition: &ShardingCondition,
) -> Result<Vec<String>> {
    let strategy = match strategy {
        Some(strategy) => strategy,
        None => return Ok(targets.to_vec()),
    };
    let value: Option<&ShardingValue> = group
        .iter()
        .map(|table| table.as_str())
        .chain(std::iter::once(logic_table))
        .find_map(|table| condition.value(table, &strategy.column));
    match value {
        Some(value) => strategy.shard(targets, logic_table, value),
        None => Ok(targets.to_vec()),
    }
}

impl SQLRouteEngine for ShardingRouteEngine {
    fn name(&self) -> &str {
        "sharding"
    }

    fn route(&self, route_context: &mut RouteContext, ctx: &SQLStatementContext<'_>, env: &RouteEnv<'_>) -> Result<()> {
        let table_names = ctx.tables().table_names();
        let sharding_tables: Vec<String> = table_names
            .iter()
            .filter(|table| self.rule.is_sharding_table(table))
            .cloned()
            .collect();
        let broadcast_tables: Vec<String> = table_names
            .iter()
            .filter(|table| self.rule.is_broadcast_table(table))
            .cloned()
            .collect();

        let units = if sharding_tables.is_empty() {
            if broadcast_tables.is_empty() || broadcast_tables.len() != table_names.len() {
                return Ok(());
            }
            self.route_broadcast(ctx, env, &broadcast_tables)?
        } else {
            let insert_table = ctx
                .insert_context()
                .filter(|insert| !insert.rows.is_empty())
                .map(|insert| insert.table.name().to_ascii_lowercase())
                .filter(|table| self.rule.is_sharding_table(table));
            match insert_table {
                Some(table) if ctx.kind() == StatementKind::Insert => {
                    self.route_insert(route_context, ctx, &table, &broadcast_tables)?
                }
                _ => {
                    let conditions = if ctx.kind().is_dml() {
                        where_conditions(ctx, &self.rule)?
                    } else {
                        vec![]
                    };
                    if sharding_tables.len() == 1 || self.rule.is_all_binding_tables(&sharding_tables) {
                        self.route_standard(&sharding_tables, &broadcast_tables, &conditions)?
                    } else {
                        self.route_cartesian(&sharding_tables, &broadcast_tables, &conditions)?
                    }
                }
            }
        };
        debug!(
            "sharding routed {:?} to {}",
            table_names,
            units.iter().map(|unit| unit.to_string()).collect::<Vec<_>>().join("; ")
        );

        let routed: Vec<&String> = sharding_tables.iter().chain(broadcast_tables.iter()).collect();
        let removed = route_context
            .units()
            .iter()
            .filter(|unit| unit.logic_table_names().any(|name| routed.iter().any(|t| t.eq_ignore_ascii_case(name))))
            .cloned()
            .collect();
        route_context.apply(RouteReplacement { removed, added: units });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::metadata::{DatabaseMetaData, MetaData};
    use data_panel_common::statement::{SQLStatement, Value};
    use std::collections::BTreeMap;

    fn route(statement: &SQLStatement, parameters: &[Value]) -> Result<RouteContext> {
        let metadata = MetaData::default().with_database("logic_db", DatabaseMetaData::new(&["ds_0", "ds_1"]));
        let ctx = SQLStatementContext::bind(statement, &metadata, "logic_db", parameters)?;
        let engine = ShardingRouteEngine::new(Arc::new(order_sharding_rule()));
        let env = RouteEnv::new(&metadata, None);
        let mut route_context = RouteContext::new(BTreeMap::new());
        engine.route(&mut route_context, &ctx, &env)?;
        Ok(route_context)
    }

    fn targets(route_context: &RouteContext) -> Vec<String> {
        route_context.units().iter().map(|unit| unit.to_string()).collect()
    }

    #[test]
    fn test_route_single_table_by_equality() {
        let sql = "SELECT * FROM t_order WHERE user_id = ? AND order_id = ?";
        let statement = SQLStatement::Select(select(vec![star(sql)], table(sql, "t_order")).with_where(and(
            eq(column(sql, "user_id"), marker(sql, 0)),
            eq(column(sql, "order_id"), marker(sql, 1)),
        )));
        let route_context = route(&statement, &[Value::Int(1), Value::Int(4)]).unwrap();
        assert_eq!(targets(&route_context), vec!["ds_1->ds_1 [t_order->t_order_0]"]);
    }

    #[test]
    fn test_route_full_and_range() {
        let sql = "SELECT * FROM t_order WHERE order_id > 5";
        let statement = SQLStatement::Select(
            select(vec![star(sql)], table(sql, "t_order"))
                .with_where(binary(column(sql, "order_id"), literal(sql, "5", Value::Int(5)), ">")),
        );
        assert_eq!(route(&statement, &[]).unwrap().units().len(), 4);
    }

    #[test]
    fn test_route_range_at_integer_edges() {
        let sql = "SELECT * FROM t_order WHERE user_id > ?";
        let statement = SQLStatement::Select(
            select(vec![star(sql)], table(sql, "t_order"))
                .with_where(binary(column(sql, "user_id"), marker(sql, 0), ">")),
        );
        let err = route(&statement, &[Value::Int(i64::MAX)]).unwrap_err();
        assert_eq!(err.to_string(), "sharding value for `t_order` routes to no data node");

        let sql = "SELECT * FROM t_order WHERE user_id BETWEEN ? AND ?";
        let statement = SQLStatement::Select(
            select(vec![star(sql)], table(sql, "t_order"))
                .with_where(between(column(sql, "user_id"), marker(sql, 0), marker(sql, 1))),
        );
        let route_context = route(&statement, &[Value::Int(i64::MIN), Value::Int(i64::MAX)]).unwrap();
        assert_eq!(route_context.units().len(), 4);
    }

    #[test]
    fn test_route_intersected_and_unsatisfiable_conditions() {
        let sql = "SELECT * FROM t_order WHERE user_id >= 3 AND user_id <= 3";
        let statement = SQLStatement::Select(select(vec![star(sql)], table(sql, "t_order")).with_where(and(
            binary(column_at(sql, "user_id", 0), literal_at(sql, "3", 0, Value::Int(3)), ">="),
            binary(column_at(sql, "user_id", 1), literal_at(sql, "3", 1, Value::Int(3)), "<="),
        )));
        let route_context = route(&statement, &[]).unwrap();
        assert_eq!(
            targets(&route_context),
            vec!["ds_1->ds_1 [t_order->t_order_0]", "ds_1->ds_1 [t_order->t_order_1]"]
        );

        let sql = "SELECT * FROM t_order WHERE user_id = 1 AND user_id = 2";
        let statement = SQLStatement::Select(select(vec![star(sql)], table(sql, "t_order")).with_where(and(
            eq(column_at(sql, "user_id", 0), literal(sql, "1", Value::Int(1))),
            eq(column_at(sql, "user_id", 1), literal(sql, "2", Value::Int(2))),
        )));
        assert_eq!(targets(&route(&statement, &[]).unwrap()), vec!["ds_0->ds_0 [t_order->t_order_0]"]);
    }

    #[test]
    fn test_route_binding_tables_follow_primary() {
        let sql = "SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE o.order_id = 3";
        let statement = SQLStatement::Select(
            select(
                vec![star(sql)],
                join_on(
                    aliased_table(sql, "t_order", "o"),
                    aliased_table(sql, "t_order_item", "i"),
                    eq(owned_column(sql, "o.order_id"), owned_column(sql, "i.order_id")),
                ),
            )
            .with_where(eq(owned_column_at(sql, "o.order_id", 1), literal(sql, "3", Value::Int(3)))),
        );
        let route_context = route(&statement, &[]).unwrap();
        assert_eq!(
            targets(&route_context),
            vec![
                "ds_0->ds_0 [t_order->t_order_1, t_order_item->t_order_item_1]",
                "ds_1->ds_1 [t_order->t_order_1, t_order_item->t_order_item_1]",
            ]
        );
    }

    #[test]
    fn test_route_cartesian() {
        let sql = "SELECT * FROM t_order o, t_user u WHERE o.user_id = 0 AND o.order_id = 1";
        let statement = SQLStatement::Select(
            select(
                vec![star(sql)],
                comma_join(aliased_table(sql, "t_order", "o"), aliased_table(sql, "t_user", "u")),
            )
            .with_where(and(
                eq(owned_column(sql, "o.user_id"), literal(sql, "0", Value::Int(0))),
                eq(owned_column(sql, "o.order_id"), literal(sql, "1", Value::Int(1))),
            )),
        );
        let route_context = route(&statement, &[]).unwrap();
        assert_eq!(targets(&route_context), vec!["ds_0->ds_0 [t_order->t_order_1, t_user->t_user]"]);
    }

    #[test]
    fn test_route_insert_rows() {
        let sql = "INSERT INTO t_order (order_id, user_id) VALUES (?, ?), (2, 0)";
        let statement = SQLStatement::Insert(insert(
            table(sql, "t_order"),
            sql,
            &["order_id", "user_id"],
            vec![
                values_row(sql, "(?, ?)", vec![marker(sql, 0), marker(sql, 1)]),
                values_row(sql, "(2, 0)", vec![literal(sql, "2", Value::Int(2)), literal(sql, "0", Value::Int(0))]),
            ],
        ));
        let route_context = route(&statement, &[Value::Int(1), Value::Int(1)]).unwrap();
        assert_eq!(
            targets(&route_context),
            vec!["ds_0->ds_0 [t_order->t_order_0]", "ds_1->ds_1 [t_order->t_order_1]"]
        );
        assert_eq!(
            route_context.original_data_nodes(),
            &[vec![DataNode::new("ds_1", "t_order_1")], vec![DataNode::new("ds_0", "t_order_0")]]
        );
    }

    #[test]
    fn test_insert_row_without_sharding_value_fails() {
        let sql = "INSERT INTO t_order (order_id) VALUES (1)";
        let statement = SQLStatement::Insert(insert(
            table(sql, "t_order"),
            sql,
            &["order_id"],
            vec![values_row(sql, "(1)", vec![literal(sql, "1", Value::Int(1))])],
        ));
        let err = route(&statement, &[]).unwrap_err();
        assert_eq!(err.to_string(), "insert into `t_order` routes one row to 2 data nodes");
    }

    #[test]
    fn test_route_broadcast() {
        let sql = "SELECT * FROM t_config";
        let statement = SQLStatement::Select(select(vec![star(sql)], table(sql, "t_config")));
        assert_eq!(targets(&route(&statement, &[]).unwrap()), vec!["ds_0->ds_0 [t_config->t_config]"]);

        let sql = "DELETE FROM t_config";
        let statement = SQLStatement::Delete(delete(table(sql, "t_config"), None));
        assert_eq!(route(&statement, &[]).unwrap().units().len(), 2);
    }

    #[test]
    fn test_route_ddl_to_every_data_node() {
        let sql = "CREATE TABLE t_order (order_id INT)";
        let statement = SQLStatement::CreateTable(create_table(sql, "t_order"));
        assert_eq!(route(&statement, &[]).unwrap().units().len(), 4);
    }
}
