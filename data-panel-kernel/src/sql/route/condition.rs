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

use std::cmp::Ordering;
use std::ops::Bound;

use data_panel_common::common::{Result, RoutingError};
use data_panel_common::statement::{ColumnSegment, ExpressionSegment, Value};

use crate::rule::{ShardingRule, ShardingValue};
use crate::sql::analyse::SQLStatementContext;
use crate::sql::extract::expression::extract_and_predicates;

/// Sharding value of one column of one logic table.
#[derive(Debug, Clone, PartialEq)]
pub struct ShardingConditionValue {
    pub table: String,
    pub column: String,
    pub value: ShardingValue,
}

/// Values of one OR branch, or of one insert row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShardingCondition {
    pub values: Vec<ShardingConditionValue>,
}

impl ShardingCondition {
    /// Value constraining `column` of `table`, every constraint of the
    /// branch intersected.
    pub fn value(&self, table: &str, column: &str) -> Option<&ShardingValue> {
        self.values
            .iter()
            .find(|each| each.table.eq_ignore_ascii_case(table) && each.column.eq_ignore_ascii_case(column))
            .map(|each| &each.value)
    }

    /// No row can satisfy the branch.
    pub fn is_always_false(&self) -> bool {
        self.values
            .iter()
            .any(|each| matches!(&each.value, ShardingValue::List(values) if values.is_empty()))
    }

    fn push(&mut self, table: String, column: &str, value: ShardingValue) {
        let column = column.to_ascii_lowercase();
        match self
            .values
            .iter_mut()
            .find(|each| each.table.eq_ignore_ascii_case(&table) && each.column == column)
        {
            Some(existing) => {
                let current = std::mem::replace(&mut existing.value, ShardingValue::List(vec![]));
                existing.value = intersect(current, value);
            }
            None => self.values.push(ShardingConditionValue { table, column, value }),
        }
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    a == b || a.compare(b) == Some(Ordering::Equal)
}

/// Values of unlike kinds do not compare and are kept.
fn above(value: &Value, lower: &Bound<Value>) -> bool {
    match lower {
        Bound::Included(bound) => value.compare(bound) != Some(Ordering::Less),
        Bound::Excluded(bound) => !matches!(value.compare(bound), Some(Ordering::Less) | Some(Ordering::Equal)),
        Bound::Unbounded => true,
    }
}

fn below(value: &Value, upper: &Bound<Value>) -> bool {
    match upper {
        Bound::Included(bound) => value.compare(bound) != Some(Ordering::Greater),
        Bound::Excluded(bound) => !matches!(value.compare(bound), Some(Ordering::Greater) | Some(Ordering::Equal)),
        Bound::Unbounded => true,
    }
}

/// The narrower of two bounds on the same side; `lower` picks the greater.
fn narrower(a: Bound<Value>, b: Bound<Value>, lower: bool) -> Bound<Value> {
    let wanted = if lower { Ordering::Greater } else { Ordering::Less };
    let take_other = match (&a, &b) {
        (Bound::Unbounded, _) => true,
        (_, Bound::Unbounded) => false,
        (Bound::Included(x) | Bound::Excluded(x), Bound::Included(y) | Bound::Excluded(y)) => match x.compare(y) {
            Some(Ordering::Equal) => matches!(b, Bound::Excluded(_)),
            Some(ordering) => ordering != wanted,
            None => false,
        },
    };
    if take_other {
        b
    } else {
        a
    }
}

fn is_empty_range(lower: &Bound<Value>, upper: &Bound<Value>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l.compare(u) == Some(Ordering::Greater),
        (Bound::Included(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u))
        | (Bound::Excluded(l), Bound::Excluded(u)) => {
            matches!(l.compare(u), Some(Ordering::Greater) | Some(Ordering::Equal))
        }
        _ => false,
    }
}

/// Both constraints of one AND branch at once. An empty `List` is the
/// unsatisfiable result.
fn intersect(a: ShardingValue, b: ShardingValue) -> ShardingValue {
    match (a, b) {
        (ShardingValue::List(a), ShardingValue::List(b)) => {
            ShardingValue::List(a.into_iter().filter(|x| b.iter().any(|y| same_value(x, y))).collect())
        }
        (ShardingValue::List(values), ShardingValue::Range { lower, upper })
        | (ShardingValue::Range { lower, upper }, ShardingValue::List(values)) => ShardingValue::List(
            values
                .into_iter()
                .filter(|value| above(value, &lower) && below(value, &upper))
                .collect(),
        ),
        (
            ShardingValue::Range { lower, upper },
            ShardingValue::Range {
                lower: other_lower,
                upper: other_upper,
            },
        ) => {
            let lower = narrower(lower, other_lower, true);
            let upper = narrower(upper, other_upper, false);
            if is_empty_range(&lower, &upper) {
                ShardingValue::List(vec![])
            } else {
                ShardingValue::Range { lower, upper }
            }
        }
    }
}

/// Literal or bound parameter; a marker past the parameter list is an error.
fn condition_value(expression: &ExpressionSegment, parameters: &[Value]) -> Result<Option<Value>> {
    match expression {
        ExpressionSegment::Literal(literal) => Ok(Some(literal.value.clone())),
        ExpressionSegment::ParameterMarker(marker) => match parameters.get(marker.index) {
            Some(value) => Ok(Some(value.clone())),
            None => Err(RoutingError::ParameterIndexOutOfRange {
                index: marker.index,
                count: parameters.len(),
            }
            .into()),
        },
        _ => Ok(None),
    }
}

/// Sharding table whose sharding column `column` is.
fn sharding_table(ctx: &SQLStatementContext<'_>, rule: &ShardingRule, column: &ColumnSegment) -> Option<String> {
    let is_sharding_column = |table: &str| {
        rule.table_rule(table)
            .map_or(false, |table_rule| table_rule.is_sharding_column(column.name()))
    };
    if let Some(table) = ctx.column_table(column) {
        return if is_sharding_column(table) { Some(table.to_string()) } else { None };
    }
    if let Some(owner) = column.owner_name() {
        let table = ctx.tables().find_table_by_qualifier(owner)?.name().to_ascii_lowercase();
        return if is_sharding_column(&table) { Some(table) } else { None };
    }
    let mut candidates = ctx
        .tables()
        .table_names()
        .iter()
        .filter(|table| is_sharding_column(table));
    match (candidates.next(), candidates.next()) {
        (Some(table), None) => Some(table.clone()),
        _ => None,
    }
}

fn reverse(operator: &str) -> &str {
    match operator {
        "<" => ">",
        "<=" => ">=",
        ">" => "<",
        ">=" => "<=",
        other => other,
    }
}

fn compare_range(operator: &str, value: Value) -> ShardingValue {
    let (lower, upper) = match operator {
        "<" => (Bound::Unbounded, Bound::Excluded(value)),
        "<=" => (Bound::Unbounded, Bound::Included(value)),
        ">" => (Bound::Excluded(value), Bound::Unbounded),
        _ => (Bound::Included(value), Bound::Unbounded),
    };
    ShardingValue::Range { lower, upper }
}

pub(crate) fn predicate_value<'e>(
    predicate: &'e ExpressionSegment,
    parameters: &[Value],
) -> Result<Option<(&'e ColumnSegment, ShardingValue)>> {
    match predicate {
        ExpressionSegment::BinaryOperation(binary) if binary.is_equal() || binary.is_compare() => {
            let (column, value, operator) = match (binary.left.as_column(), binary.right.as_column()) {
                (Some(column), None) => (column, &binary.right, binary.operator.as_str()),
                (None, Some(column)) => (column, &binary.left, reverse(&binary.operator)),
                _ => return Ok(None),
            };
            let value = match condition_value(value, parameters)? {
                Some(value) => value,
                None => return Ok(None),
            };
            if binary.is_equal() {
                Ok(Some((column, ShardingValue::List(vec![value]))))
            } else {
                Ok(Some((column, compare_range(operator, value))))
            }
        }
        ExpressionSegment::In(in_expression) if !in_expression.not => {
            let column = match in_expression.left.as_column() {
                Some(column) => column,
                None => return Ok(None),
            };
            let items = match &*in_expression.right {
                ExpressionSegment::List(list) => &list.items,
                ExpressionSegment::Row(row) => &row.items,
                _ => return Ok(None),
            };
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match condition_value(item, parameters)? {
                    Some(value) => values.push(value),
                    None => return Ok(None),
                }
            }
            Ok(Some((column, ShardingValue::List(values))))
        }
        ExpressionSegment::Between(between) if !between.not => {
            let column = match between.left.as_column() {
                Some(column) => column,
                None => return Ok(None),
            };
            match (
                condition_value(&between.between, parameters)?,
                condition_value(&between.and, parameters)?,
            ) {
                (Some(lower), Some(upper)) => Ok(Some((
                    column,
                    ShardingValue::Range {
                        lower: Bound::Included(lower),
                        upper: Bound::Included(upper),
                    },
                ))),
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

/// One condition per OR branch over every WHERE of the statement. An empty
/// result means some branch leaves the sharding columns free, a full route.
pub fn where_conditions(ctx: &SQLStatementContext<'_>, rule: &ShardingRule) -> Result<Vec<ShardingCondition>> {
    let mut branches = vec![ShardingCondition::default()];
    for where_segment in ctx.where_segments() {
        let mut next = vec![];
        for and_predicate in extract_and_predicates(&where_segment.expr) {
            let mut own = ShardingCondition::default();
            for predicate in and_predicate.predicates {
                if let Some((column, value)) = predicate_value(predicate, ctx.parameters())? {
                    if let Some(table) = sharding_table(ctx, rule, column) {
                        own.push(table, column.name(), value);
                    }
                }
            }
            for branch in &branches {
                let mut merged = branch.clone();
                for each in &own.values {
                    merged.push(each.table.clone(), &each.column, each.value.clone());
                }
                next.push(merged);
            }
        }
        branches = next;
    }
    if branches.iter().any(|branch| branch.values.is_empty()) {
        return Ok(vec![]);
    }
    Ok(branches)
}

/// One condition per insert row, from the values of the sharding columns.
pub fn insert_conditions(ctx: &SQLStatementContext<'_>, rule: &ShardingRule) -> Result<Vec<ShardingCondition>> {
    let insert = match ctx.insert_context() {
        Some(insert) => insert,
        None => return Ok(vec![]),
    };
    let table = insert.table.name().to_ascii_lowercase();
    let table_rule = match rule.table_rule(&table) {
        Some(table_rule) => table_rule,
        None => return Ok(vec![]),
    };
    let mut result = Vec::with_capacity(insert.rows.len());
    for row in &insert.rows {
        let mut condition = ShardingCondition::default();
        for (index, column) in insert.columns.iter().enumerate() {
            if !table_rule.is_sharding_column(column) {
                continue;
            }
            if let Some(expression) = row.values.get(index) {
                if let Some(value) = condition_value(expression, ctx.parameters())? {
                    condition.push(table.clone(), column, ShardingValue::List(vec![value]));
                }
            }
        }
        result.push(condition);
    }
    Ok(result)
}
