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

use data_panel_common::statement::{
    ExpressionSegment, LimitSegment, PaginationValue, ParameterMarkerType, SQLStatement, SelectStatement, TableSegment,
    Value, WhereSegment,
};

use crate::metadata::TableMetaData;
use crate::sql::analyse::binding::{derived_tables, nested_selects, ColumnBinder};
use crate::sql::analyse::projection::{is_same_items, OrderByItem, ProjectionsContext};
use crate::sql::analyse::{BindEnv, SAResult, SQLAnalyse, SQLStatementContext};
use crate::sql::extract::column::select_expressions;
use crate::sql::extract::expression::{extract_and_predicates, extract_parameter_markers};
use crate::sql::extract::TableRef;

/// Select facet of a statement context.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectContext<'a> {
    pub projections: ProjectionsContext,
    pub group_by_items: Vec<OrderByItem<'a>>,
    pub order_by_items: Vec<OrderByItem<'a>>,
    pub pagination: Option<Pagination<'a>>,
    /// `FOR UPDATE` / `LOCK IN SHARE MODE`.
    pub lock: bool,
}

impl<'a> SelectContext<'a> {
    pub fn is_same_group_by_and_order_by_items(&self) -> bool {
        is_same_items(&self.group_by_items, &self.order_by_items)
    }

    pub fn is_group_by(&self) -> bool {
        !self.group_by_items.is_empty()
    }
}

/// LIMIT with offset and row count resolved against the bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Pagination<'a> {
    pub segment: &'a LimitSegment,
    pub offset: Option<i64>,
    pub row_count: Option<i64>,
}

impl<'a> Pagination<'a> {
    fn new(segment: &'a LimitSegment, parameters: &[Value]) -> Self {
        let resolve = |value: &Option<PaginationValue>| match value {
            Some(PaginationValue::Number { value, .. }) => Some(*value),
            Some(PaginationValue::ParameterMarker { index, .. }) => parameters.get(*index).and_then(|v| v.as_i64()),
            None => None,
        };
        Pagination {
            segment,
            offset: resolve(&segment.offset),
            row_count: resolve(&segment.row_count),
        }
    }
}

pub(super) fn bind<'a>(ctx: &mut SQLStatementContext<'a>, env: &BindEnv<'_>) -> SAResult {
    let statement = ctx.statement;
    if let SQLStatement::Select(select) = statement {
        select.analyse(ctx, env)?;
    }
    Ok(())
}

impl<'a> SQLAnalyse<'a> for SelectStatement {
    fn analyse(&'a self, ctx: &mut SQLStatementContext<'a>, env: &BindEnv<'_>) -> SAResult {
        let mut binder = ColumnBinder::new(env);
        binder.bind_select(self, &[])?;
        ctx.columns = binder.columns;

        collect_where_segments(self, &mut ctx.where_segments);
        ctx.join_conditions = join_conditions(&ctx.where_segments, self.from.as_ref());

        let scope_tables: Vec<(TableRef<'a>, Option<&TableMetaData>)> = ctx
            .tables
            .tables()
            .iter()
            .map(|table| (*table, table.as_simple().and_then(|simple| env.table_metadata(simple))))
            .collect();
        let mut projections = ProjectionsContext::new(&self.projections, &scope_tables);
        let mut group_by_items = vec![];
        if let Some(group_by) = &self.group_by {
            for item in &group_by.items {
                let index = projections.resolve_item_index(item, true)?;
                group_by_items.push(OrderByItem { segment: item, index });
            }
        }
        let mut order_by_items = vec![];
        if let Some(order_by) = &self.order_by {
            for item in &order_by.items {
                let index = projections.resolve_item_index(item, false)?;
                order_by_items.push(OrderByItem { segment: item, index });
            }
        }

        let nested = nested_selects(self);
        let mut tables = vec![];
        if let Some(from) = &self.from {
            derived_tables(from, &mut tables);
        }
        ctx.contains_subquery = !nested.is_empty();
        ctx.contains_table_subquery = !tables.is_empty();
        ctx.contains_dollar_parameter_marker = contains_dollar_parameter_marker(self);
        let parameters = ctx.parameters;
        ctx.select = Some(SelectContext {
            projections,
            group_by_items,
            order_by_items,
            pagination: self.limit.as_ref().map(|limit| Pagination::new(limit, parameters)),
            lock: self.lock.is_some(),
        });
        Ok(())
    }
}

fn contains_dollar_parameter_marker(select: &SelectStatement) -> bool {
    let own_level = select_expressions(select)
        .into_iter()
        .flat_map(extract_parameter_markers)
        .any(|marker| marker.marker_type == ParameterMarkerType::Dollar);
    own_level
        || nested_selects(select).into_iter().any(contains_dollar_parameter_marker)
        || select.combine.as_ref().map_or(false, |combine| {
            contains_dollar_parameter_marker(&combine.left.select) || contains_dollar_parameter_marker(&combine.right.select)
        })
}

/// WHERE of the select followed by the WHERE of every nested select.
fn collect_where_segments<'a>(select: &'a SelectStatement, result: &mut Vec<&'a WhereSegment>) {
    if let Some(where_segment) = &select.where_segment {
        result.push(where_segment);
    }
    for nested in nested_selects(select) {
        collect_where_segments(nested, result);
    }
    if let Some(combine) = &select.combine {
        collect_where_segments(&combine.left.select, result);
        collect_where_segments(&combine.right.select, result);
    }
}

/// Column equalities between two different owners, from ON conditions and WHERE.
pub(super) fn join_conditions<'a>(
    where_segments: &[&'a WhereSegment],
    from: Option<&'a TableSegment>,
) -> Vec<&'a ExpressionSegment> {
    let mut conditions: Vec<&'a ExpressionSegment> = vec![];
    if let Some(from) = from {
        on_conditions(from, &mut conditions);
    }
    conditions.extend(where_segments.iter().map(|where_segment| &where_segment.expr));
    let mut result: Vec<&'a ExpressionSegment> = vec![];
    for condition in conditions {
        for and_predicate in extract_and_predicates(condition) {
            for predicate in and_predicate.predicates {
                if is_join_condition(predicate) && !result.iter().any(|each| std::ptr::eq(*each, predicate)) {
                    result.push(predicate);
                }
            }
        }
    }
    result
}

pub(super) fn on_conditions<'a>(table: &'a TableSegment, result: &mut Vec<&'a ExpressionSegment>) {
    if let TableSegment::Join(join) = table {
        on_conditions(&join.left, result);
        on_conditions(&join.right, result);
        if let Some(condition) = &join.condition {
            result.push(condition);
        }
    }
}

fn is_join_condition(expression: &ExpressionSegment) -> bool {
    match expression {
        ExpressionSegment::BinaryOperation(binary) if binary.is_equal() => {
            match (binary.left.as_column(), binary.right.as_column()) {
                (Some(left), Some(right)) => match (left.owner_name(), right.owner_name()) {
                    (Some(l), Some(r)) => !l.eq_ignore_ascii_case(r),
                    _ => false,
                },
                _ => false,
            }
        }
        _ => false,
    }
}
