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
    ColumnSegment, ExpressionSegment, OrderByItemKind, OrderByItemSegment, ProjectionSegment, SelectStatement,
    TableSegment, WhereSegment,
};

use crate::sql::extract::expression::{extract_and_predicates, extract_columns};

/// Driving columns of a predicate.
///
/// Both sides of a binary operation count when they are columns, outer join
/// markers count on either side; for `IN` and `BETWEEN` only the left side
/// (or the columns of a left row expression) is taken.
pub fn extract(expression: &ExpressionSegment) -> Vec<&ColumnSegment> {
    let mut result = vec![];
    match expression {
        ExpressionSegment::BinaryOperation(binary) => {
            push_binary_side(&binary.left, &mut result);
            push_binary_side(&binary.right, &mut result);
        }
        ExpressionSegment::In(in_expression) => match &*in_expression.left {
            ExpressionSegment::Column(column) => result.push(column),
            ExpressionSegment::Row(row) => {
                result.extend(row.items.iter().filter_map(|item| item.as_column()));
            }
            _ => {}
        },
        ExpressionSegment::Between(between) => {
            if let ExpressionSegment::Column(column) = &*between.left {
                result.push(column);
            }
        }
        _ => {}
    }
    result
}

fn push_binary_side<'a>(side: &'a ExpressionSegment, result: &mut Vec<&'a ColumnSegment>) {
    match side {
        ExpressionSegment::Column(column) => result.push(column),
        ExpressionSegment::OuterJoin(outer) => result.push(&outer.column),
        _ => {}
    }
}

/// Driving columns of every AND predicate of the where segments.
pub fn extract_from_where_segments<'a>(where_segments: &[&'a WhereSegment]) -> Vec<&'a ColumnSegment> {
    let mut result = vec![];
    for where_segment in where_segments {
        for and_predicate in extract_and_predicates(&where_segment.expr) {
            for predicate in and_predicate.predicates {
                result.extend(extract(predicate));
            }
        }
    }
    result
}

/// All column references of a select: projections, from, where, group by,
/// having, order by and both sides of a combine.
pub fn extract_from_select<'a>(select: &'a SelectStatement, include_subqueries: bool, result: &mut Vec<&'a ColumnSegment>) {
    extract_from_select_scope(select, include_subqueries, result);
    if let Some(combine) = &select.combine {
        extract_from_select(&combine.left.select, include_subqueries, result);
        extract_from_select(&combine.right.select, include_subqueries, result);
    }
}

/// Column references resolved against the select's own FROM, combine branches excluded.
pub fn extract_from_select_scope<'a>(select: &'a SelectStatement, include_subqueries: bool, result: &mut Vec<&'a ColumnSegment>) {
    extract_from_projections(&select.projections.projections, include_subqueries, result);
    extract_from_select_without_projections(select, include_subqueries, result);
}

pub fn extract_from_select_without_projections<'a>(
    select: &'a SelectStatement,
    include_subqueries: bool,
    result: &mut Vec<&'a ColumnSegment>,
) {
    if let Some(from) = &select.from {
        extract_from_table(from, include_subqueries, result);
    }
    if let Some(where_segment) = &select.where_segment {
        result.extend(extract_columns(&where_segment.expr, include_subqueries));
    }
    if let Some(group_by) = &select.group_by {
        extract_from_order_by_items(&group_by.items, include_subqueries, result);
    }
    if let Some(having) = &select.having {
        result.extend(extract_columns(&having.expr, include_subqueries));
    }
    if let Some(order_by) = &select.order_by {
        extract_from_order_by_items(&order_by.items, include_subqueries, result);
    }
}

pub fn extract_from_projections<'a>(
    projections: &'a [ProjectionSegment],
    include_subqueries: bool,
    result: &mut Vec<&'a ColumnSegment>,
) {
    for projection in projections {
        match projection {
            ProjectionSegment::Column(p) => result.push(&p.column),
            ProjectionSegment::Aggregation(p) => {
                for parameter in &p.parameters {
                    result.extend(extract_columns(parameter, include_subqueries));
                }
            }
            ProjectionSegment::Expression(p) => result.extend(extract_columns(&p.expr, include_subqueries)),
            ProjectionSegment::Subquery(p) => {
                if include_subqueries {
                    extract_from_select(&p.subquery.select, true, result);
                }
            }
            ProjectionSegment::Shorthand(_) => {}
        }
    }
}

fn extract_from_table<'a>(table: &'a TableSegment, include_subqueries: bool, result: &mut Vec<&'a ColumnSegment>) {
    match table {
        TableSegment::Collection(collection) => {
            result.extend(extract_columns(&collection.expression, include_subqueries));
        }
        TableSegment::Join(join) => {
            extract_from_table(&join.left, include_subqueries, result);
            extract_from_table(&join.right, include_subqueries, result);
            if let Some(condition) = &join.condition {
                result.extend(extract_columns(condition, include_subqueries));
            }
            result.extend(join.using.iter());
            result.extend(join.derived_using.iter());
        }
        TableSegment::Subquery(subquery) => {
            if include_subqueries {
                extract_from_select(&subquery.subquery.select, true, result);
            }
        }
        TableSegment::Simple(_) => {}
    }
}

pub fn extract_from_order_by_items<'a>(items: &'a [OrderByItemSegment], include_subqueries: bool, result: &mut Vec<&'a ColumnSegment>) {
    for item in items {
        match &item.kind {
            OrderByItemKind::Column(column) => result.push(column),
            OrderByItemKind::Expression { expr, .. } => result.extend(extract_columns(expr, include_subqueries)),
            OrderByItemKind::Index(_) => {}
        }
    }
}

/// Top level expressions of a select, used to look for markers and subqueries.
pub(crate) fn select_expressions(select: &SelectStatement) -> Vec<&ExpressionSegment> {
    let mut result = vec![];
    for projection in &select.projections.projections {
        match projection {
            ProjectionSegment::Aggregation(p) => result.extend(p.parameters.iter()),
            ProjectionSegment::Expression(p) => result.push(&p.expr),
            _ => {}
        }
    }
    if let Some(from) = &select.from {
        table_expressions(from, &mut result);
    }
    if let Some(where_segment) = &select.where_segment {
        result.push(&where_segment.expr);
    }
    if let Some(having) = &select.having {
        result.push(&having.expr);
    }
    result
}

fn table_expressions<'a>(table: &'a TableSegment, result: &mut Vec<&'a ExpressionSegment>) {
    match table {
        TableSegment::Join(join) => {
            table_expressions(&join.left, result);
            table_expressions(&join.right, result);
            if let Some(condition) = &join.condition {
                result.push(condition);
            }
        }
        TableSegment::Collection(collection) => result.push(&collection.expression),
        _ => {}
    }
}
