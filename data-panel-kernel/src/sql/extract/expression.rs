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
    ColumnSegment, ExpressionSegment, ParameterMarkerExpressionSegment, SelectStatement, SubquerySegment,
};

use crate::sql::extract::column;

/// Predicates joined by AND, one branch of a WHERE written in disjunctive form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AndPredicate<'a> {
    pub predicates: Vec<&'a ExpressionSegment>,
}

/// Splits an expression into OR branches of AND predicates.
///
/// `a = 1 AND (b = 2 OR c = 3)` yields `[a = 1, b = 2]` and `[a = 1, c = 3]`.
pub fn extract_and_predicates(expression: &ExpressionSegment) -> Vec<AndPredicate<'_>> {
    match expression {
        ExpressionSegment::BinaryOperation(binary) if binary.is_or() => {
            let mut result = extract_and_predicates(&binary.left);
            result.extend(extract_and_predicates(&binary.right));
            result
        }
        ExpressionSegment::BinaryOperation(binary) if binary.is_and() => {
            let lefts = extract_and_predicates(&binary.left);
            let rights = extract_and_predicates(&binary.right);
            let mut result = Vec::with_capacity(lefts.len() * rights.len());
            for left in &lefts {
                for right in &rights {
                    let mut predicates = left.predicates.clone();
                    predicates.extend(right.predicates.iter().copied());
                    result.push(AndPredicate { predicates });
                }
            }
            result
        }
        _ => vec![AndPredicate {
            predicates: vec![expression],
        }],
    }
}

/// Every column reachable from an expression; subqueries are entered only when asked.
pub fn extract_columns(expression: &ExpressionSegment, include_subqueries: bool) -> Vec<&ColumnSegment> {
    let mut result = vec![];
    collect_columns(expression, include_subqueries, &mut result);
    result
}

fn collect_columns<'a>(expression: &'a ExpressionSegment, include_subqueries: bool, result: &mut Vec<&'a ColumnSegment>) {
    match expression {
        ExpressionSegment::Column(c) => result.push(c),
        ExpressionSegment::Literal(_) | ExpressionSegment::ParameterMarker(_) | ExpressionSegment::Common(_) => {}
        ExpressionSegment::BinaryOperation(e) => {
            collect_columns(&e.left, include_subqueries, result);
            collect_columns(&e.right, include_subqueries, result);
        }
        ExpressionSegment::In(e) => {
            collect_columns(&e.left, include_subqueries, result);
            collect_columns(&e.right, include_subqueries, result);
        }
        ExpressionSegment::Between(e) => {
            collect_columns(&e.left, include_subqueries, result);
            collect_columns(&e.between, include_subqueries, result);
            collect_columns(&e.and, include_subqueries, result);
        }
        ExpressionSegment::Row(e) => {
            for item in &e.items {
                collect_columns(item, include_subqueries, result);
            }
        }
        ExpressionSegment::List(e) => {
            for item in &e.items {
                collect_columns(item, include_subqueries, result);
            }
        }
        ExpressionSegment::OuterJoin(e) => result.push(&e.column),
        ExpressionSegment::Function(e) => {
            for parameter in &e.parameters {
                collect_columns(parameter, include_subqueries, result);
            }
        }
        ExpressionSegment::Not(e) => collect_columns(&e.expression, include_subqueries, result),
        ExpressionSegment::Subquery(e) => {
            if include_subqueries {
                column::extract_from_select(&e.subquery.select, true, result);
            }
        }
        ExpressionSegment::Exists(e) => {
            if include_subqueries {
                column::extract_from_select(&e.subquery.select, true, result);
            }
        }
    }
}

/// Parameter markers of an expression outside its subqueries, see
/// [`extract_parameter_markers_from_select`] for those.
pub fn extract_parameter_markers(expression: &ExpressionSegment) -> Vec<&ParameterMarkerExpressionSegment> {
    let mut result = vec![];
    visit(expression, &mut |each| {
        if let ExpressionSegment::ParameterMarker(marker) = each {
            result.push(marker);
        }
    });
    result
}

/// Subqueries directly nested in an expression, without descending into them.
pub fn extract_subqueries(expression: &ExpressionSegment) -> Vec<&SubquerySegment> {
    let mut result = vec![];
    visit(expression, &mut |each| match each {
        ExpressionSegment::Subquery(e) => result.push(&e.subquery),
        ExpressionSegment::Exists(e) => result.push(&e.subquery),
        _ => {}
    });
    result
}

/// Pre-order walk over an expression tree, subquery bodies are not visited.
pub fn visit<'a, F>(expression: &'a ExpressionSegment, f: &mut F)
where
    F: FnMut(&'a ExpressionSegment),
{
    f(expression);
    match expression {
        ExpressionSegment::BinaryOperation(e) => {
            visit(&e.left, f);
            visit(&e.right, f);
        }
        ExpressionSegment::In(e) => {
            visit(&e.left, f);
            visit(&e.right, f);
        }
        ExpressionSegment::Between(e) => {
            visit(&e.left, f);
            visit(&e.between, f);
            visit(&e.and, f);
        }
        ExpressionSegment::Row(e) => e.items.iter().for_each(|item| visit(item, f)),
        ExpressionSegment::List(e) => e.items.iter().for_each(|item| visit(item, f)),
        ExpressionSegment::Function(e) => e.parameters.iter().for_each(|item| visit(item, f)),
        ExpressionSegment::Not(e) => visit(&e.expression, f),
        _ => {}
    }
}

/// Parameter markers anywhere in a select, including its subqueries.
pub fn extract_parameter_markers_from_select(select: &SelectStatement) -> Vec<&ParameterMarkerExpressionSegment> {
    let mut result = vec![];
    for expression in column::select_expressions(select) {
        result.extend(extract_parameter_markers(expression));
        for subquery in extract_subqueries(expression) {
            result.extend(extract_parameter_markers_from_select(&subquery.select));
        }
    }
    result
}
