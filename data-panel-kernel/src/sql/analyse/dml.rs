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
    ColumnSegment, DeleteStatement, ExpressionSegment, OrderBySegment, ParameterMarkerType, SQLStatement,
    SetAssignmentSegment, TableSegment, UpdateStatement, WhereSegment,
};

use crate::sql::analyse::binding::ColumnBinder;
use crate::sql::analyse::select::{join_conditions, on_conditions};
use crate::sql::analyse::{BindEnv, SAResult, SQLAnalyse, SQLStatementContext};
use crate::sql::extract::column::extract_from_order_by_items;
use crate::sql::extract::expression::{extract_columns, extract_parameter_markers, extract_subqueries};

pub(super) fn bind_update<'a>(ctx: &mut SQLStatementContext<'a>, env: &BindEnv<'_>) -> SAResult {
    let statement = ctx.statement;
    if let SQLStatement::Update(update) = statement {
        update.analyse(ctx, env)?;
    }
    Ok(())
}

pub(super) fn bind_delete<'a>(ctx: &mut SQLStatementContext<'a>, env: &BindEnv<'_>) -> SAResult {
    let statement = ctx.statement;
    if let SQLStatement::Delete(delete) = statement {
        delete.analyse(ctx, env)?;
    }
    Ok(())
}

impl<'a> SQLAnalyse<'a> for UpdateStatement {
    fn analyse(&'a self, ctx: &mut SQLStatementContext<'a>, env: &BindEnv<'_>) -> SAResult {
        ctx.assignments = Some(&self.set_assignment);
        bind_write_scope(
            ctx,
            env,
            &self.table,
            Some(&self.set_assignment),
            self.where_segment.as_ref(),
            self.order_by.as_ref(),
        )
    }
}

impl<'a> SQLAnalyse<'a> for DeleteStatement {
    fn analyse(&'a self, ctx: &mut SQLStatementContext<'a>, env: &BindEnv<'_>) -> SAResult {
        bind_write_scope(ctx, env, &self.table, None, self.where_segment.as_ref(), self.order_by.as_ref())
    }
}

fn bind_write_scope<'a>(
    ctx: &mut SQLStatementContext<'a>,
    env: &BindEnv<'_>,
    table: &'a TableSegment,
    assignments: Option<&'a SetAssignmentSegment>,
    where_segment: Option<&'a WhereSegment>,
    order_by: Option<&'a OrderBySegment>,
) -> SAResult {
    let mut columns: Vec<&'a ColumnSegment> = vec![];
    let mut expressions: Vec<&'a ExpressionSegment> = vec![];
    if let Some(assignments) = assignments {
        for assignment in &assignments.assignments {
            columns.extend(assignment.columns.iter());
            expressions.push(&assignment.value);
        }
    }
    let mut conditions = vec![];
    on_conditions(table, &mut conditions);
    expressions.extend(conditions);
    if let Some(where_segment) = where_segment {
        expressions.push(&where_segment.expr);
        ctx.where_segments.push(where_segment);
    }
    for expression in &expressions {
        columns.extend(extract_columns(expression, false));
    }
    if let Some(order_by) = order_by {
        extract_from_order_by_items(&order_by.items, false, &mut columns);
    }

    let tables = ctx.tables.tables().to_vec();
    let mut binder = ColumnBinder::new(env);
    binder.bind_statement_scope(&tables, columns, &expressions)?;
    ctx.columns = binder.columns;
    ctx.join_conditions = join_conditions(&ctx.where_segments, Some(table));
    ctx.contains_subquery = expressions.iter().any(|expression| !extract_subqueries(expression).is_empty());
    ctx.contains_dollar_parameter_marker = expressions
        .iter()
        .flat_map(|expression| extract_parameter_markers(expression))
        .any(|marker| marker.marker_type == ParameterMarkerType::Dollar);
    Ok(())
}
