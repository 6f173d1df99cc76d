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
    ColumnSegment, ExpressionSegment, InsertStatement, ParameterMarkerType, SQLStatement, SimpleTableSegment, Span,
    Value,
};

use crate::sql::analyse::binding::ColumnBinder;
use crate::sql::analyse::{resolve_value, BindEnv, Capabilities, SAResult, SQLAnalyse, SQLStatementContext};
use crate::sql::extract::expression::{extract_columns, extract_parameter_markers};

/// Insert facet of a statement context.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertContext<'a> {
    pub table: &'a SimpleTableSegment,
    /// Insert column names in value order; from the catalog when not written out.
    pub columns: Vec<String>,
    pub explicit_columns: bool,
    pub rows: Vec<InsertRow<'a>>,
    /// `INSERT ... SET a = 1` instead of `VALUES (...)`.
    pub set_form: bool,
    pub insert_select: bool,
}

/// One `(...)` of VALUES, or the assignments of the SET form.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertRow<'a> {
    pub span: Span,
    pub values: Vec<&'a ExpressionSegment>,
    /// Parameter markers of the row, in text order.
    pub parameter_indexes: Vec<usize>,
}

impl<'a> InsertRow<'a> {
    /// Literal or bound parameter of the `column_index`-th value.
    pub fn value(&self, column_index: usize, parameters: &[Value]) -> Option<Value> {
        resolve_value(self.values.get(column_index)?, parameters)
    }
}

impl<'a> InsertContext<'a> {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.eq_ignore_ascii_case(name))
    }

    /// Span covering every VALUES row, absent for the SET form and INSERT ... SELECT.
    pub fn values_span(&self) -> Option<Span> {
        if self.set_form {
            return None;
        }
        let first = self.rows.first()?;
        let last = self.rows.last()?;
        Some(Span::new(first.span.start, last.span.stop))
    }
}

pub(super) fn bind<'a>(ctx: &mut SQLStatementContext<'a>, env: &BindEnv<'_>) -> SAResult {
    let statement = ctx.statement;
    if let SQLStatement::Insert(insert) = statement {
        insert.analyse(ctx, env)?;
    }
    Ok(())
}

impl<'a> SQLAnalyse<'a> for InsertStatement {
    fn analyse(&'a self, ctx: &mut SQLStatementContext<'a>, env: &BindEnv<'_>) -> SAResult {
        let mut columns: Vec<&'a ColumnSegment> = self.columns.iter().collect();
        let mut expressions: Vec<&'a ExpressionSegment> = vec![];
        let mut rows = vec![];
        for row in &self.values {
            let values: Vec<&'a ExpressionSegment> = row.values.iter().collect();
            rows.push(InsertRow {
                span: row.span,
                parameter_indexes: parameter_indexes(&values),
                values,
            });
            expressions.extend(row.values.iter());
        }
        let mut column_names: Vec<String> = self.columns.iter().map(|column| column.name().to_string()).collect();
        if let Some(set_assignment) = &self.set_assignment {
            ctx.capabilities |= Capabilities::ASSIGNMENT_AVAILABLE;
            ctx.assignments = Some(set_assignment);
            let values: Vec<&'a ExpressionSegment> =
                set_assignment.assignments.iter().map(|assignment| &assignment.value).collect();
            for assignment in &set_assignment.assignments {
                columns.extend(assignment.columns.iter());
                column_names.extend(assignment.columns.iter().map(|column| column.name().to_string()));
            }
            rows.push(InsertRow {
                span: set_assignment.span,
                parameter_indexes: parameter_indexes(&values),
                values: values.clone(),
            });
            expressions.extend(values);
        }
        let explicit_columns = !column_names.is_empty();
        if !explicit_columns {
            if let Some(metadata) = env.table_metadata(&self.table) {
                column_names = metadata.column_names().map(|name| name.to_string()).collect();
            }
        }
        for expression in &expressions {
            columns.extend(extract_columns(expression, false));
        }

        let tables = ctx.tables.tables().to_vec();
        let mut binder = ColumnBinder::new(env);
        binder.bind_statement_scope(&tables, columns, &expressions)?;
        if let Some(insert_select) = &self.insert_select {
            binder.bind_select(&insert_select.select, &[])?;
            ctx.contains_subquery = true;
        }
        ctx.columns = binder.columns;
        ctx.contains_dollar_parameter_marker = expressions
            .iter()
            .flat_map(|expression| extract_parameter_markers(expression))
            .any(|marker| marker.marker_type == ParameterMarkerType::Dollar);
        ctx.insert = Some(InsertContext {
            table: &self.table,
            columns: column_names,
            explicit_columns,
            rows,
            set_form: self.set_assignment.is_some(),
            insert_select: self.insert_select.is_some(),
        });
        Ok(())
    }
}

fn parameter_indexes(values: &[&ExpressionSegment]) -> Vec<usize> {
    values
        .iter()
        .flat_map(|value| extract_parameter_markers(value))
        .map(|marker| marker.index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::metadata::{DatabaseMetaData, MetaData, TableMetaData};

    fn metadata() -> MetaData {
        MetaData::default().with_database(
            "logic_db",
            DatabaseMetaData::new(&["ds_0"]).with_table("t_order", TableMetaData::new(&["order_id", "user_id", "status"])),
        )
    }

    #[test]
    fn test_insert_rows_and_parameters() {
        let sql = "INSERT INTO t_order (order_id, user_id) VALUES (?, ?), (3, ?)";
        let statement = SQLStatement::Insert(insert(
            table(sql, "t_order"),
            sql,
            &["order_id", "user_id"],
            vec![
                values_row(sql, "(?, ?)", vec![marker(sql, 0), marker(sql, 1)]),
                values_row(sql, "(3, ?)", vec![literal(sql, "3", 3.into()), marker(sql, 2)]),
            ],
        ));
        let parameters = vec![Value::Int(1), Value::Int(10), Value::Int(11)];
        let metadata = metadata();
        let ctx = SQLStatementContext::bind(&statement, &metadata, "logic_db", &parameters).unwrap();
        let insert = ctx.insert_context().unwrap();
        assert!(insert.explicit_columns);
        assert_eq!(insert.column_index("USER_ID"), Some(1));
        assert_eq!(insert.rows[0].parameter_indexes, vec![0, 1]);
        assert_eq!(insert.rows[1].parameter_indexes, vec![2]);
        assert_eq!(insert.rows[1].value(0, &parameters), Some(Value::Int(3)));
        assert_eq!(insert.rows[1].value(1, &parameters), Some(Value::Int(11)));
        let span = insert.values_span().unwrap();
        assert_eq!(&sql[span.start..=span.stop], "(?, ?), (3, ?)");
        assert!(!ctx.has(Capabilities::ASSIGNMENT_AVAILABLE));
    }

    #[test]
    fn test_insert_columns_from_metadata() {
        let sql = "INSERT INTO t_order VALUES (1, 2, 'new')";
        let statement = SQLStatement::Insert(insert(
            table(sql, "t_order"),
            sql,
            &[],
            vec![values_row(
                sql,
                "(1, 2, 'new')",
                vec![
                    literal(sql, "1", 1.into()),
                    literal(sql, "2", 2.into()),
                    literal(sql, "'new'", "new".into()),
                ],
            )],
        ));
        let metadata = metadata();
        let ctx = SQLStatementContext::bind(&statement, &metadata, "logic_db", &[]).unwrap();
        let insert = ctx.insert_context().unwrap();
        assert!(!insert.explicit_columns);
        assert_eq!(insert.columns, vec!["order_id", "user_id", "status"]);
        assert_eq!(insert.rows[0].value(2, &[]), Some(Value::text("new")));
    }

    #[test]
    fn test_insert_set_form_is_one_row() {
        let sql = "INSERT INTO t_order SET order_id = ?, user_id = 7";
        let statement = SQLStatement::Insert(insert_set(
            table(sql, "t_order"),
            sql,
            vec![
                assignment(sql, "order_id", marker(sql, 0)),
                assignment(sql, "user_id", literal(sql, "7", 7.into())),
            ],
        ));
        let parameters = vec![Value::Int(1)];
        let ctx = SQLStatementContext::bind(&statement, &metadata(), "logic_db", &parameters).unwrap();
        assert!(ctx.has(Capabilities::ASSIGNMENT_AVAILABLE | Capabilities::INSERT_VALUES_AVAILABLE));
        let insert = ctx.insert_context().unwrap();
        assert_eq!(insert.rows.len(), 1);
        assert_eq!(insert.columns, vec!["order_id", "user_id"]);
        assert!(insert.values_span().is_none());
        assert_eq!(insert.rows[0].value(0, &parameters), Some(Value::Int(1)));
    }
}
