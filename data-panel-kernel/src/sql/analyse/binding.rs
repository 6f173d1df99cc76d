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

use std::ptr;

use data_panel_common::common::{BindingError, Result};
use data_panel_common::statement::{
    ColumnSegment, CommonTableExpressionSegment, ExpressionSegment, ProjectionSegment, SelectStatement,
    SimpleTableSegment, TableSegment,
};

use crate::sql::analyse::BindEnv;
use crate::sql::extract::column::{extract_from_select_scope, select_expressions};
use crate::sql::extract::expression::extract_subqueries;
use crate::sql::extract::table::extract_scope_tables;
use crate::sql::extract::TableRef;

/// What a column reference resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnBinding {
    /// Column of a logic table, name in lower case.
    Table(String),
    /// Column of a derived table, a CTE or a collection, by qualifier.
    Derived(String),
    /// Reference to a select list alias, `ORDER BY total`.
    ProjectionAlias,
    /// No catalog information decides the owner.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoundColumn<'a> {
    pub segment: &'a ColumnSegment,
    pub binding: ColumnBinding,
}

/// Names visible to the columns of one scope.
pub(crate) struct Scope<'s, 'a> {
    pub tables: &'s [TableRef<'a>],
    /// Tables of enclosing scopes, for correlated subqueries.
    pub outer: &'s [TableRef<'a>],
    pub aliases: Vec<String>,
    /// Names of `USING` and NATURAL join columns.
    pub using: Vec<String>,
}

pub(crate) struct ColumnBinder<'a, 'e, 'm> {
    env: &'e BindEnv<'m>,
    ctes: Vec<&'a CommonTableExpressionSegment>,
    pub columns: Vec<BoundColumn<'a>>,
}

impl<'a, 'e, 'm> ColumnBinder<'a, 'e, 'm> {
    pub fn new(env: &'e BindEnv<'m>) -> Self {
        ColumnBinder {
            env,
            ctes: vec![],
            columns: vec![],
        }
    }

    /// Binds a select and, scope by scope, everything nested in it.
    pub fn bind_select(&mut self, select: &'a SelectStatement, outer: &[TableRef<'a>]) -> Result<()> {
        if let Some(with) = &select.with {
            for cte in &with.common_table_expressions {
                self.bind_select(&cte.subquery.select, outer)?;
                self.ctes.push(cte);
            }
        }
        let tables = extract_scope_tables(select, &self.ctes);
        let mut columns = vec![];
        extract_from_select_scope(select, false, &mut columns);
        let scope = Scope {
            tables: &tables,
            outer,
            aliases: projection_aliases(select),
            using: select.from.as_ref().map(using_names).unwrap_or_default(),
        };
        self.bind_scope(columns, &scope)?;
        let mut visible = tables.clone();
        visible.extend(outer.iter().copied());
        for nested in nested_selects(select) {
            self.bind_select(nested, &visible)?;
        }
        if let Some(combine) = &select.combine {
            self.bind_select(&combine.left.select, outer)?;
            self.bind_select(&combine.right.select, outer)?;
        }
        Ok(())
    }

    /// Binds the columns of a non-select scope and the subqueries of its expressions.
    pub fn bind_statement_scope(
        &mut self,
        tables: &[TableRef<'a>],
        columns: Vec<&'a ColumnSegment>,
        expressions: &[&'a ExpressionSegment],
    ) -> Result<()> {
        let scope = Scope {
            tables,
            outer: &[],
            aliases: vec![],
            using: vec![],
        };
        self.bind_scope(columns, &scope)?;
        for expression in expressions {
            for subquery in extract_subqueries(expression) {
                self.bind_select(&subquery.select, tables)?;
            }
        }
        Ok(())
    }

    fn bind_scope(&mut self, columns: Vec<&'a ColumnSegment>, scope: &Scope<'_, 'a>) -> Result<()> {
        for column in columns {
            if self.columns.iter().any(|bound| ptr::eq(bound.segment, column)) {
                continue;
            }
            let binding = self.bind_column(column, scope)?;
            self.columns.push(BoundColumn {
                segment: column,
                binding,
            });
        }
        Ok(())
    }

    pub(crate) fn bind_column(&self, column: &ColumnSegment, scope: &Scope<'_, 'a>) -> Result<ColumnBinding> {
        match column.owner_name() {
            Some(owner) => self.bind_qualified(column, owner, scope),
            None => self.bind_unqualified(column, scope),
        }
    }

    fn bind_qualified(&self, column: &ColumnSegment, owner: &str, scope: &Scope<'_, 'a>) -> Result<ColumnBinding> {
        let found = scope
            .tables
            .iter()
            .chain(scope.outer.iter())
            .find(|table| owned_by(table, owner));
        match found {
            Some(TableRef::Simple(table)) => {
                self.check_column(table, column)?;
                Ok(ColumnBinding::Table(table.name().to_lowercase()))
            }
            Some(other) => Ok(ColumnBinding::Derived(other.qualifier().unwrap_or_default().to_string())),
            None => Err(BindingError::UnknownOwner {
                owner: owner.to_string(),
                column: column.name().to_string(),
            }
            .into()),
        }
    }

    fn bind_unqualified(&self, column: &ColumnSegment, scope: &Scope<'_, 'a>) -> Result<ColumnBinding> {
        let name = column.name();
        let candidates: Vec<&SimpleTableSegment> = scope
            .tables
            .iter()
            .filter_map(|table| table.as_simple())
            .filter(|table| {
                self.env
                    .table_metadata(table)
                    .map_or(false, |metadata| metadata.contains_column(name))
            })
            .collect();
        match candidates.as_slice() {
            [table] => Ok(ColumnBinding::Table(table.name().to_lowercase())),
            [first, ..] if scope.using.iter().any(|using| using.eq_ignore_ascii_case(name)) => {
                Ok(ColumnBinding::Table(first.name().to_lowercase()))
            }
            [_, ..] => Err(BindingError::AmbiguousColumn {
                column: name.to_string(),
                tables: candidates.iter().map(|table| table.name().to_string()).collect(),
            }
            .into()),
            [] if scope.aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name)) => {
                Ok(ColumnBinding::ProjectionAlias)
            }
            [] => match scope.tables {
                [TableRef::Simple(table)] => {
                    self.check_column(table, column)?;
                    Ok(ColumnBinding::Table(table.name().to_lowercase()))
                }
                [other] => Ok(ColumnBinding::Derived(other.qualifier().unwrap_or_default().to_string())),
                _ => Ok(ColumnBinding::Unresolved),
            },
        }
    }

    fn check_column(&self, table: &SimpleTableSegment, column: &ColumnSegment) -> Result<()> {
        if !self.env.options.check_table_metadata_enabled {
            return Ok(());
        }
        match self.env.table_metadata(table) {
            Some(metadata) if !metadata.columns.is_empty() && !metadata.contains_column(column.name()) => {
                Err(BindingError::ColumnNotFound {
                    table: table.name().to_string(),
                    column: column.name().to_string(),
                }
                .into())
            }
            _ => Ok(()),
        }
    }
}

fn owned_by(table: &TableRef<'_>, owner: &str) -> bool {
    if table.qualifier().map_or(false, |qualifier| qualifier.eq_ignore_ascii_case(owner)) {
        return true;
    }
    match table {
        TableRef::Simple(simple) | TableRef::CommonTableExpression { table: simple, .. } => {
            simple.name().eq_ignore_ascii_case(owner)
        }
        _ => false,
    }
}

fn projection_aliases(select: &SelectStatement) -> Vec<String> {
    select
        .projections
        .projections
        .iter()
        .filter_map(|projection| projection.alias())
        .map(|alias| alias.name().to_string())
        .collect()
}

fn using_names(table: &TableSegment) -> Vec<String> {
    let mut result = vec![];
    if let TableSegment::Join(join) = table {
        result.extend(using_names(&join.left));
        result.extend(using_names(&join.right));
        result.extend(join.using.iter().chain(join.derived_using.iter()).map(|c| c.name().to_string()));
    }
    result
}

/// Selects nested one level below `select`: projection subqueries, derived
/// tables and subqueries of its predicates.
pub(crate) fn nested_selects(select: &SelectStatement) -> Vec<&SelectStatement> {
    let mut result: Vec<&SelectStatement> = vec![];
    for projection in &select.projections.projections {
        if let ProjectionSegment::Subquery(p) = projection {
            result.push(&p.subquery.select);
        }
    }
    if let Some(from) = &select.from {
        derived_tables(from, &mut result);
    }
    for expression in select_expressions(select) {
        result.extend(extract_subqueries(expression).into_iter().map(|subquery| &*subquery.select));
    }
    result
}

pub(crate) fn derived_tables<'a>(table: &'a TableSegment, result: &mut Vec<&'a SelectStatement>) {
    match table {
        TableSegment::Subquery(subquery) => result.push(&subquery.subquery.select),
        TableSegment::Join(join) => {
            derived_tables(&join.left, result);
            derived_tables(&join.right, result);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::metadata::{DatabaseMetaData, MetaData, TableMetaData};
    use crate::sql::analyse::BindOptions;

    fn metadata() -> MetaData {
        MetaData::default().with_database(
            "logic_db",
            DatabaseMetaData::new(&["ds_0"])
                .with_table("t_order", TableMetaData::new(&["order_id", "user_id", "status"]))
                .with_table("t_order_item", TableMetaData::new(&["item_id", "order_id"])),
        )
    }

    fn bind(select: &SelectStatement, check: bool) -> Result<Vec<BoundColumn<'_>>> {
        let metadata = metadata();
        let env = BindEnv::new(
            &metadata,
            "logic_db",
            BindOptions {
                check_table_metadata_enabled: check,
            },
        );
        let mut binder = ColumnBinder::new(&env);
        binder.bind_select(select, &[])?;
        Ok(binder.columns)
    }

    #[test]
    fn test_bind_by_metadata_and_owner() {
        let sql = "SELECT status, i.item_id FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id";
        let statement = select(
            vec![column_projection(sql, "status"), column_projection(sql, "i.item_id")],
            join_on(
                aliased_table(sql, "t_order", "o"),
                aliased_table(sql, "t_order_item", "i"),
                eq(owned_column(sql, "o.order_id"), owned_column(sql, "i.order_id")),
            ),
        );
        let columns = bind(&statement, true).unwrap();
        let bindings: Vec<ColumnBinding> = columns.into_iter().map(|c| c.binding).collect();
        assert_eq!(
            bindings,
            vec![
                ColumnBinding::Table("t_order".to_string()),
                ColumnBinding::Table("t_order_item".to_string()),
                ColumnBinding::Table("t_order".to_string()),
                ColumnBinding::Table("t_order_item".to_string()),
            ]
        );
    }

    #[test]
    fn test_ambiguous_column() {
        let sql = "SELECT order_id FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id";
        let statement = select(
            vec![column_projection_at(sql, "order_id", 0)],
            join_on(
                aliased_table(sql, "t_order", "o"),
                aliased_table(sql, "t_order_item", "i"),
                eq(owned_column(sql, "o.order_id"), owned_column(sql, "i.order_id")),
            ),
        );
        let err = bind(&statement, false).unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_using_column_binds_to_left_table() {
        let sql = "SELECT order_id FROM t_order o JOIN t_order_item i USING (order_id)";
        let statement = select(
            vec![column_projection_at(sql, "order_id", 0)],
            join_using(
                aliased_table(sql, "t_order", "o"),
                aliased_table(sql, "t_order_item", "i"),
                vec![column_segment_at(sql, "order_id", 1)],
            ),
        );
        let columns = bind(&statement, false).unwrap();
        assert!(columns.iter().all(|c| c.binding == ColumnBinding::Table("t_order".to_string())));
    }

    #[test]
    fn test_unknown_owner_and_missing_column() {
        let sql = "SELECT x.order_id FROM t_order o";
        let statement = select(vec![column_projection(sql, "x.order_id")], aliased_table(sql, "t_order", "o"));
        assert!(bind(&statement, false).unwrap_err().to_string().contains("unknown owner `x`"));

        let sql = "SELECT o.missing FROM t_order o";
        let statement = select(vec![column_projection(sql, "o.missing")], aliased_table(sql, "t_order", "o"));
        assert!(bind(&statement, false).is_ok());
        assert!(bind(&statement, true).unwrap_err().is_binding());
    }

    #[test]
    fn test_alias_and_correlated_subquery() {
        let sql = "SELECT status AS s FROM t_order o WHERE EXISTS (SELECT item_id FROM t_order_item WHERE order_id = o.order_id) ORDER BY s";
        let inner = select(vec![column_projection(sql, "item_id")], table(sql, "t_order_item"))
            .with_where(eq(column_at(sql, "order_id", 0), owned_column(sql, "o.order_id")));
        let statement = select(vec![aliased_column_projection(sql, "status", "s")], aliased_table(sql, "t_order", "o"))
            .with_where(exists(sql, "SELECT item_id", inner))
            .with_order_by(vec![column_item_at(sql, "s", 1)]);
        let columns = bind(&statement, true).unwrap();
        let names: Vec<(String, ColumnBinding)> = columns
            .into_iter()
            .map(|c| (c.segment.qualified_name(), c.binding))
            .collect();
        assert_eq!(
            names,
            vec![
                ("status".to_string(), ColumnBinding::Table("t_order".to_string())),
                ("s".to_string(), ColumnBinding::ProjectionAlias),
                ("item_id".to_string(), ColumnBinding::Table("t_order_item".to_string())),
                ("order_id".to_string(), ColumnBinding::Table("t_order_item".to_string())),
                ("o.order_id".to_string(), ColumnBinding::Table("t_order".to_string())),
            ]
        );
    }
}
