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

//! Binder: turns a logical statement plus catalog metadata into a
//! [`SQLStatementContext`].
//!
//! One context type serves every statement kind. What a kind offers is
//! recorded as [`Capabilities`]; shape specific data lives in optional facets
//! (`select`, `insert`, `assignments`). The binder for a kind is picked from a
//! single dispatch table.

mod binding;
mod dml;
mod insert;
mod projection;
mod select;
mod tables;

use std::ptr;

use log::{debug, trace};

use data_panel_common::common::{BindingError, Error, Result};
use data_panel_common::statement::{
    ColumnSegment, ExpressionSegment, SQLStatement, SetAssignmentSegment, SimpleTableSegment, StatementKind, Value,
    WhereSegment,
};

use crate::metadata::{MetaData, TableMetaData};
use crate::sql::extract::TableExtractor;

pub use binding::{BoundColumn, ColumnBinding};
pub use insert::{InsertContext, InsertRow};
pub use projection::{
    is_same_items, OrderByItem, Projection, ProjectionsContext, AVG_DERIVED_COUNT, AVG_DERIVED_SUM, GROUP_BY_DERIVED,
    ORDER_BY_DERIVED,
};
pub use select::{Pagination, SelectContext};
pub use tables::TablesContext;

pub type SAResult = Result<()>;

/// Implemented by statement shapes that contribute to a statement context.
pub trait SQLAnalyse<'a> {
    fn analyse(&'a self, ctx: &mut SQLStatementContext<'a>, env: &BindEnv<'_>) -> SAResult;
}

bitflags! {
    /// What a bound statement offers to the route and rewrite stages.
    pub struct Capabilities: u32 {
        const TABLE_AVAILABLE = 0b0000_0001;
        const WHERE_AVAILABLE = 0b0000_0010;
        const PROJECTION_AVAILABLE = 0b0000_0100;
        const ORDER_BY_AVAILABLE = 0b0000_1000;
        const INSERT_VALUES_AVAILABLE = 0b0001_0000;
        const ASSIGNMENT_AVAILABLE = 0b0010_0000;

        const SELECT = Self::TABLE_AVAILABLE.bits
            | Self::WHERE_AVAILABLE.bits
            | Self::PROJECTION_AVAILABLE.bits
            | Self::ORDER_BY_AVAILABLE.bits;
        const INSERT = Self::TABLE_AVAILABLE.bits | Self::INSERT_VALUES_AVAILABLE.bits;
        const UPDATE = Self::TABLE_AVAILABLE.bits | Self::WHERE_AVAILABLE.bits | Self::ASSIGNMENT_AVAILABLE.bits;
        const DELETE = Self::TABLE_AVAILABLE.bits | Self::WHERE_AVAILABLE.bits;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BindOptions {
    /// Uncatalogued tables and columns fail binding instead of staying unresolved.
    pub check_table_metadata_enabled: bool,
}

/// Read-only inputs of one bind invocation.
#[derive(Debug, Clone, Copy)]
pub struct BindEnv<'m> {
    pub metadata: &'m MetaData,
    pub current_database: &'m str,
    pub options: BindOptions,
}

impl<'m> BindEnv<'m> {
    pub fn new(metadata: &'m MetaData, current_database: &'m str, options: BindOptions) -> Self {
        BindEnv {
            metadata,
            current_database,
            options,
        }
    }

    pub fn database_of<'t>(&self, table: &'t SimpleTableSegment) -> &'t str
    where
        'm: 't,
    {
        table.owner.as_ref().map(|owner| owner.name()).unwrap_or(self.current_database)
    }

    pub fn table_metadata(&self, table: &SimpleTableSegment) -> Option<&'m TableMetaData> {
        self.metadata.database(self.database_of(table))?.table(table.name())
    }

    fn check_table(&self, table: &SimpleTableSegment) -> SAResult {
        let database = self.database_of(table);
        match self.metadata.database(database) {
            None => Err(BindingError::DatabaseNotFound(database.to_string()).into()),
            Some(metadata) if !metadata.contains_table(table.name()) => Err(BindingError::TableNotFound {
                database: database.to_string(),
                table: table.name().to_string(),
            }
            .into()),
            Some(_) => Ok(()),
        }
    }
}

type Binder = for<'a> fn(&mut SQLStatementContext<'a>, &BindEnv<'_>) -> SAResult;

static BINDERS: &[(StatementKind, Capabilities, Binder)] = &[
    (StatementKind::Select, Capabilities::SELECT, select::bind),
    (StatementKind::Insert, Capabilities::INSERT, insert::bind),
    (StatementKind::Update, Capabilities::UPDATE, dml::bind_update),
    (StatementKind::Delete, Capabilities::DELETE, dml::bind_delete),
    (StatementKind::CreateTable, Capabilities::TABLE_AVAILABLE, bind_tables_only),
    (StatementKind::DropTable, Capabilities::TABLE_AVAILABLE, bind_tables_only),
    (StatementKind::Truncate, Capabilities::TABLE_AVAILABLE, bind_tables_only),
    (StatementKind::AnalyzeTable, Capabilities::TABLE_AVAILABLE, bind_tables_only),
    (StatementKind::Show, Capabilities::TABLE_AVAILABLE, bind_tables_only),
];

fn bind_tables_only(_ctx: &mut SQLStatementContext<'_>, _env: &BindEnv<'_>) -> SAResult {
    Ok(())
}

/// Bound statement: tables, predicates, columns and the shape specific facets.
#[derive(Debug, Clone, PartialEq)]
pub struct SQLStatementContext<'a> {
    statement: &'a SQLStatement,
    kind: StatementKind,
    capabilities: Capabilities,
    current_database: String,
    tables: TablesContext<'a>,
    where_segments: Vec<&'a WhereSegment>,
    join_conditions: Vec<&'a ExpressionSegment>,
    columns: Vec<BoundColumn<'a>>,
    parameters: &'a [Value],
    select: Option<SelectContext<'a>>,
    insert: Option<InsertContext<'a>>,
    assignments: Option<&'a SetAssignmentSegment>,
    contains_subquery: bool,
    contains_table_subquery: bool,
    contains_dollar_parameter_marker: bool,
}

impl<'a> SQLStatementContext<'a> {
    /// Binds with the table metadata check disabled.
    pub fn bind(
        statement: &'a SQLStatement,
        metadata: &MetaData,
        current_database: &str,
        parameters: &'a [Value],
    ) -> Result<Self> {
        Self::bind_with_options(statement, metadata, current_database, parameters, BindOptions::default())
    }

    pub fn bind_with_options(
        statement: &'a SQLStatement,
        metadata: &MetaData,
        current_database: &str,
        parameters: &'a [Value],
        options: BindOptions,
    ) -> Result<Self> {
        let kind = statement.kind();
        let (_, capabilities, binder) = BINDERS
            .iter()
            .find(|(each, _, _)| *each == kind)
            .ok_or_else(|| Error::General(format!("no binder registered for {}", kind)))?;
        let env = BindEnv::new(metadata, current_database, options);
        let mut ctx = SQLStatementContext {
            statement,
            kind,
            capabilities: *capabilities,
            current_database: current_database.to_string(),
            tables: TablesContext::new(TableExtractor::extract(statement)),
            where_segments: vec![],
            join_conditions: vec![],
            columns: vec![],
            parameters,
            select: None,
            insert: None,
            assignments: None,
            contains_subquery: false,
            contains_table_subquery: false,
            contains_dollar_parameter_marker: false,
        };
        if options.check_table_metadata_enabled && kind != StatementKind::CreateTable {
            for table in ctx.tables.rewrite_tables() {
                env.check_table(table)?;
            }
        }
        binder(&mut ctx, &env)?;
        debug!(
            "bound {} statement on tables {:?}, capabilities {:?}",
            kind,
            ctx.tables.table_names(),
            ctx.capabilities
        );
        trace!("bound columns {:?}", ctx.columns);
        Ok(ctx)
    }

    pub fn statement(&self) -> &'a SQLStatement {
        self.statement
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn has(&self, capability: Capabilities) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn current_database(&self) -> &str {
        &self.current_database
    }

    pub fn tables(&self) -> &TablesContext<'a> {
        &self.tables
    }

    pub fn where_segments(&self) -> &[&'a WhereSegment] {
        &self.where_segments
    }

    pub fn join_conditions(&self) -> &[&'a ExpressionSegment] {
        &self.join_conditions
    }

    /// Column references of every scope, each segment once.
    pub fn columns(&self) -> &[BoundColumn<'a>] {
        &self.columns
    }

    pub fn column_binding(&self, segment: &ColumnSegment) -> Option<&ColumnBinding> {
        self.columns
            .iter()
            .find(|bound| ptr::eq(bound.segment, segment))
            .map(|bound| &bound.binding)
    }

    /// Logic table a column belongs to, when it is bound to one.
    pub fn column_table(&self, segment: &ColumnSegment) -> Option<&str> {
        match self.column_binding(segment)? {
            ColumnBinding::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn parameters(&self) -> &'a [Value] {
        self.parameters
    }

    pub fn select_context(&self) -> Option<&SelectContext<'a>> {
        self.select.as_ref()
    }

    pub fn insert_context(&self) -> Option<&InsertContext<'a>> {
        self.insert.as_ref()
    }

    pub fn assignments(&self) -> Option<&'a SetAssignmentSegment> {
        self.assignments
    }

    pub fn contains_subquery(&self) -> bool {
        self.contains_subquery
    }

    pub fn contains_table_subquery(&self) -> bool {
        self.contains_table_subquery
    }

    pub fn contains_dollar_parameter_marker(&self) -> bool {
        self.contains_dollar_parameter_marker
    }

    pub fn contains_partial_distinct_aggregation(&self) -> bool {
        self.select
            .as_ref()
            .map_or(false, |select| select.projections.is_partial_distinct_aggregation())
    }

    pub fn is_same_group_by_and_order_by_items(&self) -> bool {
        self.select
            .as_ref()
            .map_or(false, |select| select.is_same_group_by_and_order_by_items())
    }

    /// Statements that change data or schema.
    pub fn is_write(&self) -> bool {
        !matches!(self.kind, StatementKind::Select | StatementKind::Show | StatementKind::AnalyzeTable)
    }

    /// `SELECT ... FOR UPDATE` and friends.
    pub fn is_locking_read(&self) -> bool {
        self.select.as_ref().map_or(false, |select| select.lock)
    }
}

/// Value of a literal or a bound parameter marker.
pub fn resolve_value(expression: &ExpressionSegment, parameters: &[Value]) -> Option<Value> {
    match expression {
        ExpressionSegment::Literal(literal) => Some(literal.value.clone()),
        ExpressionSegment::ParameterMarker(marker) => parameters.get(marker.index).cloned(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::metadata::DatabaseMetaData;
    use data_panel_common::statement::{AggregationType, OrderByItemSegment, OrderDirection};

    fn metadata() -> MetaData {
        MetaData::default().with_database(
            "logic_db",
            DatabaseMetaData::new(&["ds_0"])
                .with_table("t_order", TableMetaData::new(&["order_id", "user_id", "status"]))
                .with_table("t_order_item", TableMetaData::new(&["item_id", "order_id", "user_id"])),
        )
    }

    #[test]
    fn test_capabilities_of_select() {
        let sql = "SELECT order_id FROM t_order WHERE user_id = ?";
        let statement = SQLStatement::Select(
            select(vec![column_projection(sql, "order_id")], table(sql, "t_order"))
                .with_where(eq(column(sql, "user_id"), marker(sql, 0))),
        );
        let parameters = vec![Value::Int(1)];
        let metadata = metadata();
        let ctx = SQLStatementContext::bind(&statement, &metadata, "logic_db", &parameters).unwrap();
        assert_eq!(ctx.kind(), StatementKind::Select);
        assert!(ctx.has(Capabilities::WHERE_AVAILABLE | Capabilities::PROJECTION_AVAILABLE));
        assert!(!ctx.has(Capabilities::INSERT_VALUES_AVAILABLE));
        assert_eq!(ctx.where_segments().len(), 1);
        assert_eq!(ctx.columns().len(), 2);
        assert!(ctx.columns().iter().all(|c| c.binding == ColumnBinding::Table("t_order".to_string())));
        assert!(!ctx.contains_subquery());
        assert!(!ctx.contains_dollar_parameter_marker());
    }

    #[test]
    fn test_bind_is_idempotent() {
        let sql = "SELECT o.order_id, AVG(i.item_id) FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id ORDER BY o.user_id";
        let statement = SQLStatement::Select(
            select(
                vec![
                    column_projection(sql, "o.order_id"),
                    aggregation(sql, "AVG(i.item_id)", AggregationType::Avg, vec![owned_column(sql, "i.item_id")]),
                ],
                join_on(
                    aliased_table(sql, "t_order", "o"),
                    aliased_table(sql, "t_order_item", "i"),
                    eq(owned_column_at(sql, "o.order_id", 1), owned_column(sql, "i.order_id")),
                ),
            )
            .with_order_by(vec![column_item(sql, "o.user_id")]),
        );
        let metadata = metadata();
        let first = SQLStatementContext::bind(&statement, &metadata, "logic_db", &[]).unwrap();
        let second = SQLStatementContext::bind(&statement, &metadata, "logic_db", &[]).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.join_conditions().len(), 1);
        let select = first.select_context().unwrap();
        assert_eq!(select.order_by_items[0].index, 5);
    }

    #[test]
    fn test_table_check() {
        let sql = "SELECT * FROM t_missing";
        let statement = SQLStatement::Select(select(vec![star(sql)], table(sql, "t_missing")));
        let metadata = metadata();
        let options = BindOptions {
            check_table_metadata_enabled: true,
        };
        let err = SQLStatementContext::bind_with_options(&statement, &metadata, "logic_db", &[], options).unwrap_err();
        assert!(err.is_binding());
        let err = SQLStatementContext::bind_with_options(&statement, &metadata, "missing_db", &[], options).unwrap_err();
        assert_eq!(err.to_string(), "unknown database `missing_db`");
        assert!(SQLStatementContext::bind(&statement, &metadata, "logic_db", &[]).is_ok());
    }

    #[test]
    fn test_create_table_target_needs_no_catalog_row() {
        let sql = "CREATE TABLE t_new (id INT)";
        let statement = SQLStatement::CreateTable(create_table(sql, "t_new"));
        let options = BindOptions {
            check_table_metadata_enabled: true,
        };
        let ctx = SQLStatementContext::bind_with_options(&statement, &metadata(), "logic_db", &[], options).unwrap();
        assert_eq!(ctx.capabilities(), Capabilities::TABLE_AVAILABLE);
        assert_eq!(ctx.tables().table_names(), &["t_new".to_string()]);
    }

    #[test]
    fn test_same_group_by_and_order_by() {
        let sql = "SELECT status, user_id FROM t_order GROUP BY status ORDER BY status";
        let statement = SQLStatement::Select(
            select(vec![column_projection(sql, "status"), column_projection(sql, "user_id")], table(sql, "t_order"))
                .with_group_by(vec![column_item_at(sql, "status", 1)])
                .with_order_by(vec![column_item_at(sql, "status", 2)]),
        );
        let metadata = metadata();
        let ctx = SQLStatementContext::bind(&statement, &metadata, "logic_db", &[]).unwrap();
        assert!(ctx.is_same_group_by_and_order_by_items());

        let desc = SQLStatement::Select(
            select(vec![column_projection(sql, "status"), column_projection(sql, "user_id")], table(sql, "t_order"))
                .with_group_by(vec![column_item_at(sql, "status", 1)])
                .with_order_by(vec![OrderByItemSegment::column(column_segment_at(sql, "status", 2), OrderDirection::Desc)]),
        );
        let ctx = SQLStatementContext::bind(&desc, &metadata, "logic_db", &[]).unwrap();
        assert!(!ctx.is_same_group_by_and_order_by_items());
    }
}
