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

pub mod generator;
pub mod parameter;
pub mod token;

use log::{debug, trace};

use data_panel_common::common::{Result, RewriteError};
use data_panel_common::statement::Value;

use crate::metadata::MetaData;
use crate::rule::{DataNode, RuleSet};
use crate::sql::analyse::SQLStatementContext;
use crate::sql::route::{RouteContext, RouteUnit};

pub use generator::{generate_tokens, GeneratedTokens, SQLTokenGenerator};
pub use parameter::ParameterBuilder;
pub use token::{SQLToken, SQLTokenSet, TokenValue};

pub type SRWResult = Result<()>;

pub trait SQLReWrite {
    fn rewrite(&self, f: &mut String, ctx: &RewriteUnitContext<'_>) -> SRWResult;
}

/// The logic SQL and the route unit a token renders for.
#[derive(Debug, Clone)]
pub struct RewriteUnitContext<'r> {
    pub sql: &'r str,
    pub unit: &'r RouteUnit,
    /// Insert rows routed to the unit; `None` keeps every row.
    insert_rows: Option<Vec<usize>>,
    /// Original parameter index to its index in the unit's parameters.
    parameter_indexes: Vec<Option<usize>>,
}

impl<'r> RewriteUnitContext<'r> {
    pub fn new(sql: &'r str, unit: &'r RouteUnit) -> Self {
        RewriteUnitContext {
            sql,
            unit,
            insert_rows: None,
            parameter_indexes: vec![],
        }
    }

    pub fn with_insert_rows(mut self, insert_rows: Option<Vec<usize>>) -> Self {
        self.insert_rows = insert_rows;
        self
    }

    pub fn with_parameter_indexes(mut self, parameter_indexes: Vec<Option<usize>>) -> Self {
        self.parameter_indexes = parameter_indexes;
        self
    }

    /// `sql[start..end]`.
    pub fn text(&self, start: usize, end: usize) -> Result<&'r str> {
        self.sql.get(start..end).ok_or_else(|| {
            RewriteError::TokenOutOfRange {
                start,
                stop: end.saturating_sub(1),
                length: self.sql.len(),
            }
            .into()
        })
    }

    pub fn is_insert_row_routed(&self, row: usize) -> bool {
        self.insert_rows.as_ref().map_or(true, |rows| rows.contains(&row))
    }

    pub fn parameter_index(&self, index: usize) -> Result<usize> {
        match self.parameter_indexes.get(index) {
            None => Ok(index),
            Some(Some(mapped)) => Ok(*mapped),
            Some(None) => Err(RewriteError::ParameterIndexOutOfRange {
                index,
                count: self.parameter_indexes.iter().flatten().count(),
            }
            .into()),
        }
    }
}

/// Actual SQL and parameters of one route unit.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSQLRewriteResult {
    pub route_unit: RouteUnit,
    pub sql: String,
    pub parameters: Vec<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct SQLRewriteEngine {
    rules: RuleSet,
}

impl SQLRewriteEngine {
    pub fn new(rules: RuleSet) -> Self {
        SQLRewriteEngine { rules }
    }

    /// One result per route unit, in route order. Tokens are generated once
    /// and rendered for every unit.
    pub fn rewrite(
        &self,
        sql: &str,
        ctx: &SQLStatementContext<'_>,
        route_context: &RouteContext,
        metadata: &MetaData,
    ) -> Result<Vec<RouteSQLRewriteResult>> {
        let generated = generate_tokens(ctx, route_context, &self.rules, metadata)?;
        let tokens = SQLTokenSet::new(generated.tokens, sql.len())?;
        debug!(
            "generated {} token(s) and {} parameter replacement(s)",
            tokens.tokens().len(),
            generated.parameter_replacements.len()
        );

        let mut results = Vec::with_capacity(route_context.units().len());
        for unit in route_context.units() {
            let insert_rows = routed_insert_rows(ctx, route_context, unit);
            let (parameters, parameter_indexes) = ParameterBuilder::new(ctx.parameters(), &generated.parameter_replacements)
                .with_insert_rows(ctx.insert_context(), insert_rows.as_deref())
                .build();
            let unit_ctx = RewriteUnitContext::new(sql, unit)
                .with_insert_rows(insert_rows)
                .with_parameter_indexes(parameter_indexes);
            let mut actual = String::with_capacity(sql.len());
            tokens.rewrite(&mut actual, &unit_ctx)?;
            trace!("rewrote for {}: {}", unit, actual);
            results.push(RouteSQLRewriteResult {
                route_unit: unit.clone(),
                sql: actual,
                parameters,
            });
        }
        Ok(results)
    }
}

/// Rows whose data node is the unit's, `None` when rows were not split.
fn routed_insert_rows(ctx: &SQLStatementContext<'_>, route_context: &RouteContext, unit: &RouteUnit) -> Option<Vec<usize>> {
    let original_data_nodes = route_context.original_data_nodes();
    if original_data_nodes.is_empty() {
        return None;
    }
    let insert = ctx.insert_context()?;
    let logic_table = insert.table.name();
    let node = DataNode::new(
        &unit.data_source_mapper().logic_name,
        unit.actual_table_name(logic_table).unwrap_or(logic_table),
    );
    Some(
        original_data_nodes
            .iter()
            .enumerate()
            .filter(|(_, nodes)| nodes.contains(&node))
            .map(|(row, _)| row)
            .collect(),
    )
}
