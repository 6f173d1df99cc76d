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

use std::collections::BTreeMap;

use data_panel_common::common::{Result, RewriteError};
use data_panel_common::statement::{
    ColumnSegment, ExpressionSegment, ProjectionSegment, SQLStatement, SimpleTableSegment, Span, Value,
};

use crate::metadata::MetaData;
use crate::rule::{EncryptColumn, EncryptRule, RuleSet};
use crate::sql::analyse::{ColumnBinding, SQLStatementContext};
use crate::sql::extract::expression::extract_and_predicates;
use crate::sql::rewrite::token::{InsertRowToken, RowValue, SQLToken, TokenValue};
use crate::sql::route::RouteContext;

/// Tokens of a statement and the parameters whose bound value is replaced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeneratedTokens {
    pub tokens: Vec<SQLToken>,
    /// Parameter index to its encrypted value.
    pub parameter_replacements: BTreeMap<usize, Value>,
}

pub trait SQLTokenGenerator {
    fn generate(
        &self,
        ctx: &SQLStatementContext<'_>,
        route_context: &RouteContext,
        result: &mut GeneratedTokens,
    ) -> Result<()>;
}

/// Table names, database qualifiers in front of them, and column or star
/// owners that name a table rather than an alias.
#[derive(Debug)]
pub struct TableTokenGenerator<'g> {
    pub metadata: &'g MetaData,
}

impl<'g> TableTokenGenerator<'g> {
    fn is_logic_database(&self, ctx: &SQLStatementContext<'_>, name: &str) -> bool {
        name.eq_ignore_ascii_case(ctx.current_database()) || self.metadata.contains_database(name)
    }

    fn owner_table<'a>(ctx: &SQLStatementContext<'a>, owner: &str) -> Option<&'a SimpleTableSegment> {
        ctx.tables().find_table_by_qualifier(owner).filter(|table| {
            table.name().eq_ignore_ascii_case(owner)
                && table.alias_name().map_or(true, |alias| !alias.eq_ignore_ascii_case(owner))
        })
    }
}

impl<'g> SQLTokenGenerator for TableTokenGenerator<'g> {
    fn generate(&self, ctx: &SQLStatementContext<'_>, _: &RouteContext, result: &mut GeneratedTokens) -> Result<()> {
        for table in ctx.tables().rewrite_tables() {
            if let Some(owner) = &table.owner {
                if self.is_logic_database(ctx, owner.name()) {
                    result.tokens.push(SQLToken::Remove {
                        span: Span::new(owner.span.start, table.table_name.span.start - 1),
                    });
                }
            }
            result.tokens.push(SQLToken::Table {
                span: table.table_name.span,
                logic_table: table.name().to_ascii_lowercase(),
                quote: table.table_name.identifier.quote,
            });
        }
        for bound in ctx.columns() {
            if let Some(owner) = &bound.segment.owner {
                if let Some(table) = Self::owner_table(ctx, owner.name()) {
                    result.tokens.push(SQLToken::Table {
                        span: owner.span,
                        logic_table: table.name().to_ascii_lowercase(),
                        quote: owner.identifier.quote,
                    });
                }
            }
        }
        if let Some(select) = ctx.statement().as_select() {
            for projection in &select.projections.projections {
                if let ProjectionSegment::Shorthand(shorthand) = projection {
                    if let Some(owner) = &shorthand.owner {
                        if let Some(table) = Self::owner_table(ctx, owner.name()) {
                            result.tokens.push(SQLToken::Table {
                                span: owner.span,
                                logic_table: table.name().to_ascii_lowercase(),
                                quote: owner.identifier.quote,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Projections the result merger needs but the client did not select.
#[derive(Debug)]
pub struct DerivedProjectionTokenGenerator;

impl SQLTokenGenerator for DerivedProjectionTokenGenerator {
    fn generate(&self, ctx: &SQLStatementContext<'_>, _: &RouteContext, result: &mut GeneratedTokens) -> Result<()> {
        let projections = match ctx.select_context() {
            Some(select) => &select.projections,
            None => return Ok(()),
        };
        if projections.derived_projections().is_empty() || projections.is_empty() {
            return Ok(());
        }
        let mut text = String::new();
        for derived in projections.derived_projections() {
            text.push_str(", ");
            text.push_str(&derived.to_string());
        }
        result.tokens.push(SQLToken::Text {
            index: projections.span.stop + 1,
            text,
        });
        Ok(())
    }
}

/// Encrypted form of a literal or bound parameter; `None` for expressions.
fn encrypt_value(
    ctx: &SQLStatementContext<'_>,
    column: &EncryptColumn,
    expression: &ExpressionSegment,
    result: &mut GeneratedTokens,
) -> Result<Option<TokenValue>> {
    match expression {
        ExpressionSegment::Literal(literal) => Ok(Some(TokenValue::Literal(column.encrypt(&literal.value)?))),
        ExpressionSegment::ParameterMarker(marker) => {
            let plain = ctx.parameters().get(marker.index).ok_or(RewriteError::ParameterIndexOutOfRange {
                index: marker.index,
                count: ctx.parameters().len(),
            })?;
            result
                .parameter_replacements
                .insert(marker.index, column.encrypt(plain)?);
            Ok(Some(TokenValue::Marker {
                index: marker.index,
                marker_type: marker.marker_type,
            }))
        }
        _ => Ok(None),
    }
}

/// Plain columns to cipher columns and plain values to encrypted values.
#[derive(Debug)]
pub struct EncryptTokenGenerator<'g> {
    pub rule: &'g EncryptRule,
}

impl<'g> EncryptTokenGenerator<'g> {
    fn encrypt_column(&self, ctx: &SQLStatementContext<'_>, column: &ColumnSegment) -> Option<&'g EncryptColumn> {
        let table = match ctx.column_binding(column) {
            Some(ColumnBinding::Table(table)) => table.clone(),
            Some(ColumnBinding::Derived(_)) | Some(ColumnBinding::ProjectionAlias) => return None,
            Some(ColumnBinding::Unresolved) | None => match column.owner_name() {
                Some(owner) => ctx.tables().find_table_by_qualifier(owner)?.name().to_ascii_lowercase(),
                None => match ctx.tables().table_names() {
                    [only] => only.clone(),
                    _ => return None,
                },
            },
        };
        self.rule.find_column(&table, column.name())
    }

    fn cipher_token(column_segment: &ColumnSegment, column: &EncryptColumn) -> SQLToken {
        SQLToken::Column {
            span: column_segment.name_span(),
            text: column.cipher_column.clone(),
        }
    }

    fn generate_projections(&self, ctx: &SQLStatementContext<'_>, result: &mut GeneratedTokens) {
        let select = match ctx.statement().as_select() {
            Some(select) => select,
            None => return,
        };
        for projection in &select.projections.projections {
            if let ProjectionSegment::Column(projection) = projection {
                if let Some(column) = self.encrypt_column(ctx, &projection.column) {
                    let text = match &projection.alias {
                        Some(_) => column.cipher_column.clone(),
                        None => format!("{} AS {}", column.cipher_column, projection.column.name()),
                    };
                    result.tokens.push(SQLToken::Column {
                        span: projection.column.name_span(),
                        text,
                    });
                }
            }
        }
    }

    fn generate_predicates(&self, ctx: &SQLStatementContext<'_>, result: &mut GeneratedTokens) -> Result<()> {
        for where_segment in ctx.where_segments() {
            for and_predicate in extract_and_predicates(&where_segment.expr) {
                for predicate in and_predicate.predicates {
                    self.generate_predicate(ctx, predicate, result)?;
                }
            }
        }
        Ok(())
    }

    fn generate_predicate(
        &self,
        ctx: &SQLStatementContext<'_>,
        predicate: &ExpressionSegment,
        result: &mut GeneratedTokens,
    ) -> Result<()> {
        let unsupported = |column: &EncryptColumn, operator: &str| -> Result<()> {
            Err(RewriteError::UnsupportedEncryptCondition {
                column: column.logic_column.clone(),
                operator: operator.to_string(),
            }
            .into())
        };
        match predicate {
            ExpressionSegment::BinaryOperation(binary) => {
                let (column_segment, value) = match (binary.left.as_column(), binary.right.as_column()) {
                    (Some(column), None) => (column, &*binary.right),
                    (None, Some(column)) => (column, &*binary.left),
                    _ => return Ok(()),
                };
                let column = match self.encrypt_column(ctx, column_segment) {
                    Some(column) => column,
                    None => return Ok(()),
                };
                if !matches!(binary.operator.as_str(), "=" | "<>" | "!=") {
                    return unsupported(column, &binary.operator);
                }
                match encrypt_value(ctx, column, value, result)? {
                    Some(encrypted) => {
                        result.tokens.push(Self::cipher_token(column_segment, column));
                        result.tokens.push(SQLToken::Value {
                            span: value.span(),
                            value: Some(encrypted),
                        });
                        Ok(())
                    }
                    None => unsupported(column, &binary.operator),
                }
            }
            ExpressionSegment::In(in_expression) => {
                let column_segment = match in_expression.left.as_column() {
                    Some(column) => column,
                    None => return Ok(()),
                };
                let column = match self.encrypt_column(ctx, column_segment) {
                    Some(column) => column,
                    None => return Ok(()),
                };
                let items = match &*in_expression.right {
                    ExpressionSegment::List(list) => &list.items,
                    ExpressionSegment::Row(row) => &row.items,
                    _ => return unsupported(column, "IN"),
                };
                let mut tokens = vec![Self::cipher_token(column_segment, column)];
                for item in items {
                    match encrypt_value(ctx, column, item, result)? {
                        Some(encrypted) => tokens.push(SQLToken::Value {
                            span: item.span(),
                            value: Some(encrypted),
                        }),
                        None => return unsupported(column, "IN"),
                    }
                }
                result.tokens.extend(tokens);
                Ok(())
            }
            ExpressionSegment::Between(between) => match between.left.as_column() {
                Some(column_segment) => match self.encrypt_column(ctx, column_segment) {
                    Some(column) => unsupported(column, "BETWEEN"),
                    None => Ok(()),
                },
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    fn generate_assignments(&self, ctx: &SQLStatementContext<'_>, result: &mut GeneratedTokens) -> Result<()> {
        let assignments = match ctx.assignments() {
            Some(assignments) => assignments,
            None => return Ok(()),
        };
        for assignment in &assignments.assignments {
            let column_segment = match assignment.columns.first() {
                Some(column) => column,
                None => continue,
            };
            let column = match self.encrypt_column(ctx, column_segment) {
                Some(column) => column,
                None => continue,
            };
            match encrypt_value(ctx, column, &assignment.value, result)? {
                Some(encrypted) => {
                    result.tokens.push(Self::cipher_token(column_segment, column));
                    result.tokens.push(SQLToken::Value {
                        span: assignment.value.span(),
                        value: Some(encrypted),
                    });
                }
                None => {
                    return Err(RewriteError::UnsupportedEncryptCondition {
                        column: column.logic_column.clone(),
                        operator: "SET".to_string(),
                    }
                    .into())
                }
            }
        }
        Ok(())
    }

    fn generate_insert_columns(&self, ctx: &SQLStatementContext<'_>, result: &mut GeneratedTokens) {
        let insert = match ctx.statement() {
            SQLStatement::Insert(insert) => insert,
            _ => return,
        };
        let table = insert.table.name();
        for column_segment in &insert.columns {
            if let Some(column) = self.rule.find_column(table, column_segment.name()) {
                result.tokens.push(Self::cipher_token(column_segment, column));
            }
        }
    }
}

impl<'g> SQLTokenGenerator for EncryptTokenGenerator<'g> {
    fn generate(&self, ctx: &SQLStatementContext<'_>, _: &RouteContext, result: &mut GeneratedTokens) -> Result<()> {
        if !ctx.tables().table_names().iter().any(|table| self.rule.is_encrypt_table(table)) {
            return Ok(());
        }
        self.generate_projections(ctx, result);
        self.generate_predicates(ctx, result)?;
        self.generate_assignments(ctx, result)?;
        self.generate_insert_columns(ctx, result);
        Ok(())
    }
}

/// VALUES rows rebuilt per unit, when rows are split over units or carry
/// values to encrypt.
#[derive(Debug)]
pub struct InsertValuesTokenGenerator<'g> {
    pub encrypt: Option<&'g EncryptRule>,
}

impl<'g> SQLTokenGenerator for InsertValuesTokenGenerator<'g> {
    fn generate(
        &self,
        ctx: &SQLStatementContext<'_>,
        route_context: &RouteContext,
        result: &mut GeneratedTokens,
    ) -> Result<()> {
        let insert = match ctx.insert_context() {
            Some(insert) => insert,
            None => return Ok(()),
        };
        let span = match insert.values_span() {
            Some(span) => span,
            None => return Ok(()),
        };
        let table = insert.table.name();
        let columns: Vec<Option<&EncryptColumn>> = insert
            .columns
            .iter()
            .map(|column| self.encrypt.and_then(|rule| rule.find_column(table, column)))
            .collect();
        let split = !route_context.original_data_nodes().is_empty();
        if !split && columns.iter().all(Option::is_none) {
            return Ok(());
        }
        let mut rows = Vec::with_capacity(insert.rows.len());
        for row in &insert.rows {
            let mut values = Vec::with_capacity(row.values.len());
            for (index, expression) in row.values.iter().enumerate() {
                let value = match columns.get(index).copied().flatten() {
                    Some(column) => match encrypt_value(ctx, column, expression, result)? {
                        Some(encrypted) => RowValue::Value(encrypted),
                        None => {
                            return Err(RewriteError::UnsupportedEncryptCondition {
                                column: column.logic_column.clone(),
                                operator: "VALUES".to_string(),
                            }
                            .into())
                        }
                    },
                    None => match expression {
                        ExpressionSegment::ParameterMarker(marker) => RowValue::Value(TokenValue::Marker {
                            index: marker.index,
                            marker_type: marker.marker_type,
                        }),
                        other => RowValue::Original(other.span()),
                    },
                };
                values.push(value);
            }
            rows.push(InsertRowToken { values });
        }
        result.tokens.push(SQLToken::InsertValues { span, rows });
        Ok(())
    }
}

/// Generators for the configured rules, table names first.
pub fn generate_tokens(
    ctx: &SQLStatementContext<'_>,
    route_context: &RouteContext,
    rules: &RuleSet,
    metadata: &MetaData,
) -> Result<GeneratedTokens> {
    let mut generators: Vec<Box<dyn SQLTokenGenerator + '_>> = vec![Box::new(TableTokenGenerator { metadata })];
    if let Some(sharding) = &rules.sharding {
        if ctx.tables().table_names().iter().any(|table| sharding.is_sharding_table(table)) {
            generators.push(Box::new(DerivedProjectionTokenGenerator));
        }
    }
    if let Some(encrypt) = &rules.encrypt {
        generators.push(Box::new(EncryptTokenGenerator { rule: encrypt }));
    }
    generators.push(Box::new(InsertValuesTokenGenerator {
        encrypt: rules.encrypt.as_deref(),
    }));

    let mut result = GeneratedTokens::default();
    for generator in &generators {
        generator.generate(ctx, route_context, &mut result)?;
    }
    Ok(result)
}
