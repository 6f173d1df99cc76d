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

use std::fmt::Write;

use data_panel_common::common::RewriteError;
use data_panel_common::statement::{ParameterMarkerType, QuoteCharacter, Span, Value};

use crate::sql::rewrite::{RewriteUnitContext, SQLReWrite, SRWResult};

/// What a value token puts in place of its span.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    /// The value was dropped, nothing is written.
    Empty,
    /// Supplied at execution time.
    Marker {
        index: usize,
        marker_type: ParameterMarkerType,
    },
    Literal(Value),
}

/// One value of a rewritten VALUES row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    /// Copied from the SQL text as written.
    Original(Span),
    Value(TokenValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertRowToken {
    pub values: Vec<RowValue>,
}

/// A region of the logic SQL and what replaces it in the actual SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum SQLToken {
    /// Logic table name, written as the route unit's actual table.
    Table {
        span: Span,
        logic_table: String,
        quote: QuoteCharacter,
    },
    /// Text dropped from the actual SQL, such as a `logic_db.` qualifier.
    Remove { span: Span },
    /// Text added in front of `index`.
    Text { index: usize, text: String },
    /// Column name replaced with another column expression.
    Column { span: Span, text: String },
    /// Predicate or assignment value; `None` when neither a literal nor a
    /// parameter marker was recorded for it.
    Value { span: Span, value: Option<TokenValue> },
    /// Every VALUES row, narrowed to the rows routed to the unit.
    InsertValues { span: Span, rows: Vec<InsertRowToken> },
}

impl SQLToken {
    pub fn start(&self) -> usize {
        match self {
            SQLToken::Text { index, .. } => *index,
            SQLToken::Table { span, .. }
            | SQLToken::Remove { span }
            | SQLToken::Column { span, .. }
            | SQLToken::Value { span, .. }
            | SQLToken::InsertValues { span, .. } => span.start,
        }
    }

    /// Exclusive end, equal to the start for text insertions.
    pub fn end(&self) -> usize {
        match self {
            SQLToken::Text { index, .. } => *index,
            SQLToken::Table { span, .. }
            | SQLToken::Remove { span }
            | SQLToken::Column { span, .. }
            | SQLToken::Value { span, .. }
            | SQLToken::InsertValues { span, .. } => span.stop + 1,
        }
    }

    fn stop(&self) -> usize {
        self.end().saturating_sub(1).max(self.start())
    }
}

fn write_value(f: &mut String, value: &TokenValue, ctx: &RewriteUnitContext<'_>) -> SRWResult {
    match value {
        TokenValue::Empty => {}
        TokenValue::Marker {
            marker_type: ParameterMarkerType::Question,
            ..
        } => f.push('?'),
        TokenValue::Marker {
            index,
            marker_type: ParameterMarkerType::Dollar,
        } => write!(f, "${}", ctx.parameter_index(*index)? + 1)?,
        TokenValue::Literal(value) => f.push_str(&value.to_sql_literal()),
    }
    Ok(())
}

impl SQLReWrite for SQLToken {
    fn rewrite(&self, f: &mut String, ctx: &RewriteUnitContext<'_>) -> SRWResult {
        match self {
            SQLToken::Table { logic_table, quote, .. } => {
                let actual = ctx.unit.actual_table_name(logic_table).unwrap_or(logic_table);
                f.push_str(&quote.wrap(actual));
            }
            SQLToken::Remove { .. } => {}
            SQLToken::Text { text, .. } | SQLToken::Column { text, .. } => f.push_str(text),
            SQLToken::Value { span, value } => match value {
                Some(value) => write_value(f, value, ctx)?,
                None => {
                    return Err(RewriteError::UnresolvableToken {
                        start: span.start,
                        stop: span.stop,
                    }
                    .into())
                }
            },
            SQLToken::InsertValues { rows, .. } => {
                let mut first = true;
                for (index, row) in rows.iter().enumerate() {
                    if !ctx.is_insert_row_routed(index) {
                        continue;
                    }
                    if !first {
                        f.push_str(", ");
                    }
                    first = false;
                    f.push('(');
                    for (i, value) in row.values.iter().enumerate() {
                        if i > 0 {
                            f.push_str(", ");
                        }
                        match value {
                            RowValue::Original(span) => f.push_str(ctx.text(span.start, span.stop + 1)?),
                            RowValue::Value(value) => write_value(f, value, ctx)?,
                        }
                    }
                    f.push(')');
                }
            }
        }
        Ok(())
    }
}

/// Tokens of one statement, sorted by position and free of overlaps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SQLTokenSet {
    tokens: Vec<SQLToken>,
}

impl SQLTokenSet {
    pub fn new(mut tokens: Vec<SQLToken>, sql_length: usize) -> Result<Self, RewriteError> {
        tokens.sort_by_key(|token| (token.start(), token.end()));
        tokens.dedup();
        for token in &tokens {
            if token.end() > sql_length {
                return Err(RewriteError::TokenOutOfRange {
                    start: token.start(),
                    stop: token.stop(),
                    length: sql_length,
                });
            }
        }
        for pair in tokens.windows(2) {
            if pair[0].end() > pair[1].start() {
                return Err(RewriteError::OverlappingTokens {
                    first_start: pair[0].start(),
                    first_stop: pair[0].stop(),
                    second_start: pair[1].start(),
                    second_stop: pair[1].stop(),
                });
            }
        }
        Ok(SQLTokenSet { tokens })
    }

    pub fn tokens(&self) -> &[SQLToken] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl SQLReWrite for SQLTokenSet {
    /// Copies the SQL text between tokens and each token's rendering in place
    /// of its span.
    fn rewrite(&self, f: &mut String, ctx: &RewriteUnitContext<'_>) -> SRWResult {
        let mut cursor = 0;
        for token in &self.tokens {
            f.push_str(ctx.text(cursor, token.start())?);
            token.rewrite(f, ctx)?;
            cursor = token.end();
        }
        f.push_str(ctx.text(cursor, ctx.sql.len())?);
        Ok(())
    }
}
