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

use std::fmt;

use crate::statement::expr::ExpressionSegment;
use crate::statement::segment::{ColumnSegment, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl Default for OrderDirection {
    fn default() -> Self {
        OrderDirection::Asc
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderDirection::Asc => f.write_str("ASC"),
            OrderDirection::Desc => f.write_str("DESC"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderByItemKind {
    /// 1-based position in the select list, `ORDER BY 2`.
    Index(usize),
    Column(ColumnSegment),
    Expression { text: String, expr: ExpressionSegment },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItemSegment {
    pub span: Span,
    pub kind: OrderByItemKind,
    pub direction: OrderDirection,
    pub nulls_order: Option<NullsOrder>,
}

impl OrderByItemSegment {
    pub fn index(span: Span, index: usize, direction: OrderDirection) -> Self {
        OrderByItemSegment {
            span,
            kind: OrderByItemKind::Index(index),
            direction,
            nulls_order: None,
        }
    }

    pub fn column(column: ColumnSegment, direction: OrderDirection) -> Self {
        OrderByItemSegment {
            span: column.span,
            kind: OrderByItemKind::Column(column),
            direction,
            nulls_order: None,
        }
    }

    pub fn expression(span: Span, text: &str, expr: ExpressionSegment, direction: OrderDirection) -> Self {
        OrderByItemSegment {
            span,
            kind: OrderByItemKind::Expression {
                text: text.to_string(),
                expr,
            },
            direction,
            nulls_order: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBySegment {
    pub span: Span,
    pub items: Vec<OrderByItemSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupBySegment {
    pub span: Span,
    pub items: Vec<OrderByItemSegment>,
}
