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

use crate::statement::dml::SelectStatement;
use crate::statement::segment::{ColumnSegment, Span};
use crate::statement::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterMarkerType {
    /// `?`
    Question,
    /// `$1`, `$2`...
    Dollar,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubquerySegment {
    pub span: Span,
    pub select: Box<SelectStatement>,
}

/// An SQL expression of any type.
///
/// Every variant keeps the span of the text it was parsed from so that it
/// can be substituted in place.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionSegment {
    Column(ColumnSegment),
    Literal(LiteralExpressionSegment),
    ParameterMarker(ParameterMarkerExpressionSegment),
    BinaryOperation(BinaryOperationExpression),
    In(InExpression),
    Between(BetweenExpression),
    /// `(a, b)` on the left of `IN`
    Row(RowExpression),
    /// `(1, 2, 3)` on the right of `IN`
    List(ListExpression),
    /// Oracle style `col(+)`
    OuterJoin(OuterJoinExpression),
    Subquery(SubqueryExpressionSegment),
    Exists(ExistsSubqueryExpression),
    Function(FunctionSegment),
    Not(NotExpression),
    Common(CommonExpressionSegment),
}

impl ExpressionSegment {
    pub fn span(&self) -> Span {
        match self {
            ExpressionSegment::Column(e) => e.span,
            ExpressionSegment::Literal(e) => e.span,
            ExpressionSegment::ParameterMarker(e) => e.span,
            ExpressionSegment::BinaryOperation(e) => e.span,
            ExpressionSegment::In(e) => e.span,
            ExpressionSegment::Between(e) => e.span,
            ExpressionSegment::Row(e) => e.span,
            ExpressionSegment::List(e) => e.span,
            ExpressionSegment::OuterJoin(e) => e.span,
            ExpressionSegment::Subquery(e) => e.subquery.span,
            ExpressionSegment::Exists(e) => e.span,
            ExpressionSegment::Function(e) => e.span,
            ExpressionSegment::Not(e) => e.span,
            ExpressionSegment::Common(e) => e.span,
        }
    }

    pub fn as_column(&self) -> Option<&ColumnSegment> {
        match self {
            ExpressionSegment::Column(column) => Some(column),
            _ => None,
        }
    }

    /// `true` for literals and parameter markers, the value side of a predicate.
    pub fn is_value(&self) -> bool {
        matches!(self, ExpressionSegment::Literal(_) | ExpressionSegment::ParameterMarker(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiteralExpressionSegment {
    pub span: Span,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterMarkerExpressionSegment {
    pub span: Span,
    /// Zero based position of the bound parameter.
    pub index: usize,
    pub marker_type: ParameterMarkerType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOperationExpression {
    pub span: Span,
    pub left: Box<ExpressionSegment>,
    pub right: Box<ExpressionSegment>,
    pub operator: String,
    pub text: String,
}

impl BinaryOperationExpression {
    pub fn is_and(&self) -> bool {
        self.operator.eq_ignore_ascii_case("AND") || self.operator == "&&"
    }

    pub fn is_or(&self) -> bool {
        self.operator.eq_ignore_ascii_case("OR") || self.operator == "||"
    }

    pub fn is_equal(&self) -> bool {
        self.operator == "=" || self.operator == "<=>"
    }

    pub fn is_compare(&self) -> bool {
        matches!(self.operator.as_str(), "<" | "<=" | ">" | ">=")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InExpression {
    pub span: Span,
    pub left: Box<ExpressionSegment>,
    pub right: Box<ExpressionSegment>,
    pub not: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BetweenExpression {
    pub span: Span,
    pub left: Box<ExpressionSegment>,
    pub between: Box<ExpressionSegment>,
    pub and: Box<ExpressionSegment>,
    pub not: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowExpression {
    pub span: Span,
    pub items: Vec<ExpressionSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListExpression {
    pub span: Span,
    pub items: Vec<ExpressionSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OuterJoinExpression {
    pub span: Span,
    pub column: ColumnSegment,
    pub join_operator: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryExpressionSegment {
    pub subquery: SubquerySegment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExistsSubqueryExpression {
    pub span: Span,
    pub subquery: SubquerySegment,
    pub not: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSegment {
    pub span: Span,
    pub function_name: String,
    pub parameters: Vec<ExpressionSegment>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotExpression {
    pub span: Span,
    pub expression: Box<ExpressionSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommonExpressionSegment {
    pub span: Span,
    pub text: String,
}
