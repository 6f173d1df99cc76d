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

use crate::statement::expr::{ExpressionSegment, SubquerySegment};
use crate::statement::segment::{AliasSegment, ColumnSegment, OwnerSegment, Span};

/// The select list, `span` covers everything between `SELECT [DISTINCT]` and `FROM`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectionsSegment {
    pub span: Span,
    pub distinct_row: bool,
    pub projections: Vec<ProjectionSegment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationType {
    Max,
    Min,
    Sum,
    Count,
    Avg,
}

impl fmt::Display for AggregationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregationType::Max => "MAX",
            AggregationType::Min => "MIN",
            AggregationType::Sum => "SUM",
            AggregationType::Count => "COUNT",
            AggregationType::Avg => "AVG",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionSegment {
    Column(ColumnProjectionSegment),
    /// `*` or `t.*`
    Shorthand(ShorthandProjectionSegment),
    Aggregation(AggregationProjectionSegment),
    Expression(ExpressionProjectionSegment),
    Subquery(SubqueryProjectionSegment),
}

impl ProjectionSegment {
    pub fn span(&self) -> Span {
        match self {
            ProjectionSegment::Column(p) => {
                let stop = p.alias.as_ref().map(|alias| alias.span.stop).unwrap_or(p.column.span.stop);
                Span::new(p.column.span.start, stop)
            }
            ProjectionSegment::Shorthand(p) => p.span,
            ProjectionSegment::Aggregation(p) => p.span,
            ProjectionSegment::Expression(p) => p.span,
            ProjectionSegment::Subquery(p) => p.span,
        }
    }

    pub fn alias(&self) -> Option<&AliasSegment> {
        match self {
            ProjectionSegment::Column(p) => p.alias.as_ref(),
            ProjectionSegment::Aggregation(p) => p.alias.as_ref(),
            ProjectionSegment::Expression(p) => p.alias.as_ref(),
            ProjectionSegment::Subquery(p) => p.alias.as_ref(),
            ProjectionSegment::Shorthand(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProjectionSegment {
    pub column: ColumnSegment,
    pub alias: Option<AliasSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShorthandProjectionSegment {
    pub span: Span,
    pub owner: Option<OwnerSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationProjectionSegment {
    pub span: Span,
    pub aggregation_type: AggregationType,
    pub distinct: bool,
    pub parameters: Vec<ExpressionSegment>,
    /// Text between the parentheses, `DISTINCT user_id` of `COUNT(DISTINCT user_id)`.
    pub inner_expression: String,
    pub alias: Option<AliasSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionProjectionSegment {
    pub span: Span,
    pub text: String,
    pub expr: ExpressionSegment,
    pub alias: Option<AliasSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryProjectionSegment {
    pub span: Span,
    pub subquery: SubquerySegment,
    pub text: String,
    pub alias: Option<AliasSegment>,
}
