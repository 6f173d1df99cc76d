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

use crate::statement::expr::{ExpressionSegment, SubquerySegment};
use crate::statement::order::{GroupBySegment, OrderBySegment};
use crate::statement::projection::ProjectionsSegment;
use crate::statement::segment::{ColumnSegment, Span};
use crate::statement::table::{SimpleTableSegment, TableSegment, WithSegment};

#[derive(Debug, Clone, PartialEq)]
pub struct WhereSegment {
    pub span: Span,
    pub expr: ExpressionSegment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HavingSegment {
    pub span: Span,
    pub expr: ExpressionSegment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaginationValue {
    Number { span: Span, value: i64 },
    ParameterMarker { span: Span, index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LimitSegment {
    pub span: Span,
    pub offset: Option<PaginationValue>,
    pub row_count: Option<PaginationValue>,
}

/// `FOR UPDATE` / `LOCK IN SHARE MODE`
#[derive(Debug, Clone, PartialEq)]
pub struct LockSegment {
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineType {
    Union,
    UnionAll,
    Intersect,
    Except,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombineSegment {
    pub span: Span,
    pub left: SubquerySegment,
    pub combine_type: CombineType,
    pub right: SubquerySegment,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    pub projections: ProjectionsSegment,
    pub from: Option<TableSegment>,
    pub where_segment: Option<WhereSegment>,
    pub group_by: Option<GroupBySegment>,
    pub having: Option<HavingSegment>,
    pub order_by: Option<OrderBySegment>,
    pub limit: Option<LimitSegment>,
    pub combine: Option<Box<CombineSegment>>,
    pub with: Option<WithSegment>,
    pub lock: Option<LockSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentSegment {
    pub span: Span,
    pub columns: Vec<ColumnSegment>,
    pub value: ExpressionSegment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetAssignmentSegment {
    pub span: Span,
    pub assignments: Vec<AssignmentSegment>,
}

/// One `(...)` row of `VALUES`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertValuesSegment {
    pub span: Span,
    pub values: Vec<ExpressionSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: SimpleTableSegment,
    /// Span of `(col, ...)` when the column list is written out.
    pub columns_span: Option<Span>,
    pub columns: Vec<ColumnSegment>,
    pub values: Vec<InsertValuesSegment>,
    pub insert_select: Option<SubquerySegment>,
    pub set_assignment: Option<SetAssignmentSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: TableSegment,
    pub set_assignment: SetAssignmentSegment,
    pub where_segment: Option<WhereSegment>,
    pub order_by: Option<OrderBySegment>,
    pub limit: Option<LimitSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: TableSegment,
    pub where_segment: Option<WhereSegment>,
    pub order_by: Option<OrderBySegment>,
    pub limit: Option<LimitSegment>,
}
