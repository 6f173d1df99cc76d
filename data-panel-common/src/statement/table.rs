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
use crate::statement::segment::{AliasSegment, ColumnSegment, OwnerSegment, Span, TableNameSegment};

/// `[db.]table [AS alias]`
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleTableSegment {
    pub table_name: TableNameSegment,
    pub owner: Option<OwnerSegment>,
    pub alias: Option<AliasSegment>,
}

impl SimpleTableSegment {
    pub fn new(span: Span, name: &str) -> Self {
        SimpleTableSegment {
            table_name: TableNameSegment::new(span, name),
            owner: None,
            alias: None,
        }
    }

    pub fn with_owner(mut self, owner: OwnerSegment) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_alias(mut self, alias: AliasSegment) -> Self {
        self.alias = Some(alias);
        self
    }

    pub fn name(&self) -> &str {
        &self.table_name.identifier.value
    }

    pub fn alias_name(&self) -> Option<&str> {
        self.alias.as_ref().map(|alias| alias.name())
    }

    pub fn span(&self) -> Span {
        let start = self
            .owner
            .as_ref()
            .map(|owner| owner.span.start)
            .unwrap_or(self.table_name.span.start);
        let stop = self
            .alias
            .as_ref()
            .map(|alias| alias.span.stop)
            .unwrap_or(self.table_name.span.stop);
        Span::new(start, stop)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    Cross,
    /// `FROM a, b`
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinTableSegment {
    pub span: Span,
    pub left: TableSegment,
    pub right: TableSegment,
    pub join_type: JoinType,
    pub natural: bool,
    pub condition: Option<ExpressionSegment>,
    pub using: Vec<ColumnSegment>,
    /// Columns a NATURAL join implicitly joins on.
    pub derived_using: Vec<ColumnSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryTableSegment {
    pub subquery: SubquerySegment,
    pub alias: Option<AliasSegment>,
}

/// Table valued expression such as `TABLE(func(...))`.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionTableSegment {
    pub span: Span,
    pub expression: ExpressionSegment,
    pub alias: Option<AliasSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableSegment {
    Simple(SimpleTableSegment),
    Join(Box<JoinTableSegment>),
    Subquery(Box<SubqueryTableSegment>),
    Collection(Box<CollectionTableSegment>),
}

impl TableSegment {
    pub fn span(&self) -> Span {
        match self {
            TableSegment::Simple(t) => t.span(),
            TableSegment::Join(t) => t.span,
            TableSegment::Subquery(t) => {
                let stop = t.alias.as_ref().map(|alias| alias.span.stop).unwrap_or(t.subquery.span.stop);
                Span::new(t.subquery.span.start, stop)
            }
            TableSegment::Collection(t) => t.span,
        }
    }

    pub fn alias_name(&self) -> Option<&str> {
        match self {
            TableSegment::Simple(t) => t.alias_name(),
            TableSegment::Subquery(t) => t.alias.as_ref().map(|alias| alias.name()),
            TableSegment::Collection(t) => t.alias.as_ref().map(|alias| alias.name()),
            TableSegment::Join(_) => None,
        }
    }
}

/// `name [(columns)] AS (subquery)` of a WITH clause.
#[derive(Debug, Clone, PartialEq)]
pub struct CommonTableExpressionSegment {
    pub span: Span,
    pub alias: AliasSegment,
    pub columns: Vec<ColumnSegment>,
    pub subquery: SubquerySegment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithSegment {
    pub span: Span,
    pub common_table_expressions: Vec<CommonTableExpressionSegment>,
    pub recursive: bool,
}
