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

use data_panel_common::common::{BindingError, Result};
use data_panel_common::statement::{
    AggregationType, OrderByItemKind, OrderByItemSegment, OrderDirection, ProjectionSegment, ProjectionsSegment, Span,
};

use crate::metadata::TableMetaData;
use crate::sql::extract::TableRef;

pub const AVG_DERIVED_COUNT: &str = "AVG_DERIVED_COUNT";
pub const AVG_DERIVED_SUM: &str = "AVG_DERIVED_SUM";
pub const ORDER_BY_DERIVED: &str = "ORDER_BY_DERIVED";
pub const GROUP_BY_DERIVED: &str = "GROUP_BY_DERIVED";

/// One column of the result set a select produces.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Column {
        owner: Option<String>,
        name: String,
        alias: Option<String>,
    },
    /// A `*` / `t.*` that could not be expanded from metadata.
    Shorthand { owner: Option<String> },
    Aggregation {
        aggregation_type: AggregationType,
        distinct: bool,
        inner_expression: String,
        alias: Option<String>,
    },
    Expression { text: String, alias: Option<String> },
    Subquery { text: String, alias: Option<String> },
    /// Added by the kernel, never written by the client.
    Derived { expression: String, alias: String },
}

impl Projection {
    pub fn alias(&self) -> Option<&str> {
        match self {
            Projection::Column { alias, .. }
            | Projection::Aggregation { alias, .. }
            | Projection::Expression { alias, .. }
            | Projection::Subquery { alias, .. } => alias.as_deref(),
            Projection::Derived { alias, .. } => Some(alias),
            Projection::Shorthand { .. } => None,
        }
    }

    pub fn expression(&self) -> String {
        match self {
            Projection::Column { owner: Some(owner), name, .. } => format!("{}.{}", owner, name),
            Projection::Column { name, .. } => name.clone(),
            Projection::Shorthand { owner: Some(owner) } => format!("{}.*", owner),
            Projection::Shorthand { owner: None } => "*".to_string(),
            Projection::Aggregation {
                aggregation_type,
                inner_expression,
                ..
            } => format!("{}({})", aggregation_type, inner_expression),
            Projection::Expression { text, .. } | Projection::Subquery { text, .. } => text.clone(),
            Projection::Derived { expression, .. } => expression.clone(),
        }
    }

    /// Label of the column in the result set.
    pub fn column_label(&self) -> String {
        self.alias().map(|alias| alias.to_string()).unwrap_or_else(|| match self {
            Projection::Column { name, .. } => name.clone(),
            other => other.expression(),
        })
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, Projection::Derived { .. })
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projection::Derived { expression, alias } => write!(f, "{} AS {}", expression, alias),
            other => match other.alias() {
                Some(alias) => write!(f, "{} AS {}", other.expression(), alias),
                None => f.write_str(&other.expression()),
            },
        }
    }
}

/// The final projection list of a select: written projections with stars
/// expanded, followed by the derived ones.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProjectionsContext {
    pub span: Span,
    pub distinct_row: bool,
    projections: Vec<Projection>,
    derived: Vec<Projection>,
    aggregation_count: usize,
    aggregation_distinct_count: usize,
    avg_derived_count: usize,
    order_by_derived_count: usize,
    group_by_derived_count: usize,
}

impl ProjectionsContext {
    /// Builds the projection list; `tables` are the select's own scope, paired
    /// with their metadata for star expansion.
    pub fn new(segment: &ProjectionsSegment, tables: &[(TableRef<'_>, Option<&TableMetaData>)]) -> Self {
        let mut result = ProjectionsContext {
            span: segment.span,
            distinct_row: segment.distinct_row,
            ..ProjectionsContext::default()
        };
        for projection in &segment.projections {
            match projection {
                ProjectionSegment::Column(p) => result.projections.push(Projection::Column {
                    owner: p.column.owner_name().map(|owner| owner.to_string()),
                    name: p.column.name().to_string(),
                    alias: p.alias.as_ref().map(|alias| alias.name().to_string()),
                }),
                ProjectionSegment::Shorthand(p) => {
                    let owner = p.owner.as_ref().map(|owner| owner.name());
                    result.expand_shorthand(owner, tables);
                }
                ProjectionSegment::Aggregation(p) => {
                    result.aggregation_count += 1;
                    if p.distinct {
                        result.aggregation_distinct_count += 1;
                    }
                    result.projections.push(Projection::Aggregation {
                        aggregation_type: p.aggregation_type,
                        distinct: p.distinct,
                        inner_expression: p.inner_expression.clone(),
                        alias: p.alias.as_ref().map(|alias| alias.name().to_string()),
                    });
                }
                ProjectionSegment::Expression(p) => result.projections.push(Projection::Expression {
                    text: p.text.clone(),
                    alias: p.alias.as_ref().map(|alias| alias.name().to_string()),
                }),
                ProjectionSegment::Subquery(p) => result.projections.push(Projection::Subquery {
                    text: p.text.clone(),
                    alias: p.alias.as_ref().map(|alias| alias.name().to_string()),
                }),
            }
        }
        result.derive_avg_projections();
        result
    }

    fn expand_shorthand(&mut self, owner: Option<&str>, tables: &[(TableRef<'_>, Option<&TableMetaData>)]) {
        let targets: Vec<&(TableRef<'_>, Option<&TableMetaData>)> = tables
            .iter()
            .filter(|(table, _)| match owner {
                Some(owner) => table.qualifier().map_or(false, |q| q.eq_ignore_ascii_case(owner)),
                None => true,
            })
            .collect();
        let expandable = !targets.is_empty() && targets.iter().all(|(_, metadata)| metadata.is_some());
        if !expandable {
            self.projections.push(Projection::Shorthand {
                owner: owner.map(|owner| owner.to_string()),
            });
            return;
        }
        for (table, metadata) in targets {
            let qualifier = table.qualifier().map(|q| q.to_string());
            if let Some(metadata) = metadata {
                for column in metadata.column_names() {
                    self.projections.push(Projection::Column {
                        owner: qualifier.clone(),
                        name: column.to_string(),
                        alias: None,
                    });
                }
            }
        }
    }

    fn derive_avg_projections(&mut self) {
        let averages: Vec<String> = self
            .projections
            .iter()
            .filter_map(|projection| match projection {
                Projection::Aggregation {
                    aggregation_type: AggregationType::Avg,
                    inner_expression,
                    ..
                } => Some(inner_expression.clone()),
                _ => None,
            })
            .collect();
        for inner_expression in averages {
            let n = self.avg_derived_count;
            self.derived.push(Projection::Derived {
                expression: format!("COUNT({})", inner_expression),
                alias: format!("{}_{}", AVG_DERIVED_COUNT, n),
            });
            self.derived.push(Projection::Derived {
                expression: format!("SUM({})", inner_expression),
                alias: format!("{}_{}", AVG_DERIVED_SUM, n),
            });
            self.avg_derived_count += 1;
        }
    }

    /// Written projections, stars expanded.
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    pub fn derived_projections(&self) -> &[Projection] {
        &self.derived
    }

    pub fn expanded_projections(&self) -> impl Iterator<Item = &Projection> {
        self.projections.iter().chain(self.derived.iter())
    }

    pub fn len(&self) -> usize {
        self.projections.len() + self.derived.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_partial_distinct_aggregation(&self) -> bool {
        self.aggregation_count > 1
            && self.aggregation_distinct_count > 0
            && self.aggregation_count != self.aggregation_distinct_count
    }

    /// 1-based position of an ORDER BY / GROUP BY item in the final projection
    /// list, deriving a projection when nothing matches.
    pub fn resolve_item_index(&mut self, item: &OrderByItemSegment, group_by: bool) -> Result<usize> {
        if let OrderByItemKind::Index(index) = item.kind {
            return if index == 0 {
                Err(BindingError::InvalidItemIndex(index).into())
            } else {
                Ok(index)
            };
        }
        if let Some(index) = self.find_item_index(&item.kind) {
            return Ok(index);
        }
        let expression = match &item.kind {
            OrderByItemKind::Column(column) => column.qualified_name(),
            OrderByItemKind::Expression { text, .. } => text.clone(),
            OrderByItemKind::Index(_) => String::new(),
        };
        let alias = if group_by {
            self.group_by_derived_count += 1;
            format!("{}_{}", GROUP_BY_DERIVED, self.group_by_derived_count - 1)
        } else {
            self.order_by_derived_count += 1;
            format!("{}_{}", ORDER_BY_DERIVED, self.order_by_derived_count - 1)
        };
        self.derived.push(Projection::Derived { expression, alias });
        Ok(self.len())
    }

    fn find_item_index(&self, kind: &OrderByItemKind) -> Option<usize> {
        let projections: Vec<&Projection> = self.expanded_projections().collect();
        let position = match kind {
            OrderByItemKind::Column(column) if column.owner.is_none() => {
                let name = column.name();
                projections
                    .iter()
                    .position(|p| p.alias().map_or(false, |alias| alias.eq_ignore_ascii_case(name)))
                    .or_else(|| {
                        projections.iter().position(|p| match p {
                            Projection::Column { name: column_name, .. } => column_name.eq_ignore_ascii_case(name),
                            _ => false,
                        })
                    })
                    .or_else(|| position_of_derived(&projections, name))
            }
            OrderByItemKind::Column(column) => {
                let owner = column.owner_name().unwrap_or_default();
                projections
                    .iter()
                    .position(|p| match p {
                        Projection::Column {
                            owner: projection_owner,
                            name,
                            ..
                        } => {
                            name.eq_ignore_ascii_case(column.name())
                                && projection_owner
                                    .as_deref()
                                    .map_or(true, |projection_owner| projection_owner.eq_ignore_ascii_case(owner))
                        }
                        _ => false,
                    })
                    .or_else(|| position_of_derived(&projections, &column.qualified_name()))
            }
            OrderByItemKind::Expression { text, .. } => {
                let normalized = normalize(text);
                projections.iter().position(|p| {
                    normalize(&p.expression()) == normalized
                        || p.alias().map_or(false, |alias| alias.eq_ignore_ascii_case(text))
                })
            }
            OrderByItemKind::Index(index) => return Some(*index),
        };
        position.map(|position| position + 1)
    }
}

fn position_of_derived(projections: &[&Projection], expression: &str) -> Option<usize> {
    projections.iter().position(|p| match p {
        Projection::Derived { expression: derived, .. } => derived.eq_ignore_ascii_case(expression),
        _ => false,
    })
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// An ORDER BY / GROUP BY item with its resolved projection index.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem<'a> {
    pub segment: &'a OrderByItemSegment,
    /// 1-based position in the final projection list.
    pub index: usize,
}

impl<'a> OrderByItem<'a> {
    pub fn direction(&self) -> OrderDirection {
        self.segment.direction
    }
}

/// `true` iff both sequences are non-empty and pairwise equal on resolved
/// index and direction.
pub fn is_same_items(group_by: &[OrderByItem<'_>], order_by: &[OrderByItem<'_>]) -> bool {
    !group_by.is_empty()
        && group_by.len() == order_by.len()
        && group_by
            .iter()
            .zip(order_by.iter())
            .all(|(g, o)| g.index == o.index && g.direction() == o.direction())
}
