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

use data_panel_common::statement::{
    CollectionTableSegment, CommonTableExpressionSegment, DeleteStatement, ExpressionSegment, InsertStatement,
    ProjectionSegment, SQLStatement, SelectStatement, SetAssignmentSegment, SimpleTableSegment, SubqueryTableSegment,
    TableSegment, UpdateStatement,
};

use crate::sql::extract::expression::extract_subqueries;

/// A table reference visible to the columns of one select scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TableRef<'a> {
    Simple(&'a SimpleTableSegment),
    Subquery(&'a SubqueryTableSegment),
    Collection(&'a CollectionTableSegment),
    /// A FROM entry naming a common table expression of the WITH clause.
    CommonTableExpression {
        table: &'a SimpleTableSegment,
        definition: &'a CommonTableExpressionSegment,
    },
}

impl<'a> TableRef<'a> {
    /// Name columns use to qualify themselves with: alias first, then table name.
    pub fn qualifier(&self) -> Option<&'a str> {
        match *self {
            TableRef::Simple(t) => Some(t.alias_name().unwrap_or_else(|| t.name())),
            TableRef::Subquery(t) => t.alias.as_ref().map(|alias| alias.name()),
            TableRef::Collection(t) => t.alias.as_ref().map(|alias| alias.name()),
            TableRef::CommonTableExpression { table, .. } => Some(table.alias_name().unwrap_or_else(|| table.name())),
        }
    }

    pub fn as_simple(&self) -> Option<&'a SimpleTableSegment> {
        match *self {
            TableRef::Simple(t) => Some(t),
            _ => None,
        }
    }
}

/// Collects the tables of a statement.
///
/// `rewrite_tables` holds every simple table at any nesting level (the ones
/// whose names are substituted per route unit), `table_context` the tables of
/// the outermost scope in FROM order.
#[derive(Debug, Default)]
pub struct TableExtractor<'a> {
    pub rewrite_tables: Vec<&'a SimpleTableSegment>,
    pub table_context: Vec<TableRef<'a>>,
    pub common_table_expressions: Vec<&'a CommonTableExpressionSegment>,
}

impl<'a> TableExtractor<'a> {
    pub fn new() -> Self {
        TableExtractor::default()
    }

    pub fn extract(statement: &'a SQLStatement) -> Self {
        let mut extractor = TableExtractor::new();
        match statement {
            SQLStatement::Select(select) => extractor.extract_from_select(select),
            SQLStatement::Insert(insert) => extractor.extract_from_insert(insert),
            SQLStatement::Update(update) => extractor.extract_from_update(update),
            SQLStatement::Delete(delete) => extractor.extract_from_delete(delete),
            SQLStatement::CreateTable(create) => extractor.add_simple_table(&create.table, true),
            SQLStatement::DropTable(drop) => drop.tables.iter().for_each(|t| extractor.add_simple_table(t, true)),
            SQLStatement::Truncate(truncate) => truncate.tables.iter().for_each(|t| extractor.add_simple_table(t, true)),
            SQLStatement::AnalyzeTable(analyze) => analyze.tables.iter().for_each(|t| extractor.add_simple_table(t, true)),
            SQLStatement::Show(show) => {
                if let Some(table) = &show.table {
                    extractor.add_simple_table(table, true);
                }
            }
        }
        extractor
    }

    pub fn extract_from_select(&mut self, select: &'a SelectStatement) {
        self.extract_select(select, true);
    }

    fn extract_select(&mut self, select: &'a SelectStatement, own_level: bool) {
        if let Some(with) = &select.with {
            for cte in &with.common_table_expressions {
                self.common_table_expressions.push(cte);
                self.extract_select(&cte.subquery.select, false);
            }
        }
        if let Some(from) = &select.from {
            self.extract_from_table(from, own_level);
        }
        for projection in &select.projections.projections {
            match projection {
                ProjectionSegment::Subquery(p) => self.extract_select(&p.subquery.select, false),
                ProjectionSegment::Expression(p) => self.extract_from_expression(&p.expr),
                ProjectionSegment::Aggregation(p) => p.parameters.iter().for_each(|e| self.extract_from_expression(e)),
                _ => {}
            }
        }
        if let Some(where_segment) = &select.where_segment {
            self.extract_from_expression(&where_segment.expr);
        }
        if let Some(having) = &select.having {
            self.extract_from_expression(&having.expr);
        }
        if let Some(combine) = &select.combine {
            self.extract_select(&combine.left.select, false);
            self.extract_select(&combine.right.select, false);
        }
    }

    fn extract_from_table(&mut self, table: &'a TableSegment, own_level: bool) {
        match table {
            TableSegment::Simple(simple) => self.add_simple_table(simple, own_level),
            TableSegment::Join(join) => {
                self.extract_from_table(&join.left, own_level);
                self.extract_from_table(&join.right, own_level);
                if let Some(condition) = &join.condition {
                    self.extract_from_expression(condition);
                }
            }
            TableSegment::Subquery(subquery) => {
                if own_level {
                    self.table_context.push(TableRef::Subquery(subquery));
                }
                self.extract_select(&subquery.subquery.select, false);
            }
            TableSegment::Collection(collection) => {
                if own_level {
                    self.table_context.push(TableRef::Collection(collection));
                }
                self.extract_from_expression(&collection.expression);
            }
        }
    }

    fn extract_from_expression(&mut self, expression: &'a ExpressionSegment) {
        for subquery in extract_subqueries(expression) {
            self.extract_select(&subquery.select, false);
        }
    }

    fn extract_from_assignments(&mut self, assignments: &'a SetAssignmentSegment) {
        for assignment in &assignments.assignments {
            self.extract_from_expression(&assignment.value);
        }
    }

    fn add_simple_table(&mut self, table: &'a SimpleTableSegment, own_level: bool) {
        let cte = if table.owner.is_none() {
            self.find_common_table_expression(table.name())
        } else {
            None
        };
        match cte {
            Some(definition) => {
                if own_level {
                    self.table_context
                        .push(TableRef::CommonTableExpression { table, definition });
                }
            }
            None => {
                self.rewrite_tables.push(table);
                if own_level {
                    self.table_context.push(TableRef::Simple(table));
                }
            }
        }
    }

    fn find_common_table_expression(&self, name: &str) -> Option<&'a CommonTableExpressionSegment> {
        self.common_table_expressions
            .iter()
            .copied()
            .find(|cte| cte.alias.identifier.matches(name))
    }

    pub fn extract_from_insert(&mut self, insert: &'a InsertStatement) {
        self.add_simple_table(&insert.table, true);
        if let Some(insert_select) = &insert.insert_select {
            self.extract_select(&insert_select.select, false);
        }
        if let Some(assignments) = &insert.set_assignment {
            self.extract_from_assignments(assignments);
        }
        for row in &insert.values {
            row.values.iter().for_each(|value| self.extract_from_expression(value));
        }
    }

    pub fn extract_from_update(&mut self, update: &'a UpdateStatement) {
        self.extract_from_table(&update.table, true);
        self.extract_from_assignments(&update.set_assignment);
        if let Some(where_segment) = &update.where_segment {
            self.extract_from_expression(&where_segment.expr);
        }
    }

    pub fn extract_from_delete(&mut self, delete: &'a DeleteStatement) {
        self.extract_from_table(&delete.table, true);
        if let Some(where_segment) = &delete.where_segment {
            self.extract_from_expression(&where_segment.expr);
        }
    }
}

/// Own-scope table references of a select, CTE names resolved against `ctes`.
pub fn extract_scope_tables<'a>(select: &'a SelectStatement, ctes: &[&'a CommonTableExpressionSegment]) -> Vec<TableRef<'a>> {
    let mut extractor = TableExtractor {
        common_table_expressions: ctes.to_vec(),
        ..TableExtractor::default()
    };
    if let Some(from) = &select.from {
        extractor.extract_from_table(from, true);
    }
    extractor.table_context
}
