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

use data_panel_common::statement::{CommonTableExpressionSegment, SimpleTableSegment};

use crate::sql::extract::{TableExtractor, TableRef};

/// Tables referenced by a statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TablesContext<'a> {
    tables: Vec<TableRef<'a>>,
    rewrite_tables: Vec<&'a SimpleTableSegment>,
    table_names: Vec<String>,
    database_names: Vec<String>,
    common_table_expressions: Vec<&'a CommonTableExpressionSegment>,
}

impl<'a> TablesContext<'a> {
    pub fn new(extractor: TableExtractor<'a>) -> Self {
        let mut table_names: Vec<String> = vec![];
        let mut database_names: Vec<String> = vec![];
        for table in &extractor.rewrite_tables {
            let name = table.name().to_lowercase();
            if !table_names.contains(&name) {
                table_names.push(name);
            }
            if let Some(owner) = &table.owner {
                let database = owner.name().to_lowercase();
                if !database_names.contains(&database) {
                    database_names.push(database);
                }
            }
        }
        TablesContext {
            tables: extractor.table_context,
            rewrite_tables: extractor.rewrite_tables,
            table_names,
            database_names,
            common_table_expressions: extractor.common_table_expressions,
        }
    }

    /// Table references of the outermost scope in FROM order.
    pub fn tables(&self) -> &[TableRef<'a>] {
        &self.tables
    }

    pub fn simple_tables(&self) -> impl Iterator<Item = &'a SimpleTableSegment> + '_ {
        self.tables.iter().filter_map(|table| table.as_simple())
    }

    /// Simple tables at every nesting level.
    pub fn rewrite_tables(&self) -> &[&'a SimpleTableSegment] {
        &self.rewrite_tables
    }

    /// Distinct logic table names, lower case, in order of appearance.
    pub fn table_names(&self) -> &[String] {
        &self.table_names
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.table_names.iter().any(|table| table.eq_ignore_ascii_case(name))
    }

    /// Database qualifiers written in front of table names.
    pub fn database_names(&self) -> &[String] {
        &self.database_names
    }

    pub fn common_table_expressions(&self) -> &[&'a CommonTableExpressionSegment] {
        &self.common_table_expressions
    }

    /// Simple table a column owner refers to, by alias first and table name second.
    pub fn find_table_by_qualifier(&self, qualifier: &str) -> Option<&'a SimpleTableSegment> {
        let by_alias = self
            .rewrite_tables
            .iter()
            .find(|table| table.alias_name().map_or(false, |alias| alias.eq_ignore_ascii_case(qualifier)));
        by_alias
            .or_else(|| self.rewrite_tables.iter().find(|table| table.name().eq_ignore_ascii_case(qualifier)))
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.rewrite_tables.is_empty()
    }
}
