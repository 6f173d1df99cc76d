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

use crate::statement::segment::{ColumnSegment, Span};
use crate::statement::table::SimpleTableSegment;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinitionSegment {
    pub span: Span,
    pub column_name: ColumnSegment,
    pub data_type: String,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    pub table: SimpleTableSegment,
    pub if_not_exists: bool,
    pub column_definitions: Vec<ColumnDefinitionSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStatement {
    pub tables: Vec<SimpleTableSegment>,
    pub if_exists: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TruncateStatement {
    pub tables: Vec<SimpleTableSegment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeTableStatement {
    pub tables: Vec<SimpleTableSegment>,
}

/// `SHOW ...`, `table` is set for forms such as `SHOW COLUMNS FROM t_order`.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowStatement {
    pub span: Span,
    pub table: Option<SimpleTableSegment>,
}
