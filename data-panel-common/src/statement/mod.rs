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

//! Logical statement segments as handed over by the SQL parser.
//!
//! Segments carry inclusive byte spans into the exact SQL text that was
//! parsed; the rewrite stage substitutes text at those spans.

pub mod ddl;
pub mod dml;
pub mod expr;
pub mod order;
pub mod projection;
pub mod segment;
pub mod table;
pub mod value;

use std::fmt;

pub use ddl::*;
pub use dml::*;
pub use expr::*;
pub use order::*;
pub use projection::*;
pub use segment::*;
pub use table::*;
pub use value::*;

#[derive(Debug, Clone, PartialEq)]
pub enum SQLStatement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    CreateTable(CreateTableStatement),
    DropTable(DropTableStatement),
    Truncate(TruncateStatement),
    AnalyzeTable(AnalyzeTableStatement),
    Show(ShowStatement),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    CreateTable,
    DropTable,
    Truncate,
    AnalyzeTable,
    Show,
}

impl StatementKind {
    pub fn is_query(&self) -> bool {
        matches!(self, StatementKind::Select)
    }

    pub fn is_dml(&self) -> bool {
        matches!(
            self,
            StatementKind::Select | StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        )
    }

    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            StatementKind::CreateTable | StatementKind::DropTable | StatementKind::Truncate
        )
    }

    /// DAL statements, they only read catalog information.
    pub fn is_dal(&self) -> bool {
        matches!(self, StatementKind::AnalyzeTable | StatementKind::Show)
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::CreateTable => "CREATE TABLE",
            StatementKind::DropTable => "DROP TABLE",
            StatementKind::Truncate => "TRUNCATE",
            StatementKind::AnalyzeTable => "ANALYZE TABLE",
            StatementKind::Show => "SHOW",
        };
        f.write_str(name)
    }
}

impl SQLStatement {
    pub fn kind(&self) -> StatementKind {
        match self {
            SQLStatement::Select(_) => StatementKind::Select,
            SQLStatement::Insert(_) => StatementKind::Insert,
            SQLStatement::Update(_) => StatementKind::Update,
            SQLStatement::Delete(_) => StatementKind::Delete,
            SQLStatement::CreateTable(_) => StatementKind::CreateTable,
            SQLStatement::DropTable(_) => StatementKind::DropTable,
            SQLStatement::Truncate(_) => StatementKind::Truncate,
            SQLStatement::AnalyzeTable(_) => StatementKind::AnalyzeTable,
            SQLStatement::Show(_) => StatementKind::Show,
        }
    }

    pub fn as_select(&self) -> Option<&SelectStatement> {
        match self {
            SQLStatement::Select(select) => Some(select),
            _ => None,
        }
    }

    pub fn as_insert(&self) -> Option<&InsertStatement> {
        match self {
            SQLStatement::Insert(insert) => Some(insert),
            _ => None,
        }
    }
}
