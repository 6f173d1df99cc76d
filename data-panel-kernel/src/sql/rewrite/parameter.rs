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

use std::collections::{BTreeMap, BTreeSet};

use data_panel_common::statement::Value;

use crate::sql::analyse::InsertContext;

/// Parameter list of one route unit.
#[derive(Debug)]
pub struct ParameterBuilder<'p> {
    parameters: &'p [Value],
    replacements: &'p BTreeMap<usize, Value>,
    dropped: BTreeSet<usize>,
}

impl<'p> ParameterBuilder<'p> {
    pub fn new(parameters: &'p [Value], replacements: &'p BTreeMap<usize, Value>) -> Self {
        ParameterBuilder {
            parameters,
            replacements,
            dropped: BTreeSet::new(),
        }
    }

    /// Drops the parameters of every insert row not in `routed_rows`.
    pub fn with_insert_rows(mut self, insert: Option<&InsertContext<'_>>, routed_rows: Option<&[usize]>) -> Self {
        if let (Some(insert), Some(routed_rows)) = (insert, routed_rows) {
            for (index, row) in insert.rows.iter().enumerate() {
                if !routed_rows.contains(&index) {
                    self.dropped.extend(row.parameter_indexes.iter().copied());
                }
            }
        }
        self
    }

    /// The unit's parameters, and for each original index its position in
    /// them (`None` when dropped).
    pub fn build(&self) -> (Vec<Value>, Vec<Option<usize>>) {
        let mut values = Vec::with_capacity(self.parameters.len());
        let mut indexes = Vec::with_capacity(self.parameters.len());
        for (index, value) in self.parameters.iter().enumerate() {
            if self.dropped.contains(&index) {
                indexes.push(None);
                continue;
            }
            indexes.push(Some(values.len()));
            values.push(self.replacements.get(&index).unwrap_or(value).clone());
        }
        (values, indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::metadata::MetaData;
    use crate::sql::analyse::SQLStatementContext;
    use data_panel_common::statement::SQLStatement;

    #[test]
    fn test_replacements_keep_positions() {
        let parameters = vec![Value::Int(1), Value::text("plain"), Value::Int(3)];
        let mut replacements = BTreeMap::new();
        replacements.insert(1, Value::text("cipher"));
        let (values, indexes) = ParameterBuilder::new(&parameters, &replacements).build();
        assert_eq!(values, vec![Value::Int(1), Value::text("cipher"), Value::Int(3)]);
        assert_eq!(indexes, vec![Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_unrouted_insert_rows_are_dropped() {
        let sql = "INSERT INTO t_order (order_id, user_id) VALUES (?, ?), (?, ?), (?, ?)";
        let statement = SQLStatement::Insert(insert(
            table(sql, "t_order"),
            sql,
            &["order_id", "user_id"],
            vec![
                values_row_at(sql, "(?, ?)", 0, vec![marker(sql, 0), marker(sql, 1)]),
                values_row_at(sql, "(?, ?)", 1, vec![marker(sql, 2), marker(sql, 3)]),
                values_row_at(sql, "(?, ?)", 2, vec![marker(sql, 4), marker(sql, 5)]),
            ],
        ));
        let parameters: Vec<Value> = (0..6).map(Value::Int).collect();
        let metadata = MetaData::default();
        let ctx = SQLStatementContext::bind(&statement, &metadata, "logic_db", &parameters).unwrap();
        let replacements = BTreeMap::new();
        let (values, indexes) = ParameterBuilder::new(&parameters, &replacements)
            .with_insert_rows(ctx.insert_context(), Some(&[0, 2]))
            .build();
        assert_eq!(values, vec![Value::Int(0), Value::Int(1), Value::Int(4), Value::Int(5)]);
        assert_eq!(indexes, vec![Some(0), Some(1), None, None, Some(2), Some(3)]);
    }
}
