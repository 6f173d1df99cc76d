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

use std::collections::BTreeMap;
use std::fmt;

use data_panel_common::common::{Result, RoutingError};

use crate::rule::DataNode;

/// Logic name and the actual name it was routed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteMapper {
    pub logic_name: String,
    pub actual_name: String,
}

impl RouteMapper {
    pub fn new(logic_name: &str, actual_name: &str) -> Self {
        RouteMapper {
            logic_name: logic_name.to_string(),
            actual_name: actual_name.to_string(),
        }
    }

    /// Logic name routed to itself.
    pub fn identity(name: &str) -> Self {
        RouteMapper::new(name, name)
    }
}

impl fmt::Display for RouteMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.logic_name, self.actual_name)
    }
}

/// One data source and the actual tables of one physical statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteUnit {
    data_source_mapper: RouteMapper,
    table_mappers: Vec<RouteMapper>,
}

impl RouteUnit {
    /// Fails when one logic table is mapped to two actual tables.
    pub fn new(data_source_mapper: RouteMapper, table_mappers: Vec<RouteMapper>) -> Result<Self> {
        let mut distinct: Vec<RouteMapper> = Vec::with_capacity(table_mappers.len());
        for mapper in table_mappers {
            match distinct
                .iter()
                .find(|each| each.logic_name.eq_ignore_ascii_case(&mapper.logic_name))
            {
                Some(existing) if existing.actual_name == mapper.actual_name => {}
                Some(existing) => {
                    return Err(RoutingError::AmbiguousTableMapping {
                        logic_table: mapper.logic_name.clone(),
                        first: existing.actual_name.clone(),
                        second: mapper.actual_name,
                    }
                    .into())
                }
                None => distinct.push(mapper),
            }
        }
        Ok(RouteUnit {
            data_source_mapper,
            table_mappers: distinct,
        })
    }

    pub fn data_source_mapper(&self) -> &RouteMapper {
        &self.data_source_mapper
    }

    pub fn table_mappers(&self) -> &[RouteMapper] {
        &self.table_mappers
    }

    pub fn find_table_mapper(&self, logic_table: &str) -> Option<&RouteMapper> {
        self.table_mappers
            .iter()
            .find(|mapper| mapper.logic_name.eq_ignore_ascii_case(logic_table))
    }

    pub fn actual_table_name(&self, logic_table: &str) -> Option<&str> {
        self.find_table_mapper(logic_table).map(|mapper| mapper.actual_name.as_str())
    }

    pub fn logic_table_names(&self) -> impl Iterator<Item = &str> {
        self.table_mappers.iter().map(|mapper| mapper.logic_name.as_str())
    }

    /// Same unit on another actual data source, logic names untouched.
    pub fn with_actual_data_source(&self, actual_name: &str) -> RouteUnit {
        RouteUnit {
            data_source_mapper: RouteMapper::new(&self.data_source_mapper.logic_name, actual_name),
            table_mappers: self.table_mappers.clone(),
        }
    }
}

impl fmt::Display for RouteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [", self.data_source_mapper)?;
        for (i, mapper) in self.table_mappers.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", mapper)?;
        }
        f.write_str("]")
    }
}

/// Units an engine takes out of the route context and the units replacing them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteReplacement {
    pub removed: Vec<RouteUnit>,
    pub added: Vec<RouteUnit>,
}

impl RouteReplacement {
    pub fn replace(&mut self, removed: RouteUnit, added: RouteUnit) {
        self.removed.push(removed);
        self.added.push(added);
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Routing decision for one statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteContext {
    units: Vec<RouteUnit>,
    /// Data nodes of every insert row, in row order.
    original_data_nodes: Vec<Vec<DataNode>>,
    hints: BTreeMap<String, String>,
}

impl RouteContext {
    pub fn new(hints: BTreeMap<String, String>) -> Self {
        RouteContext {
            units: vec![],
            original_data_nodes: vec![],
            hints,
        }
    }

    pub fn units(&self) -> &[RouteUnit] {
        &self.units
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn add_unit(&mut self, unit: RouteUnit) {
        if !self.units.contains(&unit) {
            self.units.push(unit);
        }
    }

    /// Removes the replaced units and puts the added ones where the first
    /// removed unit stood, or at the end when nothing is removed.
    pub fn apply(&mut self, replacement: RouteReplacement) {
        if replacement.is_empty() {
            return;
        }
        let position = self
            .units
            .iter()
            .position(|unit| replacement.removed.contains(unit))
            .unwrap_or_else(|| self.units.len());
        let mut kept = Vec::with_capacity(self.units.len());
        let mut insert_at = 0;
        for (i, unit) in self.units.drain(..).enumerate() {
            if replacement.removed.contains(&unit) {
                continue;
            }
            if i < position {
                insert_at += 1;
            }
            kept.push(unit);
        }
        let mut added = vec![];
        for unit in replacement.added {
            if !kept.contains(&unit) && !added.contains(&unit) {
                added.push(unit);
            }
        }
        kept.splice(insert_at..insert_at, added);
        self.units = kept;
    }

    pub fn original_data_nodes(&self) -> &[Vec<DataNode>] {
        &self.original_data_nodes
    }

    pub fn set_original_data_nodes(&mut self, original_data_nodes: Vec<Vec<DataNode>>) {
        self.original_data_nodes = original_data_nodes;
    }

    pub fn hints(&self) -> &BTreeMap<String, String> {
        &self.hints
    }

    pub fn hint(&self, key: &str) -> Option<&str> {
        self.hints.get(key).map(|value| value.as_str())
    }

    pub fn is_hint_enabled(&self, key: &str) -> bool {
        self.hint(key).map_or(false, |value| value.trim().eq_ignore_ascii_case("true"))
    }

    /// Distinct actual data sources in unit order.
    pub fn actual_data_source_names(&self) -> Vec<&str> {
        let mut result: Vec<&str> = vec![];
        for unit in &self.units {
            let name = unit.data_source_mapper.actual_name.as_str();
            if !result.contains(&name) {
                result.push(name);
            }
        }
        result
    }

    /// Every logic table of the units, in first appearance order.
    pub fn logic_table_names(&self) -> Vec<&str> {
        let mut result: Vec<&str> = vec![];
        for name in self.units.iter().flat_map(|unit| unit.logic_table_names()) {
            if !result.iter().any(|each| each.eq_ignore_ascii_case(name)) {
                result.push(name);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(data_source: &str, tables: &[(&str, &str)]) -> RouteUnit {
        RouteUnit::new(
            RouteMapper::identity(data_source),
            tables.iter().map(|(logic, actual)| RouteMapper::new(logic, actual)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_ambiguous_table_mapping() {
        let err = RouteUnit::new(
            RouteMapper::identity("ds_0"),
            vec![RouteMapper::new("t_order", "t_order_0"), RouteMapper::new("T_ORDER", "t_order_1")],
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "logic table `T_ORDER` is mapped to both `t_order_0` and `t_order_1` in one route unit"
        );
        let deduped = unit("ds_0", &[("t_order", "t_order_0"), ("t_order", "t_order_0")]);
        assert_eq!(deduped.table_mappers().len(), 1);
    }

    #[test]
    fn test_apply_replacement_keeps_position() {
        let mut ctx = RouteContext::default();
        ctx.add_unit(unit("ds_0", &[("t_order", "t_order_0")]));
        ctx.add_unit(unit("ds_1", &[("t_order", "t_order_0")]));
        ctx.add_unit(unit("ds_2", &[("t_order", "t_order_0")]));
        let old = ctx.units()[1].clone();
        let mut replacement = RouteReplacement::default();
        replacement.replace(old.clone(), old.with_actual_data_source("ds_1_shadow"));
        ctx.apply(replacement);
        assert_eq!(ctx.actual_data_source_names(), vec!["ds_0", "ds_1_shadow", "ds_2"]);
        assert_eq!(ctx.units()[1].data_source_mapper().logic_name, "ds_1");
        assert_eq!(ctx.units()[1].actual_table_name("T_ORDER"), Some("t_order_0"));
    }

    #[test]
    fn test_apply_replacement_merges_duplicates() {
        let mut ctx = RouteContext::default();
        ctx.add_unit(unit("ds_0", &[("t_order", "t_order")]));
        ctx.add_unit(unit("ds_0", &[("t_order", "t_order")]));
        assert_eq!(ctx.units().len(), 1);
        let mut replacement = RouteReplacement::default();
        replacement.added.push(unit("ds_1", &[("t_order", "t_order")]));
        ctx.apply(replacement);
        assert_eq!(ctx.actual_data_source_names(), vec!["ds_0", "ds_1"]);
        assert_eq!(format!("{}", ctx.units()[1]), "ds_1->ds_1 [t_order->t_order]");
    }
}
