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

use log::debug;

use data_panel_common::common::{Result, RoutingError};

use crate::sql::analyse::SQLStatementContext;
use crate::sql::route::{RouteContext, RouteEnv, RouteMapper, RouteReplacement, RouteUnit, SQLRouteEngine};

/// Routes the tables no earlier engine claimed to the one data source they
/// live in, without renaming anything.
#[derive(Debug, Clone, Default)]
pub struct SingleRouteEngine;

impl SingleRouteEngine {
    /// Table metadata first, then the configured default, then the only data
    /// source of the database, then the logic database itself.
    fn data_source_of(&self, table: Option<&str>, ctx: &SQLStatementContext<'_>, env: &RouteEnv<'_>) -> String {
        let database = env.metadata.database(ctx.current_database());
        if let Some(table) = table {
            let configured = database
                .and_then(|database| database.table(table))
                .and_then(|table| table.data_source.as_deref());
            if let Some(data_source) = configured {
                return data_source.to_string();
            }
        }
        if let Some(data_source) = env.default_data_source {
            return data_source.to_string();
        }
        match database.map(|database| database.data_sources.as_slice()) {
            Some([only]) => only.clone(),
            _ => ctx.current_database().to_string(),
        }
    }
}

impl SQLRouteEngine for SingleRouteEngine {
    fn name(&self) -> &str {
        "single"
    }

    fn route(&self, route_context: &mut RouteContext, ctx: &SQLStatementContext<'_>, env: &RouteEnv<'_>) -> Result<()> {
        let routed = route_context.logic_table_names();
        let tables: Vec<&String> = ctx
            .tables()
            .table_names()
            .iter()
            .filter(|table| !routed.iter().any(|each| each.eq_ignore_ascii_case(table)))
            .collect();

        if tables.is_empty() {
            if route_context.is_empty() {
                let data_source = self.data_source_of(None, ctx, env);
                route_context.add_unit(RouteUnit::new(RouteMapper::identity(&data_source), vec![])?);
            }
            return Ok(());
        }

        let mut data_sources: Vec<String> = vec![];
        for table in &tables {
            let data_source = self.data_source_of(Some(table), ctx, env);
            if !data_sources.contains(&data_source) {
                data_sources.push(data_source);
            }
        }
        if data_sources.len() > 1 {
            return Err(RoutingError::CrossDataSource {
                tables: tables.iter().map(|table| table.to_string()).collect(),
                data_sources,
            }
            .into());
        }
        let data_source = &data_sources[0];
        let mappers: Vec<RouteMapper> = tables.iter().map(|table| RouteMapper::identity(table)).collect();
        debug!("single tables {:?} on data source {}", tables, data_source);

        if route_context.is_empty() {
            route_context.add_unit(RouteUnit::new(RouteMapper::identity(data_source), mappers)?);
            return Ok(());
        }

        // Joined with routed tables: every unit has to sit on that data source.
        let mut replacement = RouteReplacement::default();
        for unit in route_context.units() {
            if !unit.data_source_mapper().actual_name.eq_ignore_ascii_case(data_source) {
                let mut all_tables: Vec<String> = unit.logic_table_names().map(str::to_string).collect();
                all_tables.extend(tables.iter().map(|table| table.to_string()));
                return Err(RoutingError::CrossDataSource {
                    tables: all_tables,
                    data_sources: vec![unit.data_source_mapper().actual_name.clone(), data_source.clone()],
                }
                .into());
            }
            let mut extended = unit.table_mappers().to_vec();
            extended.extend(mappers.iter().cloned());
            replacement.replace(unit.clone(), RouteUnit::new(unit.data_source_mapper().clone(), extended)?);
        }
        route_context.apply(replacement);
        Ok(())
    }
}
