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

//! Routing of a bound statement to route units.
//!
//! Engines run in a fixed order over one [`RouteContext`]; each one reads the
//! units the previous engines left and replaces some of them.

pub mod condition;
pub mod context;
pub mod hint;
pub mod readwrite;
pub mod shadow;
pub mod sharding;
pub mod single;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, trace};

use data_panel_common::common::{Result, RoutingError};

use crate::metadata::MetaData;
use crate::rule::RuleSet;
use crate::sql::analyse::SQLStatementContext;

pub use context::{RouteContext, RouteMapper, RouteReplacement, RouteUnit};
pub use readwrite::ReadwriteSplittingRouteEngine;
pub use shadow::ShadowRouteEngine;
pub use sharding::ShardingRouteEngine;
pub use single::SingleRouteEngine;

/// What an engine may look at besides the statement.
#[derive(Debug, Clone, Copy)]
pub struct RouteEnv<'e> {
    pub metadata: &'e MetaData,
    pub default_data_source: Option<&'e str>,
}

impl<'e> RouteEnv<'e> {
    pub fn new(metadata: &'e MetaData, default_data_source: Option<&'e str>) -> Self {
        RouteEnv {
            metadata,
            default_data_source,
        }
    }
}

pub trait SQLRouteEngine: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn route(&self, route_context: &mut RouteContext, ctx: &SQLStatementContext<'_>, env: &RouteEnv<'_>) -> Result<()>;
}

/// Encrypt has nothing to decide at route time, columns are rewritten later.
#[derive(Debug, Clone, Default)]
pub struct EncryptRouteEngine;

impl SQLRouteEngine for EncryptRouteEngine {
    fn name(&self) -> &str {
        "encrypt"
    }

    fn route(&self, _: &mut RouteContext, _: &SQLStatementContext<'_>, _: &RouteEnv<'_>) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SQLRouter {
    engines: Vec<Arc<dyn SQLRouteEngine>>,
}

impl SQLRouter {
    /// Engines of the configured rules in the order
    /// sharding, single, encrypt, readwrite-splitting, shadow.
    pub fn new(rules: &RuleSet) -> Self {
        let mut engines: Vec<Arc<dyn SQLRouteEngine>> = vec![];
        if let Some(sharding) = &rules.sharding {
            engines.push(Arc::new(ShardingRouteEngine::new(sharding.clone())));
        }
        engines.push(Arc::new(SingleRouteEngine::default()));
        if rules.encrypt.is_some() {
            engines.push(Arc::new(EncryptRouteEngine));
        }
        if let Some(readwrite) = &rules.readwrite_splitting {
            engines.push(Arc::new(ReadwriteSplittingRouteEngine::new(readwrite.clone())));
        }
        if let Some(shadow) = &rules.shadow {
            engines.push(Arc::new(ShadowRouteEngine::new(shadow.clone())));
        }
        SQLRouter { engines }
    }

    pub fn with_engines(engines: Vec<Arc<dyn SQLRouteEngine>>) -> Self {
        SQLRouter { engines }
    }

    pub fn engine_names(&self) -> Vec<&str> {
        self.engines.iter().map(|engine| engine.name()).collect()
    }

    pub fn route(
        &self,
        ctx: &SQLStatementContext<'_>,
        env: &RouteEnv<'_>,
        hints: BTreeMap<String, String>,
    ) -> Result<RouteContext> {
        let mut route_context = RouteContext::new(hints);
        for engine in &self.engines {
            engine.route(&mut route_context, ctx, env)?;
            trace!("after {} route: {:?}", engine.name(), route_context.units());
        }
        check_logic_tables(&route_context, ctx)?;
        debug!(
            "routed {} statement to {} unit(s): {}",
            ctx.kind(),
            route_context.units().len(),
            route_context
                .units()
                .iter()
                .map(|unit| unit.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        );
        Ok(route_context)
    }
}

/// Every logic table of a unit must be a table of the statement.
fn check_logic_tables(route_context: &RouteContext, ctx: &SQLStatementContext<'_>) -> Result<()> {
    let table_names = ctx.tables().table_names();
    for name in route_context.logic_table_names() {
        if !table_names.iter().any(|table| table.eq_ignore_ascii_case(name)) {
            return Err(RoutingError::UnknownLogicTable(name.to_string()).into());
        }
    }
    Ok(())
}
