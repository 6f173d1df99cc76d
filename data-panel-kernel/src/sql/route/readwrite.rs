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

use std::sync::Arc;

use log::debug;

use data_panel_common::common::Result;

use crate::rule::ReadwriteSplittingRule;
use crate::sql::analyse::SQLStatementContext;
use crate::sql::route::hint::{IN_TRANSACTION_HINT, WRITE_ROUTE_ONLY_HINT};
use crate::sql::route::{RouteContext, RouteEnv, RouteReplacement, SQLRouteEngine};

/// Swaps a readwrite-splitting group for its primary or one of its replicas.
#[derive(Debug, Clone)]
pub struct ReadwriteSplittingRouteEngine {
    rule: Arc<ReadwriteSplittingRule>,
}

impl ReadwriteSplittingRouteEngine {
    pub fn new(rule: Arc<ReadwriteSplittingRule>) -> Self {
        ReadwriteSplittingRouteEngine { rule }
    }

    fn is_primary_route(&self, route_context: &RouteContext, ctx: &SQLStatementContext<'_>) -> bool {
        ctx.is_write()
            || ctx.is_locking_read()
            || route_context.is_hint_enabled(WRITE_ROUTE_ONLY_HINT)
            || route_context.is_hint_enabled(IN_TRANSACTION_HINT)
    }
}

impl SQLRouteEngine for ReadwriteSplittingRouteEngine {
    fn name(&self) -> &str {
        "readwrite_splitting"
    }

    fn route(&self, route_context: &mut RouteContext, ctx: &SQLStatementContext<'_>, _: &RouteEnv<'_>) -> Result<()> {
        let primary = self.is_primary_route(route_context, ctx);
        let mut replacement = RouteReplacement::default();
        for unit in route_context.units() {
            let group = match self.rule.group(&unit.data_source_mapper().actual_name) {
                Some(group) => group,
                None => continue,
            };
            let data_source = if primary {
                group.write_data_source.clone()
            } else {
                group.read_data_source(route_context.hints())?
            };
            debug!("readwrite splitting group {} routed to {}", group.name, data_source);
            replacement.replace(unit.clone(), unit.with_actual_data_source(&data_source));
        }
        route_context.apply(replacement);
        Ok(())
    }
}
