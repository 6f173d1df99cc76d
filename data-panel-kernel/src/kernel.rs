use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info};

use data_panel_common::common::Result;
use data_panel_common::config::{KernelProps, MeshConfig};
use data_panel_common::statement::{SQLStatement, Value};

use crate::metadata::MetaData;
use crate::rule::{AlgorithmRegistry, RuleSet};
use crate::sql::analyse::{BindOptions, SQLStatementContext};
use crate::sql::rewrite::{RouteSQLRewriteResult, SQLRewriteEngine};
use crate::sql::route::hint::merge_hints;
use crate::sql::route::{RouteContext, RouteEnv, SQLRouter};

/// Everything one statement is processed against. Never changed once built.
#[derive(Debug)]
pub struct KernelSnapshot {
    pub config: MeshConfig,
    pub metadata: MetaData,
    pub rules: RuleSet,
    router: SQLRouter,
    rewriter: SQLRewriteEngine,
}

impl KernelSnapshot {
    fn build(config: MeshConfig, metadata: MetaData, registry: &AlgorithmRegistry) -> Result<Self> {
        let rules = RuleSet::new(config.rules(), registry)?;
        let router = SQLRouter::new(&rules);
        let rewriter = SQLRewriteEngine::new(rules.clone());
        Ok(KernelSnapshot {
            config,
            metadata,
            rules,
            router,
            rewriter,
        })
    }

    pub fn props(&self) -> &KernelProps {
        self.config.props()
    }
}

/// A statement as the parser handed it over.
#[derive(Debug, Clone)]
pub struct QueryContext<'q> {
    pub sql: &'q str,
    pub statement: &'q SQLStatement,
    pub parameters: &'q [Value],
    pub current_database: &'q str,
    pub hints: BTreeMap<String, String>,
}

impl<'q> QueryContext<'q> {
    pub fn new(sql: &'q str, statement: &'q SQLStatement, parameters: &'q [Value], current_database: &'q str) -> Self {
        QueryContext {
            sql,
            statement,
            parameters,
            current_database,
            hints: BTreeMap::new(),
        }
    }

    pub fn with_hint(mut self, key: &str, value: &str) -> Self {
        self.hints.insert(key.to_ascii_uppercase(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionUnit {
    pub data_source: String,
    pub sql: String,
    pub parameters: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionContext {
    pub route_context: RouteContext,
    pub units: Vec<ExecutionUnit>,
}

impl ExecutionContext {
    fn new(route_context: RouteContext, results: Vec<RouteSQLRewriteResult>) -> Self {
        let units = results
            .into_iter()
            .map(|result| ExecutionUnit {
                data_source: result.route_unit.data_source_mapper().actual_name.clone(),
                sql: result.sql,
                parameters: result.parameters,
            })
            .collect();
        ExecutionContext { route_context, units }
    }

    /// Distinct data sources in unit order.
    pub fn data_source_names(&self) -> Vec<&str> {
        let mut result: Vec<&str> = vec![];
        for unit in &self.units {
            if !result.contains(&unit.data_source.as_str()) {
                result.push(&unit.data_source);
            }
        }
        result
    }
}

/// Bind, route and rewrite over the snapshot that is current when a
/// statement starts.
pub struct SQLKernel {
    snapshot: RwLock<Arc<KernelSnapshot>>,
    registry: AlgorithmRegistry,
}

impl SQLKernel {
    pub fn new(config: MeshConfig, metadata: MetaData) -> Result<Self> {
        Self::with_registry(config, metadata, AlgorithmRegistry::default())
    }

    pub fn with_registry(config: MeshConfig, metadata: MetaData, registry: AlgorithmRegistry) -> Result<Self> {
        let snapshot = KernelSnapshot::build(config, metadata, &registry)?;
        Ok(SQLKernel {
            snapshot: RwLock::new(Arc::new(snapshot)),
            registry,
        })
    }

    pub fn current(&self) -> Arc<KernelSnapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Installs a new snapshot; statements already running keep the old one.
    /// Nothing is installed when the rules fail to build.
    pub fn reload(&self, config: MeshConfig, metadata: MetaData) -> Result<()> {
        let snapshot = Arc::new(KernelSnapshot::build(config, metadata, &self.registry)?);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
        info!("kernel snapshot reloaded");
        Ok(())
    }

    pub fn process(&self, query: &QueryContext<'_>) -> Result<ExecutionContext> {
        let snapshot = self.current();
        let props = snapshot.props();
        let options = BindOptions {
            check_table_metadata_enabled: props.check_table_metadata_enabled,
        };
        let ctx = SQLStatementContext::bind_with_options(
            query.statement,
            &snapshot.metadata,
            query.current_database,
            query.parameters,
            options,
        )?;
        let env = RouteEnv::new(&snapshot.metadata, props.default_data_source.as_deref());
        let route_context = snapshot.router.route(&ctx, &env, merge_hints(query.sql, &query.hints))?;
        let results = snapshot
            .rewriter
            .rewrite(query.sql, &ctx, &route_context, &snapshot.metadata)?;
        let execution = ExecutionContext::new(route_context, results);
        if props.sql_show {
            log_sql(query.sql, &execution, props.sql_simple);
        }
        debug!("{} statement produced {} execution unit(s)", ctx.kind(), execution.units.len());
        Ok(execution)
    }
}

fn log_sql(sql: &str, execution: &ExecutionContext, simple: bool) {
    info!("Logic SQL: {}", sql);
    if simple {
        let data_sources = execution.data_source_names();
        info!("Actual SQL(simple): {:?} ::: {}", data_sources, execution.units.len());
        for unit in &execution.units {
            info!("Actual SQL: {} ::: {}", unit.data_source, unit.sql);
        }
        return;
    }
    for unit in &execution.units {
        let parameters = serde_json::to_string(&unit.parameters).unwrap_or_default();
        info!("Actual SQL: {} ::: {} ::: {}", unit.data_source, unit.sql, parameters);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::metadata::{DatabaseMetaData, TableMetaData};
    use data_panel_common::config::RuleConfiguration;
    use std::thread;

    const MESH_RULES: &str = r#"
sharding:
  tables:
    t_order:
      actual_data_nodes: ["rw_${0..1}.t_order_${0..1}"]
      database_strategy: { sharding_column: user_id, algorithm_name: db_mod }
      table_strategy: { sharding_column: order_id, algorithm_name: t_mod }
  algorithms:
    db_mod: { type: MOD, props: { sharding-count: 2 } }
    t_mod: { type: MOD, props: { sharding-count: 2 } }
readwrite_splitting:
  data_sources:
    rw_0: { write_data_source_name: primary_0, read_data_source_names: [replica_0] }
    rw_1: { write_data_source_name: primary_1, read_data_source_names: [replica_1] }
"#;

    fn config(sql_show: bool, rules: &str) -> MeshConfig {
        let props = KernelProps {
            sql_show,
            ..KernelProps::default()
        };
        MeshConfig::new(props, RuleConfiguration::from_yaml_str(rules).unwrap())
    }

    fn metadata() -> MetaData {
        MetaData::default().with_database(
            "logic_db",
            DatabaseMetaData::new(&["rw_0", "rw_1"])
                .with_table("t_order", TableMetaData::new(&["order_id", "user_id", "status"])),
        )
    }

    fn order_query() -> (&'static str, SQLStatement) {
        let sql = "SELECT * FROM t_order WHERE order_id = ? AND user_id = ?";
        let statement = SQLStatement::Select(select(vec![star(sql)], table(sql, "t_order")).with_where(and(
            eq(column(sql, "order_id"), marker(sql, 0)),
            eq(column(sql, "user_id"), marker(sql, 1)),
        )));
        (sql, statement)
    }

    #[test]
    fn test_process_routes_and_rewrites() {
        let _ = env_logger::builder().is_test(true).try_init();
        let kernel = SQLKernel::new(config(true, MESH_RULES), metadata()).unwrap();
        let (sql, statement) = order_query();
        let parameters = [Value::Int(3), Value::Int(4)];
        let execution = kernel
            .process(&QueryContext::new(sql, &statement, &parameters, "logic_db"))
            .unwrap();
        assert_eq!(
            execution.units,
            vec![ExecutionUnit {
                data_source: "replica_0".to_string(),
                sql: "SELECT * FROM t_order_1 WHERE order_id = ? AND user_id = ?".to_string(),
                parameters: parameters.to_vec(),
            }]
        );

        let execution = kernel
            .process(&QueryContext::new(sql, &statement, &parameters, "logic_db").with_hint("write_route_only", "true"))
            .unwrap();
        assert_eq!(execution.units[0].data_source, "primary_0");
    }

    #[test]
    fn test_data_source_names_are_distinct() {
        let kernel = SQLKernel::new(config(true, MESH_RULES), metadata()).unwrap();
        let sql = "SELECT * FROM t_order";
        let statement = SQLStatement::Select(select(vec![star(sql)], table(sql, "t_order")));
        let mut execution = kernel
            .process(&QueryContext::new(sql, &statement, &[], "logic_db").with_hint("write_route_only", "true"))
            .unwrap();
        let first = execution.units[0].clone();
        execution.units.push(first);
        assert_eq!(execution.units.len(), 5);
        assert_eq!(execution.data_source_names(), vec!["primary_0", "primary_1"]);
    }

    #[test]
    fn test_reload_keeps_running_snapshot() {
        let kernel = SQLKernel::new(config(false, MESH_RULES), metadata()).unwrap();
        let running = kernel.current();
        kernel.reload(config(false, "{}"), metadata()).unwrap();
        assert!(running.rules.sharding.is_some());
        assert!(kernel.current().rules.is_empty());

        let bad = "sharding:\n  tables:\n    t_order:\n      actual_data_nodes: [\"ds.t\"]\n      table_strategy: { sharding_column: id, algorithm_name: missing }\n";
        assert!(kernel.reload(config(false, bad), metadata()).is_err());
        assert!(kernel.current().rules.is_empty());
    }

    #[test]
    fn test_concurrent_processing() {
        let kernel = Arc::new(SQLKernel::new(config(false, MESH_RULES), metadata()).unwrap());
        let handles: Vec<_> = (0..4i64)
            .map(|i| {
                let kernel = Arc::clone(&kernel);
                thread::spawn(move || {
                    let (sql, statement) = order_query();
                    let parameters = [Value::Int(i), Value::Int(i)];
                    let execution = kernel
                        .process(&QueryContext::new(sql, &statement, &parameters, "logic_db"))
                        .unwrap();
                    (i, execution.units[0].sql.clone())
                })
            })
            .collect();
        for handle in handles {
            let (i, sql) = handle.join().unwrap();
            assert_eq!(sql, format!("SELECT * FROM t_order_{} WHERE order_id = ? AND user_id = ?", i % 2));
        }
    }

    #[test]
    fn test_unknown_table_fails_with_metadata_check() {
        let props = KernelProps {
            check_table_metadata_enabled: true,
            ..KernelProps::default()
        };
        let kernel = SQLKernel::new(MeshConfig::new(props, RuleConfiguration::default()), metadata()).unwrap();
        let sql = "SELECT * FROM t_missing";
        let statement = SQLStatement::Select(select(vec![star(sql)], table(sql, "t_missing")));
        assert!(kernel.process(&QueryContext::new(sql, &statement, &[], "logic_db")).is_err());
    }
}
