//! Catalog snapshot the binder resolves tables and columns against.
//!
//! Names are looked up case-insensitively, the maps keep the spelling they
//! were configured with.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use data_panel_common::common::{ConfigError, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct MetaData {
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseMetaData>,
}

impl MetaData {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let metadata = serde_yaml::from_str(yaml).map_err(ConfigError::from)?;
        Ok(metadata)
    }

    pub fn with_database(mut self, name: &str, database: DatabaseMetaData) -> Self {
        self.databases.insert(name.to_string(), database);
        self
    }

    pub fn database(&self, name: &str) -> Option<&DatabaseMetaData> {
        find_ignore_case(&self.databases, name)
    }

    pub fn contains_database(&self, name: &str) -> bool {
        self.database(name).is_some()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatabaseMetaData {
    #[serde(default)]
    pub data_sources: Vec<String>,
    #[serde(default = "DatabaseMetaData::default_schema_name")]
    pub default_schema: String,
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaMetaData>,
}

impl DatabaseMetaData {
    fn default_schema_name() -> String {
        "public".to_string()
    }

    pub fn new(data_sources: &[&str]) -> Self {
        DatabaseMetaData {
            data_sources: data_sources.iter().map(|ds| ds.to_string()).collect(),
            default_schema: Self::default_schema_name(),
            schemas: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, name: &str, table: TableMetaData) -> Self {
        let schema = self.default_schema.clone();
        self.schemas
            .entry(schema)
            .or_insert_with(SchemaMetaData::default)
            .tables
            .insert(name.to_string(), table);
        self
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaMetaData> {
        find_ignore_case(&self.schemas, name)
    }

    /// Table of the default schema.
    pub fn table(&self, name: &str) -> Option<&TableMetaData> {
        self.schema(&self.default_schema)?.table(name)
    }

    pub fn contains_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }
}

impl Default for DatabaseMetaData {
    fn default() -> Self {
        DatabaseMetaData::new(&[])
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct SchemaMetaData {
    #[serde(default)]
    pub tables: BTreeMap<String, TableMetaData>,
}

impl SchemaMetaData {
    pub fn table(&self, name: &str) -> Option<&TableMetaData> {
        find_ignore_case(&self.tables, name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct TableMetaData {
    /// In declaration order, star expansion follows it.
    #[serde(default)]
    pub columns: Vec<ColumnMetaData>,
    #[serde(default)]
    pub indexes: Vec<String>,
    /// Data source the table physically lives in when it is not sharded.
    #[serde(default)]
    pub data_source: Option<String>,
}

impl TableMetaData {
    pub fn new(columns: &[&str]) -> Self {
        TableMetaData {
            columns: columns.iter().map(|name| ColumnMetaData::new(name)).collect(),
            indexes: vec![],
            data_source: None,
        }
    }

    pub fn with_data_source(mut self, data_source: &str) -> Self {
        self.data_source = Some(data_source.to_string());
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMetaData> {
        self.columns.iter().find(|column| column.name.eq_ignore_ascii_case(name))
    }

    pub fn contains_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ColumnMetaData {
    pub name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnMetaData {
    pub fn new(name: &str) -> Self {
        ColumnMetaData {
            name: name.to_string(),
            data_type: String::new(),
            primary_key: false,
        }
    }
}

fn find_ignore_case<'a, T>(map: &'a BTreeMap<String, T>, name: &str) -> Option<&'a T> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}
