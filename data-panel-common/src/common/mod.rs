use thiserror::Error as ThisError;

/// Kernel Error
#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Binding(#[from] BindingError),
    #[error(transparent)]
    Routing(#[from] RoutingError),
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    General(String),
}

/// Kernel Result type
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::fmt::Error> for Error {
    fn from(e: std::fmt::Error) -> Self {
        Error::General(e.to_string())
    }
}

impl Error {
    pub fn is_binding(&self) -> bool {
        matches!(self, Error::Binding(_))
    }

    pub fn is_routing(&self) -> bool {
        matches!(self, Error::Routing(_))
    }

    pub fn is_rewrite(&self) -> bool {
        matches!(self, Error::Rewrite(_))
    }
}

/// Identifiers of a statement that could not be resolved against metadata.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum BindingError {
    #[error("table `{table}` does not exist in database `{database}`")]
    TableNotFound { database: String, table: String },
    #[error("unknown database `{0}`")]
    DatabaseNotFound(String),
    #[error("column `{column}` does not exist in table `{table}`")]
    ColumnNotFound { table: String, column: String },
    #[error("column `{column}` is ambiguous, it exists in tables {tables:?}")]
    AmbiguousColumn { column: String, tables: Vec<String> },
    #[error("unknown owner `{owner}` of column `{column}`")]
    UnknownOwner { owner: String, column: String },
    #[error("order by / group by index must start from 1, got {0}")]
    InvalidItemIndex(usize),
}

/// Failures to produce an unambiguous route for a statement.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum RoutingError {
    #[error("logic table `{logic_table}` is mapped to both `{first}` and `{second}` in one route unit")]
    AmbiguousTableMapping {
        logic_table: String,
        first: String,
        second: String,
    },
    #[error("no data source can be resolved for table `{0}`")]
    NoDataSource(String),
    #[error("tables {tables:?} are spread over different data sources {data_sources:?}")]
    CrossDataSource {
        tables: Vec<String>,
        data_sources: Vec<String>,
    },
    #[error("route unit references logic table `{0}` which the statement does not use")]
    UnknownLogicTable(String),
    #[error("tables {0:?} have no data source in common")]
    CartesianUnavailable(Vec<String>),
    #[error("insert into `{table}` routes one row to {count} data nodes")]
    InsertMultipleDataNodes { table: String, count: usize },
    #[error("sharding value for `{table}` routes to no data node")]
    NoDataNode { table: String },
    #[error("sharding algorithm `{algorithm}` failed: {message}")]
    Algorithm { algorithm: String, message: String },
    #[error("parameter index {index} is out of range, {count} parameters are bound")]
    ParameterIndexOutOfRange { index: usize, count: usize },
}

/// Internal defects found while assembling rewritten SQL.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum RewriteError {
    #[error("token [{first_start}, {first_stop}] overlaps token [{second_start}, {second_stop}]")]
    OverlappingTokens {
        first_start: usize,
        first_stop: usize,
        second_start: usize,
        second_stop: usize,
    },
    #[error("value token [{start}, {stop}] has neither a literal nor a parameter marker")]
    UnresolvableToken { start: usize, stop: usize },
    #[error("token [{start}, {stop}] is outside of sql text of length {length}")]
    TokenOutOfRange {
        start: usize,
        stop: usize,
        length: usize,
    },
    #[error("parameter index {index} is out of range, {count} parameters are bound")]
    ParameterIndexOutOfRange { index: usize, count: usize },
    #[error("condition `{operator}` on encrypt column `{column}` can not be rewritten")]
    UnsupportedEncryptCondition { column: String, operator: String },
    #[error("encryptor `{encryptor}` failed: {message}")]
    Encrypt { encryptor: String, message: String },
}

/// Invalid mesh or rule configuration.
#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("unable to read config file `{path}`: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown {kind} algorithm type `{algorithm_type}`")]
    UnknownAlgorithmType { kind: String, algorithm_type: String },
    #[error("algorithm `{algorithm}` is not configured")]
    MissingAlgorithm { algorithm: String },
    #[error("property `{property}` of algorithm `{algorithm}` is missing or invalid")]
    InvalidProperty { algorithm: String, property: String },
    #[error("invalid data node expression `{0}`")]
    InvalidDataNode(String),
    #[error("{0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err: Error = RoutingError::NoDataSource("t_order".to_string()).into();
        assert!(err.is_routing());
        assert!(!err.is_binding());
        assert_eq!(err.to_string(), "no data source can be resolved for table `t_order`");

        let err: Error = BindingError::AmbiguousColumn {
            column: "id".to_string(),
            tables: vec!["t_order".to_string(), "t_user".to_string()],
        }
        .into();
        assert!(err.is_binding());
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_fmt_error_is_general() {
        let err: Error = std::fmt::Error.into();
        assert!(matches!(err, Error::General(_)));
    }
}
