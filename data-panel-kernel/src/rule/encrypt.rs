use std::collections::BTreeMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use data_panel_common::common::{ConfigError, Result, RewriteError};
use data_panel_common::config::{AlgorithmConfiguration, EncryptRuleConfiguration};
use data_panel_common::statement::Value;

use crate::rule::registry::{AlgorithmRegistry, EncryptAlgorithm};

/// Hex MD5 of the value text followed by the optional `salt` property.
#[derive(Debug, Clone)]
pub struct MD5EncryptAlgorithm {
    salt: String,
}

impl MD5EncryptAlgorithm {
    pub fn new(config: &AlgorithmConfiguration) -> Self {
        MD5EncryptAlgorithm {
            salt: config.get_str("salt").unwrap_or_default(),
        }
    }
}

impl EncryptAlgorithm for MD5EncryptAlgorithm {
    fn algorithm_type(&self) -> &str {
        "MD5"
    }

    fn encrypt(&self, plain: &Value) -> Result<Value> {
        if *plain == Value::Null {
            return Ok(Value::Null);
        }
        let digest = md5::compute(format!("{}{}", plain, self.salt));
        Ok(Value::Text(format!("{:x}", digest)))
    }
}

/// Hex SHA-256 of the value text followed by the optional `salt` property.
#[derive(Debug, Clone)]
pub struct SHA256EncryptAlgorithm {
    salt: String,
}

impl SHA256EncryptAlgorithm {
    pub fn new(config: &AlgorithmConfiguration) -> Self {
        SHA256EncryptAlgorithm {
            salt: config.get_str("salt").unwrap_or_default(),
        }
    }
}

impl EncryptAlgorithm for SHA256EncryptAlgorithm {
    fn algorithm_type(&self) -> &str {
        "SHA256"
    }

    fn encrypt(&self, plain: &Value) -> Result<Value> {
        if *plain == Value::Null {
            return Ok(Value::Null);
        }
        let digest = Sha256::digest(format!("{}{}", plain, self.salt).as_bytes());
        Ok(Value::Text(hex::encode(digest)))
    }
}

#[derive(Debug, Clone)]
pub struct EncryptColumn {
    pub logic_column: String,
    pub cipher_column: String,
    pub encryptor_name: String,
    encryptor: Arc<dyn EncryptAlgorithm>,
}

impl EncryptColumn {
    pub fn encrypt(&self, plain: &Value) -> Result<Value> {
        self.encryptor.encrypt(plain).map_err(|e| {
            RewriteError::Encrypt {
                encryptor: self.encryptor_name.clone(),
                message: e.to_string(),
            }
            .into()
        })
    }
}

#[derive(Debug, Clone)]
pub struct EncryptRule {
    tables: BTreeMap<String, BTreeMap<String, EncryptColumn>>,
}

impl EncryptRule {
    pub fn new(config: &EncryptRuleConfiguration, registry: &AlgorithmRegistry) -> Result<Self> {
        let mut encryptors = BTreeMap::new();
        for (name, algorithm) in &config.encryptors {
            encryptors.insert(name.clone(), registry.encrypt_algorithm(algorithm)?);
        }
        let mut tables = BTreeMap::new();
        for (table_name, table) in &config.tables {
            let mut columns = BTreeMap::new();
            for (column_name, column) in &table.columns {
                let encryptor = encryptors
                    .get(&column.encryptor_name)
                    .ok_or_else(|| ConfigError::MissingAlgorithm {
                        algorithm: column.encryptor_name.clone(),
                    })?;
                columns.insert(
                    column_name.to_ascii_lowercase(),
                    EncryptColumn {
                        logic_column: column_name.clone(),
                        cipher_column: column.cipher_column.clone(),
                        encryptor_name: column.encryptor_name.clone(),
                        encryptor: Arc::clone(encryptor),
                    },
                );
            }
            tables.insert(table_name.to_ascii_lowercase(), columns);
        }
        Ok(EncryptRule { tables })
    }

    pub fn is_encrypt_table(&self, logic_table: &str) -> bool {
        self.tables.contains_key(&logic_table.to_ascii_lowercase())
    }

    pub fn find_column(&self, logic_table: &str, logic_column: &str) -> Option<&EncryptColumn> {
        self.tables
            .get(&logic_table.to_ascii_lowercase())?
            .get(&logic_column.to_ascii_lowercase())
    }

    /// Encrypt columns of a table in name order.
    pub fn columns(&self, logic_table: &str) -> impl Iterator<Item = &EncryptColumn> {
        self.tables
            .get(&logic_table.to_ascii_lowercase())
            .into_iter()
            .flat_map(|columns| columns.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_panel_common::config::{PropValue, RuleConfiguration};

    #[test]
    fn test_md5_encrypt() {
        let algorithm = MD5EncryptAlgorithm::new(&AlgorithmConfiguration::new("MD5"));
        assert_eq!(
            algorithm.encrypt(&Value::text("test")).unwrap(),
            Value::text("098f6bcd4621d373cade4e832627b4f6")
        );
        assert_eq!(algorithm.encrypt(&Value::Null).unwrap(), Value::Null);
        let salted = MD5EncryptAlgorithm::new(&AlgorithmConfiguration::new("MD5").with_prop("salt", PropValue::Text("st".into())));
        assert_eq!(
            salted.encrypt(&Value::text("te")).unwrap(),
            Value::text("098f6bcd4621d373cade4e832627b4f6")
        );
    }

    #[test]
    fn test_sha256_encrypt() {
        let algorithm = SHA256EncryptAlgorithm::new(&AlgorithmConfiguration::new("SHA256"));
        assert_eq!(
            algorithm.encrypt(&Value::text("abc")).unwrap(),
            Value::text("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn test_encrypt_rule_from_config() {
        let config = RuleConfiguration::from_yaml_str(
            r#"
encrypt:
  tables:
    t_user:
      columns:
        pwd: { cipher_column: pwd_cipher, encryptor_name: md5 }
  encryptors:
    md5: { type: MD5 }
"#,
        )
        .unwrap();
        let rule = EncryptRule::new(config.encrypt.as_ref().unwrap(), &AlgorithmRegistry::default()).unwrap();
        assert!(rule.is_encrypt_table("T_USER"));
        let column = rule.find_column("t_user", "PWD").unwrap();
        assert_eq!(column.cipher_column, "pwd_cipher");
        assert_eq!(column.encrypt(&Value::Int(1)).unwrap(), Value::text("c4ca4238a0b923820dcc509a6f75849b"));
        assert_eq!(rule.columns("t_user").count(), 1);
        assert!(rule.find_column("t_order", "pwd").is_none());
    }
}
