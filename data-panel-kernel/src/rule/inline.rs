//! Inline expressions: `ds_${0..1}.t_order_${[0, 1]}` data node lists and
//! `t_order_${order_id % 2}` sharding expressions, `${...}` bodies run by rhai.

use std::fmt;

use regex::Regex;
use rhai::{Dynamic, Engine, Scope, AST};

use data_panel_common::common::{ConfigError, Result, RoutingError};
use data_panel_common::statement::Value;

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"\$->\{([^}]*)\}|\$\{([^}]*)\}").unwrap();
    static ref INCLUSIVE_RANGE: Regex = Regex::new(r"^\s*(-?\d+)\s*\.\.\s*(-?\d+)\s*$").unwrap();
}

enum Part {
    Text(String),
    Code(AST),
}

fn split(expression: &str) -> Vec<(String, Option<String>)> {
    let mut parts = vec![];
    let mut last = 0;
    for captures in PLACEHOLDER.captures_iter(expression) {
        let (whole, body) = match (captures.get(0), captures.get(1).or_else(|| captures.get(2))) {
            (Some(whole), Some(body)) => (whole, body),
            _ => continue,
        };
        if whole.start() > last {
            parts.push((expression[last..whole.start()].to_string(), None));
        }
        parts.push((String::new(), Some(body.as_str().to_string())));
        last = whole.end();
    }
    if last < expression.len() {
        parts.push((expression[last..].to_string(), None));
    }
    parts
}

/// Expands a data node expression into its names, placeholders multiply out
/// left to right.
pub fn expand(expression: &str) -> Result<Vec<String>> {
    let engine = Engine::new();
    let mut result = vec![String::new()];
    for (text, body) in split(expression) {
        let choices = match body {
            None => vec![text],
            Some(body) => expand_placeholder(&engine, expression, &body)?,
        };
        result = result
            .iter()
            .flat_map(|prefix| choices.iter().map(move |choice| format!("{}{}", prefix, choice)))
            .collect();
    }
    Ok(result)
}

fn expand_placeholder(engine: &Engine, expression: &str, body: &str) -> Result<Vec<String>> {
    if let Some(captures) = INCLUSIVE_RANGE.captures(body) {
        let bound = |i: usize| -> Result<i64> {
            captures
                .get(i)
                .and_then(|m| m.as_str().parse().ok())
                .ok_or_else(|| ConfigError::InvalidDataNode(expression.to_string()).into())
        };
        let (from, to) = (bound(1)?, bound(2)?);
        return Ok((from..=to).map(|i| i.to_string()).collect());
    }
    let value: Dynamic = engine
        .eval(body)
        .map_err(|_| ConfigError::InvalidDataNode(expression.to_string()))?;
    match value.clone().try_cast::<rhai::Array>() {
        Some(array) => Ok(array.iter().map(|item| item.to_string()).collect()),
        None => Ok(vec![value.to_string()]),
    }
}

/// Compiled sharding expression evaluated once per sharding value.
pub struct InlineExpression {
    expression: String,
    engine: Engine,
    parts: Vec<Part>,
}

impl InlineExpression {
    pub fn compile(expression: &str) -> Result<Self> {
        let engine = Engine::new();
        let mut parts = vec![];
        for (text, body) in split(expression) {
            match body {
                None => parts.push(Part::Text(text)),
                Some(body) => {
                    let ast = engine.compile(&body).map_err(|e| {
                        ConfigError::Invalid(format!("inline expression `{}`: {}", expression, e))
                    })?;
                    parts.push(Part::Code(ast));
                }
            }
        }
        Ok(InlineExpression {
            expression: expression.to_string(),
            engine,
            parts,
        })
    }

    pub fn evaluate(&self, column: &str, value: &Value) -> Result<String> {
        let mut scope = Scope::new();
        match value {
            Value::Null => scope.push(column, ()),
            Value::Bool(v) => scope.push(column, *v),
            Value::Int(v) => scope.push(column, *v),
            Value::Decimal(v) => scope.push(column, *v),
            Value::Text(v) => scope.push(column, v.clone()),
        };
        let mut result = String::new();
        for part in &self.parts {
            match part {
                Part::Text(text) => result.push_str(text),
                Part::Code(ast) => {
                    let value: Dynamic =
                        self.engine
                            .eval_ast_with_scope(&mut scope, ast)
                            .map_err(|e| RoutingError::Algorithm {
                                algorithm: "INLINE".to_string(),
                                message: format!("`{}`: {}", self.expression, e),
                            })?;
                    result.push_str(&value.to_string());
                }
            }
        }
        Ok(result)
    }
}

impl fmt::Debug for InlineExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InlineExpression").field(&self.expression).finish()
    }
}
