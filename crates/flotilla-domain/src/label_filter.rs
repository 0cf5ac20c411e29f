//! Filtros por etiquetas.
//!
//! Un `LabelFilter` es una conjunción de expresiones; una lista de filtros
//! se evalúa como disyunción (basta con que uno coincida). Una lista vacía
//! acepta todo.
//!
//! Sintaxis textual (parámetro `label_filter` en HTTP):
//! `env in (prod,staging), team, !legacy, tier notin (batch)`.
use serde::{Deserialize, Serialize};

use crate::{DomainError, Labels};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LabelFilterOp {
    In,
    NotIn,
    Exists,
    NotExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFilterExpression {
    pub key: String,
    pub op: LabelFilterOp,
    #[serde(default)]
    pub values: Vec<String>,
}

impl LabelFilterExpression {
    pub fn matches(&self, labels: &Labels) -> bool {
        let value = labels.get(&self.key);
        match self.op {
            LabelFilterOp::In => value.map(|v| self.values.contains(v)).unwrap_or(false),
            LabelFilterOp::NotIn => value.map(|v| !self.values.contains(v)).unwrap_or(true),
            LabelFilterOp::Exists => value.is_some(),
            LabelFilterOp::NotExists => value.is_none(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelFilter {
    pub expressions: Vec<LabelFilterExpression>,
}

impl LabelFilter {
    pub fn matches(&self, labels: &Labels) -> bool { self.expressions.iter().all(|e| e.matches(labels)) }

    /// Disyunción sobre una lista de filtros.
    pub fn matches_any(filters: &[LabelFilter], labels: &Labels) -> bool {
        filters.is_empty() || filters.iter().any(|f| f.matches(labels))
    }

    pub fn parse(input: &str) -> Result<LabelFilter, DomainError> {
        let mut expressions = Vec::new();
        for raw in split_top_level(input) {
            let term = raw.trim();
            if term.is_empty() {
                continue;
            }
            expressions.push(parse_term(term)?);
        }
        Ok(LabelFilter { expressions })
    }
}

// Separa por comas que no estén dentro de paréntesis.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&input[start..]);
    out
}

fn parse_term(term: &str) -> Result<LabelFilterExpression, DomainError> {
    let invalid = || DomainError::validation("label_filter", format!("invalid expression: {term}"));
    if let Some(key) = term.strip_prefix('!') {
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid());
        }
        return Ok(LabelFilterExpression { key: key.to_string(),
                                          op: LabelFilterOp::NotExists,
                                          values: vec![] });
    }
    let mut words = term.splitn(2, char::is_whitespace);
    let key = words.next().ok_or_else(invalid)?.trim();
    let rest = words.next().map(str::trim).unwrap_or("");
    if rest.is_empty() {
        return Ok(LabelFilterExpression { key: key.to_string(),
                                          op: LabelFilterOp::Exists,
                                          values: vec![] });
    }
    let (op, list) = if let Some(list) = rest.strip_prefix("notin") {
        (LabelFilterOp::NotIn, list)
    } else if let Some(list) = rest.strip_prefix("in") {
        (LabelFilterOp::In, list)
    } else {
        return Err(invalid());
    };
    let list = list.trim();
    let inner = list.strip_prefix('(').and_then(|l| l.strip_suffix(')')).ok_or_else(invalid)?;
    let values = inner.split(',')
                      .map(|v| v.trim().to_string())
                      .filter(|v| !v.is_empty())
                      .collect();
    Ok(LabelFilterExpression { key: key.to_string(),
                               op,
                               values })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels { pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect() }

    #[test]
    fn parses_all_operators() {
        let f = LabelFilter::parse("env in (prod, staging), team, !legacy, tier notin (batch)").unwrap();
        let ops: Vec<_> = f.expressions.iter().map(|e| e.op).collect();
        assert_eq!(ops,
                   vec![LabelFilterOp::In, LabelFilterOp::Exists, LabelFilterOp::NotExists, LabelFilterOp::NotIn]);
        assert_eq!(f.expressions[0].values, vec!["prod", "staging"]);
    }

    #[test]
    fn evaluates_conjunction() {
        let f = LabelFilter::parse("env in (prod), !legacy").unwrap();
        assert!(f.matches(&labels(&[("env", "prod")])));
        assert!(!f.matches(&labels(&[("env", "prod"), ("legacy", "1")])));
        assert!(!f.matches(&labels(&[("env", "dev")])));
    }

    #[test]
    fn disjunction_over_filters() {
        let a = LabelFilter::parse("a").unwrap();
        let b = LabelFilter::parse("b").unwrap();
        assert!(LabelFilter::matches_any(&[], &Labels::new()));
        assert!(LabelFilter::matches_any(&[a.clone(), b.clone()], &labels(&[("b", "")])));
        assert!(!LabelFilter::matches_any(&[a, b], &labels(&[("c", "")])));
    }

    #[test]
    fn rejects_garbage() {
        assert!(LabelFilter::parse("env is prod").is_err());
        assert!(LabelFilter::parse("env in prod").is_err());
    }
}
