//! Search domain construction
//!
//! The backend filters record queries with a list of `[field, operator,
//! value]` triples combined with AND. `Domain` keeps the triples in
//! insertion order, which is part of the request contract.

use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Like,
    ILike,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::In => "in",
            CompareOp::Like => "like",
            CompareOp::ILike => "ilike",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct Criterion {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

/// Ordered conjunction of search criteria.
#[derive(Debug, Clone, Default)]
pub struct Domain {
    criteria: Vec<Criterion>,
}

impl Domain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one criterion, keeping insertion order.
    pub fn filter(mut self, field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        self.criteria.push(Criterion {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    /// Encode as the backend's triple-list form.
    pub fn to_wire(&self) -> Value {
        Value::Array(
            self.criteria
                .iter()
                .map(|c| {
                    Value::Array(vec![
                        Value::String(c.field.clone()),
                        Value::String(c.op.as_str().to_string()),
                        c.value.clone(),
                    ])
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_form_preserves_insertion_order() {
        let domain = Domain::new()
            .filter("move_type", CompareOp::Eq, "in_invoice")
            .filter("payment_state", CompareOp::NotEq, "paid")
            .filter("invoice_date", CompareOp::Gte, "2024-01-01");

        assert_eq!(
            domain.to_wire(),
            json!([
                ["move_type", "=", "in_invoice"],
                ["payment_state", "!=", "paid"],
                ["invoice_date", ">=", "2024-01-01"]
            ])
        );
    }

    #[test]
    fn empty_domain_encodes_as_empty_list() {
        assert_eq!(Domain::new().to_wire(), json!([]));
        assert!(Domain::new().is_empty());
    }

    #[test]
    fn list_and_pattern_operators() {
        let domain = Domain::new()
            .filter("reconciled_invoice_ids", CompareOp::In, vec![42])
            .filter("name", CompareOp::ILike, "acme");

        assert_eq!(
            domain.to_wire(),
            json!([
                ["reconciled_invoice_ids", "in", [42]],
                ["name", "ilike", "acme"]
            ])
        );
        assert_eq!(domain.len(), 2);
    }
}
