use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

pub type Map = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

/// A set-based requirement, as found in a disruption's `advancedSelector`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Expression {
    pub key: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub values: BTreeSet<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Selects the targets of a disruption. Both parts must match.
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct Selector<'a> {
    pub match_labels: Option<&'a Map>,
    pub match_expressions: Option<&'a [Expression]>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InvalidExpression {
    #[error("{operator:?} requirement on {key:?} must have at least one value")]
    MissingValues { key: String, operator: Operator },

    #[error("{operator:?} requirement on {key:?} must not have values")]
    UnexpectedValues { key: String, operator: Operator },
}

// === Selector ===

impl Selector<'_> {
    pub fn is_empty(&self) -> bool {
        self.match_labels.map_or(true, BTreeMap::is_empty)
            && self.match_expressions.map_or(true, <[_]>::is_empty)
    }
}

/// Renders the selector in the API server's `labelSelector` query syntax.
impl fmt::Display for Selector<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        for (k, v) in self.match_labels.into_iter().flatten() {
            write!(f, "{sep}{k}={v}")?;
            sep = ",";
        }
        for expr in self.match_expressions.into_iter().flatten() {
            write!(f, "{sep}{expr}")?;
            sep = ",";
        }
        Ok(())
    }
}

// === Expression ===

impl Expression {
    pub fn validate(&self) -> Result<(), InvalidExpression> {
        match self.operator {
            Operator::In | Operator::NotIn if self.values.is_empty() => {
                Err(InvalidExpression::MissingValues {
                    key: self.key.clone(),
                    operator: self.operator,
                })
            }
            Operator::Exists | Operator::DoesNotExist if !self.values.is_empty() => {
                Err(InvalidExpression::UnexpectedValues {
                    key: self.key.clone(),
                    operator: self.operator,
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = || self.values.iter().cloned().collect::<Vec<_>>().join(",");
        match self.operator {
            Operator::In => write!(f, "{} in ({})", self.key, values()),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, values()),
            Operator::Exists => f.write_str(&self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}
