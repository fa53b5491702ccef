//! Row selection predicates.
//!
//! A selection is a comparison of one numeric branch against a constant, written
//! `<branch> <op> <number>`, for example `n_jets >= 5`.

use crate::error::TransformerError;
use crate::types::event::float_branch;
use crate::types::Entry;

use std::fmt;
use std::str::FromStr;
use strum_macros::Display;

/// Selection applied when none is configured.
pub const DEFAULT_SELECTION: &str = "n_jets >= 5";

/// Comparison operator
#[derive(Clone, Copy, Debug, Display, PartialEq)]
pub enum Comparison {
    #[strum(serialize = ">=")]
    GreaterEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "!=")]
    NotEqual,
}

impl Comparison {
    // Two-character operators come first so that `>=` is not read as `>`.
    const ALL: [Comparison; 6] = [
        Comparison::GreaterEqual,
        Comparison::LessEqual,
        Comparison::Equal,
        Comparison::NotEqual,
        Comparison::Greater,
        Comparison::Less,
    ];

    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::GreaterEqual => lhs >= rhs,
            Comparison::Greater => lhs > rhs,
            Comparison::LessEqual => lhs <= rhs,
            Comparison::Less => lhs < rhs,
            Comparison::Equal => lhs == rhs,
            Comparison::NotEqual => lhs != rhs,
        }
    }
}

/// A row predicate comparing one branch against a constant.
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub branch: String,
    pub comparison: Comparison,
    pub threshold: f64,
}

impl Default for Selection {
    fn default() -> Self {
        Selection {
            branch: "n_jets".to_string(),
            comparison: Comparison::GreaterEqual,
            threshold: 5.0,
        }
    }
}

impl Selection {
    /// Evaluate the predicate against a tree entry.
    ///
    /// # Arguments
    ///
    /// * `index`: Index of the entry within its tree, used in errors
    /// * `entry`: The entry
    pub fn matches(&self, index: usize, entry: &Entry) -> Result<bool, TransformerError> {
        let value = float_branch(entry, index, &self.branch)?;
        Ok(self.comparison.apply(value, self.threshold))
    }
}

impl FromStr for Selection {
    type Err = TransformerError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let invalid = || TransformerError::InvalidSelection {
            expression: expression.to_string(),
        };
        let operator_start = expression
            .find(|c| matches!(c, '<' | '>' | '=' | '!'))
            .ok_or_else(invalid)?;
        let branch = expression[..operator_start].trim();
        if branch.is_empty() || branch.contains(char::is_whitespace) {
            return Err(invalid());
        }
        let rest = &expression[operator_start..];
        let comparison = Comparison::ALL
            .into_iter()
            .find(|comparison| rest.starts_with(&comparison.to_string()))
            .ok_or_else(invalid)?;
        let threshold: f64 = rest[comparison.to_string().len()..]
            .trim()
            .parse()
            .map_err(|_| invalid())?;
        if !threshold.is_finite() {
            return Err(invalid());
        }
        Ok(Selection {
            branch: branch.to_string(),
            comparison,
            threshold,
        })
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.branch, self.comparison, self.threshold)
    }
}
