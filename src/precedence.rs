use std::{collections::HashMap, sync::Arc};

use lazy_static::lazy_static;

/// Returned for any character that is not a binary operator.
pub const NOT_AN_OPERATOR: i32 = -1;

lazy_static! {
    static ref DEFAULT_OPERATORS: Arc<HashMap<char, i32>> = {
        let mut operators = HashMap::new();
        operators.insert('<', 10);
        operators.insert('+', 20);
        operators.insert('-', 20);
        operators.insert('*', 40);
        operators.insert('/', 40);
        Arc::new(operators)
    };
}

/// Binding strength of the single-character binary operators. Higher binds
/// tighter. Tables are immutable once built.
#[derive(Debug, Clone)]
pub struct PrecedenceTable {
    operators: Arc<HashMap<char, i32>>,
}

impl Default for PrecedenceTable {
    fn default() -> Self {
        Self {
            operators: Arc::clone(&DEFAULT_OPERATORS),
        }
    }
}

impl PrecedenceTable {
    /// Build a table from explicit operators. Entries with a non-positive
    /// precedence are dropped since they could never bind.
    pub fn from_operators(operators: impl IntoIterator<Item = (char, i32)>) -> Self {
        Self {
            operators: Arc::new(
                operators
                    .into_iter()
                    .filter(|(op, precedence)| op.is_ascii() && *precedence > 0)
                    .collect(),
            ),
        }
    }

    pub fn precedence_of(&self, op: char) -> i32 {
        if !op.is_ascii() {
            return NOT_AN_OPERATOR;
        }
        self.operators
            .get(&op)
            .copied()
            .unwrap_or(NOT_AN_OPERATOR)
    }

    pub fn is_binary_operator(&self, op: char) -> bool {
        self.precedence_of(op) > 0
    }
}
