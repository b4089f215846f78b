use loomcore::{NodeError, Value};
use std::collections::HashMap;

/// What an edge condition is evaluated against: the node that just ran.
#[derive(Debug, Clone, Copy)]
pub struct ConditionState<'a> {
    pub node_id: &'a str,
    pub node_type: &'a str,
    /// Boolean `result` of the source node; always present for `condition` nodes
    pub verdict: Option<bool>,
    pub outputs: &'a HashMap<String, Value>,
    pub iteration: u32,
}

/// Decides whether a conditional edge may be followed.
///
/// Expression syntax belongs entirely to the implementation.
pub trait ConditionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, state: &ConditionState<'_>) -> Result<bool, NodeError>;
}

/// Matches boolean literal expressions against the source node's verdict.
///
/// Accepts `true`/`false`, `yes`/`no` and `1`/`0` in any case, optionally
/// negated with a leading `!`. A source without a verdict follows no
/// conditional edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerdictEvaluator;

impl VerdictEvaluator {
    fn parse(expression: &str) -> Option<bool> {
        let expression = expression.trim();
        if let Some(rest) = expression.strip_prefix('!') {
            return Self::parse(rest).map(|b| !b);
        }
        match expression.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        }
    }
}

impl ConditionEvaluator for VerdictEvaluator {
    fn evaluate(&self, expression: &str, state: &ConditionState<'_>) -> Result<bool, NodeError> {
        let expected = Self::parse(expression).ok_or_else(|| {
            NodeError::Configuration(format!(
                "unsupported condition expression '{}' on edge from '{}'",
                expression, state.node_id
            ))
        })?;
        Ok(state.verdict == Some(expected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(outputs: &HashMap<String, Value>, verdict: Option<bool>) -> ConditionState<'_> {
        ConditionState {
            node_id: "check",
            node_type: "condition",
            verdict,
            outputs,
            iteration: 1,
        }
    }

    #[test]
    fn literals_match_verdict() {
        let outputs = HashMap::new();
        let evaluator = VerdictEvaluator;
        assert!(evaluator.evaluate("true", &state(&outputs, Some(true))).unwrap());
        assert!(evaluator.evaluate("No", &state(&outputs, Some(false))).unwrap());
        assert!(evaluator.evaluate("!true", &state(&outputs, Some(false))).unwrap());
        assert!(!evaluator.evaluate("1", &state(&outputs, Some(false))).unwrap());
    }

    #[test]
    fn missing_verdict_never_matches() {
        let outputs = HashMap::new();
        assert!(!VerdictEvaluator.evaluate("true", &state(&outputs, None)).unwrap());
        assert!(!VerdictEvaluator.evaluate("false", &state(&outputs, None)).unwrap());
    }

    #[test]
    fn unknown_expression_is_an_error() {
        let outputs = HashMap::new();
        assert!(VerdictEvaluator.evaluate("x > 3", &state(&outputs, Some(true))).is_err());
    }
}
