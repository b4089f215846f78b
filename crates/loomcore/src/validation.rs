//! Findings produced by structural validation of a workflow graph.

use crate::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Machine-readable finding code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    CircularDependency,
    InvalidNodeConfig,
    UnknownNodeType,
    DanglingNode,
    NoOutgoingEdge,
    ControlledLoop,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::CircularDependency => "CIRCULAR_DEPENDENCY",
            ValidationCode::InvalidNodeConfig => "INVALID_NODE_CONFIG",
            ValidationCode::UnknownNodeType => "UNKNOWN_NODE_TYPE",
            ValidationCode::DanglingNode => "DANGLING_NODE",
            ValidationCode::NoOutgoingEdge => "NO_OUTGOING_EDGE",
            ValidationCode::ControlledLoop => "CONTROLLED_LOOP",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single finding. Errors and warnings share this shape; which list it
/// lands in decides whether it blocks execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: ValidationCode,
    pub message: String,
    pub node_ids: Vec<NodeId>,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

pub type ValidationError = ValidationIssue;
pub type ValidationWarning = ValidationIssue;

impl ValidationIssue {
    pub fn new(code: ValidationCode, message: impl Into<String>, node_ids: Vec<NodeId>) -> Self {
        Self {
            code,
            message: message.into(),
            node_ids,
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// `cycle_path` context entry as node ids, when present.
    pub fn cycle_path(&self) -> Option<Vec<String>> {
        self.context.get("cycle_path").and_then(|path| {
            path.as_array().map(|ids| {
                ids.iter()
                    .filter_map(|id| id.as_str().map(str::to_string))
                    .collect()
            })
        })
    }
}

/// Outcome of one validation call. `valid` is true iff there are no errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn new(errors: Vec<ValidationError>, warnings: Vec<ValidationWarning>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn errors_with(&self, code: ValidationCode) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.code == code)
    }

    pub fn warnings_with(&self, code: ValidationCode) -> impl Iterator<Item = &ValidationWarning> {
        self.warnings.iter().filter(move |w| w.code == code)
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect();
        if summary.is_empty() {
            write!(f, "valid ({} warnings)", self.warnings.len())
        } else {
            write!(f, "{}", summary.join("; "))
        }
    }
}
