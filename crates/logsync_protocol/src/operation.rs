//! Change operations.

use serde::{Deserialize, Serialize};

/// The kind of change recorded in the change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// File was created.
    #[serde(rename = "C")]
    Create,
    /// File content was modified.
    #[serde(rename = "M")]
    Modify,
    /// File was deleted.
    #[serde(rename = "D")]
    Delete,
}

impl Operation {
    /// Returns the single-letter wire code.
    pub fn as_code(&self) -> &'static str {
        match self {
            Operation::Create => "C",
            Operation::Modify => "M",
            Operation::Delete => "D",
        }
    }

    /// Parses a wire code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "C" => Some(Operation::Create),
            "M" => Some(Operation::Modify),
            "D" => Some(Operation::Delete),
            _ => None,
        }
    }

    /// Returns true for operations accepted by the upload endpoint.
    ///
    /// Deletes travel over their own endpoint and are never uploaded.
    pub fn allowed_for_upload(&self) -> bool {
        matches!(self, Operation::Create | Operation::Modify)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}
