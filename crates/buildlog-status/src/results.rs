//! Build Result Codes
//!
//! This module defines the terminal outcome of builds, steps and build sets.
//!
//! ## Severity Ordering
//!
//! Results carry a severity ranking used to fold step results into an
//! overall build result and build results into a build set result: the
//! worst constituent outcome wins.

use serde::{Deserialize, Serialize};

/// Terminal outcome of a build, step or build set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildResult {
    Success,
    Skipped,
    Warnings,
    Retry,
    Failure,
    Exception,
}

impl BuildResult {
    /// Severity ranking; higher is worse.
    pub fn severity(self) -> u8 {
        match self {
            BuildResult::Success => 0,
            BuildResult::Skipped => 1,
            BuildResult::Warnings => 2,
            BuildResult::Retry => 3,
            BuildResult::Failure => 4,
            BuildResult::Exception => 5,
        }
    }

    /// Whether this result guarantees the enclosing build set can no longer
    /// succeed.
    pub fn is_failure(self) -> bool {
        matches!(self, BuildResult::Failure | BuildResult::Exception)
    }

    /// The worse of two results.
    pub fn worst(self, other: BuildResult) -> BuildResult {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}
