use std::str::FromStr;

use serde::Deserialize;

/// What the scheduler does once a node ends in `Error`.
///
/// - `KeepGoing`: the failure stays local to the failed node and its
///   dependents; unrelated branches keep running (default behaviour).
/// - `FailFast`: no further node is dispatched after the first failure.
///   Nodes that are already running are allowed to finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    KeepGoing,
    FailFast,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "keep_going" => Ok(FailurePolicy::KeepGoing),
            "fail_fast" => Ok(FailurePolicy::FailFast),
            other => Err(format!(
                "invalid failure_policy: {other} (expected \"keep_going\" or \"fail_fast\")"
            )),
        }
    }
}
