//! Wave base behavior (spec.md §4.4).
//!
//! A single trait replaces the "multiple inheritance / abstract base with
//! many helpers" pattern flagged in spec.md §9: `Wave` plus the free
//! functions in [`helpers`] for building contributions, no inheritance chain.

pub mod heuristics;
pub mod helpers;
pub mod manifest;
pub mod trigger;

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::blackboard::Blackboard;
use crate::contribution::DetectionContribution;
pub use manifest::{Lane, WaveManifest, WaveManifestSet};
pub use trigger::TriggerCondition;

/// A single analyzer that consumes the blackboard and emits contributions.
///
/// Waves must be idempotent with respect to their inputs: running the same
/// wave twice on the same blackboard state yields the same signal set with
/// equal-or-higher confidence (spec.md §4.4 "monotonic refinement").
#[async_trait]
pub trait Wave: Send + Sync {
    fn name(&self) -> &str;
    fn priority(&self) -> i32;
    fn enabled(&self) -> bool {
        true
    }
    fn tags(&self) -> &[String] {
        &[]
    }
    fn trigger_conditions(&self) -> &[TriggerCondition] {
        &[]
    }
    fn trigger_timeout(&self) -> Duration {
        Duration::from_millis(50)
    }
    fn execution_timeout(&self) -> Duration {
        Duration::from_secs(2)
    }
    fn is_optional(&self) -> bool {
        true
    }
    fn lane(&self) -> Lane {
        Lane::Default
    }

    /// A wave with no triggers is eligible immediately.
    fn is_ready(&self, blackboard: &crate::blackboard::BlackboardSnapshot) -> bool {
        self.trigger_conditions().iter().all(|c| c.evaluate(blackboard))
    }

    /// Produce contributions. Never returns `Err` to the orchestrator -
    /// internal failures become a low-confidence info contribution
    /// (spec.md §4.3 "Failure semantics", §7).
    async fn contribute(
        &self,
        blackboard: &Blackboard,
        cancel: CancellationToken,
    ) -> Vec<DetectionContribution>;
}

/// Parameter resolution precedence (spec.md §4.4): process-configuration
/// override > manifest defaults > in-code default.
pub fn resolve_param<T: Clone>(
    process_override: Option<&T>,
    manifest: Option<&T>,
    in_code_default: T,
) -> T {
    process_override
        .or(manifest)
        .cloned()
        .unwrap_or(in_code_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_override_wins_over_manifest_and_default() {
        let resolved = resolve_param(Some(&42i64), Some(&7i64), 1i64);
        assert_eq!(resolved, 42);
    }

    #[test]
    fn manifest_wins_over_in_code_default() {
        let resolved: i64 = resolve_param(None, Some(&7i64), 1i64);
        assert_eq!(resolved, 7);
    }

    #[test]
    fn in_code_default_is_last_resort() {
        let resolved: i64 = resolve_param(None, None, 1i64);
        assert_eq!(resolved, 1);
    }
}
