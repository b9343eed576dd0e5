//! Revert plan for multi-step operations.
//!
//! Each effectful step that succeeds pushes a compensating action. On
//! failure the actions run in reverse order; on success they are discarded.
//! Compensating actions are plain futures: nothing runs until `fail()` polls
//! them, so building the plan has no side effects.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use tracing::{debug, warn};

/// A deferred compensating action.
pub type RevertStep = BoxFuture<'static, anyhow::Result<()>>;

struct Step {
    label: String,
    action: RevertStep,
}

/// Ordered stack of compensating actions.
///
/// A step's own failure is logged and never propagated, since the caller is
/// already returning the error that triggered the revert.
#[must_use = "a Reverter must be resolved with fail() or success()"]
pub struct Reverter {
    steps: Vec<Step>,
}

impl Reverter {
    /// Creates an empty plan.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Pushes a compensating action for a step that just succeeded.
    pub fn add<F>(&mut self, label: impl Into<String>, action: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.steps.push(Step {
            label: label.into(),
            action: Box::pin(action),
        });
    }

    /// Absorbs another plan, typically one returned by a collaborator.
    ///
    /// Its steps run before anything already in this plan, and in their
    /// own reverse order.
    pub fn extend(&mut self, mut other: Reverter) {
        self.steps.append(&mut other.steps);
    }

    /// Returns the number of pending steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no steps are pending.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every pending step in reverse order.
    ///
    /// Returns the number of steps that failed.
    pub async fn fail(mut self) -> usize {
        let steps = std::mem::take(&mut self.steps);
        let mut failed = 0;

        for step in steps.into_iter().rev() {
            match step.action.await {
                Ok(()) => debug!(step = %step.label, "Reverted step"),
                Err(e) => {
                    failed += 1;
                    warn!(step = %step.label, error = %e, "Failed reverting step");
                }
            }
        }

        failed
    }

    /// Discards every pending step.
    pub fn success(mut self) {
        self.steps.clear();
    }
}

impl Default for Reverter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Reverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reverter")
            .field(
                "steps",
                &self.steps.iter().map(|s| s.label.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Drop for Reverter {
    fn drop(&mut self) {
        if !self.steps.is_empty() {
            warn!(
                pending = self.steps.len(),
                "Reverter dropped without fail() or success(), pending steps discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    fn recording_step(
        log: &Arc<Mutex<Vec<String>>>,
        name: &str,
    ) -> impl Future<Output = anyhow::Result<()>> + Send + 'static {
        let log = Arc::clone(log);
        let name = name.to_string();
        async move {
            log.lock().unwrap().push(name);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fail_runs_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut revert = Reverter::new();
        revert.add("first", recording_step(&log, "first"));
        revert.add("second", recording_step(&log, "second"));
        revert.add("third", recording_step(&log, "third"));

        assert_eq!(revert.fail().await, 0);
        assert_eq!(*log.lock().unwrap(), vec!["third", "second", "first"]);
    }

    #[tokio::test]
    async fn test_success_discards_steps() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut revert = Reverter::new();
        revert.add("first", recording_step(&log, "first"));
        assert_eq!(revert.len(), 1);

        revert.success();
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_step_does_not_stop_others() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut revert = Reverter::new();
        revert.add("first", recording_step(&log, "first"));
        revert.add("broken", async { Err::<(), _>(anyhow::anyhow!("store unavailable")) });
        revert.add("third", recording_step(&log, "third"));

        assert_eq!(revert.fail().await, 1);
        assert_eq!(*log.lock().unwrap(), vec!["third", "first"]);
    }

    #[tokio::test]
    async fn test_extend_keeps_nested_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut outer = Reverter::new();
        outer.add("outer", recording_step(&log, "outer"));

        let mut inner = Reverter::new();
        inner.add("inner-a", recording_step(&log, "inner-a"));
        inner.add("inner-b", recording_step(&log, "inner-b"));
        outer.extend(inner);

        assert_eq!(outer.len(), 3);
        outer.fail().await;
        assert_eq!(*log.lock().unwrap(), vec!["inner-b", "inner-a", "outer"]);
    }
}
