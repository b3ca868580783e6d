//! Compensating-action runner.
//!
//! A [`Saga`] is an ordered list of steps, each an action plus the
//! compensation that undoes it. Actions run in order; when one fails, the
//! compensations of every step that already succeeded run in reverse order
//! and the original failure is returned alongside any compensation that
//! also failed.

type Step<'a, E> = Box<dyn FnOnce() -> Result<(), E> + 'a>;

/// An ordered list of (action, compensation) pairs.
pub struct Saga<'a, E> {
    steps: Vec<(Step<'a, E>, Step<'a, E>)>,
}

/// Why a saga stopped.
#[derive(Debug)]
pub struct SagaFailure<E> {
    /// Index of the step whose action failed.
    pub step: usize,
    /// The action's error.
    pub cause: E,
    /// `(step index, error)` for each compensation that failed, in the
    /// order they ran.
    pub compensation_failures: Vec<(usize, E)>,
}

impl<'a, E> Saga<'a, E> {
    /// Create an empty saga.
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step.
    pub fn step(
        mut self,
        action: impl FnOnce() -> Result<(), E> + 'a,
        compensation: impl FnOnce() -> Result<(), E> + 'a,
    ) -> Self {
        self.steps.push((Box::new(action), Box::new(compensation)));
        self
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when there are no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every action, unwinding on the first failure.
    ///
    /// The failing step's own compensation is not run.
    pub fn run(self) -> Result<(), SagaFailure<E>> {
        let mut completed: Vec<(usize, Step<'a, E>)> = Vec::with_capacity(self.steps.len());

        for (index, (action, compensation)) in self.steps.into_iter().enumerate() {
            if let Err(cause) = action() {
                let compensation_failures = completed
                    .into_iter()
                    .rev()
                    .filter_map(|(done, undo)| undo().err().map(|e| (done, e)))
                    .collect();
                return Err(SagaFailure {
                    step: index,
                    cause,
                    compensation_failures,
                });
            }
            completed.push((index, compensation));
        }

        Ok(())
    }
}

impl<E> Default for Saga<'_, E> {
    fn default() -> Self {
        Self::new()
    }
}
