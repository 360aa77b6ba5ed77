//! Ordered fallback dispatch
//!
//! A [`FallbackChain`] holds named strategies that all share one contract:
//! take an input, return a value or fail explicitly. Strategies are tried in
//! order until one succeeds. Nothing is retried; each entry is a distinct
//! alternate path.

use crate::error::{Attempt, ShapLensError};
use tracing::debug;

type Strategy<'a, I, T> = Box<dyn Fn(&I) -> crate::error::Result<T> + 'a>;

/// All strategies failed; errors are kept in attempt order
#[derive(Debug)]
pub struct FallbackFailure {
    pub attempts: Vec<(String, ShapLensError)>,
}

impl FallbackFailure {
    /// Flatten into `(name, message)` pairs for error reporting
    pub fn summarize(&self) -> Vec<Attempt> {
        self.attempts
            .iter()
            .map(|(name, err)| (name.clone(), err.to_string()))
            .collect()
    }

    /// Error of the last strategy tried, if any
    pub fn last(&self) -> Option<&ShapLensError> {
        self.attempts.last().map(|(_, err)| err)
    }
}

/// Ordered list of candidate strategies
pub struct FallbackChain<'a, I, T> {
    strategies: Vec<(String, Strategy<'a, I, T>)>,
}

impl<'a, I, T> Default for FallbackChain<'a, I, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, I, T> FallbackChain<'a, I, T> {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    /// Append a strategy; it runs after every strategy added before it
    pub fn then<F>(mut self, name: impl Into<String>, strategy: F) -> Self
    where
        F: Fn(&I) -> crate::error::Result<T> + 'a,
    {
        self.strategies.push((name.into(), Box::new(strategy)));
        self
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Try each strategy in order, returning the first success and its name
    pub fn run(&self, input: &I) -> std::result::Result<(String, T), FallbackFailure> {
        let (outcome, attempts) = self.run_recording(input);
        outcome.ok_or(FallbackFailure { attempts })
    }

    /// Like [`run`](Self::run), also returning the failures that came before a success
    pub fn run_recording(&self, input: &I) -> (Option<(String, T)>, Vec<(String, ShapLensError)>) {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for (name, strategy) in &self.strategies {
            match strategy(input) {
                Ok(value) => return (Some((name.clone(), value)), attempts),
                Err(err) => {
                    debug!(strategy = %name, error = %err, "Strategy failed, falling through");
                    attempts.push((name.clone(), err));
                }
            }
        }

        (None, attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_first_success_wins() {
        let chain = FallbackChain::new()
            .then("a", |x: &i32| Ok(x + 1))
            .then("b", |x: &i32| Ok(x + 2));

        let (name, value) = chain.run(&1).unwrap();
        assert_eq!(name, "a");
        assert_eq!(value, 2);
    }

    #[test]
    fn test_falls_through_in_order() {
        let calls = Cell::new(0);
        let chain = FallbackChain::new()
            .then("a", |_: &i32| {
                calls.set(calls.get() + 1);
                Err(ShapLensError::DataError("a failed".to_string()))
            })
            .then("b", |x: &i32| {
                calls.set(calls.get() + 1);
                Ok(*x * 10)
            })
            .then("c", |_: &i32| -> crate::error::Result<i32> {
                panic!("must not run after a success")
            });

        let (name, value) = chain.run(&3).unwrap();
        assert_eq!(name, "b");
        assert_eq!(value, 30);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_all_failures_are_aggregated() {
        let chain: FallbackChain<'_, (), ()> = FallbackChain::new()
            .then("first", |_: &()| Err(ShapLensError::DataError("one".to_string())))
            .then("second", |_: &()| Err(ShapLensError::DataError("two".to_string())));

        let failure = chain.run(&()).unwrap_err();
        let summary = failure.summarize();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].0, "first");
        assert!(summary[1].1.contains("two"));
        assert!(matches!(failure.last(), Some(ShapLensError::DataError(_))));
    }

    #[test]
    fn test_recording_keeps_earlier_failures() {
        let chain = FallbackChain::new()
            .then("primary", |_: &()| Err(ShapLensError::RenderError("disabled".to_string())))
            .then("secondary", |_: &()| Ok(7));

        let (outcome, failures) = chain.run_recording(&());
        assert_eq!(outcome, Some(("secondary".to_string(), 7)));
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "primary");
    }

    #[test]
    fn test_empty_chain_fails() {
        let chain: FallbackChain<'_, (), ()> = FallbackChain::new();
        assert!(chain.is_empty());
        assert!(chain.run(&()).unwrap_err().attempts.is_empty());
    }
}
