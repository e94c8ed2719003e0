//! Pure-or-suspended parse results
//!
//! Almost every parse step completes immediately. A custom transformation
//! may suspend (e.g. an IO-bound lookup); sequencing lifts the whole chain
//! into a future only from that point on, so the synchronous path never
//! allocates futures.

use futures::future::{BoxFuture, FutureExt};
use std::future::Future;

use crate::issue::Issue;
use crate::parser::ErrorsMode;

/// Result of a parse step: immediate, or suspended behind a future
pub enum SchemaResult<A> {
    Immediate(Result<A, Issue>),
    Suspended(BoxFuture<'static, Result<A, Issue>>),
}

/// A deferred parse step, run by [`sequence`]
pub type Step<T> = Box<dyn FnOnce() -> SchemaResult<T> + Send>;

impl<A: Send + 'static> SchemaResult<A> {
    pub fn succeed(value: A) -> Self {
        SchemaResult::Immediate(Ok(value))
    }

    pub fn fail(issue: Issue) -> Self {
        SchemaResult::Immediate(Err(issue))
    }

    pub fn from_result(result: Result<A, Issue>) -> Self {
        SchemaResult::Immediate(result)
    }

    /// Suspend on a future
    pub fn suspend<F>(future: F) -> Self
    where
        F: Future<Output = Result<A, Issue>> + Send + 'static,
    {
        SchemaResult::Suspended(future.boxed())
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, SchemaResult::Suspended(_))
    }

    pub fn map<B, F>(self, f: F) -> SchemaResult<B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> B + Send + 'static,
    {
        match self {
            SchemaResult::Immediate(result) => SchemaResult::Immediate(result.map(f)),
            SchemaResult::Suspended(future) => {
                SchemaResult::Suspended(async move { future.await.map(f) }.boxed())
            }
        }
    }

    pub fn map_err<F>(self, f: F) -> Self
    where
        F: FnOnce(Issue) -> Issue + Send + 'static,
    {
        match self {
            SchemaResult::Immediate(result) => SchemaResult::Immediate(result.map_err(f)),
            SchemaResult::Suspended(future) => {
                SchemaResult::Suspended(async move { future.await.map_err(f) }.boxed())
            }
        }
    }

    pub fn and_then<B, F>(self, f: F) -> SchemaResult<B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> SchemaResult<B> + Send + 'static,
    {
        self.then(|result| match result {
            Ok(value) => f(value),
            Err(issue) => SchemaResult::Immediate(Err(issue)),
        })
    }

    pub fn or_else<F>(self, f: F) -> Self
    where
        F: FnOnce(Issue) -> SchemaResult<A> + Send + 'static,
    {
        self.then(|result| match result {
            Ok(value) => SchemaResult::Immediate(Ok(value)),
            Err(issue) => f(issue),
        })
    }

    /// Continue with the settled result, success or failure
    pub fn then<B, F>(self, f: F) -> SchemaResult<B>
    where
        B: Send + 'static,
        F: FnOnce(Result<A, Issue>) -> SchemaResult<B> + Send + 'static,
    {
        match self {
            SchemaResult::Immediate(result) => f(result),
            SchemaResult::Suspended(future) => SchemaResult::Suspended(
                async move { f(future.await).into_effect().await }.boxed(),
            ),
        }
    }

    /// Lift into a future regardless of how the result was produced
    pub fn into_effect(self) -> BoxFuture<'static, Result<A, Issue>> {
        match self {
            SchemaResult::Immediate(result) => futures::future::ready(result).boxed(),
            SchemaResult::Suspended(future) => future,
        }
    }

    /// Settle synchronously.
    ///
    /// A suspended result is polled once; one that is still pending becomes
    /// a `Forbidden` issue.
    pub fn force(self) -> Result<A, Issue> {
        match self {
            SchemaResult::Immediate(result) => result,
            SchemaResult::Suspended(future) => future.now_or_never().unwrap_or_else(|| {
                Err(Issue::forbidden(None, "cannot be decoded synchronously"))
            }),
        }
    }
}

impl<A: Send + 'static> From<Result<A, Issue>> for SchemaResult<A> {
    fn from(result: Result<A, Issue>) -> Self {
        SchemaResult::Immediate(result)
    }
}

/// Run steps in order, collecting every settled result.
///
/// Stays synchronous until the first suspended step. In `First` mode the run
/// stops after the first failure.
pub fn sequence<T: Send + 'static>(
    steps: Vec<Step<T>>,
    mode: ErrorsMode,
) -> SchemaResult<Vec<Result<T, Issue>>> {
    sequence_until(steps, move |results| {
        mode == ErrorsMode::First && matches!(results.last(), Some(Err(_)))
    })
}

/// Run steps in order until `stop` says the results collected so far are enough
pub fn sequence_until<T, S>(steps: Vec<Step<T>>, stop: S) -> SchemaResult<Vec<Result<T, Issue>>>
where
    T: Send + 'static,
    S: Fn(&[Result<T, Issue>]) -> bool + Send + 'static,
{
    let mut results = Vec::with_capacity(steps.len());
    let mut remaining = steps.into_iter();
    while let Some(step) = remaining.next() {
        match step() {
            SchemaResult::Immediate(result) => {
                results.push(result);
                if stop(&results) {
                    return SchemaResult::Immediate(Ok(results));
                }
            }
            SchemaResult::Suspended(future) => {
                let rest: Vec<Step<T>> = remaining.collect();
                return SchemaResult::Suspended(
                    async move {
                        results.push(future.await);
                        if stop(&results) {
                            return Ok(results);
                        }
                        for step in rest {
                            results.push(step().into_effect().await);
                            if stop(&results) {
                                break;
                            }
                        }
                        Ok(results)
                    }
                    .boxed(),
                );
            }
        }
    }
    SchemaResult::Immediate(Ok(results))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(n: i32) -> Step<i32> {
        Box::new(move || SchemaResult::succeed(n))
    }

    fn err() -> Step<i32> {
        Box::new(|| SchemaResult::fail(Issue::invalid_value(None, "boom")))
    }

    fn later(n: i32) -> Step<i32> {
        Box::new(move || SchemaResult::suspend(async move { Ok(n) }))
    }

    #[test]
    fn test_first_mode_short_circuits() {
        let out = sequence(vec![ok(1), err(), ok(3)], ErrorsMode::First).force().unwrap();
        assert_eq!(out.len(), 2);
        assert!(out[1].is_err());
    }

    #[test]
    fn test_all_mode_runs_to_completion() {
        let out = sequence(vec![ok(1), err(), ok(3)], ErrorsMode::All).force().unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_suspended_steps_lift_the_sequence() {
        let result = sequence(vec![ok(1), later(2), ok(3)], ErrorsMode::All);
        assert!(result.is_suspended());
        let out = futures::executor::block_on(result.into_effect()).unwrap();
        let values: Vec<i32> = out.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_force_pending_is_forbidden() {
        let pending: SchemaResult<i32> = SchemaResult::suspend(futures::future::pending());
        let issue = pending.force().unwrap_err();
        assert_eq!(issue.tag(), "Forbidden");
    }

    #[test]
    fn test_and_then_chains_through_suspension() {
        let result = SchemaResult::suspend(async { Ok(2) }).and_then(|n| SchemaResult::succeed(n * 10));
        assert_eq!(result.force().unwrap(), 20);
    }
}
