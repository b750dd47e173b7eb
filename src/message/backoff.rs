use std::{iter::Take, time::Duration};

/// Provides a mechanism for managing attempting to complete an operation
/// and retrying the operation, with a backoff, if it fails.
///
/// This iterator provides an infinite stream of back off durations, where
/// the duration increases an exponential factor up to some maximum delay.
/// Upon reaching the maximum delay, that value will be returned from then
/// on. Bound the number of attempts with [Iterator::take].
pub struct ExponentialBackoff {
    curr: Duration,
    max: Duration,
    factor: u32,
}

impl ExponentialBackoff {
    pub fn new(start: Duration, max: Duration, factor: u32) -> ExponentialBackoff {
        ExponentialBackoff {
            curr: start,
            max,
            factor,
        }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let this = self.curr;
        let new_next = self.curr * self.factor;

        self.curr = if new_next > self.max {
            self.max
        } else {
            new_next
        };

        Some(this)
    }
}

/// The Retry trait provides a protocol for retrying a function returning a
/// [Result] until either it succeeds or the [Iterator] completes. The
/// iterator yields the [Duration] to wait between attempts.
pub trait Retry: Iterator<Item = Duration> + Sized {
    /// Retry the given function until it returns [Ok]. After every failed
    /// attempt but the last, `sleep` is called with the error and the delay;
    /// it is responsible for logging and for waiting. If the iterator
    /// finishes without a successful execution of `f`, the last [Err] is
    /// returned. An empty iterator makes no attempt and returns `None`.
    fn retry<F, S, T, E>(self, mut f: F, sleep: S) -> Option<Result<T, E>>
    where
        F: FnMut() -> Result<T, E>,
        S: Fn(&E, Duration),
    {
        let mut last_err = None;
        let mut iter = self.peekable();

        while let Some(delay) = iter.next() {
            match f() {
                Ok(v) => return Some(Ok(v)),
                Err(e) => {
                    if iter.peek().is_some() {
                        sleep(&e, delay);
                    }
                    last_err = Some(Err(e));
                }
            }
        }
        last_err
    }
}

impl Retry for ExponentialBackoff {}

impl Retry for Take<ExponentialBackoff> {}
