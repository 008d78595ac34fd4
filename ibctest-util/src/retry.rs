// Copyright 2026 The ibctest Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use core::fmt;
use core::future::Future;
use core::pin::{Pin, pin};
use core::time::Duration;
use std::sync::Arc;

use futures::stream::{Stream, StreamExt, unfold};
use ibctest_config::{Backoff, RetryConfig};
use ibctest_error::{Code, Error, make_err};
use rand::Rng;
use tracing::debug;

use crate::context::Context;

struct BackoffIter {
    current: Duration,
    backoff: Backoff,
}

impl Iterator for BackoffIter {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let delay = self.current;
        if self.backoff == Backoff::Exponential {
            self.current = self.current.saturating_mul(2);
        }
        Some(delay)
    }
}

pub type SleepFn = Arc<dyn Fn(Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> + Sync + Send>;
pub type JitterFn = Arc<dyn Fn(Duration) -> Duration + Send + Sync>;

#[derive(PartialEq, Eq, Debug)]
pub enum RetryResult<T> {
    Ok(T),
    /// Try again after the next backoff delay.
    Retry(Error),
    /// Permanent failure, stop immediately.
    Err(Error),
}

/// Bounded retry loop with an explicit backoff policy.
///
/// Sleeping goes through `sleep_fn` so tests can drive the loop without
/// real time passing.
#[derive(Clone)]
pub struct Retrier {
    sleep_fn: SleepFn,
    jitter_fn: JitterFn,
    config: RetryConfig,
}

impl fmt::Debug for Retrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Retrier {
    pub fn new(sleep_fn: SleepFn, jitter_fn: JitterFn, config: RetryConfig) -> Self {
        Self {
            sleep_fn,
            jitter_fn,
            config,
        }
    }

    /// Sleeps on the tokio timer and applies the configured jitter.
    pub fn from_config(config: RetryConfig) -> Self {
        let jitter = config.jitter;
        Self::new(
            Arc::new(|duration| Box::pin(tokio::time::sleep(duration))),
            make_jitter_fn(jitter),
            config,
        )
    }

    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        BackoffIter {
            current: self.config.delay,
            backoff: self.config.backoff,
        }
        .map(|d| (self.jitter_fn)(d))
        .take(self.config.max_retries) // Number of retries, so runs max_retries + 1 times.
    }

    /// Pulls attempts from `operation` until one succeeds, one fails
    /// permanently, the retry budget runs out or `ctx` is done.
    ///
    /// Running out of retries yields `DeadlineExceeded` merged with the last
    /// attempt's error.
    pub async fn retry<T, S>(&self, ctx: &Context, operation: S) -> Result<T, Error>
    where
        S: Stream<Item = RetryResult<T>>,
    {
        let mut delays = self.delays();
        let mut operation = pin!(operation);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let next = ctx.run(async { Ok(operation.next().await) }).await;
            let last_err = match next {
                Err(ctx_err) => return Err(ctx_err.append(format!("On attempt {attempt}"))),
                Ok(None) => {
                    return Err(make_err!(
                        Code::Internal,
                        "Retry stream ended abruptly on attempt {attempt}",
                    ));
                }
                Ok(Some(RetryResult::Ok(value))) => return Ok(value),
                Ok(Some(RetryResult::Err(e))) => {
                    return Err(e.append(format!("On attempt {attempt}")));
                }
                Ok(Some(RetryResult::Retry(e))) => e,
            };
            let Some(delay) = delays.next() else {
                return Err(make_err!(
                    Code::DeadlineExceeded,
                    "Gave up after {attempt} attempts"
                )
                .merge(last_err));
            };
            debug!(attempt, ?delay, error = ?last_err, "retrying");
            let sleep = (self.sleep_fn)(delay);
            if let Err(ctx_err) = ctx.run(async { Ok(sleep.await) }).await {
                return Err(ctx_err
                    .append(format!("While waiting to retry attempt {attempt}"))
                    .merge(last_err));
            }
        }
    }

    /// Repeats `probe` until it returns `Ok`. Every probe error is retried.
    pub async fn poll_until_ready<F, Fut>(&self, ctx: &Context, probe: F) -> Result<(), Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        let attempts = unfold(probe, |mut probe| async move {
            let result = match probe().await {
                Ok(()) => RetryResult::Ok(()),
                Err(e) => RetryResult::Retry(e),
            };
            Some((result, probe))
        });
        self.retry(ctx, attempts).await
    }
}

/// Jitter as a fraction of the delay; zero disables it.
pub fn make_jitter_fn(jitter: f32) -> JitterFn {
    let jitter = jitter.clamp(0.0, 2.0);
    if jitter <= 0.0 {
        return Arc::new(|delay| delay);
    }
    Arc::new(move |delay: Duration| {
        let min = 1.0 - jitter / 2.0;
        let max = 1.0 + jitter / 2.0;
        delay.mul_f32(rand::rng().random_range(min..max))
    })
}
