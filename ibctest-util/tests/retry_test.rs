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

use core::sync::atomic::{AtomicI32, Ordering};
use core::time::Duration;
use std::sync::Arc;

use futures::future::{pending, ready};
use futures::stream::repeat_with;
use ibctest_config::{Backoff, RetryConfig};
use ibctest_error::{Code, Error, make_err};
use ibctest_macro::ibctest_test;
use ibctest_util::context::Context;
use ibctest_util::retry::{Retrier, RetryResult};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

fn config(max_retries: usize, backoff: Backoff) -> RetryConfig {
    RetryConfig {
        max_retries,
        delay: Duration::from_millis(10),
        backoff,
        jitter: 0.0,
    }
}

fn no_sleep_retrier(config: RetryConfig) -> Retrier {
    Retrier::new(
        Arc::new(|_duration| Box::pin(ready(()))),
        Arc::new(|delay| delay),
        config,
    )
}

/// Records every requested sleep instead of sleeping.
fn recording_retrier(config: RetryConfig) -> (Retrier, Arc<Mutex<Vec<Duration>>>) {
    let sleeps = Arc::new(Mutex::new(Vec::new()));
    let sleeps_copy = sleeps.clone();
    let retrier = Retrier::new(
        Arc::new(move |duration| {
            sleeps_copy.lock().push(duration);
            Box::pin(ready(()))
        }),
        Arc::new(|delay| delay),
        config,
    );
    (retrier, sleeps)
}

#[ibctest_test]
async fn retry_simple_success() -> Result<(), Error> {
    let retrier = no_sleep_retrier(config(5, Backoff::Exponential));
    let run_count = Arc::new(AtomicI32::new(0));

    let result = retrier
        .retry(
            &Context::background(),
            repeat_with(|| {
                run_count.fetch_add(1, Ordering::Relaxed);
                RetryResult::Ok(true)
            }),
        )
        .await?;
    assert_eq!(
        run_count.load(Ordering::Relaxed),
        1,
        "Expected function to be called once"
    );
    assert_eq!(result, true, "Expected result to succeed");

    Ok(())
}

#[ibctest_test]
async fn retry_exhaustion_carries_last_error() -> Result<(), Error> {
    let retrier = no_sleep_retrier(config(2, Backoff::Exponential));
    let run_count = Arc::new(AtomicI32::new(0));
    let result = retrier
        .retry(
            &Context::background(),
            repeat_with(|| {
                let attempt = run_count.fetch_add(1, Ordering::Relaxed) + 1;
                RetryResult::<bool>::Retry(make_err!(Code::Unavailable, "not ready {attempt}"))
            }),
        )
        .await;
    assert_eq!(
        run_count.load(Ordering::Relaxed),
        3,
        "Expected function to be called"
    );
    let err = result.unwrap_err();
    assert_eq!(err.code, Code::DeadlineExceeded);
    assert_eq!(
        err.messages,
        vec![
            "Gave up after 3 attempts".to_string(),
            "---".to_string(),
            "not ready 3".to_string(),
        ]
    );

    Ok(())
}

#[ibctest_test]
async fn permanent_error_stops_retrying() -> Result<(), Error> {
    let retrier = no_sleep_retrier(config(5, Backoff::Exponential));
    let run_count = Arc::new(AtomicI32::new(0));
    let result = retrier
        .retry(
            &Context::background(),
            repeat_with(|| {
                run_count.fetch_add(1, Ordering::Relaxed);
                RetryResult::<()>::Err(make_err!(Code::InvalidArgument, "bad probe"))
            }),
        )
        .await;
    assert_eq!(run_count.load(Ordering::Relaxed), 1);
    assert_eq!(
        result.unwrap_err().to_string(),
        "Error { code: InvalidArgument, messages: [\"bad probe\", \"On attempt 1\"] }"
    );

    Ok(())
}

#[ibctest_test]
async fn exponential_backoff_doubles_delay() -> Result<(), Error> {
    let (retrier, sleeps) = recording_retrier(config(4, Backoff::Exponential));
    let _ = retrier
        .retry(
            &Context::background(),
            repeat_with(|| RetryResult::<()>::Retry(make_err!(Code::Unavailable, "down"))),
        )
        .await;
    assert_eq!(
        *sleeps.lock(),
        vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(40),
            Duration::from_millis(80),
        ]
    );

    Ok(())
}

#[ibctest_test]
async fn fixed_backoff_keeps_delay() -> Result<(), Error> {
    let (retrier, sleeps) = recording_retrier(config(3, Backoff::Fixed));
    let run_count = Arc::new(AtomicI32::new(0));
    retrier
        .retry(
            &Context::background(),
            repeat_with(|| {
                if run_count.fetch_add(1, Ordering::Relaxed) == 2 {
                    return RetryResult::Ok(());
                }
                RetryResult::Retry(make_err!(Code::Unavailable, "down"))
            }),
        )
        .await?;
    assert_eq!(
        *sleeps.lock(),
        vec![Duration::from_millis(10), Duration::from_millis(10)]
    );

    Ok(())
}

#[ibctest_test]
async fn poll_until_ready_succeeds_once_probe_passes() -> Result<(), Error> {
    let retrier = no_sleep_retrier(config(5, Backoff::Exponential));
    let run_count = Arc::new(AtomicI32::new(0));
    retrier
        .poll_until_ready(&Context::background(), || {
            let attempt = run_count.fetch_add(1, Ordering::Relaxed);
            async move {
                if attempt < 3 {
                    return Err(make_err!(Code::Unavailable, "catching up"));
                }
                Ok(())
            }
        })
        .await?;
    assert_eq!(run_count.load(Ordering::Relaxed), 4);

    Ok(())
}

#[ibctest_test]
async fn cancelled_context_interrupts_hung_probe() -> Result<(), Error> {
    let retrier = no_sleep_retrier(config(5, Backoff::Exponential));
    let ctx = Context::background();
    let probe_ctx = ctx.clone();
    let result = retrier
        .poll_until_ready(&ctx, || {
            probe_ctx.cancel();
            pending::<Result<(), Error>>()
        })
        .await;
    assert_eq!(result.unwrap_err().code, Code::Cancelled);

    Ok(())
}

#[ibctest_test(start_paused = true)]
async fn deadline_interrupts_backoff_sleep() -> Result<(), Error> {
    let retrier = Retrier::from_config(RetryConfig {
        max_retries: 10,
        delay: Duration::from_secs(60),
        backoff: Backoff::Fixed,
        jitter: 0.0,
    });
    let ctx = Context::background().with_timeout(Duration::from_secs(5));
    let result = retrier
        .poll_until_ready(&ctx, || async {
            Err(make_err!(Code::Unavailable, "connection refused"))
        })
        .await;
    let err = result.unwrap_err();
    assert_eq!(err.code, Code::DeadlineExceeded);
    assert!(
        err.message_string().contains("connection refused"),
        "last probe error missing from {err}"
    );

    Ok(())
}
