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

use core::future::Future;
use core::time::Duration;

use ibctest_error::{Code, Error, make_err};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline scope handed to every daemon-bound call.
///
/// Children created with [`Context::with_timeout`] or
/// [`Context::with_cancel`] are cancelled with their parent and never
/// outlive the parent's deadline.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// Root context that is never cancelled on its own.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_cancel(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        Self {
            token: self.token.child_token(),
            deadline: Some(self.deadline.map_or(deadline, |d| d.min(deadline))),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The error this context resolves with, or `None` while it is live.
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            return Some(cancelled());
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(deadline_exceeded()),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = self.token.cancelled() => cancelled(),
                () = tokio::time::sleep_until(deadline) => deadline_exceeded(),
            },
            None => {
                self.token.cancelled().await;
                cancelled()
            }
        }
    }

    /// Races `fut` against this context. The future is dropped as soon as
    /// the context is done, so callers never wait on a hung daemon.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            result = fut => result,
        }
    }
}

fn cancelled() -> Error {
    make_err!(Code::Cancelled, "context cancelled")
}

fn deadline_exceeded() -> Error {
    make_err!(Code::DeadlineExceeded, "context deadline exceeded")
}
