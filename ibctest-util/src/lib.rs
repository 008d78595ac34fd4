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

pub mod context;
pub mod retry;

use ibctest_error::{Code, Error, make_err};

// Re-export tracing mostly for use in macros.
pub use tracing as __tracing;

/// Environment variable selecting the log format: `pretty`, `compact` or `json`.
pub const LOG_FORMAT_ENV: &str = "IBCTEST_LOG";

/// Initialize tracing. Verbosity comes from `RUST_LOG` and defaults to `warn`.
pub fn init_tracing() -> Result<(), Error> {
    static LOGGING_INITIALIZED: parking_lot::Mutex<bool> = parking_lot::Mutex::new(false);
    let mut logging_initialized_guard = LOGGING_INITIALIZED.lock();
    if *logging_initialized_guard {
        return Err(make_err!(Code::Internal, "Logging already initialized"));
    }
    *logging_initialized_guard = true;
    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::metadata::LevelFilter::WARN.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt().with_env_filter(env_filter);
    let result = match std::env::var(LOG_FORMAT_ENV).as_deref() {
        Ok("pretty") => builder.pretty().try_init(),
        Ok("json") => builder.json().try_init(),
        _ => builder.compact().try_init(),
    };
    result.map_err(|e| make_err!(Code::Internal, "Could not install tracing subscriber: {e}"))
}
