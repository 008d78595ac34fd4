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

use core::fmt::Debug;
use std::time::SystemTime;

use bytes::Bytes;
use ibctest_error::Error;
use parking_lot::Mutex;

/// One observed command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecReport {
    /// Empty when no container was created.
    pub container_name: String,
    pub command: Vec<String>,
    pub stdout: Bytes,
    pub stderr: Bytes,
    pub exit_code: i64,
    pub started_at: SystemTime,
    pub finished_at: SystemTime,
    pub error: Option<Error>,
}

/// Sink for command observations. Called exactly once per invocation.
pub trait ExecReporter: Send + Sync + Debug {
    fn track_exec(&self, report: ExecReport);
}

/// Discards every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopExecReporter;

impl ExecReporter for NopExecReporter {
    fn track_exec(&self, _report: ExecReport) {}
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingExecReporter {
    reports: Mutex<Vec<ExecReport>>,
}

impl RecordingExecReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ExecReport> {
        self.reports.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ExecReporter for RecordingExecReporter {
    fn track_exec(&self, report: ExecReport) {
        self.reports.lock().push(report);
    }
}
