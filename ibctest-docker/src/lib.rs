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

//! Container orchestration for test participants: a thin runtime gateway,
//! one-off jobs, file injection and the per-participant lifecycle.

pub mod archive;
pub mod docker_runtime;
pub mod files;
pub mod job;
pub mod mock_runtime;
pub mod names;
pub mod participant;
pub mod reporter;
pub mod runtime;
pub mod sweep;

pub use job::{CommandSpec, ExecResult, JobOptions, JobRunner};
pub use participant::{DockerParticipant, ParticipantOptions, ParticipantState};
pub use reporter::{ExecReport, ExecReporter, NopExecReporter, RecordingExecReporter};
pub use runtime::ContainerRuntime;
