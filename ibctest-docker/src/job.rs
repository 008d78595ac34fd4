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

use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use ibctest_config::ContainerImage;
use ibctest_error::{Code, Error, ResultExt, make_err};
use ibctest_util::context::Context;
use tracing::{debug, warn};

use crate::names::{cleanup_labels, condense_host_name, random_suffix};
use crate::reporter::{ExecReport, ExecReporter};
use crate::runtime::{ContainerRuntime, ContainerSpec, LogTail, ProcessOutput};

/// Length of the random part of one-off container names.
const JOB_NAME_SUFFIX_LEN: usize = 5;

/// Exit code recorded when the process never produced one.
pub const NO_EXIT_CODE: i64 = -1;

/// Argument vector and environment for one logical operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push(format!("{key}={value}"));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.argv.is_empty()
    }

    /// The command as a single shell-like line, for logs.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Outcome of one command invocation.
///
/// `error` is only set for runtime failures. A process that ran and exited
/// non-zero is reported through `exit_code` and `stderr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub stdout: Bytes,
    pub stderr: Bytes,
    pub exit_code: i64,
    pub error: Option<Error>,
}

impl ExecResult {
    pub const fn from_error(error: Error) -> Self {
        Self {
            stdout: Bytes::new(),
            stderr: Bytes::new(),
            exit_code: NO_EXIT_CODE,
            error: Some(error),
        }
    }

    pub fn from_output(output: ProcessOutput) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            error: None,
        }
    }

    pub const fn is_success(&self) -> bool {
        self.error.is_none() && self.exit_code == 0
    }

    /// Treats a runtime error or a non-zero exit as an error, keeping
    /// stderr in the message.
    pub fn into_output(self) -> Result<(Bytes, Bytes), Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        if self.exit_code != 0 {
            return Err(make_err!(
                Code::Aborted,
                "process exited with code {}: {}",
                self.exit_code,
                String::from_utf8_lossy(&self.stderr).trim_end()
            ));
        }
        Ok((self.stdout, self.stderr))
    }
}

/// An archive extracted into `path` of a job container before it starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveUpload {
    /// Absolute directory inside the container.
    pub path: String,
    /// Tar archive bytes.
    pub content: Bytes,
}

/// How to configure the container of a one-off job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOptions {
    /// Very short description of the job's purpose, part of its name.
    pub name_detail: String,
    /// `Some(vec![])` clears the image entrypoint.
    pub entrypoint: Option<Vec<String>>,
    /// Added after the command's own environment.
    pub env: Vec<String>,
    pub user: Option<String>,
    pub binds: Vec<String>,
    pub archive: Option<ArchiveUpload>,
}

/// Runs commands to completion in fresh, labeled, auto-removed containers.
#[derive(Debug, Clone)]
pub struct JobRunner {
    runtime: Arc<dyn ContainerRuntime>,
    image: ContainerImage,
    run_id: String,
    name_prefix: String,
    network_id: Option<String>,
}

impl JobRunner {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        image: ContainerImage,
        run_id: impl Into<String>,
        name_prefix: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            image,
            run_id: run_id.into(),
            name_prefix: name_prefix.into(),
            network_id: None,
        }
    }

    #[must_use]
    pub fn with_network(mut self, network_id: Option<String>) -> Self {
        self.network_id = network_id;
        self
    }

    pub const fn image(&self) -> &ContainerImage {
        &self.image
    }

    fn container_name(&self, detail: &str) -> String {
        let suffix = random_suffix(JOB_NAME_SUFFIX_LEN);
        if detail.is_empty() {
            format!("{}-{suffix}", self.name_prefix)
        } else {
            format!("{}-{detail}-{suffix}", self.name_prefix)
        }
    }

    /// Runs `command` and returns its outcome.
    ///
    /// If `ctx` ends while the job is running, the result carries the
    /// context error and the container is removed in the background. Any
    /// container left behind is caught by a sweep of the run label.
    pub async fn run(&self, ctx: &Context, command: &CommandSpec, options: JobOptions) -> ExecResult {
        let name = self.container_name(&options.name_detail);
        self.run_named(ctx, &name, command, options).await.0
    }

    /// Like [`JobRunner::run`], and hands exactly one [`ExecReport`] to
    /// `reporter` whatever the outcome.
    pub async fn run_reported(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        command: &CommandSpec,
        options: JobOptions,
    ) -> ExecResult {
        let name = self.container_name(&options.name_detail);
        let started_at = SystemTime::now();
        let (result, created) = self.run_named(ctx, &name, command, options).await;
        reporter.track_exec(ExecReport {
            container_name: if created { name } else { String::new() },
            command: command.argv.clone(),
            stdout: result.stdout.clone(),
            stderr: result.stderr.clone(),
            exit_code: result.exit_code,
            started_at,
            finished_at: SystemTime::now(),
            error: result.error.clone(),
        });
        result
    }

    /// Also tells whether a container was created at all.
    async fn run_named(
        &self,
        ctx: &Context,
        name: &str,
        command: &CommandSpec,
        options: JobOptions,
    ) -> (ExecResult, bool) {
        let mut env = command.env.clone();
        env.extend(options.env);
        let spec = ContainerSpec {
            name: name.to_string(),
            image: self.image.reference(),
            entrypoint: options.entrypoint,
            cmd: command.argv.clone(),
            env,
            user: options.user,
            hostname: Some(condense_host_name(name)),
            labels: cleanup_labels(&self.run_id),
            binds: options.binds,
            network_id: self.network_id.clone(),
            ..ContainerSpec::default()
        };
        debug!(container = name, command = %command.display(), "running one-off job");

        let id = match ctx
            .run(self.runtime.create_container(&spec))
            .await
            .err_tip(|| format!("while creating one-off container {name}"))
        {
            Ok(id) => id,
            Err(e) => return (ExecResult::from_error(e), false),
        };

        let result = self.run_in_container(ctx, &id, name, options.archive).await;
        self.remove_container(ctx, id, name).await;
        let result = match result {
            Ok(output) => ExecResult::from_output(output),
            Err(e) => ExecResult::from_error(e),
        };
        (result, true)
    }

    async fn run_in_container(
        &self,
        ctx: &Context,
        id: &str,
        name: &str,
        archive: Option<ArchiveUpload>,
    ) -> Result<ProcessOutput, Error> {
        if let Some(archive) = archive {
            // Content must be in place before the entrypoint sees it.
            ctx.run(self.runtime.upload_archive(id, &archive.path, archive.content))
                .await
                .err_tip(|| format!("while copying archive into {name}"))?;
        }
        ctx.run(self.runtime.start_container(id))
            .await
            .err_tip(|| format!("while starting one-off container {name}"))?;
        let exit_code = ctx
            .run(self.runtime.wait_container(id))
            .await
            .err_tip(|| format!("while waiting for one-off container {name}"))?;
        let (stdout, stderr) = ctx
            .run(self.runtime.container_logs(id, LogTail::All))
            .await
            .err_tip(|| format!("while reading logs of one-off container {name}"))?;
        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn remove_container(&self, ctx: &Context, id: String, name: &str) {
        remove_in_background_if_late(
            ctx,
            self.runtime.clone(),
            id,
            name.to_string(),
            "failed to remove one-off container",
        )
        .await;
    }
}

/// Best-effort forced removal, raced against `ctx`. Failures are logged; the
/// outcome of whatever ran in the container is already decided.
///
/// When `ctx` is already done, or ends while the daemon is still answering,
/// the removal carries on in a background task so the caller is not held
/// past its deadline.
pub(crate) async fn remove_in_background_if_late(
    ctx: &Context,
    runtime: Arc<dyn ContainerRuntime>,
    id: String,
    name: String,
    failure: &'static str,
) {
    let mut remove = Box::pin(async move {
        if let Err(err) = runtime.remove_container(&id, true).await {
            warn!(container = %name, container_id = %id, ?err, "{failure}");
        }
    });
    if ctx.err().is_some() {
        drop(tokio::spawn(remove));
        return;
    }
    let finished = tokio::select! {
        () = &mut remove => true,
        _ = ctx.done() => false,
    };
    if !finished {
        drop(tokio::spawn(remove));
    }
}
