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
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use ibctest_config::{ContainerImage, DockerConfig};
use ibctest_error::{Code, Error, ResultExt, make_err};
use ibctest_util::context::Context;
use ibctest_util::retry::Retrier;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::archive::ArchiveBuilder;
use crate::files::FileRetriever;
use crate::job::{ArchiveUpload, CommandSpec, ExecResult, JobOptions, JobRunner, NO_EXIT_CODE};
use crate::names::{ROOT_USER, cleanup_labels, condense_host_name};
use crate::reporter::{ExecReport, ExecReporter};
use crate::runtime::{ContainerInspection, ContainerRuntime, ContainerSpec, LogTail};

/// Lifecycle of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    Unconfigured,
    /// Volume created and owned by the participant's user.
    Configured,
    ContainerCreated,
    Running,
    /// The long-running container is gone, the volume is kept.
    Stopped,
    /// Volume removed. Terminal.
    Removed,
}

impl fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::ContainerCreated => "container created",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Removed => "removed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ParticipantOptions {
    /// Name of the long-running container and prefix of one-off jobs.
    pub name: String,
    /// Value of the cleanup label on everything this participant creates.
    pub run_id: String,
    pub image: ContainerImage,
    pub pull_image: bool,
    /// Where the volume is mounted in every container.
    pub home_dir: String,
    /// `uid:gid` that owns the home directory. Root when unset.
    pub user: Option<String>,
    pub network_id: Option<String>,
    /// Container ports published to the host, e.g. `26657/tcp`.
    pub exposed_ports: Vec<String>,
    /// Defaults to the condensed container name.
    pub hostname: Option<String>,
    pub docker: DockerConfig,
}

#[derive(Debug, Clone)]
struct LiveContainer {
    id: String,
    name: String,
}

#[derive(Debug)]
struct Inner {
    state: ParticipantState,
    volume: Option<String>,
    container: Option<LiveContainer>,
    host_ports: HashMap<String, String>,
    init_ran: bool,
}

/// Owns the volume and long-running container of one participant.
///
/// Transitions are serialized. `exec` only reads state, so several one-off
/// jobs may run against the same volume at once.
#[derive(Debug)]
pub struct DockerParticipant {
    runtime: Arc<dyn ContainerRuntime>,
    options: ParticipantOptions,
    jobs: JobRunner,
    transition: tokio::sync::Mutex<()>,
    inner: Mutex<Inner>,
}

impl DockerParticipant {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, options: ParticipantOptions) -> Self {
        let jobs = JobRunner::new(
            runtime.clone(),
            options.image.clone(),
            options.run_id.clone(),
            options.name.clone(),
        )
        .with_network(options.network_id.clone());
        Self {
            runtime,
            options,
            jobs,
            transition: tokio::sync::Mutex::new(()),
            inner: Mutex::new(Inner {
                state: ParticipantState::Unconfigured,
                volume: None,
                container: None,
                host_ports: HashMap::new(),
                init_ran: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn home_dir(&self) -> &str {
        &self.options.home_dir
    }

    pub const fn options(&self) -> &ParticipantOptions {
        &self.options
    }

    pub fn state(&self) -> ParticipantState {
        self.inner.lock().state
    }

    pub fn volume_name(&self) -> Option<String> {
        self.inner.lock().volume.clone()
    }

    /// `host:port` where container port `port` (e.g. `26657/tcp`) is
    /// reachable from outside the network, while running.
    pub fn host_port(&self, port: &str) -> Option<String> {
        self.inner.lock().host_ports.get(port).cloned()
    }

    fn owner(&self) -> &str {
        self.options.user.as_deref().unwrap_or(ROOT_USER)
    }

    /// Home directory bind for containers of this participant.
    fn binds(&self) -> Result<Vec<String>, Error> {
        let inner = self.inner.lock();
        match (&inner.volume, inner.state) {
            (_, ParticipantState::Removed) | (None, _) => Err(make_err!(
                Code::FailedPrecondition,
                "participant {} has no volume ({})",
                self.options.name,
                inner.state
            )),
            (Some(volume), _) => Ok(vec![format!("{volume}:{}", self.options.home_dir)]),
        }
    }

    fn set_state(&self, state: ParticipantState) {
        let mut inner = self.inner.lock();
        debug!(participant = %self.options.name, from = %inner.state, to = %state, "state transition");
        inner.state = state;
    }

    /// Pulls the image, creates the volume, hands it to the participant's
    /// user and runs `init` once.
    ///
    /// Calling it again only performs the steps that have not succeeded yet.
    pub async fn initialize(&self, ctx: &Context, init: Option<&CommandSpec>) -> Result<(), Error> {
        let _guard = self.transition.lock().await;
        let (state, volume, init_ran) = {
            let inner = self.inner.lock();
            (inner.state, inner.volume.clone(), inner.init_ran)
        };
        if state == ParticipantState::Removed {
            return Err(make_err!(
                Code::FailedPrecondition,
                "participant {} was already removed",
                self.options.name
            ));
        }

        if state == ParticipantState::Unconfigured {
            if self.options.pull_image && self.options.docker.pull_images {
                let image = self.options.image.reference();
                ctx.run(self.runtime.pull_image(&image))
                    .await
                    .err_tip(|| format!("while pulling image {image}"))?;
            }

            let volume = match volume {
                Some(volume) => volume,
                None => {
                    let volume = ctx
                        .run(self.runtime.create_volume(cleanup_labels(&self.options.run_id)))
                        .await
                        .err_tip(|| format!("while creating volume for {}", self.options.name))?;
                    self.inner.lock().volume = Some(volume.clone());
                    volume
                }
            };

            // The volume is created owned by root.
            let chown = CommandSpec::new(["chown", "-R", self.owner(), self.options.home_dir.as_str()]);
            self.jobs
                .run(
                    ctx,
                    &chown,
                    JobOptions {
                        name_detail: "volume-owner".to_string(),
                        entrypoint: Some(Vec::new()),
                        user: Some(ROOT_USER.to_string()),
                        binds: vec![format!("{volume}:{}", self.options.home_dir)],
                        ..JobOptions::default()
                    },
                )
                .await
                .into_output()
                .err_tip(|| format!("while setting owner of volume {volume}"))?;
            self.set_state(ParticipantState::Configured);
            info!(participant = %self.options.name, %volume, "configured volume");
        }

        if let Some(init) = init.filter(|init| !init.is_empty() && !init_ran) {
            self.jobs
                .run(ctx, init, self.job_options("init")?)
                .await
                .into_output()
                .err_tip(|| format!("while initializing {}", self.options.name))?;
            self.inner.lock().init_ran = true;
        }
        Ok(())
    }

    fn job_options(&self, detail: &str) -> Result<JobOptions, Error> {
        Ok(JobOptions {
            name_detail: detail.to_string(),
            entrypoint: Some(Vec::new()),
            user: self.options.user.clone(),
            binds: self.binds()?,
            ..JobOptions::default()
        })
    }

    /// Runs `command` as a one-off job against the home volume and reports
    /// it to `reporter` exactly once.
    pub async fn exec(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        command: &CommandSpec,
    ) -> ExecResult {
        match self.job_options("") {
            Ok(options) => self.jobs.run_reported(ctx, reporter, command, options).await,
            Err(err) => {
                let now = SystemTime::now();
                report_error(reporter, "", command, now, err.clone());
                ExecResult::from_error(err)
            }
        }
    }

    /// Runs `command` inside the long-running container.
    pub async fn exec_in_container(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        command: &CommandSpec,
    ) -> ExecResult {
        let started_at = SystemTime::now();
        let container = {
            let inner = self.inner.lock();
            match (&inner.container, inner.state) {
                (Some(container), ParticipantState::Running) => Ok(container.clone()),
                _ => Err(make_err!(
                    Code::FailedPrecondition,
                    "participant {} is not running ({})",
                    self.options.name,
                    inner.state
                )),
            }
        };
        let container = match container {
            Ok(container) => container,
            Err(err) => {
                report_error(reporter, "", command, started_at, err.clone());
                return ExecResult::from_error(err);
            }
        };

        let result = match ctx
            .run(self.runtime.exec(
                &container.id,
                &command.argv,
                &command.env,
                self.options.user.as_deref(),
            ))
            .await
            .err_tip(|| format!("while running {} in {}", command.display(), container.name))
        {
            Ok(output) => ExecResult::from_output(output),
            Err(err) => ExecResult::from_error(err),
        };
        reporter.track_exec(ExecReport {
            container_name: container.name,
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

    /// Writes `content` to `rel_path` under the home directory.
    ///
    /// The archive is extracted into the home directory of a root job that
    /// then hands the tree back to the participant's user.
    pub async fn copy_file(
        &self,
        ctx: &Context,
        rel_path: &str,
        content: impl Into<Bytes>,
    ) -> Result<(), Error> {
        let archive = ArchiveBuilder::new(self.owner())
            .file(rel_path, content)?
            .build()?;
        let mut options = self.job_options("untar-chown")?;
        options.user = Some(ROOT_USER.to_string());
        options.archive = Some(ArchiveUpload {
            path: self.options.home_dir.clone(),
            content: archive,
        });
        let chown = CommandSpec::new(["chown", "-R", self.owner(), self.options.home_dir.as_str()]);
        self.jobs
            .run(ctx, &chown, options)
            .await
            .into_output()
            .err_tip(|| format!("while copying {rel_path} into {}", self.options.name))?;
        Ok(())
    }

    /// Content of `rel_path` under the home directory.
    pub async fn read_file(&self, ctx: &Context, rel_path: &str) -> Result<Bytes, Error> {
        let volume = self.volume_name().ok_or_else(|| {
            make_err!(
                Code::FailedPrecondition,
                "participant {} has no volume",
                self.options.name
            )
        })?;
        FileRetriever::new(
            self.runtime.clone(),
            self.options.docker.utility_image.clone(),
            &self.options.run_id,
        )
        .single_file_content(ctx, &volume, rel_path)
        .await
    }

    /// Creates and starts a new long-running container on the home volume.
    ///
    /// The container is named after the participant, or
    /// `{name}-{name_detail}` when a detail is given.
    pub async fn start(
        &self,
        ctx: &Context,
        command: &CommandSpec,
        name_detail: Option<&str>,
    ) -> Result<(), Error> {
        let _guard = self.transition.lock().await;
        let state = self.state();
        if !matches!(state, ParticipantState::Configured | ParticipantState::Stopped) {
            return Err(make_err!(
                Code::FailedPrecondition,
                "cannot start participant {} while {state}",
                self.options.name
            ));
        }
        let binds = self.binds()?;
        let name = match name_detail {
            Some(detail) => format!("{}-{detail}", self.options.name),
            None => self.options.name.clone(),
        };
        let spec = ContainerSpec {
            name: name.clone(),
            image: self.options.image.reference(),
            entrypoint: Some(Vec::new()),
            cmd: command.argv.clone(),
            env: command.env.clone(),
            user: self.options.user.clone(),
            hostname: Some(
                self.options
                    .hostname
                    .clone()
                    .unwrap_or_else(|| condense_host_name(&name)),
            ),
            labels: cleanup_labels(&self.options.run_id),
            binds,
            exposed_ports: self.options.exposed_ports.clone(),
            publish_all_ports: !self.options.exposed_ports.is_empty(),
            network_id: self.options.network_id.clone(),
        };
        info!(container = %name, command = %command.display(), "running command");

        let id = ctx
            .run(self.runtime.create_container(&spec))
            .await
            .err_tip(|| format!("while creating container {name}"))?;
        {
            let mut inner = self.inner.lock();
            inner.container = Some(LiveContainer {
                id: id.clone(),
                name: name.clone(),
            });
        }
        self.set_state(ParticipantState::ContainerCreated);

        ctx.run(self.runtime.start_container(&id))
            .await
            .err_tip(|| format!("while starting container {name}"))?;
        self.set_state(ParticipantState::Running);

        let inspection = ctx
            .run(self.runtime.inspect_container(&id))
            .await
            .err_tip(|| format!("while inspecting container {name}"))?;
        for (port, host) in &inspection.host_ports {
            debug!(container = %name, %port, %host, "published port");
        }
        self.inner.lock().host_ports = inspection.host_ports;
        Ok(())
    }

    /// [`DockerParticipant::start`], then polls `probe` with `retrier`
    /// until it succeeds.
    pub async fn start_and_wait<F, Fut>(
        &self,
        ctx: &Context,
        command: &CommandSpec,
        name_detail: Option<&str>,
        retrier: &Retrier,
        probe: F,
    ) -> Result<(), Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        self.start(ctx, command, name_detail).await?;
        retrier
            .poll_until_ready(ctx, probe)
            .await
            .err_tip(|| format!("while waiting for {} to become ready", self.options.name))
    }

    /// Stops and removes the long-running container, keeping the volume.
    ///
    /// Reports exactly once: a summary of the container's run built from its
    /// final logs and inspection, or the error that prevented one.
    pub async fn stop(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        let _guard = self.transition.lock().await;
        self.stop_locked(ctx, reporter).await
    }

    async fn stop_locked(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        let started_at = SystemTime::now();
        let container = {
            let inner = self.inner.lock();
            match (&inner.container, inner.state) {
                (
                    Some(container),
                    ParticipantState::ContainerCreated | ParticipantState::Running,
                ) => Ok(container.clone()),
                _ => Err(make_err!(
                    Code::FailedPrecondition,
                    "participant {} has no live container to stop ({})",
                    self.options.name,
                    inner.state
                )),
            }
        };
        let container = match container {
            Ok(container) => container,
            Err(err) => {
                report_error(reporter, "", &CommandSpec::default(), started_at, err.clone());
                return Err(err);
            }
        };

        let (stdout, stderr, inspection) = match self.stop_and_collect(ctx, &container).await {
            Ok(collected) => collected,
            Err(err) => {
                report_error(
                    reporter,
                    &container.name,
                    &CommandSpec::default(),
                    started_at,
                    err.clone(),
                );
                return Err(err);
            }
        };

        let (run_started_at, run_finished_at) = run_window(&container.name, &inspection);
        reporter.track_exec(ExecReport {
            container_name: inspection.name.clone(),
            command: inspection.args.clone(),
            stdout: stdout.clone(),
            stderr: stderr.clone(),
            exit_code: inspection.exit_code,
            started_at: run_started_at,
            finished_at: run_finished_at,
            error: None,
        });
        debug!(
            container_id = %container.id,
            container = %inspection.name,
            stdout = %String::from_utf8_lossy(&stdout),
            stderr = %String::from_utf8_lossy(&stderr),
            "stopped container",
        );

        ctx.run(self.runtime.remove_container(&container.id, false))
            .await
            .err_tip(|| format!("while removing container {}", container.name))?;
        {
            let mut inner = self.inner.lock();
            inner.container = None;
            inner.host_ports.clear();
        }
        self.set_state(ParticipantState::Stopped);
        Ok(())
    }

    async fn stop_and_collect(
        &self,
        ctx: &Context,
        container: &LiveContainer,
    ) -> Result<(Bytes, Bytes, ContainerInspection), Error> {
        ctx.run(
            self.runtime
                .stop_container(&container.id, self.options.docker.stop_grace_period),
        )
        .await
        .err_tip(|| format!("while stopping container {}", container.name))?;
        let (stdout, stderr) = ctx
            .run(self.runtime.container_logs(
                &container.id,
                LogTail::Lines(self.options.docker.log_tail),
            ))
            .await
            .err_tip(|| format!("while retrieving logs of {}", container.name))?;
        let inspection = ctx
            .run(self.runtime.inspect_container(&container.id))
            .await
            .err_tip(|| format!("while inspecting stopped container {}", container.name))?;
        Ok((stdout, stderr, inspection))
    }

    /// Stops the long-running container if there is one, then removes the
    /// volume. Terminal.
    pub async fn cleanup(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        let _guard = self.transition.lock().await;
        let (state, has_container) = {
            let inner = self.inner.lock();
            (inner.state, inner.container.is_some())
        };
        if state == ParticipantState::Removed {
            return Err(make_err!(
                Code::FailedPrecondition,
                "participant {} was already removed",
                self.options.name
            ));
        }
        if has_container {
            self.stop_locked(ctx, reporter).await?;
        }
        if let Some(volume) = self.volume_name() {
            ctx.run(self.runtime.remove_volume(&volume))
                .await
                .err_tip(|| format!("while removing volume {volume}"))?;
            self.inner.lock().volume = None;
            info!(participant = %self.options.name, %volume, "removed volume");
        }
        self.set_state(ParticipantState::Removed);
        Ok(())
    }
}

fn report_error(
    reporter: &dyn ExecReporter,
    container_name: &str,
    command: &CommandSpec,
    started_at: SystemTime,
    error: Error,
) {
    reporter.track_exec(ExecReport {
        container_name: container_name.to_string(),
        command: command.argv.clone(),
        stdout: Bytes::new(),
        stderr: Bytes::new(),
        exit_code: NO_EXIT_CODE,
        started_at,
        finished_at: SystemTime::now(),
        error: Some(error),
    });
}

/// Start and finish of a stopped container's run.
///
/// Timestamps that do not parse fall back to the epoch for the start and
/// now for the finish. This is a soft failure and is logged as such.
fn run_window(container: &str, inspection: &ContainerInspection) -> (SystemTime, SystemTime) {
    let started_at = humantime::parse_rfc3339_weak(&inspection.started_at).unwrap_or_else(|err| {
        warn!(%container, started_at = %inspection.started_at, ?err, "unparsable container start time, using epoch");
        UNIX_EPOCH
    });
    let finished_at = humantime::parse_rfc3339_weak(&inspection.finished_at).unwrap_or_else(|err| {
        warn!(%container, finished_at = %inspection.finished_at, ?err, "unparsable container finish time, using now");
        SystemTime::now()
    });
    (started_at, finished_at.max(started_at))
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;

    fn inspection(started_at: &str, finished_at: &str) -> ContainerInspection {
        ContainerInspection {
            started_at: started_at.to_string(),
            finished_at: finished_at.to_string(),
            ..ContainerInspection::default()
        }
    }

    #[test]
    fn run_window_parses_daemon_timestamps() {
        let (start, end) = run_window(
            "c",
            &inspection("2022-06-01T10:00:00.123456789Z", "2022-06-01T10:00:05Z"),
        );
        assert_eq!(
            end.duration_since(start).ok(),
            Some(Duration::from_millis(4877) - Duration::from_nanos(456_789))
        );
    }

    #[test]
    fn run_window_falls_back_on_garbage() {
        let before = SystemTime::now();
        let (start, end) = run_window("c", &inspection("garbage", "0001-01-01T00:00:00Z"));
        assert_eq!(start, UNIX_EPOCH);
        assert!(end >= before);
    }

    #[test]
    fn run_window_never_ends_before_start() {
        let (start, end) = run_window(
            "c",
            &inspection("2022-06-01T10:00:05Z", "2022-06-01T10:00:00Z"),
        );
        assert_eq!(start, end);
    }
}
