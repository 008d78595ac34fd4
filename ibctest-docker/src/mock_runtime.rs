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

//! In-memory [`ContainerRuntime`] for tests.
//!
//! Volumes hold real file contents so archives uploaded through one
//! container can be downloaded through another. What a started container
//! "does" is decided by a handler closure.

use core::fmt;
use core::time::Duration;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use ibctest_error::{Code, Error, ResultExt, make_err};
use parking_lot::Mutex;

use crate::archive::ArchiveBuilder;
use crate::names::ROOT_USER;
use crate::runtime::{ContainerInspection, ContainerRuntime, ContainerSpec, LogTail, ProcessOutput};

/// Gateway operations, for failure injection and call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    PullImage,
    CreateVolume,
    RemoveVolume,
    CreateContainer,
    StartContainer,
    StopContainer,
    RemoveContainer,
    UploadArchive,
    DownloadArchive,
    WaitContainer,
    ContainerLogs,
    InspectContainer,
    Exec,
    ListContainers,
    ListVolumes,
}

/// One recorded gateway call. `target` is the image, volume, container
/// name or container id the call was about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub op: MockOp,
    pub target: String,
}

/// What a started container or exec'd process does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOutcome {
    Exit {
        exit_code: i64,
        stdout: Bytes,
        stderr: Bytes,
    },
    /// Never terminates on its own.
    Hang,
}

impl MockOutcome {
    pub fn success(stdout: impl Into<Bytes>) -> Self {
        Self::Exit {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: Bytes::new(),
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<Bytes>) -> Self {
        Self::Exit {
            exit_code,
            stdout: Bytes::new(),
            stderr: stderr.into(),
        }
    }
}

/// Decides the outcome of a container from its name and command.
pub type OutcomeFn = Arc<dyn Fn(&str, &[String]) -> MockOutcome + Send + Sync>;

/// A file stored in a mock volume, with the archive metadata it came with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockFile {
    pub content: Bytes,
    pub mode: u32,
    pub owner: String,
}

#[derive(Debug, Default)]
struct MockVolume {
    labels: HashMap<String, String>,
    files: HashMap<String, MockFile>,
}

#[derive(Debug)]
struct MockContainer {
    spec: ContainerSpec,
    running: bool,
    outcome: Option<MockOutcome>,
    host_ports: HashMap<String, String>,
    started_at: Option<SystemTime>,
    finished_at: Option<SystemTime>,
    /// Files extracted outside any bound volume, by absolute path.
    local_files: HashMap<String, MockFile>,
}

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    next_host_port: u16,
    volumes: HashMap<String, MockVolume>,
    containers: HashMap<String, MockContainer>,
    created: Vec<ContainerSpec>,
    calls: Vec<MockCall>,
    failures: HashMap<MockOp, Error>,
    hangs: HashSet<MockOp>,
}

enum Location {
    Volume { volume: String, rel: String },
    Local(String),
}

/// Resolves `path` inside the container to the volume bound over it.
fn resolve(spec: &ContainerSpec, path: &str) -> Location {
    for bind in &spec.binds {
        let Some((volume, mount)) = bind.split_once(':') else {
            continue;
        };
        let mount = mount.trim_end_matches('/');
        if path == mount {
            return Location::Volume {
                volume: volume.to_string(),
                rel: String::new(),
            };
        }
        if let Some(rel) = path.strip_prefix(mount).and_then(|rest| rest.strip_prefix('/')) {
            return Location::Volume {
                volume: volume.to_string(),
                rel: rel.to_string(),
            };
        }
    }
    Location::Local(path.to_string())
}

fn join(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
}

fn rfc3339(time: Option<SystemTime>) -> String {
    time.map_or_else(
        || "0001-01-01T00:00:00Z".to_string(),
        |time| humantime::format_rfc3339_nanos(time).to_string(),
    )
}

/// In-memory container runtime.
#[derive(Clone)]
pub struct MockRuntime {
    state: Arc<Mutex<MockState>>,
    outcome_fn: Arc<Mutex<OutcomeFn>>,
}

impl fmt::Debug for MockRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockRuntime")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRuntime {
    /// Every container exits 0 without output.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_host_port: 32768,
                ..MockState::default()
            })),
            outcome_fn: Arc::new(Mutex::new(Arc::new(|_, _| MockOutcome::success(Bytes::new())))),
        }
    }

    pub fn set_outcome_fn<F>(&self, outcome_fn: F)
    where
        F: Fn(&str, &[String]) -> MockOutcome + Send + Sync + 'static,
    {
        *self.outcome_fn.lock() = Arc::new(outcome_fn);
    }

    /// Makes every future call of `op` fail with `error`.
    pub fn fail(&self, op: MockOp, error: Error) {
        self.state.lock().failures.insert(op, error);
    }

    /// Makes every future call of `op` hang.
    pub fn hang(&self, op: MockOp) {
        self.state.lock().hangs.insert(op);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failures.clear();
        state.hangs.clear();
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, op: MockOp) -> usize {
        self.state.lock().calls.iter().filter(|call| call.op == op).count()
    }

    pub fn volume_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().volumes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Names of containers that currently exist.
    pub fn container_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .containers
            .values()
            .map(|container| container.spec.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Spec of the existing container named `name`.
    pub fn container_spec(&self, name: &str) -> Option<ContainerSpec> {
        self.state
            .lock()
            .containers
            .values()
            .find(|container| container.spec.name == name)
            .map(|container| container.spec.clone())
    }

    /// Specs of every container ever created, in creation order.
    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.state.lock().created.clone()
    }

    pub fn volume_file(&self, volume: &str, rel_path: &str) -> Option<MockFile> {
        self.state
            .lock()
            .volumes
            .get(volume)
            .and_then(|v| v.files.get(rel_path.trim_start_matches('/')))
            .cloned()
    }

    /// Seeds a file, as if a container had written it.
    pub fn put_volume_file(&self, volume: &str, rel_path: &str, content: impl Into<Bytes>) -> Result<(), Error> {
        let mut state = self.state.lock();
        let volume = state
            .volumes
            .get_mut(volume)
            .ok_or_else(|| make_err!(Code::NotFound, "no such volume: {volume}"))?;
        volume.files.insert(
            rel_path.trim_start_matches('/').to_string(),
            MockFile {
                content: content.into(),
                mode: 0o644,
                owner: ROOT_USER.to_string(),
            },
        );
        Ok(())
    }

    /// Records the call and applies injected failures and hangs.
    async fn enter(&self, op: MockOp, target: &str) -> Result<(), Error> {
        let (failure, hang) = {
            let mut state = self.state.lock();
            state.calls.push(MockCall {
                op,
                target: target.to_string(),
            });
            (state.failures.get(&op).cloned(), state.hangs.contains(&op))
        };
        if hang {
            futures::future::pending::<()>().await;
        }
        failure.map_or(Ok(()), Err)
    }

    fn next_id(state: &mut MockState, kind: &str) -> String {
        state.next_id += 1;
        format!("mock-{kind}-{}", state.next_id)
    }
}

fn no_container(id: &str) -> Error {
    make_err!(Code::NotFound, "No such container: {id}")
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn pull_image(&self, image: &str) -> Result<(), Error> {
        self.enter(MockOp::PullImage, image).await
    }

    async fn create_volume(&self, labels: HashMap<String, String>) -> Result<String, Error> {
        self.enter(MockOp::CreateVolume, "").await?;
        let mut state = self.state.lock();
        let name = Self::next_id(&mut state, "volume");
        state.volumes.insert(
            name.clone(),
            MockVolume {
                labels,
                ..MockVolume::default()
            },
        );
        Ok(name)
    }

    async fn remove_volume(&self, name: &str) -> Result<(), Error> {
        self.enter(MockOp::RemoveVolume, name).await?;
        let mut state = self.state.lock();
        let in_use = state.containers.values().any(|container| {
            container
                .spec
                .binds
                .iter()
                .any(|bind| bind.split_once(':').is_some_and(|(volume, _)| volume == name))
        });
        if in_use {
            return Err(make_err!(Code::AlreadyExists, "volume is in use: {name}"));
        }
        state
            .volumes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| make_err!(Code::NotFound, "no such volume: {name}"))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, Error> {
        self.enter(MockOp::CreateContainer, &spec.name).await?;
        let mut state = self.state.lock();
        if state.containers.values().any(|c| c.spec.name == spec.name) {
            return Err(make_err!(
                Code::AlreadyExists,
                "Conflict. The container name \"/{}\" is already in use",
                spec.name
            ));
        }
        for bind in &spec.binds {
            let volume = bind.split_once(':').map_or(bind.as_str(), |(volume, _)| volume);
            if !state.volumes.contains_key(volume) {
                return Err(make_err!(Code::NotFound, "no such volume: {volume}"));
            }
        }
        let mut host_ports = HashMap::new();
        if spec.publish_all_ports {
            for port in &spec.exposed_ports {
                let host_port = state.next_host_port;
                state.next_host_port += 1;
                host_ports.insert(port.clone(), format!("127.0.0.1:{host_port}"));
            }
        }
        let id = Self::next_id(&mut state, "container");
        state.created.push(spec.clone());
        state.containers.insert(
            id.clone(),
            MockContainer {
                spec: spec.clone(),
                running: false,
                outcome: None,
                host_ports,
                started_at: None,
                finished_at: None,
                local_files: HashMap::new(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), Error> {
        self.enter(MockOp::StartContainer, id).await?;
        let outcome_fn = self.outcome_fn.lock().clone();
        let mut state = self.state.lock();
        let container = state.containers.get_mut(id).ok_or_else(|| no_container(id))?;
        let outcome = outcome_fn(&container.spec.name, &container.spec.cmd);
        container.running = true;
        container.outcome = Some(outcome);
        container.started_at = Some(SystemTime::now());
        container.finished_at = None;
        Ok(())
    }

    async fn stop_container(&self, id: &str, _grace: Duration) -> Result<(), Error> {
        self.enter(MockOp::StopContainer, id).await?;
        let mut state = self.state.lock();
        let container = state.containers.get_mut(id).ok_or_else(|| no_container(id))?;
        if container.running {
            container.running = false;
            container.finished_at = Some(SystemTime::now());
        }
        Ok(())
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), Error> {
        self.enter(MockOp::RemoveContainer, id).await?;
        let mut state = self.state.lock();
        let running = state.containers.get(id).ok_or_else(|| no_container(id))?.running;
        if running && !force {
            return Err(make_err!(
                Code::AlreadyExists,
                "You cannot remove a running container {id}"
            ));
        }
        state.containers.remove(id);
        Ok(())
    }

    async fn upload_archive(&self, id: &str, path: &str, archive: Bytes) -> Result<(), Error> {
        self.enter(MockOp::UploadArchive, id).await?;
        let mut files = Vec::new();
        let mut reader = tar::Archive::new(archive.as_ref());
        for entry in reader.entries().err_tip(|| "while reading uploaded archive")? {
            let mut entry = entry.err_tip(|| "while reading uploaded archive entry")?;
            let header = entry.header();
            if header.entry_type() != tar::EntryType::Regular {
                continue;
            }
            let mode = header.mode().err_tip(|| "while reading entry mode")?;
            let owner = header
                .username()
                .ok()
                .flatten()
                .unwrap_or_default()
                .to_string();
            let entry_path = entry
                .path()
                .err_tip(|| "while reading entry path")?
                .to_string_lossy()
                .into_owned();
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .err_tip(|| "while reading entry content")?;
            files.push((
                join(path, &entry_path),
                MockFile {
                    content: Bytes::from(content),
                    mode,
                    owner,
                },
            ));
        }

        let mut state = self.state.lock();
        let spec = state
            .containers
            .get(id)
            .ok_or_else(|| no_container(id))?
            .spec
            .clone();
        for (full_path, file) in files {
            match resolve(&spec, &full_path) {
                Location::Volume { volume, rel } => {
                    state
                        .volumes
                        .get_mut(&volume)
                        .ok_or_else(|| make_err!(Code::NotFound, "no such volume: {volume}"))?
                        .files
                        .insert(rel, file);
                }
                Location::Local(full_path) => {
                    if let Some(container) = state.containers.get_mut(id) {
                        container.local_files.insert(full_path, file);
                    }
                }
            }
        }
        Ok(())
    }

    async fn download_archive(&self, id: &str, path: &str) -> Result<Bytes, Error> {
        self.enter(MockOp::DownloadArchive, id).await?;
        let file = {
            let state = self.state.lock();
            let container = state.containers.get(id).ok_or_else(|| no_container(id))?;
            match resolve(&container.spec, path) {
                Location::Volume { volume, rel } => state
                    .volumes
                    .get(&volume)
                    .and_then(|v| v.files.get(&rel))
                    .cloned(),
                Location::Local(path) => container.local_files.get(&path).cloned(),
            }
        };
        let file = file.ok_or_else(|| {
            make_err!(Code::NotFound, "Could not find the file {path} in container {id}")
        })?;
        let name = path.rsplit('/').next().unwrap_or(path);
        ArchiveBuilder::new(file.owner)
            .mode(file.mode)
            .file(name, file.content)?
            .build()
    }

    async fn wait_container(&self, id: &str) -> Result<i64, Error> {
        self.enter(MockOp::WaitContainer, id).await?;
        let outcome = {
            let state = self.state.lock();
            let container = state.containers.get(id).ok_or_else(|| no_container(id))?;
            container.outcome.clone()
        };
        let exit_code = match outcome {
            Some(MockOutcome::Hang) => futures::future::pending().await,
            Some(MockOutcome::Exit { exit_code, .. }) => exit_code,
            None => return Err(make_err!(Code::Internal, "container {id} was never started")),
        };
        if let Some(container) = self.state.lock().containers.get_mut(id) {
            container.running = false;
            container.finished_at = Some(SystemTime::now());
        }
        Ok(exit_code)
    }

    async fn container_logs(&self, id: &str, tail: LogTail) -> Result<(Bytes, Bytes), Error> {
        self.enter(MockOp::ContainerLogs, id).await?;
        let state = self.state.lock();
        let container = state.containers.get(id).ok_or_else(|| no_container(id))?;
        let (stdout, stderr) = match &container.outcome {
            Some(MockOutcome::Exit { stdout, stderr, .. }) => (stdout.clone(), stderr.clone()),
            Some(MockOutcome::Hang) | None => (Bytes::new(), Bytes::new()),
        };
        match tail {
            LogTail::All => Ok((stdout, stderr)),
            LogTail::Lines(lines) => Ok((tail_lines(&stdout, lines), tail_lines(&stderr, lines))),
        }
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspection, Error> {
        self.enter(MockOp::InspectContainer, id).await?;
        let state = self.state.lock();
        let container = state.containers.get(id).ok_or_else(|| no_container(id))?;
        let exit_code = match &container.outcome {
            Some(MockOutcome::Exit { exit_code, .. }) if !container.running => *exit_code,
            _ => 0,
        };
        Ok(ContainerInspection {
            id: id.to_string(),
            name: container.spec.name.clone(),
            args: container.spec.cmd.clone(),
            running: container.running,
            exit_code,
            started_at: rfc3339(container.started_at),
            finished_at: rfc3339(container.finished_at),
            host_ports: container.host_ports.clone(),
        })
    }

    async fn exec(
        &self,
        id: &str,
        cmd: &[String],
        _env: &[String],
        _user: Option<&str>,
    ) -> Result<ProcessOutput, Error> {
        self.enter(MockOp::Exec, id).await?;
        let outcome_fn = self.outcome_fn.lock().clone();
        let name = {
            let state = self.state.lock();
            let container = state.containers.get(id).ok_or_else(|| no_container(id))?;
            if !container.running {
                return Err(make_err!(Code::AlreadyExists, "Container {id} is not running"));
            }
            container.spec.name.clone()
        };
        match outcome_fn(&name, cmd) {
            MockOutcome::Hang => futures::future::pending().await,
            MockOutcome::Exit {
                exit_code,
                stdout,
                stderr,
            } => Ok(ProcessOutput {
                stdout,
                stderr,
                exit_code,
            }),
        }
    }

    async fn list_labeled_containers(&self, label: &str, value: &str) -> Result<Vec<String>, Error> {
        self.enter(MockOp::ListContainers, value).await?;
        let state = self.state.lock();
        let mut ids: Vec<String> = state
            .containers
            .iter()
            .filter(|(_, c)| c.spec.labels.get(label).is_some_and(|v| v == value))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_labeled_volumes(&self, label: &str, value: &str) -> Result<Vec<String>, Error> {
        self.enter(MockOp::ListVolumes, value).await?;
        let state = self.state.lock();
        let mut names: Vec<String> = state
            .volumes
            .iter()
            .filter(|(_, v)| v.labels.get(label).is_some_and(|l| l == value))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

fn tail_lines(output: &Bytes, lines: u64) -> Bytes {
    let text = output.as_ref();
    let trimmed = text.strip_suffix(b"\n").unwrap_or(text);
    let mut start = trimmed.len();
    let mut seen = 0;
    while start > 0 {
        if trimmed[start - 1] == b'\n' {
            seen += 1;
            if seen == lines {
                break;
            }
        }
        start -= 1;
    }
    output.slice(start..)
}
