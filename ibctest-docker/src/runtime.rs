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
use core::time::Duration;
use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use ibctest_error::Error;

/// Everything needed to create one container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    /// Pull reference of the image.
    pub image: String,
    /// `Some(vec![])` clears the image entrypoint.
    pub entrypoint: Option<Vec<String>>,
    pub cmd: Vec<String>,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
    pub user: Option<String>,
    pub hostname: Option<String>,
    pub labels: HashMap<String, String>,
    /// `volume:/container/path` binds.
    pub binds: Vec<String>,
    /// Container ports such as `26657/tcp`.
    pub exposed_ports: Vec<String>,
    pub publish_all_ports: bool,
    pub network_id: Option<String>,
}

/// The subset of container inspection the core relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInspection {
    pub id: String,
    pub name: String,
    /// Arguments of the container's main process.
    pub args: Vec<String>,
    pub running: bool,
    pub exit_code: i64,
    /// RFC 3339 timestamps as reported by the daemon.
    pub started_at: String,
    pub finished_at: String,
    /// Container port (`26657/tcp`) to `host:port` reachable from the caller.
    pub host_ports: HashMap<String, String>,
}

/// Output of a command run inside an existing container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Bytes,
    pub stderr: Bytes,
    pub exit_code: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogTail {
    #[default]
    All,
    Lines(u64),
}

/// Thin gateway over the container runtime.
///
/// One call is one daemon round trip. Errors carry the operation name and
/// are never retried here; callers decide on retry and cleanup.
#[async_trait]
pub trait ContainerRuntime: Send + Sync + Debug {
    async fn pull_image(&self, image: &str) -> Result<(), Error>;

    /// Creates a volume and returns its runtime-assigned name.
    async fn create_volume(&self, labels: HashMap<String, String>) -> Result<String, Error>;

    async fn remove_volume(&self, name: &str) -> Result<(), Error>;

    /// Creates a container and returns its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, Error>;

    async fn start_container(&self, id: &str) -> Result<(), Error>;

    /// Sends SIGTERM and kills the container after `grace`.
    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), Error>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), Error>;

    /// Extracts a tar `archive` into directory `path` of the container.
    async fn upload_archive(&self, id: &str, path: &str, archive: Bytes) -> Result<(), Error>;

    /// Returns a tar archive holding `path` from the container.
    async fn download_archive(&self, id: &str, path: &str) -> Result<Bytes, Error>;

    /// Blocks until the container is no longer running and returns its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64, Error>;

    /// Demultiplexed `(stdout, stderr)` of the container.
    async fn container_logs(&self, id: &str, tail: LogTail) -> Result<(Bytes, Bytes), Error>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspection, Error>;

    /// Runs `cmd` inside the running container `id`.
    async fn exec(
        &self,
        id: &str,
        cmd: &[String],
        env: &[String],
        user: Option<&str>,
    ) -> Result<ProcessOutput, Error>;

    /// Ids of all containers, running or not, carrying `label=value`.
    async fn list_labeled_containers(&self, label: &str, value: &str) -> Result<Vec<String>, Error>;

    /// Names of all volumes carrying `label=value`.
    async fn list_labeled_volumes(&self, label: &str, value: &str) -> Result<Vec<String>, Error>;
}
