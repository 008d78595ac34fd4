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

use core::time::Duration;
use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, InspectContainerOptions,
    ListContainersOptions, LogOutput, LogsOptions, NetworkingConfig, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, UploadToContainerOptions, WaitContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{EndpointSettings, HostConfig};
use bollard::volume::{CreateVolumeOptions, ListVolumesOptions, RemoveVolumeOptions};
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt, TryStreamExt};
use ibctest_config::DockerConfig;
use ibctest_error::{Code, Error, ResultExt, make_err};
use tracing::debug;

use crate::runtime::{ContainerInspection, ContainerRuntime, ContainerSpec, LogTail, ProcessOutput};

/// [`ContainerRuntime`] backed by the docker engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub const fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connects using `config.host`, or the local defaults (`DOCKER_HOST`,
    /// then the platform socket) when it is unset.
    pub fn connect(config: &DockerConfig) -> Result<Self, Error> {
        let timeout = config.connect_timeout.as_secs();
        let docker = match config.host.as_deref() {
            None => Docker::connect_with_local_defaults(),
            Some(host) if host.starts_with("unix://") => Docker::connect_with_socket(
                host.trim_start_matches("unix://"),
                timeout,
                bollard::API_DEFAULT_VERSION,
            ),
            Some(host) => Docker::connect_with_http(host, timeout, bollard::API_DEFAULT_VERSION),
        }
        .err_tip(|| format!("while connecting to docker at {:?}", config.host))?;
        Ok(Self::new(docker))
    }

    pub async fn ping(&self) -> Result<(), Error> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .err_tip(|| "while pinging docker daemon")
    }
}

/// Splits a multiplexed log stream into stdout and stderr.
async fn demux_logs<S>(stream: S) -> Result<(Bytes, Bytes), bollard::errors::Error>
where
    S: Stream<Item = Result<LogOutput, bollard::errors::Error>>,
{
    let mut stdout = BytesMut::new();
    let mut stderr = BytesMut::new();
    let mut stream = core::pin::pin!(stream);
    while let Some(frame) = stream.next().await {
        match frame? {
            LogOutput::StdOut { message } | LogOutput::Console { message } => {
                stdout.extend_from_slice(&message);
            }
            LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
            LogOutput::StdIn { .. } => {}
        }
    }
    Ok((stdout.freeze(), stderr.freeze()))
}

fn label_filter(label: &str, value: &str) -> HashMap<String, Vec<String>> {
    HashMap::from([("label".to_string(), vec![format!("{label}={value}")])])
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn pull_image(&self, image: &str) -> Result<(), Error> {
        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };
        self.docker
            .create_image(Some(options), None, None)
            .try_for_each(|info| {
                if let Some(status) = info.status {
                    debug!(image, %status, "pull progress");
                }
                futures::future::ready(Ok(()))
            })
            .await
            .err_tip(|| format!("while pulling image {image}"))
    }

    async fn create_volume(&self, labels: HashMap<String, String>) -> Result<String, Error> {
        let volume = self
            .docker
            .create_volume(CreateVolumeOptions {
                labels,
                ..Default::default()
            })
            .await
            .err_tip(|| "while creating volume")?;
        Ok(volume.name)
    }

    async fn remove_volume(&self, name: &str) -> Result<(), Error> {
        self.docker
            .remove_volume(name, Some(RemoveVolumeOptions { force: true }))
            .await
            .err_tip(|| format!("while removing volume {name}"))
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, Error> {
        let exposed_ports = (!spec.exposed_ports.is_empty()).then(|| {
            spec.exposed_ports
                .iter()
                .map(|port| (port.clone(), HashMap::new()))
                .collect()
        });
        let networking_config = spec.network_id.as_ref().map(|network_id| NetworkingConfig {
            endpoints_config: HashMap::from([(network_id.clone(), EndpointSettings::default())]),
        });
        let config = Config {
            image: Some(spec.image.clone()),
            entrypoint: spec.entrypoint.clone(),
            cmd: Some(spec.cmd.clone()),
            env: Some(spec.env.clone()),
            user: spec.user.clone(),
            hostname: spec.hostname.clone(),
            labels: Some(spec.labels.clone()),
            exposed_ports,
            host_config: Some(HostConfig {
                binds: Some(spec.binds.clone()),
                publish_all_ports: Some(spec.publish_all_ports),
                ..Default::default()
            }),
            networking_config,
            ..Default::default()
        };
        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .err_tip(|| format!("while creating container {}", spec.name))?;
        for warning in &response.warnings {
            debug!(container = %spec.name, %warning, "container create warning");
        }
        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), Error> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .err_tip(|| format!("while starting container {id}"))
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> Result<(), Error> {
        let options = StopContainerOptions {
            t: i64::try_from(grace.as_secs()).unwrap_or(i64::MAX),
        };
        self.docker
            .stop_container(id, Some(options))
            .await
            .err_tip(|| format!("while stopping container {id}"))
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), Error> {
        let options = RemoveContainerOptions {
            force,
            ..Default::default()
        };
        self.docker
            .remove_container(id, Some(options))
            .await
            .err_tip(|| format!("while removing container {id}"))
    }

    async fn upload_archive(&self, id: &str, path: &str, archive: Bytes) -> Result<(), Error> {
        let options = UploadToContainerOptions {
            path: path.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(id, Some(options), archive)
            .await
            .err_tip(|| format!("while copying archive to {id}:{path}"))
    }

    async fn download_archive(&self, id: &str, path: &str) -> Result<Bytes, Error> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let chunks: Vec<Bytes> = self
            .docker
            .download_from_container(id, Some(options))
            .try_collect()
            .await
            .err_tip(|| format!("while copying {path} from container {id}"))?;
        Ok(chunks.concat().into())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, Error> {
        let options = WaitContainerOptions {
            condition: "not-running".to_string(),
        };
        let mut stream = core::pin::pin!(self.docker.wait_container(id, Some(options)));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // A non-zero exit is reported as an error by the client.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(err)) => Err(err).err_tip(|| format!("while waiting for container {id}")),
            None => Err(make_err!(
                Code::Internal,
                "wait stream for container {id} ended without a status"
            )),
        }
    }

    async fn container_logs(&self, id: &str, tail: LogTail) -> Result<(Bytes, Bytes), Error> {
        let tail = match tail {
            LogTail::All => "all".to_string(),
            LogTail::Lines(lines) => lines.to_string(),
        };
        let options = LogsOptions {
            stdout: true,
            stderr: true,
            tail,
            ..Default::default()
        };
        demux_logs(self.docker.logs(id, Some(options)))
            .await
            .err_tip(|| format!("while reading logs of container {id}"))
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspection, Error> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .err_tip(|| format!("while inspecting container {id}"))?;
        let state = response.state.unwrap_or_default();
        let mut host_ports = HashMap::new();
        let ports = response
            .network_settings
            .and_then(|settings| settings.ports)
            .unwrap_or_default();
        for (port, bindings) in ports {
            let Some(binding) = bindings.into_iter().flatten().next() else {
                continue;
            };
            let Some(host_port) = binding.host_port else {
                continue;
            };
            let host_ip = match binding.host_ip.as_deref() {
                None | Some("" | "0.0.0.0" | "::") => "127.0.0.1".to_string(),
                Some(ip) => ip.to_string(),
            };
            host_ports.insert(port, format!("{host_ip}:{host_port}"));
        }
        Ok(ContainerInspection {
            id: response.id.unwrap_or_else(|| id.to_string()),
            name: response
                .name
                .unwrap_or_default()
                .trim_start_matches('/')
                .to_string(),
            args: response.args.unwrap_or_default(),
            running: state.running.unwrap_or(false),
            exit_code: state.exit_code.unwrap_or_default(),
            started_at: state.started_at.unwrap_or_default(),
            finished_at: state.finished_at.unwrap_or_default(),
            host_ports,
        })
    }

    async fn exec(
        &self,
        id: &str,
        cmd: &[String],
        env: &[String],
        user: Option<&str>,
    ) -> Result<ProcessOutput, Error> {
        let options = CreateExecOptions {
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            cmd: Some(cmd.to_vec()),
            env: Some(env.to_vec()),
            user: user.map(ToString::to_string),
            ..Default::default()
        };
        let exec = self
            .docker
            .create_exec(id, options)
            .await
            .err_tip(|| format!("while creating exec in container {id}"))?;
        let (stdout, stderr) = match self
            .docker
            .start_exec(&exec.id, None)
            .await
            .err_tip(|| format!("while starting exec in container {id}"))?
        {
            StartExecResults::Attached { output, .. } => demux_logs(output)
                .await
                .err_tip(|| format!("while reading exec output in container {id}"))?,
            StartExecResults::Detached => (Bytes::new(), Bytes::new()),
        };
        let inspection = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .err_tip(|| format!("while inspecting exec in container {id}"))?;
        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code: inspection.exit_code.unwrap_or_default(),
        })
    }

    async fn list_labeled_containers(&self, label: &str, value: &str) -> Result<Vec<String>, Error> {
        let options = ListContainersOptions {
            all: true,
            filters: label_filter(label, value),
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .err_tip(|| format!("while listing containers labeled {label}={value}"))?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }

    async fn list_labeled_volumes(&self, label: &str, value: &str) -> Result<Vec<String>, Error> {
        let options = ListVolumesOptions {
            filters: label_filter(label, value),
        };
        let response = self
            .docker
            .list_volumes(Some(options))
            .await
            .err_tip(|| format!("while listing volumes labeled {label}={value}"))?;
        Ok(response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|volume| volume.name)
            .collect())
    }
}
