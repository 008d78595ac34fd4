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

//! Reading and writing single files in volumes that may not be mounted
//! by any running container.

use std::sync::Arc;

use bytes::Bytes;
use ibctest_config::ContainerImage;
use ibctest_error::{Error, ResultExt, error_if};
use ibctest_util::context::Context;

use crate::archive::{ArchiveBuilder, first_file_content};
use crate::job::{ArchiveUpload, CommandSpec, JobOptions, JobRunner, remove_in_background_if_late};
use crate::names::{ROOT_USER, cleanup_labels, random_suffix, sanitize_container_name};
use crate::runtime::{ContainerRuntime, ContainerSpec};

/// Where the utility container mounts the volume.
pub const VOLUME_MOUNT_PATH: &str = "/mnt/dockervolume";

fn volume_path(rel_path: &str) -> Result<String, Error> {
    let trimmed = rel_path.trim_start_matches('/');
    error_if!(
        trimmed.is_empty() || trimmed.split('/').any(|part| part == ".."),
        "invalid path {rel_path:?} inside volume"
    );
    Ok(format!("{VOLUME_MOUNT_PATH}/{trimmed}"))
}

fn volume_bind(volume: &str) -> String {
    format!("{volume}:{VOLUME_MOUNT_PATH}")
}

/// Writes files into volumes through a short-lived utility container.
#[derive(Debug, Clone)]
pub struct FileWriter {
    jobs: JobRunner,
}

impl FileWriter {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, image: ContainerImage, run_id: &str) -> Self {
        let prefix = format!("ibctest-writefile-{}", sanitize_container_name(run_id));
        Self {
            jobs: JobRunner::new(runtime, image, run_id, prefix),
        }
    }

    /// Writes `content` to `rel_path` inside `volume`, owned by `owner`
    /// (`uid:gid`).
    pub async fn write_file(
        &self,
        ctx: &Context,
        volume: &str,
        rel_path: &str,
        content: impl Into<Bytes>,
        owner: &str,
    ) -> Result<(), Error> {
        let target = volume_path(rel_path)?;
        let archive = ArchiveBuilder::new(ROOT_USER)
            .file(rel_path, content)?
            .build()?;
        let command = CommandSpec::new([
            "sh",
            "-c",
            r#"chown "$2" "$1""#,
            "_",
            target.as_str(),
            owner,
        ]);
        self.jobs
            .run(
                ctx,
                &command,
                JobOptions {
                    name_detail: "write".to_string(),
                    entrypoint: Some(Vec::new()),
                    user: Some(ROOT_USER.to_string()),
                    binds: vec![volume_bind(volume)],
                    archive: Some(ArchiveUpload {
                        path: VOLUME_MOUNT_PATH.to_string(),
                        content: archive,
                    }),
                    ..JobOptions::default()
                },
            )
            .await
            .into_output()
            .err_tip(|| format!("while writing {rel_path} into volume {volume}"))?;
        Ok(())
    }
}

/// Reads files out of volumes through a created, never started, utility
/// container.
#[derive(Debug, Clone)]
pub struct FileRetriever {
    runtime: Arc<dyn ContainerRuntime>,
    image: ContainerImage,
    run_id: String,
}

impl FileRetriever {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, image: ContainerImage, run_id: &str) -> Self {
        Self {
            runtime,
            image,
            run_id: run_id.to_string(),
        }
    }

    /// Content of the single file at `rel_path` inside `volume`.
    pub async fn single_file_content(
        &self,
        ctx: &Context,
        volume: &str,
        rel_path: &str,
    ) -> Result<Bytes, Error> {
        let source = volume_path(rel_path)?;
        let name = format!(
            "ibctest-getfile-{}-{}",
            sanitize_container_name(&self.run_id),
            random_suffix(5)
        );
        let spec = ContainerSpec {
            name: name.clone(),
            image: self.image.reference(),
            entrypoint: Some(Vec::new()),
            cmd: vec!["true".to_string()],
            labels: cleanup_labels(&self.run_id),
            binds: vec![volume_bind(volume)],
            ..ContainerSpec::default()
        };
        let id = ctx
            .run(self.runtime.create_container(&spec))
            .await
            .err_tip(|| format!("while creating container {name} to read {rel_path}"))?;

        let archive = ctx
            .run(self.runtime.download_archive(&id, &source))
            .await
            .err_tip(|| format!("while copying {rel_path} out of volume {volume}"));
        remove_in_background_if_late(
            ctx,
            self.runtime.clone(),
            id,
            name,
            "failed to remove file retriever container",
        )
        .await;
        first_file_content(&archive?).err_tip(|| format!("while reading {rel_path} from archive"))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn volume_path_joins_under_mount() -> Result<(), Error> {
        assert_eq!(volume_path("config/genesis.json")?, "/mnt/dockervolume/config/genesis.json");
        assert_eq!(volume_path("/a.txt")?, "/mnt/dockervolume/a.txt");
        Ok(())
    }

    #[test]
    fn volume_path_rejects_escapes() {
        assert!(volume_path("../etc/passwd").is_err());
        assert!(volume_path("").is_err());
    }
}
