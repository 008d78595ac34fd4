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

use ibctest_error::{Error, ResultExt};
use tracing::{info, warn};

use crate::names::CLEANUP_LABEL;
use crate::runtime::ContainerRuntime;

/// What a [`sweep`] removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub containers_removed: usize,
    pub volumes_removed: usize,
    /// Resources that were found but could not be removed.
    pub failures: usize,
}

/// Removes every container, then every volume, labeled with `run_id`.
///
/// Containers go first so their volumes are no longer in use. Individual
/// removal failures are logged and counted; only failing to list resources
/// is an error.
pub async fn sweep(runtime: &dyn ContainerRuntime, run_id: &str) -> Result<SweepSummary, Error> {
    let mut summary = SweepSummary::default();

    let containers = runtime
        .list_labeled_containers(CLEANUP_LABEL, run_id)
        .await
        .err_tip(|| format!("while listing containers of run {run_id}"))?;
    for id in containers {
        match runtime.remove_container(&id, true).await {
            Ok(()) => summary.containers_removed += 1,
            Err(err) => {
                warn!(%run_id, container_id = %id, ?err, "failed to remove container during sweep");
                summary.failures += 1;
            }
        }
    }

    let volumes = runtime
        .list_labeled_volumes(CLEANUP_LABEL, run_id)
        .await
        .err_tip(|| format!("while listing volumes of run {run_id}"))?;
    for volume in volumes {
        match runtime.remove_volume(&volume).await {
            Ok(()) => summary.volumes_removed += 1,
            Err(err) => {
                warn!(%run_id, %volume, ?err, "failed to remove volume during sweep");
                summary.failures += 1;
            }
        }
    }

    info!(
        %run_id,
        containers = summary.containers_removed,
        volumes = summary.volumes_removed,
        failures = summary.failures,
        "swept run resources",
    );
    Ok(summary)
}
