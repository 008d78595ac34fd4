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

use clap::{Parser, Subcommand};
use ibctest::config::{DockerConfig, HarnessConfig};
use ibctest::docker::docker_runtime::DockerRuntime;
use ibctest::docker::names::sanitize_container_name;
use ibctest::docker::sweep::sweep;
use ibctest::error::{Error, ResultExt};
use ibctest::util::init_tracing;
use mimalloc::MiMalloc;
use tracing::info;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Housekeeping for ibctest runs against a docker daemon.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Harness config file. Docker defaults are used when unset.
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Checks that the daemon answers.
    Ping,
    /// Removes every container and volume labeled with a run id.
    Sweep {
        /// Test name or run id; sanitized the same way test runs do.
        run_id: String,
    },
}

fn docker_config(path: Option<&str>) -> Result<DockerConfig, Error> {
    match path {
        Some(path) => Ok(HarnessConfig::from_json5_file(path)
            .err_tip(|| format!("while loading {path}"))?
            .docker),
        None => Ok(DockerConfig::default()),
    }
}

async fn run(args: Args) -> Result<(), Error> {
    let runtime = DockerRuntime::connect(&docker_config(args.config.as_deref())?)?;
    match args.command {
        Command::Ping => {
            runtime.ping().await?;
            info!("docker daemon is reachable");
        }
        Command::Sweep { run_id } => {
            let summary = sweep(&runtime, &sanitize_container_name(&run_id)).await?;
            info!(
                containers = summary.containers_removed,
                volumes = summary.volumes_removed,
                failures = summary.failures,
                "sweep finished"
            );
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn core::error::Error>> {
    init_tracing()?;
    let args = Args::parse();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(args))?;
    Ok(())
}
