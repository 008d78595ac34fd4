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
use std::sync::Arc;

use bytes::Bytes;
use ibctest_config::{ChainConfig, ContainerImage, DockerConfig, RelayerConfig};
use ibctest_docker::names::sanitize_container_name;
use ibctest_docker::{
    CommandSpec, ContainerRuntime, DockerParticipant, ExecReporter, ExecResult, ParticipantOptions,
    ParticipantState,
};
use ibctest_error::{Error, ResultExt};
use ibctest_util::context::Context;
use parking_lot::Mutex;
use tracing::info;

use crate::channel::CreateChannelOptions;
use crate::commander::{RelayerCommander, commander_for};
use crate::output::{ChannelOutput, ConnectionOutput, RelayerWallet};

const INIT_TIMEOUT: Duration = Duration::from_secs(60);
const KEY_TIMEOUT: Duration = Duration::from_secs(60);
const ADD_CHAIN_TIMEOUT: Duration = Duration::from_secs(60);
const QUERY_TIMEOUT: Duration = Duration::from_secs(180);

/// How a relayer participant is placed.
#[derive(Debug, Clone)]
pub struct RelayerOptions {
    /// Test name. Sanitized into the run id and container names.
    pub test_name: String,
    pub network_id: Option<String>,
    /// Overrides the commander's default image.
    pub image: Option<ContainerImage>,
    pub pull_image: bool,
    pub docker: DockerConfig,
}

impl RelayerOptions {
    pub fn from_config(
        test_name: &str,
        network_id: Option<String>,
        config: &RelayerConfig,
        docker: &DockerConfig,
    ) -> Self {
        Self {
            test_name: test_name.to_string(),
            network_id,
            image: config.image.clone(),
            pull_image: config.pull_image,
            docker: docker.clone(),
        }
    }
}

/// A relayer binary run in containers, with its home directory on a volume.
///
/// Every command is a one-off job against the home volume except
/// [`DockerRelayer::start_relayer`], which runs the relaying loop in a
/// long-running container named `{name}-{path}`.
#[derive(Debug)]
pub struct DockerRelayer {
    commander: Arc<dyn RelayerCommander>,
    participant: DockerParticipant,
    wallets: Mutex<HashMap<String, RelayerWallet>>,
}

impl DockerRelayer {
    /// Creates the relayer for the configured kind and initializes its home.
    pub async fn from_config(
        ctx: &Context,
        runtime: Arc<dyn ContainerRuntime>,
        test_name: &str,
        network_id: Option<String>,
        config: &RelayerConfig,
        docker: &DockerConfig,
    ) -> Result<Self, Error> {
        let options = RelayerOptions::from_config(test_name, network_id, config, docker);
        Self::new(ctx, runtime, commander_for(config.kind), options).await
    }

    pub async fn new(
        ctx: &Context,
        runtime: Arc<dyn ContainerRuntime>,
        commander: Arc<dyn RelayerCommander>,
        options: RelayerOptions,
    ) -> Result<Self, Error> {
        let run_id = sanitize_container_name(&options.test_name);
        let name = format!("{}-{run_id}", commander.name());
        let home_dir = format!("/var/relayer-{}", commander.name());
        let participant = DockerParticipant::new(
            runtime,
            ParticipantOptions {
                name,
                run_id,
                image: options.image.unwrap_or_else(|| commander.default_image()),
                pull_image: options.pull_image,
                home_dir,
                user: Some(commander.docker_user().to_string()),
                network_id: options.network_id,
                exposed_ports: Vec::new(),
                hostname: None,
                docker: options.docker,
            },
        );

        participant
            .initialize(ctx, None)
            .await
            .err_tip(|| format!("while preparing {} relayer", commander.name()))?;
        if let Some(init) = commander.init(participant.home_dir())? {
            participant
                .initialize(&ctx.with_timeout(INIT_TIMEOUT), Some(&init))
                .await
                .err_tip(|| format!("while running {} relayer init", commander.name()))?;
        }
        info!(relayer = %participant.name(), "relayer initialized");

        Ok(Self {
            commander,
            participant,
            wallets: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        self.participant.name()
    }

    pub fn home_dir(&self) -> &str {
        self.participant.home_dir()
    }

    pub fn commander(&self) -> &dyn RelayerCommander {
        self.commander.as_ref()
    }

    pub const fn participant(&self) -> &DockerParticipant {
        &self.participant
    }

    pub fn state(&self) -> ParticipantState {
        self.participant.state()
    }

    /// Runs `command` as a one-off job against the relayer home.
    pub async fn exec(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        command: &CommandSpec,
    ) -> ExecResult {
        self.participant.exec(ctx, reporter, command).await
    }

    /// [`DockerRelayer::exec`] where a failed command is an error.
    async fn run(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        command: &CommandSpec,
        what: &str,
    ) -> Result<(Bytes, Bytes), Error> {
        self.exec(ctx, reporter, command)
            .await
            .into_output()
            .err_tip(|| format!("while {what} with relayer {}", self.name()))
    }

    /// Writes the chain's relayer configuration into the home directory and
    /// registers it with the relayer.
    pub async fn add_chain_configuration(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        chain: &ChainConfig,
        key_name: &str,
        rpc_addr: &str,
        grpc_addr: &str,
    ) -> Result<(), Error> {
        let ctx = ctx.with_timeout(ADD_CHAIN_TIMEOUT);
        let content = self
            .commander
            .config_content(chain, key_name, rpc_addr, grpc_addr)?;
        let file_name = format!("{}.config", chain.chain_id);
        self.participant
            .copy_file(&ctx, &file_name, content)
            .await
            .err_tip(|| format!("while writing relayer config for {}", chain.chain_id))?;
        let container_path = format!("{}/{file_name}", self.home_dir());
        let command = self
            .commander
            .add_chain_configuration(&container_path, self.home_dir());
        self.run(&ctx, reporter, &command, "adding chain configuration")
            .await?;
        Ok(())
    }

    /// Generates a new key on `chain_id` and remembers its wallet.
    pub async fn add_key(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        chain_id: &str,
        key_name: &str,
    ) -> Result<RelayerWallet, Error> {
        let command = self.commander.add_key(chain_id, key_name, self.home_dir())?;
        let (stdout, stderr) = self
            .run(&ctx.with_timeout(KEY_TIMEOUT), reporter, &command, "adding key")
            .await?;
        let wallet = self.commander.parse_add_key_output(
            &String::from_utf8_lossy(&stdout),
            &String::from_utf8_lossy(&stderr),
        )?;
        self.wallets
            .lock()
            .insert(chain_id.to_string(), wallet.clone());
        Ok(wallet)
    }

    /// Restores `key_name` on `chain_id` from `mnemonic` and returns its
    /// address.
    pub async fn restore_key(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        chain_id: &str,
        key_name: &str,
        mnemonic: &str,
    ) -> Result<String, Error> {
        let command = self
            .commander
            .restore_key(chain_id, key_name, mnemonic, self.home_dir());
        let (stdout, stderr) = self
            .run(&ctx.with_timeout(KEY_TIMEOUT), reporter, &command, "restoring key")
            .await?;
        let address = self.commander.parse_restore_key_output(
            &String::from_utf8_lossy(&stdout),
            &String::from_utf8_lossy(&stderr),
        )?;
        self.wallets.lock().insert(
            chain_id.to_string(),
            RelayerWallet {
                mnemonic: mnemonic.to_string(),
                address: address.clone(),
            },
        );
        Ok(address)
    }

    /// The wallet added or restored for `chain_id`.
    pub fn get_wallet(&self, chain_id: &str) -> Option<RelayerWallet> {
        self.wallets.lock().get(chain_id).cloned()
    }

    pub async fn generate_path(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        src_chain_id: &str,
        dst_chain_id: &str,
        path_name: &str,
    ) -> Result<(), Error> {
        let command =
            self.commander
                .generate_path(src_chain_id, dst_chain_id, path_name, self.home_dir());
        self.run(ctx, reporter, &command, "generating path").await?;
        Ok(())
    }

    /// Creates clients, a connection and a channel on `path_name`.
    pub async fn link_path(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        path_name: &str,
        opts: &CreateChannelOptions,
    ) -> Result<(), Error> {
        opts.validate()
            .err_tip(|| format!("while linking path {path_name}"))?;
        let command = self.commander.link_path(path_name, self.home_dir(), opts);
        self.run(ctx, reporter, &command, "linking path").await?;
        Ok(())
    }

    pub async fn create_channel(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        path_name: &str,
        opts: &CreateChannelOptions,
    ) -> Result<(), Error> {
        opts.validate()
            .err_tip(|| format!("while creating channel on {path_name}"))?;
        let command = self.commander.create_channel(path_name, opts, self.home_dir());
        self.run(ctx, reporter, &command, "creating channel").await?;
        Ok(())
    }

    pub async fn create_clients(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        path_name: &str,
    ) -> Result<(), Error> {
        let command = self.commander.create_clients(path_name, self.home_dir());
        self.run(ctx, reporter, &command, "creating clients").await?;
        Ok(())
    }

    pub async fn create_connections(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        path_name: &str,
    ) -> Result<(), Error> {
        let command = self.commander.create_connections(path_name, self.home_dir());
        self.run(ctx, reporter, &command, "creating connections")
            .await?;
        Ok(())
    }

    pub async fn update_clients(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        path_name: &str,
    ) -> Result<(), Error> {
        let command = self.commander.update_clients(path_name, self.home_dir());
        self.run(ctx, reporter, &command, "updating clients").await?;
        Ok(())
    }

    pub async fn flush_packets(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        path_name: &str,
        channel_id: &str,
    ) -> Result<(), Error> {
        let command = self
            .commander
            .flush_packets(path_name, channel_id, self.home_dir());
        self.run(ctx, reporter, &command, "flushing packets").await?;
        Ok(())
    }

    pub async fn flush_acknowledgements(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        path_name: &str,
        channel_id: &str,
    ) -> Result<(), Error> {
        let command =
            self.commander
                .flush_acknowledgements(path_name, channel_id, self.home_dir());
        self.run(ctx, reporter, &command, "flushing acknowledgements")
            .await?;
        Ok(())
    }

    pub async fn get_channels(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        chain_id: &str,
    ) -> Result<Vec<ChannelOutput>, Error> {
        let command = self.commander.get_channels(chain_id, self.home_dir());
        let (stdout, stderr) = self
            .run(&ctx.with_timeout(QUERY_TIMEOUT), reporter, &command, "querying channels")
            .await?;
        self.commander.parse_get_channels_output(
            &String::from_utf8_lossy(&stdout),
            &String::from_utf8_lossy(&stderr),
        )
    }

    pub async fn get_connections(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        chain_id: &str,
    ) -> Result<Vec<ConnectionOutput>, Error> {
        let command = self.commander.get_connections(chain_id, self.home_dir());
        let (stdout, stderr) = self
            .run(ctx, reporter, &command, "querying connections")
            .await?;
        self.commander.parse_get_connections_output(
            &String::from_utf8_lossy(&stdout),
            &String::from_utf8_lossy(&stderr),
        )
    }

    /// Starts relaying `path_name` in a long-running container.
    pub async fn start_relayer(&self, ctx: &Context, path_name: &str) -> Result<(), Error> {
        let command = self.commander.start_relayer(path_name, self.home_dir());
        self.participant
            .start(ctx, &command, Some(path_name))
            .await
            .err_tip(|| format!("while starting relayer on path {path_name}"))
    }

    /// Stops the relaying container. The home volume is kept.
    pub async fn stop_relayer(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        self.participant.stop(ctx, reporter).await
    }

    /// Stops the relaying container if one is running and removes the home
    /// volume.
    pub async fn cleanup(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        self.participant.cleanup(ctx, reporter).await
    }
}
