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
use std::sync::Arc;

use bytes::Bytes;
use ibctest_config::{ChainConfig, DockerConfig, RetryConfig};
use ibctest_docker::files::FileWriter;
use ibctest_docker::names::{ROOT_USER, condense_host_name, sanitize_container_name};
use ibctest_docker::{
    CommandSpec, ContainerRuntime, DockerParticipant, ExecReporter, ExecResult, ParticipantOptions,
    ParticipantState,
};
use ibctest_error::{Code, Error, ResultExt, make_err, make_parse_err};
use ibctest_util::context::Context;
use ibctest_util::retry::Retrier;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::status::{NodeStatus, StatusClient};

pub const P2P_PORT: &str = "26656/tcp";
pub const RPC_PORT: &str = "26657/tcp";
pub const GRPC_PORT: &str = "9090/tcp";
pub const API_PORT: &str = "1317/tcp";
pub const PRIV_VAL_PORT: &str = "1234/tcp";

/// Approximate time between blocks the nodes are configured for.
pub const BLOCK_TIME: Duration = Duration::from_secs(2);

const GENESIS_FILE: &str = "config/genesis.json";
const NODE_KEY_FILE: &str = "config/node_key.json";
const CONFIG_FILE: &str = "config/config.toml";

/// Placement of one node of a chain.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Position of the node among the chain's nodes.
    pub index: usize,
    pub test_name: String,
    pub network_id: Option<String>,
    pub docker: DockerConfig,
    /// Polling policy used by [`TendermintNode::start`].
    pub readiness: RetryConfig,
}

#[derive(Deserialize)]
struct NodeKey {
    #[serde(default)]
    id: String,
}

/// A tendermint (>= 0.35) node running in a container, its home directory
/// on a volume.
#[derive(Debug)]
pub struct TendermintNode {
    index: usize,
    chain: ChainConfig,
    runtime: Arc<dyn ContainerRuntime>,
    participant: DockerParticipant,
    status_client: Arc<dyn StatusClient>,
    retrier: Retrier,
}

impl TendermintNode {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        chain: ChainConfig,
        options: NodeOptions,
        status_client: Arc<dyn StatusClient>,
    ) -> Result<Self, Error> {
        let image = chain.image()?.clone();
        let run_id = sanitize_container_name(&options.test_name);
        let name = format!("node-{}-{}-{run_id}", options.index, chain.chain_id);
        let participant = DockerParticipant::new(
            runtime.clone(),
            ParticipantOptions {
                hostname: Some(condense_host_name(&name)),
                name,
                run_id,
                user: image.uid_gid.clone(),
                image,
                pull_image: true,
                home_dir: format!("/var/tendermint/{}", chain.name),
                network_id: options.network_id,
                exposed_ports: [P2P_PORT, RPC_PORT, GRPC_PORT, API_PORT, PRIV_VAL_PORT]
                    .map(String::from)
                    .to_vec(),
                docker: options.docker,
            },
        );
        Ok(Self {
            index: options.index,
            chain,
            runtime,
            participant,
            status_client,
            retrier: Retrier::from_config(options.readiness),
        })
    }

    /// Replaces the readiness poller, e.g. with one on a fake clock.
    #[must_use]
    pub fn with_retrier(mut self, retrier: Retrier) -> Self {
        self.retrier = retrier;
        self
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    pub const fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    /// Container name, `node-{index}-{chain_id}-{test}`.
    pub fn name(&self) -> &str {
        self.participant.name()
    }

    /// Hostname other containers on the network reach the node by.
    pub fn host_name(&self) -> String {
        condense_host_name(self.name())
    }

    pub fn home_dir(&self) -> &str {
        self.participant.home_dir()
    }

    pub const fn participant(&self) -> &DockerParticipant {
        &self.participant
    }

    pub fn state(&self) -> ParticipantState {
        self.participant.state()
    }

    /// Pulls the image and prepares the home volume.
    pub async fn initialize(&self, ctx: &Context) -> Result<(), Error> {
        self.participant
            .initialize(ctx, None)
            .await
            .err_tip(|| format!("while preparing node {}", self.name()))
    }

    pub async fn exec(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        command: &CommandSpec,
    ) -> ExecResult {
        self.participant.exec(ctx, reporter, command).await
    }

    async fn run(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        command: &CommandSpec,
    ) -> Result<(Bytes, Bytes), Error> {
        self.exec(ctx, reporter, command)
            .await
            .into_output()
            .err_tip(|| format!("while running {} on {}", command.display(), self.name()))
    }

    /// Runs `{bin} init {mode} --home {home}`.
    pub async fn init_home_folder(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        mode: &str,
    ) -> Result<(), Error> {
        let command = CommandSpec::new([self.chain.bin.as_str(), "init", mode, "--home", self.home_dir()]);
        self.run(ctx, reporter, &command).await?;
        Ok(())
    }

    pub async fn init_validator_files(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        self.init_home_folder(ctx, reporter, "validator").await
    }

    pub async fn init_full_node_files(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        self.init_home_folder(ctx, reporter, "full").await
    }

    fn sed_config(&self, key: &str, value: &str) -> String {
        format!(
            r#"sed -i "/^{key} = .*/ s//{key} = {value}/" {}/{CONFIG_FILE}"#,
            self.home_dir()
        )
    }

    /// Sets block timing, relaxes peer address checks and installs
    /// `peers` as persistent peers.
    pub async fn set_config_and_peers(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        peers: &str,
    ) -> Result<(), Error> {
        let block_time = format!(r#"\"{}s\""#, BLOCK_TIME.as_secs());
        let script = [
            self.sed_config("timeout-commit", &block_time),
            self.sed_config("timeout-propose", &block_time),
            self.sed_config("allow-duplicate-ip", "true"),
            self.sed_config("addr-book-strict", "false"),
            self.sed_config("persistent-peers", &format!(r#"\"{peers}\""#)),
        ]
        .join(" && ");
        self.run(ctx, reporter, &CommandSpec::new(["sh", "-c", script.as_str()]))
            .await?;
        Ok(())
    }

    /// `host:port` the node's RPC endpoint is published on.
    pub fn rpc_address(&self) -> Result<String, Error> {
        self.participant.host_port(RPC_PORT).ok_or_else(|| {
            make_err!(
                Code::FailedPrecondition,
                "node {} has no published rpc port",
                self.name()
            )
        })
    }

    pub async fn status(&self, ctx: &Context) -> Result<NodeStatus, Error> {
        let rpc_addr = self.rpc_address()?;
        ctx.run(self.status_client.status(&rpc_addr))
            .await
            .err_tip(|| format!("while querying status of {}", self.name()))
    }

    pub async fn height(&self, ctx: &Context) -> Result<u64, Error> {
        Ok(self.status(ctx).await?.latest_block_height)
    }

    /// Starts the node and waits until its RPC answers and it has caught up.
    pub async fn start(&self, ctx: &Context, additional_flags: &[&str]) -> Result<(), Error> {
        let mut argv = vec![self.chain.bin.as_str(), "start", "--home", self.home_dir()];
        argv.extend_from_slice(additional_flags);
        let command = CommandSpec::new(argv);
        self.participant
            .start_and_wait(ctx, &command, None, &self.retrier, || async {
                let status = self.status(ctx).await?;
                if status.catching_up {
                    return Err(make_err!(
                        Code::Unavailable,
                        "still catching up at height {}",
                        status.latest_block_height
                    ));
                }
                Ok(())
            })
            .await?;
        info!(node = %self.name(), rpc = ?self.participant.host_port(RPC_PORT), "node ready");
        Ok(())
    }

    pub async fn stop(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        self.participant.stop(ctx, reporter).await
    }

    pub async fn cleanup(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        self.participant.cleanup(ctx, reporter).await
    }

    pub async fn genesis_file_content(&self, ctx: &Context) -> Result<Bytes, Error> {
        self.participant
            .read_file(ctx, GENESIS_FILE)
            .await
            .err_tip(|| format!("while reading genesis of {}", self.name()))
    }

    pub async fn overwrite_genesis_file(&self, ctx: &Context, content: impl Into<Bytes>) -> Result<(), Error> {
        let volume = self.participant.volume_name().ok_or_else(|| {
            make_err!(Code::FailedPrecondition, "node {} has no volume", self.name())
        })?;
        let owner = self
            .participant
            .options()
            .user
            .as_deref()
            .unwrap_or(ROOT_USER);
        FileWriter::new(
            self.runtime.clone(),
            self.participant.options().docker.utility_image.clone(),
            &self.participant.options().run_id,
        )
        .write_file(ctx, &volume, GENESIS_FILE, content, owner)
        .await
        .err_tip(|| format!("while overwriting genesis of {}", self.name()))
    }

    /// The node's p2p id, read from its node key.
    pub async fn node_id(&self, ctx: &Context) -> Result<String, Error> {
        let content = self
            .participant
            .read_file(ctx, NODE_KEY_FILE)
            .await
            .err_tip(|| format!("while reading node key of {}", self.name()))?;
        let key: NodeKey = serde_json::from_slice(&content)
            .err_tip(|| format!("while parsing node key of {}", self.name()))?;
        if key.id.is_empty() {
            return Err(make_parse_err!("node key of {} has no id", self.name()));
        }
        Ok(key.id)
    }
}

/// Persistent peer list for the node at `self_index`: every other node as
/// `{id}@{host}:26656`.
pub async fn peer_string(ctx: &Context, nodes: &[TendermintNode], self_index: usize) -> Result<String, Error> {
    let mut peers = Vec::with_capacity(nodes.len());
    for node in nodes.iter().filter(|node| node.index() != self_index) {
        let id = node.node_id(ctx).await?;
        let peer = format!("{id}@{}:26656", node.host_name());
        info!(node = %node.name(), %peer, "peering");
        peers.push(peer);
    }
    Ok(peers.join(","))
}

/// Logs the SHA-256 of every node's genesis file.
pub async fn log_genesis_hashes(ctx: &Context, nodes: &[TendermintNode]) -> Result<(), Error> {
    for node in nodes {
        let genesis = node.genesis_file_content(ctx).await?;
        let hash = hex::encode_upper(Sha256::digest(&genesis));
        info!(node = %node.name(), chain_id = %node.chain().chain_id, %hash, "genesis");
    }
    Ok(())
}
