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

//! Polkadot relay chain validators and parachain collators.

use core::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use ed25519_dalek::SigningKey;
use ibctest_config::{ChainConfig, ContainerImage, ParachainConfig};
use ibctest_docker::names::{condense_host_name, sanitize_container_name};
use ibctest_docker::{
    CommandSpec, ContainerRuntime, DockerParticipant, ExecReporter, ParticipantOptions,
    ParticipantState,
};
use ibctest_error::{Code, Error, ResultExt, make_err, make_input_err};
use ibctest_util::context::Context;
use ibctest_util::retry::Retrier;
use rand::Rng;
use serde::Deserialize;
use tracing::info;

use crate::tendermint::NodeOptions;

pub const WS_PORT: &str = "27451/tcp";
pub const RPC_PORT: &str = "27452/tcp";
pub const PROMETHEUS_PORT: &str = "27453/tcp";

/// Development accounts a node can run as, selected by node index.
pub const INDEXED_NAMES: [&str; 8] = ["alice", "bob", "charlie", "dave", "eve", "ferdie", "one", "two"];

// Protobuf `PublicKey { Type: Ed25519, Data: <32 bytes> }` header.
const PROTOBUF_KEY_PREFIX: [u8; 4] = [0x08, 0x01, 0x12, 0x20];
// Identity multihash code followed by the digest length.
const IDENTITY_MULTIHASH_PREFIX: [u8; 2] = [0x00, 0x24];

fn port_number(port: &str) -> &str {
    port.split_once('/').map_or(port, |(number, _)| number)
}

/// The libp2p identity of a substrate node.
#[derive(Clone)]
pub struct Ed25519NodeKey(SigningKey);

impl fmt::Debug for Ed25519NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ed25519NodeKey").field(&self.peer_id()).finish()
    }
}

impl Ed25519NodeKey {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self(SigningKey::from_bytes(&seed))
    }

    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill(&mut seed);
        Self::from_seed(seed)
    }

    /// The secret seed, hex encoded as `--node-key` takes it.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.0.to_bytes())
    }

    /// Base58 peer id, the identity multihash of the protobuf encoded
    /// public key.
    pub fn peer_id(&self) -> String {
        let public = self.0.verifying_key().to_bytes();
        let mut encoded =
            Vec::with_capacity(IDENTITY_MULTIHASH_PREFIX.len() + PROTOBUF_KEY_PREFIX.len() + public.len());
        encoded.extend_from_slice(&IDENTITY_MULTIHASH_PREFIX);
        encoded.extend_from_slice(&PROTOBUF_KEY_PREFIX);
        encoded.extend_from_slice(&public);
        bs58::encode(encoded).into_string()
    }
}

/// Checks that something accepts connections at an address.
#[async_trait]
pub trait Dialer: Send + Sync + fmt::Debug {
    /// `addr` is `host:port` as published by the runtime.
    async fn dial(&self, addr: &str) -> Result<(), Error>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, addr: &str) -> Result<(), Error> {
        tokio::net::TcpStream::connect(addr)
            .await
            .map(drop)
            .err_tip(|| format!("while dialing {addr}"))
    }
}

/// Participant plumbing shared by relay chain and parachain nodes.
#[derive(Debug)]
struct SubstrateNode {
    index: usize,
    dev_account: &'static str,
    node_key: Ed25519NodeKey,
    participant: DockerParticipant,
    dialer: Arc<dyn Dialer>,
    retrier: Retrier,
}

impl SubstrateNode {
    fn new(
        runtime: Arc<dyn ContainerRuntime>,
        name: String,
        image: ContainerImage,
        home_dir: String,
        options: NodeOptions,
        node_key: Ed25519NodeKey,
        dialer: Arc<dyn Dialer>,
    ) -> Result<Self, Error> {
        let dev_account = *INDEXED_NAMES.get(options.index).ok_or_else(|| {
            make_input_err!(
                "node index {} exceeds the {} development accounts",
                options.index,
                INDEXED_NAMES.len()
            )
        })?;
        let participant = DockerParticipant::new(
            runtime,
            ParticipantOptions {
                hostname: Some(condense_host_name(&name)),
                name,
                run_id: sanitize_container_name(&options.test_name),
                image,
                pull_image: true,
                home_dir,
                user: None,
                network_id: options.network_id,
                exposed_ports: [WS_PORT, RPC_PORT, PROMETHEUS_PORT].map(String::from).to_vec(),
                docker: options.docker,
            },
        );
        Ok(Self {
            index: options.index,
            dev_account,
            node_key,
            participant,
            dialer,
            retrier: Retrier::from_config(options.readiness),
        })
    }

    fn name(&self) -> &str {
        self.participant.name()
    }

    fn host_name(&self) -> String {
        condense_host_name(self.name())
    }

    fn multi_address(&self) -> String {
        format!(
            "/dns4/{}/tcp/{}/p2p/{}",
            self.host_name(),
            port_number(RPC_PORT),
            self.node_key.peer_id()
        )
    }

    /// Flags every substrate node starts with.
    fn network_flags(&self) -> Vec<String> {
        vec![
            format!("--ws-port={}", port_number(WS_PORT)),
            format!("--{}", self.dev_account),
            format!("--node-key={}", self.node_key.secret_hex()),
            "--rpc-cors=all".to_string(),
            "--unsafe-ws-external".to_string(),
            "--unsafe-rpc-external".to_string(),
            "--prometheus-external".to_string(),
            format!("--prometheus-port={}", port_number(PROMETHEUS_PORT)),
            format!("--listen-addr=/ip4/0.0.0.0/tcp/{}", port_number(RPC_PORT)),
            format!("--public-addr={}", self.multi_address()),
            "--base-path".to_string(),
            self.participant.home_dir().to_string(),
        ]
    }

    fn published(&self, port: &str) -> Result<String, Error> {
        self.participant.host_port(port).ok_or_else(|| {
            make_err!(
                Code::FailedPrecondition,
                "node {} has no published port {port}",
                self.name()
            )
        })
    }

    async fn run(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        argv: Vec<String>,
    ) -> Result<Bytes, Error> {
        let command = CommandSpec::new(argv);
        let (stdout, _) = self
            .participant
            .exec(ctx, reporter, &command)
            .await
            .into_output()
            .err_tip(|| format!("while running {} for {}", command.display(), self.name()))?;
        Ok(stdout)
    }

    /// Starts the node and waits until its websocket endpoint accepts
    /// connections.
    async fn start(&self, ctx: &Context, argv: Vec<String>) -> Result<(), Error> {
        let command = CommandSpec::new(argv);
        self.participant
            .start_and_wait(ctx, &command, None, &self.retrier, || async {
                let ws = self.published(WS_PORT)?;
                self.dialer.dial(&ws).await
            })
            .await?;
        info!(node = %self.name(), ws = ?self.participant.host_port(WS_PORT), "node ready");
        Ok(())
    }
}

/// A relay chain validator.
#[derive(Debug)]
pub struct RelayChainNode {
    chain: ChainConfig,
    node: SubstrateNode,
}

impl RelayChainNode {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        chain: ChainConfig,
        options: NodeOptions,
        node_key: Ed25519NodeKey,
        dialer: Arc<dyn Dialer>,
    ) -> Result<Self, Error> {
        let image = chain.image()?.clone();
        let name = format!(
            "relaychain-{}-{}-{}",
            options.index,
            chain.chain_id,
            sanitize_container_name(&options.test_name)
        );
        let home_dir = format!("/home/.{}", chain.name);
        let node = SubstrateNode::new(runtime, name, image, home_dir, options, node_key, dialer)?;
        Ok(Self { chain, node })
    }

    pub const fn index(&self) -> usize {
        self.node.index
    }

    pub const fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    /// Container name, `relaychain-{index}-{chain_id}-{test}`.
    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn host_name(&self) -> String {
        self.node.host_name()
    }

    pub fn home_dir(&self) -> &str {
        self.node.participant.home_dir()
    }

    pub const fn participant(&self) -> &DockerParticipant {
        &self.node.participant
    }

    pub fn state(&self) -> ParticipantState {
        self.node.participant.state()
    }

    pub fn peer_id(&self) -> String {
        self.node.node_key.peer_id()
    }

    /// `/dns4/{host}/tcp/{p2p port}/p2p/{peer id}`, the address other nodes
    /// dial.
    pub fn multi_address(&self) -> String {
        self.node.multi_address()
    }

    /// Plain chain spec, relative to the home directory.
    pub fn chain_spec_file(&self) -> String {
        format!("{}.json", self.chain.chain_id)
    }

    pub fn raw_chain_spec_file(&self) -> String {
        format!("{}-raw.json", self.chain.chain_id)
    }

    pub fn raw_chain_spec_path(&self) -> String {
        format!("{}/{}", self.home_dir(), self.raw_chain_spec_file())
    }

    pub async fn initialize(&self, ctx: &Context) -> Result<(), Error> {
        self.node
            .participant
            .initialize(ctx, None)
            .await
            .err_tip(|| format!("while preparing node {}", self.name()))
    }

    /// Builds the chain's spec and stores it in the home directory.
    pub async fn generate_chain_spec(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        let argv = vec![
            self.chain.bin.clone(),
            "build-spec".to_string(),
            format!("--chain={}", self.chain.chain_id),
            "--disable-default-bootnode".to_string(),
        ];
        let spec = self.node.run(ctx, reporter, argv).await?;
        self.node
            .participant
            .copy_file(ctx, &self.chain_spec_file(), spec)
            .await
    }

    /// Converts the stored chain spec, possibly edited since
    /// [`RelayChainNode::generate_chain_spec`], into its raw form.
    pub async fn generate_chain_spec_raw(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        let argv = vec![
            self.chain.bin.clone(),
            "build-spec".to_string(),
            format!("--chain={}/{}", self.home_dir(), self.chain_spec_file()),
            "--raw".to_string(),
        ];
        let raw = self.node.run(ctx, reporter, argv).await?;
        self.node
            .participant
            .copy_file(ctx, &self.raw_chain_spec_file(), raw)
            .await
    }

    pub async fn chain_spec_content(&self, ctx: &Context) -> Result<Bytes, Error> {
        self.node.participant.read_file(ctx, &self.chain_spec_file()).await
    }

    pub async fn overwrite_chain_spec(&self, ctx: &Context, content: impl Into<Bytes>) -> Result<(), Error> {
        self.node
            .participant
            .copy_file(ctx, &self.chain_spec_file(), content)
            .await
    }

    pub fn start_command(&self) -> Vec<String> {
        let mut argv = vec![
            self.chain.bin.clone(),
            format!("--chain={}", self.raw_chain_spec_path()),
        ];
        argv.extend(self.node.network_flags());
        argv.push("--beefy".to_string());
        argv
    }

    /// Starts the validator on the raw chain spec and waits for its
    /// websocket endpoint.
    pub async fn start(&self, ctx: &Context) -> Result<(), Error> {
        self.node.start(ctx, self.start_command()).await
    }

    pub fn ws_address(&self) -> Result<String, Error> {
        self.node.published(WS_PORT)
    }

    pub fn rpc_address(&self) -> Result<String, Error> {
        self.node.published(RPC_PORT)
    }

    pub async fn stop(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        self.node.participant.stop(ctx, reporter).await
    }

    pub async fn cleanup(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        self.node.participant.cleanup(ctx, reporter).await
    }
}

#[derive(Deserialize)]
struct ParachainSpec {
    para_id: u32,
}

/// A collator of one parachain, embedding a node of its relay chain.
#[derive(Debug)]
pub struct ParachainNode {
    relay_chain: ChainConfig,
    parachain: ParachainConfig,
    node: SubstrateNode,
}

impl ParachainNode {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        relay_chain: ChainConfig,
        parachain: ParachainConfig,
        options: NodeOptions,
        node_key: Ed25519NodeKey,
        dialer: Arc<dyn Dialer>,
    ) -> Result<Self, Error> {
        let name = format!(
            "{}-{}-{}-{}",
            parachain.bin,
            options.index,
            parachain.chain_id,
            sanitize_container_name(&options.test_name)
        );
        let home_dir = format!("/home/.{}", relay_chain.name);
        let node = SubstrateNode::new(
            runtime,
            name,
            parachain.image.clone(),
            home_dir,
            options,
            node_key,
            dialer,
        )?;
        Ok(Self {
            relay_chain,
            parachain,
            node,
        })
    }

    pub const fn index(&self) -> usize {
        self.node.index
    }

    pub const fn parachain(&self) -> &ParachainConfig {
        &self.parachain
    }

    /// Container name, `{bin}-{index}-{chain_id}-{test}`.
    pub fn name(&self) -> &str {
        self.node.name()
    }

    pub fn host_name(&self) -> String {
        self.node.host_name()
    }

    pub fn home_dir(&self) -> &str {
        self.node.participant.home_dir()
    }

    pub const fn participant(&self) -> &DockerParticipant {
        &self.node.participant
    }

    pub fn state(&self) -> ParticipantState {
        self.node.participant.state()
    }

    pub fn peer_id(&self) -> String {
        self.node.node_key.peer_id()
    }

    pub fn multi_address(&self) -> String {
        self.node.multi_address()
    }

    /// The relay chain's raw spec, shared through the home volume.
    pub fn raw_chain_spec_path(&self) -> String {
        format!("{}/{}-raw.json", self.home_dir(), self.relay_chain.chain_id)
    }

    pub async fn initialize(&self, ctx: &Context) -> Result<(), Error> {
        self.node
            .participant
            .initialize(ctx, None)
            .await
            .err_tip(|| format!("while preparing collator {}", self.name()))
    }

    fn chain_command(&self, subcommand: &str) -> Vec<String> {
        vec![
            self.parachain.bin.clone(),
            subcommand.to_string(),
            format!("--chain={}", self.parachain.chain_id),
        ]
    }

    /// The `para_id` of the parachain's spec.
    pub async fn parachain_id(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<u32, Error> {
        let spec = self.node.run(ctx, reporter, self.chain_command("build-spec")).await?;
        let spec: ParachainSpec = serde_json::from_slice(&spec)
            .err_tip(|| format!("while parsing chain spec of {}", self.parachain.chain_id))?;
        Ok(spec.para_id)
    }

    /// Hex encoded runtime wasm the relay chain registers the parachain
    /// with.
    pub async fn export_genesis_wasm(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<String, Error> {
        let wasm = self
            .node
            .run(ctx, reporter, self.chain_command("export-genesis-wasm"))
            .await?;
        Ok(String::from_utf8_lossy(&wasm).trim().to_string())
    }

    /// Hex encoded genesis head of the parachain.
    pub async fn export_genesis_state(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<String, Error> {
        let state = self
            .node
            .run(ctx, reporter, self.chain_command("export-genesis-state"))
            .await?;
        Ok(String::from_utf8_lossy(&state).trim().to_string())
    }

    /// Collator flags, then `--` and the flags of the embedded relay chain
    /// node.
    pub fn start_command(&self) -> Vec<String> {
        let mut argv = vec![self.parachain.bin.clone(), "--collator".to_string()];
        argv.extend(self.node.network_flags());
        argv.push(format!("--chain={}", self.parachain.chain_id));
        argv.extend(self.parachain.flags.iter().cloned());
        argv.push("--".to_string());
        argv.push(format!("--chain={}", self.raw_chain_spec_path()));
        argv.extend(self.parachain.relay_chain_flags.iter().cloned());
        argv
    }

    pub async fn start(&self, ctx: &Context) -> Result<(), Error> {
        self.node.start(ctx, self.start_command()).await
    }

    pub fn ws_address(&self) -> Result<String, Error> {
        self.node.published(WS_PORT)
    }

    pub fn rpc_address(&self) -> Result<String, Error> {
        self.node.published(RPC_PORT)
    }

    pub async fn stop(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        self.node.participant.stop(ctx, reporter).await
    }

    pub async fn cleanup(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        self.node.participant.cleanup(ctx, reporter).await
    }
}
