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

use std::sync::Arc;

use bytes::Bytes;
use ibctest_config::ChainConfig;
use ibctest_docker::names::{condense_host_name, sanitize_container_name};
use ibctest_docker::{
    CommandSpec, ContainerRuntime, DockerParticipant, ExecReporter, ParticipantOptions,
    ParticipantState,
};
use ibctest_error::{Code, Error, ResultExt, make_err};
use ibctest_util::context::Context;
use serde::Serialize;
use tracing::{debug, info};

use crate::tendermint::NodeOptions;

/// ABCI port the tendermint sidecar connects to.
pub const ABCI_PORT: &str = "26658/tcp";
pub const RPC_PORT: &str = "26657/tcp";
pub const GRPC_PORT: &str = "9090/tcp";

const WALLET_EXISTS: &str = "already exists, refusing to overwrite it";
const VALIDATORS_FILE: &str = "validators.json";
const ALLOCATIONS_FILE: &str = "allocations.csv";
const GENESIS_FILE: &str = "node0/tendermint/config/genesis.json";

/// Initial balance of one address in a generated testnet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenesisAllocation {
    pub amount: u64,
    pub denom: String,
    /// Bech32m address.
    pub address: String,
}

fn allocations_csv(allocations: &[GenesisAllocation]) -> String {
    let rows: String = allocations
        .iter()
        .map(|allocation| {
            format!(
                "\"{}\",\"{}\",\"{}\"\n",
                allocation.amount, allocation.denom, allocation.address
            )
        })
        .collect();
    format!("\"amount\",\"denom\",\"address\"\n{rows}")
}

/// The `pd` application of a penumbra chain, with a `pcli` wallet in its
/// home directory.
#[derive(Debug)]
pub struct PenumbraAppNode {
    index: usize,
    chain: ChainConfig,
    participant: DockerParticipant,
}

impl PenumbraAppNode {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        chain: ChainConfig,
        options: NodeOptions,
    ) -> Result<Self, Error> {
        let image = chain.image()?.clone();
        let run_id = sanitize_container_name(&options.test_name);
        let name = format!("pd-{}-{}-{run_id}", options.index, chain.chain_id);
        let participant = DockerParticipant::new(
            runtime,
            ParticipantOptions {
                hostname: Some(condense_host_name(&name)),
                name,
                run_id,
                image,
                pull_image: true,
                home_dir: format!("/root/.{}", chain.name),
                user: None,
                network_id: options.network_id,
                exposed_ports: [ABCI_PORT, RPC_PORT, GRPC_PORT].map(String::from).to_vec(),
                docker: options.docker,
            },
        );
        Ok(Self {
            index: options.index,
            chain,
            participant,
        })
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    pub const fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    /// Container name, `pd-{index}-{chain_id}-{test}`.
    pub fn name(&self) -> &str {
        self.participant.name()
    }

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

    pub fn wallet_path(&self) -> String {
        format!("{}/wallet", self.home_dir())
    }

    pub fn validator_template_path(&self) -> String {
        format!("{}/validator.json", self.home_dir())
    }

    pub async fn initialize(&self, ctx: &Context) -> Result<(), Error> {
        self.participant
            .initialize(ctx, None)
            .await
            .err_tip(|| format!("while preparing node {}", self.name()))
    }

    fn pcli(&self, args: &[&str]) -> CommandSpec {
        let wallet = self.wallet_path();
        let mut argv = vec!["pcli", "-w", wallet.as_str()];
        argv.extend_from_slice(args);
        CommandSpec::new(argv)
    }

    async fn run(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        command: &CommandSpec,
    ) -> Result<Bytes, Error> {
        let (stdout, _) = self
            .participant
            .exec(ctx, reporter, command)
            .await
            .into_output()
            .err_tip(|| format!("while running {} on {}", command.display(), self.name()))?;
        Ok(stdout)
    }

    /// Generates the wallet unless it exists, then adds the address
    /// `key_name` to it.
    pub async fn create_key(&self, ctx: &Context, reporter: &dyn ExecReporter, key_name: &str) -> Result<(), Error> {
        let generate = self.pcli(&["wallet", "generate"]);
        let result = self.participant.exec(ctx, reporter, &generate).await;
        if result.error.is_none() && String::from_utf8_lossy(&result.stderr).contains(WALLET_EXISTS) {
            debug!(node = %self.name(), "wallet already generated");
        } else {
            result
                .into_output()
                .err_tip(|| format!("while generating wallet on {}", self.name()))?;
        }
        self.run(ctx, reporter, &self.pcli(&["addr", "new", key_name]))
            .await?;
        Ok(())
    }

    /// Writes a validator definition template for the wallet. The wallet
    /// must exist.
    pub async fn init_validator_file(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        let path = self.validator_template_path();
        let command = self.pcli(&["validator", "template-definition", "--file", path.as_str()]);
        self.run(ctx, reporter, &command).await?;
        Ok(())
    }

    pub async fn validator_template_content(&self, ctx: &Context) -> Result<Bytes, Error> {
        self.participant.read_file(ctx, "validator.json").await
    }

    /// Bech32m address of `key_name`, from `pcli addr list`.
    pub async fn address(&self, ctx: &Context, reporter: &dyn ExecReporter, key_name: &str) -> Result<String, Error> {
        let listing = self.run(ctx, reporter, &self.pcli(&["addr", "list"])).await?;
        String::from_utf8_lossy(&listing)
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>())
            .find(|fields| fields.len() >= 3 && fields[1] == key_name)
            .map(|fields| fields[2].to_string())
            .ok_or_else(|| make_err!(Code::NotFound, "no address named {key_name} on {}", self.name()))
    }

    /// Writes the validators and allocations into the home directory and
    /// runs `pd generate-testnet` over them.
    pub async fn generate_genesis_file<V: Serialize + Sync>(
        &self,
        ctx: &Context,
        reporter: &dyn ExecReporter,
        validators: &[V],
        allocations: &[GenesisAllocation],
    ) -> Result<(), Error> {
        let validators = serde_json::to_vec(validators)
            .err_tip(|| format!("while encoding validators of {}", self.chain.chain_id))?;
        self.participant
            .copy_file(ctx, VALIDATORS_FILE, validators)
            .await?;
        self.participant
            .copy_file(ctx, ALLOCATIONS_FILE, allocations_csv(allocations))
            .await?;
        let validators_path = format!("{}/{VALIDATORS_FILE}", self.home_dir());
        let allocations_path = format!("{}/{ALLOCATIONS_FILE}", self.home_dir());
        let command = CommandSpec::new([
            "pd",
            "generate-testnet",
            "--chain-id",
            self.chain.chain_id.as_str(),
            "--validators-input-file",
            validators_path.as_str(),
            "--allocations-input-file",
            allocations_path.as_str(),
            "--output-dir",
            self.home_dir(),
        ]);
        self.run(ctx, reporter, &command).await?;
        Ok(())
    }

    /// Genesis of the first generated node.
    pub async fn genesis_file_content(&self, ctx: &Context) -> Result<Bytes, Error> {
        self.participant
            .read_file(ctx, GENESIS_FILE)
            .await
            .err_tip(|| format!("while reading genesis of {}", self.name()))
    }

    pub async fn start(&self, ctx: &Context) -> Result<(), Error> {
        let command = CommandSpec::new(["pd", "start", "--host", "0.0.0.0", "-r", self.home_dir()]);
        self.participant.start(ctx, &command, None).await?;
        info!(node = %self.name(), rpc = ?self.participant.host_port(RPC_PORT), "app node started");
        Ok(())
    }

    pub fn rpc_address(&self) -> Result<String, Error> {
        self.published(RPC_PORT)
    }

    pub fn grpc_address(&self) -> Result<String, Error> {
        self.published(GRPC_PORT)
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

    pub async fn stop(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        self.participant.stop(ctx, reporter).await
    }

    pub async fn cleanup(&self, ctx: &Context, reporter: &dyn ExecReporter) -> Result<(), Error> {
        self.participant.cleanup(ctx, reporter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_one_quoted_row_each() {
        let csv = allocations_csv(&[GenesisAllocation {
            amount: 1_000_000,
            denom: "upenumbra".to_string(),
            address: "penumbrav2t1abc".to_string(),
        }]);
        assert_eq!(
            csv,
            "\"amount\",\"denom\",\"address\"\n\"1000000\",\"upenumbra\",\"penumbrav2t1abc\"\n"
        );
    }
}
