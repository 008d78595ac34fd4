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
use std::sync::Arc;

use bytes::Bytes;
use ibctest_config::{ChainConfig, ContainerImage, RelayerKind};
use ibctest_docker::CommandSpec;
use ibctest_error::Error;

use crate::channel::CreateChannelOptions;
use crate::output::{ChannelOutput, ConnectionOutput, RelayerWallet};

mod hermes;
mod rly;

pub use hermes::HermesCommander;
pub use rly::RlyCommander;

/// Everything that differs between relayer binaries.
///
/// Builders return the command for one logical operation; `home_dir` is the
/// relayer's home inside the container and must be interpolated by the
/// implementation. Parsers turn the binary's output into shared result
/// types and fail with `DataLoss` when the output cannot be understood.
pub trait RelayerCommander: Send + Sync + Debug {
    /// Short binary name, e.g. `rly`. Prefix of every container name.
    fn name(&self) -> &'static str;

    fn default_image(&self) -> ContainerImage;

    /// `uid:gid` the relayer runs as.
    fn docker_user(&self) -> &'static str;

    /// Content of the per-chain file read by
    /// [`RelayerCommander::add_chain_configuration`].
    fn config_content(
        &self,
        chain: &ChainConfig,
        key_name: &str,
        rpc_addr: &str,
        grpc_addr: &str,
    ) -> Result<Bytes, Error>;

    fn parse_add_key_output(&self, stdout: &str, stderr: &str) -> Result<RelayerWallet, Error>;

    /// Address of the restored key.
    fn parse_restore_key_output(&self, stdout: &str, stderr: &str) -> Result<String, Error>;

    fn parse_get_channels_output(&self, stdout: &str, stderr: &str) -> Result<Vec<ChannelOutput>, Error>;

    fn parse_get_connections_output(
        &self,
        stdout: &str,
        stderr: &str,
    ) -> Result<Vec<ConnectionOutput>, Error>;

    /// Run once when the relayer is created. `None` when nothing is needed.
    fn init(&self, home_dir: &str) -> Result<Option<CommandSpec>, Error>;

    fn add_chain_configuration(&self, container_file_path: &str, home_dir: &str) -> CommandSpec;

    /// Fails with `Unimplemented` for binaries that cannot generate keys.
    fn add_key(&self, chain_id: &str, key_name: &str, home_dir: &str) -> Result<CommandSpec, Error>;

    fn restore_key(&self, chain_id: &str, key_name: &str, mnemonic: &str, home_dir: &str) -> CommandSpec;

    fn generate_path(&self, src_chain_id: &str, dst_chain_id: &str, path_name: &str, home_dir: &str) -> CommandSpec;

    fn link_path(&self, path_name: &str, home_dir: &str, opts: &CreateChannelOptions) -> CommandSpec;

    fn create_channel(&self, path_name: &str, opts: &CreateChannelOptions, home_dir: &str) -> CommandSpec;

    fn create_clients(&self, path_name: &str, home_dir: &str) -> CommandSpec;

    fn create_connections(&self, path_name: &str, home_dir: &str) -> CommandSpec;

    fn update_clients(&self, path_name: &str, home_dir: &str) -> CommandSpec;

    fn flush_packets(&self, path_name: &str, channel_id: &str, home_dir: &str) -> CommandSpec;

    fn flush_acknowledgements(&self, path_name: &str, channel_id: &str, home_dir: &str) -> CommandSpec;

    fn get_channels(&self, chain_id: &str, home_dir: &str) -> CommandSpec;

    fn get_connections(&self, chain_id: &str, home_dir: &str) -> CommandSpec;

    /// Long-running relaying process for `path_name`.
    fn start_relayer(&self, path_name: &str, home_dir: &str) -> CommandSpec;
}

/// The commander for a configured relayer kind.
pub fn commander_for(kind: RelayerKind) -> Arc<dyn RelayerCommander> {
    match kind {
        RelayerKind::Rly => Arc::new(RlyCommander),
        RelayerKind::Hermes => Arc::new(HermesCommander),
    }
}
