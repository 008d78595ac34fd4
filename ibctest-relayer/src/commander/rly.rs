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

use bytes::Bytes;
use ibctest_config::{ChainConfig, ContainerImage};
use ibctest_docker::CommandSpec;
use ibctest_error::{Error, ResultExt, make_parse_err};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::channel::CreateChannelOptions;
use crate::commander::RelayerCommander;
use crate::output::{ChannelOutput, ConnectionOutput, RelayerWallet};

const RLY_IMAGE: &str = "ghcr.io/cosmos/relayer";
const RLY_VERSION: &str = "v2.0.0";
const RLY_USER: &str = "100:1000";
const COIN_TYPE: &str = "118";

#[derive(Serialize)]
struct RlyChainConfig<'a> {
    #[serde(rename = "type")]
    chain_type: &'a str,
    value: RlyChainConfigValue<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct RlyChainConfigValue<'a> {
    key: &'a str,
    chain_id: &'a str,
    rpc_addr: &'a str,
    grpc_addr: &'a str,
    account_prefix: &'a str,
    keyring_backend: &'a str,
    gas_adjustment: f64,
    gas_prices: &'a str,
    debug: bool,
    timeout: &'a str,
    output_format: &'a str,
    sign_mode: &'a str,
}

/// Drives the cosmos `rly` relayer, which prints JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct RlyCommander;

fn rly<const N: usize>(args: [&str; N], home_dir: &str) -> CommandSpec {
    let mut argv = vec!["rly"];
    argv.extend(args);
    argv.extend(["--home", home_dir]);
    CommandSpec::new(argv)
}

fn channel_flags(opts: &CreateChannelOptions) -> [&str; 8] {
    [
        "--src-port",
        &opts.source_port,
        "--dst-port",
        &opts.dest_port,
        "--order",
        opts.order.as_str(),
        "--version",
        &opts.version,
    ]
}

/// Parses one JSON document per non-empty line.
fn parse_json_lines<T: DeserializeOwned>(stdout: &str, what: &str) -> Result<Vec<T>, Error> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .map_err(|e| make_parse_err!("{e}"))
                .err_tip(|| format!("while parsing {what} from rly output line {line:?}"))
        })
        .collect()
}

impl RelayerCommander for RlyCommander {
    fn name(&self) -> &'static str {
        "rly"
    }

    fn default_image(&self) -> ContainerImage {
        ContainerImage::new(RLY_IMAGE, RLY_VERSION).with_uid_gid(RLY_USER)
    }

    fn docker_user(&self) -> &'static str {
        RLY_USER
    }

    fn config_content(
        &self,
        chain: &ChainConfig,
        key_name: &str,
        rpc_addr: &str,
        grpc_addr: &str,
    ) -> Result<Bytes, Error> {
        let config = RlyChainConfig {
            chain_type: "cosmos",
            value: RlyChainConfigValue {
                key: key_name,
                chain_id: &chain.chain_id,
                rpc_addr,
                grpc_addr,
                account_prefix: &chain.bech32_prefix,
                keyring_backend: "test",
                gas_adjustment: chain.gas_adjustment,
                gas_prices: &chain.gas_prices,
                debug: true,
                timeout: "10s",
                output_format: "json",
                sign_mode: "direct",
            },
        };
        let content = serde_json::to_vec(&config)
            .err_tip(|| format!("while encoding rly config for {}", chain.chain_id))?;
        Ok(Bytes::from(content))
    }

    fn parse_add_key_output(&self, stdout: &str, _stderr: &str) -> Result<RelayerWallet, Error> {
        serde_json::from_str(stdout.trim())
            .map_err(|e| make_parse_err!("{e}"))
            .err_tip(|| "while parsing wallet from rly keys add output")
    }

    fn parse_restore_key_output(&self, stdout: &str, _stderr: &str) -> Result<String, Error> {
        let address = stdout.trim();
        if address.is_empty() {
            return Err(make_parse_err!("rly keys restore printed no address"));
        }
        Ok(address.to_string())
    }

    fn parse_get_channels_output(&self, stdout: &str, _stderr: &str) -> Result<Vec<ChannelOutput>, Error> {
        parse_json_lines(stdout, "channel")
    }

    fn parse_get_connections_output(
        &self,
        stdout: &str,
        _stderr: &str,
    ) -> Result<Vec<ConnectionOutput>, Error> {
        parse_json_lines(stdout, "connection")
    }

    fn init(&self, home_dir: &str) -> Result<Option<CommandSpec>, Error> {
        Ok(Some(rly(["config", "init"], home_dir)))
    }

    fn add_chain_configuration(&self, container_file_path: &str, home_dir: &str) -> CommandSpec {
        rly(["chains", "add", "-f", container_file_path], home_dir)
    }

    fn add_key(&self, chain_id: &str, key_name: &str, home_dir: &str) -> Result<CommandSpec, Error> {
        Ok(rly(
            ["keys", "add", chain_id, key_name, "--coin-type", COIN_TYPE],
            home_dir,
        ))
    }

    fn restore_key(&self, chain_id: &str, key_name: &str, mnemonic: &str, home_dir: &str) -> CommandSpec {
        rly(
            ["keys", "restore", chain_id, key_name, mnemonic, "--coin-type", COIN_TYPE],
            home_dir,
        )
    }

    fn generate_path(&self, src_chain_id: &str, dst_chain_id: &str, path_name: &str, home_dir: &str) -> CommandSpec {
        rly(["paths", "new", src_chain_id, dst_chain_id, path_name], home_dir)
    }

    fn link_path(&self, path_name: &str, home_dir: &str, opts: &CreateChannelOptions) -> CommandSpec {
        let mut argv = vec!["rly", "tx", "link", path_name];
        argv.extend(channel_flags(opts));
        argv.extend(["--home", home_dir]);
        CommandSpec::new(argv)
    }

    fn create_channel(&self, path_name: &str, opts: &CreateChannelOptions, home_dir: &str) -> CommandSpec {
        let mut argv = vec!["rly", "tx", "channel", path_name];
        argv.extend(channel_flags(opts));
        argv.extend(["--home", home_dir]);
        CommandSpec::new(argv)
    }

    fn create_clients(&self, path_name: &str, home_dir: &str) -> CommandSpec {
        rly(["tx", "clients", path_name], home_dir)
    }

    fn create_connections(&self, path_name: &str, home_dir: &str) -> CommandSpec {
        rly(["tx", "connection", path_name], home_dir)
    }

    fn update_clients(&self, path_name: &str, home_dir: &str) -> CommandSpec {
        rly(["tx", "update-clients", path_name], home_dir)
    }

    fn flush_packets(&self, path_name: &str, channel_id: &str, home_dir: &str) -> CommandSpec {
        rly(["tx", "relay-pkts", path_name, channel_id], home_dir)
    }

    fn flush_acknowledgements(&self, path_name: &str, channel_id: &str, home_dir: &str) -> CommandSpec {
        rly(["tx", "relay-acks", path_name, channel_id], home_dir)
    }

    fn get_channels(&self, chain_id: &str, home_dir: &str) -> CommandSpec {
        rly(["q", "channels", chain_id], home_dir)
    }

    fn get_connections(&self, chain_id: &str, home_dir: &str) -> CommandSpec {
        rly(["q", "connections", chain_id], home_dir)
    }

    fn start_relayer(&self, path_name: &str, home_dir: &str) -> CommandSpec {
        rly(["start", path_name, "--debug"], home_dir)
    }
}
