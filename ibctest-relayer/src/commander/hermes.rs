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
use ibctest_error::{Code, Error, ResultExt, make_err, make_parse_err};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::channel::CreateChannelOptions;
use crate::commander::RelayerCommander;
use crate::output::{
    ChannelCounterparty, ChannelOutput, ConnectionCounterparty, ConnectionOutput, ConnectionVersion,
    MerklePrefix, RelayerWallet,
};

const HERMES_IMAGE: &str = "ghcr.io/informalsystems/hermes";
const HERMES_VERSION: &str = "1.0.0";
const HERMES_USER: &str = "1000:1000";

/// `hermes` with the home config and JSON output. Path scripts always get
/// the home directory as `$1`.
const HERMES: &str = r#"hermes --config "$1/config.toml" --json"#;

/// Shell function printing every string value of key `$2` in JSON `$1`,
/// one per line, in document order.
const JSON_IDS: &str = r#"ids() { printf '%s\n' "$1" | grep -o "\"$2\":\"[^\"]*\"" | cut -d '"' -f 4; }; "#;

/// Records the client and connection ids on both ends of a path from the
/// JSON output `$O` of a channel or connection handshake.
const RECORD_CLIENTS: &str = r#"printf '%s %s\n' $(ids "$O" client_id | head -n 2) > "$1/paths/$2.clients""#;
const RECORD_CONNECTIONS: &str =
    r#"printf '%s %s\n' $(ids "$O" connection_id | head -n 2) > "$1/paths/$2.connections""#;

/// Drives the `hermes` relayer.
///
/// Hermes has no notion of named paths. `generate_path` records the two
/// chain ids in `{home}/paths/{path}`, and the handshakes record the ids
/// they create next to it in `{path}.clients` and `{path}.connections`.
/// Every path command reads them back in the container shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct HermesCommander;

/// `sh -c` script run with the home directory as `$1`, the path name as
/// `$2` and `args` from `$3` on. The path's chain ids are in `$A` and `$B`.
fn path_script(home_dir: &str, path_name: &str, script: &str, args: &[&str]) -> CommandSpec {
    let script = format!(r#"{JSON_IDS}read -r A B < "$1/paths/$2" && {script}"#);
    let mut argv = vec!["sh", "-c", script.as_str(), "_", home_dir, path_name];
    argv.extend_from_slice(args);
    CommandSpec::new(argv)
}

/// Rewrites hermes' `Open` style enum names to the protobuf `STATE_OPEN`
/// style used by every other relayer.
fn normalize(prefix: &str, value: &str) -> String {
    if value.starts_with(prefix) {
        return value.to_string();
    }
    format!("{prefix}{}", value.to_ascii_uppercase())
}

#[derive(Deserialize)]
struct HermesResponse<T> {
    result: T,
    status: String,
}

/// Hermes prints log lines and one JSON response per command; the last
/// response wins.
fn parse_response<T: DeserializeOwned>(stdout: &str, what: &str) -> Result<T, Error> {
    let mut last_err = None;
    for line in stdout.lines().rev().map(str::trim).filter(|l| l.starts_with('{')) {
        match serde_json::from_str::<HermesResponse<T>>(line) {
            Ok(response) if response.status == "success" => return Ok(response.result),
            Ok(response) => {
                return Err(make_err!(
                    Code::Aborted,
                    "hermes reported status {} for {what}",
                    response.status
                ));
            }
            Err(e) => last_err = Some(e),
        }
    }
    Err(match last_err {
        Some(e) => make_parse_err!("{e}"),
        None => make_parse_err!("no JSON response in hermes output"),
    })
    .err_tip(|| format!("while parsing {what} from hermes output"))
}

#[derive(Deserialize)]
struct HermesChannelRemote {
    port_id: String,
    #[serde(default)]
    channel_id: Option<String>,
}

#[derive(Deserialize)]
struct HermesChannelEnd {
    state: String,
    ordering: String,
    remote: HermesChannelRemote,
    #[serde(default)]
    connection_hops: Vec<String>,
    version: String,
}

#[derive(Deserialize)]
struct HermesChannel {
    port_id: String,
    channel_id: String,
    channel_end: HermesChannelEnd,
}

#[derive(Deserialize)]
struct HermesDelay {
    secs: u64,
    nanos: u32,
}

#[derive(Deserialize)]
struct HermesConnectionCounterparty {
    client_id: String,
    #[serde(default)]
    connection_id: Option<String>,
    #[serde(default)]
    prefix: String,
}

#[derive(Deserialize)]
struct HermesConnectionEnd {
    client_id: String,
    #[serde(default)]
    versions: Vec<ConnectionVersion>,
    state: String,
    counterparty: HermesConnectionCounterparty,
    delay_period: HermesDelay,
}

#[derive(Deserialize)]
struct HermesConnection {
    connection_id: String,
    connection_end: HermesConnectionEnd,
}

#[derive(Serialize)]
struct Toggle {
    enabled: bool,
}

#[derive(Serialize)]
struct GlobalSection {
    log_level: &'static str,
}

#[derive(Serialize)]
struct ClientsMode {
    enabled: bool,
    refresh: bool,
    misbehaviour: bool,
}

#[derive(Serialize)]
struct PacketsMode {
    enabled: bool,
    clear_interval: u64,
    clear_on_start: bool,
    tx_confirmation: bool,
}

#[derive(Serialize)]
struct ModeSection {
    clients: ClientsMode,
    connections: Toggle,
    channels: Toggle,
    packets: PacketsMode,
}

/// Global part of `config.toml`; chains are appended as they are added.
#[derive(Serialize)]
struct BaseConfig {
    global: GlobalSection,
    mode: ModeSection,
    rest: Toggle,
    telemetry: Toggle,
}

impl BaseConfig {
    const fn new() -> Self {
        Self {
            global: GlobalSection { log_level: "info" },
            mode: ModeSection {
                clients: ClientsMode {
                    enabled: true,
                    refresh: true,
                    misbehaviour: false,
                },
                connections: Toggle { enabled: true },
                channels: Toggle { enabled: true },
                packets: PacketsMode {
                    enabled: true,
                    clear_interval: 100,
                    clear_on_start: true,
                    tx_confirmation: false,
                },
            },
            rest: Toggle { enabled: false },
            telemetry: Toggle { enabled: false },
        }
    }
}

#[derive(Serialize)]
struct GasPrice<'a> {
    price: f64,
    denom: &'a str,
}

#[derive(Serialize)]
struct TrustThreshold {
    numerator: &'static str,
    denominator: &'static str,
}

#[derive(Serialize)]
struct AddressType {
    derivation: &'static str,
}

/// One `[[chains]]` entry. Tables come last so they serialize after the
/// plain keys.
#[derive(Serialize)]
struct HermesChainConfig<'a> {
    id: &'a str,
    rpc_addr: &'a str,
    grpc_addr: &'a str,
    websocket_addr: String,
    rpc_timeout: &'static str,
    account_prefix: &'a str,
    key_name: &'a str,
    store_prefix: &'static str,
    default_gas: u64,
    max_gas: u64,
    gas_multiplier: f64,
    max_msg_num: u64,
    max_tx_size: u64,
    clock_drift: &'static str,
    max_block_time: &'static str,
    trusting_period: &'a str,
    gas_price: GasPrice<'a>,
    trust_threshold: TrustThreshold,
    address_type: AddressType,
}

#[derive(Serialize)]
struct ChainsFragment<'a> {
    chains: [HermesChainConfig<'a>; 1],
}

fn to_toml<T: Serialize>(value: &T, what: &str) -> Result<String, Error> {
    toml::to_string(value).map_err(|e| make_err!(Code::Internal, "while encoding {what} as TOML: {e}"))
}

impl RelayerCommander for HermesCommander {
    fn name(&self) -> &'static str {
        "hermes"
    }

    fn default_image(&self) -> ContainerImage {
        ContainerImage::new(HERMES_IMAGE, HERMES_VERSION).with_uid_gid(HERMES_USER)
    }

    fn docker_user(&self) -> &'static str {
        HERMES_USER
    }

    fn config_content(
        &self,
        chain: &ChainConfig,
        key_name: &str,
        rpc_addr: &str,
        grpc_addr: &str,
    ) -> Result<Bytes, Error> {
        let (price, denom) = chain.gas_price_amount()?;
        let websocket_addr = format!(
            "{}/websocket",
            rpc_addr
                .replacen("https://", "wss://", 1)
                .replacen("http://", "ws://", 1)
        );
        let fragment = ChainsFragment {
            chains: [HermesChainConfig {
                id: &chain.chain_id,
                rpc_addr,
                grpc_addr,
                websocket_addr,
                rpc_timeout: "10s",
                account_prefix: &chain.bech32_prefix,
                key_name,
                store_prefix: "ibc",
                default_gas: 100_000,
                max_gas: 400_000,
                gas_multiplier: chain.gas_adjustment,
                max_msg_num: 30,
                max_tx_size: 2_097_152,
                clock_drift: "5s",
                max_block_time: "30s",
                trusting_period: &chain.trusting_period,
                gas_price: GasPrice { price, denom },
                trust_threshold: TrustThreshold {
                    numerator: "1",
                    denominator: "3",
                },
                address_type: AddressType { derivation: "cosmos" },
            }],
        };
        let content = to_toml(&fragment, &format!("hermes config for {}", chain.chain_id))?;
        // Appended to config.toml, so it must start on a fresh line.
        Ok(Bytes::from(format!("\n{content}")))
    }

    fn parse_add_key_output(&self, _stdout: &str, _stderr: &str) -> Result<RelayerWallet, Error> {
        Err(make_err!(
            Code::Unimplemented,
            "hermes cannot generate keys, restore a mnemonic instead"
        ))
    }

    fn parse_restore_key_output(&self, stdout: &str, _stderr: &str) -> Result<String, Error> {
        let message: String = parse_response(stdout, "restored key")?;
        let address = message
            .split_once('(')
            .and_then(|(_, rest)| rest.split_once(')'))
            .map(|(address, _)| address.trim())
            .filter(|address| !address.is_empty());
        address
            .map(str::to_string)
            .ok_or_else(|| make_parse_err!("no address in hermes key output {message:?}"))
    }

    fn parse_get_channels_output(&self, stdout: &str, _stderr: &str) -> Result<Vec<ChannelOutput>, Error> {
        let channels: Vec<HermesChannel> = parse_response(stdout, "channels")?;
        Ok(channels
            .into_iter()
            .map(|channel| ChannelOutput {
                state: normalize("STATE_", &channel.channel_end.state),
                ordering: normalize("ORDER_", &channel.channel_end.ordering),
                counterparty: ChannelCounterparty {
                    port_id: channel.channel_end.remote.port_id,
                    channel_id: channel.channel_end.remote.channel_id.unwrap_or_default(),
                },
                connection_hops: channel.channel_end.connection_hops,
                version: channel.channel_end.version,
                port_id: channel.port_id,
                channel_id: channel.channel_id,
            })
            .collect())
    }

    fn parse_get_connections_output(
        &self,
        stdout: &str,
        _stderr: &str,
    ) -> Result<Vec<ConnectionOutput>, Error> {
        let connections: Vec<HermesConnection> = parse_response(stdout, "connections")?;
        Ok(connections
            .into_iter()
            .map(|connection| {
                let end = connection.connection_end;
                let delay = u128::from(end.delay_period.secs) * 1_000_000_000
                    + u128::from(end.delay_period.nanos);
                ConnectionOutput {
                    id: connection.connection_id,
                    client_id: end.client_id,
                    versions: end.versions,
                    state: normalize("STATE_", &end.state),
                    counterparty: ConnectionCounterparty {
                        client_id: end.counterparty.client_id,
                        connection_id: end.counterparty.connection_id.unwrap_or_default(),
                        prefix: MerklePrefix {
                            key_prefix: end.counterparty.prefix,
                        },
                    },
                    delay_period: delay.to_string(),
                }
            })
            .collect())
    }

    fn init(&self, home_dir: &str) -> Result<Option<CommandSpec>, Error> {
        let base = to_toml(&BaseConfig::new(), "hermes base config")?;
        Ok(Some(CommandSpec::new([
            "sh",
            "-c",
            r#"mkdir -p "$1/paths" && printf '%s' "$2" > "$1/config.toml""#,
            "_",
            home_dir,
            base.as_str(),
        ])))
    }

    fn add_chain_configuration(&self, container_file_path: &str, home_dir: &str) -> CommandSpec {
        CommandSpec::new([
            "sh",
            "-c",
            r#"cat "$1" >> "$2/config.toml""#,
            "_",
            container_file_path,
            home_dir,
        ])
    }

    fn add_key(&self, chain_id: &str, _key_name: &str, _home_dir: &str) -> Result<CommandSpec, Error> {
        Err(make_err!(
            Code::Unimplemented,
            "hermes cannot generate a key for {chain_id}, restore a mnemonic instead"
        ))
    }

    fn restore_key(&self, chain_id: &str, key_name: &str, mnemonic: &str, home_dir: &str) -> CommandSpec {
        let script = format!(
            r#"printf '%s' "$4" > "$1/$2.mnemonic" && {HERMES} keys add --chain "$2" --key-name "$3" --mnemonic-file "$1/$2.mnemonic" --overwrite"#
        );
        CommandSpec::new(["sh", "-c", script.as_str(), "_", home_dir, chain_id, key_name, mnemonic])
    }

    fn generate_path(&self, src_chain_id: &str, dst_chain_id: &str, path_name: &str, home_dir: &str) -> CommandSpec {
        CommandSpec::new([
            "sh",
            "-c",
            r#"mkdir -p "$1/paths" && printf '%s %s\n' "$2" "$3" > "$1/paths/$4""#,
            "_",
            home_dir,
            src_chain_id,
            dst_chain_id,
            path_name,
        ])
    }

    fn link_path(&self, path_name: &str, home_dir: &str, opts: &CreateChannelOptions) -> CommandSpec {
        path_script(
            home_dir,
            path_name,
            &format!(
                r#"O=$({HERMES} create channel --a-chain "$A" --b-chain "$B" --a-port "$3" --b-port "$4" --order "$5" --channel-version "$6" --new-client-connection --yes) && printf '%s\n' "$O" && {RECORD_CLIENTS} && {RECORD_CONNECTIONS}"#
            ),
            &[
                opts.source_port.as_str(),
                opts.dest_port.as_str(),
                opts.order.as_str(),
                opts.version.as_str(),
            ],
        )
    }

    fn create_channel(&self, path_name: &str, opts: &CreateChannelOptions, home_dir: &str) -> CommandSpec {
        path_script(
            home_dir,
            path_name,
            &format!(
                r#"read -r XA XB < "$1/paths/$2.connections" && {HERMES} create channel --a-chain "$A" --a-connection "$XA" --a-port "$3" --b-port "$4" --order "$5" --channel-version "$6""#
            ),
            &[
                opts.source_port.as_str(),
                opts.dest_port.as_str(),
                opts.order.as_str(),
                opts.version.as_str(),
            ],
        )
    }

    fn create_clients(&self, path_name: &str, home_dir: &str) -> CommandSpec {
        path_script(
            home_dir,
            path_name,
            &format!(
                r#"OA=$({HERMES} create client --host-chain "$A" --reference-chain "$B") && printf '%s\n' "$OA" && OB=$({HERMES} create client --host-chain "$B" --reference-chain "$A") && printf '%s\n' "$OB" && printf '%s %s\n' "$(ids "$OA" client_id | head -n 1)" "$(ids "$OB" client_id | head -n 1)" > "$1/paths/$2.clients""#
            ),
            &[],
        )
    }

    fn create_connections(&self, path_name: &str, home_dir: &str) -> CommandSpec {
        path_script(
            home_dir,
            path_name,
            &format!(
                r#"read -r CA CB < "$1/paths/$2.clients" && O=$({HERMES} create connection --a-chain "$A" --a-client "$CA" --b-client "$CB") && printf '%s\n' "$O" && {RECORD_CONNECTIONS}"#
            ),
            &[],
        )
    }

    fn update_clients(&self, path_name: &str, home_dir: &str) -> CommandSpec {
        path_script(
            home_dir,
            path_name,
            &format!(
                r#"read -r CA CB < "$1/paths/$2.clients" && {HERMES} update client --host-chain "$A" --client "$CA" && {HERMES} update client --host-chain "$B" --client "$CB""#
            ),
            &[],
        )
    }

    /// The channel's port is looked up on the source chain.
    fn flush_packets(&self, path_name: &str, channel_id: &str, home_dir: &str) -> CommandSpec {
        path_script(
            home_dir,
            path_name,
            &format!(
                r#"O=$({HERMES} query channels --chain "$A") && P=$(printf '%s\n' "$O" | grep -o "{{[^{{}}]*\"channel_id\":\"$3\"[^{{}}]*}}" | head -n 1) && PORT=$(ids "$P" port_id) && [ -n "$PORT" ] && {HERMES} clear packets --chain "$A" --port "$PORT" --channel "$3""#
            ),
            &[channel_id],
        )
    }

    /// Hermes clears acknowledgements together with packets.
    fn flush_acknowledgements(&self, path_name: &str, channel_id: &str, home_dir: &str) -> CommandSpec {
        self.flush_packets(path_name, channel_id, home_dir)
    }

    fn get_channels(&self, chain_id: &str, home_dir: &str) -> CommandSpec {
        let config = format!("{home_dir}/config.toml");
        CommandSpec::new([
            "hermes", "--config", config.as_str(), "--json", "query", "channels", "--chain", chain_id, "--verbose",
        ])
    }

    fn get_connections(&self, chain_id: &str, home_dir: &str) -> CommandSpec {
        let config = format!("{home_dir}/config.toml");
        CommandSpec::new([
            "hermes", "--config", config.as_str(), "--json", "query", "connections", "--chain", chain_id, "--verbose",
        ])
    }

    fn start_relayer(&self, _path_name: &str, home_dir: &str) -> CommandSpec {
        let config = format!("{home_dir}/config.toml");
        CommandSpec::new(["hermes", "--config", config.as_str(), "start"])
    }
}
