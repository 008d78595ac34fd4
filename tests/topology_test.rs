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

use async_trait::async_trait;
use ibctest::chain::{NodeOptions, NodeStatus, StatusClient, TendermintNode};
use ibctest::config::HarnessConfig;
use ibctest::docker::mock_runtime::{MockOutcome, MockRuntime};
use ibctest::docker::names::{CLEANUP_LABEL, sanitize_container_name};
use ibctest::docker::sweep::sweep;
use ibctest::docker::{ContainerRuntime, ParticipantState, RecordingExecReporter};
use ibctest::error::Error;
use ibctest::relayer::{CreateChannelOptions, DockerRelayer};
use ibctest::util::context::Context;
use ibctest_macro::ibctest_test;
use pretty_assertions::assert_eq;

const TEST_NAME: &str = "TestGaiaOsmosisTransfer";
const PATH: &str = "gaia-osmo";

const CONFIG: &str = r#"{
  // Images are never pulled against the in-memory runtime anyway.
  docker: { pull_images: false },
  readiness: { max_retries: 3, delay: "100ms", backoff: "fixed" },
  relayers: [{ kind: "rly" }],
  chains: [
    {
      "type": "cosmos",
      name: "gaia",
      chain_id: "gaia-1",
      images: [{ repository: "ghcr.io/strangelove-ventures/heighliner/gaia", version: "v7.0.0", uid_gid: "1025:1025" }],
      bin: "gaiad",
      bech32_prefix: "cosmos",
      denom: "uatom",
      gas_prices: "0.01uatom",
      gas_adjustment: 1.3,
      trusting_period: "504h",
    },
    {
      "type": "cosmos",
      name: "osmosis",
      chain_id: "osmosis-1",
      images: [{ repository: "ghcr.io/strangelove-ventures/heighliner/osmosis", version: "v11.0.0" }],
      bin: "osmosisd",
      bech32_prefix: "osmo",
      denom: "uosmo",
      gas_prices: "0.0025uosmo",
      gas_adjustment: 1.3,
      trusting_period: "336h",
    },
  ],
}"#;

#[derive(Debug)]
struct AlwaysSynced;

#[async_trait]
impl StatusClient for AlwaysSynced {
    async fn status(&self, _rpc_addr: &str) -> Result<NodeStatus, Error> {
        Ok(NodeStatus {
            latest_block_height: 10,
            catching_up: false,
        })
    }
}

fn relayer_outcome(argv: &[String]) -> MockOutcome {
    let has = |arg: &str| argv.iter().any(|a| a == arg);
    if has("restore") {
        MockOutcome::success("cosmos1relayer\n")
    } else if has("channels") {
        MockOutcome::success(concat!(
            r#"{"state":"STATE_OPEN","ordering":"ORDER_UNORDERED","counterparty":{"port_id":"transfer","channel_id":"channel-0"},"connection_hops":["connection-0"],"version":"ics20-1","port_id":"transfer","channel_id":"channel-0"}"#,
            "\n"
        ))
    } else {
        MockOutcome::success("")
    }
}

#[ibctest_test]
async fn two_chains_linked_by_rly() -> Result<(), Error> {
    let config = HarnessConfig::from_json5_str(CONFIG)?;
    let mock = MockRuntime::new();
    mock.set_outcome_fn(|_, argv| relayer_outcome(argv));
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(mock.clone());
    let ctx = Context::background();
    let reporter = RecordingExecReporter::new();

    let mut nodes = Vec::new();
    for chain in &config.chains {
        let node = TendermintNode::new(
            runtime.clone(),
            chain.clone(),
            NodeOptions {
                index: 0,
                test_name: TEST_NAME.to_string(),
                network_id: Some("ibctest-network".to_string()),
                docker: config.docker.clone(),
                readiness: config.readiness.clone(),
            },
            Arc::new(AlwaysSynced),
        )?;
        node.initialize(&ctx).await?;
        node.init_validator_files(&ctx, &reporter).await?;
        node.start(&ctx, &[]).await?;
        nodes.push(node);
    }

    let relayer = DockerRelayer::from_config(
        &ctx,
        runtime.clone(),
        TEST_NAME,
        Some("ibctest-network".to_string()),
        &config.relayers[0],
        &config.docker,
    )
    .await?;
    for node in &nodes {
        let chain = node.chain();
        let host = node.host_name();
        relayer
            .add_chain_configuration(
                &ctx,
                &reporter,
                chain,
                "relayer",
                &format!("http://{host}:26657"),
                &format!("{host}:9090"),
            )
            .await?;
        relayer
            .restore_key(&ctx, &reporter, &chain.chain_id, "relayer", "abandon abandon about")
            .await?;
    }
    relayer
        .generate_path(&ctx, &reporter, "gaia-1", "osmosis-1", PATH)
        .await?;
    relayer
        .link_path(&ctx, &reporter, PATH, &CreateChannelOptions::default())
        .await?;
    relayer.start_relayer(&ctx, PATH).await?;

    let channels = relayer.get_channels(&ctx, &reporter, "gaia-1").await?;
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].channel_id, "channel-0");
    assert_eq!(
        relayer.get_wallet("osmosis-1").map(|wallet| wallet.address),
        Some("cosmos1relayer".to_string())
    );

    relayer.cleanup(&ctx, &reporter).await?;
    for node in &nodes {
        node.cleanup(&ctx, &reporter).await?;
        assert_eq!(node.state(), ParticipantState::Removed);
    }
    assert!(mock.volume_names().is_empty());
    assert!(mock.container_names().is_empty());

    let every_report_ordered = reporter
        .reports()
        .iter()
        .all(|report| report.started_at <= report.finished_at);
    assert!(every_report_ordered);
    Ok(())
}

#[ibctest_test]
async fn sweep_collects_what_a_run_left_behind() -> Result<(), Error> {
    let config = HarnessConfig::from_json5_str(CONFIG)?;
    let mock = MockRuntime::new();
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(mock.clone());
    let ctx = Context::background();

    let node = TendermintNode::new(
        runtime.clone(),
        config.chains[0].clone(),
        NodeOptions {
            index: 0,
            test_name: TEST_NAME.to_string(),
            network_id: None,
            docker: config.docker.clone(),
            readiness: config.readiness.clone(),
        },
        Arc::new(AlwaysSynced),
    )?;
    node.initialize(&ctx).await?;
    node.start(&ctx, &[]).await?;

    let spec = mock.container_spec(node.name()).expect("node container");
    assert_eq!(
        spec.labels.get(CLEANUP_LABEL).map(String::as_str),
        Some(sanitize_container_name(TEST_NAME).as_str())
    );

    let summary = sweep(runtime.as_ref(), &sanitize_container_name(TEST_NAME)).await?;
    assert_eq!(summary.containers_removed, 1);
    assert_eq!(summary.volumes_removed, 1);
    assert_eq!(summary.failures, 0);
    assert!(mock.volume_names().is_empty());
    Ok(())
}
