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
use ibctest_chain::{GenesisAllocation, NodeOptions, PenumbraAppNode};
use ibctest_config::{Backoff, ChainConfig, ContainerImage, DockerConfig, RetryConfig};
use ibctest_docker::mock_runtime::{MockOutcome, MockRuntime};
use ibctest_docker::{ParticipantState, RecordingExecReporter};
use ibctest_error::{Code, Error};
use ibctest_macro::ibctest_test;
use ibctest_util::context::Context;
use pretty_assertions::assert_eq;
use serde_json::json;

const WALLET: &str = "/root/.penumbra/wallet";

fn penumbra() -> ChainConfig {
    ChainConfig {
        chain_type: "penumbra".to_string(),
        name: "penumbra".to_string(),
        chain_id: "penumbra-1".to_string(),
        images: vec![ContainerImage::new("ghcr.io/strangelove-ventures/heighliner/penumbra", "015-ersa-v2")],
        bin: "pd".to_string(),
        bech32_prefix: "penumbrav2t".to_string(),
        denom: "upenumbra".to_string(),
        gas_prices: "0upenumbra".to_string(),
        gas_adjustment: 1.0,
        trusting_period: "24h".to_string(),
        no_host_mount: false,
    }
}

fn app_node(mock: &MockRuntime) -> Result<PenumbraAppNode, Error> {
    PenumbraAppNode::new(
        Arc::new(mock.clone()),
        penumbra(),
        NodeOptions {
            index: 0,
            test_name: "TestPenumbraChainStart".to_string(),
            network_id: Some("ibctest-network".to_string()),
            docker: DockerConfig::default(),
            readiness: RetryConfig {
                max_retries: 5,
                delay: Duration::from_millis(100),
                backoff: Backoff::Fixed,
                jitter: 0.0,
            },
        },
    )
}

fn pcli_commands(mock: &MockRuntime) -> Vec<Vec<String>> {
    mock.created_specs()
        .into_iter()
        .filter(|spec| spec.cmd.first().map(String::as_str) == Some("pcli"))
        .map(|spec| spec.cmd)
        .collect()
}

#[ibctest_test]
async fn names_and_paths() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let node = app_node(&mock)?;

    assert_eq!(node.name(), "pd-0-penumbra-1-TestPenumbraChainStart");
    assert_eq!(node.home_dir(), "/root/.penumbra");
    assert_eq!(node.wallet_path(), WALLET);
    assert_eq!(node.validator_template_path(), "/root/.penumbra/validator.json");
    Ok(())
}

#[ibctest_test]
async fn create_key_tolerates_existing_wallet() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let node = app_node(&mock)?;
    let ctx = Context::background();
    let reporter = RecordingExecReporter::new();
    node.initialize(&ctx).await?;
    mock.set_outcome_fn(|_, cmd| {
        if cmd.iter().any(|arg| arg == "generate") {
            MockOutcome::failure(1, "Error: wallet at /root/.penumbra/wallet already exists, refusing to overwrite it")
        } else {
            MockOutcome::success(Bytes::new())
        }
    });

    node.create_key(&ctx, &reporter, "relayer").await?;

    assert_eq!(
        pcli_commands(&mock),
        vec![
            vec!["pcli", "-w", WALLET, "wallet", "generate"],
            vec!["pcli", "-w", WALLET, "addr", "new", "relayer"],
        ]
    );
    assert_eq!(reporter.len(), 2);
    Ok(())
}

#[ibctest_test]
async fn create_key_fails_on_other_wallet_errors() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let node = app_node(&mock)?;
    let ctx = Context::background();
    node.initialize(&ctx).await?;
    mock.set_outcome_fn(|_, _| MockOutcome::failure(2, "Error: permission denied"));

    let err = node
        .create_key(&ctx, &RecordingExecReporter::new(), "relayer")
        .await
        .unwrap_err();

    assert_eq!(err.code, Code::Aborted);
    assert_eq!(pcli_commands(&mock).len(), 1);
    Ok(())
}

#[ibctest_test]
async fn address_is_looked_up_by_key_name() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let node = app_node(&mock)?;
    let ctx = Context::background();
    let reporter = RecordingExecReporter::new();
    node.initialize(&ctx).await?;
    mock.set_outcome_fn(|_, cmd| {
        if cmd.iter().any(|arg| arg == "list") {
            MockOutcome::success(
                " Index  Label      Address\n 0      Default    penumbrav2t1aaaa\n 1      relayer    penumbrav2t1bbbb\n",
            )
        } else {
            MockOutcome::success(Bytes::new())
        }
    });

    assert_eq!(node.address(&ctx, &reporter, "relayer").await?, "penumbrav2t1bbbb");
    let err = node.address(&ctx, &reporter, "faucet").await.unwrap_err();
    assert_eq!(err.code, Code::NotFound);
    Ok(())
}

#[ibctest_test]
async fn genesis_is_generated_from_written_inputs() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let node = app_node(&mock)?;
    let ctx = Context::background();
    let reporter = RecordingExecReporter::new();
    node.initialize(&ctx).await?;

    let validators = [json!({"name": "validator-0", "enabled": true})];
    let allocations = [GenesisAllocation {
        amount: 1_000_000,
        denom: "upenumbra".to_string(),
        address: "penumbrav2t1aaaa".to_string(),
    }];
    node.generate_genesis_file(&ctx, &reporter, &validators, &allocations)
        .await?;

    let volume = node.participant().volume_name().expect("volume");
    assert_eq!(
        mock.volume_file(&volume, "validators.json").expect("validators").content,
        r#"[{"enabled":true,"name":"validator-0"}]"#
    );
    assert_eq!(
        mock.volume_file(&volume, "allocations.csv").expect("allocations").content,
        "\"amount\",\"denom\",\"address\"\n\"1000000\",\"upenumbra\",\"penumbrav2t1aaaa\"\n"
    );
    let generate = mock
        .created_specs()
        .into_iter()
        .find(|spec| spec.cmd.first().map(String::as_str) == Some("pd"))
        .expect("generate job");
    assert_eq!(
        generate.cmd,
        vec![
            "pd",
            "generate-testnet",
            "--chain-id",
            "penumbra-1",
            "--validators-input-file",
            "/root/.penumbra/validators.json",
            "--allocations-input-file",
            "/root/.penumbra/allocations.csv",
            "--output-dir",
            "/root/.penumbra",
        ]
    );

    let genesis = br#"{"chain_id":"penumbra-1"}"#.to_vec();
    mock.put_volume_file(&volume, "node0/tendermint/config/genesis.json", genesis.clone())?;
    assert_eq!(node.genesis_file_content(&ctx).await?, genesis);
    Ok(())
}

#[ibctest_test]
async fn start_publishes_rpc_and_grpc() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let node = app_node(&mock)?;
    let ctx = Context::background();
    assert_eq!(node.rpc_address().unwrap_err().code, Code::FailedPrecondition);
    node.initialize(&ctx).await?;

    node.start(&ctx).await?;

    assert_eq!(node.state(), ParticipantState::Running);
    let spec = mock.container_spec(node.name()).expect("app container");
    assert_eq!(spec.cmd, vec!["pd", "start", "--host", "0.0.0.0", "-r", "/root/.penumbra"]);
    assert_eq!(spec.exposed_ports, vec!["26658/tcp", "26657/tcp", "9090/tcp"]);
    assert_eq!(node.rpc_address()?, "127.0.0.1:32769");
    assert_eq!(node.grpc_address()?, "127.0.0.1:32770");
    Ok(())
}
