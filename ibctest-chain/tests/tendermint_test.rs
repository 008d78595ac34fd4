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
use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use ibctest_chain::{NodeOptions, NodeStatus, StatusClient, TendermintNode, peer_string};
use ibctest_config::{Backoff, ChainConfig, ContainerImage, DockerConfig, RetryConfig};
use ibctest_docker::mock_runtime::{MockOp, MockRuntime};
use ibctest_docker::{ParticipantState, RecordingExecReporter};
use ibctest_error::{Code, Error, make_err};
use ibctest_macro::ibctest_test;
use ibctest_util::context::Context;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

const TEST_NAME: &str = "TestChain/two gaias";

/// Answers from a script, then repeats the last answer.
#[derive(Debug, Default)]
struct ScriptedStatus {
    answers: Mutex<VecDeque<Result<NodeStatus, Error>>>,
    queried: Mutex<Vec<String>>,
}

impl ScriptedStatus {
    fn new(answers: impl IntoIterator<Item = Result<NodeStatus, Error>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            queried: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl StatusClient for ScriptedStatus {
    async fn status(&self, rpc_addr: &str) -> Result<NodeStatus, Error> {
        self.queried.lock().push(rpc_addr.to_string());
        let mut answers = self.answers.lock();
        if answers.len() > 1 {
            return answers.pop_front().expect("non-empty");
        }
        answers
            .front()
            .cloned()
            .unwrap_or_else(|| Err(make_err!(Code::Unavailable, "no answers scripted")))
    }
}

const fn synced(height: u64) -> NodeStatus {
    NodeStatus {
        latest_block_height: height,
        catching_up: false,
    }
}

fn gaia(chain_id: &str) -> ChainConfig {
    ChainConfig {
        chain_type: "cosmos".to_string(),
        name: "gaia".to_string(),
        chain_id: chain_id.to_string(),
        images: vec![
            ContainerImage::new("ghcr.io/strangelove-ventures/heighliner/gaia", "v7.0.0")
                .with_uid_gid("1025:1025"),
        ],
        bin: "gaiad".to_string(),
        bech32_prefix: "cosmos".to_string(),
        denom: "uatom".to_string(),
        gas_prices: "0.01uatom".to_string(),
        gas_adjustment: 1.3,
        trusting_period: "504h".to_string(),
        no_host_mount: false,
    }
}

fn node(
    mock: &MockRuntime,
    chain_id: &str,
    index: usize,
    status: Arc<ScriptedStatus>,
) -> Result<TendermintNode, Error> {
    TendermintNode::new(
        Arc::new(mock.clone()),
        gaia(chain_id),
        NodeOptions {
            index,
            test_name: TEST_NAME.to_string(),
            network_id: Some("ibctest-network".to_string()),
            docker: DockerConfig::default(),
            readiness: RetryConfig {
                max_retries: 5,
                delay: Duration::from_millis(100),
                backoff: Backoff::Fixed,
                jitter: 0.0,
            },
        },
        status,
    )
}

#[ibctest_test]
async fn names_and_home() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let node = node(&mock, "gaia-1", 0, ScriptedStatus::new([]))?;

    assert_eq!(node.name(), "node-0-gaia-1-TestChain_two_gaias");
    assert_eq!(node.host_name(), node.name());
    assert_eq!(node.home_dir(), "/var/tendermint/gaia");
    Ok(())
}

#[ibctest_test]
async fn init_home_folder_runs_chain_binary() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let node = node(&mock, "gaia-1", 0, ScriptedStatus::new([]))?;
    let ctx = Context::background();
    let reporter = RecordingExecReporter::new();

    node.initialize(&ctx).await?;
    node.init_validator_files(&ctx, &reporter).await?;

    let init = mock
        .created_specs()
        .into_iter()
        .find(|spec| spec.cmd.first().map(String::as_str) == Some("gaiad"))
        .expect("init job");
    assert_eq!(init.cmd, vec!["gaiad", "init", "validator", "--home", "/var/tendermint/gaia"]);
    assert_eq!(init.user.as_deref(), Some("1025:1025"));
    assert_eq!(reporter.len(), 1);
    Ok(())
}

#[ibctest_test(start_paused = true)]
async fn start_waits_until_caught_up() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let status = ScriptedStatus::new([
        Err(make_err!(Code::Unavailable, "connection refused")),
        Ok(NodeStatus {
            latest_block_height: 1,
            catching_up: true,
        }),
        Ok(synced(3)),
    ]);
    let node = node(&mock, "gaia-1", 0, status.clone())?;
    let ctx = Context::background();

    node.initialize(&ctx).await?;
    node.start(&ctx, &["--x-crisis-skip-assert-invariants"]).await?;

    assert_eq!(node.state(), ParticipantState::Running);
    assert_eq!(status.queried.lock().len(), 3);
    // Ports are published in the order they are exposed.
    assert_eq!(node.rpc_address()?, "127.0.0.1:32769");
    assert_eq!(status.queried.lock()[0], "127.0.0.1:32769");

    let spec = mock.container_spec(node.name()).expect("node container");
    assert_eq!(
        spec.cmd,
        vec!["gaiad", "start", "--home", "/var/tendermint/gaia", "--x-crisis-skip-assert-invariants"]
    );
    assert!(spec.publish_all_ports);
    assert_eq!(
        spec.exposed_ports,
        vec!["26656/tcp", "26657/tcp", "9090/tcp", "1317/tcp", "1234/tcp"]
    );
    assert_eq!(node.height(&ctx).await?, 3);
    Ok(())
}

#[ibctest_test(start_paused = true)]
async fn start_gives_up_on_a_node_that_never_syncs() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let status = ScriptedStatus::new([Ok(NodeStatus {
        latest_block_height: 1,
        catching_up: true,
    })]);
    let node = node(&mock, "gaia-1", 0, status.clone())?;
    let ctx = Context::background();
    node.initialize(&ctx).await?;

    let err = node.start(&ctx, &[]).await.unwrap_err();

    assert_eq!(err.code, Code::DeadlineExceeded);
    assert!(err.message_string().contains("still catching up"), "{err:?}");
    assert_eq!(status.queried.lock().len(), 6);
    Ok(())
}

#[ibctest_test]
async fn height_requires_running_node() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let node = node(&mock, "gaia-1", 0, ScriptedStatus::new([Ok(synced(7))]))?;

    let err = node.height(&Context::background()).await.unwrap_err();
    assert_eq!(err.code, Code::FailedPrecondition);
    Ok(())
}

#[ibctest_test]
async fn genesis_round_trip() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let node = node(&mock, "gaia-1", 0, ScriptedStatus::new([]))?;
    let ctx = Context::background();
    node.initialize(&ctx).await?;

    let genesis = br#"{"chain_id":"gaia-1","initial_height":"1"}"#.to_vec();
    node.overwrite_genesis_file(&ctx, genesis.clone()).await?;

    assert_eq!(node.genesis_file_content(&ctx).await?, genesis);
    let write = mock
        .created_specs()
        .into_iter()
        .find(|spec| spec.name.starts_with("ibctest-writefile-"))
        .expect("write job");
    assert_eq!(write.user.as_deref(), Some("0:0"));
    assert_eq!(
        &write.cmd[3..],
        ["_", "/mnt/dockervolume/config/genesis.json", "1025:1025"]
    );
    Ok(())
}

#[ibctest_test]
async fn peer_string_skips_self() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let ctx = Context::background();
    let mut nodes = Vec::new();
    for (index, id) in ["aaaa", "bbbb", "cccc"].into_iter().enumerate() {
        let node = node(&mock, "gaia-1", index, ScriptedStatus::new([]))?;
        node.initialize(&ctx).await?;
        let volume = node.participant().volume_name().expect("volume");
        mock.put_volume_file(
            &volume,
            "config/node_key.json",
            format!(r#"{{"id":"{id}","priv_key":{{"type":"tendermint/PrivKeyEd25519","value":"AAAA"}}}}"#),
        )?;
        nodes.push(node);
    }

    assert_eq!(
        peer_string(&ctx, &nodes, 1).await?,
        "aaaa@node-0-gaia-1-TestChain_two_gaias:26656,cccc@node-2-gaia-1-TestChain_two_gaias:26656"
    );
    Ok(())
}

#[ibctest_test]
async fn same_named_chains_do_not_collide() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let ctx = Context::background();
    let first = node(&mock, "gaia-1", 0, ScriptedStatus::new([Ok(synced(1))]))?;
    let second = node(&mock, "gaia-2", 0, ScriptedStatus::new([Ok(synced(1))]))?;

    first.initialize(&ctx).await?;
    second.initialize(&ctx).await?;
    first.start(&ctx, &[]).await?;
    second.start(&ctx, &[]).await?;

    assert_ne!(first.name(), second.name());
    assert_ne!(first.participant().volume_name(), second.participant().volume_name());
    assert_eq!(mock.volume_names().len(), 2);

    let reporter = RecordingExecReporter::new();
    first.cleanup(&ctx, &reporter).await?;
    second.cleanup(&ctx, &reporter).await?;
    assert_eq!(mock.count(MockOp::RemoveVolume), 2);
    assert!(mock.container_names().is_empty());
    assert_eq!(reporter.len(), 2);
    Ok(())
}
