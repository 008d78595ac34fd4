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

use ibctest_config::{Backoff, ContainerImage, HarnessConfig, ParachainConfig, RelayerKind};
use ibctest_error::Code;
use pretty_assertions::assert_eq;

const GAIA_CONFIG: &str = r#"
{
  // Two chains sharing a logical name.
  docker: {
    stop_grace_period: "10s",
    log_tail: 100,
  },
  readiness: {
    max_retries: 4,
    delay: "250ms",
    backoff: "fixed",
  },
  relayers: [
    { kind: "rly" },
    {
      kind: "hermes",
      image: { repository: "ghcr.io/informalsystems/hermes", version: "1.4.0", uid_gid: "1000:1000" },
      pull_image: false,
    },
  ],
  chains: [
    {
      "type": "cosmos",
      name: "gaia",
      chain_id: "gaia-1",
      images: [{ repository: "ghcr.io/strangelove-ventures/heighliner/gaia", version: "v7.0.1" }],
      bin: "gaiad",
      bech32_prefix: "cosmos",
      denom: "uatom",
      gas_prices: "0.01uatom",
      gas_adjustment: 1.3,
      trusting_period: "504h",
    },
    {
      "type": "cosmos",
      name: "gaia",
      chain_id: "gaia-2",
      images: [{ repository: "ghcr.io/strangelove-ventures/heighliner/gaia", version: "v7.0.1" }],
      bin: "gaiad",
      bech32_prefix: "cosmos",
      denom: "uatom",
      gas_prices: "0.01uatom",
      gas_adjustment: 1.3,
      trusting_period: "504h",
    },
  ],
}
"#;

#[test]
fn parses_full_harness_config() {
    let config = HarnessConfig::from_json5_str(GAIA_CONFIG).unwrap();

    assert_eq!(config.docker.stop_grace_period, Duration::from_secs(10));
    assert_eq!(config.docker.log_tail, 100);
    assert!(config.docker.pull_images);
    assert_eq!(config.docker.utility_image.reference(), "busybox:stable");

    assert_eq!(config.readiness.max_retries, 4);
    assert_eq!(config.readiness.delay, Duration::from_millis(250));
    assert_eq!(config.readiness.backoff, Backoff::Fixed);

    assert_eq!(config.relayers.len(), 2);
    assert_eq!(config.relayers[0].kind, RelayerKind::Rly);
    assert!(config.relayers[0].pull_image);
    assert_eq!(
        config.relayers[1].image,
        Some(ContainerImage::new("ghcr.io/informalsystems/hermes", "1.4.0").with_uid_gid("1000:1000"))
    );

    let gaia2 = config.chain("gaia-2").unwrap();
    assert_eq!(gaia2.name, "gaia");
    assert_eq!(
        gaia2.image().unwrap().reference(),
        "ghcr.io/strangelove-ventures/heighliner/gaia:v7.0.1"
    );
}

#[test]
fn defaults_apply_to_empty_config() {
    let config = HarnessConfig::from_json5_str("{}").unwrap();
    assert_eq!(config.docker.stop_grace_period, Duration::from_secs(30));
    assert_eq!(config.docker.log_tail, 50);
    assert_eq!(config.readiness.max_retries, 10);
    assert_eq!(config.readiness.backoff, Backoff::Exponential);
    assert!(config.chains.is_empty());
}

#[test]
fn unknown_fields_are_rejected() {
    let err = HarnessConfig::from_json5_str("{ docker: { hots: \"tcp://x\" } }").unwrap_err();
    assert_eq!(err.code, Code::InvalidArgument);
}

#[test]
fn unknown_chain_is_input_error() {
    let config = HarnessConfig::from_json5_str(GAIA_CONFIG).unwrap();
    assert_eq!(config.chain("osmosis-1").unwrap_err().code, Code::InvalidArgument);
}

#[test]
fn gas_price_splits_amount_and_denom() {
    let config = HarnessConfig::from_json5_str(GAIA_CONFIG).unwrap();
    let (amount, denom) = config.chain("gaia-1").unwrap().gas_price_amount().unwrap();
    assert_eq!(amount, 0.01);
    assert_eq!(denom, "uatom");
}

#[test]
fn parachain_flags_default_to_empty() {
    let config: ParachainConfig = serde_json5::from_str(
        r#"{
            bin: "parachain-collator",
            chain_id: "dev",
            image: { repository: "ghcr.io/strangelove-ventures/heighliner/composable", version: "v2.1.9" },
        }"#,
    )
    .unwrap();
    assert_eq!(config.bin, "parachain-collator");
    assert_eq!(config.image.reference(), "ghcr.io/strangelove-ventures/heighliner/composable:v2.1.9");
    assert!(config.flags.is_empty());
    assert!(config.relay_chain_flags.is_empty());
}
