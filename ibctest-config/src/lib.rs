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

//! Configuration for test topologies: docker daemon access, readiness
//! polling, relayers and chains. Files are JSON5 and string fields may
//! reference environment variables.

pub mod deser;

use core::time::Duration;
use std::path::Path;

use ibctest_error::{Error, ResultExt, make_input_err};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::deser::{ShellExpand, ShellExpandDuration};

/// Root of a harness configuration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    #[serde(default)]
    pub docker: DockerConfig,
    /// Backoff used while waiting for started nodes and relayers.
    #[serde(default)]
    pub readiness: RetryConfig,
    #[serde(default)]
    pub relayers: Vec<RelayerConfig>,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
}

impl HarnessConfig {
    pub fn from_json5_str(content: &str) -> Result<Self, Error> {
        serde_json5::from_str(content).err_tip(|| "while parsing harness config")
    }

    pub fn from_json5_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .err_tip(|| format!("while reading harness config {}", path.display()))?;
        Self::from_json5_str(&content)
            .err_tip(|| format!("in harness config {}", path.display()))
    }

    pub fn chain(&self, chain_id: &str) -> Result<&ChainConfig, Error> {
        self.chains
            .iter()
            .find(|chain| chain.chain_id == chain_id)
            .ok_or_else(|| make_input_err!("no chain with id {chain_id} in harness config"))
    }
}

/// A container image reference split into repository and tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerImage {
    pub repository: String,
    pub version: String,
    /// `uid:gid` the image's process runs as, when it is not root.
    #[serde(default)]
    pub uid_gid: Option<String>,
}

impl ContainerImage {
    pub fn new(repository: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            version: version.into(),
            uid_gid: None,
        }
    }

    #[must_use]
    pub fn with_uid_gid(mut self, uid_gid: impl Into<String>) -> Self {
        self.uid_gid = Some(uid_gid.into());
        self
    }

    /// Pull reference, `repository:version`.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.version)
    }
}

fn default_utility_image() -> ContainerImage {
    ContainerImage::new("busybox", "stable")
}

const fn default_stop_grace_period() -> Duration {
    Duration::from_secs(30)
}

const fn default_log_tail() -> u64 {
    50
}

const fn default_true() -> bool {
    true
}

const fn default_connect_timeout() -> Duration {
    Duration::from_secs(120)
}

/// How the docker daemon is reached and how containers are torn down.
#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DockerConfig {
    /// `unix:///path/to/docker.sock` or `tcp://host:port`. Local defaults
    /// (including `DOCKER_HOST`) are used when unset.
    #[serde(default)]
    #[serde_as(as = "Option<ShellExpand>")]
    pub host: Option<String>,
    #[serde(default = "default_connect_timeout")]
    #[serde_as(as = "ShellExpandDuration")]
    pub connect_timeout: Duration,
    /// Time a container gets to exit after SIGTERM before it is killed.
    #[serde(default = "default_stop_grace_period")]
    #[serde_as(as = "ShellExpandDuration")]
    pub stop_grace_period: Duration,
    /// Log lines captured from a long-running container when it stops.
    #[serde(default = "default_log_tail")]
    #[serde_as(as = "ShellExpand")]
    pub log_tail: u64,
    #[serde(default = "default_true")]
    pub pull_images: bool,
    /// Image used to read and write files in volumes.
    #[serde(default = "default_utility_image")]
    pub utility_image: ContainerImage,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            host: None,
            connect_timeout: default_connect_timeout(),
            stop_grace_period: default_stop_grace_period(),
            log_tail: default_log_tail(),
            pull_images: true,
            utility_image: default_utility_image(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// The delay doubles after every attempt.
    #[default]
    Exponential,
    Fixed,
}

const fn default_max_retries() -> usize {
    10
}

const fn default_retry_delay() -> Duration {
    Duration::from_millis(100)
}

/// Bounded retry policy.
#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Retries after the first attempt. Zero attempts once.
    #[serde(default = "default_max_retries")]
    #[serde_as(as = "ShellExpand")]
    pub max_retries: usize,

    /// Delay before the first retry.
    #[serde(default = "default_retry_delay")]
    #[serde_as(as = "ShellExpandDuration")]
    pub delay: Duration,

    #[serde(default)]
    pub backoff: Backoff,

    /// Amount of jitter as a fraction of the delay. A delay `d` becomes a
    /// random value in `d * (1 - jitter / 2) ..= d * (1 + jitter / 2)`.
    #[serde(default)]
    pub jitter: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay: default_retry_delay(),
            backoff: Backoff::default(),
            jitter: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayerKind {
    /// The cosmos `rly` relayer.
    Rly,
    Hermes,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayerConfig {
    pub kind: RelayerKind,
    /// Overrides the relayer's default image.
    #[serde(default)]
    pub image: Option<ContainerImage>,
    #[serde(default = "default_true")]
    pub pull_image: bool,
}

/// Chain parameters shared by node participants and relayer configuration.
#[serde_as]
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChainConfig {
    /// Chain family, e.g. `cosmos`.
    #[serde(rename = "type")]
    pub chain_type: String,
    /// Logical name; several chains may share one.
    pub name: String,
    pub chain_id: String,
    pub images: Vec<ContainerImage>,
    /// Binary inside the image.
    pub bin: String,
    pub bech32_prefix: String,
    pub denom: String,
    /// Minimum gas price with its denom, e.g. `0.01uatom`.
    pub gas_prices: String,
    pub gas_adjustment: f64,
    /// Light client trusting period, e.g. `330h`.
    #[serde_as(as = "ShellExpand")]
    pub trusting_period: String,
    #[serde(default)]
    pub no_host_mount: bool,
}

impl ChainConfig {
    /// The image nodes of this chain run.
    pub fn image(&self) -> Result<&ContainerImage, Error> {
        self.images
            .first()
            .ok_or_else(|| make_input_err!("chain {} has no images configured", self.chain_id))
    }

    /// Splits `gas_prices` into its numeric amount and denom.
    pub fn gas_price_amount(&self) -> Result<(f64, &str), Error> {
        let split = self
            .gas_prices
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(self.gas_prices.len());
        let (amount, denom) = self.gas_prices.split_at(split);
        let amount = amount
            .parse::<f64>()
            .map_err(|e| make_input_err!("invalid gas price {:?}: {e}", self.gas_prices))?;
        Ok((amount, denom))
    }
}

/// A parachain collated by nodes attached to a relay chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParachainConfig {
    /// Collator binary inside `image`.
    pub bin: String,
    pub chain_id: String,
    pub image: ContainerImage,
    /// Extra collator flags, placed before the relay chain separator.
    #[serde(default)]
    pub flags: Vec<String>,
    /// Flags of the embedded relay chain node.
    #[serde(default)]
    pub relay_chain_flags: Vec<String>,
}
