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

//! Relayer query results, shared by every commander.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelCounterparty {
    pub port_id: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelOutput {
    /// e.g. `STATE_OPEN`.
    pub state: String,
    /// e.g. `ORDER_UNORDERED`.
    pub ordering: String,
    pub counterparty: ChannelCounterparty,
    #[serde(default)]
    pub connection_hops: Vec<String>,
    pub version: String,
    pub port_id: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionVersion {
    pub identifier: String,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MerklePrefix {
    pub key_prefix: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionCounterparty {
    pub client_id: String,
    #[serde(default)]
    pub connection_id: String,
    #[serde(default)]
    pub prefix: MerklePrefix,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionOutput {
    pub id: String,
    pub client_id: String,
    pub versions: Vec<ConnectionVersion>,
    pub state: String,
    pub counterparty: ConnectionCounterparty,
    /// Nanoseconds, as a decimal string.
    pub delay_period: String,
}

/// A relayer key on one chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RelayerWallet {
    pub mnemonic: String,
    pub address: String,
}
