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

use core::fmt;

use ibctest_error::{Error, make_input_err};
use serde::{Deserialize, Serialize};

const PORT_ID_MIN_LEN: usize = 2;
const PORT_ID_MAX_LEN: usize = 128;

/// Ordering of an IBC channel. The zero value is invalid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
    #[default]
    Invalid,
    Ordered,
    Unordered,
}

impl ChannelOrder {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::Ordered => "ordered",
            Self::Unordered => "unordered",
        }
    }

    pub fn validate(self) -> Result<(), Error> {
        match self {
            Self::Ordered | Self::Unordered => Ok(()),
            Self::Invalid => Err(make_input_err!("invalid channel ordering {self}")),
        }
    }
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a new channel.
///
/// The default is an ICS-20 fungible token transfer channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CreateChannelOptions {
    pub source_port: String,
    pub dest_port: String,
    pub order: ChannelOrder,
    pub version: String,
}

impl Default for CreateChannelOptions {
    fn default() -> Self {
        Self {
            source_port: "transfer".to_string(),
            dest_port: "transfer".to_string(),
            order: ChannelOrder::Unordered,
            version: "ics20-1".to_string(),
        }
    }
}

impl CreateChannelOptions {
    pub fn validate(&self) -> Result<(), Error> {
        validate_port_id(&self.source_port)
            .map_err(|e| e.append("invalid source port"))?;
        validate_port_id(&self.dest_port)
            .map_err(|e| e.append("invalid destination port"))?;
        if self.version.is_empty() {
            return Err(make_input_err!("invalid channel version: version is empty"));
        }
        self.order.validate()
    }
}

/// Checks `id` against the ICS-24 port identifier syntax.
pub fn validate_port_id(id: &str) -> Result<(), Error> {
    if id.trim().is_empty() {
        return Err(make_input_err!("identifier cannot be blank"));
    }
    if id.contains('/') {
        return Err(make_input_err!("identifier {id} cannot contain separator '/'"));
    }
    if !(PORT_ID_MIN_LEN..=PORT_ID_MAX_LEN).contains(&id.len()) {
        return Err(make_input_err!(
            "identifier {id} has invalid length {}, must be between {PORT_ID_MIN_LEN}-{PORT_ID_MAX_LEN} characters",
            id.len()
        ));
    }
    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || "._+-#[]<>".contains(*c)))
    {
        return Err(make_input_err!(
            "identifier {id} must contain only alphanumeric or the following characters: '.', '_', '+', '-', '#', '[', ']', '<', '>', found {c:?}"
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use ibctest_error::Code;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn port_ids() {
        for ok in ["transfer", "ab", "icahost", "wasm.cosmos1abc", "port-1_[x]<y>#z+"] {
            assert_eq!(validate_port_id(ok), Ok(()), "{ok}");
        }
        let too_long = "p".repeat(129);
        for bad in ["", " ", "a", "trans/fer", "port id", "port!", too_long.as_str()] {
            assert_eq!(
                validate_port_id(bad).map_err(|e| e.code),
                Err(Code::InvalidArgument),
                "{bad:?}"
            );
        }
    }
}
