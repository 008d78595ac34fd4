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

//! Ephemeral IBC test topologies on a container runtime.
//!
//! Chain nodes and relayers are participants: each owns a labeled volume
//! holding its home directory and at most one long-running container, and
//! runs everything else as one-off jobs against that volume. Everything a
//! run creates carries the run id label and can be swept afterwards.

pub use {
    ibctest_chain as chain, ibctest_config as config, ibctest_docker as docker,
    ibctest_error as error, ibctest_relayer as relayer, ibctest_util as util,
};
