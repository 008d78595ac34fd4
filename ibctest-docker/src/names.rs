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

use std::collections::HashMap;

use rand::Rng;

/// Label put on every container and volume created for a test run. The
/// value is the run id, see [`sanitize_container_name`].
pub const CLEANUP_LABEL: &str = "ibctest";

/// User that one-off ownership jobs run as.
pub const ROOT_USER: &str = "0:0";

/// Longest hostname the runtime accepts.
const MAX_HOSTNAME_LEN: usize = 64;
const HOSTNAME_KEEP: usize = 30;

/// Replaces characters the runtime rejects in container names with `_`.
pub fn sanitize_container_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Shortens `name` to a valid hostname, keeping its head and tail.
pub fn condense_host_name(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    if chars.len() <= MAX_HOSTNAME_LEN {
        return name.to_string();
    }
    let head: String = chars[..HOSTNAME_KEEP].iter().collect();
    let tail: String = chars[chars.len() - HOSTNAME_KEEP..].iter().collect();
    format!("{head}_._{tail}")
}

/// `n` random lowercase ASCII letters.
pub fn random_suffix(n: usize) -> String {
    let mut rng = rand::rng();
    (0..n)
        .map(|_| char::from(rng.random_range(b'a'..=b'z')))
        .collect()
}

/// Labels tying a resource to the run `run_id`.
pub fn cleanup_labels(run_id: &str) -> HashMap<String, String> {
    HashMap::from([(CLEANUP_LABEL.to_string(), run_id.to_string())])
}
