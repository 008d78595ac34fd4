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

//! Utilities for deserializing types with intermediate shell-expansion.

use core::fmt::Display;
use core::marker::PhantomData;
use core::str::FromStr;
use core::time::Duration;

use serde::{Deserialize, Deserializer, de};
use serde_with::{DeserializeAs, Same, SerializeAs, serde_as};

/// Invokes shell-expansion when the value is a string and parses the result,
/// otherwise deserializes the value normally.
///
/// ```rust
/// # use core::time::Duration;
/// # use serde::Deserialize;
/// # use serde_with::serde_as;
/// # use ibctest_config::deser::{ShellExpand, ShellExpandDuration};
/// #[serde_as]
/// #[derive(Deserialize)]
/// struct Docker {
///     #[serde_as(as = "ShellExpand")]
///     log_tail: u64,
///     #[serde_as(as = "ShellExpandDuration")]
///     grace: Duration,
/// }
///
/// let docker: Docker = serde_json5::from_str(r#"{ log_tail: "50", grace: "30s" }"#).unwrap();
/// assert_eq!(docker.log_tail, 50);
/// assert_eq!(docker.grace, Duration::from_secs(30));
/// ```
///
/// The second type parameter picks the parser applied to the expanded
/// string. [`ShellExpandDuration`] parses human readable durations such as
/// `"30s"` or `"1m 30s"`.
#[derive(Debug)]
pub struct ShellExpand<De = Same, Conv = Same>(PhantomData<(De, Conv)>);

pub trait ShellExpandable<T> {
    fn convert<'de, D: Deserializer<'de>>(s: &str) -> Result<T, D::Error>;
}

impl<'de, De, Conv, T> DeserializeAs<'de, T> for ShellExpand<De, Conv>
where
    De: DeserializeAs<'de, T>,
    Conv: ShellExpandable<T>,
{
    fn deserialize_as<D>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
    {
        /// Strings are caught by the `String` variant and go through shell
        /// expansion; everything else is deserialized via `A`.
        #[serde_as]
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOr<A, B> {
            #[serde(skip)]
            _A(PhantomData<A>),

            String(String),

            Or(
                #[serde_as(as = "A")]
                #[serde(bound(deserialize = "A: DeserializeAs<'de, B>"))]
                B,
            ),
        }

        match StringOr::<De, T>::deserialize(deserializer)? {
            StringOr::_A(_) => unreachable!("serde skips deserializing this variant"),
            StringOr::String(s) => {
                let expanded = shellexpand::env(&s).map_err(de::Error::custom)?;
                Conv::convert::<D>(&expanded)
            }
            StringOr::Or(t) => Ok(t),
        }
    }
}

impl<Se, Conv, T: ?Sized> SerializeAs<T> for ShellExpand<Se, Conv>
where
    Se: SerializeAs<T>,
{
    fn serialize_as<S>(source: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        Se::serialize_as(source, serializer)
    }
}

impl<T> ShellExpandable<T> for Same
where
    T: FromStr<Err: Display>,
{
    fn convert<'de, D: Deserializer<'de>>(s: &str) -> Result<T, D::Error> {
        T::from_str(s).map_err(de::Error::custom)
    }
}

/// Parser marker for `humantime` durations.
#[derive(Debug, Clone, Copy)]
pub struct HumanDuration;

impl ShellExpandable<Duration> for HumanDuration {
    fn convert<'de, D: Deserializer<'de>>(s: &str) -> Result<Duration, D::Error> {
        humantime::parse_duration(s).map_err(de::Error::custom)
    }
}

pub type ShellExpandDuration<De = Same> = ShellExpand<De, HumanDuration>;
