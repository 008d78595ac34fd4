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

use ibctest_error::{Code, Error, ResultExt, error_if, make_err, make_parse_err};
use pretty_assertions::assert_eq;

#[test]
fn err_tip_appends_message_and_keeps_code() {
    let result: Result<(), Error> = Err(make_err!(Code::NotFound, "no such container"));
    let err = result.err_tip(|| "while stopping abc").unwrap_err();
    assert_eq!(err.code, Code::NotFound);
    assert_eq!(
        err.messages,
        vec!["no such container".to_string(), "while stopping abc".to_string()]
    );
}

#[test]
fn option_err_tip_uses_given_code() {
    let missing: Option<u8> = None;
    let err = missing
        .err_tip_with_code(|_| (Code::FailedPrecondition, "no container"))
        .unwrap_err();
    assert_eq!(err.code, Code::FailedPrecondition);
    assert_eq!(err.message_string(), "no container");
}

#[test]
fn merge_option_keeps_both_sides() {
    let merged = Error::merge_option(
        Some(make_err!(Code::DeadlineExceeded, "readiness timed out")),
        Some(make_err!(Code::Unavailable, "connection refused")),
    )
    .unwrap();
    assert_eq!(merged.code, Code::DeadlineExceeded);
    assert_eq!(
        merged.message_string(),
        "readiness timed out : --- : connection refused"
    );
}

#[test]
fn parse_errors_are_data_loss() {
    let err = make_parse_err!("unexpected output {:?}", "garbage");
    assert_eq!(err.code, Code::DataLoss);
}

#[test]
fn error_if_returns_invalid_argument() {
    fn check(version: &str) -> Result<(), Error> {
        error_if!(version.is_empty(), "version must not be empty");
        Ok(())
    }
    assert_eq!(check("ics20-1"), Ok(()));
    assert_eq!(check("").unwrap_err().code, Code::InvalidArgument);
}

#[test]
fn docker_not_found_maps_to_not_found() {
    let err: Error = bollard::errors::Error::DockerResponseServerError {
        status_code: 404,
        message: "No such container: abc".to_string(),
    }
    .into();
    assert_eq!(err.code, Code::NotFound);
}

#[test]
fn docker_status_codes_map_to_error_codes() {
    let cases = [
        (409, Code::AlreadyExists),
        (400, Code::InvalidArgument),
        (403, Code::PermissionDenied),
        (503, Code::Internal),
        (304, Code::Unknown),
    ];
    for (status_code, expected) in cases {
        let err: Error = bollard::errors::Error::DockerResponseServerError {
            status_code,
            message: "conflict".to_string(),
        }
        .into();
        assert_eq!(err.code, expected, "status {status_code}");
    }
}

#[test]
fn json_errors_are_data_loss() {
    let err: Error = serde_json::from_str::<serde_json::Value>("{not json")
        .unwrap_err()
        .into();
    assert_eq!(err.code, Code::DataLoss);
}

#[test]
fn display_omits_empty_messages() {
    assert_eq!(
        Error::from(Code::Cancelled).to_string(),
        "Error { code: Cancelled }"
    );
}
