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
use ibctest_config::ContainerImage;
use ibctest_docker::job::{ArchiveUpload, CommandSpec, JobOptions, JobRunner};
use ibctest_docker::mock_runtime::{MockOp, MockOutcome, MockRuntime};
use ibctest_docker::names::CLEANUP_LABEL;
use ibctest_docker::reporter::RecordingExecReporter;
use ibctest_error::{Code, Error, make_err};
use ibctest_macro::ibctest_test;
use ibctest_util::context::Context;
use pretty_assertions::assert_eq;

const RUN_ID: &str = "TestJobs";

fn runner(mock: &MockRuntime) -> JobRunner {
    JobRunner::new(
        Arc::new(mock.clone()),
        ContainerImage::new("ghcr.io/cosmos/relayer", "v2.0.0"),
        RUN_ID,
        "rly-TestJobs",
    )
}

#[ibctest_test]
async fn job_output_is_captured_and_container_removed() -> Result<(), Error> {
    let mock = MockRuntime::new();
    mock.set_outcome_fn(|_, argv| MockOutcome::success(format!("{}\n", argv.join(" "))));

    let result = runner(&mock)
        .run(
            &Context::background(),
            &CommandSpec::new(["rly", "version"]),
            JobOptions {
                name_detail: "version".to_string(),
                ..JobOptions::default()
            },
        )
        .await;

    assert_eq!(result.error, None);
    assert_eq!(result.exit_code, 0);
    assert_eq!(result.stdout, Bytes::from("rly version\n"));
    assert!(mock.container_names().is_empty(), "job container was not removed");

    let specs = mock.created_specs();
    assert_eq!(specs.len(), 1);
    let name = &specs[0].name;
    assert!(name.starts_with("rly-TestJobs-version-"), "unexpected name {name}");
    assert_eq!(name.len(), "rly-TestJobs-version-".len() + 5);
    assert_eq!(specs[0].labels.get(CLEANUP_LABEL).map(String::as_str), Some(RUN_ID));
    assert_eq!(specs[0].image, "ghcr.io/cosmos/relayer:v2.0.0");
    Ok(())
}

#[ibctest_test]
async fn non_zero_exit_is_left_to_the_caller() -> Result<(), Error> {
    let mock = MockRuntime::new();
    mock.set_outcome_fn(|_, _| MockOutcome::failure(3, "Error: no such path\n"));

    let result = runner(&mock)
        .run(&Context::background(), &CommandSpec::new(["rly", "tx", "link"]), JobOptions::default())
        .await;

    assert_eq!(result.error, None);
    assert_eq!(result.exit_code, 3);
    assert!(!result.is_success());

    let err = result.into_output().unwrap_err();
    assert_eq!(err.code, Code::Aborted);
    assert!(err.message_string().contains("no such path"), "{err:?}");
    Ok(())
}

#[ibctest_test]
async fn runtime_failure_is_carried_in_result() -> Result<(), Error> {
    let mock = MockRuntime::new();
    mock.fail(
        MockOp::CreateContainer,
        make_err!(Code::Unavailable, "Cannot connect to the Docker daemon"),
    );

    let result = runner(&mock)
        .run(&Context::background(), &CommandSpec::new(["true"]), JobOptions::default())
        .await;

    let err = result.error.clone().unwrap();
    assert_eq!(err.code, Code::Unavailable);
    assert!(err.message_string().contains("while creating one-off container"));
    assert_eq!(mock.count(MockOp::StartContainer), 0);
    assert!(result.into_output().is_err());
    Ok(())
}

#[ibctest_test]
async fn archive_is_copied_before_start() -> Result<(), Error> {
    let mock = MockRuntime::new();
    let runner = runner(&mock);

    let archive = ibctest_docker::archive::ArchiveBuilder::new("100:1000")
        .file("gaia-1.config", "{}")?
        .build()?;
    let result = runner
        .run(
            &Context::background(),
            &CommandSpec::new(["chown", "-R", "100:1000", "/var/relayer-rly"]),
            JobOptions {
                name_detail: "untar-chown".to_string(),
                archive: Some(ArchiveUpload {
                    path: "/var/relayer-rly".to_string(),
                    content: archive,
                }),
                ..JobOptions::default()
            },
        )
        .await;
    assert_eq!(result.error, None);

    let ops: Vec<MockOp> = mock.calls().into_iter().map(|call| call.op).collect();
    let upload = ops.iter().position(|op| *op == MockOp::UploadArchive);
    let start = ops.iter().position(|op| *op == MockOp::StartContainer);
    assert!(upload.is_some() && upload < start, "calls out of order: {ops:?}");
    Ok(())
}

#[ibctest_test(start_paused = true)]
async fn cancelled_job_returns_promptly() -> Result<(), Error> {
    let mock = MockRuntime::new();
    mock.set_outcome_fn(|_, _| MockOutcome::Hang);
    let runner = runner(&mock);

    let ctx = Context::background().with_cancel();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    let started = tokio::time::Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        runner.run(&ctx, &CommandSpec::new(["rly", "start", "path"]), JobOptions::default()),
    )
    .await
    .map_err(|_| make_err!(Code::Internal, "job did not return after cancel"))?;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(result.error.map(|e| e.code), Some(Code::Cancelled));
    Ok(())
}

#[ibctest_test(start_paused = true)]
async fn job_deadline_interrupts_hung_wait() -> Result<(), Error> {
    let mock = MockRuntime::new();
    mock.set_outcome_fn(|_, _| MockOutcome::Hang);

    let ctx = Context::background().with_timeout(Duration::from_secs(60));
    let result = runner(&mock)
        .run(&ctx, &CommandSpec::new(["sleep", "infinity"]), JobOptions::default())
        .await;

    assert_eq!(result.error.map(|e| e.code), Some(Code::DeadlineExceeded));
    Ok(())
}

#[ibctest_test(start_paused = true)]
async fn hung_removal_does_not_outlive_deadline() -> Result<(), Error> {
    let mock = MockRuntime::new();
    mock.set_outcome_fn(|_, _| MockOutcome::success("ok\n"));
    mock.hang(MockOp::RemoveContainer);

    let ctx = Context::background().with_timeout(Duration::from_secs(10));
    let started = tokio::time::Instant::now();
    let result = tokio::time::timeout(
        Duration::from_secs(600),
        runner(&mock).run(&ctx, &CommandSpec::new(["rly", "version"]), JobOptions::default()),
    )
    .await
    .map_err(|_| make_err!(Code::Internal, "job held past its deadline by container removal"))?;

    assert!(started.elapsed() <= Duration::from_secs(11));
    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.stdout, Bytes::from_static(b"ok\n"));
    assert_eq!(mock.count(MockOp::RemoveContainer), 1);
    Ok(())
}

#[ibctest_test]
async fn reported_job_reports_once() -> Result<(), Error> {
    let mock = MockRuntime::new();
    mock.set_outcome_fn(|_, _| MockOutcome::failure(1, "bad flag"));
    let reporter = RecordingExecReporter::new();

    let command = CommandSpec::new(["rly", "keys", "add", "gaia-1", "key"]);
    let result = runner(&mock)
        .run_reported(&Context::background(), &reporter, &command, JobOptions::default())
        .await;

    let reports = reporter.reports();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert!(report.container_name.starts_with("rly-TestJobs-"));
    assert_eq!(report.command, command.argv);
    assert_eq!(report.exit_code, 1);
    assert_eq!(report.stderr, result.stderr);
    assert!(report.started_at <= report.finished_at);
    Ok(())
}

#[ibctest_test]
async fn failed_create_reports_no_container_name() -> Result<(), Error> {
    let mock = MockRuntime::new();
    mock.fail(
        MockOp::CreateContainer,
        make_err!(Code::Unavailable, "daemon unreachable"),
    );
    let reporter = RecordingExecReporter::new();

    let command = CommandSpec::new(["rly", "version"]);
    let result = runner(&mock)
        .run_reported(&Context::background(), &reporter, &command, JobOptions::default())
        .await;

    let reports = reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].container_name, "");
    assert_eq!(reports[0].error.as_ref().map(|e| e.code), Some(Code::Unavailable));
    assert_eq!(result.error.map(|e| e.code), Some(Code::Unavailable));
    Ok(())
}
