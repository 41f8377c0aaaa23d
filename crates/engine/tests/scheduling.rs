//! Launcher scheduling behavior against a scripted transport

mod common;

use common::{collect, simple_suite, write_suite, MockTransport};
use specline_common::event::RunEvent;
use specline_common::result::Status;
use specline_engine::{Launcher, RunOptions, Toolkit};
use std::time::Duration;

#[tokio::test]
async fn five_suites_never_exceed_ceiling_of_two() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (0..5)
        .map(|i| {
            write_suite(
                dir.path(),
                &format!("suite{i}.yaml"),
                &simple_suite(&format!("suite {i}"), &[("ping", "/ping")]),
            )
        })
        .collect();

    let transport = MockTransport::new();
    transport.delay(Duration::from_millis(40));

    let options = RunOptions::default().with_parallel(2).unwrap();
    let launcher = Launcher::new(Toolkit::with_transport(transport.clone()), options).unwrap();
    let events = launcher.subscribe();

    let summary = launcher.run(paths).await;
    let events = collect(events).await;

    assert_eq!(summary.suites.total, 5);
    assert_eq!(summary.suites.passed, 5);
    assert_eq!(summary.specs.passed, 5);
    assert!(summary.success());
    assert_eq!(transport.calls().len(), 5);
    assert_eq!(transport.max_in_flight(), 2);

    assert_eq!(events.first().map(RunEvent::name), Some("run-start"));
    assert_eq!(events.last().map(RunEvent::name), Some("run-end"));
    assert_eq!(events.iter().filter(|e| e.name() == "suite-end").count(), 5);

    // The first two planned suites start before anything else
    let registered: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::SuiteRegistered { suite } => Some(suite.index),
            _ => None,
        })
        .collect();
    assert_eq!(registered.len(), 5);
    let mut first_two = registered[..2].to_vec();
    first_two.sort();
    assert_eq!(first_two, vec![0, 1]);
}

#[tokio::test]
async fn sequential_run_keeps_plan_order() {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|name| {
            write_suite(
                dir.path(),
                &format!("{name}.yaml"),
                &simple_suite(name, &[("ping", &format!("/{name}"))]),
            )
        })
        .collect();

    let transport = MockTransport::new();
    let launcher =
        Launcher::new(Toolkit::with_transport(transport.clone()), RunOptions::default()).unwrap();
    launcher.run(paths).await;

    let urls: Vec<String> = transport.calls().into_iter().map(|c| c.url).collect();
    assert_eq!(
        urls,
        vec!["http://api.test/a", "http://api.test/b", "http://api.test/c"]
    );
    assert_eq!(transport.max_in_flight(), 1);
}

#[tokio::test]
async fn every_spec_event_belongs_to_a_registered_suite() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_suite(
        dir.path(),
        "good.yaml",
        &simple_suite("good", &[("one", "/one"), ("two", "/two")]),
    );
    let broken = write_suite(dir.path(), "broken.yaml", "meta: [oops\n");

    let transport = MockTransport::new();
    let options = RunOptions::default().with_parallel(2).unwrap();
    let launcher = Launcher::new(Toolkit::with_transport(transport), options).unwrap();
    let events = launcher.subscribe();

    let summary = launcher.run(vec![good, broken]).await;
    let events = collect(events).await;

    assert_eq!(summary.suites.passed, 1);
    assert_eq!(summary.suites.failed, 1);
    assert!(!summary.success());

    for index in [0usize, 1] {
        let of_suite: Vec<&RunEvent> = events
            .iter()
            .filter(|e| match e {
                RunEvent::SuiteRegistered { suite }
                | RunEvent::SpecStart { suite, .. }
                | RunEvent::SpecPass { suite, .. }
                | RunEvent::SpecFail { suite, .. }
                | RunEvent::SpecSkip { suite, .. } => suite.index == index,
                RunEvent::SuiteEnd { report } => report.suite.index == index,
                _ => false,
            })
            .collect();
        assert_eq!(of_suite.first().map(|e| e.name()), Some("suite-registered"));
        assert_eq!(of_suite.last().map(|e| e.name()), Some("suite-end"));
    }

    let broken_end = events.iter().find_map(|e| match e {
        RunEvent::SuiteEnd { report } if report.suite.index == 1 => Some(report.clone()),
        _ => None,
    });
    let broken_end = broken_end.unwrap();
    assert_eq!(broken_end.status, Status::Fail);
    assert_eq!(broken_end.error.as_ref().unwrap().kind, "YAMLSuiteLoadingError");
}
