#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use common::{RecordingReporter, Scripted, ScriptedClient, eventually};
use invite_core::{JobEvent, RemoteError, ReplyTarget, WorkerConfig, WorkerState};
use invite_worker::ShutdownReport;

const LIMIT: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn repeated_signals_cancel_the_in_flight_job_once() -> Result<(), Box<dyn Error>> {
    let client = Arc::new(ScriptedClient::new().script("stuck", vec![Scripted::Hang]));
    let reporter = Arc::new(RecordingReporter::new());
    let service = common::start(&client, &reporter).await;
    let mut events = service.subscribe();

    let ack = service.request_join(ReplyTarget::new("a"), "stuck")?;
    eventually(LIMIT, || client.calls().len() == 1).await;
    assert_eq!(service.state(), WorkerState::Running);

    let (first, second) = tokio::join!(service.shutdown("SIGINT"), service.shutdown("SIGTERM"));

    let reports = [first, second];
    let completed: Vec<_> = reports
        .iter()
        .filter(|r| matches!(r, ShutdownReport::Completed { .. }))
        .collect();
    assert_eq!(completed.len(), 1);
    assert!(reports.contains(&ShutdownReport::AlreadyDraining));
    assert_eq!(
        *completed[0],
        ShutdownReport::Completed {
            forced: false,
            abandoned_job: Some(ack.job_id),
            abandoned_queued: 0,
        }
    );

    assert_eq!(client.cancelled(), 1);
    assert!(reporter.reports().is_empty());
    assert_eq!(service.state(), WorkerState::Stopped);

    let mut transitions = Vec::new();
    let mut abandoned = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            JobEvent::WorkerStateChanged { new_state, .. } => transitions.push(new_state),
            JobEvent::JobAbandoned { .. } => abandoned += 1,
            _ => {}
        }
    }
    assert_eq!(transitions, vec![WorkerState::Draining, WorkerState::Stopped]);
    assert_eq!(abandoned, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn signal_after_stop_is_a_no_op() {
    let client = Arc::new(ScriptedClient::new());
    let reporter = Arc::new(RecordingReporter::new());
    let service = common::start(&client, &reporter).await;

    let report = service.shutdown("SIGTERM").await;
    assert_eq!(
        report,
        ShutdownReport::Completed {
            forced: false,
            abandoned_job: None,
            abandoned_queued: 0,
        }
    );
    assert_eq!(service.shutdown("SIGINT").await, ShutdownReport::AlreadyDraining);
    assert_eq!(service.state(), WorkerState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn queued_jobs_are_abandoned_without_outcomes() -> Result<(), Box<dyn Error>> {
    let client = Arc::new(ScriptedClient::new().script("stuck", vec![Scripted::Hang]));
    let reporter = Arc::new(RecordingReporter::new());
    let service = common::start(&client, &reporter).await;

    service.request_join(ReplyTarget::new("a"), "stuck")?;
    service.request_join(ReplyTarget::new("b"), "waiting-1")?;
    service.request_join(ReplyTarget::new("c"), "waiting-2")?;
    eventually(LIMIT, || client.calls().len() == 1).await;

    match service.shutdown("SIGTERM").await {
        ShutdownReport::Completed {
            abandoned_job,
            abandoned_queued,
            ..
        } => {
            assert!(abandoned_job.is_some());
            assert_eq!(abandoned_queued, 2);
        }
        other => panic!("unexpected report {:?}", other),
    }

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(client.call_order(), vec!["stuck"]);
    assert!(reporter.reports().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_a_throttle_sleep() -> Result<(), Box<dyn Error>> {
    let client = Arc::new(ScriptedClient::new().script(
        "busy",
        vec![Scripted::Fail(RemoteError::Throttled {
            retry_after: Some(Duration::from_secs(3600)),
        })],
    ));
    let reporter = Arc::new(RecordingReporter::new());
    let service = common::start(&client, &reporter).await;

    let ack = service.request_join(ReplyTarget::new("a"), "busy")?;
    eventually(LIMIT, || reporter.reports().len() == 1).await;

    let report = service.shutdown("SIGINT").await;
    assert_eq!(
        report,
        ShutdownReport::Completed {
            forced: false,
            abandoned_job: Some(ack.job_id),
            abandoned_queued: 0,
        }
    );
    // Only the intermediate throttle notice was sent.
    assert_eq!(reporter.terminal_count(), 0);
    assert_eq!(client.calls().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stopped_resolves_after_shutdown() {
    let client = Arc::new(ScriptedClient::new());
    let reporter = Arc::new(RecordingReporter::new());
    let service = common::start(&client, &reporter).await;
    let coordinator = service.coordinator();
    let states = coordinator.watch_state();
    assert_eq!(*states.borrow(), WorkerState::Running);

    let waiter = tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move { coordinator.stopped().await }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    coordinator.shutdown("SIGTERM").await;
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("stopped resolves")
        .expect("waiter task");
    assert_eq!(*states.borrow(), WorkerState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stuck_worker_is_aborted_after_the_grace_period() -> Result<(), Box<dyn Error>> {
    let config = WorkerConfig {
        shutdown_grace_secs: 1,
        ..WorkerConfig::default()
    };
    let client = Arc::new(
        ScriptedClient::new().script("stuck", vec![Scripted::Block(Duration::from_secs(3))]),
    );
    let reporter = Arc::new(RecordingReporter::new());
    let service = common::start_with(config, &client, &reporter).await;
    let mut events = service.subscribe();

    let ack = service.request_join(ReplyTarget::new("a"), "stuck")?;
    eventually(LIMIT, || client.calls().len() == 1).await;

    let started = tokio::time::Instant::now();
    let report = service.shutdown("SIGTERM").await;
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(
        report,
        ShutdownReport::Completed {
            forced: true,
            abandoned_job: Some(ack.job_id),
            abandoned_queued: 0,
        }
    );
    assert_eq!(service.state(), WorkerState::Stopped);

    let mut abandoned = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let JobEvent::JobAbandoned { job_id, .. } = event {
            abandoned.push(job_id);
        }
    }
    assert_eq!(abandoned, vec![ack.job_id]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn job_handed_over_during_shutdown_is_abandoned() -> Result<(), Box<dyn Error>> {
    let client = Arc::new(ScriptedClient::new());
    let reporter = Arc::new(RecordingReporter::new());
    let service = common::start(&client, &reporter).await;
    let mut events = service.subscribe();

    // No yield between the enqueue and the shutdown: the job is either in
    // the queue or already in the worker's dequeue reply.
    let ack = service.request_join(ReplyTarget::new("a"), "late")?;
    let report = service.shutdown("SIGINT").await;

    assert_eq!(
        report,
        ShutdownReport::Completed {
            forced: false,
            abandoned_job: Some(ack.job_id),
            abandoned_queued: 0,
        }
    );
    assert!(client.calls().is_empty());
    assert!(reporter.reports().is_empty());

    let abandoned = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|event| matches!(event, JobEvent::JobAbandoned { .. }))
        .count();
    assert_eq!(abandoned, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn oversized_retry_delay_saturates_in_events() -> Result<(), Box<dyn Error>> {
    let client = Arc::new(ScriptedClient::new().script(
        "forever",
        vec![Scripted::Fail(RemoteError::Throttled {
            retry_after: Some(Duration::from_secs(u64::MAX)),
        })],
    ));
    let reporter = Arc::new(RecordingReporter::new());
    let service = common::start(&client, &reporter).await;
    let mut events = service.subscribe();

    let ack = service.request_join(ReplyTarget::new("a"), "forever")?;
    eventually(LIMIT, || reporter.reports().len() == 1).await;

    let delays: Vec<u64> = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            JobEvent::JobRetrying { delay_ms, .. } => Some(delay_ms),
            _ => None,
        })
        .collect();
    assert_eq!(delays, vec![u64::MAX]);

    let report = service.shutdown("SIGINT").await;
    assert_eq!(
        report,
        ShutdownReport::Completed {
            forced: false,
            abandoned_job: Some(ack.job_id),
            abandoned_queued: 0,
        }
    );
    Ok(())
}
