// tests/executor_scenarios.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use tasksched::config::ConfigFile;
use tasksched::engine::TaskEngine;
use tasksched::errors::TaskschedError;
use tasksched::exec::{ExecutorExit, ExecutorOptions};
use tasksched::lifecycle::Transition;
use tasksched::stats::HealthGrade;
use tasksched::store::TaskStore;
use tasksched::task::ListFilter;
use tasksched::types::{FailureKind, Priority, TaskStatus};
use tasksched_test_utils::builders::TaskSpecBuilder;
use tasksched_test_utils::fake_backend::{FakeBackend, Step};
use tasksched_test_utils::{eventually, init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn fast_options() -> ExecutorOptions {
    ExecutorOptions {
        retry_backoff: Duration::from_millis(20),
        ..ExecutorOptions::default()
    }
}

fn engine_with(backend: &FakeBackend, options: ExecutorOptions) -> TaskEngine {
    init_tracing();
    let store = Arc::new(TaskStore::in_memory().expect("in-memory store"));
    TaskEngine::new(store, Arc::new(backend.clone()), options)
}

fn status_of(engine: &TaskEngine, id: &str) -> TaskStatus {
    engine.status(id).expect("task exists").status
}

#[tokio::test]
async fn dependency_and_priority_order_end_to_end() -> TestResult {
    let backend = FakeBackend::new();
    let engine = engine_with(&backend, fast_options());

    engine.submit(TaskSpecBuilder::new("A").id("A").priority(Priority::High).build())?;
    engine.submit(
        TaskSpecBuilder::new("B")
            .id("B")
            .priority(Priority::Critical)
            .after("A")
            .build(),
    )?;
    engine.submit(TaskSpecBuilder::new("C").id("C").priority(Priority::Low).build())?;

    engine.start_executor(false)?;
    let exit = with_timeout(engine.join_executor()).await?;

    assert_eq!(exit, Some(ExecutorExit::Idle));
    assert_eq!(backend.invocations(), vec!["A", "B", "C"]);
    for id in ["A", "B", "C"] {
        let task = engine.status(id)?;
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result.as_deref(), Some(id));
    }

    let stats = engine.statistics()?;
    assert_eq!(stats.lifetime.completed, 3);
    assert_eq!(stats.completion_rate, 100.0);
    assert_eq!(stats.health_grade, HealthGrade::Good);
    Ok(())
}

#[tokio::test]
async fn always_failing_task_retries_then_fails() -> TestResult {
    let backend = FakeBackend::new().always("D", Step::fail("boom"));
    let engine = engine_with(&backend, fast_options());

    engine.submit(TaskSpecBuilder::new("D").id("D").retry_limit(2).build())?;
    engine.start_executor(false)?;
    let exit = with_timeout(engine.join_executor()).await?;
    assert_eq!(exit, Some(ExecutorExit::Idle));

    let path: Vec<TaskStatus> = engine
        .store()
        .events_for("D")?
        .into_iter()
        .map(|e| e.to)
        .collect();
    use TaskStatus::*;
    assert_eq!(
        path,
        vec![
            Queued, Running, Retrying, Queued, Running, Retrying, Queued, Running, Failed
        ]
    );

    let d = engine.status("D")?;
    assert_eq!(d.status, TaskStatus::Failed);
    assert_eq!(d.retry_count, 2);
    assert_eq!(d.error.as_deref(), Some("boom"));
    assert_eq!(d.failure_kind, Some(FailureKind::Exit));
    assert_eq!(backend.invocation_count("D"), 3);

    let stats = engine.statistics()?;
    assert_eq!(stats.lifetime.retries, 2);
    assert_eq!(stats.lifetime.failed, 1);
    Ok(())
}

#[tokio::test]
async fn slow_task_times_out_at_its_own_timeout() -> TestResult {
    let backend = FakeBackend::new().always("E", Step::Sleep(Duration::from_secs(5)));
    let engine = engine_with(&backend, fast_options());

    engine.submit(
        TaskSpecBuilder::new("E")
            .id("E")
            .timeout(Duration::from_secs(1))
            .retry_limit(0)
            .build(),
    )?;

    let started = tokio::time::Instant::now();
    engine.start_executor(false)?;
    with_timeout(engine.join_executor()).await?;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(950), "took {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "took {elapsed:?}");

    let e = engine.status("E")?;
    assert_eq!(e.status, TaskStatus::Failed);
    assert_eq!(e.failure_kind, Some(FailureKind::Timeout));
    assert!(e.error.as_deref().unwrap_or_default().starts_with("TimeoutError"));
    let ran = e.execution_time.unwrap_or_default();
    assert!(ran >= Duration::from_millis(950) && ran < Duration::from_secs(3), "ran {ran:?}");

    assert_eq!(engine.statistics()?.lifetime.timeouts, 1);
    Ok(())
}

#[tokio::test]
async fn backing_off_task_does_not_hold_up_others() -> TestResult {
    let backend = FakeBackend::new().then("flaky", [Step::fail("first try")]);
    let engine = engine_with(
        &backend,
        ExecutorOptions {
            retry_backoff: Duration::from_millis(300),
            ..ExecutorOptions::default()
        },
    );

    engine.submit(
        TaskSpecBuilder::new("flaky")
            .id("flaky")
            .priority(Priority::Critical)
            .build(),
    )?;
    engine.submit(TaskSpecBuilder::new("other").id("other").priority(Priority::Low).build())?;

    engine.start_executor(false)?;
    let exit = with_timeout(engine.join_executor()).await?;

    assert_eq!(exit, Some(ExecutorExit::Idle));
    assert_eq!(backend.invocations(), vec!["flaky", "other", "flaky"]);
    let flaky = engine.status("flaky")?;
    assert_eq!(flaky.status, TaskStatus::Completed);
    assert_eq!(flaky.retry_count, 1);
    Ok(())
}

#[tokio::test]
async fn backend_errors_become_task_failures() -> TestResult {
    let backend = FakeBackend::new().always("broken", Step::Error("spawn failed".to_string()));
    let engine = engine_with(&backend, fast_options());

    engine.submit(TaskSpecBuilder::new("broken").id("broken").retry_limit(0).build())?;
    engine.submit(TaskSpecBuilder::new("fine").id("fine").priority(Priority::Low).build())?;
    engine.start_executor(false)?;
    let exit = with_timeout(engine.join_executor()).await?;

    // A bad task never kills the loop.
    assert_eq!(exit, Some(ExecutorExit::Idle));
    let broken = engine.status("broken")?;
    assert_eq!(broken.status, TaskStatus::Failed);
    assert_eq!(broken.failure_kind, Some(FailureKind::Error));
    assert!(broken.error.as_deref().unwrap_or_default().contains("spawn failed"));
    assert_eq!(status_of(&engine, "fine"), TaskStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn marker_tasks_complete_without_invocation() -> TestResult {
    let backend = FakeBackend::new();
    let engine = engine_with(&backend, fast_options());

    engine.submit(TaskSpecBuilder::marker("checkpoint").id("m").build())?;
    engine.submit(TaskSpecBuilder::new("after").id("after").after("m").build())?;
    engine.start_executor(false)?;
    with_timeout(engine.join_executor()).await?;

    assert_eq!(status_of(&engine, "m"), TaskStatus::Completed);
    assert_eq!(status_of(&engine, "after"), TaskStatus::Completed);
    assert_eq!(backend.invocations(), vec!["after"]);
    Ok(())
}

#[tokio::test]
async fn stop_on_error_halts_after_first_failure() -> TestResult {
    let backend = FakeBackend::new().always("bad", Step::fail("nope"));
    let engine = engine_with(&backend, fast_options());

    engine.submit(
        TaskSpecBuilder::new("bad")
            .id("bad")
            .priority(Priority::High)
            .retry_limit(0)
            .build(),
    )?;
    engine.submit(TaskSpecBuilder::new("good").id("good").priority(Priority::Low).build())?;

    engine.start_executor(true)?;
    let exit = with_timeout(engine.join_executor()).await?;

    assert_eq!(exit, Some(ExecutorExit::StoppedOnError));
    assert_eq!(status_of(&engine, "bad"), TaskStatus::Failed);
    assert_eq!(status_of(&engine, "good"), TaskStatus::Queued);
    assert_eq!(backend.invocations(), vec!["bad"]);
    assert!(!engine.is_running());
    Ok(())
}

#[tokio::test]
async fn second_start_is_rejected_and_stop_waits_for_in_flight_task() -> TestResult {
    let backend = FakeBackend::new().always("slow", Step::Sleep(Duration::from_millis(300)));
    let engine = engine_with(&backend, fast_options());

    engine.submit(TaskSpecBuilder::new("slow").id("slow").priority(Priority::High).build())?;
    engine.submit(TaskSpecBuilder::new("next").id("next").priority(Priority::Low).build())?;

    engine.start_executor(false)?;
    assert!(matches!(
        engine.start_executor(true),
        Err(TaskschedError::ExecutorAlreadyRunning)
    ));

    assert!(eventually(Duration::from_secs(2), || status_of(&engine, "slow") == TaskStatus::Running).await);
    assert!(engine.stop_executor(Some(Duration::from_secs(2))).await?);

    // The in-flight task was allowed to finish; nothing else was started.
    assert_eq!(status_of(&engine, "slow"), TaskStatus::Completed);
    assert_eq!(status_of(&engine, "next"), TaskStatus::Queued);
    assert!(!engine.is_running());

    // The flag is clear again, so a new loop may start.
    engine.start_executor(false)?;
    assert_eq!(with_timeout(engine.join_executor()).await?, Some(ExecutorExit::Idle));
    assert_eq!(status_of(&engine, "next"), TaskStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn stop_with_short_wait_reports_busy_loop() -> TestResult {
    let backend = FakeBackend::new().always("slow", Step::Sleep(Duration::from_millis(500)));
    let engine = engine_with(&backend, fast_options());

    engine.submit(TaskSpecBuilder::new("slow").id("slow").build())?;
    engine.start_executor(false)?;
    assert!(eventually(Duration::from_secs(2), || status_of(&engine, "slow") == TaskStatus::Running).await);

    assert!(!engine.stop_executor(Some(Duration::from_millis(50))).await?);
    assert!(engine.is_running());

    assert_eq!(with_timeout(engine.join_executor()).await?, Some(ExecutorExit::Stopped));
    assert_eq!(status_of(&engine, "slow"), TaskStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn idle_loop_wakes_on_submit_when_not_exiting() -> TestResult {
    let backend = FakeBackend::new();
    let engine = engine_with(
        &backend,
        ExecutorOptions {
            exit_when_idle: false,
            ..fast_options()
        },
    );

    engine.start_executor(false)?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.is_running());

    let id = engine.submit(TaskSpecBuilder::new("late").build())?;
    assert!(eventually(Duration::from_secs(2), || status_of(&engine, &id) == TaskStatus::Completed).await);

    assert!(engine.stop_executor(Some(Duration::from_secs(1))).await?);
    assert!(!engine.is_running());
    assert_eq!(engine.join_executor().await?, None);
    Ok(())
}

#[tokio::test]
async fn cancel_queued_and_running_tasks() -> TestResult {
    let backend = FakeBackend::new().always("hang", Step::Hang);
    let engine = engine_with(&backend, fast_options());

    engine.submit(
        TaskSpecBuilder::new("hang")
            .id("hang")
            .priority(Priority::Critical)
            .timeout(Duration::from_secs(30))
            .build(),
    )?;
    engine.submit(TaskSpecBuilder::new("queued").id("queued").build())?;

    // QUEUED: synchronous.
    assert!(engine.cancel("queued")?);
    assert_eq!(status_of(&engine, "queued"), TaskStatus::Cancelled);
    assert!(!engine.cancel("queued")?);
    assert!(!engine.cancel("missing")?);

    // RUNNING: best-effort, recorded once the invocation returns.
    engine.start_executor(false)?;
    assert!(eventually(Duration::from_secs(2), || status_of(&engine, "hang") == TaskStatus::Running).await);
    assert!(engine.cancel("hang")?);

    let exit = with_timeout(engine.join_executor()).await?;
    assert_eq!(exit, Some(ExecutorExit::Idle));

    let hang = engine.status("hang")?;
    assert_eq!(hang.status, TaskStatus::Cancelled);
    assert!(hang.completed_at.is_some());
    assert_eq!(backend.invocations(), vec!["hang"]);
    assert_eq!(engine.statistics()?.lifetime.cancelled, 2);
    Ok(())
}

#[tokio::test]
async fn cancel_refuses_running_task_with_no_live_invocation() -> TestResult {
    let backend = FakeBackend::new();
    let engine = engine_with(&backend, fast_options());

    // Left RUNNING without any executor picking it up.
    engine.submit(TaskSpecBuilder::new("stale").id("stale").build())?;
    engine.store().transition("stale", Transition::Claim)?;
    assert!(!engine.cancel("stale")?);
    assert_eq!(status_of(&engine, "stale"), TaskStatus::Running);

    // A task that already finished is not cancelled either.
    engine.submit(TaskSpecBuilder::new("quick").id("quick").build())?;
    engine.start_executor(false)?;
    with_timeout(engine.join_executor()).await?;
    assert_eq!(status_of(&engine, "quick"), TaskStatus::Completed);
    assert!(!engine.cancel("quick")?);

    assert_eq!(engine.statistics()?.lifetime.cancelled, 0);
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn single_threaded_runtime_drives_an_on_disk_store() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let mut config = ConfigFile::default();
    config.store_dir = dir.path().join("store");
    config.executor.retry_backoff = Duration::from_millis(10);

    let backend = FakeBackend::new().then("flaky", [Step::fail("once")]);
    let engine = TaskEngine::open(&config, Arc::new(backend.clone()))?;
    engine.submit(TaskSpecBuilder::new("flaky").id("flaky").retry_limit(1).build())?;
    engine.submit(TaskSpecBuilder::new("steady").id("steady").build())?;

    // The runtime keeps serving other tasks while the loop commits to disk.
    let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let ticker = {
        let ticks = Arc::clone(&ticks);
        tokio::spawn(async move {
            loop {
                ticks.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    engine.start_executor(false)?;
    let exit = with_timeout(engine.join_executor()).await?;
    ticker.abort();

    assert_eq!(exit, Some(ExecutorExit::Idle));
    assert!(ticks.load(std::sync::atomic::Ordering::SeqCst) > 0);
    assert_eq!(backend.invocation_count("flaky"), 2);
    drop(engine);

    let reopened = TaskStore::open_dir(config.store_options())?;
    for id in ["flaky", "steady"] {
        assert_eq!(reopened.get(id)?.status, TaskStatus::Completed);
    }
    assert_eq!(reopened.get("flaky")?.retry_count, 1);
    assert_eq!(reopened.statistics()?.lifetime.retries, 1);
    Ok(())
}

#[tokio::test]
async fn manual_retry_paths() -> TestResult {
    let backend = FakeBackend::new().always("fails", Step::fail("bad"));
    let engine = engine_with(&backend, fast_options());

    engine.submit(TaskSpecBuilder::new("fails").id("fails").retry_limit(0).build())?;
    engine.submit(TaskSpecBuilder::new("waits").id("waits").after("fails").build())?;
    engine.start_executor(false)?;
    with_timeout(engine.join_executor()).await?;

    assert_eq!(status_of(&engine, "fails"), TaskStatus::Failed);
    assert!(matches!(
        engine.retry("fails"),
        Err(TaskschedError::RetryLimitExceeded { .. })
    ));
    assert!(!engine.retry("waits")?, "QUEUED tasks cannot be retried");
    assert!(!engine.retry("missing")?);

    let report = engine.blocked_report()?;
    assert_eq!(report.blocked.len(), 1);
    assert_eq!(report.blocked[0].task_id, "waits");
    Ok(())
}

#[tokio::test]
async fn at_most_one_task_runs_under_concurrent_callers() -> TestResult {
    let backend = (0..8).fold(FakeBackend::new(), |backend, i| {
        backend.always(&format!("job-{i}"), Step::Sleep(Duration::from_millis(15)))
    });
    let engine = Arc::new(engine_with(
        &backend,
        ExecutorOptions {
            exit_when_idle: false,
            ..fast_options()
        },
    ));

    engine.start_executor(false)?;

    let submitter = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            for i in 0..8 {
                let name = format!("job-{i}");
                engine
                    .submit(TaskSpecBuilder::new(&name).id(&name).build())
                    .expect("submit");
                if i % 3 == 2 {
                    let _ = engine.cancel(&format!("job-{}", i - 1));
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };

    let mut max_running = 0;
    let done = eventually(Duration::from_secs(4), || {
        let running = engine
            .list(&ListFilter::status(TaskStatus::Running))
            .expect("list")
            .len();
        max_running = max_running.max(running);
        let stats = engine.statistics().expect("stats");
        stats.total_tasks == 8
            && stats.count_of(TaskStatus::Queued) == 0
            && stats.count_of(TaskStatus::Running) == 0
    })
    .await;
    submitter.await?;

    assert!(done, "queue did not drain");
    assert!(max_running <= 1, "observed {max_running} RUNNING tasks");
    assert_eq!(backend.max_concurrency(), 1);

    engine.stop_executor(Some(Duration::from_secs(1))).await?;
    Ok(())
}

#[tokio::test]
async fn engine_open_recovers_interrupted_tasks() -> TestResult {
    init_tracing();
    let dir = TempDir::new()?;
    let mut config = ConfigFile::default();
    config.store_dir = dir.path().join("store");
    config.executor.retry_backoff = Duration::from_millis(10);

    {
        let store = TaskStore::open_dir(config.store_options())?;
        store.add(TaskSpecBuilder::new("work").id("work").build())?;
        store.transition("work", Transition::Claim)?;
    }

    let backend = FakeBackend::new();
    let engine = TaskEngine::open(&config, Arc::new(backend.clone()))?;

    let work = engine.status("work")?;
    assert_eq!(work.status, TaskStatus::Queued);
    assert_eq!(work.retry_count, 1);
    assert_eq!(work.failure_kind, Some(FailureKind::Interrupted));

    engine.start_executor(false)?;
    with_timeout(engine.join_executor()).await?;
    assert_eq!(status_of(&engine, "work"), TaskStatus::Completed);
    assert_eq!(backend.invocations(), vec!["work"]);
    Ok(())
}
