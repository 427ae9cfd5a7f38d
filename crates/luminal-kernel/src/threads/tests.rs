use super::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ============================================================================
// run
// ============================================================================

#[test]
fn run_without_tasks_reports_empty_queue() {
    let manager = ThreadManager::new("empty");
    assert!(matches!(manager.run(), Err(ThreadError::NoTasksQueued)));
}

#[test]
fn run_never_exceeds_thread_limit() {
    let manager = ThreadManager::new("bounded").with_thread_limit(2);
    let release = Arc::new(AtomicBool::new(false));

    for _ in 0..5 {
        let release = Arc::clone(&release);
        assert!(manager.append(
            move |ctx, _: ()| {
                while !release.load(Ordering::SeqCst) {
                    ctx.sleep(Duration::from_millis(5))?;
                }
                Ok(())
            },
            (),
        ));
    }

    match manager.run() {
        Err(ThreadError::LimitReached { limit, remaining }) => {
            assert_eq!(limit, 2);
            assert_eq!(remaining, 3);
        }
        other => panic!("expected LimitReached, got {other:?}"),
    }
    assert_eq!(manager.running_count(), 2);
    assert_eq!(manager.queued_count(), 3);

    // Busy workers are not pruned.
    assert!(matches!(
        manager.run(),
        Err(ThreadError::LimitReached { .. })
    ));
    assert_eq!(manager.running_count(), 2);

    release.store(true, Ordering::SeqCst);
    manager.halt();
}

#[test]
fn run_reuses_slots_of_finished_workers() {
    let manager = ThreadManager::new("reuse").with_thread_limit(1);
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let counter = Arc::clone(&counter);
        manager.append(
            move |_, _: ()| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            (),
        );
    }

    assert!(matches!(
        manager.run(),
        Err(ThreadError::LimitReached { remaining: 1, .. })
    ));
    assert!(wait_until(Duration::from_secs(5), || counter.load(Ordering::SeqCst) == 1));
    assert!(wait_until(Duration::from_secs(5), || {
        manager.prune();
        manager.running_count() == 0
    }));

    assert_eq!(manager.run().unwrap(), 1);
    assert!(wait_until(Duration::from_secs(5), || counter.load(Ordering::SeqCst) == 2));
}

#[test]
fn arguments_are_passed_to_the_task() {
    let manager = ThreadManager::new("args");
    let seen = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&seen);

    manager.append(
        move |_, (a, b): (usize, usize)| {
            sink.store(a + b, Ordering::SeqCst);
            Ok(())
        },
        (40, 2),
    );
    assert_eq!(manager.run().unwrap(), 1);
    assert!(wait_until(Duration::from_secs(5), || seen.load(Ordering::SeqCst) == 42));
}

// ============================================================================
// halt
// ============================================================================

#[test]
fn halted_worker_stops_at_next_checkpoint() {
    let manager = ThreadManager::new("halt");
    let started = Arc::new(AtomicBool::new(false));
    let unwound = Arc::new(AtomicBool::new(false));

    let (started_flag, unwound_flag) = (Arc::clone(&started), Arc::clone(&unwound));
    manager.append(
        move |ctx, _: ()| {
            started_flag.store(true, Ordering::SeqCst);
            loop {
                if let Err(halted) = ctx.checkpoint() {
                    unwound_flag.store(true, Ordering::SeqCst);
                    return Err(halted.into());
                }
                std::thread::sleep(Duration::from_millis(2));
            }
        },
        (),
    );
    manager.run().unwrap();
    assert!(wait_until(Duration::from_secs(5), || started.load(Ordering::SeqCst)));
    assert_eq!(manager.running_count(), 1);

    assert_eq!(manager.halt(), 1);
    assert!(unwound.load(Ordering::SeqCst));
    assert_eq!(manager.running_count(), 0);
}

#[test]
fn halt_worker_reports_final_state() {
    let manager = ThreadManager::new("single");
    manager.append(
        |ctx, _: ()| {
            ctx.sleep(Duration::from_secs(30))?;
            Ok(())
        },
        (),
    );
    manager.run().unwrap();

    let id = manager.running_ids()[0];
    assert_eq!(manager.halt_worker(id), Some(WorkerState::Halted));
    assert_eq!(manager.halt_worker(id), None);
}

#[test]
fn failing_task_is_marked_failed() {
    let manager = ThreadManager::new("failing");
    manager.append(|_, _: ()| anyhow::bail!("boom"), ());
    manager.run().unwrap();

    let id = manager.running_ids()[0];
    assert!(wait_until(Duration::from_secs(5), || {
        manager.worker_state(id) == Some(WorkerState::Failed)
    }));
}

// ============================================================================
// watch
// ============================================================================

#[test]
fn watch_drains_all_tasks_with_limit_one() {
    let manager = Arc::new(
        ThreadManager::new("drain")
            .with_thread_limit(1)
            .with_poll_interval(Duration::from_millis(5)),
    );
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..6 {
        let counter = Arc::clone(&counter);
        manager.append(
            move |_, _: ()| {
                std::thread::sleep(Duration::from_millis(2));
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            (),
        );
    }

    manager.watch().unwrap();
    assert!(matches!(manager.watch(), Err(ThreadError::AlreadyWatching)));
    assert!(wait_until(Duration::from_secs(10), || counter.load(Ordering::SeqCst) == 6));

    manager.stop();
    assert!(wait_until(Duration::from_secs(5), || !manager.is_watching()));
    assert_eq!(manager.queued_count(), 0);
    assert_eq!(manager.running_count(), 0);
}

#[test]
fn watch_can_restart_after_stop() {
    let manager =
        Arc::new(ThreadManager::new("restart").with_poll_interval(Duration::from_millis(5)));
    manager.watch().unwrap();
    manager.stop();
    assert!(wait_until(Duration::from_secs(5), || !manager.is_watching()));

    manager.watch().unwrap();
    manager.stop();
    assert!(wait_until(Duration::from_secs(5), || !manager.is_watching()));
}

#[test]
fn thread_limit_is_clamped() {
    let manager = ThreadManager::new("clamp");
    assert_eq!(manager.thread_limit(), DEFAULT_THREAD_LIMIT);
    manager.set_thread_limit(0);
    assert_eq!(manager.thread_limit(), 1);
}

#[tokio::test]
async fn async_halt_signal_wakes_waiter() {
    let manager = ThreadManager::new("async");
    let woke = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&woke);

    manager.append(
        move |ctx, _: ()| {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            rt.block_on(async {
                tokio::select! {
                    _ = ctx.halted() => flag.store(true, Ordering::SeqCst),
                    _ = tokio::time::sleep(Duration::from_secs(30)) => {}
                }
            });
            ctx.checkpoint()?;
            Ok(())
        },
        (),
    );
    manager.run().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let reclaimed = tokio::task::spawn_blocking(move || manager.halt()).await.unwrap();
    assert_eq!(reclaimed, 1);
    assert!(woke.load(Ordering::SeqCst));
}
