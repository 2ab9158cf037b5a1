mod common;

use std::{sync::Arc, thread, time::Duration};

use common::{advance, harness};
use countdown::{
    services::JobStatus,
    state::RunState,
    tasks::background_worker::FINISHED_TEXT,
};
use tokio::time::timeout;

#[tokio::test(start_paused = true)]
async fn foreground_run_completes_with_one_alert() {
    let h = harness();
    h.state.select_time(0, 0, 5).unwrap();

    let started = h.state.start().unwrap();
    assert_eq!(started.state, RunState::Running);
    assert_eq!(started.formatted_time, "00:00:05");

    advance(5_100).await;

    let snapshot = h.state.snapshot().unwrap();
    assert_eq!(snapshot.state, RunState::Completed);
    assert_eq!(snapshot.remaining_ms, 0);
    assert_eq!(snapshot.progress, 0.0);
    assert_eq!(h.alerts.count(), 1);
    assert!(h.notifier.posts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn foreground_publishes_every_tick() {
    let h = harness();
    h.state.select_time(0, 0, 12).unwrap();
    let mut rx = h.state.snapshot_tx.subscribe();
    h.state.start().unwrap();

    let mut seen = Vec::new();
    loop {
        rx.changed().await.unwrap();
        let snapshot = rx.borrow_and_update().clone();
        let done = snapshot.state == RunState::Completed;
        seen.push(snapshot);
        if done {
            break;
        }
    }

    let remaining: Vec<u64> = seen.iter().map(|s| s.remaining_ms).collect();
    assert!(remaining.windows(2).all(|pair| pair[0] >= pair[1]));
    assert_eq!(*remaining.last().unwrap(), 0);
    for second in 1..=11 {
        assert!(remaining.contains(&(second * 1_000)), "missed tick at {}s", second);
    }

    let critical_at = |ms: u64| seen.iter().find(|s| s.remaining_ms == ms).unwrap().is_critical;
    assert!(!critical_at(11_000));
    assert!(critical_at(10_000));
    assert!(critical_at(1_000));
    assert!(!seen.last().unwrap().is_critical);
}

#[tokio::test(start_paused = true)]
async fn start_twice_keeps_the_first_run() {
    let h = harness();
    h.state.select_time(0, 0, 3).unwrap();

    let first = h.state.start().unwrap();
    advance(1_000).await;
    h.state.select_time(0, 1, 0).unwrap();
    let second = h.state.start().unwrap();

    assert_eq!(first.run_id, second.run_id);
    assert_eq!(second.total_ms, 3_000);

    advance(2_500).await;
    assert_eq!(h.state.snapshot().unwrap().state, RunState::Completed);
    assert_eq!(h.alerts.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_selection_does_not_start() {
    let h = harness();

    let snapshot = h.state.start().unwrap();
    assert_eq!(snapshot.state, RunState::Idle);
    assert!(snapshot.run_id.is_none());
}

#[tokio::test(start_paused = true)]
async fn cancel_stops_the_countdown() {
    let h = harness();
    h.state.select_time(0, 0, 5).unwrap();
    h.state.start().unwrap();

    advance(1_500).await;
    let cancelled = h.state.cancel().unwrap();
    assert_eq!(cancelled.state, RunState::Cancelled);
    assert!(!cancelled.is_critical);

    advance(10_000).await;
    let later = h.state.snapshot().unwrap();
    assert_eq!(later.state, RunState::Cancelled);
    assert_eq!(later.remaining_ms, cancelled.remaining_ms);
    assert_eq!(h.alerts.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn reset_returns_to_idle_and_clears_marker() {
    let h = harness();
    h.state.select_time(0, 0, 2).unwrap();
    let run_id = h.state.start().unwrap().run_id.unwrap();
    advance(2_100).await;
    assert!(h.state.alert_gate.has_fired(run_id));

    let reset = h.state.reset().unwrap();
    assert_eq!(reset.state, RunState::Idle);
    assert_eq!(reset.total_ms, 0);
    assert_eq!(reset.remaining_ms, 0);
    assert!(!h.state.alert_gate.has_fired(run_id));
}

#[tokio::test(start_paused = true)]
async fn reset_while_running_cancels_first() {
    let h = harness();
    h.state.select_time(0, 0, 5).unwrap();
    h.state.start().unwrap();
    advance(1_000).await;

    assert_eq!(h.state.reset().unwrap().state, RunState::Idle);
    advance(6_000).await;
    assert_eq!(h.state.snapshot().unwrap().state, RunState::Idle);
    assert_eq!(h.alerts.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn detached_run_finishes_in_background() {
    let h = harness();
    h.state.select_time(0, 0, 5).unwrap();
    h.state.start().unwrap();

    advance(2_500).await;
    let run_id = h.state.detach().unwrap().expect("running countdown is handed off");

    let record = h.state.scheduler.progress(run_id).unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.remaining_ms, 2_500);

    advance(1_100).await;
    let mirrored = h.state.snapshot().unwrap();
    assert!(mirrored.handed_off);
    assert_eq!(mirrored.state, RunState::Running);
    assert_eq!(mirrored.remaining_ms, 1_500);

    advance(1_500).await;
    let finished = h.state.snapshot().unwrap();
    assert_eq!(finished.state, RunState::Completed);
    assert!(!finished.handed_off);
    assert_eq!(finished.remaining_ms, 0);

    assert_eq!(h.alerts.count(), 1);
    assert_eq!(
        h.notifier.posts(),
        vec!["00:00:02", "00:00:01", "00:00:00", "00:00:00", FINISHED_TEXT]
    );
}

#[tokio::test(start_paused = true)]
async fn foreground_does_not_tick_after_handoff() {
    let h = harness();
    h.state.select_time(0, 0, 30).unwrap();
    h.state.start().unwrap();

    // Detach off the foreground's whole-second phase: background ticks land
    // on x.5 s, foreground ticks would land on whole seconds.
    advance(3_500).await;
    let run_id = h.state.detach().unwrap().unwrap();
    advance(5_300).await;

    let record = h.state.scheduler.progress(run_id).unwrap().unwrap();
    assert_eq!(record.remaining_ms, 21_500);
    assert_eq!(h.state.engine.lock().unwrap().remaining_ms(), 21_500);
}

#[tokio::test(start_paused = true)]
async fn reattached_observer_follows_background_to_completion() {
    let h = harness();
    h.state.select_time(0, 0, 5).unwrap();
    h.state.start().unwrap();
    advance(1_000).await;
    h.state.detach().unwrap().unwrap();

    let _observer = h.state.attach_observer();
    let mut rx = h.state.snapshot_tx.subscribe();
    let mut seen = vec![rx.borrow_and_update().clone()];
    assert!(seen[0].handed_off);

    timeout(Duration::from_secs(10), async {
        loop {
            rx.changed().await.unwrap();
            let snapshot = rx.borrow_and_update().clone();
            let done = snapshot.state == RunState::Completed;
            seen.push(snapshot);
            if done {
                break;
            }
        }
    })
    .await
    .expect("observer never saw the run complete");

    let remaining: Vec<u64> = seen.iter().map(|s| s.remaining_ms).collect();
    assert!(remaining.windows(2).all(|pair| pair[0] >= pair[1]));
    assert!(remaining.contains(&2_000));
    let last = seen.last().unwrap();
    assert_eq!(last.remaining_ms, 0);
    assert!(!last.handed_off);
    assert_eq!(h.alerts.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_job_record_releases_the_run() {
    let h = harness();
    h.state.select_time(0, 0, 10).unwrap();
    h.state.start().unwrap();
    advance(1_000).await;
    let run_id = h.state.detach().unwrap().unwrap();

    let record = h.temp_dir.path().join("jobs").join(format!("{}.json", run_id));
    std::fs::remove_file(record).unwrap();

    let snapshot = h.state.snapshot().unwrap();
    assert_eq!(snapshot.state, RunState::Cancelled);
    assert!(!snapshot.handed_off);
    assert!(!h.state.scheduler.is_running(run_id));

    assert_eq!(h.state.reset().unwrap().state, RunState::Idle);
    h.state.select_time(0, 0, 2).unwrap();
    assert_eq!(h.state.start().unwrap().state, RunState::Running);

    advance(12_000).await;
    assert_eq!(h.state.snapshot().unwrap().state, RunState::Completed);
    assert_eq!(h.alerts.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn handed_off_run_ignores_foreground_commands() {
    let h = harness();
    h.state.select_time(0, 0, 10).unwrap();
    let run_id = h.state.start().unwrap().run_id;
    advance(1_000).await;
    h.state.detach().unwrap().unwrap();

    assert_eq!(h.state.cancel().unwrap().state, RunState::Running);
    assert_eq!(h.state.reset().unwrap().state, RunState::Running);
    assert_eq!(h.state.start().unwrap().run_id, run_id);
    assert!(h.state.detach().unwrap().is_none());

    advance(10_000).await;
    assert_eq!(h.state.snapshot().unwrap().state, RunState::Completed);
    assert_eq!(h.alerts.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn background_cancellation_cancels_the_run() {
    let h = harness();
    h.state.select_time(0, 0, 10).unwrap();
    h.state.start().unwrap();
    advance(1_000).await;
    let run_id = h.state.detach().unwrap().unwrap();

    advance(2_000).await;
    assert!(h.state.scheduler.cancel(run_id).unwrap());
    advance(10_000).await;

    assert_eq!(h.state.snapshot().unwrap().state, RunState::Cancelled);
    assert_eq!(h.alerts.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn last_observer_leaving_hands_off() {
    let h = harness();
    let first = h.state.attach_observer();
    let second = h.state.attach_observer();
    assert_eq!(h.state.observer_count(), 2);

    h.state.select_time(0, 0, 4).unwrap();
    let run_id = h.state.start().unwrap().run_id.unwrap();
    advance(1_000).await;

    drop(first);
    assert!(!h.state.snapshot().unwrap().handed_off);

    drop(second);
    assert_eq!(h.state.observer_count(), 0);
    assert!(h.state.snapshot().unwrap().handed_off);
    assert!(h.state.scheduler.is_running(run_id));

    advance(3_100).await;
    assert_eq!(h.state.snapshot().unwrap().state, RunState::Completed);
    assert_eq!(h.alerts.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn detach_without_a_run_is_a_no_op() {
    let h = harness();
    assert!(h.state.detach().unwrap().is_none());
    assert_eq!(h.state.scheduler.active_jobs(), 0);
}

#[tokio::test(start_paused = true)]
async fn background_and_foreground_alert_once_in_total() {
    let h = harness();
    h.state.select_time(0, 0, 5).unwrap();
    let run_id = h.state.start().unwrap().run_id.unwrap();
    advance(5_100).await;

    // A background leg observing the same run later must stay silent.
    assert!(!h.state.alert_gate.fire_once(run_id));
    assert_eq!(h.alerts.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn observer_attaching_while_the_last_leaves_sees_a_settled_handoff() {
    for _ in 0..50 {
        let h = harness();
        h.state.select_time(0, 1, 0).unwrap();
        let leaving = h.state.attach_observer();
        h.state.start().unwrap();

        let barrier = Arc::new(std::sync::Barrier::new(2));
        let joining = {
            let state = Arc::clone(&h.state);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let guard = state.attach_observer();
                let handed_off = state.snapshot().unwrap().handed_off;
                (guard, handed_off)
            })
        };

        barrier.wait();
        drop(leaving);
        let (guard, seen_on_attach) = joining.join().unwrap();

        assert_eq!(h.state.observer_count(), 1);
        assert_eq!(seen_on_attach, h.state.snapshot().unwrap().handed_off);
        assert!(h.state.scheduler.active_jobs() <= 1);
        drop(guard);
    }
}
