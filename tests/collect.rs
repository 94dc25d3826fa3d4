use std::sync::mpsc;
use std::thread;

use rotor::Collector;

#[test]
fn accumulates_across_sessions() {
    let collector = Collector::<u64>::new();
    let mut handle = collector.handle();

    *handle.begin_write() += 5;
    *handle.begin_write() += 7;

    assert_eq!(collector.collect(), 12);
    assert_eq!(collector.collect(), 0);
}

#[test]
fn fresh_handle_contributes_nothing() {
    let collector = Collector::<u64>::new();
    let _handle = collector.handle();
    assert_eq!(collector.collect(), 0);
}

#[test]
fn collect_with_no_producers() {
    let collector = Collector::<u64>::new();
    assert_eq!(collector.collect(), 0);
    assert_eq!(collector.collect(), 0);
}

#[test]
fn combines_multiple_handles() {
    let collector = Collector::<u64>::new();
    let mut a = collector.handle();
    let mut b = collector.handle();

    *a.begin_write() += 3;
    *b.begin_write() += 3;

    assert_eq!(collector.collect(), 6);
    assert_eq!(collector.collect(), 0);
}

#[test]
fn dropped_handle_folds_its_contribution() {
    let collector = Collector::<u64>::new();
    {
        let mut handle = collector.handle();
        *handle.begin_write() += 9;
    }
    assert_eq!(collector.collect(), 9);
    assert_eq!(collector.collect(), 0);
}

#[test]
fn drop_after_collect_loses_nothing() {
    let collector = Collector::<u64>::new();
    let mut handle = collector.handle();
    *handle.begin_write() += 4;
    assert_eq!(collector.collect(), 4);
    *handle.begin_write() += 6;
    drop(handle);
    assert_eq!(collector.collect(), 6);
}

#[test]
fn nested_sessions_share_one_slot() {
    let collector = Collector::<u64>::new();
    let mut handle = collector.handle();
    {
        let mut outer = handle.begin_write();
        *outer += 1;
        {
            let mut inner = outer.reborrow();
            *inner += 2;
            {
                let mut innermost = inner.reborrow();
                *innermost += 4;
            }
        }
        *outer += 8;
    }
    assert_eq!(collector.collect(), 15);
}

#[test]
fn handles_keep_the_collector_alive() {
    let handle = {
        let collector = Collector::<u64>::new();
        collector.handle()
    };
    // Registering and dropping still has a live registry to talk to.
    assert_eq!(handle.collector().collect(), 0);
    drop(handle);
}

#[test]
fn collect_from_a_thread_without_a_handle() {
    let collector = Collector::<u64>::new();
    let mut handle = collector.handle();
    *handle.begin_write() += 21;

    let remote = collector.clone();
    let total = thread::spawn(move || remote.collect()).join().unwrap();
    assert_eq!(total, 21);
    assert_eq!(collector.collect(), 0);
}

#[test]
fn non_numeric_payloads() {
    let collector = Collector::<Vec<&'static str>>::new();
    let mut handle = collector.handle();
    handle.begin_write().push("a");
    handle.begin_write().push("b");

    let mut events = collector.collect();
    events.sort_unstable();
    assert_eq!(events, ["a", "b"]);
    assert!(collector.collect().is_empty());
}

#[test]
fn concurrent_producers_lose_nothing() {
    const THREADS: usize = 4;
    const SESSIONS: u64 = 10_000;

    let collector = Collector::<u64>::new();
    let (done_tx, done_rx) = mpsc::channel();

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let collector = collector.clone();
            let done_tx = done_tx.clone();
            thread::spawn(move || {
                let mut handle = collector.handle();
                for _ in 0..SESSIONS {
                    *handle.begin_write() += 1;
                }
                done_tx.send(()).unwrap();
            })
        })
        .collect();
    drop(done_tx);

    // Collect concurrently with the producers; every increment must land in
    // exactly one of these totals.
    let mut total = 0u64;
    loop {
        total += collector.collect();
        if done_rx.try_recv().is_ok() {
            break;
        }
    }
    for worker in workers {
        worker.join().unwrap();
    }
    total += collector.collect();

    assert_eq!(total, THREADS as u64 * SESSIONS);
    assert_eq!(collector.collect(), 0);
}

#[test]
fn staleness_is_bounded_by_one_collect() {
    let collector = Collector::<u64>::new();
    let mut handle = collector.handle();

    for round in 1..=100u64 {
        *handle.begin_write() += round;
        assert_eq!(collector.collect(), round, "round {round} went missing");
    }
}
