use std::sync::mpsc;

use super::*;

#[test]
fn zero_threads_is_rejected() {
    assert!(WorkerPool::new(WorkerOpts { threads: Some(0) }).is_err());
}

#[test]
fn spawned_tasks_run_on_named_workers() {
    let pool = WorkerPool::new(WorkerOpts { threads: Some(2) }).unwrap();
    assert_eq!(pool.threads(), 2);
    assert!(!pool.is_worker_thread());

    let (tx, rx) = mpsc::channel();
    for _ in 0..4 {
        let tx = tx.clone();
        let handle = pool.clone();
        pool.spawn(move || {
            let name = std::thread::current().name().map(str::to_owned);
            let _ = tx.send((handle.is_worker_thread(), name));
        });
    }
    drop(tx);

    let seen: Vec<_> = rx.iter().collect();
    assert_eq!(seen.len(), 4);
    for (on_worker, name) in seen {
        assert!(on_worker);
        assert!(name.unwrap().starts_with("scanflow-worker-"));
    }
    assert_eq!(pool.tasks_spawned(), 4);
}
