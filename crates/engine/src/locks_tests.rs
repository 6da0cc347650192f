// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
async fn same_path_excludes() {
    let locks = PathLocks::new();
    let path = PathBuf::from("src/lib.rs");

    let guard = locks.lock(&path).await;
    let second = tokio::time::timeout(Duration::from_millis(50), locks.lock(&path)).await;
    assert!(second.is_err(), "second locker should block");

    drop(guard);
    tokio::time::timeout(Duration::from_millis(50), locks.lock(&path))
        .await
        .unwrap();
}

#[tokio::test]
async fn distinct_paths_are_parallel() {
    let locks = PathLocks::new();
    let _a = locks.lock(Path::new("a.txt")).await;
    // Holding a.txt must not delay b.txt at all.
    tokio::time::timeout(Duration::from_millis(50), locks.lock(Path::new("b.txt")))
        .await
        .unwrap();
}

#[tokio::test]
async fn lock_all_deduplicates() {
    let locks = PathLocks::new();
    let guards = locks
        .lock_all(&[
            PathBuf::from("x.txt"),
            PathBuf::from("x.txt"),
            PathBuf::from("y.txt"),
        ])
        .await;
    assert_eq!(guards.len(), 2);
}

#[tokio::test]
async fn opposite_order_lockers_never_deadlock() {
    let locks = PathLocks::new();
    let done = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..50 {
        let locks = locks.clone();
        let done = done.clone();
        handles.push(tokio::spawn(async move {
            // Half the tasks request [a, b], the other half [b, a].
            let paths = if i % 2 == 0 {
                vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]
            } else {
                vec![PathBuf::from("b.txt"), PathBuf::from("a.txt")]
            };
            let _guards = locks.lock_all(&paths).await;
            tokio::time::sleep(Duration::from_micros(100)).await;
            done.fetch_add(1, Ordering::SeqCst);
        }));
    }

    tokio::time::timeout(Duration::from_secs(10), async {
        for handle in handles {
            handle.await.unwrap();
        }
    })
    .await
    .unwrap();
    assert_eq!(done.load(Ordering::SeqCst), 50);
}

#[tokio::test]
async fn lock_all_with_empty_set_is_noop() {
    let locks = PathLocks::new();
    let guards = locks.lock_all(&[]).await;
    assert!(guards.is_empty());
}
