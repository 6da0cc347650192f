// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

fn echo_channel(capacity: usize) -> QaChannel {
    QaChannel::new(
        capacity,
        Arc::new(|task_id, question| {
            Box::pin(async move { format!("{task_id}: {question}") })
        }),
    )
}

#[tokio::test]
async fn ask_receives_its_answer() {
    let token = CancellationToken::new();
    let channel = echo_channel(4);
    channel.start(&token);

    let answer = channel
        .ask(&token, TaskId::new("t1"), "what now?")
        .await
        .unwrap();
    assert_eq!(answer, "t1: what now?");

    channel.stop().await;
}

#[tokio::test]
async fn concurrent_askers_get_their_own_answers() {
    let token = CancellationToken::new();
    let channel = Arc::new(echo_channel(8));
    channel.start(&token);

    let mut handles = Vec::new();
    for i in 0..8 {
        let channel = Arc::clone(&channel);
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            let id = TaskId::new(format!("task-{i}"));
            let answer = channel.ask(&token, id.clone(), format!("q{i}")).await.unwrap();
            (id, answer, i)
        }));
    }

    for handle in handles {
        let (id, answer, i) = handle.await.unwrap();
        assert_eq!(answer, format!("{id}: q{i}"), "cross-talk on asker {i}");
    }
    channel.stop().await;
}

#[tokio::test]
async fn slow_answer_does_not_block_sends_up_to_capacity() {
    let token = CancellationToken::new();
    let channel = Arc::new(QaChannel::new(
        4,
        Arc::new(|_, q| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_secs(60)).await;
                q
            })
        }),
    ));
    channel.start(&token);

    // The handler is stuck on the first question; three more still fit
    // in the inbox without the send side blocking.
    let mut pending = Vec::new();
    for i in 0..4 {
        let channel = Arc::clone(&channel);
        let token = token.clone();
        pending.push(tokio::spawn(async move {
            let _ = channel.ask(&token, TaskId::new(format!("t{i}")), "q").await;
        }));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A fifth send would exceed capacity; cancelling releases everyone.
    token.cancel();
    for handle in pending {
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
    channel.stop().await;
}

#[tokio::test]
async fn cancellation_mid_answer_fails_the_current_caller() {
    let root = CancellationToken::new();
    let channel = QaChannel::new(
        2,
        Arc::new(|_, _| {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                "too late".to_string()
            })
        }),
    );
    channel.start(&root);

    let asker = root.clone();
    let ask = tokio::spawn({
        let channel = Arc::new(channel);
        let keep = Arc::clone(&channel);
        async move {
            let result = keep.ask(&asker, TaskId::new("t1"), "q").await;
            (result, channel)
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    root.cancel();

    let (result, channel) = tokio::time::timeout(Duration::from_secs(1), ask)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.unwrap_err(), QaError::Cancelled);
    channel.stop().await;
}

#[tokio::test]
async fn ask_after_stop_is_closed() {
    let token = CancellationToken::new();
    let channel = echo_channel(2);
    channel.start(&token);
    channel.stop().await;

    // The handler is gone; the inbox may buffer the send, but the reply
    // channel is dropped with the receiver.
    let result = tokio::time::timeout(
        Duration::from_secs(1),
        channel.ask(&token, TaskId::new("t1"), "anyone?"),
    )
    .await
    .unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn start_is_idempotent() {
    let token = CancellationToken::new();
    let channel = echo_channel(2);
    channel.start(&token);
    channel.start(&token);

    let answer = channel.ask(&token, TaskId::new("t"), "q").await.unwrap();
    assert_eq!(answer, "t: q");
    channel.stop().await;
}
