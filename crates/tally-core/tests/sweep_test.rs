// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Integration tests for deadlines: the sweep, rehydration, and restarts.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::*;
use tally_core::engine::{PollEngine, ResultsAudience};
use tally_core::runtime::EngineRuntime;
use tally_core::store::{SqliteStore, Store};

#[tokio::test]
async fn test_sweep_with_no_due_timers_is_a_noop() {
    let ctx = TestContext::new().await;
    let author = ctx.participant(100).await;
    ctx.committed_question(author, "Q?", &["A"], (1, 0, 6)).await;

    let fired = ctx.engine.sweep_due_timers().await.unwrap();
    assert_eq!(fired, 0);
}

#[tokio::test]
async fn test_fired_deadline_closes_once_the_minimum_is_met() {
    let ctx = TestContext::new().await;
    let author = ctx.participant(100).await;
    let voter = ctx.participant(200).await;
    let question_id = ctx
        .committed_question(author, "Q?", &["A", "B"], (1, 5, 24))
        .await;

    ctx.engine.record_answer(voter, question_id, 0).await.unwrap();
    assert_eq!(ctx.question_status(question_id).await.as_deref(), Some("open"));

    // Move the stored deadline into the past and rebuild the timer table
    // from storage, as a restarted process would.
    ctx.store
        .set_closes_at(question_id, Some(Utc::now() - chrono::Duration::minutes(5)))
        .await
        .unwrap();
    ctx.engine.rehydrate_timers().await.unwrap();

    let fired = ctx.engine.sweep_due_timers().await.unwrap();
    assert_eq!(fired, 1);
    assert_eq!(ctx.question_status(question_id).await.as_deref(), Some("closed"));
}

#[tokio::test]
async fn test_fired_deadline_waits_for_the_minimum() {
    let ctx = TestContext::new().await;
    let author = ctx.participant(100).await;
    let v1 = ctx.participant(200).await;
    let v2 = ctx.participant(300).await;
    let question_id = ctx
        .committed_question(author, "Q?", &["A", "B"], (2, 5, 24))
        .await;

    ctx.engine.record_answer(v1, question_id, 0).await.unwrap();

    ctx.store
        .set_closes_at(question_id, Some(Utc::now() - chrono::Duration::minutes(5)))
        .await
        .unwrap();
    ctx.engine.rehydrate_timers().await.unwrap();

    // The deadline fires but only one of two required votes is in: the
    // question stays open.
    let fired = ctx.engine.sweep_due_timers().await.unwrap();
    assert_eq!(fired, 1);
    assert_eq!(ctx.question_status(question_id).await.as_deref(), Some("open"));

    // The vote that completes the minimum closes it, no sweep needed.
    let outcome = ctx.engine.record_answer(v2, question_id, 1).await.unwrap();
    assert!(outcome.question_closed);
    assert_eq!(ctx.question_status(question_id).await.as_deref(), Some("closed"));
}

#[tokio::test]
async fn test_timers_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("tally.db");

    let question_id;
    let voter_id;
    {
        let store = Arc::new(SqliteStore::from_path(&db_path).await.unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let engine = PollEngine::new(
            store.clone(),
            notifier,
            ResultsAudience::AllParticipants,
        );

        let author = engine.contact(100).await.unwrap().id;
        voter_id = engine.contact(200).await.unwrap().id;

        let id = engine.start_draft(author).await.unwrap();
        engine.set_draft_text(id, "Survives?").await.unwrap();
        engine
            .set_draft_variants(id, &["Yes".to_string(), "No".to_string()])
            .await
            .unwrap();
        engine.set_draft_rules(id, 1, 0, 6).await.unwrap();
        engine.commit_draft(id).await.unwrap();
        question_id = id;
    }

    // A fresh process over the same file sees the open question, its
    // deadline, and the untouched queues.
    let store = Arc::new(SqliteStore::from_path(&db_path).await.unwrap());
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = PollEngine::new(
        store.clone(),
        notifier,
        ResultsAudience::AllParticipants,
    );

    let armed = engine.rehydrate_timers().await.unwrap();
    assert_eq!(armed, 1);

    let question = store.get_question(question_id).await.unwrap().unwrap();
    assert_eq!(question.status, "open");
    assert!(question.closes_at.is_some());

    assert_eq!(
        store.pending_for_participant(voter_id).await.unwrap(),
        vec![question_id]
    );

    // The rebuilt table is live: answering still evaluates completion.
    engine.record_answer(voter_id, question_id, 0).await.unwrap();
    assert_eq!(
        store.vote_total(question_id).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_sweep_worker_closes_due_questions() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let notifier = Arc::new(RecordingNotifier::default());

    // Seed through a throwaway engine sharing the same store.
    let setup = PollEngine::new(
        store.clone(),
        notifier.clone(),
        ResultsAudience::AllParticipants,
    );
    let author = setup.contact(100).await.unwrap().id;
    let voter = setup.contact(200).await.unwrap().id;

    let question_id = setup.start_draft(author).await.unwrap();
    setup.set_draft_text(question_id, "Q?").await.unwrap();
    setup
        .set_draft_variants(question_id, &["A".to_string()])
        .await
        .unwrap();
    setup.set_draft_rules(question_id, 1, 5, 24).await.unwrap();
    setup.commit_draft(question_id).await.unwrap();
    setup.record_answer(voter, question_id, 0).await.unwrap();

    store
        .set_closes_at(question_id, Some(Utc::now() - chrono::Duration::minutes(1)))
        .await
        .unwrap();

    // The runtime rehydrates the past-due deadline at start; the worker
    // fires it on an early tick.
    let runtime = EngineRuntime::builder()
        .store(store.clone())
        .notifier(notifier.clone())
        .sweep_interval(Duration::from_millis(20))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap();

    let mut closed = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let question = store.get_question(question_id).await.unwrap().unwrap();
        if question.status == "closed" {
            closed = true;
            break;
        }
    }
    assert!(closed, "Sweep worker never closed the due question");

    runtime.shutdown().await.unwrap();
}
