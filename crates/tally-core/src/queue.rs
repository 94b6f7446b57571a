// Copyright (C) 2025 Tally contributors
// SPDX-License-Identifier: MIT
//! Pending-queue manager.
//!
//! Pure derived logic over pending assignments and answered records: a
//! participant's next question is the lowest pending question id, which
//! pins delivery to the order questions were opened. Advancing either
//! delivers the next question through the sink or flags the participant
//! ready.

use crate::error::{EngineError, Result};
use crate::notify::{Notice, Notifier};
use crate::store::{ParticipantRecord, Store};

/// Build the `QuestionPosted` notice for a question and deliver it to each
/// recipient. A formatting convenience over the store's variant list, not
/// extra lifecycle logic.
pub(crate) async fn post_question(
    store: &dyn Store,
    notifier: &dyn Notifier,
    question_id: i64,
    recipients: &[i64],
) -> Result<()> {
    let question = store
        .get_question(question_id)
        .await?
        .ok_or(EngineError::NotFound {
            entity: "question",
            id: question_id,
        })?;

    let variants = store
        .variants(question_id)
        .await?
        .into_iter()
        .map(|v| v.text)
        .collect::<Vec<_>>();

    let notice = Notice::QuestionPosted {
        question_id,
        text: question.text.unwrap_or_default(),
        variants,
    };

    for chat_id in recipients {
        notifier.deliver(*chat_id, notice.clone()).await;
    }

    Ok(())
}

/// Move a participant to their next piece of work: deliver the lowest
/// pending question, or mark them ready when the queue is empty and no
/// editing session is active. Returns the delivered question id, if any.
pub(crate) async fn advance_participant(
    store: &dyn Store,
    notifier: &dyn Notifier,
    participant: &ParticipantRecord,
    session_idle: bool,
) -> Result<Option<i64>> {
    match store.next_pending(participant.id).await? {
        Some(next) => {
            store.set_ready(participant.id, false).await?;
            post_question(store, notifier, next, &[participant.chat_id]).await?;
            Ok(Some(next))
        }
        None => {
            store.set_ready(participant.id, session_idle).await?;
            Ok(None)
        }
    }
}
