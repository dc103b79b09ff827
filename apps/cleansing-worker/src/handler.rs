//! # メッセージハンドラ
//!
//! キューから取り出した 1 件のメッセージを処理し、その後の扱いを決める。
//!
//! - 本文を JSON として解釈できないメッセージは再配信しても結果が変わらないため、
//!   ログに残して確認応答する
//! - 処理はタイムアウト付きで実行し、超過した場合は中断して再配信に回す
//! - 再配信は配信回数が上限に達するまで行い、上限を超えたらデッドレターに移す
//!
//! 各メッセージは相関 ID を持つスパンの中で処理されるため、
//! 同じメッセージに関するログはすべて同じ ID で追跡できる。

use std::{sync::Arc, time::Duration};

use cleansing_domain::{
    outcome::{CleansingResult, DeletionOutcome},
    scope::CleansingMessage,
};
use cleansing_infra::queue::{Delivery, MessageQueue};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::{error::WorkerError, usecase::CleansingUseCaseImpl};

/// メッセージの処理後の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Disposition {
    /// 確認応答して破棄する
    Ack,
    /// 配信回数を進めてキューに戻す
    Requeue,
    /// デッドレターキューに移す
    DeadLetter,
}

/// 削除メッセージのハンドラ
pub struct CleansingHandler {
    usecase:      Arc<CleansingUseCaseImpl>,
    queue:        Arc<dyn MessageQueue>,
    max_attempts: u32,
    timeout:      Duration,
}

impl CleansingHandler {
    pub fn new(
        usecase: Arc<CleansingUseCaseImpl>,
        queue: Arc<dyn MessageQueue>,
        max_attempts: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            usecase,
            queue,
            max_attempts,
            timeout,
        }
    }

    /// メッセージを処理し、再配信・デッドレターへの移動まで行う
    ///
    /// # Errors
    ///
    /// 再配信・デッドレターへの移動でキューの操作に失敗した場合。
    /// 削除自体の失敗はエラーにせず、再配信の判定に使う。
    pub async fn handle(
        &self,
        delivery: &Delivery,
        shutdown: &CancellationToken,
    ) -> Result<Disposition, WorkerError> {
        let span = tracing::info_span!(
            "cleansing",
            correlation_id = %Uuid::now_v7(),
            attempt = delivery.attempt,
        );
        self.handle_in_span(delivery, shutdown).instrument(span).await
    }

    async fn handle_in_span(
        &self,
        delivery: &Delivery,
        shutdown: &CancellationToken,
    ) -> Result<Disposition, WorkerError> {
        tracing::info!(message_body = %delivery.body, "メッセージを受信しました");

        let message = match decode(&delivery.body) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(error = %e, "メッセージを解釈できないため破棄します");
                return Ok(Disposition::Ack);
            }
        };

        let outcome = self.process_with_timeout(&message, shutdown).await;
        log_result(&outcome);

        let disposition = self.disposition_for(&outcome, delivery.attempt);
        match disposition {
            Disposition::Ack => {}
            Disposition::Requeue => {
                tracing::warn!(
                    max_attempts = self.max_attempts,
                    "削除に失敗したため再配信します"
                );
                self.queue.requeue(delivery).await?;
            }
            Disposition::DeadLetter => {
                tracing::error!(
                    max_attempts = self.max_attempts,
                    "再配信の上限に達したためデッドレターに移します"
                );
                self.queue.dead_letter(delivery).await?;
            }
        }
        Ok(disposition)
    }

    /// タイムアウトを超えたら処理を中断する
    ///
    /// 中断後も実行中のバッチの完了を待ち、確認済みの件数を結果に残す。
    async fn process_with_timeout(
        &self,
        message: &CleansingMessage,
        shutdown: &CancellationToken,
    ) -> DeletionOutcome {
        let cancel = shutdown.child_token();
        let process = self.usecase.process(message, &cancel);
        tokio::pin!(process);

        tokio::select! {
            outcome = &mut process => outcome,
            () = tokio::time::sleep(self.timeout) => {
                tracing::warn!(timeout = ?self.timeout, "削除がタイムアウトしたため中断します");
                cancel.cancel();
                process.await
            }
        }
    }

    fn disposition_for(&self, outcome: &DeletionOutcome, attempt: u32) -> Disposition {
        if !outcome.is_retryable() {
            Disposition::Ack
        } else if attempt < self.max_attempts {
            Disposition::Requeue
        } else {
            Disposition::DeadLetter
        }
    }
}

fn decode(body: &str) -> Result<CleansingMessage, WorkerError> {
    Ok(serde_json::from_str(body)?)
}

/// 結果レコードを JSON 文字列にする
fn encode_result(result: &CleansingResult) -> Result<String, WorkerError> {
    Ok(serde_json::to_string(result)?)
}

fn log_result(outcome: &DeletionOutcome) {
    let result = outcome.to_result();
    let record = match encode_result(&result) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::error!(
                error = %e,
                scope_type = %result.scope_type,
                scope_id = result.id,
                "結果レコードをシリアライズできません"
            );
            None
        }
    };

    if result.success {
        tracing::info!(
            files_deleted = result.files_deleted,
            result = record.as_deref(),
            "削除が完了しました"
        );
    } else {
        tracing::error!(
            files_deleted = result.files_deleted,
            failure = ?outcome.failure(),
            partial = outcome.is_partial(),
            error = result.error.as_deref(),
            result = record.as_deref(),
            "削除に失敗しました"
        );
    }
}

#[cfg(test)]
mod tests {
    use cleansing_domain::outcome::FailureKind;
    use cleansing_infra::mock::{MockHierarchyStore, MockMessageQueue, MockObjectStorage, RepoOperation};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::test_utils::{self, Fixture};

    const TIMEOUT: Duration = Duration::from_secs(5);

    struct Harness {
        store:   MockHierarchyStore,
        queue:   MockMessageQueue,
        handler: CleansingHandler,
    }

    fn harness_with(storage: MockObjectStorage, max_attempts: u32, timeout: Duration) -> Harness {
        let store = MockHierarchyStore::new();
        let queue = MockMessageQueue::new();
        let usecase = CleansingUseCaseImpl::new(
            test_utils::repositories(&store),
            test_utils::engine(Arc::new(MockObjectStorage::new()), Arc::new(storage)),
            test_utils::DEFAULT_BUCKET,
        );
        let handler = CleansingHandler::new(
            Arc::new(usecase),
            Arc::new(queue.clone()),
            max_attempts,
            timeout,
        );
        Harness {
            store,
            queue,
            handler,
        }
    }

    fn harness() -> Harness {
        harness_with(MockObjectStorage::new(), 3, TIMEOUT)
    }

    #[tokio::test]
    async fn test_成功したメッセージは確認応答される() {
        let h = harness();
        let fixture = Fixture::seed(&h.store);

        let disposition = assert_ok!(
            h.handler
                .handle(
                    &Delivery::first(r#"{"type":"site","id":100}"#),
                    &CancellationToken::new()
                )
                .await
        );

        assert_eq!(disposition, Disposition::Ack);
        assert!(!h.store.site_exists(fixture.site_id));
        assert!(h.queue.requeued().is_empty());
        assert!(h.queue.dead_letters().is_empty());
    }

    #[rstest]
    #[case::壊れたjson("{not json")]
    #[case::idが文字列(r#"{"type":"site","id":"100"}"#)]
    #[case::種別がない(r#"{"id":100}"#)]
    #[tokio::test]
    async fn test_解釈できないメッセージは確認応答して破棄する(#[case] body: &str) {
        let h = harness();
        Fixture::seed(&h.store);

        let disposition = assert_ok!(
            h.handler
                .handle(&Delivery::first(body), &CancellationToken::new())
                .await
        );

        assert_eq!(disposition, Disposition::Ack);
        assert!(h.store.calls().is_empty());
        assert!(h.queue.requeued().is_empty());
    }

    #[tokio::test]
    async fn test_不正な種別は再配信しない() {
        let h = harness();

        let disposition = assert_ok!(
            h.handler
                .handle(
                    &Delivery::first(r#"{"type":"bogus","id":1}"#),
                    &CancellationToken::new()
                )
                .await
        );

        assert_eq!(disposition, Disposition::Ack);
        assert!(h.queue.requeued().is_empty());
        assert!(h.queue.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_失敗したメッセージは配信回数を進めて再配信される() {
        let h = harness();
        Fixture::seed(&h.store);
        h.store.fail(RepoOperation::DeleteSite);

        let disposition = assert_ok!(
            h.handler
                .handle(
                    &Delivery::first(r#"{"type":"site","id":100}"#),
                    &CancellationToken::new()
                )
                .await
        );

        assert_eq!(disposition, Disposition::Requeue);
        let requeued = h.queue.requeued();
        assert_eq!(requeued.len(), 1);
        assert_eq!(requeued[0].attempt, 2);
        assert_eq!(h.queue.pending(), 1);
    }

    #[tokio::test]
    async fn test_配信回数が上限に達するとデッドレターに移す() {
        let h = harness();
        Fixture::seed(&h.store);
        h.store.fail(RepoOperation::DeleteSite);
        let delivery = Delivery {
            body:    r#"{"type":"site","id":100}"#.to_string(),
            attempt: 3,
        };

        let disposition = assert_ok!(h.handler.handle(&delivery, &CancellationToken::new()).await);

        assert_eq!(disposition, Disposition::DeadLetter);
        assert_eq!(h.queue.dead_letters(), vec![delivery]);
        assert!(h.queue.requeued().is_empty());
    }

    #[tokio::test]
    async fn test_タイムアウトすると中断して再配信する() {
        let storage = MockObjectStorage::new().with_delete_latency(Duration::from_millis(200));
        let h = harness_with(storage, 3, Duration::from_millis(20));
        let fixture = Fixture::seed(&h.store);

        let disposition = assert_ok!(
            h.handler
                .handle(
                    &Delivery::first(r#"{"type":"site","id":100}"#),
                    &CancellationToken::new()
                )
                .await
        );

        assert_eq!(disposition, Disposition::Requeue);
        assert!(h.store.site_exists(fixture.site_id));
    }

    #[tokio::test]
    async fn test_シャットダウン中のメッセージは再配信に回す() {
        let h = harness();
        let fixture = Fixture::seed(&h.store);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let disposition = assert_ok!(
            h.handler
                .handle(&Delivery::first(r#"{"type":"site","id":100}"#), &shutdown)
                .await
        );

        assert_eq!(disposition, Disposition::Requeue);
        assert!(h.store.site_exists(fixture.site_id));
    }

    #[test]
    fn test_壊れた本文のデコードはエラーになる() {
        let err = assert_err!(decode("{"));

        assert!(matches!(err, WorkerError::Decode(_)));
    }

    #[test]
    fn test_結果レコードはjsonにエンコードされる() {
        let mut outcome = DeletionOutcome::for_message(&CleansingMessage::new("site", 42));
        outcome.record_files_deleted(2);
        outcome.succeed();

        let record = assert_ok!(encode_result(&outcome.to_result()));

        let json: serde_json::Value = serde_json::from_str(&record).unwrap();
        assert_eq!(json["type"], "site");
        assert_eq!(json["id"], 42);
        assert_eq!(json["success"], true);
        assert_eq!(json["files_deleted"], 2);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_失敗した結果レコードにはエラーが含まれる() {
        let mut outcome = DeletionOutcome::for_message(&CleansingMessage::new("bogus", 1));
        outcome.fail(FailureKind::Validation, "invalid cleansing type: bogus");

        let record = assert_ok!(encode_result(&outcome.to_result()));

        let json: serde_json::Value = serde_json::from_str(&record).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "invalid cleansing type: bogus");
    }

    #[rstest]
    #[case(Disposition::Ack, "ack")]
    #[case(Disposition::Requeue, "requeue")]
    #[case(Disposition::DeadLetter, "dead_letter")]
    fn test_処理後の扱いを文字列で表示できる(#[case] disposition: Disposition, #[case] expected: &str) {
        assert_eq!(disposition.to_string(), expected);
    }
}
