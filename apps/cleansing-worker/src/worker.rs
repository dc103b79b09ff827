//! # ワーカープール
//!
//! 同じキューを消費するワーカーを指定数だけ起動し、シャットダウンまで動かし続ける。
//!
//! ## シャットダウン
//!
//! シャットダウンが要求されると、各ワーカーは新しいメッセージを取り出さなくなる。
//! 取り出し済みのメッセージは中断付きで処理を終え、再配信の判定まで行ってから停止する。
//! 取り出しそのものは中断しないため、取り出したメッセージが失われることはない。

use std::{sync::Arc, time::Duration};

use cleansing_infra::queue::MessageQueue;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::handler::CleansingHandler;

/// キューを消費するワーカーの集まり
pub struct WorkerPool {
    queue:         Arc<dyn MessageQueue>,
    handler:       Arc<CleansingHandler>,
    concurrency:   usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn MessageQueue>,
        handler: Arc<CleansingHandler>,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            handler,
            concurrency: concurrency.max(1),
            poll_interval,
        }
    }

    /// シャットダウンまでワーカーを動かし、処理したメッセージの総数を返す
    pub async fn run(&self, shutdown: CancellationToken) -> u64 {
        tracing::info!(concurrency = self.concurrency, "ワーカーを起動します");

        let mut tasks = JoinSet::new();
        for worker_id in 0..self.concurrency {
            let consumer = Consumer {
                queue:         Arc::clone(&self.queue),
                handler:       Arc::clone(&self.handler),
                poll_interval: self.poll_interval,
                shutdown:      shutdown.clone(),
            };
            tasks.spawn(
                consumer
                    .run()
                    .instrument(tracing::info_span!("worker", worker_id)),
            );
        }

        let mut processed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(count) => processed += count,
                Err(e) => tracing::error!(error = %e, "ワーカーが異常終了しました"),
            }
        }

        tracing::info!(processed, "すべてのワーカーが停止しました");
        processed
    }
}

struct Consumer {
    queue:         Arc<dyn MessageQueue>,
    handler:       Arc<CleansingHandler>,
    poll_interval: Duration,
    shutdown:      CancellationToken,
}

impl Consumer {
    async fn run(self) -> u64 {
        let mut processed = 0;

        while !self.shutdown.is_cancelled() {
            match self.queue.receive().await {
                Ok(Some(delivery)) => {
                    match self.handler.handle(&delivery, &self.shutdown).await {
                        Ok(disposition) => {
                            tracing::debug!(%disposition, "メッセージを処理しました");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "メッセージの後処理に失敗しました");
                        }
                    }
                    processed += 1;
                }
                Ok(None) => self.idle().await,
                Err(e) => {
                    tracing::error!(error = %e, "キューからの取り出しに失敗しました");
                    self.idle().await;
                }
            }
        }

        tracing::debug!(processed, "ワーカーを停止します");
        processed
    }

    /// 次の取り出しまで待つ（シャットダウンで即座に戻る）
    async fn idle(&self) {
        tokio::select! {
            () = self.shutdown.cancelled() => {}
            () = tokio::time::sleep(self.poll_interval) => {}
        }
    }
}
