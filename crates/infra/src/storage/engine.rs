//! # 削除エンジン
//!
//! オブジェクト参照の一覧を受け取り、ストレージから削除する。
//!
//! ## 処理の流れ
//!
//! 1. 同一キーの重複を 1 件にまとめ（サイズは合算する）、(リージョン, バケット) ごとに分割する
//! 2. 各分割を最大 [`MAX_BATCH_SIZE`] 件のバッチに分ける
//! 3. セマフォで同時実行数を制限しながらバッチをタスクとして起動する
//! 4. 各バッチ呼び出しの前にレートリミッターのトークンを取得し、一時的エラーは再試行する
//!
//! ## 部分的な失敗
//!
//! 最初のバッチ失敗以降は新しいバッチを起動しない。実行中のバッチは完了まで待ち、
//! その削除件数も結果に含める。返す件数は常にストレージが削除を確認した件数であり、
//! 失敗時にも 0 や要求件数に丸めない。
//!
//! キー単位の失敗（バッチ呼び出し自体は成功）はキーごとにログに記録し、
//! 件数には含めず、エラーにもしない。

use std::{
    collections::{HashMap, hash_map::Entry},
    future::Future,
    sync::Arc,
};

use cleansing_domain::storage_key::{StorageLocation, StorageObjectRef};
use itertools::Itertools;
use tokio::{sync::Semaphore, task::JoinSet};
use tokio_util::sync::CancellationToken;

use super::{
    BatchDeleteOutput,
    MAX_BATCH_SIZE,
    ObjectStorageBackend,
    RegionClientCache,
    RetryPolicy,
    StorageRateLimiter,
};
use crate::error::InfraError;

/// 削除エンジンの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionEngineConfig {
    /// 1 回の削除で同時に実行するバッチ数の上限
    pub max_concurrent_deletes: usize,
    /// ストレージ呼び出しの秒間上限
    pub rate_limit_per_second:  u32,
    /// ストレージ呼び出しのバースト数
    pub rate_limit_burst:       u32,
    /// 一時的エラーの再試行ポリシー
    pub retry:                  RetryPolicy,
}

impl Default for DeletionEngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_deletes: 3,
            rate_limit_per_second:  100,
            rate_limit_burst:       10,
            retry:                  RetryPolicy::default(),
        }
    }
}

/// オブジェクト削除の結果
///
/// `error` が `Some` でも `deleted_count` は削除を確認できた件数を表す。
#[derive(Debug, Default)]
pub struct DeletionReport {
    /// ストレージが削除を確認したオブジェクト数
    pub deleted_count: u64,
    /// 削除を確認したオブジェクトのサイズ合計（サイズ不明のものは 0 として数える）
    pub deleted_bytes: i64,
    /// キー単位で削除に失敗したオブジェクト数
    pub failed_keys:   u64,
    /// バッチ単位の失敗（最初の 1 件）
    pub error:         Option<InfraError>,
}

impl DeletionReport {
    /// すべてのバッチが成功したか
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    fn record_error(&mut self, err: InfraError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

/// オブジェクトストレージ削除エンジン
pub struct DeletionEngine {
    clients:        Arc<RegionClientCache>,
    limiter:        Arc<StorageRateLimiter>,
    retry:          RetryPolicy,
    max_concurrent: usize,
}

impl DeletionEngine {
    /// エンジンを作成する
    ///
    /// # Errors
    ///
    /// レート制限の設定値が 0 の場合。
    pub fn new(
        clients: Arc<RegionClientCache>,
        config: DeletionEngineConfig,
    ) -> Result<Self, InfraError> {
        let limiter = StorageRateLimiter::new(config.rate_limit_per_second, config.rate_limit_burst)?;
        Ok(Self {
            clients,
            limiter: Arc::new(limiter),
            retry: config.retry,
            max_concurrent: config.max_concurrent_deletes.max(1),
        })
    }

    /// 既定リージョン
    pub fn default_region(&self) -> &str {
        self.clients.default_region()
    }

    /// オブジェクトをまとめて削除する
    #[tracing::instrument(skip_all, fields(object_count = objects.len()))]
    pub async fn delete_objects(
        &self,
        objects: &[StorageObjectRef],
        cancel: &CancellationToken,
    ) -> DeletionReport {
        let mut report = DeletionReport::default();
        if objects.is_empty() {
            return report;
        }

        let partitions = merge_duplicate_keys(objects)
            .into_iter()
            .into_group_map_by(StorageObjectRef::location)
            .into_iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b))
            .collect::<Vec<_>>();

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let halt = CancellationToken::new();
        let mut tasks = JoinSet::new();

        'launch: for (location, group) in partitions {
            let client = match self.clients.get(&location.region).await {
                Ok(client) => client,
                Err(err) => {
                    tracing::error!(
                        region = %location.region,
                        bucket = %location.bucket,
                        error = %err,
                        "ストレージクライアントを取得できません"
                    );
                    report.record_error(err);
                    break 'launch;
                }
            };

            for chunk in group.chunks(MAX_BATCH_SIZE) {
                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        report.record_error(InfraError::cancelled());
                        break 'launch;
                    }
                    () = halt.cancelled() => break 'launch,
                    permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break 'launch,
                    },
                };

                let job = BatchJob {
                    location: location.clone(),
                    client:   Arc::clone(&client),
                    limiter:  Arc::clone(&self.limiter),
                    cancel:   cancel.clone(),
                    objects:  chunk.to_vec(),
                };
                let retry = self.retry.clone();
                let halt = halt.clone();

                tasks.spawn(async move {
                    let outcome = job.run(&retry).await;
                    if outcome.result.is_err() {
                        halt.cancel();
                    }
                    drop(permit);
                    outcome
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcome.merge_into(&mut report),
                Err(err) => report.record_error(InfraError::unexpected(format!(
                    "バッチ削除タスクが異常終了しました: {err}"
                ))),
            }
        }

        if report.is_complete() {
            tracing::info!(
                deleted_count = report.deleted_count,
                failed_keys = report.failed_keys,
                "オブジェクトの削除が完了"
            );
        } else {
            tracing::warn!(
                deleted_count = report.deleted_count,
                failed_keys = report.failed_keys,
                "オブジェクトの削除が途中で失敗"
            );
        }

        report
    }

    /// バケット内のオブジェクトをすべて削除した上でバケットを削除する
    ///
    /// 一覧取得・削除・バケット削除の各呼び出しはレート制限と再試行の対象。
    /// 一覧のいずれかのページで削除できないオブジェクトが残った場合、
    /// バケットの削除は試みずにエラーを返す。
    ///
    /// 削除したオブジェクト数を返す。
    #[tracing::instrument(skip_all, fields(%bucket, %region))]
    pub async fn delete_bucket(
        &self,
        bucket: &str,
        region: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, InfraError> {
        let client = self.clients.get(region).await?;
        let mut deleted: u64 = 0;
        let mut continuation_token: Option<String> = None;

        loop {
            let token = continuation_token.take();
            let page = self
                .call(cancel, &|| {
                    client.list_objects(bucket, None, token.clone(), MAX_BATCH_SIZE)
                })
                .await?;

            if !page.keys.is_empty() {
                let keys = &page.keys;
                let output = self
                    .call(cancel, &|| client.delete_objects(bucket, keys))
                    .await?;

                log_key_errors(bucket, &output);
                if !output.errors.is_empty() {
                    return Err(InfraError::storage_permanent(format!(
                        "{} 件のオブジェクトを削除できないためバケット {bucket} は削除しません",
                        output.errors.len()
                    )));
                }
                deleted += output.deleted.len() as u64;
            }

            match page.next_continuation_token {
                Some(next) => continuation_token = Some(next),
                None => break,
            }
        }

        self.call(cancel, &|| client.delete_bucket(bucket)).await?;

        tracing::info!(deleted, "バケットを削除しました");
        Ok(deleted)
    }

    /// レート制限と再試行を掛けてストレージを 1 回呼び出す
    async fn call<T, F, Fut>(&self, cancel: &CancellationToken, op: &F) -> Result<T, InfraError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, InfraError>>,
    {
        let limiter = &self.limiter;
        self.retry
            .run(cancel, move |_| guarded(limiter, cancel, op))
            .await
    }
}

/// トークンを取得してから操作を実行する（いずれもキャンセル可能）
async fn guarded<T, F, Fut>(
    limiter: &StorageRateLimiter,
    cancel: &CancellationToken,
    op: &F,
) -> Result<T, InfraError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, InfraError>>,
{
    limiter.acquire(cancel).await?;
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(InfraError::cancelled()),
        result = op() => result,
    }
}

fn log_key_errors(bucket: &str, output: &BatchDeleteOutput) {
    for failure in &output.errors {
        tracing::warn!(
            bucket,
            key = %failure.key,
            code = failure.code.as_deref().unwrap_or_default(),
            message = failure.message.as_deref().unwrap_or_default(),
            "オブジェクトを削除できませんでした"
        );
    }
}

/// 1 バッチ分の削除
struct BatchJob {
    location: StorageLocation,
    client:   Arc<dyn ObjectStorageBackend>,
    limiter:  Arc<StorageRateLimiter>,
    cancel:   CancellationToken,
    objects:  Vec<StorageObjectRef>,
}

struct BatchOutcome {
    job:    BatchJob,
    result: Result<BatchDeleteOutput, InfraError>,
}

impl BatchJob {
    async fn run(self, retry: &RetryPolicy) -> BatchOutcome {
        let keys: Vec<String> = self.objects.iter().map(|o| o.key.clone()).collect();
        let op = || self.client.delete_objects(&self.location.bucket, &keys);

        let result = retry
            .run(&self.cancel, |_| guarded(&self.limiter, &self.cancel, &op))
            .await;

        BatchOutcome { job: self, result }
    }
}

impl BatchOutcome {
    fn merge_into(self, report: &mut DeletionReport) {
        let bucket = &self.job.location.bucket;
        match self.result {
            Ok(output) => {
                log_key_errors(bucket, &output);

                let sizes: HashMap<&str, i64> = self
                    .job
                    .objects
                    .iter()
                    .map(|o| (o.key.as_str(), o.size.unwrap_or(0)))
                    .collect();

                report.deleted_count += output.deleted.len() as u64;
                report.deleted_bytes += output
                    .deleted
                    .iter()
                    .filter_map(|key| sizes.get(key.as_str()))
                    .sum::<i64>();
                report.failed_keys += output.errors.len() as u64;
            }
            Err(err) => {
                tracing::error!(
                    region = %self.job.location.region,
                    %bucket,
                    batch_size = self.job.objects.len(),
                    error = %err,
                    "バッチ削除に失敗"
                );
                report.record_error(err);
            }
        }
    }
}

/// 同一の (リージョン, バケット, キー) を 1 件にまとめる
///
/// 異なるファイルの行が同じキーを指す場合があるため、サイズは合算する。
/// サイズが不明な行は 0 として扱い、すべて不明な場合だけ不明のまま残す。
/// 最初に現れた順序を保つ。
fn merge_duplicate_keys(objects: &[StorageObjectRef]) -> Vec<StorageObjectRef> {
    let mut merged: Vec<StorageObjectRef> = Vec::with_capacity(objects.len());
    let mut positions: HashMap<(&str, &str, &str), usize> = HashMap::new();

    for object in objects {
        let identity = (
            object.region.as_str(),
            object.bucket.as_str(),
            object.key.as_str(),
        );
        match positions.entry(identity) {
            Entry::Occupied(slot) => {
                let existing = &mut merged[*slot.get()];
                existing.size = match (existing.size, object.size) {
                    (None, None) => None,
                    (a, b) => Some(a.unwrap_or(0) + b.unwrap_or(0)),
                };
            }
            Entry::Vacant(slot) => {
                slot.insert(merged.len());
                merged.push(object.clone());
            }
        }
    }

    merged
}
