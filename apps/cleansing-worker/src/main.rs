//! # Cleansing Worker
//!
//! 削除リクエストをキューから受け取り、契約者・プロジェクト・サイトの
//! いずれかのスコープ配下にあるオブジェクトと DB の行を削除するワーカー。
//!
//! ## 構成
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │ Redis (list) │────→│ Cleansing Worker │────→│  PostgreSQL  │
//! └──────────────┘     └──────────────────┘     └──────────────┘
//!                               │
//!                               ↓
//!                      ┌──────────────────┐
//!                      │   Amazon S3      │
//!                      │（リージョン別）  │
//!                      └──────────────────┘
//! ```
//!
//! ## 環境変数
//!
//! 設定項目の一覧は [`config`](cleansing_worker::config) を参照。
//! 主要なもの:
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `DATABASE_URL` | **Yes** | PostgreSQL 接続 URL |
//! | `REDIS_URL` | **Yes** | 削除リクエストのキューを持つ Redis |
//! | `S3_DEFAULT_BUCKET` | **Yes** | 契約者にバケットがない場合のバケット |
//! | `STORAGE_BACKEND` | No | `s3`（デフォルト）または `null` |
//! | `LOG_FORMAT` | No | `json` または `pretty`（デフォルト） |
//!
//! ## 起動方法
//!
//! ```bash
//! # 開発環境（MinIO）
//! S3_ENDPOINT_URL=http://localhost:9000 cargo run -p cleansing-worker
//!
//! # ストレージに触れずに DB の削除だけを確認する
//! STORAGE_BACKEND=null cargo run -p cleansing-worker
//! ```
//!
//! ## 停止
//!
//! SIGINT / SIGTERM を受け取ると新しいメッセージの取り出しを止め、
//! 処理中のメッセージを中断して再配信に回してから終了する。

use std::sync::Arc;

use anyhow::Context as _;
use cleansing_infra::{
    db,
    queue::{MessageQueue, RedisMessageQueue},
    s3::{self, AwsBackendFactory, AwsObjectStorage},
    storage::{
        BackendFactory,
        DeletionEngine,
        NullObjectStorage,
        ObjectStorageBackend,
        RegionClientCache,
    },
};
use cleansing_shared::observability::{TracingConfig, init_tracing};
use cleansing_worker::{
    config::{StorageBackendKind, StorageConfig, WorkerConfig},
    handler::CleansingHandler,
    usecase::{CleansingUseCaseImpl, HierarchyRepositories},
    worker::WorkerPool,
};
use tokio_util::sync::CancellationToken;

/// ワーカーのエントリーポイント
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    init_tracing(&TracingConfig::from_env("cleansing-worker"));

    let config = WorkerConfig::from_env().context("設定の読み込みに失敗しました")?;
    tracing::info!(
        queue = %config.queue_name,
        concurrency = config.concurrency,
        storage_backend = %config.storage.backend,
        region = %config.storage.region,
        "Cleansing Worker を起動します"
    );

    let pool = db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("データベース接続に失敗しました")?;
    tracing::info!("データベースに接続しました");

    let (default_backend, factory) = storage_backend(&config.storage).await;
    let clients = RegionClientCache::new(config.storage.region.clone(), default_backend, factory);
    let engine = DeletionEngine::new(
        Arc::new(clients),
        config.storage.deletion_engine_config(),
    )
    .context("削除エンジンの初期化に失敗しました")?;

    let usecase = CleansingUseCaseImpl::new(
        HierarchyRepositories::postgres(pool),
        Arc::new(engine),
        config.storage.default_bucket.clone(),
    );

    let queue: Arc<dyn MessageQueue> = Arc::new(
        RedisMessageQueue::new(&config.redis_url, &config.queue_name)
            .await
            .context("Redis への接続に失敗しました")?,
    );
    tracing::info!("Redis に接続しました");

    let handler = CleansingHandler::new(
        Arc::new(usecase),
        Arc::clone(&queue),
        config.max_requeue_attempt,
        config.cleansing_timeout,
    );
    let workers = WorkerPool::new(
        queue,
        Arc::new(handler),
        config.concurrency,
        config.poll_interval,
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let processed = workers.run(shutdown).await;
    tracing::info!(processed, "Cleansing Worker を停止しました");

    Ok(())
}

/// 既定リージョンのバックエンドとリージョン別クライアントのファクトリを作成する
async fn storage_backend(
    config: &StorageConfig,
) -> (Arc<dyn ObjectStorageBackend>, Arc<dyn BackendFactory>) {
    match config.backend {
        StorageBackendKind::S3 => {
            let client = s3::create_client(&config.region, config.endpoint_url.as_deref()).await;
            let backend = AwsObjectStorage::new(client);

            // 起動を止めず、到達できない場合は警告のみ
            match backend.list_buckets().await {
                Ok(buckets) => tracing::info!(
                    bucket_count = buckets.len(),
                    "オブジェクトストレージに接続しました"
                ),
                Err(e) => tracing::warn!(
                    error = %e,
                    "オブジェクトストレージに到達できません。削除時に再試行します"
                ),
            }

            (
                Arc::new(backend),
                Arc::new(AwsBackendFactory::new(config.endpoint_url.clone())),
            )
        }
        StorageBackendKind::Null => {
            tracing::warn!(
                "STORAGE_BACKEND=null: オブジェクトは削除されず、DB の行だけが削除されます"
            );
            (Arc::new(NullObjectStorage), Arc::new(NullObjectStorage))
        }
    }
}

/// SIGINT / SIGTERM を待ってシャットダウンを開始する
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "SIGINT のハンドラを登録できません");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM のハンドラを登録できません");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("SIGINT を受信しました"),
        () = terminate => tracing::info!("SIGTERM を受信しました"),
    }
    shutdown.cancel();
}
