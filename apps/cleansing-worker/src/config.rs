//! # ワーカー設定
//!
//! 環境変数からワーカーの設定を読み込む。
//!
//! | 変数名 | 既定値 | 説明 |
//! |--------|--------|------|
//! | `DATABASE_URL` | **必須** | PostgreSQL 接続 URL |
//! | `DATABASE_MAX_CONNECTIONS` | `5` | 接続プールの最大接続数 |
//! | `REDIS_URL` | **必須** | 削除リクエストのキューを持つ Redis |
//! | `CLEANSING_QUEUE_NAME` | `data-cleansing` | 消費するリストのキー |
//! | `MAX_REQUEUE_ATTEMPT` | `5` | デッドレターに移すまでの配信回数 |
//! | `WORKER_CONCURRENCY` | `1` | 同時に処理するメッセージ数 |
//! | `QUEUE_POLL_INTERVAL_MS` | `1000` | キューが空のときの待機時間 |
//! | `STORAGE_BACKEND` | `s3` | `s3` または `null` |
//! | `AWS_REGION` | `ap-southeast-1` | 既定リージョン |
//! | `S3_ENDPOINT_URL` | なし | MinIO 等のカスタムエンドポイント |
//! | `S3_DEFAULT_BUCKET` | **必須** | 契約者にバケットがない場合のバケット |
//! | `S3_MAX_CONCURRENT_DELETES` | `3` | 同時に実行するバッチ削除の数 |
//! | `S3_RATE_LIMIT_PER_SECOND` | `100` | ストレージ呼び出しの秒間上限 |
//! | `S3_RATE_LIMIT_BURST` | `10` | ストレージ呼び出しのバースト数 |
//! | `S3_MAX_RETRIES` | `3` | 一時的エラーの再試行回数 |
//! | `S3_RETRY_BASE_DELAY_MS` | `100` | 初回の再試行までの待機時間 |
//! | `S3_RETRY_MAX_DELAY_MS` | `5000` | 再試行の待機時間の上限 |
//! | `CLEANSING_TIMEOUT_SECS` | `600` | 1 メッセージあたりの処理時間の上限 |
//!
//! 空文字列は未設定として扱う。

use std::{env, str::FromStr, time::Duration};

use cleansing_infra::storage::{DeletionEngineConfig, RetryPolicy};

use crate::error::ConfigError;

/// ストレージバックエンドの種類
///
/// `STORAGE_BACKEND` 環境変数で切り替える:
/// - `s3`: Amazon S3 / MinIO に接続する
/// - `null`: 何も削除しない（DB の行だけを削除する検証用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum StorageBackendKind {
    #[default]
    S3,
    Null,
}

/// ワーカーの設定
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// データベース接続 URL
    pub database_url:             String,
    /// 接続プールの最大接続数
    pub database_max_connections: u32,
    /// Redis 接続 URL
    pub redis_url:                String,
    /// 消費するキュー名
    pub queue_name:               String,
    /// デッドレターに移すまでの配信回数
    pub max_requeue_attempt:      u32,
    /// 同時に処理するメッセージ数
    pub concurrency:              usize,
    /// キューが空のときの待機時間
    pub poll_interval:            Duration,
    /// 1 メッセージあたりの処理時間の上限
    pub cleansing_timeout:        Duration,
    /// オブジェクトストレージの設定
    pub storage:                  StorageConfig,
}

/// オブジェクトストレージの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub backend:                StorageBackendKind,
    /// 既定リージョン
    pub region:                 String,
    /// カスタムエンドポイント（MinIO 使用時に設定）
    pub endpoint_url:           Option<String>,
    /// 契約者にバケットがない場合に使うバケット
    pub default_bucket:         String,
    pub max_concurrent_deletes: usize,
    pub rate_limit_per_second:  u32,
    pub rate_limit_burst:       u32,
    pub max_retries:            u32,
    pub retry_base_delay:       Duration,
    pub retry_max_delay:        Duration,
}

impl StorageConfig {
    /// 削除エンジンの設定に変換する
    pub fn deletion_engine_config(&self) -> DeletionEngineConfig {
        DeletionEngineConfig {
            max_concurrent_deletes: self.max_concurrent_deletes,
            rate_limit_per_second:  self.rate_limit_per_second,
            rate_limit_burst:       self.rate_limit_burst,
            retry:                  RetryPolicy {
                max_retries: self.max_retries,
                base_delay:  self.retry_base_delay,
                max_delay:   self.retry_max_delay,
            },
        }
    }
}

impl WorkerConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 任意の読み取り関数から設定を読み込む
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let storage = StorageConfig {
            backend:                vars.parse_or("STORAGE_BACKEND", StorageBackendKind::S3)?,
            region:                 vars
                .get("AWS_REGION")
                .unwrap_or_else(|| "ap-southeast-1".to_string()),
            endpoint_url:           vars.get("S3_ENDPOINT_URL"),
            default_bucket:         vars.required("S3_DEFAULT_BUCKET")?,
            max_concurrent_deletes: vars.positive_or("S3_MAX_CONCURRENT_DELETES", 3)?,
            rate_limit_per_second:  vars.positive_or("S3_RATE_LIMIT_PER_SECOND", 100)?,
            rate_limit_burst:       vars.positive_or("S3_RATE_LIMIT_BURST", 10)?,
            max_retries:            vars.parse_or("S3_MAX_RETRIES", 3)?,
            retry_base_delay:       Duration::from_millis(
                vars.parse_or("S3_RETRY_BASE_DELAY_MS", 100)?,
            ),
            retry_max_delay:        Duration::from_millis(
                vars.parse_or("S3_RETRY_MAX_DELAY_MS", 5000)?,
            ),
        };

        Ok(Self {
            database_url: vars.required("DATABASE_URL")?,
            database_max_connections: vars.positive_or("DATABASE_MAX_CONNECTIONS", 5)?,
            redis_url: vars.required("REDIS_URL")?,
            queue_name: vars
                .get("CLEANSING_QUEUE_NAME")
                .unwrap_or_else(|| "data-cleansing".to_string()),
            max_requeue_attempt: vars.positive_or("MAX_REQUEUE_ATTEMPT", 5)?,
            concurrency: vars.positive_or("WORKER_CONCURRENCY", 1)?,
            poll_interval: Duration::from_millis(vars.parse_or("QUEUE_POLL_INTERVAL_MS", 1000)?),
            cleansing_timeout: Duration::from_secs(
                vars.positive_or("CLEANSING_TIMEOUT_SECS", 600)?,
            ),
            storage,
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.get(name).ok_or(ConfigError::Missing(name))
    }

    fn parse_or<T: FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(name) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid { var: name, value }),
        }
    }

    /// 0 を許さない数値
    fn positive_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialEq + Default,
    {
        let value = self.parse_or(name, default)?;
        if value == T::default() {
            return Err(ConfigError::Invalid {
                var:   name,
                value: "0".to_string(),
            });
        }
        Ok(value)
    }
}
