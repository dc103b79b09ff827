//! # インフラ層エラー定義
//!
//! データベース・オブジェクトストレージ・メッセージキューとの通信で発生する
//! エラーを表現する。
//!
//! ## 構造
//!
//! `std::io::Error` と同じ struct + enum パターンを採用:
//! - [`InfraError`]: エラー種別（[`InfraErrorKind`]）と [`SpanTrace`] を保持するラッパー
//! - [`InfraErrorKind`]: エラーの具体的な種別（Database, ObjectStorage, Cancelled 等）
//!
//! `From` 実装や convenience constructor でエラーを生成すると、その時点の
//! 呼び出し経路が自動で記録される。
//!
//! ## 一時的エラー
//!
//! [`InfraError::is_transient`] が true のエラーだけが再試行の対象になる。

use std::fmt;

use derive_more::Display;
use thiserror::Error;
use tracing_error::SpanTrace;

/// インフラ層で発生するエラー
///
/// エラー種別に応じた処理には [`kind()`](InfraError::kind) を使用する:
///
/// ```ignore
/// match error.kind() {
///     InfraErrorKind::Cancelled => { /* 中断 */ }
///     _ => { /* その他 */ }
/// }
/// ```
#[derive(Display)]
#[display("{kind}")]
pub struct InfraError {
    kind:       InfraErrorKind,
    span_trace: SpanTrace,
}

/// インフラ層エラーの種別
#[derive(Debug, Error)]
pub enum InfraErrorKind {
    /// データベースエラー
    ///
    /// SQL クエリの実行失敗、接続エラー、制約違反など。
    #[error("データベースエラー: {0}")]
    Database(#[source] sqlx::Error),

    /// Redis エラー
    ///
    /// キューへの接続失敗、コマンド実行エラーなど。
    #[error("Redis エラー: {0}")]
    Redis(#[source] redis::RedisError),

    /// シリアライズ/デシリアライズエラー
    #[error("シリアライズエラー: {0}")]
    Serialization(#[source] serde_json::Error),

    /// オブジェクトストレージエラー
    ///
    /// AWS SDK のエラー型はジェネリクスが深く `#[from]` が困難なため、
    /// 分類済みのメッセージとして保持する。`transient` はスロットリングや
    /// 通信断など、時間を置けば成功しうるエラーであることを示す。
    #[error("オブジェクトストレージエラー: {message}")]
    ObjectStorage {
        /// エラー内容
        message:   String,
        /// 再試行で回復しうるか
        transient: bool,
    },

    /// キャンセル
    ///
    /// タイムアウトまたはシャットダウンにより処理が中断された。
    #[error("処理がキャンセルされました")]
    Cancelled,

    /// 入力エラー
    #[error("入力エラー: {0}")]
    InvalidInput(String),

    /// 予期しないエラー
    #[error("予期しないエラー: {0}")]
    Unexpected(String),
}

// ===== InfraError のメソッド =====

impl InfraError {
    /// エラー種別を取得する
    pub fn kind(&self) -> &InfraErrorKind {
        &self.kind
    }

    /// SpanTrace を取得する
    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    /// 再試行で回復しうるエラーかどうか
    ///
    /// - オブジェクトストレージ: 分類時に `transient` と判定されたもの
    /// - データベース: I/O エラーと接続プールのタイムアウト
    pub fn is_transient(&self) -> bool {
        match &self.kind {
            InfraErrorKind::ObjectStorage { transient, .. } => *transient,
            InfraErrorKind::Database(e) => {
                matches!(e, sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut)
            }
            _ => false,
        }
    }

    /// キャンセルによるエラーかどうか
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, InfraErrorKind::Cancelled)
    }

    /// InfraError を分解して InfraErrorKind と SpanTrace を取り出す
    pub fn into_parts(self) -> (InfraErrorKind, SpanTrace) {
        (self.kind, self.span_trace)
    }

    // ===== Convenience constructors =====

    /// 一時的なオブジェクトストレージエラーを生成する
    pub fn storage_transient(msg: impl Into<String>) -> Self {
        Self::object_storage(msg, true)
    }

    /// 恒久的なオブジェクトストレージエラーを生成する
    pub fn storage_permanent(msg: impl Into<String>) -> Self {
        Self::object_storage(msg, false)
    }

    /// オブジェクトストレージエラーを生成する
    pub fn object_storage(msg: impl Into<String>, transient: bool) -> Self {
        Self {
            kind:       InfraErrorKind::ObjectStorage {
                message: msg.into(),
                transient,
            },
            span_trace: SpanTrace::capture(),
        }
    }

    /// キャンセルエラーを生成する
    pub fn cancelled() -> Self {
        Self {
            kind:       InfraErrorKind::Cancelled,
            span_trace: SpanTrace::capture(),
        }
    }

    /// 入力エラーを生成する
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self {
            kind:       InfraErrorKind::InvalidInput(msg.into()),
            span_trace: SpanTrace::capture(),
        }
    }

    /// 予期しないエラーを生成する
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self {
            kind:       InfraErrorKind::Unexpected(msg.into()),
            span_trace: SpanTrace::capture(),
        }
    }
}

// ===== トレイト実装 =====

impl fmt::Debug for InfraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfraError")
            .field("kind", &self.kind)
            .field("span_trace", &self.span_trace)
            .finish()
    }
}

impl std::error::Error for InfraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.kind.source()
    }
}

// ===== From 実装（SpanTrace 自動キャプチャ） =====

impl From<sqlx::Error> for InfraError {
    fn from(source: sqlx::Error) -> Self {
        Self {
            kind:       InfraErrorKind::Database(source),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl From<redis::RedisError> for InfraError {
    fn from(source: redis::RedisError) -> Self {
        Self {
            kind:       InfraErrorKind::Redis(source),
            span_trace: SpanTrace::capture(),
        }
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(source: serde_json::Error) -> Self {
        Self {
            kind:       InfraErrorKind::Serialization(source),
            span_trace: SpanTrace::capture(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tracing_subscriber::layer::SubscriberExt as _;

    use super::*;

    /// テスト用に ErrorLayer 付き subscriber を設定する
    fn with_error_layer(f: impl FnOnce()) {
        let subscriber = tracing_subscriber::registry().with(tracing_error::ErrorLayer::default());
        let _guard = tracing::subscriber::set_default(subscriber);
        f();
    }

    #[test]
    fn test_from_sqlx_errorでspan_traceがキャプチャされる() {
        with_error_layer(|| {
            let span = tracing::info_span!("hard_delete_by_site_id", site_id = 42);
            let _enter = span.enter();

            let err: InfraError = sqlx::Error::RowNotFound.into();

            assert!(matches!(err.kind(), InfraErrorKind::Database(_)));
            let trace_str = format!("{}", err.span_trace());
            assert!(
                trace_str.contains("hard_delete_by_site_id"),
                "SpanTrace がスパン名を含むこと: {trace_str}",
            );
        });
    }

    #[test]
    fn test_object_storageでspan_traceがキャプチャされる() {
        with_error_layer(|| {
            let span = tracing::info_span!("delete_batch", bucket = "tenant");
            let _enter = span.enter();

            let err = InfraError::storage_transient("SlowDown");

            assert!(matches!(
                err.kind(),
                InfraErrorKind::ObjectStorage { message, transient: true } if message == "SlowDown"
            ));
            assert!(format!("{}", err.span_trace()).contains("delete_batch"));
        });
    }

    #[rstest]
    #[case(InfraError::storage_transient("SlowDown"), true)]
    #[case(InfraError::storage_permanent("AccessDenied"), false)]
    #[case(InfraError::from(sqlx::Error::PoolTimedOut), true)]
    #[case(InfraError::from(sqlx::Error::RowNotFound), false)]
    #[case(InfraError::cancelled(), false)]
    #[case(InfraError::unexpected("bug"), false)]
    fn test_is_transientはエラー種別で決まる(
        #[case] err: InfraError,
        #[case] expected: bool,
    ) {
        assert_eq!(err.is_transient(), expected);
    }

    #[test]
    fn test_from_redis_errorでredis種別になる() {
        let redis_err: redis::RedisError = (redis::ErrorKind::Io, "接続失敗").into();
        let err: InfraError = redis_err.into();

        assert!(matches!(err.kind(), InfraErrorKind::Redis(_)));
    }

    #[test]
    fn test_cancelledはis_cancelledで判定できる() {
        assert!(InfraError::cancelled().is_cancelled());
        assert!(!InfraError::storage_transient("x").is_cancelled());
    }

    #[test]
    fn test_displayがinfra_error_kindのメッセージを出力する() {
        let err = InfraError::storage_permanent("AccessDenied");
        assert_eq!(format!("{err}"), "オブジェクトストレージエラー: AccessDenied");
    }

    #[test]
    fn test_sourceがinfra_error_kindに委譲する() {
        use std::error::Error;

        let err: InfraError = sqlx::Error::RowNotFound.into();

        assert!(err.source().is_some());
    }
}
