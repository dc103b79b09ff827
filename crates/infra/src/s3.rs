//! # S3 接続管理
//!
//! Amazon S3 / MinIO に対する [`ObjectStorageBackend`] の実装。
//!
//! - **ローカル開発**: MinIO を使用（`S3_ENDPOINT_URL` で接続先を指定）
//! - **本番環境**: IAM ロールによる認証で Amazon S3 に接続（`S3_ENDPOINT_URL` 未設定）
//!
//! ## エラー分類
//!
//! SDK のエラーを [`InfraError`] の一時的・恒久的に振り分ける。
//!
//! | 種別 | 判定 |
//! |---|---|
//! | タイムアウト / 送信失敗 / 応答の解釈失敗 | 一時的 |
//! | HTTP 429 / 5xx | 一時的 |
//! | `SlowDown` などのスロットリング系コード | 一時的 |
//! | それ以外 | 恒久的 |
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use cleansing_infra::s3;
//!
//! async fn setup() {
//!     // ローカル（MinIO）
//!     let client = s3::create_client("ap-southeast-1", Some("http://localhost:19000")).await;
//!     let backend = s3::AwsObjectStorage::new(client);
//!
//!     // 本番（AWS S3）
//!     let client = s3::create_client("ap-southeast-1", None).await;
//!     let backend = s3::AwsObjectStorage::new(client);
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::http::HttpResponse,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    types::{Delete, ObjectIdentifier},
};

use crate::{
    error::InfraError,
    storage::{
        BackendFactory,
        BatchDeleteOutput,
        KeyDeletionError,
        ObjectPage,
        ObjectStorageBackend,
    },
};

/// 再試行すれば回復しうるエラーコード
const TRANSIENT_ERROR_CODES: [&str; 6] = [
    "SlowDown",
    "Throttling",
    "ThrottlingException",
    "RequestTimeout",
    "ServiceUnavailable",
    "InternalError",
];

/// AWS S3 バックエンド
///
/// 1 つのリージョンに接続された `aws-sdk-s3` クライアントを保持する。
#[derive(Debug, Clone)]
pub struct AwsObjectStorage {
    client: Client,
}

impl AwsObjectStorage {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStorageBackend for AwsObjectStorage {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<String>,
        max_keys: usize,
    ) -> Result<ObjectPage, InfraError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .set_prefix(prefix.map(String::from))
            .set_continuation_token(continuation_token)
            .max_keys(i32::try_from(max_keys).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(|e| classify_sdk_error("オブジェクト一覧の取得に失敗", e))?;

        let keys = output
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(String::from))
            .collect();

        // 打ち切られていない場合、継続トークンは返ってきても使わない
        let next_continuation_token = if output.is_truncated() == Some(true) {
            output.next_continuation_token().map(String::from)
        } else {
            None
        };

        Ok(ObjectPage {
            keys,
            next_continuation_token,
        })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutput, InfraError> {
        let objects = keys
            .iter()
            .map(|key| ObjectIdentifier::builder().key(key).build())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                InfraError::storage_permanent(format!("削除対象の構築に失敗: {e}"))
            })?;

        // 確認された削除件数を数えるため quiet は無効にする
        let delete = Delete::builder()
            .set_objects(Some(objects))
            .quiet(false)
            .build()
            .map_err(|e| {
                InfraError::storage_permanent(format!("Delete リクエストの構築に失敗: {e}"))
            })?;

        let output = self
            .client
            .delete_objects()
            .bucket(bucket)
            .delete(delete)
            .send()
            .await
            .map_err(|e| classify_sdk_error("オブジェクトの削除に失敗", e))?;

        let deleted = output
            .deleted()
            .iter()
            .filter_map(|obj| obj.key().map(String::from))
            .collect();
        let errors = output
            .errors()
            .iter()
            .map(|err| KeyDeletionError {
                key:     err.key().unwrap_or_default().to_string(),
                code:    err.code().map(String::from),
                message: err.message().map(String::from),
            })
            .collect();

        Ok(BatchDeleteOutput { deleted, errors })
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), InfraError> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| classify_sdk_error("バケットの削除に失敗", e))?;
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>, InfraError> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| classify_sdk_error("バケット一覧の取得に失敗", e))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(String::from))
            .collect())
    }
}

/// リージョンごとに [`AwsObjectStorage`] を生成するファクトリ
#[derive(Debug, Clone, Default)]
pub struct AwsBackendFactory {
    endpoint: Option<String>,
}

impl AwsBackendFactory {
    pub fn new(endpoint: Option<String>) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl BackendFactory for AwsBackendFactory {
    async fn create(&self, region: &str) -> Result<Arc<dyn ObjectStorageBackend>, InfraError> {
        let client = create_client(region, self.endpoint.as_deref()).await;
        Ok(Arc::new(AwsObjectStorage::new(client)))
    }
}

/// S3 クライアントを作成する
///
/// `endpoint` が `Some` の場合は MinIO 等のカスタムエンドポイントに接続する。
///
/// 認証情報は SDK のデフォルト認証チェーンで解決する:
/// - ローカル: 環境変数 `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`（`.env` で設定）
/// - 本番: IAM ロール
pub async fn create_client(region: &str, endpoint: Option<&str>) -> Client {
    let mut config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(region.to_string()));

    if let Some(endpoint_url) = endpoint {
        config_builder = config_builder.endpoint_url(endpoint_url);
    }

    let config = config_builder.load().await;

    // MinIO はパススタイルが必要（バーチャルホスト型 URL を使わない）
    let s3_config_builder = aws_sdk_s3::config::Builder::from(&config);
    let s3_config = if endpoint.is_some() {
        s3_config_builder.force_path_style(true).build()
    } else {
        s3_config_builder.build()
    };

    Client::from_conf(s3_config)
}

/// SDK のエラーを一時的・恒久的に分類して [`InfraError`] に変換する
fn classify_sdk_error<E>(context: &str, err: SdkError<E, HttpResponse>) -> InfraError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            status == 429
                || status >= 500
                || err
                    .code()
                    .is_some_and(|code| TRANSIENT_ERROR_CODES.contains(&code))
        }
        _ => false,
    };

    InfraError::object_storage(format!("{context}: {}", DisplayErrorContext(&err)), transient)
}

#[cfg(test)]
mod tests {
    use aws_sdk_s3::operation::delete_objects::DeleteObjectsError;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_タイムアウトは一時的エラーに分類される() {
        let err = SdkError::<DeleteObjectsError, HttpResponse>::timeout_error("timed out");

        let sut = classify_sdk_error("削除", err);

        assert!(sut.is_transient());
    }

    #[test]
    fn test_リクエスト構築の失敗は恒久的エラーに分類される() {
        let err = SdkError::<DeleteObjectsError, HttpResponse>::construction_failure("bad input");

        let sut = classify_sdk_error("削除", err);

        assert!(!sut.is_transient());
    }

    #[test]
    fn test_send_syncを満たす() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AwsObjectStorage>();
        assert_send_sync::<AwsBackendFactory>();
    }

    #[rstest]
    #[case::既定のエンドポイント(None)]
    #[case::カスタムエンドポイント(Some("http://localhost:9000"))]
    #[tokio::test]
    async fn test_指定したリージョンのクライアントを作成できる(#[case] endpoint: Option<&str>) {
        let client = create_client("ap-northeast-1", endpoint).await;

        assert_eq!(
            client.config().region().map(ToString::to_string),
            Some("ap-northeast-1".to_string())
        );
    }

    #[tokio::test]
    async fn test_ファクトリはリージョンごとにバックエンドを作成できる() {
        let factory = AwsBackendFactory::new(Some("http://localhost:9000".to_string()));

        let result = factory.create("us-west-2").await;

        assert!(result.is_ok());
    }
}
