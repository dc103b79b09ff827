//! # リージョン別クライアントキャッシュ
//!
//! リージョンごとのバックエンドを初回利用時に生成し、エンジンの寿命の間保持する。
//!
//! - 参照は読み取りロックのみ（読み取りが大半）
//! - 生成は書き込みロックを取った上で再確認し、同じリージョンのクライアントを
//!   二重に生成しない
//! - 空文字列または既定リージョンは既定クライアントを返す

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::ObjectStorageBackend;
use crate::error::InfraError;

/// リージョンを指定してバックエンドを生成するファクトリ
#[async_trait]
pub trait BackendFactory: Send + Sync {
    async fn create(&self, region: &str) -> Result<Arc<dyn ObjectStorageBackend>, InfraError>;
}

/// リージョン別クライアントキャッシュ
pub struct RegionClientCache {
    default_region: String,
    default_client: Arc<dyn ObjectStorageBackend>,
    factory:        Arc<dyn BackendFactory>,
    clients:        RwLock<HashMap<String, Arc<dyn ObjectStorageBackend>>>,
}

impl RegionClientCache {
    pub fn new(
        default_region: impl Into<String>,
        default_client: Arc<dyn ObjectStorageBackend>,
        factory: Arc<dyn BackendFactory>,
    ) -> Self {
        Self {
            default_region: default_region.into(),
            default_client,
            factory,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// 既定リージョン
    pub fn default_region(&self) -> &str {
        &self.default_region
    }

    /// 既定クライアント
    pub fn default_client(&self) -> Arc<dyn ObjectStorageBackend> {
        Arc::clone(&self.default_client)
    }

    /// リージョンに対応するクライアントを取得する（なければ生成する）
    pub async fn get(&self, region: &str) -> Result<Arc<dyn ObjectStorageBackend>, InfraError> {
        if region.is_empty() || region == self.default_region {
            return Ok(self.default_client());
        }

        if let Some(client) = self.clients.read().await.get(region) {
            return Ok(Arc::clone(client));
        }

        let mut clients = self.clients.write().await;
        // 書き込みロック待ちの間に別のタスクが生成している場合がある
        if let Some(client) = clients.get(region) {
            return Ok(Arc::clone(client));
        }

        tracing::info!(region, "リージョン用のストレージクライアントを作成");
        let client = self.factory.create(region).await?;
        clients.insert(region.to_string(), Arc::clone(&client));
        Ok(client)
    }

    /// キャッシュ済みのリージョン数（既定クライアントは含まない）
    #[cfg(test)]
    async fn cached_regions(&self) -> usize {
        self.clients.read().await.len()
    }
}
