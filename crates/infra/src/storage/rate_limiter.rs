//! # ストレージ呼び出しのレート制限
//!
//! エンジン 1 つにつき 1 つのトークンバケットを持ち、すべての並行バッチで共有する。
//! ストレージサービスへの背圧はこのリミッターだけで掛ける。

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio_util::sync::CancellationToken;

use crate::error::InfraError;

/// トークンバケット方式のレートリミッター
#[derive(Debug)]
pub struct StorageRateLimiter {
    limiter: DefaultDirectRateLimiter,
}

impl StorageRateLimiter {
    /// 秒間 `per_second` 回、最大 `burst` 回まで連続で許可するリミッターを作成する
    ///
    /// # Errors
    ///
    /// いずれかの値が 0 の場合は [`InfraError::invalid_input`]。
    pub fn new(per_second: u32, burst: u32) -> Result<Self, InfraError> {
        let rate = NonZeroU32::new(per_second)
            .ok_or_else(|| InfraError::invalid_input("レート制限の秒間回数は 1 以上が必要です"))?;
        let burst_nz = NonZeroU32::new(burst)
            .ok_or_else(|| InfraError::invalid_input("レート制限のバースト数は 1 以上が必要です"))?;

        tracing::debug!(per_second, burst, "ストレージ用レートリミッターを作成");

        Ok(Self {
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst_nz)),
        })
    }

    /// トークンを 1 つ取得するまで待機する
    ///
    /// 待機中にキャンセルされた場合は [`InfraError::cancelled`] を返す。
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), InfraError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(InfraError::cancelled()),
            () = self.limiter.until_ready() => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn test_ゼロのレートは作成できない() {
        assert!(StorageRateLimiter::new(0, 10).is_err());
        assert!(StorageRateLimiter::new(100, 0).is_err());
    }

    #[tokio::test]
    async fn test_バースト分は待たずに取得できる() {
        let sut = StorageRateLimiter::new(1, 5).unwrap();
        let cancel = CancellationToken::new();

        let started = Instant::now();
        for _ in 0..5 {
            sut.acquire(&cancel).await.unwrap();
        }

        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_キャンセル済みなら待機せずにエラーを返す() {
        let sut = StorageRateLimiter::new(1, 1).unwrap();
        let cancel = CancellationToken::new();
        sut.acquire(&cancel).await.unwrap();

        cancel.cancel();
        let result = sut.acquire(&cancel).await;

        assert!(result.unwrap_err().is_cancelled());
    }
}
