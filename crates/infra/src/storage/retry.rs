//! # 再試行ポリシー
//!
//! 一時的エラー（[`InfraError::is_transient`]）に対してのみ、指数バックオフで再試行する。
//!
//! 遅延は `base_delay * 2^(attempt - 1)` で、`max_delay` を上限とする。
//!
//! | attempt | base=100ms, max=5s |
//! |---|---|
//! | 1 | 100ms |
//! | 2 | 200ms |
//! | 3 | 400ms |
//! | 7 | 5s（上限） |

use std::{future::Future, time::Duration};

use tokio_util::sync::CancellationToken;

use crate::error::InfraError;

/// 再試行ポリシー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 初回試行後に行う再試行の最大回数
    pub max_retries: u32,
    /// 初回の再試行までの待機時間
    pub base_delay:  Duration,
    /// 待機時間の上限
    pub max_delay:   Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay:  Duration::from_millis(100),
            max_delay:   Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// `attempt` 回目の失敗後に待機する時間（attempt は 1 始まり）
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// 操作を実行し、一時的エラーであれば再試行する
    ///
    /// `operation` には 1 始まりの試行回数が渡される。
    /// 恒久的エラーと再試行回数の超過時は最後のエラーをそのまま返す。
    /// 待機中にキャンセルされた場合は [`InfraError::cancelled`] を返す。
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, InfraError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, InfraError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(InfraError::cancelled());
            }

            let err = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() || attempt > self.max_retries {
                return Err(err);
            }

            let delay = self.next_delay(attempt);
            tracing::warn!(
                attempt,
                max_retries = self.max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "一時的なエラーのため再試行します"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(InfraError::cancelled()),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[rstest]
    #[case(1, Duration::from_millis(100))]
    #[case(2, Duration::from_millis(200))]
    #[case(3, Duration::from_millis(400))]
    #[case(7, Duration::from_secs(5))]
    #[case(100, Duration::from_secs(5))]
    fn test_待機時間は指数的に増え上限で止まる(
        #[case] attempt: u32,
        #[case] expected: Duration,
    ) {
        assert_eq!(RetryPolicy::default().next_delay(attempt), expected);
    }

    #[tokio::test]
    async fn test_一時的エラーの後に成功すれば値を返す() {
        let calls = Arc::new(AtomicU32::new(0));
        let sut = fast_policy(3);

        let result = sut
            .run(&CancellationToken::new(), |_| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(InfraError::storage_transient("SlowDown"))
                    } else {
                        Ok("deleted")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "deleted");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_再試行回数を超えると最後のエラーを返す() {
        let calls = Arc::new(AtomicU32::new(0));
        let sut = fast_policy(3);

        let result: Result<(), _> = sut
            .run(&CancellationToken::new(), |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(InfraError::storage_transient("SlowDown"))
                }
            })
            .await;

        assert!(result.unwrap_err().is_transient());
        // 初回 + 再試行 3 回
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_恒久的エラーは再試行しない() {
        let calls = Arc::new(AtomicU32::new(0));
        let sut = fast_policy(3);

        let result: Result<(), _> = sut
            .run(&CancellationToken::new(), |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(InfraError::storage_permanent("AccessDenied"))
                }
            })
            .await;

        assert!(!result.unwrap_err().is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_バックオフ中のキャンセルで即座に中断する() {
        let cancel = CancellationToken::new();
        let sut = RetryPolicy {
            max_retries: 3,
            base_delay:  Duration::from_secs(60),
            max_delay:   Duration::from_secs(60),
        };

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = tokio::time::timeout(
            Duration::from_secs(5),
            sut.run(&cancel, |_| async {
                Err(InfraError::storage_transient("SlowDown"))
            }),
        )
        .await
        .expect("キャンセルで即座に戻ること");

        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_試行回数は1始まりで渡される() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sut = fast_policy(2);

        let _: Result<(), _> = sut
            .run(&CancellationToken::new(), |attempt| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().unwrap().push(attempt);
                    Err(InfraError::storage_transient("SlowDown"))
                }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
