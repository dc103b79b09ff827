//! # メッセージキュー
//!
//! 削除リクエストを受け取る Redis リストベースのキュー。
//!
//! ## 配信回数の管理
//!
//! プロデューサーは削除リクエストの JSON をそのままリストへ `RPUSH` する。
//! ワーカーが再投入する際は、元の本文と配信回数を [`Envelope`] に包んで末尾に戻す。
//! 取り出し時に包まれていなければ初回配信（attempt = 1）として扱う。
//!
//! 再試行回数を使い切ったメッセージは `{queue}:dead` に移し、運用で確認する。

use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Deserialize, Serialize};

use crate::error::InfraError;

/// キューから取り出した 1 件のメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// プロデューサーが投入した本文
    pub body:    String,
    /// 配信回数（1 始まり）
    pub attempt: u32,
}

impl Delivery {
    /// 初回配信として作成する
    pub fn first(body: impl Into<String>) -> Self {
        Self {
            body:    body.into(),
            attempt: 1,
        }
    }

    /// 配信回数を 1 つ進めたものを返す
    pub fn next_attempt(&self) -> Self {
        Self {
            body:    self.body.clone(),
            attempt: self.attempt.saturating_add(1),
        }
    }
}

/// 再投入時の包み
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    attempt: u32,
    body:    String,
}

fn decode(raw: String) -> Delivery {
    match serde_json::from_str::<Envelope>(&raw) {
        Ok(envelope) => Delivery {
            body:    envelope.body,
            attempt: envelope.attempt.max(1),
        },
        Err(_) => Delivery::first(raw),
    }
}

fn encode(delivery: &Delivery) -> Result<String, InfraError> {
    Ok(serde_json::to_string(&Envelope {
        attempt: delivery.attempt,
        body:    delivery.body.clone(),
    })?)
}

/// メッセージキューのインターフェース
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// 先頭のメッセージを 1 件取り出す（空なら `None`）
    async fn receive(&self) -> Result<Option<Delivery>, InfraError>;

    /// 配信回数を進めてキューの末尾に戻す
    async fn requeue(&self, delivery: &Delivery) -> Result<(), InfraError>;

    /// デッドレターキューに移す
    async fn dead_letter(&self, delivery: &Delivery) -> Result<(), InfraError>;
}

/// Redis リストを使用したメッセージキュー
pub struct RedisMessageQueue {
    conn:        ConnectionManager,
    queue_name:  String,
    dead_letter: String,
}

impl RedisMessageQueue {
    /// 新しい RedisMessageQueue を作成する
    ///
    /// # 引数
    ///
    /// - `redis_url`: Redis 接続 URL（例: `redis://localhost:6379`）
    /// - `queue_name`: 消費するリストのキー
    pub async fn new(redis_url: &str, queue_name: &str) -> Result<Self, InfraError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            queue_name: queue_name.to_string(),
            dead_letter: dead_letter_name(queue_name),
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

/// デッドレターキューのキー
pub fn dead_letter_name(queue_name: &str) -> String {
    format!("{queue_name}:dead")
}

#[async_trait]
impl MessageQueue for RedisMessageQueue {
    async fn receive(&self) -> Result<Option<Delivery>, InfraError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("LPOP")
            .arg(&self.queue_name)
            .query_async(&mut conn)
            .await?;
        Ok(raw.map(decode))
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<(), InfraError> {
        let payload = encode(&delivery.next_attempt())?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(&self.queue_name, payload).await?;
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery) -> Result<(), InfraError> {
        let payload = encode(delivery)?;
        let mut conn = self.conn.clone();
        let _: () = conn.rpush(&self.dead_letter, payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_包まれていない本文は初回配信として扱う() {
        let raw = r#"{"type":"site","id":42}"#.to_string();

        let sut = decode(raw.clone());

        assert_eq!(sut, Delivery::first(raw));
    }

    #[test]
    fn test_再投入した本文は配信回数を保持して取り出せる() {
        let original = Delivery::first(r#"{"type":"project","id":7}"#);

        let encoded = encode(&original.next_attempt()).unwrap();
        let sut = decode(encoded);

        assert_eq!(sut.body, original.body);
        assert_eq!(sut.attempt, 2);
    }

    #[test]
    fn test_壊れた本文もそのまま初回配信として扱う() {
        let sut = decode("not json".to_string());

        assert_eq!(sut.body, "not json");
        assert_eq!(sut.attempt, 1);
    }

    #[test]
    fn test_デッドレターキューのキーはキュー名にdeadを付ける() {
        assert_eq!(dead_letter_name("data-cleansing"), "data-cleansing:dead");
    }
}
