//! # クレンジングワーカー 共有ユーティリティ
//!
//! ワーカー本体とインフラ層から使われる共通ユーティリティ。
//!
//! - ビジネスロジックを含まない純粋なユーティリティのみを配置
//! - 外部クレートへの依存は feature で切り替える

pub mod observability;
