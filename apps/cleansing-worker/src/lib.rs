//! # Cleansing Worker ライブラリ
//!
//! 削除リクエストを受け取り、オブジェクトストレージと DB から
//! 対象スコープ配下のデータを削除するワーカー。
//!
//! ## モジュール構成
//!
//! - [`config`]: 環境変数からの設定読み込み
//! - [`usecase`]: 階層の解決と削除カスケード
//! - [`handler`]: 1 件のメッセージの処理と再配信の判定
//! - [`worker`]: キューを消費するワーカープール

pub mod config;
pub mod error;
pub mod handler;
pub mod usecase;
pub mod worker;

#[cfg(test)]
mod test_utils;
