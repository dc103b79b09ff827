//! # Cleansing Domain
//!
//! データ削除ワーカーのドメイン層。
//!
//! I/O を一切持たず、削除対象の階層・キー導出・削除結果だけを扱う。
//!
//! ## モジュール構成
//!
//! - [`hierarchy`]: Contractor から File までの包含階層と ID 型
//! - [`scope`]: 削除リクエスト（種別と ID）の検証
//! - [`storage_key`]: 階層上の位置からオブジェクトキーを導出する純粋関数
//! - [`outcome`]: 部分的な成功を表現できる削除結果
//! - [`error`]: ドメインエラー

mod macros;

pub mod error;
pub mod hierarchy;
pub mod outcome;
pub mod scope;
pub mod storage_key;

pub use error::DomainError;
