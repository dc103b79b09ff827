/// 整数主キーベースの ID 型を定義する宣言型マクロ
///
/// 以下のボイラープレートを一括生成する:
/// - Newtype 構造体（`i64` をラップ）
/// - `derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)`
/// - `new()`: 既存の主キー値から作成
/// - `as_i64()`: 内部値の取得
///
/// 主キーは DB 側の自動採番で決まるため、ID の生成は行わない。
///
/// # 使用例
///
/// ```rust
/// use cleansing_domain::hierarchy::SiteId;
///
/// let id = SiteId::new(42);
/// assert_eq!(id.as_i64(), 42);
/// assert_eq!(id.to_string(), "42");
/// ```
macro_rules! define_i64_id {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
            derive_more::Display,
        )]
        #[display("{_0}")]
        #[serde(transparent)]
        $vis struct $Name(i64);

        impl $Name {
            /// 既存の主キー値から ID を作成する
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// 内部の主キー値を取得する
            pub const fn as_i64(&self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $Name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

pub(crate) use define_i64_id;
