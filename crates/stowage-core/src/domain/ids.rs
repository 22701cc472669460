//! Backend object identifiers.
//!
//! バックエンドが払い出す ID は不透明な文字列です（Drive なら file id、
//! InMemory なら ULID）。エントリ名（呼び出し側のキー）と混同しないように
//! newtype で包みます。

use serde::{Deserialize, Serialize};
use std::fmt;

/// ObjectId はバックエンドが割り当てた ID
///
/// # 設計原則
/// - 値の生成はバックエンドの責務（クライアントは作らない）
/// - コンテナ（フォルダ）とエントリ（ファイル）の両方に使う
/// - `name` とは別物。名前は一意性が保証されない
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
