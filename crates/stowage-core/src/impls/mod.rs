//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryConnector / InMemoryObjectStore**: 開発用のオブジェクトストア（障害注入つき）
//!
//! # 本番用実装
//! 本番用の実装は別クレートに配置します：
//! - `stowage-drive`: DriveConnector（Google Drive v3 REST）

pub mod inmem_store;

// 主要な型を再エクスポート
pub use self::inmem_store::{Grant, InMemoryConnector, InMemoryObjectStore};
