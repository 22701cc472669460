//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **StorageConfig**: 設定と起動時検証
//! - **SessionFactory**: コンテナ解決とセッションの払い出し
//! - **StorageSession**: 1 コネクション上の find/create/update/download/delete/sweep
//! - **SweepLoop**: 期限切れエントリの定期削除
//! - **DistributedStorage**: key/value API（get/set/remove）

pub mod config;
pub mod session;
pub mod session_factory;
pub mod storage;
pub mod sweep_loop;

#[cfg(test)]
pub(crate) mod fixtures;

// 主要な型を再エクスポート
pub use self::config::StorageConfig;
pub use self::session::{StorageSession, SweepReport};
pub use self::session_factory::SessionFactory;
pub use self::storage::DistributedStorage;
pub use self::sweep_loop::SweepLoop;
