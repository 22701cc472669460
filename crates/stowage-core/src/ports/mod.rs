//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（リモートのオブジェクトストア、時計）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - バックエンドが source of truth（ローカルにキャッシュしない）
//! - コネクションは操作ごとに開いて閉じる
//! - 時刻は Clock 経由でのみ取得する（期限切れ判定をテスト可能にする）

pub mod clock;
pub mod connector;
pub mod id_generator;
pub mod object_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::connector::Connector;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::object_store::{AccessRole, BackendError, ObjectPage, ObjectQuery, ObjectStore};
