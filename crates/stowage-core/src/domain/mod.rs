//! Domain model (ids, entries, expiration policy, errors).
//!
//! I/O を一切持たない純粋なモジュール群です。
//! - ids: バックエンド ID の newtype
//! - entry: クエリ結果のオブジェクトとメタデータ
//! - options: TTL ポリシー（value object）
//! - expiration: ポリシー ⇄ メタデータの codec と期限切れ判定
//! - errors: ストレージ層のエラー分類

pub mod entry;
pub mod errors;
pub mod expiration;
pub mod ids;
pub mod options;

pub use self::entry::{Metadata, RemoteObject};
pub use self::errors::{StorageError, StorageResult};
pub use self::ids::ObjectId;
pub use self::options::StorageEntryOptions;
