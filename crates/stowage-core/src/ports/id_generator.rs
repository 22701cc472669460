//! IdGenerator port - ID 生成の抽象化
//!
//! 本番バックエンド（Drive）は ID をサーバー側で払い出すので、
//! これを使うのは InMemory バックエンドだけです。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（Clock の時刻を timestamp 部分に使う）

use crate::domain::ObjectId;
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator はバックエンドオブジェクトの ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（複数のコネクションから共有される）
pub trait IdGenerator: Send + Sync {
    fn generate_object_id(&self) -> ObjectId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// FixedClock を使えば timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_object_id(&self) -> ObjectId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        ObjectId::new(ulid.to_string())
    }
}
