//! Connector port - コネクションの払い出し
//!
//! SessionFactory は操作ごとに新しいコネクションを開きます。
//! コネクションの再利用よりも、操作の独立性と単純さを優先する設計です。

use async_trait::async_trait;

use super::object_store::{BackendError, ObjectStore};

/// Connector は認証済みのバックエンドコネクションを開く
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ObjectStore>, BackendError>;
}
