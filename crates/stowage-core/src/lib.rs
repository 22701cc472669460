//! stowage-core
//!
//! Core building blocks for a TTL key/value store layered on a remote
//! document-style object store (query by attribute, CRUD by id, nothing else).
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, entry, options, expiration codec, errors）
//! - **ports**: 抽象化レイヤー（ObjectStore, Connector, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（config, session, session_factory, sweep_loop, storage）
//! - **impls**: 実装（InMemoryConnector など開発用）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{DistributedStorage, SessionFactory, StorageConfig, StorageSession, SweepReport};
pub use domain::{ObjectId, StorageEntryOptions, StorageError, StorageResult};
