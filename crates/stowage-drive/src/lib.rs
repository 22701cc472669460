//! stowage-drive
//!
//! Google Drive v3 backend for stowage-core.
//!
//! Every entry is one Drive file inside a single folder under the account
//! root. The expiration policy rides in the file's `properties`, and lookups
//! list the folder and filter by name on the client.
//!
//! # モジュール構成
//! - **connector**: DriveConnector（設定から HTTP クライアントを作る）
//! - **client**: DriveConnection（ObjectStore の実装）
//! - **query**: q 文字列、レスポンスの decode、multipart body

mod client;
mod connector;
pub mod query;

#[cfg(test)]
mod fake_drive;

pub use client::DriveConnection;
pub use connector::{DEFAULT_API_BASE, DEFAULT_UPLOAD_BASE, DriveConnector};
