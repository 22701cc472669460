//! StorageEntryOptions - エントリの有効期限ポリシー（value object）

use chrono::{DateTime, TimeDelta, Utc};

/// StorageEntryOptions はエントリの TTL ポリシー
///
/// # 判定ルール
/// - `absolute_expiration` が設定されていて `now > absolute` なら期限切れ
/// - `sliding_expiration` が設定されていて `now > last_modified + sliding` なら期限切れ
/// - どちらも未設定なら期限切れにならない
///
/// sliding は書き込みでのみ延長されます（読み取りでは延長されない）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageEntryOptions {
    pub absolute_expiration: Option<DateTime<Utc>>,
    pub sliding_expiration: Option<TimeDelta>,
}

impl StorageEntryOptions {
    /// A policy with neither dimension set.
    pub fn never_expires() -> Self {
        Self::default()
    }

    pub fn with_absolute_expiration(mut self, at: DateTime<Utc>) -> Self {
        self.absolute_expiration = Some(at);
        self
    }

    pub fn with_sliding_expiration(mut self, window: TimeDelta) -> Self {
        self.sliding_expiration = Some(window);
        self
    }

    /// Absolute deadline `delta` after `now`.
    pub fn expires_after(now: DateTime<Utc>, delta: TimeDelta) -> Self {
        Self::default().with_absolute_expiration(now + delta)
    }

    pub fn is_unbounded(&self) -> bool {
        self.absolute_expiration.is_none() && self.sliding_expiration.is_none()
    }

    /// Evaluate the expiration rule for an entry last written at `last_modified`.
    pub fn is_expired_at(&self, last_modified: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if let Some(absolute) = self.absolute_expiration
            && now > absolute
        {
            return true;
        }

        match self.sliding_expiration {
            // overflow means the window reaches past the representable range
            Some(window) => last_modified
                .checked_add_signed(window)
                .is_some_and(|deadline| now > deadline),
            None => false,
        }
    }
}
