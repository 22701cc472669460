//! Remote entry model as seen through the backend query interface.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ObjectId;

/// String-to-string metadata attached to every backend object.
///
/// The expiration policy is persisted here (see [`super::expiration`]).
pub type Metadata = BTreeMap<String, String>;

/// One object returned by a backend query.
///
/// Design:
/// - `name` is the caller-facing key. Uniqueness is a convention only; the
///   backend does not enforce it, so two objects may share a name.
/// - `last_modified` is owned by the backend and drives sliding expiration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    pub id: ObjectId,
    pub name: String,
    pub last_modified: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RemoteObject {
    pub fn has_name(&self, name: &str) -> bool {
        self.name == name
    }
}
