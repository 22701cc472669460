//! InMemoryObjectStore - 開発用のオブジェクトストア
//!
//! # 学習ポイント
//! - Arc<Mutex<..>> で複数コネクションから共有される状態
//! - await をまたいでロックを保持しない
//! - 障害注入（upload/download/grant/delete/close）でエラー経路をテストする

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Metadata, ObjectId, RemoteObject};
use crate::ports::{
    AccessRole, BackendError, Clock, Connector, IdGenerator, ObjectPage, ObjectQuery, ObjectStore,
    UlidGenerator,
};

const DEFAULT_PAGE_SIZE: usize = 100;

/// One object as held by the in-memory backend.
#[derive(Debug, Clone)]
struct StoredObject {
    id: ObjectId,
    name: String,
    /// `None` means the account root.
    parent: Option<ObjectId>,
    is_container: bool,
    content: Vec<u8>,
    metadata: Metadata,
    last_modified: DateTime<Utc>,
}

impl StoredObject {
    fn to_remote(&self) -> RemoteObject {
        RemoteObject {
            id: self.id.clone(),
            name: self.name.clone(),
            last_modified: self.last_modified,
            metadata: self.metadata.clone(),
        }
    }

    fn matches(&self, query: &ObjectQuery) -> bool {
        match query {
            ObjectQuery::ContainersUnderRoot => self.is_container && self.parent.is_none(),
            ObjectQuery::ObjectsIn(container) => {
                !self.is_container && self.parent.as_ref() == Some(container)
            }
        }
    }
}

/// A recorded permission grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub container: ObjectId,
    pub principal: String,
    pub role: AccessRole,
}

#[derive(Debug, Default)]
struct Faults {
    connect: bool,
    uploads: bool,
    downloads: bool,
    grants: bool,
    close: bool,
    deletes: HashSet<ObjectId>,
}

/// Objects are kept in insertion order so paging is deterministic.
#[derive(Debug, Default)]
struct StoreState {
    objects: Vec<StoredObject>,
    grants: Vec<Grant>,
    faults: Faults,
}

impl StoreState {
    fn find(&self, id: &ObjectId) -> Option<&StoredObject> {
        self.objects.iter().find(|o| &o.id == id)
    }

    fn find_mut(&mut self, id: &ObjectId) -> Option<&mut StoredObject> {
        self.objects.iter_mut().find(|o| &o.id == id)
    }
}

struct Shared {
    state: Mutex<StoreState>,
    open_connections: AtomicUsize,
    clock: Arc<dyn Clock>,
    ids: Box<dyn IdGenerator>,
    page_size: usize,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // state stays consistent between statements, so recover from poisoning
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn not_found(id: &ObjectId) -> BackendError {
    BackendError::Status {
        code: 404,
        message: format!("object {id} not found"),
    }
}

/// InMemoryConnector は開発用のバックエンド
///
/// # 実装詳細
/// - すべてのコネクションが同じ状態（Arc<Shared>）を共有する
/// - `last_modified` と ID の timestamp は注入された Clock から取る
/// - 開いているコネクション数を数える（セッションの解放漏れ検出用）
///
/// # 使用例
/// ```ignore
/// let clock = Arc::new(FixedClock::new(now));
/// let backend = InMemoryConnector::new(clock.clone());
/// let factory = SessionFactory::initialize(Arc::new(backend.clone()), &config, clock).await?;
/// ```
#[derive(Clone)]
pub struct InMemoryConnector {
    shared: Arc<Shared>,
}

impl InMemoryConnector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_page_size(clock, DEFAULT_PAGE_SIZE)
    }

    /// Small page sizes exercise the continuation-token loop.
    pub fn with_page_size(clock: Arc<dyn Clock>, page_size: usize) -> Self {
        let ids = Box::new(UlidGenerator::new(Arc::clone(&clock)));
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(StoreState::default()),
                open_connections: AtomicUsize::new(0),
                clock,
                ids,
                page_size: page_size.max(1),
            }),
        }
    }

    pub fn open_connections(&self) -> usize {
        self.shared.open_connections.load(Ordering::SeqCst)
    }

    /// Number of non-container objects.
    pub fn object_count(&self) -> usize {
        self.shared
            .lock()
            .objects
            .iter()
            .filter(|o| !o.is_container)
            .count()
    }

    pub fn container_count(&self) -> usize {
        self.shared
            .lock()
            .objects
            .iter()
            .filter(|o| o.is_container)
            .count()
    }

    /// Snapshot of an object and its content.
    pub fn object(&self, id: &ObjectId) -> Option<(RemoteObject, Vec<u8>)> {
        self.shared
            .lock()
            .find(id)
            .map(|o| (o.to_remote(), o.content.clone()))
    }

    pub fn grants(&self) -> Vec<Grant> {
        self.shared.lock().grants.clone()
    }

    pub fn fail_connect(&self, fail: bool) {
        self.shared.lock().faults.connect = fail;
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.shared.lock().faults.uploads = fail;
    }

    pub fn fail_downloads(&self, fail: bool) {
        self.shared.lock().faults.downloads = fail;
    }

    pub fn fail_grants(&self, fail: bool) {
        self.shared.lock().faults.grants = fail;
    }

    pub fn fail_close(&self, fail: bool) {
        self.shared.lock().faults.close = fail;
    }

    pub fn fail_delete_of(&self, id: ObjectId) {
        self.shared.lock().faults.deletes.insert(id);
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn connect(&self) -> Result<Box<dyn ObjectStore>, BackendError> {
        if self.shared.lock().faults.connect {
            return Err(BackendError::Unauthorized("injected credential failure".to_string()));
        }
        self.shared.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(InMemoryObjectStore {
            shared: Arc::clone(&self.shared),
            closed: AtomicBool::new(false),
        }))
    }
}

/// InMemoryObjectStore は InMemoryConnector が払い出すコネクション
pub struct InMemoryObjectStore {
    shared: Arc<Shared>,
    closed: AtomicBool,
}

impl InMemoryObjectStore {
    /// Every call yields once so concurrent sessions interleave like network I/O.
    async fn enter(&self) -> Result<(), BackendError> {
        tokio::task::yield_now().await;
        if self.closed.load(Ordering::SeqCst) {
            return Err(BackendError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn query(
        &self,
        query: &ObjectQuery,
        page_token: Option<&str>,
    ) -> Result<ObjectPage, BackendError> {
        self.enter().await?;
        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| BackendError::Status {
                    code: 400,
                    message: format!("invalid page token {token:?}"),
                })?,
            None => 0,
        };

        let state = self.shared.lock();
        let mut matching = state.objects.iter().filter(|o| o.matches(query)).skip(offset);
        let objects: Vec<RemoteObject> = matching
            .by_ref()
            .take(self.shared.page_size)
            .map(StoredObject::to_remote)
            .collect();
        let next_page_token = matching
            .next()
            .map(|_| (offset + objects.len()).to_string());

        Ok(ObjectPage {
            objects,
            next_page_token,
        })
    }

    async fn create_container(&self, name: &str) -> Result<ObjectId, BackendError> {
        self.enter().await?;
        let id = self.shared.ids.generate_object_id();
        let now = self.shared.clock.now();
        self.shared.lock().objects.push(StoredObject {
            id: id.clone(),
            name: name.to_string(),
            parent: None,
            is_container: true,
            content: Vec::new(),
            metadata: Metadata::new(),
            last_modified: now,
        });
        Ok(id)
    }

    async fn create_object(
        &self,
        container: &ObjectId,
        name: &str,
        metadata: &Metadata,
        content: &[u8],
    ) -> Result<ObjectId, BackendError> {
        self.enter().await?;
        let id = self.shared.ids.generate_object_id();
        let now = self.shared.clock.now();

        let mut state = self.shared.lock();
        if state.faults.uploads {
            return Err(BackendError::Injected("upload interrupted".to_string()));
        }
        if !state.find(container).is_some_and(|o| o.is_container) {
            return Err(not_found(container));
        }
        state.objects.push(StoredObject {
            id: id.clone(),
            name: name.to_string(),
            parent: Some(container.clone()),
            is_container: false,
            content: content.to_vec(),
            metadata: metadata.clone(),
            last_modified: now,
        });
        Ok(id)
    }

    async fn update_object(
        &self,
        id: &ObjectId,
        metadata: &Metadata,
        content: &[u8],
    ) -> Result<(), BackendError> {
        self.enter().await?;
        let now = self.shared.clock.now();

        let mut state = self.shared.lock();
        if state.faults.uploads {
            return Err(BackendError::Injected("upload interrupted".to_string()));
        }
        let object = state.find_mut(id).ok_or_else(|| not_found(id))?;
        object.metadata = metadata.clone();
        object.content = content.to_vec();
        object.last_modified = now;
        Ok(())
    }

    async fn download(&self, id: &ObjectId) -> Result<Vec<u8>, BackendError> {
        self.enter().await?;
        let state = self.shared.lock();
        if state.faults.downloads {
            return Err(BackendError::Injected("download interrupted".to_string()));
        }
        state
            .find(id)
            .map(|o| o.content.clone())
            .ok_or_else(|| not_found(id))
    }

    async fn delete(&self, id: &ObjectId) -> Result<(), BackendError> {
        self.enter().await?;
        let mut state = self.shared.lock();
        if state.faults.deletes.contains(id) {
            return Err(BackendError::Injected(format!("delete of {id} refused")));
        }
        let before = state.objects.len();
        state.objects.retain(|o| &o.id != id);
        if state.objects.len() == before {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn grant_access(
        &self,
        container: &ObjectId,
        principal: &str,
        role: AccessRole,
    ) -> Result<(), BackendError> {
        self.enter().await?;
        let mut state = self.shared.lock();
        if state.faults.grants {
            return Err(BackendError::Status {
                code: 403,
                message: format!("cannot share with {principal}"),
            });
        }
        if state.find(container).is_none() {
            return Err(not_found(container));
        }
        state.grants.push(Grant {
            container: container.clone(),
            principal: principal.to_string(),
            role,
        });
        Ok(())
    }

    fn close(&self) -> Result<(), BackendError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shared.open_connections.fetch_sub(1, Ordering::SeqCst);
        if self.shared.lock().faults.close {
            return Err(BackendError::Injected("close failed".to_string()));
        }
        Ok(())
    }
}
