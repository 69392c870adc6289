use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::context::{RepositoryScope, ServiceContext, ServiceProvider};
use crate::model::RESOURCES_REPOSITORY;
use crate::store::{MemoryRevisionStore, RevisionStore};

/// A named revision store: the resources repository or a tooling repository.
pub struct Repository {
    id: String,
    store: Arc<dyn RevisionStore>,
    open_snapshots: AtomicUsize,
}

impl Repository {
    pub fn new(id: &str, store: Arc<dyn RevisionStore>) -> Self {
        Self {
            id: id.to_string(),
            store,
            open_snapshots: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn store(&self) -> &Arc<dyn RevisionStore> {
        &self.store
    }

    /// Pins the current store timestamp until the returned handle is dropped.
    pub fn open_snapshot(self: &Arc<Self>) -> Snapshot {
        self.open_snapshots.fetch_add(1, Ordering::SeqCst);
        Snapshot {
            repository: Arc::clone(self),
            timestamp: self.store.current_timestamp(),
        }
    }

    pub fn open_snapshots(&self) -> usize {
        self.open_snapshots.load(Ordering::SeqCst)
    }
}

pub struct Snapshot {
    repository: Arc<Repository>,
    timestamp: i64,
}

impl Snapshot {
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.repository.open_snapshots.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Registry of the repositories served by this instance.
pub struct RepositoryManager {
    repositories: BTreeMap<String, Arc<Repository>>,
}

impl RepositoryManager {
    pub fn new() -> Self {
        Self {
            repositories: BTreeMap::new(),
        }
    }

    /// The resources repository plus one in-memory repository per tooling id.
    pub fn in_memory(tooling_ids: &[String]) -> Self {
        let mut manager = Self::new();
        manager.register(Repository::new(
            RESOURCES_REPOSITORY,
            Arc::new(MemoryRevisionStore::new()),
        ));
        for tooling_id in tooling_ids {
            manager.register(Repository::new(tooling_id, Arc::new(MemoryRevisionStore::new())));
        }
        manager
    }

    pub fn register(&mut self, repository: Repository) {
        self.repositories
            .insert(repository.id.clone(), Arc::new(repository));
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Repository>> {
        self.repositories.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.repositories.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.repositories.keys()
    }
}

impl Default for RepositoryManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Service context narrowed to one repository and an open read snapshot.
#[derive(Clone)]
pub struct RepositoryContext {
    service: ServiceContext,
    repository: Arc<Repository>,
    snapshot: Arc<Snapshot>,
}

impl RepositoryContext {
    pub fn new(service: ServiceContext, repository: Arc<Repository>) -> Self {
        let snapshot = Arc::new(repository.open_snapshot());
        Self {
            service,
            repository,
            snapshot,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn with_user(&self, user: crate::model::UserContext) -> Self {
        Self {
            service: self.service.with_user(user),
            ..self.clone()
        }
    }
}

impl ServiceProvider for RepositoryContext {
    fn service_context(&self) -> &ServiceContext {
        &self.service
    }
}

impl RepositoryScope for RepositoryContext {
    fn repository_context(&self) -> &RepositoryContext {
        self
    }

    fn repository(&self) -> &Arc<Repository> {
        &self.repository
    }
}
