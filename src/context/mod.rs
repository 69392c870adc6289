//! Execution contexts, from the shared services down to an open transaction.
//!
//! Each layer narrows the one above it and is passed by reference to the
//! requests executed in it.

pub mod branch;
pub mod repository;
pub mod service;
pub mod transaction;

pub use branch::*;
pub use repository::*;
pub use service::*;
pub use transaction::*;

use std::sync::Arc;

use crate::model::{Branch, UserContext};

pub trait ServiceProvider: Send + Sync {
    fn service_context(&self) -> &ServiceContext;

    fn services(&self) -> &Services {
        &self.service_context().services
    }

    fn user(&self) -> &UserContext {
        &self.service_context().user
    }
}

pub trait RepositoryScope: ServiceProvider {
    fn repository_context(&self) -> &RepositoryContext;

    fn repository(&self) -> &Arc<Repository> {
        self.repository_context().repository()
    }
}

pub trait BranchScope: RepositoryScope {
    fn branch_context(&self) -> &BranchContext;

    fn branch(&self) -> &Branch {
        self.branch_context().branch()
    }

    fn searcher(&self) -> &Searcher {
        self.branch_context().searcher()
    }
}
