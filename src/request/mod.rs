//! Units of work executed against a typed context, and the delegating
//! requests that open those contexts.

pub mod branch;
pub mod concept_search;
pub mod delegate;
pub mod expand;
pub mod iterator;
pub mod resource_create;
pub mod resource_delete;
pub mod resource_search;
pub mod resource_update;
pub mod search;
pub mod transactional;
pub mod uri_resolver;
pub mod version;

pub use branch::*;
pub use concept_search::*;
pub use delegate::*;
pub use iterator::*;
pub use resource_create::*;
pub use resource_delete::*;
pub use resource_search::*;
pub use resource_update::*;
pub use search::*;
pub use transactional::*;
pub use uri_resolver::*;
pub use version::*;

use crate::error::ApiResult;

/// A unit of work producing `Output` from an execution context `C`.
#[async_trait::async_trait]
pub trait Request<C: Sync>: Send + Sync {
    type Output: Send;

    async fn execute(&self, context: &C) -> ApiResult<Self::Output>;

    /// Names of this request and the requests it wraps, outermost first.
    fn nested_requests(&self) -> Vec<&'static str> {
        vec![short_type_name::<Self>()]
    }
}

/// Fluent configuration producing immutable requests.
pub trait RequestBuilder {
    type Request;

    fn build(self) -> Self::Request;
}

/// Type name without module paths or generic arguments.
pub fn short_type_name<T: ?Sized>() -> &'static str {
    let name = std::any::type_name::<T>();
    let name = name.split('<').next().unwrap_or(name);
    name.rsplit("::").next().unwrap_or(name)
}
