use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::api::{branch_handlers, content_handlers, handlers};
use crate::context::Services;

pub fn create_router() -> Router<Arc<Services>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Resources
        .route(
            "/resources",
            get(handlers::search_resources).post(handlers::create_resource),
        )
        .route("/resources/aggregate", get(handlers::aggregate_resources))
        .route(
            "/resources/:id",
            get(handlers::get_resource)
                .put(handlers::update_resource)
                .delete(handlers::delete_resource),
        )
        // Versions
        .route(
            "/versions",
            get(handlers::search_versions).post(handlers::create_version),
        )
        // Terminology content
        .route("/concepts", get(content_handlers::search_concepts))
        .route(
            "/codesystems/:id/concepts",
            post(content_handlers::import_concepts),
        )
        .route("/members", get(content_handlers::search_members))
        .route(
            "/valuesets/:id/members",
            post(content_handlers::import_members),
        )
        // Branches
        .route(
            "/repositories/:repository_id/branches",
            get(branch_handlers::list_branches).post(branch_handlers::create_branch),
        )
        .route(
            "/repositories/:repository_id/branches/*path",
            get(branch_handlers::get_branch).delete(branch_handlers::delete_branch),
        )
}
