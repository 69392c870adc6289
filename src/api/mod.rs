pub mod branch_handlers;
pub mod content_handlers;
pub mod handlers;
pub mod routes;
pub mod user_extractor;

pub use branch_handlers::*;
pub use content_handlers::*;
pub use handlers::*;
pub use routes::*;
