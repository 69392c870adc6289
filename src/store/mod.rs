pub mod lock;
pub mod memory;
pub mod query;
pub mod traits;

pub use lock::*;
pub use memory::*;
pub use query::{
    Aggregation, AggregationQuery, BoolBuilder, Expression, Hit, Hits, KnnQuery, Query, SortBy,
    SortField, SCORE_FIELD,
};
pub use traits::*;
