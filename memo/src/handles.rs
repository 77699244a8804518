mod futures;
mod sync;

pub use futures::AsyncCache;
pub use sync::Cache;
