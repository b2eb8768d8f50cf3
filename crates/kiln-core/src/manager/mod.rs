//! Request manager: the per-request façade over model, cache and processor chain.

mod engine;
mod errors;
mod request;

pub use engine::{GroupCache, GroupContent, RequestManager};
pub use errors::ManagerError;
pub use request::{GroupRequest, RequestContext};
