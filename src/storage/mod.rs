//! Payload and metadata sinks
//!
//! - [`ObjectStore`] / [`HttpObjectStore`] -- remote bucket uploads
//! - [`LocalStore`] -- local payload copies and the metadata artifact tree

mod local;
mod object_store;

pub use local::LocalStore;
pub use object_store::{HttpObjectStore, ObjectStore};
