mod adapter;
mod adapters;
mod error;
pub mod ignite;

pub use adapter::{new_adapter, DbAdapter};
