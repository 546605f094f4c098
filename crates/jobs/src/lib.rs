pub mod api;
pub mod cache;
pub mod client;
pub mod protocol;

pub use api::*;
pub use cache::*;
pub use client::*;
pub use protocol::*;
