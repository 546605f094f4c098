pub mod geometry;
pub mod ids;
pub mod time;

// Foundation crate: small, well-tested primitives only.
pub use geometry::*;
pub use ids::*;
pub use time::*;
