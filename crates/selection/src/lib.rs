pub mod community;
pub mod draw;
pub mod mode;
pub mod strategy;
pub mod user_layer;

pub use community::*;
pub use draw::*;
pub use mode::*;
pub use strategy::*;
pub use user_layer::*;
