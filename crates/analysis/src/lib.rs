pub mod area;
pub mod config;
pub mod indicator;
pub mod result;
pub mod validation;

pub use area::*;
pub use config::*;
pub use indicator::*;
pub use result::*;
pub use validation::*;
