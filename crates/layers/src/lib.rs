pub mod layer;
pub mod memory;
pub mod query;
pub mod surface;
pub mod symbology;

pub use layer::*;
pub use memory::*;
pub use query::*;
pub use surface::*;
