pub mod settings;
pub mod workbench;

pub use settings::*;
pub use workbench::*;
