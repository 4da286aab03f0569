pub mod orders;
pub mod system;

pub use orders::*;
pub use system::*;
