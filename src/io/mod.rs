pub mod batch;
pub mod input;
pub mod output;

pub use batch::*;
pub use input::*;
pub use output::*;
