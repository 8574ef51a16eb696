pub mod anchor;
pub mod annotation;
pub mod event;
pub mod graph;
pub mod hints;
pub mod layer;

pub use anchor::*;
pub use annotation::*;
pub use event::*;
pub use graph::*;
pub use hints::*;
pub use layer::*;
