pub mod comparator;
pub mod edit_path;
pub mod encoding;
pub mod lexicon;
pub mod syllables;

pub use comparator::*;
pub use edit_path::*;
pub use encoding::*;
pub use lexicon::*;
pub use syllables::*;
