pub mod stage0_assemble;
pub mod stage1_references;
pub mod stage2_parents;
pub mod stage3_turns;
pub mod stage4_offsets;
pub mod stage5_finalize;

pub use stage0_assemble::*;
pub use stage1_references::*;
pub use stage2_parents::*;
pub use stage3_turns::*;
pub use stage4_offsets::*;
pub use stage5_finalize::*;
