pub mod analyzer;
pub mod printer;
pub mod results;

pub use analyzer::get_diff_between;
pub use results::{ChangeEntry, ChangeKind, ChangeSet};
