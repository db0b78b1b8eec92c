//! Assignment decision engine: candidate selection and atomic commit.

pub mod assign;
pub mod commit;
pub mod select;

pub use assign::{AssignOutcome, Assigner, Assignment};
pub use commit::AssignmentTransaction;
pub use select::{AssignmentSelector, Choice, ScoredCandidate, Selection};
