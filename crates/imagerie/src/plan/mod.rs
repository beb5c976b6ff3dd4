//! Resume planning: what to do with each discovered candidate.

pub mod decision;
pub mod gaps;
pub mod planner;

pub use decision::{DecisionKind, PlanFlags, ResumeDecision};
pub use gaps::{compute_gaps, GapReport};
pub use planner::{decide, plan_resume, PlanInputs};
