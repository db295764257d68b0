//! Migration: the reconciliation pipeline, object moves and promotion.

mod moves;
mod orchestrator;
mod promote;

pub use moves::{
    apply_moves, copy_phase, delete_sources, plan_consolidation, MoveOutcome, MoveStatus, ObjectMove,
};
pub use orchestrator::{Orchestrator, RunOptions};
pub use promote::{PromotionReport, Promoter};
