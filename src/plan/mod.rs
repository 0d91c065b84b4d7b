//! Turning a planner result into on-disk state: manifest/version bumps and
//! the `migrations.json` the runner reads, plus the synthetic
//! format-migration insertion step.

pub mod synthetic;
pub mod writer;

pub use writer::{write_plan, WrittenPlan};
