//! SkyMerge Deterministic Simulation Harness
//!
//! Runs the real fusion pipeline against a seeded sky whose ground truth is
//! known, so every snapshot can be checked against what actually flew.
//!
//! # Core Principle
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: [`SimContext`] holds a virtual clock that only advances when told
//! - **Providers**: the [`Oracle`] writes provider rows with seeded noise, ages and dropouts
//! - **Military feed**: [`ScriptedMilitaryFeed`] answers from the oracle's truth, with injectable faults
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     ScenarioRunner                       │
//! │  ┌─────────────┐  rows   ┌──────────────────────────┐    │
//! │  │   Oracle    │────────►│     FusionPipeline       │    │
//! │  │ (truth sky) │         │  (skymerge_core, real)   │    │
//! │  └──────┬──────┘         └─────┬──────────────┬─────┘    │
//! │         │ military hexes       │ lookups      │ snapshot │
//! │  ┌──────▼──────────────┐       │        ┌─────▼──────┐   │
//! │  │ ScriptedMilitaryFeed│◄──────┘        │   checks   │   │
//! │  └─────────────────────┘                └────────────┘   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use skymerge_sim::{ScenarioId, ScenarioRunner};
//!
//! let runner = ScenarioRunner::new(42, 40);
//! let result = runner.run(ScenarioId::StaleConflict).await;
//! assert!(result.passed);
//! ```

pub mod checks;
mod context;
mod feed;
pub mod oracle;
mod runner;
pub mod scenarios;

pub use checks::CheckFailure;
pub use context::SimContext;
pub use feed::{FeedFaults, ScriptedMilitaryFeed};
pub use oracle::{GroundTruthAircraft, Oracle};
pub use runner::{sim_center, ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
