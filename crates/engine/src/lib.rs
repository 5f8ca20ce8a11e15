//! Charforge Engine library.
//!
//! Character progression as data: step selections compile to patches,
//! patches merge into mutation plans, plans apply atomically to persisted
//! records, and a single finalization boundary turns a finished snapshot
//! into a record with sub-records.
//!
//! ## Structure
//!
//! - `use_cases/` - compile, merge, apply, finalize and the builder session
//! - `infrastructure/` - port traits and their in-memory adapters
//! - `app` - Application composition

pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::{App, Ports, UseCases};
