//! Drill the lines of an annotated chess game.
//!
//! [`pgn::parse`] flattens movetext with nested variations into a
//! [`BranchSet`]; a [`StudySession`] then judges a learner's moves against
//! those branches until every one has been played through.

pub mod branch;
pub mod config;
pub mod error;
pub mod game;
pub mod index;
pub mod pgn;
pub mod progress;
pub mod schedule;
pub mod selector;
pub mod session;

pub use branch::{Branch, BranchId, BranchSet, IdSet};
pub use config::StudyConfig;
pub use error::{ConfigError, SessionError, StoreError};
pub use game::{MoveInput, MoveValidator, ShakmatyGame, Side};
pub use index::BranchIndex;
pub use progress::{
    Accuracy, CampaignStats, Grade, JsonFileStore, MemoryStore, ProgressRecord, ProgressStore,
    Report, SessionCounters,
};
pub use schedule::{Ticket, TimerQueue};
pub use session::{Event, MoveOutcome, StudySession, StudyState};
