//! Accuracy and completion figures, and the persistence boundary.

use crate::branch::BranchId;
use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

fn percent(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    (f64::from(part) * 100.0 / f64::from(whole)).round() as u32
}

/// Share of attempted moves that were right, rounded; 0 before any attempt.
pub fn accuracy_percent(correct: u32, total: u32) -> u32 {
    percent(correct, total)
}

pub fn progress_percent(completed: u32, total: u32) -> u32 {
    percent(completed, total)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounters {
    pub correct_moves: u32,
    pub total_moves: u32,
}

impl SessionCounters {
    pub fn record(&mut self, correct: bool) {
        self.total_moves += 1;
        if correct {
            self.correct_moves += 1;
        }
    }

    pub fn accuracy(&self) -> Accuracy {
        Accuracy {
            correct: self.correct_moves,
            total: self.total_moves,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Grade {
    Excellent,
    Good,
    NeedsWork,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Grade::Excellent => "excellent",
            Grade::Good => "good",
            Grade::NeedsWork => "needs work",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accuracy {
    pub correct: u32,
    pub total: u32,
}

impl Accuracy {
    pub fn percent(&self) -> u32 {
        accuracy_percent(self.correct, self.total)
    }

    pub fn grade(&self) -> Grade {
        match self.percent() {
            90..=u32::MAX => Grade::Excellent,
            70..=89 => Grade::Good,
            _ => Grade::NeedsWork,
        }
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{} ({}%)", self.correct, self.total, self.percent())
    }
}

/// Snapshot handed to whatever presents progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Report {
    pub total_branches: u32,
    pub completed_branches: u32,
    pub progress_percent: u32,
    pub accuracy: Accuracy,
}

impl Report {
    pub fn new(
        total_branches: usize,
        completed_branches: usize,
        counters: SessionCounters,
    ) -> Self {
        let total_branches = total_branches as u32;
        let completed_branches = completed_branches as u32;
        Report {
            total_branches,
            completed_branches,
            progress_percent: progress_percent(completed_branches, total_branches),
            accuracy: counters.accuracy(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total_branches > 0 && self.completed_branches == self.total_branches
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}/{} branches ({}%), accuracy {}",
            self.completed_branches, self.total_branches, self.progress_percent, self.accuracy
        )
    }
}

/// Stored progress for one branch of one game. Counts are cumulative over
/// every session ever played on it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub game_id: String,
    pub branch_id: BranchId,
    pub is_completed: bool,
    pub correct_count: u32,
    pub attempt_count: u32,
}

impl ProgressRecord {
    fn new(game_id: &str, branch_id: &BranchId) -> Self {
        ProgressRecord {
            game_id: game_id.to_owned(),
            branch_id: branch_id.clone(),
            is_completed: false,
            correct_count: 0,
            attempt_count: 0,
        }
    }
}

/// Totals over all records of one game.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CampaignStats {
    pub branches: u32,
    pub completed: u32,
    pub accuracy: Accuracy,
}

impl CampaignStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ProgressRecord>) -> Self {
        records.into_iter().fold(CampaignStats::default(), |mut stats, record| {
            stats.branches += 1;
            stats.completed += record.is_completed as u32;
            stats.accuracy.correct += record.correct_count;
            stats.accuracy.total += record.attempt_count;
            stats
        })
    }
}

/// Where progress lives between sessions. A session treats every error as
/// non-fatal and carries on with its in-memory counters.
pub trait ProgressStore {
    fn load(&mut self, game_id: &str) -> Result<Vec<ProgressRecord>, StoreError>;

    fn record_attempt(
        &mut self,
        game_id: &str,
        branch: &BranchId,
        correct: bool,
    ) -> Result<(), StoreError>;

    fn mark_completed(&mut self, game_id: &str, branch: &BranchId) -> Result<(), StoreError>;
}

/// Lets a host keep a handle on a store it lent to a session.
impl<S: ProgressStore> ProgressStore for Rc<RefCell<S>> {
    fn load(&mut self, game_id: &str) -> Result<Vec<ProgressRecord>, StoreError> {
        self.borrow_mut().load(game_id)
    }

    fn record_attempt(
        &mut self,
        game_id: &str,
        branch: &BranchId,
        correct: bool,
    ) -> Result<(), StoreError> {
        self.borrow_mut().record_attempt(game_id, branch, correct)
    }

    fn mark_completed(&mut self, game_id: &str, branch: &BranchId) -> Result<(), StoreError> {
        self.borrow_mut().mark_completed(game_id, branch)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
struct Records(Vec<ProgressRecord>);

impl Records {
    fn entry(&mut self, game_id: &str, branch: &BranchId) -> &mut ProgressRecord {
        let found = self
            .0
            .iter()
            .position(|r| r.game_id == game_id && &r.branch_id == branch);
        let index = match found {
            Some(index) => index,
            None => {
                self.0.push(ProgressRecord::new(game_id, branch));
                self.0.len() - 1
            }
        };
        &mut self.0[index]
    }

    fn for_game(&self, game_id: &str) -> Vec<ProgressRecord> {
        self.0.iter().filter(|r| r.game_id == game_id).cloned().collect()
    }

    fn record_attempt(&mut self, game_id: &str, branch: &BranchId, correct: bool) {
        let record = self.entry(game_id, branch);
        record.attempt_count += 1;
        if correct {
            record.correct_count += 1;
        }
    }

    fn mark_completed(&mut self, game_id: &str, branch: &BranchId) {
        self.entry(game_id, branch).is_completed = true;
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: Records,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[ProgressRecord] {
        &self.records.0
    }
}

impl ProgressStore for MemoryStore {
    fn load(&mut self, game_id: &str) -> Result<Vec<ProgressRecord>, StoreError> {
        Ok(self.records.for_game(game_id))
    }

    fn record_attempt(
        &mut self,
        game_id: &str,
        branch: &BranchId,
        correct: bool,
    ) -> Result<(), StoreError> {
        self.records.record_attempt(game_id, branch, correct);
        Ok(())
    }

    fn mark_completed(&mut self, game_id: &str, branch: &BranchId) -> Result<(), StoreError> {
        self.records.mark_completed(game_id, branch);
        Ok(())
    }
}

/// All records in one JSON file, rewritten after every update.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    records: Records,
}

impl JsonFileStore {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => Records::default(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Records::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(JsonFileStore { path, records })
    }

    fn save(&self) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

impl ProgressStore for JsonFileStore {
    fn load(&mut self, game_id: &str) -> Result<Vec<ProgressRecord>, StoreError> {
        Ok(self.records.for_game(game_id))
    }

    fn record_attempt(
        &mut self,
        game_id: &str,
        branch: &BranchId,
        correct: bool,
    ) -> Result<(), StoreError> {
        self.records.record_attempt(game_id, branch, correct);
        self.save()
    }

    fn mark_completed(&mut self, game_id: &str, branch: &BranchId) -> Result<(), StoreError> {
        self.records.mark_completed(game_id, branch);
        self.save()
    }
}
