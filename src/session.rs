//! The study state machine.
//!
//! A [`StudySession`] owns everything that changes while a learner drills a
//! game: the live game (through [`MoveValidator`]), the completed and used
//! branch sets, the counters and the pinned branch. It never blocks. Delays
//! are handed to the host as [`Event::Scheduled`] tickets and come back
//! through [`StudySession::resume`].

use crate::branch::{Branch, BranchId, BranchSet, IdSet};
use crate::config::StudyConfig;
use crate::error::{SessionError, StoreError};
use crate::game::{MoveInput, MoveValidator, Side};
use crate::index::BranchIndex;
use crate::progress::{Accuracy, CampaignStats, ProgressStore, Report, SessionCounters};
use crate::schedule::{Continuation, Slot, Ticket};
use crate::selector::select_next;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StudyState {
    Idle,
    Studying,
    /// Every branch was completed while studying.
    Finished,
}

/// What became of a submitted move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The computer is to move, a new line is about to start, or the game is over.
    NotYourTurn,
    /// The rules engine refused the move. Nothing was counted.
    Illegal,
    /// Legal but off every open branch; the move was taken back.
    Rejected {
        san: String,
        /// Consecutive misses including this one.
        errors: u32,
        remaining: u32,
        /// The expected moves, once the misses reach the threshold.
        hint: Option<Vec<String>>,
    },
    Accepted {
        san: String,
        branch: BranchId,
        /// The move finished `branch`.
        completed: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    ComputerMoved { san: String, branch: BranchId },
    BranchCompleted { branch: BranchId, accuracy: Accuracy },
    SessionFinished { accuracy: Accuracy },
    Scheduled { ticket: Ticket, delay: Duration },
    Cancelled { ticket: Ticket },
    PersistenceFailed { reason: String },
}

pub struct StudySession<V: MoveValidator> {
    game_id: String,
    branches: BranchSet,
    game: V,
    config: StudyConfig,
    store: Option<Box<dyn ProgressStore>>,
    rng: StdRng,

    state: StudyState,
    side: Side,
    completed: IdSet,
    used: IdSet,
    counters: SessionCounters,
    errors: u32,
    pinned: Option<BranchId>,
    slot: Slot,
    events: Vec<Event>,
    // completed ids are pulled from the store once per loaded game
    seeded: bool,
}

impl<V: MoveValidator> StudySession<V> {
    pub fn new(
        game_id: impl Into<String>,
        branches: BranchSet,
        game: V,
        config: StudyConfig,
    ) -> Self {
        StudySession {
            game_id: game_id.into(),
            branches,
            game,
            config,
            store: None,
            rng: StdRng::from_entropy(),
            state: StudyState::Idle,
            side: Side::White,
            completed: IdSet::new(),
            used: IdSet::new(),
            counters: SessionCounters::default(),
            errors: 0,
            pinned: None,
            slot: Slot::default(),
            events: Vec::new(),
            seeded: false,
        }
    }

    pub fn with_store(mut self, store: impl ProgressStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self.seeded = false;
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Enters study mode with the learner playing `side`.
    ///
    /// Counters, pin and the live game start over; completed branches carry
    /// on. Fails without touching anything when no branch is left to study.
    pub fn start(&mut self, side: Side) -> Result<(), SessionError> {
        self.seed_completed();
        if !BranchIndex::new(&self.branches, &self.completed).has_candidates(&[]) {
            info!(game = %self.game_id, "nothing left to study");
            return Err(SessionError::NoBranchesAvailable);
        }

        self.cancel_pending();
        self.game.reset();
        self.side = side;
        self.counters = SessionCounters::default();
        self.errors = 0;
        self.pinned = None;
        self.state = StudyState::Studying;
        info!(game = %self.game_id, %side, branches = self.branches.len(), "study started");

        self.schedule_opening();
        Ok(())
    }

    pub fn submit_move(&mut self, input: &MoveInput) -> Result<MoveOutcome, SessionError> {
        if self.state != StudyState::Studying {
            return Err(SessionError::NotStudying);
        }
        let between_lines = matches!(self.slot.pending(), Some((_, Continuation::NextLine)));
        if between_lines || self.game.turn() != self.side || self.game.is_game_over() {
            return Ok(MoveOutcome::NotYourTurn);
        }

        let ply = self.game.history().len();
        let san = match self.game.apply(input) {
            Some(san) => san,
            None => {
                debug!(?input, "illegal move");
                return Ok(MoveOutcome::Illegal);
            }
        };

        let (matched, blamed) = {
            let history = &self.game.history()[..ply];
            let candidates = BranchIndex::new(&self.branches, &self.completed).candidates(history);
            let fits = |branch: &&&Branch| branch.move_at(ply) == Some(san.as_str());

            let pinned = candidates
                .iter()
                .find(|branch| Some(&branch.id) == self.pinned.as_ref())
                .filter(fits);
            let matched = pinned.or_else(|| candidates.iter().find(fits)).map(|b| b.id.clone());
            let blamed = self.pinned.clone().or_else(|| candidates.first().map(|b| b.id.clone()));
            (matched, blamed)
        };

        match matched {
            Some(branch) => Ok(self.accept(san, branch)),
            None => Ok(self.reject(san, blamed)),
        }
    }

    fn accept(&mut self, san: String, branch: BranchId) -> MoveOutcome {
        self.errors = 0;
        self.counters.record(true);
        self.pinned = Some(branch.clone());
        self.persist(|store, game| store.record_attempt(game, &branch, true));
        debug!(%san, %branch, "move accepted");

        let completed = self.complete_if_done();
        if !completed {
            self.schedule(Continuation::ComputerReply, self.config.reply_delay());
        }
        MoveOutcome::Accepted { san, branch, completed }
    }

    fn reject(&mut self, san: String, blamed: Option<BranchId>) -> MoveOutcome {
        self.game.undo();
        self.counters.record(false);
        self.errors += 1;
        if let Some(branch) = blamed {
            self.persist(|store, game| store.record_attempt(game, &branch, false));
        }

        let errors = self.errors;
        let threshold = self.config.error_threshold;
        let hint = if errors >= threshold {
            self.errors = 0;
            Some(self.expected_moves())
        } else {
            None
        };
        debug!(%san, errors, threshold, "move rejected");

        MoveOutcome::Rejected {
            san,
            errors,
            remaining: threshold.saturating_sub(errors),
            hint,
        }
    }

    /// Leaves study mode. Completed branches are kept.
    pub fn stop(&mut self) {
        self.cancel_pending();
        self.pinned = None;
        self.used.clear();
        self.errors = 0;
        self.counters = SessionCounters::default();
        self.state = StudyState::Idle;
        info!(game = %self.game_id, "study stopped");
    }

    /// Back to the start position, keeping completed branches.
    pub fn reset_position(&mut self, reset_accuracy: bool) {
        self.cancel_pending();
        self.game.reset();
        self.pinned = None;
        self.errors = 0;
        if reset_accuracy {
            self.counters = SessionCounters::default();
        }
        if self.state == StudyState::Studying {
            self.schedule_opening();
        }
    }

    /// Forgets every completed branch and leaves study mode.
    pub fn reset_all(&mut self) {
        self.stop();
        self.game.reset();
        self.completed.clear();
        self.used.clear();
        self.seeded = true;
        info!(game = %self.game_id, "progress cleared");
    }

    /// Swaps in another game. The session ends up idle.
    pub fn load_game(&mut self, game_id: impl Into<String>, branches: BranchSet) {
        self.stop();
        self.game.reset();
        self.game_id = game_id.into();
        self.branches = branches;
        self.completed.clear();
        self.seeded = false;
        info!(game = %self.game_id, branches = self.branches.len(), "game loaded");
    }

    /// Flips the learner's side, starting over when study mode is on.
    pub fn set_side(&mut self, side: Side) -> Result<(), SessionError> {
        self.side = side;
        if self.state == StudyState::Studying {
            return self.start(side);
        }
        Ok(())
    }

    /// Runs the continuation `ticket` was issued for. Tickets that have been
    /// replaced or cancelled since are ignored.
    pub fn resume(&mut self, ticket: Ticket) -> Result<(), SessionError> {
        let continuation = match self.slot.take(ticket) {
            Some(continuation) => continuation,
            None => {
                debug!(ticket = ticket.id(), "ignoring stale ticket");
                return Ok(());
            }
        };
        if self.state != StudyState::Studying {
            return Err(SessionError::NotStudying);
        }

        match continuation {
            Continuation::ComputerReply | Continuation::OpeningMove => self.play_computer_move(),
            Continuation::NextLine => self.reset_position(false),
        }
        Ok(())
    }

    fn play_computer_move(&mut self) {
        let selection = {
            let history = self.game.history();
            let candidates = BranchIndex::new(&self.branches, &self.completed).candidates(history);
            let pinned = self.pinned.as_ref().and_then(|id| self.branches.get(id));
            select_next(pinned, history, &candidates, &mut self.used, &mut self.rng)
        };

        let selection = match selection {
            Some(selection) => selection,
            None => {
                debug!("no branch continues from this position");
                return;
            }
        };

        match self.game.apply_san(&selection.san) {
            Some(san) => {
                debug!(%san, branch = %selection.branch, "computer moved");
                self.pinned = Some(selection.branch.clone());
                self.events.push(Event::ComputerMoved {
                    san,
                    branch: selection.branch,
                });
                self.complete_if_done();
            }
            None => warn!(
                san = %selection.san,
                branch = %selection.branch,
                "validator refused a branch move"
            ),
        }
    }

    /// Completes the pinned branch when the live game has reached its end.
    fn complete_if_done(&mut self) -> bool {
        let branch = match &self.pinned {
            Some(id) => id.clone(),
            None => return false,
        };
        let done = self
            .branches
            .get(&branch)
            .map_or(false, |b| b.len() == self.game.history().len());
        if !done {
            return false;
        }

        self.completed.insert(branch.clone());
        self.pinned = None;
        self.persist(|store, game| store.mark_completed(game, &branch));

        let accuracy = self.counters.accuracy();
        info!(%branch, %accuracy, "branch completed");
        self.events.push(Event::BranchCompleted { branch, accuracy });

        if self.completed.covers(&self.branches) {
            self.state = StudyState::Finished;
            info!(game = %self.game_id, %accuracy, "every branch completed");
            self.events.push(Event::SessionFinished { accuracy });
        } else {
            self.schedule(Continuation::NextLine, self.config.next_line_delay());
        }
        true
    }

    fn schedule_opening(&mut self) {
        if self.game.turn() != self.side && !self.candidates().is_empty() {
            self.schedule(Continuation::OpeningMove, self.config.reply_delay());
        }
    }

    fn schedule(&mut self, continuation: Continuation, delay: Duration) {
        let (ticket, replaced) = self.slot.schedule(continuation);
        if let Some(old) = replaced {
            self.events.push(Event::Cancelled { ticket: old });
        }
        debug!(ticket = ticket.id(), ?continuation, ?delay, "scheduled");
        self.events.push(Event::Scheduled { ticket, delay });
    }

    fn cancel_pending(&mut self) {
        if let Some(ticket) = self.slot.cancel() {
            debug!(ticket = ticket.id(), "cancelled");
            self.events.push(Event::Cancelled { ticket });
        }
    }

    fn seed_completed(&mut self) {
        if self.seeded {
            return;
        }
        let store = match self.store.as_mut() {
            Some(store) => store,
            None => return,
        };

        match store.load(&self.game_id) {
            Ok(records) => {
                for record in records.into_iter().filter(|r| r.is_completed) {
                    if self.branches.contains(&record.branch_id) {
                        self.completed.insert(record.branch_id);
                    }
                }
                self.seeded = true;
            }
            Err(e) => self.persistence_failed(e),
        }
    }

    fn persist(
        &mut self,
        write: impl FnOnce(&mut dyn ProgressStore, &str) -> Result<(), StoreError>,
    ) {
        let result = match self.store.as_mut() {
            Some(store) => write(store.as_mut(), &self.game_id),
            None => return,
        };
        if let Err(e) = result {
            self.persistence_failed(e);
        }
    }

    fn persistence_failed(&mut self, error: StoreError) {
        warn!(game = %self.game_id, %error, "progress not saved");
        self.events.push(Event::PersistenceFailed {
            reason: error.to_string(),
        });
    }

    pub fn state(&self) -> StudyState {
        self.state
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn game(&self) -> &V {
        &self.game
    }

    pub fn branches(&self) -> &BranchSet {
        &self.branches
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    pub fn counters(&self) -> SessionCounters {
        self.counters
    }

    pub fn completed(&self) -> &IdSet {
        &self.completed
    }

    pub fn pinned(&self) -> Option<&Branch> {
        self.pinned.as_ref().and_then(|id| self.branches.get(id))
    }

    /// The ticket waiting to be resumed, if any.
    pub fn pending(&self) -> Option<Ticket> {
        self.slot.pending().map(|(ticket, _)| ticket)
    }

    pub fn candidates(&self) -> Vec<&Branch> {
        BranchIndex::new(&self.branches, &self.completed).candidates(self.game.history())
    }

    pub fn expected_moves(&self) -> Vec<String> {
        BranchIndex::new(&self.branches, &self.completed).expected_next(self.game.history())
    }

    /// Expected moves on demand, without touching the error count. Only
    /// offered while studying.
    pub fn hint(&self) -> Option<Vec<String>> {
        match self.state {
            StudyState::Studying => Some(self.expected_moves()),
            _ => None,
        }
    }

    pub fn report(&self) -> Report {
        Report::new(self.branches.len(), self.completed.len(), self.counters)
    }

    /// Stored totals for this game over every session, when a store is
    /// attached and answers.
    pub fn campaign(&mut self) -> Option<CampaignStats> {
        let store = self.store.as_mut()?;
        match store.load(&self.game_id) {
            Ok(records) => Some(CampaignStats::from_records(&records)),
            Err(e) => {
                self.persistence_failed(e);
                None
            }
        }
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}
