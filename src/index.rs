use crate::branch::{Branch, BranchSet, IdSet};

/// Which branches are still open given the moves played so far.
///
/// Recomputed on every query: a linear scan over a few hundred branches is
/// cheaper than keeping a cache in step with the live game.
pub struct BranchIndex<'a> {
    branches: &'a BranchSet,
    completed: &'a IdSet,
}

impl<'a> BranchIndex<'a> {
    pub fn new(branches: &'a BranchSet, completed: &'a IdSet) -> Self {
        BranchIndex { branches, completed }
    }

    /// Uncompleted branches that agree with `history` and still have a move
    /// to play after it.
    pub fn candidates(&self, history: &[String]) -> Vec<&'a Branch> {
        self.branches
            .iter()
            .filter(|branch| !self.completed.contains(&branch.id))
            .filter(|branch| branch.continues(history))
            .collect()
    }

    /// Distinct next moves over all candidates, in branch order.
    pub fn expected_next(&self, history: &[String]) -> Vec<String> {
        let mut moves: Vec<String> = Vec::new();
        for branch in self.candidates(history) {
            if let Some(m) = branch.move_at(history.len()) {
                if !moves.iter().any(|known| known == m) {
                    moves.push(m.to_owned());
                }
            }
        }
        moves
    }

    pub fn has_candidates(&self, history: &[String]) -> bool {
        self.branches
            .iter()
            .any(|branch| !self.completed.contains(&branch.id) && branch.continues(history))
    }
}
