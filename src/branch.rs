use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Identifier of a branch, stable for the lifetime of a loaded game.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchId(String);

impl BranchId {
    pub const MAIN: &'static str = "main";

    pub fn main() -> Self {
        BranchId(Self::MAIN.to_owned())
    }

    pub fn variation(discriminator: usize) -> Self {
        BranchId(format!("var_{}", discriminator))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BranchId {
    fn from(id: &str) -> Self {
        BranchId(id.to_owned())
    }
}

impl From<String> for BranchId {
    fn from(id: String) -> Self {
        BranchId(id)
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One complete line from the start position to the end of a variation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub moves: Vec<String>,
}

impl Branch {
    pub fn new(id: BranchId, moves: Vec<String>) -> Self {
        Branch { id, moves }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// True when `history` is a proper prefix of this branch's moves.
    pub fn continues(&self, history: &[String]) -> bool {
        self.moves.len() > history.len() && self.moves.iter().zip(history).all(|(a, b)| a == b)
    }

    pub fn move_at(&self, ply: usize) -> Option<&str> {
        self.moves.get(ply).map(String::as_str)
    }
}

/// All branches produced by one parse, in parse order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchSet(Vec<Branch>);

impl BranchSet {
    pub fn new(branches: Vec<Branch>) -> Self {
        BranchSet(branches)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Branch> {
        self.0.iter()
    }

    pub fn get(&self, id: &BranchId) -> Option<&Branch> {
        self.0.iter().find(|branch| &branch.id == id)
    }

    pub fn contains(&self, id: &BranchId) -> bool {
        self.get(id).is_some()
    }
}

impl<'a> IntoIterator for &'a BranchSet {
    type Item = &'a Branch;
    type IntoIter = std::slice::Iter<'a, Branch>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A set of branch ids. Backs both the completed set and the computer's
/// used set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdSet(HashSet<BranchId>);

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the id was already present.
    pub fn insert(&mut self, id: BranchId) -> bool {
        self.0.insert(id)
    }

    pub fn contains(&self, id: &BranchId) -> bool {
        self.0.contains(id)
    }

    pub fn clear(&mut self) {
        self.0.clear()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether every branch of `set` is in here.
    pub fn covers(&self, set: &BranchSet) -> bool {
        set.iter().all(|branch| self.contains(&branch.id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &BranchId> {
        self.0.iter()
    }
}

impl FromIterator<BranchId> for IdSet {
    fn from_iter<T: IntoIterator<Item = BranchId>>(iter: T) -> Self {
        IdSet(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(moves: &[&str]) -> Vec<String> {
        moves.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn continues_requires_strict_prefix() {
        let branch = Branch::new(BranchId::main(), line(&["e4", "e5", "Nf3"]));
        assert!(branch.continues(&[]));
        assert!(branch.continues(&line(&["e4", "e5"])));
        assert!(!branch.continues(&line(&["e4", "c5"])));
        assert!(!branch.continues(&line(&["e4", "e5", "Nf3"])));
    }

    #[test]
    fn ids_and_coverage() {
        let set = BranchSet::new(vec![
            Branch::new(BranchId::main(), line(&["e4"])),
            Branch::new(BranchId::variation(1), line(&["d4"])),
        ]);
        assert_eq!(BranchId::variation(1).as_str(), "var_1");
        assert_eq!(set.get(&BranchId::main()).map(|b| b.len()), Some(1));

        let mut done = IdSet::new();
        assert!(done.insert(BranchId::main()));
        assert!(!done.insert(BranchId::main()));
        assert!(!done.covers(&set));
        done.insert("var_1".into());
        assert!(done.covers(&set));
        done.clear();
        assert!(done.is_empty());
    }

    #[test]
    fn branch_set_json_shape() {
        let set = BranchSet::new(vec![Branch::new(BranchId::main(), line(&["e4", "e5"]))]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"[{"id":"main","moves":["e4","e5"]}]"#);
        let back: BranchSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }
}
