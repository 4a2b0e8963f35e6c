use crate::branch::{Branch, BranchId, IdSet};
use rand::seq::SliceRandom;
use rand::Rng;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub san: String,
    pub branch: BranchId,
}

/// Picks the automatic opponent's next ply.
///
/// With a pinned branch the answer is forced. Without one, candidates are
/// grouped by their next move and a group is drawn at random among those
/// still holding an unused branch, so repeated activations walk through the
/// different lines before any repeats.
pub fn select_next(
    pinned: Option<&Branch>,
    history: &[String],
    candidates: &[&Branch],
    used: &mut IdSet,
    rng: &mut impl Rng,
) -> Option<Selection> {
    let ply = history.len();

    if let Some(branch) = pinned {
        return branch.move_at(ply).map(|san| Selection {
            san: san.to_owned(),
            branch: branch.id.clone(),
        });
    }

    let mut groups: Vec<(&str, Vec<&Branch>)> = Vec::new();
    for &branch in candidates {
        let m = match branch.move_at(ply) {
            Some(m) => m,
            None => continue,
        };
        match groups.iter_mut().find(|(san, _)| *san == m) {
            Some((_, members)) => members.push(branch),
            None => groups.push((m, vec![branch])),
        }
    }

    let mut open: Vec<usize> = (0..groups.len())
        .filter(|&i| groups[i].1.iter().any(|branch| !used.contains(&branch.id)))
        .collect();
    if open.is_empty() {
        used.clear();
        open = (0..groups.len()).collect();
    }

    let &chosen = open.choose(rng)?;
    let (san, members) = &groups[chosen];
    let branch = members
        .iter()
        .find(|branch| !used.contains(&branch.id))
        .or_else(|| members.first())?;

    used.insert(branch.id.clone());
    Some(Selection {
        san: (*san).to_owned(),
        branch: branch.id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::select_next;
    use crate::branch::{BranchId, BranchSet, IdSet};
    use crate::pgn::parse;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn opening_book() -> BranchSet {
        parse("1. e4 e5 (1... c5) 2. Nf3 (1. d4 d5 (1... Nf6)) (1. c4)")
    }

    #[test]
    fn pinned_branch_is_deterministic() {
        let set = opening_book();
        let main = set.get(&BranchId::main()).unwrap();
        let history = vec!["e4".to_owned()];
        let mut used = IdSet::new();
        let mut rng = StdRng::seed_from_u64(7);

        let pick = select_next(Some(main), &history, &[], &mut used, &mut rng).unwrap();
        assert_eq!(pick.san, "e5");
        assert_eq!(pick.branch, BranchId::main());
        assert!(used.is_empty());

        let done = vec!["e4".to_owned(), "e5".to_owned(), "Nf3".to_owned()];
        assert!(select_next(Some(main), &done, &[], &mut used, &mut rng).is_none());
    }

    #[test]
    fn walks_every_branch_before_repeating() {
        let set = opening_book();
        let candidates: Vec<_> = set.iter().collect();
        let mut used = IdSet::new();
        let mut rng = StdRng::seed_from_u64(42);

        let mut seen = Vec::new();
        for _ in 0..set.len() {
            let pick = select_next(None, &[], &candidates, &mut used, &mut rng).unwrap();
            assert!(!seen.contains(&pick.branch), "{} repeated too early", pick.branch);
            seen.push(pick.branch);
        }
        assert_eq!(used.len(), set.len());

        // exhausted: the used set starts over instead of stalling
        let pick = select_next(None, &[], &candidates, &mut used, &mut rng).unwrap();
        assert_eq!(used.len(), 1);
        assert!(used.contains(&pick.branch));
    }

    #[test]
    fn no_candidates_no_selection() {
        let mut used = IdSet::new();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_next(None, &[], &[], &mut used, &mut rng).is_none());
    }

    proptest! {
        #[test]
        fn never_stalls_and_prefers_unused(seed in any::<u64>(), rounds in 1usize..20) {
            let set = opening_book();
            let candidates: Vec<_> = set.iter().collect();
            let mut used = IdSet::new();
            let mut rng = StdRng::seed_from_u64(seed);

            for _ in 0..rounds {
                let before = used.clone();
                let pick = select_next(None, &[], &candidates, &mut used, &mut rng);
                prop_assert!(pick.is_some());
                let pick = pick.unwrap();
                if before.len() < set.len() {
                    prop_assert!(!before.contains(&pick.branch));
                }
                prop_assert_eq!(
                    set.get(&pick.branch).and_then(|b| b.move_at(0)),
                    Some(pick.san.as_str())
                );
            }
        }
    }
}
