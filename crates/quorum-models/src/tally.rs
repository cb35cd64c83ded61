use serde::{Deserialize, Serialize};

/// Aggregated view of a poll's votes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    /// Vote count per option index.
    pub counts: Vec<i64>,
    /// Number of distinct users holding a vote.
    pub voters: i64,
    /// Option indices sharing the maximum count; empty when nobody voted.
    pub leaders: Vec<i64>,
    /// Stable encoding of the leader set, present only when two or more
    /// options are tied at the maximum.
    pub tie_signature: Option<String>,
}

impl Tally {
    /// Count one selection set per voter. Indices outside the option range
    /// are ignored; callers validate before storing.
    pub fn compute(option_count: usize, selections: &[Vec<i64>]) -> Tally {
        let mut counts = vec![0i64; option_count];
        for chosen in selections {
            for &index in chosen {
                if let Some(slot) = usize::try_from(index).ok().and_then(|i| counts.get_mut(i)) {
                    *slot += 1;
                }
            }
        }

        let max = counts.iter().copied().max().unwrap_or(0);
        let leaders: Vec<i64> = if max == 0 {
            Vec::new()
        } else {
            counts
                .iter()
                .enumerate()
                .filter(|(_, count)| **count == max)
                .map(|(index, _)| index as i64)
                .collect()
        };
        let tie_signature = (leaders.len() >= 2).then(|| tie_signature(&leaders));

        Tally {
            counts,
            voters: selections.len() as i64,
            leaders,
            tie_signature,
        }
    }

    pub fn is_tie(&self) -> bool {
        self.leaders.len() >= 2
    }

    /// The single winning option, when exactly one option leads.
    pub fn sole_leader(&self) -> Option<i64> {
        match self.leaders.as_slice() {
            [winner] => Some(*winner),
            _ => None,
        }
    }
}

/// Order-independent encoding of a set of tied option indices, e.g. `"0,1"`.
/// Equal signatures mean the same tie.
pub fn tie_signature(leaders: &[i64]) -> String {
    let mut sorted = leaders.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_votes_has_no_leaders_and_no_tie() {
        let tally = Tally::compute(3, &[]);
        assert_eq!(tally.counts, vec![0, 0, 0]);
        assert_eq!(tally.voters, 0);
        assert!(tally.leaders.is_empty());
        assert!(!tally.is_tie());
        assert_eq!(tally.tie_signature, None);
    }

    #[test]
    fn single_maximum_is_a_sole_leader() {
        let tally = Tally::compute(2, &[vec![0], vec![0], vec![1]]);
        assert_eq!(tally.counts, vec![2, 1]);
        assert_eq!(tally.sole_leader(), Some(0));
        assert_eq!(tally.tie_signature, None);
    }

    #[test]
    fn tied_maximum_yields_signature() {
        let tally = Tally::compute(2, &[vec![0], vec![0], vec![1], vec![1]]);
        assert!(tally.is_tie());
        assert_eq!(tally.sole_leader(), None);
        assert_eq!(tally.tie_signature.as_deref(), Some("0,1"));
    }

    #[test]
    fn signature_is_stable_under_vote_order() {
        let forward = Tally::compute(3, &[vec![0], vec![2], vec![0], vec![2]]);
        let backward = Tally::compute(3, &[vec![2], vec![0], vec![2], vec![0]]);
        assert_eq!(forward.tie_signature, backward.tie_signature);
        assert_eq!(forward.tie_signature.as_deref(), Some("0,2"));
    }

    #[test]
    fn multi_select_counts_every_chosen_option() {
        let tally = Tally::compute(3, &[vec![0, 1], vec![1]]);
        assert_eq!(tally.counts, vec![1, 2, 0]);
        assert_eq!(tally.voters, 2);
        assert_eq!(tally.sole_leader(), Some(1));
    }

    #[test]
    fn out_of_range_indices_are_ignored() {
        let tally = Tally::compute(2, &[vec![0, 7], vec![-1]]);
        assert_eq!(tally.counts, vec![1, 0]);
    }
}
