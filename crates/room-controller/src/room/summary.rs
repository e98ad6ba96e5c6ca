//! Vote statistics attached to revealed room snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Participant;

/// Statistics over the votes cast in a revealed room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSummary {
    /// Number of participants with a vote.
    pub count: usize,
    pub min: i64,
    pub max: i64,
    pub average: f64,
    /// Middle value; mean of the two middle values for an even count.
    pub median: f64,
    /// Most frequent value. Ties go to the smaller value.
    pub most_common: i64,
    /// Vote value to number of participants that chose it.
    pub distribution: BTreeMap<i64, usize>,
    /// Everyone voted, at least two votes were cast, and all agree.
    pub consensus: bool,
}

impl VoteSummary {
    /// Summarize a roster. Returns `None` when nobody has voted.
    #[must_use]
    pub fn from_participants(users: &[Participant]) -> Option<Self> {
        let mut votes: Vec<i64> = users.iter().filter_map(|u| u.vote).collect();
        votes.sort_unstable();

        let (&min, &max) = (votes.first()?, votes.last()?);
        let count = votes.len();

        let mut distribution = BTreeMap::new();
        for vote in &votes {
            *distribution.entry(*vote).or_insert(0usize) += 1;
        }

        // BTreeMap iterates in ascending order, so the first maximum wins ties.
        let mut most_common = min;
        let mut best = 0usize;
        for (&value, &n) in &distribution {
            if n > best {
                best = n;
                most_common = value;
            }
        }

        // Vote values are small card numbers; f64 holds them exactly.
        #[allow(clippy::cast_precision_loss)]
        let average = votes.iter().map(|v| *v as f64).sum::<f64>() / count as f64;

        #[allow(clippy::cast_precision_loss)]
        let median = {
            let mid = count / 2;
            let upper = votes.get(mid).copied().unwrap_or(max) as f64;
            if count % 2 == 0 {
                let lower = votes.get(mid.saturating_sub(1)).copied().unwrap_or(min) as f64;
                (lower + upper) / 2.0
            } else {
                upper
            }
        };

        let consensus = users.len() > 1 && count == users.len() && min == max;

        Some(Self {
            count,
            min,
            max,
            average,
            median,
            most_common,
            distribution,
            consensus,
        })
    }
}
