use crate::types::{DecentralizationVerdict, HolderRecord};

/// Number of leading holders summed for the concentration figure.
pub const TOP_HOLDERS: usize = 10;

/// Below this many holders no verdict is given.
pub const MIN_HOLDERS_FOR_ANALYSIS: usize = 3;

/// (exclusive lower bound on top-10 share, verdict), checked in order.
const BUCKETS: [(f64, DecentralizationVerdict); 4] = [
    (
        90.0,
        DecentralizationVerdict {
            score: 1,
            label: "Very low decentralization",
        },
    ),
    (
        70.0,
        DecentralizationVerdict {
            score: 2,
            label: "Low decentralization",
        },
    ),
    (
        50.0,
        DecentralizationVerdict {
            score: 3,
            label: "Medium decentralization",
        },
    ),
    (
        30.0,
        DecentralizationVerdict {
            score: 4,
            label: "High decentralization",
        },
    ),
];

pub const INSUFFICIENT_DATA: DecentralizationVerdict = DecentralizationVerdict {
    score: 0,
    label: "Insufficient data for analysis",
};

pub const VERY_HIGH: DecentralizationVerdict = DecentralizationVerdict {
    score: 5,
    label: "Very high decentralization",
};

/// Combined percentage held by the first [`TOP_HOLDERS`] records.
pub fn top10_concentration(holders: &[HolderRecord]) -> f64 {
    holders
        .iter()
        .take(TOP_HOLDERS)
        .map(|holder| holder.percentage)
        .sum()
}

/// Buckets the top-10 share into a 1..=5 score. A more concentrated
/// supply yields a lower score.
pub fn analyze_decentralization(holders: &[HolderRecord]) -> DecentralizationVerdict {
    if holders.len() < MIN_HOLDERS_FOR_ANALYSIS {
        return INSUFFICIENT_DATA;
    }

    let concentration = top10_concentration(holders);
    BUCKETS
        .iter()
        .find(|(threshold, _)| concentration > *threshold)
        .map(|(_, verdict)| *verdict)
        .unwrap_or(VERY_HIGH)
}
