//! FM algorithm routing tables (§4.6, §9).
//!
//! Each [`AlgoDef`] names, per operator, which earlier operators' output feeds it as
//! phase modulation, and which operators are carriers summed into the channel output.
//! Operators are always evaluated in index order 0..4 and `mod_sources[k]` only ever
//! names indices `< k`, so a single forward pass computes every algorithm — see
//! `DESIGN.md` Open Question 6 for why the real chip's "feedback reads slot1 after its
//! stage-1 or stage-3 computation" distinction is not modelled separately: feedback here
//! always reads the stored delay-line average regardless of algorithm.

#[derive(Debug, Clone, Copy)]
pub(crate) struct AlgoDef {
    pub mod_sources: [&'static [u8]; 4],
    pub carriers: [bool; 4],
}

macro_rules! algo {
    ([$($s0:expr),*], [$($s1:expr),*], [$($s2:expr),*], [$($s3:expr),*], $c0:expr, $c1:expr, $c2:expr, $c3:expr) => {
        AlgoDef {
            mod_sources: [&[$($s0),*], &[$($s1),*], &[$($s2),*], &[$($s3),*]],
            carriers: [$c0, $c1, $c2, $c3],
        }
    };
}

/// 16 four-operator routings for sync mode 0.
pub(crate) const SYNC0_ALGORITHMS: [AlgoDef; 16] = [
    algo!([], [0], [1], [2], false, false, false, true),
    algo!([], [], [0, 1], [2], false, false, false, true),
    algo!([], [0], [1], [0, 2], false, false, false, true),
    algo!([], [0], [], [1, 2], false, false, false, true),
    algo!([], [0], [], [2], false, true, false, true),
    algo!([], [0], [0], [0], false, true, true, true),
    algo!([], [0], [], [], false, true, true, true),
    algo!([], [], [], [], true, true, true, true),
    algo!([], [0], [1], [2], true, false, false, true),
    algo!([], [0], [1], [1], false, false, true, true),
    algo!([], [], [0], [1], false, false, true, true),
    algo!([], [0], [1], [], false, false, true, true),
    algo!([], [0], [1], [2], false, true, false, true),
    algo!([], [], [], [0, 1, 2], false, false, false, true),
    algo!([], [0], [0], [1, 2], false, false, false, true),
    algo!([], [], [0], [0, 1, 2], false, false, false, true),
];

/// 4 two-operator routings for sync mode 1 (two independent pairs per group).
pub(crate) const SYNC1_ALGORITHMS: [AlgoDef; 4] = [
    algo!([], [0], [], [], false, true, false, false),
    algo!([], [], [], [], true, true, false, false),
    algo!([], [0], [], [], true, true, false, false),
    algo!([], [], [], [], true, false, false, false),
];

/// 8 three-operator routings for sync mode 2 (bank 3 is the parallel PCM voice, not part
/// of this table).
pub(crate) const SYNC2_ALGORITHMS: [AlgoDef; 8] = [
    algo!([], [0], [1], [], false, false, true, false),
    algo!([], [], [0, 1], [], false, false, true, false),
    algo!([], [0], [], [], false, true, true, false),
    algo!([], [], [], [], true, true, true, false),
    algo!([], [0], [1], [], false, true, true, false),
    algo!([], [], [0], [], false, true, true, false),
    algo!([], [0], [0], [], false, true, true, false),
    algo!([], [0], [1], [], true, false, true, false),
];

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn mod_sources_never_reference_later_or_equal_operators() {
        for algo in SYNC0_ALGORITHMS.iter() {
            for (k, sources) in algo.mod_sources.iter().enumerate() {
                for &src in sources.iter() {
                    assert!((src as usize) < k, "operator {k} references >= itself");
                }
            }
        }
    }

    #[test]
    fn every_algorithm_has_at_least_one_carrier() {
        for algo in SYNC0_ALGORITHMS.iter().chain(SYNC1_ALGORITHMS.iter()) {
            assert!(algo.carriers.iter().any(|&c| c));
        }
        for algo in SYNC2_ALGORITHMS.iter() {
            assert!(algo.carriers[..3].iter().any(|&c| c));
        }
    }
}
