use std::collections::HashSet;
use std::time::Instant;

use crate::instance::{Instance, Letter};
use crate::nnet::Mlp;
use crate::search::features::{feature_vector, standardize, FeatureConfig};
use crate::search::node::Cursors;

/// A search state owned by one beam search. Parent links are arena
/// indices; the arena is dropped wholesale when the search returns, so
/// parents always outlive their children.
pub struct Node {
    pub cursors: Cursors,
    pub parent: Option<usize>,
    pub depth: usize,
    pub features: Vec<f64>,
    pub heuristic_value: f64,
}

pub struct SearchOutcome {
    /// Length of the longest complete solution found.
    pub objective: usize,
    pub solution: Vec<Letter>,
    pub running_time: f64,
}

/// Level-synchronous beam search guided by a scoring network.
pub struct BeamSearch<'a> {
    pub inst: &'a Instance,
    pub net: &'a Mlp,
    pub feature_config: FeatureConfig,
    pub beam_width: usize,
    pub time_limit: f64,
}

struct SearchState {
    arena: Vec<Node>,
    best: usize,
    objective: usize,
    elapsed: f64,
}

impl BeamSearch<'_> {
    /// Runs the search and reports only the objective value. Used during
    /// training, where the solution itself is never materialised.
    pub fn objective(&self) -> usize {
        self.search().objective
    }

    /// Runs the search and reconstructs the best solution found.
    pub fn solve(&self) -> SearchOutcome {
        let state = self.search();
        let solution = reconstruct(self.inst, &state.arena, state.best);
        SearchOutcome {
            objective: state.objective,
            solution,
            running_time: state.elapsed,
        }
    }

    fn search(&self) -> SearchState {
        let start = Instant::now();
        let mut arena = vec![Node {
            cursors: Cursors::root(self.inst),
            parent: None,
            depth: 0,
            features: Vec::new(),
            heuristic_value: 0.0,
        }];
        let mut beam: Vec<usize> = vec![0];
        let mut best = 0;
        let mut objective = 0;
        // One deduplication set per level, keyed on the input and
        // anti-pattern cursors; the pattern cursors are determined by them.
        let mut seen: HashSet<(Vec<usize>, Vec<usize>)> = HashSet::new();

        while !beam.is_empty() {
            let mut level: Vec<usize> = Vec::new();
            for &id in &beam {
                let extensions = arena[id].cursors.extensions(self.inst);
                if extensions.is_empty()
                    && arena[id].depth > objective
                    && arena[id].cursors.is_complete(self.inst)
                {
                    objective = arena[id].depth;
                    best = id;
                }
                let depth = arena[id].depth + 1;
                for (_, cursors) in extensions {
                    if seen.insert((cursors.s.clone(), cursors.r.clone())) {
                        arena.push(Node {
                            cursors,
                            parent: Some(id),
                            depth,
                            features: Vec::new(),
                            heuristic_value: 0.0,
                        });
                        level.push(arena.len() - 1);
                    }
                }
            }

            for &id in &level {
                let mut features = feature_vector(
                    self.inst,
                    &arena[id].cursors,
                    arena[id].depth,
                    self.feature_config,
                );
                standardize(&mut features);
                arena[id].heuristic_value = self.net.forward(&features);
                arena[id].features = features;
            }

            // Stable sort: ties keep expansion order, which makes the cut
            // deterministic.
            level.sort_by(|&a, &b| {
                arena[b]
                    .heuristic_value
                    .total_cmp(&arena[a].heuristic_value)
            });
            level.truncate(self.beam_width);
            beam = level;

            seen.clear();
            if start.elapsed().as_secs_f64() >= self.time_limit {
                break;
            }
        }

        SearchState {
            arena,
            best,
            objective,
            elapsed: start.elapsed().as_secs_f64(),
        }
    }
}

// Walks the parent chain; every step where the first input cursor moved
// emits the letter it consumed.
fn reconstruct(inst: &Instance, arena: &[Node], mut id: usize) -> Vec<Letter> {
    let mut solution = Vec::with_capacity(arena[id].depth);
    while let Some(parent) = arena[id].parent {
        let pos = arena[id].cursors.s[0];
        if pos != arena[parent].cursors.s[0] {
            solution.push(inst.s[0][pos - 1]);
        }
        id = parent;
    }
    solution.reverse();
    solution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nnet::Activation;
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    fn zero_net() -> Mlp {
        Mlp::new(vec![9, 1], Activation::Identity)
    }

    fn solve(inst: &Instance, net: &Mlp, beam_width: usize) -> SearchOutcome {
        BeamSearch {
            inst,
            net,
            feature_config: FeatureConfig::Base,
            beam_width,
            time_limit: 10.0,
        }
        .solve()
    }

    fn as_string(inst: &Instance, solution: &[Letter]) -> String {
        inst.decode(solution).into_iter().collect()
    }

    #[test]
    fn single_string_is_recovered_whole() {
        let inst = Instance::parse("t", "1 2 0 0\n4 aabb").unwrap();
        let net = zero_net();
        let outcome = solve(&inst, &net, 10);
        assert_eq!(outcome.objective, 4);
        assert_eq!(as_string(&inst, &outcome.solution), "aabb");
        assert!(inst.is_feasible(&outcome.solution));
    }

    #[test]
    fn plain_two_string_subsequence() {
        let inst = Instance::parse("t", "2 3 0 0\n3 abc\n3 acb").unwrap();
        let net = zero_net();
        let outcome = solve(&inst, &net, 10);
        assert_eq!(outcome.objective, 2);
        assert_eq!(as_string(&inst, &outcome.solution), "ab");
    }

    #[test]
    fn pattern_must_appear_in_the_solution() {
        let inst = Instance::parse("t", "2 3 1 0\n4 abca\n4 abca\n2 bc").unwrap();
        let net = zero_net();
        let outcome = solve(&inst, &net, 10);
        assert_eq!(outcome.objective, 4);
        assert_eq!(as_string(&inst, &outcome.solution), "abca");
        assert!(inst.is_feasible(&outcome.solution));
    }

    #[test]
    fn anti_pattern_caps_the_solution() {
        let inst = Instance::parse("t", "1 2 0 1\n4 aaaa\n2 aa").unwrap();
        let net = zero_net();
        let outcome = solve(&inst, &net, 10);
        assert_eq!(outcome.objective, 1);
        assert_eq!(as_string(&inst, &outcome.solution), "a");
        assert!(inst.is_feasible(&outcome.solution));
    }

    #[test]
    fn pattern_and_anti_pattern_interact() {
        let inst = Instance::parse("t", "2 2 1 1\n4 abab\n4 baba\n1 a\n2 bb").unwrap();
        let net = zero_net();
        let outcome = solve(&inst, &net, 10);
        assert_eq!(outcome.objective, 3);
        assert_eq!(as_string(&inst, &outcome.solution), "aba");
        assert!(inst.is_feasible(&outcome.solution));
    }

    #[test]
    fn duplicate_states_within_a_level_are_merged() {
        // "a" then "a" and "b"-skipped-"a" reach the same cursors
        let inst = Instance::parse("t", "2 2 0 1\n3 aba\n3 aba\n2 ab").unwrap();
        let net = zero_net();
        let outcome = solve(&inst, &net, 10);
        assert_eq!(outcome.objective, 2);
        assert_eq!(as_string(&inst, &outcome.solution), "aa");
        assert!(inst.is_feasible(&outcome.solution));
    }

    #[test]
    fn beam_width_one_degenerates_to_a_greedy_walk() {
        let inst = Instance::parse("t", "1 2 0 0\n4 aabb").unwrap();
        let net = zero_net();
        let outcome = solve(&inst, &net, 1);
        assert_eq!(outcome.objective, 4);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let inst = Instance::parse("t", "2 3 1 1\n6 abcabc\n6 acbacb\n2 bc\n2 aa").unwrap();
        let net = zero_net();
        let first = solve(&inst, &net, 3);
        let second = solve(&inst, &net, 3);
        assert_eq!(first.objective, second.objective);
        assert_eq!(first.solution, second.solution);
    }

    #[test]
    fn objective_equals_solution_length() {
        let inst = Instance::parse("t", "2 3 1 0\n5 aabcc\n5 abcbc\n2 bc").unwrap();
        let net = zero_net();
        let outcome = solve(&inst, &net, 5);
        assert_eq!(outcome.objective, outcome.solution.len());
        assert!(inst.is_feasible(&outcome.solution));
    }

    #[derive(Clone, Debug)]
    struct RandomInstance(String);

    impl Arbitrary for RandomInstance {
        fn arbitrary(g: &mut Gen) -> Self {
            let alphabet = ['a', 'b', 'c'];
            let m = usize::arbitrary(g) % 3 + 1;
            let p = usize::arbitrary(g) % 2;
            let r = usize::arbitrary(g) % 3;
            let mut lines = vec![format!("{m} {} {p} {r}", alphabet.len())];
            let mut push_string = |g: &mut Gen, min_len: usize, max_len: usize| {
                let len = usize::arbitrary(g) % (max_len - min_len + 1) + min_len;
                let s: String = (0..len)
                    .map(|_| alphabet[usize::arbitrary(g) % alphabet.len()])
                    .collect();
                lines.push(format!("{len} {s}"));
            };
            for _ in 0..m {
                push_string(g, 1, 6);
            }
            for _ in 0..p {
                push_string(g, 1, 2);
            }
            for _ in 0..r {
                push_string(g, 1, 2);
            }
            RandomInstance(lines.join("\n"))
        }
    }

    #[quickcheck]
    fn emitted_solutions_are_feasible(random: RandomInstance) {
        let inst = Instance::parse("t", &random.0).unwrap();
        let net = zero_net();
        let outcome = solve(&inst, &net, 4);
        assert_eq!(outcome.objective, outcome.solution.len());
        if !outcome.solution.is_empty() {
            assert!(
                inst.is_feasible(&outcome.solution),
                "infeasible solution for {:?}",
                random.0
            );
        }
    }
}
