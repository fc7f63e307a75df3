use crate::instance::{Instance, Letter};

/// The cursor triple summarising a partial solution: the next position to
/// consider in every input string, the number of consumed letters of every
/// pattern, and the number of matched letters of every anti-pattern.
///
/// Every value constructed through [`Cursors::root`] and
/// [`Cursors::extensions`] satisfies `s[i] <= |s_i|`, `p[j] <= |P_j|` and
/// `r[k] < |R_k|`; a state that would fully embed an anti-pattern is never
/// created.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Cursors {
    pub s: Vec<usize>,
    pub p: Vec<usize>,
    pub r: Vec<usize>,
}

impl Cursors {
    pub fn root(inst: &Instance) -> Self {
        Cursors {
            s: vec![0; inst.m],
            p: vec![0; inst.p],
            r: vec![0; inst.r],
        }
    }

    /// A state is complete when every pattern has been fully consumed. The
    /// anti-pattern cursors are re-checked although no live state can
    /// violate them.
    pub fn is_complete(&self, inst: &Instance) -> bool {
        self.p
            .iter()
            .zip(&inst.patterns)
            .all(|(&c, pj)| c >= pj.len())
            && self
                .r
                .iter()
                .zip(&inst.anti_patterns)
                .all(|(&c, rk)| c < rk.len())
    }

    /// All feasible single-letter extensions of this state, with the letter
    /// that produces each successor.
    ///
    /// Candidate letters pass four filters: the letter must remain
    /// extractable from every input suffix; advancing the anti-pattern
    /// cursors must not embed any anti-pattern; every unfinished pattern
    /// suffix must still fit into every input string behind the advanced
    /// cursors; and extensions dominated by a sibling are dropped.
    pub fn extensions(&self, inst: &Instance) -> Vec<(Letter, Cursors)> {
        let mut survivors: Vec<(Letter, Cursors)> = Vec::new();

        'letters: for letter in 0..inst.sigma {
            for i in 0..inst.m {
                if self.s[i] >= inst.s[i].len()
                    || inst.occurrences_from(letter, i, self.s[i]) == 0
                {
                    continue 'letters;
                }
            }

            let next = match self.advance(inst, letter) {
                Some(next) => next,
                None => continue,
            };

            for j in 0..inst.p {
                if next.p[j] >= inst.patterns[j].len() {
                    continue;
                }
                for i in 0..inst.m {
                    match inst.embed_start(i, j, next.p[j]) {
                        Some(k) if k >= next.s[i] => {}
                        _ => continue 'letters,
                    }
                }
            }

            survivors.push((letter, next));
        }

        prune_dominated(&mut survivors);
        survivors
    }

    // Advances all cursors under `letter`; None when an anti-pattern would
    // be fully embedded.
    fn advance(&self, inst: &Instance, letter: Letter) -> Option<Cursors> {
        let s = (0..inst.m)
            .map(|i| inst.next_occurrence(letter, i, self.s[i]) + 1)
            .collect();
        let p = (0..inst.p)
            .map(|j| {
                let c = self.p[j];
                if c < inst.patterns[j].len() && inst.patterns[j][c] == letter {
                    c + 1
                } else {
                    c
                }
            })
            .collect();
        let mut r = Vec::with_capacity(inst.r);
        for k in 0..inst.r {
            let c = self.r[k];
            let c = if inst.anti_patterns[k][c] == letter {
                c + 1
            } else {
                c
            };
            if c >= inst.anti_patterns[k].len() {
                return None;
            }
            r.push(c);
        }
        Some(Cursors { s, p, r })
    }
}

/// `a` dominates `b` when `a` has consumed no more of any input string,
/// made at least as much progress on every pattern, and sits strictly
/// farther from embedding every anti-pattern. The dominated extension can
/// never lead to a better completion and is discarded. Strictness on the
/// anti-pattern axis keeps the relation antisymmetric.
fn dominates(a: &Cursors, b: &Cursors) -> bool {
    a.s.iter().zip(&b.s).all(|(x, y)| x <= y)
        && a.p.iter().zip(&b.p).all(|(x, y)| x >= y)
        && a.r.iter().zip(&b.r).all(|(x, y)| x < y)
}

// All pairs are compared before anything is removed.
fn prune_dominated(survivors: &mut Vec<(Letter, Cursors)>) {
    let mut dominated = vec![false; survivors.len()];
    for a in 0..survivors.len() {
        for b in 0..survivors.len() {
            if a != b && dominates(&survivors[a].1, &survivors[b].1) {
                dominated[b] = true;
            }
        }
    }
    let mut keep = dominated.iter();
    survivors.retain(|_| !keep.next().unwrap());
}
