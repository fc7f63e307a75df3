use std::fmt;

use crate::instance::Instance;
use crate::search::SearchOutcome;

/// The solve-mode result block: instance name, objective value, decoded
/// solution, wall-clock time and an independent feasibility re-check.
pub struct SolveReport {
    pub instance_name: String,
    pub objective: usize,
    pub solution: String,
    pub running_time: f64,
    pub feasible: bool,
}

impl SolveReport {
    pub fn new(inst: &Instance, outcome: &SearchOutcome) -> Self {
        let solution = inst
            .decode(&outcome.solution)
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        SolveReport {
            instance_name: inst.name.clone(),
            objective: outcome.objective,
            solution,
            running_time: outcome.running_time,
            feasible: inst.is_feasible(&outcome.solution),
        }
    }
}

impl fmt::Display for SolveReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{}", self.instance_name)?;
        writeln!(f, "Objective: {}", self.objective)?;
        writeln!(f, "Solution: {}", self.solution)?;
        writeln!(f, "Time: {}", self.running_time)?;
        writeln!(f, "Feasible: {}", u8::from(self.feasible))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Instance;

    #[test]
    fn report_formats_the_output_block() {
        let inst = Instance::parse("sample", "1 2 0 0\n4 aabb").unwrap();
        let outcome = SearchOutcome {
            objective: 4,
            solution: vec![0, 0, 1, 1],
            running_time: 0.25,
        };
        let report = SolveReport::new(&inst, &outcome);
        assert_eq!(
            report.to_string(),
            "sample\nObjective: 4\nSolution: a a b b\nTime: 0.25\nFeasible: 1\n"
        );
    }

    #[test]
    fn infeasible_solutions_are_reported_as_such() {
        let inst = Instance::parse("sample", "1 2 1 0\n2 ab\n1 b").unwrap();
        let outcome = SearchOutcome {
            objective: 1,
            solution: vec![0],
            running_time: 0.0,
        };
        let report = SolveReport::new(&inst, &outcome);
        assert!(report.to_string().ends_with("Feasible: 0\n"));
    }
}
