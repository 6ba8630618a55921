//! Enumeration of minimal unsatisfiable subsets.
//!
//! Subsets are explored through a separate "map" BDD over one selector variable per
//! constraint. Each unexplored seed is either grown into a maximal satisfiable subset and
//! blocked downwards, or shrunk into a minimal unsatisfiable subset and blocked upwards,
//! until the map is empty.

use log::debug;

use crate::bdd::Bdd;
use crate::reference::Ref;

fn selector(i: usize) -> i32 {
    i as i32 + 1
}

/// All minimal unsatisfiable subsets of the conjunction of `constraints`.
///
/// Each subset lists constraint positions ascending, and the subsets are sorted.
pub fn minimal_unsat_subsets(bdd: &Bdd, constraints: &[Ref]) -> Vec<Vec<usize>> {
    let n = constraints.len();
    let is_sat = |subset: &[usize]| !bdd.is_zero(bdd.apply_and_many(subset.iter().map(|&i| constraints[i])));

    let map = Bdd::new(10);
    let mut unexplored = map.one();
    let mut result = Vec::new();

    while let Some(model) = map.one_sat(unexplored) {
        let mut chosen = vec![true; n];
        for lit in model {
            if lit < 0 {
                chosen[(-lit - 1) as usize] = false;
            }
        }
        let seed: Vec<usize> = (0..n).filter(|&i| chosen[i]).collect();

        if is_sat(&seed) {
            let mut grown = seed;
            for i in 0..n {
                if !chosen[i] {
                    grown.push(i);
                    if is_sat(&grown) {
                        chosen[i] = true;
                    } else {
                        grown.pop();
                    }
                }
            }
            let missing: Vec<i32> = (0..n).filter(|&i| !chosen[i]).map(selector).collect();
            if missing.is_empty() {
                break;
            }
            unexplored = map.apply_and(unexplored, map.mk_clause(missing));
        } else {
            let mut core = seed;
            let mut i = 0;
            while i < core.len() {
                let candidate: Vec<usize> = core.iter().enumerate().filter(|&(k, _)| k != i).map(|(_, &c)| c).collect();
                if is_sat(&candidate) {
                    i += 1;
                } else {
                    core = candidate;
                }
            }
            debug!("mus: found core {:?}", core);
            unexplored = map.apply_and(unexplored, map.mk_clause(core.iter().map(|&c| -selector(c))));
            result.push(core);
        }
    }

    for core in result.iter_mut() {
        core.sort_unstable();
    }
    result.sort();
    result
}
