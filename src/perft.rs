use std::{
    fmt::Display,
    time::{Duration, Instant},
};

use tabled::{Table, Tabled};

use crate::position::Position;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Tabled)]
pub struct PerftDepthResult {
    tot: u64,
    captures: u64,
    en_passants: u64,
    castles: u64,
    promotions: u64,
    checks: u64,
    checkmates: u64,
}

impl PerftDepthResult {
    pub fn new(
        tot: u64,
        captures: u64,
        en_passants: u64,
        castles: u64,
        promotions: u64,
        checks: u64,
        checkmates: u64,
    ) -> Self {
        PerftDepthResult {
            tot,
            captures,
            en_passants,
            castles,
            promotions,
            checks,
            checkmates,
        }
    }

    pub fn total(&self) -> u64 {
        self.tot
    }
}

pub struct PerftResult {
    pub depth_results: Vec<PerftDepthResult>,
    pub tot_nodes: u64,
    pub time_elapsed: Duration,
    pub nodes_per_second: f64,
}

impl Display for PerftResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "total nodes: {}", self.tot_nodes)?;
        writeln!(f, "time elapsed: {}", self.time_elapsed.as_secs_f32())?;
        writeln!(f, "nodes/s: {}", self.nodes_per_second)?;
        writeln!(f, "{}", Table::new(&self.depth_results))?;
        Ok(())
    }
}

pub fn perft(position: &Position, depth: usize) -> PerftResult {
    let mut depth_results = vec![PerftDepthResult::default(); depth];

    let start = Instant::now();
    perft_helper(&mut depth_results, position, depth, 0);
    let time_elapsed = start.elapsed();

    let tot_nodes = depth_results.iter().map(|res| res.tot).sum();
    let nodes_per_second = tot_nodes as f64 / time_elapsed.as_secs_f64();

    PerftResult {
        depth_results,
        tot_nodes,
        time_elapsed,
        nodes_per_second,
    }
}

fn perft_helper(
    depth_results: &mut [PerftDepthResult],
    position: &Position,
    max_depth: usize,
    curr_depth: usize,
) {
    if curr_depth == max_depth {
        return;
    }

    let moves = position.legal_moves();

    let res = &mut depth_results[curr_depth];
    res.tot += moves.len() as u64;

    // The move encoding carries the flags, so the breakdown falls out of it.
    for mve in &moves {
        if mve.is_capture() {
            res.captures += 1;
        }
        if mve.is_en_passant() {
            res.en_passants += 1;
        }
        if mve.is_castle() {
            res.castles += 1;
        }
        if mve.promotion().is_some() {
            res.promotions += 1;
        }
    }

    let mut checks = 0;
    let mut checkmates = 0;
    for mve in moves {
        let mut next = position.clone();
        next.do_move(mve).expect("generated moves apply");
        if next.is_check() {
            checks += 1;
            if next.legal_moves().is_empty() {
                checkmates += 1;
            }
        }
        perft_helper(depth_results, &next, max_depth, curr_depth + 1);
    }

    let res = &mut depth_results[curr_depth];
    res.checks += checks;
    res.checkmates += checkmates;
}
