//! Quadratic program assembly and the conic solver backend.
//!
//! A [`Problem`] collects circuit components over potential variables and
//! lowers them to the conic form Clarabel solves:
//!
//! ```text
//! minimize    (1/2)x'Px + q'x
//! subject to  Ax + s = b,  s in K
//! ```
//!
//! Resistors contribute quadratic energy terms to `P`, current sources
//! linear terms to `q`. Ground pins become equality rows (zero cone) and
//! diodes one-sided rows (nonnegative cone). Every right-hand side is
//! zero, so the all-zero potential vector is always primal feasible; a
//! well-posed circuit can only fail as unbounded, which happens exactly
//! when an injected demand has no conducting path back to its drain.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use clarabel::algebra::CscMatrix;
use clarabel::solver::{DefaultSettingsBuilder, IPSolver, SolverStatus, SupportedConeT};
use web_time::Instant;

use tfa_core::{
    ComponentVoltages, CurrentSource, Diode, DiodeId, Resistor, ResistorId, SourceId, VarId,
};

use crate::error::SolveError;

/// Identifies a component within one problem, used for duplicate
/// detection and error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentRef {
    Resistor(ResistorId),
    Diode(DiodeId),
    Source(SourceId),
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentRef::Resistor(id) => write!(f, "resistor {}", id.value()),
            ComponentRef::Diode(id) => write!(f, "diode {}", id.value()),
            ComponentRef::Source(id) => write!(f, "source {}", id.value()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ResistorEntry {
    id: ResistorId,
    source: usize,
    drain: usize,
    conductance: f64,
}

#[derive(Debug, Clone, Copy)]
struct DiodeEntry {
    id: DiodeId,
    source: usize,
    drain: usize,
}

#[derive(Debug, Clone, Copy)]
struct SourceEntry {
    id: SourceId,
    source: usize,
    drain: usize,
    injection: f64,
}

/// Knobs forwarded to the interior-point solver.
#[derive(Debug, Clone)]
pub struct SolveOptions {
    /// Print Clarabel's per-iteration log to stdout.
    pub verbose: bool,
    /// Iteration cap before giving up on convergence.
    pub max_iterations: u32,
    /// Optional wall-clock limit for a single solve.
    pub time_limit: Option<Duration>,
}

impl Default for SolveOptions {
    fn default() -> Self {
        SolveOptions {
            verbose: false,
            max_iterations: 200,
            time_limit: None,
        }
    }
}

/// One convex program over node potentials.
///
/// Components reference [`VarId`]s from the network's variable pool;
/// the problem maps each variable to a dense column index on first use,
/// so only variables actually touched by a component (or grounded) end
/// up in the program.
#[derive(Debug, Default)]
pub struct Problem {
    columns: HashMap<VarId, usize>,
    order: Vec<VarId>,
    resistors: Vec<ResistorEntry>,
    diodes: Vec<DiodeEntry>,
    sources: Vec<SourceEntry>,
    grounds: Vec<usize>,
    registered: HashSet<ComponentRef>,
}

impl Problem {
    pub fn new() -> Self {
        Problem::default()
    }

    fn column(&mut self, var: VarId) -> usize {
        match self.columns.entry(var) {
            Entry::Occupied(slot) => *slot.get(),
            Entry::Vacant(slot) => {
                let index = self.order.len();
                self.order.push(var);
                *slot.insert(index)
            }
        }
    }

    fn register(&mut self, component: ComponentRef) -> Result<(), SolveError> {
        if self.registered.insert(component) {
            Ok(())
        } else {
            Err(SolveError::DuplicateComponent(component))
        }
    }

    /// Adds a resistor's energy term `(C/2)(v_s - v_d)^2`.
    pub fn add_resistor(&mut self, id: ResistorId, resistor: &Resistor) -> Result<(), SolveError> {
        self.register(ComponentRef::Resistor(id))?;
        let source = self.column(resistor.source());
        let drain = self.column(resistor.drain());
        self.resistors.push(ResistorEntry {
            id,
            source,
            drain,
            conductance: resistor.conductance(),
        });
        Ok(())
    }

    /// Adds a diode's one-way constraint `v_s <= v_d`.
    pub fn add_diode(&mut self, id: DiodeId, diode: &Diode) -> Result<(), SolveError> {
        self.register(ComponentRef::Diode(id))?;
        let source = self.column(diode.source());
        let drain = self.column(diode.drain());
        self.diodes.push(DiodeEntry { id, source, drain });
        Ok(())
    }

    /// Adds a current source's linear term `I (v_s - v_d)`.
    pub fn add_source(&mut self, id: SourceId, source: &CurrentSource) -> Result<(), SolveError> {
        self.register(ComponentRef::Source(id))?;
        let source_col = self.column(source.source());
        let drain = self.column(source.drain());
        self.sources.push(SourceEntry {
            id,
            source: source_col,
            drain,
            injection: source.injection(),
        });
        Ok(())
    }

    /// Pins a variable's potential to zero. Potentials are only defined
    /// up to a constant per connected component, so every component that
    /// carries current needs one ground to make the solution unique.
    pub fn ground(&mut self, var: VarId) {
        let column = self.column(var);
        self.grounds.push(column);
    }

    /// Number of distinct variables referenced so far.
    pub fn variable_count(&self) -> usize {
        self.order.len()
    }

    /// Number of objective terms (resistors plus current sources).
    pub fn objective_term_count(&self) -> usize {
        self.resistors.len() + self.sources.len()
    }

    /// Number of constraint rows (grounds plus diodes).
    pub fn constraint_count(&self) -> usize {
        self.grounds.len() + self.diodes.len()
    }

    /// Lowers the circuit to conic form and runs Clarabel.
    pub fn solve(&self, options: &SolveOptions) -> Result<Solution, SolveError> {
        let start = Instant::now();
        let n = self.order.len();
        if n == 0 {
            return Err(SolveError::EmptyProblem);
        }

        // P holds the energy Hessian, upper triangle only. A resistor
        // between s and d contributes C to both diagonals and -C to the
        // (min, max) off-diagonal entry.
        let mut p_cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for resistor in &self.resistors {
            let (s, d) = (resistor.source, resistor.drain);
            if s == d {
                // A self-loop never sees a voltage difference.
                continue;
            }
            let c = resistor.conductance;
            p_cols[s].push((s, c));
            p_cols[d].push((d, c));
            let (lo, hi) = if s < d { (s, d) } else { (d, s) };
            p_cols[hi].push((lo, -c));
        }
        let p_mat = csc_from_columns(n, p_cols);

        let mut q = vec![0.0; n];
        for source in &self.sources {
            q[source.source] += source.injection;
            q[source.drain] -= source.injection;
        }

        // Ground rows first (zero cone), then diode rows (nonnegative
        // cone): v_s - v_d + s_row = 0 with s_row >= 0 enforces
        // v_s <= v_d.
        let rows = self.grounds.len() + self.diodes.len();
        let mut a_cols: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for (row, &column) in self.grounds.iter().enumerate() {
            a_cols[column].push((row, 1.0));
        }
        for (offset, diode) in self.diodes.iter().enumerate() {
            let row = self.grounds.len() + offset;
            a_cols[diode.source].push((row, 1.0));
            a_cols[diode.drain].push((row, -1.0));
        }
        let a_mat = csc_from_columns(rows, a_cols);
        let b = vec![0.0; rows];

        let mut cones: Vec<SupportedConeT<f64>> = Vec::new();
        if !self.grounds.is_empty() {
            cones.push(SupportedConeT::ZeroConeT(self.grounds.len()));
        }
        if !self.diodes.is_empty() {
            cones.push(SupportedConeT::NonnegativeConeT(self.diodes.len()));
        }

        let mut builder = DefaultSettingsBuilder::default();
        builder
            .verbose(options.verbose)
            .max_iter(options.max_iterations);
        if let Some(limit) = options.time_limit {
            builder.time_limit(limit.as_secs_f64());
        }
        let settings = builder
            .build()
            .map_err(|e| SolveError::Settings(format!("{:?}", e)))?;

        let mut solver =
            clarabel::solver::DefaultSolver::new(&p_mat, &q, &a_mat, &b, &cones, settings)
                .map_err(|e| SolveError::Setup(format!("{:?}", e)))?;

        solver.solve();

        let sol = solver.solution;
        match sol.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => {}
            SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
                return Err(SolveError::Infeasible);
            }
            SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => {
                return Err(SolveError::Unbounded);
            }
            SolverStatus::MaxTime => {
                return Err(SolveError::TimedOut {
                    limit: options.time_limit.unwrap_or_default(),
                });
            }
            SolverStatus::MaxIterations => {
                return Err(SolveError::IterationLimit {
                    iterations: sol.iterations,
                });
            }
            other => return Err(SolveError::Numerical(format!("{:?}", other))),
        }

        let iterations = sol.iterations;
        let x = sol.x;
        let mut voltages = ComponentVoltages::new();
        let mut objective = 0.0;
        for resistor in &self.resistors {
            let gap = x[resistor.source] - x[resistor.drain];
            objective += 0.5 * resistor.conductance * gap * gap;
            voltages.resistors.push((resistor.id, gap));
        }
        for diode in &self.diodes {
            voltages.diodes.push((diode.id, x[diode.source] - x[diode.drain]));
        }
        for source in &self.sources {
            let gap = x[source.source] - x[source.drain];
            objective += source.injection * gap;
            voltages.sources.push((source.id, gap));
        }

        Ok(Solution {
            columns: self.columns.clone(),
            x,
            objective,
            iterations,
            solve_time_ms: start.elapsed().as_millis(),
            voltages,
        })
    }
}

/// Builds a CSC matrix from per-column entry lists. Entries hitting the
/// same row within a column are summed, so parallel resistors between
/// the same pair of nodes collapse into one coefficient.
fn csc_from_columns(rows: usize, columns: Vec<Vec<(usize, f64)>>) -> CscMatrix<f64> {
    let cols = columns.len();
    let mut col_ptr = Vec::with_capacity(cols + 1);
    let mut row_idx: Vec<usize> = Vec::new();
    let mut values: Vec<f64> = Vec::new();

    for mut column in columns {
        col_ptr.push(row_idx.len());
        column.sort_by_key(|&(row, _)| row);
        let start = row_idx.len();
        for (row, value) in column {
            let len = row_idx.len();
            if len > start && row_idx[len - 1] == row {
                values[len - 1] += value;
            } else {
                row_idx.push(row);
                values.push(value);
            }
        }
    }
    col_ptr.push(row_idx.len());

    CscMatrix::new(rows, cols, col_ptr, row_idx, values)
}

/// Solved potentials plus per-component voltage drops.
#[derive(Debug, Clone)]
pub struct Solution {
    columns: HashMap<VarId, usize>,
    x: Vec<f64>,
    objective: f64,
    iterations: u32,
    solve_time_ms: u128,
    voltages: ComponentVoltages,
}

impl Solution {
    /// Potential of a variable, or `None` if it was not part of the
    /// problem.
    pub fn potential(&self, var: VarId) -> Option<f64> {
        self.columns
            .get(&var)
            .and_then(|&column| self.x.get(column))
            .copied()
    }

    /// Potential difference `v_source - v_drain`.
    pub fn gap(&self, source: VarId, drain: VarId) -> Option<f64> {
        Some(self.potential(source)? - self.potential(drain)?)
    }

    /// Objective value recomputed from the returned potentials.
    pub fn objective(&self) -> f64 {
        self.objective
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn solve_time_ms(&self) -> u128 {
        self.solve_time_ms
    }

    pub fn voltages(&self) -> &ComponentVoltages {
        &self.voltages
    }

    pub fn into_voltages(self) -> ComponentVoltages {
        self.voltages
    }
}
