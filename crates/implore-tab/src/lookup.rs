//! Forward and inverse table lookups
//!
//! A [`Lookup`] is a read-only view of a derived table. It borrows the table
//! immutably, so any number of threads can run batches through the same
//! table at once; all scratch state lives in the call.
//!
//! # Batch layout
//!
//! A batch is `count` rows of `stride` interleaved values. Axis `m` reads
//! element `map[m]` of each input row and writes coordinate element `m` to
//! element `map[m]` of the output row. Other elements pass through.
//!
//! # Interpolation
//!
//! Each axis resolves its pixel offset `psi = x + crval` to a lower vertex
//! and a fraction by binary search in its index vector, then the `2^M`
//! surrounding coordinate vectors are blended multilinearly (FITS WCS
//! Paper IV, Sect. 3.4).

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::LookupConfig;
use crate::derive::Derived;
use crate::error::{TabError, TabResult};
use crate::table::TableTransform;

/// Slack for accepting a solution at a voxel face
const FACE_EPS: f64 = 1e-9;

/// Relative slack for the extrema and bounding-box tests
const BOX_EPS: f64 = 1e-10;

/// Relative singular-value floor below which a voxel is degenerate
const RANK_EPS: f64 = 1e-12;

/// Per-row outcome of a batch lookup
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "uniffi", derive(uniffi::Enum))]
pub enum RowStatus {
    #[default]
    Ok,
    /// Beyond the covered range; outputs hold a linear extrapolation
    OutOfRange,
    /// The table cannot be inverted around the target
    NotInvertibleLocally,
    /// A selected input element is not finite
    InvalidInput,
}

impl RowStatus {
    /// Integer status code
    pub fn code(&self) -> i32 {
        match self {
            RowStatus::Ok => 0,
            RowStatus::OutOfRange => 1,
            RowStatus::NotInvertibleLocally => 2,
            RowStatus::InvalidInput => 3,
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == RowStatus::Ok
    }
}

/// Counts of row outcomes for one batch
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub rows: usize,
    pub out_of_range: usize,
    pub not_invertible: usize,
    pub invalid_input: usize,
}

impl BatchSummary {
    pub fn from_statuses(status: &[RowStatus]) -> Self {
        let mut summary = Self {
            rows: status.len(),
            ..Self::default()
        };
        for st in status {
            match st {
                RowStatus::Ok => {}
                RowStatus::OutOfRange => summary.out_of_range += 1,
                RowStatus::NotInvertibleLocally => summary.not_invertible += 1,
                RowStatus::InvalidInput => summary.invalid_input += 1,
            }
        }
        summary
    }

    /// Rows that did not come back `Ok`
    pub fn failed(&self) -> usize {
        self.out_of_range + self.not_invertible + self.invalid_input
    }

    pub fn all_ok(&self) -> bool {
        self.failed() == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Forward,
    Inverse,
}

impl Direction {
    fn name(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Inverse => "inverse",
        }
    }
}

/// Outcome of solving for the fractional position inside one voxel
enum Solve {
    Converged,
    Singular,
    Diverged,
}

/// Per-call working storage, seeded from the derived offsets and fractions
#[derive(Clone, Debug)]
struct Scratch {
    p: Vec<usize>,
    delta: Vec<f64>,
    value: Vec<f64>,
    target: Vec<f64>,
    best_p: Vec<usize>,
    best_delta: Vec<f64>,
    jacobian: Vec<f64>,
}

impl Scratch {
    fn new(derived: &Derived) -> Self {
        let m_count = derived.offset.len();
        Self {
            p: derived.offset.clone(),
            delta: derived.delta.clone(),
            value: vec![0.0; m_count],
            target: vec![0.0; m_count],
            best_p: derived.offset.clone(),
            best_delta: derived.delta.clone(),
            jacobian: Vec::with_capacity(m_count * m_count),
        }
    }
}

/// Read-only lookup view of a derived table
#[derive(Clone, Copy, Debug)]
pub struct Lookup<'a> {
    table: &'a TableTransform,
    derived: &'a Derived,
}

impl TableTransform {
    /// Read-only view for lookups; fails if the table has not been derived.
    pub fn lookup(&self) -> TabResult<Lookup<'_>> {
        let derived = self.derived().ok_or(TabError::NotReady { field: "state" })?;
        Ok(Lookup {
            table: self,
            derived,
        })
    }

    /// Map intermediate coordinates to world coordinates, deriving first if
    /// needed.
    pub fn forward(
        &mut self,
        count: usize,
        stride: usize,
        input: &[f64],
        output: &mut [f64],
        status: &mut [RowStatus],
    ) -> TabResult<BatchSummary> {
        self.derive()?;
        let result = self
            .lookup()
            .and_then(|lookup| lookup.forward(count, stride, input, output, status));
        self.settle(result)
    }

    /// Map world coordinates back to intermediate coordinates, deriving first
    /// if needed.
    pub fn inverse(
        &mut self,
        count: usize,
        stride: usize,
        world: &[f64],
        output: &mut [f64],
        status: &mut [RowStatus],
    ) -> TabResult<BatchSummary> {
        self.derive()?;
        let result = self
            .lookup()
            .and_then(|lookup| lookup.inverse(count, stride, world, output, status));
        self.settle(result)
    }

    fn settle(&mut self, result: TabResult<BatchSummary>) -> TabResult<BatchSummary> {
        match result {
            Ok(summary) => {
                self.last_error = None;
                Ok(summary)
            }
            Err(err) => self.fail(err),
        }
    }
}

impl<'a> Lookup<'a> {
    pub fn table(&self) -> &'a TableTransform {
        self.table
    }

    pub fn derived(&self) -> &'a Derived {
        self.derived
    }

    fn config(&self) -> &LookupConfig {
        &self.table.config
    }

    fn axis_count(&self) -> usize {
        self.table.k.len()
    }

    /// Forward batch: intermediate → world
    pub fn forward(
        &self,
        count: usize,
        stride: usize,
        input: &[f64],
        output: &mut [f64],
        status: &mut [RowStatus],
    ) -> TabResult<BatchSummary> {
        self.run(Direction::Forward, count, stride, input, output, status)
    }

    /// Inverse batch: world → intermediate
    pub fn inverse(
        &self,
        count: usize,
        stride: usize,
        world: &[f64],
        output: &mut [f64],
        status: &mut [RowStatus],
    ) -> TabResult<BatchSummary> {
        self.run(Direction::Inverse, count, stride, world, output, status)
    }

    /// Forward batch with rows spread over the rayon pool
    #[cfg(feature = "parallel")]
    pub fn par_forward(
        &self,
        count: usize,
        stride: usize,
        input: &[f64],
        output: &mut [f64],
        status: &mut [RowStatus],
    ) -> TabResult<BatchSummary> {
        self.par_run(Direction::Forward, count, stride, input, output, status)
    }

    /// Inverse batch with rows spread over the rayon pool
    #[cfg(feature = "parallel")]
    pub fn par_inverse(
        &self,
        count: usize,
        stride: usize,
        world: &[f64],
        output: &mut [f64],
        status: &mut [RowStatus],
    ) -> TabResult<BatchSummary> {
        self.par_run(Direction::Inverse, count, stride, world, output, status)
    }

    fn check_batch(
        &self,
        count: usize,
        stride: usize,
        input: &[f64],
        output: &[f64],
        status: &[RowStatus],
    ) -> TabResult<()> {
        if let Some(&max) = self.table.map.iter().max() {
            if max >= stride {
                return Err(TabError::shape(
                    "stride",
                    format!("stride {} does not reach assigned element {}", stride, max),
                ));
            }
        }

        let needed = count
            .checked_mul(stride)
            .ok_or_else(|| TabError::shape("stride", "batch size overflows"))?;
        if input.len() < needed {
            return Err(TabError::shape(
                "input",
                format!("{} values for {} rows of {}", input.len(), count, stride),
            ));
        }
        if output.len() < needed {
            return Err(TabError::shape(
                "output",
                format!("{} values for {} rows of {}", output.len(), count, stride),
            ));
        }
        if status.len() < count {
            return Err(TabError::shape(
                "status",
                format!("{} entries for {} rows", status.len(), count),
            ));
        }
        Ok(())
    }

    fn run(
        &self,
        direction: Direction,
        count: usize,
        stride: usize,
        input: &[f64],
        output: &mut [f64],
        status: &mut [RowStatus],
    ) -> TabResult<BatchSummary> {
        if count == 0 {
            return Ok(BatchSummary::default());
        }
        self.check_batch(count, stride, input, output, status)?;

        let status = &mut status[..count];
        if stride == 0 {
            // Only reachable with no axes: every row is empty.
            status.fill(RowStatus::Ok);
        } else {
            let n = count * stride;
            let mut scratch = Scratch::new(self.derived);
            for ((row_in, row_out), st) in input[..n]
                .chunks(stride)
                .zip(output[..n].chunks_mut(stride))
                .zip(status.iter_mut())
            {
                *st = self.row(direction, row_in, row_out, &mut scratch);
            }
        }

        Ok(self.summarize(direction, status))
    }

    #[cfg(feature = "parallel")]
    fn par_run(
        &self,
        direction: Direction,
        count: usize,
        stride: usize,
        input: &[f64],
        output: &mut [f64],
        status: &mut [RowStatus],
    ) -> TabResult<BatchSummary> {
        if count == 0 {
            return Ok(BatchSummary::default());
        }
        self.check_batch(count, stride, input, output, status)?;

        let status = &mut status[..count];
        if stride == 0 {
            status.fill(RowStatus::Ok);
        } else {
            let n = count * stride;
            input[..n]
                .par_chunks(stride)
                .zip(output[..n].par_chunks_mut(stride))
                .zip(status.par_iter_mut())
                .for_each_init(
                    || Scratch::new(self.derived),
                    |scratch, ((row_in, row_out), st)| {
                        *st = self.row(direction, row_in, row_out, scratch);
                    },
                );
        }

        Ok(self.summarize(direction, status))
    }

    fn summarize(&self, direction: Direction, status: &[RowStatus]) -> BatchSummary {
        let summary = BatchSummary::from_statuses(status);
        if summary.all_ok() {
            tracing::trace!("{} batch: {} rows", direction.name(), summary.rows);
        } else {
            tracing::debug!(
                "{} batch: {} of {} rows failed ({} out of range, {} not invertible, {} invalid)",
                direction.name(),
                summary.failed(),
                summary.rows,
                summary.out_of_range,
                summary.not_invertible,
                summary.invalid_input
            );
        }
        summary
    }

    fn row(
        &self,
        direction: Direction,
        row_in: &[f64],
        row_out: &mut [f64],
        scratch: &mut Scratch,
    ) -> RowStatus {
        row_out.copy_from_slice(row_in);
        if self.axis_count() == 0 {
            return RowStatus::Ok;
        }

        let map = &self.table.map;
        if map.iter().any(|&i| !row_in[i].is_finite()) {
            for &i in map {
                row_out[i] = f64::NAN;
            }
            return RowStatus::InvalidInput;
        }

        match direction {
            Direction::Forward => self.forward_row(row_in, row_out, scratch),
            Direction::Inverse => self.inverse_row(row_in, row_out, scratch),
        }
    }

    // --- Forward ---

    fn forward_row(&self, x: &[f64], out: &mut [f64], scratch: &mut Scratch) -> RowStatus {
        let table = self.table;
        let mut in_range = true;
        for m in 0..self.axis_count() {
            let psi = x[table.map[m]] + table.crval[m];
            let (p, delta, covered) = self.locate(m, psi, scratch.p[m]);
            scratch.p[m] = p;
            scratch.delta[m] = delta;
            in_range &= covered;
        }

        self.interpolate(&scratch.p, &scratch.delta, &mut scratch.value);
        for (m, &i) in table.map.iter().enumerate() {
            out[i] = scratch.value[m];
        }

        if in_range {
            RowStatus::Ok
        } else {
            RowStatus::OutOfRange
        }
    }

    /// Lower vertex, fraction and coverage of `psi` on axis `m`.
    ///
    /// The cell at `hint` (the previous row's vertex, seeded from the derived
    /// offsets) is tried first; the binary search only runs when `psi` has
    /// left it. Outside the index vector the fraction extrapolates linearly
    /// from the nearest pair of entries.
    fn locate(&self, m: usize, psi: f64, hint: usize) -> (usize, f64, bool) {
        let index = &self.table.index[m];
        let k = index.len();
        let ext = self.config().extrapolation;

        if k == 1 {
            return (0, 0.0, (psi - index[0]).abs() <= ext);
        }

        let lo = if self.brackets(m, hint, psi) {
            hint
        } else {
            let below = if self.derived.sense[m] > 0 {
                index.partition_point(|&v| v <= psi)
            } else {
                index.partition_point(|&v| v >= psi)
            };
            below.saturating_sub(1).min(k - 2)
        };
        let upsilon = lo as f64 + (psi - index[lo]) / (index[lo + 1] - index[lo]);
        let covered = upsilon >= -ext && upsilon <= (k - 1) as f64 + ext;

        (lo, upsilon - lo as f64, covered)
    }

    /// Whether cell `lo` of axis `m` holds `psi`, half-open in the sense
    /// direction so the answer agrees with the binary search
    fn brackets(&self, m: usize, lo: usize, psi: f64) -> bool {
        let index = &self.table.index[m];
        if lo + 1 >= index.len() {
            return false;
        }
        if self.derived.sense[m] > 0 {
            index[lo] <= psi && psi < index[lo + 1]
        } else {
            index[lo] >= psi && psi > index[lo + 1]
        }
    }

    /// Offset of the coordinate vector at vertex `iv` of the voxel at `p`
    fn vertex_offset(&self, p: &[usize], iv: usize) -> usize {
        let k = &self.table.k;
        let mut offset = 0;
        for m in (0..k.len()).rev() {
            offset = offset * k[m] + p[m];
            if iv & (1 << m) != 0 && k[m] > 1 {
                offset += 1;
            }
        }
        offset * k.len()
    }

    fn interpolate(&self, p: &[usize], delta: &[f64], value: &mut [f64]) {
        let m_count = self.axis_count();
        let coord = &self.table.coord;
        value.fill(0.0);

        for iv in 0..(1usize << m_count) {
            let wgt: f64 = (0..m_count)
                .map(|m| {
                    if iv & (1 << m) != 0 {
                        delta[m]
                    } else {
                        1.0 - delta[m]
                    }
                })
                .product();
            if wgt == 0.0 {
                continue;
            }

            let base = self.vertex_offset(p, iv);
            for (j, v) in value.iter_mut().enumerate() {
                *v += coord[base + j] * wgt;
            }
        }
    }

    // --- Inverse ---

    fn inverse_row(&self, w: &[f64], out: &mut [f64], scratch: &mut Scratch) -> RowStatus {
        let table = self.table;
        for (m, &i) in table.map.iter().enumerate() {
            scratch.target[m] = w[i];
        }

        let status = self.search(scratch);
        match status {
            RowStatus::Ok | RowStatus::OutOfRange if scratch.best_delta[0].is_finite() => {
                for m in 0..self.axis_count() {
                    let psi = self.index_value(m, scratch.best_p[m], scratch.best_delta[m]);
                    out[table.map[m]] = psi - table.crval[m];
                }
            }
            _ => {
                for &i in &table.map {
                    out[i] = f64::NAN;
                }
            }
        }
        status
    }

    /// Index-vector value at fraction `delta` above vertex `p` of axis `m`
    fn index_value(&self, m: usize, p: usize, delta: f64) -> f64 {
        let index = &self.table.index[m];
        if index.len() == 1 {
            index[0]
        } else {
            index[p] + delta * (index[p + 1] - index[p])
        }
    }

    /// Number of voxels along each axis
    fn cells(&self, m: usize) -> usize {
        self.table.k[m].saturating_sub(1).max(1)
    }

    /// Locate `scratch.target`, leaving the answer in `best_p`/`best_delta`
    /// (NaN fractions when there is none).
    fn search(&self, scratch: &mut Scratch) -> RowStatus {
        let m_count = self.axis_count();
        let rows: usize = (1..m_count).map(|m| self.cells(m)).product();
        let mut saw_singular = false;

        // Voxels whose bounding box holds the target.
        for row in 0..rows {
            self.decode_row(row, &mut scratch.p);
            if !self.row_may_contain(&scratch.p, &scratch.target) {
                continue;
            }
            for p0 in 0..self.cells(0) {
                scratch.p[0] = p0;
                if !self.voxel_may_contain(&scratch.p, &scratch.target) {
                    continue;
                }
                match self.solve(scratch) {
                    Solve::Converged if self.within(&scratch.p, &scratch.delta, 0.0) => {
                        self.keep(scratch);
                        return RowStatus::Ok;
                    }
                    Solve::Singular => saw_singular = true,
                    _ => {}
                }
            }
        }

        if saw_singular {
            scratch.best_delta.fill(f64::NAN);
            return RowStatus::NotInvertibleLocally;
        }

        // Nothing contains the target: extrapolate from the edge voxels.
        let ext = self.config().extrapolation;
        let mut best_excess = f64::INFINITY;
        for row in 0..rows {
            self.decode_row(row, &mut scratch.p);
            for p0 in 0..self.cells(0) {
                scratch.p[0] = p0;
                if !self.is_edge(&scratch.p) {
                    continue;
                }
                if let Solve::Converged = self.solve(scratch) {
                    if let Some(excess) = self.excess(&scratch.p, &scratch.delta) {
                        if excess <= ext {
                            self.keep(scratch);
                            return RowStatus::Ok;
                        }
                        if excess < best_excess {
                            best_excess = excess;
                            self.keep(scratch);
                        }
                    }
                }
            }
        }

        if best_excess.is_infinite() {
            scratch.best_delta.fill(f64::NAN);
        }
        RowStatus::OutOfRange
    }

    fn keep(&self, scratch: &mut Scratch) {
        scratch.best_p.copy_from_slice(&scratch.p);
        scratch.best_delta.copy_from_slice(&scratch.delta);
    }

    /// Outer-axis vertex indices of voxel row `row`, axis 1 fastest
    fn decode_row(&self, mut row: usize, p: &mut [usize]) {
        for m in 1..self.axis_count() {
            let cells = self.cells(m);
            p[m] = row % cells;
            row /= cells;
        }
    }

    /// Test the target against the extrema of the outer rows spanned by the
    /// voxel row at `p`.
    fn row_may_contain(&self, p: &[usize], target: &[f64]) -> bool {
        let k = &self.table.k;
        let m_count = k.len();
        let extrema = &self.derived.extrema;

        for (j, &t) in target.iter().enumerate() {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;
            for corner in 0..(1usize << (m_count - 1)) {
                let mut outer = 0;
                for m in (1..m_count).rev() {
                    outer = outer * k[m] + p[m];
                    if corner & (1 << (m - 1)) != 0 && k[m] > 1 {
                        outer += 1;
                    }
                }
                lo = lo.min(extrema[[outer, 0, j]]);
                hi = hi.max(extrema[[outer, 1, j]]);
            }
            if !contains(lo, hi, t) {
                return false;
            }
        }
        true
    }

    fn voxel_may_contain(&self, p: &[usize], target: &[f64]) -> bool {
        let m_count = self.axis_count();
        let coord = &self.table.coord;

        target.iter().enumerate().all(|(j, &t)| {
            let (lo, hi) = (0..(1usize << m_count))
                .map(|iv| coord[self.vertex_offset(p, iv) + j])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
                    (lo.min(c), hi.max(c))
                });
            contains(lo, hi, t)
        })
    }

    fn is_edge(&self, p: &[usize]) -> bool {
        (0..self.axis_count())
            .filter(|&m| self.table.k[m] > 1)
            .any(|m| p[m] == 0 || p[m] + 1 == self.cells(m))
    }

    /// Whether each fraction lies inside the voxel, widened by `ext` cells
    /// on faces that lie on the table edge.
    fn within(&self, p: &[usize], delta: &[f64], ext: f64) -> bool {
        self.excess(p, delta).is_some_and(|excess| excess <= ext)
    }

    /// How far, in cells, the fractions reach past the table edge. `None`
    /// if they leave the voxel through an interior face.
    fn excess(&self, p: &[usize], delta: &[f64]) -> Option<f64> {
        let mut worst = 0.0f64;
        for m in 0..self.axis_count() {
            if self.table.k[m] == 1 {
                continue;
            }
            let d = delta[m];
            if d < -FACE_EPS {
                if p[m] != 0 {
                    return None;
                }
                worst = worst.max(-d);
            } else if d > 1.0 + FACE_EPS {
                if p[m] + 1 != self.cells(m) {
                    return None;
                }
                worst = worst.max(d - 1.0);
            }
        }
        Some(worst)
    }

    /// Gauss-Newton solve for the fractions placing the interpolant on the
    /// target inside voxel `scratch.p`.
    fn solve(&self, scratch: &mut Scratch) -> Solve {
        let m_count = self.axis_count();
        let k = &self.table.k;
        let free: Vec<usize> = (0..m_count).filter(|&m| k[m] > 1).collect();

        for m in 0..m_count {
            scratch.delta[m] = if k[m] > 1 { 0.5 } else { 0.0 };
        }

        let scale = 1.0 + scratch.target.iter().fold(0.0f64, |a, t| a.max(t.abs()));
        let tolerance = self.config().inverse_tolerance * scale;

        for _ in 0..=self.config().max_iterations {
            self.interpolate(&scratch.p, &scratch.delta, &mut scratch.value);
            let residual = DVector::from_iterator(
                m_count,
                scratch
                    .target
                    .iter()
                    .zip(&scratch.value)
                    .map(|(t, v)| t - v),
            );
            if free.is_empty() {
                return if residual.amax() <= tolerance {
                    Solve::Converged
                } else {
                    Solve::Diverged
                };
            }

            // A hit in a degenerate voxel is not a unique answer.
            self.jacobian(&scratch.p, &scratch.delta, &free, &mut scratch.jacobian);
            let jacobian = DMatrix::from_row_slice(m_count, free.len(), &scratch.jacobian);
            let svd = jacobian.svd(true, true);
            let max_sv = svd.singular_values.max();
            if max_sv == 0.0 || svd.singular_values.min() <= max_sv * RANK_EPS {
                return Solve::Singular;
            }
            if residual.amax() <= tolerance {
                return Solve::Converged;
            }
            let step = match svd.solve(&residual, max_sv * RANK_EPS) {
                Ok(step) => step,
                Err(_) => return Solve::Singular,
            };
            for (c, &m) in free.iter().enumerate() {
                scratch.delta[m] += step[c];
            }
            if !scratch.delta.iter().all(|d| d.is_finite()) {
                return Solve::Diverged;
            }
        }
        Solve::Diverged
    }

    /// Row-major `M x free.len()` derivative of the interpolant with respect
    /// to the free fractions.
    fn jacobian(&self, p: &[usize], delta: &[f64], free: &[usize], out: &mut Vec<f64>) {
        let m_count = self.axis_count();
        let coord = &self.table.coord;
        out.clear();
        out.resize(m_count * free.len(), 0.0);

        for iv in 0..(1usize << m_count) {
            let base = self.vertex_offset(p, iv);
            for (c, &m) in free.iter().enumerate() {
                let mut dw = if iv & (1 << m) != 0 { 1.0 } else { -1.0 };
                for n in (0..m_count).filter(|&n| n != m) {
                    dw *= if iv & (1 << n) != 0 {
                        delta[n]
                    } else {
                        1.0 - delta[n]
                    };
                }
                if dw == 0.0 {
                    continue;
                }
                for j in 0..m_count {
                    out[j * free.len() + c] += coord[base + j] * dw;
                }
            }
        }
    }
}

fn contains(lo: f64, hi: f64, t: f64) -> bool {
    let slack = BOX_EPS * (1.0 + lo.abs().max(hi.abs()));
    lo - slack <= t && t <= hi + slack
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_1d() -> TableTransform {
        let mut tab = TableTransform::initialize(1, &[4]).unwrap();
        tab.set_coordinate_array(vec![10.0, 20.0, 30.0, 40.0]);
        tab
    }

    #[test]
    fn test_forward_1d() {
        let mut tab = table_1d();
        let input = [2.5, 1.0, 4.0, 10.0];
        let mut output = [0.0; 4];
        let mut status = [RowStatus::Ok; 4];
        let summary = tab.forward(4, 1, &input, &mut output, &mut status).unwrap();

        assert_eq!(output[0], 25.0);
        assert_eq!(output[1], 10.0);
        assert_eq!(output[2], 40.0);
        assert_eq!(status[..3], [RowStatus::Ok; 3]);
        assert_eq!(status[3], RowStatus::OutOfRange);
        // Linear extrapolation from the last pair of entries.
        assert_eq!(output[3], 100.0);
        assert_eq!(summary.out_of_range, 1);
    }

    #[test]
    fn test_forward_half_cell_allowance() {
        let mut tab = table_1d();
        let input = [0.5, 4.5, 0.49, 4.51];
        let mut output = [0.0; 4];
        let mut status = [RowStatus::Ok; 4];
        tab.forward(4, 1, &input, &mut output, &mut status).unwrap();

        assert_eq!(status, [
            RowStatus::Ok,
            RowStatus::Ok,
            RowStatus::OutOfRange,
            RowStatus::OutOfRange
        ]);
        assert!((output[0] - 5.0).abs() < 1e-12);
        assert!((output[1] - 45.0).abs() < 1e-12);
    }

    #[test]
    fn test_forward_decreasing_index() {
        let mut tab = table_1d();
        tab.set_index_vector(0, vec![4.0, 3.0, 2.0, 1.0]).unwrap();
        let mut output = [0.0];
        let mut status = [RowStatus::Ok];
        tab.forward(1, 1, &[1.5], &mut output, &mut status).unwrap();
        assert!(status[0].is_ok());
        assert!((output[0] - 35.0).abs() < 1e-12);
    }

    #[test]
    fn test_forward_reuses_previous_cell() {
        // Nearby rows, cell boundaries and jumps in both orientations must
        // match rows looked up on their own.
        let input = [2.2, 2.4, 2.0, 3.0, 3.999, 4.0, 1.0, 0.6, 2.6, 2.6];
        for index in [vec![1.0, 2.0, 3.0, 4.0], vec![4.0, 3.0, 2.0, 1.0]] {
            let mut tab = table_1d();
            tab.set_index_vector(0, index).unwrap();
            let mut batch = [0.0; 10];
            let mut status = [RowStatus::Ok; 10];
            tab.forward(10, 1, &input, &mut batch, &mut status).unwrap();

            for (x, y) in input.iter().zip(&batch) {
                let mut single = [0.0];
                let mut one = [RowStatus::Ok];
                tab.forward(1, 1, &[*x], &mut single, &mut one).unwrap();
                assert_eq!(single[0].to_bits(), y.to_bits(), "x = {}", x);
            }
        }
    }

    #[test]
    fn test_locate_hint_outside_cell() {
        let mut tab = table_1d();
        tab.derive().unwrap();
        let lookup = tab.lookup().unwrap();
        // A stale hint falls back to the search.
        assert_eq!(lookup.locate(0, 3.5, 0), (2, 0.5, true));
        assert_eq!(lookup.locate(0, 1.5, 2), (0, 0.5, true));
        // A hint past the last cell is ignored.
        assert_eq!(lookup.locate(0, 3.5, 3), (2, 0.5, true));
        assert_eq!(lookup.locate(0, 3.5, 2), (2, 0.5, true));
    }

    #[test]
    fn test_inverse_1d() {
        let mut tab = table_1d();
        let world = [25.0, 10.0, 40.0, 44.0, 1000.0];
        let mut output = [0.0; 5];
        let mut status = [RowStatus::Ok; 5];
        tab.inverse(5, 1, &world, &mut output, &mut status).unwrap();

        assert!((output[0] - 2.5).abs() < 1e-10);
        assert!((output[1] - 1.0).abs() < 1e-10);
        assert!((output[2] - 4.0).abs() < 1e-10);
        // Inside the half-cell allowance.
        assert!(status[3].is_ok());
        assert!((output[3] - 4.4).abs() < 1e-10);
        // Far beyond: extrapolated but flagged.
        assert_eq!(status[4], RowStatus::OutOfRange);
        assert!((output[4] - 100.0).abs() < 1e-8);
    }

    #[test]
    fn test_inverse_plateau() {
        let mut tab = table_1d();
        tab.set_coordinate_array(vec![10.0, 20.0, 20.0, 40.0]);
        let world = [20.0, 15.0];
        let mut output = [0.0; 2];
        let mut status = [RowStatus::Ok; 2];
        tab.inverse(2, 1, &world, &mut output, &mut status).unwrap();

        // 20 lies on both neighbours of the flat cell and is found at a vertex.
        assert!(status[0].is_ok());
        assert!(status[1].is_ok());
        assert!((output[1] - 1.5).abs() < 1e-10);
    }

    #[test]
    fn test_inverse_flat_table_not_invertible() {
        let mut tab = TableTransform::initialize(1, &[3]).unwrap();
        tab.set_coordinate_array(vec![5.0, 5.0, 5.0]);
        let mut output = [0.0];
        let mut status = [RowStatus::Ok];
        tab.inverse(1, 1, &[5.0], &mut output, &mut status).unwrap();
        assert_eq!(status[0], RowStatus::NotInvertibleLocally);
        assert!(output[0].is_nan());
    }

    #[test]
    fn test_invalid_input_row() {
        let mut tab = table_1d();
        let input = [f64::NAN, 2.0];
        let mut output = [0.0; 2];
        let mut status = [RowStatus::Ok; 2];
        let summary = tab.forward(2, 1, &input, &mut output, &mut status).unwrap();
        assert_eq!(status[0], RowStatus::InvalidInput);
        assert!(output[0].is_nan());
        assert_eq!(output[1], 20.0);
        assert_eq!(summary.invalid_input, 1);
    }

    #[test]
    fn test_stride_passthrough() {
        let mut tab = table_1d();
        tab.set_index_assignment(0, 1).unwrap();
        let input = [7.0, 3.0, 9.0, -1.0, 2.0, 8.0];
        let mut output = [0.0; 6];
        let mut status = [RowStatus::Ok; 2];
        tab.forward(2, 3, &input, &mut output, &mut status).unwrap();
        assert_eq!(output, [7.0, 30.0, 9.0, -1.0, 20.0, 8.0]);
    }

    #[test]
    fn test_batch_shape_errors() {
        let mut tab = table_1d();
        tab.set_index_assignment(0, 2).unwrap();
        let mut output = [0.0; 4];
        let mut status = [RowStatus::Ok; 2];
        let err = tab
            .forward(2, 2, &[1.0; 4], &mut output, &mut status)
            .unwrap_err();
        assert!(matches!(err, TabError::Shape { .. }));
        assert!(tab.last_error().is_some());

        tab.set_index_assignment(0, 0).unwrap();
        assert!(tab.forward(3, 1, &[1.0; 2], &mut output, &mut status).is_err());
        assert!(tab.forward(3, 1, &[1.0; 3], &mut output, &mut status).is_err());
    }

    #[test]
    fn test_zero_rows() {
        let mut tab = table_1d();
        let summary = tab.forward(0, 1, &[], &mut [], &mut []).unwrap();
        assert_eq!(summary.rows, 0);
        assert!(tab.is_set());
    }

    #[test]
    fn test_identity_without_axes() {
        let mut tab = TableTransform::initialize(0, &[]).unwrap();
        let input = [1.0, 2.0, 3.0, 4.0];
        let mut output = [0.0; 4];
        let mut status = [RowStatus::OutOfRange; 2];
        tab.forward(2, 2, &input, &mut output, &mut status).unwrap();
        assert_eq!(output, input);
        assert!(status.iter().all(|s| s.is_ok()));
    }

    #[test]
    fn test_lookup_requires_derive() {
        let tab = table_1d();
        assert_eq!(
            tab.lookup().unwrap_err(),
            TabError::NotReady { field: "state" }
        );
    }

    #[test]
    fn test_reference_value_offsets() {
        let mut tab = table_1d();
        tab.set_reference_value(0, 1.0).unwrap();
        let mut output = [0.0];
        let mut status = [RowStatus::Ok];
        tab.forward(1, 1, &[1.5], &mut output, &mut status).unwrap();
        assert!((output[0] - 25.0).abs() < 1e-12);

        tab.inverse(1, 1, &[25.0], &mut output, &mut status).unwrap();
        assert!((output[0] - 1.5).abs() < 1e-10);
    }

    #[test]
    fn test_degenerate_axis() {
        // Axis 1 has a single entry and contributes a constant.
        let mut tab = TableTransform::initialize(2, &[3, 1]).unwrap();
        tab.set_coordinate_array(vec![0.0, 7.0, 10.0, 7.0, 20.0, 7.0]);
        tab.set_index_vector(1, vec![2.0]).unwrap();

        let input = [2.5, 2.0, 2.5, 9.0];
        let mut output = [0.0; 4];
        let mut status = [RowStatus::Ok; 2];
        tab.forward(2, 2, &input, &mut output, &mut status).unwrap();
        assert_eq!(status[0], RowStatus::Ok);
        assert!((output[0] - 15.0).abs() < 1e-12);
        assert_eq!(output[1], 7.0);
        assert_eq!(status[1], RowStatus::OutOfRange);

        tab.inverse(1, 2, &[15.0, 7.0], &mut output[..2], &mut status[..1])
            .unwrap();
        assert!(status[0].is_ok());
        assert!((output[0] - 2.5).abs() < 1e-10);
        assert_eq!(output[1], 2.0);
    }

    #[test]
    fn test_summary_counts() {
        let summary = BatchSummary::from_statuses(&[
            RowStatus::Ok,
            RowStatus::OutOfRange,
            RowStatus::NotInvertibleLocally,
            RowStatus::InvalidInput,
        ]);
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.failed(), 3);
        assert!(!summary.all_ok());
    }
}
