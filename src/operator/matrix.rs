use crate::core::traits::{InfluenceOperator, MatVec, Real};
use crate::integrator::BoundaryIntegrator;
use crate::surface::SurfaceContainer;
use log::{debug, warn};
use rayon::prelude::*;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::OnceLock;

/// Source columns per device batch.
const BATCH_COLUMNS: usize = 256;

/// Write-once entry cells. A row is allocated the first time one of its
/// entries is requested.
struct EntryCache {
    n: usize,
    rows: Vec<OnceLock<Box<[OnceLock<f64>]>>>,
}

impl EntryCache {
    fn new(n: usize) -> Self {
        EntryCache { n, rows: (0..n).map(|_| OnceLock::new()).collect() }
    }

    fn get_or_init(&self, i: usize, j: usize, evaluate: impl FnOnce() -> f64) -> f64 {
        let row = self.rows[i].get_or_init(|| (0..self.n).map(|_| OnceLock::new()).collect());
        *row[j].get_or_init(evaluate)
    }

    fn allocated_rows(&self) -> usize {
        self.rows.iter().filter(|r| r.get().is_some()).count()
    }

    fn filled(&self) -> usize {
        self.rows
            .iter()
            .filter_map(OnceLock::get)
            .map(|row| row.iter().filter(|cell| cell.get().is_some()).count())
            .sum()
    }
}

/// Influence matrix of a surface container under a given integrator.
///
/// Entries are evaluated in `f64` and rounded to `T`. With caching enabled
/// every entry is evaluated at most once; cells are write-once, so a cached
/// value is bit-identical to the value a fresh evaluation returns.
pub struct BoundaryIntegralMatrix<'a, T> {
    container: &'a SurfaceContainer,
    integrator: &'a dyn BoundaryIntegrator,
    cache: Option<EntryCache>,
    _scalar: PhantomData<T>,
}

impl<'a, T: Real> BoundaryIntegralMatrix<'a, T> {
    pub fn new(container: &'a SurfaceContainer, integrator: &'a dyn BoundaryIntegrator, cache: bool) -> Self {
        let n = container.dimension();
        let cache = cache.then(|| {
            debug!("entry cache for {n} rows, allocated on first use");
            EntryCache::new(n)
        });
        BoundaryIntegralMatrix { container, integrator, cache, _scalar: PhantomData }
    }

    pub fn container(&self) -> &'a SurfaceContainer {
        self.container
    }

    pub fn integrator(&self) -> &'a dyn BoundaryIntegrator {
        self.integrator
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Rows of the cache allocated so far.
    pub fn cached_rows(&self) -> usize {
        self.cache.as_ref().map_or(0, EntryCache::allocated_rows)
    }

    /// Number of cache cells filled so far.
    pub fn cached_entries(&self) -> usize {
        self.cache.as_ref().map_or(0, EntryCache::filled)
    }

    /// Uncached entry in full precision.
    pub fn evaluate(&self, i: usize, j: usize) -> f64 {
        let (target, _) = self.container.locate(i);
        let (source, _) = self.container.locate(j);
        self.integrator
            .boundary_integral(self.container.element(source), self.container.element(target), source == target)
    }

    fn uses_batches(&self) -> bool {
        self.cache.is_none() && self.integrator.prefers_batches()
    }

    /// Rows `rows` of `A·x` from column blocks evaluated by the integrator.
    /// Falls back to entry evaluation when the device fails.
    fn batched_rows(&self, rows: Range<usize>, x: &[T], y: &mut [T]) {
        let n = self.container.dimension();
        let elements = self.container.elements();
        let targets: Vec<usize> = rows.clone().map(|i| self.container.locate(i).0).collect();
        let mut acc = vec![0.0f64; rows.len()];
        let columns: Vec<usize> = (0..n).collect();
        for chunk in columns.chunks(BATCH_COLUMNS) {
            let sources: Vec<usize> = chunk.iter().map(|&j| self.container.locate(j).0).collect();
            match self.integrator.influence_block(elements, &sources, &targets) {
                Ok(block) => {
                    acc.par_iter_mut().zip(block.par_chunks(chunk.len())).for_each(|(a, row)| {
                        *a += row.iter().zip(chunk).map(|(v, &j)| v * x[j].to_f64_lossy()).sum::<f64>();
                    });
                }
                Err(e) => {
                    warn!("batched evaluation failed ({e}); evaluating columns {}..{} entry by entry", chunk[0], chunk[0] + chunk.len());
                    acc.par_iter_mut().zip(rows.clone().into_par_iter()).for_each(|(a, i)| {
                        *a += chunk.iter().map(|&j| self.evaluate(i, j) * x[j].to_f64_lossy()).sum::<f64>();
                    });
                }
            }
        }
        for (yi, a) in y.iter_mut().zip(acc) {
            *yi = T::from_f64_lossy(a);
        }
    }
}

impl<T: Real> MatVec<[T]> for BoundaryIntegralMatrix<'_, T> {
    fn matvec(&self, x: &[T], y: &mut [T]) {
        let n = self.container.dimension();
        self.matvec_rows(0..n, x, y);
    }
}

impl<T: Real> InfluenceOperator<T> for BoundaryIntegralMatrix<'_, T> {
    fn dimension(&self) -> usize {
        self.container.dimension()
    }

    fn entry(&self, i: usize, j: usize) -> T {
        T::from_f64_lossy(self.entry_f64(i, j))
    }

    /// Entry in full precision, through the cache when enabled.
    fn entry_f64(&self, i: usize, j: usize) -> f64 {
        let n = self.container.dimension();
        assert!(i < n && j < n, "entry ({i}, {j}) out of range for dimension {n}");
        match &self.cache {
            Some(cache) => cache.get_or_init(i, j, || self.evaluate(i, j)),
            None => self.evaluate(i, j),
        }
    }

    fn matvec_rows(&self, rows: Range<usize>, x: &[T], y: &mut [T])
    where
        T: Real,
    {
        let n = self.container.dimension();
        assert_eq!(x.len(), n, "input vector has incorrect length");
        assert_eq!(y.len(), rows.len(), "output vector has incorrect length");
        if self.uses_batches() {
            return self.batched_rows(rows, x, y);
        }
        y.par_iter_mut().zip(rows.into_par_iter()).for_each(|(yi, i)| {
            *yi = (0..n).map(|j| self.entry(i, j) * x[j]).sum();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::AnalyticIntegrator;
    use crate::surface::generators::icosphere;
    use crate::surface::{BoundaryElement, Point3};

    fn sphere() -> SurfaceContainer {
        icosphere(1.0, 1, Point3::zeros()).into_iter().map(|t| BoundaryElement::dirichlet(t, 1.0)).collect()
    }

    #[test]
    fn cache_is_bit_identical() {
        let c = sphere();
        let integ = AnalyticIntegrator::new();
        let cached = BoundaryIntegralMatrix::<f64>::new(&c, &integ, true);
        let plain = BoundaryIntegralMatrix::<f64>::new(&c, &integ, false);
        assert_eq!(cached.dimension(), 80);
        for (i, j) in [(0, 0), (3, 17), (79, 2)] {
            let first = cached.entry(i, j);
            assert_eq!(first.to_bits(), cached.entry(i, j).to_bits());
            assert_eq!(first.to_bits(), plain.entry(i, j).to_bits());
        }
        assert_eq!(cached.cached_entries(), 3);
    }

    #[test]
    fn cache_rows_are_allocated_on_first_touch() {
        let c = sphere();
        let integ = AnalyticIntegrator::new();
        let cached = BoundaryIntegralMatrix::<f64>::new(&c, &integ, true);
        assert_eq!(cached.cached_rows(), 0);
        cached.entry(4, 0);
        cached.entry(4, 79);
        cached.entry(60, 4);
        assert_eq!(cached.cached_rows(), 2);
        assert_eq!(cached.cached_entries(), 3);
        let mut y = vec![0.0; 5];
        cached.matvec_rows(10..15, &[1.0; 80], &mut y);
        assert_eq!(cached.cached_rows(), 7);
        assert_eq!(cached.cached_entries(), 3 + 5 * 80);
    }

    #[test]
    fn single_precision_operator_keeps_double_entries() {
        let c = sphere();
        let integ = AnalyticIntegrator::new();
        let single = BoundaryIntegralMatrix::<f32>::new(&c, &integ, false);
        let double = BoundaryIntegralMatrix::<f64>::new(&c, &integ, false);
        for (i, j) in [(0, 0), (3, 17), (79, 2)] {
            assert_eq!(single.entry_f64(i, j).to_bits(), double.entry(i, j).to_bits());
            assert_eq!(single.entry(i, j), double.entry(i, j) as f32);
        }
    }

    #[test]
    fn matvec_matches_entries() {
        let c = sphere();
        let integ = AnalyticIntegrator::new();
        let a = BoundaryIntegralMatrix::<f64>::new(&c, &integ, false);
        let x: Vec<f64> = (0..80).map(|i| 1.0 + 0.01 * i as f64).collect();
        let mut y = vec![0.0; 80];
        a.matvec(&x, &mut y);
        let y5: f64 = (0..80).map(|j| a.entry(5, j) * x[j]).sum();
        approx::assert_relative_eq!(y[5], y5, max_relative = 1e-12);
        let mut part = vec![0.0; 10];
        a.matvec_rows(40..50, &x, &mut part);
        approx::assert_relative_eq!(part[0], y[40], max_relative = 1e-12);
    }

    #[test]
    #[should_panic]
    fn out_of_range_entry_panics() {
        let c = sphere();
        let integ = AnalyticIntegrator::new();
        let a = BoundaryIntegralMatrix::<f64>::new(&c, &integ, false);
        let _ = a.entry(80, 0);
    }
}
