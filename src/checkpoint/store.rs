use super::record::CheckpointRecord;
use crate::config::Precision;
use crate::core::traits::Real;
use crate::error::BemError;
use crate::observer::{IterationEvent, ObserverSet, SolverState};
use log::{debug, info, warn};
use std::fs;
use std::path::PathBuf;

/// Checkpoint file of one (geometry, configuration) pair.
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    directory: PathBuf,
    geometry: u64,
    config: u64,
    precision: Precision,
}

impl CheckpointStore {
    pub fn new(directory: impl Into<PathBuf>, geometry: u64, config: u64, precision: Precision) -> Self {
        CheckpointStore { directory: directory.into(), geometry, config, precision }
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(format!("{:016x}_{:016x}.ebck", self.geometry, self.config))
    }

    /// Writes through a temporary file and renames it into place, so a
    /// reader never sees a partial checkpoint.
    pub fn write<T: Real>(&self, state: &SolverState<T>) -> Result<PathBuf, BemError> {
        fs::create_dir_all(&self.directory)?;
        let path = self.path();
        let temp = path.with_extension("ebck.tmp");
        let record = CheckpointRecord::from_state(self.geometry, self.config, self.precision, state);
        fs::write(&temp, record.encode())?;
        fs::rename(&temp, &path)?;
        debug!("checkpoint at iteration {} written to {}", state.iteration, path.display());
        Ok(path)
    }

    /// Loads the checkpoint if one exists and matches this store.
    pub fn read<T: Real>(&self, dimension: usize) -> Result<Option<SolverState<T>>, BemError> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let record = CheckpointRecord::decode(&fs::read(&path)?)?;
        if record.geometry != self.geometry || record.config != self.config {
            return Err(BemError::Checkpoint(format!("{} belongs to a different problem", path.display())));
        }
        if record.precision != self.precision {
            warn!("ignoring checkpoint {} written at {:?} precision", path.display(), record.precision);
            return Ok(None);
        }
        if record.solution.len() != dimension {
            return Err(BemError::Checkpoint(format!(
                "checkpoint holds {} unknowns, the system has {dimension}",
                record.solution.len()
            )));
        }
        info!("resuming from checkpoint {} at iteration {}", path.display(), record.iteration);
        Ok(Some(record.to_state()))
    }

    /// Registers a reader (when `resume` is set) and a periodic writer.
    /// `interval == 0` writes only when the solve finishes.
    pub fn attach<T: Real>(&self, observers: &mut ObserverSet<T>, interval: usize, resume: bool) {
        if resume {
            let reader = self.clone();
            observers.on_start(move |dimension| reader.read(dimension));
        }
        if interval > 0 {
            let writer = self.clone();
            observers.on_iteration(interval, move |e: &IterationEvent<'_, T>| {
                let state = SolverState {
                    iteration: e.iteration,
                    solution: e.solution.to_vec(),
                    residual_history: e.residual_history.to_vec(),
                };
                writer.write(&state).map(|_| ())
            });
        }
        let finisher = self.clone();
        observers.on_finish(move |stats, solution| {
            let state = SolverState {
                iteration: stats.iterations,
                solution: solution.to_vec(),
                residual_history: stats.residual_history.clone(),
            };
            finisher.write(&state).map(|_| ())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("electrobem-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn write_then_read() {
        let dir = scratch("store");
        let store = CheckpointStore::new(&dir, 1, 2, Precision::Double);
        let state = SolverState { iteration: 9, solution: vec![1.0, 2.0], residual_history: vec![0.5] };
        let path = store.write(&state).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("ebck.tmp").exists());
        assert_eq!(store.read::<f64>(2).unwrap(), Some(state));
        assert!(store.read::<f64>(3).is_err());
        let other = CheckpointStore::new(&dir, 1, 3, Precision::Double);
        assert_eq!(other.read::<f64>(2).unwrap(), None);
        let _ = fs::remove_dir_all(&dir);
    }
}
