use crate::config::Precision;
use crate::core::traits::Real;
use crate::error::BemError;
use crate::observer::SolverState;
use crate::utils::crc32;

const MAGIC: &[u8; 4] = b"EBCK";
const VERSION: u32 = 1;
/// magic + version + two fingerprints + precision + iteration + two lengths
const HEADER_LEN: usize = 4 + 4 + 8 + 8 + 1 + 8;

#[derive(Clone, Debug, PartialEq)]
pub struct CheckpointRecord {
    pub geometry: u64,
    pub config: u64,
    pub precision: Precision,
    pub iteration: usize,
    pub solution: Vec<f64>,
    pub residual_history: Vec<f64>,
}

impl CheckpointRecord {
    pub fn from_state<T: Real>(geometry: u64, config: u64, precision: Precision, state: &SolverState<T>) -> Self {
        CheckpointRecord {
            geometry,
            config,
            precision,
            iteration: state.iteration,
            solution: state.solution.iter().map(|v| v.to_f64_lossy()).collect(),
            residual_history: state.residual_history.iter().map(|v| v.to_f64_lossy()).collect(),
        }
    }

    pub fn to_state<T: Real>(&self) -> SolverState<T> {
        SolverState {
            iteration: self.iteration,
            solution: self.solution.iter().map(|&v| T::from_f64_lossy(v)).collect(),
            residual_history: self.residual_history.iter().map(|&v| T::from_f64_lossy(v)).collect(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(HEADER_LEN + 8 * (self.solution.len() + self.residual_history.len() + 2) + 4);
        data.extend_from_slice(MAGIC);
        data.extend_from_slice(&VERSION.to_le_bytes());
        data.extend_from_slice(&self.geometry.to_le_bytes());
        data.extend_from_slice(&self.config.to_le_bytes());
        data.push(match self.precision {
            Precision::Single => 0,
            Precision::Double => 1,
        });
        data.extend_from_slice(&(self.iteration as u64).to_le_bytes());
        for block in [&self.solution, &self.residual_history] {
            data.extend_from_slice(&(block.len() as u64).to_le_bytes());
            for v in block.iter() {
                data.extend_from_slice(&v.to_le_bytes());
            }
        }
        let crc = crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        data
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BemError> {
        if bytes.len() < HEADER_LEN + 8 + 4 {
            return Err(BemError::Checkpoint("file too short".into()));
        }
        let (data, trailer) = bytes.split_at(bytes.len() - 4);
        let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let computed = crc32(data);
        if stored != computed {
            return Err(BemError::Checkpoint(format!("checksum mismatch: stored {stored:08x}, computed {computed:08x}")));
        }

        let mut cursor = Cursor { data, offset: 0 };
        if cursor.take(4)? != MAGIC {
            return Err(BemError::Checkpoint("not a checkpoint file".into()));
        }
        let version = cursor.u32()?;
        if version != VERSION {
            return Err(BemError::Checkpoint(format!("unsupported checkpoint version {version}")));
        }
        let geometry = cursor.u64()?;
        let config = cursor.u64()?;
        let precision = match cursor.take(1)?[0] {
            0 => Precision::Single,
            1 => Precision::Double,
            other => return Err(BemError::Checkpoint(format!("unknown precision tag {other}"))),
        };
        let iteration = cursor.u64()? as usize;
        let solution = cursor.f64_block()?;
        let residual_history = cursor.f64_block()?;
        if cursor.offset != data.len() {
            return Err(BemError::Checkpoint("trailing bytes after residual history".into()));
        }
        Ok(CheckpointRecord { geometry, config, precision, iteration, solution, residual_history })
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], BemError> {
        let end = self.offset.checked_add(n).filter(|&e| e <= self.data.len());
        match end {
            Some(end) => {
                let s = &self.data[self.offset..end];
                self.offset = end;
                Ok(s)
            }
            None => Err(BemError::Checkpoint("unexpected end of file".into())),
        }
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], BemError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, BemError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, BemError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn f64_block(&mut self) -> Result<Vec<f64>, BemError> {
        let n = self.u64()? as usize;
        if n > (self.data.len() - self.offset) / 8 {
            return Err(BemError::Checkpoint(format!("block of {n} values exceeds file size")));
        }
        (0..n).map(|_| Ok(f64::from_le_bytes(self.array()?))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CheckpointRecord {
        CheckpointRecord {
            geometry: 0xdead_beef,
            config: 42,
            precision: Precision::Double,
            iteration: 17,
            solution: vec![1.5, -2.25, 3.0],
            residual_history: vec![1.0, 0.1],
        }
    }

    #[test]
    fn encode_decode() {
        let r = sample();
        assert_eq!(CheckpointRecord::decode(&r.encode()).unwrap(), r);
    }

    #[test]
    fn corruption_is_detected() {
        let mut bytes = sample().encode();
        bytes[30] ^= 0x40;
        assert!(matches!(CheckpointRecord::decode(&bytes), Err(BemError::Checkpoint(_))));
        let bytes = sample().encode();
        assert!(CheckpointRecord::decode(&bytes[..20]).is_err());
    }
}
