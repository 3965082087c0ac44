//! Random primitive exposed to the interpreter

use crate::error::{BridgeError, Result};

/// Exclusive upper bound: the largest integer a double holds exactly.
pub const RANDOM_MAX: u64 = (1 << 53) - 1;

/// Uniform non-negative integers below [`RANDOM_MAX`], drawn from the OS.
///
/// No seeding: two runs never promise the same sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSource;

impl RandomSource {
    pub fn new() -> Self {
        RandomSource
    }

    pub fn next(&self) -> Result<u64> {
        loop {
            let mut buf = [0u8; 8];
            getrandom::getrandom(&mut buf).map_err(|e| BridgeError::Random(e.to_string()))?;

            // Masking to 53 bits is uniform over [0, RANDOM_MAX]; drop the top value.
            let value = u64::from_le_bytes(buf) & RANDOM_MAX;
            if value < RANDOM_MAX {
                return Ok(value);
            }
        }
    }
}
