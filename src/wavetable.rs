//! Quantized wavetable generation.
//!
//! Tables are pure functions of `(bit_depth, table_size)`: the same inputs
//! always produce the same samples, bit for bit.

use std::f64::consts::PI;

use tracing::trace;

use crate::error::{Error, Result};

/// Bit depth of the only supported quantization.
pub const SUPPORTED_BIT_DEPTH: u32 = 8;

/// An immutable table of quantized amplitudes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wavetable {
    bit_depth: u32,
    samples: Vec<u32>,
}

impl Wavetable {
    pub fn bit_depth(&self) -> u32 {
        self.bit_depth
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.samples
    }

    pub fn contains(&self, value: u32) -> bool {
        self.samples.contains(&value)
    }

    /// The samples as bytes. Lossless for 8-bit tables.
    pub fn to_u8(&self) -> Vec<u8> {
        self.samples.iter().map(|&v| v as u8).collect()
    }
}

/// Generate a quantized sine table.
///
/// Only 8-bit tables are supported; any other depth is
/// [`Error::UnsupportedBitDepth`].
pub fn generate(bit_depth: u32, table_size: usize) -> Result<Wavetable> {
    if bit_depth != SUPPORTED_BIT_DEPTH {
        return Err(Error::UnsupportedBitDepth(bit_depth));
    }
    let samples = sine_8bit(table_size);
    trace!(table_size, ?samples, "generated sine table");
    Ok(Wavetable { bit_depth, samples })
}

fn sine_8bit(table_size: usize) -> Vec<u32> {
    let max_value = 256.0_f64;
    let angle = PI * 2.0 / table_size as f64;
    (0..table_size)
        .map(|i| {
            let v = (i as f64 * angle).sin();
            let scaled = (v + 1.0) * (max_value / 2.0);
            let clipped = scaled.ceil().max(0.0);
            clipped.min(max_value - 1.0) as u32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn twelve_entry_table() {
        let t = generate(8, 12).unwrap();
        assert_eq!(
            t.as_slice(),
            &[128, 192, 239, 255, 239, 193, 129, 65, 18, 0, 18, 64]
        );
    }

    #[test]
    fn starts_at_midpoint() {
        for n in [1, 2, 7, 12, 256, 1000] {
            assert_eq!(generate(8, n).unwrap().as_slice()[0], 128, "n = {n}");
        }
    }

    #[test]
    fn peak_and_trough_are_clamped() {
        let t = generate(8, 4).unwrap();
        assert_eq!(t.as_slice(), &[128, 255, 129, 0]);
    }

    #[test]
    fn empty_table() {
        assert!(generate(8, 0).unwrap().is_empty());
    }

    #[test]
    fn unsupported_depths() {
        for depth in [0, 1, 7, 16, 24, 32] {
            assert_eq!(generate(depth, 12), Err(Error::UnsupportedBitDepth(depth)));
        }
    }

    #[test]
    fn deterministic() {
        assert_eq!(generate(8, 333).unwrap(), generate(8, 333).unwrap());
    }

    #[test]
    fn records_its_bit_depth() {
        assert_eq!(generate(8, 4).unwrap().bit_depth(), SUPPORTED_BIT_DEPTH);
    }

    proptest! {
        #[test]
        fn length_and_range(n in 1usize..4096) {
            let t = generate(8, n).unwrap();
            prop_assert_eq!(t.len(), n);
            prop_assert!(t.as_slice().iter().all(|&v| v <= 255));
            prop_assert_eq!(t.as_slice()[0], 128);
        }
    }
}
