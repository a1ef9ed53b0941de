//! Probability models for the interval coder.
//!
//! Bit models carry a single 13-bit fixed-point probability of `0`; data
//! models carry a 15-bit cumulative distribution. Static models are set once,
//! adaptive models count occurrences and rebuild their estimate every
//! `update_cycle` uses, halving their counters whenever the total grows past
//! the precision of the fixed-point representation.

use crate::error::{Error, Result};

/// Bits of precision of a bit-model probability.
pub const BM_LENGTH_SHIFT: u32 = 13;
/// Upper bound on adaptive bit-model counts (and the bit-model scale).
pub const BM_MAX_COUNT: u32 = 1 << BM_LENGTH_SHIFT;
/// Bits of precision of a data-model cumulative distribution.
pub const DM_LENGTH_SHIFT: u32 = 15;
/// Upper bound on adaptive data-model total count (and the data-model scale).
pub const DM_MAX_COUNT: u32 = 1 << DM_LENGTH_SHIFT;
/// Largest supported alphabet.
pub const MAX_DATA_SYMBOLS: usize = 1 << 11;

const MIN_PROBABILITY: f64 = 0.0001;
const MAX_PROBABILITY: f64 = 0.9999;

fn check_alphabet(symbols: usize) -> Result<()> {
    if !(2..=MAX_DATA_SYMBOLS).contains(&symbols) {
        return Err(Error::ModelConfig(format!(
            "alphabet of {symbols} symbols outside 2..={MAX_DATA_SYMBOLS}"
        )));
    }
    Ok(())
}

fn check_probability(p: f64) -> Result<()> {
    if !(MIN_PROBABILITY..=MAX_PROBABILITY).contains(&p) {
        return Err(Error::ModelConfig(format!("probability {p} out of range")));
    }
    Ok(())
}

/// How an overlap prior widens the two bit intervals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverlapBlend {
    /// Both intervals grow by `overlap` (in probability units).
    #[default]
    Additive,
    /// Both intervals grow by a factor `1 + overlap`.
    Multiplicative,
}

/// Static model for binary data.
///
/// Besides the probability of `0`, the model holds the two interval
/// boundaries actually used for coding: bit `0` maps to `[0, bit_0_high)`,
/// bit `1` to `[bit_1_low, 1)`. Without overlap both equal the probability,
/// with overlap `bit_1_low < bit_0_high` and the intervals share a region
/// that a plain decoder cannot resolve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StaticBitModel {
    pub(crate) bit_0_prob: u32,
    pub(crate) bit_0_high: u32,
    pub(crate) bit_1_low: u32,
    probability_0: f64,
    overlap: f64,
    blend: OverlapBlend,
}

impl StaticBitModel {
    /// Create an equiprobable model without overlap.
    pub fn new() -> Self {
        let mut model = Self {
            bit_0_prob: 0,
            bit_0_high: 0,
            bit_1_low: 0,
            probability_0: 0.5,
            overlap: 0.0,
            blend: OverlapBlend::Additive,
        };
        model.rebuild();
        model
    }

    /// Set the probability of symbol `0`.
    ///
    /// # Errors
    /// Returns `Error::ModelConfig` unless `0.0001 <= p <= 0.9999`.
    pub fn set_probability_0(&mut self, p: f64) -> Result<()> {
        check_probability(p)?;
        self.probability_0 = p;
        self.rebuild();
        Ok(())
    }

    /// Fold an overlap prior into the model.
    ///
    /// # Errors
    /// Returns `Error::ModelConfig` unless `0 <= overlap < 1`.
    pub fn set_overlap(&mut self, overlap: f64, blend: OverlapBlend) -> Result<()> {
        if !(0.0..1.0).contains(&overlap) {
            return Err(Error::ModelConfig(format!("overlap {overlap} outside [0, 1)")));
        }
        self.overlap = overlap;
        self.blend = blend;
        self.rebuild();
        Ok(())
    }

    /// The same probability with the overlap removed.
    pub fn without_overlap(&self) -> Self {
        Self {
            bit_0_high: self.bit_0_prob,
            bit_1_low: self.bit_0_prob,
            overlap: 0.0,
            ..*self
        }
    }

    /// Configured probability of `0`.
    pub fn probability_0(&self) -> f64 {
        self.probability_0
    }

    /// Configured overlap.
    pub fn overlap(&self) -> f64 {
        self.overlap
    }

    /// Whether the two bit intervals share a region.
    pub fn is_overlapped(&self) -> bool {
        self.bit_1_low < self.bit_0_high
    }

    fn rebuild(&mut self) {
        let scale = BM_MAX_COUNT as f64;
        let p0 = ((self.probability_0 * scale) as u32).clamp(1, BM_MAX_COUNT - 1);
        let (grow_0, grow_1) = match self.blend {
            OverlapBlend::Additive => {
                let o = (self.overlap * scale) as u32;
                (o, o)
            }
            OverlapBlend::Multiplicative => (
                (p0 as f64 * self.overlap) as u32,
                ((BM_MAX_COUNT - p0) as f64 * self.overlap) as u32,
            ),
        };
        self.bit_0_prob = p0;
        self.bit_0_high = (p0 + grow_0).min(BM_MAX_COUNT - 1);
        self.bit_1_low = p0.saturating_sub(grow_1).max(1);
    }
}

impl Default for StaticBitModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Static model for general data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticDataModel {
    pub(crate) distribution: Vec<u32>,
}

impl StaticDataModel {
    /// Create a model over `symbols` symbols; `None` means uniform.
    ///
    /// # Errors
    /// Returns `Error::ModelConfig` for an invalid alphabet or distribution.
    pub fn new(symbols: usize, probability: Option<&[f64]>) -> Result<Self> {
        let mut model = Self {
            distribution: Vec::new(),
        };
        model.set_distribution(symbols, probability)?;
        Ok(model)
    }

    /// Replace the distribution; `None` means uniform.
    ///
    /// # Errors
    /// Returns `Error::ModelConfig` if the alphabet has fewer than 2 or more
    /// than 2048 symbols, the table length differs from `symbols`, any
    /// probability is outside `[0.0001, 0.9999]`, or they do not sum to 1.
    pub fn set_distribution(&mut self, symbols: usize, probability: Option<&[f64]>) -> Result<()> {
        check_alphabet(symbols)?;
        let uniform = vec![1.0 / symbols as f64; symbols];
        let probability = probability.unwrap_or(&uniform);
        if probability.len() != symbols {
            return Err(Error::ModelConfig(format!(
                "{} probabilities given for {symbols} symbols",
                probability.len()
            )));
        }

        let scale = DM_MAX_COUNT as f64;
        let mut distribution = Vec::with_capacity(symbols);
        let mut sum = 0.0;
        for &p in probability {
            check_probability(p)?;
            distribution.push((sum * scale) as u32);
            sum += p;
        }
        if !(MAX_PROBABILITY..=1.0 + MIN_PROBABILITY).contains(&sum) {
            return Err(Error::ModelConfig(format!("probabilities sum to {sum}")));
        }
        let collapsed = distribution.windows(2).any(|w| w[0] >= w[1])
            || distribution[symbols - 1] >= DM_MAX_COUNT;
        if collapsed {
            return Err(Error::ModelConfig("empty symbol interval".into()));
        }

        self.distribution = distribution;
        Ok(())
    }

    /// Number of symbols in the alphabet.
    pub fn model_symbols(&self) -> usize {
        self.distribution.len()
    }
}

/// Adaptive model for binary data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdaptiveBitModel {
    pub(crate) bit_0_prob: u32,
    bit_0_count: u32,
    bit_count: u32,
    update_cycle: u32,
    bits_until_update: u32,
}

impl AdaptiveBitModel {
    /// Create an equiprobable model.
    pub fn new() -> Self {
        let mut model = Self {
            bit_0_prob: 0,
            bit_0_count: 0,
            bit_count: 0,
            update_cycle: 0,
            bits_until_update: 0,
        };
        model.reset();
        model
    }

    /// Reset to the equiprobable model.
    pub fn reset(&mut self) {
        self.bit_0_count = 1;
        self.bit_count = 2;
        self.bit_0_prob = 1 << (BM_LENGTH_SHIFT - 1);
        self.update_cycle = 4;
        self.bits_until_update = 4;
    }

    /// Current estimate of the probability of `0`.
    pub fn probability_0(&self) -> f64 {
        self.bit_0_prob as f64 / BM_MAX_COUNT as f64
    }

    /// `(zeros, total)` occurrence counters.
    pub fn counts(&self) -> (u32, u32) {
        (self.bit_0_count, self.bit_count)
    }

    pub(crate) fn observe(&mut self, bit: u8) {
        if bit == 0 {
            self.bit_0_count += 1;
        }
        self.bit_count += 1;
        self.bits_until_update -= 1;
        if self.bits_until_update == 0 {
            self.update();
        }
    }

    fn update(&mut self) {
        if self.bit_count > BM_MAX_COUNT {
            self.bit_count = (self.bit_count + 1) >> 1;
            self.bit_0_count = (self.bit_0_count + 1) >> 1;
            if self.bit_0_count == self.bit_count {
                self.bit_count += 1;
            }
        }
        let scale = 0x8000_0000u32 / self.bit_count;
        self.bit_0_prob = (self.bit_0_count * scale) >> (31 - BM_LENGTH_SHIFT);

        self.update_cycle = ((5 * self.update_cycle) >> 2).min(64);
        self.bits_until_update = self.update_cycle;
    }
}

impl Default for AdaptiveBitModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Adaptive model for general data.
///
/// `symbol_counts` always sums to `total_count`; the cumulative distribution
/// is only rebuilt at the end of each update cycle so that encoder and decoder
/// see identical boundaries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdaptiveDataModel {
    pub(crate) distribution: Vec<u32>,
    symbol_count: Vec<u32>,
    total_count: u32,
    update_cycle: u32,
    symbols_until_update: u32,
}

impl AdaptiveDataModel {
    /// Create a uniform model over `symbols` symbols.
    ///
    /// # Errors
    /// Returns `Error::ModelConfig` if `symbols` is outside `2..=2048`.
    pub fn new(symbols: usize) -> Result<Self> {
        let mut model = Self {
            distribution: Vec::new(),
            symbol_count: Vec::new(),
            total_count: 0,
            update_cycle: 0,
            symbols_until_update: 0,
        };
        model.set_alphabet(symbols)?;
        Ok(model)
    }

    /// Reallocate for a new alphabet and reset to uniform.
    ///
    /// # Errors
    /// Returns `Error::ModelConfig` if `symbols` is outside `2..=2048`.
    pub fn set_alphabet(&mut self, symbols: usize) -> Result<()> {
        check_alphabet(symbols)?;
        self.distribution = vec![0; symbols];
        self.symbol_count = vec![0; symbols];
        self.reset();
        Ok(())
    }

    /// Reset to the uniform distribution.
    pub fn reset(&mut self) {
        let symbols = self.symbol_count.len() as u32;
        self.symbol_count.fill(1);
        self.total_count = symbols;
        self.rebuild();
        self.update_cycle = (symbols + 6) >> 1;
        self.symbols_until_update = self.update_cycle;
    }

    /// Number of symbols in the alphabet.
    pub fn model_symbols(&self) -> usize {
        self.symbol_count.len()
    }

    /// Per-symbol occurrence counters (each starts at 1).
    pub fn symbol_counts(&self) -> &[u32] {
        &self.symbol_count
    }

    /// Sum of the occurrence counters.
    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    pub(crate) fn observe(&mut self, symbol: usize) {
        self.symbol_count[symbol] += 1;
        self.total_count += 1;
        self.symbols_until_update -= 1;
        if self.symbols_until_update == 0 {
            self.update();
        }
    }

    fn update(&mut self) {
        if self.total_count > DM_MAX_COUNT {
            self.total_count = 0;
            for count in &mut self.symbol_count {
                *count = (*count + 1) >> 1;
                self.total_count += *count;
            }
        }
        self.rebuild();

        let max_cycle = (self.symbol_count.len() as u32 + 6) << 3;
        self.update_cycle = ((5 * self.update_cycle) >> 2).min(max_cycle);
        self.symbols_until_update = self.update_cycle;
    }

    fn rebuild(&mut self) {
        let scale = 0x8000_0000u32 / self.total_count;
        let mut sum = 0;
        for (slot, &count) in self.distribution.iter_mut().zip(&self.symbol_count) {
            *slot = (scale * sum) >> (31 - DM_LENGTH_SHIFT);
            sum += count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_static_data_rejects_bad_tables() {
        assert!(StaticDataModel::new(1, None).is_err());
        assert!(StaticDataModel::new(3, Some(&[0.5, 0.5])).is_err());
        assert!(StaticDataModel::new(2, Some(&[0.5, 0.6])).is_err());
        assert!(StaticDataModel::new(2, Some(&[1.0, 0.0])).is_err());
        assert!(StaticDataModel::new(3, Some(&[0.25, 0.25, 0.5])).is_ok());
    }

    #[test]
    fn test_static_data_uniform() {
        let model = StaticDataModel::new(4, None).unwrap();
        assert_eq!(model.model_symbols(), 4);
        assert_eq!(model.distribution, vec![0, 8192, 16384, 24576]);
    }

    #[test]
    fn test_static_bit_probability_range() {
        let mut model = StaticBitModel::new();
        assert!(model.set_probability_0(0.0).is_err());
        assert!(model.set_probability_0(1.0).is_err());
        model.set_probability_0(0.25).unwrap();
        assert_eq!(model.bit_0_prob, 2048);
        assert!(!model.is_overlapped());
    }

    #[test]
    fn test_overlap_widens_both_intervals() {
        let mut model = StaticBitModel::new();
        model.set_probability_0(0.3).unwrap();
        for blend in [OverlapBlend::Additive, OverlapBlend::Multiplicative] {
            model.set_overlap(0.2, blend).unwrap();
            assert!(model.is_overlapped());
            assert!(model.bit_1_low < model.bit_0_prob);
            assert!(model.bit_0_prob < model.bit_0_high);
            assert!(model.bit_1_low >= 1 && model.bit_0_high < BM_MAX_COUNT);

            let plain = model.without_overlap();
            assert_eq!(plain.bit_0_high, plain.bit_0_prob);
            assert_eq!(plain.bit_1_low, plain.bit_0_prob);
        }
        assert!(model.set_overlap(1.0, OverlapBlend::Additive).is_err());
    }

    #[test]
    fn test_adaptive_bit_tracks_zeros() {
        let mut model = AdaptiveBitModel::new();
        for _ in 0..200 {
            model.observe(0);
        }
        assert!(model.probability_0() > 0.9);
        model.reset();
        assert_eq!(model.counts(), (1, 2));
        assert_eq!(model.probability_0(), 0.5);
    }

    #[test]
    fn test_adaptive_bit_rescale_keeps_probability_proper() {
        let mut model = AdaptiveBitModel::new();
        for _ in 0..40_000 {
            model.observe(0);
        }
        let (zeros, total) = model.counts();
        assert!(total <= BM_MAX_COUNT + 64);
        assert!(zeros < total);
        assert!(model.bit_0_prob < BM_MAX_COUNT);
    }

    #[test]
    fn test_set_alphabet_resets() {
        let mut model = AdaptiveDataModel::new(4).unwrap();
        model.observe(2);
        model.set_alphabet(6).unwrap();
        assert_eq!(model.model_symbols(), 6);
        assert_eq!(model.symbol_counts(), &[1; 6]);
        assert!(model.set_alphabet(1).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_adaptive_counts_sum_to_total(
            symbols in 2usize..40,
            input in prop::collection::vec(any::<u16>(), 0..3000),
        ) {
            let mut model = AdaptiveDataModel::new(symbols).unwrap();
            for raw in input {
                model.observe(raw as usize % symbols);
                let sum: u32 = model.symbol_counts().iter().sum();
                prop_assert_eq!(sum, model.total_count());
                prop_assert!(model.symbol_counts().iter().all(|&c| c >= 1));
            }
            prop_assert!(model.distribution.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(model.distribution[symbols - 1] < DM_MAX_COUNT);
        }
    }
}
