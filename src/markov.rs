//! Binary Markov source model.
//!
//! A source of order `k` has `2^k` states, each the last `k` bits with the
//! most recent bit in the lowest position. The transition table is the full
//! `2^k × 2^k` state matrix stored row-major, so entry `s * 2^k + t` is the
//! probability of moving from state `s` to state `t`. Only the two states
//! reachable by appending a bit are meaningful.

use crate::error::{Error, Result};

/// Markov order used when none is configured.
pub const DEFAULT_ORDER: usize = 2;
/// Largest supported Markov order.
pub const MAX_ORDER: usize = 8;

const TOLERANCE: f64 = 1e-6;

/// Transition probabilities of a binary Markov source.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkovTable {
    order: usize,
    transitions: Vec<f64>,
}

impl MarkovTable {
    /// Build from a full `2^(2k)` transition matrix.
    ///
    /// # Errors
    /// Returns `Error::ModelConfig` if the order is outside `1..=8`, the table
    /// has the wrong size, or a row's two reachable transitions are not
    /// probabilities in `(0, 1)` summing to 1.
    pub fn new(order: usize, transitions: Vec<f64>) -> Result<Self> {
        if !(1..=MAX_ORDER).contains(&order) {
            return Err(Error::ModelConfig(format!("markov order {order} outside 1..={MAX_ORDER}")));
        }
        if transitions.len() != 1 << (2 * order) {
            return Err(Error::ModelConfig(format!(
                "order {order} needs {} transitions, got {}",
                1 << (2 * order),
                transitions.len()
            )));
        }
        let table = Self { order, transitions };
        for state in 0..table.contexts() as u32 {
            let p0 = table.probability(state, 0);
            let p1 = table.probability(state, 1);
            let proper = p0 > 0.0 && p0 < 1.0 && p1 > 0.0 && p1 < 1.0;
            if !proper || (p0 + p1 - 1.0).abs() > TOLERANCE {
                return Err(Error::ModelConfig(format!(
                    "context {state:0width$b} has transitions {p0} and {p1}",
                    width = order
                )));
            }
        }
        Ok(table)
    }

    /// Build from `P(next = 0 | context)` for each of the `2^k` contexts.
    ///
    /// # Errors
    /// Same conditions as [`MarkovTable::new`].
    pub fn from_conditionals(order: usize, probability_0: &[f64]) -> Result<Self> {
        if !(1..=MAX_ORDER).contains(&order) || probability_0.len() != 1 << order {
            return Err(Error::ModelConfig(format!(
                "order {order} needs {} conditionals, got {}",
                1usize.checked_shl(order as u32).unwrap_or(0),
                probability_0.len()
            )));
        }
        let states = 1usize << order;
        let mask = states - 1;
        let mut transitions = vec![0.0; states * states];
        for (state, &p0) in probability_0.iter().enumerate() {
            let row = state * states;
            transitions[row + ((state << 1) & mask)] = p0;
            transitions[row + (((state << 1) | 1) & mask)] = 1.0 - p0;
        }
        Self::new(order, transitions)
    }

    /// Estimate a table from a training sequence, with add-one smoothing.
    ///
    /// # Errors
    /// Returns `Error::ModelConfig` for an invalid order.
    pub fn estimate(order: usize, bits: &[u8]) -> Result<Self> {
        if !(1..=MAX_ORDER).contains(&order) {
            return Err(Error::ModelConfig(format!("markov order {order} outside 1..={MAX_ORDER}")));
        }
        let mut counts = vec![[1u32; 2]; 1 << order];
        let mut context = MarkovContext::new(order);
        for &bit in bits {
            let bit = bit & 1;
            if context.is_established() {
                counts[context.history() as usize][bit as usize] += 1;
            }
            context.push(bit);
        }
        let conditionals: Vec<f64> = counts
            .iter()
            .map(|&[zeros, ones]| zeros as f64 / (zeros + ones) as f64)
            .collect();
        Self::from_conditionals(order, &conditionals)
    }

    /// Markov order `k`.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of contexts, `2^k`.
    pub fn contexts(&self) -> usize {
        1 << self.order
    }

    /// The raw `2^(2k)` transition matrix.
    pub fn transitions(&self) -> &[f64] {
        &self.transitions
    }

    /// Probability of `bit` following `history`.
    pub fn probability(&self, history: u32, bit: u8) -> f64 {
        let mask = (self.contexts() - 1) as u32;
        let state = history & mask;
        let next = ((state << 1) | (bit & 1) as u32) & mask;
        self.transitions[((state as usize) << self.order) | next as usize]
    }

    /// Natural log of [`MarkovTable::probability`].
    pub fn log_probability(&self, history: u32, bit: u8) -> f64 {
        self.probability(history, bit).ln()
    }
}

impl Default for MarkovTable {
    /// Order-2 source with equiprobable transitions.
    fn default() -> Self {
        let states = 1usize << DEFAULT_ORDER;
        let mut transitions = vec![0.0; states * states];
        for state in 0..states {
            let row = state * states;
            transitions[row + ((state << 1) & (states - 1))] = 0.5;
            transitions[row + (((state << 1) | 1) & (states - 1))] = 0.5;
        }
        Self {
            order: DEFAULT_ORDER,
            transitions,
        }
    }
}

/// Last-`k`-bit history of a decoding path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MarkovContext {
    order: u8,
    filled: u8,
    history: u32,
}

impl MarkovContext {
    /// An empty history for a source of order `order`.
    pub fn new(order: usize) -> Self {
        Self {
            order: order.min(MAX_ORDER) as u8,
            filled: 0,
            history: 0,
        }
    }

    /// Append a decoded bit.
    pub fn push(&mut self, bit: u8) {
        let mask = (1u32 << self.order) - 1;
        self.history = ((self.history << 1) | (bit & 1) as u32) & mask;
        self.filled = (self.filled + 1).min(self.order);
    }

    /// Whether `k` bits have been seen, so the history indexes a real context.
    pub fn is_established(&self) -> bool {
        self.filled == self.order
    }

    /// Number of history bits seen so far, saturating at the order.
    pub fn filled(&self) -> usize {
        self.filled as usize
    }

    /// The last `k` bits, most recent lowest.
    pub fn history(&self) -> u32 {
        self.history
    }
}
