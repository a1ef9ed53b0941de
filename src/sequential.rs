//! Sequential (M-algorithm) decoding of overlapped interval codes.
//!
//! A code produced with an overlapped [`StaticBitModel`] does not determine
//! the source on its own: wherever the received value falls in the region
//! shared by the two bit intervals, both bits are consistent with the code.
//! The decoder resolves these ambiguities with a noisy observation of the
//! source (the *received block*, seen through a binary symmetric channel of
//! crossover probability `error`) and a Markov model of the source.
//!
//! Every candidate is a [`Node`] in a bounded arena. Expanding a node restores
//! its interval snapshot, tries both bits, and creates a child for each bit
//! the code accepts, weighted by
//!
//! ```text
//! weight(child) = weight(parent) + log P(received | bit) + log P(bit | history)
//! ```
//!
//! After every `block_size` steps only the `max_node` heaviest candidates
//! survive. Nodes only point to their parent; a node is released as soon as
//! it has no live descendants, so the arena holds the union of the surviving
//! paths. When a single candidate survives a block its path is final and is
//! committed, which frees everything above it.

use log::{debug, trace};
use slotmap::{new_key_type, SlotMap};

use crate::codec::{ArithmeticCodec, Snapshot};
use crate::error::{Error, Result};
use crate::markov::{MarkovContext, MarkovTable};
use crate::model::StaticBitModel;

/// Block size used until [`SequentialDecoder::set_block`] is called.
pub const DEFAULT_BLOCK_SIZE: usize = 8;
/// Beam width used until [`SequentialDecoder::set_block`] is called.
pub const DEFAULT_MAX_NODE: usize = 256;

new_key_type! {
    /// Handle to a [`Node`] in the decoder arena.
    pub struct NodeKey;
}

/// A candidate decoding path, ending in one hypothesised bit.
#[derive(Clone, Copy, Debug)]
pub struct Node {
    /// Hypothesised bit (meaningless on a root).
    pub bit: u8,
    /// Markov history of the path, including `bit`.
    pub context: MarkovContext,
    /// Cumulative log-likelihood of the path.
    pub weight: f64,
    /// Log-likelihood added by the step that created this node.
    pub current_weight: f64,
    /// Decoder state after decoding `bit`.
    pub snapshot: Snapshot,
    /// Number of received bits this path accounts for.
    pub depth: usize,
    /// Previous node on the path; `None` on a root.
    pub parent: Option<NodeKey>,
    children: u8,
}

/// Construction parameters of a [`SequentialDecoder`].
#[derive(Clone, Debug)]
pub struct DecoderConfig {
    /// Maximum number of simultaneously live nodes.
    pub node_count: usize,
    /// Channel crossover probability, `0 <= error < 0.5`.
    pub error: f64,
    /// Trailing bits coded without overlap and decoded without branching.
    pub termination: usize,
    /// Source model used to weight candidates.
    pub markov: MarkovTable,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            node_count: 1 << 16,
            error: 0.05,
            termination: 0,
            markov: MarkovTable::default(),
        }
    }
}

/// Log-domain branch metrics, indexed `[received][hypothesis]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BranchWeights {
    channel: [[f64; 2]; 2],
    conditioned: [[f64; 2]; 2],
}

impl BranchWeights {
    /// Precompute the metrics for a channel and a bit model.
    pub fn new(error: f64, model: &StaticBitModel) -> Self {
        let hit = (1.0 - error).ln();
        let miss = error.ln();
        let prior = [model.probability_0().ln(), (1.0 - model.probability_0()).ln()];
        let channel = [[hit, miss], [miss, hit]];
        let mut conditioned = channel;
        for row in &mut conditioned {
            for (metric, p) in row.iter_mut().zip(prior) {
                *metric += p;
            }
        }
        Self {
            channel,
            conditioned,
        }
    }

    /// `log P(received | hypothesis)`.
    pub fn channel(&self, received: u8, hypothesis: u8) -> f64 {
        self.channel[(received & 1) as usize][(hypothesis & 1) as usize]
    }

    /// `log P(received | hypothesis) + log P_model(hypothesis)`.
    pub fn conditioned(&self, received: u8, hypothesis: u8) -> f64 {
        self.conditioned[(received & 1) as usize][(hypothesis & 1) as usize]
    }
}

/// Result of a sequential decode.
#[derive(Clone, Debug, PartialEq)]
pub struct SequentialOutput {
    /// Decoded source bits.
    pub bits: Vec<u8>,
    /// Log-likelihood of the chosen path.
    pub weight: f64,
    /// Candidates alive when decoding ended.
    pub survivors: usize,
}

/// Bounded best-first decoder for overlapped codes.
#[derive(Debug)]
pub struct SequentialDecoder {
    arena: SlotMap<NodeKey, Node>,
    node_count: usize,
    error: f64,
    termination: usize,
    markov: MarkovTable,
    weights: BranchWeights,
    block_size: usize,
    max_node: usize,
    codec: ArithmeticCodec,
    model: StaticBitModel,
    received: Vec<u8>,
    cursor: usize,
    frontier: Vec<NodeKey>,
    decided: Vec<u8>,
}

impl SequentialDecoder {
    /// Create a decoder.
    ///
    /// # Errors
    /// Returns `Error::ModelConfig` if `error` is outside `[0, 0.5)` or
    /// `node_count` is zero.
    pub fn new(config: DecoderConfig) -> Result<Self> {
        if !(0.0..0.5).contains(&config.error) {
            return Err(Error::ModelConfig(format!(
                "crossover probability {} outside [0, 0.5)",
                config.error
            )));
        }
        if config.node_count == 0 {
            return Err(Error::ModelConfig("node budget must be positive".into()));
        }
        let model = StaticBitModel::new();
        Ok(Self {
            arena: SlotMap::with_capacity_and_key(config.node_count.min(1 << 20)),
            node_count: config.node_count,
            error: config.error,
            termination: config.termination,
            markov: config.markov,
            weights: BranchWeights::new(config.error, &model),
            block_size: DEFAULT_BLOCK_SIZE,
            max_node: DEFAULT_MAX_NODE,
            codec: ArithmeticCodec::with_buffer(Vec::new()),
            model,
            received: Vec::new(),
            cursor: 0,
            frontier: Vec::new(),
            decided: Vec::new(),
        })
    }

    /// Recompute the branch metrics for `model`.
    pub fn set_weights(&mut self, model: &StaticBitModel) {
        self.weights = BranchWeights::new(self.error, model);
    }

    /// Set the steps per pruning round and the beam width.
    ///
    /// # Errors
    /// Returns `Error::ModelConfig` if either is zero.
    pub fn set_block(&mut self, block_size: usize, max_node: usize) -> Result<()> {
        if block_size == 0 || max_node == 0 {
            return Err(Error::ModelConfig(format!(
                "block size {block_size} and beam width {max_node} must be positive"
            )));
        }
        self.block_size = block_size;
        self.max_node = max_node;
        Ok(())
    }

    /// Change the arena budget, e.g. to retry a block.
    ///
    /// # Errors
    /// Returns `Error::ModelConfig` if `node_count` is zero.
    pub fn set_node_count(&mut self, node_count: usize) -> Result<()> {
        if node_count == 0 {
            return Err(Error::ModelConfig("node budget must be positive".into()));
        }
        self.node_count = node_count;
        Ok(())
    }

    /// Current branch metrics.
    pub fn weights(&self) -> &BranchWeights {
        &self.weights
    }

    /// Offset of the next block in the received sequence.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Surviving candidates.
    pub fn frontier(&self) -> &[NodeKey] {
        &self.frontier
    }

    /// Look up a node.
    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.arena.get(key)
    }

    /// Number of nodes currently held by the arena.
    pub fn live_nodes(&self) -> usize {
        self.arena.len()
    }

    /// Whether every received bit has been decoded.
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.received.len()
    }

    /// Decode `code` against the noisy observation `received`.
    ///
    /// One bit is decoded per received bit.
    pub fn decode(
        &mut self,
        code: &[u8],
        received: &[u8],
        model: &StaticBitModel,
    ) -> Result<SequentialOutput> {
        self.set_weights(model);
        self.start(code, received, model)?;
        while !self.is_complete() {
            self.decode_block()?;
        }
        self.finish()
    }

    /// Bind a code and a received block and seed the root candidate.
    ///
    /// # Errors
    /// Returns `Error::ModelConfig` if `received` holds anything but 0/1 or is
    /// shorter than the termination.
    pub fn start(&mut self, code: &[u8], received: &[u8], model: &StaticBitModel) -> Result<()> {
        if received.iter().any(|&bit| bit > 1) {
            return Err(Error::ModelConfig("received block must hold 0/1 bits".into()));
        }
        if self.termination > received.len() {
            return Err(Error::ModelConfig(format!(
                "termination of {} bits exceeds block of {}",
                self.termination,
                received.len()
            )));
        }
        self.arena.clear();
        self.frontier.clear();
        self.decided.clear();
        self.received = received.to_vec();
        self.cursor = 0;
        self.model = *model;
        self.codec = ArithmeticCodec::with_buffer(code.to_vec());
        self.codec.start_decoder()?;

        let root = Node {
            bit: 0,
            context: MarkovContext::new(self.markov.order()),
            weight: 0.0,
            current_weight: 0.0,
            snapshot: self.codec.snapshot(),
            depth: 0,
            parent: None,
            children: 0,
        };
        self.frontier.push(self.arena.insert(root));
        Ok(())
    }

    /// Decode up to `block_size` bits, then prune.
    ///
    /// Returns the number of bits advanced.
    ///
    /// # Errors
    /// `Error::NodeBudgetExceeded` leaves the decoder exactly as it was before
    /// the call, so the block can be retried with a larger budget or a
    /// narrower beam. `Error::NoSurvivor` is final.
    pub fn decode_block(&mut self) -> Result<usize> {
        let steps = self.block_size.min(self.received.len() - self.cursor);
        let mut frontier = self.frontier.clone();
        let mut created = Vec::new();
        let mut dead = Vec::new();

        for _ in 0..steps {
            let mut next = Vec::with_capacity(frontier.len() * 2);
            for &key in &frontier {
                let children = match self.expand(key) {
                    Ok(children) => children,
                    Err(err) => {
                        debug!(
                            "block at bit {} failed with {} live nodes: {err}",
                            self.cursor,
                            self.arena.len()
                        );
                        self.rollback(&created);
                        return Err(err);
                    }
                };
                let before = next.len();
                for child in children.into_iter().flatten() {
                    created.push(child);
                    next.push(child);
                }
                if next.len() == before {
                    dead.push(key);
                }
            }
            frontier = next;
            if frontier.is_empty() {
                return Err(Error::NoSurvivor {
                    offset: self.cursor,
                });
            }
        }

        let candidates = frontier.len();
        self.prune(frontier, dead);
        debug!(
            "block at bit {}: kept {} of {} candidates, {} live nodes",
            self.cursor,
            self.frontier.len(),
            candidates,
            self.arena.len()
        );
        self.next_block(steps);
        if let [survivor] = self.frontier[..] {
            self.commit(survivor);
        }
        Ok(steps)
    }

    /// Expand one candidate by one bit.
    ///
    /// Returns the children for bit `0` and bit `1`; a bit gets no child when
    /// the code rejects it or its weight is not finite. Inside the
    /// termination only the bit the code determines is tried.
    ///
    /// # Errors
    /// Returns `Error::NodeBudgetExceeded` without creating anything if the
    /// children do not fit in the arena.
    pub fn expand(&mut self, key: NodeKey) -> Result<[Option<NodeKey>; 2]> {
        let Some(parent) = self.arena.get(key).copied() else {
            return Ok([None, None]);
        };
        let position = parent.depth;
        let Some(&received) = self.received.get(position) else {
            return Ok([None, None]);
        };

        let mut children = [None, None];
        if position >= self.received.len() - self.termination {
            self.codec.restore(parent.snapshot)?;
            let bit = self.codec.decode_bit(&self.model.without_overlap())?;
            let delta = self.weights.channel(received, bit);
            children[bit as usize] = self.child(&parent, key, bit, delta);
        } else {
            for bit in 0..2u8 {
                self.codec.restore(parent.snapshot)?;
                if !self.codec.decode_hypothesis(bit, &self.model)? {
                    continue;
                }
                let delta = if parent.context.is_established() {
                    self.weights.channel(received, bit)
                        + self.markov.log_probability(parent.context.history(), bit)
                } else {
                    self.weights.conditioned(received, bit)
                };
                children[bit as usize] = self.child(&parent, key, bit, delta);
            }
        }

        let needed = children.iter().flatten().count();
        if self.arena.len() + needed > self.node_count {
            return Err(Error::NodeBudgetExceeded {
                capacity: self.node_count,
                offset: self.cursor,
            });
        }
        Ok(children.map(|child| child.map(|node| self.insert(node))))
    }

    /// Advance the received-block offset by `count` bits.
    pub fn next_block(&mut self, count: usize) {
        self.cursor = (self.cursor + count).min(self.received.len());
    }

    /// Pick the heaviest survivor and reconstruct its bits.
    ///
    /// # Errors
    /// Returns `Error::NoSurvivor` if no candidate is alive.
    pub fn finish(&mut self) -> Result<SequentialOutput> {
        let best = self
            .frontier
            .iter()
            .copied()
            .reduce(|best, key| {
                if self.arena[key].weight > self.arena[best].weight {
                    key
                } else {
                    best
                }
            })
            .ok_or(Error::NoSurvivor {
                offset: self.cursor,
            })?;

        let mut bits = self.path_bits(best);
        bits.splice(0..0, self.decided.iter().copied());
        Ok(SequentialOutput {
            bits,
            weight: self.arena[best].weight,
            survivors: self.frontier.len(),
        })
    }

    fn child(&self, parent: &Node, parent_key: NodeKey, bit: u8, delta: f64) -> Option<Node> {
        let weight = parent.weight + delta;
        if !weight.is_finite() {
            trace!("bit {} at depth {} eliminated", bit, parent.depth);
            return None;
        }
        let mut context = parent.context;
        context.push(bit);
        trace!("bit {} at depth {} weighs {:.4}", bit, parent.depth, weight);
        Some(Node {
            bit,
            context,
            weight,
            current_weight: delta,
            snapshot: self.codec.snapshot(),
            depth: parent.depth + 1,
            parent: Some(parent_key),
            children: 0,
        })
    }

    fn insert(&mut self, node: Node) -> NodeKey {
        if let Some(parent) = node.parent.and_then(|key| self.arena.get_mut(key)) {
            parent.children += 1;
        }
        self.arena.insert(node)
    }

    /// Release a leaf and every ancestor left without children.
    fn release(&mut self, key: NodeKey) {
        let mut next = Some(key);
        while let Some(key) = next {
            let Some(node) = self.arena.remove(key) else {
                return;
            };
            next = node.parent.filter(|&parent| {
                let parent = &mut self.arena[parent];
                parent.children -= 1;
                parent.children == 0
            });
        }
    }

    fn rollback(&mut self, created: &[NodeKey]) {
        for &key in created.iter().rev() {
            let parent = self.arena.remove(key).and_then(|node| node.parent);
            if let Some(parent) = parent.and_then(|key| self.arena.get_mut(key)) {
                parent.children -= 1;
            }
        }
    }

    fn prune(&mut self, mut frontier: Vec<NodeKey>, dead: Vec<NodeKey>) {
        frontier.sort_by(|&a, &b| self.arena[b].weight.total_cmp(&self.arena[a].weight));
        let pruned = frontier.split_off(self.max_node.min(frontier.len()));
        for key in dead.into_iter().chain(pruned) {
            self.release(key);
        }
        self.frontier = frontier;
    }

    /// Emit the path above the only survivor and make it the new root.
    fn commit(&mut self, survivor: NodeKey) {
        let bits = self.path_bits(survivor);
        debug!("committed {} bits, {} decided", bits.len(), self.decided.len() + bits.len());
        self.decided.extend(bits);

        let mut next = self.arena[survivor].parent.take();
        while let Some(key) = next {
            next = self.arena.remove(key).and_then(|node| node.parent);
        }
    }

    fn path_bits(&self, leaf: NodeKey) -> Vec<u8> {
        let mut bits = Vec::new();
        let mut key = leaf;
        while let Some(parent) = self.arena[key].parent {
            bits.push(self.arena[key].bit);
            key = parent;
        }
        bits.reverse();
        bits
    }
}
