//! Block index tree with skip pointers, the active chain and locators

use std::collections::HashMap;
use std::ops::Index;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{LOCATOR_DENSE_ENTRIES, MEDIAN_TIME_SPAN};
use crate::error::{ConsensusError, Result};
use crate::hash::to_hex_reversed;
use crate::pow::{check_proof_of_work, get_block_proof, proof_equivalent_time, PowParams};
use crate::types::{BlockHeader, Hash};
use crate::uint::U256;

/// Handle of an entry in a [`BlockTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(usize);

impl BlockId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One accepted header and its position in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    pub hash: Hash,
    pub header: BlockHeader,
    pub height: u32,
    pub prev: Option<BlockId>,
    /// Ancestor at `get_skip_height(height)`, set once on insertion
    pub skip: Option<BlockId>,
    /// Total work of the chain up to and including this block
    pub chain_work: U256,
    /// Maximum timestamp of this block and all its ancestors
    pub time_max: u32,
}

impl BlockIndex {
    pub fn time(&self) -> i64 {
        i64::from(self.header.timestamp)
    }

    pub fn time_max(&self) -> i64 {
        i64::from(self.time_max)
    }
}

/// Clear the lowest set bit
fn invert_lowest_one(n: u32) -> u32 {
    n & n.wrapping_sub(1)
}

/// GetSkipHeight: ℕ → ℕ
///
/// Height the skip pointer of a block at `height` jumps back to. Any lower
/// height would be correct; this choice bounds an ancestor walk to about
/// 110 steps for 2^18 blocks.
pub fn get_skip_height(height: u32) -> u32 {
    if height < 2 {
        return 0;
    }
    if height & 1 == 1 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

/// Sampled list of block hashes from a tip back to genesis
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockLocator {
    pub have: Vec<Hash>,
}

impl BlockLocator {
    pub fn is_empty(&self) -> bool {
        self.have.is_empty()
    }
}

/// Arena of block index entries, addressed by [`BlockId`]
#[derive(Debug, Clone, Default)]
pub struct BlockTree {
    entries: Vec<BlockIndex>,
    by_hash: HashMap<Hash, BlockId>,
    best_header: Option<BlockId>,
    pow: Option<PowParams>,
}

impl BlockTree {
    /// Tree that accepts headers without checking their proof of work
    pub fn new() -> Self {
        Self::default()
    }

    /// Tree that rejects headers not meeting their own target
    pub fn with_pow_check(params: PowParams) -> Self {
        BlockTree { pow: Some(params), ..Self::default() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: BlockId) -> Option<&BlockIndex> {
        self.entries.get(id.0)
    }

    pub fn find(&self, hash: &Hash) -> Option<BlockId> {
        self.by_hash.get(hash).copied()
    }

    /// The first header accepted
    pub fn genesis(&self) -> Option<BlockId> {
        if self.entries.is_empty() {
            None
        } else {
            Some(BlockId(0))
        }
    }

    /// Entry with the most cumulative work, earliest on ties
    pub fn best_header(&self) -> Option<BlockId> {
        self.best_header
    }

    /// AcceptBlockHeader: link `header` under its parent.
    ///
    /// 1. A known hash is rejected as a duplicate
    /// 2. With proof-of-work checking, the hash must meet `bits`
    /// 3. The first header becomes the root at height 0; every later one
    ///    needs a known parent
    /// 4. Height, chain work and time_max extend the parent's; the skip
    ///    pointer is built immediately
    pub fn accept_header(&mut self, header: BlockHeader) -> Result<BlockId> {
        let hash = header.hash();
        if self.by_hash.contains_key(&hash) {
            debug!(hash = %to_hex_reversed(&hash), "header already known");
            return Err(ConsensusError::DuplicateHeader(to_hex_reversed(&hash)));
        }
        if let Some(params) = &self.pow {
            if !check_proof_of_work(&hash, header.bits, params) {
                debug!(hash = %to_hex_reversed(&hash), bits = header.bits, "header fails proof of work");
                return Err(ConsensusError::InvalidProofOfWork(to_hex_reversed(&hash)));
            }
        }

        let proof = get_block_proof(header.bits);
        let (prev, height, chain_work, time_max) = if self.entries.is_empty() {
            (None, 0, proof, header.timestamp)
        } else {
            let Some(parent_id) = self.find(&header.prev_block_hash) else {
                debug!(
                    hash = %to_hex_reversed(&hash),
                    prev = %to_hex_reversed(&header.prev_block_hash),
                    "header parent unknown"
                );
                return Err(ConsensusError::UnknownParent(to_hex_reversed(&header.prev_block_hash)));
            };
            let parent = &self[parent_id];
            (
                Some(parent_id),
                parent.height + 1,
                parent.chain_work + proof,
                parent.time_max.max(header.timestamp),
            )
        };

        let id = BlockId(self.entries.len());
        self.entries.push(BlockIndex { hash, header, height, prev, skip: None, chain_work, time_max });
        self.by_hash.insert(hash, id);
        self.build_skip(id);

        let more_work = match self.best_header {
            Some(best) => chain_work > self[best].chain_work,
            None => true,
        };
        if more_work {
            self.best_header = Some(id);
        }
        Ok(id)
    }

    /// BuildSkip: set the skip pointer of a freshly linked entry
    fn build_skip(&mut self, id: BlockId) {
        if let Some(prev) = self[id].prev {
            let skip = self.get_ancestor(prev, get_skip_height(self[id].height));
            self.entries[id.0].skip = skip;
        }
    }

    /// GetAncestor: ancestor of `id` at `height`, `None` above its height.
    ///
    /// Takes the skip pointer when it does not overshoot, unless the
    /// parent's skip pointer lands closer without overshooting either, in
    /// which case one step back is cheaper overall.
    pub fn get_ancestor(&self, id: BlockId, height: u32) -> Option<BlockId> {
        self.get_ancestor_with_steps(id, height).map(|(ancestor, _)| ancestor)
    }

    /// [`BlockTree::get_ancestor`] along with the number of pointers followed
    pub fn get_ancestor_with_steps(&self, id: BlockId, height: u32) -> Option<(BlockId, usize)> {
        let mut steps = 0usize;
        let mut walk = id;
        let mut height_walk = i64::from(self[walk].height);
        let target = i64::from(height);
        if target > height_walk {
            return None;
        }

        while height_walk > target {
            let height_skip = i64::from(get_skip_height(height_walk as u32));
            let height_skip_prev = i64::from(get_skip_height((height_walk - 1) as u32));
            let entry = &self[walk];
            match entry.skip {
                Some(skip)
                    if height_skip == target
                        || (height_skip > target
                            && !(height_skip_prev < height_skip - 2 && height_skip_prev >= target)) =>
                {
                    walk = skip;
                    height_walk = height_skip;
                }
                _ => {
                    walk = entry.prev?;
                    height_walk -= 1;
                }
            }
            steps += 1;
        }
        Some((walk, steps))
    }

    /// LastCommonAncestor: align heights, then walk both sides back in
    /// lock-step, jumping by skip pointers while they differ
    pub fn last_common_ancestor(&self, a: BlockId, b: BlockId) -> Option<BlockId> {
        let (mut a, mut b) = self.align(a, b)?;
        while a != b {
            match (self[a].skip, self[b].skip) {
                (Some(skip_a), Some(skip_b)) if skip_a != skip_b => {
                    a = skip_a;
                    b = skip_b;
                }
                _ => {
                    a = self[a].prev?;
                    b = self[b].prev?;
                }
            }
        }
        Some(a)
    }

    /// Whether one of the two blocks descends from the other
    pub fn are_on_the_same_fork(&self, a: BlockId, b: BlockId) -> bool {
        matches!(self.align(a, b), Some((a, b)) if a == b)
    }

    fn align(&self, a: BlockId, b: BlockId) -> Option<(BlockId, BlockId)> {
        let (height_a, height_b) = (self[a].height, self[b].height);
        if height_a > height_b {
            Some((self.get_ancestor(a, height_b)?, b))
        } else if height_b > height_a {
            Some((a, self.get_ancestor(b, height_a)?))
        } else {
            Some((a, b))
        }
    }

    /// Median timestamp of the block and up to ten ancestors
    pub fn median_time_past(&self, id: BlockId) -> i64 {
        let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN);
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if times.len() == MEDIAN_TIME_SPAN {
                break;
            }
            times.push(self[current].time());
            cursor = self[current].prev;
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    /// GetBlockProofEquivalentTime: work between `to` and `from`, in seconds
    /// at the difficulty of `tip`
    pub fn get_block_proof_equivalent_time(&self, to: BlockId, from: BlockId, tip: BlockId, params: &PowParams) -> i64 {
        proof_equivalent_time(
            &self[to].chain_work,
            &self[from].chain_work,
            &get_block_proof(self[tip].header.bits),
            params,
        )
    }
}

impl Index<BlockId> for BlockTree {
    type Output = BlockIndex;

    fn index(&self, id: BlockId) -> &BlockIndex {
        &self.entries[id.0]
    }
}

/// The active chain as a dense array from genesis to tip
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain {
    blocks: Vec<BlockId>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn genesis(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }

    pub fn tip(&self) -> Option<BlockId> {
        self.blocks.last().copied()
    }

    /// Height of the tip, `None` for an empty chain
    pub fn height(&self) -> Option<u32> {
        self.blocks.len().checked_sub(1).map(|h| h as u32)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn at(&self, height: u32) -> Option<BlockId> {
        self.blocks.get(height as usize).copied()
    }

    pub fn contains(&self, tree: &BlockTree, id: BlockId) -> bool {
        self.at(tree[id].height) == Some(id)
    }

    /// Successor of `id` in this chain
    pub fn next(&self, tree: &BlockTree, id: BlockId) -> Option<BlockId> {
        if self.contains(tree, id) {
            self.at(tree[id].height + 1)
        } else {
            None
        }
    }

    /// SetTip: make `tip` the last block, rewriting entries back to the
    /// first height that already matches
    pub fn set_tip(&mut self, tree: &BlockTree, tip: Option<BlockId>) {
        let Some(tip) = tip else {
            self.blocks.clear();
            return;
        };
        self.blocks.truncate(tree[tip].height as usize + 1);

        let mut extension = Vec::new();
        let mut cursor = Some(tip);
        while let Some(id) = cursor {
            let height = tree[id].height as usize;
            if height < self.blocks.len() {
                if self.blocks[height] == id {
                    break;
                }
                self.blocks[height] = id;
            } else {
                extension.push(id);
            }
            cursor = tree[id].prev;
        }
        extension.reverse();
        self.blocks.extend(extension);
    }

    /// GetLocator: 𝒞 × ℬ → ℍ*
    ///
    /// 1. Start at `from`, or the tip when absent
    /// 2. Record the hash; stop after genesis
    /// 3. Step back by 1 for the first ten entries, then double the step
    ///    each time, clamping at genesis
    /// 4. Blocks in this chain are found by height, others via skip pointers
    pub fn get_locator(&self, tree: &BlockTree, from: Option<BlockId>) -> BlockLocator {
        let mut step = 1u32;
        let mut have = Vec::with_capacity(32);
        let mut cursor = from.or_else(|| self.tip());

        while let Some(id) = cursor {
            let entry = &tree[id];
            have.push(entry.hash);
            if entry.height == 0 {
                break;
            }
            let height = entry.height.saturating_sub(step);
            cursor = if self.contains(tree, id) { self.at(height) } else { tree.get_ancestor(id, height) };
            if have.len() > LOCATOR_DENSE_ENTRIES {
                step = step.saturating_mul(2);
            }
        }
        BlockLocator { have }
    }

    /// FindFork: the last block of this chain that is an ancestor of `id`
    pub fn find_fork(&self, tree: &BlockTree, id: BlockId) -> Option<BlockId> {
        let height = self.height()?;
        let mut cursor = if tree[id].height > height { tree.get_ancestor(id, height) } else { Some(id) };
        while let Some(current) = cursor {
            if self.contains(tree, current) {
                return Some(current);
            }
            cursor = tree[current].prev;
        }
        None
    }

    /// FindEarliestAtLeast: first block whose running maximum timestamp
    /// reaches `time`
    pub fn find_earliest_at_least(&self, tree: &BlockTree, time: i64) -> Option<BlockId> {
        let position = self.blocks.partition_point(|&id| tree[id].time_max() < time);
        self.blocks.get(position).copied()
    }
}

#[derive(Debug, Default)]
struct ChainStateInner {
    tree: BlockTree,
    chain: Chain,
}

/// Block tree and active chain behind one lock.
///
/// Tip changes rewrite the dense chain in several steps; readers holding the
/// shared lock never observe a half-updated chain.
#[derive(Debug, Default)]
pub struct ChainState {
    inner: RwLock<ChainStateInner>,
}

impl ChainState {
    pub fn new(tree: BlockTree) -> Self {
        ChainState { inner: RwLock::new(ChainStateInner { tree, chain: Chain::new() }) }
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, ChainStateInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, ChainStateInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with shared access to the tree and active chain
    pub fn read<R>(&self, f: impl FnOnce(&BlockTree, &Chain) -> R) -> R {
        let guard = self.read_lock();
        f(&guard.tree, &guard.chain)
    }

    pub fn accept_header(&self, header: BlockHeader) -> Result<BlockId> {
        self.write_lock().tree.accept_header(header)
    }

    /// Make `tip` the active tip, logging when blocks are disconnected
    pub fn set_tip(&self, tip: BlockId) -> Result<()> {
        let mut guard = self.write_lock();
        let inner = &mut *guard;
        let entry = inner
            .tree
            .get(tip)
            .ok_or_else(|| ConsensusError::UnknownBlock(format!("id {}", tip.index())))?;
        let (hash, height) = (entry.hash, entry.height);

        if let Some(old_tip) = inner.chain.tip() {
            if old_tip != tip && inner.tree.get_ancestor(tip, inner.tree[old_tip].height) != Some(old_tip) {
                let fork_height = inner.tree.last_common_ancestor(old_tip, tip).map(|fork| inner.tree[fork].height);
                debug!(
                    old_tip = %to_hex_reversed(&inner.tree[old_tip].hash),
                    old_height = inner.tree[old_tip].height,
                    ?fork_height,
                    "reorganizing active chain"
                );
            }
        }

        inner.chain.set_tip(&inner.tree, Some(tip));
        debug!(hash = %to_hex_reversed(&hash), height, "new chain tip");
        Ok(())
    }

    /// Switch the active chain to the header with the most work
    pub fn activate_best_header(&self) -> Result<Option<BlockId>> {
        let best = self.read_lock().tree.best_header();
        match best {
            Some(best) => {
                self.set_tip(best)?;
                Ok(Some(best))
            }
            None => Ok(None),
        }
    }

    pub fn tip(&self) -> Option<BlockId> {
        self.read_lock().chain.tip()
    }

    pub fn height(&self) -> Option<u32> {
        self.read_lock().chain.height()
    }

    pub fn locator(&self, from: Option<BlockId>) -> BlockLocator {
        let guard = self.read_lock();
        guard.chain.get_locator(&guard.tree, from)
    }

    /// First locator entry known and on the active chain, else genesis
    pub fn find_fork_in_locator(&self, locator: &BlockLocator) -> Option<BlockId> {
        let guard = self.read_lock();
        locator
            .have
            .iter()
            .filter_map(|hash| guard.tree.find(hash))
            .find(|&id| guard.chain.contains(&guard.tree, id))
            .or_else(|| guard.chain.genesis())
    }

    pub fn median_time_past(&self, id: BlockId) -> i64 {
        self.read_lock().tree.median_time_past(id)
    }
}
