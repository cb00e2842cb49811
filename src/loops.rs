//! Loop-nest information, precomputed by the host and queried per block.
//!
//! This crate performs no loop *detection* (that is the host compiler's
//! CFG analysis machinery): [`LoopForest`] is only the artifact such an
//! analysis hands over, populated loop-by-loop and block-by-block, and then
//! queried read-only through [`LoopOracle`] during accumulation.

use crate::mix::LoopOracle;
use crate::{Block, EntityDefs, Loop};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::collections::hash_map::Entry;

/// Definition for a [`Loop`]: one natural loop in a function's loop nest.
#[derive(Clone)]
pub struct LoopDef {
    /// The loop immediately enclosing this one, or `None` for a top-level
    /// loop.
    pub parent: Option<Loop>,

    pub children: SmallVec<[Loop; 2]>,

    /// Nesting depth: top-level loops are at depth 1.
    pub depth: u32,
}

/// The loop nests of one (or more) functions, as a forest of [`LoopDef`]s
/// plus the innermost-loop assignment for every block inside some loop.
///
/// Blocks never assigned to any loop answer `None` from the oracle (the
/// normal case for straight-line code, not an error).
#[derive(Clone, Default)]
pub struct LoopForest {
    pub loops: EntityDefs<Loop>,

    innermost: FxHashMap<Block, Loop>,
}

impl LoopForest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a loop nested directly under `parent` (or a new top-level loop).
    pub fn define_loop(&mut self, parent: Option<Loop>) -> Loop {
        let depth = match parent {
            Some(p) => self.loops[p].depth + 1,
            None => 1,
        };
        let lp = self.loops.define(LoopDef { parent, children: SmallVec::new(), depth });
        if let Some(p) = parent {
            self.loops[p].children.push(lp);
        }
        lp
    }

    /// Record that `block` belongs to `lp` (and, structurally, to every
    /// ancestor of `lp`). The deepest assignment wins, so a host can report
    /// membership for each loop of a nest in any order and the oracle still
    /// answers with the innermost one.
    pub fn assign_block(&mut self, block: Block, lp: Loop) {
        match self.innermost.entry(block) {
            Entry::Vacant(entry) => {
                entry.insert(lp);
            }
            Entry::Occupied(mut entry) => {
                if self.loops[lp].depth > self.loops[*entry.get()].depth {
                    entry.insert(lp);
                }
            }
        }
    }

    pub fn parent_of(&self, lp: Loop) -> Option<Loop> {
        self.loops[lp].parent
    }

    pub fn depth_of(&self, lp: Loop) -> u32 {
        self.loops[lp].depth
    }
}

impl LoopOracle for LoopForest {
    fn innermost_loop_containing(&self, block: Block) -> Option<Loop> {
        self.innermost.get(&block).copied()
    }
}
