//! Rendering [`AnalysisResults`] into human- and machine-readable reports.
//!
//! Strictly a consumer: the analysis core never depends on this module, and
//! a host is free to render the results some other way (or not at all).
//! Plain text comes from `fmt::Display` (`{}` formatting / `.to_string()`),
//! machine-readable output from [`Report::to_json`].

use crate::context::Entity as _;
use crate::mix::{AnalysisResults, BlockStats};
use crate::{Block, Module};
use itertools::Itertools as _;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

/// One row per analyzed block, in visitation order.
pub struct Report<'a> {
    module: &'a Module,
    results: &'a AnalysisResults,
}

// Counter columns, in the order the rows print them.
const COLUMNS: [&str; 11] =
    ["bin", "bit", "vec", "agg", "load", "store", "call", "other", "glob", "loc", "priv"];

fn counters(stats: &BlockStats) -> [u32; 11] {
    [
        stats.num_bin_ops,
        stats.num_bit_bin_ops,
        stats.num_vec_ops,
        stats.num_agg_ops,
        stats.num_load_ops,
        stats.num_store_ops,
        stats.num_call_ops,
        stats.num_other_ops,
        stats.num_global_mem_acc,
        stats.num_local_mem_acc,
        stats.num_private_mem_acc,
    ]
}

impl<'a> Report<'a> {
    pub fn new(module: &'a Module, results: &'a AnalysisResults) -> Self {
        Self { module, results }
    }

    /// The block's label, or a stable `bb<idx>` fallback for unlabeled blocks.
    fn block_label(&self, block: Block) -> Cow<'a, str> {
        let cx = self.module.cx_ref();
        match self.module.blocks[block].label {
            Some(label) => Cow::Borrowed(&cx[label]),
            None => Cow::Owned(format!("bb{}", block.idx())),
        }
    }

    /// Machine-readable form: one object per block, in visitation order.
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        #[derive(Serialize)]
        struct BlockRecord<'a> {
            block: Cow<'a, str>,
            #[serde(flatten)]
            stats: &'a BlockStats,
        }

        let records: Vec<BlockRecord<'_>> = self
            .results
            .per_block
            .iter()
            .map(|(&block, stats)| BlockRecord { block: self.block_label(block), stats })
            .collect();
        serde_json::to_value(records)
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<14} {:>6} {}",
            "block",
            "loop",
            COLUMNS.iter().format_with(" ", |name, f| f(&format_args!("{name:>5}")))
        )?;
        for (&block, stats) in &self.results.per_block {
            let owner = match stats.owner_loop {
                Some(lp) => Cow::Owned(format!("L{}", lp.idx())),
                None => Cow::Borrowed("-"),
            };
            writeln!(
                f,
                "{:<14} {:>6} {}",
                self.block_label(block),
                owner,
                counters(stats).iter().format_with(" ", |c, f| f(&format_args!("{c:>5}")))
            )?;
        }
        Ok(())
    }
}
