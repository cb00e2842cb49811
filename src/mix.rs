//! Instruction-mix and memory-locality analysis (the crate's core).
//!
//! One [`BlockStats`] record is produced per basic block: every instruction
//! is classified into exactly one [`OpCategory`], loads/stores are
//! additionally attributed to an [`AddrSpace`], and the block's innermost
//! enclosing loop (if any) is recorded. The driver ([`analyze_func`] /
//! [`analyze_module`]) only ever reads the IR - taking `&Module` *is* the
//! "preserves everything" contract a host pass scheduler would want declared
//! (see [`PassInfo`]).

use crate::{AddrSpace, Block, Context, Func, FxIndexMap, InstDef, InstKind, Module};
use lazy_static::lazy_static;
use rustc_hash::FxHashSet;
use serde::Serialize;

// Binary, bitwise binary, vector and aggregate operations, grouped as in the
// LLVM LangRef instruction reference. The four sets are pairwise disjoint
// (a standing invariant, asserted in tests), and none of them contains
// `load`/`store`/`call`.
lazy_static! {
    static ref BIN_OPS: FxHashSet<&'static str> = [
        "add", "fadd", "sub", "fsub", "mul", "fmul", "udiv", "sdiv", "fdiv", "urem", "srem",
        "frem",
    ]
    .into_iter()
    .collect();
    static ref BIT_BIN_OPS: FxHashSet<&'static str> =
        ["shl", "lshr", "ashr", "and", "or", "xor"].into_iter().collect();
    static ref VEC_OPS: FxHashSet<&'static str> =
        ["extractelement", "insertelement", "shufflevector"].into_iter().collect();
    static ref AGG_OPS: FxHashSet<&'static str> =
        ["extractvalue", "insertvalue"].into_iter().collect();
}

/// The fixed, closed classification taxonomy: every instruction lands in
/// exactly one of these.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Serialize)]
pub enum OpCategory {
    BinaryArithmetic,
    BitwiseBinary,
    Vector,
    Aggregate,
    Load,
    Store,
    Call,
    Other,
}

impl OpCategory {
    /// Classify one instruction.
    ///
    /// Total by construction ([`OpCategory::Other`] is the catch-all), and
    /// checked in a fixed priority order: the four name tables, then `call`
    /// (a name match), then *structural* load/store, then `Other`. The
    /// tables and `load`/`store`/`call` are disjoint today, but the priority
    /// order is part of the contract (name-table membership would win over
    /// structural kind if they ever collided).
    pub fn of(cx: &Context, inst: &InstDef) -> Self {
        let name = inst.opcode_name(cx);
        if BIN_OPS.contains(name) {
            Self::BinaryArithmetic
        } else if BIT_BIN_OPS.contains(name) {
            Self::BitwiseBinary
        } else if VEC_OPS.contains(name) {
            Self::Vector
        } else if AGG_OPS.contains(name) {
            Self::Aggregate
        } else if name == "call" {
            Self::Call
        } else if let InstKind::Load { .. } = inst.kind {
            Self::Load
        } else if let InstKind::Store { .. } = inst.kind {
            Self::Store
        } else {
            Self::Other
        }
    }
}

/// Answers "which loop, if any, most tightly contains this block", from
/// loop-nest information the host precomputed per function (see
/// [`crate::loops::LoopForest`] for the provided implementation).
pub trait LoopOracle {
    fn innermost_loop_containing(&self, block: Block) -> Option<crate::Loop>;
}

/// Answers "which address space does this load/store's pointer operand
/// target", as an integer code (see [`AddrSpace`] for the known codes).
///
/// Only ever queried for structurally-memory instructions.
pub trait AddrSpaceOracle {
    fn pointer_addr_space_of(&self, inst: &InstDef) -> u32;
}

/// [`AddrSpaceOracle`] answering from what the IR records on the access
/// itself (the address space of the pointer operand's type).
pub struct IrAddrSpaces;

impl AddrSpaceOracle for IrAddrSpaces {
    fn pointer_addr_space_of(&self, inst: &InstDef) -> u32 {
        match inst.kind {
            InstKind::Load { addr_space } | InstKind::Store { addr_space } => addr_space,
            InstKind::Plain(_) => unreachable!("non-memory instruction has no pointer operand"),
        }
    }
}

/// Per-block statistics record: eight category counters, three address-space
/// counters, and the innermost enclosing loop.
///
/// Created zeroed when its block is first (and only ever) visited, mutated
/// only during that visit, then lives unmodified in [`AnalysisResults`] for
/// the rest of the run.
#[derive(Clone, Default, PartialEq, Eq, Debug, Serialize)]
pub struct BlockStats {
    /// The innermost loop structurally containing this block, or `None` if
    /// the block is outside any loop. Set exactly once, before any
    /// instruction is processed.
    pub owner_loop: Option<crate::Loop>,

    pub num_bin_ops: u32,
    pub num_bit_bin_ops: u32,
    pub num_vec_ops: u32,
    pub num_agg_ops: u32,
    pub num_load_ops: u32,
    pub num_store_ops: u32,
    pub num_call_ops: u32,
    pub num_other_ops: u32,

    pub num_global_mem_acc: u32,
    pub num_local_mem_acc: u32,
    pub num_private_mem_acc: u32,
}

impl BlockStats {
    /// Classify `inst` and bump the corresponding counter; for loads/stores,
    /// also attribute the access to an address space via `addr_spaces`.
    ///
    /// Cannot fail: every instruction increments exactly one category
    /// counter, plus at most one address-space counter.
    pub fn record(
        &mut self,
        cx: &Context,
        inst: &InstDef,
        addr_spaces: &(impl AddrSpaceOracle + ?Sized),
    ) {
        match OpCategory::of(cx, inst) {
            OpCategory::BinaryArithmetic => self.num_bin_ops += 1,
            OpCategory::BitwiseBinary => self.num_bit_bin_ops += 1,
            OpCategory::Vector => self.num_vec_ops += 1,
            OpCategory::Aggregate => self.num_agg_ops += 1,
            OpCategory::Call => self.num_call_ops += 1,
            OpCategory::Load => {
                self.num_load_ops += 1;
                self.record_mem_access(addr_spaces.pointer_addr_space_of(inst));
            }
            OpCategory::Store => {
                self.num_store_ops += 1;
                self.record_mem_access(addr_spaces.pointer_addr_space_of(inst));
            }
            OpCategory::Other => self.num_other_ops += 1,
        }
    }

    fn record_mem_access(&mut self, addr_space_code: u32) {
        match AddrSpace::from_code(addr_space_code) {
            Some(AddrSpace::Private) => self.num_private_mem_acc += 1,
            Some(AddrSpace::Local) => self.num_local_mem_acc += 1,
            Some(AddrSpace::Global) => self.num_global_mem_acc += 1,
            // An address space outside the known three: the access was
            // already counted as a load/store, but is attributed to no
            // space (undercount, don't fail).
            None => {}
        }
    }

    /// Sum of the eight category counters, i.e. the number of instructions
    /// recorded into this block's stats.
    pub fn num_insts(&self) -> u32 {
        self.num_bin_ops
            + self.num_bit_bin_ops
            + self.num_vec_ops
            + self.num_agg_ops
            + self.num_load_ops
            + self.num_store_ops
            + self.num_call_ops
            + self.num_other_ops
    }

    /// Sum of the three address-space counters. At most
    /// `num_load_ops + num_store_ops`, with equality iff every load/store
    /// pointer resolved to a known address space.
    pub fn num_attributed_mem_acc(&self) -> u32 {
        self.num_global_mem_acc + self.num_local_mem_acc + self.num_private_mem_acc
    }
}

/// Per-block records in function-then-block visitation order, keyed by block
/// identity. Append-only: one record per block, never revisited, never
/// merged. Owned by the caller (scoped to one analysis run, not a
/// process-wide singleton).
#[derive(Clone, Default)]
pub struct AnalysisResults {
    pub per_block: FxIndexMap<Block, BlockStats>,
}

/// Build the [`BlockStats`] record for one basic block: fresh zeroed record,
/// `owner_loop` from the loop oracle, then every instruction of the block
/// classified exactly once, in program order.
pub fn accumulate_block(
    module: &Module,
    block: Block,
    loops: &(impl LoopOracle + ?Sized),
    addr_spaces: &(impl AddrSpaceOracle + ?Sized),
) -> BlockStats {
    let cx = module.cx_ref();
    let mut stats =
        BlockStats { owner_loop: loops.innermost_loop_containing(block), ..Default::default() };
    for &inst in &module.blocks[block].insts {
        stats.record(cx, &module.insts[inst], addr_spaces);
    }
    stats
}

/// Analyze one function: accumulate each of its blocks (in stored order) and
/// append the records to `results`.
///
/// Re-entrant across functions: analyzing function A then function B simply
/// appends B's blocks after A's, with no record from A affected by B.
/// Precondition (host responsibility): `loops` was computed for this
/// function's blocks.
pub fn analyze_func(
    module: &Module,
    func: Func,
    loops: &(impl LoopOracle + ?Sized),
    addr_spaces: &(impl AddrSpaceOracle + ?Sized),
    results: &mut AnalysisResults,
) {
    for &block in &module.funcs[func].blocks {
        let stats = accumulate_block(module, block, loops, addr_spaces);
        let prev = results.per_block.insert(block, stats);
        // Each block belongs to exactly one function, and each function is
        // analyzed at most once per run.
        assert!(prev.is_none(), "block visited twice");
    }
}

/// Analyze every function of `module` (in definition order) into a fresh
/// [`AnalysisResults`].
pub fn analyze_module(
    module: &Module,
    loops: &(impl LoopOracle + ?Sized),
    addr_spaces: &(impl AddrSpaceOracle + ?Sized),
) -> AnalysisResults {
    let mut results = AnalysisResults::default();
    for (func, _) in module.funcs.iter() {
        analyze_func(module, func, loops, addr_spaces, &mut results);
    }
    results
}

/// Scheduling metadata a host pass manager would register the analysis
/// under. Plain configuration data: this crate performs no registration
/// itself, and the flags are an informational contract to the host, not an
/// internal invariant.
#[derive(Copy, Clone, Debug)]
pub struct PassInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub preserves_cfg: bool,
    pub preserves_all_analyses: bool,
}

pub const INSTRUCTION_MIX: PassInfo = PassInfo {
    name: "oclmix",
    description: "Basic OpenCL static analysis",
    preserves_cfg: true,
    preserves_all_analyses: true,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loops::LoopForest;
    use crate::{BlockDef, FuncDecl, InstDef, InstKind};
    use std::rc::Rc;

    fn plain(module: &Module, name: &str) -> InstDef {
        InstDef { kind: InstKind::Plain(module.cx_ref().intern(name)) }
    }

    fn load(addr_space: u32) -> InstDef {
        InstDef { kind: InstKind::Load { addr_space } }
    }

    fn store(addr_space: u32) -> InstDef {
        InstDef { kind: InstKind::Store { addr_space } }
    }

    fn block_of(module: &mut Module, insts: Vec<InstDef>) -> Block {
        let insts = insts.into_iter().map(|def| module.insts.define(def)).collect();
        module.blocks.define(BlockDef { label: None, insts })
    }

    fn single_func(module: &mut Module, blocks: &[Block]) -> Func {
        let name = module.cx_ref().intern("kernel");
        module.funcs.define(FuncDecl { name, blocks: blocks.iter().copied().collect() })
    }

    #[test]
    fn category_tables_pairwise_disjoint() {
        let tables: [&FxHashSet<&str>; 4] = [&BIN_OPS, &BIT_BIN_OPS, &VEC_OPS, &AGG_OPS];
        for (i, a) in tables.iter().enumerate() {
            for b in &tables[i + 1..] {
                assert_eq!(a.intersection(b).count(), 0);
            }
            // `call` is a name match and `load`/`store` are structural, but
            // none of them may also appear in a table.
            for name in ["load", "store", "call"] {
                assert!(!a.contains(name));
            }
        }
    }

    #[test]
    fn classify_each_table_member() {
        let module = Module::new(Rc::new(Context::new()));
        let cx = module.cx();
        for (table, category) in [
            (&*BIN_OPS, OpCategory::BinaryArithmetic),
            (&*BIT_BIN_OPS, OpCategory::BitwiseBinary),
            (&*VEC_OPS, OpCategory::Vector),
            (&*AGG_OPS, OpCategory::Aggregate),
        ] {
            for name in table {
                let inst = InstDef { kind: InstKind::Plain(cx.intern(name)) };
                assert_eq!(OpCategory::of(&cx, &inst), category, "{name}");
            }
        }
    }

    #[test]
    fn call_is_never_other() {
        let module = Module::new(Rc::new(Context::new()));
        let inst = plain(&module, "call");
        assert_eq!(OpCategory::of(module.cx_ref(), &inst), OpCategory::Call);
    }

    #[test]
    fn structural_memory_beats_name_fallback() {
        let module = Module::new(Rc::new(Context::new()));
        let cx = module.cx();
        assert_eq!(OpCategory::of(&cx, &load(0)), OpCategory::Load);
        assert_eq!(OpCategory::of(&cx, &store(2)), OpCategory::Store);
        // A *non-structural* instruction merely named "load" is not a memory
        // access: it falls through every check to `Other`.
        assert_eq!(OpCategory::of(&cx, &plain(&module, "load")), OpCategory::Other);
    }

    #[test]
    fn unmatched_opcodes_fall_to_other() {
        let module = Module::new(Rc::new(Context::new()));
        let cx = module.cx();
        for name in ["br", "ret", "icmp", "phi", "getelementptr", "switch"] {
            let inst = InstDef { kind: InstKind::Plain(cx.intern(name)) };
            assert_eq!(OpCategory::of(&cx, &inst), OpCategory::Other, "{name}");
        }
    }

    #[test]
    fn block_mix_scenario() {
        // One `add`, one `__local` load, one `__global` store, one `br`
        // terminator.
        let mut module = Module::new(Rc::new(Context::new()));
        let insts = vec![
            plain(&module, "add"),
            load(AddrSpace::Local.code()),
            store(AddrSpace::Global.code()),
            plain(&module, "br"),
        ];
        let block = block_of(&mut module, insts);

        let stats = accumulate_block(&module, block, &LoopForest::new(), &IrAddrSpaces);
        assert_eq!(stats, BlockStats {
            owner_loop: None,
            num_bin_ops: 1,
            num_load_ops: 1,
            num_store_ops: 1,
            num_other_ops: 1,
            num_local_mem_acc: 1,
            num_global_mem_acc: 1,
            ..Default::default()
        });
        assert_eq!(stats.num_insts(), 4);
        assert_eq!(stats.num_attributed_mem_acc(), 2);
    }

    #[test]
    fn unknown_addr_space_undercounts() {
        let mut module = Module::new(Rc::new(Context::new()));
        let block = block_of(&mut module, vec![load(7), store(42)]);

        let stats = accumulate_block(&module, block, &LoopForest::new(), &IrAddrSpaces);
        assert_eq!(stats.num_load_ops, 1);
        assert_eq!(stats.num_store_ops, 1);
        assert_eq!(stats.num_attributed_mem_acc(), 0);
    }

    #[test]
    fn private_addr_space_is_attributed() {
        let mut module = Module::new(Rc::new(Context::new()));
        let block = block_of(&mut module, vec![load(AddrSpace::Private.code())]);

        let stats = accumulate_block(&module, block, &LoopForest::new(), &IrAddrSpaces);
        assert_eq!(stats.num_private_mem_acc, 1);
        assert_eq!(stats.num_load_ops + stats.num_store_ops, stats.num_attributed_mem_acc());
    }

    #[test]
    fn category_sum_equals_instruction_count() {
        let mut module = Module::new(Rc::new(Context::new()));
        let insts = vec![
            plain(&module, "fmul"),
            plain(&module, "xor"),
            plain(&module, "shufflevector"),
            plain(&module, "insertvalue"),
            plain(&module, "call"),
            load(1),
            store(9),
            plain(&module, "ret"),
        ];
        let n = insts.len() as u32;
        let block = block_of(&mut module, insts);

        let stats = accumulate_block(&module, block, &LoopForest::new(), &IrAddrSpaces);
        assert_eq!(stats.num_insts(), n);
        assert!(stats.num_attributed_mem_acc() <= stats.num_load_ops + stats.num_store_ops);
    }

    #[test]
    fn accumulate_is_idempotent() {
        let mut module = Module::new(Rc::new(Context::new()));
        let mut loops = LoopForest::new();
        let insts =
            vec![plain(&module, "sub"), plain(&module, "lshr"), load(2), plain(&module, "br")];
        let block = block_of(&mut module, insts);
        let lp = loops.define_loop(None);
        loops.assign_block(block, lp);

        let a = accumulate_block(&module, block, &loops, &IrAddrSpaces);
        let b = accumulate_block(&module, block, &loops, &IrAddrSpaces);
        assert_eq!(a, b);
        assert_eq!(a.owner_loop, Some(lp));
    }

    #[test]
    fn empty_block_stays_zeroed() {
        let mut module = Module::new(Rc::new(Context::new()));
        let block = block_of(&mut module, vec![]);

        let stats = accumulate_block(&module, block, &LoopForest::new(), &IrAddrSpaces);
        assert_eq!(stats, BlockStats::default());
    }

    #[test]
    fn driver_appends_in_block_order() {
        let mut module = Module::new(Rc::new(Context::new()));
        let entry_insts = vec![plain(&module, "add"), plain(&module, "br")];
        let b0 = block_of(&mut module, entry_insts);
        let exit_insts = vec![plain(&module, "ret")];
        let b1 = block_of(&mut module, exit_insts);
        let func = single_func(&mut module, &[b0, b1]);

        let mut results = AnalysisResults::default();
        analyze_func(&module, func, &LoopForest::new(), &IrAddrSpaces, &mut results);
        let visited: Vec<Block> = results.per_block.keys().copied().collect();
        assert_eq!(visited, [b0, b1]);
        assert_eq!(results.per_block[&b0].num_bin_ops, 1);
        assert_eq!(results.per_block[&b1].num_other_ops, 1);
    }

    #[test]
    fn pass_info_is_analysis_only() {
        assert_eq!(INSTRUCTION_MIX.name, "oclmix");
        assert!(INSTRUCTION_MIX.preserves_cfg);
        assert!(INSTRUCTION_MIX.preserves_all_analyses);
    }
}
