//! Static instruction-mix and memory-locality analysis for OpenCL-style
//! kernel IR.
//!
//! For each basic block of each analyzed function, the [`mix`] module
//! classifies every instruction into a fixed taxonomy (arithmetic, bitwise,
//! vector, aggregate, load, store, call, other), attributes loads/stores to
//! one of the three OpenCL address spaces (`__private`/`__local`/`__global`),
//! and records which loop (if any) encloses the block. All counts are static,
//! one per IR occurrence: no data-flow, no dynamic execution counts, and no
//! IR is ever modified.
//!
//! #### Notable types/modules
//!
//! ##### IR data types
// HACK using `(struct.Context.html)` to link `Context`, not `context::Context`.
//! * [`Context`](struct.Context.html): string interning and entity handles
//! * [`Module`]: owns [`FuncDecl`]s, [`BlockDef`]s and [`InstDef`]s
//! * [`AddrSpace`]: the three OpenCL address spaces and their integer codes
//!
//! ##### Analyses and consumers
//! * [`mix`]: the classifier/accumulator/driver core ([`mix::analyze_module`])
//! * [`loops`]: host-populated loop forest answering "innermost loop of block"
//! * [`print`](mod@print): plain-text and JSON rendering of analysis results

// BEGIN - Embark standard lints v6 for Rust 1.55+
// do not change or add/remove here, but one can add exceptions after this section
// for more info see: <https://github.com/EmbarkStudios/rust-ecosystem/issues/59>
#![deny(unsafe_code)]
#![warn(
    clippy::all,
    clippy::await_holding_lock,
    clippy::char_lit_as_u8,
    clippy::checked_conversions,
    clippy::dbg_macro,
    clippy::debug_assert_with_mut_call,
    clippy::doc_markdown,
    clippy::empty_enum,
    clippy::enum_glob_use,
    clippy::exit,
    clippy::expl_impl_clone_on_copy,
    clippy::explicit_deref_methods,
    clippy::explicit_into_iter_loop,
    clippy::fallible_impl_from,
    clippy::filter_map_next,
    clippy::flat_map_option,
    clippy::float_cmp_const,
    clippy::fn_params_excessive_bools,
    clippy::from_iter_instead_of_collect,
    clippy::if_let_mutex,
    clippy::implicit_clone,
    clippy::imprecise_flops,
    clippy::inefficient_to_string,
    clippy::invalid_upcast_comparisons,
    clippy::large_digit_groups,
    clippy::large_stack_arrays,
    clippy::large_types_passed_by_value,
    clippy::let_unit_value,
    clippy::linkedlist,
    clippy::lossy_float_literal,
    clippy::macro_use_imports,
    clippy::manual_ok_or,
    clippy::map_err_ignore,
    clippy::map_flatten,
    clippy::map_unwrap_or,
    clippy::match_same_arms,
    clippy::match_wild_err_arm,
    clippy::match_wildcard_for_single_variants,
    clippy::mem_forget,
    clippy::missing_enforced_import_renames,
    clippy::mut_mut,
    clippy::mutex_integer,
    clippy::needless_borrow,
    clippy::needless_continue,
    clippy::needless_for_each,
    clippy::option_option,
    clippy::path_buf_push_overwrite,
    clippy::ptr_as_ptr,
    clippy::rc_mutex,
    clippy::ref_option_ref,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::same_functions_in_if_condition,
    clippy::semicolon_if_nothing_returned,
    clippy::single_match_else,
    clippy::string_add_assign,
    clippy::string_add,
    clippy::string_lit_as_bytes,
    clippy::string_to_string,
    clippy::todo,
    clippy::trait_duplication_in_bounds,
    clippy::unimplemented,
    clippy::unnested_or_patterns,
    clippy::unused_self,
    clippy::useless_transmute,
    clippy::verbose_file_reads,
    clippy::zero_sized_map_values,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms
)]
// END - Embark standard lints v6 for Rust 1.55+
// crate-specific exceptions:
#![allow(
    // NOTE ignored for readability (`match` used when `if let` is too long).
    clippy::single_match_else,
)]
// NOTE this is stronger than the "Embark standard lints" above, because
// we almost never need `unsafe` code and this is a further "speed bump" to it.
#![forbid(unsafe_code)]

// NOTE all the modules are declared here, but they're documented "inside"
// (i.e. using inner doc comments).
mod context;
pub mod loops;
pub mod mix;
pub mod print;

use smallvec::SmallVec;

// HACK work around the lack of an `FxIndexMap` type alias elsewhere.
#[doc(hidden)]
type FxIndexMap<K, V> =
    indexmap::IndexMap<K, V, std::hash::BuildHasherDefault<rustc_hash::FxHasher>>;

// NOTE these reexports are all documented inside `context`.
pub use context::{Block, Context, EntityDefs, Func, Inst, Loop};

#[doc(hidden)]
pub use context::Entity;

/// Interned handle for a [`str`].
pub use context::InternedStr;

// HACK this only serves to disallow modifying the `cx` field of `Module`.
#[doc(hidden)]
mod sealed {
    use super::*;
    use std::rc::Rc;

    #[derive(Clone)]
    pub struct Module {
        /// Context used for everything interned, in this module.
        ///
        /// Notable choices made for this field:
        /// * private to disallow switching the context of a module
        /// * [`Rc`] sharing to allow multiple modules to use the same context
        ///   (`Context: !Sync` because of the interner so it can't be `Arc`)
        cx: Rc<Context>,

        pub funcs: EntityDefs<Func>,
        pub blocks: EntityDefs<Block>,
        pub insts: EntityDefs<Inst>,
    }

    impl Module {
        pub fn new(cx: Rc<Context>) -> Self {
            Self {
                cx,

                funcs: Default::default(),
                blocks: Default::default(),
                insts: Default::default(),
            }
        }

        pub fn cx(&self) -> Rc<Context> {
            self.cx.clone()
        }

        pub fn cx_ref(&self) -> &Rc<Context> {
            &self.cx
        }
    }
}
pub use sealed::Module;

/// Declaration for a [`Func`]: a kernel function, i.e. an ordered sequence
/// of basic blocks (in the order they appear in the function's body, *not*
/// CFG traversal order - the analysis walks them as stored).
#[derive(Clone)]
pub struct FuncDecl {
    pub name: InternedStr,

    pub blocks: SmallVec<[Block; 4]>,
}

/// Definition for a [`Block`]: a maximal straight-line instruction sequence
/// with one entry and one exit.
///
/// The terminator is just the last instruction of `insts`: the analysis
/// walks it like any other instruction (it usually classifies as "other",
/// unless it happens to be e.g. a `call`).
#[derive(Clone)]
pub struct BlockDef {
    pub label: Option<InternedStr>,

    pub insts: Vec<Inst>,
}

/// Definition for an [`Inst`]: one instruction, carrying exactly what the
/// classifier consumes (opcode name + structural kind + pointer address
/// space for memory accesses), nothing else.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct InstDef {
    pub kind: InstKind,
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub enum InstKind {
    /// Read a single value through a pointer; `addr_space` is the address
    /// space code of the pointer operand's type, as the host IR records it.
    Load { addr_space: u32 },

    /// Write a single value through a pointer (see [`InstKind::Load`] for
    /// `addr_space`).
    Store { addr_space: u32 },

    /// Any non-memory instruction, identified by its opcode name alone
    /// (`add`, `shl`, `call`, `br`, ...).
    Plain(InternedStr),
}

impl InstDef {
    /// The instruction's opcode name, as the classifier matches it.
    pub fn opcode_name<'a>(&self, cx: &'a Context) -> &'a str {
        match self.kind {
            InstKind::Load { .. } => "load",
            InstKind::Store { .. } => "store",
            InstKind::Plain(name) => &cx[name],
        }
    }
}

/// One of the three OpenCL address spaces a load/store pointer operand can
/// target.
///
/// It is assumed that OpenCL's `__local` and `__global` have been lowered to
/// address space codes 1 and 2 respectively (`__private` being the default,
/// code 0), the convention OpenCL frontends use for kernel IR. Codes outside
/// this set are recognized-but-unattributed (see [`mix::BlockStats`] for how
/// the accounting treats them).
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, serde::Serialize)]
pub enum AddrSpace {
    Private,
    Local,
    Global,
}

impl AddrSpace {
    /// The fixed integer code the host IR uses for this address space.
    pub const fn code(self) -> u32 {
        match self {
            AddrSpace::Private => 0,
            AddrSpace::Local => 1,
            AddrSpace::Global => 2,
        }
    }

    /// The address space for `code`, or `None` for any other (valid but
    /// unattributed) address space code.
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(AddrSpace::Private),
            1 => Some(AddrSpace::Local),
            2 => Some(AddrSpace::Global),
            _ => None,
        }
    }
}
