//! [`Context`](struct.Context.html) and related types/utilities.
//!
//! The analyzed program is externally owned: this crate only ever holds
//! *handles* into it (plain indices), never references that could keep the
//! host IR alive or allow mutating it. [`EntityDefs`] is the define-only
//! arena those handles point into, and [`Context`] interns the strings
//! (opcode names, labels) that handles like [`InternedStr`] refer to.

use elsa::FrozenIndexSet;
use std::ops::{Index, IndexMut};

/// Append-only interner for strings (opcode names, function names, labels).
///
/// Notable choices:
/// * interning is `&self` (append-only storage via [`FrozenIndexSet`]),
///   so a shared `Rc<Context>` suffices for both building and analyzing
/// * handles are indices, only meaningful for the [`Context`] that made them
#[derive(Default)]
pub struct Context {
    strs: FrozenIndexSet<String>,
}

/// Interned handle for a [`str`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct InternedStr(u32);

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, s: impl AsRef<str>) -> InternedStr {
        let (idx, _) = self.strs.insert_full(s.as_ref().to_string());
        InternedStr(u32::try_from(idx).expect("interner overflow"))
    }
}

impl Index<InternedStr> for Context {
    type Output = str;
    fn index(&self, s: InternedStr) -> &str {
        self.strs.get_index(s.0 as usize).expect("InternedStr from another Context")
    }
}

/// An entity handle: a `u32` index newtype pointing into the [`EntityDefs`]
/// arena that defined it.
#[doc(hidden)]
pub trait Entity: Copy {
    type Def;

    fn from_idx(idx: u32) -> Self;
    fn idx(self) -> u32;
}

macro_rules! entities {
    ($($(#[$attr:meta])* $name:ident => $def:ty;)+) => {
        $(
            $(#[$attr])*
            #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, serde::Serialize)]
            pub struct $name(u32);

            impl Entity for $name {
                type Def = $def;

                #[inline]
                fn from_idx(idx: u32) -> Self {
                    Self(idx)
                }
                #[inline]
                fn idx(self) -> u32 {
                    self.0
                }
            }
        )+
    };
}

entities! {
    /// Entity handle for a [`FuncDecl`](crate::FuncDecl) (a kernel function).
    Func => crate::FuncDecl;

    /// Entity handle for a [`BlockDef`](crate::BlockDef) (a basic block).
    Block => crate::BlockDef;

    /// Entity handle for an [`InstDef`](crate::InstDef) (one instruction).
    Inst => crate::InstDef;

    /// Entity handle for a [`LoopDef`](crate::loops::LoopDef) (a natural loop
    /// in some function's loop forest).
    Loop => crate::loops::LoopDef;
}

/// Define-only arena of `E::Def`s, indexed by `E` handles.
///
/// Entities are never removed: per-block records refer to them for the
/// lifetime of a whole analysis run.
pub struct EntityDefs<E: Entity> {
    defs: Vec<E::Def>,
}

impl<E: Entity> Default for EntityDefs<E> {
    fn default() -> Self {
        Self { defs: Vec::new() }
    }
}

impl<E: Entity> Clone for EntityDefs<E>
where
    E::Def: Clone,
{
    fn clone(&self) -> Self {
        Self { defs: self.defs.clone() }
    }
}

impl<E: Entity> EntityDefs<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a definition to the arena, returning the handle for it.
    pub fn define(&mut self, def: E::Def) -> E {
        let handle = E::from_idx(u32::try_from(self.defs.len()).expect("entity index overflow"));
        self.defs.push(def);
        handle
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Iterate `(handle, definition)` pairs in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (E, &E::Def)> + '_ {
        self.defs.iter().enumerate().map(|(i, def)| (E::from_idx(i as u32), def))
    }
}

impl<E: Entity> Index<E> for EntityDefs<E> {
    type Output = E::Def;
    fn index(&self, entity: E) -> &E::Def {
        &self.defs[entity.idx() as usize]
    }
}

impl<E: Entity> IndexMut<E> for EntityDefs<E> {
    fn index_mut(&mut self, entity: E) -> &mut E::Def {
        &mut self.defs[entity.idx() as usize]
    }
}
