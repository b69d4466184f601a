//! Per-unit DIE arena.
//!
//! DIEs reference each other by section offset (`DW_AT_type`,
//! `DW_AT_specification`, `DW_AT_containing_type`), so the nodes of a
//! unit live in a flat arena indexed by offset rather than an owning
//! pointer graph. A failed offset lookup degrades to a placeholder in
//! the output, never an error.

use crate::data::loc::LocationOp;
use gimli::{DwAt, DwTag};
use std::collections::HashMap;

/// Identity of a DIE inside a [`crate::file::DwarfFile`]: unit index plus
/// arena index within that unit's tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DieId {
    pub(crate) unit: usize,
    pub(crate) index: usize,
}

/// Attribute value, a tagged union over the shapes the exporter consumes.
///
/// Unsigned and signed integer variants stay distinct so `DW_AT_const_value`
/// can be reported with its original signedness.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    U64(u64),
    U32(u32),
    I64(i64),
    I32(i32),
    Loc(Vec<LocationOp>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer coercion across all integer variants.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            AttrValue::U64(v) => Some(*v),
            AttrValue::U32(v) => Some(u64::from(*v)),
            AttrValue::I64(v) => Some(*v as u64),
            AttrValue::I32(v) => Some(*v as i64 as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::U64(v) => Some(*v as i64),
            AttrValue::U32(v) => Some(i64::from(*v)),
            AttrValue::I64(v) => Some(*v),
            AttrValue::I32(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_loc(&self) -> Option<&[LocationOp]> {
        match self {
            AttrValue::Loc(ops) => Some(ops),
            _ => None,
        }
    }

    /// True for the unsigned integer variants. Drives the signedness of
    /// constant fields in the output.
    pub fn is_unsigned(&self) -> bool {
        matches!(self, AttrValue::U64(_) | AttrValue::U32(_))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DieNode {
    pub(crate) offset: u64,
    pub(crate) tag: DwTag,
    pub(crate) parent: Option<usize>,
    pub(crate) children: Vec<usize>,
    pub(crate) attrs: Vec<(DwAt, AttrValue)>,
}

/// Arena of one unit's DIEs plus the offset index used for reference
/// chasing.
#[derive(Debug, Default)]
pub(crate) struct DieTree {
    pub(crate) nodes: Vec<DieNode>,
    pub(crate) by_offset: HashMap<u64, usize>,
}

impl DieTree {
    /// Append a node, linking it into its parent's child list.
    pub(crate) fn push(&mut self, node: DieNode) -> usize {
        let index = self.nodes.len();
        self.by_offset.insert(node.offset, index);
        if let Some(parent) = node.parent {
            self.nodes[parent].children.push(index);
        }
        self.nodes.push(node);
        index
    }
}
