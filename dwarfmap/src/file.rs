//! File-level API: compilation units, DIE access, offset lookup.
//!
//! DIEs are addressed by [`DieId`] and their data is copied out through
//! accessors, so the exporter can interleave reads with writes to its
//! own output tree. A unit's arena is built on first access and released
//! by the driver once the unit has been exported; a later cross-unit
//! lookup simply re-materializes the target unit.

use crate::core::Result;
use crate::data::die::{AttrValue, DieId, DieNode, DieTree};
use crate::loader::LoadedDwarf;
use gimli::{DwAt, DwTag};
use std::path::Path;

/// One compilation unit: identity, source-file table, and the lazily
/// materialized DIE tree.
pub struct CompileUnit {
    pub(crate) name: String,
    pub(crate) version: u16,
    /// Global `.debug_info` offset span covering all DIEs of this unit.
    pub(crate) span: (u64, u64),
    pub(crate) files: Vec<String>,
    pub(crate) tree: Option<DieTree>,
}

impl CompileUnit {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve a raw `DW_AT_decl_file` value against this unit's table.
    ///
    /// File numbering is 1-based up to DWARF 4 and 0-based from DWARF 5;
    /// an out-of-range index resolves to `None`.
    pub fn source_file(&self, index: u64) -> Option<&str> {
        if self.version >= 5 {
            self.files.get(index as usize).map(String::as_str)
        } else if index == 0 {
            None
        } else {
            self.files.get((index - 1) as usize).map(String::as_str)
        }
    }

    pub fn source_files(&self) -> &[String] {
        &self.files
    }
}

/// An opened executable or object file with DWARF data.
pub struct DwarfFile {
    inner: Option<LoadedDwarf>,
    units: Vec<CompileUnit>,
}

impl DwarfFile {
    /// Open a file and scan its compilation units. Fails when the file
    /// cannot be read, is not an object file, or carries no DWARF data.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (inner, units) = LoadedDwarf::open(path)?;
        tracing::debug!(
            "opened {} with {} compilation units",
            path.display(),
            units.len()
        );
        Ok(Self {
            inner: Some(inner),
            units,
        })
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn unit(&self, unit: usize) -> &CompileUnit {
        &self.units[unit]
    }

    /// Materialize a unit's DIE tree if it is not already cached.
    pub fn ensure_unit(&mut self, unit: usize) -> Result<()> {
        if self.units[unit].tree.is_some() {
            return Ok(());
        }
        let Some(inner) = &self.inner else {
            anyhow::bail!("compilation unit {unit} has no backing DWARF data");
        };
        let tree = inner.materialize(unit)?;
        self.units[unit].tree = Some(tree);
        Ok(())
    }

    /// Drop a unit's cached DIE tree; it can be re-materialized on demand.
    pub fn release_unit(&mut self, unit: usize) {
        if self.inner.is_some() {
            self.units[unit].tree = None;
        }
    }

    /// The direct children of a unit's root DIE.
    pub fn unit_root_children(&mut self, unit: usize) -> Result<Vec<DieId>> {
        self.ensure_unit(unit)?;
        let Some(tree) = self.units[unit].tree.as_ref() else {
            return Ok(Vec::new());
        };
        let Some(root) = tree.nodes.first() else {
            return Ok(Vec::new());
        };
        Ok(root
            .children
            .iter()
            .map(|&index| DieId { unit, index })
            .collect())
    }

    /// Global lookup of a DIE by its `.debug_info` offset, materializing
    /// the owning unit when necessary. `None` on a dangling offset.
    pub fn find_die_by_offset(&mut self, offset: u64) -> Option<DieId> {
        let unit = self.units.partition_point(|cu| cu.span.1 <= offset);
        let cu = self.units.get(unit)?;
        if offset < cu.span.0 {
            return None;
        }
        self.ensure_unit(unit).ok()?;
        let index = *self.units[unit].tree.as_ref()?.by_offset.get(&offset)?;
        Some(DieId { unit, index })
    }

    fn node(&self, id: DieId) -> &DieNode {
        let tree = self.units[id.unit]
            .tree
            .as_ref()
            .expect("DIE accessed after its unit was released");
        &tree.nodes[id.index]
    }

    pub fn tag(&self, id: DieId) -> DwTag {
        self.node(id).tag
    }

    pub fn offset(&self, id: DieId) -> u64 {
        self.node(id).offset
    }

    pub fn parent(&self, id: DieId) -> Option<DieId> {
        self.node(id).parent.map(|index| DieId {
            unit: id.unit,
            index,
        })
    }

    pub fn children(&self, id: DieId) -> Vec<DieId> {
        self.node(id)
            .children
            .iter()
            .map(|&index| DieId {
                unit: id.unit,
                index,
            })
            .collect()
    }

    /// First attribute of the given kind, cloned out of the arena.
    pub fn attr(&self, id: DieId, name: DwAt) -> Option<AttrValue> {
        self.node(id)
            .attrs
            .iter()
            .find(|(at, _)| *at == name)
            .map(|(_, value)| value.clone())
    }

    /// All attributes in emission order, cloned out of the arena.
    pub fn attrs(&self, id: DieId) -> Vec<(DwAt, AttrValue)> {
        self.node(id).attrs.clone()
    }

    pub fn attr_u64(&self, id: DieId, name: DwAt) -> Option<u64> {
        self.attr(id, name).and_then(|value| value.as_u64())
    }

    pub fn attr_str(&self, id: DieId, name: DwAt) -> Option<String> {
        match self.attr(id, name) {
            Some(AttrValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// The `DW_AT_name` attribute, or `None` when absent.
    pub fn name(&self, id: DieId) -> Option<String> {
        self.attr_str(id, gimli::DW_AT_name)
    }

    /// The `DW_AT_name` attribute, or the given default when absent.
    pub fn name_or(&self, id: DieId, default: &str) -> String {
        self.name(id).unwrap_or_else(|| default.to_string())
    }
}
