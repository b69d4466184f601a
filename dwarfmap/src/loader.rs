//! Object loading and DIE arena materialization.
//!
//! Sections are read through `EndianSlice<'static>` readers backed by the
//! memory map, which stays alive inside [`LoadedDwarf`] for the lifetime
//! of the file.

use crate::core::{DwarfError, Result};
use crate::data::die::{AttrValue, DieNode, DieTree};
use crate::data::{loc, path};
use crate::file::CompileUnit;
use gimli::{EndianSlice, LittleEndian};
use object::{Object, ObjectSection};
use std::borrow::Cow;
use std::path::Path;

pub(crate) type Reader = EndianSlice<'static, LittleEndian>;

/// The gimli view of an opened file plus the memory keeping it valid.
pub(crate) struct LoadedDwarf {
    dwarf: gimli::Dwarf<Reader>,
    headers: Vec<gimli::UnitHeader<Reader>>,
    /// Keeps the section memory behind the `'static` readers alive.
    _mmap: memmap2::Mmap,
}

impl LoadedDwarf {
    /// Open an executable or object file and scan its compilation units.
    ///
    /// The returned units carry their name, source-file table, and
    /// section-offset span; their DIE trees are materialized later, on
    /// first access.
    pub(crate) fn open(file_path: &Path) -> Result<(Self, Vec<CompileUnit>)> {
        let file = std::fs::File::open(file_path)?;
        let mmap = unsafe { memmap2::MmapOptions::new().map(&file)? };
        // SAFETY: the mapping is stored in the returned struct and outlives
        // every reader derived from it.
        let data: &'static [u8] = unsafe { std::mem::transmute(&mmap[..]) };
        let object = object::File::parse(data)?;

        let load_section = |id: gimli::SectionId| -> Result<Reader> {
            let bytes: &'static [u8] = match object.section_by_name(id.name()) {
                Some(section) => match section.uncompressed_data()? {
                    Cow::Borrowed(bytes) => bytes,
                    // Decompressed sections have no backing mapping; leak
                    // them so every reader is uniformly 'static.
                    Cow::Owned(bytes) => Box::leak(bytes.into_boxed_slice()),
                },
                None => &[],
            };
            Ok(EndianSlice::new(bytes, LittleEndian))
        };
        let dwarf = gimli::Dwarf::load(load_section)?;

        let mut headers = Vec::new();
        let mut units = Vec::new();
        let mut iter = dwarf.units();
        while let Some(header) = iter.next()? {
            let Some(start) = header.offset().as_debug_info_offset() else {
                continue;
            };
            let end = start.0 + header.length_including_self();
            let unit = dwarf.unit(header.clone())?;
            let name = unit
                .name
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let version = unit.header.version();
            let files = collect_source_files(&dwarf, &unit);
            tracing::debug!(
                "unit '{}': DWARF v{}, {} source files, span {:#x}..{:#x}",
                name,
                version,
                files.len(),
                start.0,
                end
            );
            headers.push(header);
            units.push(CompileUnit {
                name,
                version,
                span: (start.0 as u64, end as u64),
                files,
                tree: None,
            });
        }

        if headers.is_empty() {
            return Err(DwarfError::NoDwarf {
                path: file_path.to_path_buf(),
            }
            .into());
        }

        Ok((
            Self {
                dwarf,
                headers,
                _mmap: mmap,
            },
            units,
        ))
    }

    /// Build the DIE arena for one unit.
    pub(crate) fn materialize(&self, unit_index: usize) -> Result<DieTree> {
        let header = self.headers[unit_index].clone();
        let unit = self.dwarf.unit(header)?;

        let mut tree = DieTree::default();
        let mut stack: Vec<usize> = Vec::new();
        let mut depth: isize = 0;
        let mut entries = unit.entries();
        while let Some((delta_depth, entry)) = entries.next_dfs()? {
            depth += delta_depth;
            let level = depth.max(0) as usize;
            stack.truncate(level);
            let parent = level.checked_sub(1).map(|up| stack[up]);

            let offset = entry
                .offset()
                .to_debug_info_offset(&unit.header)
                .map(|o| o.0 as u64)
                .unwrap_or(0);

            let mut attrs = Vec::new();
            let mut iter = entry.attrs();
            while let Some(attr) = iter.next()? {
                if let Some(value) = convert_attr_value(&self.dwarf, &unit, attr.value()) {
                    attrs.push((attr.name(), value));
                }
            }

            let index = tree.push(DieNode {
                offset,
                tag: entry.tag(),
                parent,
                children: Vec::new(),
                attrs,
            });
            stack.push(index);
        }
        Ok(tree)
    }
}

/// Build the unit's source-file table in `DW_AT_decl_file` index space.
fn collect_source_files(dwarf: &gimli::Dwarf<Reader>, unit: &gimli::Unit<Reader>) -> Vec<String> {
    let Some(program) = &unit.line_program else {
        return Vec::new();
    };
    let header = program.header();
    let version = unit.header.version();
    let comp_dir = unit
        .comp_dir
        .map(|d| d.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut directories = Vec::new();
    for dir_entry in header.include_directories() {
        if let Ok(dir) = dwarf.attr_string(unit, *dir_entry) {
            directories.push(dir.to_string_lossy().into_owned());
        }
    }

    let mut files = Vec::new();
    for file_entry in header.file_names() {
        let filename = dwarf
            .attr_string(unit, file_entry.path_name())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        files.push(path::resolve_file_path(
            version,
            &comp_dir,
            &directories,
            file_entry.directory_index(),
            &filename,
        ));
    }
    files
}

/// Map a gimli attribute value onto the arena's tagged union.
///
/// References are rewritten to global `.debug_info` offsets; all string
/// indirections go through the string sections; unknown forms are
/// dropped.
fn convert_attr_value(
    dwarf: &gimli::Dwarf<Reader>,
    unit: &gimli::Unit<Reader>,
    value: gimli::AttributeValue<Reader>,
) -> Option<AttrValue> {
    use gimli::AttributeValue as V;
    let converted = match value {
        V::Addr(v) => AttrValue::U64(v),
        V::Udata(v) => AttrValue::U64(v),
        V::Data1(v) => AttrValue::U64(u64::from(v)),
        V::Data2(v) => AttrValue::U64(u64::from(v)),
        V::Data4(v) => AttrValue::U64(u64::from(v)),
        V::Data8(v) => AttrValue::U64(v),
        V::Sdata(v) => AttrValue::I64(v),
        V::Flag(v) => AttrValue::U32(u32::from(v)),
        V::FileIndex(v) => AttrValue::U64(v),
        V::Accessibility(v) => AttrValue::U64(u64::from(v.0)),
        V::Virtuality(v) => AttrValue::U64(u64::from(v.0)),
        V::Inline(v) => AttrValue::U64(u64::from(v.0)),
        V::Encoding(v) => AttrValue::U64(u64::from(v.0)),
        V::Language(v) => AttrValue::U64(u64::from(v.0)),
        V::UnitRef(offset) => {
            AttrValue::U64(offset.to_debug_info_offset(&unit.header)?.0 as u64)
        }
        V::DebugInfoRef(offset) => AttrValue::U64(offset.0 as u64),
        V::Block(data) => {
            let bytes = data.slice();
            match bytes.len() {
                4 => AttrValue::U32(u32::from_le_bytes(bytes.try_into().ok()?)),
                8 => AttrValue::U64(u64::from_le_bytes(bytes.try_into().ok()?)),
                _ => return None,
            }
        }
        V::Exprloc(expr) => {
            let ops = loc::decode_expression(expr.0.slice(), unit.header.address_size());
            if ops.is_empty() {
                return None;
            }
            AttrValue::Loc(ops)
        }
        V::String(_) | V::DebugStrRef(_) | V::DebugLineStrRef(_) | V::DebugStrOffsetsIndex(_) => {
            let s = dwarf.attr_string(unit, value).ok()?;
            AttrValue::Str(s.to_string_lossy().into_owned())
        }
        _ => return None,
    };
    Some(converted)
}
