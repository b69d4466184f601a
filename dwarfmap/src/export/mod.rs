//! The DIE-to-JSON transformation engine.
//!
//! A multi-pass walk over the DIE forest: the dispatcher descends
//! containers, entity parsers write fully formed records at the paths
//! the scope resolver computes, and declaration/definition pairs are
//! reconciled through `DW_AT_specification` into a single record.

mod entities;
mod output;
mod scope;
mod typestr;

pub use output::write_pretty;

use crate::core::Result;
use crate::data::die::{AttrValue, DieId};
use crate::file::DwarfFile;
use serde_json::{Map, Value};

/// Walks the DIE forest of an opened file and accumulates the
/// hierarchical JSON document.
pub struct DwarfExporter {
    file: DwarfFile,
    filter: String,
    out: Value,
}

impl DwarfExporter {
    /// `filter` restricts output to entities whose normalized declaration
    /// file starts with the given prefix; empty matches everything.
    pub fn new(file: DwarfFile, filter: impl Into<String>) -> Self {
        Self {
            file,
            filter: filter.into(),
            out: Value::Object(Map::new()),
        }
    }

    /// Process every compilation unit in order, releasing each unit's
    /// cached DIE tree once its entities have been exported.
    pub fn run(&mut self) -> Result<()> {
        for unit in 0..self.file.unit_count() {
            for die in self.file.unit_root_children(unit)? {
                self.parse_die(unit, die);
            }
            tracing::info!(
                "finished compilation unit: {}",
                self.file.unit(unit).name()
            );
            self.file.release_unit(unit);
        }
        Ok(())
    }

    pub fn output(&self) -> &Value {
        &self.out
    }

    pub fn into_output(self) -> Value {
        self.out
    }

    /// Dispatch one DIE by tag. Containers contribute no record at this
    /// level; records are written by their inner declarations.
    pub(crate) fn parse_die(&mut self, unit: usize, die: DieId) {
        match self.file.tag(die) {
            gimli::DW_TAG_namespace => {
                // std and implementation namespaces are opaque
                let name = self.file.name_or(die, "");
                if name == "std" || name.starts_with("__") {
                    return;
                }
                self.descend(unit, die);
            }
            gimli::DW_TAG_class_type
            | gimli::DW_TAG_structure_type
            | gimli::DW_TAG_lexical_block => self.descend(unit, die),
            gimli::DW_TAG_subprogram => self.parse_function(unit, die),
            gimli::DW_TAG_enumeration_type => self.parse_enum(unit, die),
            gimli::DW_TAG_union_type => self.parse_union(unit, die),
            gimli::DW_TAG_variable => self.parse_variable(unit, die, false),
            gimli::DW_TAG_member => self.parse_variable(unit, die, true),
            gimli::DW_TAG_typedef => self.parse_typedef(unit, die),
            gimli::DW_TAG_inheritance => self.parse_inheritance(unit, die),
            gimli::DW_TAG_template_type_parameter
            | gimli::DW_TAG_template_value_parameter
            | gimli::DW_TAG_GNU_template_parameter_pack => {
                self.parse_class_template_params(unit, die)
            }
            _ => {}
        }
    }

    fn descend(&mut self, unit: usize, die: DieId) {
        for child in self.file.children(die) {
            self.parse_die(unit, child);
        }
    }

    fn parse_enum(&mut self, unit: usize, die: DieId) {
        let Some(path) = scope::storage_path(&mut self.file, unit, die, &self.filter) else {
            return;
        };

        let mut info = Map::new();
        info.insert("offset".into(), self.file.offset(die).into());
        for (at, value) in self.file.attrs(die) {
            match at {
                gimli::DW_AT_name => {
                    if let Some(name) = value.as_str() {
                        info.insert("0-name".into(), name.into());
                    }
                }
                gimli::DW_AT_enum_class => {
                    info.insert("0-enum_class".into(), 1.into());
                }
                gimli::DW_AT_decl_line => {
                    if let Some(line) = value.as_u64() {
                        set_pos(&mut info, 0, line);
                    }
                }
                gimli::DW_AT_decl_column => {
                    if let Some(column) = value.as_u64() {
                        set_pos(&mut info, 1, column);
                    }
                }
                _ => {}
            }
        }

        // underlying base type
        info.insert(
            "1-type".into(),
            typestr::type_string(&mut self.file, die, "", None).into(),
        );

        let mut content = Map::new();
        for child in self.file.children(die) {
            if self.file.tag(child) != gimli::DW_TAG_enumerator {
                continue;
            }
            let Some(value) = self.file.attr(child, gimli::DW_AT_const_value) else {
                continue;
            };
            let name = self.file.name_or(child, "");
            let json_value = if value.is_unsigned() {
                value.as_u64().map(Value::from)
            } else {
                value.as_i64().map(Value::from)
            };
            if let Some(v) = json_value {
                content.insert(name, v);
            }
        }
        if !content.is_empty() {
            info.insert("content".into(), Value::Object(content));
        }

        let line = self.file.attr_u64(die, gimli::DW_AT_decl_line).unwrap_or(0);
        let key = format!("{:05}-enum: {}", line, self.file.name_or(die, "`anonymous`"));
        output::slot(&mut self.out, &path)
            .entry(key)
            .or_insert(Value::Object(info));
    }

    fn parse_union(&mut self, unit: usize, die: DieId) {
        let Some(path) = scope::storage_path(&mut self.file, unit, die, &self.filter) else {
            return;
        };

        let mut info = Map::new();
        info.insert("offset".into(), self.file.offset(die).into());
        for (at, value) in self.file.attrs(die) {
            match at {
                gimli::DW_AT_name => {
                    if let Some(name) = value.as_str() {
                        info.insert("0-name".into(), name.into());
                    }
                }
                gimli::DW_AT_decl_line => {
                    if let Some(line) = value.as_u64() {
                        set_pos(&mut info, 0, line);
                    }
                }
                gimli::DW_AT_decl_column => {
                    if let Some(column) = value.as_u64() {
                        set_pos(&mut info, 1, column);
                    }
                }
                gimli::DW_AT_byte_size => {
                    if let Some(size) = value.as_u64() {
                        info.insert("0-byte_size".into(), size.into());
                    }
                }
                _ => {}
            }
        }

        let key = format!("union: {}", self.file.name_or(die, "`anonymous`"));
        output::slot(&mut self.out, &path)
            .entry(key)
            .or_insert(Value::Object(info));

        self.descend(unit, die);
    }

    fn parse_typedef(&mut self, unit: usize, die: DieId) {
        let Some(path) = scope::storage_path(&mut self.file, unit, die, &self.filter) else {
            return;
        };

        let mut info = Map::new();
        info.insert("offset".into(), self.file.offset(die).into());
        for (at, value) in self.file.attrs(die) {
            match at {
                gimli::DW_AT_name => {
                    if let Some(name) = value.as_str() {
                        info.insert("0-name".into(), name.into());
                    }
                }
                gimli::DW_AT_decl_line => {
                    if let Some(line) = value.as_u64() {
                        set_pos(&mut info, 0, line);
                    }
                }
                gimli::DW_AT_decl_column => {
                    if let Some(column) = value.as_u64() {
                        set_pos(&mut info, 1, column);
                    }
                }
                _ => {}
            }
        }
        info.insert(
            "1-ori_type".into(),
            typestr::type_string(&mut self.file, die, "{}", None).into(),
        );

        let line = self.file.attr_u64(die, gimli::DW_AT_decl_line).unwrap_or(0);
        let key = format!(
            "{:05}-typedef: {}",
            line,
            self.file.name_or(die, "`anonymous`")
        );
        output::slot(&mut self.out, &path)
            .entry(key)
            .or_insert(Value::Object(info));
    }

    /// Inheritance attaches to the parent aggregate's scope map under
    /// `0-inheri`, keyed by base offset within the object and base type.
    fn parse_inheritance(&mut self, unit: usize, die: DieId) {
        let Some(parent) = self.file.parent(die) else {
            return;
        };
        let Some(mut path) = scope::storage_path(&mut self.file, unit, parent, &self.filter)
        else {
            return;
        };
        path.push(self.aggregate_key(parent));

        let data_location = self
            .file
            .attr(die, gimli::DW_AT_data_member_location)
            .and_then(|value| member_offset(&value))
            .unwrap_or(0);
        let accessibility = self
            .file
            .attr_u64(die, gimli::DW_AT_accessibility)
            .unwrap_or(0);
        let key = format!(
            "{:05}-{}",
            data_location,
            typestr::type_string(&mut self.file, die, "", None)
        );

        let slot = output::slot(&mut self.out, &path);
        let inheri = slot
            .entry("0-inheri")
            .or_insert_with(|| Value::Object(Map::new()));
        output::ensure_object(inheri).insert(key, accessibility.into());
    }

    /// Class-level template parameters: the first parameter DIE seen for
    /// an aggregate writes the list; later siblings leave it untouched.
    fn parse_class_template_params(&mut self, unit: usize, die: DieId) {
        let Some(parent) = self.file.parent(die) else {
            return;
        };
        let Some(mut path) = scope::storage_path(&mut self.file, unit, parent, &self.filter)
        else {
            return;
        };
        path.push(self.aggregate_key(parent));

        let entry = match self.file.tag(die) {
            gimli::DW_TAG_template_type_parameter => self.file.name_or(die, "/*Unnamed*/"),
            gimli::DW_TAG_template_value_parameter => {
                let name = self.file.name_or(die, "/*Unnamed*/");
                typestr::type_string(&mut self.file, die, &name, None)
            }
            _ => format!("...{}", self.file.name_or(die, "/*Unnamed*/")),
        };

        let slot = output::slot(&mut self.out, &path);
        let params = slot
            .entry("0-template_param")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = params {
            if list.is_empty() {
                list.push(entry.into());
            }
        }
    }

    fn aggregate_key(&self, die: DieId) -> String {
        let kind = if self.file.tag(die) == gimli::DW_TAG_class_type {
            "class"
        } else {
            "struct"
        };
        format!("{kind}: {}", self.file.name_or(die, "`anonymous`"))
    }
}

/// Set one slot of a record's `0-decl_pos` array, padding with nulls so
/// a column can arrive before its line.
pub(crate) fn set_pos(record: &mut Map<String, Value>, index: usize, value: u64) {
    let slot = record
        .entry("0-decl_pos")
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(list) = slot {
        while list.len() <= index {
            list.push(Value::Null);
        }
        list[index] = value.into();
    }
}

/// A member offset is usually a plain constant, but some producers emit a
/// one-operation location expression instead.
pub(crate) fn member_offset(value: &AttrValue) -> Option<u64> {
    if let Some(v) = value.as_u64() {
        return Some(v);
    }
    let first = value.as_loc()?.first()?;
    match gimli::DwOp(first.op) {
        gimli::DW_OP_constu | gimli::DW_OP_consts | gimli::DW_OP_plus_uconst => Some(first.opd1),
        _ => None,
    }
}

/// Navigate to a record, creating it (and the path) when missing.
pub(crate) fn record_at<'a>(
    out: &'a mut Value,
    path: &[String],
    key: &str,
) -> &'a mut Map<String, Value> {
    let slot = output::slot(out, path);
    let record = slot
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    output::ensure_object(record)
}

pub(crate) fn slot_contains(out: &mut Value, path: &[String], key: &str) -> bool {
    output::slot(out, path).contains_key(key)
}
