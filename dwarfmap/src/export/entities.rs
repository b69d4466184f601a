//! Function and variable parsers.
//!
//! Both entities come in two shapes: a plain declaration, and an
//! out-of-line definition pointing back at its declaration through
//! `DW_AT_specification`. The definition branch ensures the declaration
//! record exists (parsing the specification DIE on demand), then overlays
//! the fields only the definition carries. The chase is bounded to one
//! hop: the definition branch calls the declaration branch directly, so a
//! self-referential specification chain cannot recurse.

use super::{
    member_offset, record_at, scope, set_pos, slot_contains, typestr, DwarfExporter,
};
use crate::data::die::{AttrValue, DieId};
use serde_json::{Map, Value};

impl DwarfExporter {
    pub(super) fn parse_function(&mut self, unit: usize, die: DieId) {
        // reserved names never produce records
        if self.file.name_or(die, "").starts_with("__") {
            return;
        }
        if let Some(spec_offset) = self.file.attr_u64(die, gimli::DW_AT_specification) {
            self.parse_function_definition(unit, die, spec_offset);
        } else {
            self.parse_function_declaration(unit, die);
        }
    }

    fn parse_function_definition(&mut self, unit: usize, die: DieId, spec_offset: u64) {
        let Some(spec) = self.file.find_die_by_offset(spec_offset) else {
            return;
        };
        let Some(path) = scope::storage_path(&mut self.file, unit, spec, &self.filter) else {
            return;
        };
        let key = scope::function_key(&self.file, spec);

        // parameter names usually appear only on the definition
        let mut param_names: Vec<Value> = Vec::new();
        let mut deferred: Vec<DieId> = Vec::new();
        for child in self.file.children(die) {
            match self.file.tag(child) {
                gimli::DW_TAG_formal_parameter | gimli::DW_TAG_unspecified_parameters => {
                    param_names.push(self.file.name_or(child, "/*Unnamed*/").into())
                }
                gimli::DW_TAG_GNU_formal_parameter_pack => param_names.push("...args".into()),
                _ => deferred.push(child),
            }
        }

        let linkage = self.file.attr_str(die, gimli::DW_AT_linkage_name);
        let definition_offset = self.file.offset(die);

        if !slot_contains(&mut self.out, &path, &key) {
            self.parse_function_declaration(unit, spec);
        }
        let record = record_at(&mut self.out, &path, &key);
        if !param_names.is_empty() {
            record.insert("2-param_name".into(), Value::Array(param_names));
        }
        if let Some(linkage) = linkage {
            record.insert("0-linkage".into(), linkage.into());
        }
        record.insert("otherOffset".into(), definition_offset.into());

        // locals and nested declarations below the definition body
        for child in deferred {
            self.parse_die(unit, child);
        }
    }

    pub(super) fn parse_function_declaration(&mut self, unit: usize, die: DieId) {
        if self.file.name_or(die, "").starts_with("__") {
            return;
        }
        let Some(path) = scope::storage_path(&mut self.file, unit, die, &self.filter) else {
            return;
        };
        let key = scope::function_key(&self.file, die);

        let mut info = Map::new();
        info.insert("offset".into(), self.file.offset(die).into());
        for (at, value) in self.file.attrs(die) {
            match at {
                gimli::DW_AT_name => {
                    if let Some(name) = value.as_str() {
                        info.insert("0-name".into(), name.into());
                    }
                }
                gimli::DW_AT_linkage_name => {
                    if let Some(linkage) = value.as_str() {
                        info.insert("0-linkage".into(), linkage.into());
                    }
                }
                gimli::DW_AT_external => {
                    info.insert("0-external".into(), 1.into());
                }
                gimli::DW_AT_accessibility => {
                    if let Some(v) = value.as_u64() {
                        info.insert("1-accessibility".into(), v.into());
                    }
                }
                gimli::DW_AT_defaulted => {
                    if let Some(v) = value.as_u64() {
                        info.insert("1-default".into(), v.into());
                    }
                }
                gimli::DW_AT_deleted => {
                    info.insert("1-deleted".into(), 1.into());
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
                gimli::DW_AT_virtuality => {
                    if let Some(v) = value.as_u64() {
                        info.insert("1-virtual".into(), v.into());
                    }
                }
                gimli::DW_AT_inline => {
                    if let Some(v) = value.as_u64() {
                        info.insert("1-inline".into(), v.into());
                    }
                }
                gimli::DW_AT_vtable_elem_location => {
                    let slot = value
                        .as_loc()
                        .and_then(|ops| ops.first())
                        .map(|op| op.opd1)
                        .or_else(|| value.as_u64());
                    if let Some(v) = slot {
                        info.insert("1-vtable_loc".into(), v.into());
                    }
                }
                gimli::DW_AT_reference => {
                    info.insert("1-ref_decorate".into(), 1.into());
                }
                gimli::DW_AT_rvalue_reference => {
                    info.insert("1-r_ref_decorate".into(), 1.into());
                }
                gimli::DW_AT_artificial => {
                    info.insert("1-artificial".into(), 1.into());
                }
                _ => {}
            }
        }

        // return type
        info.insert(
            "1-type".into(),
            typestr::type_string(&mut self.file, die, "", None).into(),
        );

        let mut param_types: Vec<Value> = Vec::new();
        let mut param_names: Vec<Value> = Vec::new();
        let mut template_params: Vec<Value> = Vec::new();
        let mut deferred: Vec<DieId> = Vec::new();
        let mut const_decorate = false;
        for child in self.file.children(die) {
            match self.file.tag(child) {
                gimli::DW_TAG_formal_parameter => {
                    if self.file.attr(child, gimli::DW_AT_artificial).is_some() {
                        // implicit object pointer; a const pointee marks a
                        // const member function
                        let mut cv = typestr::CvQualifiers::default();
                        param_types.push(
                            typestr::type_string(
                                &mut self.file,
                                child,
                                "{obj_ptr}",
                                Some(&mut cv),
                            )
                            .into(),
                        );
                        if cv.is_const {
                            const_decorate = true;
                        }
                    } else {
                        param_types.push(
                            typestr::type_string(&mut self.file, child, "{}", None).into(),
                        );
                    }
                    param_names.push(self.file.name_or(child, "/*Unnamed*/").into());
                }
                gimli::DW_TAG_unspecified_parameters => {
                    param_types.push("...".into());
                    param_names.push(self.file.name_or(child, "/*Unnamed*/").into());
                }
                gimli::DW_TAG_GNU_formal_parameter_pack => param_names.push("...args".into()),
                gimli::DW_TAG_template_type_parameter => {
                    template_params.push(self.file.name_or(child, "/*Unnamed*/").into())
                }
                gimli::DW_TAG_template_value_parameter => {
                    let name = self.file.name_or(child, "/*Unnamed*/");
                    template_params
                        .push(typestr::type_string(&mut self.file, child, &name, None).into());
                }
                gimli::DW_TAG_GNU_template_parameter_pack => template_params
                    .push(format!("...{}", self.file.name_or(child, "/*Unnamed*/")).into()),
                _ => deferred.push(child),
            }
        }
        if const_decorate {
            info.insert("const_decorate".into(), 1.into());
        }
        if !param_types.is_empty() {
            info.insert("2-param_type".into(), Value::Array(param_types));
        }
        if !template_params.is_empty() {
            info.insert("2-template_param".into(), Value::Array(template_params));
        }
        info.insert("2-param_name".into(), Value::Array(param_names));

        super::output::slot(&mut self.out, &path)
            .entry(key)
            .or_insert(Value::Object(info));

        for child in deferred {
            self.parse_die(unit, child);
        }
    }

    pub(super) fn parse_variable(&mut self, unit: usize, die: DieId, member: bool) {
        if let Some(spec_offset) = self.file.attr_u64(die, gimli::DW_AT_specification) {
            let Some(spec) = self.file.find_die_by_offset(spec_offset) else {
                return;
            };
            let Some(path) = scope::storage_path(&mut self.file, unit, spec, &self.filter)
            else {
                return;
            };
            let member = self.file.tag(spec) == gimli::DW_TAG_member;
            let key = scope::variable_key(&self.file, spec, member);

            let location = self
                .file
                .attr(die, gimli::DW_AT_location)
                .and_then(|value| first_op_string(&value));
            let linkage = self.file.attr_str(die, gimli::DW_AT_linkage_name);

            if !slot_contains(&mut self.out, &path, &key) {
                self.parse_variable_declaration(unit, spec, member);
            }
            let record = record_at(&mut self.out, &path, &key);
            if let Some(location) = location {
                record.entry("1-location").or_insert(location.into());
            }
            if let Some(linkage) = linkage {
                record.insert("1-linkage".into(), linkage.into());
            }
        } else {
            self.parse_variable_declaration(unit, die, member);
        }
    }

    fn parse_variable_declaration(&mut self, unit: usize, die: DieId, member: bool) {
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
                gimli::DW_AT_data_member_location => {
                    if let Some(offset) = member_offset(&value) {
                        info.insert("1-member_location".into(), offset.into());
                    }
                }
                gimli::DW_AT_declaration => {
                    info.insert("0-declaration".into(), 1.into());
                }
                gimli::DW_AT_external => {
                    info.insert("0-external".into(), 1.into());
                }
                gimli::DW_AT_accessibility => {
                    if let Some(v) = value.as_u64() {
                        info.insert("1-accessibility".into(), v.into());
                    }
                }
                gimli::DW_AT_inline => {
                    if let Some(v) = value.as_u64() {
                        info.insert("1-inline".into(), v.into());
                    }
                }
                gimli::DW_AT_location => {
                    if let Some(text) = first_op_string(&value) {
                        info.insert("1-location".into(), text.into());
                    }
                }
                gimli::DW_AT_linkage_name => {
                    if let Some(linkage) = value.as_str() {
                        info.insert("1-linkage".into(), linkage.into());
                    }
                }
                gimli::DW_AT_const_value => {
                    // signedness follows the attribute's value variant
                    let constant = if value.is_unsigned() {
                        value.as_u64().map(Value::from)
                    } else {
                        value.as_i64().map(Value::from)
                    };
                    if let Some(constant) = constant {
                        info.insert("1-const_val".into(), constant);
                    }
                }
                gimli::DW_AT_bit_size => {
                    if let Some(v) = value.as_u64() {
                        info.insert("1-bit_size".into(), v.into());
                    }
                }
                gimli::DW_AT_bit_offset => {
                    if let Some(v) = value.as_u64() {
                        info.insert("1-bit_offset".into(), v.into());
                    }
                }
                _ => {}
            }
        }

        // the variable's own name doubles as the declarator placeholder,
        // so arrays read e.g. `int foo[4]`
        let placeholder = self.file.name_or(die, "`Unnamed`");
        info.insert(
            "1-type".into(),
            typestr::type_string(&mut self.file, die, &placeholder, None).into(),
        );

        let key = scope::variable_key(&self.file, die, member);
        super::output::slot(&mut self.out, &path)
            .entry(key)
            .or_insert(Value::Object(info));
    }
}

/// Stringify the first operation of a location attribute.
fn first_op_string(value: &AttrValue) -> Option<String> {
    let text = value.as_loc()?.first()?.to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
