//! Scope resolution: where in the output tree a DIE's record belongs.

use crate::data::die::DieId;
use crate::data::path;
use crate::file::DwarfFile;

/// Compute the ordered key path under which a DIE's record is stored:
/// normalized declaration file first, then one key per enclosing scope,
/// ending with the direct parent. `None` means the DIE is skipped: it
/// has no declaration file, the file index is out of range, or the file
/// does not match the user filter.
pub(crate) fn storage_path(
    file: &mut DwarfFile,
    unit: usize,
    die: DieId,
    filter: &str,
) -> Option<Vec<String>> {
    let decl_index = file.attr_u64(die, gimli::DW_AT_decl_file)?;
    let mut decl_file = path::normalize(file.unit(unit).source_file(decl_index)?);
    if !decl_file.starts_with(filter) {
        return None;
    }

    let mut keys: Vec<String> = Vec::new();
    let mut current = file.parent(die);
    while let Some(ancestor) = current {
        let name = file.name_or(ancestor, "`anonymous`");
        match file.tag(ancestor) {
            gimli::DW_TAG_namespace => keys.push(format!("namespace: {name}")),
            gimli::DW_TAG_class_type => keys.push(format!("class: {name}")),
            gimli::DW_TAG_structure_type => keys.push(format!("struct: {name}")),
            gimli::DW_TAG_union_type => {
                keys.push("content".to_string());
                keys.push(format!("union: {name}"));
            }
            gimli::DW_TAG_subprogram => {
                if let Some(spec_offset) =
                    file.attr_u64(ancestor, gimli::DW_AT_specification)
                {
                    if let Some(spec) = file.find_die_by_offset(spec_offset) {
                        keys.push("local_info".to_string());
                        keys.push(function_key(file, spec));
                        // An out-of-line body inherits the declaration's
                        // file, not the translation unit's.
                        if let Some(index) = file.attr_u64(spec, gimli::DW_AT_decl_file) {
                            if let Some(resolved) = file.unit(unit).source_file(index) {
                                decl_file = path::normalize(resolved);
                            }
                        }
                        current = file.parent(spec);
                        continue;
                    }
                    // dangling specification: this ancestor contributes nothing
                } else {
                    keys.push("local_info".to_string());
                    keys.push(function_key(file, ancestor));
                }
            }
            gimli::DW_TAG_lexical_block => {
                keys.push(format!("{}-lexical_block", file.offset(ancestor)))
            }
            _ => {}
        }
        current = file.parent(ancestor);
    }

    keys.push(decl_file);
    keys.reverse();
    Some(keys)
}

/// Storage key of a function record: zero-padded declaration line plus
/// the name, so sibling entities sort in source order.
pub(crate) fn function_key(file: &DwarfFile, die: DieId) -> String {
    let line = file.attr_u64(die, gimli::DW_AT_decl_line).unwrap_or(0);
    format!("{:05}-func: {}", line, file.name_or(die, "`anonymous`"))
}

/// Storage key of a variable or member record.
pub(crate) fn variable_key(file: &DwarfFile, die: DieId, member: bool) -> String {
    let line = file.attr_u64(die, gimli::DW_AT_decl_line).unwrap_or(0);
    format!(
        "{:05}-{}: {}",
        line,
        if member { "memb" } else { "var" },
        file.name_or(die, "`Unnamed`")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::testing::*;

    #[test]
    fn test_skip_without_decl_file() {
        let mut builder = TreeBuilder::new();
        let root = builder.die(None, gimli::DW_TAG_compile_unit, vec![]);
        let var = builder.die(Some(root), gimli::DW_TAG_variable, vec![]);
        let mut file = file_with(vec![builder.build("a.cpp", &["/src/a.cpp"])]);
        let id = DieId {
            unit: 0,
            index: var,
        };
        assert!(storage_path(&mut file, 0, id, "").is_none());
    }

    #[test]
    fn test_skip_out_of_range_index_and_filter() {
        let mut builder = TreeBuilder::new();
        let root = builder.die(None, gimli::DW_TAG_compile_unit, vec![]);
        let var = builder.die(
            Some(root),
            gimli::DW_TAG_variable,
            vec![au(gimli::DW_AT_decl_file, 7)],
        );
        let ok = builder.die(
            Some(root),
            gimli::DW_TAG_variable,
            vec![au(gimli::DW_AT_decl_file, 1)],
        );
        let mut file = file_with(vec![builder.build("a.cpp", &["/src/a.cpp"])]);
        assert!(storage_path(&mut file, 0, DieId { unit: 0, index: var }, "").is_none());
        assert!(storage_path(&mut file, 0, DieId { unit: 0, index: ok }, "/other").is_none());
        assert_eq!(
            storage_path(&mut file, 0, DieId { unit: 0, index: ok }, "/src"),
            Some(vec!["/src/a.cpp".to_string()])
        );
    }

    #[test]
    fn test_nested_scopes_in_order() {
        let mut builder = TreeBuilder::new();
        let root = builder.die(None, gimli::DW_TAG_compile_unit, vec![]);
        let ns = builder.die(
            Some(root),
            gimli::DW_TAG_namespace,
            vec![astr(gimli::DW_AT_name, "n")],
        );
        let class = builder.die(
            Some(ns),
            gimli::DW_TAG_class_type,
            vec![astr(gimli::DW_AT_name, "C")],
        );
        let member = builder.die(
            Some(class),
            gimli::DW_TAG_member,
            vec![au(gimli::DW_AT_decl_file, 1)],
        );
        let mut file = file_with(vec![builder.build("a.cpp", &["/inc/a.h"])]);
        assert_eq!(
            storage_path(&mut file, 0, DieId { unit: 0, index: member }, ""),
            Some(vec![
                "/inc/a.h".to_string(),
                "namespace: n".to_string(),
                "class: C".to_string(),
            ])
        );
    }

    #[test]
    fn test_anonymous_union_contributes_content_pair() {
        let mut builder = TreeBuilder::new();
        let root = builder.die(None, gimli::DW_TAG_compile_unit, vec![]);
        let s = builder.die(
            Some(root),
            gimli::DW_TAG_structure_type,
            vec![astr(gimli::DW_AT_name, "S")],
        );
        let union = builder.die(Some(s), gimli::DW_TAG_union_type, vec![]);
        let member = builder.die(
            Some(union),
            gimli::DW_TAG_member,
            vec![au(gimli::DW_AT_decl_file, 1)],
        );
        let mut file = file_with(vec![builder.build("b.c", &["/src/b.c"])]);
        // after reversal the union key precedes its `content` map, so
        // members nest inside the union's record
        assert_eq!(
            storage_path(&mut file, 0, DieId { unit: 0, index: member }, ""),
            Some(vec![
                "/src/b.c".to_string(),
                "struct: S".to_string(),
                "union: `anonymous`".to_string(),
                "content".to_string(),
            ])
        );
    }

    #[test]
    fn test_local_scope_through_specification() {
        // A local variable in an out-of-line member function body lands
        // under the header that declares the function.
        let mut builder = TreeBuilder::new();
        let root = builder.die(None, gimli::DW_TAG_compile_unit, vec![]);
        let class = builder.die(
            Some(root),
            gimli::DW_TAG_class_type,
            vec![astr(gimli::DW_AT_name, "C")],
        );
        let decl = builder.die(
            Some(class),
            gimli::DW_TAG_subprogram,
            vec![
                astr(gimli::DW_AT_name, "foo"),
                au(gimli::DW_AT_decl_file, 2),
                au(gimli::DW_AT_decl_line, 12),
            ],
        );
        let decl_offset = builder.offset_of(decl);
        let body = builder.die(
            Some(root),
            gimli::DW_TAG_subprogram,
            vec![au(gimli::DW_AT_specification, decl_offset)],
        );
        let local = builder.die(
            Some(body),
            gimli::DW_TAG_variable,
            vec![au(gimli::DW_AT_decl_file, 1)],
        );
        let mut file = file_with(vec![builder.build("a.cpp", &["/src/a.cpp", "/inc/a.h"])]);
        assert_eq!(
            storage_path(&mut file, 0, DieId { unit: 0, index: local }, ""),
            Some(vec![
                "/inc/a.h".to_string(),
                "class: C".to_string(),
                "00012-func: foo".to_string(),
                "local_info".to_string(),
            ])
        );
    }

    #[test]
    fn test_lexical_block_key_uses_offset() {
        let mut builder = TreeBuilder::new();
        let root = builder.die(None, gimli::DW_TAG_compile_unit, vec![]);
        let func = builder.die(
            Some(root),
            gimli::DW_TAG_subprogram,
            vec![
                astr(gimli::DW_AT_name, "f"),
                au(gimli::DW_AT_decl_line, 3),
            ],
        );
        let block = builder.die(Some(func), gimli::DW_TAG_lexical_block, vec![]);
        let block_offset = builder.offset_of(block);
        let local = builder.die(
            Some(block),
            gimli::DW_TAG_variable,
            vec![au(gimli::DW_AT_decl_file, 1)],
        );
        let mut file = file_with(vec![builder.build("a.c", &["/src/a.c"])]);
        assert_eq!(
            storage_path(&mut file, 0, DieId { unit: 0, index: local }, ""),
            Some(vec![
                "/src/a.c".to_string(),
                "00003-func: f".to_string(),
                "local_info".to_string(),
                format!("{block_offset}-lexical_block"),
            ])
        );
    }
}
