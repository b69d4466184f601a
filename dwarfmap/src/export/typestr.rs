//! Source-level type string reconstruction.
//!
//! Walks the chain of type-modifying DIEs hanging off `DW_AT_type` and
//! folds each construct into a C-style declarator around the caller's
//! placeholder (a variable name, `{}`, or empty).

use crate::data::die::DieId;
use crate::file::DwarfFile;

/// Qualifiers still pending at the end of a chain, i.e. the ones carried
/// by the terminal pointee. Lets the function parser detect `const`
/// member functions through their implicit object pointer.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct CvQualifiers {
    pub(crate) is_const: bool,
    pub(crate) is_volatile: bool,
}

/// Reconstruct the declarator string for a DIE's `DW_AT_type` chain.
///
/// A missing `type` attribute yields `void <placeholder>`; a dangling
/// reference ends the chain with whatever has accumulated so far.
pub(crate) fn type_string(
    file: &mut DwarfFile,
    die: DieId,
    placeholder: &str,
    cv: Option<&mut CvQualifiers>,
) -> String {
    let Some(type_offset) = file.attr_u64(die, gimli::DW_AT_type) else {
        return format!("void {placeholder}");
    };

    let mut type_name = placeholder.to_string();
    let mut is_const = false;
    let mut is_volatile = false;
    // false while the next construct attaches on the left (start, or just
    // after an array or subroutine); true after *, &, &&, __restrict or
    // pointer-to-member, where a left-side construct must parenthesize.
    let mut right_side = false;

    let mut current = file.find_die_by_offset(type_offset);
    while let Some(node) = current {
        if file.name(node).is_some_and(|n| !n.is_empty()) {
            type_name = format!("{} {}", qualified_name(file, node), type_name);
            break;
        }

        let mut no_void = false;
        match file.tag(node) {
            gimli::DW_TAG_const_type => is_const = true,
            gimli::DW_TAG_volatile_type => is_volatile = true,
            gimli::DW_TAG_pointer_type => {
                type_name = format!("*{}{}", take_pending(&mut is_volatile, &mut is_const), type_name);
                right_side = true;
            }
            gimli::DW_TAG_reference_type => {
                type_name = format!("&{}{}", take_pending(&mut is_volatile, &mut is_const), type_name);
                right_side = true;
            }
            gimli::DW_TAG_rvalue_reference_type => {
                type_name = format!("&&{}{}", take_pending(&mut is_volatile, &mut is_const), type_name);
                right_side = true;
            }
            gimli::DW_TAG_restrict_type => {
                type_name = format!(
                    "__restrict {}{}",
                    take_pending(&mut is_volatile, &mut is_const),
                    type_name
                );
                right_side = true;
            }
            gimli::DW_TAG_array_type => {
                if right_side {
                    type_name = format!("({type_name})");
                }
                for child in file.children(node) {
                    if file.tag(child) != gimli::DW_TAG_subrange_type {
                        continue;
                    }
                    if let Some(count) = file.attr_u64(child, gimli::DW_AT_count) {
                        type_name.push_str(&format!("[{count}]"));
                    } else if let Some(upper) = file.attr_u64(child, gimli::DW_AT_upper_bound) {
                        type_name.push_str(&format!("[{}]", upper + 1));
                    } else {
                        type_name.push_str("[no_range]");
                    }
                }
                right_side = false;
            }
            gimli::DW_TAG_ptr_to_member_type => {
                let containing = containing_type_name(file, node);
                type_name = format!(
                    "{containing}::*{}{}",
                    take_pending(&mut is_volatile, &mut is_const),
                    type_name
                );
                right_side = true;
            }
            gimli::DW_TAG_subroutine_type => {
                if right_side {
                    type_name = format!("({type_name})");
                }
                type_name = append_subroutine(file, node, type_name);
                right_side = false;
            }
            gimli::DW_TAG_union_type => {
                type_name = format!("`anony_union_{}` {}", file.offset(node), type_name);
                no_void = true;
            }
            gimli::DW_TAG_class_type => {
                type_name = format!("`anony_class_{}` {}", file.offset(node), type_name);
                no_void = true;
            }
            gimli::DW_TAG_structure_type => {
                type_name = format!("`anony_struct_{}` {}", file.offset(node), type_name);
                no_void = true;
            }
            gimli::DW_TAG_enumeration_type => {
                type_name = format!("`anony_enum_{}` {}", file.offset(node), type_name);
                no_void = true;
            }
            _ => {}
        }

        match file.attr_u64(node, gimli::DW_AT_type) {
            None => {
                if !no_void {
                    type_name = format!("void {type_name}");
                }
                break;
            }
            Some(next) => current = file.find_die_by_offset(next),
        }
    }

    if let Some(out) = cv {
        out.is_const = is_const;
        out.is_volatile = is_volatile;
    }
    format!(
        "{}{}{}",
        if is_volatile { "volatile " } else { "" },
        if is_const { "const " } else { "" },
        type_name
    )
}

/// Consume pending cv qualifiers so they attach right after a pointer-like
/// symbol (`int *const x`) instead of the front prefix.
fn take_pending(is_volatile: &mut bool, is_const: &mut bool) -> String {
    let mut pending = String::new();
    if *is_volatile {
        pending.push_str("volatile ");
    }
    if *is_const {
        pending.push_str("const ");
    }
    *is_volatile = false;
    *is_const = false;
    pending
}

/// Qualified name of the containing type of a pointer-to-member, with
/// error placeholders for missing or dangling references.
fn containing_type_name(file: &mut DwarfFile, die: DieId) -> String {
    match file.attr_u64(die, gimli::DW_AT_containing_type) {
        None => "`err_type`".to_string(),
        Some(offset) => match file.find_die_by_offset(offset) {
            None => format!("`err_type_{offset}`"),
            Some(containing) => qualified_name(file, containing),
        },
    }
}

/// Append a subroutine's parameter list and trailing decorations:
/// `(StructA::*x)` becomes `(StructA::*x)(int, int) const &`.
fn append_subroutine(file: &mut DwarfFile, die: DieId, mut type_name: String) -> String {
    let mut params: Vec<String> = Vec::new();
    let mut const_function = false;
    for child in file.children(die) {
        match file.tag(child) {
            gimli::DW_TAG_formal_parameter => {
                if file.attr(child, gimli::DW_AT_artificial).is_some() {
                    // the implicit object pointer only contributes its
                    // constness
                    let mut cv = CvQualifiers::default();
                    let _ = type_string(file, child, "this", Some(&mut cv));
                    const_function = cv.is_const;
                } else {
                    params.push(type_string(file, child, "", None).trim_end().to_string());
                }
            }
            gimli::DW_TAG_unspecified_parameters => params.push("...".to_string()),
            _ => {}
        }
    }
    type_name.push('(');
    type_name.push_str(&params.join(", "));
    type_name.push(')');
    if const_function {
        type_name.push_str(" const");
    }
    if file.attr(die, gimli::DW_AT_reference).is_some() {
        type_name.push_str(" &");
    } else if file.attr(die, gimli::DW_AT_rvalue_reference).is_some() {
        type_name.push_str(" &&");
    }
    type_name
}

/// Fully scoped name of a DIE: climbs namespace, class, struct, union and
/// enum ancestors, substituting stable placeholders for anonymous scopes.
pub(crate) fn qualified_name(file: &DwarfFile, die: DieId) -> String {
    let mut name = file.name(die).unwrap_or_default();
    let mut current = file.parent(die);
    while let Some(ancestor) = current {
        let tag = file.tag(ancestor);
        if tag == gimli::DW_TAG_compile_unit {
            break;
        }
        let kind = match tag {
            gimli::DW_TAG_namespace => Some("nmsp"),
            gimli::DW_TAG_class_type => Some("class"),
            gimli::DW_TAG_structure_type => Some("struct"),
            gimli::DW_TAG_union_type => Some("union"),
            gimli::DW_TAG_enumeration_type => Some("enum"),
            _ => None,
        };
        if let Some(kind) = kind {
            let segment = match file.name(ancestor) {
                Some(n) if !n.is_empty() => n,
                _ => format!("`anon_{kind}_{}`", file.offset(ancestor)),
            };
            name = format!("{segment}::{name}");
        }
        current = file.parent(ancestor);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::testing::*;

    fn id(index: usize) -> DieId {
        DieId { unit: 0, index }
    }

    /// Chain builder: returns (file, variable DieId) for a variable whose
    /// type points at the first of the supplied chain nodes.
    struct Chain {
        builder: TreeBuilder,
        root: usize,
    }

    impl Chain {
        fn new() -> Self {
            let mut builder = TreeBuilder::new();
            let root = builder.die(None, gimli::DW_TAG_compile_unit, vec![]);
            Self { builder, root }
        }

        fn named(&mut self, tag: gimli::DwTag, name: &str) -> usize {
            self.builder
                .die(Some(self.root), tag, vec![astr(gimli::DW_AT_name, name)])
        }

        fn node(&mut self, tag: gimli::DwTag, attrs: Vec<(gimli::DwAt, crate::AttrValue)>) -> usize {
            self.builder.die(Some(self.root), tag, attrs)
        }

        fn typed(&mut self, tag: gimli::DwTag, target: usize) -> usize {
            let offset = self.builder.offset_of(target);
            self.builder
                .die(Some(self.root), tag, vec![au(gimli::DW_AT_type, offset)])
        }

        fn var(mut self, target: usize) -> (DwarfFile, DieId) {
            let offset = self.builder.offset_of(target);
            let var = self.builder.die(
                Some(self.root),
                gimli::DW_TAG_variable,
                vec![au(gimli::DW_AT_type, offset)],
            );
            let file = file_with(vec![self.builder.build("t.cpp", &["/src/t.cpp"])]);
            (file, id(var))
        }
    }

    #[test]
    fn test_const_int() {
        let mut chain = Chain::new();
        let int_t = chain.named(gimli::DW_TAG_base_type, "int");
        let const_t = chain.typed(gimli::DW_TAG_const_type, int_t);
        let (mut file, var) = chain.var(const_t);
        assert_eq!(type_string(&mut file, var, "x", None), "const int x");
    }

    #[test]
    fn test_pointer_to_const_int() {
        let mut chain = Chain::new();
        let int_t = chain.named(gimli::DW_TAG_base_type, "int");
        let const_t = chain.typed(gimli::DW_TAG_const_type, int_t);
        let ptr = chain.typed(gimli::DW_TAG_pointer_type, const_t);
        let (mut file, var) = chain.var(ptr);
        assert_eq!(type_string(&mut file, var, "x", None), "const int *x");
    }

    #[test]
    fn test_const_pointer_to_int() {
        let mut chain = Chain::new();
        let int_t = chain.named(gimli::DW_TAG_base_type, "int");
        let ptr = chain.typed(gimli::DW_TAG_pointer_type, int_t);
        let const_t = chain.typed(gimli::DW_TAG_const_type, ptr);
        let (mut file, var) = chain.var(const_t);
        assert_eq!(type_string(&mut file, var, "x", None), "int *const x");
    }

    #[test]
    fn test_array_of_pointers() {
        let mut chain = Chain::new();
        let int_t = chain.named(gimli::DW_TAG_base_type, "int");
        let ptr = chain.typed(gimli::DW_TAG_pointer_type, int_t);
        let array = chain.typed(gimli::DW_TAG_array_type, ptr);
        chain
            .builder
            .die(Some(array), gimli::DW_TAG_subrange_type, vec![au(gimli::DW_AT_count, 10)]);
        let (mut file, var) = chain.var(array);
        assert_eq!(type_string(&mut file, var, "x", None), "int *x[10]");
    }

    #[test]
    fn test_pointer_to_array() {
        let mut chain = Chain::new();
        let int_t = chain.named(gimli::DW_TAG_base_type, "int");
        let array = chain.typed(gimli::DW_TAG_array_type, int_t);
        chain
            .builder
            .die(Some(array), gimli::DW_TAG_subrange_type, vec![au(gimli::DW_AT_count, 10)]);
        let ptr = chain.typed(gimli::DW_TAG_pointer_type, array);
        let (mut file, var) = chain.var(ptr);
        assert_eq!(type_string(&mut file, var, "x", None), "int (*x)[10]");
    }

    #[test]
    fn test_function_pointer() {
        let mut chain = Chain::new();
        let int_t = chain.named(gimli::DW_TAG_base_type, "int");
        let int_off = chain.builder.offset_of(int_t);
        let subr = chain.typed(gimli::DW_TAG_subroutine_type, int_t);
        chain.builder.die(
            Some(subr),
            gimli::DW_TAG_formal_parameter,
            vec![au(gimli::DW_AT_type, int_off)],
        );
        chain.builder.die(
            Some(subr),
            gimli::DW_TAG_formal_parameter,
            vec![au(gimli::DW_AT_type, int_off)],
        );
        let ptr = chain.typed(gimli::DW_TAG_pointer_type, subr);
        let (mut file, var) = chain.var(ptr);
        assert_eq!(type_string(&mut file, var, "x", None), "int (*x)(int, int)");
    }

    #[test]
    fn test_pointer_to_const_member_function() {
        let mut chain = Chain::new();
        let class_a = chain.named(gimli::DW_TAG_class_type, "A");
        let int_t = chain.named(gimli::DW_TAG_base_type, "int");
        let int_off = chain.builder.offset_of(int_t);
        let const_a = chain.typed(gimli::DW_TAG_const_type, class_a);
        let ptr_a = chain.typed(gimli::DW_TAG_pointer_type, const_a);
        let ptr_a_off = chain.builder.offset_of(ptr_a);
        // void return: no DW_AT_type on the subroutine
        let subr = chain.node(gimli::DW_TAG_subroutine_type, vec![]);
        chain.builder.die(
            Some(subr),
            gimli::DW_TAG_formal_parameter,
            vec![aflag(gimli::DW_AT_artificial), au(gimli::DW_AT_type, ptr_a_off)],
        );
        chain.builder.die(
            Some(subr),
            gimli::DW_TAG_formal_parameter,
            vec![au(gimli::DW_AT_type, int_off)],
        );
        let class_a_off = chain.builder.offset_of(class_a);
        let subr_off = chain.builder.offset_of(subr);
        let ptm = chain.node(
            gimli::DW_TAG_ptr_to_member_type,
            vec![
                au(gimli::DW_AT_type, subr_off),
                au(gimli::DW_AT_containing_type, class_a_off),
            ],
        );
        let (mut file, var) = chain.var(ptm);
        assert_eq!(
            type_string(&mut file, var, "x", None),
            "void (A::*x)(int) const"
        );
    }

    #[test]
    fn test_void_and_missing_type() {
        let mut chain = Chain::new();
        let var_without_type =
            chain
                .builder
                .die(Some(chain.root), gimli::DW_TAG_variable, vec![]);
        // pointer to nothing: void *
        let void_ptr = chain.node(gimli::DW_TAG_pointer_type, vec![]);
        let (mut file, var) = chain.var(void_ptr);
        assert_eq!(type_string(&mut file, var, "p", None), "void *p");
        assert_eq!(
            type_string(&mut file, id(var_without_type), "x", None),
            "void x"
        );
    }

    #[test]
    fn test_dangling_type_reference() {
        let mut builder = TreeBuilder::new();
        let root = builder.die(None, gimli::DW_TAG_compile_unit, vec![]);
        let var = builder.die(
            Some(root),
            gimli::DW_TAG_variable,
            vec![au(gimli::DW_AT_type, 9999)],
        );
        let mut file = file_with(vec![builder.build("t.cpp", &[])]);
        assert_eq!(type_string(&mut file, id(var), "x", None), "x");
    }

    #[test]
    fn test_anonymous_aggregate_placeholder() {
        let mut chain = Chain::new();
        let anon = chain.node(gimli::DW_TAG_structure_type, vec![]);
        let anon_offset = chain.builder.offset_of(anon);
        let (mut file, var) = chain.var(anon);
        assert_eq!(
            type_string(&mut file, var, "s", None),
            format!("`anony_struct_{anon_offset}` s")
        );
    }

    #[test]
    fn test_array_without_range() {
        let mut chain = Chain::new();
        let int_t = chain.named(gimli::DW_TAG_base_type, "int");
        let array = chain.typed(gimli::DW_TAG_array_type, int_t);
        chain
            .builder
            .die(Some(array), gimli::DW_TAG_subrange_type, vec![]);
        let (mut file, var) = chain.var(array);
        assert_eq!(type_string(&mut file, var, "a", None), "int a[no_range]");
    }

    #[test]
    fn test_upper_bound_array() {
        let mut chain = Chain::new();
        let int_t = chain.named(gimli::DW_TAG_base_type, "int");
        let array = chain.typed(gimli::DW_TAG_array_type, int_t);
        chain.builder.die(
            Some(array),
            gimli::DW_TAG_subrange_type,
            vec![au(gimli::DW_AT_upper_bound, 3)],
        );
        let (mut file, var) = chain.var(array);
        assert_eq!(type_string(&mut file, var, "a", None), "int a[4]");
    }

    #[test]
    fn test_qualified_name_through_scopes() {
        let mut builder = TreeBuilder::new();
        let root = builder.die(None, gimli::DW_TAG_compile_unit, vec![]);
        let ns = builder.die(
            Some(root),
            gimli::DW_TAG_namespace,
            vec![astr(gimli::DW_AT_name, "std")],
        );
        let class = builder.die(
            Some(ns),
            gimli::DW_TAG_class_type,
            vec![astr(gimli::DW_AT_name, "shared_ptr<int>")],
        );
        let anon_ns = builder.die(Some(root), gimli::DW_TAG_namespace, vec![]);
        let anon_ns_offset = builder.offset_of(anon_ns);
        let inner = builder.die(
            Some(anon_ns),
            gimli::DW_TAG_structure_type,
            vec![astr(gimli::DW_AT_name, "Inner")],
        );
        let file = file_with(vec![builder.build("t.cpp", &[])]);
        assert_eq!(
            qualified_name(&file, id(class)),
            "std::shared_ptr<int>"
        );
        assert_eq!(
            qualified_name(&file, id(inner)),
            format!("`anon_nmsp_{anon_ns_offset}`::Inner")
        );
    }

    #[test]
    fn test_cv_reports_terminal_qualifiers_only() {
        // const pointer to mutable int: the pointee is not const
        let mut chain = Chain::new();
        let int_t = chain.named(gimli::DW_TAG_base_type, "int");
        let ptr = chain.typed(gimli::DW_TAG_pointer_type, int_t);
        let const_t = chain.typed(gimli::DW_TAG_const_type, ptr);
        let (mut file, var) = chain.var(const_t);
        let mut cv = CvQualifiers::default();
        let _ = type_string(&mut file, var, "x", Some(&mut cv));
        assert!(!cv.is_const);

        // pointer to const int: the pointee is const
        let mut chain = Chain::new();
        let int_t = chain.named(gimli::DW_TAG_base_type, "int");
        let const_t = chain.typed(gimli::DW_TAG_const_type, int_t);
        let ptr = chain.typed(gimli::DW_TAG_pointer_type, const_t);
        let (mut file, var) = chain.var(ptr);
        let mut cv = CvQualifiers::default();
        let _ = type_string(&mut file, var, "x", Some(&mut cv));
        assert!(cv.is_const);
    }

    #[test]
    fn test_volatile_const_prefix_order() {
        let mut chain = Chain::new();
        let int_t = chain.named(gimli::DW_TAG_base_type, "int");
        let const_t = chain.typed(gimli::DW_TAG_const_type, int_t);
        let volatile_t = chain.typed(gimli::DW_TAG_volatile_type, const_t);
        let (mut file, var) = chain.var(volatile_t);
        assert_eq!(
            type_string(&mut file, var, "x", None),
            "volatile const int x"
        );
    }
}
