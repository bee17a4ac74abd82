//! Naming conventions used to infer table names and identity members.

use once_cell::sync::Lazy;
use regex::Regex;

/// Two-character suffix conventionally denoting an identity member.
pub const IDENTITY_SUFFIX: &str = "ID";

static WORD_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z])([A-Z])").expect("word boundary pattern is valid"));

/// Inserts a space at every lowercase-to-uppercase transition.
///
/// `OrderLine` becomes `Order Line`, `CustomerID` becomes `Customer ID`.
pub fn split_words(name: &str) -> String {
    WORD_BOUNDARY.replace_all(name, "$1 $2").into_owned()
}

/// Pluralizes the trailing word of `name`.
///
/// Rules, in order: `x`/`ch`/`ss` take `es`; a trailing `y` becomes `ies`;
/// anything already ending in `s` is left alone; everything else takes `s`.
pub fn pluralize(name: &str) -> String {
    if name.ends_with('x') || name.ends_with("ch") || name.ends_with("ss") {
        format!("{}es", name)
    } else if let Some(stem) = name.strip_suffix('y') {
        format!("{}ies", stem)
    } else if name.ends_with('s') {
        name.to_string()
    } else {
        format!("{}s", name)
    }
}

/// Inverse of `pluralize` for the same rule classes.
///
/// Only table names are derived from type names, so nothing depends on this
/// being total. A plural in `ies` always maps back to `y`: words whose
/// singular ends in `ie` (`Movie` → `Movies`) singularize to `Movy`.
pub fn singularize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        format!("{}y", stem)
    } else if name.ends_with("xes") || name.ends_with("ches") || name.ends_with("sses") {
        name[..name.len() - 2].to_string()
    } else if let Some(stem) = name.strip_suffix('s') {
        stem.to_string()
    } else {
        name.to_string()
    }
}

/// Table identifier inferred from a type's bare name: `OrderLine` → `Order Lines`.
pub fn table_name_for(type_name: &str) -> String {
    pluralize(&split_words(type_name))
}

/// Whether `member` is the conventional identity of a type named `type_name`,
/// e.g. `CustomerID` on `Customer`.
pub fn is_identity_member(type_name: &str, member: &str) -> bool {
    match member.strip_suffix(IDENTITY_SUFFIX) {
        Some(stem) => !type_name.is_empty() && stem.starts_with(type_name),
        None => false,
    }
}

/// Bare name of a Rust type: module path and generic arguments stripped.
pub fn bare_type_name(full: &str) -> &str {
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics
        .rsplit("::")
        .next()
        .unwrap_or(without_generics)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("OrderLine"), "Order Line");
        assert_eq!(split_words("Product"), "Product");
        assert_eq!(split_words("CustomerID"), "Customer ID");
    }

    #[test]
    fn test_table_name_inference() {
        assert_eq!(table_name_for("OrderLine"), "Order Lines");
        assert_eq!(table_name_for("Category"), "Categories");
        assert_eq!(table_name_for("Box"), "Boxes");
        assert_eq!(table_name_for("Batch"), "Batches");
        assert_eq!(table_name_for("Class"), "Classes");
        assert_eq!(table_name_for("News"), "News");
    }

    #[test]
    fn test_singularize_inverts_each_rule() {
        for word in ["Product", "Box", "Batch", "Class", "Category", "Order Line"] {
            assert_eq!(singularize(&pluralize(word)), word);
        }
    }

    #[test]
    fn test_ie_plurals_singularize_to_y() {
        assert_eq!(pluralize("Movie"), "Movies");
        assert_eq!(table_name_for("Movie"), "Movies");
        assert_eq!(singularize("Movies"), "Movy");
        assert_eq!(singularize("Parties"), "Party");
    }

    #[test]
    fn test_identity_member_inference() {
        assert!(is_identity_member("Category", "CategoryID"));
        assert!(is_identity_member("Customer", "CustomerID"));
        assert!(!is_identity_member("Item", "Data"));
        assert!(!is_identity_member("Product", "CategoryID"));
        assert!(!is_identity_member("Category", "CategoryId"));
    }

    #[test]
    fn test_bare_type_name() {
        assert_eq!(bare_type_name("shop::model::OrderLine"), "OrderLine");
        assert_eq!(bare_type_name("Wrapper<shop::Item>"), "Wrapper");
        assert_eq!(bare_type_name("Product"), "Product");
    }
}
