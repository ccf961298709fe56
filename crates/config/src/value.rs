//! Explicit recursive merge over YAML values.
//!
//! Mappings merge key by key, with the overlay winning on conflicts. Every
//! other pairing (scalars, sequences, mapping replaced by scalar) takes the
//! overlay value whole. CSS lists never go through this path; see
//! [`crate::plugin_loader::MergedPluginConfig`].

use serde_yaml::{Mapping, Value};

/// Merge `overlay` into `base`.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(existing), Value::Mapping(incoming)) => {
            deep_merge_mapping(existing, incoming);
        },
        (slot, incoming) => *slot = incoming,
    }
}

/// Merge `overlay` into `base`, key by key.
pub fn deep_merge_mapping(base: &mut Mapping, overlay: Mapping) {
    for (key, value) in overlay {
        if let Value::Mapping(incoming) = value {
            if let Some(Value::Mapping(existing)) = base.get_mut(&key) {
                deep_merge_mapping(existing, incoming);
                continue;
            }
            base.insert(key, Value::Mapping(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

/// Copy of `map` without the given top-level keys.
pub fn without_keys(map: &Mapping, keys: &[&str]) -> Mapping {
    map.iter()
        .filter(|(k, _)| !k.as_str().is_some_and(|k| keys.contains(&k)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// A string or a list of strings, as used by `css_files`.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Sequence(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Top-level string value of `key`.
pub fn get_str<'a>(map: &'a Mapping, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(src: &str) -> Mapping {
        serde_yaml::from_str(src).unwrap()
    }

    #[test]
    fn nested_mappings_merge_and_overlay_wins() {
        let mut base = yaml("pdf_options:\n  format: A4\n  margin:\n    top: 1cm\n    bottom: 1cm\ntitle: Base\n");
        let overlay = yaml("pdf_options:\n  margin:\n    top: 2cm\ntitle: Override\n");
        deep_merge_mapping(&mut base, overlay);

        let expected = yaml(
            "pdf_options:\n  format: A4\n  margin:\n    top: 2cm\n    bottom: 1cm\ntitle: Override\n",
        );
        assert_eq!(base, expected);
    }

    #[test]
    fn sequences_are_replaced_not_concatenated() {
        let mut base = Value::Mapping(yaml("tags: [a, b]\n"));
        deep_merge(&mut base, Value::Mapping(yaml("tags: [c]\n")));
        assert_eq!(base, Value::Mapping(yaml("tags: [c]\n")));
    }

    #[test]
    fn scalar_overlay_replaces_mapping() {
        let mut base = Value::Mapping(yaml("math:\n  engine: katex\n"));
        deep_merge(&mut base, Value::Mapping(yaml("math: false\n")));
        assert_eq!(base, Value::Mapping(yaml("math: false\n")));
    }

    #[test]
    fn overlay_does_not_share_state_with_base() {
        let shared = yaml("margin:\n  top: 1cm\n");
        let mut first = Mapping::new();
        let mut second = Mapping::new();
        deep_merge_mapping(&mut first, shared.clone());
        deep_merge_mapping(&mut second, shared);
        deep_merge_mapping(&mut first, yaml("margin:\n  top: 9cm\n"));
        assert_eq!(second, yaml("margin:\n  top: 1cm\n"));
    }

    #[test]
    fn without_keys_drops_named_entries() {
        let map = yaml("css_files: [a.css]\ninherit_css: false\ntitle: x\n");
        assert_eq!(without_keys(&map, &["css_files", "inherit_css"]), yaml("title: x\n"));
    }

    #[test]
    fn string_list_accepts_scalar_or_sequence() {
        let map = yaml("one: a.css\nmany: [a.css, b.css]\nnone: 3\n");
        assert_eq!(string_list(map.get("one")), vec!["a.css"]);
        assert_eq!(string_list(map.get("many")), vec!["a.css", "b.css"]);
        assert!(string_list(map.get("none")).is_empty());
        assert!(string_list(map.get("missing")).is_empty());
    }
}
