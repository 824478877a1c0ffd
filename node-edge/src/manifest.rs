use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// An opaque nested mapping describing the child's `package.json`
/// dependencies and metadata, per spec.md §3.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest(Map<String, Value>);

impl Manifest {
    pub fn new(fields: Map<String, Value>) -> Self {
        Manifest(fields)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Returns the manifest merged with the fixed fields `create_env`
    /// enforces: `type: "module"` and a `node_edge_runtime` script entry,
    /// per spec.md §4.1. The user's own `scripts` entries are preserved.
    pub fn for_package_json(&self) -> Value {
        let mut merged = self.0.clone();

        let mut scripts = merged
            .get("scripts")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        scripts.insert(
            "node_edge_runtime".to_string(),
            Value::String("node ./index.js".to_string()),
        );

        merged.insert("type".to_string(), Value::String("module".to_string()));
        merged.insert("scripts".to_string(), Value::Object(scripts));

        Value::Object(merged)
    }

    /// A stable hex digest of the manifest's content, used to name the
    /// environment directory. Stable across runs and independent of key
    /// order, per spec.md §8's signature invariant: we canonicalize by
    /// sorting object keys recursively before hashing (the original
    /// `py-node-edge` hashes `json.dumps` without `sort_keys`, which is only
    /// stable as long as the caller's dict order doesn't change — we instead
    /// make the stronger guarantee spec.md §8 actually asks for).
    pub fn signature(&self) -> String {
        let canonical = canonicalize(&Value::Object(self.0.clone()));
        let json = ascii_escaped_json(&canonical);

        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl From<Map<String, Value>> for Manifest {
    fn from(fields: Map<String, Value>) -> Self {
        Manifest(fields)
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Serializes to JSON, then escapes every non-ASCII codepoint as `\uXXXX`
/// (surrogate pairs for codepoints above the BMP), matching
/// `json.dumps(..., ensure_ascii=True)` in the original implementation.
fn ascii_escaped_json(value: &Value) -> String {
    let json = serde_json::to_string(value).expect("Value serialization cannot fail");
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut buf = [0u16; 2];
            for unit in ch.encode_utf16(&mut buf) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(value: Value) -> Manifest {
        Manifest::new(value.as_object().unwrap().clone())
    }

    #[test]
    fn signature_is_stable_across_runs() {
        let m = manifest(json!({"dependencies": {"axios": "^1.2.0"}}));
        assert_eq!(m.signature(), m.signature());
    }

    #[test]
    fn signature_is_independent_of_key_order() {
        let a = manifest(json!({"a": 1, "b": 2}));
        let b = manifest(json!({"b": 2, "a": 1}));
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn signature_differs_for_different_content() {
        let a = manifest(json!({"a": 1}));
        let b = manifest(json!({"a": 2}));
        assert_ne!(a.signature(), b.signature());
    }

    #[test]
    fn for_package_json_enforces_module_type_and_runtime_script() {
        let m = manifest(json!({"dependencies": {"axios": "^1.2.0"}, "scripts": {"lint": "eslint ."}}));
        let package = m.for_package_json();
        assert_eq!(package["type"], "module");
        assert_eq!(package["scripts"]["node_edge_runtime"], "node ./index.js");
        assert_eq!(package["scripts"]["lint"], "eslint .");
        assert_eq!(package["dependencies"]["axios"], "^1.2.0");
    }

    #[test]
    fn signature_ascii_escapes_non_ascii_content() {
        let m = manifest(json!({"name": "café"}));
        // Just exercises the non-ASCII path without panicking; value itself
        // is opaque.
        let _ = m.signature();
    }
}
