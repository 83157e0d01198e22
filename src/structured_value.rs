//! The structured-value tree used for parsed MI result bodies.
//!
//! A pure data type, no I/O: JSON-like but shaped around what GDB/MI actually
//! emits. Tuple member order is preserved because it is semantically
//! meaningful for some classes (stop-frame info, in particular).

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// A recursively-nested MI value: a bare string, an ordered name→value tuple,
/// or a list of either bare values or `name=value` pairs.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredValue {
    String(String),
    Tuple(Vec<(String, StructuredValue)>),
    List(Vec<StructuredValue>),
}

// Hand-written rather than `#[derive(Serialize)]` with `#[serde(untagged)]`:
// `Tuple` must serialize as a JSON object (preserving insertion order), which
// an untagged `Vec<(String, V)>` would instead render as an array of pairs.
impl Serialize for StructuredValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            StructuredValue::String(s) => serializer.serialize_str(s),
            StructuredValue::Tuple(members) => {
                let mut map = serializer.serialize_map(Some(members.len()))?;
                for (k, v) in members {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            StructuredValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for v in items {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
        }
    }
}

impl StructuredValue {
    /// An empty tuple, the body of a bare `^done`.
    pub fn empty_tuple() -> Self {
        StructuredValue::Tuple(Vec::new())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StructuredValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a member by name in a `Tuple`. Returns `None` for any other
    /// variant, or if the name isn't present.
    pub fn get(&self, name: &str) -> Option<&StructuredValue> {
        match self {
            StructuredValue::Tuple(members) => {
                members.iter().find(|(k, _)| k == name).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[(String, StructuredValue)]> {
        match self {
            StructuredValue::Tuple(members) => Some(members),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[StructuredValue]> {
        match self {
            StructuredValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Render in canonical MI-ish text form, `name="val",name={...}`. Used by
    /// the round-trip law in the test suite and for debug logging.
    pub fn to_canonical_string(&self) -> String {
        match self {
            StructuredValue::String(s) => format!("\"{}\"", escape_c_string(s)),
            StructuredValue::Tuple(members) => {
                let body = members
                    .iter()
                    .map(|(k, v)| format!("{k}={}", v.to_canonical_string()))
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{{{body}}}")
            }
            StructuredValue::List(items) => {
                let body = items
                    .iter()
                    .map(|v| v.to_canonical_string())
                    .collect::<Vec<_>>()
                    .join(",");
                format!("[{body}]")
            }
        }
    }
}

fn escape_c_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tuple_serializes_as_object() {
        let v = StructuredValue::empty_tuple();
        assert_eq!(serde_json::to_string(&v).unwrap(), "{}");
    }

    #[test]
    fn get_looks_up_tuple_members() {
        let v = StructuredValue::Tuple(vec![(
            "func".to_string(),
            StructuredValue::String("main".to_string()),
        )]);
        assert_eq!(v.get("func").and_then(|v| v.as_str()), Some("main"));
        assert_eq!(v.get("missing"), None);
    }

    #[test]
    fn canonical_string_round_trips_nested_tuple() {
        let v = StructuredValue::Tuple(vec![
            ("addr".to_string(), StructuredValue::String("0x1234".to_string())),
            ("func".to_string(), StructuredValue::String("main".to_string())),
        ]);
        assert_eq!(
            v.to_canonical_string(),
            r#"{addr="0x1234",func="main"}"#
        );
    }

    #[test]
    fn canonical_string_escapes_quotes_and_backslashes() {
        let v = StructuredValue::String("say \"hi\"\\now".to_string());
        assert_eq!(v.to_canonical_string(), r#""say \"hi\"\\now""#);
    }
}
