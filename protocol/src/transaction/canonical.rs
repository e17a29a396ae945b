//! Canonical serialization.
//!
//! Identifiers are content hashes and signatures cover content bytes, so the
//! same logical record must always produce the same bytes. serde_json's map
//! order depends on whether some crate in the build enabled
//! `preserve_order`, so this module does not trust it: objects are written
//! with keys sorted bytewise at every depth, with no insignificant
//! whitespace.
//!
//! Three projections of a record are used:
//!
//! | Projection        | Content                                         | Used for              |
//! |-------------------|-------------------------------------------------|-----------------------|
//! | `record_bytes`    | every field                                     | store value, wire tx  |
//! | `identity_bytes`  | every field except `Id`                         | id derivation         |
//! | `signable_bytes`  | `Id`, `Type`, `Properties`, `Encoding`, `Amends` | node signature        |

use serde::Serialize;
use serde_json::{Map, Value};

use super::types::BfTx;

/// Fields covered by the node signature. None of them may change once the
/// record is verified.
const SIGNED_FIELDS: [&str; 5] = ["Id", "Type", "Properties", "Encoding", "Amends"];

/// Canonical bytes of any serializable value.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    let mut out = Vec::new();
    write_value(&value, &mut out)?;
    Ok(out)
}

/// Canonical bytes of the whole record.
pub fn record_bytes(tx: &BfTx) -> Result<Vec<u8>, serde_json::Error> {
    to_canonical_bytes(tx)
}

/// Canonical bytes of the record with the `Id` key removed, so the
/// identifier is a pure function of everything else.
pub fn identity_bytes(tx: &BfTx) -> Result<Vec<u8>, serde_json::Error> {
    let mut map = record_map(tx)?;
    map.remove("Id");
    to_canonical_bytes(&Value::Object(map))
}

/// Canonical bytes of the fields the signature commits to.
pub fn signable_bytes(tx: &BfTx) -> Result<Vec<u8>, serde_json::Error> {
    let map = record_map(tx)?;
    let signed: Map<String, Value> = map
        .into_iter()
        .filter(|(key, _)| SIGNED_FIELDS.contains(&key.as_str()))
        .collect();
    to_canonical_bytes(&Value::Object(signed))
}

fn record_map(tx: &BfTx) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(tx)? {
        Value::Object(map) => Ok(map),
        _ => Err(serde::ser::Error::custom("record did not serialize to an object")),
    }
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_value(item, out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_at_every_depth() {
        let bytes = to_canonical_bytes(&json!({"b": {"z": 1, "a": 2}, "a": [ {"y": 0, "x": 1} ]}))
            .unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":[{"x":1,"y":0}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut first = Map::new();
        first.insert("shipper".into(), json!("ACME"));
        first.insert("weight".into(), json!(1200));
        let mut second = Map::new();
        second.insert("weight".into(), json!(1200));
        second.insert("shipper".into(), json!("ACME"));

        assert_eq!(
            to_canonical_bytes(&Value::Object(first)).unwrap(),
            to_canonical_bytes(&Value::Object(second)).unwrap()
        );
    }

    #[test]
    fn strings_are_escaped() {
        let bytes = to_canonical_bytes(&json!({"note": "say \"hi\"\n"})).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), r#"{"note":"say \"hi\"\n"}"#);
    }

    #[test]
    fn identity_bytes_ignore_id() {
        let mut tx = BfTx::new(json!({"cargo": "steel"}));
        let before = identity_bytes(&tx).unwrap();
        tx.id = "deadbeef".into();
        assert_eq!(identity_bytes(&tx).unwrap(), before);
        assert_ne!(record_bytes(&tx).unwrap(), before);
    }

    #[test]
    fn signable_bytes_ignore_mutable_flags() {
        let mut tx = BfTx::new(json!({"cargo": "steel"}));
        tx.id = "abc".into();
        let before = signable_bytes(&tx).unwrap();

        tx.verified = true;
        tx.transmitted = true;
        tx.amendment = Some("next".into());
        tx.signature = Some("00".into());
        assert_eq!(signable_bytes(&tx).unwrap(), before);

        tx.properties = json!({"cargo": "copper"});
        assert_ne!(signable_bytes(&tx).unwrap(), before);
    }
}
