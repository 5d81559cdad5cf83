use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

/// The opaque JSON document stored at `_local/<checkpoint_id>`, both on the
/// remote peer and mirrored locally.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteCheckpoint {
    pub last_sequence: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl RemoteCheckpoint {
    pub fn new(last_sequence: impl Into<String>) -> Self {
        Self {
            last_sequence: last_sequence.into(),
            rev: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// The inputs that uniquely identify a replication's checkpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CheckpointInputs<'a> {
    #[serde(rename = "localUUID")]
    pub local_uuid: &'a str,
    #[serde(rename = "remoteURL")]
    pub remote_url: &'a str,
    pub push: bool,
    pub filter: Option<&'a str>,
    #[serde(rename = "filterParams")]
    pub filter_params: Option<&'a Value>,
}

/// Computes `checkpointID = SHA1(canonicalJSON(inputs))`.
///
/// Identical inputs always produce the identical, lower-hex-encoded digest,
/// across processes and restarts, by construction of [`canonical_json`].
pub fn checkpoint_id(inputs: &CheckpointInputs<'_>) -> String {
    let value = serde_json::to_value(inputs).expect("CheckpointInputs always serializes");
    let canonical = canonical_json(&value);
    let mut hasher = Sha1::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// Renders `value` as JSON with object keys sorted and no insignificant
/// whitespace, so that the same logical document always serializes to the
/// same bytes regardless of field insertion order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            // BTreeMap sorts keys lexicographically, giving deterministic order.
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            out.push('{');
            for (i, (k, v)) in sorted.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(k).unwrap());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&serde_json::to_string(other).unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys_and_strips_whitespace() {
        let value = json!({"b": 1, "a": {"z": 2, "y": 3}});
        assert_eq!(canonical_json(&value), r#"{"a":{"y":3,"z":2},"b":1}"#);
    }

    #[test]
    fn checkpoint_id_is_pure_and_deterministic() {
        let params = json!({"k": "v"});
        let inputs = CheckpointInputs {
            local_uuid: "local-uuid",
            remote_url: "http://example.com/db",
            push: true,
            filter: Some("myfilter"),
            filter_params: Some(&params),
        };
        let a = checkpoint_id(&inputs);
        let b = checkpoint_id(&inputs);
        assert_eq!(a, b);
        assert_eq!(a.len(), 40, "sha1 hex digest is 40 chars");
    }

    #[test]
    fn checkpoint_id_differs_for_push_vs_pull() {
        let push = CheckpointInputs {
            local_uuid: "u",
            remote_url: "http://x/db",
            push: true,
            filter: None,
            filter_params: None,
        };
        let pull = CheckpointInputs {
            push: false,
            ..push.clone()
        };
        assert_ne!(checkpoint_id(&push), checkpoint_id(&pull));
    }
}
