//! Change-log line decoding.
//!
//! Normalizes the two wire formats the change log is known to carry into
//! a single [`ChangeEvent`]:
//!
//! - **Tabular**: tab-separated fields; one field holds an
//!   `operation:<kind>` marker, the next field a JSON envelope whose
//!   `payload` is the inventory id, and the final field a JSON envelope
//!   whose `payload` is the relationship data.
//! - **Embedded JSON**: the line holds a `"payload":"<escaped json>"`
//!   fragment plus a positional 36-character inventory id token. The
//!   operation kind is inferred from the payload shape by
//!   [`infer_embedded_operation`].
//!
//! Malformed lines are rejected with a typed [`Error`] naming the reason;
//! the caller skips them and continues.

pub mod error;

pub use error::{Error, Result};

use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

use relsync_types::{
    ChangeEvent, EventPayload, InventoryId, ObjectRef, Operation, RelationshipPayload,
    ResourcePayload, EMBEDDED_ID_LEN,
};

const OPERATION_MARKER: &str = "operation:";
const PAYLOAD_KEY: &str = "\"payload\":\"";

/// Decodes one raw change-log line into a normalized event.
pub fn decode(line: &str) -> Result<ChangeEvent> {
    if line.contains(OPERATION_MARKER) {
        decode_tabular(line)
    } else {
        decode_embedded(line)
    }
}

// ============================================================================
// Tabular format
// ============================================================================

fn decode_tabular(line: &str) -> Result<ChangeEvent> {
    let fields: Vec<&str> = line.trim().split('\t').collect();

    let marker_index = fields
        .iter()
        .position(|field| field.contains(OPERATION_MARKER))
        .ok_or(Error::UnrecognizedLine)?;
    let operation = parse_marker(fields[marker_index])?;

    // The field right after the marker is a JSON envelope carrying the
    // inventory id; the final field carries the relationship payload.
    let id_field = fields
        .get(marker_index + 1)
        .ok_or(Error::TruncatedRecord {
            found: fields.len(),
        })?;
    let inventory_id = envelope_string(id_field)?;

    let tail = fields.last().ok_or(Error::UnrecognizedLine)?;
    let envelope: Value = serde_json::from_str(tail)?;
    let payload_value = envelope
        .get("payload")
        .filter(|value| value.is_object())
        .ok_or(Error::MissingKey("payload"))?;

    let payload = payload_for(operation, payload_value)?;

    trace!(%operation, %inventory_id, "decoded tabular record");
    Ok(ChangeEvent {
        inventory_id: InventoryId::new(inventory_id),
        operation,
        payload,
    })
}

/// Extracts the operation kind from a marker field. The kind is read from
/// the marker itself, never inferred from the payload.
fn parse_marker(field: &str) -> Result<Operation> {
    let start = field
        .find(OPERATION_MARKER)
        .ok_or(Error::UnrecognizedLine)?
        + OPERATION_MARKER.len();
    let kind: String = field[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    Ok(kind.parse::<Operation>()?)
}

/// Reads the `payload` string out of a JSON envelope field.
fn envelope_string(field: &str) -> Result<String> {
    let envelope: Value = serde_json::from_str(field)?;
    envelope
        .get("payload")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or(Error::MissingKey("payload"))
}

// ============================================================================
// Embedded-JSON format
// ============================================================================

fn decode_embedded(line: &str) -> Result<ChangeEvent> {
    let literal = embedded_fragment(line)?;

    // The fragment is a JSON string literal; serde's own string parser
    // handles the backslash escapes.
    let payload_text: String = serde_json::from_str(literal)?;
    let payload_value: Value = serde_json::from_str(&payload_text)?;

    let inventory_id = embedded_inventory_id(line).ok_or(Error::MissingInventoryId)?;
    let operation = infer_embedded_operation(&payload_value);
    let payload = payload_for(operation, &payload_value)?;

    trace!(%operation, inventory_id, "decoded embedded record");
    Ok(ChangeEvent {
        inventory_id: InventoryId::new(inventory_id),
        operation,
        payload,
    })
}

/// Locates the escaped relationship payload and returns it as a JSON
/// string literal, quotes included. The fragment runs from the first
/// `"payload":"{` to the last `}"` on the line.
fn embedded_fragment(line: &str) -> Result<&str> {
    let marker = format!("{PAYLOAD_KEY}{{");
    let key_index = line.find(&marker).ok_or(Error::UnrecognizedLine)?;
    let open_quote = key_index + PAYLOAD_KEY.len() - 1;

    let close_brace = line.rfind("}\"").ok_or(Error::UnterminatedPayload)?;
    if close_brace <= open_quote {
        return Err(Error::UnterminatedPayload);
    }

    Ok(&line[open_quote..=close_brace + 1])
}

/// Finds the inventory id: the first `"payload"` value on the line that is
/// exactly [`EMBEDDED_ID_LEN`] characters long. The id is positional data
/// in the stream, not a named field of the relationship payload.
fn embedded_inventory_id(line: &str) -> Option<&str> {
    for (index, _) in line.match_indices(PAYLOAD_KEY) {
        let start = index + PAYLOAD_KEY.len();
        let Some(candidate) = line.get(start..start + EMBEDDED_ID_LEN) else {
            continue;
        };
        if line.as_bytes().get(start + EMBEDDED_ID_LEN) == Some(&b'"')
            && !candidate.contains('"')
        {
            return Some(candidate);
        }
    }
    None
}

/// Infers the operation kind of an embedded-format payload.
///
/// The upstream producer omits the `subject` block entirely for deletes
/// and always carries one for updates; no `created` events occur in this
/// format. A null or empty `subject` counts as absent.
pub fn infer_embedded_operation(payload: &Value) -> Operation {
    match payload.get("subject") {
        None | Some(Value::Null) => Operation::Deleted,
        Some(Value::Object(map)) if map.is_empty() => Operation::Deleted,
        Some(_) => Operation::Updated,
    }
}

// ============================================================================
// Payload shapes
// ============================================================================

#[derive(Deserialize)]
struct RelationshipWire {
    relation: String,
    resource: ObjectWire,
    subject: SubjectWire,
}

#[derive(Deserialize)]
struct ObjectWire {
    id: String,
    #[serde(rename = "type")]
    kind: TypeWire,
}

#[derive(Deserialize)]
struct TypeWire {
    namespace: String,
    name: String,
}

/// Subjects arrive double-wrapped on the wire (`subject.subject`).
#[derive(Deserialize)]
struct SubjectWire {
    subject: ObjectWire,
}

#[derive(Deserialize)]
struct ResourceWire {
    resource_namespace: String,
    resource_type: String,
    resource_id: String,
    relation: String,
}

/// Deserializes the payload into the shape the operation demands: full
/// relationship for `created`/`updated`, resource-and-relation for
/// `deleted`. The shape is selected by the operation, never guessed.
fn payload_for(operation: Operation, value: &Value) -> Result<EventPayload> {
    match operation {
        Operation::Deleted => {
            let wire: ResourceWire = serde_json::from_value(value.clone())?;
            Ok(EventPayload::Resource(ResourcePayload {
                namespace: wire.resource_namespace,
                resource_type: wire.resource_type,
                resource_id: wire.resource_id,
                relation: wire.relation,
            }))
        }
        Operation::Created | Operation::Updated => {
            let wire: RelationshipWire = serde_json::from_value(value.clone())?;
            Ok(EventPayload::Relationship(RelationshipPayload {
                relation: wire.relation,
                resource: object_ref(wire.resource),
                subject: object_ref(wire.subject.subject),
            }))
        }
    }
}

fn object_ref(wire: ObjectWire) -> ObjectRef {
    ObjectRef::new(wire.kind.namespace, wire.kind.name, wire.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    const INVENTORY_ID: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";

    fn tabular_line(kind: &str, payload: &str) -> String {
        format!(
            "inventory.changelog\tpartition:0 operation:{kind} offset:42\t\
             {{\"schema\":{{\"type\":\"string\"}},\"payload\":\"{INVENTORY_ID}\"}}\t\
             {{\"schema\":{{\"type\":\"struct\"}},\"payload\":{payload}}}"
        )
    }

    fn relationship_json() -> String {
        r#"{"relation":"member","resource":{"id":"res-9","type":{"namespace":"authz","name":"host"}},"subject":{"subject":{"id":"sub-1","type":{"namespace":"notifications","name":"group"}}}}"#
            .to_string()
    }

    fn resource_json() -> String {
        r#"{"resource_namespace":"authz","resource_type":"integration","resource_id":"res-9","relation":"workspace"}"#
            .to_string()
    }

    #[test]
    fn tabular_updated_line_decodes() {
        let event = decode(&tabular_line("updated", &relationship_json())).unwrap();

        assert_eq!(event.operation, Operation::Updated);
        assert_eq!(event.inventory_id.as_str(), INVENTORY_ID);
        let EventPayload::Relationship(payload) = event.payload else {
            panic!("expected relationship payload");
        };
        assert_eq!(payload.relation, "member");
        assert_eq!(payload.resource, ObjectRef::new("authz", "host", "res-9"));
        assert_eq!(
            payload.subject,
            ObjectRef::new("notifications", "group", "sub-1")
        );
    }

    #[test]
    fn tabular_created_line_decodes() {
        let event = decode(&tabular_line("created", &relationship_json())).unwrap();
        assert_eq!(event.operation, Operation::Created);
    }

    #[test]
    fn tabular_deleted_line_uses_resource_shape() {
        let event = decode(&tabular_line("deleted", &resource_json())).unwrap();

        assert_eq!(event.operation, Operation::Deleted);
        let EventPayload::Resource(payload) = event.payload else {
            panic!("expected resource payload");
        };
        assert_eq!(payload.namespace, "authz");
        assert_eq!(payload.resource_type, "integration");
        assert_eq!(payload.resource_id, "res-9");
        assert_eq!(payload.relation, "workspace");
    }

    #[test]
    fn tabular_deleted_line_with_relationship_shape_is_rejected() {
        // Shape is selected by the marker; a deleted marker over a
        // relationship body must not decode as anything.
        let result = decode(&tabular_line("deleted", &relationship_json()));
        assert!(matches!(result, Err(Error::Json(_))));
    }

    #[test]
    fn tabular_unknown_marker_is_rejected() {
        let result = decode(&tabular_line("truncated", &relationship_json()));
        assert!(matches!(result, Err(Error::UnknownOperation(_))));
    }

    #[test]
    fn tabular_missing_inventory_envelope_is_rejected() {
        let line = format!(
            "inventory.changelog\toperation:updated\t{{\"payload\":{}}}",
            relationship_json()
        );
        // The field after the marker must carry a string payload.
        assert!(decode(&line).is_err());
    }

    #[test]
    fn embedded_updated_line_decodes() {
        let line = format!(
            r#"{{"key":{{"payload":"{INVENTORY_ID}"}},"value":{{"payload":"{{\"relation\":\"member\",\"resource\":{{\"id\":\"res-9\",\"type\":{{\"namespace\":\"authz\",\"name\":\"host\"}}}},\"subject\":{{\"subject\":{{\"id\":\"sub-1\",\"type\":{{\"namespace\":\"notifications\",\"name\":\"group\"}}}}}}}}"}}}}"#
        );
        let event = decode(&line).unwrap();

        assert_eq!(event.operation, Operation::Updated);
        assert_eq!(event.inventory_id.as_str(), INVENTORY_ID);
        let EventPayload::Relationship(payload) = event.payload else {
            panic!("expected relationship payload");
        };
        assert_eq!(payload.subject.id, "sub-1");
    }

    #[test]
    fn embedded_line_without_subject_is_a_delete() {
        let line = format!(
            r#"{{"key":{{"payload":"{INVENTORY_ID}"}},"value":{{"payload":"{{\"resource_namespace\":\"authz\",\"resource_type\":\"integration\",\"resource_id\":\"res-9\",\"relation\":\"workspace\"}}"}}}}"#
        );
        let event = decode(&line).unwrap();

        assert_eq!(event.operation, Operation::Deleted);
        assert!(matches!(event.payload, EventPayload::Resource(_)));
    }

    #[test]
    fn embedded_line_without_id_token_is_rejected() {
        // The only payload value is the JSON fragment itself; no
        // 36-character token exists anywhere on the line.
        let line = r#"{"value":{"payload":"{\"resource_namespace\":\"authz\",\"resource_type\":\"integration\",\"resource_id\":\"res-9\",\"relation\":\"workspace\"}"}}"#;
        assert!(matches!(decode(line), Err(Error::MissingInventoryId)));
    }

    #[test]
    fn decoded_formats_agree() {
        // Equivalent relationship data in both wire formats normalizes to
        // the same event, inventory id included.
        let tabular = decode(&tabular_line("updated", &relationship_json())).unwrap();
        let embedded = decode(&format!(
            r#"{{"key":{{"payload":"{INVENTORY_ID}"}},"value":{{"payload":"{{\"relation\":\"member\",\"resource\":{{\"id\":\"res-9\",\"type\":{{\"namespace\":\"authz\",\"name\":\"host\"}}}},\"subject\":{{\"subject\":{{\"id\":\"sub-1\",\"type\":{{\"namespace\":\"notifications\",\"name\":\"group\"}}}}}}}}"}}}}"#
        ))
        .unwrap();

        assert_eq!(tabular, embedded);
    }

    #[test_case(""; "empty line")]
    #[test_case("not a changelog line"; "free text")]
    #[test_case("{\"payload\":\"plain\"}"; "payload without fragment")]
    fn unrecognized_lines_are_rejected(line: &str) {
        assert!(matches!(decode(line), Err(Error::UnrecognizedLine)));
    }

    #[test]
    fn truncated_tabular_record_is_rejected() {
        assert!(matches!(
            decode("inventory.changelog operation:updated"),
            Err(Error::TruncatedRecord { found: 1 })
        ));
    }

    #[test]
    fn subject_inference_cases() {
        let with_subject: Value =
            serde_json::from_str(r#"{"subject":{"subject":{"id":"s"}}}"#).unwrap();
        let without_subject: Value = serde_json::from_str(r#"{"relation":"member"}"#).unwrap();
        let null_subject: Value = serde_json::from_str(r#"{"subject":null}"#).unwrap();
        let empty_subject: Value = serde_json::from_str(r#"{"subject":{}}"#).unwrap();

        assert_eq!(infer_embedded_operation(&with_subject), Operation::Updated);
        assert_eq!(
            infer_embedded_operation(&without_subject),
            Operation::Deleted
        );
        assert_eq!(infer_embedded_operation(&null_subject), Operation::Deleted);
        assert_eq!(infer_embedded_operation(&empty_subject), Operation::Deleted);
    }
}
