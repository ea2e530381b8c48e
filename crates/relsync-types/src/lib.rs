//! # relsync-types: Core types for relsync
//!
//! This crate contains the shared vocabulary used across the reconciler:
//! - Change-log events ([`ChangeEvent`], [`Operation`], [`EventPayload`])
//! - Permission-graph addressing ([`ObjectRef`], [`RelationshipTuple`])
//! - Inventory state ([`InventoryRecord`], [`InventoryId`])
//! - Store interaction results ([`StoreCommand`], [`TupleRead`])
//! - Namespace aliasing ([`canonical_namespace`])

use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

/// Tag prefixed to every relation on the store wire (`member` → `t_member`).
pub const RELATION_TAG: &str = "t_";

/// Byte length of an inventory id embedded positionally in the
/// embedded-JSON log format.
pub const EMBEDDED_ID_LEN: usize = 36;

// ============================================================================
// Namespace aliasing
// ============================================================================

/// Schema-migration namespace aliases, applied to event-supplied resource
/// namespaces before any store operation. Immutable; resolved once per
/// event, never mutated at runtime.
const NAMESPACE_ALIASES: &[(&str, &str)] = &[("authz", "notifications")];

/// Resolves a namespace through the alias table. Namespaces without an
/// alias pass through unchanged.
pub fn canonical_namespace(namespace: &str) -> &str {
    NAMESPACE_ALIASES
        .iter()
        .find(|(from, _)| *from == namespace)
        .map_or(namespace, |(_, to)| to)
}

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque identifier correlating a change event to an inventory record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InventoryId(String);

impl InventoryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for InventoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InventoryId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ============================================================================
// Graph addressing
// ============================================================================

/// Error raised when a graph object or tuple fails to parse from its
/// wire text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseTupleError {
    /// Object token is not `namespace/type:id`.
    #[error("malformed object reference: {0:?}")]
    MalformedObject(String),

    /// Tuple line does not carry resource, relation, and subject tokens.
    #[error("expected 3 tuple fields, found {0}")]
    MissingFields(usize),
}

/// Address of an object in the permission graph, rendered on the wire as
/// `namespace/object_type:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub namespace: String,
    pub object_type: String,
    pub id: String,
}

impl ObjectRef {
    pub fn new(
        namespace: impl Into<String>,
        object_type: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            object_type: object_type.into(),
            id: id.into(),
        }
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.object_type, self.id)
    }
}

impl FromStr for ObjectRef {
    type Err = ParseTupleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParseTupleError::MalformedObject(s.to_string());

        let (namespace, rest) = s.split_once('/').ok_or_else(malformed)?;
        let (object_type, id) = rest.split_once(':').ok_or_else(malformed)?;

        if namespace.is_empty() || object_type.is_empty() || id.is_empty() {
            return Err(malformed());
        }

        Ok(Self::new(namespace, object_type, id))
    }
}

/// A `(resource, relation, subject)` assertion in the permission graph.
///
/// The relation is held untagged; [`Display`] applies the [`RELATION_TAG`]
/// wire prefix and [`FromStr`] strips it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipTuple {
    pub resource: ObjectRef,
    pub relation: String,
    pub subject: ObjectRef,
}

impl RelationshipTuple {
    pub fn new(resource: ObjectRef, relation: impl Into<String>, subject: ObjectRef) -> Self {
        Self {
            resource,
            relation: relation.into(),
            subject,
        }
    }
}

impl Display for RelationshipTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {RELATION_TAG}{} {}",
            self.resource, self.relation, self.subject
        )
    }
}

impl FromStr for RelationshipTuple {
    type Err = ParseTupleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(ParseTupleError::MissingFields(fields.len()));
        }

        let resource: ObjectRef = fields[0].parse()?;
        let relation = fields[1].strip_prefix(RELATION_TAG).unwrap_or(fields[1]);
        let subject: ObjectRef = fields[2].parse()?;

        Ok(Self::new(resource, relation, subject))
    }
}

// ============================================================================
// Inventory state
// ============================================================================

/// The authoritative row the inventory store holds for an inventory id.
///
/// Fetched fresh on every reconciliation decision, never cached across
/// events. A record with any blank field does not count as present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRecord {
    /// Resource id as known to the permission graph.
    pub resource_id: String,
    /// Subject (workspace) id.
    pub workspace_id: String,
    /// Resource type name.
    pub resource_type: String,
    /// Reporter type, lower-cased; doubles as the resource namespace on
    /// the graph side.
    pub reporter_type: String,
}

impl InventoryRecord {
    /// True when all four fields resolved to non-empty values.
    pub fn is_complete(&self) -> bool {
        !self.resource_id.is_empty()
            && !self.workspace_id.is_empty()
            && !self.resource_type.is_empty()
            && !self.reporter_type.is_empty()
    }
}

// ============================================================================
// Change events
// ============================================================================

/// Operation kind carried by a change-log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Created,
    Updated,
    Deleted,
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Operation::Created => "created",
            Operation::Updated => "updated",
            Operation::Deleted => "deleted",
        };
        write!(f, "{kind}")
    }
}

/// Error raised for an operation marker naming an unknown kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown operation kind: {0:?}")]
pub struct UnknownOperation(pub String);

impl FromStr for Operation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Operation::Created),
            "updated" => Ok(Operation::Updated),
            "deleted" => Ok(Operation::Deleted),
            other => Err(UnknownOperation(other.to_string())),
        }
    }
}

/// Relationship as asserted by the source of truth at event time.
/// Carried by `created` and `updated` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipPayload {
    pub relation: String,
    pub resource: ObjectRef,
    pub subject: ObjectRef,
}

/// Resource-scoped payload carried by `deleted` events. The deleting actor
/// does not know the subject at delete time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourcePayload {
    pub namespace: String,
    pub resource_type: String,
    pub resource_id: String,
    pub relation: String,
}

/// Payload of a change event. The shape is fixed by the operation kind:
/// `Created`/`Updated` carry a full relationship, `Deleted` carries a
/// resource and relation only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    Relationship(RelationshipPayload),
    Resource(ResourcePayload),
}

/// The normalized unit of work: one decoded change-log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub inventory_id: InventoryId,
    pub operation: Operation,
    pub payload: EventPayload,
}

// ============================================================================
// Store interaction
// ============================================================================

/// Result of a fully-consistent relationship read.
///
/// `Unparsed` carries raw store output that was non-empty but did not
/// parse as a tuple; callers recover it as a diagnostic no-op rather than
/// acting on text they cannot interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TupleRead {
    Absent,
    Present(RelationshipTuple),
    Unparsed(String),
}

/// A corrective command against the relationship store, produced by the
/// reconciliation engine and executed (or narrated) by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCommand {
    Create(RelationshipTuple),
    Touch(RelationshipTuple),
    BulkDelete { resource: ObjectRef, relation: String },
}

impl Display for StoreCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreCommand::Create(tuple) => write!(f, "relationship create {tuple}"),
            StoreCommand::Touch(tuple) => write!(f, "relationship touch {tuple}"),
            StoreCommand::BulkDelete { resource, relation } => {
                write!(f, "relationship bulk-delete {resource} {RELATION_TAG}{relation}")
            }
        }
    }
}
