//! Reconciliation decision engine.
//!
//! For each decoded change event the [`Reconciler`] queries current
//! inventory state, reads current graph state at full consistency, and
//! decides the corrective [`StoreCommand`], or an explicit no-op. One
//! terminal decision per event; nothing is cached across events.
//!
//! Reconciliation is an idempotent convergence operation, not a replay of
//! history: only the *current* inventory state and *current* graph state
//! are compared, regardless of how many events led there.

pub mod error;

pub use error::{Error, Result};

use tracing::{info, warn};

use relsync_graph::GraphClient;
use relsync_inventory::InventoryClient;
use relsync_types::{
    canonical_namespace, ChangeEvent, EventPayload, InventoryId, InventoryRecord, ObjectRef,
    Operation, RelationshipPayload, RelationshipTuple, ResourcePayload, StoreCommand, TupleRead,
};

/// Source of authoritative inventory records.
pub trait InventorySource {
    fn lookup(&self, inventory_id: &InventoryId) -> relsync_inventory::Result<Option<InventoryRecord>>;
}

impl InventorySource for InventoryClient {
    fn lookup(&self, inventory_id: &InventoryId) -> relsync_inventory::Result<Option<InventoryRecord>> {
        InventoryClient::lookup(self, inventory_id)
    }
}

impl<T: InventorySource + ?Sized> InventorySource for &T {
    fn lookup(&self, inventory_id: &InventoryId) -> relsync_inventory::Result<Option<InventoryRecord>> {
        (**self).lookup(inventory_id)
    }
}

/// Fully-consistent reader of current graph state.
pub trait TupleReader {
    fn read(
        &self,
        resource: &ObjectRef,
        relation: &str,
        subject: Option<&ObjectRef>,
    ) -> relsync_graph::Result<TupleRead>;
}

impl TupleReader for GraphClient {
    fn read(
        &self,
        resource: &ObjectRef,
        relation: &str,
        subject: Option<&ObjectRef>,
    ) -> relsync_graph::Result<TupleRead> {
        GraphClient::read(self, resource, relation, subject)
    }
}

impl<T: TupleReader + ?Sized> TupleReader for &T {
    fn read(
        &self,
        resource: &ObjectRef,
        relation: &str,
        subject: Option<&ObjectRef>,
    ) -> relsync_graph::Result<TupleRead> {
        (**self).read(resource, relation, subject)
    }
}

/// Per-event reconciliation state machine over the two collaborators.
pub struct Reconciler<I, S> {
    inventory: I,
    store: S,
}

impl<I: InventorySource, S: TupleReader> Reconciler<I, S> {
    pub fn new(inventory: I, store: S) -> Self {
        Self { inventory, store }
    }

    /// Decides the corrective command for one event. `Ok(None)` is an
    /// explicit no-op: current state already agrees with inventory, or
    /// the event is contradicted by it.
    pub fn reconcile(&self, event: &ChangeEvent) -> Result<Option<StoreCommand>> {
        info!(
            inventory_id = %event.inventory_id,
            operation = %event.operation,
            "reconciling event"
        );

        match (event.operation, &event.payload) {
            (Operation::Deleted, EventPayload::Resource(payload)) => {
                self.reconcile_deleted(&event.inventory_id, payload)
            }
            (Operation::Created, EventPayload::Relationship(payload)) => {
                self.reconcile_created(&event.inventory_id, payload)
            }
            (Operation::Updated, EventPayload::Relationship(payload)) => {
                self.reconcile_updated(&event.inventory_id, payload)
            }
            (operation, _) => {
                warn!(%operation, "payload shape does not match operation, skipping");
                Ok(None)
            }
        }
    }

    /// A delete only proceeds when inventory confirms the resource is
    /// gone. Events race with re-creation; an inventory-confirmed-live
    /// resource is never removed from the graph.
    fn reconcile_deleted(
        &self,
        inventory_id: &InventoryId,
        payload: &ResourcePayload,
    ) -> Result<Option<StoreCommand>> {
        if self.resolve_inventory(inventory_id).is_some() {
            info!("resource still present in inventory, refusing to delete");
            return Ok(None);
        }

        let resource = ObjectRef::new(
            canonical_namespace(&payload.namespace),
            &payload.resource_type,
            &payload.resource_id,
        );

        // Resource-scoped read: the subject is unknown at delete time.
        match self.store.read(&resource, &payload.relation, None)? {
            TupleRead::Present(tuple) => {
                info!(%tuple, "tuple still present in graph, deleting");
                Ok(Some(StoreCommand::BulkDelete {
                    resource,
                    relation: payload.relation.clone(),
                }))
            }
            TupleRead::Absent => {
                info!("tuple absent from graph, nothing to delete");
                Ok(None)
            }
            TupleRead::Unparsed(_) => {
                warn!("ambiguous read result, leaving graph untouched");
                Ok(None)
            }
        }
    }

    fn reconcile_created(
        &self,
        inventory_id: &InventoryId,
        payload: &RelationshipPayload,
    ) -> Result<Option<StoreCommand>> {
        let Some(record) = self.resolve_inventory(inventory_id) else {
            info!("no inventory record, skipping create");
            return Ok(None);
        };

        let tuple = derived_tuple(&record, payload);
        match self
            .store
            .read(&tuple.resource, &tuple.relation, Some(&tuple.subject))?
        {
            TupleRead::Present(existing) => {
                info!(%existing, "tuple already present in graph, nothing to create");
                Ok(None)
            }
            TupleRead::Unparsed(_) => {
                warn!("ambiguous read result, leaving graph untouched");
                Ok(None)
            }
            TupleRead::Absent => {
                info!("present in inventory but absent from graph, creating");
                Ok(Some(StoreCommand::Create(tuple)))
            }
        }
    }

    fn reconcile_updated(
        &self,
        inventory_id: &InventoryId,
        payload: &RelationshipPayload,
    ) -> Result<Option<StoreCommand>> {
        let Some(record) = self.resolve_inventory(inventory_id) else {
            info!("no inventory record, skipping update");
            return Ok(None);
        };

        let tuple = derived_tuple(&record, payload);
        match self
            .store
            .read(&tuple.resource, &tuple.relation, Some(&tuple.subject))?
        {
            TupleRead::Present(current) => {
                if current.resource.id == record.resource_id
                    && current.subject.id == record.workspace_id
                {
                    info!("graph already matches inventory, nothing to update");
                    Ok(None)
                } else {
                    info!(%current, "graph has drifted from inventory, overwriting");
                    Ok(Some(StoreCommand::Touch(tuple)))
                }
            }
            // Missing-but-should-exist: touch is an idempotent upsert, so
            // the create case needs no separate branch here.
            TupleRead::Absent => {
                info!("tuple absent from graph but present in inventory, writing");
                Ok(Some(StoreCommand::Touch(tuple)))
            }
            TupleRead::Unparsed(_) => {
                warn!("ambiguous read result, leaving graph untouched");
                Ok(None)
            }
        }
    }

    /// Resolves an inventory record, demanding all four fields. Lookup
    /// failures are reported and treated as "record absent"; a missing
    /// resource is a legitimate steady state, not a reason to halt.
    fn resolve_inventory(&self, inventory_id: &InventoryId) -> Option<InventoryRecord> {
        match self.inventory.lookup(inventory_id) {
            Ok(Some(record)) if record.is_complete() => Some(record),
            Ok(Some(_)) => {
                info!("inventory record incomplete, treating as absent");
                None
            }
            Ok(None) => None,
            Err(error) => {
                warn!(%error, "inventory lookup failed, treating record as absent");
                None
            }
        }
    }
}

/// Builds the tuple the graph should hold for an upsert event: resource
/// identifiers come from the inventory record, the subject namespace and
/// type from the event, and the subject id from inventory.
fn derived_tuple(record: &InventoryRecord, payload: &RelationshipPayload) -> RelationshipTuple {
    let resource = ObjectRef::new(
        &record.reporter_type,
        &record.resource_type,
        &record.resource_id,
    );
    let subject = ObjectRef::new(
        &payload.subject.namespace,
        &payload.subject.object_type,
        &record.workspace_id,
    );
    RelationshipTuple::new(resource, &payload.relation, subject)
}
