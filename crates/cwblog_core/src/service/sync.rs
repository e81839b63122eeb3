//! Association-set reconciliation inside a parent mutation.
//!
//! # Invariants
//! - The payload set is authoritative: previous edges are always discarded.
//! - Runs only inside a caller-owned transaction and never commits.

use crate::model::association::{AssociationEdge, AssociationKind, AssociationRef};
use crate::model::EntityId;
use crate::store::{ReplaceOutcome, StoreResult, StoreTx};
use log::debug;

/// Full-replace synchronizer for post association sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssociationSynchronizer;

impl AssociationSynchronizer {
    /// Replaces the `kind` edges of `parent_id` with `refs`.
    ///
    /// An empty `refs` detaches every child of that kind.
    pub fn synchronize(
        &self,
        tx: &StoreTx<'_>,
        kind: AssociationKind,
        parent_id: EntityId,
        refs: &[AssociationRef],
    ) -> StoreResult<ReplaceOutcome> {
        let table = tx.schema().association(kind)?;
        let edges = desired_edges(parent_id, refs);
        let outcome = tx.replace_association_set(table, parent_id, &edges)?;
        debug!(
            "event=association_sync module=sync status=ok association={} parent_id={parent_id} removed={} written={}",
            kind.as_str(),
            outcome.removed,
            outcome.written
        );
        Ok(outcome)
    }
}

/// One edge per reference, in payload order.
pub fn desired_edges(parent_id: EntityId, refs: &[AssociationRef]) -> Vec<AssociationEdge> {
    refs.iter()
        .map(|reference| AssociationEdge {
            parent_id,
            child_id: reference.id,
            sort: reference.sort,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::desired_edges;
    use crate::model::association::{AssociationEdge, AssociationRef};

    #[test]
    fn desired_edges_keep_payload_order_and_duplicates() {
        let edges = desired_edges(
            7,
            &[
                AssociationRef::new(2, 1),
                AssociationRef::new(1, 0),
                AssociationRef::new(2, 5),
            ],
        );
        assert_eq!(edges.len(), 3);
        assert_eq!(
            edges[0],
            AssociationEdge {
                parent_id: 7,
                child_id: 2,
                sort: 1
            }
        );
        assert_eq!(edges[2].child_id, 2);
    }
}
