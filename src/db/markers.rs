use tracing::debug;

use crate::storage::LinkStore;
use crate::types::{DoubletError, LinkId, Result};
use crate::unicode::UNICODE_MAP_SIZE;

/// Marker tagging page records.
pub const PAGE_MARKER: LinkId = UNICODE_MAP_SIZE + 1;
/// Marker tagging sequence roots.
pub const SEQUENCE_MARKER: LinkId = UNICODE_MAP_SIZE + 2;

/// Makes sure the point `expected` exists, creating it when the store has not
/// reached that id yet.
///
/// Fails with [`DoubletError::MarkerMismatch`] when the id is taken by a link
/// that is not a point, or when creation lands on another id.
pub(crate) fn allocate_marker(
    store: &LinkStore,
    name: &'static str,
    expected: LinkId,
) -> Result<LinkId> {
    if store.exists(expected)? {
        let link = store.get(expected)?;
        if link.is_point() {
            return Ok(expected);
        }
        return Err(DoubletError::MarkerMismatch {
            name,
            expected,
            actual: store.len()? + 1,
        });
    }

    let actual = store.create_point()?;
    if actual != expected {
        return Err(DoubletError::MarkerMismatch {
            name,
            expected,
            actual,
        });
    }
    debug!(name, id = actual, "db.marker.allocated");
    Ok(actual)
}
