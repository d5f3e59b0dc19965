//! Mapping between UTF-16 code units and the first links of a store.

use std::fmt::Write as _;

use tracing::info;

use crate::storage::LinkStore;
use crate::types::{DoubletError, LinkId, Result};

/// Number of code-unit atoms; they occupy ids `1..=UNICODE_MAP_SIZE`.
pub const UNICODE_MAP_SIZE: u64 = 1 << 16;

/// Atom id of a UTF-16 code unit.
#[inline]
pub const fn unit_to_link(unit: u16) -> LinkId {
    unit as LinkId + 1
}

/// Code unit named by an atom id, if it is one.
#[inline]
pub fn link_to_unit(id: LinkId) -> Option<u16> {
    if (1..=UNICODE_MAP_SIZE).contains(&id) {
        Some((id - 1) as u16)
    } else {
        None
    }
}

/// Creates the code-unit atoms on a store that does not have them yet.
///
/// A store that already holds at least [`UNICODE_MAP_SIZE`] links is assumed
/// to have been initialized before and is left untouched.
pub fn init(store: &LinkStore) -> Result<()> {
    let existing = store.len()?;
    if existing >= UNICODE_MAP_SIZE {
        return Ok(());
    }
    for expected in existing + 1..=UNICODE_MAP_SIZE {
        let actual = store.create_point()?;
        if actual != expected {
            return Err(DoubletError::MarkerMismatch {
                name: "code unit atom",
                expected,
                actual,
            });
        }
    }
    info!(atoms = UNICODE_MAP_SIZE - existing, "unicode.init");
    Ok(())
}

/// Encodes text as code-unit atom ids.
pub fn encode(text: &str) -> Vec<LinkId> {
    text.encode_utf16().map(unit_to_link).collect()
}

/// Decodes atom ids back into text. Fails on ids that are not code-unit atoms
/// and on malformed UTF-16.
pub fn decode(ids: &[LinkId]) -> Result<String> {
    let units = ids
        .iter()
        .map(|&id| {
            link_to_unit(id)
                .ok_or_else(|| DoubletError::invalid(format!("link {id} is not a code unit")))
        })
        .collect::<Result<Vec<u16>>>()?;
    String::from_utf16(&units).map_err(|e| DoubletError::invalid(e.to_string()))
}

/// Renders ids for display: code units as text, anything else as `(id)`.
pub fn render(ids: &[LinkId]) -> String {
    let mut out = String::with_capacity(ids.len());
    let mut units = Vec::new();
    for &id in ids {
        match link_to_unit(id) {
            Some(unit) => units.push(unit),
            None => {
                flush_units(&mut out, &mut units);
                let _ = write!(out, "({id})");
            }
        }
    }
    flush_units(&mut out, &mut units);
    out
}

fn flush_units(out: &mut String, units: &mut Vec<u16>) {
    out.extend(char::decode_utf16(units.drain(..)).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)));
}
