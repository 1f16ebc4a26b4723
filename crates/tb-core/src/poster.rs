//! Name-field handling.
//!
//! A name field of `anon#secret` displays as `anon◆xxxxxxxxxx`. Typed marker
//! glyphs are swapped for a hollow diamond so a handle cannot pass for a trip.

use crate::traits::TripcodeGenerator;

pub const TRIP_MARK: char = '◆';
pub const ESCAPED_TRIP_MARK: char = '◇';

/// Splits at the first `#`. The secret keeps its `#`.
pub fn split_name_field(raw: &str) -> (&str, Option<&str>) {
    match raw.find('#') {
        Some(at) => (&raw[..at], Some(&raw[at..])),
        None => (raw, None),
    }
}

pub fn format_poster_name(raw: &str, trips: &dyn TripcodeGenerator) -> String {
    let (handle, secret) = split_name_field(raw);
    let handle = handle.replace(TRIP_MARK, &ESCAPED_TRIP_MARK.to_string());
    match secret {
        Some(secret) => format!("{handle}{}", trips.derive(secret)),
        None => handle,
    }
}
