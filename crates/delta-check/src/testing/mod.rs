//! The Testing API (spec §6): `has_type`/`events_of_type`-backed helpers used by this
//! crate's own property tests and available to downstream callers for the same purpose.

pub mod generator;

pub use generator::events_of_type;
