//! Filesystem abstractions for fmio.
//!
//! [`entry::NodeInfo`] is the metadata snapshot stored in every tree node;
//! [`ops`] holds the listing, sizing and transfer primitives used by the
//! gatherer and the job engine.

pub mod entry;
pub mod ops;
