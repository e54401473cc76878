//! Data models for the gateway.
//!
//! `object` and `listing` describe what a storage backend holds and returns,
//! `metadata` is the typed record the upload path attaches to each object and
//! `api` holds the JSON bodies of the HTTP surface.

pub mod api;
pub mod listing;
pub mod metadata;
pub mod object;
