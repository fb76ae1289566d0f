//! Referentially consistent sampling of relational databases.
//!
//! [`sample::Sampler`] extracts a small subset of a [`store::Store`] in which
//! every reference resolves; [`snapshot`] writes it to disk and
//! [`load::Loader`] restores it into a [`store::RowSink`].

pub mod cache;
pub mod load;
pub mod sample;
pub mod schema;
pub mod snapshot;
pub mod store;
