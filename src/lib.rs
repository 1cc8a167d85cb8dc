//! voxmap turns long-form audio into a durable, queryable map of who
//! spoke when. Processing is split into independent, resumable stages
//! (fetch, segment, embed, cluster, derive, transcribe) over a SQLite
//! store; every stage checks for existing output before doing work, so
//! re-running the pipeline over a growing project never duplicates rows
//! or files.
//!
//! Heavy ML lives behind collaborator traits ([`pipeline::embed::Diarizer`],
//! [`pipeline::transcribe::Transcriber`], [`pipeline::fetch::AudioFetcher`]);
//! the crate owns the entity graph, the idempotency guards, and the
//! Ward-linkage identity resolver in [`cluster`].
//!
//! The store assumes a single writer process. The guards are
//! check-then-insert, so two pipelines racing on the same database can
//! both pass a check before either commits.

pub mod audio;
pub mod cluster;
pub mod config;
pub mod db;
pub mod output;
pub mod pipeline;
