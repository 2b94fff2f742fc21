//! # variant-accession
//!
//! A library for assigning stable accessions to genomic variants and
//! clustering them.
//!
//! Submissions of a variant arrive from many projects, over years, through
//! parallel jobs. Each distinct submission must get one permanent submitted
//! variant accession (SS), and submissions that describe the same variant in
//! the same assembly must be grouped under one clustered variant accession
//! (RS), without ever issuing a number twice.
//!
//! `variant-accession` does this with content fingerprints, block-based
//! accession allocation over a shared counter, and a clustering engine that
//! keeps the cluster graph consistent through merges, splits and
//! deprecations.
//!
//! ## Features
//!
//! - **Idempotent accessioning**: the same submission always resolves to the same SS
//! - **Disjoint blocks**: parallel workers never draw the same number
//! - **Crash recovery**: abandoned blocks are reclaimed and their gaps retired
//! - **Clustering**: allele normalization and contig synonyms derive the RS key
//! - **Auditable history**: every mutation is kept as an event with the prior state
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use variant_accession::accession::{AccessionGenerator, GeneratorSettings};
//! use variant_accession::clustering::{ClusteringEngine, KeyDeriver};
//! use variant_accession::core::types::{Archive, Category};
//! use variant_accession::core::variant::VariantSubmission;
//! use variant_accession::store::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::new());
//! let settings = GeneratorSettings::new("worker-1", "run-1");
//! let mut submitted = AccessionGenerator::new(Arc::clone(&store), Category::Ss, settings.clone());
//! let mut clustering =
//!     ClusteringEngine::new(Arc::clone(&store), settings, Arc::new(KeyDeriver::new()));
//!
//! let submission = VariantSubmission::new("GCA_000001405.15", "PRJEB1", "1", 100, "A", "T");
//! let (ss, _) = submitted.get_or_create(&submission, Archive::Eva).unwrap();
//! let rs = clustering.cluster(&ss).unwrap();
//!
//! // Submitting again resolves to the same accessions
//! let (again, _) = submitted.get_or_create(&submission, Archive::Eva).unwrap();
//! assert_eq!(again.accession, ss.accession);
//! assert_eq!(clustering.cluster(&again).unwrap(), rs);
//! ```
//!
//! ## Modules
//!
//! - [`accession`]: Fingerprints, block allocation and accession generation
//! - [`clustering`]: Clustering keys and the cluster graph
//! - [`core`]: Records, events and shared types
//! - [`lifecycle`]: Deprecation and remapping
//! - [`parsing`]: Variant tables, assembly reports and remap mappings
//! - [`pipeline`]: Staged, chunked accessioning jobs
//! - [`recovery`]: Reclaiming abandoned accession blocks
//! - [`store`]: The record store contract and its in-memory implementation
//! - [`cli`]: Command-line interface implementation

pub mod accession;
pub mod cli;
pub mod clustering;
pub mod core;
pub mod lifecycle;
pub mod parsing;
pub mod pipeline;
pub mod recovery;
pub mod store;
pub mod utils;

// Re-export commonly used types for convenience
pub use accession::{AccessionError, AccessionGenerator, AccessionOutcome, GeneratorSettings};
pub use clustering::{ClusteringEngine, ClusteringError, KeyDeriver};
pub use core::types::*;
pub use core::variant::{ClusteredVariant, SubmittedVariant, VariantSubmission};
pub use pipeline::{run_job, JobConfig, JobReport, JobStatus};
pub use store::{MemoryStore, RecordStore};
