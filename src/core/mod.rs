//! Core data types for variant accessioning.
//!
//! This module provides the records the engine reads and writes:
//!
//! - [`VariantSubmission`]: the six identity fields of an incoming variant
//! - [`SubmittedVariant`] (SS): an accessioned submission with its cluster back-reference
//! - [`ClusteredVariant`] (RS): the canonical record for one clustering key
//! - [`AccessionBlock`], [`RetiredRange`]: allocator state and recovery anchors
//! - [`OperationEvent`]: append-only audit trail of every mutation
//! - [`ContigSynonyms`]: explicit contig aliases of an assembly
//!
//! ## Cluster lifecycle
//!
//! | From   | To         | Recorded                      |
//! |--------|------------|-------------------------------|
//! | ACTIVE | MERGED     | `merged_into` target          |
//! | ACTIVE | DEPRECATED | `deprecation_reason`          |
//! | ACTIVE | ACTIVE     | split: members move elsewhere |
//!
//! MERGED and DEPRECATED are terminal.
//!
//! [`VariantSubmission`]: variant::VariantSubmission
//! [`SubmittedVariant`]: variant::SubmittedVariant
//! [`ClusteredVariant`]: variant::ClusteredVariant
//! [`AccessionBlock`]: block::AccessionBlock
//! [`RetiredRange`]: block::RetiredRange
//! [`OperationEvent`]: event::OperationEvent
//! [`ContigSynonyms`]: contig::ContigSynonyms

pub mod block;
pub mod contig;
pub mod event;
pub mod types;
pub mod variant;
