//! Validation layer for the extraction ladder
//!
//! - `pre_gate` — cost-avoidance density heuristic, consulted before the
//!   paid text-LLM tier is invoked
//! - `evidence` — hallucination defense: every candidate ingredient must be
//!   traceable to a literal substring of the source text
//! - `normalizer` — ingredient normalization, canonical-catalog linkage,
//!   section handling, dense position re-indexing

pub mod evidence;
pub mod normalizer;
pub mod pre_gate;

pub use evidence::{check_evidence, normalize_fractions, EvidenceVerdict, RejectReason};
pub use normalizer::normalize_ingredients;
pub use pre_gate::{DensityVerdict, PreGate};
