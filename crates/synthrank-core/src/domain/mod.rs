//! Domain models for synthesis-and-ranking rounds.
//!
//! - `RoundParameters`: immutable configuration for one round
//! - `AnchorItem` / `CandidateItem`: per-model responses
//! - `RoundArtifacts`: the output bundle
//! - `RoundError` / `CollaboratorError`: error taxonomy

pub mod artifacts;
pub mod error;
pub mod items;
pub mod params;

pub use artifacts::{preview, RoundArtifacts, PREVIEW_CHARS};
pub use error::{CollaboratorError, Result, RoundError, SoftFailure, Stage};
pub use items::{AnchorItem, CandidateItem};
pub use params::{RankMode, RoundParameters};
