//! Pure retrieval-and-answer rules shared by the service and the evaluation runner.
//!
//! Nothing in this crate performs I/O; every function is deterministic given its inputs.

pub mod crag;
pub mod eval;
pub mod feedback;
pub mod fusion;
pub mod model;
pub mod plan;
pub mod prompt;
pub mod rerank;
pub mod routing;
pub mod text;

pub use model::{
	ANONYMOUS_USER, ChatTurn, CragAction, CragDecision, DocumentMeta, MetadataFilter, QueryPlan,
	RetrievalMatch, Role, Visibility,
};
