use std::{
	collections::{BTreeSet, HashMap},
	sync::Arc,
};

use serde::Deserialize;

use lore_config::Config;
use lore_domain::{RetrievalMatch, feedback};

use crate::{ConversationStore, Error, NewFeedback, Result};

const MIN_SCORE: i64 = 1;
const MAX_SCORE: i64 = 5;

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRequest {
	#[serde(default)]
	pub message_id: Option<i64>,
	#[serde(default)]
	pub user_id: Option<String>,
	pub score: i64,
	#[serde(default)]
	pub comment: Option<String>,
}

/// Stores answer ratings and turns them into per-document score multipliers.
#[derive(Clone)]
pub struct FeedbackLoop {
	cfg: Arc<Config>,
	conversations: Arc<dyn ConversationStore>,
}
impl FeedbackLoop {
	pub fn new(cfg: Arc<Config>, conversations: Arc<dyn ConversationStore>) -> Self {
		Self { cfg, conversations }
	}

	pub async fn record_feedback(&self, req: FeedbackRequest) -> Result<i64> {
		let Some(message_id) = req.message_id else {
			return Err(Error::InvalidRequest { message: "messageId is required.".to_string() });
		};

		if !(MIN_SCORE..=MAX_SCORE).contains(&req.score) {
			return Err(Error::InvalidRequest {
				message: "score must be in the range 1-5.".to_string(),
			});
		}
		if !self.conversations.message_exists(message_id).await? {
			return Err(Error::NotFound { message: format!("Message {message_id} does not exist.") });
		}

		let user_id = crate::normalize_user_id(req.user_id.as_deref());
		let comment = req.comment.as_deref().map(str::trim).filter(|comment| !comment.is_empty());
		let feedback_id = self
			.conversations
			.append_feedback(NewFeedback {
				message_id,
				user_id: &user_id,
				score: req.score as u8,
				comment,
			})
			.await?;

		tracing::info!(message_id, feedback_id, score = req.score, "Recorded answer feedback.");

		Ok(feedback_id)
	}

	/// Boost per document, computed fresh from stored ratings on every call.
	pub async fn boosts(&self, matches: &[RetrievalMatch]) -> HashMap<String, f64> {
		let cfg = &self.cfg.retrieval.feedback;

		if !cfg.enabled || matches.is_empty() {
			return HashMap::new();
		}

		let document_ids = matches
			.iter()
			.map(|item| item.document_id.clone())
			.collect::<BTreeSet<_>>()
			.into_iter()
			.collect::<Vec<_>>();

		match self.conversations.average_ratings(&document_ids).await {
			Ok(averages) => feedback::boost_map(&averages, f64::from(cfg.max_boost)),
			Err(err) => {
				tracing::warn!(error = %err, "Loading feedback ratings failed.");

				HashMap::new()
			},
		}
	}

	/// Multiplies each score by `1 + boost` and re-sorts descending.
	pub async fn apply(&self, matches: &mut [RetrievalMatch]) {
		let boosts = self.boosts(matches).await;

		feedback::apply_boosts(matches, &boosts);
	}
}
