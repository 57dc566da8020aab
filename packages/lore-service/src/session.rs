use dashmap::DashMap;

use lore_domain::ChatTurn;

use crate::SessionStore;

/// In-process working memory of user sessions and their recent turns.
///
/// Advisory only: the durable conversation store is the source of truth and the orchestrator
/// rehydrates from it on a miss.
#[derive(Debug, Default)]
pub struct SessionCache {
	users: DashMap<String, String>,
	histories: DashMap<String, Vec<ChatTurn>>,
}
impl SessionStore for SessionCache {
	fn session_for_user(&self, user_id: &str) -> Option<String> {
		self.users.get(user_id).map(|session| session.value().clone())
	}

	fn bind_session(&self, user_id: &str, candidate: String) -> String {
		self.users.entry(user_id.to_string()).or_insert(candidate).value().clone()
	}

	fn get(&self, session_id: &str) -> Option<Vec<ChatTurn>> {
		self.histories.get(session_id).map(|turns| turns.value().clone())
	}

	fn replace(&self, session_id: &str, turns: Vec<ChatTurn>) {
		self.histories.insert(session_id.to_string(), turns);
	}

	fn append(&self, session_id: &str, turns: &[ChatTurn]) {
		self.histories.entry(session_id.to_string()).or_default().extend_from_slice(turns);
	}

	fn trim(&self, session_id: &str, keep: usize) {
		if let Some(mut history) = self.histories.get_mut(session_id) {
			let excess = history.len().saturating_sub(keep);

			history.drain(..excess);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::{sync::Arc, thread};

	use lore_domain::{ChatTurn, Role};

	use crate::{SessionCache, SessionStore};

	fn turn(content: &str) -> ChatTurn {
		ChatTurn { role: Role::User, content: content.to_string(), timestamp: String::new() }
	}

	#[test]
	fn first_binding_wins() {
		let cache = Arc::new(SessionCache::default());
		let handles = (0..8)
			.map(|idx| {
				let cache = cache.clone();

				thread::spawn(move || cache.bind_session("u1", format!("s{idx}")))
			})
			.collect::<Vec<_>>();
		let winners = handles
			.into_iter()
			.map(|handle| handle.join().expect("Binding thread panicked."))
			.collect::<Vec<_>>();

		assert!(winners.iter().all(|winner| winner == &winners[0]));
		assert_eq!(cache.session_for_user("u1").as_ref(), Some(&winners[0]));
	}

	#[test]
	fn concurrent_appends_are_not_lost() {
		let cache = Arc::new(SessionCache::default());
		let handles = (0..4)
			.map(|idx| {
				let cache = cache.clone();

				thread::spawn(move || {
					for step in 0..25 {
						cache.append("s1", &[turn(&format!("{idx}-{step}"))]);
					}
				})
			})
			.collect::<Vec<_>>();

		for handle in handles {
			handle.join().expect("Append thread panicked.");
		}

		assert_eq!(cache.get("s1").map(|turns| turns.len()), Some(100));
	}

	#[test]
	fn trim_keeps_the_newest_turns() {
		let cache = SessionCache::default();

		cache.append("s1", &[turn("a"), turn("b"), turn("c")]);
		cache.trim("s1", 2);

		let contents = cache
			.get("s1")
			.unwrap_or_default()
			.into_iter()
			.map(|turn| turn.content)
			.collect::<Vec<_>>();

		assert_eq!(contents, vec!["b".to_string(), "c".to_string()]);
	}
}
