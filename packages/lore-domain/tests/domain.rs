use lore_domain::{
	DocumentMeta, MetadataFilter, RetrievalMatch, feedback, fusion, plan, rerank, routing,
};

fn item(document_id: &str, chunk_index: i32, score: f64) -> RetrievalMatch {
	RetrievalMatch {
		document_id: document_id.to_string(),
		chunk_index,
		text: format!("{document_id}-{chunk_index}"),
		relevance_score: score,
		source_name: None,
	}
}

fn document(document_id: &str, doc_type: &str, tags: &[&str]) -> DocumentMeta {
	DocumentMeta {
		document_id: document_id.to_string(),
		visibility: "PUBLIC".to_string(),
		doc_type: Some(doc_type.to_string()),
		tags: tags.iter().map(|tag| tag.to_string()).collect(),
		..Default::default()
	}
}

#[test]
fn competition_route_selects_only_competition_documents() {
	let filter = routing::heuristic_filter("挑战杯竞赛获奖后奖学金怎么申请");
	let contest = document("contest", "竞赛奖励", &["挑战杯", "竞赛"]);
	let scholarship = document("scholarship", "评奖评优", &["奖学金"]);

	assert!(filter.matches(&contest));
	assert!(!filter.matches(&scholarship));
}

#[test]
fn merged_filter_without_extraction_equals_heuristic() {
	let heuristic = routing::heuristic_filter("2023年软件学院转专业");
	let merged = routing::merge_filters(heuristic.clone(), MetadataFilter::default(), 4);

	assert_eq!(merged, heuristic);
}

#[test]
fn pipeline_scores_stay_sorted_through_every_stage() {
	let lists = vec![
		vec![item("a", 0, 0.9), item("b", 0, 0.8), item("c", 0, 0.7)],
		vec![item("c", 0, 0.9), item("a", 0, 0.5)],
	];
	let mut fused = fusion::reciprocal_rank_fusion(&lists, 60, 10);
	let boosts = feedback::boost_map(
		&std::collections::HashMap::from([("b".to_string(), 5.0), ("c".to_string(), 1.0)]),
		0.15,
	);

	feedback::apply_boosts(&mut fused, &boosts);

	let reranked = rerank::apply_scores(fused, 2, &rerank::parse_scores("1:0.4\n2:0.6"), 10);

	let order: Vec<_> = reranked.iter().map(|m| m.document_id.as_str()).collect();

	assert_eq!(order, vec!["c", "a", "b"]);

	for pair in reranked.windows(2) {
		assert!(pair[0].relevance_score >= pair[1].relevance_score);
	}
}

#[test]
fn low_quality_floor_applies_to_top_score() {
	assert!(plan::is_low_quality(&[], plan::MIN_ACCEPTABLE_SCORE));
	assert!(plan::is_low_quality(&[item("a", 0, 0.2)], plan::MIN_ACCEPTABLE_SCORE));
	assert!(!plan::is_low_quality(&[item("a", 0, 0.3)], plan::MIN_ACCEPTABLE_SCORE));
}
