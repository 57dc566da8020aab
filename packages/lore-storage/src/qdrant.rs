use std::collections::HashMap;

use qdrant_client::qdrant::{
	Condition, CreateCollectionBuilder, Distance, Document, Filter, Modifier, PointId, Query,
	QueryPointsBuilder, ScoredPoint, SparseVectorParamsBuilder, SparseVectorsConfigBuilder, Value,
	VectorParamsBuilder, VectorsConfigBuilder, value::Kind,
};

use crate::Result;

pub const DENSE_VECTOR_NAME: &str = "dense";
pub const BM25_VECTOR_NAME: &str = "bm25";
pub const BM25_MODEL: &str = "qdrant/bm25";

/// A chunk point returned by one of the index queries.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
	pub point_id: PointId,
	pub document_id: String,
	pub chunk_index: i32,
	pub text: String,
	pub score: f32,
}

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &lore_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(());
		}

		let mut vectors_config = VectorsConfigBuilder::default();

		vectors_config.add_named_vector_params(
			DENSE_VECTOR_NAME,
			VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine),
		);

		let mut sparse_vectors_config = SparseVectorsConfigBuilder::default();

		sparse_vectors_config.add_named_vector_params(
			BM25_VECTOR_NAME,
			SparseVectorParamsBuilder::default().modifier(Modifier::Idf as i32),
		);

		let builder = CreateCollectionBuilder::new(self.collection.clone())
			.vectors_config(vectors_config)
			.sparse_vectors_config(sparse_vectors_config);

		self.client.create_collection(builder).await?;

		tracing::info!(collection = %self.collection, "Created Qdrant collection.");

		Ok(())
	}

	/// Nearest chunks by dense embedding.
	pub async fn dense_search(&self, vector: Vec<f32>, limit: u64) -> Result<Vec<ScoredChunk>> {
		let search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(vector))
			.using(DENSE_VECTOR_NAME)
			.limit(limit)
			.with_payload(true);
		let response = self.client.query(search).await?;

		Ok(collect_chunks(response.result))
	}

	/// BM25 scores for `text`, restricted to the given points when `within` is non-empty.
	pub async fn lexical_search(
		&self,
		text: &str,
		limit: u64,
		within: &[PointId],
	) -> Result<Vec<ScoredChunk>> {
		let mut search = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(Document::new(text.to_string(), BM25_MODEL)))
			.using(BM25_VECTOR_NAME)
			.limit(limit)
			.with_payload(true);

		if !within.is_empty() {
			search = search.filter(Filter::must([Condition::has_id(within.to_vec())]));
		}

		let response = self.client.query(search).await?;

		Ok(collect_chunks(response.result))
	}
}

fn collect_chunks(points: Vec<ScoredPoint>) -> Vec<ScoredChunk> {
	let mut out = Vec::with_capacity(points.len());

	for point in points {
		let Some(point_id) = point.id else {
			tracing::warn!("Scored point missing id.");

			continue;
		};
		let Some(document_id) = payload_string(&point.payload, "document_id") else {
			tracing::warn!(point_id = ?point_id, "Scored point missing document_id.");

			continue;
		};
		let Some(chunk_index) = payload_i32(&point.payload, "chunk_index") else {
			tracing::warn!(point_id = ?point_id, "Scored point missing chunk_index.");

			continue;
		};
		let text = payload_string(&point.payload, "text").unwrap_or_default();

		out.push(ScoredChunk { point_id, document_id, chunk_index, text, score: point.score });
	}

	out
}

pub fn payload_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::StringValue(text)) => Some(text.to_string()),
		_ => None,
	}
}

pub fn payload_i32(payload: &HashMap<String, Value>, key: &str) -> Option<i32> {
	let value = payload.get(key)?;

	match &value.kind {
		Some(Kind::IntegerValue(value)) => i32::try_from(*value).ok(),
		Some(Kind::DoubleValue(value)) =>
			if value.fract() == 0.0 {
				i32::try_from(*value as i64).ok()
			} else {
				None
			},
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use std::collections::HashMap;

	use qdrant_client::qdrant::{ScoredPoint, Value};

	use crate::qdrant::{collect_chunks, payload_i32};

	fn point(id: u64, payload: HashMap<String, Value>, score: f32) -> ScoredPoint {
		ScoredPoint { id: Some(id.into()), payload, score, ..Default::default() }
	}

	#[test]
	fn chunk_index_accepts_whole_doubles_only() {
		let mut payload = HashMap::new();

		payload.insert("a".to_string(), Value::from(3.0_f64));
		payload.insert("b".to_string(), Value::from(3.5_f64));
		payload.insert("c".to_string(), Value::from(7_i64));

		assert_eq!(payload_i32(&payload, "a"), Some(3));
		assert_eq!(payload_i32(&payload, "b"), None);
		assert_eq!(payload_i32(&payload, "c"), Some(7));
		assert_eq!(payload_i32(&payload, "missing"), None);
	}

	#[test]
	fn points_without_document_id_are_skipped() {
		let mut complete = HashMap::new();

		complete.insert("document_id".to_string(), Value::from("doc-1"));
		complete.insert("chunk_index".to_string(), Value::from(2_i64));
		complete.insert("text".to_string(), Value::from("奖学金申请流程"));

		let mut orphan = HashMap::new();

		orphan.insert("chunk_index".to_string(), Value::from(0_i64));

		let chunks = collect_chunks(vec![point(1, complete, 0.8), point(2, orphan, 0.9)]);

		assert_eq!(chunks.len(), 1);
		assert_eq!(chunks[0].document_id, "doc-1");
		assert_eq!(chunks[0].chunk_index, 2);
		assert_eq!(chunks[0].text, "奖学金申请流程");
	}
}
