use super::support::{FakeEmbedding, HarnessBuilder, VECTOR_DIM, intent};
use curio_service::{Error, IngestReport, IngestRequest, SearchStrategy, TemplateInput};

fn input(id: &str, name: &str) -> TemplateInput {
	TemplateInput {
		template_id: id.to_string(),
		name: name.to_string(),
		description: format!("{name} for teams."),
		category: "presentation".to_string(),
		tags: vec!["startup".to_string()],
		style: "minimal".to_string(),
		color_scheme: "blue".to_string(),
		use_case: "pitch".to_string(),
		thumbnail_url: String::new(),
		preview_url: String::new(),
		view_count: 0,
		use_count: 5,
		rating: 4.0,
	}
}

fn builder() -> HarnessBuilder {
	HarnessBuilder::new(intent(SearchStrategy::Hybrid, &[], &[]))
}

#[tokio::test]
async fn ingest_writes_rows_and_vectors() {
	let mut deck = input("deck-1", "Pitch Deck");
	let mut builder = builder();

	// Tags are trimmed before the text is embedded.
	builder.embedding =
		FakeEmbedding::new().with_vector(&deck.embedding_text(), vec![0.0, 0.5, 0.5]);
	deck.tags = vec![" startup ".to_string(), String::new()];

	let harness = builder.build();
	let report = harness
		.service
		.ingest_templates(IngestRequest { templates: vec![deck] })
		.await
		.expect("Ingest.");

	assert_eq!(report, IngestReport { ingested_count: 1, error_count: 0 });

	let row = harness.catalog.row("deck-1").expect("Row must be stored.");

	assert_eq!(row.tags, vec!["startup".to_string()]);
	assert_eq!(row.use_count, 5);
	assert_eq!(harness.catalog.vector("deck-1"), Some(vec![0.0, 0.5, 0.5]));
}

#[tokio::test]
async fn embedding_with_the_wrong_dimension_is_skipped_and_counted() {
	let short = input("short", "Short Vector");
	let mut builder = builder();

	builder.embedding = FakeEmbedding::new().with_vector(&short.embedding_text(), vec![1.0]);

	let harness = builder.build();
	let report = harness
		.service
		.ingest_templates(IngestRequest { templates: vec![short, input("ok", "Fine")] })
		.await
		.expect("Ingest.");

	assert_eq!(report, IngestReport { ingested_count: 1, error_count: 1 });
	assert!(harness.catalog.row("short").is_none());
	assert_eq!(harness.catalog.vector("ok").map(|vector| vector.len()), Some(VECTOR_DIM as usize));
}

#[tokio::test]
async fn embedding_failure_is_skipped_and_counted() {
	let mut builder = builder();

	builder.embedding.fail = true;

	let harness = builder.build();
	let report = harness
		.service
		.ingest_templates(IngestRequest { templates: vec![input("a", "A"), input("b", "B")] })
		.await
		.expect("Ingest.");

	assert_eq!(report, IngestReport { ingested_count: 0, error_count: 2 });
}

#[tokio::test]
async fn malformed_batch_is_rejected_before_any_write() {
	let harness = builder().build();
	let err = harness
		.service
		.ingest_templates(IngestRequest { templates: vec![input("a", "A"), input(" ", "Blank")] })
		.await
		.expect_err("Blank id must be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert!(harness.catalog.row("a").is_none());

	let err = harness
		.service
		.ingest_templates(IngestRequest { templates: Vec::new() })
		.await
		.expect_err("Empty batch must be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
}

#[tokio::test]
async fn store_failure_aborts_the_batch() {
	let mut builder = builder();

	builder.catalog.fail_writes = true;

	let harness = builder.build();
	let err = harness
		.service
		.ingest_templates(IngestRequest { templates: vec![input("a", "A")] })
		.await
		.expect_err("Store failure must surface.");

	assert!(matches!(err, Error::Storage { .. }));
}

#[tokio::test]
async fn reingest_keeps_accumulated_counters() {
	let harness = builder().build();

	harness
		.service
		.ingest_templates(IngestRequest { templates: vec![input("deck-1", "Pitch Deck")] })
		.await
		.expect("Ingest.");
	harness.service.get_template("deck-1").await.expect("View.");

	let mut renamed = input("deck-1", "Pitch Deck v2");

	renamed.use_count = 0;

	harness
		.service
		.ingest_templates(IngestRequest { templates: vec![renamed] })
		.await
		.expect("Re-ingest.");

	let row = harness.catalog.row("deck-1").expect("Row must be stored.");

	assert_eq!(row.name, "Pitch Deck v2");
	assert_eq!((row.view_count, row.use_count), (1, 5));
}

#[tokio::test]
async fn get_template_counts_each_view() {
	let harness = builder().build();

	harness
		.service
		.ingest_templates(IngestRequest { templates: vec![input("deck-1", "Pitch Deck")] })
		.await
		.expect("Ingest.");

	let first = harness.service.get_template("deck-1").await.expect("First view.");
	let second = harness.service.get_template(" deck-1 ").await.expect("Second view.");

	assert_eq!(first.template_id, "deck-1");
	assert_eq!((first.view_count, second.view_count), (1, 2));
}

#[tokio::test]
async fn unknown_or_blank_template_id_is_rejected() {
	let harness = builder().build();
	let missing = harness.service.get_template("nope").await.expect_err("Must be missing.");
	let blank = harness.service.get_template("  ").await.expect_err("Must be rejected.");

	assert!(matches!(missing, Error::NotFound { .. }));
	assert!(matches!(blank, Error::InvalidRequest { .. }));
}
