//! Pipeline tests over a temp-backed store and the deterministic hash
//! embedder, with the model endpoint pointed at an unreachable port so
//! every model-dependent stage exercises its deterministic fallback.

use std::collections::BTreeMap;
use std::sync::Arc;

use llm_service::{LlmModelConfig, LlmProvider, LlmServiceProfiles};
use rate_retrieval::{
    FALLBACK_RATIONALE, MANUAL_REVIEW_ANSWER, MemoryRateStore, PipelineConfig, PreciseRate,
    RetrievalError, RetrievalPipeline, SearchFilters, TENANT_KEY,
};
use vector_store::{HashEmbedder, VectorStore};

fn offline_svc() -> Arc<LlmServiceProfiles> {
    let cfg = LlmModelConfig {
        provider: LlmProvider::Ollama,
        model: "qwen3:14b".into(),
        endpoint: "http://127.0.0.1:1".into(),
        api_key: None,
        max_tokens: None,
        temperature: None,
        top_p: None,
        timeout_secs: Some(1),
    };
    Arc::new(LlmServiceProfiles::new(cfg.clone(), None, cfg, Some(1)).unwrap())
}

fn meta(org: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(TENANT_KEY.to_string(), org.to_string())])
}

async fn seeded_pipeline(
    docs: &[(&str, &str, &str)],
    rates: MemoryRateStore,
) -> (RetrievalPipeline, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(VectorStore::open(dir.path(), Arc::new(HashEmbedder::new(64))).unwrap());
    let cfg = PipelineConfig::default();
    store.create_collection(&cfg.collection).await.unwrap();

    let (ids, documents, metadatas) = docs.iter().fold(
        (Vec::new(), Vec::new(), Vec::new()),
        |(mut ids, mut documents, mut metadatas), (id, org, text)| {
            ids.push(id.to_string());
            documents.push(text.to_string());
            metadatas.push(meta(org));
            (ids, documents, metadatas)
        },
    );
    store
        .upsert(&cfg.collection, documents, metadatas, ids)
        .await
        .unwrap();

    let pipeline = RetrievalPipeline::new(store, offline_svc(), Arc::new(rates), cfg);
    (pipeline, dir)
}

const ROUTE_DOC: &str = "20ft container rate Shanghai to Rotterdam\nUSD 1500 all-in\ntransit 32 days";
const ROUTE_DOC_ALT: &str = "40hc container rate Shanghai to Rotterdam\nUSD 2100 all-in";
const MEMO_DOC: &str = "internal memo about office holidays and parking arrangements";

#[tokio::test]
async fn tenant_isolation_is_absolute() {
    let (pipeline, _dir) = seeded_pipeline(
        &[
            ("doc-own", "org-1", ROUTE_DOC),
            ("doc-other", "org-2", ROUTE_DOC_ALT),
        ],
        MemoryRateStore::new(),
    )
    .await;

    let res = pipeline
        .search("org-1", "container rate Shanghai to Rotterdam", &SearchFilters::default(), 5)
        .await
        .unwrap();

    assert!(!res.results.is_empty());
    assert!(res.results.iter().all(|r| r.id == "doc-own"));
    assert!(res
        .results
        .iter()
        .all(|r| r.metadata.get(TENANT_KEY).unwrap() == "org-1"));
}

#[tokio::test]
async fn route_docs_outrank_unrelated_memo() {
    let (pipeline, _dir) = seeded_pipeline(
        &[
            ("doc-route", "org-1", ROUTE_DOC),
            ("doc-route-alt", "org-1", ROUTE_DOC_ALT),
            ("doc-memo", "org-1", MEMO_DOC),
        ],
        MemoryRateStore::new(),
    )
    .await;

    let res = pipeline
        .search("org-1", "20ft rate Shanghai to Rotterdam", &SearchFilters::default(), 2)
        .await
        .unwrap();

    // Both route documents take the two slots; the memo shares no query
    // vocabulary and never reaches them.
    assert_eq!(res.results.len(), 2);
    assert!(res.results.iter().all(|r| r.id != "doc-memo"));
    assert!(res.results.iter().any(|r| r.id == "doc-route"));
    assert!(res.results.iter().any(|r| r.id == "doc-route-alt"));
    assert!(res.results.iter().all(|r| !r.rationale.is_empty()));
}

#[tokio::test]
async fn repeated_query_is_deterministic() {
    let (pipeline, _dir) = seeded_pipeline(
        &[
            ("doc-route", "org-1", ROUTE_DOC),
            ("doc-route-alt", "org-1", ROUTE_DOC_ALT),
            ("doc-memo", "org-1", MEMO_DOC),
        ],
        MemoryRateStore::new(),
    )
    .await;

    let query = "20ft rate Shanghai to Rotterdam";
    let first = pipeline
        .search("org-1", query, &SearchFilters::default(), 2)
        .await
        .unwrap();
    let second = pipeline
        .search("org-1", query, &SearchFilters::default(), 2)
        .await
        .unwrap();

    assert_eq!(first.total_found, second.total_found);
    assert_eq!(first.results.len(), second.results.len());
    for (a, b) in first.results.iter().zip(second.results.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.rank, b.rank);
        assert_eq!(a.similarity, b.similarity);
    }
}

#[tokio::test]
async fn offline_rerank_returns_k_similarity_ordered_results() {
    let (pipeline, _dir) = seeded_pipeline(
        &[
            ("doc-1", "org-1", ROUTE_DOC),
            ("doc-2", "org-1", ROUTE_DOC_ALT),
            ("doc-3", "org-1", "20ft rate Mundra to Felixstowe USD 1700"),
            ("doc-4", "org-1", "40ft rate Shanghai to Hamburg USD 1900"),
        ],
        MemoryRateStore::new(),
    )
    .await;

    let res = pipeline
        .search("org-1", "container rate Shanghai", &SearchFilters::default(), 3)
        .await
        .unwrap();

    assert_eq!(res.results.len(), 3);
    assert_eq!(res.total_returned, 3);
    assert!(res.total_found >= 3);
    for pair in res.results.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
    for (i, r) in res.results.iter().enumerate() {
        assert_eq!(r.rank, i + 1);
        assert_eq!(r.rationale, FALLBACK_RATIONALE);
    }
    assert_eq!(res.answer, MANUAL_REVIEW_ANSWER);
}

#[tokio::test]
async fn attribute_filters_narrow_results() {
    let (pipeline, _dir) = seeded_pipeline(
        &[
            ("doc-20", "org-1", ROUTE_DOC),
            ("doc-40", "org-1", ROUTE_DOC_ALT),
        ],
        MemoryRateStore::new(),
    )
    .await;

    let filters = SearchFilters {
        container_type: Some("40hc".into()),
        ..Default::default()
    };
    let res = pipeline
        .search("org-1", "rate Shanghai Rotterdam", &filters, 5)
        .await
        .unwrap();

    assert!(res.results.iter().all(|r| r.id == "doc-40"));
}

#[tokio::test]
async fn weak_retrieval_without_precise_records_skips_draft() {
    let (pipeline, _dir) = seeded_pipeline(
        &[("doc-route", "org-1", ROUTE_DOC)],
        MemoryRateStore::new(),
    )
    .await;

    // One shared token ("rate") gives weak similarity; no rate records.
    let outcome = pipeline
        .draft_response("org-1", "rate question about something unrelated entirely", &[])
        .await
        .unwrap();

    assert!(outcome.skipped);
    assert!(outcome.draft.is_none());
    assert_eq!(outcome.precise_match_count, 0);
    let reason = outcome.skip_reason.unwrap();
    assert!(reason.contains("not enough information"));
}

#[tokio::test]
async fn precise_records_enable_draft_with_grounded_figures() {
    let rates = MemoryRateStore::new();
    rates.insert(PreciseRate {
        document_id: "doc-route".into(),
        origin_port: "Shanghai".into(),
        destination_port: "Rotterdam".into(),
        container_type: "20ft".into(),
        base_rate: 1500.0,
        currency: "USD".into(),
        weight_limit_kg: Some(28_000.0),
        transit_days: Some(32),
        valid_until: None,
    });

    let (pipeline, _dir) = seeded_pipeline(&[("doc-route", "org-1", ROUTE_DOC)], rates).await;

    let outcome = pipeline
        .draft_response("org-1", "20ft rate from Shanghai to Rotterdam", &[])
        .await
        .unwrap();

    assert!(!outcome.skipped);
    assert_eq!(outcome.precise_match_count, 1);
    let draft = outcome.draft.unwrap();
    assert!(draft.body.contains("USD 1500"));
    assert!(draft.subject.starts_with("Re: "));
    assert!(outcome.confidence_score <= 0.95);
    assert!(outcome.answer_quality_score > 0.0);
}

#[tokio::test]
async fn weak_retrieval_with_precise_record_drafts_with_disclaimer() {
    // A tangentially related document keeps base confidence low, while one
    // exact rate record holds the hard-reject gate open. Dimension 512
    // keeps collision noise from lifting the weak similarity.
    let dir = tempfile::tempdir().unwrap();
    let store =
        Arc::new(VectorStore::open(dir.path(), Arc::new(HashEmbedder::new(512))).unwrap());
    let cfg = PipelineConfig::default();
    store.create_collection(&cfg.collection).await.unwrap();
    store
        .upsert(
            &cfg.collection,
            vec![
                "ocean freight tariff schedule quarterly revision effective canal surcharges \
                 applied"
                    .to_string(),
            ],
            vec![meta("org-1")],
            vec!["doc-tariff".to_string()],
        )
        .await
        .unwrap();

    let rates = MemoryRateStore::new();
    rates.insert(PreciseRate {
        document_id: "doc-tariff".into(),
        origin_port: "Shanghai".into(),
        destination_port: "Rotterdam".into(),
        container_type: "20ft".into(),
        base_rate: 1800.0,
        currency: "USD".into(),
        weight_limit_kg: Some(28_000.0),
        transit_days: Some(32),
        valid_until: None,
    });
    let pipeline = RetrievalPipeline::new(store, offline_svc(), Arc::new(rates), cfg);

    let outcome = pipeline
        .draft_response(
            "org-1",
            "20ft freight quote from Shanghai to Rotterdam for peak season shipment window",
            &[],
        )
        .await
        .unwrap();

    assert!(!outcome.skipped);
    assert_eq!(outcome.precise_match_count, 1);
    assert!(outcome.confidence_score < 0.40);
    let draft = outcome.draft.unwrap();
    assert!(draft.confidence_note.contains("Low retrieval confidence"));
    // The disclaimer is appended, never the whole note.
    assert!(!draft.confidence_note.starts_with("Low retrieval confidence"));
}

#[tokio::test]
async fn validation_rejects_bad_input() {
    let (pipeline, _dir) = seeded_pipeline(&[("d", "org-1", ROUTE_DOC)], MemoryRateStore::new()).await;

    for (tenant, query) in [("", "q"), ("org-1", "  ")] {
        let err = pipeline
            .search(tenant, query, &SearchFilters::default(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::Validation(_)));
    }
    let err = pipeline
        .search("org-1", "q", &SearchFilters::default(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::Validation(_)));
}

#[tokio::test]
async fn context_hints_bias_recall() {
    let (pipeline, _dir) = seeded_pipeline(
        &[
            ("doc-route", "org-1", ROUTE_DOC),
            ("doc-alt", "org-1", ROUTE_DOC_ALT),
        ],
        MemoryRateStore::new(),
    )
    .await;

    let outcome = pipeline
        .draft_response(
            "org-1",
            "rate from Shanghai to Rotterdam",
            &["20ft container".to_string()],
        )
        .await
        .unwrap();

    // Both docs survive filtering; the hint only biases recall, never
    // errors the pipeline.
    assert!(outcome.skipped || outcome.draft.is_some());
}
