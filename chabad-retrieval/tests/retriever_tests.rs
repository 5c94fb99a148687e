//! End-to-end retrieval through the facade.

mod common;

use std::sync::Arc;
use std::time::Duration;

use chabad_retrieval::keyword::matches_term;
use chabad_retrieval::{
    Corpus, DocumentSource, EmbeddingIndex, HybridRanker, IndexConfig, RetrievalConfig,
    RetrievalError, Retriever, SearchResult, VecSource, extract_terms, search_concept,
};
use common::{MockEmbeddingProvider, chunk, sample_chunks};
use proptest::prelude::*;

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn retriever_is_shareable_across_tasks() {
    assert_send_sync::<Retriever>();
    assert_send_sync::<EmbeddingIndex>();
    assert_send_sync::<Corpus>();
}

async fn hybrid_fixture(
    dir: &tempfile::TempDir,
) -> (Arc<MockEmbeddingProvider>, Arc<Corpus>, Arc<EmbeddingIndex>) {
    let corpus = Arc::new(
        Corpus::from_chunks(vec![
            chunk("sichos/a.json", "x", "גודל מעלת אהבת ישראל"),
            chunk("sichos/a.json", "y", "love of fellow"),
            chunk("sichos/a.json", "z", "unrelated text"),
        ])
        .unwrap(),
    );
    let provider = Arc::new(
        MockEmbeddingProvider::new(3)
            .with_vector("גודל מעלת אהבת ישראל", vec![1.0, 0.0, 0.0])
            .with_vector("love of fellow", vec![0.0, 1.0, 0.0])
            .with_vector("unrelated text", vec![0.0, 0.0, 1.0])
            .with_vector("אהבת ישראל", vec![1.0, 1.0, 0.0]),
    );
    let config =
        IndexConfig::new(dir.path().join("embeddings.json")).with_batch_delay(Duration::ZERO);
    let mut index = EmbeddingIndex::new(provider.clone(), config).unwrap();
    index.build(&corpus).await.unwrap();
    (provider, corpus, Arc::new(index))
}

#[test]
fn keyword_search_finds_exact_text() {
    let corpus = Corpus::from_chunks(vec![chunk("sichos/a.json", "1", "שבת שלום")]).unwrap();
    let matches = search_concept(&corpus, "שבת", 10);

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].chunk.chunk_id, "1");
    assert!(matches[0].term_count >= 1);
}

#[tokio::test]
async fn keyword_only_without_index() {
    let corpus = Arc::new(Corpus::from_chunks(sample_chunks()).unwrap());
    let retriever = Retriever::builder().corpus(corpus).build().unwrap();

    assert!(!retriever.is_hybrid());
    let results = retriever.retrieve("שבת", 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.text, "שבת שלום ומבורך");
    assert!((results[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn overlapping_hit_is_boosted_above_equal_semantic_score() {
    let dir = tempfile::tempdir().unwrap();
    let (_, corpus, index) = hybrid_fixture(&dir).await;
    let retriever = Retriever::builder().corpus(corpus).index(index).build().unwrap();

    let results = retriever.retrieve("אהבת ישראל", 10).await.unwrap();
    let ids: Vec<_> = results.iter().map(|r| r.chunk.chunk_id.as_str()).collect();

    assert_eq!(ids, vec!["x", "y"]);
    let semantic = std::f32::consts::FRAC_1_SQRT_2;
    assert!((results[0].score - (semantic + 0.2)).abs() < 1e-4);
    assert!((results[1].score - semantic).abs() < 1e-4);
    assert!(results[0].score > results[1].score);
}

#[test]
fn relaxed_threshold_never_returns_fewer() {
    let ranker = HybridRanker::default();
    let corpus = Corpus::from_chunks(sample_chunks()).unwrap();
    let scores = [0.8, 0.45, 0.35, 0.31, 0.1];
    let semantic: Vec<SearchResult> = corpus
        .iter()
        .zip(scores)
        .map(|(chunk, score)| SearchResult::new(chunk.clone(), score))
        .collect();

    let primary_pass = scores.iter().filter(|s| **s >= 0.5).count();
    let ranked = ranker.rank(semantic, Vec::new(), 10);

    assert!(primary_pass < 3);
    assert_eq!(ranked.len(), 4);
    assert!(ranked.len() >= primary_pass);
    assert!(ranked.iter().all(|r| r.score >= 0.3));
}

#[tokio::test]
async fn provider_failure_surfaces_and_keeps_index() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, corpus, index) = hybrid_fixture(&dir).await;
    let retriever =
        Retriever::builder().corpus(corpus).index(index.clone()).build().unwrap();

    provider.fail();
    let err = retriever.retrieve("אהבת ישראל", 10).await.unwrap_err();

    assert!(matches!(err, RetrievalError::EmbeddingProviderError { .. }));
    assert!(retriever.is_hybrid());
    assert_eq!(index.len(), 3);
}

#[tokio::test]
async fn zero_max_results_skips_all_work() {
    let dir = tempfile::tempdir().unwrap();
    let (provider, corpus, index) = hybrid_fixture(&dir).await;
    let retriever = Retriever::builder().corpus(corpus).index(index).build().unwrap();

    assert!(retriever.retrieve("אהבת ישראל", 0).await.unwrap().is_empty());
    assert_eq!(provider.query_calls(), 0);
}

#[tokio::test]
async fn default_result_count_comes_from_config() {
    let corpus = Arc::new(
        Corpus::from_chunks(
            (0..5).map(|i| chunk("sichos/b.json", &i.to_string(), "ענין השבת")).collect(),
        )
        .unwrap(),
    );
    let config = RetrievalConfig::builder().max_results(2).build().unwrap();
    let retriever = Retriever::builder().corpus(corpus).config(config).build().unwrap();

    assert_eq!(retriever.retrieve_default("שבת").await.unwrap().len(), 2);
}

#[tokio::test]
async fn index_from_other_corpus_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, index) = hybrid_fixture(&dir).await;
    let other = Arc::new(Corpus::from_chunks(sample_chunks()).unwrap());

    let err = Retriever::builder().corpus(other).index(index).build().err().unwrap();
    assert!(matches!(err, RetrievalError::ConfigError(_)));
}

#[test]
fn builder_requires_corpus() {
    let err = Retriever::builder().build().err().unwrap();
    assert!(matches!(err, RetrievalError::ConfigError(_)));
}

#[test]
fn duplicate_chunk_identity_fails_load() {
    let sources: Vec<Box<dyn DocumentSource>> = vec![
        Box::new(VecSource::new("first", vec![chunk("sichos/a.json", "1", "שבת")])),
        Box::new(VecSource::new("second", vec![chunk("sichos/a.json", "1", "חול")])),
    ];

    let err = Corpus::load(&sources).unwrap_err();
    assert!(matches!(
        err,
        RetrievalError::DuplicateChunk { ref source_file, ref chunk_id }
            if source_file == "sichos/a.json" && chunk_id == "1"
    ));
}

#[tokio::test]
async fn follow_up_without_results_is_not_a_miss() {
    let corpus = Arc::new(Corpus::from_chunks(sample_chunks()).unwrap());
    let retriever = Retriever::builder().corpus(corpus).build().unwrap();

    let follow_up =
        retriever.retrieve_in_conversation("tell me more", 5, Some("earlier answer")).await.unwrap();
    assert!(follow_up.follow_up);
    assert!(!follow_up.is_no_results());

    let fresh = retriever.retrieve_in_conversation("tell me more", 5, None).await.unwrap();
    assert!(!fresh.follow_up);
    assert_eq!(fresh.is_no_results(), fresh.results.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queries_see_identical_results() {
    let dir = tempfile::tempdir().unwrap();
    let (_, corpus, index) = hybrid_fixture(&dir).await;
    let retriever = Arc::new(Retriever::builder().corpus(corpus).index(index).build().unwrap());

    let expected = retriever.retrieve("אהבת ישראל", 10).await.unwrap();
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let retriever = retriever.clone();
            tokio::spawn(async move { retriever.retrieve("אהבת ישראל", 10).await.unwrap() })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap(), expected);
    }
}

const WORDS: &[&str] = &[
    "שבת", "שלום", "אהבת", "ישראל", "התשובה", "Tanya", "souls", "בטחון", "שמחה", "תורה", "גאולה",
    "love", "faith", "על", "the",
];

/// Keyword results never exceed the requested count, and each one contains
/// at least one term extracted from the query.
mod prop_keyword_results {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn bounded_and_each_matches_a_term(
            picks in proptest::collection::vec(0..WORDS.len(), 0..5),
            max_results in 0usize..8,
        ) {
            let query = picks.iter().map(|&i| WORDS[i]).collect::<Vec<_>>().join(" ");
            let corpus = Corpus::from_chunks(sample_chunks()).unwrap();
            let terms = extract_terms(&query);

            let matches = search_concept(&corpus, &query, max_results);

            prop_assert!(matches.len() <= max_results);
            for m in &matches {
                let folded = m.chunk.text.to_lowercase();
                prop_assert!(terms.iter().any(|t| matches_term(&m.chunk.text, &folded, t)));
                prop_assert!(m.term_count >= 1);
            }
        }
    }
}
