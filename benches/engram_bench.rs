// ── Engram: Benchmarks ─────────────────────────────────────────────────────
//
// Hot paths of the retrieval and storage pipelines.
//
// Run with: `cargo bench --bench engram_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use tokio::runtime::Runtime;

use engram_memory::engine::concepts::extract_concepts;
use engram_memory::engine::retrieval::hybrid;
use engram_memory::engine::retrieval::{keyword_score, query_terms};
use engram_memory::engine::store::vector::cosine_similarity;
use engram_memory::{
    EmbeddingClient, GraphStore, HashEmbedder, MemoryConfig, MemoryRecord, MemorySubsystem,
    MemoryType, NewMemory, RetrievalRequest, RetrievalStrategy, SqliteGraphStore,
};

const WORDS: [&str; 16] = [
    "deploy", "budget", "meeting", "roadmap", "coffee", "release", "invoice", "garden",
    "server", "travel", "review", "backup", "launch", "design", "ticket", "report",
];

/// Deterministic sentence from an index.
fn sentence(i: usize) -> String {
    (0..8).map(|k| WORDS[(i * 7 + k * 3) % WORDS.len()]).collect::<Vec<_>>().join(" ")
}

fn record(i: usize, embedder: &HashEmbedder) -> MemoryRecord {
    let content = sentence(i);
    let now = chrono::Utc::now();
    MemoryRecord {
        memory_id: format!("m{i:05}"),
        embedding: Some(embedder.embed_sync(&content)),
        content,
        memory_type: MemoryType::Interaction,
        owner_id: "bench".into(),
        agent_name: String::new(),
        context_level: 0.5,
        context_tag: "neutral".into(),
        importance_score: 0.5,
        significance_score: 0.5,
        embedding_model: Some("hash-256".into()),
        created_at: now,
        last_importance_update: now,
        access_frequency: 0,
        last_accessed_at: None,
        accesses_since_sweep: 0,
        last_decay_at: None,
        state: Default::default(),
        archived_at: None,
        version: 0,
        metadata: Default::default(),
    }
}

fn bench_keyword(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyword");
    let terms = query_terms("the budget review for the release meeting");
    for n in [100usize, 1_000] {
        let docs: Vec<String> = (0..n).map(sentence).collect();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("score", n), &docs, |b, docs| {
            b.iter(|| docs.iter().map(|d| keyword_score(black_box(d), &terms)).sum::<f64>());
        });
    }
    group.bench_function("query_terms", |b| {
        b.iter(|| query_terms(black_box("What did we decide about the release budget at the roadmap meeting?")));
    });
    group.finish();
}

fn bench_vectors(c: &mut Criterion) {
    let embedder = HashEmbedder::default();
    let mut group = c.benchmark_group("vectors");
    group.bench_function("hash_embed", |b| {
        b.iter(|| embedder.embed_sync(black_box("deploy the release after the budget review meeting")));
    });
    let a = embedder.embed_sync(&sentence(1));
    let other = embedder.embed_sync(&sentence(2));
    group.bench_function("cosine", |b| b.iter(|| cosine_similarity(black_box(&a), black_box(&other))));
    group.bench_function("extract_concepts", |b| {
        b.iter(|| extract_concepts(black_box("Shipping the Payments API to Berlin after the Q3 Budget Review")));
    });
    group.finish();
}

fn bench_hybrid_merge(c: &mut Criterion) {
    let embedder = HashEmbedder::default();
    let semantic: Vec<(MemoryRecord, f64)> =
        (0..50).map(|i| (record(i, &embedder), 1.0 - i as f64 / 100.0)).collect();
    let keyword: Vec<(MemoryRecord, f64)> =
        (25..75).map(|i| (record(i, &embedder), 0.5 + i as f64 / 200.0)).collect();
    c.bench_function("hybrid_merge_50x50", |b| {
        b.iter(|| hybrid::merge(black_box(semantic.clone()), black_box(keyword.clone()), 0.2));
    });
}

fn bench_retrieve(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store: Arc<dyn GraphStore> = Arc::new(SqliteGraphStore::open_in_memory().unwrap());
    let embedder = EmbeddingClient::new(
        Arc::new(HashEmbedder::default()),
        std::time::Duration::from_secs(2),
    );
    let subsystem = MemorySubsystem::new(MemoryConfig::offline(), store, embedder).unwrap();
    rt.block_on(async {
        for i in 0..500 {
            subsystem
                .store(NewMemory::new(sentence(i), MemoryType::Interaction, "bench"))
                .await
                .unwrap();
        }
    });

    let mut group = c.benchmark_group("retrieve_500");
    for strategy in [RetrievalStrategy::Keyword, RetrievalStrategy::Semantic, RetrievalStrategy::Hybrid] {
        group.bench_function(strategy.as_str(), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let request = RetrievalRequest::new("budget review release", "bench").strategy(strategy);
                    subsystem.retrieve(request).await.unwrap()
                })
            });
        });
    }
    group.finish();
    rt.block_on(subsystem.settle_access_updates());
}

criterion_group!(benches, bench_keyword, bench_vectors, bench_hybrid_merge, bench_retrieve);
criterion_main!(benches);
