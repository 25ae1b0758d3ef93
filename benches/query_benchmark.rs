use std::sync::Arc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use rand::Rng;
use rand::seq::SliceRandom;

use quarry::core::config::IndexConfig;
use quarry::core::types::Doc;
use quarry::db::{Db, OpenMode};
use quarry::pipeline::stopwords::StopList;
use quarry::pipeline::synonyms::SynGroups;
use quarry::query::searchdata::{ClauseKind, CompositeKind, SearchClause, SearchData};
use quarry::schema::fields::FieldsConfig;
use quarry::store::query::SortOrder;

const VOCAB: &[&str] = &[
    "search", "index", "document", "posting", "query", "phrase", "snippet",
    "term", "field", "range", "filter", "weight", "store", "commit", "purge",
];

fn build_db(dir: &std::path::Path, ndocs: usize) -> Db {
    let config = IndexConfig { no_aspell: true, ..IndexConfig::default() };
    let db = Db::open(
        dir,
        OpenMode::Write,
        config,
        FieldsConfig::default(),
        Arc::new(StopList::english()),
        Arc::new(SynGroups::new()),
    )
    .unwrap();
    let mut rng = rand::thread_rng();
    for i in 0..ndocs {
        let words: Vec<&str> = (0..80)
            .map(|_| *VOCAB.choose(&mut rng).unwrap())
            .collect();
        let mut doc = Doc::new(format!("file:///bench/{}.txt", i));
        doc.sig = format!("sig{}", rng.r#gen::<u32>());
        doc.text = words.join(" ");
        db.add_or_update(&format!("bench{}", i), None, &doc).unwrap();
    }
    db.flush().unwrap();
    db
}

fn bench_query(c: &mut Criterion) {
    let tmp = tempfile::tempdir().unwrap();
    let db = build_db(tmp.path(), 500);

    let mut group = c.benchmark_group("query");
    group.bench_function("single_term", |b| {
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, "posting", ""));
        b.iter(|| db.search(black_box(&sd), SortOrder::Relevance, Some(10)).unwrap().hits.len())
    });
    group.bench_function("and_terms", |b| {
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::simple(ClauseKind::And, "posting query filter", ""));
        b.iter(|| db.search(black_box(&sd), SortOrder::Relevance, Some(10)).unwrap().hits.len())
    });
    group.bench_function("phrase", |b| {
        let sd = SearchData::new(CompositeKind::And)
            .with_clause(SearchClause::phrase("posting query", 2));
        b.iter(|| db.search(black_box(&sd), SortOrder::Relevance, Some(10)).unwrap().hits.len())
    });
    group.finish();
}

criterion_group!(benches, bench_query);
criterion_main!(benches);
