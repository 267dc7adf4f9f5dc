use tempfile::TempDir;

use mosaic_core::corpus::{InMemoryCorpus, TextDirCorpus};
use mosaic_core::error::Error;
use mosaic_core::traits::LexicalEngine;
use mosaic_core::types::{Backend, Document};
use mosaic_text::{LexicalIndexer, TantivyLexicalEngine};

fn pets_corpus() -> InMemoryCorpus {
    InMemoryCorpus::from_pairs("pets", [("d1", "cats are mammals"), ("d2", "dogs are mammals"), ("d3", "rockets reach orbit")])
}

fn build(corpus: &InMemoryCorpus) -> (TempDir, TantivyLexicalEngine) {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("tantivy");
    let count = LexicalIndexer::create(&dir).expect("indexer").index_corpus(corpus).expect("index");
    assert_eq!(count, corpus.len());
    let engine = TantivyLexicalEngine::open(&dir).expect("engine");
    (tmp, engine)
}

#[test]
fn stemmed_overlap_surfaces_both_mammals() {
    let (_tmp, engine) = build(&pets_corpus());
    let hits = engine.search("mammal pets", 2).expect("search");
    assert_eq!(hits.len(), 2);
    let mut ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["d1", "d2"]);
    assert!(hits.iter().all(|h| h.source == Backend::Lexical));
    assert!(hits[0].score >= hits[1].score);
}

#[test]
fn scores_are_non_increasing_and_bounded_by_k() {
    let corpus = InMemoryCorpus::new(
        "orbit",
        vec![
            Document::new("a", "orbit orbit orbit insertion"),
            Document::new("b", "rockets reach orbit"),
            Document::new("c", "a long text that only mentions orbit once among many other unrelated words here"),
            Document::new("d", "nothing relevant"),
        ],
    );
    let (_tmp, engine) = build(&corpus);
    let hits = engine.search("orbit", 10).expect("search");
    assert_eq!(hits.len(), 3, "only matching documents are returned");
    assert_eq!(hits[0].id, "a");
    for pair in hits.windows(2) { assert!(pair[0].score >= pair[1].score); }
    assert_eq!(engine.search("orbit", 1).unwrap().len(), 1);
    assert!(engine.search("orbit", 0).unwrap().is_empty());
}

#[test]
fn query_syntax_is_parsed_leniently() {
    let (_tmp, engine) = build(&pets_corpus());
    let hits = engine.search("cats AND (\"unbalanced", 3).expect("lenient parse never fails");
    assert!(hits.len() <= 3);
}

#[test]
fn document_text_joins_title_and_body() {
    let corpus = InMemoryCorpus::new("titled", vec![Document::new("Cat", "Cats are mammals.").with_title("Cat"), Document::new("x", "plain")]);
    let (_tmp, engine) = build(&corpus);
    assert_eq!(engine.document_text("Cat").unwrap().as_deref(), Some("Cat\nCats are mammals."));
    assert_eq!(engine.document_text("x").unwrap().as_deref(), Some("plain"));
    assert_eq!(engine.document_text("missing").unwrap(), None);
    assert_eq!(engine.num_docs(), 2);
}

#[test]
fn titles_are_searchable() {
    let corpus = InMemoryCorpus::new("titled", vec![Document::new("t1", "body words").with_title("Telescope"), Document::new("t2", "other body")]);
    let (_tmp, engine) = build(&corpus);
    let hits = engine.search("telescopes", 5).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "t1");
}

#[test]
fn text_directory_full_flow() {
    let data = TempDir::new().unwrap();
    std::fs::create_dir_all(data.path().join("fire")).unwrap();
    std::fs::write(data.path().join("fire/starting.txt"), "firecraft: starting a fire with flint").unwrap();
    std::fs::write(data.path().join("network.txt"), "computer networking basics").unwrap();
    let corpus = TextDirCorpus::open(data.path()).unwrap();

    let out = TempDir::new().unwrap();
    let count = LexicalIndexer::create(out.path()).unwrap().index_corpus(&corpus).unwrap();
    assert_eq!(count, 2);
    let engine = TantivyLexicalEngine::open(out.path()).unwrap();
    assert_eq!(engine.search("fire", 5).unwrap()[0].id, "fire/starting");
    assert_eq!(engine.search("networks", 5).unwrap()[0].id, "network");
}

#[test]
fn rebuilding_replaces_previous_index() {
    let tmp = TempDir::new().unwrap();
    LexicalIndexer::create(tmp.path()).unwrap().index_corpus(&pets_corpus()).unwrap();
    let second = InMemoryCorpus::from_pairs("other", [("z", "zebras")]);
    LexicalIndexer::create(tmp.path()).unwrap().index_corpus(&second).unwrap();
    let engine = TantivyLexicalEngine::open(tmp.path()).unwrap();
    assert_eq!(engine.num_docs(), 1);
    assert!(engine.search("mammals", 5).unwrap().is_empty());
}

#[test]
fn missing_index_is_an_external_backend_error() {
    let tmp = TempDir::new().unwrap();
    match TantivyLexicalEngine::open(tmp.path().join("nowhere")) {
        Err(Error::ExternalBackend(msg)) => assert!(msg.contains("mosaic index"), "actionable message: {msg}"),
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("opening a missing index must fail"),
    }
}

#[test]
fn duplicate_ids_are_rejected() {
    let tmp = TempDir::new().unwrap();
    let corpus = InMemoryCorpus::from_pairs("dups", [("a", "orbit orbit"), ("a", "orbit"), ("b", "orbit rocket launch pad")]);
    match LexicalIndexer::create(tmp.path()).unwrap().index_corpus(&corpus) {
        Err(Error::Corpus(msg)) => assert!(msg.contains("duplicate document id 'a'"), "message: {msg}"),
        other => panic!("unexpected outcome {other:?}"),
    }
    let engine = TantivyLexicalEngine::open(tmp.path()).unwrap();
    assert_eq!(engine.num_docs(), 0, "nothing is committed");
}
