use std::fs;
use std::path::Path;

use helpers::*;
use localrag_core::chunker::{document_fingerprint, Chunker};
use localrag_core::error::Error;
use localrag_core::loader::{base_metadata, load_document};
use localrag_core::traits::DocumentParser;
use localrag_core::types::{Chunk, Meta, MetaValue, SearchHit};
use tempfile::TempDir;

mod helpers {
    use super::*;

    pub fn meta(pairs: &[(&str, &str)]) -> Meta {
        pairs.iter().map(|(k, v)| (k.to_string(), MetaValue::from(*v))).collect()
    }

    pub fn fresh_stream(chunks: &[Chunk]) -> String {
        chunks.iter().map(|c| c.fresh_text()).collect::<Vec<_>>().join(" ")
    }
}

const TEXT: &str = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota. Kappa lambda mu. Nu xi omicron.";

#[test]
fn empty_text_yields_no_chunks() {
    let chunker = Chunker::default();
    assert!(chunker.chunk("", &Meta::new()).is_empty());
    assert!(chunker.chunk("   \n\t ", &Meta::new()).is_empty());
}

#[test]
fn single_short_sentence_is_one_chunk() {
    let chunker = Chunker::default();
    let chunks = chunker.chunk("Short text.", &Meta::new());
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "Short text.");
    assert_eq!(chunks[0].chunk_index, 0);
    assert_eq!(chunks[0].total_chunks, 1);
    assert_eq!(chunks[0].overlap_len, 0);
}

#[test]
fn two_sentences_under_limit_stay_together() {
    let chunker = Chunker::new(100, 50).expect("chunker");
    let chunks = chunker.chunk("Rules overview. Players take turns.", &Meta::new());
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "Rules overview. Players take turns.");
    assert_eq!(chunks[0].total_chunks, 1);
}

#[test]
fn indices_are_contiguous_and_stream_reconstructs() {
    for overlap in [0usize, 20, 50] {
        let chunker = Chunker::new(40, overlap).expect("chunker");
        let chunks = chunker.chunk(TEXT, &Meta::new());
        assert!(chunks.len() > 1, "text should need several chunks");
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.total_chunks, chunks.len());
            assert!(c.chunk_index < c.total_chunks);
            assert!(!c.text.trim().is_empty());
        }
        assert_eq!(fresh_stream(&chunks), TEXT, "overlap={overlap}");
    }
}

#[test]
fn chunks_respect_size_unless_single_sentence() {
    let chunker = Chunker::new(40, 20).expect("chunker");
    for c in chunker.chunk(TEXT, &Meta::new()) {
        assert!(c.text.chars().count() <= 40, "chunk too long: {:?}", c.text);
    }
}

#[test]
fn overlap_repeats_previous_tail() {
    let chunker = Chunker::new(40, 20).expect("chunker");
    let chunks = chunker.chunk(TEXT, &Meta::new());
    let carried: Vec<&Chunk> = chunks.iter().filter(|c| c.overlap_len > 0).collect();
    assert!(!carried.is_empty(), "some chunk should carry overlap");
    for c in carried {
        let prev = &chunks[c.chunk_index - 1];
        let prefix = c.text[..c.overlap_len].trim_end();
        assert!(prev.text.ends_with(prefix), "{:?} should end with {:?}", prev.text, prefix);
        assert!(prefix.chars().count() <= 20);
    }
}

#[test]
fn zero_overlap_never_repeats_text() {
    let chunker = Chunker::new(40, 0).expect("chunker");
    assert!(chunker.chunk(TEXT, &Meta::new()).iter().all(|c| c.overlap_len == 0));
}

#[test]
fn oversized_sentence_is_not_truncated() {
    let long = "This single sentence is much longer than the tiny chunk size allows.";
    let chunker = Chunker::new(10, 5).expect("chunker");
    let chunks = chunker.chunk(&format!("Hi. {long} Bye."), &Meta::new());
    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[1].text, long);
}

#[test]
fn chunk_ids_are_deterministic_and_share_fingerprint() {
    let chunker = Chunker::new(40, 0).expect("chunker");
    let a = chunker.chunk(TEXT, &Meta::new());
    let b = chunker.chunk(TEXT, &Meta::new());
    let fp = document_fingerprint(TEXT);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        assert_eq!(x.chunk_id, y.chunk_id);
        assert_eq!(x.chunk_id, format!("{fp}_{i}"));
    }
    assert!(fp.len() >= 32, "fingerprint is at least 128 bits of hex");
}

#[test]
fn zero_chunk_size_is_rejected() {
    assert!(matches!(Chunker::new(0, 0), Err(Error::InvalidArgument(_))));
}

#[test]
fn metadata_is_copied_and_reserved_keys_dropped() {
    let chunker = Chunker::default();
    let base = meta(&[("source", "/tmp/a.txt"), ("text", "spoofed")]);
    let chunks = chunker.chunk("One. Two.", &base);
    assert_eq!(chunks[0].metadata.get("source").and_then(MetaValue::as_str), Some("/tmp/a.txt"));
    assert!(!chunks[0].metadata.contains_key("text"));
    assert_eq!(chunks[0].text, "One. Two.");
}

#[test]
fn hit_field_names_are_reserved_too() {
    let base = meta(&[("id", "x"), ("distance", "near"), ("game", "uno")]);
    let chunk = Chunker::default().chunk("One.", &base).remove(0);
    assert!(!chunk.metadata.contains_key("id"));
    assert!(!chunk.metadata.contains_key("distance"));
    assert!(chunk.validate().is_ok());

    let hit = SearchHit { id: 7, payload: chunk, distance: 0.25 };
    let line = serde_json::to_string(&hit).expect("json");
    assert_eq!(line.matches("\"id\":").count(), 1);
    let value: serde_json::Value = serde_json::from_str(&line).expect("parse");
    assert_eq!(value["id"], 7);
    assert_eq!(value["game"], "uno");
}

#[test]
fn validate_flags_payloads_that_would_not_read_back() {
    let mut chunk = Chunker::default().chunk("One.", &Meta::new()).remove(0);
    chunk.metadata.insert("ratio".into(), MetaValue::from(f64::NAN));
    assert!(matches!(chunk.validate(), Err(Error::InvalidArgument(_))));

    chunk.metadata.insert("ratio".into(), MetaValue::from(0.5));
    chunk.metadata.insert("chunk_id".into(), MetaValue::from("spoof"));
    assert!(matches!(chunk.validate(), Err(Error::InvalidArgument(_))));

    chunk.metadata.remove("chunk_id");
    let json = serde_json::to_string(&chunk).expect("json");
    assert_eq!(serde_json::from_str::<Chunk>(&json).expect("back"), chunk);
}

#[test]
fn chunk_serializes_as_flat_record() {
    let chunker = Chunker::default();
    let chunks = chunker.chunk("One.", &meta(&[("filename", "a.txt")]));
    let value = serde_json::to_value(&chunks[0]).expect("json");
    assert_eq!(value["filename"], "a.txt");
    assert_eq!(value["chunk_index"], 0);
    assert_eq!(value["text"], "One.");
    let back: Chunk = serde_json::from_value(value).expect("back");
    assert_eq!(back, chunks[0]);
}

struct UpperParser;

impl DocumentParser for UpperParser {
    fn parse(&self, path: &Path) -> localrag_core::Result<String> {
        let raw = fs::read(path).map_err(|e| Error::Parse(e.to_string()))?;
        Ok(String::from_utf8_lossy(&raw).to_uppercase())
    }
}

#[test]
fn load_plain_text_file_with_metadata() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("Notes.MD");
    fs::write(&path, "Some notes.").expect("write");

    let doc = load_document(&path, &meta(&[("tag", "x")]), None).expect("load");
    assert_eq!(doc.text, "Some notes.");
    assert_eq!(doc.metadata.get("file_type").and_then(MetaValue::as_str), Some("md"));
    assert_eq!(doc.metadata.get("filename").and_then(MetaValue::as_str), Some("Notes.MD"));
    assert_eq!(doc.metadata.get("tag").and_then(MetaValue::as_str), Some("x"));
}

#[test]
fn caller_metadata_overrides_file_metadata() {
    let m = base_metadata(Path::new("/data/a.txt"), &meta(&[("filename", "renamed.txt")]));
    assert_eq!(m.get("filename").and_then(MetaValue::as_str), Some("renamed.txt"));
    assert_eq!(m.get("source").and_then(MetaValue::as_str), Some("/data/a.txt"));
}

#[test]
fn invalid_utf8_is_a_parse_error() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("bad.txt");
    fs::write(&path, [0xffu8, 0xfe, 0x00]).expect("write");
    assert!(matches!(load_document(&path, &Meta::new(), None), Err(Error::Parse(_))));
}

#[test]
fn missing_file_is_a_parse_error() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("absent.txt");
    assert!(matches!(load_document(&path, &Meta::new(), None), Err(Error::Parse(_))));
}

#[test]
fn other_types_need_a_parser() {
    let tmp = TempDir::new().expect("tmp");
    let path = tmp.path().join("rules.pdf");
    fs::write(&path, "pdf body").expect("write");

    assert!(matches!(load_document(&path, &Meta::new(), None), Err(Error::Parse(_))));
    let doc = load_document(&path, &Meta::new(), Some(&UpperParser)).expect("parsed");
    assert_eq!(doc.text, "PDF BODY");
    assert_eq!(doc.metadata.get("file_type").and_then(MetaValue::as_str), Some("pdf"));
}

#[test]
fn joining_spaces_count_toward_chunk_size() {
    // Two 15-character sentences: joined they are 31 characters.
    let text = "Turns are fast. Play goes left.";
    assert_eq!("Turns are fast.".len(), 15);
    assert_eq!("Play goes left.".len(), 15);

    let tight = Chunker::new(30, 0).expect("chunker").chunk(text, &Meta::new());
    assert_eq!(tight.len(), 2);

    let fits = Chunker::new(31, 0).expect("chunker").chunk(text, &Meta::new());
    assert_eq!(fits.len(), 1);
    assert_eq!(fits[0].text.chars().count(), 31);
}
