use std::io::Cursor;

use crate::dataset::{DatasetId, PriorityTable};
use crate::errors::{AddrDictError, RecordError, RecordErrorKind, Result};
use crate::merge::MergeEngine;
use crate::record::{NormalizedRecord, RecordSource, Segment, TextRecordReader};
use crate::registry::Registry;

const LINES: &str = "\
# city
1;東京都,139.69,35.69
1;東京都,2;千代田区,139.75,35.69
1;東京都,2;千代田区,3;丸の内,!01,139.76,35.68,zip:1000005
1;東京都,2;千代田区,4;一丁目,139.76,35.68
2;千代田区
1;東京都,2;千代田区,3;大手町,,,
";

fn text_source() -> TextRecordReader<Cursor<&'static [u8]>> {
    TextRecordReader::new(Cursor::new(LINES.as_bytes()))
}

#[test]
fn test_pipelined_matches_sequential() {
    let priorities = PriorityTable::presets();

    let mut sequential = Registry::new();
    let seq_stats = MergeEngine::new(&mut sequential, &priorities)
        .ingest_source(&mut text_source(), DatasetId(1))
        .unwrap();

    let mut pipelined = Registry::new();
    let pipe_stats = MergeEngine::new(&mut pipelined, &priorities)
        .ingest_pipelined(&mut text_source(), DatasetId(1))
        .unwrap();

    assert_eq!(seq_stats, pipe_stats);
    assert_eq!(seq_stats.ingested, 4);
    assert_eq!(seq_stats.skipped, 2);
    assert_eq!(sequential.nodes(), pipelined.nodes());
    assert_eq!(sequential.len(), 4);
}

#[test]
fn test_rewind_and_reingest() {
    let priorities = PriorityTable::presets();
    let mut registry = Registry::new();
    let mut engine = MergeEngine::new(&mut registry, &priorities);
    let mut source = text_source();
    engine.ingest_source(&mut source, DatasetId(1)).unwrap();
    source.rewind().unwrap();
    let stats = engine.ingest_source(&mut source, DatasetId(1)).unwrap();
    assert_eq!(stats.created, 0);
    assert_eq!(engine.registry().len(), 4);
}

struct PanickingSource {
    remaining: usize,
}

impl RecordSource for PanickingSource {
    fn next_record(&mut self) -> Option<Result<NormalizedRecord>> {
        if self.remaining == 0 {
            panic!("decoder failed");
        }
        self.remaining -= 1;
        Some(Ok(NormalizedRecord::new(vec![Segment::new(1, "東京都")])))
    }

    fn rewind(&mut self) -> Result<()> {
        Ok(())
    }
}

#[test]
fn test_pipelined_decoder_panic() {
    let priorities = PriorityTable::presets();
    let mut registry = Registry::new();
    let mut engine = MergeEngine::new(&mut registry, &priorities);
    let result = engine.ingest_pipelined(&mut PanickingSource { remaining: 3 }, DatasetId(1));
    match result {
        Err(AddrDictError::ThreadPanic(msg)) => assert!(msg.contains("decoder failed")),
        other => panic!("unexpected: {:?}", other),
    }
}

struct FailingSource {
    items: Vec<Result<NormalizedRecord>>,
}

impl RecordSource for FailingSource {
    fn next_record(&mut self) -> Option<Result<NormalizedRecord>> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.items.remove(0))
        }
    }

    fn rewind(&mut self) -> Result<()> {
        Ok(())
    }
}

fn failing() -> FailingSource {
    FailingSource {
        items: vec![
            Ok(NormalizedRecord::new(vec![Segment::new(1, "東京都")])),
            Err(RecordError::new(RecordErrorKind::Syntax("bad".to_string())).into()),
            Err(std::io::Error::other("disk").into()),
            Ok(NormalizedRecord::new(vec![Segment::new(1, "大阪府")])),
        ],
    }
}

#[test]
fn test_fatal_source_error() {
    let priorities = PriorityTable::presets();

    let mut registry = Registry::new();
    let mut engine = MergeEngine::new(&mut registry, &priorities);
    assert!(matches!(
        engine.ingest_source(&mut failing(), DatasetId(1)),
        Err(AddrDictError::StdIo(_))
    ));
    assert_eq!(engine.stats().skipped, 1);
    assert_eq!(engine.registry().len(), 1);

    let mut registry = Registry::new();
    let mut engine = MergeEngine::new(&mut registry, &priorities);
    assert!(matches!(
        engine.ingest_pipelined(&mut failing(), DatasetId(1)),
        Err(AddrDictError::StdIo(_))
    ));
    assert_eq!(engine.registry().len(), 1);
}
