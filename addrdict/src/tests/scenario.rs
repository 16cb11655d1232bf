use crate::dataset::{DatasetId, PriorityTable};
use crate::errors::{AddrDictError, RecordErrorKind};
use crate::index::IndexBuilder;
use crate::merge::MergeEngine;
use crate::node::{NULL_ID, Point};
use crate::record::{NormalizedRecord, Segment};
use crate::registry::Registry;

const A: DatasetId = DatasetId(1);
const B: DatasetId = DatasetId(8);

fn marunouchi() -> NormalizedRecord {
    NormalizedRecord::new(vec![
        Segment::new(1, "東京都"),
        Segment::new(2, "千代田区"),
        Segment::new(3, "丸の内"),
    ])
}

fn with_leaf<F>(mut record: NormalizedRecord, f: F) -> NormalizedRecord
where
    F: FnOnce(Segment) -> Segment,
{
    let leaf = record.segments.pop().unwrap();
    record.segments.push(f(leaf));
    record
}

#[test]
fn test_marunouchi() {
    let priorities = PriorityTable::presets();
    let mut registry = Registry::new();
    let mut engine = MergeEngine::new(&mut registry, &priorities);

    engine
        .ingest(&with_leaf(marunouchi(), |s| s.with_point(139.76, 35.68)), 1, A)
        .unwrap();
    engine
        .ingest(&with_leaf(marunouchi(), |s| s.with_note("zip:1000005")), 5, B)
        .unwrap();

    let level3: Vec<_> = registry.nodes().iter().filter(|n| n.level == 3).collect();
    assert_eq!(level3.len(), 1);
    let node = level3[0];
    assert_eq!(node.name, "丸の内");
    assert_eq!(node.point, Some(Point::new(139.76, 35.68)));
    assert_eq!(node.dataset, A.get());
    assert_eq!(node.priority, 1);
    assert!(node.note.split('/').any(|n| n == "zip:1000005"));
}

#[test]
fn test_level_gap_is_skipped() {
    let priorities = PriorityTable::presets();
    let mut registry = Registry::new();
    let mut engine = MergeEngine::new(&mut registry, &priorities);
    engine
        .ingest(
            &NormalizedRecord::new(vec![Segment::new(1, "東京都"), Segment::new(2, "千代田区")]),
            1,
            A,
        )
        .unwrap();
    let before = engine.registry().nodes().to_vec();

    let gap = NormalizedRecord::new(vec![
        Segment::new(1, "東京都"),
        Segment::new(2, "千代田区").with_note("changed"),
        Segment::new(5, "1").with_point(139.0, 35.0),
    ]);
    match engine.ingest(&gap, 0, A) {
        Err(AddrDictError::Record(e)) => {
            assert_eq!(
                e.kind,
                RecordErrorKind::LevelGap {
                    parent_level: 2,
                    level: 5
                }
            )
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(engine.stats().skipped, 1);
    assert_eq!(engine.registry().nodes(), before.as_slice());
}

#[test]
fn test_idempotent_key_resolution() {
    let priorities = PriorityTable::presets();
    let record = with_leaf(marunouchi(), |s| {
        s.with_point(139.76, 35.68).with_note("zip:1000005")
    });

    let mut once = Registry::new();
    MergeEngine::new(&mut once, &priorities)
        .ingest(&record, 1, A)
        .unwrap();

    let mut twice = Registry::new();
    let mut engine = MergeEngine::new(&mut twice, &priorities);
    engine.ingest(&record, 1, A).unwrap();
    engine.ingest(&record, 1, A).unwrap();

    assert_eq!(once.nodes(), twice.nodes());
    assert_eq!(twice.children(2).count(), 1);
}

#[test]
fn test_variants_collapse() {
    let priorities = PriorityTable::presets();
    let mut registry = Registry::new();
    let mut engine = MergeEngine::new(&mut registry, &priorities);
    for name in ["丸の内一丁目", "丸ノ内1丁目", "丸の内１", "丸の内 1"] {
        let record = NormalizedRecord::new(vec![
            Segment::new(1, "東京都"),
            Segment::new(2, "千代田区"),
            Segment::new(3, "丸の内"),
            Segment::new(4, name),
        ]);
        engine.ingest(&record, 1, A).unwrap();
    }
    assert_eq!(registry.len(), 4);
    assert_eq!(registry.get(4).unwrap().name, "丸の内一丁目");
}

#[test]
fn test_priority_precedence_both_orders() {
    let priorities = PriorityTable::presets();
    let high = with_leaf(marunouchi(), |s| s.with_point(139.76, 35.68));
    let low = with_leaf(marunouchi(), |s| {
        Segment {
            name: "丸ノ内".to_string(),
            ..s
        }
        .with_point(139.70, 35.60)
    });

    let mut results = vec![];
    for order in [[(&high, 1, A), (&low, 5, B)], [(&low, 5, B), (&high, 1, A)]] {
        let mut registry = Registry::new();
        let mut engine = MergeEngine::new(&mut registry, &priorities);
        for (record, priority, dataset) in order {
            engine.ingest(record, priority, dataset).unwrap();
        }
        IndexBuilder::finalize(&mut registry).unwrap();

        let id = registry.find(2, 3, "丸の内").unwrap();
        let node = registry.get(id).unwrap().clone();
        assert_eq!(node.name, "丸の内");
        assert_eq!(node.point, Some(Point::new(139.76, 35.68)));
        assert_eq!(node.dataset, A.get());
        assert_eq!(node.priority, 1);
        results.push(node);
    }
    assert_eq!(results[0], results[1]);
}

#[test]
fn test_coordinate_backfill() {
    let priorities = PriorityTable::presets();
    let mut registry = Registry::new();
    let mut engine = MergeEngine::new(&mut registry, &priorities);

    engine.ingest(&marunouchi(), 1, A).unwrap();
    engine
        .ingest(&with_leaf(marunouchi(), |s| s.with_point(139.76, 35.68)), 5, B)
        .unwrap();

    let node = registry.get(3).unwrap();
    assert_eq!(node.point, Some(Point::new(139.76, 35.68)));
    assert_eq!(node.priority, 1);
    assert_eq!(node.dataset, A.get());
    assert_eq!(registry.point_priority(3), Some(5));
}

#[test]
fn test_backfill_order_independent() {
    // 座標のない優先度1、座標のある優先度3と優先度7
    let priorities = PriorityTable::presets();
    let top = with_leaf(marunouchi(), |s| s.with_note("zip:1000005"));
    let mid = with_leaf(marunouchi(), |s| s.with_point(3.0, 3.0).with_note("code:13101"));
    let low = with_leaf(marunouchi(), |s| {
        s.with_point(7.0, 7.0).with_note("zip:1000005/src:7")
    });
    let records = [(&top, 1, A), (&mid, 3, DatasetId(3)), (&low, 7, DatasetId(7))];

    let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
    let mut first = None;
    for order in orders {
        let mut registry = Registry::new();
        let mut engine = MergeEngine::new(&mut registry, &priorities);
        for i in order {
            let (record, priority, dataset) = records[i];
            engine.ingest(record, priority, dataset).unwrap();
        }
        let node = registry.get(3).unwrap();
        assert_eq!(node.point, Some(Point::new(3.0, 3.0)), "order {:?}", order);
        assert_eq!(node.priority, 1);
        assert_eq!(node.dataset, A.get());
        assert_eq!(node.note, "code:13101/src:7/zip:1000005", "order {:?}", order);

        let nodes = registry.nodes().to_vec();
        match &first {
            None => first = Some(nodes),
            Some(first) => assert_eq!(&nodes, first, "order {:?}", order),
        }
    }
}

#[test]
fn test_roots_share_null_parent() {
    let priorities = PriorityTable::presets();
    let mut registry = Registry::new();
    let mut engine = MergeEngine::new(&mut registry, &priorities);
    for pref in ["北海道", "青森県", "岩手県"] {
        engine
            .ingest(&NormalizedRecord::new(vec![Segment::new(1, pref)]), 1, A)
            .unwrap();
    }
    let roots: Vec<&str> = registry
        .children(NULL_ID)
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(roots, vec!["北海道", "青森県", "岩手県"]);
}
