//! マージエンジン
//!
//! 正規化済みレコードを一つずつ受け取り、パスの各要素について
//! ノードを作成するか、既存のノードに属性をマージします。
//!
//! 属性の競合は純粋関数[`resolve`]で解決されます。
//!
//! - 優先度が小さい(より信頼できる)レコードは`name`, `dataset`, `priority`を上書きします。
//! - 座標は、座標を持つレコードのうち最も優先度の高いものから採用されます。
//!   座標のないノードには、優先度の低いレコードの座標が補完されます。
//!   座標を持たないレコードが既存の座標を消すことはありません。
//! - 注記は`/`区切りで追記され、上書きされることはありません。
//!   要素は辞書順に並べられるため、取り込みの順序に依存しません。
//!
//! 優先度が同じ場合は既存の値が維持されます。

use std::collections::BTreeSet;
use std::ops::AddAssign;
use std::sync::mpsc;
use std::thread;

use crate::dataset::{DatasetId, PriorityTable};
use crate::errors::{AddrDictError, RecordError, RecordErrorKind, Result};
use crate::node::{AddressNode, NULL_ID, NodeId, Point};
use crate::normalize::normalize;
use crate::record::{NormalizedRecord, RecordSource, Segment};
use crate::registry::Registry;

/// 注記の区切り文字
pub const NOTE_DELIMITER: char = '/';

/// パイプライン取り込みでデコード段とマージ段の間に置くレコード数の上限
const PIPELINE_BOUND: usize = 1024;

/// 競合解決の対象となるノード属性
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Attributes {
    /// 表示用の名前
    pub name: String,
    /// 代表点
    pub point: Option<Point>,
    /// 代表点を提供したレコードの優先度
    pub point_priority: Option<i8>,
    /// 属性を所有するデータセットの優先度
    pub priority: i8,
    /// 属性を所有するデータセット
    pub dataset: u8,
    /// 注記
    pub note: String,
}

impl Attributes {
    /// ノードの現在の属性を取り出します。
    pub fn from_node(node: &AddressNode, point_priority: Option<i8>) -> Self {
        Self {
            name: node.name.clone(),
            point: node.point,
            point_priority: node.point.and(point_priority),
            priority: node.priority,
            dataset: node.dataset,
            note: node.note.clone(),
        }
    }

    /// 取り込むレコードの要素から属性を作成します。
    pub fn from_segment(segment: &Segment, priority: i8, dataset: DatasetId) -> Self {
        Self {
            name: segment.name.clone(),
            point: segment.point,
            point_priority: segment.point.map(|_| priority),
            priority,
            dataset: dataset.get(),
            note: merge_note("", segment.note.as_deref().unwrap_or_default()),
        }
    }

    fn apply_to(&self, node: &mut AddressNode) {
        node.name.clone_from(&self.name);
        node.point = self.point;
        node.priority = self.priority;
        node.dataset = self.dataset;
        node.note.clone_from(&self.note);
    }
}

/// 既存の属性と取り込む属性から、マージ後の属性を求めます。
///
/// この関数はレジストリに依存せず、入力だけから結果が決まります。
///
/// # 例
///
/// ```
/// use addrdict::merge::{resolve, Attributes};
/// use addrdict::node::Point;
///
/// let existing = Attributes {
///     name: "丸の内".to_string(),
///     point: Some(Point::new(139.76, 35.68)),
///     point_priority: Some(1),
///     priority: 1,
///     dataset: 1,
///     note: String::new(),
/// };
/// let incoming = Attributes {
///     name: "丸ノ内".to_string(),
///     priority: 5,
///     dataset: 2,
///     note: "zip:1000005".to_string(),
///     ..Default::default()
/// };
/// let merged = resolve(&existing, &incoming);
/// assert_eq!(merged.name, "丸の内");
/// assert_eq!(merged.point, existing.point);
/// assert_eq!(merged.dataset, 1);
/// assert_eq!(merged.note, "zip:1000005");
/// ```
pub fn resolve(existing: &Attributes, incoming: &Attributes) -> Attributes {
    let mut merged = if incoming.priority < existing.priority {
        Attributes {
            name: incoming.name.clone(),
            priority: incoming.priority,
            dataset: incoming.dataset,
            ..existing.clone()
        }
    } else {
        existing.clone()
    };

    if let Some(point) = incoming.point {
        let incoming_priority = incoming.point_priority.unwrap_or(incoming.priority);
        let replace = match (existing.point, existing.point_priority) {
            (None, _) => true,
            (Some(_), Some(current)) => incoming_priority < current,
            (Some(_), None) => incoming_priority < existing.priority,
        };
        if replace {
            merged.point = Some(point);
            merged.point_priority = Some(incoming_priority);
        }
    }

    merged.note = merge_note(&existing.note, &incoming.note);
    merged
}

/// 注記を追記します。
///
/// 結果は重複のない要素を辞書順に並べたものになり、追記の順序には依存しません。
fn merge_note(existing: &str, incoming: &str) -> String {
    let components: BTreeSet<&str> = existing
        .split(NOTE_DELIMITER)
        .chain(incoming.split(NOTE_DELIMITER))
        .filter(|component| !component.is_empty())
        .collect();
    let mut note = String::with_capacity(existing.len() + incoming.len() + 1);
    for (i, component) in components.into_iter().enumerate() {
        if i != 0 {
            note.push(NOTE_DELIMITER);
        }
        note.push_str(component);
    }
    note
}

/// 取り込み処理の件数
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// 取り込まれたレコード数
    pub ingested: usize,
    /// スキップされたレコード数
    pub skipped: usize,
    /// 作成されたノード数
    pub created: usize,
    /// 既存のノードにマージされた要素数
    pub merged: usize,
}

impl MergeStats {
    /// `earlier`の時点からの増分を返します。
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            ingested: self.ingested - earlier.ingested,
            skipped: self.skipped - earlier.skipped,
            created: self.created - earlier.created,
            merged: self.merged - earlier.merged,
        }
    }
}

impl AddAssign for MergeStats {
    fn add_assign(&mut self, other: Self) {
        self.ingested += other.ingested;
        self.skipped += other.skipped;
        self.created += other.created;
        self.merged += other.merged;
    }
}

/// レジストリにレコードをマージするエンジン
pub struct MergeEngine<'a> {
    registry: &'a mut Registry,
    priorities: &'a PriorityTable,
    stats: MergeStats,
}

impl<'a> MergeEngine<'a> {
    pub fn new(registry: &'a mut Registry, priorities: &'a PriorityTable) -> Self {
        Self {
            registry,
            priorities,
            stats: MergeStats::default(),
        }
    }

    /// これまでの件数を返します。
    pub fn stats(&self) -> MergeStats {
        self.stats
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    /// レコードを一件取り込みます。
    ///
    /// レコードは変更を始める前に全体が検証されます。
    /// 不正なレコードはレジストリを変更せず、スキップとして数えられます。
    ///
    /// # 引数
    ///
    /// * `record` - 取り込むレコード
    /// * `priority` - レコードのデータセットの優先度
    /// * `dataset` - レコードのデータセット
    ///
    /// # 戻り値
    ///
    /// 葉の要素に対応するノードのID。
    ///
    /// # エラー
    ///
    /// 不正なレコードの場合は[`AddrDictError::Record`]を返します。
    /// それ以外のエラーは致命的です。
    pub fn ingest(
        &mut self,
        record: &NormalizedRecord,
        priority: i8,
        dataset: DatasetId,
    ) -> Result<NodeId> {
        let keys = match lookup_keys(record) {
            Ok(keys) => keys,
            Err(e) => {
                self.stats.skipped += 1;
                return Err(e.into());
            }
        };

        let mut parent_id = NULL_ID;
        for (segment, key) in record.segments.iter().zip(&keys) {
            let (id, created) = self.registry.find_or_create(parent_id, segment.level, key)?;
            let incoming = Attributes::from_segment(segment, priority, dataset);
            if created {
                self.registry.update(id, |node| incoming.apply_to(node))?;
                self.registry.set_point_priority(id, incoming.point_priority);
                self.stats.created += 1;
            } else {
                self.merge_into(id, &incoming)?;
                self.stats.merged += 1;
            }
            parent_id = id;
        }

        self.stats.ingested += 1;
        Ok(parent_id)
    }

    fn merge_into(&mut self, id: NodeId, incoming: &Attributes) -> Result<()> {
        let node = self.registry.get(id).ok_or_else(|| {
            AddrDictError::invalid_state("merge target vanished", format!("node {}", id))
        })?;
        let existing = Attributes::from_node(node, self.registry.point_priority(id));
        let merged = resolve(&existing, incoming);
        if merged == existing {
            return Ok(());
        }

        if merged.dataset != existing.dataset || merged.priority != existing.priority {
            log::debug!(
                "node {}: dataset {} (priority {}) overrides dataset {} (priority {})",
                id,
                merged.dataset,
                merged.priority,
                existing.dataset,
                existing.priority,
            );
        }
        if merged.point != existing.point {
            log::debug!(
                "node {}: point {:?} replaced by {:?} from dataset {}",
                id,
                existing.point,
                merged.point,
                incoming.dataset,
            );
        }

        self.registry.update(id, |node| merged.apply_to(node))?;
        self.registry.set_point_priority(id, merged.point_priority);
        Ok(())
    }

    /// レコードソースを最後まで取り込みます。
    ///
    /// 優先度は優先度表から引かれます。不正なレコードは警告を出力してスキップされます。
    ///
    /// # 戻り値
    ///
    /// このソースの取り込みによる件数の増分。
    ///
    /// # エラー
    ///
    /// データセットの優先度が設定されていない場合や、ソースが致命的なエラーを返した場合に
    /// エラーを返します。
    pub fn ingest_source<S>(&mut self, source: &mut S, dataset: DatasetId) -> Result<MergeStats>
    where
        S: RecordSource + ?Sized,
    {
        let priority = self.priorities.priority(dataset)?;
        self.drain(std::iter::from_fn(|| source.next_record()), priority, dataset)
    }

    /// デコードとマージを並行して、レコードソースを最後まで取り込みます。
    ///
    /// レコードの読み込みは別スレッドで行われ、有限長のチャネルを通じて渡されます。
    /// マージは呼び出し元のスレッドで一件ずつ行われます。
    ///
    /// # エラー
    ///
    /// [`ingest_source`](Self::ingest_source)のエラーに加えて、
    /// 読み込みスレッドがパニックした場合に[`AddrDictError::ThreadPanic`]を返します。
    pub fn ingest_pipelined<S>(&mut self, source: &mut S, dataset: DatasetId) -> Result<MergeStats>
    where
        S: RecordSource + Send + ?Sized,
    {
        let priority = self.priorities.priority(dataset)?;
        let (tx, rx) = mpsc::sync_channel::<Result<NormalizedRecord>>(PIPELINE_BOUND);

        thread::scope(|s| {
            let decoder = s.spawn(move || {
                while let Some(item) = source.next_record() {
                    let fatal = matches!(&item, Err(e) if !matches!(e, AddrDictError::Record(_)));
                    if tx.send(item).is_err() || fatal {
                        break;
                    }
                }
            });

            let result = self.drain(rx.into_iter(), priority, dataset);

            match decoder.join() {
                Ok(()) => result,
                Err(payload) => {
                    let msg = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    Err(AddrDictError::ThreadPanic(msg))
                }
            }
        })
    }

    fn drain<I>(&mut self, records: I, priority: i8, dataset: DatasetId) -> Result<MergeStats>
    where
        I: Iterator<Item = Result<NormalizedRecord>>,
    {
        let before = self.stats;
        for item in records {
            let record = match item {
                Ok(record) => record,
                Err(AddrDictError::Record(e)) => {
                    log::warn!("dataset {}: {}", dataset, e);
                    self.stats.skipped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            match self.ingest(&record, priority, dataset) {
                Ok(_) => {}
                // ingestの中で数えられている
                Err(AddrDictError::Record(e)) => log::warn!("dataset {}: {}", dataset, e),
                Err(e) => return Err(e),
            }
        }
        Ok(self.stats.since(&before))
    }
}

/// 各要素の検索キーを求めます。
///
/// レコード全体を検証してから計算するので、途中で失敗することはありません。
fn lookup_keys(record: &NormalizedRecord) -> Result<Vec<String>, RecordError> {
    record.validate()?;
    record
        .segments
        .iter()
        .map(|segment| {
            let key = normalize(&segment.name);
            if key.is_empty() {
                Err(RecordError::new(RecordErrorKind::EmptyName(segment.level)))
            } else {
                Ok(key)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::dataset::PresetDataset;
    use crate::record::VecSource;

    fn attrs(priority: i8, point: Option<(f32, f32)>, note: &str) -> Attributes {
        Attributes {
            name: format!("name{}", priority),
            point: point.map(|(x, y)| Point::new(x, y)),
            point_priority: point.map(|_| priority),
            priority,
            dataset: priority as u8,
            note: note.to_string(),
        }
    }

    #[test]
    fn test_resolve_higher_priority_overwrites() {
        let existing = attrs(5, Some((1.0, 1.0)), "");
        let incoming = attrs(1, Some((2.0, 2.0)), "");
        let merged = resolve(&existing, &incoming);
        assert_eq!(merged.name, "name1");
        assert_eq!(merged.point, Some(Point::new(2.0, 2.0)));
        assert_eq!(merged.priority, 1);
        assert_eq!(merged.dataset, 1);
    }

    #[test]
    fn test_resolve_lower_priority_keeps() {
        let existing = attrs(1, Some((1.0, 1.0)), "");
        let incoming = attrs(5, Some((2.0, 2.0)), "");
        assert_eq!(resolve(&existing, &incoming), existing);
    }

    #[test]
    fn test_resolve_tie_keeps_existing() {
        let existing = attrs(3, Some((1.0, 1.0)), "");
        let mut incoming = attrs(3, Some((2.0, 2.0)), "");
        incoming.name = "other".to_string();
        incoming.dataset = 9;
        assert_eq!(resolve(&existing, &incoming), existing);
    }

    #[test]
    fn test_resolve_backfill() {
        let existing = attrs(1, None, "");
        let incoming = attrs(5, Some((2.0, 2.0)), "");
        let merged = resolve(&existing, &incoming);
        assert_eq!(merged.point, Some(Point::new(2.0, 2.0)));
        assert_eq!(merged.point_priority, Some(5));
        assert_eq!(merged.priority, 1);
        assert_eq!(merged.dataset, 1);
        assert_eq!(merged.name, "name1");
    }

    #[test]
    fn test_resolve_absent_point_never_erases() {
        let existing = attrs(5, Some((1.0, 1.0)), "");
        let incoming = attrs(1, None, "");
        let merged = resolve(&existing, &incoming);
        assert_eq!(merged.priority, 1);
        assert_eq!(merged.point, Some(Point::new(1.0, 1.0)));
        assert_eq!(merged.point_priority, Some(5));
    }

    #[test]
    fn test_resolve_better_backfill_replaces_worse() {
        // 優先度1(座標なし)のノードに優先度7の座標が補完された後、優先度3の座標が来た
        let mut existing = attrs(1, Some((7.0, 7.0)), "");
        existing.point_priority = Some(7);
        let incoming = attrs(3, Some((3.0, 3.0)), "");
        let merged = resolve(&existing, &incoming);
        assert_eq!(merged.point, Some(Point::new(3.0, 3.0)));
        assert_eq!(merged.point_priority, Some(3));
        assert_eq!(merged.priority, 1);
    }

    #[test]
    fn test_merge_note() {
        assert_eq!(merge_note("", "a"), "a");
        assert_eq!(merge_note("a", ""), "a");
        assert_eq!(merge_note("a", "b"), "a/b");
        assert_eq!(merge_note("b", "a"), "a/b");
        assert_eq!(merge_note("a/b", "b"), "a/b");
        assert_eq!(merge_note("ab", "b"), "ab/b");
        assert_eq!(merge_note("c/a", "b//a"), "a/b/c");
        assert_eq!(merge_note("", "b/a"), "a/b");
    }

    #[test]
    fn test_ingest_counts() {
        let priorities = PriorityTable::presets();
        let mut registry = Registry::new();
        let mut engine = MergeEngine::new(&mut registry, &priorities);
        let dataset = PresetDataset::City.id();

        let record = NormalizedRecord::new(vec![
            Segment::new(1, "東京都"),
            Segment::new(2, "千代田区"),
        ]);
        let leaf = engine.ingest(&record, 1, dataset).unwrap();
        assert_eq!(leaf, 2);
        engine.ingest(&record, 1, dataset).unwrap();

        let bad = NormalizedRecord::new(vec![Segment::new(2, "千代田区")]);
        assert!(matches!(
            engine.ingest(&bad, 1, dataset),
            Err(AddrDictError::Record(_))
        ));

        assert_eq!(
            engine.stats(),
            MergeStats {
                ingested: 2,
                skipped: 1,
                created: 2,
                merged: 2,
            }
        );
        assert_eq!(engine.registry().len(), 2);
    }

    #[test]
    fn test_ingest_symbol_only_name() {
        let priorities = PriorityTable::presets();
        let mut registry = Registry::new();
        let mut engine = MergeEngine::new(&mut registry, &priorities);
        let record = NormalizedRecord::new(vec![Segment::new(1, "東京都"), Segment::new(2, "・")]);
        assert!(engine.ingest(&record, 1, DatasetId(1)).is_err());
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn test_ingest_source_missing_priority() {
        let priorities = PriorityTable::presets();
        let mut registry = Registry::new();
        let mut engine = MergeEngine::new(&mut registry, &priorities);
        let mut source = VecSource::default();
        assert!(matches!(
            engine.ingest_source(&mut source, DatasetId(42)),
            Err(AddrDictError::MissingPriority(42))
        ));
    }
}
