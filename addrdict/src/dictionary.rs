//! 住所辞書の構築
//!
//! [`DictionaryBuilder`]は、データセットごとのレコードソースから
//! マージ、確定、出力までの一連の変換処理を実行します。

use std::io::{Read, Write};

use crate::dataset::{DatasetId, PriorityTable};
use crate::errors::{AddrDictError, Result};
use crate::index::{FinalizeReport, IndexBuilder};
use crate::merge::{MergeEngine, MergeStats};
use crate::node::AddressNode;
use crate::record::RecordSource;
use crate::registry::Registry;
use crate::serializer;
use crate::table::NodeTableData;

/// データセットごとの取り込み結果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceReport {
    pub dataset: DatasetId,
    pub priority: i8,
    pub stats: MergeStats,
}

/// 変換処理の結果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// 取り込んだ順のデータセットごとの結果
    pub sources: Vec<SourceReport>,
    /// 全体の件数
    pub stats: MergeStats,
    /// 確定処理の結果
    pub finalize: FinalizeReport,
}

impl BuildReport {
    /// スキップされたレコード数
    pub fn skipped(&self) -> usize {
        self.stats.skipped
    }
}

/// 住所辞書のビルダー
pub struct DictionaryBuilder {
    priorities: PriorityTable,
    sources: Vec<(DatasetId, Box<dyn RecordSource + Send>)>,
    pipelined: bool,
}

impl DictionaryBuilder {
    /// 優先度表を指定してビルダーを作成します。
    pub fn new(priorities: PriorityTable) -> Self {
        Self {
            priorities,
            sources: vec![],
            pipelined: false,
        }
    }

    /// レコードソースを追加します。
    ///
    /// 同じデータセットに複数のソースを追加できます。
    pub fn add_source<S>(&mut self, dataset: DatasetId, source: S) -> &mut Self
    where
        S: RecordSource + Send + 'static,
    {
        self.sources.push((dataset, Box::new(source)));
        self
    }

    /// レコードの読み込みを別スレッドで行うかどうかを設定します。
    pub fn pipelined(&mut self, yes: bool) -> &mut Self {
        self.pipelined = yes;
        self
    }

    /// 辞書を構築します。
    ///
    /// ソースは優先度の昇順(同じ優先度ではデータセットのタグの昇順)に取り込まれます。
    ///
    /// # エラー
    ///
    /// 以下の場合にエラーを返します。
    ///
    /// - 優先度表に登録されていないデータセットのソースがある場合(取り込みは開始されません)
    /// - レコードソースが致命的なエラーを返した場合
    /// - 森の不変条件に違反した場合
    pub fn build(self) -> Result<AddressDictionary> {
        let Self {
            priorities,
            sources,
            pipelined,
        } = self;

        let mut ordered = Vec::with_capacity(sources.len());
        for (dataset, source) in sources {
            let priority = priorities.priority(dataset)?;
            ordered.push((priority, dataset, source));
        }
        ordered.sort_by_key(|(priority, dataset, _)| (*priority, *dataset));

        let mut registry = Registry::new();
        let mut report = BuildReport::default();
        {
            let mut engine = MergeEngine::new(&mut registry, &priorities);
            for (priority, dataset, mut source) in ordered {
                let name = priorities
                    .get(dataset)
                    .map_or_else(|| dataset.to_string(), |d| d.name.clone());
                log::info!("Ingesting dataset {} (priority {})", name, priority);
                let stats = if pipelined {
                    engine.ingest_pipelined(&mut source, dataset)?
                } else {
                    engine.ingest_source(&mut source, dataset)?
                };
                log::info!(
                    "Dataset {}: {} records, {} skipped, {} nodes created",
                    name,
                    stats.ingested,
                    stats.skipped,
                    stats.created,
                );
                report.sources.push(SourceReport {
                    dataset,
                    priority,
                    stats,
                });
            }
            report.stats = engine.stats();
        }

        report.finalize = IndexBuilder::finalize(&mut registry)?;

        Ok(AddressDictionary {
            nodes: registry.into_nodes(),
            priorities,
            report: Some(report),
        })
    }
}

/// 確定した住所辞書
pub struct AddressDictionary {
    nodes: Vec<AddressNode>,
    priorities: PriorityTable,
    report: Option<BuildReport>,
}

impl AddressDictionary {
    /// ID順のノード列
    pub fn nodes(&self) -> &[AddressNode] {
        &self.nodes
    }

    /// 使用した優先度表
    pub fn priorities(&self) -> &PriorityTable {
        &self.priorities
    }

    /// 構築時の結果。読み込んだ辞書の場合は`None`
    pub fn report(&self) -> Option<&BuildReport> {
        self.report.as_ref()
    }

    /// ノード列をバイナリ形式で書き出します。
    pub fn write<W>(&self, wtr: W) -> Result<()>
    where
        W: Write,
    {
        serializer::write_nodes(wtr, &self.nodes)
    }

    /// ノード表を書き出します。
    pub fn write_table<W>(&self, wtr: W) -> Result<()>
    where
        W: Write,
    {
        NodeTableData::from_nodes(&self.nodes)?.write(wtr)
    }

    /// 優先度表をCSV形式で書き出します。
    ///
    /// # エラー
    ///
    /// 優先度表が空の場合(ノード列から[`read`](Self::read)した辞書など)にエラーを返します。
    pub fn write_datasets<W>(&self, wtr: W) -> Result<()>
    where
        W: Write,
    {
        if self.priorities.is_empty() {
            return Err(AddrDictError::invalid_state(
                "no dataset to write",
                "the priority table is not stored in the node list",
            ));
        }
        self.priorities.write(wtr)
    }

    /// バイナリ形式のノード列から辞書を読み込みます。
    ///
    /// 読み込んだノードの森構造は検証されます。
    /// ノード列には優先度表が含まれないため、読み込んだ辞書の[`priorities`](Self::priorities)は空です。
    ///
    /// # エラー
    ///
    /// 形式が不正な場合や、森の不変条件に違反している場合にエラーを返します。
    pub fn read<R>(rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let nodes = serializer::read_nodes(rdr)?;
        let mut registry = Registry::new();
        for node in &nodes {
            let (id, _) = registry.find_or_create(node.parent_id, node.level, &node.name_index)?;
            if id != node.id {
                return Err(AddrDictError::invalid_format(
                    "rdr",
                    format!("node {} was expected to have id {}", node.id, id),
                ));
            }
        }
        for node in &nodes {
            registry.update(node.id, |n| *n = node.clone())?;
        }
        IndexBuilder::finalize(&mut registry)?;

        Ok(Self {
            nodes: registry.into_nodes(),
            priorities: PriorityTable::new(),
            report: None,
        })
    }
}
