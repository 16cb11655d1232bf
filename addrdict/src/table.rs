//! ランダムアクセス可能なノード表
//!
//! 確定したノード列を`rkyv`でアーカイブした形式です。
//! ファイルをメモリマップして、デシリアライズせずにIDでノードを参照できます。
//!
//! ファイルはマジックバイト、16バイト境界までのパディング、アーカイブ本体の順に並びます。

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use memmap2::Mmap;
use rkyv::rancor::Error;
use rkyv::util::AlignedVec;
use rkyv::{
    Archive, Serialize, access, api::serialize_using, ser::Serializer, ser::allocator::Arena,
    ser::sharing::Share, ser::writer::IoWriter, util::with_arena,
};

use crate::errors::{AddrDictError, Result};
use crate::node::{AddressNode, NULL_ID, NodeId, Point};
use crate::utils::FromU32;

/// ノード表を識別するマジックバイト
pub const TABLE_MAGIC: &[u8] = b"AddrDictTable 1.0\n";

const TABLE_MAGIC_LEN: usize = TABLE_MAGIC.len();
const RKYV_ALIGNMENT: usize = 16;
const PADDING_LEN: usize = (RKYV_ALIGNMENT - (TABLE_MAGIC_LEN % RKYV_ALIGNMENT)) % RKYV_ALIGNMENT;
const DATA_START: usize = TABLE_MAGIC_LEN + PADDING_LEN;

/// 表の1行
#[derive(Archive, Serialize)]
pub struct TableEntry {
    id: NodeId,
    name: String,
    name_index: String,
    x: f32,
    y: f32,
    level: i8,
    priority: i8,
    note: String,
    parent_id: NodeId,
    dataset: u8,
    sibling_id: NodeId,
}

/// アーカイブされる表の本体
#[derive(Archive, Serialize)]
pub struct NodeTableData {
    entries: Vec<TableEntry>,

    // 添字0は根のチェーン、添字`id`はノード`id`の子のチェーンの先頭
    first_children: Vec<NodeId>,
}

impl ArchivedTableEntry {
    #[inline(always)]
    pub fn id(&self) -> NodeId {
        self.id.to_native()
    }

    #[inline(always)]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    #[inline(always)]
    pub fn name_index(&self) -> &str {
        self.name_index.as_str()
    }

    /// 代表点。座標がない場合は`None`
    pub fn point(&self) -> Option<Point> {
        let x = self.x.to_native();
        let y = self.y.to_native();
        (!x.is_nan() && !y.is_nan()).then(|| Point::new(x, y))
    }

    #[inline(always)]
    pub fn level(&self) -> i8 {
        self.level
    }

    #[inline(always)]
    pub fn priority(&self) -> i8 {
        self.priority
    }

    #[inline(always)]
    pub fn note(&self) -> &str {
        self.note.as_str()
    }

    #[inline(always)]
    pub fn parent_id(&self) -> NodeId {
        self.parent_id.to_native()
    }

    #[inline(always)]
    pub fn dataset(&self) -> u8 {
        self.dataset
    }

    #[inline(always)]
    pub fn sibling_id(&self) -> NodeId {
        self.sibling_id.to_native()
    }

    /// 所有された[`AddressNode`]に変換します。
    pub fn to_node(&self) -> AddressNode {
        AddressNode {
            id: self.id(),
            name: self.name().to_string(),
            name_index: self.name_index().to_string(),
            point: self.point(),
            level: self.level(),
            priority: self.priority(),
            note: self.note().to_string(),
            parent_id: self.parent_id(),
            dataset: self.dataset(),
            sibling_id: self.sibling_id(),
        }
    }
}

impl NodeTableData {
    /// ID順に並んだノード列から表を作成します。
    ///
    /// # エラー
    ///
    /// ノードのIDが1からの連番でない場合、または座標が有限の値でない場合にエラーを返します。
    pub fn from_nodes(nodes: &[AddressNode]) -> Result<Self> {
        let mut pointed = vec![false; nodes.len() + 1];
        for node in nodes {
            if let Some(p) = pointed.get_mut(usize::from_u32(node.sibling_id)) {
                *p = true;
            }
        }

        let mut entries = Vec::with_capacity(nodes.len());
        let mut first_children = vec![NULL_ID; nodes.len() + 1];
        for (i, node) in nodes.iter().enumerate() {
            if usize::from_u32(node.id) != i + 1 {
                return Err(AddrDictError::invalid_argument(
                    "nodes",
                    format!("node {} is stored at position {}", node.id, i + 1),
                ));
            }
            let (x, y) = match node.point {
                Some(p) if p.is_finite() => (p.x, p.y),
                Some(_) => {
                    return Err(AddrDictError::invalid_argument(
                        "nodes",
                        format!("node {} has a non-finite point", node.id),
                    ));
                }
                None => (f32::NAN, f32::NAN),
            };
            let head = first_children
                .get_mut(usize::from_u32(node.parent_id))
                .ok_or_else(|| {
                    AddrDictError::invalid_argument(
                        "nodes",
                        format!("node {}: parent {} does not exist", node.id, node.parent_id),
                    )
                })?;
            if *head == NULL_ID && !pointed[i + 1] {
                *head = node.id;
            }
            entries.push(TableEntry {
                id: node.id,
                name: node.name.clone(),
                name_index: node.name_index.clone(),
                x,
                y,
                level: node.level,
                priority: node.priority,
                note: node.note.clone(),
                parent_id: node.parent_id,
                dataset: node.dataset,
                sibling_id: node.sibling_id,
            });
        }
        Ok(Self {
            entries,
            first_children,
        })
    }

    /// 表を書き出します。
    ///
    /// # エラー
    ///
    /// 書き込みまたはシリアライズに失敗した場合にエラーを返します。
    pub fn write<W>(&self, mut wtr: W) -> Result<()>
    where
        W: Write,
    {
        wtr.write_all(TABLE_MAGIC)?;

        let padding_bytes = vec![0xFF; PADDING_LEN];
        wtr.write_all(&padding_bytes)?;

        with_arena(|arena: &mut Arena| {
            let writer = IoWriter::new(&mut wtr);
            let mut serializer = Serializer::new(writer, arena.acquire(), Share::new());
            serialize_using::<_, rkyv::rancor::Error>(self, &mut serializer)
        })
        .map_err(|e| {
            AddrDictError::invalid_state("rkyv serialization failed".to_string(), e.to_string())
        })?;

        Ok(())
    }
}

/// 表のデータを保持するバッファ
#[allow(dead_code)]
enum TableBuffer {
    Mmap(Mmap),
    Aligned(AlignedVec<16>),
}

/// 読み込まれたノード表
pub struct NodeTable {
    _buffer: TableBuffer,
    data: &'static ArchivedNodeTableData,
}

impl NodeTable {
    /// メモリマップでファイルから表を読み込みます。
    ///
    /// # エラー
    ///
    /// ファイルを開けない場合、マジックバイトが一致しない場合、
    /// アーカイブの検証に失敗した場合にエラーを返します。
    pub fn from_path<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| {
            AddrDictError::invalid_argument("path", format!("Failed to open node table: {}", e))
        })?;
        let mut magic = [0u8; TABLE_MAGIC_LEN];
        file.read_exact(&mut magic)?;
        if magic != TABLE_MAGIC {
            return Err(AddrDictError::invalid_argument(
                "path",
                "The magic number of the node table mismatches.",
            ));
        }

        let mmap = unsafe { Mmap::map(&file)? };
        let Some(data_bytes) = mmap.get(DATA_START..) else {
            return Err(AddrDictError::invalid_argument(
                "path",
                "Node table file too small or corrupted.",
            ));
        };

        match access::<ArchivedNodeTableData, Error>(data_bytes) {
            Ok(archived) => {
                // SAFETY: mmapはNodeTableが破棄されるまで解放されない
                let data: &'static ArchivedNodeTableData = unsafe { &*(archived as *const _) };
                Ok(Self {
                    _buffer: TableBuffer::Mmap(mmap),
                    data,
                })
            }
            Err(_) => {
                let mut aligned_bytes = AlignedVec::with_capacity(data_bytes.len());
                aligned_bytes.extend_from_slice(data_bytes);
                Self::from_aligned(aligned_bytes)
            }
        }
    }

    /// すべてのデータをヒープに読み込んで表を作成します。
    ///
    /// # エラー
    ///
    /// 読み込みに失敗した場合、マジックバイトが一致しない場合、
    /// アーカイブの検証に失敗した場合にエラーを返します。
    pub fn read<R>(mut rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let mut magic = [0; TABLE_MAGIC_LEN];
        rdr.read_exact(&mut magic)?;
        if magic != TABLE_MAGIC {
            return Err(AddrDictError::invalid_argument(
                "rdr",
                "The magic number of the node table mismatches.",
            ));
        }

        let mut padding_buf = vec![0; PADDING_LEN];
        rdr.read_exact(&mut padding_buf)?;

        let mut buffer = Vec::new();
        rdr.read_to_end(&mut buffer)?;

        let mut aligned_bytes = AlignedVec::with_capacity(buffer.len());
        aligned_bytes.extend_from_slice(&buffer);
        Self::from_aligned(aligned_bytes)
    }

    fn from_aligned(aligned_bytes: AlignedVec<16>) -> Result<Self> {
        let archived = access::<ArchivedNodeTableData, Error>(&aligned_bytes).map_err(|e| {
            AddrDictError::invalid_state(
                "rkyv validation failed. The node table may be corrupted or incompatible."
                    .to_string(),
                e.to_string(),
            )
        })?;

        // SAFETY: AlignedVecのヒープ領域はNodeTableが破棄されるまで移動しない
        let data: &'static ArchivedNodeTableData = unsafe { &*(archived as *const _) };
        Ok(Self {
            _buffer: TableBuffer::Aligned(aligned_bytes),
            data,
        })
    }

    /// ノード数を返します。
    pub fn len(&self) -> usize {
        self.data.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.entries.is_empty()
    }

    /// IDでノードを参照します。
    #[inline(always)]
    pub fn get(&self, id: NodeId) -> Option<&ArchivedTableEntry> {
        self.data.entries.get(usize::from_u32(id.checked_sub(1)?))
    }

    /// 子ノードを兄弟チェーンの順に返します。`id`に[`NULL_ID`]を指定すると根を返します。
    pub fn children(&self, id: NodeId) -> TableChildren<'_> {
        let next = self
            .data
            .first_children
            .get(usize::from_u32(id))
            .map_or(NULL_ID, |c| c.to_native());
        TableChildren {
            table: self,
            next,
            remaining: self.len(),
        }
    }

    /// 根からノードまでの名前を返します。
    pub fn path(&self, id: NodeId) -> Vec<&str> {
        let mut names = vec![];
        let mut next = id;
        while let Some(entry) = self.get(next) {
            names.push(entry.name());
            if names.len() > self.len() {
                break;
            }
            next = entry.parent_id();
        }
        names.reverse();
        names
    }

    /// すべてのノードをID順に返します。
    pub fn iter(&self) -> impl Iterator<Item = &ArchivedTableEntry> {
        self.data.entries.iter()
    }

    /// 所有されたノード列に変換します。
    pub fn to_nodes(&self) -> Vec<AddressNode> {
        self.iter().map(ArchivedTableEntry::to_node).collect()
    }
}

/// [`NodeTable::children`]のイテレータ
pub struct TableChildren<'a> {
    table: &'a NodeTable,
    next: NodeId,
    remaining: usize,
}

impl<'a> Iterator for TableChildren<'a> {
    type Item = &'a ArchivedTableEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NULL_ID || self.remaining == 0 {
            return None;
        }
        let entry = self.table.get(self.next)?;
        self.next = entry.sibling_id();
        self.remaining -= 1;
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::index::IndexBuilder;
    use crate::registry::Registry;

    fn nodes() -> Vec<AddressNode> {
        let mut registry = Registry::new();
        let (tokyo, _) = registry.find_or_create(NULL_ID, 1, "東京都").unwrap();
        let (chiyoda, _) = registry.find_or_create(tokyo, 2, "千代田区").unwrap();
        let (marunouchi, _) = registry.find_or_create(chiyoda, 3, "丸の内").unwrap();
        registry.find_or_create(chiyoda, 3, "大手町").unwrap();
        registry.find_or_create(NULL_ID, 1, "北海道").unwrap();
        registry.find_or_create(marunouchi, 4, "1").unwrap();
        registry
            .update(marunouchi, |n| n.point = Some(Point::new(139.76, 35.68)))
            .unwrap();
        IndexBuilder::finalize(&mut registry).unwrap();
        registry.into_nodes()
    }

    fn write(nodes: &[AddressNode]) -> Vec<u8> {
        let mut buf = vec![];
        NodeTableData::from_nodes(nodes)
            .unwrap()
            .write(&mut buf)
            .unwrap();
        buf
    }

    #[test]
    fn test_read() {
        let nodes = nodes();
        let buf = write(&nodes);
        assert_eq!(DATA_START % RKYV_ALIGNMENT, 0);
        assert_eq!(&buf[..TABLE_MAGIC_LEN], TABLE_MAGIC);

        let table = NodeTable::read(buf.as_slice()).unwrap();
        assert_eq!(table.len(), 6);
        assert_eq!(table.to_nodes(), nodes);

        let marunouchi = table.get(3).unwrap();
        assert_eq!(marunouchi.name(), "丸の内");
        assert_eq!(marunouchi.point(), Some(Point::new(139.76, 35.68)));
        assert_eq!(table.get(1).unwrap().point(), None);
        assert!(table.get(0).is_none());
        assert!(table.get(7).is_none());
    }

    #[test]
    fn test_children_and_path() {
        let table = NodeTable::read(write(&nodes()).as_slice()).unwrap();

        let roots: Vec<&str> = table.children(NULL_ID).map(|e| e.name()).collect();
        assert_eq!(roots, vec!["東京都", "北海道"]);

        let towns: Vec<NodeId> = table.children(2).map(|e| e.id()).collect();
        assert_eq!(towns, vec![3, 4]);
        assert_eq!(table.children(4).count(), 0);

        assert_eq!(table.path(6), vec!["東京都", "千代田区", "丸の内", "1"]);
        assert!(table.path(0).is_empty());
    }

    #[test]
    fn test_from_path() {
        let nodes = nodes();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        NodeTableData::from_nodes(&nodes)
            .unwrap()
            .write(&mut file)
            .unwrap();
        file.flush().unwrap();

        let table = NodeTable::from_path(file.path()).unwrap();
        assert_eq!(table.to_nodes(), nodes);
    }

    #[test]
    fn test_wrong_magic() {
        let mut buf = write(&nodes());
        buf[0] = b'Z';
        assert!(NodeTable::read(buf.as_slice()).is_err());
    }

    #[test]
    fn test_sparse_ids_refused() {
        let mut nodes = nodes();
        nodes.remove(1);
        assert!(NodeTableData::from_nodes(&nodes).is_err());
    }
}
