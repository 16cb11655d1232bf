//! ノード列のバイナリ形式
//!
//! 検索エンジンが読み込む、固定スキーマのノード列を読み書きします。
//!
//! ```text
//! magic   : b"AddrDictNodes 1.0\n"
//! count   : u64
//! records : count × NodeRecord
//! ```
//!
//! 整数と浮動小数点数はリトルエンディアンの固定長、文字列はu64の長さとUTF-8のバイト列です。
//! 座標がないノードは`x`と`y`の両方にNaNを書き込みます。

use std::io::{Read, Write};

use bincode::{Decode, Encode};

use crate::errors::{AddrDictError, Result};
use crate::node::{AddressNode, NodeId, Point};

/// ノード列を識別するマジックバイト
///
/// この定数のバージョンはバイナリ形式のバージョンであり、クレートのバージョンとは独立しています。
pub const NODES_MAGIC: &[u8] = b"AddrDictNodes 1.0\n";

// ノード数から事前に確保する容量の上限
const MAX_PREALLOCATION: usize = 1 << 20;

/// 1ノード分のレコード
#[derive(Decode, Encode)]
struct NodeRecord {
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

impl NodeRecord {
    fn from_node(node: &AddressNode) -> Result<Self> {
        let (x, y) = match node.point {
            Some(p) if p.is_finite() => (p.x, p.y),
            Some(p) => {
                return Err(AddrDictError::invalid_argument(
                    "nodes",
                    format!("node {} has a non-finite point ({}, {})", node.id, p.x, p.y),
                ));
            }
            None => (f32::NAN, f32::NAN),
        };
        Ok(Self {
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
        })
    }

    fn into_node(self) -> Result<AddressNode> {
        let point = match (self.x.is_nan(), self.y.is_nan()) {
            (true, true) => None,
            (false, false) => Some(Point::new(self.x, self.y)),
            _ => {
                return Err(AddrDictError::invalid_format(
                    "nodes",
                    format!("node {} has only one coordinate", self.id),
                ));
            }
        };
        Ok(AddressNode {
            id: self.id,
            name: self.name,
            name_index: self.name_index,
            point,
            level: self.level,
            priority: self.priority,
            note: self.note,
            parent_id: self.parent_id,
            dataset: self.dataset,
            sibling_id: self.sibling_id,
        })
    }
}

#[inline(always)]
fn config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_little_endian()
        .with_fixed_int_encoding()
}

/// ノード列を書き出します。
///
/// # 引数
///
/// * `wtr` - 書き込み先
/// * `nodes` - 書き出すノード列
///
/// # エラー
///
/// 座標が有限の値でないノードがある場合や、書き込みに失敗した場合にエラーを返します。
pub fn write_nodes<W>(mut wtr: W, nodes: &[AddressNode]) -> Result<()>
where
    W: Write,
{
    wtr.write_all(NODES_MAGIC)?;
    let count = u64::try_from(nodes.len())?;
    bincode::encode_into_std_write(count, &mut wtr, config())?;
    for node in nodes {
        bincode::encode_into_std_write(NodeRecord::from_node(node)?, &mut wtr, config())?;
    }
    wtr.flush()?;
    Ok(())
}

/// ノード列を読み込みます。
///
/// # エラー
///
/// マジックバイトが一致しない場合や、データが壊れている場合にエラーを返します。
pub fn read_nodes<R>(mut rdr: R) -> Result<Vec<AddressNode>>
where
    R: Read,
{
    let mut magic = [0; NODES_MAGIC.len()];
    rdr.read_exact(&mut magic)?;
    if magic != NODES_MAGIC {
        return Err(AddrDictError::invalid_argument(
            "rdr",
            "The magic number of the input node list mismatches.",
        ));
    }

    let count: u64 = bincode::decode_from_std_read(&mut rdr, config())?;
    let count = usize::try_from(count)?;
    let mut nodes = Vec::with_capacity(count.min(MAX_PREALLOCATION));
    for _ in 0..count {
        let record: NodeRecord = bincode::decode_from_std_read(&mut rdr, config())?;
        nodes.push(record.into_node()?);
    }
    Ok(nodes)
}
