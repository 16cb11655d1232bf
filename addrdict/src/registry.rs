//! ノードレジストリ
//!
//! レジストリは1回の変換処理で作成されるすべての[`AddressNode`]を所有し、
//! IDの割り当てと「このノードは既に存在するか」の判定を一手に引き受けます。
//!
//! ノードはID順の配列(`id - 1`が添字)に格納され、親子・兄弟の関係は整数IDで表現されます。
//! 検索キーは`(parent_id, level, normalized_key)`です。

use hashbrown::{Equivalent, HashMap};

use crate::errors::{AddrDictError, Result};
use crate::node::{AddressNode, NULL_ID, NodeId};
use crate::utils::FromU32;

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
struct NodeKey {
    parent_id: NodeId,
    level: i8,
    name: String,
}

/// 検索時に文字列を複製しないための借用版のキー
///
/// フィールドの並びと型が[`NodeKey`]と同じなので、ハッシュ値も一致します。
#[derive(Hash)]
struct NodeKeyRef<'a> {
    parent_id: NodeId,
    level: i8,
    name: &'a str,
}

impl Equivalent<NodeKey> for NodeKeyRef<'_> {
    fn equivalent(&self, key: &NodeKey) -> bool {
        self.parent_id == key.parent_id && self.level == key.level && self.name == key.name
    }
}

/// 兄弟チェーンの先頭と末尾
#[derive(Clone, Copy, Debug)]
struct Chain {
    first: NodeId,
    last: NodeId,
}

/// 変換処理中のノードを所有するレジストリ
#[derive(Clone, Debug, Default)]
pub struct Registry {
    nodes: Vec<AddressNode>,

    // 座標を提供したレコードの優先度。出力には含まれない
    point_priorities: Vec<Option<i8>>,

    keys: HashMap<NodeKey, NodeId>,
    chains: HashMap<NodeId, Chain>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// ノード数の見込みを指定してレジストリを作成します。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            point_priorities: Vec::with_capacity(capacity),
            keys: HashMap::with_capacity(capacity),
            chains: HashMap::new(),
        }
    }

    /// ノード数を返します。
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 既存のノードを検索します。
    pub fn find(&self, parent_id: NodeId, level: i8, key: &str) -> Option<NodeId> {
        self.keys
            .get(&NodeKeyRef {
                parent_id,
                level,
                name: key,
            })
            .copied()
    }

    /// キーに対応するノードを検索し、なければ作成します。
    ///
    /// 新しいノードには次のIDが割り当てられ、親の兄弟チェーンの末尾に追加されます。
    /// 新しいノードの`name`と`name_index`は`key`で初期化されます。
    ///
    /// # 引数
    ///
    /// * `parent_id` - 親ノードのID。根の場合は[`NULL_ID`]
    /// * `level` - ノードのレベル
    /// * `key` - 正規化済みの名前
    ///
    /// # 戻り値
    ///
    /// ノードのIDと、新しく作成されたかどうか。
    ///
    /// # エラー
    ///
    /// 親ノードが存在しない場合や、IDが`u32`の範囲を超えた場合にエラーを返します。
    pub fn find_or_create(
        &mut self,
        parent_id: NodeId,
        level: i8,
        key: &str,
    ) -> Result<(NodeId, bool)> {
        if let Some(id) = self.find(parent_id, level, key) {
            return Ok((id, false));
        }
        if parent_id != NULL_ID && self.get(parent_id).is_none() {
            return Err(AddrDictError::invalid_argument(
                "parent_id",
                format!("parent node {} does not exist", parent_id),
            ));
        }

        let id = NodeId::try_from(self.nodes.len() + 1)?;
        self.nodes.push(AddressNode {
            id,
            name: key.to_string(),
            name_index: key.to_string(),
            level,
            parent_id,
            ..Default::default()
        });
        self.point_priorities.push(None);
        self.keys.insert(
            NodeKey {
                parent_id,
                level,
                name: key.to_string(),
            },
            id,
        );

        match self.chains.get_mut(&parent_id) {
            Some(chain) => {
                let last = usize::from_u32(chain.last - 1);
                self.nodes[last].sibling_id = id;
                chain.last = id;
            }
            None => {
                self.chains.insert(parent_id, Chain { first: id, last: id });
            }
        }

        Ok((id, true))
    }

    /// IDからノードを取得します。
    #[inline(always)]
    pub fn get(&self, id: NodeId) -> Option<&AddressNode> {
        self.nodes.get(usize::from_u32(id.checked_sub(1)?))
    }

    /// IDからノードを可変参照で取得します。
    ///
    /// `id`, `parent_id`, `sibling_id`, `level`を書き換えると森の構造が壊れます。
    /// 壊れた構造は確定処理で検出されます。
    #[inline(always)]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut AddressNode> {
        self.nodes.get_mut(usize::from_u32(id.checked_sub(1)?))
    }

    /// ノードを書き換えます。
    ///
    /// # エラー
    ///
    /// ノードが存在しない場合にエラーを返します。
    pub fn update<F, T>(&mut self, id: NodeId, f: F) -> Result<T>
    where
        F: FnOnce(&mut AddressNode) -> T,
    {
        let node = self.get_mut(id).ok_or_else(|| {
            AddrDictError::invalid_argument("id", format!("node {} does not exist", id))
        })?;
        Ok(f(node))
    }

    /// 作成順(ID順)にすべてのノードを返します。
    #[inline(always)]
    pub fn nodes(&self) -> &[AddressNode] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [AddressNode] {
        &mut self.nodes
    }

    /// レジストリを消費してノード列を返します。
    pub fn into_nodes(self) -> Vec<AddressNode> {
        self.nodes
    }

    /// 兄弟チェーンの先頭を返します。子がない場合は[`NULL_ID`]です。
    ///
    /// `parent_id`に[`NULL_ID`]を指定すると根のチェーンの先頭を返します。
    pub fn first_child(&self, parent_id: NodeId) -> NodeId {
        self.chains.get(&parent_id).map_or(NULL_ID, |c| c.first)
    }

    /// 子を持つノード(根のチェーンは[`NULL_ID`])をIDの昇順で返します。
    pub fn parents(&self) -> Vec<NodeId> {
        let mut parents: Vec<NodeId> = self.chains.keys().copied().collect();
        parents.sort_unstable();
        parents
    }

    /// 兄弟チェーンをたどって子を返します。
    ///
    /// チェーンが壊れている場合でも、ノード数を超えて列挙することはありません。
    pub fn children(&self, parent_id: NodeId) -> Children<'_> {
        Children {
            registry: self,
            next: self.first_child(parent_id),
            remaining: self.nodes.len(),
        }
    }

    /// 現在の座標を提供したレコードの優先度を返します。
    pub fn point_priority(&self, id: NodeId) -> Option<i8> {
        let idx = usize::from_u32(id.checked_sub(1)?);
        self.point_priorities.get(idx).copied().flatten()
    }

    pub(crate) fn set_point_priority(&mut self, id: NodeId, priority: Option<i8>) {
        if let Some(idx) = id.checked_sub(1).map(usize::from_u32)
            && let Some(p) = self.point_priorities.get_mut(idx)
        {
            *p = priority;
        }
    }
}

/// [`Registry::children`]のイテレータ
pub struct Children<'a> {
    registry: &'a Registry,
    next: NodeId,
    remaining: usize,
}

impl<'a> Iterator for Children<'a> {
    type Item = &'a AddressNode;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NULL_ID || self.remaining == 0 {
            return None;
        }
        let node = self.registry.get(self.next)?;
        self.next = node.sibling_id;
        self.remaining -= 1;
        Some(node)
    }
}
