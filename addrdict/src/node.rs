//! 住所ノード
//!
//! このモジュールは、住所辞書を構成するノード[`AddressNode`]と、
//! ノードの代表点[`Point`]を定義します。

use crate::level::AddressLevel;
use crate::normalize::normalize;

/// ノードの識別子
///
/// `0`は「親なし」「兄弟なし」を表す予約値で、実際のノードには割り当てられません。
pub type NodeId = u32;

/// 親なし・兄弟チェーンの終端を表すID
pub const NULL_ID: NodeId = 0;

/// ノードの代表点(経度、緯度)
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    /// 経度
    pub x: f32,
    /// 緯度
    pub y: f32,
}

impl Point {
    #[inline(always)]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// 両方の座標が有限の値であるかどうか
    #[inline(always)]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// 住所辞書のノード
///
/// 各ノードは自身のパス要素(例: 「丸の内」)のみを持ち、
/// 親へのリンク`parent_id`と次の兄弟へのリンク`sibling_id`で森を構成します。
#[derive(Clone, Debug, PartialEq, Default)]
pub struct AddressNode {
    /// ノードID
    pub id: NodeId,

    /// 表示用の名前
    pub name: String,

    /// 検索用に正規化された名前
    pub name_index: String,

    /// 代表点。座標が不明な場合は`None`
    pub point: Option<Point>,

    /// 階層レベル
    pub level: i8,

    /// 属性を所有しているデータセットの優先度(小さいほど優先)
    pub priority: i8,

    /// 出典や郵便番号などの注記
    pub note: String,

    /// 親ノードのID。根の場合は[`NULL_ID`]
    pub parent_id: NodeId,

    /// 属性を最後に書き込んだデータセット
    pub dataset: u8,

    /// 次の兄弟ノードのID。最後の場合は[`NULL_ID`]
    pub sibling_id: NodeId,
}

impl AddressNode {
    /// 経度を返します。
    #[inline(always)]
    pub fn x(&self) -> Option<f32> {
        self.point.map(|p| p.x)
    }

    /// 緯度を返します。
    #[inline(always)]
    pub fn y(&self) -> Option<f32> {
        self.point.map(|p| p.y)
    }

    /// 根ノードかどうか
    #[inline(always)]
    pub fn is_root(&self) -> bool {
        self.parent_id == NULL_ID
    }

    /// レベルを列挙型として返します。範囲外の場合は`None`です。
    pub fn address_level(&self) -> Option<AddressLevel> {
        AddressLevel::from_i8(self.level)
    }

    /// 現在の名前から`name_index`を再計算します。
    pub fn refresh_name_index(&mut self) {
        self.name_index = normalize(&self.name);
    }
}
