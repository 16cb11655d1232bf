//! 住所要素の階層レベル
//!
//! 住所ノードの`level`は符号付き8ビット整数として保存されます。
//! このモジュールは各値の意味と、有効範囲の判定を提供します。

use std::fmt;

/// 住所要素の階層レベル
///
/// 値が小さいほど上位の階層です。子ノードのレベルは常に親のレベル + 1 です。
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash, PartialOrd, Ord)]
#[repr(i8)]
pub enum AddressLevel {
    /// 都道府県
    Prefecture = 1,
    /// 市区町村(政令指定都市の区を含む)
    City = 2,
    /// 大字・町
    Oaza = 3,
    /// 字・丁目
    Aza = 4,
    /// 街区・地番
    Block = 5,
    /// 住居番号
    Residence = 6,
    /// 建物表示番号
    Building = 7,
}

impl AddressLevel {
    /// 最上位のレベル(森の根)
    pub const MIN: i8 = AddressLevel::Prefecture as i8;

    /// 最下位のレベル
    pub const MAX: i8 = AddressLevel::Building as i8;

    /// すべてのレベルを上位から順に並べたもの
    pub const ALL: [AddressLevel; 7] = [
        AddressLevel::Prefecture,
        AddressLevel::City,
        AddressLevel::Oaza,
        AddressLevel::Aza,
        AddressLevel::Block,
        AddressLevel::Residence,
        AddressLevel::Building,
    ];

    /// 整数値からレベルを取得します。
    ///
    /// 範囲外の場合は`None`を返します。
    pub const fn from_i8(level: i8) -> Option<Self> {
        match level {
            1 => Some(Self::Prefecture),
            2 => Some(Self::City),
            3 => Some(Self::Oaza),
            4 => Some(Self::Aza),
            5 => Some(Self::Block),
            6 => Some(Self::Residence),
            7 => Some(Self::Building),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn get(self) -> i8 {
        self as i8
    }

    /// 親となるレベルを返します。最上位の場合は`None`です。
    pub const fn parent(self) -> Option<Self> {
        Self::from_i8(self as i8 - 1)
    }

    /// 表示用の名称
    pub const fn label(self) -> &'static str {
        match self {
            Self::Prefecture => "都道府県",
            Self::City => "市区町村",
            Self::Oaza => "大字",
            Self::Aza => "字・丁目",
            Self::Block => "街区",
            Self::Residence => "住居番号",
            Self::Building => "建物表示番号",
        }
    }
}

impl From<AddressLevel> for i8 {
    fn from(level: AddressLevel) -> Self {
        level as i8
    }
}

impl fmt::Display for AddressLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}({})", self.label(), *self as i8)
    }
}
