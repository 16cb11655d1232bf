//! データセットと優先度表
//!
//! 住所レコードは複数のデータセットから提供されます。各データセットは
//! 8ビットのタグと優先度(小さいほど優先)を持ち、マージ時の競合解決に使われます。
//!
//! 優先度表は取り込みを始める前にすべて確定している必要があります。
//! 表は[`PresetDataset`]から、またはCSV形式の定義ファイルから作成できます。
//!
//! ```text
//! # id,name,priority[,title[,url]]
//! 1,city,1,歴史的行政区域データセットβ版地名辞書
//! 3,gaiku,3,街区レベル位置参照情報,https://nlftp.mlit.go.jp/isj/
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};

use crate::errors::{AddrDictError, Result};
use crate::utils::{parse_csv_row, quote_csv_cell};

/// データセットのタグ
#[derive(Clone, Copy, Eq, PartialEq, Debug, Hash, PartialOrd, Ord)]
pub struct DatasetId(pub u8);

impl DatasetId {
    #[inline(always)]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// データセットのメタデータ
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatasetInfo {
    /// タグ
    pub id: DatasetId,
    /// 短い名前(CLIでの指定に使用)
    pub name: String,
    /// 優先度。小さいほど優先
    pub priority: i8,
    /// データセットの正式名称
    pub title: String,
    /// 配布元URL
    pub url: String,
}

/// 手動設定なしで使用できるプリセットデータセット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetDataset {
    /// 歴史的行政区域データセットβ版地名辞書
    City,
    /// Geolonia 住所データ
    Geolonia,
    /// 街区レベル位置参照情報
    Gaiku,
    /// 電子国土基本図「住居表示住所」
    Jusho,
    /// 登記所備付地図データ
    Chiban,
    /// 大字・町丁目レベル位置参照情報
    Oaza,
    /// アドレス・ベース・レジストリ
    BaseRegistry,
}

struct PresetMeta {
    id: u8,
    name: &'static str,
    priority: i8,
    title: &'static str,
    url: &'static str,
}

static CITY: PresetMeta = PresetMeta {
    id: 1,
    name: "city",
    priority: 1,
    title: "歴史的行政区域データセットβ版地名辞書",
    url: "https://geonlp.ex.nii.ac.jp/dictionary/geoshape-city/",
};

static GEOLONIA: PresetMeta = PresetMeta {
    id: 2,
    name: "geolonia",
    priority: 2,
    title: "Geolonia 住所データ",
    url: "https://github.com/geolonia/japanese-addresses",
};

static GAIKU: PresetMeta = PresetMeta {
    id: 3,
    name: "gaiku",
    priority: 3,
    title: "街区レベル位置参照情報",
    url: "https://nlftp.mlit.go.jp/isj/",
};

static JUSHO: PresetMeta = PresetMeta {
    id: 4,
    name: "jusho",
    priority: 4,
    title: "電子国土基本図「住居表示住所」",
    url: "https://www.gsi.go.jp/kihonjohochousa/jukyo_jusho.html",
};

static CHIBAN: PresetMeta = PresetMeta {
    id: 7,
    name: "chiban",
    priority: 7,
    title: "登記所備付地図データ",
    url: "https://front.geospatial.jp/moj-chizu-xml-readme/",
};

static OAZA: PresetMeta = PresetMeta {
    id: 8,
    name: "oaza",
    priority: 8,
    title: "大字・町丁目レベル位置参照情報",
    url: "https://nlftp.mlit.go.jp/isj/",
};

static BASE_REGISTRY: PresetMeta = PresetMeta {
    id: 9,
    name: "basereg",
    priority: 9,
    title: "アドレス・ベース・レジストリ",
    url: "https://www.digital.go.jp/policies/base_registry_address",
};

impl PresetDataset {
    /// すべてのプリセット
    pub const ALL: [PresetDataset; 7] = [
        PresetDataset::City,
        PresetDataset::Geolonia,
        PresetDataset::Gaiku,
        PresetDataset::Jusho,
        PresetDataset::Chiban,
        PresetDataset::Oaza,
        PresetDataset::BaseRegistry,
    ];

    fn meta(&self) -> &'static PresetMeta {
        use PresetDataset::*;

        match self {
            City => &CITY,
            Geolonia => &GEOLONIA,
            Gaiku => &GAIKU,
            Jusho => &JUSHO,
            Chiban => &CHIBAN,
            Oaza => &OAZA,
            BaseRegistry => &BASE_REGISTRY,
        }
    }

    /// タグを返します。
    pub fn id(&self) -> DatasetId {
        DatasetId(self.meta().id)
    }

    /// 短い名前を返します。
    pub fn name(&self) -> &'static str {
        self.meta().name
    }

    /// 短い名前からプリセットを探します。
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }

    /// メタデータを返します。
    pub fn info(&self) -> DatasetInfo {
        let meta = self.meta();
        DatasetInfo {
            id: DatasetId(meta.id),
            name: meta.name.to_string(),
            priority: meta.priority,
            title: meta.title.to_string(),
            url: meta.url.to_string(),
        }
    }
}

/// データセットから優先度への対応表
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PriorityTable {
    datasets: BTreeMap<DatasetId, DatasetInfo>,
}

impl PriorityTable {
    /// 空の表を作成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// すべてのプリセットを含む表を作成します。
    pub fn presets() -> Self {
        let mut table = Self::new();
        for preset in PresetDataset::ALL {
            table.datasets.insert(preset.id(), preset.info());
        }
        table
    }

    /// データセットを登録します。
    ///
    /// # エラー
    ///
    /// 同じタグまたは同じ名前のデータセットが既に登録されている場合にエラーを返します。
    pub fn insert(&mut self, info: DatasetInfo) -> Result<()> {
        if self.datasets.contains_key(&info.id) {
            return Err(AddrDictError::invalid_argument(
                "info",
                format!("dataset id {} is defined twice", info.id),
            ));
        }
        if self.find_by_name(&info.name).is_some() {
            return Err(AddrDictError::invalid_argument(
                "info",
                format!("dataset name {:?} is defined twice", info.name),
            ));
        }
        self.datasets.insert(info.id, info);
        Ok(())
    }

    /// データセットを取り除きます。
    pub fn remove(&mut self, id: DatasetId) -> Option<DatasetInfo> {
        self.datasets.remove(&id)
    }

    /// データセットの優先度を返します。
    ///
    /// # エラー
    ///
    /// 登録されていない場合は[`AddrDictError::MissingPriority`]を返します。
    pub fn priority(&self, id: DatasetId) -> Result<i8> {
        self.datasets
            .get(&id)
            .map(|d| d.priority)
            .ok_or(AddrDictError::MissingPriority(id.get()))
    }

    pub fn get(&self, id: DatasetId) -> Option<&DatasetInfo> {
        self.datasets.get(&id)
    }

    /// 名前でデータセットを探します。
    pub fn find_by_name(&self, name: &str) -> Option<&DatasetInfo> {
        self.datasets.values().find(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// タグの昇順でデータセットを返します。
    pub fn iter(&self) -> impl Iterator<Item = &DatasetInfo> {
        self.datasets.values()
    }

    /// CSV形式の定義ファイルから表を読み込みます。
    ///
    /// 各行は`id,name,priority[,title[,url]]`です。空行と`#`で始まる行は無視されます。
    ///
    /// # エラー
    ///
    /// 行の形式が不正な場合や、タグ・名前が重複している場合にエラーを返します。
    pub fn from_reader<R>(rdr: R) -> Result<Self>
    where
        R: Read,
    {
        let mut table = Self::new();
        for (i, line) in BufReader::new(rdr).lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cols = parse_csv_row(line)?;
            if cols.len() < 3 || cols.len() > 5 {
                return Err(AddrDictError::invalid_format(
                    "datasets.csv",
                    format!(
                        "line {}: a row must have 3 to 5 columns, got {}",
                        i + 1,
                        cols.len()
                    ),
                ));
            }
            let id = DatasetId(cols[0].trim().parse()?);
            let name = cols[1].trim().to_string();
            if name.is_empty() {
                return Err(AddrDictError::invalid_format(
                    "datasets.csv",
                    format!("line {}: empty dataset name", i + 1),
                ));
            }
            let priority = cols[2].trim().parse()?;
            let title = cols.get(3).map(|s| s.trim().to_string()).unwrap_or_default();
            let url = cols.get(4).map(|s| s.trim().to_string()).unwrap_or_default();
            table.insert(DatasetInfo {
                id,
                name,
                priority,
                title,
                url,
            })?;
        }
        Ok(table)
    }

    /// 表をCSV形式で書き出します。
    ///
    /// [`from_reader`](Self::from_reader)で読み戻せる形式です。
    pub fn write<W>(&self, mut wtr: W) -> Result<()>
    where
        W: Write,
    {
        writeln!(wtr, "# id,name,priority,title,url")?;
        for d in self.iter() {
            write!(wtr, "{},", d.id)?;
            quote_csv_cell(&mut wtr, d.name.as_bytes())?;
            write!(wtr, ",{},", d.priority)?;
            quote_csv_cell(&mut wtr, d.title.as_bytes())?;
            wtr.write_all(b",")?;
            quote_csv_cell(&mut wtr, d.url.as_bytes())?;
            wtr.write_all(b"\n")?;
        }
        Ok(())
    }
}
