//! # addrdict
//!
//! 複数の住所データセットを統合し、階層的な住所辞書を構築するライブラリです。
//!
//! ## 概要
//!
//! 都道府県から建物表示番号までの住所要素を、データセットごとに正規化されたレコードとして受け取り、
//! 重複を取り除いて一つの森(各ノードがただ一つの親を持つ木の集まり)にまとめます。
//! 同じ要素について複数のデータセットが異なる値を持つ場合は、データセットの優先度で解決します。
//!
//! 確定した森は固定スキーマのバイナリ形式で出力され、検索エンジンから読み込まれます。
//!
//! ## 主な機能
//!
//! - **ノードレジストリ**: `(親, レベル, 正規化名)`をキーとするノードの一意化とIDの割り当て
//! - **マージエンジン**: 優先度による属性の競合解決、座標の補完、注記の追記
//! - **森の検証**: 循環、存在しない親、壊れた兄弟チェーンの検出
//! - **バイナリ形式**: ノード列の読み書きと、メモリマップ可能なノード表
//!
//! ## 使用例
//!
//! ```
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use addrdict::{DictionaryBuilder, NormalizedRecord, PriorityTable, Segment, VecSource};
//! use addrdict::dataset::PresetDataset;
//!
//! let city = VecSource::new(vec![NormalizedRecord::new(vec![
//!     Segment::new(1, "東京都"),
//!     Segment::new(2, "千代田区"),
//!     Segment::new(3, "丸の内").with_point(139.76, 35.68),
//! ])]);
//! let oaza = VecSource::new(vec![NormalizedRecord::new(vec![
//!     Segment::new(1, "東京都"),
//!     Segment::new(2, "千代田区"),
//!     Segment::new(3, "丸ノ内").with_note("zip:1000005"),
//! ])]);
//!
//! let mut builder = DictionaryBuilder::new(PriorityTable::presets());
//! builder
//!     .add_source(PresetDataset::Oaza.id(), oaza)
//!     .add_source(PresetDataset::City.id(), city);
//! let dict = builder.build()?;
//!
//! assert_eq!(dict.nodes().len(), 3);
//! let marunouchi = &dict.nodes()[2];
//! assert_eq!(marunouchi.name, "丸の内");
//! assert_eq!(marunouchi.dataset, PresetDataset::City.id().get());
//! assert_eq!(marunouchi.note, "zip:1000005");
//!
//! let mut buf = vec![];
//! dict.write(&mut buf)?;
//! let nodes = addrdict::serializer::read_nodes(buf.as_slice())?;
//! assert_eq!(nodes, dict.nodes());
//! # Ok(())
//! # }
//! ```

#[cfg(not(any(target_pointer_width = "32", target_pointer_width = "64")))]
compile_error!("`target_pointer_width` must be 32 or 64");

/// データセットと優先度表
pub mod dataset;

/// 辞書の構築
pub mod dictionary;

/// エラー型の定義
pub mod errors;

/// 森構造の確定と検証
pub mod index;

/// 住所要素の階層レベル
pub mod level;

/// マージエンジン
pub mod merge;

/// 住所ノード
pub mod node;

/// 検索用の名前の正規化
pub mod normalize;

/// 正規化済みレコードとレコードソース
pub mod record;

/// ノードレジストリ
pub mod registry;

/// ノード列のバイナリ形式
pub mod serializer;

/// メモリマップ可能なノード表
pub mod table;

/// 内部ユーティリティ関数
pub mod utils;


// Re-exports
pub use dataset::{DatasetId, PriorityTable};
pub use dictionary::{AddressDictionary, BuildReport, DictionaryBuilder};
pub use node::{AddressNode, NodeId, Point};
pub use record::{NormalizedRecord, RecordSource, Segment, TextRecordReader, VecSource};
pub use registry::Registry;
pub use table::NodeTable;

/// このライブラリのバージョン番号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
