//! 正規化済み住所レコードとレコードソース
//!
//! 各データセットの固有形式(シェープファイル、固定長テキスト、CSV)は、
//! 外部の変換処理によって[`NormalizedRecord`]の列に変換されます。
//! マージエンジンは[`RecordSource`]トレイトを通じてレコードを受け取ります。
//!
//! このモジュールは、メモリ上のレコード列[`VecSource`]と、
//! 中間テキスト形式を読み込む[`TextRecordReader`]を提供します。

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::errors::{AddrDictError, RecordError, RecordErrorKind, Result};
use crate::level::AddressLevel;
use crate::node::Point;
use crate::utils::parse_csv_row;

/// レコードのパスを構成する一つの住所要素
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Segment {
    /// 階層レベル
    pub level: i8,
    /// 表示用の名前
    pub name: String,
    /// 代表点
    pub point: Option<Point>,
    /// 注記
    pub note: Option<String>,
}

impl Segment {
    pub fn new<S>(level: i8, name: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            level,
            name: name.into(),
            point: None,
            note: None,
        }
    }

    pub fn with_point(mut self, x: f32, y: f32) -> Self {
        self.point = Some(Point::new(x, y));
        self
    }

    pub fn with_note<S>(mut self, note: S) -> Self
    where
        S: Into<String>,
    {
        self.note = Some(note.into());
        self
    }
}

/// 根から葉までの住所要素の並び
#[derive(Clone, Debug, PartialEq, Default)]
pub struct NormalizedRecord {
    pub segments: Vec<Segment>,
}

impl NormalizedRecord {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// 最も深い要素を返します。
    pub fn leaf(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// レコードの構造を検証します。
    ///
    /// # エラー
    ///
    /// 以下の場合に[`RecordError`]を返します。
    ///
    /// - 要素が一つもない
    /// - レベルが範囲外
    /// - 最初の要素が最上位レベルではない
    /// - レベルが親から一つずつ下がっていない
    /// - 名前が空
    /// - 座標が有限の値ではない
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.segments.is_empty() {
            return Err(RecordError::new(RecordErrorKind::Empty));
        }
        let mut parent_level = None;
        for segment in &self.segments {
            if AddressLevel::from_i8(segment.level).is_none() {
                return Err(RecordError::new(RecordErrorKind::LevelOutOfRange(
                    segment.level,
                )));
            }
            match parent_level {
                None if segment.level != AddressLevel::MIN => {
                    return Err(RecordError::new(RecordErrorKind::NotRooted(segment.level)));
                }
                Some(parent_level) if segment.level != parent_level + 1 => {
                    return Err(RecordError::new(RecordErrorKind::LevelGap {
                        parent_level,
                        level: segment.level,
                    }));
                }
                _ => {}
            }
            if segment.name.trim().is_empty() {
                return Err(RecordError::new(RecordErrorKind::EmptyName(segment.level)));
            }
            if let Some(p) = segment.point
                && !p.is_finite()
            {
                return Err(RecordError::new(RecordErrorKind::InvalidCoordinate(
                    p.x, p.y,
                )));
            }
            parent_level = Some(segment.level);
        }
        Ok(())
    }
}

/// 正規化済みレコードの有限で再開可能な列
///
/// `next_record`が[`AddrDictError::Record`]を返した場合、そのレコードだけがスキップされ、
/// 読み込みは続行されます。それ以外のエラーは致命的です。
pub trait RecordSource {
    /// 次のレコードを返します。終端では`None`を返します。
    fn next_record(&mut self) -> Option<Result<NormalizedRecord>>;

    /// 列を先頭に巻き戻します。
    fn rewind(&mut self) -> Result<()>;
}

impl<S> RecordSource for &mut S
where
    S: RecordSource + ?Sized,
{
    fn next_record(&mut self) -> Option<Result<NormalizedRecord>> {
        (**self).next_record()
    }

    fn rewind(&mut self) -> Result<()> {
        (**self).rewind()
    }
}

impl<S> RecordSource for Box<S>
where
    S: RecordSource + ?Sized,
{
    fn next_record(&mut self) -> Option<Result<NormalizedRecord>> {
        (**self).next_record()
    }

    fn rewind(&mut self) -> Result<()> {
        (**self).rewind()
    }
}

/// メモリ上のレコード列
#[derive(Clone, Debug, Default)]
pub struct VecSource {
    records: Vec<NormalizedRecord>,
    pos: usize,
}

impl VecSource {
    pub fn new(records: Vec<NormalizedRecord>) -> Self {
        Self { records, pos: 0 }
    }
}

impl From<Vec<NormalizedRecord>> for VecSource {
    fn from(records: Vec<NormalizedRecord>) -> Self {
        Self::new(records)
    }
}

impl RecordSource for VecSource {
    fn next_record(&mut self) -> Option<Result<NormalizedRecord>> {
        let record = self.records.get(self.pos)?.clone();
        self.pos += 1;
        Some(Ok(record))
    }

    fn rewind(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}

/// 中間テキスト形式のレコードを読み込むリーダー
///
/// 1行が1レコードで、形式は以下の通りです。
///
/// ```text
/// 1;東京都,2;千代田区,3;丸の内,!01,139.76,35.68,zip:1000005
/// ```
///
/// - `L;name`の並びがパスです(`L`はレベル)。
/// - `!PP`は元データ上の優先度で、読み飛ばされます。優先度は設定から与えられます。
/// - 続く2列が経度と緯度です。両方とも空、または省略された場合は座標なしです。
/// - 残りの列は注記として葉の要素に付与されます。
///
/// 空行と`#`で始まる行は無視されます。
pub struct TextRecordReader<R> {
    rdr: R,
    line_no: u64,
    buf: Vec<u8>,
}

impl TextRecordReader<BufReader<File>> {
    /// ファイルを開きます。
    ///
    /// # エラー
    ///
    /// ファイルを開けない場合にエラーを返します。
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            AddrDictError::invalid_argument(
                "path",
                format!("Failed to open {}: {}", path.display(), e),
            )
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R> TextRecordReader<R>
where
    R: BufRead + Seek,
{
    pub fn new(rdr: R) -> Self {
        Self {
            rdr,
            line_no: 0,
            buf: vec![],
        }
    }

    /// 直前に読み込んだ行の番号(1始まり)
    pub fn line_no(&self) -> u64 {
        self.line_no
    }
}

impl<R> RecordSource for TextRecordReader<R>
where
    R: BufRead + Seek,
{
    fn next_record(&mut self) -> Option<Result<NormalizedRecord>> {
        loop {
            self.buf.clear();
            match self.rdr.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.line_no += 1;

            let Ok(line) = std::str::from_utf8(&self.buf) else {
                let e = RecordError::new(RecordErrorKind::Syntax("invalid UTF-8".to_string()))
                    .at_line(self.line_no);
                return Some(Err(e.into()));
            };
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            let record = parse_line(line)
                .map_err(RecordError::new)
                .and_then(|record| record.validate().map(|_| record))
                .map_err(|e| e.at_line(self.line_no).into());
            return Some(record);
        }
    }

    fn rewind(&mut self) -> Result<()> {
        self.rdr.seek(SeekFrom::Start(0))?;
        self.line_no = 0;
        Ok(())
    }
}

/// 1行を解析します。
pub fn parse_line(line: &str) -> Result<NormalizedRecord, RecordErrorKind> {
    let cols = parse_csv_row(line).map_err(|e| RecordErrorKind::Syntax(e.to_string()))?;
    let mut cols = cols.into_iter().peekable();

    let mut segments = vec![];
    while let Some(col) = cols.peek() {
        let Some((level, name)) = col.split_once(';') else {
            break;
        };
        let Ok(level) = level.trim().parse::<i8>() else {
            break;
        };
        segments.push(Segment::new(level, name.trim()));
        cols.next();
    }
    if segments.is_empty() {
        return Err(RecordErrorKind::Syntax(
            "a line must start with a `level;name` column".to_string(),
        ));
    }

    if cols.peek().is_some_and(|c| c.starts_with('!')) {
        cols.next();
    }

    let point = match (cols.next(), cols.next()) {
        (None, _) => None,
        (Some(_), None) => {
            return Err(RecordErrorKind::Syntax(
                "longitude without latitude".to_string(),
            ));
        }
        (Some(x), Some(y)) if x.trim().is_empty() && y.trim().is_empty() => None,
        (Some(x), Some(y)) => {
            let x = parse_coordinate(&x)?;
            let y = parse_coordinate(&y)?;
            Some(Point::new(x, y))
        }
    };

    let note = cols.collect::<Vec<_>>().join(",");

    // 座標と注記は葉の要素に付与する
    if let Some(leaf) = segments.last_mut() {
        leaf.point = point;
        if !note.is_empty() {
            leaf.note = Some(note);
        }
    }
    Ok(NormalizedRecord { segments })
}

fn parse_coordinate(s: &str) -> Result<f32, RecordErrorKind> {
    s.trim()
        .parse()
        .map_err(|_| RecordErrorKind::Syntax(format!("invalid coordinate: {:?}", s)))
}
