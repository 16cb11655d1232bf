//! ユーティリティ関数と型変換トレイトを提供するモジュール
//!
//! 主に以下の機能を提供します：
//!
//! - `FromU32`: u32からの型変換トレイト
//! - CSV行の解析と引用符処理

use std::io::Write;

use csv_core::ReadFieldResult;

use crate::errors::{AddrDictError, Result};

/// u32から他の型への変換を提供するトレイト
///
/// 標準ライブラリのFromトレイトとは異なり、
/// プラットフォーム固有の仮定を行うことができます。
pub trait FromU32 {
    /// u32値から実装型を生成する
    fn from_u32(src: u32) -> Self;
}

#[cfg(any(target_pointer_width = "32", target_pointer_width = "64"))]
impl FromU32 for usize {
    #[inline(always)]
    fn from_u32(src: u32) -> Self {
        // Since the pointer width is guaranteed to be 32 or 64,
        // the following process always succeeds.
        unsafe { Self::try_from(src).unwrap_unchecked() }
    }
}

/// CSVセルのデータを適切に引用符で囲んで書き出す
///
/// 必要に応じてダブルクォートやエスケープ処理を自動的に行います。
///
/// # 引数
///
/// * `wtr` - 書き込み先のWriterオブジェクト
/// * `data` - CSVセルとして書き込むバイト列
pub fn quote_csv_cell<W>(mut wtr: W, mut data: &[u8]) -> std::io::Result<()>
where
    W: Write,
{
    let mut output = [0; 4096];
    let mut writer = csv_core::Writer::new();
    loop {
        let (result, nin, nout) = writer.field(data, &mut output);
        wtr.write_all(&output[..nout])?;
        if result == csv_core::WriteResult::InputEmpty {
            break;
        }
        data = &data[nin..];
    }
    let (result, nout) = writer.finish(&mut output);
    if result != csv_core::WriteResult::InputEmpty {
        return Err(std::io::Error::other("unterminated CSV cell"));
    }
    wtr.write_all(&output[..nout])?;
    Ok(())
}

/// CSV形式の行を解析してフィールドのベクターに分割する
///
/// ダブルクォートで囲まれたフィールドや、フィールド内のカンマも正しく処理します。
///
/// # エラー
///
/// 一つのフィールドが4096バイトを超える場合にエラーを返します。
///
/// # 例
///
/// ```
/// # use addrdict::utils::parse_csv_row;
/// let fields = parse_csv_row("1;東京都,2;千代田区").unwrap();
/// assert_eq!(fields, vec!["1;東京都", "2;千代田区"]);
///
/// let fields_with_quote = parse_csv_row("\"3;丸の内,一丁目\",139.76").unwrap();
/// assert_eq!(fields_with_quote, vec!["3;丸の内,一丁目", "139.76"]);
/// ```
pub fn parse_csv_row(row: &str) -> Result<Vec<String>> {
    let mut fields = vec![];
    let mut rdr = csv_core::Reader::new();
    let mut bytes = row.as_bytes();
    let mut output = [0; 4096];
    loop {
        let (result, nin, nout) = rdr.read_field(bytes, &mut output);
        let end = match result {
            ReadFieldResult::InputEmpty => true,
            ReadFieldResult::Field { .. } => false,
            ReadFieldResult::End => true,
            ReadFieldResult::OutputFull => {
                return Err(AddrDictError::invalid_format("csv", "Field too large"));
            }
        };
        fields.push(std::str::from_utf8(&output[..nout])?.to_string());
        if end {
            break;
        }
        bytes = &bytes[nin..];
    }
    Ok(fields)
}
