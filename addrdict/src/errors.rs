//! エラー型の定義
//!
//! このモジュールは、addrdictライブラリで使用されるすべてのエラー型を定義します。
//! 致命的なエラー([`AddrDictError`])と、スキップして処理を継続できる
//! レコード単位のエラー([`RecordError`])を区別します。

use std::error::Error;
use std::fmt;

/// addrdict専用のResult型
///
/// エラー型としてデフォルトで[`AddrDictError`]を使用します。
pub type Result<T, E = AddrDictError> = std::result::Result<T, E>;

/// addrdictのエラー型
///
/// 辞書の構築を中断させるエラーを表現します。
/// 不正なレコードはこの型ではなく[`RecordError`]として報告され、処理は継続されます。
#[derive(Debug, thiserror::Error)]
pub enum AddrDictError {
    /// 無効な引数エラー
    ///
    /// [`InvalidArgumentError`]のエラーバリアント。
    #[error(transparent)]
    InvalidArgument(InvalidArgumentError),

    /// 無効なフォーマットエラー
    ///
    /// [`InvalidFormatError`]のエラーバリアント。
    #[error(transparent)]
    InvalidFormat(InvalidFormatError),

    /// 無効な状態エラー
    ///
    /// [`InvalidStateError`]のエラーバリアント。
    #[error(transparent)]
    InvalidState(InvalidStateError),

    /// 森構造の不変条件違反
    ///
    /// 確定処理で検出されます。この場合、辞書は出力されません。
    #[error(transparent)]
    Invariant(InvariantError),

    /// 優先度表に登録されていないデータセット
    ///
    /// 取り込みを開始する前に検出されます。
    #[error("No priority is configured for dataset {0}.")]
    MissingPriority(u8),

    /// レコードエラー
    ///
    /// 単一のレコードを取り込む API から直接返される場合に使用されます。
    #[error(transparent)]
    Record(#[from] RecordError),

    /// 整数変換エラー
    #[error(transparent)]
    TryFromInt(std::num::TryFromIntError),

    /// 整数パースエラー
    #[error(transparent)]
    ParseInt(std::num::ParseIntError),

    /// UTF-8エンコーディングエラー
    #[error(transparent)]
    Utf8(std::str::Utf8Error),

    /// 標準I/Oエラー
    #[error(transparent)]
    StdIo(#[from] std::io::Error),

    /// バックグラウンドスレッドパニックエラー
    ///
    /// レコードを読み込むスレッドがパニックした場合に発生します。
    #[error("Background thread panicked: {0}")]
    ThreadPanic(String),

    /// bincodeエンコードエラー
    #[error(transparent)]
    BincodeEncode(#[from] bincode::error::EncodeError),

    /// bincodeデコードエラー
    #[error(transparent)]
    BincodeDecode(#[from] bincode::error::DecodeError),

    /// rkyvシリアライゼーションエラー
    #[error(transparent)]
    RkyvError(#[from] rkyv::rancor::Error),
}

impl AddrDictError {
    /// 無効な引数エラーを生成します
    ///
    /// # 引数
    ///
    /// * `arg` - 引数の名前
    /// * `msg` - エラーメッセージ
    pub(crate) fn invalid_argument<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidArgument(InvalidArgumentError {
            arg,
            msg: msg.into(),
        })
    }

    /// 無効なフォーマットエラーを生成します
    ///
    /// # 引数
    ///
    /// * `arg` - フォーマット名
    /// * `msg` - エラーメッセージ
    pub(crate) fn invalid_format<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidFormat(InvalidFormatError {
            arg,
            msg: msg.into(),
        })
    }

    /// 無効な状態エラーを生成します
    ///
    /// # 引数
    ///
    /// * `msg` - エラーメッセージ
    /// * `cause` - エラーの原因
    pub(crate) fn invalid_state<S, M>(msg: S, cause: M) -> Self
    where
        S: Into<String>,
        M: Into<String>,
    {
        Self::InvalidState(InvalidStateError {
            msg: msg.into(),
            cause: cause.into(),
        })
    }
}

/// 引数が無効な場合に使用されるエラー
#[derive(Debug)]
pub struct InvalidArgumentError {
    /// 引数の名前
    pub(crate) arg: &'static str,

    /// エラーメッセージ
    pub(crate) msg: String,
}

impl fmt::Display for InvalidArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidArgumentError: {}: {}", self.arg, self.msg)
    }
}

impl Error for InvalidArgumentError {}

/// 入力フォーマットが無効な場合に使用されるエラー
#[derive(Debug)]
pub struct InvalidFormatError {
    /// フォーマットの名前
    pub(crate) arg: &'static str,

    /// エラーメッセージ
    pub(crate) msg: String,
}

impl fmt::Display for InvalidFormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidFormatError: {}: {}", self.arg, self.msg)
    }
}

impl Error for InvalidFormatError {}

/// 状態が無効な場合に使用されるエラー
#[derive(Debug)]
pub struct InvalidStateError {
    /// エラーメッセージ
    pub(crate) msg: String,

    /// エラーの根本原因
    pub(crate) cause: String,
}

impl fmt::Display for InvalidStateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidStateError: {}: {}", self.msg, self.cause)
    }
}

impl Error for InvalidStateError {}

/// 森構造の不変条件違反の一覧
///
/// 確定処理で見つかったすべての違反を保持します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError {
    /// 検出された違反
    pub violations: Vec<Violation>,
}

impl InvariantError {
    /// 違反に関係するノードIDを重複なしで昇順に返します。
    pub fn node_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.violations.iter().map(Violation::node_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "InvariantError: {} violation(s) in the address forest",
            self.violations.len()
        )?;
        for v in &self.violations {
            write!(f, "\n  {}", v)?;
        }
        Ok(())
    }
}

impl Error for InvariantError {}

/// 不変条件違反の種類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// 親IDが存在しないノードを指している
    DanglingParent { node: u32, parent: u32 },
    /// レベルが範囲外
    LevelOutOfRange { node: u32, level: i8 },
    /// 親のレベルが`level - 1`ではない
    LevelMismatch { node: u32, level: i8, parent_level: i8 },
    /// 親を持たないノードが最上位レベルではない
    MisplacedRoot { node: u32, level: i8 },
    /// 親をたどると根に到達しない
    Cycle { node: u32 },
    /// IDと格納位置が一致しない
    IdMismatch { position: u32, node: u32 },
    /// 兄弟チェーンが存在しないノードを指している
    DanglingSibling { node: u32, sibling: u32 },
    /// 兄弟チェーンが同じノードを再訪している
    SiblingLoop { parent: u32, node: u32 },
    /// 兄弟チェーンに別の親の子が含まれている
    ForeignSibling { parent: u32, node: u32 },
    /// 兄弟チェーンから到達できない子
    OrphanedChild { parent: u32, node: u32 },
}

impl Violation {
    /// 違反の原因となったノードIDを返します。
    pub fn node_id(&self) -> u32 {
        match *self {
            Self::DanglingParent { node, .. }
            | Self::LevelOutOfRange { node, .. }
            | Self::LevelMismatch { node, .. }
            | Self::MisplacedRoot { node, .. }
            | Self::Cycle { node }
            | Self::IdMismatch { node, .. }
            | Self::DanglingSibling { node, .. }
            | Self::SiblingLoop { node, .. }
            | Self::ForeignSibling { node, .. }
            | Self::OrphanedChild { node, .. } => node,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::DanglingParent { node, parent } => {
                write!(f, "node {}: parent {} does not exist", node, parent)
            }
            Self::LevelOutOfRange { node, level } => {
                write!(f, "node {}: level {} is out of range", node, level)
            }
            Self::LevelMismatch { node, level, parent_level } => write!(
                f,
                "node {}: level {} is not one below its parent's level {}",
                node, level, parent_level
            ),
            Self::MisplacedRoot { node, level } => {
                write!(f, "node {}: root node at level {}", node, level)
            }
            Self::Cycle { node } => write!(f, "node {}: parent chain does not reach a root", node),
            Self::IdMismatch { position, node } => {
                write!(f, "node {}: stored at the position of id {}", node, position)
            }
            Self::DanglingSibling { node, sibling } => {
                write!(f, "node {}: sibling {} does not exist", node, sibling)
            }
            Self::SiblingLoop { parent, node } => write!(
                f,
                "node {}: visited twice in the sibling chain of {}",
                node, parent
            ),
            Self::ForeignSibling { parent, node } => write!(
                f,
                "node {}: found in the sibling chain of {} which is not its parent",
                node, parent
            ),
            Self::OrphanedChild { parent, node } => write!(
                f,
                "node {}: not reachable from the sibling chain of {}",
                node, parent
            ),
        }
    }
}

/// 取り込みをスキップされたレコードのエラー
///
/// このエラーは致命的ではありません。マージエンジンは件数を数えて処理を続行します。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Skipped record{}: {kind}", .line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
pub struct RecordError {
    /// 入力中の行番号(分かる場合)
    pub line: Option<u64>,

    /// エラーの種類
    pub kind: RecordErrorKind,
}

impl RecordError {
    /// 行番号なしでエラーを生成します。
    pub fn new(kind: RecordErrorKind) -> Self {
        Self { line: None, kind }
    }

    /// 行番号を付けたエラーを返します。
    pub fn at_line(mut self, line: u64) -> Self {
        self.line = Some(line);
        self
    }
}

/// 不正なレコードの種類
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordErrorKind {
    /// セグメントが一つもない
    #[error("the record has no segment")]
    Empty,

    /// 最初のセグメントが最上位レベルではない
    #[error("the first segment is at level {0}, not at the top level")]
    NotRooted(i8),

    /// レベルが範囲外
    #[error("level {0} is out of range")]
    LevelOutOfRange(i8),

    /// 親のレベルから一つずつ下がっていない
    #[error("level {level} follows level {parent_level}")]
    LevelGap { parent_level: i8, level: i8 },

    /// セグメント名が空
    #[error("segment at level {0} has an empty name")]
    EmptyName(i8),

    /// 座標が有限の値ではない
    #[error("coordinate ({0}, {1}) is not finite")]
    InvalidCoordinate(f32, f32),

    /// 行の構文が不正
    #[error("malformed line: {0}")]
    Syntax(String),
}

impl From<std::num::TryFromIntError> for AddrDictError {
    fn from(error: std::num::TryFromIntError) -> Self {
        Self::TryFromInt(error)
    }
}

impl From<std::num::ParseIntError> for AddrDictError {
    fn from(error: std::num::ParseIntError) -> Self {
        Self::ParseInt(error)
    }
}

impl From<std::str::Utf8Error> for AddrDictError {
    fn from(error: std::str::Utf8Error) -> Self {
        Self::Utf8(error)
    }
}

impl From<InvariantError> for AddrDictError {
    fn from(error: InvariantError) -> Self {
        Self::Invariant(error)
    }
}
