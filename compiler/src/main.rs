//! 住所辞書コンパイラのメインエントリーポイント
//!
//! データセットごとの中間テキストファイルから住所辞書を構築するサブコマンドと、
//! 構築した辞書の内容を確認するサブコマンドを提供します。

mod build;
mod dump;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::{build::BuildError, dump::DumpError};

/// コマンドライン引数の構造体
#[derive(Parser, Debug)]
#[clap(name = "compile", version)]
struct Cli {
    /// 実行するサブコマンド
    #[clap(subcommand)]
    command: Command,
}

/// 利用可能なサブコマンド
#[derive(Parser, Debug)]
enum Command {
    /// 中間テキストファイルから住所辞書を構築します
    ///
    /// データセットを優先度順に取り込み、ノード列、ノード表、データセット一覧を出力します。
    Build(build::Args),

    /// 構築した辞書のノードを出力します
    Dump(dump::Args),
}

/// コンパイラの実行中に発生する可能性のあるエラー
///
/// 各サブコマンドで発生したエラーをラップします。
#[derive(Debug, Error)]
pub enum CompileError {
    /// 辞書ビルド中のエラー
    #[error(transparent)]
    BuildError(#[from] BuildError),
    /// ダンプ中のエラー
    #[error(transparent)]
    DumpError(#[from] DumpError),
}

/// メイン関数
///
/// ログ出力を初期化し、指定されたサブコマンドを実行します。
/// ログレベルは`RUST_LOG`環境変数で指定でき、既定値は`info`です。
fn main() -> Result<(), CompileError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Build(args) => Ok(build::run(args)?),
        Command::Dump(args) => Ok(dump::run(args)?),
    }
}
