//! 住所辞書のダンプモジュール
//!
//! ビルドした辞書ファイルを読み込み、ノードをタブ区切りのテキストで出力します。
//! ノード列(`address_nodes.bin`)とノード表(`address_nodes.table`)のどちらも
//! 先頭のマジックバイトで判別して読み込みます。

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use addrdict::errors::AddrDictError;
use addrdict::node::NULL_ID;
use addrdict::serializer::{self, NODES_MAGIC};
use addrdict::table::TABLE_MAGIC;
use addrdict::utils::FromU32;
use addrdict::{AddressDictionary, AddressNode, NodeTable};
use clap::Parser;

/// ダンプコマンドの引数
#[derive(Parser, Debug)]
#[clap(name = "dump", about = "A program to print the nodes of a built dictionary.")]
pub struct Args {
    /// Dictionary file (`address_nodes.bin` or `address_nodes.table`).
    #[clap(short = 'i', long)]
    input: PathBuf,

    /// Print the nodes depth-first along the sibling chains instead of in id order.
    #[clap(long)]
    tree: bool,

    /// Validate the forest structure before printing (node files only).
    #[clap(long)]
    validate: bool,
}

/// ダンプ処理中に発生する可能性のあるエラー
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    /// 辞書ファイルではない
    #[error("Unknown file format: {0}")]
    UnknownFormat(PathBuf),

    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 辞書読み込みエラー
    #[error("Failed to read the dictionary: {0}")]
    AddrDict(#[from] AddrDictError),
}

fn detect_table(args: &Args) -> Result<bool, DumpError> {
    let mut head = vec![0; NODES_MAGIC.len().max(TABLE_MAGIC.len())];
    let mut file = File::open(&args.input)?;
    let mut len = 0;
    while len < head.len() {
        let n = file.read(&mut head[len..])?;
        if n == 0 {
            break;
        }
        len += n;
    }
    let head = &head[..len];
    if head.starts_with(TABLE_MAGIC) {
        Ok(true)
    } else if head.starts_with(NODES_MAGIC) {
        Ok(false)
    } else {
        Err(DumpError::UnknownFormat(args.input.clone()))
    }
}

/// ID順のノード列から根までの名前をたどります。
fn node_path(nodes: &[AddressNode], id: u32) -> Vec<&str> {
    let mut names = vec![];
    let mut next = id;
    while next != NULL_ID && names.len() < nodes.len() {
        let Some(node) = nodes.get(usize::from_u32(next - 1)) else {
            break;
        };
        names.push(node.name.as_str());
        next = node.parent_id;
    }
    names.reverse();
    names
}

fn write_line<W>(wtr: &mut W, node: &AddressNode, path: &[&str]) -> io::Result<()>
where
    W: Write,
{
    let point = node
        .point
        .map_or_else(String::new, |p| format!("{},{}", p.x, p.y));
    writeln!(wtr, "{}\t{}\t{}\t{}", node.id, path.join(" "), point, node.note)
}

fn dump_table<W>(wtr: &mut W, table: &NodeTable, tree: bool) -> io::Result<()>
where
    W: Write,
{
    if !tree {
        for entry in table.iter() {
            write_line(wtr, &entry.to_node(), &table.path(entry.id()))?;
        }
        return Ok(());
    }
    let mut stack: Vec<_> = table.children(NULL_ID).collect();
    stack.reverse();
    while let Some(entry) = stack.pop() {
        write_line(wtr, &entry.to_node(), &table.path(entry.id()))?;
        let len = stack.len();
        stack.extend(table.children(entry.id()));
        stack[len..].reverse();
    }
    Ok(())
}

/// ダンプコマンドを実行する
///
/// # エラー
///
/// ファイルの形式が不明な場合や、読み込みに失敗した場合にエラーを返します。
pub fn run(args: Args) -> Result<(), DumpError> {
    let is_table = detect_table(&args)?;
    let stdout = io::stdout();
    let mut wtr = BufWriter::new(stdout.lock());

    if is_table {
        let table = NodeTable::from_path(&args.input)?;
        dump_table(&mut wtr, &table, args.tree)?;
    } else {
        let rdr = BufReader::new(File::open(&args.input)?);
        let nodes = if args.validate {
            AddressDictionary::read(rdr)?.nodes().to_vec()
        } else {
            serializer::read_nodes(rdr)?
        };
        if args.tree {
            let table = NodeTable::read(table_bytes(&nodes)?.as_slice())?;
            dump_table(&mut wtr, &table, true)?;
        } else {
            for node in &nodes {
                write_line(&mut wtr, node, &node_path(&nodes, node.id))?;
            }
        }
    }
    wtr.flush()?;
    Ok(())
}

fn table_bytes(nodes: &[AddressNode]) -> Result<Vec<u8>, DumpError> {
    let mut buf = vec![];
    addrdict::table::NodeTableData::from_nodes(nodes)?.write(&mut buf)?;
    Ok(buf)
}
