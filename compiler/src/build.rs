//! 住所辞書のビルドモジュール
//!
//! データセットごとの中間テキストファイルから住所辞書を構築し、
//! ノード列、ノード表、データセット一覧を出力ディレクトリに書き出します。

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use addrdict::dataset::DatasetInfo;
use addrdict::errors::AddrDictError;
use addrdict::{DictionaryBuilder, PriorityTable, TextRecordReader};
use clap::Parser;
use walkdir::WalkDir;

/// ノード列の出力ファイル名
pub const NODES_FILE: &str = "address_nodes.bin";

/// ノード表の出力ファイル名
pub const TABLE_FILE: &str = "address_nodes.table";

/// データセット一覧の出力ファイル名
pub const DATASETS_FILE: &str = "datasets.csv";

/// 中間テキストファイルの拡張子
const TEXT_EXTENSION: &str = "txt";

/// 都道府県コードの範囲
const PREF_MIN: u8 = 1;
const PREF_MAX: u8 = 47;

/// ビルドコマンドの引数
#[derive(Parser, Debug)]
#[clap(name = "build", about = "A program to build the address dictionary.")]
pub struct Args {
    /// Input in the form `<DATASET>=<PATH>`.
    ///
    /// DATASET is a dataset name (e.g. `city`, `gaiku`). PATH is a text file
    /// or a directory whose `*.txt` files are read in name order.
    #[clap(short = 'i', long = "input", value_parser = parse_input, required = true)]
    inputs: Vec<(String, PathBuf)>,

    /// Dataset definition file (`id,name,priority[,title[,url]]`).
    ///
    /// If this argument is not specified, the preset datasets are used.
    #[clap(short = 'd', long)]
    datasets: Option<PathBuf>,

    /// Dataset names to leave out of the dictionary.
    #[clap(short = 'x', long)]
    exclude: Vec<String>,

    /// Prefecture codes (1 to 47) to include.
    ///
    /// Only input files named `<CODE>_*.txt` (e.g. `13_city.txt`) are read.
    /// If this argument is not specified, all input files are read.
    #[clap(short = 'p', long = "pref", value_parser = parse_pref)]
    prefs: Vec<String>,

    /// Directory to which the dictionary files are output.
    #[clap(short = 'o', long)]
    out_dir: PathBuf,

    /// Decode input files on a separate thread while merging.
    #[clap(long)]
    pipelined: bool,
}

/// ビルド処理中に発生する可能性のあるエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// 優先度表にないデータセット名
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    /// 入力ファイルが見つからない
    #[error("No input file found in {0}")]
    NoInput(PathBuf),

    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// ディレクトリ走査エラー
    #[error("Failed to walk input directory: {0}")]
    Walk(#[from] walkdir::Error),

    /// 辞書構築エラー
    #[error("Dictionary building failed: {0}")]
    AddrDict(#[from] AddrDictError),
}

fn parse_input(s: &str) -> Result<(String, PathBuf), String> {
    let (name, path) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <DATASET>=<PATH>, got {:?}", s))?;
    if name.is_empty() || path.is_empty() {
        return Err(format!("expected <DATASET>=<PATH>, got {:?}", s));
    }
    Ok((name.to_string(), PathBuf::from(path)))
}

/// 都道府県コードを2桁の文字列に正規化します。
fn parse_pref(s: &str) -> Result<String, String> {
    match s.parse::<u8>() {
        Ok(code @ PREF_MIN..=PREF_MAX) => Ok(format!("{:02}", code)),
        _ => Err(format!(
            "expected a prefecture code from {} to {}, got {:?}",
            PREF_MIN, PREF_MAX, s
        )),
    }
}

/// ファイル名が指定された都道府県のものかどうか
///
/// `prefs`が空の場合はすべてのファイルが対象になります。
fn matches_pref(path: &Path, prefs: &[String]) -> bool {
    if prefs.is_empty() {
        return true;
    }
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    prefs.iter().any(|code| {
        name.strip_prefix(code.as_str())
            .is_some_and(|rest| rest.starts_with('_'))
    })
}

/// 優先度表を読み込み、除外するデータセットを取り除きます。
fn load_priorities(args: &Args) -> Result<PriorityTable, BuildError> {
    let mut priorities = match &args.datasets {
        Some(path) => PriorityTable::from_reader(File::open(path)?)?,
        None => PriorityTable::presets(),
    };
    for name in &args.exclude {
        let info = priorities
            .find_by_name(name)
            .ok_or_else(|| BuildError::UnknownDataset(name.clone()))?;
        let id = info.id;
        priorities.remove(id);
    }
    Ok(priorities)
}

/// 入力パスに含まれるテキストファイルを名前順に返します。
///
/// 都道府県が指定されている場合は、そのコードで始まるファイルだけを返します。
fn collect_files(path: &Path, prefs: &[String]) -> Result<Vec<PathBuf>, BuildError> {
    if path.is_file() {
        if matches_pref(path, prefs) {
            return Ok(vec![path.to_path_buf()]);
        }
        return Ok(vec![]);
    }
    let mut files = vec![];
    let mut found = false;
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|e| e == TEXT_EXTENSION)
        {
            found = true;
            if matches_pref(entry.path(), prefs) {
                files.push(entry.into_path());
            }
        }
    }
    if !found {
        return Err(BuildError::NoInput(path.to_path_buf()));
    }
    Ok(files)
}

/// ビルドコマンドを実行する
///
/// # エラー
///
/// 入力の読み込み、辞書の構築、出力の書き込みに失敗した場合にエラーを返します。
/// 不正なレコードはスキップされ、エラーにはなりません。
pub fn run(args: Args) -> Result<(), BuildError> {
    let priorities = load_priorities(&args)?;

    let mut builder = DictionaryBuilder::new(priorities.clone());
    builder.pipelined(args.pipelined);
    for (name, path) in &args.inputs {
        if args.exclude.contains(name) {
            println!("Skipping excluded dataset {}", name);
            continue;
        }
        let info: &DatasetInfo = match priorities.find_by_name(name) {
            Some(info) => info,
            None => return Err(BuildError::UnknownDataset(name.clone())),
        };
        let files = collect_files(path, &args.prefs)?;
        if files.is_empty() {
            println!("No file for the selected prefectures in {}", path.display());
        }
        for file in files {
            println!("Adding {} as dataset {}", file.display(), info.name);
            builder.add_source(info.id, TextRecordReader::open(&file)?);
        }
    }

    println!("Building the address dictionary...");
    let dict = match builder.build() {
        Ok(dict) => dict,
        Err(AddrDictError::Invariant(e)) => {
            eprintln!("{}", e);
            eprintln!("Offending node ids: {:?}", e.node_ids());
            return Err(AddrDictError::Invariant(e).into());
        }
        Err(e) => return Err(e.into()),
    };

    fs::create_dir_all(&args.out_dir)?;

    let nodes_path = args.out_dir.join(NODES_FILE);
    println!("Writing {}...", nodes_path.display());
    let mut wtr = BufWriter::new(File::create(&nodes_path)?);
    dict.write(&mut wtr)?;
    wtr.flush()?;

    let table_path = args.out_dir.join(TABLE_FILE);
    println!("Writing {}...", table_path.display());
    let mut wtr = BufWriter::new(File::create(&table_path)?);
    dict.write_table(&mut wtr)?;
    wtr.flush()?;

    let datasets_path = args.out_dir.join(DATASETS_FILE);
    let mut wtr = BufWriter::new(File::create(&datasets_path)?);
    dict.write_datasets(&mut wtr)?;
    wtr.flush()?;

    if let Some(report) = dict.report() {
        for source in &report.sources {
            let name = dict
                .priorities()
                .get(source.dataset)
                .map_or_else(|| source.dataset.to_string(), |d| d.name.clone());
            println!(
                "  {}: {} records, {} skipped",
                name, source.stats.ingested, source.stats.skipped
            );
        }
        println!("Skipped records: {}", report.skipped());
    }
    println!(
        "Successfully built {} nodes to {}",
        dict.nodes().len(),
        args.out_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use addrdict::serializer::read_nodes;
    use addrdict::NodeTable;

    fn args(inputs: Vec<(String, PathBuf)>, out_dir: PathBuf) -> Args {
        Args {
            inputs,
            datasets: None,
            exclude: vec![],
            prefs: vec![],
            out_dir,
            pipelined: false,
        }
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(
            parse_input("city=data/city.txt").unwrap(),
            ("city".to_string(), PathBuf::from("data/city.txt"))
        );
        assert!(parse_input("city").is_err());
        assert!(parse_input("=x").is_err());
    }

    #[test]
    fn test_run() {
        let dir = tempfile::tempdir().unwrap();
        let city_dir = dir.path().join("city");
        fs::create_dir(&city_dir).unwrap();
        fs::write(
            city_dir.join("13.txt"),
            "1;東京都,2;千代田区,3;丸の内,139.76,35.68\n2;千代田区\n",
        )
        .unwrap();
        fs::write(city_dir.join("README"), "ignored").unwrap();
        let oaza = dir.path().join("oaza.txt");
        fs::write(&oaza, "1;東京都,2;千代田区,3;丸ノ内,,,zip:1000005\n").unwrap();

        let out_dir = dir.path().join("out");
        run(args(
            vec![("oaza".to_string(), oaza), ("city".to_string(), city_dir)],
            out_dir.clone(),
        ))
        .unwrap();

        let nodes = read_nodes(File::open(out_dir.join(NODES_FILE)).unwrap()).unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[2].name, "丸の内");
        assert_eq!(nodes[2].note, "zip:1000005");
        assert_eq!(nodes[2].dataset, 1);

        let table = NodeTable::from_path(out_dir.join(TABLE_FILE)).unwrap();
        assert_eq!(table.to_nodes(), nodes);

        let datasets = PriorityTable::from_reader(File::open(out_dir.join(DATASETS_FILE)).unwrap())
            .unwrap();
        assert_eq!(datasets, PriorityTable::presets());
    }

    #[test]
    fn test_unknown_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.txt");
        fs::write(&file, "1;東京都\n").unwrap();
        let result = run(args(vec![("nosuch".to_string(), file)], dir.path().join("out")));
        assert!(matches!(result, Err(BuildError::UnknownDataset(_))));
    }

    #[test]
    fn test_exclude() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.txt");
        fs::write(&file, "1;東京都\n").unwrap();
        let out_dir = dir.path().join("out");
        let mut a = args(
            vec![("city".to_string(), file.clone()), ("gaiku".to_string(), file)],
            out_dir.clone(),
        );
        a.exclude = vec!["gaiku".to_string()];
        run(a).unwrap();

        let datasets = PriorityTable::from_reader(File::open(out_dir.join(DATASETS_FILE)).unwrap())
            .unwrap();
        assert!(datasets.find_by_name("gaiku").is_none());
        assert_eq!(datasets.len(), 6);
    }

    #[test]
    fn test_parse_pref() {
        assert_eq!(parse_pref("13").unwrap(), "13");
        assert_eq!(parse_pref("1").unwrap(), "01");
        assert_eq!(parse_pref("47").unwrap(), "47");
        assert!(parse_pref("0").is_err());
        assert!(parse_pref("48").is_err());
        assert!(parse_pref("tokyo").is_err());
    }

    #[test]
    fn test_pref_filter() {
        let dir = tempfile::tempdir().unwrap();
        let city_dir = dir.path().join("city");
        fs::create_dir(&city_dir).unwrap();
        fs::write(city_dir.join("01_city.txt"), "1;北海道,2;札幌市\n").unwrap();
        fs::write(city_dir.join("13_city.txt"), "1;東京都,2;千代田区\n").unwrap();
        fs::write(city_dir.join("130_city.txt"), "1;大阪府\n").unwrap();
        let oaza = dir.path().join("27_oaza.txt");
        fs::write(&oaza, "1;大阪府,2;大阪市\n").unwrap();

        let out_dir = dir.path().join("out");
        let mut a = args(
            vec![("city".to_string(), city_dir), ("oaza".to_string(), oaza)],
            out_dir.clone(),
        );
        a.prefs = vec![parse_pref("13").unwrap()];
        run(a).unwrap();

        let nodes = read_nodes(File::open(out_dir.join(NODES_FILE)).unwrap()).unwrap();
        let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["東京都", "千代田区"]);
    }
}
