use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use flatsift::external_sort::sort_file_async;
use flatsift::keys::column_extractor;
use flatsift::merge_purge::merge_purge_async;
use flatsift::utils::{format_duration, setup_logging, Verbosity};
use flatsift::{
    DataTransport, ExternalSortProcessor, FileFormat, FileSource, KeyDefinition, KeyDefinitionSet,
    KeyType, MergePurgeAction, MergePurgeEngine, MergePurgeMode, MergePurgeParam, SortConfig,
    SortDirection,
};

#[derive(Parser)]
#[command(name = "flatsift")]
#[command(about = "Sort large delimited or fixed-width files and reconcile them against a master file")]
#[command(version)]
struct Cli {
    #[arg(short, long, global = true, help = "Verbose output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Only report errors")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sort a file by one or more key columns
    Sort(SortArgs),
    /// Classify detail records against a master file
    MergePurge(MergePurgeArgs),
}

#[derive(Args)]
struct CommonArgs {
    #[arg(short, long, help = "Sort configuration file (JSON)")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Folder for output files (defaults to the input folder)")]
    output_dir: Option<PathBuf>,

    #[arg(long, help = "Folder for the staging store (defaults to the output folder)")]
    temp_dir: Option<PathBuf>,

    #[arg(short, long, default_value = ",", help = "Field delimiter")]
    delimiter: String,

    #[arg(long, help = "Input files have no header line")]
    no_header: bool,

    #[arg(long, help = "Records per staging batch")]
    batch_size: Option<usize>,
}

#[derive(Args)]
struct SortArgs {
    #[arg(short, long, help = "File to sort")]
    input: PathBuf,

    #[arg(
        short,
        long = "key",
        required = true,
        help = "Key as column:type[:asc|desc][:u], type is n (numeric) or t (text); repeat for composite keys"
    )]
    keys: Vec<String>,

    #[arg(long, value_delimiter = ',', help = "Fixed column widths, e.g. 5,10,2")]
    widths: Vec<usize>,

    #[arg(long, help = "Write duplicates to a separate file")]
    duplicates: bool,

    #[arg(long, help = "Also stream sorted lines to stdout")]
    stream: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct MergePurgeArgs {
    #[arg(long, help = "Master file")]
    master: PathBuf,

    #[arg(long, help = "Detail file")]
    detail: PathBuf,

    #[arg(long = "master-key", required = true, help = "Master key, same syntax as sort --key")]
    master_keys: Vec<String>,

    #[arg(
        long = "detail-column",
        required = true,
        value_delimiter = ',',
        help = "Detail columns holding the leading master key values"
    )]
    detail_columns: Vec<usize>,

    #[arg(long, value_delimiter = ',', help = "Fixed column widths of the master file")]
    master_widths: Vec<usize>,

    #[arg(long, value_delimiter = ',', help = "Fixed column widths of the detail file")]
    detail_widths: Vec<usize>,

    #[arg(long, help = "Apply changes to the master instead of only reporting them")]
    active: bool,

    #[command(flatten)]
    common: CommonArgs,
}

/// A parsed `column:type[:dir][:u]` key argument.
struct ColumnKey {
    column: usize,
    definition: KeyDefinition,
}

fn parse_key(arg: &str) -> Result<ColumnKey> {
    let parts: Vec<&str> = arg.split(':').collect();
    if parts.len() < 2 {
        bail!("Key '{}' must look like column:type[:asc|desc][:u]", arg);
    }
    let column = parts[0]
        .parse::<usize>()
        .with_context(|| format!("Invalid key column in '{}'", arg))?;
    let data_type = match parts[1] {
        "n" | "num" | "numeric" => KeyType::Numeric,
        "t" | "text" => KeyType::Text,
        other => bail!("Unknown key type '{}' in '{}'", other, arg),
    };
    let mut definition = KeyDefinition::new(data_type, SortDirection::Ascending);
    for flag in &parts[2..] {
        match *flag {
            "asc" => definition.direction = SortDirection::Ascending,
            "desc" => definition.direction = SortDirection::Descending,
            "u" | "unique" => definition.is_unique = true,
            other => bail!("Unknown key option '{}' in '{}'", other, arg),
        }
    }
    Ok(ColumnKey { column, definition })
}

fn parse_keys(specs: &[String]) -> Result<(KeyDefinitionSet, Vec<(usize, KeyType)>)> {
    let parsed = specs.iter().map(|s| parse_key(s)).collect::<Result<Vec<_>>>()?;
    let columns = parsed
        .iter()
        .map(|k| (k.column, k.definition.data_type))
        .collect();
    let keys = KeyDefinitionSet::new(parsed.into_iter().map(|k| k.definition).collect())?;
    Ok((keys, columns))
}

fn parse_delimiter(raw: &str) -> Result<char> {
    match raw {
        "\\t" | "tab" => Ok('\t'),
        _ => {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(anyhow!("Delimiter must be a single character, got '{}'", raw)),
            }
        }
    }
}

fn file_source(path: PathBuf, widths: &[usize], common: &CommonArgs) -> Result<FileSource> {
    let format = if widths.is_empty() {
        FileFormat::delimited(parse_delimiter(&common.delimiter)?)
    } else {
        FileFormat::fixed_width(widths.to_vec())
    };
    Ok(FileSource::new(path, format).with_header(!common.no_header))
}

fn load_config(common: &CommonArgs) -> Result<SortConfig> {
    let mut config = match &common.config {
        Some(path) => SortConfig::from_file(path)?,
        None => SortConfig::default(),
    };
    if let Some(dir) = &common.output_dir {
        config.destination_folder = Some(dir.clone());
    }
    if let Some(dir) = &common.temp_dir {
        config.temp_directory = Some(dir.clone());
    }
    if let Some(size) = common.batch_size {
        config.max_batch_size = size;
    }
    Ok(config)
}

async fn run_sort(args: SortArgs) -> Result<()> {
    let (keys, columns) = parse_keys(&args.keys)?;
    let source = file_source(args.input, &args.widths, &args.common)?;
    let mut config = load_config(&args.common)?.with_duplicates(args.duplicates);

    let result = if args.stream {
        config.transport = DataTransport::FileAndPassthrough;
        tokio::task::spawn_blocking(move || {
            ExternalSortProcessor::new(config, source, keys, column_extractor(columns))?
                .with_passthrough(|line: &str| println!("{}", line))
                .sort()
        })
        .await??
    } else {
        sort_file_async(config, source, keys, column_extractor(columns)).await?
    };

    info!("Lines read: {}", result.lines_read);
    info!("Lines sorted: {}", result.lines_sorted);
    info!("Duplicates: {}", result.duplicates);
    info!("Filtered: {}", result.filtered);
    if let Some(path) = &result.sorted_path {
        info!("Sorted file: {}", path.display());
    }
    if let Some(path) = &result.duplicates_path {
        info!("Duplicates file: {}", path.display());
    }
    info!(
        "Processing time: {}",
        format_duration(result.processing_time_ms)
    );
    Ok(())
}

// Not found: add. Found and identical: ignore. Found and different: update
// the master with the detail fields.
fn diff_classifier(param: &mut MergePurgeParam) -> flatsift::Result<()> {
    param.action = match &param.master_fields {
        None => MergePurgeAction::Add,
        Some(master) if *master == param.detail_fields => MergePurgeAction::Ignore,
        Some(_) => {
            param.master_fields = Some(param.detail_fields.clone());
            MergePurgeAction::Update
        }
    };
    Ok(())
}

async fn run_merge_purge(args: MergePurgeArgs) -> Result<()> {
    let (keys, master_columns) = parse_keys(&args.master_keys)?;
    if args.detail_columns.len() > master_columns.len() {
        bail!("More detail columns than master keys were given");
    }
    let detail_columns: Vec<(usize, KeyType)> = args
        .detail_columns
        .iter()
        .zip(&master_columns)
        .map(|(&column, &(_, key_type))| (column, key_type))
        .collect();

    let master = file_source(args.master, &args.master_widths, &args.common)?;
    let detail = file_source(args.detail, &args.detail_widths, &args.common)?;
    let config = load_config(&args.common)?;
    let mode = if args.active {
        MergePurgeMode::Active
    } else {
        MergePurgeMode::Passive
    };

    let result = merge_purge_async(move || {
        let processor =
            ExternalSortProcessor::new(config, master, keys, column_extractor(master_columns))?;
        Ok(MergePurgeEngine::new(
            processor,
            detail,
            column_extractor(detail_columns),
            diff_classifier,
        )?
        .with_mode(mode))
    })
    .await?;

    info!("Detail lines read: {}", result.detail_lines_read);
    info!("Matches: {}", result.matches);
    info!(
        "Adds: {}, updates: {}, deletes: {}, ignored: {}",
        result.adds, result.updates, result.deletes, result.ignored
    );
    for path in [
        &result.adds_path,
        &result.updates_path,
        &result.deletes_path,
        &result.ignored_path,
    ]
    .into_iter()
    .flatten()
    {
        info!("Category file: {}", path.display());
    }
    if let Some(path) = &result.new_master_path {
        info!(
            "New master: {} ({} records)",
            path.display(),
            result.new_master_records
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(Verbosity::from_flags(cli.verbose, cli.quiet))?;

    match cli.command {
        Command::Sort(args) => run_sort(args).await,
        Command::MergePurge(args) => run_merge_purge(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key() {
        let key = parse_key("2:t:desc:u").unwrap();
        assert_eq!(key.column, 2);
        assert_eq!(key.definition.data_type, KeyType::Text);
        assert_eq!(key.definition.direction, SortDirection::Descending);
        assert!(key.definition.is_unique);

        let key = parse_key("0:n").unwrap();
        assert_eq!(key.definition.direction, SortDirection::Ascending);
        assert!(!key.definition.is_unique);

        assert!(parse_key("0").is_err());
        assert!(parse_key("x:n").is_err());
        assert!(parse_key("0:q").is_err());
    }

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(",").unwrap(), ',');
        assert_eq!(parse_delimiter("\\t").unwrap(), '\t');
        assert!(parse_delimiter("").is_err());
        assert!(parse_delimiter(";;").is_err());
    }

    #[test]
    fn test_diff_classifier() {
        let mut param = MergePurgeParam::new(vec!["1".into(), "a".into()], None);
        diff_classifier(&mut param).unwrap();
        assert_eq!(param.action, MergePurgeAction::Add);

        let mut param = MergePurgeParam::new(
            vec!["1".into(), "a".into()],
            Some(vec!["1".into(), "a".into()]),
        );
        diff_classifier(&mut param).unwrap();
        assert_eq!(param.action, MergePurgeAction::Ignore);

        let mut param = MergePurgeParam::new(
            vec!["1".into(), "b".into()],
            Some(vec!["1".into(), "a".into()]),
        );
        diff_classifier(&mut param).unwrap();
        assert_eq!(param.action, MergePurgeAction::Update);
        assert_eq!(param.master_fields.unwrap(), vec!["1", "b"]);
    }
}
