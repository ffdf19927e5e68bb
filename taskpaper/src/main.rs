use std::{
    collections::{BTreeSet, HashSet},
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand, ValueEnum};
use taskpaper::format::outline;
use taskpaper::{
    Document, FormatOptions, Kind, TaskItem, format_document, format_filtered, parse_taskpaper,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const TASKPAPER_EXTENSIONS: &[&str] = &["taskpaper", "todo", "txt"];

#[derive(Debug, Parser)]
#[command(
    name = "taskpaper",
    about = "TaskPaper outline tooling built on the taskpaper crate",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse TaskPaper files and print their outline.
    Parse(ParseArgs),

    /// Format TaskPaper files, preserving untouched lines.
    Format(FormatArgs),

    /// Print only the items matching the given tags and kind.
    Filter(FilterArgs),

    /// Tag the item on a given line with @done(date).
    Done(DoneArgs),
}

#[derive(Debug, Args)]
struct ParseArgs {
    /// TaskPaper files or directories containing them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Emit JSON instead of a debug representation.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct FormatArgs {
    /// TaskPaper files or directories to format.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Overwrite the file instead of printing to stdout.
    #[arg(long)]
    in_place: bool,
}

#[derive(Debug, Args)]
struct FilterArgs {
    /// TaskPaper files or directories to search.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Keep items carrying this tag (repeatable; all must match).
    #[arg(long = "tag", value_name = "NAME")]
    tags: Vec<String>,
    /// Keep items of this kind.
    #[arg(long, value_enum)]
    kind: Option<KindArg>,
    /// Do not print the projects and tasks that own a match.
    #[arg(long)]
    no_ancestors: bool,
    /// Print lines without leading tabs.
    #[arg(long)]
    no_tabs: bool,
    /// JSON file with format options; flags take precedence.
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum KindArg {
    Task,
    Project,
    Note,
}

impl From<KindArg> for Kind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Task => Kind::Task,
            KindArg::Project => Kind::Project,
            KindArg::Note => Kind::Note,
        }
    }
}

#[derive(Debug, Args)]
struct DoneArgs {
    /// TaskPaper file containing the item.
    input: PathBuf,
    /// 1-based line number of the item.
    #[arg(long)]
    line: usize,
    /// Completion date. Defaults to today.
    #[arg(long)]
    date: Option<NaiveDate>,
    /// Overwrite the file instead of printing to stdout.
    #[arg(long)]
    in_place: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Parse(args) => handle_parse(args),
        Commands::Format(args) => handle_format(args),
        Commands::Filter(args) => handle_filter(args),
        Commands::Done(args) => handle_done(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn handle_parse(args: ParseArgs) -> Result<()> {
    let ParseArgs { inputs, json } = args;
    let parsed = load_documents(&inputs)?;

    if json {
        #[derive(serde::Serialize)]
        struct JsonOutput {
            path: String,
            items: Vec<taskpaper::format::OutlineNode>,
        }

        let payload: Vec<JsonOutput> = parsed
            .iter()
            .map(|(path, doc)| JsonOutput {
                path: path.display().to_string(),
                items: outline(doc),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (idx, (path, doc)) in parsed.iter().enumerate() {
            if parsed.len() > 1 {
                println!("== {} ==", path.display());
            }
            println!("{:#?}", outline(doc));
            if parsed.len() > 1 && idx + 1 < parsed.len() {
                println!();
            }
        }
    }
    Ok(())
}

fn handle_format(args: FormatArgs) -> Result<()> {
    let FormatArgs { inputs, in_place } = args;
    let parsed = load_documents(&inputs)?;
    let options = FormatOptions::default();

    let outputs = parsed
        .iter()
        .map(|(path, doc)| (path.clone(), format_document(doc, &options)))
        .collect();
    emit(outputs, in_place)
}

fn handle_filter(args: FilterArgs) -> Result<()> {
    let FilterArgs {
        inputs,
        tags,
        kind,
        no_ancestors,
        no_tabs,
        options,
    } = args;
    if tags.is_empty() && kind.is_none() {
        anyhow::bail!("filter needs at least one --tag or --kind");
    }

    let options = resolve_options(options.as_deref(), no_ancestors, no_tabs)?;
    let kind = kind.map(Kind::from);
    let matches = |item: &TaskItem| {
        tags.iter().all(|t| item.has_tag(t)) && kind.is_none_or(|k| item.kind() == k)
    };

    let parsed = load_documents(&inputs)?;
    let outputs = parsed
        .iter()
        .map(|(path, doc)| (path.clone(), format_filtered(doc, &matches, &options)))
        .collect();
    emit(outputs, false)
}

fn handle_done(args: DoneArgs) -> Result<()> {
    let DoneArgs {
        input,
        line,
        date,
        in_place,
    } = args;
    let path = fs::canonicalize(&input).with_context(|| format!("resolving path {:?}", input))?;
    let mut doc = read_document(&path)?;

    let id = line
        .checked_sub(1)
        .and_then(|idx| doc.iter().nth(idx))
        .map(TaskItem::id)
        .with_context(|| format!("{:?} has no line {}", path, line))?;
    if doc[id].is_blank() {
        anyhow::bail!("line {} of {:?} is blank", line, path);
    }

    let date = date.unwrap_or_else(|| Local::now().date_naive());
    if let Some(previous) = doc[id].mark_done(date) {
        info!(line, previous = %previous, "replaced existing @done value");
    }
    emit(vec![(path, doc.to_string())], in_place)
}

fn resolve_options(
    file: Option<&Path>,
    no_ancestors: bool,
    no_tabs: bool,
) -> Result<FormatOptions> {
    let mut options = match file {
        Some(path) => {
            let text =
                fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
            serde_json::from_str::<FormatOptions>(&text)
                .with_context(|| format!("parsing format options in {:?}", path))?
        }
        None => FormatOptions::default(),
    };
    if no_ancestors {
        options.include_ancestors = false;
    }
    if no_tabs {
        options.render_tabs = false;
    }
    Ok(options)
}

fn load_documents(inputs: &[PathBuf]) -> Result<Vec<(PathBuf, Document)>> {
    let expanded = expand_inputs(inputs)?;
    if expanded.is_empty() {
        anyhow::bail!("no TaskPaper files found in the provided inputs");
    }

    let mut parsed = Vec::new();
    for path in expanded {
        let doc = read_document(&path)?;
        parsed.push((path, doc));
    }
    Ok(parsed)
}

fn read_document(path: &Path) -> Result<Document> {
    debug!("Parsing {:?}", path);
    let text = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    Ok(parse_taskpaper(&text))
}

fn emit(outputs: Vec<(PathBuf, String)>, in_place: bool) -> Result<()> {
    let many = outputs.len() > 1;
    let mut first = true;

    for (path, text) in outputs {
        if in_place {
            fs::write(&path, text.as_bytes()).with_context(|| format!("writing {:?}", path))?;
            info!("Wrote {:?}", path);
            continue;
        }
        if !first {
            println!();
        }
        if many {
            println!("== {} ==", path.display());
        }
        first = false;
        print!("{text}");
        if !text.is_empty() && !text.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn expand_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = BTreeSet::new();
    for path in paths {
        let canonical =
            fs::canonicalize(path).with_context(|| format!("resolving path {:?}", path))?;
        let meta = fs::metadata(&canonical)
            .with_context(|| format!("reading metadata for {:?}", canonical))?;
        if meta.is_dir() {
            debug!("Scanning directory {:?}", canonical);
            for file in collect_taskpaper_files(&canonical)? {
                if visited.insert(file.clone()) {
                    out.push(file);
                }
            }
        } else if meta.is_file() {
            if !is_taskpaper_path(&canonical) {
                anyhow::bail!("{:?} is not a TaskPaper file", canonical);
            }
            debug!("Adding file {:?}", canonical);
            if visited.insert(canonical.clone()) {
                out.push(canonical);
            }
        }
    }
    Ok(out)
}

fn collect_taskpaper_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut visited = HashSet::new();
    visit_dir(dir, &mut out, &mut visited)?;
    out.sort();
    out.dedup();
    Ok(out)
}

fn visit_dir(path: &Path, out: &mut Vec<PathBuf>, visited: &mut HashSet<PathBuf>) -> Result<()> {
    let canonical = fs::canonicalize(path)?;
    if !visited.insert(canonical.clone()) {
        return Ok(());
    }

    let metadata = fs::metadata(&canonical)?;
    if metadata.is_dir() {
        debug!("Visiting directory {:?}", canonical);
        for entry in fs::read_dir(&canonical)? {
            let entry = entry?;
            if entry.file_type()?.is_symlink() {
                continue;
            }
            visit_dir(&entry.path(), out, visited)?;
        }
    } else if metadata.is_file() && is_taskpaper_path(&canonical) {
        debug!("Found TaskPaper file {:?}", canonical);
        out.push(canonical);
    }
    Ok(())
}

fn is_taskpaper_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| TASKPAPER_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}
