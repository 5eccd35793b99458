use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::{Args, Parser, Subcommand, ValueEnum};
use sheetfill_core::{
    CellValue, Package, PatchError, TemplateConfig, TemplatePatcher, TemplateRegistry,
    analyze_sheet, list_sheets, suggest_mapping,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

mod formatter;

const DEFAULT_CONFIG: &str = "sheetfill.toml";

#[derive(Parser)]
#[command(name = "sheetfill")]
#[command(about = "Fill XLSX templates without touching their formatting", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write values into a template and save the result
    Fill(FillArgs),
    /// Show what a template sheet holds and suggest a field mapping
    Map(MapArgs),
    /// List the sheets of a template
    Sheets(SheetsArgs),
}

#[derive(Args)]
struct FillArgs {
    /// Path to the template .xlsx file
    #[arg(value_name = "TEMPLATE")]
    template: PathBuf,

    /// JSON object mapping field names or cell references to values
    #[arg(short, long, value_name = "FILE")]
    data: Option<PathBuf>,

    /// Single value as KEY=VALUE (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Template registry (TOML); defaults to ./sheetfill.toml when present
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Sheet to fill (default: configured sheet, else the first sheet)
    #[arg(short, long)]
    sheet: Option<String>,

    /// Output file
    #[arg(short, long, required_unless_present = "base64", conflicts_with = "base64")]
    output: Option<PathBuf>,

    /// Print the generated file as base64 instead of writing it
    #[arg(long)]
    base64: bool,
}

#[derive(Args)]
struct MapArgs {
    /// Path to the template .xlsx file
    #[arg(value_name = "TEMPLATE")]
    template: PathBuf,

    /// Sheet to analyze (default: first sheet)
    #[arg(short, long)]
    sheet: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Maximum number of suggested fields
    #[arg(long, default_value_t = 10)]
    limit: usize,
}

#[derive(Args)]
struct SheetsArgs {
    /// Path to the template .xlsx file
    #[arg(value_name = "TEMPLATE")]
    template: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Fill(args) => run_fill(args),
        Command::Map(args) => run_map(args),
        Command::Sheets(args) => run_sheets(args),
    };

    if let Err(err) = result {
        formatter::print_error(&err);
        let request_error = err
            .downcast_ref::<PatchError>()
            .is_some_and(PatchError::is_request_error);
        std::process::exit(if request_error { 2 } else { 1 });
    }
}

fn template_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn load_registry(config: Option<&Path>) -> Result<TemplateRegistry> {
    let registry = match config {
        Some(path) => TemplateRegistry::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            // Fall back to a registry in the current directory if there is one
            let default_path = PathBuf::from(DEFAULT_CONFIG);
            if default_path.exists() {
                TemplateRegistry::from_file(&default_path).with_context(|| {
                    format!("Failed to load config from {}", default_path.display())
                })?
            } else {
                TemplateRegistry::default()
            }
        }
    };
    registry.validate().context("Invalid configuration")?;
    Ok(registry)
}

/// Request data: the JSON file first, then `--set` pairs in command-line order
fn collect_data(args: &FillArgs) -> Result<Vec<(String, CellValue)>> {
    let mut data = Vec::new();

    if let Some(path) = &args.data {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read data file {}", path.display()))?;
        let values: BTreeMap<String, CellValue> = serde_json::from_str(&content)
            .with_context(|| format!("Data file {} is not a JSON object of values", path.display()))?;
        data.extend(values);
    }

    for pair in &args.set {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Expected KEY=VALUE, got '{}'", pair))?;
        data.push((key.trim().to_string(), CellValue::parse_lenient(value)));
    }

    Ok(data)
}

fn run_fill(args: FillArgs) -> Result<()> {
    let registry = load_registry(args.config.as_deref())?;
    let name = template_name(&args.template);
    let config: TemplateConfig = registry.get(&name).cloned().unwrap_or_default();

    let data = collect_data(&args)?;
    let updates = config.resolve_updates(data)?;
    let sheet = config.sheet_for(args.sheet.as_deref());

    let patcher = TemplatePatcher::from_file(&args.template)
        .with_context(|| format!("Failed to open template {}", args.template.display()))?;
    let outcome = patcher.generate_with_outcome(&updates, sheet)?;

    match &args.output {
        Some(output_path) => {
            std::fs::write(output_path, &outcome.bytes)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            formatter::print_fill_summary(&args.template, &outcome, Some(output_path));
        }
        None => {
            // stdout carries only the payload
            println!("{}", STANDARD.encode(&outcome.bytes));
            formatter::print_fill_summary(&args.template, &outcome, None);
        }
    }

    Ok(())
}

fn open_package(path: &Path) -> Result<Package> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read template {}", path.display()))?;
    Ok(Package::open(bytes)?)
}

fn run_map(args: MapArgs) -> Result<()> {
    let mut package = open_package(&args.template)?;
    let cells = analyze_sheet(&mut package, args.sheet.as_deref())
        .with_context(|| format!("Failed to analyze {}", args.template.display()))?;

    let sheet_name = match &args.sheet {
        Some(name) => name.clone(),
        None => list_sheets(&mut package)?
            .first()
            .map(|s| s.name.clone())
            .unwrap_or_default(),
    };

    let mut suggestion = suggest_mapping(&cells, args.limit);
    suggestion.sheet_name = Some(sheet_name.clone());

    let name = template_name(&args.template);
    match args.format {
        OutputFormat::Human => formatter::print_map_human(&name, &sheet_name, &cells, &suggestion)?,
        OutputFormat::Json => formatter::print_map_json(&name, &sheet_name, &cells, &suggestion)?,
    }
    Ok(())
}

fn run_sheets(args: SheetsArgs) -> Result<()> {
    let mut package = open_package(&args.template)?;
    let sheets = list_sheets(&mut package)?;

    let name = template_name(&args.template);
    match args.format {
        OutputFormat::Human => formatter::print_sheets_human(&name, &sheets),
        OutputFormat::Json => formatter::print_sheets_json(&name, &sheets)?,
    }
    Ok(())
}
