use std::path::PathBuf;

use catalog_append::{
    ColumnShape, Result, ShapeConfig, ToolError, TransferRequest, list_worksheets, transfer,
};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging(cli.verbose).and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Sheets(args) => execute_sheets(args),
        Command::Shapes(args) => execute_shapes(args),
        Command::Transfer(args) => execute_transfer(args),
    }
}

fn execute_sheets(args: SheetsArgs) -> Result<()> {
    for name in list_worksheets(&args.workbook)? {
        println!("{name}");
    }
    Ok(())
}

fn execute_shapes(args: ConfigArgs) -> Result<()> {
    let config = args.load()?;
    if config.is_empty() {
        warn!("no allow-lists configured; set CDEH, CDFI, CDEG, CDER or CEFH");
    }
    for shape in ColumnShape::ALL {
        let layout = shape.layout();
        let sheets = config.sheets(shape);
        println!(
            "{shape}: prefix={} key={} description={} extra={} sheets=[{}]",
            column_letter(layout.prefix),
            column_letter(layout.key),
            column_letter(layout.description),
            column_letter(layout.extra),
            sheets.join(", ")
        );
    }
    Ok(())
}

fn execute_transfer(args: TransferArgs) -> Result<()> {
    let config = args.config.load()?;
    let request = TransferRequest {
        source: &args.source,
        destination: &args.destination,
        sheets: &args.sheets,
        config: &config,
    };
    let result = transfer(&request)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{result}");
    }
    Ok(())
}

fn column_letter(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Append catalogue rows from selected worksheets into a destination workbook."
)]
struct Cli {
    /// Log every skipped row, not only inserts and duplicates.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the worksheets of a workbook.
    Sheets(SheetsArgs),
    /// Show the column shapes and the sheets configured for each.
    Shapes(ConfigArgs),
    /// Append rows from source worksheets into the destination workbook.
    Transfer(TransferArgs),
}

#[derive(clap::Args)]
struct SheetsArgs {
    /// Workbook to inspect.
    workbook: PathBuf,
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// JSON file mapping shape names to worksheet names.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Environment file to read shape allow-lists from instead of `.env`.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(&self) -> Result<ShapeConfig> {
        ShapeConfig::load(self.config.as_deref(), self.env_file.as_deref())
    }
}

#[derive(clap::Args)]
struct TransferArgs {
    /// Source workbook to copy rows from.
    #[arg(long)]
    source: PathBuf,

    /// Destination workbook to append rows to.
    #[arg(long)]
    destination: PathBuf,

    /// Worksheet to copy; repeat for several, processed in the given order.
    #[arg(long = "sheet", required = true)]
    sheets: Vec<String>,

    #[command(flatten)]
    config: ConfigArgs,

    /// Print the full result, including every event, as JSON.
    #[arg(long)]
    json: bool,
}
