//! mdforge – command-line Markdown → HTML → PDF converter.
//!
//! Usage:
//!   mdforge <input.md> [output_dir] [--template PROFILE]
//!
//! If `output_dir` is omitted the artifacts are written next to the input
//! file. The PDF is named from the document's front matter.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{ArgAction, Parser};
use log::LevelFilter;

use md_forge::backend::BackendOverrides;
use md_forge::{ConversionRequest, Error, Pipeline, ProfileStore, SubstitutionMode};

const LONG_ABOUT: &str = "\
Converts one Markdown document with front matter into a standalone HTML \
document and, unless the profile says otherwise, a paginated PDF.

Profiles live in <home>/config.toml; templates in \
<home>/templates/<name>/template.html; style assets in <home>/styles/.

Running two conversions against the same output directory at the same \
time is not supported: they may race on the staged asset directory and \
its cleanup.";

#[derive(Debug, Parser)]
#[command(name = "mdforge", version, about, long_about = LONG_ABOUT)]
struct Args {
    /// Markdown file to convert
    #[arg(required_unless_present = "list_templates")]
    input: Option<PathBuf>,

    /// Directory for the generated files (default: the input's directory)
    output_dir: Option<PathBuf>,

    /// Profile to convert with
    #[arg(short, long, default_value = md_forge::DEFAULT_PROFILE)]
    template: String,

    /// Profile store (default: <home>/config.toml)
    #[arg(long, env = "MDFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding config.toml, templates/ and styles/
    #[arg(long, env = "MDFORGE_HOME", default_value = ".")]
    home: PathBuf,

    /// Fail on template placeholders that have no value
    #[arg(long)]
    strict: bool,

    /// Use the DEFAULT profile when the requested one does not exist
    #[arg(long)]
    fallback_default: bool,

    /// Override the profile's PDF backend (native, chromium, wkhtmltopdf, weasyprint)
    #[arg(long)]
    backend: Option<String>,

    /// Render timeout in seconds for external backends
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Print the known profile names and exit
    #[arg(long)]
    list_templates: bool,

    /// Print the substitution context as JSON instead of converting
    #[arg(long)]
    dump_context: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() {
    let args = Args::parse();
    init_logging(&args);

    if let Err(e) = run(args) {
        eprintln!("error[{}]: {e}", e.kind());
        process::exit(if e.is_preflight() { 1 } else { 2 });
    }
}

fn init_logging(args: &Args) {
    let level = match (args.quiet, args.verbose) {
        (true, _) => LevelFilter::Warn,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_module("md_forge", level)
        .filter_module("mdforge", level)
        .format_timestamp(None)
        .parse_env("RUST_LOG")
        .init();
}

fn run(args: Args) -> Result<(), Error> {
    let config = args
        .config
        .clone()
        .unwrap_or_else(|| args.home.join("config.toml"));
    let store = ProfileStore::load(&config)?;

    if args.list_templates {
        for name in store.names() {
            println!("{name}");
        }
        return Ok(());
    }

    let Some(input) = args.input else {
        return Err(Error::InvalidInput {
            path: PathBuf::new(),
            reason: "no input file given".to_string(),
        });
    };

    let mode = if args.strict {
        SubstitutionMode::Strict
    } else {
        SubstitutionMode::Safe
    };
    let overrides = BackendOverrides {
        selector: args.backend,
        timeout: args.timeout.map(Duration::from_secs),
    };
    let pipeline = Pipeline::new(store, &args.home)
        .with_mode(mode)
        .with_overrides(overrides);

    let mut request =
        ConversionRequest::new(input, args.template).fallback_to_default(args.fallback_default);
    request.output_dir = args.output_dir;

    if args.dump_context {
        let ctx = pipeline.context(&request)?;
        println!("{}", ctx.to_json()?);
        return Ok(());
    }

    let report = pipeline.convert(&request)?;
    match &report.pdf {
        Some(pdf) => eprintln!("Wrote '{}'", pdf.display()),
        None => eprintln!("Wrote '{}'", report.html.display()),
    }
    if report.html_retained() && report.pdf.is_some() {
        eprintln!("Kept '{}'", report.html.display());
    }
    for failure in &report.cleanup.failures {
        eprintln!("warning: {failure}");
    }
    Ok(())
}
