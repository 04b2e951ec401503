//! pdfstamp - overlay a stamp on selected pages of a PDF
//!
//! The stamp is either page 1 of another PDF or a raster image.
//! Pages and per-range positions are given as expressions, e.g.
//!
//! ```text
//! pdfstamp -f report.pdf -s logo.png -p 1-3,8 --pos 10+10,100+200
//! ```

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use pdfstamp_core::{stamp_document, BlendMode, Position, StampConfig, StampError, Unit};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "pdfstamp", version, about = "Stamp selected pages of a PDF with another PDF page or an image")]
struct Args {
    /// PDF file to be stamped
    #[arg(short = 'f', long)]
    file: PathBuf,

    /// Stamp file: a PDF (page 1 is used) or a raster image
    #[arg(short = 's', long)]
    stamp: PathBuf,

    /// Stamped output file; derived from the input name when omitted
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Termination added to the stamped filename when -o is omitted
    #[arg(long, default_value = "stamped")]
    postfix: String,

    /// Unit of measurements (mm or pt)
    #[arg(long, default_value = "mm", value_parser = parse_unit)]
    unit: Unit,

    /// Pages to be stamped, e.g. "1-3,8"; empty stamps every page
    #[arg(short = 'p', long, default_value = "")]
    pages: String,

    /// Stamp positions as x+y, one per declared range, e.g. "400+500"
    #[arg(long)]
    pos: Option<String>,

    /// Stamp x position used when --pos is omitted
    #[arg(short = 'x', default_value_t = 0.0)]
    x: f64,

    /// Stamp y position used when --pos is omitted
    #[arg(short = 'y', default_value_t = 0.0)]
    y: f64,

    /// Stamp width
    #[arg(short = 'w', long, default_value_t = 30.0)]
    width: f64,

    /// Stamp height; 0 keeps the stamp's aspect ratio
    #[arg(long, default_value_t = 0.0)]
    height: f64,

    /// Stamp transparency while compositing
    #[arg(long, default_value_t = 0.7)]
    alpha: f64,

    /// Blend mode while compositing
    #[arg(long, default_value = "multiply", value_parser = parse_blend)]
    blend: BlendMode,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

fn parse_unit(s: &str) -> Result<Unit, String> {
    s.parse().map_err(|e: StampError| e.to_string())
}

fn parse_blend(s: &str) -> Result<BlendMode, String> {
    s.parse().map_err(|e: StampError| e.to_string())
}

/// "report.pdf" with postfix "stamped" becomes "report.stamped.pdf".
fn derive_output(source: &Path, postfix: &str) -> PathBuf {
    match source.extension().and_then(|e| e.to_str()) {
        Some(ext) => source.with_extension(format!("{}.{}", postfix, ext)),
        None => source.with_extension(postfix),
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pdfstamp_core=info".parse()?)
                .add_directive("pdfstamp=info".parse()?),
        )
        .init();

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| derive_output(&args.file, &args.postfix));

    let config = StampConfig {
        source: args.file,
        stamp: args.stamp,
        output,
        unit: args.unit,
        pages: args.pages,
        positions: args.pos,
        fallback: Position { x: args.x, y: args.y },
        width: args.width,
        height: args.height,
        alpha: args.alpha,
        blend: args.blend,
    };

    info!(source = %config.source.display(), stamp = %config.stamp.display(), "stamping");
    let summary = stamp_document(&config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "stamped {} of {} pages -> {} ({} bytes)",
            summary.pages_stamped,
            summary.pages_total,
            config.output.display(),
            summary.output_bytes
        );
    }
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
