use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use simplelog::{Config, LevelFilter, SimpleLogger, WriteLogger};

use pageturn::panic_handler;
use pageturn::pdf::{DocumentSource, PageState, PdfEngine, PdfViewer, ViewerPhase};
use pageturn::settings::{ViewerMode, ViewerSettings};

#[derive(Parser)]
#[command(name = "pageturn", version, about = "Headless PDF page viewer")]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one page to a PNG file
    Render {
        /// Path or http(s) URL of the document
        source: String,

        /// Page to render (1-based)
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Zoom factor
        #[arg(long, conflicts_with = "fit_width")]
        scale: Option<f32>,

        /// Fit the first page into this many pixels
        #[arg(long)]
        fit_width: Option<f32>,

        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        #[arg(short, long, default_value = "page.png")]
        out: PathBuf,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Print page count and page sizes
    Info {
        source: String,

        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Continuous,
    SinglePage,
}

impl From<ModeArg> for ViewerMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Continuous => ViewerMode::Continuous,
            ModeArg::SinglePage => ViewerMode::SinglePage,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    panic_handler::initialize_panic_handler();
    init_logging(&cli)?;

    info!("Starting pageturn");
    let mut settings = load_settings(&cli)?;

    match cli.command {
        Commands::Render {
            source,
            page,
            scale,
            fit_width,
            mode,
            out,
            timeout,
        } => {
            if let Some(mode) = mode {
                settings.mode = mode.into();
            }
            render(
                settings,
                &source,
                page,
                scale,
                fit_width,
                &out,
                Duration::from_secs(timeout),
            )
        }
        Commands::Info { source, timeout } => {
            show_info(settings, &source, Duration::from_secs(timeout))
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    match &cli.log_file {
        Some(path) => WriteLogger::init(
            level,
            Config::default(),
            File::create(path).with_context(|| format!("creating log file {path:?}"))?,
        )?,
        None => SimpleLogger::init(level, Config::default())?,
    }
    Ok(())
}

fn load_settings(cli: &Cli) -> Result<ViewerSettings> {
    match &cli.config {
        Some(path) => Ok(ViewerSettings::load_from(path)?),
        None => Ok(ViewerSettings::load().unwrap_or_else(|e| {
            warn!("{e}; using default settings");
            ViewerSettings::default()
        })),
    }
}

#[cfg(feature = "pdf")]
fn engine() -> Result<Arc<dyn PdfEngine>> {
    Ok(Arc::new(pageturn::pdf::MupdfEngine))
}

#[cfg(not(feature = "pdf"))]
fn engine() -> Result<Arc<dyn PdfEngine>> {
    bail!("pageturn was built without the `pdf` feature; no rasterizer available")
}

fn viewer(settings: ViewerSettings) -> Result<PdfViewer> {
    let engine = engine()?;

    #[cfg(feature = "http")]
    let viewer = PdfViewer::with_fetcher(
        engine,
        Arc::new(pageturn::pdf::HttpFetcher::new()),
        settings,
    )?;

    #[cfg(not(feature = "http"))]
    let viewer = PdfViewer::new(engine, settings)?;

    Ok(viewer)
}

fn open(settings: ViewerSettings, source: &str, timeout: Duration) -> Result<PdfViewer> {
    let mut viewer = viewer(settings)?;
    viewer.open(DocumentSource::parse(source));

    if !viewer.wait_idle(timeout) {
        bail!("timed out loading {source}");
    }
    if let ViewerPhase::Error(e) = viewer.phase() {
        bail!("{e}");
    }
    Ok(viewer)
}

fn render(
    settings: ViewerSettings,
    source: &str,
    page: usize,
    scale: Option<f32>,
    fit_width: Option<f32>,
    out: &Path,
    timeout: Duration,
) -> Result<()> {
    let mode = settings.mode;
    let mut viewer = open(settings, source, timeout)?;

    if page == 0 || page > viewer.page_count() {
        bail!(
            "page {page} is out of range (document has {} pages)",
            viewer.page_count()
        );
    }

    if let Some(width) = fit_width {
        viewer.fit_to_width(width);
    } else if let Some(factor) = scale {
        viewer.set_zoom(factor);
    }
    viewer.go_to_page(page);

    if mode == ViewerMode::Continuous {
        let height = viewer
            .document_info()
            .and_then(|info| info.page_size(page))
            .map_or(0.0, |size| size.height * viewer.scale());
        viewer.set_viewport_height(height);
    }

    if !viewer.wait_idle(timeout) {
        bail!("timed out rendering page {page}");
    }
    if let Some(PageState::Failed(e)) = viewer.page_state(page) {
        bail!("{e}");
    }

    let canvas = match mode {
        ViewerMode::Continuous => viewer.canvas(page),
        ViewerMode::SinglePage => Some(viewer.presented_canvas()),
    };
    let entry = canvas
        .and_then(|c| c.content())
        .filter(|entry| entry.page == page)
        .ok_or_else(|| anyhow!("page {page} was not rendered"))?;

    let image = entry
        .raster
        .to_rgb_image()
        .ok_or_else(|| anyhow!("rendered page has inconsistent dimensions"))?;
    image
        .save(out)
        .with_context(|| format!("writing {}", out.display()))?;

    println!(
        "Rendered page {page} at scale {:.3} ({}x{}) to {}",
        entry.scale,
        entry.raster.width,
        entry.raster.height,
        out.display()
    );
    Ok(())
}

fn show_info(settings: ViewerSettings, source: &str, timeout: Duration) -> Result<()> {
    let viewer = open(settings, source, timeout)?;
    let info = viewer
        .document_info()
        .ok_or_else(|| anyhow!("document did not load"))?;

    println!("{source}: {} pages", info.page_count);
    for (idx, size) in info.page_sizes.iter().enumerate() {
        println!("  page {:>4}: {:.1} x {:.1} pt", idx + 1, size.width, size.height);
    }
    Ok(())
}
