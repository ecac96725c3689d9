use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, info};

use image_splitter::source::UploadedFile;
use image_splitter::{ConfigPatch, EngineSettings, ImageSplitter, OutputFormat, SplitMode, SplitReport};

#[derive(Parser)]
#[command(name = "image-splitter")]
#[command(author, version, about = "Split an image into vertical strips, horizontal strips or a grid")]
#[command(long_about = "
Split an image into tiles and save them individually or as one zip archive.

Examples:
  image-splitter photo.png                           # 3x3 grid, jpg tiles
  image-splitter photo.png --mode vertical --cols 4  # four vertical strips
  image-splitter photo.png --rows 2 --cols 5 --zip   # split-images.zip
  image-splitter photo.png --format png --tile 5     # only split-image-5.png
")]
struct Cli {
    /// Input image
    input: PathBuf,

    /// Split mode: vertical, horizontal or grid
    #[arg(short, long)]
    mode: Option<SplitMode>,

    /// Rows (1-10)
    #[arg(short, long)]
    rows: Option<u32>,

    /// Columns (1-10)
    #[arg(short, long)]
    cols: Option<u32>,

    /// Output format: jpg, png, webp or bmp
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Preview gap between tiles, does not change tile pixels
    #[arg(long)]
    grid_line_width: Option<u32>,

    /// Output directory (default: download directory)
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Save every tile into split-images.zip
    #[arg(short, long, conflicts_with = "tile")]
    zip: bool,

    /// Save only this tile (1-based)
    #[arg(short, long)]
    tile: Option<usize>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn patch(&self) -> ConfigPatch {
        ConfigPatch {
            mode: self.mode,
            rows: self.rows,
            cols: self.cols,
            grid_line_width: self.grid_line_width,
            output_format: self.format,
        }
    }
}

fn output_dir(requested: Option<PathBuf>) -> PathBuf {
    requested
        .or_else(dirs::download_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let settings = EngineSettings::from_env();
    debug!("Engine settings: {:?}", settings);
    let splitter = ImageSplitter::new(settings);

    let file = UploadedFile::from_path(&cli.input)
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;
    let source = splitter
        .upload_file(file)
        .with_context(|| format!("Failed to load {}", cli.input.display()))?;
    info!("Loaded {} ({}x{})", source.name, source.width, source.height);

    let patch = cli.patch();
    if !patch.is_empty() {
        splitter.update_configuration(patch);
    }

    let report = splitter.request_split().await.context("Split failed")?;
    if let SplitReport::Completed { tile_count, path } = report {
        info!("Split into {} tiles ({})", tile_count, path);
    }

    let dir = output_dir(cli.out.clone());
    let written = if cli.zip {
        vec![splitter.download_all(&dir)?]
    } else if let Some(tile) = cli.tile {
        if tile == 0 {
            bail!("Tile numbers start at 1");
        }
        vec![splitter.download_single(tile - 1, &dir)?]
    } else {
        let snapshot = splitter.snapshot();
        snapshot
            .tiles
            .iter()
            .map(|tile| splitter.download_single(tile.index, &dir))
            .collect::<image_splitter::Result<Vec<_>>>()?
    };

    for path in &written {
        println!("{}", path.display());
    }
    splitter.teardown();
    Ok(())
}
