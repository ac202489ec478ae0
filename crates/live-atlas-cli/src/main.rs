use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use futures::executor::block_on;
use live_atlas_core::{AtlasConfig, DynamicAtlas, ImageSource, SerializedAtlas, SheetSpec};
use tracing::{error, info};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "live-atlas",
    about = "Build, inspect and unpack runtime texture atlases",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack a file or directory of images into an atlas file
    Pack(PackArgs),
    /// Print a summary of an atlas file
    Info(InfoArgs),
    /// Write regions of an atlas file back out as individual PNGs
    Extract(ExtractArgs),
}

#[derive(Parser, Debug)]
struct PackArgs {
    /// Input image file or directory
    input: PathBuf,
    /// Output atlas file
    #[arg(short, long, default_value = "atlas.json")]
    out: PathBuf,
    /// Treat each input as a spritesheet of fixed-size cells
    #[arg(long, value_names = ["W", "H"], num_args = 2)]
    grid: Option<Vec<u32>>,
    /// Initial surface size
    #[arg(long, default_value_t = 256)]
    initial_size: u32,
    /// Maximum surface size
    #[arg(long, default_value_t = 4096)]
    max_size: u32,
    /// Padding between regions
    #[arg(long, default_value_t = 2)]
    padding: u32,
    /// Growth factor applied when the surface fills up
    #[arg(long, default_value_t = 1.25)]
    growth_factor: f32,
    /// Trim transparent borders
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    trim: bool,
    /// Trim alpha threshold (0..=255)
    #[arg(long, default_value_t = 0)]
    trim_threshold: u8,
    /// Also write the packed surface as a PNG next to the atlas file
    #[arg(long, default_value_t = false)]
    preview: bool,
}

#[derive(Parser, Debug)]
struct InfoArgs {
    /// Atlas file to inspect
    input: PathBuf,
    /// List every frame
    #[arg(short, long, default_value_t = false)]
    frames: bool,
}

#[derive(Parser, Debug)]
struct ExtractArgs {
    /// Atlas file to unpack
    input: PathBuf,
    /// Output directory
    #[arg(short, long, default_value = "out")]
    out_dir: PathBuf,
    /// Extract only this region key
    #[arg(short, long)]
    key: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    match &cli.command {
        Commands::Pack(args) => run_pack(args),
        Commands::Info(args) => run_info(args),
        Commands::Extract(args) => run_extract(args),
    }
}

fn run_pack(args: &PackArgs) -> anyhow::Result<()> {
    let cfg = AtlasConfig::builder()
        .initial_size(args.initial_size, args.initial_size)
        .max_size(args.max_size, args.max_size)
        .padding(args.padding)
        .growth_factor(args.growth_factor)
        .trim(args.trim)
        .trim_threshold(args.trim_threshold)
        .build();
    let atlas = DynamicAtlas::new(cfg)?;

    let paths = collect_files(&args.input)?;
    anyhow::ensure!(!paths.is_empty(), "no images under {}", args.input.display());

    let grid = match args.grid.as_deref() {
        Some([w, h]) => Some((*w, *h)),
        Some(_) => anyhow::bail!("--grid takes exactly two values"),
        None => None,
    };
    for path in &paths {
        let key = region_key(&args.input, path);
        let source = ImageSource::Path(path.clone());
        let res = match grid {
            Some((cell_width, cell_height)) => block_on(atlas.add_spritesheet(
                &key,
                source,
                SheetSpec::Grid {
                    cell_width,
                    cell_height,
                },
            )),
            None => block_on(atlas.add_image(&key, source, false)),
        };
        if let Err(e) = res {
            error!(?path, error = %e, "skip image");
        }
    }

    let data = atlas.serialize()?;
    let bytes = data.to_json_vec()?;
    if let Some(parent) = args.out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
    }
    fs::write(&args.out, bytes).with_context(|| format!("write {}", args.out.display()))?;
    if args.preview {
        let preview = args.out.with_extension("png");
        fs::write(&preview, &data.image)
            .with_context(|| format!("write {}", preview.display()))?;
        info!(preview = %preview.display(), "surface preview written");
    }

    let stats = atlas.stats();
    info!("{}", stats.summary());
    info!(out = %args.out.display(), frames = data.frames.len(), "atlas written");
    Ok(())
}

fn run_info(args: &InfoArgs) -> anyhow::Result<()> {
    let data = read_atlas(&args.input)?;
    let atlas = DynamicAtlas::new(AtlasConfig::default())?;
    atlas.restore(&data)?;

    let stats = atlas.stats();
    println!("{}", stats.summary());
    if args.frames {
        for key in atlas.keys() {
            let r = atlas.region(&key).context("region vanished")?;
            match r.trim {
                Some(t) => println!(
                    "{key}: {}x{} at ({}, {}), trimmed from {}x{}",
                    r.width, r.height, r.x, r.y, t.original_width, t.original_height
                ),
                None => println!("{key}: {}x{} at ({}, {})", r.width, r.height, r.x, r.y),
            }
        }
    }
    Ok(())
}

fn run_extract(args: &ExtractArgs) -> anyhow::Result<()> {
    let data = read_atlas(&args.input)?;
    let atlas = DynamicAtlas::new(AtlasConfig::default())?;
    atlas.restore(&data)?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("create {}", args.out_dir.display()))?;

    let keys = match &args.key {
        Some(k) => {
            anyhow::ensure!(atlas.has_region(k), "no region named `{k}`");
            vec![k.clone()]
        }
        None => atlas.keys(),
    };
    let mut written = 0usize;
    for key in &keys {
        let Some(pixels) = atlas.region_pixels_untrimmed(key) else {
            error!(key, "region has no readable pixels");
            continue;
        };
        let file = args.out_dir.join(format!("{}.png", sanitize(key)));
        pixels
            .save(&file)
            .with_context(|| format!("write {}", file.display()))?;
        written += 1;
    }
    info!(written, dir = %args.out_dir.display(), "regions extracted");
    Ok(())
}

fn read_atlas(path: &Path) -> anyhow::Result<SerializedAtlas> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    Ok(SerializedAtlas::from_json_slice(&bytes)?)
}

fn collect_files(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut list: Vec<PathBuf> = Vec::new();
    if path.is_file() {
        if is_image(path) {
            list.push(path.to_path_buf());
        }
    } else {
        for entry in WalkDir::new(path).into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && is_image(p) {
                list.push(p.to_path_buf());
            }
        }
    }
    list.sort();
    Ok(list)
}

/// Region key for an input file: its path relative to the input root, minus
/// the extension, with `/` separators.
fn region_key(root: &Path, path: &Path) -> String {
    let rel = match path.strip_prefix(root) {
        Ok(r) if !r.as_os_str().is_empty() => r,
        _ => Path::new(path.file_name().unwrap_or(path.as_os_str())),
    };
    let stem = rel.with_extension("");
    stem.to_string_lossy().replace('\\', "/")
}

/// Filesystem-safe name for a region key.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' { c } else { '_' })
        .collect()
}

fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_ascii_lowercase()),
        Some(ext) if matches!(ext.as_str(), "png" | "jpg" | "jpeg" | "bmp" | "tga" | "gif")
    )
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}
