//! candy-annotate - command line client for the labeling server
//!
//! Usage:
//!   candy-annotate list                      List images and label counts
//!   candy-annotate auto-label                Run the detector over images
//!   candy-annotate detect-duplicates         Find near-identical images
//!   candy-annotate detect-blanks             Find empty frames
//!   candy-annotate filter-boxes              Drop boxes of extreme size
//!   candy-annotate extract-frames            Turn uploaded videos into images
//!   candy-annotate swap-classes <images>     Flip Normal and Defect
//!   candy-annotate delete --yes <images>     Delete images and labels
//!   candy-annotate export [images]           Export a training dataset
//!   candy-annotate config                    Show or write the configuration

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use web_time::Instant;

use candy_annotate::constants::{
    DEFAULT_FILTER_MAX_SIZE, DEFAULT_FILTER_MIN_SIZE, DEFAULT_FRAME_INTERVAL_SECS,
    DEFAULT_MAX_FRAMES,
};
use candy_annotate::{
    AbortHandle, AnnotationStore, AppConfig, DetectorModel, ExtractFramesRequest, FileFilter,
    FileList, FilterBoxesRequest, HttpStore, TaskKind, TaskOutcome, TaskPoller, TaskTarget, batch,
    logging,
};

#[derive(Parser)]
#[command(name = "candy-annotate")]
#[command(about = "Bounding box labeling client for normal/defect inspection images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Server base URL (overrides the config file)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output; repeat for more
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Images a task runs on.
#[derive(clap::Args, Clone)]
struct TargetArgs {
    /// Explicit image names
    #[arg(short, long = "image", value_name = "NAME")]
    images: Vec<String>,

    /// Folder to process (all images when omitted)
    #[arg(short, long, conflicts_with = "images")]
    folder: Option<String>,
}

impl TargetArgs {
    fn target(self) -> TaskTarget {
        if self.images.is_empty() {
            TaskTarget::Folder(self.folder.unwrap_or_default())
        } else {
            TaskTarget::Images(self.images)
        }
    }
}

#[derive(ValueEnum, Clone, Copy)]
enum FilterArg {
    All,
    Labeled,
    Unlabeled,
}

impl From<FilterArg> for FileFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => FileFilter::All,
            FilterArg::Labeled => FileFilter::Labeled,
            FilterArg::Unlabeled => FileFilter::Unlabeled,
        }
    }
}

#[derive(ValueEnum, Clone, Copy)]
enum ModelArg {
    Yolov4,
    Yolov8,
}

impl From<ModelArg> for DetectorModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Yolov4 => DetectorModel::Yolov4,
            ModelArg::Yolov8 => DetectorModel::Yolov8,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List images with their label state
    List {
        #[arg(long, value_enum, default_value = "all")]
        filter: FilterArg,

        /// Only images in this folder
        #[arg(long)]
        folder: Option<String>,
    },

    /// Label images with the detector
    AutoLabel {
        #[command(flatten)]
        target: TargetArgs,

        /// Minimum detection confidence
        #[arg(long, default_value_t = 0.25)]
        confidence: f32,

        /// Replace existing labels
        #[arg(long)]
        overwrite: bool,

        #[arg(long, value_enum, default_value = "yolov8")]
        model: ModelArg,
    },

    /// Find near-duplicate images
    DetectDuplicates {
        #[command(flatten)]
        target: TargetArgs,

        /// Perceptual hash distance (0-64)
        #[arg(long, default_value_t = 5)]
        threshold: u32,
    },

    /// Find blank images
    DetectBlanks {
        #[command(flatten)]
        target: TargetArgs,

        /// Pixel standard deviation below which an image counts as blank
        #[arg(long, default_value_t = 25.0)]
        std_threshold: f32,
    },

    /// Drop boxes whose width or height is outside the size range
    FilterBoxes {
        #[command(flatten)]
        target: TargetArgs,

        /// Smallest accepted box side in pixels
        #[arg(long, default_value_t = DEFAULT_FILTER_MIN_SIZE)]
        min_size: u32,

        /// Largest accepted box side in pixels
        #[arg(long, default_value_t = DEFAULT_FILTER_MAX_SIZE)]
        max_size: u32,
    },

    /// Extract frames from the uploaded videos
    ExtractFrames {
        /// Seconds between frames
        #[arg(long, default_value_t = DEFAULT_FRAME_INTERVAL_SECS)]
        interval: u32,

        /// Frames taken from one video at most
        #[arg(long, default_value_t = DEFAULT_MAX_FRAMES)]
        max_frames: u32,
    },

    /// Flip Normal and Defect on every box of the given images
    SwapClasses {
        #[arg(required = true)]
        images: Vec<String>,
    },

    /// Delete images together with their labels
    Delete {
        #[arg(required = true)]
        images: Vec<String>,

        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },

    /// Export labeled images as a training dataset
    Export {
        /// Images to export (all when omitted)
        images: Vec<String>,
    },

    /// Print the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        write: bool,
    },
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::load_from_default_path().unwrap_or_default(),
    };
    if let Some(server) = &cli.server {
        config.server.base_url = server.clone();
    }
    Ok(config)
}

fn list(store: &HttpStore, filter: FileFilter, folder: Option<String>) -> Result<()> {
    let listing = store.list_images().context("Failed to list images")?;
    let mut files = FileList::from_listing(listing);
    files.set_filter(filter);
    files.set_folder(folder);

    for entry in files.filtered() {
        let state = if entry.labeled { "labeled" } else { "-" };
        println!("{:<8} {:<8} {}", state, entry.label_source.name(), entry.name);
    }
    let stats = files.stats();
    println!(
        "Total: {} | Labeled: {} | Unlabeled: {}",
        stats.total, stats.labeled, stats.unlabeled
    );
    Ok(())
}

fn run_task(store: &HttpStore, config: &AppConfig, kind: TaskKind) -> Result<()> {
    kind.validate().map_err(anyhow::Error::msg)?;

    let abort = AbortHandle::new();
    let on_interrupt = abort.clone();
    ctrlc::set_handler(move || on_interrupt.abort()).context("Failed to set Ctrl-C handler")?;

    let id = store
        .start_task(&kind)
        .with_context(|| format!("Failed to start {}", kind.name()))?;
    println!("Started {} (task {})", kind.name(), id);

    let poller = TaskPoller::new(id, &kind, abort.signal(), Instant::now())
        .with_interval(config.timing.task_poll_interval());
    let outcome = poller.wait(store, |progress| {
        println!(
            "{}: {}/{} ({}%)",
            kind.name(),
            progress.current,
            progress.total,
            progress.percent()
        );
    });

    match outcome {
        TaskOutcome::Completed(progress) => {
            println!("{} completed: {} images", kind.name(), progress.total);
            for key in [
                "total_detections",
                "labeled_count",
                "duplicate_count",
                "blank_count",
            ] {
                if let Some(count) = progress.count(key) {
                    println!("  {key}: {count}");
                }
            }
            if let Some(url) = progress.report_url.filter(|u| !u.is_empty()) {
                println!("  report: {url}");
            }
            Ok(())
        }
        TaskOutcome::Failed(message) => bail!("{} failed: {}", kind.name(), message),
        TaskOutcome::Cancelled => {
            println!("{} cancelled", kind.name());
            Ok(())
        }
    }
}

fn filter_boxes(store: &HttpStore, request: FilterBoxesRequest) -> Result<()> {
    request.validate().map_err(anyhow::Error::msg)?;
    let summary = store
        .filter_boxes(&request)
        .context("Failed to filter boxes")?;
    println!(
        "Files changed: {}/{}",
        summary.modified_files, summary.total_files
    );
    println!(
        "Boxes removed: {}/{}",
        summary.filtered_boxes, summary.total_boxes
    );
    if let Some(path) = summary.backup_path.filter(|p| !p.is_empty()) {
        println!("Backup: {path}");
    }
    Ok(())
}

fn print_report(action: &str, report: &batch::BatchReport) {
    println!("{action}: {} succeeded, {} failed", report.succeeded.len(), report.failed.len());
    for (name, error) in &report.failed {
        println!("  {name}: {error}");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let mut level = config.log_level;
    for _ in 0..cli.verbose {
        level = level.more_verbose();
    }
    logging::init(level);

    if let Commands::Config { write } = cli.command {
        println!("{}", config.to_json()?);
        if write {
            match &cli.config {
                Some(path) => config.save_to_path(path)?,
                None => config.save_to_default_path()?,
            }
        }
        return Ok(());
    }

    let store = HttpStore::from_config(&config.server)
        .with_context(|| format!("Invalid server URL {}", config.server.base_url))?;

    match cli.command {
        Commands::List { filter, folder } => list(&store, filter.into(), folder),
        Commands::AutoLabel {
            target,
            confidence,
            overwrite,
            model,
        } => run_task(
            &store,
            &config,
            TaskKind::AutoLabel {
                target: target.target(),
                confidence_threshold: confidence,
                overwrite,
                model: model.into(),
            },
        ),
        Commands::DetectDuplicates { target, threshold } => run_task(
            &store,
            &config,
            TaskKind::DetectDuplicates {
                target: target.target(),
                threshold,
            },
        ),
        Commands::DetectBlanks {
            target,
            std_threshold,
        } => run_task(
            &store,
            &config,
            TaskKind::DetectBlanks {
                target: target.target(),
                std_threshold,
            },
        ),
        Commands::FilterBoxes {
            target,
            min_size,
            max_size,
        } => {
            let request = match target.target() {
                TaskTarget::Images(images) => {
                    FilterBoxesRequest::new(min_size, max_size).with_images(images)
                }
                TaskTarget::Folder(folder) => {
                    FilterBoxesRequest::new(min_size, max_size).with_folder(folder)
                }
            };
            filter_boxes(&store, request)
        }
        Commands::ExtractFrames {
            interval,
            max_frames,
        } => {
            let request = ExtractFramesRequest {
                interval,
                max_frames,
            };
            request.validate().map_err(anyhow::Error::msg)?;
            let summary = store
                .extract_frames(&request)
                .context("Failed to extract frames")?;
            println!(
                "Extracted {} frames from {} videos",
                summary.total_frames, summary.videos_processed
            );
            Ok(())
        }
        Commands::SwapClasses { images } => {
            let mut on_progress = |done: usize, total: usize, name: &str| {
                log::info!("[{done}/{total}] {name}");
            };
            let report = batch::swap_classes(&store, &images, Some(&mut on_progress));
            print_report("Swap classes", &report);
            println!("Boxes changed: {}", report.boxes_touched);
            Ok(())
        }
        Commands::Delete { images, yes } => {
            if !yes {
                bail!(
                    "Refusing to delete {} images without --yes; this cannot be undone",
                    images.len()
                );
            }
            let report = batch::delete_images(&store, &images, None);
            print_report("Delete", &report);
            Ok(())
        }
        Commands::Export { images } => {
            let files = (!images.is_empty()).then_some(images.as_slice());
            let summary = store
                .export_dataset(files)
                .context("Failed to export dataset")?;
            println!(
                "Exported {} images to {}",
                summary.exported, summary.output_dir
            );
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}
