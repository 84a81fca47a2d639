use clap::{Parser, Subcommand};
use printcrop::catalog::SizeCatalog;
use printcrop::config::{self, AppConfig};
use printcrop::export::{CancelToken, ExportOptions, export_project};
use printcrop::geometry::ImageRect;
use printcrop::imaging::{ImageBackend, RustBackend};
use printcrop::output;
use printcrop::project::{Project, ProjectError, ProjectOptions};
use printcrop::resolve::CropEngine;
use printcrop::saliency::EnergySaliency;
use printcrop::store::JsonStore;
use printcrop::tag::{CropSettings, ImageId};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the per-project config file looked up in the input directory.
const PROJECT_CONFIG: &str = "printcrop.toml";

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "printcrop")]
#[command(about = "Tag photos with print sizes and export print-ready crops")]
#[command(long_about = "\
Tag photos with print sizes and export print-ready crops

Every photo in the input directory can be tagged with a size group (an
album, a frame set) and a print size from that group. Tagged photos are
exported to <output>/<group>/<size>/<name>.jpg, cut to the size's aspect
ratio: either a crop you set by hand, or one chosen automatically around
the most detailed part of the picture.

Size groups are configured in printcrop.toml:

  [size_groups.Album]
  sizes = [
      { name = \"6x4\" },                # ratio parsed from the name: 1.5
      { name = \"5x7\", ratio = 1.4 },
      { name = \"Square\", ratio = 1.0 },
  ]

Tags and crops are saved immediately; there is no save step.

Run 'printcrop gen-config' to generate a documented printcrop.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Project name; state is stored per project
    #[arg(long, default_value = "default", global = true)]
    project: String,

    /// Directory containing the photos
    #[arg(long, default_value = ".", global = true)]
    input: PathBuf,

    /// Directory exported prints are written to
    #[arg(long, default_value = "prints", global = true)]
    output: PathBuf,

    /// Where project state is kept (default: <input>/.printcrop)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Extra config files, applied after <input>/printcrop.toml
    #[arg(long = "config", global = true)]
    configs: Vec<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every photo with its tag, crop, and status
    Status,
    /// Tag a photo with a size group and a print size
    Tag {
        image: String,
        group: String,
        size: String,
    },
    /// Tag a photo with a size group only
    Group { image: String, group: String },
    /// Remove a photo's tags and crop
    Untag { image: String },
    /// Set a manual crop in full-image pixels
    #[command(allow_negative_numbers = true)]
    Crop {
        image: String,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    /// Remove a photo's manual crop
    Uncrop { image: String },
    /// Show the crop a photo would be exported with
    Resolve { image: String },
    /// Export every tagged photo
    Export,
    /// List configured size groups and sizes
    Sizes,
    /// Print a stock printcrop.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let mut config_paths = vec![cli.input.join(PROJECT_CONFIG)];
    config_paths.extend(cli.configs.iter().cloned());

    match &cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            return Ok(());
        }
        Command::Sizes => {
            let config = config::load_config(&config_paths)?;
            output::print_sizes(&SizeCatalog::from_config(&config)?);
            return Ok(());
        }
        _ => {}
    }

    let config = load_config_and_size_pool(&config_paths)?;
    let catalog = Arc::new(SizeCatalog::from_config(&config)?);
    let settings = CropSettings::from(&config.crop);
    let backend = RustBackend::new();
    let project = open_project(&cli, &config, catalog.clone(), settings, &backend)?;

    match cli.command {
        Command::Status => {
            output::print_status(&project.records(), &project.status_counts());
        }
        Command::Tag { image, group, size } => {
            let id = ImageId::new(image);
            project.set_tags(&id, &group, &size)?;
            print_current(&project, &id)?;
        }
        Command::Group { image, group } => {
            let id = ImageId::new(image);
            project.set_size_group(&id, &group)?;
            print_current(&project, &id)?;
        }
        Command::Untag { image } => {
            let id = ImageId::new(image);
            project.clear_tags(&id)?;
            print_current(&project, &id)?;
        }
        Command::Crop {
            image,
            x,
            y,
            width,
            height,
        } => {
            let id = ImageId::new(image);
            project.set_crop_box(&id, ImageRect::new(x, y, width, height))?;
            print_current(&project, &id)?;
        }
        Command::Uncrop { image } => {
            let id = ImageId::new(image);
            project.clear_crop_box(&id)?;
            print_current(&project, &id)?;
        }
        Command::Resolve { image } => {
            let id = ImageId::new(image);
            let record = project
                .record(&id)
                .ok_or_else(|| ProjectError::UnknownImage(id.clone()))?;
            let full_image = backend.decode(&project.source_path(&id))?;
            let engine = CropEngine::new(&catalog, settings, &backend, &EnergySaliency);
            output::print_resolved(&id, &engine.resolve(&record, &full_image)?);
        }
        Command::Export => {
            let mut options = ExportOptions::from_config(&cli.output, &config.export);
            if options.stamp && !backend.has_stamp() {
                log::warn!("date_stamp is enabled but no stamp is available; exporting unstamped");
                options.stamp = false;
            }

            let (tx, rx) = std::sync::mpsc::channel();
            let output_root = options.output_root.clone();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_export_event(&event, &output_root) {
                        println!("{}", line);
                    }
                }
            });
            let report = export_project(
                &project,
                &backend,
                &EnergySaliency,
                &options,
                &CancelToken::new(),
                Some(tx),
            );
            printer.join().map_err(|_| "output thread panicked")?;
            output::print_export_report(&report);
            if !report.failed.is_empty() {
                return Err(format!("{} photos failed to export", report.failed.len()).into());
            }
        }
        Command::Sizes | Command::GenConfig => {}
    }

    Ok(())
}

fn open_project(
    cli: &Cli,
    config: &AppConfig,
    catalog: Arc<SizeCatalog>,
    settings: CropSettings,
    backend: &RustBackend,
) -> Result<Project, Box<dyn std::error::Error>> {
    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(|| default_data_dir(&cli.input));
    let store = Arc::new(JsonStore::new(data_dir));
    let options = ProjectOptions::new(cli.project.clone(), cli.input.clone())
        .with_extensions(&config.scan.extensions);
    let (project, report) = Project::open(options, catalog, settings, store, backend)?;
    output::print_load_report(&report);
    Ok(project)
}

fn default_data_dir(input: &Path) -> PathBuf {
    input.join(".printcrop")
}

fn print_current(project: &Project, id: &ImageId) -> Result<(), ProjectError> {
    let record = project
        .record(id)
        .ok_or_else(|| ProjectError::UnknownImage(id.clone()))?;
    output::print_record(&record);
    Ok(())
}

/// Load configuration and size the global rayon pool from it.
///
/// Opening a project already inspects files in parallel, so the pool has to
/// be sized before that first parallel call or the setting is lost.
fn load_config_and_size_pool(paths: &[PathBuf]) -> Result<AppConfig, config::ConfigError> {
    let config = config::load_config(paths)?;
    init_thread_pool(&config.processing);
    Ok(config)
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        log::warn!("cannot size the worker pool to {threads} threads: {e}");
    }
}
