use clap::{Args, Parser, Subcommand, ValueEnum};
use shutterbatch::ops::{compress, delete, exif_offset, flatten, rename, strip};
use shutterbatch::probe::NoProbe;
use shutterbatch::types::{
    CompressRequest, ConflictPolicy, DatetimeSource, DeleteMode, DeleteRequest,
    ExifOffsetRequest, FlattenRequest, MetadataCategories, RenameRequest, StripPreset,
    StripRequest,
};
use std::path::PathBuf;

/// Batch file operations for photo and video collections.
///
/// Every command supports `--preview`, which prints the per-file plan as
/// JSON without touching the filesystem. During execution, progress events
/// stream to stderr as JSON lines; the final response goes to stdout.
#[derive(Parser)]
#[command(name = "shutterbatch", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct InputArgs {
    /// Input files and/or directories
    #[arg(long = "input", required = true, num_args = 1..)]
    input: Vec<PathBuf>,

    /// Recurse into subdirectories
    #[arg(long)]
    recursive: bool,
}

impl InputArgs {
    fn paths(&self) -> Vec<String> {
        self.input
            .iter()
            .map(|p| p.to_string_lossy().to_string())
            .collect()
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ConflictArg {
    Overwrite,
    Sequence,
    Skip,
}

impl From<ConflictArg> for ConflictPolicy {
    fn from(value: ConflictArg) -> Self {
        match value {
            ConflictArg::Overwrite => ConflictPolicy::Overwrite,
            ConflictArg::Sequence => ConflictPolicy::Sequence,
            ConflictArg::Skip => ConflictPolicy::Skip,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    CaptureThenModified,
    ModifiedOnly,
    CurrentTime,
}

impl From<SourceArg> for DatetimeSource {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::CaptureThenModified => DatetimeSource::CaptureThenModified,
            SourceArg::ModifiedOnly => DatetimeSource::ModifiedOnly,
            SourceArg::CurrentTime => DatetimeSource::CurrentTime,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DeleteModeArg {
    Direct,
    Trash,
    Retreat,
}

impl From<DeleteModeArg> for DeleteMode {
    fn from(value: DeleteModeArg) -> Self {
        match value {
            DeleteModeArg::Direct => DeleteMode::Direct,
            DeleteModeArg::Trash => DeleteMode::Trash,
            DeleteModeArg::Retreat => DeleteMode::Retreat,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum PresetArg {
    SnsPublish,
    Delivery,
    FullClean,
    Custom,
}

impl From<PresetArg> for StripPreset {
    fn from(value: PresetArg) -> Self {
        match value {
            PresetArg::SnsPublish => StripPreset::SnsPublish,
            PresetArg::Delivery => StripPreset::Delivery,
            PresetArg::FullClean => StripPreset::FullClean,
            PresetArg::Custom => StripPreset::Custom,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum CategoryArg {
    Gps,
    CameraLens,
    Software,
    AuthorCopyright,
    Comments,
    Thumbnail,
    Iptc,
    Xmp,
    ShootingSettings,
    CaptureDateTime,
}

fn categories_from(args: &[CategoryArg]) -> MetadataCategories {
    let mut cats = MetadataCategories::default();
    for arg in args {
        match arg {
            CategoryArg::Gps => cats.gps = true,
            CategoryArg::CameraLens => cats.camera_lens = true,
            CategoryArg::Software => cats.software = true,
            CategoryArg::AuthorCopyright => cats.author_copyright = true,
            CategoryArg::Comments => cats.comments = true,
            CategoryArg::Thumbnail => cats.thumbnail = true,
            CategoryArg::Iptc => cats.iptc = true,
            CategoryArg::Xmp => cats.xmp = true,
            CategoryArg::ShootingSettings => cats.shooting_settings = true,
            CategoryArg::CaptureDateTime => cats.capture_datetime = true,
        }
    }
    cats
}

#[derive(Subcommand)]
enum Command {
    /// Rename files from a template
    Rename {
        #[command(flatten)]
        input: InputArgs,
        /// Template, e.g. "{capture_date:YYYYMMDD}_{seq:3}"
        #[arg(long)]
        template: String,
        /// Where the per-file datetime comes from
        #[arg(long, value_enum, default_value = "capture-then-modified")]
        source: SourceArg,
        /// Output directory (defaults to in-place rename)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "sequence")]
        conflict: ConflictArg,
        /// Print the plan without executing
        #[arg(long)]
        preview: bool,
    },
    /// Delete files by extension
    Delete {
        #[command(flatten)]
        input: InputArgs,
        /// Extensions to match (no leading dot)
        #[arg(long = "ext", required = true, num_args = 1..)]
        extensions: Vec<String>,
        #[arg(long, value_enum)]
        mode: DeleteModeArg,
        /// Required for --mode retreat
        #[arg(long)]
        retreat_dir: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "sequence")]
        conflict: ConflictArg,
        #[arg(long)]
        preview: bool,
    },
    /// Recompress JPEGs
    Compress {
        #[command(flatten)]
        input: InputArgs,
        /// Resize percentage (1-100)
        #[arg(long, default_value_t = 100.0)]
        resize: f32,
        /// JPEG quality (1-100)
        #[arg(long, default_value_t = 85)]
        quality: u8,
        /// Solve resize/quality for this total output size
        #[arg(long)]
        target_kb: Option<u64>,
        /// Tolerance around the target, percent
        #[arg(long)]
        tolerance: Option<f32>,
        /// Carry the EXIF segment into the output
        #[arg(long)]
        preserve_exif: bool,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "sequence")]
        conflict: ConflictArg,
        #[arg(long)]
        preview: bool,
    },
    /// Copy a directory tree into one flat directory
    Flatten {
        #[arg(long)]
        input_dir: PathBuf,
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "sequence")]
        conflict: ConflictArg,
        #[arg(long)]
        preview: bool,
    },
    /// Shift EXIF capture datetimes by whole seconds
    ExifOffset {
        #[command(flatten)]
        input: InputArgs,
        /// Signed offset in seconds, e.g. -3600
        #[arg(long, allow_hyphen_values = true)]
        offset_seconds: i64,
        #[arg(long)]
        preview: bool,
    },
    /// Strip metadata categories from JPEGs
    Strip {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, value_enum, default_value = "custom")]
        preset: PresetArg,
        /// Categories for --preset custom
        #[arg(long = "category", value_enum, num_args = 0..)]
        categories: Vec<CategoryArg>,
        #[arg(long)]
        preview: bool,
    },
    /// List the rename template tags
    Tags,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn progress_to_stderr(event: shutterbatch::progress::OperationProgressEvent) {
    if let Ok(line) = serde_json::to_string(&event) {
        eprintln!("{line}");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Rename {
            input,
            template,
            source,
            output_dir,
            conflict,
            preview,
        } => {
            let request = RenameRequest {
                input_paths: input.paths(),
                include_subfolders: input.recursive,
                template,
                source: source.into(),
                output_dir: output_dir.map(|p| p.to_string_lossy().to_string()),
                conflict_policy: Some(conflict.into()),
            };
            if preview {
                print_json(&rename::preview(&request, &NoProbe)?)?;
            } else {
                print_json(&rename::execute(&request, &NoProbe, &mut progress_to_stderr)?)?;
            }
        }
        Command::Delete {
            input,
            extensions,
            mode,
            retreat_dir,
            conflict,
            preview,
        } => {
            let request = DeleteRequest {
                input_paths: input.paths(),
                include_subfolders: input.recursive,
                extensions,
                mode: mode.into(),
                retreat_dir: retreat_dir.map(|p| p.to_string_lossy().to_string()),
                conflict_policy: Some(conflict.into()),
            };
            if preview {
                print_json(&delete::preview(&request)?)?;
            } else {
                print_json(&delete::execute(&request, &mut progress_to_stderr)?)?;
            }
        }
        Command::Compress {
            input,
            resize,
            quality,
            target_kb,
            tolerance,
            preserve_exif,
            output_dir,
            conflict,
            preview,
        } => {
            let request = CompressRequest {
                input_paths: input.paths(),
                include_subfolders: input.recursive,
                resize_percent: resize,
                quality,
                target_size_kb: target_kb,
                tolerance_percent: tolerance,
                preserve_exif,
                output_dir: output_dir.map(|p| p.to_string_lossy().to_string()),
                conflict_policy: conflict.into(),
            };
            if preview {
                print_json(&compress::preview(&request)?)?;
            } else {
                let mut estimate_to_stderr = |event: shutterbatch::progress::EstimateProgressEvent| {
                    if let Ok(line) = serde_json::to_string(&event) {
                        eprintln!("{line}");
                    }
                };
                print_json(&compress::execute(
                    &request,
                    &mut progress_to_stderr,
                    &mut estimate_to_stderr,
                )?)?;
            }
        }
        Command::Flatten {
            input_dir,
            output_dir,
            conflict,
            preview,
        } => {
            let request = FlattenRequest {
                input_dir: input_dir.to_string_lossy().to_string(),
                output_dir: output_dir.map(|p| p.to_string_lossy().to_string()),
                conflict_policy: conflict.into(),
            };
            if preview {
                print_json(&flatten::preview(&request)?)?;
            } else {
                print_json(&flatten::execute(&request, &mut progress_to_stderr)?)?;
            }
        }
        Command::ExifOffset {
            input,
            offset_seconds,
            preview,
        } => {
            let request = ExifOffsetRequest {
                input_paths: input.paths(),
                include_subfolders: input.recursive,
                offset_seconds,
            };
            if preview {
                print_json(&exif_offset::preview(&request)?)?;
            } else {
                print_json(&exif_offset::execute(&request, &mut progress_to_stderr)?)?;
            }
        }
        Command::Strip {
            input,
            preset,
            categories,
            preview,
        } => {
            let request = StripRequest {
                input_paths: input.paths(),
                include_subfolders: input.recursive,
                preset: preset.into(),
                categories: categories_from(&categories),
            };
            if preview {
                print_json(&strip::preview(&request)?)?;
            } else {
                print_json(&strip::execute(&request, &mut progress_to_stderr)?)?;
            }
        }
        Command::Tags => {
            print_json(&shutterbatch::template::tag_catalog())?;
        }
    }

    Ok(())
}
