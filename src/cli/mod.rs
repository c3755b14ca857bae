//! Command-line interface for the locomotion dataset exporter.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{PipelineConfig, Preset};
use crate::core::loaders::{self, read_metadata, read_payload};
use crate::core::writers::{write_clip, write_rows_csv};
use crate::processors::sequence::{FeaturePipeline, RunOutcome};
use crate::synthetic::walking_clip_document;

#[derive(Parser)]
#[command(name = "locomotion-dataset")]
#[command(about = "Locomotion feature extraction and dataset export", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum PresetArg {
    Locomotion,
    ModeAdaptive,
}

impl From<PresetArg> for Preset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Locomotion => Preset::Locomotion,
            PresetArg::ModeAdaptive => Preset::ModeAdaptive,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract features from clips and export them as a dataset
    Export {
        /// Clip files (.json, .yaml or .yml), exported in order
        #[arg(required = true)]
        clips: Vec<PathBuf>,
        /// Output directory for the dataset
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Configuration preset (ignored when --config is given)
        #[arg(long, value_enum)]
        preset: Option<PresetArg>,
        /// Dataset name used in the sequences file name
        #[arg(long)]
        name: Option<String>,
        /// Replace an existing dataset instead of appending to it
        #[arg(long)]
        overwrite: bool,
        /// Process frames on a single thread
        #[arg(long)]
        sequential: bool,
    },

    /// Report the widths and row counts of an exported dataset
    Inspect {
        /// Dataset directory
        directory: PathBuf,
    },

    /// Write dataset rows to CSV with their column names
    Dump {
        /// Dataset directory
        directory: PathBuf,
        /// Output CSV file
        output: PathBuf,
        /// Dump output rows (data_Y.bin) instead of input rows
        #[arg(long)]
        outputs: bool,
        /// Maximum number of rows to write
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Write a synthetic straight-walking clip
    Synth {
        /// Output clip file (.json, .yaml or .yml)
        path: PathBuf,
        /// Clip length in frames
        #[arg(long, default_value_t = 600)]
        frames: usize,
        /// Walking speed in metres per second
        #[arg(long, default_value_t = 1.0)]
        speed: f32,
        /// Heading in degrees from +Z
        #[arg(long, default_value_t = 0.0)]
        heading: f32,
    },

    /// Write a preset configuration as YAML
    InitConfig {
        /// Output YAML file
        path: PathBuf,
        /// Configuration preset
        #[arg(long, value_enum, default_value = "locomotion")]
        preset: PresetArg,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Create a progress bar over `len` items
fn create_progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let result = match cli.command {
        Commands::Export {
            clips,
            output_dir,
            preset,
            name,
            overwrite,
            sequential,
        } => load_config(cli.config.as_deref(), preset).and_then(|mut config| {
            if let Some(dir) = output_dir {
                config.export.directory = dir;
            }
            if let Some(name) = name {
                config.export.dataset_name = name;
            }
            apply_run_flags(&mut config, overwrite, sequential);
            cmd_export(&clips, config)
        }),
        Commands::Inspect { directory } => cmd_inspect(&directory),
        Commands::Dump {
            directory,
            output,
            outputs,
            limit,
        } => cmd_dump(&directory, &output, outputs, limit),
        Commands::Synth {
            path,
            frames,
            speed,
            heading,
        } => load_config(cli.config.as_deref(), None)
            .and_then(|config| cmd_synth(&path, frames, speed, heading, &config)),
        Commands::InitConfig { path, preset } => cmd_init_config(&path, preset),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Config file if given, else the preset (default locomotion).
///
/// A config file that cannot be read, parsed or validated is an error.
fn load_config(path: Option<&Path>, preset: Option<PresetArg>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::preset(preset.map_or(Preset::Locomotion, Preset::from)));
    };
    let config = PipelineConfig::from_yaml(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    info!("Loaded config from: {}", path.display());
    if preset.is_some() {
        warn!("--preset is ignored when --config is given");
    }
    Ok(config)
}

/// Command-line switches only ever turn their setting on; without them the
/// config file decides.
fn apply_run_flags(config: &mut PipelineConfig, overwrite: bool, sequential: bool) {
    if overwrite {
        config.export.overwrite = true;
    }
    if sequential {
        config.processing.parallel = false;
    }
}

fn cmd_export(clips: &[PathBuf], config: PipelineConfig) -> Result<()> {
    let start = Instant::now();
    let overwrite_first = config.export.overwrite;
    let mut pipeline = FeaturePipeline::new(config).context("invalid configuration")?;

    println!("Exporting {} clip(s)...", clips.len());
    println!("Output directory: {}", pipeline.config().export.directory.display());

    let progress = create_progress_bar(clips.len());
    let mut total_rows = 0;
    let mut skipped = 0;
    let mut last_summary = None;

    for (i, clip) in clips.iter().enumerate() {
        progress.set_message(clip.display().to_string());

        // Only the first clip may replace an existing dataset.
        pipeline.config_mut().export.overwrite = overwrite_first && i == 0;

        let mut bundle = loaders::load_clip(clip, pipeline.config())
            .with_context(|| format!("failed to load clip {}", clip.display()))?;
        if let Some(poses) = bundle.poses.as_mut() {
            if poses.info.sequence_id < 0 {
                poses.info.sequence_id = i as i64;
            }
        }

        match pipeline
            .run(&bundle)
            .with_context(|| format!("failed to export clip {}", clip.display()))?
        {
            RunOutcome::Complete(summary) => {
                total_rows += summary.rows_written;
                last_summary = Some(summary);
            }
            RunOutcome::NotReady => {
                warn!("Clip {} is missing inputs, skipped", clip.display());
                skipped += 1;
            }
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    let (input_width, output_width, dataset_rows) = last_summary
        .map(|s| (s.input_width, s.output_width, s.total_rows))
        .unwrap_or_default();

    print_summary(
        "Export Complete",
        &[
            ("Output directory", pipeline.config().export.directory.display().to_string()),
            ("Dataset name", pipeline.config().export.dataset_name.clone()),
            ("Clips exported", (clips.len() - skipped).to_string()),
            ("Rows written", total_rows.to_string()),
            ("Rows in dataset", dataset_rows.to_string()),
            ("Input width", input_width.to_string()),
            ("Output width", output_width.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_inspect(directory: &Path) -> Result<()> {
    let metadata_path = directory.join("metadata.txt");
    let metadata = read_metadata(&metadata_path)
        .with_context(|| format!("failed to read {}", metadata_path.display()))?;

    let spinner = create_spinner("Reading payloads...");
    let inputs = read_payload(&directory.join("data_X.bin"), metadata.input_width)
        .context("failed to read input payload")?;
    let outputs = read_payload(&directory.join("data_Y.bin"), metadata.output_width)
        .context("failed to read output payload")?;
    spinner.finish_and_clear();

    let non_finite = inputs
        .iter()
        .chain(outputs.iter())
        .flatten()
        .filter(|v| !v.is_finite())
        .count();
    let consistent = inputs.len() == outputs.len() && non_finite == 0;
    if !consistent {
        warn!(
            "Dataset is inconsistent: {} input rows, {} output rows, {} non-finite values",
            inputs.len(),
            outputs.len(),
            non_finite
        );
    }

    print_summary(
        "Dataset",
        &[
            ("Directory", directory.display().to_string()),
            ("Input width", metadata.input_width.to_string()),
            ("Output width", metadata.output_width.to_string()),
            ("Input rows", inputs.len().to_string()),
            ("Output rows", outputs.len().to_string()),
            ("Non-finite values", non_finite.to_string()),
            ("Consistent", consistent.to_string()),
        ],
    );
    Ok(())
}

fn cmd_dump(directory: &Path, output: &Path, outputs: bool, limit: Option<usize>) -> Result<()> {
    let start = Instant::now();
    let metadata = read_metadata(&directory.join("metadata.txt")).context("failed to read metadata")?;
    let (payload, width, columns) = if outputs {
        ("data_Y.bin", metadata.output_width, metadata.output_columns)
    } else {
        ("data_X.bin", metadata.input_width, metadata.input_columns)
    };
    if columns.len() != width {
        bail!("metadata names {} columns for {}-wide rows", columns.len(), width);
    }

    let rows = read_payload(&directory.join(payload), width)
        .with_context(|| format!("failed to read {}", payload))?;
    let take = limit.unwrap_or(rows.len()).min(rows.len());
    let data: Vec<f32> = rows.into_iter().take(take).flatten().collect();

    let written = write_rows_csv(output, &columns, &data)
        .with_context(|| format!("failed to write {}", output.display()))?;

    print_summary(
        "Dump Complete",
        &[
            ("Payload", directory.join(payload).display().to_string()),
            ("Output CSV", output.display().to_string()),
            ("Rows", written.to_string()),
            ("Columns", width.to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn cmd_synth(path: &Path, frames: usize, speed: f32, heading: f32, config: &PipelineConfig) -> Result<()> {
    let clip = walking_clip_document(frames, speed, heading.to_radians(), &config.sequence);
    write_clip(path, &clip).with_context(|| format!("failed to write clip {}", path.display()))?;

    print_summary(
        "Synthetic Clip Written",
        &[
            ("Output", path.display().to_string()),
            ("Frames", frames.to_string()),
            ("Speed (m/s)", speed.to_string()),
            ("Heading (deg)", heading.to_string()),
        ],
    );
    Ok(())
}

fn cmd_init_config(path: &Path, preset: PresetArg) -> Result<()> {
    let config = PipelineConfig::preset(preset.into());
    config
        .to_yaml(path)
        .with_context(|| format!("failed to write config {}", path.display()))?;
    println!("Wrote {} configuration to {}", config.export.dataset_name, path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_config_without_file_uses_preset() {
        let config = load_config(None, Some(PresetArg::ModeAdaptive)).unwrap();
        assert_eq!(config.export.dataset_name, "mann");
    }

    #[test]
    fn test_load_config_fails_on_bad_file() {
        let dir = tempdir().unwrap();

        let missing = dir.path().join("missing.yaml");
        let err = load_config(Some(&missing), None).unwrap_err();
        assert!(format!("{err:#}").contains("failed to load config"));

        let garbled = dir.path().join("garbled.yaml");
        std::fs::write(&garbled, "window: [not, a, map").unwrap();
        assert!(load_config(Some(&garbled), None).is_err());
    }

    #[test]
    fn test_run_flags_keep_config_settings() {
        let mut config = PipelineConfig::default();
        config.export.overwrite = true;
        apply_run_flags(&mut config, false, false);
        assert!(config.export.overwrite);
        assert!(config.processing.parallel);

        let mut config = PipelineConfig::default();
        apply_run_flags(&mut config, true, true);
        assert!(config.export.overwrite);
        assert!(!config.processing.parallel);
    }
}
