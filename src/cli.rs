use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};
use undertow_data::DatasetConfig;

use crate::error::AppError;

#[derive(Parser)]
#[command(author, version, about = "Fluid simulation dataset pipeline")]
pub struct Cli {
    /// YAML file with dataset settings; flags below override it
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Default)]
pub struct Overrides {
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    pub data_root: Option<PathBuf>,
    #[arg(long, global = true)]
    pub dataset: Option<String>,
    #[arg(long, global = true)]
    pub run_prefix: Option<String>,
    #[arg(long, global = true)]
    pub ignore_frames: Option<usize>,
    #[arg(long, global = true)]
    pub border_width: Option<usize>,
    #[arg(long, global = true)]
    pub batch_size: Option<usize>,
    #[arg(long, global = true)]
    pub workers: Option<usize>,
    #[arg(long, global = true)]
    pub divergence_threshold: Option<f32>,
    #[arg(long, global = true)]
    pub seed: Option<u64>,
    #[arg(long, global = true, value_hint = ValueHint::DirPath)]
    pub cache_dir: Option<PathBuf>,

    /// Enable random axis flips
    #[arg(long, global = true)]
    pub augment: bool,
    #[arg(long, global = true)]
    pub flip_probability: Option<f32>,

    /// Store cache entries quantized
    #[arg(long, global = true)]
    pub compress: bool,
    /// Quantization error bound, relative to the largest magnitude of each field
    #[arg(long, global = true)]
    pub accuracy: Option<f32>,
}

impl Overrides {
    pub fn apply(&self, config: &mut DatasetConfig) {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(value) = value {
                *target = value.clone();
            }
        }

        set(&mut config.data_root, &self.data_root);
        set(&mut config.dataset, &self.dataset);
        set(&mut config.run_prefix, &self.run_prefix);
        set(&mut config.ignore_frames, &self.ignore_frames);
        set(&mut config.border_width, &self.border_width);
        set(&mut config.batch_size, &self.batch_size);
        set(&mut config.workers, &self.workers);
        set(&mut config.divergence_threshold, &self.divergence_threshold);
        set(&mut config.seed, &self.seed);
        set(&mut config.augment.flip_probability, &self.flip_probability);
        set(&mut config.compression.accuracy, &self.accuracy);

        if self.cache_dir.is_some() {
            config.cache_dir = self.cache_dir.clone();
        }
        config.augment.enabled |= self.augment;
        config.compression.enabled |= self.compress;
    }
}

impl Cli {
    /// Settings from the YAML file, or the defaults, with command-line overrides applied.
    pub fn dataset_config(&self) -> Result<DatasetConfig, AppError> {
        let mut config = match &self.config {
            Some(path) => DatasetConfig::from_yaml_file(path)?,
            None => DatasetConfig::default(),
        };
        self.overrides.apply(&mut config);

        Ok(config)
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Scan, validate and cache every run, then write the dataset manifest
    Build {
        /// Rebuild even if a matching manifest exists
        #[arg(long)]
        force: bool,
    },

    /// Print per-field mean, standard deviation and L2 norm over the whole dataset
    Stats,

    /// Fill one batch and report the augmentation applied to each sample
    Batch {
        /// First sample of the batch
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Write every filled sample back out as a frame pair in this directory
        #[arg(long, value_hint = ValueHint::DirPath)]
        dump: Option<PathBuf>,
    },

    /// Step through a cached run and write its pressure as voxel boxes
    Replay {
        /// Run to replay; the first accepted run by default
        #[arg(long)]
        run: Option<String>,

        #[arg(long, default_value = "output", value_hint = ValueHint::DirPath)]
        output: PathBuf,

        /// Save every Nth frame
        #[arg(long, default_value_t = 1)]
        every: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "undertow",
            "stats",
            "--dataset",
            "smoke",
            "--workers",
            "4",
            "--augment",
            "--flip-probability",
            "0.25",
        ]);

        let config = cli.dataset_config().unwrap();

        assert_eq!(config.dataset, "smoke");
        assert_eq!(config.workers, 4);
        assert!(config.augment.enabled);
        assert_eq!(config.augment.flip_probability, 0.25);
        assert_eq!(config.border_width, DatasetConfig::default().border_width);
        assert!(matches!(cli.command, Command::Stats));
    }

    #[test]
    fn yaml_settings_are_overridden_by_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset.yaml");
        std::fs::write(&path, "dataset: from_file\nborder_width: 2\nseed: 9\n").unwrap();

        let cli = Cli::parse_from([
            "undertow",
            "--config",
            path.to_str().unwrap(),
            "replay",
            "--seed",
            "3",
            "--every",
            "5",
        ]);
        let config = cli.dataset_config().unwrap();

        assert_eq!(config.dataset, "from_file");
        assert_eq!(config.border_width, 2);
        assert_eq!(config.seed, 3);
        assert!(matches!(cli.command, Command::Replay { every: 5, .. }));
    }
}
