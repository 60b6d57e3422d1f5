//! Command-line interface definitions and argument parsing

use crate::data::DEFAULT_DELIMITER;
use crate::features::{parse_decimal, FEATURE_DIM};
use crate::model::{BackendKind, ClusteringEngine, EmptyClusterPolicy, EngineConfig};
use clap::Parser;
use std::path::PathBuf;

/// Customer segmentation CLI using K-Means clustering on transaction data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the input CSV file
    #[arg(short, long, default_value = "resources/customer_data.csv")]
    pub input: PathBuf,

    /// Field delimiter of the input file
    #[arg(short, long, default_value_t = DEFAULT_DELIMITER as char)]
    pub delimiter: char,

    /// Number of clusters for K-Means
    #[arg(short = 'k', long, default_value = "5")]
    pub clusters: usize,

    /// Output path for the visualization plot
    #[arg(short, long, default_value = "cluster_plot.png")]
    pub output: PathBuf,

    /// Skip writing the PNG plots
    #[arg(long)]
    pub no_plot: bool,

    /// Prediction mode: provide spend,purchases,unique-products as comma-separated string
    /// Example: --predict "1250.5,40,18"
    #[arg(short, long)]
    pub predict: Option<String>,

    /// Maximum iterations for K-Means algorithm
    #[arg(long, default_value = "100")]
    pub max_iters: usize,

    /// Tolerance for K-Means convergence
    #[arg(long, default_value = "1e-4")]
    pub tolerance: f64,

    /// Seed for centroid initialization
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Clustering implementation
    #[arg(long, value_enum, default_value_t = BackendKind::Lloyd)]
    pub backend: BackendKind,

    /// Handling of clusters that lose all members
    #[arg(long, value_enum, default_value_t = EmptyClusterPolicy::KeepPrevious)]
    pub empty_cluster: EmptyClusterPolicy,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Delimiter as a single byte
    pub fn delimiter_byte(&self) -> crate::Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| anyhow::anyhow!("Delimiter must be an ASCII character, got {:?}", self.delimiter))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(self.clusters)
            .with_max_iterations(self.max_iters)
            .with_tolerance(self.tolerance)
            .with_seed(self.seed)
            .with_empty_cluster_policy(self.empty_cluster)
    }

    pub fn engine(&self) -> ClusteringEngine {
        ClusteringEngine::with_backend(self.backend.into_backend(), self.engine_config())
    }

    /// Parse feature values from the predict string
    /// Expected format: "spend,purchases,unique_products"
    /// Spend may use `.` as decimal separator only, since `,` separates the values.
    pub fn parse_feature_values(&self) -> crate::Result<Option<[f64; FEATURE_DIM]>> {
        let Some(ref predict_str) = self.predict else {
            return Ok(None);
        };

        let parts: Vec<&str> = predict_str.split(',').collect();
        if parts.len() != FEATURE_DIM {
            anyhow::bail!("Predict values must be in format 'spend,purchases,unique_products'");
        }

        let mut values = [0.0; FEATURE_DIM];
        for (value, part) in values.iter_mut().zip(&parts) {
            *value = parse_decimal("predict", part)
                .map_err(|_| anyhow::anyhow!("Invalid predict value: {}", part))?;
        }

        Ok(Some(values))
    }
}
