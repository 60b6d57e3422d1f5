//! custseg: customer segmentation CLI
//!
//! Loads transaction rows, aggregates per-customer features, clusters them and
//! reports the segments, optionally predicting the segment of a new customer.

use anyhow::Result;
use clap::Parser;
use custseg::{report, run_pipeline, viz, Args, Segmentation};
use env_logger::Env;
use std::time::Instant;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::init_from_env(Env::default().filter_or("RUST_LOG", default_filter));

    if args.verbose {
        println!("custseg - Customer Segmentation using K-Means");
        println!("=============================================\n");
    }

    // Validate prediction input before doing any work
    let predict_values = args.parse_feature_values()?;

    let segmentation = run_segmentation(&args)?;

    match predict_values {
        Some(values) => run_prediction(&segmentation, values)?,
        None => run_reporting(&args, &segmentation)?,
    }

    Ok(())
}

/// Load data and fit the model
fn run_segmentation(args: &Args) -> Result<Segmentation> {
    let start_time = Instant::now();

    if args.verbose {
        println!("Step 1: Loading and aggregating data");
        println!("  Input file: {}", args.input.display());
        println!("\nStep 2: Fitting K-Means model");
        println!("  Backend: {:?}", args.backend);
        println!("  Number of clusters: {}", args.clusters);
        println!("  Max iterations: {}", args.max_iters);
        println!("  Tolerance: {}", args.tolerance);
        println!("  Seed: {}", args.seed);
        println!("  Empty clusters: {:?}", args.empty_cluster);
    }

    let engine = args.engine();
    let segmentation = run_pipeline(&args.input, args.delimiter_byte()?, &engine)?;

    println!(
        "✓ Data loaded: {} customers ({} rows skipped, {} rows without customer)",
        segmentation.customers.len(),
        segmentation.stats.rows_skipped,
        segmentation.rows_without_customer
    );
    println!("✓ Model fitted successfully");
    if args.verbose {
        println!("  Processing time: {:.2}s", start_time.elapsed().as_secs_f64());
        println!("  Features shape: {:?}", segmentation.features.shape());
    }

    Ok(segmentation)
}

/// Predict the cluster of a single new customer
fn run_prediction(segmentation: &Segmentation, values: [f64; 3]) -> Result<()> {
    let model = &segmentation.model;
    println!("\n=== Prediction Mode ===");
    println!(
        "Input features: spent={}, purchases={}, unique products={}",
        values[0], values[1], values[2]
    );

    let cluster = model.predict(&values)?;
    println!("\n✓ Predicted Cluster: {}", cluster);

    let cluster_sizes = model.cluster_sizes();
    let total_customers = segmentation.customers.len();
    let cluster_percentage = cluster_sizes[cluster] as f64 / total_customers as f64 * 100.0;

    println!("\nCluster {} details:", cluster);
    println!(
        "  Size: {} customers ({:.1}% of total)",
        cluster_sizes[cluster], cluster_percentage
    );
    println!(
        "  Centroid: spent={:.2}, purchases={:.2}, unique products={:.2}",
        model.centroids[[cluster, 0]],
        model.centroids[[cluster, 1]],
        model.centroids[[cluster, 2]]
    );

    Ok(())
}

/// Print cluster statistics and render plots
fn run_reporting(args: &Args, segmentation: &Segmentation) -> Result<()> {
    let model = &segmentation.model;
    report::print_cluster_report(&segmentation.customers, model);

    let silhouette_score = model.compute_silhouette_sample(
        &segmentation.features,
        100.min(segmentation.customers.len()),
    );
    println!("\nSilhouette score (sample): {:.3}", silhouette_score);

    if args.no_plot {
        return Ok(());
    }

    let viz_start = Instant::now();
    let sizes_path = viz::generate_visualization_report(&segmentation.customers, model, &args.output)?;

    println!("\n✓ Visualizations generated");
    if args.verbose {
        println!("  Visualization time: {:.2}s", viz_start.elapsed().as_secs_f64());
    }
    println!("Main plot saved to: {}", args.output.display());
    println!("Cluster sizes saved to: {}", sizes_path.display());

    Ok(())
}
