//! Visualization functions using Plotters for cluster analysis

use crate::features::{CustomerFeatures, FEATURE_NAMES};
use crate::model::ClusterModel;
use crate::report::summarize_clusters;
use plotters::prelude::*;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Color palette for the first clusters, later ones come from `Palette99`
const CLUSTER_COLORS: [RGBColor; 5] = [RED, BLUE, GREEN, MAGENTA, CYAN];

/// Opacity of the per-cluster bounding boxes
const BOX_ALPHA: f64 = 0.3;

fn cluster_color(cluster: usize) -> RGBColor {
    CLUSTER_COLORS.get(cluster).copied().unwrap_or_else(|| {
        let RGBAColor(r, g, b, _) = Palette99::pick(cluster).to_rgba();
        RGBColor(r, g, b)
    })
}

/// Axis range covering `values` with 5% padding on each side
fn padded_range(values: impl IntoIterator<Item = f64>) -> Range<f64> {
    let (min, max) = values
        .into_iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !min.is_finite() || !max.is_finite() {
        return 0.0..1.0;
    }
    let padding = ((max - min) * 0.05).max(1.0);
    (min - padding)..(max + padding)
}

/// Path of the cluster size chart that accompanies `main_plot`
pub fn sizes_chart_path(main_plot: &Path) -> PathBuf {
    let stem = main_plot
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "clusters".to_string());
    main_plot.with_file_name(format!("{stem}_sizes.png"))
}

/// Create scatter plot visualization of clusters
///
/// Plots total spent against purchase count, one color per cluster, with a
/// translucent rectangle spanning each cluster's min/max on both axes and the
/// centroids marked by crosses.
///
/// # Arguments
/// * `customers` - Customers with attached cluster ids
/// * `model` - Fitted model the ids came from
/// * `output_path` - Path to save the PNG plot
/// * `plot_title` - Title for the plot
pub fn create_cluster_visualization(
    customers: &[CustomerFeatures],
    model: &ClusterModel,
    output_path: &Path,
    plot_title: Option<&str>,
) -> crate::Result<()> {
    let title = plot_title.unwrap_or("Customer Clusters");

    let x_range = padded_range(customers.iter().map(|c| c.total_spent));
    let y_range = padded_range(customers.iter().map(|c| c.purchase_count as f64));

    let root = BitMapBackend::new(output_path, (1000, 700)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)?;

    chart
        .configure_mesh()
        .x_desc(FEATURE_NAMES[0])
        .y_desc(FEATURE_NAMES[1])
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    // Bounding boxes first so points stay visible on top
    for summary in summarize_clusters(customers, model.n_clusters) {
        if let (Some((min_spent, max_spent)), Some((min_purchases, max_purchases))) =
            (summary.spent_range, summary.purchase_range)
        {
            let color = cluster_color(summary.cluster);
            chart.draw_series(std::iter::once(Rectangle::new(
                [
                    (min_spent, min_purchases as f64),
                    (max_spent, max_purchases as f64),
                ],
                color.mix(BOX_ALPHA).filled(),
            )))?;
        }
    }

    for cluster in 0..model.n_clusters {
        let color = cluster_color(cluster);
        chart
            .draw_series(
                customers
                    .iter()
                    .filter(|c| c.cluster_id == Some(cluster))
                    .map(|c| Circle::new((c.total_spent, c.purchase_count as f64), 4, color.filled())),
            )?
            .label(format!("Cluster {}", cluster))
            .legend(move |(x, y)| Circle::new((x, y), 4, color.filled()));
    }

    chart.draw_series(model.centroids.outer_iter().enumerate().map(|(cluster, centroid)| {
        Cross::new(
            (centroid[0], centroid[1]),
            8,
            cluster_color(cluster).stroke_width(3),
        )
    }))?;

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;

    Ok(())
}

/// Create a simple histogram of cluster sizes
pub fn create_cluster_size_chart(model: &ClusterModel, output_path: &Path) -> crate::Result<()> {
    let cluster_sizes = model.cluster_sizes();
    let max_size = *cluster_sizes.iter().max().unwrap_or(&1) as f64;

    let root = BitMapBackend::new(output_path, (600, 400)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Cluster Sizes", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5f64..(model.n_clusters as f64 - 0.5), 0f64..(max_size * 1.1).max(1.0))?;

    chart
        .configure_mesh()
        .x_desc("Cluster ID")
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(cluster_sizes.iter().enumerate().map(|(cluster_id, &size)| {
        Rectangle::new(
            [
                (cluster_id as f64 - 0.4, 0.0),
                (cluster_id as f64 + 0.4, size as f64),
            ],
            cluster_color(cluster_id).filled(),
        )
    }))?;

    root.present()?;

    Ok(())
}

/// Render the scatter plot and the size chart next to it
pub fn generate_visualization_report(
    customers: &[CustomerFeatures],
    model: &ClusterModel,
    base_output_path: &Path,
) -> crate::Result<PathBuf> {
    create_cluster_visualization(customers, model, base_output_path, None)?;

    let size_chart_path = sizes_chart_path(base_output_path);
    create_cluster_size_chart(model, &size_chart_path)?;

    Ok(size_chart_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_range() {
        let range = padded_range([0.0, 100.0, 40.0]);
        assert_eq!(range, -5.0..105.0);

        // Degenerate spans still produce a drawable range
        let range = padded_range([3.0, 3.0]);
        assert_eq!(range, 2.0..4.0);

        assert_eq!(padded_range(std::iter::empty()), 0.0..1.0);
    }

    #[test]
    fn test_sizes_chart_path() {
        assert_eq!(
            sizes_chart_path(Path::new("out/cluster_plot.png")),
            PathBuf::from("out/cluster_plot_sizes.png")
        );
        assert_eq!(
            sizes_chart_path(Path::new("plot")),
            PathBuf::from("plot_sizes.png")
        );
    }

    #[test]
    fn test_cluster_colors() {
        let rgb = |color: RGBColor| (color.0, color.1, color.2);
        assert_eq!(rgb(cluster_color(0)), (255, 0, 0));
        assert_eq!(rgb(cluster_color(4)), rgb(CYAN));

        // Falls back to the large palette past the fixed colors
        let RGBAColor(r, g, b, _) = Palette99::pick(7).to_rgba();
        assert_eq!(rgb(cluster_color(7)), (r, g, b));
    }
}
