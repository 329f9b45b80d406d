use crate::evaluation::Evaluation;
use crate::logger::sanitize_filename;
use plotters::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Colors assigned to policies in chart order
const POLICY_COLORS: [RGBColor; 3] = [BLUE, RED, GREEN];

const NUM_BINS: usize = 30;

/// Bin values into NUM_BINS equal-width bins over [min, max]
/// A degenerate range (all values equal) is widened by half a unit on each side
fn histogram_bins(values: &[f64]) -> (f64, f64, Vec<u32>) {
    let mut min_val = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let mut max_val = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_val - min_val <= f64::EPSILON {
        min_val -= 0.5;
        max_val += 0.5;
    }
    let bin_width = (max_val - min_val) / NUM_BINS as f64;

    let mut bins = vec![0u32; NUM_BINS];
    for &value in values {
        let bin_idx = ((value - min_val) / bin_width).floor() as usize;
        bins[bin_idx.min(NUM_BINS - 1)] += 1;
    }
    (min_val, max_val, bins)
}

/// Write one histogram of per-trial revenue for every evaluation under `directory`
///
/// # Returns
/// Paths of the written charts
pub fn generate_revenue_histograms(evaluations: &[Evaluation], directory: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    fs::create_dir_all(directory)?;

    let mut paths = Vec::with_capacity(evaluations.len());
    for (index, evaluation) in evaluations.iter().enumerate() {
        let path = directory.join(format!("revenue_{}.png", sanitize_filename(evaluation.policy_name)));
        create_revenue_histogram(evaluation, &path, &POLICY_COLORS[index % POLICY_COLORS.len()])?;
        paths.push(path);
    }
    Ok(paths)
}

fn create_revenue_histogram(evaluation: &Evaluation, path: &Path, color: &RGBColor) -> Result<(), Box<dyn std::error::Error>> {
    let values = evaluation.revenues();
    if values.is_empty() {
        return Err("Cannot create histogram: no trials".into());
    }

    let (min_val, max_val, bins) = histogram_bins(&values);
    let bin_width = (max_val - min_val) / NUM_BINS as f64;
    let max_count = *bins.iter().max().unwrap_or(&0);
    let mean_val = evaluation.average_revenue;

    let root = BitMapBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let title = match evaluation.competitive_ratio {
        Some(ratio) => format!("Revenue per trial: {} (ratio {:.4})", evaluation.policy_name, ratio),
        None => format!("Revenue per trial: {}", evaluation.policy_name),
    };
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(min_val..max_val, 0u32..max_count + max_count / 10 + 1)?;

    chart.configure_mesh()
        .x_desc("Revenue")
        .y_desc("Trials")
        .draw()?;

    // Draw bars
    chart.draw_series(
        bins.iter().enumerate().map(|(i, &count)| {
            let x0 = min_val + i as f64 * bin_width;
            let x1 = x0 + bin_width;
            Rectangle::new([(x0, 0), (x1, count)], color.filled())
        })
    )?
    .label(format!("Trials (n={})", values.len()))
    .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));

    // Draw mean line
    chart.draw_series(std::iter::once(PathElement::new(
        vec![(mean_val, 0), (mean_val, max_count)],
        &BLACK,
    )))?
    .label(format!("Mean: {:.2}", mean_val))
    .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));

    chart.configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bins_cover_all_values() {
        let values = vec![1.0, 2.0, 2.5, 10.0];
        let (min_val, max_val, bins) = histogram_bins(&values);
        assert_eq!(min_val, 1.0);
        assert_eq!(max_val, 10.0);
        assert_eq!(bins.iter().sum::<u32>(), 4);
        assert_eq!(bins[0], 1);
        assert_eq!(bins[NUM_BINS - 1], 1);
    }

    #[test]
    fn test_degenerate_range_is_widened() {
        let (min_val, max_val, bins) = histogram_bins(&[110.0, 110.0, 110.0]);
        assert_eq!(min_val, 109.5);
        assert_eq!(max_val, 110.5);
        assert_eq!(bins.iter().sum::<u32>(), 3);
    }
}
