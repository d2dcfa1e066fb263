use std::ops::Range;
use std::path::Path;

use plotters::prelude::*;

use crate::artifacts::RunArtifacts;
use crate::error::{Result, TrainError};
use crate::models::TrainingMode;
use crate::stats::History;

const PLOT_SIZE: (u32, u32) = (640, 480);

/// Renders the accuracy and loss curves of a finished run next to its other artifacts.
pub fn plot_training(history: &History, artifacts: &RunArtifacts, mode: TrainingMode) -> Result<()> {
    let (acc, val_acc) = history.accuracy();
    let path = artifacts.accuracy_plot_path(mode);
    line_chart(&path, "model accuracy", "accuracy", &acc, &val_acc)?;
    println!(
        "Successfully created the training accuracy plot: {}",
        path.display()
    );

    let (loss, val_loss) = history.loss();
    let path = artifacts.loss_plot_path(mode);
    line_chart(&path, "model loss", "loss", &loss, &val_loss)?;
    println!(
        "Successfully created the loss function plot: {}",
        path.display()
    );

    Ok(())
}

/// `(epoch, value)` points, epochs counted from 0.
fn series(values: &[f64]) -> Vec<(f32, f32)> {
    values
        .iter()
        .enumerate()
        .map(|(epoch, v)| (epoch as f32, *v as f32))
        .collect()
}

/// Y range covering both curves, padded so flat curves still get a visible axis.
fn value_range(train: &[f64], test: &[f64]) -> Range<f32> {
    let (lo, hi) = train
        .iter()
        .chain(test)
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });

    if lo > hi {
        return 0.0..1.0;
    }

    let pad = ((hi - lo) * 0.05).max(1e-3);
    (lo - pad) as f32..(hi + pad) as f32
}

fn line_chart(path: &Path, title: &str, y_desc: &str, train: &[f64], test: &[f64]) -> Result<()> {
    draw(path, title, y_desc, train, test).map_err(|err| TrainError::Plot {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

fn draw(
    path: &Path,
    title: &str,
    y_desc: &str,
    train: &[f64],
    test: &[f64],
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let last_epoch = train.len().max(test.len()).saturating_sub(1).max(1) as f32;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption(title, ("sans-serif", 22))
        .x_label_area_size(45)
        .y_label_area_size(55)
        .build_cartesian_2d(0f32..last_epoch, value_range(train, test))?;
    chart.configure_mesh().x_desc("epoch").y_desc(y_desc).draw()?;

    chart
        .draw_series(LineSeries::new(series(train), &BLUE))?
        .label("train")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE.filled()));
    chart
        .draw_series(LineSeries::new(series(test), &RED))?
        .label("test")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.filled()));
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
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
    fn series_is_indexed_by_epoch() {
        assert_eq!(series(&[0.5, 0.25]), vec![(0.0, 0.5), (1.0, 0.25)]);
        assert!(series(&[]).is_empty());
    }

    #[test]
    fn value_range_covers_both_curves() {
        let range = value_range(&[0.2, 0.4], &[0.1, 0.9]);
        assert!(range.start < 0.1 && range.start > 0.05);
        assert!(range.end > 0.9 && range.end < 0.95);
    }

    #[test]
    fn degenerate_value_ranges_stay_drawable() {
        assert_eq!(value_range(&[], &[]), 0.0..1.0);
        assert_eq!(value_range(&[f64::NAN], &[]), 0.0..1.0);

        let flat = value_range(&[0.5, 0.5], &[0.5]);
        assert!(flat.start < 0.5 && flat.end > 0.5);
    }
}
