use itertools::Itertools;
use ndarray::ArrayView2;
use plotters::prelude::*;
use std::path::Path;

use crate::metrics::RocCurve;

const DARK_ORANGE: RGBColor = RGBColor(255, 140, 0);

/// Heatmap of a row-normalized confusion matrix, ground truth on the y axis.
pub fn plot_confusion_matrix(
    cm: ArrayView2<f64>,
    title: &str,
    x_labels: [&str; 2],
    y_labels: [&str; 2],
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, (640, 560)).into_drawing_area();
    root.fill(&WHITE)?;

    // Cells are centered on integer coordinates; ground class 0 sits on the top row.
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(-0.5f64..1.5f64, -0.5f64..1.5f64)?;

    let x_fmt = |v: &f64| class_at(*v).map(|i| x_labels[i].to_owned()).unwrap_or_default();
    let y_fmt = |v: &f64| class_at(1.0 - *v).map(|i| y_labels[i].to_owned()).unwrap_or_default();

    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(5)
        .y_labels(5)
        .x_label_formatter(&x_fmt)
        .y_label_formatter(&y_fmt)
        .x_desc("predicted")
        .y_desc("ground")
        .draw()?;

    let cells = (0..2usize).cartesian_product(0..2usize).collect_vec();

    chart.draw_series(cells.iter().map(|&(g, p)| {
        let (x, y) = (p as f64, 1.0 - g as f64);
        Rectangle::new([(x - 0.5, y - 0.5), (x + 0.5, y + 0.5)], heat_color(cm[(g, p)]).filled())
    }))?;

    chart.draw_series(cells.iter().map(|&(g, p)| {
        let v = cm[(g, p)];
        let style = ("sans-serif", 24).into_font().color(&text_color(v));
        Text::new(format!("{v:.2}"), (p as f64 - 0.08, 1.0 - g as f64 + 0.04), style)
    }))?;

    root.present()?;
    Ok(())
}

pub fn plot_roc(curve: &RocCurve, auc: f64, title: &str, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let root = BitMapBackend::new(path, (640, 560)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{title} ROC"), ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0f64..1.0f64, 0.0f64..1.0f64)?;

    chart
        .configure_mesh()
        .x_desc("False positive rate")
        .y_desc("True positive rate")
        .draw()?;

    chart.draw_series(LineSeries::new([(0.0, 0.0), (1.0, 1.0)], &RGBColor(180, 180, 180)))?;

    let points = std::iter::once((0.0, 0.0))
        .chain(curve.fpr.iter().copied().zip(curve.tpr.iter().copied()))
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .collect_vec();

    chart
        .draw_series(LineSeries::new(points, DARK_ORANGE.stroke_width(2)))?
        .label(format!("ROC curve (auc = {auc:.2})"))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], DARK_ORANGE.stroke_width(2)));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

/// Class index for a tick sitting exactly on a cell center.
fn class_at(v: f64) -> Option<usize> {
    let r = v.round();
    if (v - r).abs() < 1e-9 && (0.0..=1.0).contains(&r) {
        Some(r as usize)
    } else {
        None
    }
}

fn heat_color(v: f64) -> RGBColor {
    if v.is_nan() {
        return RGBColor(200, 200, 200);
    }
    let t = v.clamp(0.0, 1.0);
    let lerp = |a: f64, b: f64| (a + (b - a) * t).round() as u8;
    RGBColor(lerp(247.0, 8.0), lerp(251.0, 48.0), lerp(255.0, 107.0))
}

fn text_color(v: f64) -> RGBColor {
    if v > 0.6 { WHITE } else { BLACK }
}
