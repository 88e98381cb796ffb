use plotters::prelude::*;
use tracing::{instrument, warn};

use crate::{ContainerUsage, Error};

// demo series for the bar & histogram charts, not derived from cluster data
pub const SAMPLE_VALUES: [f64; 4] = [5.0, 7.0, 9.0, 10.0];

static PIE_COLORS: [RGBColor; 8] = [
    RGBColor(66, 133, 244),
    RGBColor(219, 68, 55),
    RGBColor(244, 180, 0),
    RGBColor(15, 157, 88),
    RGBColor(171, 71, 188),
    RGBColor(0, 172, 193),
    RGBColor(255, 112, 67),
    RGBColor(158, 157, 36),
];

/// Pie slices of the per-container share, one `(size, "pod\ncontainer<value>")`
/// pair per container. Non-finite and non-positive values cannot be drawn
/// and are dropped.
fn pie_series<F>(rows: &[ContainerUsage], value_of: F) -> (Vec<f64>, Vec<String>)
where
    F: Fn(&ContainerUsage) -> f32,
{
    rows.iter()
        .filter_map(|row| {
            let value = value_of(row);
            if value.is_finite() && value > 0.0 {
                Some((
                    f64::from(value),
                    format!("{}\n{}{:.2}", row.pod_name, row.container_name, value),
                ))
            } else {
                None
            }
        })
        .unzip()
}

#[instrument(skip(rows))]
pub fn render_usage_pies(rows: &[ContainerUsage], namespace: &str) -> Result<(), Error> {
    let (sizes, labels) = pie_series(rows, |row| row.cpu_percentage);
    render_pie(&sizes, &labels, &format!("cpu_{namespace}.png"))?;
    let (sizes, labels) = pie_series(rows, |row| row.memory_percentage);
    render_pie(&sizes, &labels, &format!("memory_{namespace}.png"))?;
    Ok(())
}

fn render_pie(sizes: &[f64], labels: &[String], path: &str) -> Result<(), Error> {
    if sizes.is_empty() {
        warn!(path, "nothing to draw, skip the pie chart");
        return Ok(());
    }
    let root = BitMapBackend::new(path, (900, 1024)).into_drawing_area();
    root.fill(&WHITE).map_err(|source| Error::ChartError {
        context: format!("draw {path}"),
        source: Box::new(source),
    })?;
    let center = (450, 512);
    let radius = 330.0;
    let colors = (0..sizes.len())
        .map(|i| PIE_COLORS[i % PIE_COLORS.len()])
        .collect::<Vec<_>>();
    let mut pie = Pie::new(&center, &radius, sizes, &colors, labels);
    pie.label_style(("sans-serif", 18).into_font());
    pie.percentages(("sans-serif", 14).into_font().color(&BLACK));
    root.draw(&pie).map_err(|source| Error::ChartError {
        context: format!("draw {path}"),
        source: Box::new(source),
    })?;
    root.present().map_err(|source| Error::ChartError {
        context: format!("write {path}"),
        source: Box::new(source),
    })
}

pub fn render_demo_charts() -> Result<(), Error> {
    render_bar_chart(&SAMPLE_VALUES, "bar.png")?;
    render_histogram(&SAMPLE_VALUES, "hist.png")?;
    Ok(())
}

fn render_bar_chart(values: &[f64], path: &str) -> Result<(), Error> {
    let root = BitMapBackend::new(path, (300, 300)).into_drawing_area();
    root.fill(&WHITE).map_err(|source| Error::ChartError {
        context: format!("draw {path}"),
        source: Box::new(source),
    })?;
    let y_max = values.iter().cloned().fold(1.0f64, f64::max) * 1.2;
    let mut chart = ChartBuilder::on(&root)
        .caption("bar plot", ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(20)
        .y_label_area_size(30)
        .build_cartesian_2d((0u32..values.len() as u32).into_segmented(), 0f64..y_max)
        .map_err(|source| Error::ChartError {
            context: format!("draw {path}"),
            source: Box::new(source),
        })?;
    chart
        .configure_mesh()
        .draw()
        .map_err(|source| Error::ChartError {
            context: format!("draw {path}"),
            source: Box::new(source),
        })?;
    chart
        .draw_series(
            Histogram::vertical(&chart)
                .style(BLUE.filled())
                .margin(5)
                .data(values.iter().enumerate().map(|(i, v)| (i as u32, *v))),
        )
        .map_err(|source| Error::ChartError {
            context: format!("draw {path}"),
            source: Box::new(source),
        })?;
    root.present().map_err(|source| Error::ChartError {
        context: format!("write {path}"),
        source: Box::new(source),
    })
}

fn render_histogram(values: &[f64], path: &str) -> Result<(), Error> {
    let root = BitMapBackend::new(path, (300, 300)).into_drawing_area();
    root.fill(&WHITE).map_err(|source| Error::ChartError {
        context: format!("draw {path}"),
        source: Box::new(source),
    })?;
    let x_max = values.iter().cloned().fold(0.0f64, f64::max) as u32 + 2;
    let mut chart = ChartBuilder::on(&root)
        .caption("histogram plot", ("sans-serif", 18))
        .margin(10)
        .x_label_area_size(20)
        .y_label_area_size(30)
        .build_cartesian_2d(
            (0u32..x_max).into_segmented(),
            0u32..values.len() as u32 + 1,
        )
        .map_err(|source| Error::ChartError {
            context: format!("draw {path}"),
            source: Box::new(source),
        })?;
    chart
        .configure_mesh()
        .draw()
        .map_err(|source| Error::ChartError {
            context: format!("draw {path}"),
            source: Box::new(source),
        })?;
    chart
        .draw_series(
            Histogram::vertical(&chart)
                .style(BLUE.mix(0.6).filled())
                .data(values.iter().map(|v| (*v as u32, 1u32))),
        )
        .map_err(|source| Error::ChartError {
            context: format!("draw {path}"),
            source: Box::new(source),
        })?;
    root.present().map_err(|source| Error::ChartError {
        context: format!("write {path}"),
        source: Box::new(source),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qty::Qty;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn row(pod: &str, container: &str, cpu_pct: f32, mem_pct: f32) -> ContainerUsage {
        ContainerUsage {
            node_name: Some("node1".to_string()),
            pod_name: pod.to_string(),
            container_name: container.to_string(),
            cpu_usage: Qty::from_str("100m").unwrap(),
            cpu_percentage: cpu_pct,
            memory_usage: Qty::from_str("100Mi").unwrap(),
            memory_percentage: mem_pct,
        }
    }

    #[test]
    fn test_pie_series_labels() {
        let rows = vec![row("web", "nginx", 12.5, 25.0), row("db", "postgres", 5.0, 50.0)];
        let (sizes, labels) = pie_series(&rows, |r| r.cpu_percentage);
        assert_eq!(sizes, vec![12.5, 5.0]);
        assert_eq!(
            labels,
            vec!["web\nnginx12.50".to_string(), "db\npostgres5.00".to_string()]
        );
    }

    #[test]
    fn test_pie_series_drops_undrawable_values() {
        let rows = vec![
            row("a", "c1", f32::NAN, 10.0),
            row("b", "c2", 0.0, 20.0),
            row("c", "c3", 7.5, 30.0),
        ];
        let (sizes, labels) = pie_series(&rows, |r| r.cpu_percentage);
        assert_eq!(sizes, vec![7.5]);
        assert_eq!(labels, vec!["c\nc37.50".to_string()]);

        let (sizes, _) = pie_series(&rows, |r| r.memory_percentage);
        assert_eq!(sizes, vec![10.0, 20.0, 30.0]);
    }
}
