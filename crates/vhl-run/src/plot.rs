//! Nyquist plots of impedance sweeps written by the control deck.

use serde::{Deserialize, Serialize};

/// One row of the `freq re im mag phase` table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImpedancePoint {
    pub frequency: f64,
    pub real: f64,
    pub imag: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotConfig {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 480,
            height: 360,
            margin: 48,
        }
    }
}

/// Parses whitespace separated rows.
///
/// Only the first five columns are read; `#` comments, short rows and rows
/// whose leading columns are not numeric are skipped.
pub fn parse_impedance_table(text: &str) -> Vec<ImpedancePoint> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let columns: Vec<f64> = line
                .split_whitespace()
                .take(5)
                .map(str::parse::<f64>)
                .collect::<Result<_, _>>()
                .ok()?;
            if columns.len() < 5 {
                return None;
            }
            Some(ImpedancePoint {
                frequency: columns[0],
                real: columns[1],
                imag: columns[2],
            })
        })
        .collect()
}

/// Re(Z) against -Im(Z) as a standalone SVG document.
pub fn render_nyquist_svg(points: &[ImpedancePoint], run_id: &str, config: &PlotConfig) -> String {
    let w = config.width as f64;
    let h = config.height as f64;
    let m = config.margin as f64;
    let mut parts = vec![
        format!(
            "<svg xmlns='http://www.w3.org/2000/svg' width='{}' height='{}'>",
            config.width, config.height
        ),
        format!(
            "<text x='{:.1}' y='{:.1}' font-size='12' text-anchor='middle'>Nyquist Plot: {}</text>",
            w / 2.0,
            m / 2.0,
            escape(run_id)
        ),
        format!(
            "<line x1='{m:.1}' y1='{y:.1}' x2='{x2:.1}' y2='{y:.1}' stroke='black'/>",
            y = h - m,
            x2 = w - m
        ),
        format!(
            "<line x1='{m:.1}' y1='{m:.1}' x2='{m:.1}' y2='{y:.1}' stroke='black'/>",
            y = h - m
        ),
        format!(
            "<text x='{:.1}' y='{:.1}' font-size='11' text-anchor='middle'>Re(Z) (Ohm)</text>",
            w / 2.0,
            h - 8.0
        ),
        format!(
            "<text x='12' y='{c:.1}' font-size='11' text-anchor='middle' transform='rotate(-90 12 {c:.1})'>-Im(Z) (Ohm)</text>",
            c = h / 2.0
        ),
    ];

    if !points.is_empty() {
        let xs: Vec<f64> = points.iter().map(|p| p.real).collect();
        let ys: Vec<f64> = points.iter().map(|p| -p.imag).collect();
        let (x_min, x_max) = bounds(&xs);
        let (y_min, y_max) = bounds(&ys);
        let x_span = (x_max - x_min).max(1e-9);
        let y_span = (y_max - y_min).max(1e-9);
        let projected: Vec<(f64, f64)> = xs
            .iter()
            .zip(&ys)
            .map(|(&x, &y)| {
                (
                    m + (x - x_min) / x_span * (w - 2.0 * m),
                    h - m - (y - y_min) / y_span * (h - 2.0 * m),
                )
            })
            .collect();

        let coords: Vec<String> = projected
            .iter()
            .map(|(px, py)| format!("{px:.2},{py:.2}"))
            .collect();
        parts.push(format!(
            "<polyline fill='none' stroke='#2563eb' stroke-width='1.5' points='{}'/>",
            coords.join(" ")
        ));
        parts.extend(
            projected
                .iter()
                .map(|(px, py)| format!("<circle cx='{px:.2}' cy='{py:.2}' r='2.5' fill='#2563eb'/>")),
        );
    }

    parts.push("</svg>".to_string());
    parts.join("")
}

fn bounds(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_skips_comments_and_short_rows() {
        let text = "# freq re im mag phase\n1e3 10.0 -2.0 10.2 -11.3\n2e3 9.0\nbad row here x y\n4e3 8.0 -4.0 8.9 -26.5\n";
        let points = parse_impedance_table(text);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].frequency, 1e3);
        assert_eq!(points[1].imag, -4.0);
    }

    #[test]
    fn trailing_columns_beyond_the_fifth_are_ignored() {
        let text = "1e3 10.0 -2.0 10.2 -11.3 ok\n2e3 9.0 -1.0 9.1 -6.3 # note\n";
        let points = parse_impedance_table(text);
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].real, 9.0);
    }

    #[test]
    fn empty_sweep_still_yields_axes() {
        let svg = render_nyquist_svg(&[], "empty", &PlotConfig::default());
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<line").count(), 2);
        assert!(!svg.contains("<polyline"));
    }

    #[test]
    fn svg_has_one_marker_per_point() {
        let points = parse_impedance_table("1 10 -1 0 0\n2 12 -3 0 0\n3 15 -2 0 0\n");
        let svg = render_nyquist_svg(&points, "run<1>", &PlotConfig::default());
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<circle").count(), 3);
        assert!(svg.contains("run&lt;1&gt;"));
    }
}
