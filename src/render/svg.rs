//! SVG builders for attribution plots

use ndarray::ArrayView2;
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::{Result, ShapLensError};
use crate::explain::{LocalExplanation, ShapSummary};

/// Positive contributions
pub const RED: (u8, u8, u8) = (255, 0, 81);
/// Negative contributions
pub const BLUE: (u8, u8, u8) = (0, 139, 251);

const FONT: &str = "DejaVu Sans, Helvetica, Arial, sans-serif";
const WIDTH: f64 = 860.0;
const LEFT: f64 = 190.0;
const RIGHT: f64 = 110.0;
const TOP: f64 = 36.0;
const ROW: f64 = 28.0;
const AXIS_SPACE: f64 = 56.0;

/// SVG document with its pixel size
#[derive(Debug, Clone)]
pub struct SvgPlot {
    pub svg: String,
    pub width: u32,
    pub height: u32,
}

/// Linear value-to-pixel mapping
#[derive(Debug, Clone, Copy)]
struct Scale {
    min: f64,
    max: f64,
    x0: f64,
    x1: f64,
}

impl Scale {
    fn new(min: f64, max: f64, x0: f64, x1: f64) -> Self {
        let (min, max) = if (max - min).abs() < f64::EPSILON {
            (min - 1.0, max + 1.0)
        } else {
            (min, max)
        };
        Self { min, max, x0, x1 }
    }

    fn padded(min: f64, max: f64, x0: f64, x1: f64) -> Self {
        let pad = (max - min).abs() * 0.05;
        Self::new(min - pad, max + pad, x0, x1)
    }

    fn map(&self, v: f64) -> f64 {
        self.x0 + (v - self.min) / (self.max - self.min) * (self.x1 - self.x0)
    }

    fn ticks(&self, n: usize) -> Vec<f64> {
        (0..=n)
            .map(|i| self.min + (self.max - self.min) * i as f64 / n as f64)
            .collect()
    }
}

pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Compact number label
pub fn format_value(v: f64) -> String {
    if !v.is_finite() {
        return v.to_string();
    }
    let abs = v.abs();
    if abs != 0.0 && (abs >= 10_000.0 || abs < 0.001) {
        format!("{:.2e}", v)
    } else {
        format!("{:.3}", v)
    }
}

fn rgb((r, g, b): (u8, u8, u8)) -> String {
    format!("rgb({},{},{})", r, g, b)
}

/// Blue-to-red gradient color at `t` in `[0, 1]`
fn gradient(t: f64) -> String {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    rgb((mix(BLUE.0, RED.0), mix(BLUE.1, RED.1), mix(BLUE.2, RED.2)))
}

fn header(svg: &mut String, width: f64, height: f64) {
    let _ = writeln!(
        svg,
        "<svg xmlns='http://www.w3.org/2000/svg' width='{:.0}' height='{:.0}' viewBox='0 0 {:.0} {:.0}'>",
        width, height, width, height
    );
    let _ = writeln!(svg, "  <rect width='100%' height='100%' fill='white'/>");
}

fn x_axis(svg: &mut String, scale: &Scale, y: f64, label: &str) {
    let _ = writeln!(
        svg,
        "  <line x1='{:.2}' y1='{:.2}' x2='{:.2}' y2='{:.2}' stroke='#333' stroke-width='1'/>",
        scale.x0, y, scale.x1, y
    );
    for tick in scale.ticks(4) {
        let x = scale.map(tick);
        let _ = writeln!(
            svg,
            "  <line x1='{x:.2}' y1='{y:.2}' x2='{x:.2}' y2='{:.2}' stroke='#333' stroke-width='1'/>",
            y + 4.0
        );
        let _ = writeln!(
            svg,
            "  <text x='{x:.2}' y='{:.2}' text-anchor='middle' font-family='{FONT}' font-size='11' fill='#333'>{}</text>",
            y + 17.0,
            format_value(tick)
        );
    }
    let _ = writeln!(
        svg,
        "  <text x='{:.2}' y='{:.2}' text-anchor='middle' font-family='{FONT}' font-size='12' fill='#333'>{}</text>",
        (scale.x0 + scale.x1) / 2.0,
        y + 38.0,
        escape_text(label)
    );
}

fn feature_label(svg: &mut String, y: f64, name: &str) {
    let _ = writeln!(
        svg,
        "  <text x='{:.2}' y='{:.2}' text-anchor='end' font-family='{FONT}' font-size='12' fill='#333'>{}</text>",
        LEFT - 10.0,
        y + 4.0,
        escape_text(name)
    );
}

/// Mean absolute SHAP value per feature, largest on top
pub fn bar_plot(summary: &ShapSummary, max_display: usize) -> SvgPlot {
    let ranking: Vec<(usize, f64)> = summary
        .feature_ranking()
        .into_iter()
        .take(max_display.max(1))
        .collect();
    let max = ranking
        .iter()
        .map(|(_, v)| *v)
        .filter(|v| v.is_finite())
        .fold(0.0_f64, f64::max);

    let height = TOP + ROW * ranking.len() as f64 + AXIS_SPACE;
    let scale = Scale::new(0.0, if max > 0.0 { max * 1.08 } else { 1.0 }, LEFT, WIDTH - RIGHT);

    let mut svg = String::new();
    header(&mut svg, WIDTH, height);
    for (r, (j, value)) in ranking.iter().enumerate() {
        let y = TOP + ROW * r as f64 + ROW / 2.0;
        let name = summary.feature_names.get(*j).map(String::as_str).unwrap_or("?");
        feature_label(&mut svg, y, name);
        let w = (scale.map(*value) - LEFT).max(0.0);
        let _ = writeln!(
            svg,
            "  <rect x='{LEFT:.2}' y='{:.2}' width='{w:.2}' height='{:.2}' fill='{}'/>",
            y - ROW * 0.3,
            ROW * 0.6,
            rgb(BLUE)
        );
        let _ = writeln!(
            svg,
            "  <text x='{:.2}' y='{:.2}' font-family='{FONT}' font-size='11' fill='{}'>+{}</text>",
            LEFT + w + 5.0,
            y + 4.0,
            rgb(BLUE),
            format_value(*value)
        );
    }
    x_axis(
        &mut svg,
        &scale,
        TOP + ROW * ranking.len() as f64,
        "mean(|SHAP value|) (average impact on model output magnitude)",
    );
    let _ = writeln!(svg, "</svg>");

    SvgPlot {
        svg,
        width: WIDTH as u32,
        height: height.ceil() as u32,
    }
}

/// Percentile of sorted finite values
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[pos.min(sorted.len() - 1)]
}

/// One dot per row per feature, colored by feature value
pub fn beeswarm_plot(
    values: ArrayView2<f64>,
    data: ArrayView2<f64>,
    feature_names: &[String],
    max_display: usize,
) -> SvgPlot {
    let summary = ShapSummary::from_table(values, feature_names);
    let ranking: Vec<usize> = summary
        .feature_ranking()
        .into_iter()
        .take(max_display.max(1))
        .map(|(j, _)| j)
        .collect();

    let (lo, hi) = ranking
        .iter()
        .flat_map(|&j| values.column(j).to_vec())
        .filter(|v| v.is_finite())
        .fold((0.0_f64, 0.0_f64), |(lo, hi), v| (lo.min(v), hi.max(v)));

    let height = TOP + ROW * ranking.len() as f64 + AXIS_SPACE;
    let scale = Scale::padded(lo, hi, LEFT, WIDTH - RIGHT);

    let mut svg = String::new();
    header(&mut svg, WIDTH, height);
    let zero = scale.map(0.0);
    let _ = writeln!(
        svg,
        "  <line x1='{zero:.2}' y1='{TOP:.2}' x2='{zero:.2}' y2='{:.2}' stroke='#999' stroke-width='1'/>",
        TOP + ROW * ranking.len() as f64
    );

    for (r, &j) in ranking.iter().enumerate() {
        let y = TOP + ROW * r as f64 + ROW / 2.0;
        feature_label(&mut svg, y, &feature_names[j]);
        let _ = writeln!(
            svg,
            "  <line x1='{LEFT:.2}' y1='{y:.2}' x2='{:.2}' y2='{y:.2}' stroke='#eee' stroke-width='1'/>",
            WIDTH - RIGHT
        );

        let column = data.column(j);
        let mut finite: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
        finite.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let (mut vlo, mut vhi) = (percentile(&finite, 0.05), percentile(&finite, 0.95));
        if vhi <= vlo {
            vlo = finite.first().copied().unwrap_or(0.0);
            vhi = finite.last().copied().unwrap_or(1.0);
        }

        let mut bins: HashMap<i64, usize> = HashMap::new();
        for (phi, value) in values.column(j).iter().zip(column.iter()) {
            if !phi.is_finite() {
                continue;
            }
            let x = scale.map(*phi);
            let count = bins.entry((x / 3.0).round() as i64).or_insert(0);
            let offset = ((*count + 1) / 2) as f64 * 2.0;
            let dy = if *count % 2 == 0 { offset } else { -offset };
            *count += 1;

            let color = if value.is_finite() {
                let t = if vhi > vlo { (value - vlo) / (vhi - vlo) } else { 0.5 };
                gradient(t)
            } else {
                "#999".to_string()
            };
            let _ = writeln!(
                svg,
                "  <circle cx='{x:.2}' cy='{:.2}' r='2.6' fill='{color}' fill-opacity='0.85'/>",
                y + dy.clamp(-ROW * 0.4, ROW * 0.4)
            );
        }
    }

    // Feature value legend
    let bar_x = WIDTH - RIGHT + 40.0;
    let bar_bottom = TOP + ROW * ranking.len().max(3) as f64;
    let _ = writeln!(
        svg,
        "  <defs><linearGradient id='fv' x1='0' y1='1' x2='0' y2='0'><stop offset='0' stop-color='{}'/><stop offset='1' stop-color='{}'/></linearGradient></defs>",
        rgb(BLUE),
        rgb(RED)
    );
    let _ = writeln!(
        svg,
        "  <rect x='{bar_x:.2}' y='{TOP:.2}' width='8' height='{:.2}' fill='url(#fv)'/>",
        bar_bottom - TOP
    );
    let _ = writeln!(
        svg,
        "  <text x='{:.2}' y='{:.2}' font-family='{FONT}' font-size='11' fill='#333'>High</text>",
        bar_x + 12.0,
        TOP + 10.0
    );
    let _ = writeln!(
        svg,
        "  <text x='{:.2}' y='{bar_bottom:.2}' font-family='{FONT}' font-size='11' fill='#333'>Low</text>",
        bar_x + 12.0
    );
    let _ = writeln!(
        svg,
        "  <text x='{:.2}' y='{:.2}' font-family='{FONT}' font-size='11' fill='#333' transform='rotate(-90 {:.2} {:.2})' text-anchor='middle'>Feature value</text>",
        bar_x - 6.0,
        (TOP + bar_bottom) / 2.0,
        bar_x - 6.0,
        (TOP + bar_bottom) / 2.0
    );

    x_axis(
        &mut svg,
        &scale,
        TOP + ROW * ranking.len() as f64,
        "SHAP value (impact on model output)",
    );
    let _ = writeln!(svg, "</svg>");

    SvgPlot {
        svg,
        width: WIDTH as u32,
        height: height.ceil() as u32,
    }
}

/// Horizontal force plot of one explanation
///
/// With `interactive` set, segments carry a CSS class and a hover label for
/// the page script.
pub fn force_plot(local: &LocalExplanation, interactive: bool) -> Result<SvgPlot> {
    if !local.is_finite() {
        return Err(ShapLensError::RenderError(
            "explanation contains non-finite values".to_string(),
        ));
    }

    let positive = local.positive_contributors();
    let negative = local.negative_contributors();
    let sum_pos: f64 = positive.iter().map(|c| c.contribution).sum();
    let sum_neg: f64 = negative.iter().map(|c| c.contribution.abs()).sum();
    let pred = local.prediction;

    let lo = (pred - sum_pos).min(local.base_value);
    let hi = (pred + sum_neg).max(local.base_value);
    let height = 170.0;
    let scale = Scale::padded(lo, hi, 40.0, WIDTH - 40.0);
    let bar_y = 70.0;
    let bar_h = 26.0;

    let mut svg = String::new();
    header(&mut svg, WIDTH, height);

    let mut segments = Vec::with_capacity(positive.len() + negative.len());
    let mut cursor = pred;
    for c in &positive {
        segments.push((cursor - c.contribution, cursor, *c, RED));
        cursor -= c.contribution;
    }
    cursor = pred;
    for c in &negative {
        segments.push((cursor, cursor + c.contribution.abs(), *c, BLUE));
        cursor += c.contribution.abs();
    }

    for (start, end, c, color) in &segments {
        let x0 = scale.map(*start);
        let x1 = scale.map(*end);
        let label = format!(
            "{} = {} ({}{})",
            c.feature_name,
            format_value(c.feature_value),
            if c.contribution >= 0.0 { "+" } else { "" },
            format_value(c.contribution)
        );
        let class_attr = if interactive {
            format!(" class='seg' data-label='{}'", escape_text(&label))
        } else {
            String::new()
        };
        let _ = writeln!(
            svg,
            "  <rect{class_attr} x='{x0:.2}' y='{bar_y:.2}' width='{:.2}' height='{bar_h:.2}' fill='{}' stroke='white' stroke-width='1'><title>{}</title></rect>",
            (x1 - x0).max(0.5),
            rgb(*color),
            escape_text(&label)
        );
        if x1 - x0 > 60.0 {
            let _ = writeln!(
                svg,
                "  <text x='{:.2}' y='{:.2}' text-anchor='middle' font-family='{FONT}' font-size='11' fill='#333'>{}</text>",
                (x0 + x1) / 2.0,
                bar_y + bar_h + 16.0,
                escape_text(&c.feature_name)
            );
        }
    }

    let px = scale.map(pred);
    let _ = writeln!(
        svg,
        "  <line x1='{px:.2}' y1='{:.2}' x2='{px:.2}' y2='{:.2}' stroke='#000' stroke-width='2'/>",
        bar_y - 14.0,
        bar_y + bar_h
    );
    let _ = writeln!(
        svg,
        "  <text x='{px:.2}' y='{:.2}' text-anchor='middle' font-family='{FONT}' font-size='13' font-weight='bold' fill='#000'>f(x) = {}</text>",
        bar_y - 20.0,
        format_value(pred)
    );

    let bx = scale.map(local.base_value);
    let _ = writeln!(
        svg,
        "  <line x1='{bx:.2}' y1='{:.2}' x2='{bx:.2}' y2='{:.2}' stroke='#777' stroke-width='1' stroke-dasharray='4 3'/>",
        bar_y - 30.0,
        bar_y + bar_h + 24.0
    );
    let _ = writeln!(
        svg,
        "  <text x='{bx:.2}' y='{:.2}' text-anchor='middle' font-family='{FONT}' font-size='11' fill='#777'>base value = {}</text>",
        bar_y + bar_h + 38.0,
        format_value(local.base_value)
    );
    let _ = writeln!(
        svg,
        "  <text x='40' y='{:.2}' font-family='{FONT}' font-size='11' fill='{}'>higher</text>",
        height - 12.0,
        rgb(RED)
    );
    let _ = writeln!(
        svg,
        "  <text x='{:.2}' y='{:.2}' text-anchor='end' font-family='{FONT}' font-size='11' fill='{}'>lower</text>",
        WIDTH - 40.0,
        height - 12.0,
        rgb(BLUE)
    );
    let _ = writeln!(svg, "</svg>");

    Ok(SvgPlot {
        svg,
        width: WIDTH as u32,
        height: height as u32,
    })
}
