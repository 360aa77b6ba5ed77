//! Attribution rendering
//!
//! The aggregate view is a beeswarm (default) or bar chart over the
//! explained rows. The single-instance view is a force plot, rendered as
//! interactive markup when possible and as a static image otherwise.
//! Rendering only reads attributions.

mod raster;
mod svg;

pub use raster::{stage_png, svg_to_png};
pub use svg::{bar_plot, beeswarm_plot, escape_text, force_plot, format_value, SvgPlot};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Serialize, Serializer};
use std::path::Path;
use tracing::{debug, warn};

use crate::config::ExplainerConfig;
use crate::error::{Result, ShapLensError};
use crate::explain::{Attributions, LocalExplanation};
use crate::fallback::FallbackChain;

/// A rendered view
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Image {
        caption: String,
        #[serde(serialize_with = "as_base64")]
        png: Vec<u8>,
    },
    Html {
        caption: String,
        markup: String,
    },
}

fn as_base64<S: Serializer>(bytes: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

impl Artifact {
    pub fn caption(&self) -> &str {
        match self {
            Artifact::Image { caption, .. } | Artifact::Html { caption, .. } => caption,
        }
    }

    /// `data:` URI for images
    pub fn data_uri(&self) -> Option<String> {
        match self {
            Artifact::Image { png, .. } => {
                Some(format!("data:image/png;base64,{}", STANDARD.encode(png)))
            }
            Artifact::Html { .. } => None,
        }
    }

    pub fn is_interactive(&self) -> bool {
        matches!(self, Artifact::Html { .. })
    }
}

/// Single-instance view plus the warnings raised while producing it
#[derive(Debug, Default)]
pub struct ForceOutcome {
    pub artifact: Option<Artifact>,
    pub warnings: Vec<String>,
}

const TOOLTIP_SCRIPT: &str = r#"<script>
(function () {
  var plot = document.currentScript.previousElementSibling;
  var tip = plot.querySelector('.force-tooltip');
  plot.querySelectorAll('.seg').forEach(function (seg) {
    seg.addEventListener('mouseenter', function () {
      tip.textContent = seg.getAttribute('data-label');
      seg.setAttribute('opacity', '0.7');
    });
    seg.addEventListener('mouseleave', function () {
      seg.removeAttribute('opacity');
    });
  });
})();
</script>"#;

/// Produces view artifacts from attributions
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    max_display: usize,
    interactive: bool,
}

impl Renderer {
    pub fn new(config: &ExplainerConfig) -> Self {
        Self {
            max_display: config.max_display,
            interactive: config.interactive,
        }
    }

    /// Aggregate view for one class
    pub fn aggregate(&self, attributions: &Attributions, class: usize, bar: bool) -> Result<Artifact> {
        let plot = if bar {
            bar_plot(&attributions.summary(class)?, self.max_display)
        } else {
            beeswarm_plot(
                attributions.class_table(class)?,
                attributions.data.view(),
                &attributions.feature_names,
                self.max_display,
            )
        };
        let caption = if bar {
            "Mean absolute SHAP value per feature".to_string()
        } else {
            "SHAP values per feature, colored by feature value".to_string()
        };
        self.image(plot, caption)
    }

    /// Interactive force plot markup
    pub fn force_interactive(&self, local: &LocalExplanation) -> Result<Artifact> {
        if !self.interactive {
            return Err(ShapLensError::RenderError(
                "interactive rendering is disabled".to_string(),
            ));
        }
        let plot = force_plot(local, true)?;
        let markup = format!(
            "<div class=\"force-plot\">{}<div class=\"force-tooltip\">Hover a segment for details</div></div>\n{}",
            plot.svg, TOOLTIP_SCRIPT
        );
        Ok(Artifact::Html {
            caption: force_caption(local),
            markup,
        })
    }

    /// Static force plot image
    pub fn force_static(&self, local: &LocalExplanation) -> Result<Artifact> {
        let plot = force_plot(local, false)?;
        self.image(plot, force_caption(local))
    }

    /// Force plot: interactive first, static image second
    ///
    /// Never fails; problems are reported as warnings.
    pub fn force(&self, local: &LocalExplanation) -> ForceOutcome {
        let chain = FallbackChain::new()
            .then("interactive", |l: &LocalExplanation| self.force_interactive(l))
            .then("static", |l: &LocalExplanation| self.force_static(l));

        let (outcome, failures) = chain.run_recording(local);

        match outcome {
            Some((name, artifact)) => {
                debug!(renderer = %name, "Force plot rendered");
                let warnings = failures
                    .iter()
                    .map(|(failed, err)| {
                        format!("Force plot ({}) unavailable: {}. Showing the {} version.", failed, err, name)
                    })
                    .collect();
                ForceOutcome {
                    artifact: Some(artifact),
                    warnings,
                }
            }
            None => {
                let warnings: Vec<String> = failures
                    .iter()
                    .map(|(failed, err)| format!("Force plot ({}) failed: {}", failed, err))
                    .collect();
                warn!(attempts = warnings.len(), "Force plot could not be rendered");
                ForceOutcome {
                    artifact: None,
                    warnings,
                }
            }
        }
    }

    fn image(&self, plot: SvgPlot, caption: String) -> Result<Artifact> {
        let png = svg_to_png(&plot.svg, plot.width, plot.height)?;
        stage_png(&png, |path: &Path| {
            Ok(Artifact::Image {
                caption,
                png: std::fs::read(path)?,
            })
        })
    }
}

fn force_caption(local: &LocalExplanation) -> String {
    format!(
        "Row {} (original row {}): base value {} → prediction {}",
        local.instance_index,
        local.original_index,
        format_value(local.base_value),
        format_value(local.prediction)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::{AttributionValues, ExplainerMethod, DISPLAY_CLASS};
    use ndarray::array;

    fn attributions() -> Attributions {
        Attributions {
            values: AttributionValues::Single(array![[0.5, -0.2], [-0.1, 0.3], [0.2, 0.0]]),
            base_values: vec![1.0],
            predictions: array![[1.3], [1.2], [1.2]],
            data: array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
            feature_names: vec!["age".into(), "income".into()],
            row_indices: vec![0, 1, 2],
            method: ExplainerMethod::Tree,
        }
    }

    #[test]
    fn test_aggregate_styles_do_not_touch_attributions() {
        let attr = attributions();
        let before = attr.values.clone();
        let renderer = Renderer::new(&ExplainerConfig::default());

        let dots = renderer.aggregate(&attr, DISPLAY_CLASS, false).unwrap();
        let bars = renderer.aggregate(&attr, DISPLAY_CLASS, true).unwrap();
        assert!(dots.data_uri().unwrap().starts_with("data:image/png;base64,"));
        assert_ne!(dots.caption(), bars.caption());
        assert_eq!(attr.values, before);
    }

    #[test]
    fn test_force_prefers_interactive() {
        let attr = attributions();
        let renderer = Renderer::new(&ExplainerConfig::default());
        let outcome = renderer.force(&attr.row(0, DISPLAY_CLASS).unwrap());
        assert!(outcome.warnings.is_empty());
        let artifact = outcome.artifact.unwrap();
        assert!(artifact.is_interactive());
        match artifact {
            Artifact::Html { markup, .. } => {
                assert!(markup.contains("force-tooltip"));
                assert!(markup.contains("<script>"));
            }
            Artifact::Image { .. } => unreachable!(),
        }
    }

    #[test]
    fn test_force_falls_back_to_static_with_warning() {
        let attr = attributions();
        let renderer = Renderer::new(&ExplainerConfig::default().with_interactive(false));
        let outcome = renderer.force(&attr.row(1, DISPLAY_CLASS).unwrap());
        assert!(matches!(outcome.artifact, Some(Artifact::Image { .. })));
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn test_force_both_failures_are_warnings() {
        let mut local = attributions().row(0, DISPLAY_CLASS).unwrap();
        local.prediction = f64::NAN;
        let outcome = Renderer::new(&ExplainerConfig::default()).force(&local);
        assert!(outcome.artifact.is_none());
        assert_eq!(outcome.warnings.len(), 2);
    }

    #[test]
    fn test_artifact_serializes_png_as_base64() {
        let artifact = Artifact::Image {
            caption: "c".to_string(),
            png: vec![1, 2, 3],
        };
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["kind"], "image");
        assert_eq!(json["png"], "AQID");
    }
}
