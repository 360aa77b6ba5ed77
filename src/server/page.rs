//! Dashboard page
//!
//! Server-rendered: the sidebar form posts back to `/` and the main column
//! shows whatever the session produced.

use std::fmt::Write;

use crate::config::{SessionConfig, MAX_ROWS, MIN_ROWS};
use crate::render::{escape_text, Artifact};
use crate::session::{Level, SessionReport};

const PAGE_STYLE: &str = r#"<style>
* { box-sizing: border-box; }
body { margin: 0; font-family: -apple-system, "Segoe UI", Roboto, sans-serif; color: #262730; background: #fff; display: flex; min-height: 100vh; }
aside { width: 320px; background: #f0f2f6; padding: 1.5em; flex-shrink: 0; }
aside h2 { font-size: 1.1em; margin-top: 0; }
aside label { display: block; font-size: 0.85em; margin: 0.9em 0 0.3em; }
aside input[type=text], aside input[type=number], aside select { width: 100%; padding: 0.45em; border: 1px solid #ccc; border-radius: 4px; }
aside .check label { display: inline; }
aside button { margin-top: 1.4em; width: 100%; padding: 0.6em; background: #ff4b4b; color: #fff; border: 0; border-radius: 4px; font-size: 1em; cursor: pointer; }
main { flex: 1; padding: 2em 3em; max-width: 1100px; }
h1 { margin-top: 0; }
.msg { padding: 0.75em 1em; border-radius: 4px; margin: 0.6em 0; }
.msg-info { background: #e8f1fb; color: #0b4f8a; }
.msg-success { background: #e6f4ea; color: #1e6b34; }
.msg-warning { background: #fff8e1; color: #8a6100; }
.msg-error { background: #fdecea; color: #a11a1a; }
table.preview { border-collapse: collapse; font-size: 0.85em; margin: 0.5em 0 1em; }
table.preview th, table.preview td { border: 1px solid #e0e0e0; padding: 0.3em 0.6em; text-align: right; }
table.preview th { background: #fafafa; }
.caption { color: #666; font-size: 0.9em; }
figure { margin: 1em 0; }
figure img { max-width: 100%; }
.force-plot { position: relative; }
.force-tooltip { font-size: 0.85em; color: #444; min-height: 1.2em; }
</style>"#;

/// Full dashboard page for a configuration and an optional session report
pub fn render_page(config: &SessionConfig, report: Option<&SessionReport>) -> String {
    let mut html = String::with_capacity(64 * 1024);
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    html.push_str("<title>shaplens</title>\n");
    html.push_str(PAGE_STYLE);
    html.push_str("\n</head>\n<body>\n");

    render_sidebar(&mut html, config, report);

    html.push_str("<main>\n<h1>Model explainability dashboard</h1>\n");
    if let Some(report) = report {
        render_report(&mut html, config, report);
    } else {
        html.push_str(
            "<div class=\"msg msg-info\">Enter an experiment name in the sidebar and press Explain.</div>\n",
        );
    }
    html.push_str("</main>\n</body>\n</html>\n");
    html
}

// ============================================================================
// Sidebar
// ============================================================================

fn render_sidebar(html: &mut String, config: &SessionConfig, report: Option<&SessionReport>) {
    html.push_str("<aside>\n<h2>Settings</h2>\n");
    html.push_str("<form method=\"post\" action=\"/\" enctype=\"multipart/form-data\">\n");

    text_input(html, "tracking_uri", "Tracking URI", &config.tracking_uri);
    text_input(html, "experiment_name", "Experiment name", &config.experiment_name);

    // Only offered once the experiment resolved
    if let Some(runs) = report.and_then(|r| r.runs.as_ref()) {
        let selected = report.and_then(|r| r.selected_run.as_deref());
        html.push_str("<label for=\"run_id\">Run</label>\n<select id=\"run_id\" name=\"run_id\">\n");
        for run in runs {
            let _ = writeln!(
                html,
                "<option value=\"{}\"{}>{}</option>",
                escape_text(&run.run_id),
                if selected == Some(run.run_id.as_str()) { " selected" } else { "" },
                escape_text(&run.label())
            );
        }
        html.push_str("</select>\n");
    }

    text_input(html, "artifact_path", "Model artifact path", &config.artifact_path);

    html.push_str("<label for=\"file\">Data (CSV)</label>\n");
    html.push_str("<input id=\"file\" type=\"file\" name=\"file\" accept=\".csv,text/csv\">\n");

    let _ = writeln!(
        html,
        "<label for=\"max_rows\">Max rows to explain</label>\n\
         <input id=\"max_rows\" type=\"number\" name=\"max_rows\" min=\"{}\" max=\"{}\" step=\"50\" value=\"{}\">",
        MIN_ROWS, MAX_ROWS, config.max_rows
    );
    let _ = writeln!(
        html,
        "<label for=\"sample_index\">Row to explain</label>\n\
         <input id=\"sample_index\" type=\"number\" name=\"sample_index\" min=\"0\" value=\"{}\">",
        config.sample_index
    );

    checkbox(html, "summary_bar", "Bar-style summary", config.summary_bar);
    checkbox(html, "static_force", "Static force plot", !config.explainer.interactive);

    let _ = writeln!(
        html,
        "<label for=\"background_size\">Background rows</label>\n\
         <input id=\"background_size\" type=\"number\" name=\"background_size\" min=\"1\" value=\"{}\">",
        config.explainer.background_size
    );
    let _ = writeln!(
        html,
        "<label for=\"n_permutations\">Permutations per row</label>\n\
         <input id=\"n_permutations\" type=\"number\" name=\"n_permutations\" min=\"1\" value=\"{}\">",
        config.explainer.n_permutations
    );
    let _ = writeln!(
        html,
        "<label for=\"max_display\">Features shown</label>\n\
         <input id=\"max_display\" type=\"number\" name=\"max_display\" min=\"1\" value=\"{}\">",
        config.explainer.max_display
    );

    html.push_str("<button type=\"submit\">Explain</button>\n</form>\n</aside>\n");
}

fn text_input(html: &mut String, name: &str, label: &str, value: &str) {
    let _ = writeln!(
        html,
        "<label for=\"{name}\">{label}</label>\n<input id=\"{name}\" type=\"text\" name=\"{name}\" value=\"{value}\">",
        name = name,
        label = label,
        value = escape_text(value)
    );
}

fn checkbox(html: &mut String, name: &str, label: &str, checked: bool) {
    let _ = writeln!(
        html,
        "<div class=\"check\"><input id=\"{name}\" type=\"checkbox\" name=\"{name}\" value=\"on\"{checked}> <label for=\"{name}\">{label}</label></div>",
        name = name,
        label = label,
        checked = if checked { " checked" } else { "" }
    );
}

// ============================================================================
// Session output
// ============================================================================

fn render_report(html: &mut String, config: &SessionConfig, report: &SessionReport) {
    for message in &report.messages {
        let class = match message.level {
            Level::Info => "msg-info",
            Level::Success => "msg-success",
            Level::Warning => "msg-warning",
            Level::Error => "msg-error",
        };
        let _ = writeln!(
            html,
            "<div class=\"msg {}\">{}</div>",
            class,
            escape_text(&message.text)
        );
    }

    if let Some(preview) = &report.preview {
        html.push_str("<h3>Data preview</h3>\n<table class=\"preview\">\n<tr>");
        for header in &preview.headers {
            let _ = write!(html, "<th>{}</th>", escape_text(header));
        }
        html.push_str("</tr>\n");
        for row in &preview.rows {
            html.push_str("<tr>");
            for cell in row {
                let _ = write!(html, "<td>{}</td>", escape_text(cell));
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</table>\n");
        if let (Some(original), Some(explained)) = (report.original_rows, report.explained_rows) {
            let _ = writeln!(
                html,
                "<p class=\"caption\">{} of {} rows explained (cap {}).</p>",
                explained, original, config.max_rows
            );
        }
    }

    if let Some(aggregate) = &report.aggregate {
        html.push_str("<h3>Global feature importance</h3>\n");
        render_artifact(html, aggregate);
    }

    if let Some(force) = &report.force {
        let _ = writeln!(html, "<h3>Explanation for row {}</h3>", config.sample_index);
        render_artifact(html, force);
    }
}

fn render_artifact(html: &mut String, artifact: &Artifact) {
    html.push_str("<figure>\n");
    match artifact {
        Artifact::Image { .. } => {
            if let Some(uri) = artifact.data_uri() {
                let _ = writeln!(
                    html,
                    "<img src=\"{}\" alt=\"{}\">",
                    uri,
                    escape_text(artifact.caption())
                );
            }
        }
        Artifact::Html { markup, .. } => {
            html.push_str(markup);
            html.push('\n');
        }
    }
    let _ = writeln!(
        html,
        "<figcaption class=\"caption\">{}</figcaption>\n</figure>",
        escape_text(artifact.caption())
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::run_session;

    #[test]
    fn test_blank_page_has_form() {
        let html = render_page(&SessionConfig::default(), None);
        assert!(html.contains("enctype=\"multipart/form-data\""));
        assert!(html.contains("name=\"experiment_name\""));
        assert!(!html.contains("name=\"run_id\""));
    }

    #[test]
    fn test_messages_are_escaped() {
        let config = SessionConfig::new("/nonexistent", "<b>exp</b>").with_max_rows(1);
        let report = run_session(&config, None);
        let html = render_page(&config, Some(&report));
        assert!(html.contains("msg-error"));
        assert!(html.contains("&lt;b&gt;exp&lt;/b&gt;"));
        assert!(!html.contains("<b>exp</b>"));
    }
}
