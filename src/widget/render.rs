use super::UppyConfig;
use serde_json::json;

/// Path the bridge script is served from.
pub const BRIDGE_SCRIPT_PATH: &str = "/assets/uppy-bridge.js";

/// Where the rendered widget loads its code from and publishes to.
#[derive(Debug, Clone)]
pub struct RenderContext {
    /// Base URL of the vendored Uppy bundle (`uppy.min.mjs`, `uppy.min.css`)
    pub asset_base_url: String,
    pub bridge_script_url: String,
    /// `/sessions/{session}/inputs/{input}`
    pub endpoint: String,
}

impl RenderContext {
    pub fn new(asset_base_url: impl Into<String>, session_id: &str, input_id: &str) -> Self {
        Self {
            asset_base_url: asset_base_url.into().trim_end_matches('/').to_string(),
            bridge_script_url: BRIDGE_SCRIPT_PATH.to_string(),
            endpoint: format!("/sessions/{}/inputs/{}", session_id, input_id),
        }
    }
}

/// HTML fragment mounting the widget: stylesheet, container and init script.
pub fn render_widget(config: &UppyConfig, ctx: &RenderContext) -> String {
    let mut options = config.to_options_json();
    options["endpoint"] = json!(ctx.endpoint);

    format!(
        r#"<link rel="stylesheet" href="{base}/uppy.min.css">
<div id="{id}" class="uppy-bridge" data-input-id="{id}"></div>
<script type="module">
import * as Uppy from "{base}/uppy.min.mjs";
import {{ attachUppyBridge }} from "{bridge}";
attachUppyBridge(Uppy, {options});
</script>"#,
        base = escape_attr(&ctx.asset_base_url),
        id = escape_attr(config.input_id()),
        bridge = escape_attr(&ctx.bridge_script_url),
        options = script_json(&options),
    )
}

/// Standalone page around [`render_widget`].
pub fn render_page(title: &str, config: &UppyConfig, ctx: &RenderContext) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
</head>
<body>
{widget}
</body>
</html>
"#,
        title = escape_text(title),
        widget = render_widget(config, ctx),
    )
}

/// JSON safe to embed inside a `<script>` element.
fn script_json(value: &serde_json::Value) -> String {
    value
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

fn escape_attr(value: &str) -> String {
    escape_text(value)
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::{DashboardOptions, UppyConfig};

    fn ctx() -> RenderContext {
        RenderContext::new("https://cdn.example.com/uppy/", "s1", "files")
    }

    #[test]
    fn test_render_widget_wires_assets_and_options() {
        let config = UppyConfig::builder("files").build().unwrap();
        let html = render_widget(&config, &ctx());

        assert!(html.contains(r#"<div id="files" class="uppy-bridge""#));
        assert!(html.contains(r#"href="https://cdn.example.com/uppy/uppy.min.css""#));
        assert!(html.contains(r#"import * as Uppy from "https://cdn.example.com/uppy/uppy.min.mjs";"#));
        assert!(html.contains(r#"from "/assets/uppy-bridge.js""#));
        assert!(html.contains(r#""endpoint":"/sessions/s1/inputs/files""#));
    }

    #[test]
    fn test_script_cannot_be_closed_by_options() {
        let config = UppyConfig::builder("files")
            .dashboard(DashboardOptions {
                note: Some("</script><script>alert(1)</script>".into()),
                ..DashboardOptions::default()
            })
            .build()
            .unwrap();
        let html = render_widget(&config, &ctx());

        assert_eq!(html.matches("</script>").count(), 1);
        assert!(html.contains("\\u003c/script\\u003e"));
    }

    #[test]
    fn test_script_json_round_trips() {
        let value = json!({"note": "a < b && c > d"});
        let parsed: serde_json::Value = serde_json::from_str(&script_json(&value)).unwrap();
        assert_eq!(parsed, value);
    }

    #[test]
    fn test_render_page_escapes_title() {
        let config = UppyConfig::builder("files").build().unwrap();
        let page = render_page("Reports & <Scans>", &config, &ctx());
        assert!(page.starts_with("<!DOCTYPE html>"));
        assert!(page.contains("<title>Reports &amp; &lt;Scans&gt;</title>"));
    }
}
