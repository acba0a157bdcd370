use serde_json::Value;

pub const DEFAULT_UI_VERSION: &str = "1.1.6";
const UI_JS_URL: &str = "https://releases.rancher.com/api-ui/%VERSION%/ui.min.js";
const UI_CSS_URL: &str = "https://releases.rancher.com/api-ui/%VERSION%/ui.min.css";

/// Where the browser UI assets come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiSettings {
    pub version: String,
    /// Both URLs must be set to override the versioned defaults.
    pub js_url: Option<String>,
    pub css_url: Option<String>,
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            version: DEFAULT_UI_VERSION.to_string(),
            js_url: None,
            css_url: None,
        }
    }
}

impl UiSettings {
    fn urls(&self) -> (String, String) {
        match (self.js_url.as_deref(), self.css_url.as_deref()) {
            (Some(js), Some(css)) if !js.is_empty() && !css.is_empty() => (js.to_string(), css.to_string()),
            _ => {
                let version = if self.version.is_empty() {
                    DEFAULT_UI_VERSION
                } else {
                    self.version.as_str()
                };
                (
                    UI_JS_URL.replace("%VERSION%", version),
                    UI_CSS_URL.replace("%VERSION%", version),
                )
            }
        }
    }
}

/// JSON that is safe to inline in a `<script>` element.
fn script_json(value: &Value) -> String {
    value
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}

fn attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// The browser shell: UI assets, the schemas URL and the response as `data`.
pub fn render(ui: &UiSettings, schemas_url: &str, data: &Value) -> String {
    let (js_url, css_url) = ui.urls();
    format!(
        r#"<!DOCTYPE html>
<!-- Send "Accept: application/json" to receive plain JSON responses. -->
<link rel="stylesheet" type="text/css" href="{css}" />
<script src="{js}"></script>
<script>
var schemas = {schemas};
var data = {data};
</script>
"#,
        css = attribute(&css_url),
        js = attribute(&js_url),
        schemas = script_json(&Value::from(schemas_url)),
        data = script_json(data),
    )
}
