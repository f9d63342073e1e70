//! Markdown fragment for one album.
//!
//! The file is rewritten in full on every update:
//!
//! ```text
//! +++
//! title = "Dogs"
//! date = "2024-06-01"
//! location = """Beach"""
//! cover = "/photos/dogs/coverimage.jpg"
//! +++
//!
//! {{< wrap >}}
//! {{< photo href="..." largeDim="1600x1040" smallUrl="..." smallDim="800x520" alt="..." thumbSize="256x256" thumbUrl="..." caption="..." copyright="..." >}}
//!
//! {{< /wrap >}}
//! ```
//!
//! There is no trailing newline. Double quotes inside shortcode attributes
//! are written as `&quot;`.

use std::collections::BTreeMap;

/// Album-level values for the front matter block.
#[derive(Debug, Clone, Copy)]
pub struct FrontMatter<'a> {
    pub title: &'a str,
    pub date: Option<&'a str>,
    pub properties: &'a BTreeMap<String, serde_yaml::Value>,
    pub cover_url: Option<&'a str>,
}

/// One `{{< photo >}}` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub large_url: String,
    pub large_dim: (u32, u32),
    pub small_url: String,
    pub small_dim: (u32, u32),
    pub thumb_url: String,
    pub thumb_dim: (u32, u32),
    pub alt: String,
    pub caption: String,
    pub copyright: String,
}

/// Render the whole markdown file.
pub fn render(front: &FrontMatter<'_>, embeds: &[Embed]) -> String {
    let properties = if front.properties.is_empty() {
        String::new()
    } else {
        front
            .properties
            .iter()
            .map(|(key, value)| property_line(key, value))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut lines = vec![
        "+++".to_string(),
        format!("title = {}", toml_string(front.title)),
        format!("date = {}", toml_string(front.date.unwrap_or(""))),
        properties,
        format!("cover = {}", toml_string(front.cover_url.unwrap_or(""))),
        "+++".to_string(),
        String::new(),
        "{{< wrap >}}".to_string(),
    ];
    for embed in embeds {
        lines.push(embed_directive(embed));
        lines.push(String::new());
    }
    lines.push("{{< /wrap >}}".to_string());
    lines.join("\n")
}

pub fn embed_directive(embed: &Embed) -> String {
    format!(
        "{{{{< photo href=\"{}\" largeDim=\"{}\" smallUrl=\"{}\" smallDim=\"{}\" alt=\"{}\" \
         thumbSize=\"{}\" thumbUrl=\"{}\" caption=\"{}\" copyright=\"{}\" >}}}}",
        attr(&embed.large_url),
        dim(embed.large_dim),
        attr(&embed.small_url),
        dim(embed.small_dim),
        attr(&embed.alt),
        dim(embed.thumb_dim),
        attr(&embed.thumb_url),
        attr(embed.caption.trim()),
        attr(&embed.copyright),
    )
}

fn dim((width, height): (u32, u32)) -> String {
    format!("{width}x{height}")
}

fn attr(value: &str) -> String {
    value.replace('"', "&quot;")
}

/// TOML basic string with escapes.
fn toml_string(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

/// `key = """text"""` for strings, a TOML literal for everything else.
fn property_line(key: &str, value: &serde_yaml::Value) -> String {
    let rendered = match value {
        serde_yaml::Value::String(s) if !s.contains("\"\"\"") && !s.ends_with('"') => {
            format!("\"\"\"{s}\"\"\"")
        }
        serde_yaml::Value::String(s) => toml_string(s),
        serde_yaml::Value::Null => toml_string(""),
        other => toml::Value::try_from(other)
            .map(|v| v.to_string())
            .unwrap_or_else(|_| toml_string(&yaml_scalar_text(other))),
    };
    format!("{key} = {rendered}")
}

fn yaml_scalar_text(value: &serde_yaml::Value) -> String {
    serde_yaml::to_string(value)
        .map(|s| s.trim_end().to_string())
        .unwrap_or_default()
}
