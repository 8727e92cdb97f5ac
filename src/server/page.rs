use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

pub const DEFAULT_TITLE: &str = "Image Captioning with BLIP";
pub const DEFAULT_DESCRIPTION: &str = "Upload an image and this app will generate a caption \
using the Salesforce BLIP model. Runs on GPU if available.";

/// Visual theme of the page.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Theme {
    #[default]
    Soft,
    Base,
    Dark,
}

impl Theme {
    fn css(&self) -> &'static str {
        match self {
            Theme::Soft => {
                "--bg:#f5f3ff;--panel:#ffffff;--text:#1f2937;--muted:#6b7280;--accent:#7c3aed;--border:#e5e7eb;--radius:16px;"
            }
            Theme::Base => {
                "--bg:#ffffff;--panel:#f9fafb;--text:#111827;--muted:#4b5563;--accent:#f97316;--border:#d1d5db;--radius:6px;"
            }
            Theme::Dark => {
                "--bg:#0b0f19;--panel:#1f2937;--text:#f3f4f6;--muted:#9ca3af;--accent:#6366f1;--border:#374151;--radius:8px;"
            }
        }
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "soft" => Ok(Theme::Soft),
            "base" | "default" => Ok(Theme::Base),
            "dark" => Ok(Theme::Dark),
            other => Err(format!("unknown theme: {other}")),
        }
    }
}

/// Static content of the captioning page.
#[derive(Clone, Debug)]
pub struct UiConfig {
    pub title: String,
    pub description: String,
    pub theme: Theme,
    examples: Vec<PathBuf>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            theme: Theme::default(),
            examples: Vec::new(),
        }
    }
}

impl UiConfig {
    /// Set the example gallery, keeping only the files that exist.
    pub fn with_examples<P: AsRef<Path>>(mut self, paths: impl IntoIterator<Item = P>) -> Self {
        self.examples.clear();
        for path in paths {
            let path = path.as_ref();
            if !path.is_file() {
                log::warn!("Skipping missing example image: {}", path.display());
                continue;
            }
            if !self.examples.iter().any(|p| p == path) {
                self.examples.push(path.to_path_buf());
            }
        }
        self
    }

    pub fn examples(&self) -> &[PathBuf] {
        &self.examples
    }
}

/// Render the upload-and-caption page.
pub fn render_page(ui: &UiConfig) -> String {
    let gallery = if ui.examples.is_empty() {
        String::new()
    } else {
        let items = ui
            .examples
            .iter()
            .enumerate()
            .map(|(idx, path)| {
                let label = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!(
                    r#"<button type="button" class="example" data-index="{idx}"><img src="/examples/{idx}" alt="{label}"><span>{label}</span></button>"#,
                    label = escape_html(&label),
                )
            })
            .collect::<Vec<_>>()
            .join("");
        format!(r#"<section class="panel"><h2>Examples</h2><div class="gallery">{items}</div></section>"#)
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<style>
:root{{{theme}}}
body{{margin:0;font-family:system-ui,sans-serif;background:var(--bg);color:var(--text)}}
main{{max-width:960px;margin:0 auto;padding:24px}}
p.description{{color:var(--muted)}}
.row{{display:flex;gap:16px;flex-wrap:wrap}}
.panel{{flex:1;min-width:300px;background:var(--panel);border:1px solid var(--border);border-radius:var(--radius);padding:16px;margin-bottom:16px}}
#preview{{max-width:100%;max-height:320px;display:none;margin-top:8px;border-radius:var(--radius)}}
textarea{{width:100%;min-height:96px;box-sizing:border-box;background:var(--panel);color:var(--text);border:1px solid var(--border);border-radius:var(--radius);padding:8px}}
button{{background:var(--accent);color:#fff;border:0;border-radius:var(--radius);padding:8px 16px;cursor:pointer}}
.gallery{{display:flex;gap:8px;flex-wrap:wrap}}
.example{{background:transparent;color:var(--text);display:flex;flex-direction:column;align-items:center;padding:4px}}
.example img{{width:96px;height:96px;object-fit:cover;border-radius:var(--radius)}}
</style>
</head>
<body>
<main>
<h1>{title}</h1>
<p class="description">{description}</p>
<div class="row">
<section class="panel">
<form id="upload">
<label for="image">Upload Image</label><br>
<input id="image" name="image" type="file" accept="image/*" required>
<img id="preview" alt="preview">
<p><button type="submit">Submit</button></p>
</form>
</section>
<section class="panel">
<label for="caption">Generated Caption</label>
<textarea id="caption" readonly></textarea>
</section>
</div>
{gallery}
</main>
<script>
const out = document.getElementById('caption');
const preview = document.getElementById('preview');
async function show(response) {{
  const data = await response.json();
  out.value = data.caption ?? data.error ?? '';
}}
document.getElementById('image').addEventListener('change', (e) => {{
  const file = e.target.files[0];
  if (file) {{ preview.src = URL.createObjectURL(file); preview.style.display = 'block'; }}
}});
document.getElementById('upload').addEventListener('submit', async (e) => {{
  e.preventDefault();
  out.value = 'Generating...';
  await show(await fetch('/caption', {{ method: 'POST', body: new FormData(e.target) }}));
}});
document.querySelectorAll('.example').forEach((el) => el.addEventListener('click', async () => {{
  const idx = el.dataset.index;
  preview.src = '/examples/' + idx; preview.style.display = 'block';
  out.value = 'Generating...';
  await show(await fetch('/examples/' + idx + '/caption', {{ method: 'POST' }}));
}}));
</script>
</body>
</html>
"#,
        title = escape_html(&ui.title),
        description = escape_html(&ui.description),
        theme = ui.theme.css(),
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theme_from_str() {
        assert_eq!("Soft".parse::<Theme>(), Ok(Theme::Soft));
        assert_eq!("default".parse::<Theme>(), Ok(Theme::Base));
        assert_eq!("dark".parse::<Theme>(), Ok(Theme::Dark));
        assert!("neon".parse::<Theme>().is_err());
    }

    #[test]
    fn missing_examples_are_dropped() {
        let existing = Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml");
        let ui = UiConfig::default().with_examples([
            existing.clone(),
            PathBuf::from("no/such/cat.jpg"),
            existing.clone(),
        ]);
        assert_eq!(ui.examples(), &[existing]);
    }

    #[test]
    fn page_without_examples() {
        let page = render_page(&UiConfig::default());
        assert!(page.contains("<title>Image Captioning with BLIP</title>"));
        assert!(page.contains("Generated Caption"));
        assert!(page.contains(r#"accept="image/*""#));
        assert!(!page.contains("class=\"gallery\""));
        assert!(!page.to_lowercase().contains("flag"));
    }

    #[test]
    fn page_escapes_text() {
        let ui = UiConfig {
            title: "<script>".to_string(),
            ..Default::default()
        };
        let page = render_page(&ui);
        assert!(page.contains("&lt;script&gt;"));
    }
}
