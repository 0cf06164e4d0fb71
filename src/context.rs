//! Auxiliary run context: remote documents, local files and images.
//!
//! Every item resolves independently to either its content or an inline
//! marker describing why it couldn't be included. A bad item never fails the
//! run and never stops the remaining items from being resolved.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::util::safe_truncate_index;

/// Per-URL fetch deadline.
pub const URL_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Cap on the bytes embedded for a single file or URL body.
pub const MAX_TEXT_BYTES: usize = 50_000;

/// How many raw HTML bytes are read per byte of text cap.
const HTML_READ_FACTOR: usize = 8;

/// Images larger than this are replaced by a marker.
pub const MAX_IMAGE_BYTES: u64 = 5_000_000;

/// Optional extra material attached to a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub file_paths: Vec<PathBuf>,
    #[serde(default)]
    pub images: Vec<PathBuf>,
}

impl RunContext {
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty() && self.file_paths.is_empty() && self.images.is_empty()
    }

    /// Number of blocks an assembly of this context produces.
    pub fn item_count(&self) -> usize {
        self.urls.len() + self.file_paths.len() + self.images.len()
    }
}

/// Content of one item, or the marker that replaces it.
type Resolved = Result<String, String>;

#[derive(Debug)]
struct ContextBlock {
    tag: &'static str,
    attrs: Vec<(&'static str, String)>,
    body: Resolved,
}

impl ContextBlock {
    fn render(&self) -> String {
        let mut out = format!("<{}", self.tag);
        for (key, value) in &self.attrs {
            out.push_str(&format!(" {}=\"{}\"", key, escape_attr(value)));
        }
        out.push_str(">\n");
        match &self.body {
            Ok(content) => out.push_str(content.trim_end_matches('\n')),
            Err(marker) => out.push_str(marker),
        }
        out.push_str(&format!("\n</{}>", self.tag));
        out
    }
}

/// Turns a [`RunContext`] into one `<context>` block for the prompt.
pub struct ContextAssembler {
    client: reqwest::Client,
    max_text_bytes: usize,
    max_image_bytes: u64,
}

impl ContextAssembler {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; AgentOrchestrator/1.0)")
            .timeout(URL_FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            max_text_bytes: MAX_TEXT_BYTES,
            max_image_bytes: MAX_IMAGE_BYTES,
        }
    }

    /// Override the size caps (mainly for tests).
    pub fn with_limits(mut self, max_text_bytes: usize, max_image_bytes: u64) -> Self {
        self.max_text_bytes = max_text_bytes;
        self.max_image_bytes = max_image_bytes;
        self
    }

    /// Assemble the context block. Returns an empty string when there is
    /// nothing to include.
    pub async fn assemble(&self, context: Option<&RunContext>) -> String {
        let context = match context {
            Some(c) if !c.is_empty() => c,
            _ => return String::new(),
        };

        let mut blocks = Vec::with_capacity(context.item_count());

        for url in &context.urls {
            blocks.push(ContextBlock {
                tag: "url",
                attrs: vec![("source", url.clone())],
                body: self.fetch_url(url).await,
            });
        }

        for path in &context.file_paths {
            blocks.push(ContextBlock {
                tag: "file",
                attrs: vec![("path", path.display().to_string())],
                body: self.read_file(path).await,
            });
        }

        for path in &context.images {
            blocks.push(ContextBlock {
                tag: "image",
                attrs: vec![
                    ("filename", display_file_name(path)),
                    (
                        "media_type",
                        mime_guess::from_path(path)
                            .first_or_octet_stream()
                            .essence_str()
                            .to_string(),
                    ),
                    ("encoding", "base64".to_string()),
                ],
                body: self.read_image(path).await,
            });
        }

        let failed = blocks.iter().filter(|b| b.body.is_err()).count();
        debug!(items = blocks.len(), failed, "Assembled run context");

        let rendered: Vec<String> = blocks.iter().map(ContextBlock::render).collect();
        format!("<context>\n{}\n</context>", rendered.join("\n\n"))
    }

    async fn fetch_url(&self, url: &str) -> Resolved {
        let marker = |detail: String| {
            warn!("Context URL {} unavailable: {}", url, detail);
            format!("[Error fetching URL: {}]", detail)
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| marker(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(marker(format!("HTTP error: {}", status)));
        }

        let is_html = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/html"))
            .unwrap_or(false);

        // Markup is stripped before the cap applies, so HTML may read further.
        let limit = if is_html {
            self.max_text_bytes.saturating_mul(HTML_READ_FACTOR)
        } else {
            self.max_text_bytes
        };
        let total = response.content_length();
        let (raw, cut) = read_limited(response, limit)
            .await
            .map_err(|e| marker(e.to_string()))?;

        let body = String::from_utf8_lossy(&raw).into_owned();
        let text = if is_html {
            extract_text_from_html(&body)
        } else {
            body
        };

        if !cut {
            return Ok(self.cap_text(text, "response"));
        }
        let end = safe_truncate_index(&text, self.max_text_bytes);
        let size = match total {
            Some(len) => format!("is {} bytes", len),
            None => format!("exceeds {} bytes", limit),
        };
        Ok(format!(
            "{}\n\n[Truncated: response {}, showing first {} bytes]",
            &text[..end],
            size,
            end
        ))
    }

    async fn read_file(&self, path: &Path) -> Resolved {
        if !path.exists() {
            warn!("Context file not found: {}", path.display());
            return Err(format!("[File not found: {}]", path.display()));
        }

        let read = async {
            let mut file = tokio::fs::File::open(path).await?;
            let size = file.metadata().await?.len();
            let mut buf = Vec::with_capacity(std::cmp::min(size as usize, self.max_text_bytes));
            (&mut file)
                .take(self.max_text_bytes as u64)
                .read_to_end(&mut buf)
                .await?;
            Ok::<_, std::io::Error>((buf, size))
        };

        match read.await {
            Ok((buf, size)) => {
                let mut content = String::from_utf8_lossy(&buf).into_owned();
                if size > self.max_text_bytes as u64 {
                    content.push_str(&format!(
                        "\n\n[Truncated: file is {} bytes, showing first {} bytes]",
                        size, self.max_text_bytes
                    ));
                }
                Ok(content)
            }
            Err(e) => {
                warn!("Failed to read context file {}: {}", path.display(), e);
                Err(format!("[Error reading file: {}]", e))
            }
        }
    }

    async fn read_image(&self, path: &Path) -> Resolved {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) if m.is_file() => m,
            _ => {
                warn!("Context image not found: {}", path.display());
                return Err(format!("[Image not found: {}]", path.display()));
            }
        };

        if metadata.len() > self.max_image_bytes {
            warn!(
                "Context image {} too large ({} bytes)",
                path.display(),
                metadata.len()
            );
            return Err(format!(
                "[Image too large: {} bytes (max {})]",
                metadata.len(),
                self.max_image_bytes
            ));
        }

        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(base64::engine::general_purpose::STANDARD.encode(bytes)),
            Err(e) => {
                warn!("Failed to read context image {}: {}", path.display(), e);
                Err(format!("[Error reading image: {}]", e))
            }
        }
    }

    fn cap_text(&self, text: String, what: &str) -> String {
        if text.len() <= self.max_text_bytes {
            return text;
        }
        let end = safe_truncate_index(&text, self.max_text_bytes);
        format!(
            "{}\n\n[Truncated: {} is {} bytes, showing first {} bytes]",
            &text[..end],
            what,
            text.len(),
            end
        )
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Read at most `limit` bytes of the body. The flag is set when more was
/// available and reading stopped early.
async fn read_limited(
    mut response: reqwest::Response,
    limit: usize,
) -> reqwest::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, false))
}

fn display_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Basic HTML entity decoding.
fn html_decode(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Strip scripts, styles and tags, collapsing whitespace.
fn extract_text_from_html(html: &str) -> String {
    let mut text = html.to_string();

    for (open, close) in [("<script", "</script>"), ("<style", "</style>")] {
        while let Some(start) = text.find(open) {
            match text[start..].find(close) {
                Some(end) => {
                    text = format!("{}{}", &text[..start], &text[start + end + close.len()..])
                }
                None => break,
            }
        }
    }

    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }

    let result = result.split_whitespace().collect::<Vec<_>>().join(" ");
    html_decode(&result)
}
