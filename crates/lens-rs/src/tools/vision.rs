//! Vision extraction: turn the saved screenshot into text.
//!
//! [`AnalyzeScreenshot`] reads the newest capture from the shared
//! [`PayloadStore`], shrinks it (downscale to a maximum width, re-encode as
//! JPEG), and sends it to a vision model together with an extraction
//! instruction. The model's reply is the tool result; the image itself never
//! enters the agent's conversation.

use crate::context::payload::PayloadStore;
use crate::tools::core::{Tool, ToolFuture, parse_tool_args};
use crate::{ChatClient, ChatRequest, ContentPart, Message, ToolDef};
use base64::Engine;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Tool result when nothing has been captured yet.
pub const NO_SCREENSHOT: &str = "Error: No screenshot found. Please call browser_screenshot first.";

/// Placeholder in [`VisionConfig::prompt`] replaced with the item limit.
pub const MAX_ITEMS_PLACEHOLDER: &str = "{max_items}";

const DEFAULT_PROMPT: &str = "Analyze this screenshot of a web page.

Extract every distinct item visible in the main content area (search \
results, listings, cards, or table rows). For each item give its title and \
the key details shown next to it.

Format your response as a numbered markdown list, one item per line. \
Extract up to {max_items} items. If a field is not visible, write \"N/A\".";

/// Errors from decoding or re-encoding a capture.
#[derive(Debug, Error)]
pub enum RecompressError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode JPEG: {0}")]
    Encode(#[source] image::ImageError),
    #[error("image processing task failed: {0}")]
    Task(String),
}

// ── Config ─────────────────────────────────────────────────────────

/// Vision tool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    /// Vision-capable model identifier.
    pub model: String,
    /// Captures wider than this are downscaled, keeping aspect ratio.
    pub max_width: u32,
    /// JPEG quality (1-100).
    pub quality: u8,
    /// Maximum tokens for the extraction reply.
    pub max_tokens: u32,
    /// Extraction instruction. `{max_items}` is replaced per call.
    pub prompt: String,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_VISION_MODEL.to_string(),
            max_width: 1_400,
            quality: 85,
            max_tokens: 2_048,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

impl VisionConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    /// The extraction instruction for a given item limit.
    pub fn render_prompt(&self, max_items: u32) -> String {
        self.prompt
            .replace(MAX_ITEMS_PLACEHOLDER, &max_items.to_string())
    }
}

// ── Image processing ───────────────────────────────────────────────

/// Decode a stored capture.
pub fn load_capture(bytes: &[u8]) -> Result<DynamicImage, RecompressError> {
    image::load_from_memory(bytes).map_err(RecompressError::Decode)
}

/// A capture re-encoded for the vision model.
#[derive(Debug, Clone)]
pub struct Recompressed {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Recompressed {
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
        )
    }
}

/// Target size when fitting `width` x `height` into `max_width`.
fn fit_width(width: u32, height: u32, max_width: u32) -> (u32, u32) {
    if width <= max_width || width == 0 {
        return (width, height);
    }
    let ratio = max_width as f64 / width as f64;
    let new_height = (height as f64 * ratio).round().max(1.0) as u32;
    (max_width, new_height)
}

/// Downscale to at most `max_width` (Lanczos3, aspect preserved), flatten to
/// RGB, and encode as JPEG at `quality`.
pub fn recompress(
    image: &DynamicImage,
    max_width: u32,
    quality: u8,
) -> Result<Recompressed, RecompressError> {
    let (width, height) = fit_width(image.width(), image.height(), max_width);
    let rgb = if (width, height) == (image.width(), image.height()) {
        image.to_rgb8()
    } else {
        image
            .resize_exact(width, height, FilterType::Lanczos3)
            .to_rgb8()
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(RecompressError::Encode)?;
    debug!(
        "Recompressed {}x{} -> {width}x{height} JPEG q{quality} ({} bytes)",
        image.width(),
        image.height(),
        jpeg.len()
    );
    Ok(Recompressed {
        jpeg,
        width,
        height,
    })
}

// ── AnalyzeScreenshot ──────────────────────────────────────────────

/// Arguments for `analyze_saved_screenshot`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AnalyzeArgs {
    /// Maximum number of items to extract (default: 10).
    #[serde(default = "default_max_items", alias = "num_jobs")]
    pub max_items: u32,
}

fn default_max_items() -> u32 {
    10
}

/// Extracts structured text from the newest saved screenshot.
pub struct AnalyzeScreenshot {
    client: Arc<dyn ChatClient>,
    store: Arc<dyn PayloadStore>,
    config: VisionConfig,
    name: String,
}

impl AnalyzeScreenshot {
    pub fn new(
        client: Arc<dyn ChatClient>,
        store: Arc<dyn PayloadStore>,
        config: VisionConfig,
    ) -> Self {
        Self {
            client,
            store,
            config,
            name: crate::context::offload::DEFAULT_ANALYZE_TOOL.to_string(),
        }
    }

    /// Register under a different tool name. Keep it in sync with the
    /// offload stage's placeholder.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn request(&self, max_items: u32, image: &Recompressed) -> ChatRequest {
        ChatRequest {
            model: Some(self.config.model.clone()),
            messages: vec![Message::user_parts(vec![
                ContentPart::text(self.config.render_prompt(max_items)),
                ContentPart::image_url(image.to_data_uri()),
            ])],
            max_tokens: self.config.max_tokens,
            ..Default::default()
        }
    }

    async fn analyze(&self, args: AnalyzeArgs) -> String {
        let bytes = match self.store.latest() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return NO_SCREENSHOT.to_string(),
            Err(e) => return format!("Error reading screenshot: {e}"),
        };

        let original_len = bytes.len();
        let (max_width, quality) = (self.config.max_width, self.config.quality);
        let shrunk = tokio::task::spawn_blocking(move || {
            load_capture(&bytes).and_then(|img| recompress(&img, max_width, quality))
        })
        .await
        .map_err(|e| RecompressError::Task(e.to_string()))
        .and_then(|r| r);
        let shrunk = match shrunk {
            Ok(s) => s,
            Err(e) => return format!("Error reading screenshot: {e}"),
        };
        info!(
            "Image size reduced from {original_len} to {} bytes ({:.1}%)",
            shrunk.jpeg.len(),
            100.0 * shrunk.jpeg.len() as f64 / original_len.max(1) as f64
        );

        let request = self.request(args.max_items.max(1), &shrunk);
        info!("Sending screenshot to {} for analysis", self.config.model);
        match self.client.chat(&request).await {
            Ok(completion) => match completion.content {
                Some(text) if !text.trim().is_empty() => {
                    info!("Vision analysis complete ({} chars)", text.len());
                    text
                }
                _ => "Error analyzing screenshot: the model returned no text".to_string(),
            },
            Err(e) => format!("Error analyzing screenshot: {e}"),
        }
    }
}

impl Tool for AnalyzeScreenshot {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            &self.name,
            "Analyze the most recently saved screenshot with a vision model and \
             return the items visible on the page as a markdown list. Call this \
             AFTER browser_screenshot; the screenshot is saved automatically.",
            crate::json_schema_for::<AnalyzeArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            match parse_tool_args::<AnalyzeArgs>(&arguments) {
                Ok(args) => self.analyze(args).await,
                Err(e) => e,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::payload::PayloadSlot;
    use crate::{ChatCompletion, MessageContent};
    use futures::future::BoxFuture;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Records every request and answers with a fixed reply.
    struct Recorder {
        reply: Result<String, String>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl Recorder {
        fn replying(reply: Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    impl ChatClient for Recorder {
        fn chat<'a>(
            &'a self,
            body: &'a ChatRequest,
        ) -> BoxFuture<'a, Result<ChatCompletion, String>> {
            self.requests.lock().unwrap().push(body.clone());
            let reply = self.reply.clone();
            Box::pin(async move {
                reply.map(|text| ChatCompletion {
                    content: Some(text),
                    ..Default::default()
                })
            })
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([30, 60, 90, 255]),
        ));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn fit_width_keeps_aspect() {
        assert_eq!(fit_width(2_800, 1_000, 1_400), (1_400, 500));
        assert_eq!(fit_width(1_000, 700, 1_400), (1_000, 700));
        assert_eq!(fit_width(3_000, 1, 1_400), (1_400, 1));
    }

    #[test]
    fn load_capture_reports_dimensions() {
        let img = load_capture(&png(40, 30)).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
    }

    #[test]
    fn load_capture_rejects_non_images() {
        assert!(matches!(
            load_capture(b"not an image"),
            Err(RecompressError::Decode(_))
        ));
    }

    #[test]
    fn recompress_downscales_wide_images() {
        let img = load_capture(&png(300, 100)).unwrap();
        let out = recompress(&img, 150, 85).unwrap();
        assert_eq!((out.width, out.height), (150, 50));
        let back = image::load_from_memory(&out.jpeg).unwrap();
        assert_eq!((back.width(), back.height()), (150, 50));
        assert!(out.to_data_uri().starts_with("data:image/jpeg;base64,"));
    }

    #[test]
    fn recompress_leaves_narrow_images_at_size() {
        let img = load_capture(&png(120, 80)).unwrap();
        let out = recompress(&img, 1_400, 85).unwrap();
        assert_eq!((out.width, out.height), (120, 80));
    }

    #[test]
    fn prompt_template_substitutes_limit() {
        let config = VisionConfig::default().with_prompt("list {max_items} jobs");
        assert_eq!(config.render_prompt(7), "list 7 jobs");
    }

    #[test]
    fn args_accept_alias_and_default() {
        let a: AnalyzeArgs = serde_json::from_str(r#"{"num_jobs": 3}"#).unwrap();
        assert_eq!(a.max_items, 3);
        let b: AnalyzeArgs = serde_json::from_str("{}").unwrap();
        assert_eq!(b.max_items, 10);
    }

    #[tokio::test]
    async fn empty_store_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let client = Recorder::replying(Ok("unused"));
        let tool = AnalyzeScreenshot::new(
            client.clone(),
            Arc::new(PayloadSlot::in_workspace(dir.path())),
            VisionConfig::default(),
        );
        assert_eq!(tool.execute("{}").await, NO_SCREENSHOT);
        assert!(client.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sends_one_multimodal_message_and_returns_reply() {
        let dir = tempfile::tempdir().unwrap();
        let slot = Arc::new(PayloadSlot::in_workspace(dir.path()));
        slot.store(&png(2_000, 1_000)).unwrap();

        let client = Recorder::replying(Ok("1. **Engineer** - Acme - Remote"));
        let config = VisionConfig::default()
            .with_model("vision-test")
            .with_prompt("Extract up to {max_items} jobs.");
        let tool = AnalyzeScreenshot::new(client.clone(), slot, config);

        let out = tool.execute(r#"{"num_jobs": 4}"#).await;
        assert_eq!(out, "1. **Engineer** - Acme - Remote");

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.model.as_deref(), Some("vision-test"));
        assert_eq!(req.max_tokens, 2_048);
        assert_eq!(req.messages.len(), 1);
        let Some(MessageContent::Parts(parts)) = &req.messages[0].content else {
            panic!("expected multimodal parts");
        };
        assert_eq!(parts[0].as_text(), Some("Extract up to 4 jobs."));
        let ContentPart::Block(image) = &parts[1] else {
            panic!("expected image block");
        };
        let url = image["image_url"]["url"].as_str().unwrap();
        let jpeg = base64::engine::general_purpose::STANDARD
            .decode(url.strip_prefix("data:image/jpeg;base64,").unwrap())
            .unwrap();
        let sent = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((sent.width(), sent.height()), (1_400, 700));
    }

    #[tokio::test]
    async fn model_failure_becomes_error_text() {
        let dir = tempfile::tempdir().unwrap();
        let slot = Arc::new(PayloadSlot::in_workspace(dir.path()));
        slot.store(&png(10, 10)).unwrap();
        let tool = AnalyzeScreenshot::new(
            Recorder::replying(Err("chat API HTTP 503: overloaded")),
            slot,
            VisionConfig::default(),
        );
        assert_eq!(
            tool.execute("{}").await,
            "Error analyzing screenshot: chat API HTTP 503: overloaded"
        );
    }

    #[tokio::test]
    async fn corrupt_capture_becomes_error_text() {
        let dir = tempfile::tempdir().unwrap();
        let slot = Arc::new(PayloadSlot::in_workspace(dir.path()));
        slot.store(b"definitely not a png").unwrap();
        let client = Recorder::replying(Ok("unused"));
        let tool = AnalyzeScreenshot::new(client.clone(), slot, VisionConfig::default());
        let out = tool.execute("{}").await;
        assert!(out.starts_with("Error reading screenshot: failed to decode image"));
        assert!(client.requests.lock().unwrap().is_empty());
    }
}
