use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use qrcode::render::svg;
use qrcode::QrCode;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QrError {
    #[error("QR encoding failed: {0}")]
    Encode(String),
    #[error("QR renderer unavailable: {0}")]
    Unavailable(String),
}

/// Rendered QR image, ready to embed in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub size_px: u32,
}

impl QrImage {
    /// `data:` URI for inline `<img>` embedding
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.content_type, STANDARD.encode(&self.bytes))
    }
}

/// Something that can turn a URL into a QR image
pub trait QrRenderer {
    fn render(&self, data: &str, size_px: u32) -> Result<QrImage, QrError>;
}

/// In-process SVG renderer
#[derive(Debug, Clone)]
pub struct SvgQrRenderer {
    pub dark_color: String,
    pub light_color: String,
}

impl Default for SvgQrRenderer {
    fn default() -> Self {
        Self {
            dark_color: "#000000".to_string(),
            light_color: "#ffffff".to_string(),
        }
    }
}

impl QrRenderer for SvgQrRenderer {
    fn render(&self, data: &str, size_px: u32) -> Result<QrImage, QrError> {
        let svg_string = QrCode::new(data.as_bytes())
            .map_err(|e| QrError::Encode(e.to_string()))?
            .render::<svg::Color>()
            .min_dimensions(size_px, size_px)
            .dark_color(svg::Color(&self.dark_color))
            .light_color(svg::Color(&self.light_color))
            .build();

        Ok(QrImage {
            bytes: svg_string.into_bytes(),
            content_type: "image/svg+xml",
            size_px,
        })
    }
}

/// Allowed QR image size, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrBounds {
    pub default_px: u32,
    pub max_px: u32,
    pub min_px: u32,
}

impl Default for QrBounds {
    fn default() -> Self {
        Self {
            default_px: 180,
            max_px: 300,
            min_px: 120,
        }
    }
}

impl QrBounds {
    pub fn clamp_px(&self, requested: Option<i64>) -> u32 {
        let px = match requested {
            Some(p) if p > 0 => p,
            _ => i64::from(self.default_px),
        };
        px.clamp(i64::from(self.min_px), i64::from(self.max_px)) as u32
    }
}

/// Memo of rendered QR images keyed by `(url, size)`.
///
/// Owned by a single document-generation pass and dropped with it. Failures
/// are remembered too, so a failing renderer is asked once per key.
pub struct QrCache<R = SvgQrRenderer> {
    entries: HashMap<(String, u32), Result<Arc<QrImage>, QrError>>,
    renderer: R,
}

impl Default for QrCache<SvgQrRenderer> {
    fn default() -> Self {
        Self::new(SvgQrRenderer::default())
    }
}

impl<R: QrRenderer> QrCache<R> {
    pub fn new(renderer: R) -> Self {
        Self {
            entries: HashMap::new(),
            renderer,
        }
    }

    /// Render (or reuse) the QR image for `url`, surfacing the failure
    pub fn try_build_qr(&mut self, url: &str, size_px: u32) -> Result<Arc<QrImage>, QrError> {
        let key = (url.to_string(), size_px);
        if let Some(cached) = self.entries.get(&key) {
            return cached.clone();
        }

        let rendered = self.renderer.render(url, size_px).map(Arc::new);
        if let Err(e) = &rendered {
            tracing::warn!(error = %e, size_px, "QR rendering failed; link will be shown without an image");
        }
        self.entries.insert(key, rendered.clone());
        rendered
    }

    /// Render (or reuse) the QR image for `url`; `None` means show the link without one
    pub fn build_qr(&mut self, url: &str, size_px: u32) -> Option<Arc<QrImage>> {
        self.try_build_qr(url, size_px).ok()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
