//! Shareable URLs and QR images for capability links.

mod export;
mod qr;

pub use export::{ExportLinks, SharedLink};
pub use qr::{QrBounds, QrCache, QrError, QrImage, QrRenderer, SvgQrRenderer};

use crate::storage::models::{CapabilityToken, SubjectType};

/// Public viewer path for a subject type
pub fn viewer_path(subject_type: SubjectType) -> &'static str {
    match subject_type {
        SubjectType::Room => "/public/room-photos",
        SubjectType::Task => "/public/task-photos",
    }
}

/// Relative URL of one photo file inside a granted gallery
pub fn photo_path(photo_id: u64, secret: &str) -> String {
    format!("/public/photos/{photo_id}?t={secret}")
}

/// Builds absolute viewer URLs on a fixed public origin
#[derive(Debug, Clone)]
pub struct LinkEncoder {
    base_url: String,
}

impl LinkEncoder {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn build_url(&self, token: &CapabilityToken) -> String {
        format!(
            "{}{}?t={}",
            self.base_url,
            viewer_path(token.subject_type),
            token.secret
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::token_for;

    #[test]
    fn test_build_url_per_subject() {
        let encoder = LinkEncoder::new("https://punch.example.org/");
        let task = token_for(SubjectType::Task, 4);
        let room = token_for(SubjectType::Room, 4);

        assert_eq!(
            encoder.build_url(&task),
            format!("https://punch.example.org/public/task-photos?t={}", task.secret)
        );
        assert_eq!(
            encoder.build_url(&room),
            format!("https://punch.example.org/public/room-photos?t={}", room.secret)
        );
    }

    #[test]
    fn test_photo_path() {
        assert_eq!(photo_path(7, "abc"), "/public/photos/7?t=abc");
    }
}
