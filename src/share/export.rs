use std::sync::Arc;

use crate::config::LinkConfig;
use crate::storage::models::{CapabilityToken, SubjectType};
use crate::storage::Database;
use crate::tokens::issuer::{get_or_create_link, IssueError, LinkRequest, TtlBounds};

use super::qr::{QrBounds, QrCache, QrImage, QrRenderer, SvgQrRenderer};
use super::LinkEncoder;

/// A link ready to place in an exported document
#[derive(Debug, Clone)]
pub struct SharedLink {
    /// Absent when QR rendering was not requested or failed
    pub qr: Option<Arc<QrImage>>,
    pub token: CapabilityToken,
    pub url: String,
}

/// One document-generation pass (a spreadsheet, a PDF, a printed report).
///
/// Every task/room link in the document goes through the same issuer and
/// encoder, and QR images are memoized for the lifetime of the pass.
pub struct ExportLinks<'a, R = SvgQrRenderer> {
    db: &'a Database,
    encoder: &'a LinkEncoder,
    issued_by: Option<String>,
    qr_bounds: QrBounds,
    qr_cache: QrCache<R>,
    ttl_bounds: TtlBounds,
}

impl<'a> ExportLinks<'a, SvgQrRenderer> {
    pub fn new(db: &'a Database, encoder: &'a LinkEncoder, config: &LinkConfig) -> Self {
        Self::with_renderer(db, encoder, config, SvgQrRenderer::default())
    }
}

impl<'a, R: QrRenderer> ExportLinks<'a, R> {
    pub fn with_renderer(
        db: &'a Database,
        encoder: &'a LinkEncoder,
        config: &LinkConfig,
        renderer: R,
    ) -> Self {
        Self {
            db,
            encoder,
            issued_by: None,
            qr_bounds: config.qr,
            qr_cache: QrCache::new(renderer),
            ttl_bounds: config.ttl,
        }
    }

    /// Attribute tokens minted during this pass to a user
    pub fn issued_by(mut self, user: impl Into<String>) -> Self {
        self.issued_by = Some(user.into());
        self
    }

    /// Link plus QR image for a subject
    pub fn link_with_qr(
        &mut self,
        subject_type: SubjectType,
        subject_id: u64,
        ttl_days: Option<i64>,
        qr_size_px: Option<i64>,
    ) -> Result<SharedLink, IssueError> {
        let mut link = self.link(subject_type, subject_id, ttl_days)?;
        let size_px = self.qr_bounds.clamp_px(qr_size_px);
        link.qr = self.qr_cache.build_qr(&link.url, size_px);
        Ok(link)
    }

    /// Link without a QR image
    pub fn link(
        &mut self,
        subject_type: SubjectType,
        subject_id: u64,
        ttl_days: Option<i64>,
    ) -> Result<SharedLink, IssueError> {
        let req = LinkRequest {
            issued_by: self.issued_by.as_deref(),
            subject_id,
            subject_type,
            ttl_days,
        };
        let token = get_or_create_link(self.db, &req, &self.ttl_bounds)?;
        let url = self.encoder.build_url(&token);
        Ok(SharedLink {
            qr: None,
            token,
            url,
        })
    }

    /// Distinct QR images rendered (or attempted) so far in this pass
    pub fn qr_images_cached(&self) -> usize {
        self.qr_cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::share::QrError;
    use crate::testutil::{setup_db, test_config};

    struct BrokenRenderer;

    impl QrRenderer for BrokenRenderer {
        fn render(&self, _data: &str, _size_px: u32) -> Result<QrImage, QrError> {
            Err(QrError::Unavailable("no renderer".to_string()))
        }
    }

    #[test]
    fn test_repeated_subject_reuses_link_and_image() {
        let (db, _temp) = setup_db();
        let config = test_config();
        let encoder = LinkEncoder::new(config.links.public_base_url.clone());
        let mut export = ExportLinks::new(&db, &encoder, &config.links).issued_by("facilities");

        let first = export.link_with_qr(SubjectType::Room, 3, Some(60), Some(150)).unwrap();
        let second = export.link_with_qr(SubjectType::Room, 3, Some(60), Some(150)).unwrap();

        assert_eq!(first.url, second.url);
        assert_eq!(first.token.created_by.as_deref(), Some("facilities"));
        assert!(Arc::ptr_eq(first.qr.as_ref().unwrap(), second.qr.as_ref().unwrap()));
        assert_eq!(export.qr_images_cached(), 1);
    }

    #[test]
    fn test_qr_size_is_clamped() {
        let (db, _temp) = setup_db();
        let config = test_config();
        let encoder = LinkEncoder::new(config.links.public_base_url.clone());
        let mut export = ExportLinks::new(&db, &encoder, &config.links);

        let link = export.link_with_qr(SubjectType::Task, 8, None, Some(5000)).unwrap();
        assert_eq!(link.qr.unwrap().size_px, 300);
    }

    #[test]
    fn test_broken_renderer_still_yields_link() {
        let (db, _temp) = setup_db();
        let config = test_config();
        let encoder = LinkEncoder::new(config.links.public_base_url.clone());
        let mut export = ExportLinks::with_renderer(&db, &encoder, &config.links, BrokenRenderer);

        let link = export.link_with_qr(SubjectType::Task, 8, Some(7), None).unwrap();
        assert!(link.qr.is_none());
        assert!(link.url.contains("/public/task-photos?t="));
    }
}
