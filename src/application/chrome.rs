use std::sync::Arc;

use crate::config::SiteSettings;
use crate::presentation::views::{BrandView, FooterView, LayoutChrome, PageMetaView, PreviewView};

/// Builds the layout chrome shared by every rendered page. All of it comes
/// from configuration; only the preview banner varies per request.
#[derive(Clone)]
pub struct ChromeService {
    site: Arc<SiteSettings>,
}

impl ChromeService {
    pub fn new(site: Arc<SiteSettings>) -> Self {
        Self { site }
    }

    pub fn load(&self, preview_active: bool) -> LayoutChrome {
        LayoutChrome {
            brand: BrandView {
                title: self.site.title.clone(),
                tagline: self.site.tagline.clone(),
                href: "/".to_string(),
            },
            footer: FooterView {
                copy: self.site.footer.clone(),
            },
            meta: PageMetaView {
                title: self.site.title.clone(),
                description: self.site.meta_description.clone(),
            },
            preview: PreviewView {
                active: preview_active,
                exit_path: self.site.preview_exit_path.clone(),
            },
        }
    }
}
