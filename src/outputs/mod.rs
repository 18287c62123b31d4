//! Delivery of finished country reports.
//!
//! The pipeline hands each non-empty report to a [`NewsletterSink`]. The
//! binary ships [`html::HtmlFileSink`], which writes one wrapped HTML file per
//! country and day:
//!
//! ```text
//! output_dir/
//! └── 2025-05-06/
//!     ├── colombia.html
//!     └── costa-rica.html
//! ```

pub mod html;

use std::error::Error;

pub use html::HtmlFileSink;

/// Receiver of a finished report.
pub trait NewsletterSink {
    async fn deliver(
        &self,
        html: &str,
        country_name: &str,
        brand_label: &str,
        accent_color: &str,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}
