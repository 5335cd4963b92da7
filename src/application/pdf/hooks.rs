use std::{fmt, sync::Arc};

/// Rewrites a freshly composed artifact name.
pub type KeyOverrideHook = Arc<dyn Fn(String) -> String + Send + Sync>;
/// Rewrites HTML flowing through the pipeline.
pub type HtmlFilterHook = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Typed extension points applied at fixed positions in the pipeline.
///
/// Hooks registered at the same point run in registration order, each one
/// receiving the previous one's output.
#[derive(Clone, Default)]
pub struct PdfHooks {
    key_overrides: Vec<KeyOverrideHook>,
    fetched_html: Vec<HtmlFilterHook>,
    template_html: Vec<HtmlFilterHook>,
}

impl PdfHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs on newly composed artifact names; stored names are never re-filtered.
    pub fn with_key_override<F>(mut self, hook: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        self.key_overrides.push(Arc::new(hook));
        self
    }

    /// Runs on the HTML returned by the loop-back fetch.
    pub fn with_fetched_html_filter<F>(mut self, hook: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        self.fetched_html.push(Arc::new(hook));
        self
    }

    /// Runs after root-relative asset URLs have been made absolute.
    pub fn with_template_html_filter<F>(mut self, hook: F) -> Self
    where
        F: Fn(String) -> String + Send + Sync + 'static,
    {
        self.template_html.push(Arc::new(hook));
        self
    }

    pub fn apply_key_overrides(&self, name: String) -> String {
        apply_chain(&self.key_overrides, name)
    }

    pub fn apply_fetched_html(&self, html: String) -> String {
        apply_chain(&self.fetched_html, html)
    }

    pub fn apply_template_html(&self, html: String) -> String {
        apply_chain(&self.template_html, html)
    }
}

fn apply_chain(chain: &[Arc<dyn Fn(String) -> String + Send + Sync>], value: String) -> String {
    chain.iter().fold(value, |acc, hook| hook(acc))
}

impl fmt::Debug for PdfHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfHooks")
            .field("key_overrides", &self.key_overrides.len())
            .field("fetched_html", &self.fetched_html.len())
            .field("template_html", &self.template_html.len())
            .finish()
    }
}
