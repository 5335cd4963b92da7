use std::sync::LazyLock;

use lol_html::{RewriteStrSettings, element, rewrite_str};
use regex::{Captures, Regex};
use tracing::warn;
use url::Url;

/// `src=` (any attribute name ending in `src`) followed by a quoted value that
/// starts with exactly one `/`.
static QUOTED_ROOT_RELATIVE_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(\bsrc\s*=\s*)(["'])/([^/])"#).expect("Invalid root-relative src regex")
});

/// Point root-relative `src` references at `site_base`.
///
/// The PDF engine has no page URL to resolve `/assets/a.png` against, so
/// every `src` starting with a single `/` is prefixed with the site origin.
/// Parsed elements are rewritten first; a second text-level pass then catches
/// quoted occurrences the parser does not expose as element attributes
/// (`<noscript>` bodies, `data-src`, markup inside inline scripts).
/// Absolute and protocol-relative (`//cdn`) references are left alone. The
/// rewrite never fails: markup the rewriter rejects still gets the text pass.
pub fn absolutize_asset_urls(html: &str, site_base: &Url) -> String {
    let prefix = site_base.as_str().trim_end_matches('/');
    let parsed = rewrite_src_attributes(html, prefix);
    rewrite_quoted_src_text(&parsed, prefix)
}

fn rewrite_src_attributes(html: &str, prefix: &str) -> String {
    let rewritten = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("[src]", |el| {
                if let Some(src) = el.get_attribute("src") {
                    let trimmed = src.trim_start();
                    if is_root_relative(trimmed) {
                        el.set_attribute("src", &format!("{prefix}{trimmed}"))?;
                    }
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    );

    match rewritten {
        Ok(html) => html,
        Err(err) => {
            warn!(
                target = "application::pdf::rewrite",
                op = "rewrite::absolutize_asset_urls",
                result = "passthrough",
                error = %err,
                "Element rewrite failed; falling back to the text pass only"
            );
            html.to_string()
        }
    }
}

fn rewrite_quoted_src_text(html: &str, prefix: &str) -> String {
    QUOTED_ROOT_RELATIVE_SRC
        .replace_all(html, |caps: &Captures<'_>| {
            format!("{}{}{prefix}/{}", &caps[1], &caps[2], &caps[3])
        })
        .into_owned()
}

fn is_root_relative(src: &str) -> bool {
    src.starts_with('/') && !src.starts_with("//")
}
