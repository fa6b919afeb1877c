//! HTML classifier (§4.2): article-vs-page detection from a parsed DOM and
//! the source's configured selectors. A pure function of (DOM, Source).

use scraper::{Html, Selector};

use crate::types::{ContentType, Selectors};

/// Minimum matched-body length (characters) for a page to be considered an
/// article when selector-based classification is used (§4.2 step 3).
pub const MIN_ARTICLE_BODY_LENGTH: usize = 250;

/// Classify a parsed document as article or page.
///
/// `selectors` is `None` when no `Source` could be resolved for this page
/// (e.g. the seed didn't resolve to a known source by hostname); that case
/// always returns [`ContentType::Page`] per §4.2.
pub fn classify(document: &Html, selectors: Option<&Selectors>) -> ContentType {
    if og_type_is_article(document) {
        return ContentType::Article;
    }
    if has_news_article_ld_json(document) {
        return ContentType::Article;
    }

    let selectors = match selectors {
        Some(s) => s,
        None => return ContentType::Page,
    };

    let body_text = match selectors.body.as_deref().and_then(|sel| select_text(document, sel)) {
        Some(text) if !text.trim().is_empty() => text,
        _ => return ContentType::Page,
    };

    if body_text.trim().chars().count() < MIN_ARTICLE_BODY_LENGTH {
        return ContentType::Page;
    }

    if let Some(title_sel) = selectors.title.as_deref() {
        if !title_sel.trim().is_empty() {
            match select_text(document, title_sel) {
                Some(title) if !title.trim().is_empty() => {}
                _ => return ContentType::Page,
            }
        }
    }

    ContentType::Article
}

fn select_text(document: &Html, selector_str: &str) -> Option<String> {
    let selector = Selector::parse(selector_str).ok()?;
    let mut texts = document.select(&selector).peekable();
    texts.peek()?;
    Some(
        texts
            .flat_map(|el| el.text())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn og_type_is_article(document: &Html) -> bool {
    let selector = Selector::parse(r#"meta[property="og:type"]"#).expect("static selector is valid");
    document.select(&selector).any(|el| {
        el.value()
            .attr("content")
            .map(|v| v.eq_ignore_ascii_case("article"))
            .unwrap_or(false)
    })
}

fn has_news_article_ld_json(document: &Html) -> bool {
    let selector =
        Selector::parse(r#"script[type="application/ld+json"]"#).expect("static selector is valid");
    document.select(&selector).any(|el| {
        let text: String = el.text().collect();
        text.contains("NewsArticle") || text.contains("\"Article\"") || text.contains("'Article'")
    })
}
