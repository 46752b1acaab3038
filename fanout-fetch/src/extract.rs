use scraper::{ElementRef, Html, Selector};

/// Paragraphs taken from each page unless configured otherwise.
pub const DEFAULT_PARAGRAPHS: usize = 3;

/// Text of the first `limit` `<p>` elements, in document order, joined with
/// single spaces.
///
/// Empty paragraphs count toward the limit but contribute no text. Pages
/// with fewer paragraphs yield what they have; pages with none yield `""`.
///
/// ```
/// use fanout_fetch::extract::intro_paragraphs;
///
/// let html = "<p>One</p><p>Two <b>bold</b></p><p>Three</p><p>Four</p>";
/// assert_eq!(intro_paragraphs(html, 3), "One Two bold Three");
/// ```
pub fn intro_paragraphs(html: &str, limit: usize) -> String {
    let Ok(selector) = Selector::parse("p") else {
        return String::new();
    };
    let document = Html::parse_document(html);

    document
        .select(&selector)
        .take(limit)
        .map(|p| paragraph_text(&p))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Descendant text with whitespace runs collapsed.
fn paragraph_text(element: &ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
