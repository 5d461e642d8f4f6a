//! Small read-only helpers over `scraper` element references

use scraper::ElementRef;

/// Elements whose text never reaches the reader
const INVISIBLE_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Returns the visible text of an element with whitespace collapsed
///
/// Text nodes are joined with a single space so that adjacent block
/// elements do not run their words together.
pub fn visible_text(element: ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_text(element, &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_element) = ElementRef::wrap(child) {
            if !INVISIBLE_TAGS.contains(&child_element.value().name()) {
                collect_text(child_element, out);
            }
        }
    }
}

/// Number of characters of visible text
pub fn text_length(element: ElementRef<'_>) -> usize {
    visible_text(element).chars().count()
}

/// Nesting depth of an element, counting the document node
///
/// `<html>` is at depth 1, `<body>` at 2, a direct child of `<body>` at 3.
pub fn depth(element: ElementRef<'_>) -> usize {
    element.ancestors().count()
}

fn is_link(element: ElementRef<'_>) -> bool {
    element.value().name() == "a" && element.value().attr("href").is_some()
}

/// True when the element is, or contains, an anchor with an `href`
pub fn has_link(element: ElementRef<'_>) -> bool {
    element
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(is_link)
}

/// True when the element contains an image
pub fn has_image(element: ElementRef<'_>) -> bool {
    element
        .descendants()
        .filter_map(ElementRef::wrap)
        .any(|e| e.value().name() == "img")
}

/// Finds the `href` a reader would follow from this element
///
/// Checks the element itself, then its descendants in document order, then
/// the nearest enclosing anchor (cards wrapped entirely in `<a>`).
pub fn find_link<'a>(element: ElementRef<'a>) -> Option<&'a str> {
    element
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|e| is_link(*e))
        .or_else(|| {
            element
                .ancestors()
                .filter_map(ElementRef::wrap)
                .find(|e| is_link(*e))
        })
        .and_then(|anchor| anchor.value().attr("href"))
}
