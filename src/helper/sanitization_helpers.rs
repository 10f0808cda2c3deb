use ammonia::Builder;
use pulldown_cmark::{html, Options, Parser};
use std::collections::HashSet;

const SAFE_TAGS: [&str; 33] = [
    "h1", "h2", "h3", "h4", "h5", "h6", "b", "strong", "i", "em", "p", "br",
    "a", "ul", "ol", "li", "blockquote", "code", "pre", "hr", "img", "table",
    "thead", "tbody", "tr", "th", "td", "s", "del", "figure", "figcaption", "iframe", "div",
];

const SAFE_ATTRIBUTES: [&str; 10] = [
    "src", "href", "alt", "title", "class", "width", "height", "align", "allowfullscreen", "frameborder",
];

/// Renders a markdown body to HTML and cleans the result. Scripting
/// attributes and unknown tags never survive.
pub fn markdown_to_html(markdown_input: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown_input, options);
    let mut unsafe_html = String::new();
    html::push_html(&mut unsafe_html, parser);

    Builder::new()
        .tags(SAFE_TAGS.iter().copied().collect::<HashSet<_>>())
        .generic_attributes(SAFE_ATTRIBUTES.iter().copied().collect::<HashSet<_>>())
        .link_rel(Some("noopener"))
        .clean(&unsafe_html)
        .to_string()
}

/// Strips all HTML tags from input (for titles, ledes and page metadata).
pub fn strip_all_html(input: &str) -> String {
    Builder::new()
        .tags(HashSet::new())
        .clean(input)
        .to_string()
}

/// Escapes text for an XML text node.
pub fn escape_xml(input: &str) -> String {
    html_escape::encode_text(input).to_string()
}
