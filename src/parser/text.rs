use scraper::{ElementRef, Node};

/// Text of the element's own text nodes, ignoring child elements.
///
/// Catalog fields are laid out as `<div class="cost"><h3>Cost</h3>5</div>`, so this
/// drops the heading and keeps the value.
pub fn own_text(el: ElementRef) -> String {
    el.children()
        .filter_map(|n| n.value().as_text().map(|t| &**t))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Cost, power and counter: digits only, anything else (`-`, blanks) is 0.
pub fn number_or_zero(text: &str) -> i64 {
    let text = text.trim();
    if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
        return 0;
    }
    text.parse().unwrap_or(0)
}

/// Rules text as plain text: `<h3>` headings dropped, each `<br>` becomes one space.
pub fn rules_text(el: ElementRef) -> String {
    let mut out = String::new();
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) if e.name() == "h3" => {}
            Node::Element(e) if e.name() == "br" => out.push(' '),
            Node::Element(_) => {
                if let Some(inner) = ElementRef::wrap(child) {
                    out.extend(inner.text());
                }
            }
            _ => {}
        }
    }
    out.trim().to_string()
}

/// Drop the cache-busting query and make `../images/` paths absolute under `site`.
pub fn image_url(data_src: &str, site: &str) -> String {
    let path = data_src.split('?').next().unwrap_or_default();
    path.replace("../images/", &format!("{}/images/", site))
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn first(html: &str, css: &str) -> String {
        let doc = Html::parse_fragment(html);
        let sel = Selector::parse(css).unwrap();
        let el = doc.select(&sel).next().unwrap();
        format!("{}|{}", own_text(el), rules_text(el))
    }

    #[test]
    fn numbers() {
        assert_eq!(number_or_zero("7"), 7);
        assert_eq!(number_or_zero(" 5000 "), 5000);
        assert_eq!(number_or_zero("-"), 0);
        assert_eq!(number_or_zero(""), 0);
        assert_eq!(number_or_zero("+1"), 0);
        assert_eq!(number_or_zero("1,000"), 0);
    }

    #[test]
    fn own_text_skips_heading() {
        let got = first(r#"<div class="cost"><h3>Cost</h3> 4 </div>"#, ".cost");
        assert_eq!(got, "4|4");
    }

    #[test]
    fn rules_text_flattens_markup() {
        let html = r#"<div class="text"><h3>Effect</h3>[On Play] Draw 1.<br>Then <b>trash</b> 1.<br/>End</div>"#;
        let doc = Html::parse_fragment(html);
        let sel = Selector::parse(".text").unwrap();
        let el = doc.select(&sel).next().unwrap();
        assert_eq!(rules_text(el), "[On Play] Draw 1. Then trash 1. End");
    }

    #[test]
    fn image_url_rewrite() {
        assert_eq!(
            image_url("../images/cardlist/card/OP01-001.png?240628", "https://en.onepiece-cardgame.com"),
            "https://en.onepiece-cardgame.com/images/cardlist/card/OP01-001.png"
        );
        assert_eq!(
            image_url("https://cdn.example/OP01-001_p1.png", "https://x"),
            "https://cdn.example/OP01-001_p1.png"
        );
    }
}
