use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::db::Series;
use crate::error::ExtractError;

pub const SERIES_SELECT: &str = ".formsetDefaultArea .seriesCol select";

static BRACKETED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"【(.*?)】").unwrap());

/// Display name of a series option: the text inside `【…】` when present,
/// otherwise everything before the first `<br`, trimmed.
pub fn process_series_name(raw: &str) -> String {
    if let Some(caps) = BRACKETED_RE.captures(raw) {
        return caps[1].to_string();
    }
    raw.split("<br").next().unwrap_or_default().trim().to_string()
}

/// Read the series dropdown of the card list page. Options without a value
/// (the "ALL" entry) or without a usable name are skipped.
pub fn extract_series(html: &str) -> Result<Vec<Series>, ExtractError> {
    let select = Selector::parse(SERIES_SELECT).map_err(|e| ExtractError::Selector {
        css: SERIES_SELECT,
        reason: format!("{:?}", e),
    })?;
    let option = Selector::parse("option").map_err(|e| ExtractError::Selector {
        css: "option",
        reason: format!("{:?}", e),
    })?;

    let doc = Html::parse_document(html);
    let dropdown = doc
        .select(&select)
        .next()
        .ok_or(ExtractError::PageNotReady(SERIES_SELECT))?;

    let series = dropdown
        .select(&option)
        .filter_map(|opt| {
            let id = opt.value().attr("value").unwrap_or_default().trim();
            if id.is_empty() {
                return None;
            }
            let text = opt.text().collect::<String>();
            let name = process_series_name(text.trim());
            if name.is_empty() {
                return None;
            }
            Some(Series {
                series_id: id.to_string(),
                series_name: name,
            })
        })
        .collect();
    Ok(series)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracketed_name() {
        assert_eq!(process_series_name("【ROMANCE DAWN】"), "ROMANCE DAWN");
        assert_eq!(
            process_series_name("BOOSTER PACK 【PARAMOUNT WAR】[OP-02]"),
            "PARAMOUNT WAR"
        );
        assert_eq!(process_series_name("【】"), "");
    }

    #[test]
    fn name_before_line_break() {
        assert_eq!(
            process_series_name("STARTER DECK -Straw Hat Crew-<br class=\"spInline\">[ST-01]"),
            "STARTER DECK -Straw Hat Crew-"
        );
        assert_eq!(process_series_name("  Promotion card  "), "Promotion card");
    }

    #[test]
    fn series_dropdown() {
        let html = std::fs::read_to_string("tests/fixtures/series_list.html").unwrap();
        let series = extract_series(&html).unwrap();
        let pairs: Vec<(&str, &str)> = series
            .iter()
            .map(|s| (s.series_id.as_str(), s.series_name.as_str()))
            .collect();
        assert_eq!(
            pairs,
            [
                ("569001", "ROMANCE DAWN"),
                ("569002", "PARAMOUNT WAR"),
                ("569101", "STARTER DECK -Straw Hat Crew-"),
                ("569901", "Promotion card"),
            ]
        );
    }

    #[test]
    fn missing_dropdown() {
        let err = extract_series("<div class=\"resultCol\"></div>").unwrap_err();
        assert!(matches!(err, ExtractError::PageNotReady(SERIES_SELECT)));
    }
}
