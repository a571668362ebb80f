use scraper::{ElementRef, Html, Selector};

use super::text::{image_url, number_or_zero, own_text, rules_text};
use crate::db::RawCardFace;
use crate::error::ExtractError;

pub const RESULT_COL: &str = ".resultCol";

const NO_ATTRIBUTE: &str = "-";

fn sel(css: &'static str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        css,
        reason: format!("{:?}", e),
    })
}

/// Selectors for one catalog page, parsed once per page.
struct CardSelectors {
    result_col: Selector,
    modal_col: Selector,
    front_img: Selector,
    info_span: Selector,
    info_col: Selector,
    back_col: Selector,
    cost: Selector,
    attribute_img: Selector,
    power: Selector,
    counter: Selector,
    color: Selector,
    feature: Selector,
    effect: Selector,
    get_info: Selector,
}

impl CardSelectors {
    fn new() -> Result<Self, ExtractError> {
        Ok(CardSelectors {
            result_col: sel(RESULT_COL)?,
            modal_col: sel(".modalCol")?,
            front_img: sel(".frontCol img")?,
            info_col: sel(".infoCol")?,
            info_span: sel("span")?,
            back_col: sel(".backCol")?,
            cost: sel(".cost")?,
            attribute_img: sel(".attribute img")?,
            power: sel(".power")?,
            counter: sel(".counter")?,
            color: sel(".color")?,
            feature: sel(".feature")?,
            effect: sel(".text")?,
            get_info: sel(".getInfo")?,
        })
    }
}

/// Extract one row per `.modalCol` of a series page, in page order.
///
/// The outer error means the page itself is unusable; inner errors are per card.
pub fn extract_cards(
    html: &str,
    series_id: &str,
    site: &str,
) -> Result<Vec<Result<RawCardFace, ExtractError>>, ExtractError> {
    let s = CardSelectors::new()?;
    let doc = Html::parse_document(html);
    let result_col = doc
        .select(&s.result_col)
        .next()
        .ok_or(ExtractError::PageNotReady(RESULT_COL))?;

    Ok(result_col
        .select(&s.modal_col)
        .enumerate()
        .map(|(index, modal)| extract_card(&s, index, modal, series_id, site))
        .collect())
}

fn extract_card(
    s: &CardSelectors,
    index: usize,
    modal: ElementRef,
    series_id: &str,
    site: &str,
) -> Result<RawCardFace, ExtractError> {
    let missing = |element: &'static str| ExtractError::MissingElement { index, element };

    // Front face
    let img = find_in(modal, &s.front_img, index, ".frontCol img")?;
    let data_src = img
        .value()
        .attr("data-src")
        .ok_or_else(|| missing(".frontCol img[data-src]"))?;
    let img_src = image_url(data_src, site);
    let card_name = img.value().attr("alt").unwrap_or_default().to_string();

    // Info line: id | species | type
    let info = find_in(modal, &s.info_col, index, ".infoCol")?;
    let spans: Vec<String> = info.select(&s.info_span).map(own_text).collect();
    let span = |i: usize| spans.get(i).cloned().unwrap_or_default();

    // Back face
    let back = find_in(modal, &s.back_col, index, ".backCol")?;
    let cost = number_or_zero(&own_text(find_in(back, &s.cost, index, ".cost")?));
    let attribute = back
        .select(&s.attribute_img)
        .next()
        .and_then(|i| i.value().attr("alt"))
        .unwrap_or(NO_ATTRIBUTE)
        .to_string();
    let power = number_or_zero(&own_text(find_in(back, &s.power, index, ".power")?));
    let counter = number_or_zero(&own_text(find_in(back, &s.counter, index, ".counter")?));
    let color = own_text(find_in(back, &s.color, index, ".color")?);
    let feature = own_text(find_in(back, &s.feature, index, ".feature")?);
    let effect = rules_text(find_in(back, &s.effect, index, ".text")?);
    let get_info = own_text(find_in(back, &s.get_info, index, ".getInfo")?);

    Ok(RawCardFace {
        card_id: span(0),
        card_name,
        card_species: span(1),
        card_type: span(2),
        img_src,
        cost,
        attribute,
        power,
        counter,
        color,
        feature,
        effect,
        get_info,
        series_id: series_id.to_string(),
    })
}

fn find_in<'a>(
    scope: ElementRef<'a>,
    selector: &Selector,
    index: usize,
    element: &'static str,
) -> Result<ElementRef<'a>, ExtractError> {
    scope
        .select(selector)
        .next()
        .ok_or(ExtractError::MissingElement { index, element })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = "https://en.onepiece-cardgame.com";

    fn parse(fixture: &str, series_id: &str) -> Vec<Result<RawCardFace, ExtractError>> {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", fixture)).unwrap();
        extract_cards(&html, series_id, SITE).unwrap()
    }

    #[test]
    fn op01_leader() {
        let rows = parse("cardlist_op01", "569101");
        assert_eq!(rows.len(), 4);
        let zoro = rows[0].as_ref().unwrap();
        assert_eq!(zoro.card_id, "OP01-001");
        assert_eq!(zoro.card_name, "Roronoa Zoro");
        assert_eq!(zoro.card_species, "L");
        assert_eq!(zoro.card_type, "LEADER");
        assert_eq!(
            zoro.img_src,
            "https://en.onepiece-cardgame.com/images/cardlist/card/OP01-001.png"
        );
        assert_eq!(zoro.cost, 5);
        assert_eq!(zoro.attribute, "Slash");
        assert_eq!(zoro.power, 5000);
        assert_eq!(zoro.counter, 0);
        assert_eq!(zoro.color, "Red");
        assert_eq!(zoro.feature, "Supernovas/Straw Hat Crew");
        assert_eq!(
            zoro.effect,
            "[DON!! x1] [Your Turn] All of your Characters gain +1000 power."
        );
        assert_eq!(zoro.get_info, "-ROMANCE DAWN- [OP01]");
        assert_eq!(zoro.series_id, "569101");
    }

    #[test]
    fn op01_alternate_art_keeps_card_id() {
        let rows = parse("cardlist_op01", "569101");
        let alt = rows[1].as_ref().unwrap();
        assert_eq!(alt.card_id, "OP01-001");
        assert!(alt.img_src.ends_with("/OP01-001_p1.png"));
    }

    #[test]
    fn op01_character_and_event() {
        let rows = parse("cardlist_op01", "569101");
        let nami = rows[2].as_ref().unwrap();
        assert_eq!(nami.counter, 1000);
        assert_eq!(nami.cost, 1);
        assert_eq!(
            nami.effect,
            "[On Play] Look at 5 cards from the top of your deck; reveal up to 1 {Straw Hat Crew} type card."
        );

        let event = rows[3].as_ref().unwrap();
        assert_eq!(event.card_type, "EVENT");
        assert_eq!(event.attribute, "-");
        assert_eq!(event.power, 0);
    }

    #[test]
    fn broken_card_is_reported_per_row() {
        let rows = parse("cardlist_broken", "569201");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].as_ref().unwrap().card_id, "ST01-001");
        match &rows[1] {
            Err(ExtractError::MissingElement { index, element }) => {
                assert_eq!(*index, 1);
                assert_eq!(*element, ".backCol");
            }
            other => panic!("expected missing .backCol, got {:?}", other),
        }
    }

    #[test]
    fn page_without_results_fails() {
        let err = extract_cards("<html><body><p>loading</p></body></html>", "1", SITE).unwrap_err();
        assert!(matches!(err, ExtractError::PageNotReady(RESULT_COL)));
    }
}
