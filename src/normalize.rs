use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;

use crate::db::{CanonicalCard, ImageVariant, RawCardFace};

// The two "variant image" tests differ on purpose. Do not merge them.
//
// PARALLEL_RE is SQLite's `img_src LIKE '%_p%XX.png'` (case-insensitive, `_` is
// any single character) and only steers which face becomes canonical.
// ALT_ART_RE is the `_p<digits>.png` suffix and drives `is_diff`.
static PARALLEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)^.*.p.*xx\.png$").unwrap());
static ALT_ART_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_p\d+\.png$").unwrap());

pub struct Normalized {
    pub cards: Vec<CanonicalCard>,
    pub images: Vec<ImageVariant>,
}

/// Does the image name match the parallel-art filter used for canonical selection?
pub fn is_parallel_name(img_src: &str) -> bool {
    PARALLEL_RE.is_match(img_src)
}

/// Is this image an alternate art (`..._p1.png`, `..._p12.png`)?
pub fn is_alternate_art(img_src: &str) -> bool {
    ALT_ART_RE.is_match(img_src)
}

/// Collapse raw faces into one card per `card_id` plus one image row per face.
///
/// `cid` is the 1-based position of the `card_id` in byte-wise sorted order, so
/// the output depends only on the input set and its order.
pub fn normalize(raw: &[RawCardFace]) -> Normalized {
    let mut groups: BTreeMap<&str, Vec<(usize, &RawCardFace)>> = BTreeMap::new();
    for (i, face) in raw.iter().enumerate() {
        groups.entry(face.card_id.as_str()).or_default().push((i, face));
    }

    let mut cids: HashMap<&str, i64> = HashMap::with_capacity(groups.len());
    let mut cards = Vec::with_capacity(groups.len());

    for (n, (card_id, faces)) in groups.iter().enumerate() {
        let cid = n as i64 + 1;
        cids.insert(*card_id, cid);

        // Non-parallel first, then base art over `_pN`, then first scraped.
        let Some((_, best)) = faces
            .iter()
            .min_by_key(|(i, f)| (is_parallel_name(&f.img_src), is_alternate_art(&f.img_src), *i))
        else {
            continue;
        };
        cards.push(canonical(cid, best));
    }

    let images = raw
        .iter()
        .filter_map(|f| {
            let cid = *cids.get(f.card_id.as_str())?;
            Some(ImageVariant {
                cid,
                img_src: f.img_src.clone(),
                get_info: f.get_info.clone(),
                series_id: f.series_id.clone(),
                is_diff: is_alternate_art(&f.img_src),
            })
        })
        .collect();

    Normalized { cards, images }
}

fn canonical(cid: i64, f: &RawCardFace) -> CanonicalCard {
    CanonicalCard {
        cid,
        card_id: f.card_id.clone(),
        card_name: f.card_name.clone(),
        card_species: f.card_species.clone(),
        card_type: f.card_type.clone(),
        cost: f.cost,
        attribute: f.attribute.clone(),
        power: f.power,
        counter: f.counter,
        color: f.color.clone(),
        feature: f.feature.clone(),
        effect: f.effect.clone(),
    }
}

// ── Tests ──
