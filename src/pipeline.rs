use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::db::{Database, NormalizeSummary};
use crate::download::{self, DownloadStats, ImageFetcher};
use crate::fetch::PageSource;
use crate::parser::{extract_cards, extract_series, RESULT_COL, SERIES_SELECT};
use crate::settings::FailurePolicy;

/// Run stages, in order. A run ends at `Done` or at the first error that escapes a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ListSeries,
    ScrapeSeries,
    Normalize,
    Download,
    Done,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub series: usize,
    pub series_failed: usize,
    pub cards: usize,
    pub rows_failed: usize,
    pub normalized: NormalizeSummary,
    pub downloads: DownloadStats,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeriesOutcome {
    pub saved: usize,
    pub rows_failed: usize,
}

pub struct Pipeline<'a, P, F> {
    db: &'a Database,
    pages: P,
    images: F,
    site: String,
    image_dir: PathBuf,
    policy: FailurePolicy,
}

impl<'a, P: PageSource, F: ImageFetcher> Pipeline<'a, P, F> {
    pub fn new(
        db: &'a Database,
        pages: P,
        images: F,
        site: impl Into<String>,
        image_dir: impl Into<PathBuf>,
        policy: FailurePolicy,
    ) -> Self {
        Pipeline {
            db,
            pages,
            images,
            site: site.into(),
            image_dir: image_dir.into(),
            policy,
        }
    }

    /// list series → scrape each → normalize → download.
    pub fn run(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        enter(Stage::ListSeries);
        let listed = self.list_series()?;
        println!("Found {} series", listed);

        enter(Stage::ScrapeSeries);
        self.db.clear_cards();
        let series = self.db.load_series();
        summary.series = series.len();
        let pb = ProgressBar::new(series.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );
        for (name, id) in &series {
            pb.set_message(name.clone());
            match self.scrape_series(id) {
                Ok(outcome) => {
                    summary.cards += outcome.saved;
                    summary.rows_failed += outcome.rows_failed;
                    pb.println(format!("{} : {} cards saved", name, outcome.saved));
                }
                Err(e) => {
                    error!("handle_series_card_list : {} ({}) : {:#}", name, id, e);
                    summary.series_failed += 1;
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        enter(Stage::Normalize);
        summary.normalized = self.db.normalize();
        println!(
            "Normalized {} faces into {} cards and {} images",
            summary.normalized.raw_faces, summary.normalized.cards, summary.normalized.images
        );

        enter(Stage::Download);
        summary.downloads = self.download()?;

        enter(Stage::Done);
        Ok(summary)
    }

    /// Read the series dropdown and persist it. Returns the number of series found.
    pub fn list_series(&self) -> Result<usize> {
        let url = format!("{}/cardlist/", self.site);
        let html = self
            .pages
            .rendered(&url, SERIES_SELECT)
            .context("get_card_list")?;
        let series = extract_series(&html).context("get_card_list")?;
        let inserted = self.db.save_series(&series);
        info!("Series: {} found, {} new", series.len(), inserted);
        Ok(series.len())
    }

    /// Scrape one series page and append its card faces to the raw table.
    pub fn scrape_series(&self, series_id: &str) -> Result<SeriesOutcome> {
        let url = format!("{}/cardlist/?series={}", self.site, series_id);
        let html = self.pages.rendered(&url, RESULT_COL)?;

        let mut cards = Vec::new();
        let mut rows_failed = 0;
        for row in extract_cards(&html, series_id, &self.site)? {
            match row {
                Ok(card) => cards.push(card),
                Err(e) => {
                    error!("extract_card_info : series {} : {}", series_id, e);
                    rows_failed += 1;
                }
            }
        }

        if rows_failed > 0 && self.policy == FailurePolicy::DiscardSeries {
            bail!(
                "discarded {} parsed cards after {} failed",
                cards.len(),
                rows_failed
            );
        }

        let saved = self.db.save_raw_cards(&cards);
        if saved < cards.len() {
            bail!("saved {} of {} parsed cards", saved, cards.len());
        }
        Ok(SeriesOutcome { saved, rows_failed })
    }

    /// Download every image the normalized tables point at.
    pub fn download(&self) -> Result<DownloadStats> {
        let tasks = self.db.fetch_download_tasks();
        println!("Downloading {} images...", tasks.len());
        download::download_all(&self.images, self.db, &self.image_dir, &tasks)
    }
}

fn enter(stage: Stage) {
    info!("stage: {:?}", stage);
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::tests::StubFetcher;
    use std::collections::HashMap;
    use std::fs;

    const SITE: &str = "https://en.onepiece-cardgame.com";

    /// Serves canned HTML by URL; unknown URLs behave like a page that never loads.
    struct StubPages(HashMap<String, String>);

    impl StubPages {
        fn new(pages: &[(&str, String)]) -> Self {
            StubPages(
                pages
                    .iter()
                    .map(|(path, html)| (format!("{}{}", SITE, path), html.clone()))
                    .collect(),
            )
        }
    }

    impl PageSource for StubPages {
        fn rendered(&self, url: &str, ready: &str) -> Result<String> {
            match self.0.get(url) {
                Some(html) => Ok(html.clone()),
                None => bail!("`{}` never appeared on {}", ready, url),
            }
        }
    }

    fn fixture(name: &str) -> String {
        fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn series_page(options: &str) -> String {
        format!(
            r#"<div class="formsetDefaultArea"><div class="seriesCol"><select>
               <option value="">ALL</option>{}</select></div></div>"#,
            options
        )
    }

    const ONE_CARD: &str = r#"
        <div class="resultCol"><dl class="modalCol">
          <dt><div class="infoCol"><span>OP01-001</span> | <span>L</span> | <span>LEADER</span></div></dt>
          <dd>
            <div class="frontCol"><img data-src="../images/cardlist/card/OP01-001.png?240628" alt="Roronoa Zoro"></div>
            <div class="backCol">
              <div class="cost"><h3>Life</h3>5</div>
              <div class="attribute"><h3>Attribute</h3><img alt="Slash"></div>
              <div class="power"><h3>Power</h3>5000</div>
              <div class="counter"><h3>Counter</h3>-</div>
              <div class="color"><h3>Color</h3>Red</div>
              <div class="feature"><h3>Type</h3>Supernovas</div>
              <div class="text"><h3>Effect</h3>[DON!! x1]<br>+1000</div>
              <div class="getInfo"><h3>Card Set(s)</h3>-ROMANCE DAWN- [OP01]</div>
            </div>
          </dd>
        </dl></div>"#;

    fn workspace(name: &str) -> (Database, PathBuf) {
        let root = std::env::temp_dir().join(format!("optcg-run-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&root);
        (Database::in_dir(&root.join("DB")), root.join("Image"))
    }

    #[test]
    fn one_series_end_to_end() {
        let (db, image_dir) = workspace("e2e");
        let pages = StubPages::new(&[
            ("/cardlist/", series_page(r#"<option value="569001">【ROMANCE DAWN】</option>"#)),
            ("/cardlist/?series=569001", ONE_CARD.to_string()),
        ]);
        let pipeline = Pipeline::new(&db, pages, StubFetcher, SITE, &image_dir, FailurePolicy::default());

        let summary = pipeline.run().unwrap();
        assert_eq!(summary.series, 1);
        assert_eq!(summary.cards, 1);
        assert_eq!(summary.downloads, DownloadStats { saved: 1, failed: 0 });

        let tasks = db.fetch_download_tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].series_name, "ROMANCE DAWN");
        assert_eq!(tasks[0].cid, 1);
        assert_eq!(
            tasks[0].img_src,
            "https://en.onepiece-cardgame.com/images/cardlist/card/OP01-001.png"
        );
        assert!(image_dir.join("ROMANCE DAWN/OP01-001.png").exists());

        let cards = db.canonical_cards();
        assert_eq!(cards[0].effect, "[DON!! x1] +1000");
        assert_eq!(cards[0].counter, 0);
    }

    #[test]
    fn broken_series_does_not_stop_the_run() {
        let (db, image_dir) = workspace("skip");
        let pages = StubPages::new(&[
            (
                "/cardlist/",
                series_page(
                    r#"<option value="1">【GONE】</option><option value="569101">【ROMANCE DAWN】</option>"#,
                ),
            ),
            ("/cardlist/?series=569101", fixture("cardlist_op01")),
        ]);
        let pipeline = Pipeline::new(&db, pages, StubFetcher, SITE, &image_dir, FailurePolicy::default());

        let summary = pipeline.run().unwrap();
        assert_eq!(summary.series, 2);
        assert_eq!(summary.series_failed, 1);
        assert_eq!(summary.cards, 4);
        assert_eq!(summary.normalized.cards, 3);
        assert_eq!(summary.downloads.saved, 4);
        assert_eq!(db.stats().alternate_arts, 1);
    }

    #[test]
    fn second_run_on_same_database_rebuilds_catalog() {
        let (db, image_dir) = workspace("rerun");
        let first = StubPages::new(&[
            ("/cardlist/", series_page(r#"<option value="569001">【ROMANCE DAWN】</option>"#)),
            ("/cardlist/?series=569001", ONE_CARD.to_string()),
        ]);
        Pipeline::new(&db, first, StubFetcher, SITE, &image_dir, FailurePolicy::default())
            .run()
            .unwrap();

        let second = StubPages::new(&[
            (
                "/cardlist/",
                series_page(
                    r#"<option value="569001">【ROMANCE DAWN】</option><option value="569002">【PARAMOUNT WAR】</option>"#,
                ),
            ),
            ("/cardlist/?series=569001", ONE_CARD.to_string()),
            ("/cardlist/?series=569002", ONE_CARD.replace("OP01-001", "OP02-001")),
        ]);
        let summary = Pipeline::new(&db, second, StubFetcher, SITE, &image_dir, FailurePolicy::default())
            .run()
            .unwrap();

        assert_eq!(summary.series_failed, 0);
        assert_eq!(summary.cards, 2);
        assert_eq!(summary.normalized.cards, 2);
        let stats = db.stats();
        assert_eq!(stats.series, 2);
        assert_eq!(stats.cards, 2);
        assert_eq!(stats.images, 2);
        assert_eq!(stats.files, 2);
    }

    #[test]
    fn unsaved_cards_fail_the_series() {
        let (db, image_dir) = workspace("unsaved");
        db.save_raw_cards(&[crate::db::tests::face("OP01-001", "https://x/OP01-001.png", "1")]);
        db.normalize();

        let pages = StubPages::new(&[("/cardlist/?series=569001", ONE_CARD.to_string())]);
        let pipeline = Pipeline::new(&db, pages, StubFetcher, SITE, &image_dir, FailurePolicy::default());
        assert!(pipeline.scrape_series("569001").is_err());
    }

    #[test]
    fn unreachable_series_list_ends_the_run() {
        let (db, image_dir) = workspace("no-list");
        let pipeline = Pipeline::new(
            &db,
            StubPages::new(&[]),
            StubFetcher,
            SITE,
            &image_dir,
            FailurePolicy::default(),
        );
        assert!(pipeline.run().is_err());
        assert!(db.load_series().is_empty());
    }

    #[test]
    fn keep_valid_rows_saves_partial_series() {
        let (db, image_dir) = workspace("keep");
        let pages = StubPages::new(&[("/cardlist/?series=569201", fixture("cardlist_broken"))]);
        let pipeline = Pipeline::new(&db, pages, StubFetcher, SITE, &image_dir, FailurePolicy::KeepValidRows);

        let outcome = pipeline.scrape_series("569201").unwrap();
        assert_eq!(outcome, SeriesOutcome { saved: 1, rows_failed: 1 });
    }

    #[test]
    fn discard_series_saves_nothing() {
        let (db, image_dir) = workspace("discard");
        let pages = StubPages::new(&[("/cardlist/?series=569201", fixture("cardlist_broken"))]);
        let pipeline = Pipeline::new(&db, pages, StubFetcher, SITE, &image_dir, FailurePolicy::DiscardSeries);

        assert!(pipeline.scrape_series("569201").is_err());
        assert_eq!(db.normalize().raw_faces, 0);
    }
}
