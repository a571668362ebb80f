mod db;
mod download;
mod error;
mod fetch;
mod log;
mod normalize;
mod parser;
mod pipeline;
mod settings;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use db::Database;
use download::HttpImageFetcher;
use fetch::HttpPageSource;
use pipeline::Pipeline;
use settings::{Region, Settings};

#[derive(Parser)]
#[command(name = "optcg_scraper", about = "ONE PIECE card list scraper and image downloader")]
struct Cli {
    /// Working directory for DB/, Image/ and log/ (overrides OPTCG_ROOT)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Catalog site to scrape (overrides OPTCG_REGION)
    #[arg(short, long, value_enum, global = true)]
    region: Option<Region>,
    /// Settings file (default: ./optcg.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List series, scrape every card, normalize and download images
    Run,
    /// List the series on the site and store them
    Series,
    /// Collapse scraped card faces into cards + image variants
    Normalize,
    /// Download images for an already normalized database
    Download,
    /// Show table counts
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show region codes and their catalog URLs
    Regions,
}

fn main() {
    let cli = Cli::parse();

    let mut settings = match Settings::load(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(2);
        }
    };
    if let Some(root) = cli.root {
        settings.root = root;
    }
    if let Some(region) = cli.region {
        settings.region = Some(region);
    }

    log::init(&settings.log_dir());
    info!(settings = ?settings, "Starting");

    let t0 = Instant::now();
    let result = dispatch(cli.command.unwrap_or(Commands::Run), &settings);

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    if let Err(e) = result {
        error!("__main__ : {:#}", e);
        eprintln!("__main__ : {:#}", e);
        std::process::exit(1);
    }
}

fn dispatch(command: Commands, settings: &Settings) -> Result<()> {
    let db = Database::in_dir(&settings.db_dir());

    match command {
        Commands::Run => {
            let site = settings.site_url()?;
            if settings.fresh {
                db.reset()?;
                download::reset_image_dir(&settings.image_dir())?;
            }
            let pipeline = build_pipeline(&db, settings, site)?;
            let s = pipeline.run()?;
            println!(
                "Series: {} ({} failed) | cards saved: {} ({} rows failed)",
                s.series, s.series_failed, s.cards, s.rows_failed
            );
            println!(
                "Images: {} saved, {} failed",
                s.downloads.saved, s.downloads.failed
            );
            Ok(())
        }
        Commands::Series => {
            let site = settings.site_url()?;
            let pipeline = build_pipeline(&db, settings, site)?;
            pipeline.list_series()?;
            let series = db.load_series();
            for (name, id) in &series {
                println!("{:>8} | {}", id, name);
            }
            println!("\n{} series stored in {:?}", series.len(), db.path());
            Ok(())
        }
        Commands::Normalize => {
            let n = db.normalize();
            println!(
                "Normalized {} faces into {} cards and {} images",
                n.raw_faces, n.cards, n.images
            );
            Ok(())
        }
        Commands::Download => {
            let site = settings.site_url().unwrap_or_default();
            let pipeline = build_pipeline(&db, settings, site)?;
            let d = pipeline.download()?;
            println!("Images: {} saved, {} failed", d.saved, d.failed);
            Ok(())
        }
        Commands::Stats { json } => {
            let s = db.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&s)?);
            } else {
                println!("Series:          {}", s.series);
                println!("Cards:           {}", s.cards);
                println!("Images:          {}", s.images);
                println!("Alternate arts:  {}", s.alternate_arts);
                println!("Files:           {}", s.files);
            }
            Ok(())
        }
        Commands::Regions => {
            for region in Region::ALL {
                println!("{:<8} {}", region.code(), region.base_url());
            }
            Ok(())
        }
    }
}

fn build_pipeline<'a>(
    db: &'a Database,
    settings: &Settings,
    site: String,
) -> Result<Pipeline<'a, HttpPageSource, HttpImageFetcher>> {
    let client = fetch::http_client(settings.timeout())?;
    Ok(Pipeline::new(
        db,
        HttpPageSource::new(client.clone(), settings.settle_delay()),
        HttpImageFetcher::new(client),
        site,
        settings.image_dir(),
        settings.failure_policy,
    ))
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
