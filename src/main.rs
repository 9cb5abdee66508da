use anyhow::Context;
use std::path::PathBuf;
use tracing::{info, warn};

use gradebook_scout::scraping::browser_manager::{self, LaunchOptions};
use gradebook_scout::tools::normalize::Normalizer;
use gradebook_scout::{load_scout_config, EnrollmentScraper, Navigator, SubmissionScraper};

#[derive(Debug, Default)]
struct CliArgs {
    config: Option<PathBuf>,
    enrollment: bool,
}

fn parse_args() -> CliArgs {
    let mut out = CliArgs::default();
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        if a == "--config" {
            out.config = args.next().map(PathBuf::from);
        } else if let Some(rest) = a.strip_prefix("--config=") {
            out.config = Some(PathBuf::from(rest));
        } else if a == "--enrollment" {
            out.enrollment = true;
        } else {
            warn!("ignoring unknown argument {}", a);
        }
    }
    out
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries only the JSON report.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    let config = load_scout_config(args.config.as_deref());

    let credentials = config.resolve_credentials()?;
    let students = config.resolve_students()?;
    let normalizer = Normalizer::new(config.resolve_timezone()?, config.strict_dates);
    let linger = config.resolve_linger();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        students = students.len(),
        "starting gradebook-scout"
    );

    let (browser, session) = browser_manager::launch(&LaunchOptions::from_config(&config))
        .await
        .context("browser launch failed")?;

    let navigator = Navigator::new(
        session,
        config.portal.clone(),
        config.timeouts.resolve(),
        config.retry.resolve(),
    );

    let report = if args.enrollment {
        let mut scraper = EnrollmentScraper::new(navigator);
        let enrollments = scraper.run(&credentials, &students).await?;
        serde_json::to_string_pretty(&enrollments)?
    } else {
        let mut scraper = SubmissionScraper::new(navigator, normalizer);
        let records = scraper.run(&credentials, &students).await?;
        serde_json::to_string_pretty(&records)?
    };
    println!("{}", report);

    if !linger.is_zero() {
        info!("⏳ Keeping the browser open for {:?}", linger);
        tokio::time::sleep(linger).await;
    }
    browser.shutdown().await;
    Ok(())
}
