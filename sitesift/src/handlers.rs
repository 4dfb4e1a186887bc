use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use sitesift_core::analyzer::{Analyzer, CustomRuleAnalyzer, MarkupAnalyzer};
use sitesift_core::cluster::{cluster_findings, sort_clusters, top_findings};
use sitesift_core::config::{
    CrawlMode, FileConfig, ScanConfig, load_file_config, load_rules, resolve_viewports,
};
use sitesift_core::crawl::{DiscoveryOptions, discover_urls, generate_discovery_report};
use sitesift_core::data::{Database, Severity};
use sitesift_core::http_browser::HttpBrowser;
use sitesift_core::jobs::{ScanJob, build_job_matrix};
use sitesift_core::report::{
    ReportFormat, RunSummary, ScanReport, exit_code, render, save_report,
};
use sitesift_core::scheduler::{Scheduler, SchedulerOptions};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

// Re-export discovery helpers from sitesift-core
pub use sitesift_core::crawl::extract_url_path;

/// Load URLs from either a file or the `--url` arguments
pub fn load_urls_from_source(urls: &[Url], hosts_file: Option<&PathBuf>) -> Result<Vec<String>, String> {
    if let Some(hosts_file_path) = hosts_file {
        load_urls_from_file(hosts_file_path)
    } else if !urls.is_empty() {
        Ok(urls.iter().map(|u| u.as_str().to_string()).collect())
    } else {
        Err("Either --url or --hosts-file must be provided".to_string())
    }
}

/// Load and parse URLs from a file. Blank lines and `#` comments are skipped.
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read hosts file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add https:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    match Url::parse(line) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => return Some(line.to_string()),
        // Any other explicit scheme (ftp://, file://) is not scannable
        Ok(_) if line.contains("://") => {
            warn!("Skipping non-http URL '{}'", line);
            return None;
        }
        _ => {}
    }

    // Bare hosts, including host:port which parses as a scheme
    let with_scheme = format!("https://{}", line);
    if let Ok(url) = Url::parse(&with_scheme)
        && url.username().is_empty()
        && url.password().is_none()
        && url.host_str().is_some_and(|h| !h.contains(' '))
    {
        return Some(with_scheme);
    }

    warn!("Skipping invalid URL '{}'", line);
    None
}

/// Split a comma-separated viewport list.
pub fn parse_viewport_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

fn print_prompt(msg: &str) -> io::Result<String> {
    print!("{} ", msg.bright_cyan().bold());
    io::stdout().flush()?;
    let mut response = String::new();
    io::stdin().read_line(&mut response)?;
    Ok(response.trim().to_lowercase())
}

/// Merge CLI flags over the optional config file.
pub fn build_scan_config(args: &ArgMatches) -> Result<ScanConfig> {
    let urls: Vec<Url> = args
        .get_many::<Url>("url")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let hosts_file = args.get_one::<PathBuf>("hosts-file");
    let seeds = load_urls_from_source(&urls, hosts_file).map_err(|e| anyhow!(e))?;

    let file = match args.get_one::<PathBuf>("config") {
        Some(path) => {
            let expanded = shellexpand::tilde(&path.to_string_lossy()).to_string();
            load_file_config(Path::new(&expanded))?
        }
        None => FileConfig::default(),
    };

    let mode: CrawlMode = args
        .get_one::<String>("mode")
        .map(String::as_str)
        .unwrap_or("single")
        .parse()?;

    let viewport_names = args
        .try_get_one::<String>("viewports")
        .ok()
        .flatten()
        .map(|raw| parse_viewport_list(raw))
        .unwrap_or_else(|| vec!["desktop".to_string()]);
    let viewports = resolve_viewports(&viewport_names, &file.viewports)?;

    let mut config = ScanConfig::new(seeds);
    config.mode = mode;
    config.viewports = viewports;
    config.respect_robots = !args.get_flag("ignore-robots");
    if let Some(max_pages) = args.get_one::<usize>("max-pages") {
        config.max_pages = *max_pages;
    }
    if let Some(max_depth) = args.get_one::<usize>("max-depth") {
        config.max_depth = *max_depth;
    }
    if let Ok(Some(concurrency)) = args.try_get_one::<usize>("concurrency") {
        config.concurrency = *concurrency;
    }
    config.file = file;

    config.validate()?;
    Ok(config)
}

fn discovery_options(config: &ScanConfig, show_progress_bars: bool) -> DiscoveryOptions {
    DiscoveryOptions {
        seeds: config.seeds.clone(),
        mode: config.mode,
        max_pages: config.max_pages,
        max_depth: config.max_depth,
        allow_domains: config.file.allow_domains.clone(),
        deny_patterns: config.file.deny_patterns.clone(),
        respect_robots: config.respect_robots,
        show_progress_bars,
    }
}

fn progress_printer(quiet: bool) -> Option<sitesift_core::crawl::DiscoveryProgressCallback> {
    if quiet {
        None
    } else {
        Some(Arc::new(|msg: String| println!("{}", msg)))
    }
}

pub async fn handle_discover(args: &ArgMatches) -> Result<()> {
    let quiet = args.get_flag("quiet");
    let config = build_scan_config(args)?;

    if !quiet {
        println!("\n{} Discovering pages on {} seed(s)", "→".blue(), config.seeds.len());
        println!("Mode: {}", config.mode);
        println!("Max pages: {}", config.max_pages);
        if config.mode == CrawlMode::Bfs {
            println!("Max depth: {}", config.max_depth);
        }
        println!();
    }

    let urls = discover_urls(&discovery_options(&config, !quiet), progress_printer(quiet))
        .await
        .context("Discovery failed")?;

    print!("{}", generate_discovery_report(&urls));
    Ok(())
}

/// Runs a full scan and returns the process exit code.
pub async fn handle_scan(args: &ArgMatches) -> Result<i32> {
    let quiet = args.get_flag("quiet");
    let show_progress = !quiet && !args.get_flag("no-progress");
    let config = build_scan_config(args)?;

    let format = args
        .get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text);
    let top_n = args.get_one::<usize>("top").copied().unwrap_or(10);
    let output_dir = args
        .get_one::<PathBuf>("output")
        .map(|p| PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).to_string()));
    if let Some(ref dir) = output_dir {
        ensure_output_dir(dir)?;
    }

    // Every custom rule must compile before anything is fetched.
    let mut rules = config.file.custom_rules.clone();
    if let Some(path) = args.get_one::<PathBuf>("rules") {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).to_string();
        rules.extend(load_rules(Path::new(&expanded))?);
    }
    let custom = CustomRuleAnalyzer::new(rules)?;

    let mut db = match args.get_one::<PathBuf>("db") {
        Some(path) => {
            let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).to_string());
            Some(
                Database::new(&expanded)
                    .with_context(|| format!("Failed to open database {}", expanded.display()))?,
            )
        }
        None => None,
    };
    let run_id = match db {
        Some(ref db) => Some(db.create_run(config.mode.as_str(), &config.seeds)?),
        None => None,
    };

    if !quiet {
        let names: Vec<&str> = config.viewports.iter().map(|v| v.name.as_str()).collect();
        println!("\n{} Scanning {} seed(s)", "→".blue(), config.seeds.len());
        println!("Mode: {}", config.mode);
        println!("Viewports: {}", names.join(", "));
        println!("Concurrency: {}\n", config.concurrency);
    }

    let urls = match discover_urls(&discovery_options(&config, show_progress), progress_printer(quiet)).await {
        Ok(urls) => urls,
        Err(e) => {
            if let (Some(db), Some(run_id)) = (&db, &run_id) {
                db.fail_run(run_id)?;
            }
            return Err(anyhow!(e).context("Discovery failed"));
        }
    };
    let jobs = build_job_matrix(&urls, &config.viewports);
    info!("{} pages x {} viewports = {} jobs", urls.len(), config.viewports.len(), jobs.len());

    let mut analyzers: Vec<Arc<dyn Analyzer>> = vec![Arc::new(MarkupAnalyzer::new())];
    if !custom.is_empty() {
        analyzers.push(Arc::new(custom));
    }

    let options = SchedulerOptions {
        concurrency: config.concurrency,
        timeouts: config.file.timeouts,
        locale: config.locale().to_string(),
        auth: config.file.auth.clone(),
        journey: if config.mode == CrawlMode::Journey {
            config.file.journey.clone()
        } else {
            Vec::new()
        },
        artifacts_dir: output_dir.clone(),
        ..SchedulerOptions::default()
    };

    let mut scheduler = analyzers
        .into_iter()
        .fold(Scheduler::new(Arc::new(HttpBrowser::new())), |s, a| s.with_analyzer(a))
        .with_options(options);

    let progress_bar = if show_progress {
        let pb = ProgressBar::new(jobs.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos}/{len} {msg}") {
            pb.set_style(style);
        }
        let pb_clone = pb.clone();
        scheduler = scheduler.with_progress_callback(Arc::new(move |done: usize, _total: usize, job: &ScanJob| {
            pb_clone.set_position(done as u64);
            pb_clone.set_message(format!("{} @ {}", extract_url_path(&job.url), job.viewport.name));
        }));
        Some(pb)
    } else {
        None
    };

    let outcome = scheduler.run(&jobs).await;
    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }

    let mut clusters = cluster_findings(&outcome.findings);
    sort_clusters(&mut clusters);
    let top = top_findings(&clusters, top_n);
    let summary = RunSummary::from_outcome(urls.len(), &outcome, &clusters);

    if let (Some(db), Some(run_id)) = (db.as_mut(), &run_id) {
        db.record_run(run_id, &clusters, &summary)
            .context("Failed to record the run")?;
    }

    let report = ScanReport {
        run_id: run_id.clone(),
        mode: config.mode.as_str().to_string(),
        seeds: config.seeds.clone(),
        summary,
        clusters,
        top,
    };
    let rendered = render(&report, format).context("Failed to render report")?;

    match output_dir {
        Some(dir) => {
            let path = dir.join(format!("sitesift-report.{}", format.extension()));
            save_report(&rendered, &path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            if !quiet {
                println!("{} Report saved to {}", "✓".green().bold(), path.display());
            }
        }
        None => print!("{}", rendered),
    }

    let code = exit_code(&report.clusters);
    if !quiet {
        print_scan_summary(&report);
    }
    Ok(code)
}

fn print_scan_summary(report: &ScanReport) {
    let summary = &report.summary;
    let critical = report
        .clusters
        .iter()
        .filter(|c| c.finding.severity == Severity::Critical)
        .count();

    println!();
    println!(
        "{} {} of {} pages scanned, {} errored",
        "✓".green().bold(),
        summary.pages_scanned,
        summary.pages_requested,
        summary.pages_errored
    );
    if critical > 0 {
        println!(
            "{} {} critical issue cluster(s) across {} findings",
            "✗".red().bold(),
            critical,
            summary.total_findings
        );
    } else {
        println!(
            "{} {} issue cluster(s), none critical",
            "✓".green().bold(),
            summary.total_clusters
        );
    }
}

const DEFAULT_CONFIG_NAME: &str = "config.json";
const DATABASE_NAME: &str = "sitesift.db";

pub fn handle_init(args: &ArgMatches) -> Result<()> {
    print_divider();
    println!("{}", "  SITESIFT INITIALIZATION".bright_white().bold());
    print_divider();
    println!();

    let config_dir_arg = args
        .get_one::<String>("PATH")
        .ok_or_else(|| anyhow!("missing config directory"))?;
    let force = args.get_flag("force");
    let expanded = shellexpand::tilde(config_dir_arg);
    let config_dir = Path::new(expanded.as_ref());
    let config_path = config_dir.join(DEFAULT_CONFIG_NAME);
    let db_path = config_dir.join(DATABASE_NAME);

    println!(
        "{} Target: {}",
        "→".blue(),
        config_dir.display().to_string().bright_white()
    );
    println!();

    let existing = config_path.exists() || Database::exists(&db_path);
    if existing && !force {
        println!("{}", "⚠ WARNING".yellow().bold());
        println!("Configuration already exists:");
        for path in [&config_path, &db_path] {
            if path.exists() {
                println!("  {} {}", "•".yellow(), path.display().to_string().bright_white());
            }
        }
        println!();
        println!("{}", "This operation will overwrite existing files.".yellow());

        let response = print_prompt("Do you want to continue? [y/N]:")?;
        println!();
        if response != "y" && response != "yes" {
            println!("{} Initialization cancelled.", "✗".red().bold());
            return Ok(());
        }
    }

    create_configuration_assets(config_dir, &config_path)?;

    if Database::exists(&db_path) {
        Database::drop(&db_path)
            .with_context(|| format!("Failed to remove {}", db_path.display()))?;
        println!("{} Existing database removed", "✓".green().bold());
    }
    println!("{} Creating database...", "→".blue());
    Database::new(&db_path).with_context(|| format!("Failed to create database {}", db_path.display()))?;

    println!();
    print_divider();
    println!("{}", "  INITIALIZATION COMPLETE".green().bold());
    print_divider();
    println!();
    println!(
        "{} Config: {}",
        "✓".green().bold(),
        config_path.display().to_string().bright_white()
    );
    println!(
        "{} Database: {}",
        "✓".green().bold(),
        db_path.display().to_string().bright_white()
    );
    println!();
    Ok(())
}

/// Writes the config directory and a default config file.
pub fn create_configuration_assets(config_dir: &Path, config_path: &Path) -> Result<()> {
    println!("{} Creating directory structure...", "→".blue());
    fs::create_dir_all(config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    let default_config = serde_json::to_string_pretty(&FileConfig::default())?;
    fs::write(config_path, default_config)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!(
        "  {} {}",
        "✓".green(),
        config_path.display().to_string().bright_white()
    );
    Ok(())
}

/// Fails unless `dir` can hold reports.
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() && !dir.is_dir() {
        bail!("{} exists and is not a directory", dir.display());
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))
}
