use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

fn target_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(
        arg!(-u --"url" <URL>)
            .required(false)
            .help("Seed URL (repeatable)")
            .value_parser(clap::value_parser!(Url))
            .action(clap::ArgAction::Append)
            .conflicts_with("hosts-file"),
    )
    .arg(
        arg!(-H --"hosts-file" <PATH>)
            .required(false)
            .help("Path to a newline-delimited file of seed URLs")
            .value_parser(clap::value_parser!(std::path::PathBuf))
            .conflicts_with("url"),
    )
    .arg(
        arg!(-m --"mode" <MODE>)
            .required(false)
            .help("How pages are discovered")
            .value_parser(["single", "sitemap", "bfs", "journey"])
            .default_value("single"),
    )
    .arg(
        arg!(--"max-pages" <NUM>)
            .required(false)
            .help("Upper bound on discovered pages")
            .value_parser(clap::value_parser!(usize))
            .default_value("50"),
    )
    .arg(
        arg!(--"max-depth" <NUM>)
            .required(false)
            .help("Link depth for bfs mode (0 = seed only)")
            .value_parser(clap::value_parser!(usize))
            .default_value("3"),
    )
    .arg(
        arg!(--"ignore-robots")
            .required(false)
            .help("Crawl paths disallowed by robots.txt")
            .action(clap::ArgAction::SetTrue),
    )
    .arg(
        arg!(-c --"config" <PATH>)
            .required(false)
            .help("JSON config file (viewports, auth, journey, filters, custom rules, timeouts)")
            .value_parser(clap::value_parser!(std::path::PathBuf)),
    )
}

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("sitesift")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("sitesift")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Enable debug logging")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Creates the sitesift config directory, a default config and the run database")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location of the sitesift config directory")
                        .default_value("~/.config/sitesift/"),
                )
                .arg(
                    arg!(-f - -"force")
                        .help("Overwrite an existing config and database at the specified location.")
                        .required(false),
                ),
        )
        .subcommand(
            target_args(command!("discover"))
                .about("Discover the page set for a site and print it, without scanning"),
        )
        .subcommand(
            target_args(command!("scan"))
                .about(
                    "Discover pages, scan each at every viewport, and report the clustered \
                findings. Exits 1 when a critical issue is found.",
                )
                .arg(
                    arg!(--"viewports" <LIST>)
                        .required(false)
                        .help("Comma-separated viewport presets (desktop, tablet, mobile or config-defined)")
                        .default_value("desktop,mobile"),
                )
                .arg(
                    arg!(-t --"concurrency" <NUM>)
                        .required(false)
                        .help("Number of pages scanned at the same time")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(-r --"rules" <PATH>)
                        .required(false)
                        .help("JSON file with an array of custom selector rules")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-o --"output" <DIR>)
                        .required(false)
                        .help("Directory for the report file and screenshots (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                )
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Record the run in this sitesift database (see `sitesift init`)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"top" <NUM>)
                        .required(false)
                        .help("Number of issues in the summary list")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"no-progress")
                        .required(false)
                        .help("Disable progress bars")
                        .action(clap::ArgAction::SetTrue),
                ),
        )
}
