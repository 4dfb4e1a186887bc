use clap::ArgMatches;
use colored::Colorize;
use sitesift::commands::command_argument_builder;
use sitesift::handlers::{handle_discover, handle_init, handle_scan};
use sitesift_core::print_banner;
use tracing::Level;

/// Exit code for configuration and other fatal errors.
const EXIT_FATAL: i32 = 2;

fn init_logging(matches: &ArgMatches) {
    let level = if matches.get_flag("verbose") {
        Level::DEBUG
    } else if matches.get_flag("quiet") {
        Level::WARN
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    init_logging(&chosen_command);

    // Show banner unless --quiet flag is set
    if !quiet {
        print_banner();
    }

    let result = match chosen_command.subcommand() {
        None => return,
        Some(("init", primary_command)) => handle_init(primary_command).map(|_| 0),
        Some(("discover", primary_command)) => handle_discover(primary_command).await.map(|_| 0),
        Some(("scan", primary_command)) => handle_scan(primary_command).await,
        _ => unreachable!("clap should ensure we don't get here"),
    };

    match result {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            std::process::exit(EXIT_FATAL);
        }
    }
}
