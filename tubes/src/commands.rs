use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("tubes")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("tubes")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Only print errors and the JSON result")
                .required(false)
                .global(true)
                .conflicts_with("verbose"),
        )
        .arg(
            arg!(-v --"verbose" "Log every request and redirect")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(--"username" <USERNAME>)
                .required(false)
                .global(true)
                .env("TUBES_USERNAME")
                .help("Account name for the tubes proxy"),
        )
        .arg(
            arg!(--"api-key" <API_KEY>)
                .required(false)
                .global(true)
                .env("TUBES_API_KEY")
                .hide_env_values(true)
                .help("API key for the tubes proxy"),
        )
        .arg(
            arg!(--"proxy" <URL>)
                .required(false)
                .global(true)
                .help("Use this proxy (http://[user:pass@]host[:port]) instead of the tubes proxy")
                .conflicts_with("direct"),
        )
        .arg(
            arg!(--"direct")
                .required(false)
                .global(true)
                .help("Connect to sites directly, without any proxy")
                .action(clap::ArgAction::SetTrue),
        )
        .subcommand_required(true)
        .subcommand(
            command!("crawl")
                .about(
                    "Crawl a site described by a site definition: categories, listings, then \
                product details. Prints the products as JSON.",
                )
                .arg(
                    arg!(<SITE>)
                        .help("Path to the site definition (TOML)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(-c --"concurrency" <NUM>)
                        .required(false)
                        .help("Fetches in flight at once (overrides the site definition)")
                        .value_parser(clap::value_parser!(usize)),
                ),
        )
        .subcommand(
            command!("fetch")
                .about("Issue a single request and print the final response as JSON")
                .arg(
                    arg!(<URL>)
                        .help("The URL to fetch")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-X --"method" <METHOD>)
                        .required(false)
                        .help("HTTP method (default: GET, or POST when data is given)"),
                )
                .arg(
                    arg!(-d --"data" <DATA>)
                        .required(false)
                        .help("Request body, form-encoded (a=1&b=2) unless --json is set"),
                )
                .arg(
                    arg!(--"json")
                        .required(false)
                        .help("Send --data as JSON")
                        .action(clap::ArgAction::SetTrue)
                        .requires("data"),
                )
                .arg(
                    arg!(-H --"header" <HEADER>)
                        .required(false)
                        .help("Extra header as 'Name: value' (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"max-redirects" <NUM>)
                        .required(false)
                        .help("Redirects to follow before giving up")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64).range(1..))
                        .default_value("10"),
                ),
        )
        .subcommand(
            command!("validate")
                .about("Load and compile a site definition without crawling")
                .arg(
                    arg!(<SITE>)
                        .help("Path to the site definition (TOML)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
}
