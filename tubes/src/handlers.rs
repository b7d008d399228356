use crate::error::CliError;
use clap::ArgMatches;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tubes_core::{Crawler, SiteDefinition};
use tubes_http::{
    CookieStore, EngineConfig, Method, Payload, ProxyDescriptor, RequestConfig, RequestEngine,
};
use url::Url;

pub const PROVIDER_PROXY_HOST: &str = "proxy.tubes.io";

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub api_key: String,
}

/// Where requests go.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyChoice {
    /// The tubes proxy, authenticated with the account's credentials.
    Provider,
    Custom(ProxyDescriptor),
    Direct,
}

/// Everything a command needs from the command line besides its own arguments.
pub struct Context {
    pub quiet: bool,
    pub credentials: Option<Credentials>,
    pub proxy: ProxyChoice,
}

impl Context {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let username = matches.get_one::<String>("username").cloned();
        let api_key = matches.get_one::<String>("api-key").cloned();
        let credentials = match (username, api_key) {
            (Some(username), Some(api_key)) if !username.is_empty() && !api_key.is_empty() => {
                Some(Credentials { username, api_key })
            }
            _ => None,
        };

        let proxy = if matches.get_flag("direct") {
            ProxyChoice::Direct
        } else if let Some(url) = matches.get_one::<String>("proxy") {
            ProxyChoice::Custom(
                ProxyDescriptor::parse(url).map_err(|e| CliError::usage(e.to_string()))?,
            )
        } else {
            ProxyChoice::Provider
        };

        Ok(Self {
            quiet: matches.get_flag("quiet"),
            credentials,
            proxy,
        })
    }

    /// The process-wide default proxy every request will use.
    pub fn default_proxy(&self) -> Result<Option<ProxyDescriptor>> {
        match &self.proxy {
            ProxyChoice::Provider => {
                let credentials = require_credentials(self)?;
                Ok(Some(
                    ProxyDescriptor::new(PROVIDER_PROXY_HOST, tubes_http::proxy::DEFAULT_PROXY_PORT)
                        .with_auth(&credentials.username, &credentials.api_key),
                ))
            }
            ProxyChoice::Custom(proxy) => Ok(Some(proxy.clone())),
            ProxyChoice::Direct => Ok(None),
        }
    }

    pub fn engine(&self) -> Result<RequestEngine> {
        let config = EngineConfig {
            default_proxy: self.default_proxy()?,
            ..EngineConfig::default()
        };
        Ok(RequestEngine::from_config(config)?)
    }
}

/// Fails unless credentials are available for the tubes proxy.
pub fn require_credentials(context: &Context) -> Result<&Credentials> {
    context.credentials.as_ref().ok_or_else(|| {
        CliError::MissingCredential(
            "set --username and --api-key (or TUBES_USERNAME and TUBES_API_KEY), \
             or use --proxy / --direct"
                .to_string(),
        )
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchArgs {
    pub url: Url,
    pub method: Option<String>,
    pub data: Option<String>,
    pub json: bool,
    pub headers: Vec<(String, String)>,
    pub max_redirects: usize,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Crawl {
        site: PathBuf,
        concurrency: Option<usize>,
    },
    Fetch(FetchArgs),
    Validate {
        site: PathBuf,
    },
}

impl Command {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        match matches.subcommand() {
            Some(("crawl", args)) => Ok(Command::Crawl {
                site: site_path(args)?,
                concurrency: args.get_one::<usize>("concurrency").copied(),
            }),
            Some(("fetch", args)) => {
                let url = args
                    .get_one::<Url>("URL")
                    .cloned()
                    .ok_or_else(|| CliError::usage("missing URL"))?;
                let headers: Vec<(String, String)> = args
                    .get_many::<String>("header")
                    .into_iter()
                    .flatten()
                    .map(|line| parse_header_line(line))
                    .collect::<Result<_>>()?;

                Ok(Command::Fetch(FetchArgs {
                    url,
                    method: args.get_one::<String>("method").cloned(),
                    data: args.get_one::<String>("data").cloned(),
                    json: args.get_flag("json"),
                    headers,
                    max_redirects: args.get_one::<usize>("max-redirects").copied().unwrap_or(10),
                    timeout_secs: args.get_one::<u64>("timeout").copied().unwrap_or(10),
                }))
            }
            Some(("validate", args)) => Ok(Command::Validate {
                site: site_path(args)?,
            }),
            Some((other, _)) => Err(CliError::usage(format!("unknown command '{}'", other))),
            None => Err(CliError::usage("no command given")),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Command::Crawl { site, .. } => format!("crawl {}", site.display()),
            Command::Fetch(args) => format!(
                "fetch {} {}",
                args.method.as_deref().unwrap_or(if args.data.is_some() { "POST" } else { "GET" }),
                args.url
            ),
            Command::Validate { site } => format!("validate {}", site.display()),
        }
    }

    /// Whether the command talks to the network.
    pub fn uses_network(&self) -> bool {
        !matches!(self, Command::Validate { .. })
    }

    pub async fn execute(&self, context: &Context) -> Result<Value> {
        match self {
            Command::Crawl { site, concurrency } => handle_crawl(context, site, *concurrency).await,
            Command::Fetch(args) => handle_fetch(context, args).await,
            Command::Validate { site } => handle_validate(site),
        }
    }
}

/// Check preconditions, then execute.
pub async fn run(command: &Command, context: &Context) -> Result<Value> {
    if command.uses_network() && context.proxy == ProxyChoice::Provider {
        require_credentials(context)?;
    }
    info!("Running {}", command.describe());
    command.execute(context).await
}

fn site_path(args: &ArgMatches) -> Result<PathBuf> {
    let path = args
        .get_one::<PathBuf>("SITE")
        .ok_or_else(|| CliError::usage("missing site definition"))?;
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    Ok(PathBuf::from(expanded))
}

/// Parse a `Name: value` header argument.
pub fn parse_header_line(line: &str) -> Result<(String, String)> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| CliError::usage(format!("header '{}' is not 'Name: value'", line)))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::usage(format!("header '{}' has no name", line)));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Build the single request `fetch` issues.
pub fn fetch_request(args: &FetchArgs, cookies: CookieStore) -> Result<RequestConfig> {
    let mut config = RequestConfig::new()
        .with_timeout(Duration::from_secs(args.timeout_secs))
        .with_max_redirects(args.max_redirects)
        .with_cookies(cookies);

    if let Some(method) = &args.method {
        let method = reqwest_method(method)?;
        config = config.with_method(method);
    }
    for (name, value) in &args.headers {
        config = config.with_header(name, value)?;
    }
    if let Some(data) = &args.data {
        let payload = if args.json {
            Payload::Json(
                serde_json::from_str(data)
                    .map_err(|e| CliError::usage(format!("--data is not valid JSON: {}", e)))?,
            )
        } else {
            Payload::Form(url::form_urlencoded::parse(data.as_bytes()).into_owned().collect())
        };
        config = config.with_payload(payload);
    }

    Ok(config)
}

fn reqwest_method(method: &str) -> Result<Method> {
    Method::from_str(&method.to_ascii_uppercase())
        .map_err(|_| CliError::usage(format!("invalid method '{}'", method)))
}

#[derive(Serialize)]
struct FetchOutput {
    url: String,
    status: u16,
    redirects: usize,
    cookies: std::collections::BTreeMap<String, String>,
    body: String,
}

async fn handle_fetch(context: &Context, args: &FetchArgs) -> Result<Value> {
    let engine = context.engine()?;
    let cookies = CookieStore::new();
    let request = fetch_request(args, cookies.clone())?;

    let response = engine.send(args.url.as_str(), &request).await?;
    info!(
        "{} answered {} after {} redirects",
        response.url(),
        response.status(),
        response.meta.redirects
    );

    Ok(serde_json::to_value(FetchOutput {
        url: response.url().to_string(),
        status: response.status(),
        redirects: response.meta.redirects,
        cookies: cookies.values(),
        body: response.text(),
    })?)
}

async fn handle_crawl(context: &Context, site: &Path, concurrency: Option<usize>) -> Result<Value> {
    let mut definition = SiteDefinition::load(site)?;
    if let Some(concurrency) = concurrency {
        definition.crawler.max_concurrency = concurrency;
    }
    let parser = Arc::new(definition.compile()?);
    let engine = Arc::new(context.engine()?);

    let mut crawler = Crawler::new(engine, parser, definition.crawler.clone())?;
    info!(
        "Crawling {} with up to {} fetches in flight",
        definition.display_name(),
        crawler.config().max_concurrency
    );

    let spinner = (!context.quiet).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Crawling {}...", definition.display_name()));
        pb
    });
    if let Some(pb) = &spinner {
        let pb = pb.clone();
        crawler = crawler.with_progress(Arc::new(move |message: String| pb.set_message(message)));
    }

    let stop = crawler.stop_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, waiting for in-flight requests");
            stop.stop();
        }
    });

    let result = crawler.crawl().await;
    interrupt.abort();
    if let Some(pb) = &spinner {
        pb.finish_and_clear();
    }

    let outcome = result?;
    info!(
        "{}: {} categories, {} listing pages, {} products ({} detail failures)",
        definition.display_name(),
        outcome.stats.categories,
        outcome.stats.listing_pages,
        outcome.stats.products,
        outcome.stats.detail_failures
    );
    Ok(serde_json::to_value(&outcome.products)?)
}

fn handle_validate(site: &Path) -> Result<Value> {
    let definition = SiteDefinition::load(site)?;
    definition.compile()?;

    let crawler = &definition.crawler;
    Ok(json!({
        "name": definition.display_name(),
        "start_page": crawler.start_page,
        "max_concurrency": crawler.max_concurrency,
        "timeout_secs": crawler.timeout_secs,
        "max_redirects": crawler.max_redirects,
        "detail_fields": definition.detail.fields.keys().collect::<Vec<_>>(),
        "has_sku": definition.detail.sku.is_some(),
        "paginated": definition.listing.next.is_some(),
    }))
}

/// Pretty JSON with a four-space indent.
pub fn render_json(value: &Value) -> Result<String> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}
