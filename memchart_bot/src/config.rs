use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use structopt::StructOpt;

use memchart_core::client::Credentials;
use memchart_core::sampler::GapLabel;

#[derive(Debug)]
pub struct Config {
    /// Enables verbose logging of errors that occur while sampling
    pub debug: bool,

    /// How frequently (in seconds) to log internal debug metrics
    pub debug_interval: Option<Duration>,

    /// The url of the panel's client api.
    /// e.g. "https://panel.example.com/api/client"
    pub api_url: String,

    /// The api key and session cookie sent with every request
    pub credentials: Credentials,

    /// The id of the server to monitor
    pub server_id: String,

    /// How frequently to take a memory sample
    pub sample_interval: Duration,

    /// How long to wait for a response from the panel api
    pub request_timeout: Duration,

    /// The json file holding every server's sample history; it must already exist.
    pub series_path: PathBuf,

    /// Where to write the rendered chart
    pub chart_path: PathBuf,

    /// The font for chart labels; a well-known system font is used if unset
    pub chart_font: Option<PathBuf>,

    /// Which label to record when a sample can't be fetched
    pub gap_label: GapLabel,

    /// The maximum number of samples to keep per server, if any
    pub retention: Option<usize>,
}

impl Config {
    /// Loads configuration from arguments, env and dotenv
    pub fn load() -> Result<Config> {
        // Attempts to find a `.env` file to initialize/extend the environment
        dotenv::dotenv().ok();

        // Load the config from arguments, then environment variables
        Config::from_env(Environment::from_args())
    }

    fn from_env(env: Environment) -> Result<Config> {
        let api_url = required(env.api_url, "URL")?;
        surf::Url::parse(&api_url).context("invalid URL")?;
        if env.sample_interval == 0 {
            return Err(anyhow::format_err!("invalid SAMPLE_INTERVAL: must be at least 1"));
        }
        Ok(Config {
            debug: env.debug
                || match dotenv::var("DEBUG").ok() {
                    Some(val) if val == "true" || val == "on" || val == "1" => true,
                    Some(val) if val == "false" || val == "off" || val == "0" || val == "" => false,
                    Some(val) => val.parse::<bool>().context("invalid DEBUG")?,
                    None => false,
                },
            debug_interval: match env.debug_interval {
                ToggleValue::Enabled(secs) => Some(Duration::from_secs(secs)),
                ToggleValue::EnabledDefault => Some(Duration::from_secs(300)),
                ToggleValue::Disabled => None,
            },
            api_url,
            credentials: Credentials {
                api_key: required(env.api_key, "KEY")?,
                cookie_name: required(Some(env.cookie_name), "COOKIE_NAME")?,
                session: required(env.session_cookie, "COOKIE")?,
            },
            server_id: required(env.server_id, "SERVERID")?,
            sample_interval: Duration::from_secs(env.sample_interval),
            request_timeout: Duration::from_secs(env.request_timeout),
            series_path: env.series_path,
            chart_path: env.chart_path,
            chart_font: env.chart_font,
            gap_label: env.gap_label.parse().context("invalid GAP_LABEL")?,
            retention: match env.retention {
                0 => None,
                n => Some(n),
            },
        })
    }
}

/// Rejects a missing or blank value
fn required(value: Option<String>, name: &str) -> Result<String> {
    match value {
        Some(val) if !val.trim().is_empty() => Ok(val.trim().to_owned()),
        _ => Err(anyhow::format_err!("missing {}", name)),
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "memchart-bot")]
struct Environment {
    /// Enables verbose logging of errors that occur while sampling
    #[structopt(short, long)]
    debug: bool,

    /// How frequently (in seconds) to log internal debug metrics
    #[structopt(long, env = "DEBUG_INTERVAL", default_value = "300")]
    debug_interval: ToggleValue<u64>,

    /// The url of the panel's client api
    #[structopt(long = "url", env = "URL")]
    api_url: Option<String>,

    /// The api key to send as a bearer token
    #[structopt(long = "key", env = "KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// The id of the server to monitor
    #[structopt(long, env = "SERVERID")]
    server_id: Option<String>,

    /// The value of the panel's session cookie
    #[structopt(long = "cookie", env = "COOKIE", hide_env_values = true)]
    session_cookie: Option<String>,

    /// The name of the panel's session cookie
    #[structopt(long, env = "COOKIE_NAME", default_value = "pterodactyl_session")]
    cookie_name: String,

    /// How frequently (in seconds) to sample memory usage
    #[structopt(long, env = "SAMPLE_INTERVAL", default_value = "60")]
    sample_interval: u64,

    /// How long (in seconds) to wait for panel api requests
    #[structopt(long, env = "REQUEST_TIMEOUT", default_value = "10")]
    request_timeout: u64,

    /// The json file holding the sample history
    #[structopt(long, env = "SERIES_PATH", default_value = "stats.json", parse(from_os_str))]
    series_path: PathBuf,

    /// Where to write the rendered chart
    #[structopt(long, env = "CHART_PATH", default_value = "output.png", parse(from_os_str))]
    chart_path: PathBuf,

    /// A ttf font file for chart labels
    #[structopt(long, env = "CHART_FONT", parse(from_os_str))]
    chart_font: Option<PathBuf>,

    /// The label for a failed sample: "unknown" or "repeat" (the previous label)
    #[structopt(long, env = "GAP_LABEL", default_value = "unknown")]
    gap_label: String,

    /// The max number of samples to keep per server; 0 keeps every sample
    #[structopt(long, env = "SERIES_RETENTION", default_value = "0")]
    retention: usize,
}

#[derive(Debug, Eq, PartialEq)]
enum ToggleValue<T: FromStr> {
    Enabled(T),
    EnabledDefault,
    Disabled,
}

impl<T: FromStr> Default for ToggleValue<T> {
    fn default() -> Self {
        ToggleValue::Disabled
    }
}

impl<T: FromStr> FromStr for ToggleValue<T> {
    type Err = T::Err;
    fn from_str(val: &str) -> std::result::Result<Self, Self::Err> {
        match val {
            "false" | "off" | "0" | "" => Ok(ToggleValue::Disabled),
            "true" | "on" | "1" => Ok(ToggleValue::EnabledDefault),
            _ => val.parse().map(ToggleValue::Enabled),
        }
    }
}
