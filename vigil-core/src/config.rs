//! Environment-driven configuration.
//!
//! [`Config::from_env`] loads an optional `.env` file and reads the process
//! environment; [`Config::from_lookup`] does the actual parsing against any
//! key lookup so it can be exercised without touching the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, VigilError};
use crate::health::{DEFAULT_LATENCY_CEILING_MS, DEFAULT_SUCCESS_RATE_FLOOR};
use crate::naming::{BrandProfile, BrandRegistry};

const DEFAULT_BRANDS: &str = "wujie,v2word";
const DEFAULT_INTERVAL_MINUTES: u64 = 10;
const DEFAULT_RECORD_TTL: u32 = 300;
const DEFAULT_CADDY_PATH: &str = "/etc/caddy/Caddyfile";
const DEFAULT_VALIDATE_CMD: &str = "caddy validate --config {path}";
const DEFAULT_RELOAD_CMD: &str = "systemctl reload caddy";
const DEFAULT_GITHUB_API: &str = "https://api.github.com";
const DEFAULT_AUTHOR_NAME: &str = "Domain Monitor Bot";
const DEFAULT_AUTHOR_EMAIL: &str = "noreply@domain-monitor.com";

/// Default apex and upstream host for the known brands.
const BRAND_DEFAULTS: &[(&str, &str, &str)] = &[
    ("wujie", "wj0001.cfd", "wujie.one"),
    ("v2word", "v20000.cfd", "v2word.art"),
];

/// Credentials for the Cloudflare v4 API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudflareAuth {
    /// `Authorization: Bearer <token>`
    Token(String),
    /// Legacy global key: `X-Auth-Email` + `X-Auth-Key`
    GlobalKey { email: String, api_key: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsConfig {
    pub auth: Option<CloudflareAuth>,
    pub record_ttl: u32,
}

/// Remote reverse-proxy host reached over SSH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub config_path: String,
    pub validate_cmd: String,
    pub reload_cmd: String,
}

impl ProxyConfig {
    /// Validate command with `{path}` substituted.
    pub fn validate_command(&self) -> String {
        self.validate_cmd.replace("{path}", &self.config_path)
    }

    pub fn reload_command(&self) -> String {
        self.reload_cmd.replace("{path}", &self.config_path)
    }
}

/// Commit author used for panels publishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

impl Default for CommitAuthor {
    fn default() -> Self {
        Self {
            name: DEFAULT_AUTHOR_NAME.to_string(),
            email: DEFAULT_AUTHOR_EMAIL.to_string(),
        }
    }
}

impl CommitAuthor {
    /// `Name <email>` as git expects it.
    pub fn signature(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubPanelsConfig {
    pub token: String,
    pub api_base: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub file_path: String,
    /// Local copy refreshed after each successful publish
    pub mirror_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitPanelsConfig {
    pub repo_path: PathBuf,
    /// Document path relative to `repo_path`
    pub file_path: String,
    pub remote: String,
    pub branch: String,
}

/// Where the brand → domain list document is published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelsBackend {
    GitHub(GitHubPanelsConfig),
    Git(GitPanelsConfig),
    None,
}

impl PanelsBackend {
    pub fn name(&self) -> &'static str {
        match self {
            PanelsBackend::GitHub(_) => "github",
            PanelsBackend::Git(_) => "git",
            PanelsBackend::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub brands: BrandRegistry,
    pub success_rate_threshold: f64,
    pub response_time_threshold_ms: f64,
    pub interval: Duration,
    /// Address replacement A records point at
    pub record_ip: Option<String>,
    pub dns: DnsConfig,
    pub redis_url: String,
    pub proxy: Option<ProxyConfig>,
    pub panels: PanelsBackend,
    pub author: CommitAuthor,
    pub publish_on_existing: bool,
}

impl Config {
    /// Reads configuration from the environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(VigilError::Config(format!("failed to load .env: {}", e))),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parses configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let brands = parse_brands(&get)?;

        let success_rate_threshold =
            parse_or(&get, "SUCCESS_RATE_THRESHOLD", DEFAULT_SUCCESS_RATE_FLOOR)?;
        let response_time_threshold_ms =
            parse_or(&get, "RESPONSE_TIME_THRESHOLD_MS", DEFAULT_LATENCY_CEILING_MS)?;
        let interval_minutes: u64 =
            parse_or(&get, "COORDINATOR_INTERVAL", DEFAULT_INTERVAL_MINUTES)?;
        if interval_minutes == 0 {
            return Err(VigilError::Config(
                "COORDINATOR_INTERVAL must be at least 1 minute".to_string(),
            ));
        }

        let record_ip = get("CADDY_IP");

        let auth = match (get("CF_API_TOKEN"), get("CF_EMAIL"), get("CF_API_KEY")) {
            (Some(token), _, _) => Some(CloudflareAuth::Token(token)),
            (None, Some(email), Some(api_key)) => Some(CloudflareAuth::GlobalKey { email, api_key }),
            _ => None,
        };
        let dns = DnsConfig {
            auth,
            record_ttl: parse_or(&get, "RECORD_TTL", DEFAULT_RECORD_TTL)?,
        };

        let redis_url = match get("REDIS_URL") {
            Some(url) => url,
            None => {
                let host = get("REDIS_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
                let port: u16 = parse_or(&get, "REDIS_PORT", 6380)?;
                let db: u32 = parse_or(&get, "REDIS_DB", 0)?;
                format!("redis://{}:{}/{}", host, port, db)
            }
        };

        let proxy = parse_proxy(&get)?;
        let panels = parse_panels(&get)?;

        let author = CommitAuthor {
            name: get("PANELS_AUTHOR_NAME").unwrap_or_else(|| DEFAULT_AUTHOR_NAME.to_string()),
            email: get("PANELS_AUTHOR_EMAIL").unwrap_or_else(|| DEFAULT_AUTHOR_EMAIL.to_string()),
        };

        let publish_on_existing = parse_bool(&get, "PUBLISH_ON_EXISTING", true)?;

        Ok(Self {
            brands,
            success_rate_threshold,
            response_time_threshold_ms,
            interval: Duration::from_secs(interval_minutes * 60),
            record_ip,
            dns,
            redis_url,
            proxy,
            panels,
            author,
            publish_on_existing,
        })
    }

    /// Cloudflare credentials, required before anything is provisioned.
    pub fn require_dns_auth(&self) -> Result<&CloudflareAuth> {
        self.dns.auth.as_ref().ok_or_else(|| {
            VigilError::Config("set CF_API_TOKEN or CF_EMAIL and CF_API_KEY".to_string())
        })
    }

    pub fn require_record_ip(&self) -> Result<&str> {
        self.record_ip
            .as_deref()
            .ok_or_else(|| VigilError::Config("CADDY_IP is not set".to_string()))
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| VigilError::Config(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_lowercase()).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(VigilError::Config(format!(
            "{}={:?}: expected a boolean",
            key, other
        ))),
    }
}

fn parse_brands<G>(get: &G) -> Result<BrandRegistry>
where
    G: Fn(&str) -> Option<String>,
{
    let list = get("BRANDS").unwrap_or_else(|| DEFAULT_BRANDS.to_string());
    let mut registry = BrandRegistry::new();

    for brand in list.split(',').map(|b| b.trim().to_lowercase()).filter(|b| !b.is_empty()) {
        let upper = brand.to_uppercase();
        let defaults = BRAND_DEFAULTS.iter().find(|(name, _, _)| *name == brand);

        let apex = get(&format!("{}_APEX", upper))
            .or_else(|| get(&upper))
            .or_else(|| defaults.map(|(_, apex, _)| apex.to_string()))
            .ok_or_else(|| {
                VigilError::Config(format!("brand {} has no apex domain (set {}_APEX)", brand, upper))
            })?;

        let mut profile = BrandProfile::new(&brand, &apex);
        if let Some(host) = get(&format!("{}_TARGET_HOST", upper))
            .or_else(|| defaults.map(|(_, _, host)| host.to_string()))
        {
            profile = profile.with_target_host(host);
        }
        registry.insert(profile);
    }

    if registry.is_empty() {
        return Err(VigilError::Config("BRANDS is empty".to_string()));
    }
    Ok(registry)
}

fn parse_proxy<G>(get: &G) -> Result<Option<ProxyConfig>>
where
    G: Fn(&str) -> Option<String>,
{
    let host = get("CADDY_IP");
    let user = get("CADDY_USER");
    let enabled = parse_bool(get, "PROXY_ENABLED", host.is_some() && user.is_some())?;
    if !enabled {
        return Ok(None);
    }

    let (Some(host), Some(user)) = (host, user) else {
        return Err(VigilError::Config(
            "PROXY_ENABLED requires CADDY_IP and CADDY_USER".to_string(),
        ));
    };

    Ok(Some(ProxyConfig {
        host,
        port: parse_or(get, "CADDY_PORT", 22)?,
        user,
        identity_file: get("CADDY_SSH_KEY").map(PathBuf::from),
        config_path: get("CADDY_CONFIG_PATH").unwrap_or_else(|| DEFAULT_CADDY_PATH.to_string()),
        validate_cmd: get("CADDY_VALIDATE_CMD").unwrap_or_else(|| DEFAULT_VALIDATE_CMD.to_string()),
        reload_cmd: get("CADDY_RELOAD_CMD").unwrap_or_else(|| DEFAULT_RELOAD_CMD.to_string()),
    }))
}

fn parse_panels<G>(get: &G) -> Result<PanelsBackend>
where
    G: Fn(&str) -> Option<String>,
{
    let token = get("PANELS_TOKEN")
        .or_else(|| get("GITEE_DOMAINS_TOKEN"))
        .or_else(|| get("GITHUB_TOKEN"));
    let branch = get("PANELS_BRANCH").unwrap_or_else(|| "main".to_string());
    let file_path = get("PANELS_FILE_PATH").unwrap_or_else(|| "domains.json".to_string());

    let backend = match get("PANELS_BACKEND") {
        Some(name) => name.to_lowercase(),
        None if get("PANELS_REPO_PATH").is_some() => "git".to_string(),
        None if token.is_some() => "github".to_string(),
        None => "none".to_string(),
    };

    match backend.as_str() {
        "github" => {
            let token = token.ok_or_else(|| {
                VigilError::Config("github panels backend requires PANELS_TOKEN".to_string())
            })?;
            let owner = get("PANELS_REPO_OWNER").ok_or_else(|| {
                VigilError::Config("github panels backend requires PANELS_REPO_OWNER".to_string())
            })?;
            Ok(PanelsBackend::GitHub(GitHubPanelsConfig {
                token,
                api_base: get("PANELS_API_BASE")
                    .unwrap_or_else(|| DEFAULT_GITHUB_API.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                owner,
                repo: get("PANELS_REPO_NAME").unwrap_or_else(|| "domains".to_string()),
                branch,
                file_path,
                mirror_path: get("PANELS_MIRROR_PATH").map(PathBuf::from),
            }))
        }
        "git" => {
            let repo_path = get("PANELS_REPO_PATH").ok_or_else(|| {
                VigilError::Config("git panels backend requires PANELS_REPO_PATH".to_string())
            })?;
            Ok(PanelsBackend::Git(GitPanelsConfig {
                repo_path: PathBuf::from(repo_path),
                file_path,
                remote: get("PANELS_REMOTE").unwrap_or_else(|| "origin".to_string()),
                branch,
            }))
        }
        "none" | "off" => Ok(PanelsBackend::None),
        other => Err(VigilError::Config(format!(
            "PANELS_BACKEND={:?}: expected github, git or none",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.brands.len(), 2);
        let wujie = config.brands.get("wujie").unwrap();
        assert_eq!(wujie.apex, "wj0001.cfd");
        assert_eq!(wujie.target_host.as_deref(), Some("wujie.one"));
        assert_eq!(config.success_rate_threshold, 0.70);
        assert_eq!(config.response_time_threshold_ms, 15_000.0);
        assert_eq!(config.interval, Duration::from_secs(600));
        assert_eq!(config.redis_url, "redis://127.0.0.1:6380/0");
        assert_eq!(config.dns.record_ttl, 300);
        assert!(config.dns.auth.is_none());
        assert!(config.proxy.is_none());
        assert_eq!(config.panels, PanelsBackend::None);
        assert!(config.publish_on_existing);
        assert_eq!(
            config.author.signature(),
            "Domain Monitor Bot <noreply@domain-monitor.com>"
        );
    }

    #[test]
    fn test_brand_apex_overrides() {
        let config = load(&[
            ("BRANDS", "wujie, acme"),
            ("WUJIE", "legacy.example"),
            ("ACME_APEX", "acme.example"),
            ("ACME_TARGET_HOST", "origin.acme.example"),
        ])
        .unwrap();

        assert_eq!(config.brands.get("wujie").unwrap().apex, "legacy.example");
        let acme = config.brands.get("acme").unwrap();
        assert_eq!(acme.prefix, "apiacme");
        assert_eq!(acme.target_host.as_deref(), Some("origin.acme.example"));
        assert!(config.brands.get("v2word").is_err());
    }

    #[test]
    fn test_brand_without_apex_is_error() {
        let err = load(&[("BRANDS", "acme")]).unwrap_err();
        assert!(matches!(err, VigilError::Config(_)));
    }

    #[test]
    fn test_cloudflare_auth() {
        let config = load(&[("CF_EMAIL", "ops@example.com"), ("CF_API_KEY", "k")]).unwrap();
        assert_eq!(
            config.dns.auth,
            Some(CloudflareAuth::GlobalKey {
                email: "ops@example.com".to_string(),
                api_key: "k".to_string(),
            })
        );

        let config = load(&[("CF_API_TOKEN", "t"), ("CF_EMAIL", "x")]).unwrap();
        assert_eq!(config.dns.auth, Some(CloudflareAuth::Token("t".to_string())));
    }

    #[test]
    fn test_proxy_enabled_by_credentials() {
        let config = load(&[
            ("CADDY_IP", "203.0.114.10"),
            ("CADDY_USER", "deploy"),
            ("CADDY_PORT", "2222"),
        ])
        .unwrap();

        let proxy = config.proxy.unwrap();
        assert_eq!(proxy.port, 2222);
        assert_eq!(proxy.config_path, "/etc/caddy/Caddyfile");
        assert_eq!(
            proxy.validate_command(),
            "caddy validate --config /etc/caddy/Caddyfile"
        );
        assert_eq!(proxy.reload_command(), "systemctl reload caddy");
        assert_eq!(config.record_ip.as_deref(), Some("203.0.114.10"));
    }

    #[test]
    fn test_proxy_disabled_explicitly() {
        let config = load(&[
            ("CADDY_IP", "203.0.114.10"),
            ("CADDY_USER", "deploy"),
            ("PROXY_ENABLED", "false"),
        ])
        .unwrap();
        assert!(config.proxy.is_none());

        let err = load(&[("PROXY_ENABLED", "true")]).unwrap_err();
        assert!(matches!(err, VigilError::Config(_)));
    }

    #[test]
    fn test_github_panels_with_legacy_token() {
        let config = load(&[
            ("GITEE_DOMAINS_TOKEN", "secret"),
            ("PANELS_REPO_OWNER", "example-org"),
            ("PANELS_API_BASE", "https://github.example.com/api/v3/"),
        ])
        .unwrap();

        match config.panels {
            PanelsBackend::GitHub(github) => {
                assert_eq!(github.token, "secret");
                assert_eq!(github.repo, "domains");
                assert_eq!(github.file_path, "domains.json");
                assert_eq!(github.api_base, "https://github.example.com/api/v3");
            }
            other => panic!("expected github backend, got {:?}", other),
        }
    }

    #[test]
    fn test_git_panels_backend() {
        let config = load(&[("PANELS_BACKEND", "git"), ("PANELS_REPO_PATH", "/srv/domains")]).unwrap();

        match config.panels {
            PanelsBackend::Git(git) => {
                assert_eq!(git.repo_path, PathBuf::from("/srv/domains"));
                assert_eq!(git.remote, "origin");
                assert_eq!(git.branch, "main");
            }
            other => panic!("expected git backend, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values() {
        assert!(load(&[("COORDINATOR_INTERVAL", "soon")]).is_err());
        assert!(load(&[("COORDINATOR_INTERVAL", "0")]).is_err());
        assert!(load(&[("PUBLISH_ON_EXISTING", "maybe")]).is_err());
        assert!(load(&[("PANELS_BACKEND", "svn")]).is_err());
    }

    #[test]
    fn test_redis_parts() {
        let config = load(&[("REDIS_HOST", "cache"), ("REDIS_PORT", "6379"), ("REDIS_DB", "2")]).unwrap();
        assert_eq!(config.redis_url, "redis://cache:6379/2");

        let config = load(&[("REDIS_URL", "redis://:pw@cache/1")]).unwrap();
        assert_eq!(config.redis_url, "redis://:pw@cache/1");
    }
}
