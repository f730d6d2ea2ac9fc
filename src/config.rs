use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_STOCKS_API_URL: &str = "https://www.alphavantage.co/query";
const DEFAULT_NEWS_API_URL: &str = "https://newsapi.org/v2/everything";
const DEFAULT_COMPANY_DIRECTORY_URL: &str = "https://stockanalysis.com/stocks/";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub stocks_api_key: String,
    pub stocks_api_url: String,
    pub news_api_key: String,
    pub news_api_url: String,
    pub news_page_size: usize,
    pub company_directory_url: String,
    /// Narrative generation is disabled when no key is configured.
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub artifacts_dir: PathBuf,
    pub cors_origin: String,
    pub max_upload_bytes: usize,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            port: lookup("PORT")
                .unwrap_or_else(|| "5000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            stocks_api_key: required_key(&lookup, "STOCKS_API_KEY")?,
            stocks_api_url: http_url(&lookup, "STOCKS_API_URL", DEFAULT_STOCKS_API_URL)?,
            news_api_key: required_key(&lookup, "NEWS_API_KEY")?,
            news_api_url: http_url(&lookup, "NEWS_API_URL", DEFAULT_NEWS_API_URL)?,
            news_page_size: lookup("NEWS_PAGE_SIZE")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .ok()
                .filter(|size: &usize| *size > 0)
                .ok_or_else(|| anyhow::anyhow!("NEWS_PAGE_SIZE must be a positive number"))?,
            company_directory_url: http_url(
                &lookup,
                "COMPANY_DIRECTORY_URL",
                DEFAULT_COMPANY_DIRECTORY_URL,
            )?,
            gemini_api_key: lookup("GOOGLE_API_KEY").filter(|s| !s.trim().is_empty()),
            gemini_base_url: http_url(&lookup, "GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL)?,
            gemini_model: lookup("GEMINI_MODEL")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            artifacts_dir: lookup("ARTIFACTS_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./artifacts")),
            cors_origin: http_url(&lookup, "CORS_ORIGIN", "http://localhost:3000")?,
            max_upload_bytes: lookup("MAX_UPLOAD_BYTES")
                .unwrap_or_else(|| (10 * 1024 * 1024).to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("MAX_UPLOAD_BYTES must be a number of bytes"))?,
            http_timeout_secs: lookup("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a number of seconds"))?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Stocks API URL: {}", config.stocks_api_url);
        tracing::debug!("News API URL: {}", config.news_api_url);
        tracing::debug!("Artifacts directory: {}", config.artifacts_dir.display());
        if config.gemini_api_key.is_none() {
            tracing::warn!("GOOGLE_API_KEY not set; narrative summaries will use fallback text");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn required_key<F>(lookup: &F, name: &str) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name)
        .ok_or_else(|| anyhow::anyhow!("{} environment variable required", name))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    Ok(value)
}

fn http_url<F>(lookup: &F, name: &str, default: &str) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string());
    let parsed = url::Url::parse(&value)
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(value.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup_from(&[
            ("STOCKS_API_KEY", "stocks"),
            ("NEWS_API_KEY", "news"),
        ]))
        .unwrap();

        assert_eq!(config.port, 5000);
        assert_eq!(config.news_page_size, 5);
        assert_eq!(config.stocks_api_url, DEFAULT_STOCKS_API_URL);
        assert_eq!(config.company_directory_url, "https://stockanalysis.com/stocks");
        assert_eq!(config.gemini_model, "gemini-1.5-flash");
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.artifacts_dir, PathBuf::from("./artifacts"));
    }

    #[test]
    fn test_missing_required_key_rejected() {
        let err = Config::from_lookup(lookup_from(&[("NEWS_API_KEY", "news")])).unwrap_err();
        assert!(err.to_string().contains("STOCKS_API_KEY"));

        let err = Config::from_lookup(lookup_from(&[
            ("STOCKS_API_KEY", "  "),
            ("NEWS_API_KEY", "news"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_invalid_url_scheme_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("STOCKS_API_KEY", "stocks"),
            ("NEWS_API_KEY", "news"),
            ("NEWS_API_URL", "ftp://newsapi.org/v2/everything"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("NEWS_API_URL"));
    }

    #[test]
    fn test_blank_google_key_disables_narratives() {
        let config = Config::from_lookup(lookup_from(&[
            ("STOCKS_API_KEY", "stocks"),
            ("NEWS_API_KEY", "news"),
            ("GOOGLE_API_KEY", ""),
            ("NEWS_PAGE_SIZE", "3"),
        ]))
        .unwrap();
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.news_page_size, 3);
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let result = Config::from_lookup(lookup_from(&[
            ("STOCKS_API_KEY", "stocks"),
            ("NEWS_API_KEY", "news"),
            ("NEWS_PAGE_SIZE", "0"),
        ]));
        assert!(result.is_err());
    }
}
