use std::borrow::Cow;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, REFERER, USER_AGENT};
use tracing::debug;

use crate::config::ResolvedConfig;
use crate::domain::CountryFilter;
use crate::error::PreseeaError;
use crate::store::Store;

const SEARCH_ENDPOINT: &str = "busqueda.php";
const REFERER_PAGE: &str = "consultas.php";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";
/// Used when the server does not declare a charset for the results page.
const PAGE_DEFAULT_CHARSET: &str = "ISO-8859-1";

/// Access to the corpus site. Implementations must be shareable across
/// download workers.
pub trait CorpusClient: Send + Sync {
    fn fetch_page(&self, query: &SearchQuery, page: u32) -> Result<String, PreseeaError>;
    fn download(&self, remote: &str, destination: &Utf8Path) -> Result<u64, PreseeaError>;
}

/// Search form posted to the results endpoint. The pattern fields are the
/// site's own query language and are sent exactly as the search page does.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    country: CountryFilter,
}

impl SearchQuery {
    pub fn new(country: CountryFilter) -> Self {
        Self { country }
    }

    pub fn country(&self) -> &CountryFilter {
        &self.country
    }

    pub fn form_body(&self) -> String {
        let country = encode_country(&self.country);
        format!(
            "patron=%3Ctext%3E%5B(word%3D'.*'%25c)%5D+%3A%3A+(match.text_pais+%3D+'{country}'%25c)^\
             &patron2=%3Ctext%3E%5B(word%3D'.*'%25c)%5D+%3A%3A+(match.text_pais+%3D+'{country}'%25c)"
        )
    }
}

/// The wildcard goes in verbatim; anything else is percent-encoded from its
/// Latin-1 bytes, which the endpoint decodes to the same value as the raw
/// form the search page submits.
fn encode_country(filter: &CountryFilter) -> Cow<'_, str> {
    if filter.is_match_all() {
        return Cow::Borrowed(filter.as_str());
    }
    let mut bytes = Vec::with_capacity(filter.as_str().len());
    for ch in filter.as_str().chars() {
        match u8::try_from(u32::from(ch)) {
            Ok(byte) => bytes.push(byte),
            Err(_) => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    Cow::Owned(urlencoding::encode_binary(&bytes).into_owned())
}

#[derive(Clone)]
pub struct PreseeaHttpClient {
    client: Client,
    base_url: Url,
}

impl PreseeaHttpClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, PreseeaError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|err| PreseeaError::InvalidConfig(format!("user_agent: {err}")))?,
        );
        let mut builder = Client::builder()
            .default_headers(headers)
            .cookie_store(true);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|err| PreseeaError::PageHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    pub fn page_url(&self, page: u32) -> Result<Url, PreseeaError> {
        let mut url = self
            .base_url
            .join(SEARCH_ENDPOINT)
            .map_err(|err| PreseeaError::PageHttp(err.to_string()))?;
        url.set_query(Some(&format!("pagenum={page}")));
        Ok(url)
    }

    pub fn resource_url(&self, remote: &str) -> Result<Url, PreseeaError> {
        self.base_url
            .join(remote)
            .map_err(|err| PreseeaError::DownloadHttp {
                url: remote.to_string(),
                message: err.to_string(),
            })
    }
}

impl CorpusClient for PreseeaHttpClient {
    fn fetch_page(&self, query: &SearchQuery, page: u32) -> Result<String, PreseeaError> {
        let url = self.page_url(page)?;
        let referer = self
            .base_url
            .join(REFERER_PAGE)
            .map_err(|err| PreseeaError::PageHttp(err.to_string()))?;
        debug!(%url, country = %query.country(), "requesting results page");
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(REFERER, referer.as_str())
            .body(query.form_body())
            .send()
            .map_err(|err| PreseeaError::PageHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "search request failed".to_string());
            return Err(PreseeaError::PageStatus {
                page,
                status,
                message,
            });
        }
        response
            .text_with_charset(PAGE_DEFAULT_CHARSET)
            .map_err(|err| PreseeaError::PageHttp(err.to_string()))
    }

    fn download(&self, remote: &str, destination: &Utf8Path) -> Result<u64, PreseeaError> {
        let url = self.resource_url(remote)?;
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|err| PreseeaError::DownloadHttp {
                url: url.to_string(),
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(PreseeaError::DownloadStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        Store::write_stream_atomic(destination, &mut response)
    }
}
