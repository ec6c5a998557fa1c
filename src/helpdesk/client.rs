use crate::archiver::config::HelpdeskConfig;
use crate::helpdesk::{ConversationSource, Lookup, Tag};
use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::Url;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    links: Option<Links>,
}

#[derive(Debug, Deserialize)]
struct Links {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagResource {
    id: String,
    #[serde(default)]
    attributes: TagAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct TagAttributes {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Single {
    data: Value,
}

enum Auth {
    Bearer(String),
    Session {
        api_key: String,
        csrf_header: String,
        csrf_cookie: String,
    },
}

pub struct HelpdeskClient {
    base: Url,
    search_id: String,
    search_page_size: u32,
    tag_page_size: u32,
    max_tag_pages: u32,
    auth: Auth,
    http: Client,
}

impl HelpdeskClient {
    pub fn new(cfg: &HelpdeskConfig) -> Result<Self> {
        let base = Url::parse(&cfg.base_url)
            .with_context(|| format!("invalid helpdesk base url `{}`", cfg.base_url))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        let auth = match (&cfg.csrf_header_token, &cfg.csrf_cookie_token) {
            (Some(header), Some(cookie)) => Auth::Session {
                api_key: cfg.api_key.clone(),
                csrf_header: header.clone(),
                csrf_cookie: cookie.clone(),
            },
            _ => Auth::Bearer(cfg.api_key.clone()),
        };
        Ok(Self {
            base,
            search_id: cfg.search_id.clone(),
            search_page_size: cfg.search_page_size,
            tag_page_size: cfg.tag_page_size,
            max_tag_pages: cfg.max_tag_pages,
            auth,
            http,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("helpdesk base url cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        let req = req.header("accept", "application/json");
        match &self.auth {
            Auth::Bearer(key) => req.bearer_auth(key),
            Auth::Session {
                api_key,
                csrf_header,
                csrf_cookie,
            } => req.header("x-csrf-token", csrf_header).header(
                "cookie",
                format!("_csrf={csrf_cookie}; x-kustomer-auth-token={api_key};"),
            ),
        }
    }

    fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
        self.authorize(req)
            .send()
            .with_context(|| format!("{what} request failed"))
    }
}

fn ensure_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    anyhow::bail!("{what} failed with status {status}: {}", body.trim())
}

fn has_more<T>(page: &Page<T>, page_size: u32) -> bool {
    let full = page.data.len() >= page_size as usize;
    let linked = page.links.as_ref().is_none_or(|links| links.next.is_some());
    full && linked
}

impl ConversationSource for HelpdeskClient {
    fn search(&self) -> Result<Vec<Value>> {
        let mut url = self.url(&[
            "v1",
            "customers",
            "searches",
            self.search_id.as_str(),
            "execution",
        ])?;
        url.query_pairs_mut()
            .append_pair("page", "1")
            .append_pair("pageSize", &self.search_page_size.to_string());

        let req = self
            .http
            .post(url)
            .header("content-type", "application/json")
            .body("{}");
        let response = self.send(req, "conversation search")?;
        let response = ensure_success(response, "conversation search")?;
        let page: Page<Value> = response
            .json()
            .context("conversation search returned invalid JSON")?;
        Ok(page.data)
    }

    fn tags(&self) -> Result<Vec<Tag>> {
        let mut out = Vec::new();
        for page_number in 1..=self.max_tag_pages {
            let mut url = self.url(&["v1", "tags"])?;
            url.query_pairs_mut()
                .append_pair("deleted", "false")
                .append_pair("page", &page_number.to_string())
                .append_pair("pageSize", &self.tag_page_size.to_string());

            let response = ensure_success(self.send(self.http.get(url), "tag list")?, "tag list")?;
            let page: Page<TagResource> =
                response.json().context("tag list returned invalid JSON")?;
            let more = has_more(&page, self.tag_page_size);
            debug!(page = page_number, count = page.data.len(), "tag page fetched");
            out.extend(page.data.into_iter().map(|tag| Tag {
                id: tag.id,
                name: tag.attributes.name,
            }));
            if !more {
                return Ok(out);
            }
        }
        anyhow::bail!(
            "tag list did not end within {} pages of {}",
            self.max_tag_pages,
            self.tag_page_size
        )
    }

    fn get_by_id(&self, id: &str) -> Result<Lookup> {
        let url = self.url(&["v1", "conversations", id])?;
        let response = self.send(self.http.get(url), "conversation lookup")?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Lookup::NotFound);
        }
        let response = ensure_success(response, "conversation lookup")?;
        let single: Single = response
            .json()
            .context("conversation lookup returned invalid JSON")?;
        Ok(Lookup::Found(single.data))
    }

    fn delete_by_id(&self, id: &str) -> Result<()> {
        let url = self.url(&["v1", "conversations", id])?;
        let response = self.send(self.http.delete(url), "conversation delete")?;
        ensure_success(response, "conversation delete")?;
        Ok(())
    }
}
