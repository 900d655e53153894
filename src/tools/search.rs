//! web_search 工具：DuckDuckGo HTML 版检索
//!
//! 请求 HTML 结果页后用正则提取标题、摘要与链接（重定向链接解出 `uddg` 参数中的真实地址），
//! 按 `i. 标题\n   摘要\n   链接` 格式编号输出；无结果时返回提示文本。

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::schema::schema_value;
use crate::tools::Tool;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// 无结果时的返回文本
pub const NO_RESULTS: &str = "No search results found";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WebSearchArgs {
    /// 搜索关键词
    pub query: String,
}

/// 单条搜索结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub body: String,
    pub url: String,
}

/// 去标签并解码常见 HTML 实体
fn clean_fragment(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    let out = out
        .replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ");
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// DuckDuckGo 的结果链接形如 `//duckduckgo.com/l/?uddg=<encoded>&rut=...`，解出真实地址
fn resolve_result_url(href: &str) -> String {
    let href = href.replace("&amp;", "&");
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.clone()
    };
    if let Ok(url) = Url::parse(&absolute) {
        if let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "uddg") {
            return target.into_owned();
        }
    }
    absolute
}

/// 从结果页 HTML 中提取至多 max 条结果
pub fn parse_results(html: &str, max: usize) -> Vec<SearchHit> {
    let (Ok(link_re), Ok(href_re), Ok(snippet_re)) = (
        Regex::new(r#"(?s)<a([^>]*class="result__a"[^>]*)>(.*?)</a>"#),
        Regex::new(r#"href="([^"]*)""#),
        Regex::new(r#"(?s)<(?:a|div|td)[^>]*class="result__snippet"[^>]*>(.*?)</(?:a|div|td)>"#),
    ) else {
        return Vec::new();
    };

    let snippets: Vec<String> = snippet_re
        .captures_iter(html)
        .map(|c| clean_fragment(&c[1]))
        .collect();

    link_re
        .captures_iter(html)
        .enumerate()
        .filter_map(|(i, caps)| {
            let href = href_re.captures(&caps[1])?.get(1)?.as_str().to_string();
            let title = clean_fragment(&caps[2]);
            if title.is_empty() {
                return None;
            }
            Some(SearchHit {
                title,
                body: snippets.get(i).cloned().unwrap_or_default(),
                url: resolve_result_url(&href),
            })
        })
        .take(max)
        .collect()
}

/// 编号格式化：`i. 标题\n   摘要\n   链接`，条目间空行分隔
pub fn format_results(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return NO_RESULTS.to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, h)| format!("{}. {}\n   {}\n   {}", i + 1, h.title, h.body, h.url))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// web_search 工具
pub struct WebSearchTool {
    client: Client,
    endpoint: String,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(endpoint: impl Into<String>, max_results: usize, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            max_results,
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web and return the top results (title, snippet, url). Args: {\"query\": \"search terms\"}"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<WebSearchArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: WebSearchArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid args: {e}"))?;
        let query = args.query.trim();
        if query.is_empty() {
            return Err("query must not be empty".to_string());
        }
        tracing::info!(query = %query, "web_search");

        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| format!("Search request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("Search failed: HTTP {}", resp.status()));
        }
        let html = resp.text().await.map_err(|e| format!("Read body: {e}"))?;
        let hits = parse_results(&html, self.max_results);
        tracing::debug!(count = hits.len(), "web_search parsed results");
        Ok(format_results(&hits))
    }
}
