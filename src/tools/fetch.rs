//! read_url 工具：抓取网页并返回正文文本
//!
//! 仅支持 http/https；GET 请求带超时与浏览器 User-Agent；HTML 响应经 html2text 提取可读文本；
//! 超过 max_chars 时截断并注明原文长度。可选域名白名单（空表示不限制）。

use std::collections::HashSet;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::schema::schema_value;
use crate::tools::Tool;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadUrlArgs {
    /// 需要读取的 http/https 地址
    pub url: String,
    /// 截断前的最大字符数
    #[serde(default)]
    pub max_chars: Option<usize>,
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!") || s.starts_with("<html") || s.starts_with("<HTML")
        || (s.len() > 20 && s.contains('<') && (s.contains("</") || s.contains("<meta") || s.contains("<head")))
}

/// 从 URL 中提取 host（小写，不含端口与路径）
pub(crate) fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = url.split(['/', '?', '#']).next()?;
    let host = host.rsplit('@').next()?;
    let host = host.split(':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

/// 按字符数截断，并附带原文长度说明
pub(crate) fn truncate_with_note(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!(
        "{}\n\n... (content truncated, original length {} chars)",
        truncated.trim_end(),
        total
    )
}

/// read_url 工具
pub struct ReadUrlTool {
    client: Client,
    allowed_domains: HashSet<String>,
    max_chars: usize,
}

impl ReadUrlTool {
    pub fn new(allowed_domains: Vec<String>, timeout_secs: u64, max_chars: usize) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9,zh-CN;q=0.8"));
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains: allowed_domains.into_iter().map(|s| s.to_lowercase()).collect(),
            max_chars,
        }
    }

    /// 校验 URL：非空、http/https、白名单（若配置）
    fn validate(&self, url: &str) -> Result<(), String> {
        if url.is_empty() {
            return Err("url must not be empty".to_string());
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err("only http and https URLs are supported".to_string());
        }
        let domain = extract_domain(url).ok_or_else(|| "Invalid URL".to_string())?;
        if self.allowed_domains.is_empty() || self.allowed_domains.contains(&domain) {
            Ok(())
        } else {
            Err(format!("Domain not in allowlist: {domain}"))
        }
    }

    /// 将 HTML 转为可读文本（去除 script/style 等）
    fn html_to_text(html: &str) -> String {
        match from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(html),
        }
    }

    async fn fetch(&self, url: &str, max_chars: usize) -> Result<String, String> {
        self.validate(url)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {e}"))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp.text().await.map_err(|e| format!("Read body: {e}"))?;
        let body = body.trim_start_matches('\u{FEFF}');

        let text = if looks_like_html(body) {
            Self::html_to_text(body)
        } else {
            body.to_string()
        };
        let text = text.trim();
        if text.is_empty() {
            return Ok("Fetched successfully, but the page is empty".to_string());
        }
        Ok(truncate_with_note(text, max_chars))
    }
}

#[async_trait]
impl Tool for ReadUrlTool {
    fn name(&self) -> &str {
        "read_url"
    }

    fn description(&self) -> &str {
        "Read a web page and return its main text. Args: {\"url\": \"https://...\", \"max_chars\": 4000}"
    }

    fn parameters_schema(&self) -> Value {
        schema_value::<ReadUrlArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: ReadUrlArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid args: {e}"))?;
        let max_chars = match args.max_chars {
            Some(0) => return Err("max_chars must be a positive integer".to_string()),
            Some(n) => n,
            None => self.max_chars,
        };
        let url = args.url.trim();
        tracing::info!(url = %url, max_chars, "read_url fetch");
        self.fetch(url, max_chars).await
    }
}
