//! HTTP transport used by the spec executor

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde::Serialize;
use specline_common::document::HttpMethod;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// A fully built request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    /// Absolute URL including the query string
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<RequestBody>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),
    /// `application/x-www-form-urlencoded`
    Form(Vec<(String, String)>),
    /// `multipart/form-data`
    Multipart(Vec<MultipartField>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MultipartField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        path: PathBuf,
        content_type: Option<String>,
    },
}

impl RequestBody {
    pub fn is_form(&self) -> bool {
        !matches!(self, RequestBody::Text(_))
    }

    /// Text form of the body for request logs
    pub fn render(&self) -> String {
        match self {
            RequestBody::Text(text) => text.clone(),
            RequestBody::Form(fields) => fields
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("&"),
            RequestBody::Multipart(fields) => fields
                .iter()
                .map(|field| match field {
                    MultipartField::Text { name, value } => format!("{name}={value}"),
                    MultipartField::File { name, path, .. } => {
                        format!("{name}=@{}", path.display())
                    }
                })
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

/// Response as seen by validators and hooks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased; repeated headers are joined with `, `
    pub headers: BTreeMap<String, String>,
    /// Cookies set by the response, by name
    pub cookies: BTreeMap<String, String>,
    pub body: String,
    pub duration_ms: u64,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.body)
    }
}

fn join_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut joined: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in headers {
        let value = value.to_str().unwrap_or_default();
        joined
            .entry(key.as_str().to_ascii_lowercase())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    joined
}

async fn multipart_form(fields: Vec<MultipartField>) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();

    for field in fields {
        form = match field {
            MultipartField::Text { name, value } => form.text(name, value),
            MultipartField::File {
                name,
                path,
                content_type,
            } => {
                let bytes = tokio::fs::read(&path).await.map_err(|err| {
                    Error::RequestBodyBuilder(format!(
                        "Unable to read form_data file '{}': {err}",
                        path.display()
                    ))
                })?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let mut part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
                if let Some(content_type) = content_type {
                    part = part.mime_str(&content_type).map_err(|err| {
                        Error::RequestBodyBuilder(format!(
                            "Invalid content type '{content_type}' for field '{name}': {err}"
                        ))
                    })?;
                }
                form.part(name, part)
            }
        };
    }

    Ok(form)
}

/// Sends requests; failures to get any response are `RequestError`s
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// reqwest-backed transport sharing one connection pool
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|err| Error::Request(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self { client })
    }
}

fn method_of(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    }
}

pub fn build_headers(input: &BTreeMap<String, String>) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();

    for (key, value) in input {
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|err| {
            Error::InvalidRequestSpecification(format!("Invalid header name `{key}`: {err}"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|err| {
            Error::InvalidRequestSpecification(format!("Invalid header value for `{key}`: {err}"))
        })?;
        headers.insert(name, value);
    }

    Ok(headers)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let headers = build_headers(&request.headers)?;
        let mut builder = self
            .client
            .request(method_of(request.method), &request.url)
            .headers(headers)
            .timeout(request.timeout);

        match request.body {
            Some(RequestBody::Text(body)) => builder = builder.body(body),
            Some(RequestBody::Form(fields)) => builder = builder.form(&fields),
            Some(RequestBody::Multipart(fields)) => {
                builder = builder.multipart(multipart_form(fields).await?)
            }
            None => {}
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                Error::Request(format!(
                    "Request to {} timed out after {} ms",
                    request.url,
                    request.timeout.as_millis()
                ))
            } else {
                Error::Request(format!("Request to {} failed: {err}", request.url))
            }
        })?;

        let status = response.status().as_u16();
        let headers = join_headers(response.headers());
        let cookies = response
            .cookies()
            .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
            .collect();

        let bytes = response
            .bytes()
            .await
            .map_err(|err| Error::Request(format!("Failed to read response: {err}")))?;

        Ok(HttpResponse {
            status,
            headers,
            cookies,
            body: String::from_utf8_lossy(&bytes).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = HttpResponse {
            status: 200,
            headers: BTreeMap::from([("content-type".to_string(), "application/json".to_string())]),
            cookies: BTreeMap::new(),
            body: r#"{"id": 7}"#.into(),
            duration_ms: 3,
        };
        assert_eq!(response.header("Content-Type"), Some("application/json"));
        assert_eq!(response.json().unwrap()["id"], 7);
    }

    #[test]
    fn test_repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("Set-Cookie", HeaderValue::from_static("a=1"));
        headers.append("Set-Cookie", HeaderValue::from_static("b=2"));
        headers.append("Vary", HeaderValue::from_static("Accept"));

        let joined = join_headers(&headers);
        assert_eq!(joined["set-cookie"], "a=1, b=2");
        assert_eq!(joined["vary"], "Accept");
    }

    #[test]
    fn test_render_form_bodies() {
        let form = RequestBody::Form(vec![("user".into(), "alice".into()), ("role".into(), "admin".into())]);
        assert_eq!(form.render(), "user=alice&role=admin");
        assert!(form.is_form());

        let multipart = RequestBody::Multipart(vec![
            MultipartField::Text {
                name: "user".into(),
                value: "7".into(),
            },
            MultipartField::File {
                name: "avatar".into(),
                path: PathBuf::from("img/a.png"),
                content_type: None,
            },
        ]);
        assert_eq!(multipart.render(), "user=7; avatar=@img/a.png");
    }

    #[tokio::test]
    async fn test_missing_upload_file() {
        let err = multipart_form(vec![MultipartField::File {
            name: "avatar".into(),
            path: PathBuf::from("/nope/a.png"),
            content_type: None,
        }])
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "RequestBodyBuilderError");
    }

    #[test]
    fn test_invalid_header_name() {
        let headers = BTreeMap::from([("bad header".to_string(), "x".to_string())]);
        let err = build_headers(&headers).unwrap_err();
        assert_eq!(err.kind(), "InvalidRequestSpecificationError");
    }
}
