//! Binding request data into typed targets.
//!
//! # Modes
//! - Query: URL query string only
//! - PostForm: form body only (url-encoded or multipart text fields); the
//!   query string is ignored
//! - Form: query string and form body; the body wins on key collision
//! - Json: request body as JSON
//! - Uri: path template variables (`/user/{name}`)
//!
//! # Design Decisions
//! - Binders only read the body captured at init, never the live stream
//! - Field names come from the target's serde attributes
//! - A repeated key fills a sequence field; a scalar field takes its first value
//! - A failed bind is a failed operation; no partial result is returned

use std::collections::BTreeMap;
use std::fmt;

use axum::body::Body;
use axum::extract::{FromRequest, Multipart};
use axum::http::{header, HeaderMap, Request};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use url::form_urlencoded;

use crate::core::context::Context;
use crate::core::form_decode;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";

/// Request parameters keyed by name, in arrival order per key.
pub type Params = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindMode {
    Query,
    PostForm,
    Form,
    Json,
    Uri,
}

impl fmt::Display for BindMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BindMode::Query => "query",
            BindMode::PostForm => "post form",
            BindMode::Form => "form",
            BindMode::Json => "json",
            BindMode::Uri => "uri",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BindError {
    #[error("{mode} binding failed: {source}")]
    Decode {
        mode: BindMode,
        #[source]
        source: serde::de::value::Error,
    },

    #[error("{mode} binding failed: malformed form body: {message}")]
    FormBody { mode: BindMode, message: String },

    #[error("json binding failed: {0}")]
    Json(#[source] serde_json::Error),

    #[error("json binding failed: empty request body")]
    EmptyBody,
}

impl BindError {
    pub fn mode(&self) -> BindMode {
        match self {
            BindError::Decode { mode, .. } | BindError::FormBody { mode, .. } => *mode,
            BindError::Json(_) | BindError::EmptyBody => BindMode::Json,
        }
    }
}

/// Form fields carried by the request body, parsed once at init.
#[derive(Debug, Clone, Default)]
pub(crate) enum FormBody {
    /// Not a form content type.
    #[default]
    Absent,
    Fields(Vec<(String, String)>),
    /// A multipart body that could not be parsed.
    Malformed(String),
}

impl FormBody {
    pub(crate) async fn parse(headers: &HeaderMap, body: &Bytes) -> Self {
        let mime = headers
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .unwrap_or_default();

        if mime.eq_ignore_ascii_case(FORM_CONTENT_TYPE) {
            FormBody::Fields(form_urlencoded::parse(body).into_owned().collect())
        } else if mime.eq_ignore_ascii_case(MULTIPART_CONTENT_TYPE) {
            match multipart_fields(headers, body).await {
                Ok(fields) => FormBody::Fields(fields),
                Err(message) => FormBody::Malformed(message),
            }
        } else {
            FormBody::Absent
        }
    }
}

/// Text fields of a multipart body. File parts are skipped.
async fn multipart_fields(headers: &HeaderMap, body: &Bytes) -> Result<Vec<(String, String)>, String> {
    let mut request = Request::new(Body::from(body.clone()));
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        request
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type.clone());
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| e.to_string())?;
    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let value = field.text().await.map_err(|e| e.to_string())?;
        fields.push((name, value));
    }
    Ok(fields)
}

impl Context {
    /// Bind the URL query string.
    pub fn bind_query<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        decode_pairs(BindMode::Query, self.query_pairs())
    }

    /// Bind the form body, ignoring the query string.
    pub fn bind_post_form<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        let body = self.checked_form_body(BindMode::PostForm)?;
        decode_pairs(BindMode::PostForm, body.to_vec())
    }

    /// Bind query string and form body together. A key present in the body
    /// replaces every query value for that key.
    pub fn bind_form<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        let body = self.checked_form_body(BindMode::Form)?;
        let mut pairs: Vec<(String, String)> = self
            .query_pairs()
            .into_iter()
            .filter(|(key, _)| !body.iter().any(|(body_key, _)| body_key == key))
            .collect();
        pairs.extend_from_slice(body);
        decode_pairs(BindMode::Form, pairs)
    }

    pub fn bind_json<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        if self.raw_data().is_empty() {
            return Err(BindError::EmptyBody);
        }
        serde_json::from_slice(self.raw_data()).map_err(BindError::Json)
    }

    /// Bind path template variables.
    pub fn bind_uri<T: DeserializeOwned>(&self) -> Result<T, BindError> {
        decode_pairs(BindMode::Uri, self.path_params().to_vec())
    }

    /// All parameters: body form values first, then query values.
    pub fn request_input_params(&self) -> Params {
        let mut params = Params::new();
        for (key, value) in self.post_form_pairs().iter().cloned().chain(self.query_pairs()) {
            params.entry(key).or_default().push(value);
        }
        params
    }

    pub fn request_post_form_params(&self) -> Params {
        let mut params = Params::new();
        for (key, value) in self.post_form_pairs() {
            params.entry(key.clone()).or_default().push(value.clone());
        }
        params
    }

    fn query_pairs(&self) -> Vec<(String, String)> {
        self.raw_uri()
            .query()
            .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default()
    }

    fn post_form_pairs(&self) -> &[(String, String)] {
        match self.form_body() {
            FormBody::Fields(fields) => fields,
            FormBody::Absent | FormBody::Malformed(_) => &[],
        }
    }

    fn checked_form_body(&self, mode: BindMode) -> Result<&[(String, String)], BindError> {
        match self.form_body() {
            FormBody::Malformed(message) => Err(BindError::FormBody {
                mode,
                message: message.clone(),
            }),
            _ => Ok(self.post_form_pairs()),
        }
    }
}

fn decode_pairs<T: DeserializeOwned>(mode: BindMode, pairs: Vec<(String, String)>) -> Result<T, BindError> {
    form_decode::from_pairs(pairs).map_err(|source| BindError::Decode { mode, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Target {
        a: String,
        #[serde(default)]
        b: Option<u32>,
    }

    async fn context(uri: &str, content_type: Option<&str>, body: impl Into<Body>) -> Context {
        context_with_params(uri, content_type, body, Vec::new()).await
    }

    async fn context_with_params(
        uri: &str,
        content_type: Option<&str>,
        body: impl Into<Body>,
        params: Vec<(String, String)>,
    ) -> Context {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        let mut ctx = Context::new();
        ctx.init(builder.body(body.into()).unwrap(), params, 4096)
            .await
            .unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_bind_query() {
        let ctx = context("/jobs?a=1&b=2", None, "").await;
        let target: Target = ctx.bind_query().unwrap();
        assert_eq!(target, Target { a: "1".into(), b: Some(2) });
    }

    #[tokio::test]
    async fn test_bind_query_reports_missing_field() {
        let ctx = context("/jobs?b=2", None, "").await;
        let err = ctx.bind_query::<Target>().unwrap_err();
        assert_eq!(err.mode(), BindMode::Query);
        assert!(err.to_string().contains("`a`"), "{err}");
    }

    #[tokio::test]
    async fn test_bind_post_form_ignores_query() {
        let ctx = context("/jobs?a=query&b=5", Some(FORM_CONTENT_TYPE), "a=body").await;
        let target: Target = ctx.bind_post_form().unwrap();
        assert_eq!(target, Target { a: "body".into(), b: None });
    }

    #[tokio::test]
    async fn test_bind_post_form_requires_form_content_type() {
        let ctx = context("/jobs", Some("application/json"), "a=body").await;
        assert!(ctx.bind_post_form::<Target>().is_err());
        assert!(ctx.request_post_form_params().is_empty());
    }

    #[tokio::test]
    async fn test_bind_form_prefers_body() {
        let ctx = context(
            "/jobs?a=1&b=7",
            Some("application/x-www-form-urlencoded; charset=utf-8"),
            "a=2",
        )
        .await;
        let target: Target = ctx.bind_form().unwrap();
        assert_eq!(target, Target { a: "2".into(), b: Some(7) });
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct JobFilter {
        ids: Vec<u32>,
        state: String,
    }

    #[tokio::test]
    async fn test_repeated_keys_in_query() {
        let ctx = context("/jobs?ids=1&state=running&ids=2&state=done", None, "").await;
        let filter: JobFilter = ctx.bind_query().unwrap();
        assert_eq!(filter, JobFilter { ids: vec![1, 2], state: "running".into() });

        let ctx = context("/jobs?a=1&a=2", None, "").await;
        let target: Target = ctx.bind_query().unwrap();
        assert_eq!(target.a, "1");
    }

    #[tokio::test]
    async fn test_repeated_keys_in_post_form() {
        let ctx = context(
            "/jobs?ids=9",
            Some(FORM_CONTENT_TYPE),
            "ids=3&ids=4&state=queued&state=failed",
        )
        .await;
        let filter: JobFilter = ctx.bind_post_form().unwrap();
        assert_eq!(filter, JobFilter { ids: vec![3, 4], state: "queued".into() });
    }

    #[tokio::test]
    async fn test_repeated_keys_in_form() {
        let ctx = context("/jobs?a=1&a=2", None, "").await;
        let target: Target = ctx.bind_form().unwrap();
        assert_eq!(target.a, "1");

        let ctx = context("/jobs?ids=1&ids=2&state=q", Some(FORM_CONTENT_TYPE), "ids=5&ids=6").await;
        let filter: JobFilter = ctx.bind_form().unwrap();
        assert_eq!(filter, JobFilter { ids: vec![5, 6], state: "q".into() });
    }

    const BOUNDARY: &str = "dashboard-boundary";

    fn multipart_body() -> String {
        format!(
            "--{b}\r\n\
             Content-Disposition: form-data; name=\"a\"\r\n\r\n\
             from multipart\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"b\"\r\n\r\n\
             42\r\n\
             --{b}\r\n\
             Content-Disposition: form-data; name=\"dump\"; filename=\"dump.sql\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             binary\r\n\
             --{b}--\r\n",
            b = BOUNDARY
        )
    }

    #[tokio::test]
    async fn test_bind_multipart_text_fields() {
        let content_type = format!("multipart/form-data; boundary={BOUNDARY}");
        let ctx = context("/jobs?a=query", Some(&content_type), multipart_body()).await;

        let target: Target = ctx.bind_post_form().unwrap();
        assert_eq!(target, Target { a: "from multipart".into(), b: Some(42) });

        let target: Target = ctx.bind_form().unwrap();
        assert_eq!(target.a, "from multipart");

        let post = ctx.request_post_form_params();
        assert_eq!(post.len(), 2);
        assert!(!post.contains_key("dump"));
        assert_eq!(ctx.request_input_params()["a"], vec!["from multipart".to_string(), "query".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_multipart_fails_form_binding() {
        let ctx = context("/jobs?a=1", Some("multipart/form-data"), "garbage").await;
        let err = ctx.bind_post_form::<Target>().unwrap_err();
        assert!(matches!(err, BindError::FormBody { mode: BindMode::PostForm, .. }), "{err}");
        assert_eq!(ctx.bind_form::<Target>().unwrap_err().mode(), BindMode::Form);

        let target: Target = ctx.bind_query().unwrap();
        assert_eq!(target.a, "1");
        assert!(ctx.request_post_form_params().is_empty());
    }

    #[tokio::test]
    async fn test_bind_json_replays_body() {
        let ctx = context("/jobs", Some("application/json"), r#"{"a":"x","b":3}"#).await;
        let first: Target = ctx.bind_json().unwrap();
        let second: Target = ctx.bind_json().unwrap();
        assert_eq!(first, second);
        assert_eq!(first, Target { a: "x".into(), b: Some(3) });
    }

    #[tokio::test]
    async fn test_bind_json_errors() {
        let ctx = context("/jobs", None, "").await;
        assert!(matches!(ctx.bind_json::<Target>(), Err(BindError::EmptyBody)));

        let ctx = context("/jobs", None, r#"{"a": 1}"#).await;
        let err = ctx.bind_json::<Target>().unwrap_err();
        assert_eq!(err.mode(), BindMode::Json);
        assert!(err.to_string().contains("invalid type"), "{err}");
    }

    #[tokio::test]
    async fn test_bind_uri() {
        let params = vec![("a".to_string(), "node 1".to_string()), ("b".to_string(), "12".to_string())];
        let ctx = context_with_params("/hosts/node%201/12", None, "", params).await;
        let target: Target = ctx.bind_uri().unwrap();
        assert_eq!(target, Target { a: "node 1".into(), b: Some(12) });

        let params = vec![("a".to_string(), "x".to_string()), ("b".to_string(), "NaN".to_string())];
        let ctx = context_with_params("/hosts/x/NaN", None, "", params).await;
        assert_eq!(ctx.bind_uri::<Target>().unwrap_err().mode(), BindMode::Uri);
    }

    #[tokio::test]
    async fn test_request_input_params_order() {
        let ctx = context("/jobs?a=q&c=3", Some(FORM_CONTENT_TYPE), "a=p").await;
        let params = ctx.request_input_params();
        assert_eq!(params["a"], vec!["p".to_string(), "q".to_string()]);
        assert_eq!(params["c"], vec!["3".to_string()]);

        let post = ctx.request_post_form_params();
        assert_eq!(post.len(), 1);
        assert_eq!(post["a"], vec!["p".to_string()]);
    }
}
