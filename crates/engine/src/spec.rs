//! Spec execution
//!
//! One execution covers a single spec or a single loop iteration:
//! `before_test` hook, request build, transport call, response validation,
//! `after_test` hook. Every exchange is appended to the scope's request log.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use specline_common::document::{
    Body, JsonSchemaRef, NameValue, Payload, SpecDefinition, SpecOverrides,
};
use specline_common::result::{LoggedRequest, LoggedResponse, LoopItem, RequestLog, RunKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::context::Toolkit;
use crate::dependency::SpecSource;
use crate::error::{occurred_while, wrap, wrap_user, Error, Result};
use crate::functions::{HookContext, UserContext};
use crate::loader::assert_file_validity;
use crate::schema::{format_violations, validate_instance};
use crate::transport::{HttpRequest, HttpResponse, MultipartField, RequestBody};

/// Everything one suite's specs run against
#[derive(Clone)]
pub struct ExecutionScope {
    toolkit: Arc<Toolkit>,
    own: Arc<SpecSource>,
    dependencies: Arc<Vec<Arc<SpecSource>>>,
    user_context: UserContext,
    log: Arc<Mutex<Vec<RequestLog>>>,
}

impl ExecutionScope {
    pub fn new(
        toolkit: Arc<Toolkit>,
        own: Arc<SpecSource>,
        dependencies: Vec<Arc<SpecSource>>,
        user_context: UserContext,
    ) -> Self {
        Self {
            toolkit,
            own,
            dependencies: Arc::new(dependencies),
            user_context,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn own(&self) -> &Arc<SpecSource> {
        &self.own
    }

    pub fn user_context(&self) -> &UserContext {
        &self.user_context
    }

    pub fn toolkit(&self) -> &Toolkit {
        &self.toolkit
    }

    /// Context for suite-level functions
    pub fn hook_context(&self) -> HookContext {
        HookContext::new(self.user_context.clone()).with_runner(self.runner())
    }

    pub fn runner(&self) -> SpecRunner {
        SpecRunner {
            scope: self.clone(),
        }
    }

    pub fn reset_log(&self) {
        self.log.lock().clear();
    }

    /// Move the current log out, leaving it empty
    pub fn take_log(&self) -> Vec<RequestLog> {
        std::mem::take(&mut *self.log.lock())
    }

    /// Run one of this suite's own specs, wrapped in the suite's
    /// `before_each` and `after_each` hooks
    pub async fn execute(
        &self,
        spec: &SpecDefinition,
        item: Option<LoopItem>,
    ) -> Result<Arc<HttpResponse>> {
        let own = self.own.clone();
        let hooks = &own.document.hooks;
        let functions = &self.toolkit.functions;
        let ctx = self.hook_context().for_spec(&spec.name, item.clone());

        if let Some(hook) = &hooks.before_each {
            functions
                .invoke(hook, &own.locator, ctx.clone())
                .await
                .map_err(|err| wrap_user(&err, "running the before each hook", Error::BeforeEachHook))?;
        }

        let response = self
            .execute_in(&own, spec, item, SpecOverrides::default(), RunKind::Spec)
            .await?;

        if let Some(hook) = &hooks.after_each {
            functions
                .invoke(hook, &own.locator, ctx.with_response(response.clone()))
                .await
                .map_err(|err| wrap_user(&err, "running the after each hook", Error::AfterEachHook))?;
        }

        Ok(response)
    }

    async fn execute_in(
        &self,
        source: &SpecSource,
        spec: &SpecDefinition,
        item: Option<LoopItem>,
        overrides: SpecOverrides,
        run: RunKind,
    ) -> Result<Arc<HttpResponse>> {
        let functions = &self.toolkit.functions;
        let ctx = self.hook_context().for_spec(&spec.name, item);

        let mut overrides = overrides;
        if let Some(hook) = &spec.before_test {
            let patch = functions
                .invoke(hook, &source.locator, ctx.clone())
                .await
                .map_err(|err| wrap_user(&err, "running the before test hook", Error::BeforeTestHook))?;
            overrides = overrides.merged_with(decode_patch(patch)?);
        }

        let request = build_request(source, spec, &overrides)?;
        let logged = LoggedRequest {
            method: request.method,
            uri: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.as_ref().map(RequestBody::render),
            form_request: request.body.as_ref().map_or(false, RequestBody::is_form),
        };

        debug!("{} {}", request.method, request.url);
        let response = match self.toolkit.transport.send(request).await {
            Ok(response) => Arc::new(response),
            Err(err) => {
                self.log.lock().push(RequestLog {
                    run,
                    spec: spec.name.clone(),
                    request: logged,
                    response: None,
                    error: Some(err.report()),
                });
                return Err(err);
            }
        };

        self.log.lock().push(RequestLog {
            run,
            spec: spec.name.clone(),
            request: logged,
            response: Some(LoggedResponse {
                status: response.status,
                headers: response.headers.clone(),
                body: response.body.clone(),
                duration_ms: response.duration_ms,
            }),
            error: None,
        });

        let ctx = ctx.with_response(response.clone());
        if overrides.validate_response.unwrap_or(true) {
            self.validate(source, spec, &response, ctx.clone()).await?;
        }

        if let Some(hook) = &spec.after_test {
            functions
                .invoke(hook, &source.locator, ctx)
                .await
                .map_err(|err| wrap_user(&err, "running the after test hook", Error::AfterTestHook))?;
        }

        Ok(response)
    }

    async fn validate(
        &self,
        source: &SpecSource,
        spec: &SpecDefinition,
        response: &HttpResponse,
        ctx: HookContext,
    ) -> Result<()> {
        let Some(expected) = &spec.response else {
            return Ok(());
        };

        if let Some(status) = expected.status_code {
            if status != response.status {
                return Err(Error::ResponseStatusCodeDidNotMatch(format!(
                    "Expected status code: {status}, Actual status code: {}",
                    response.status
                )));
            }
        }

        for header in &expected.headers {
            let actual = response.header(&header.name);
            if actual != Some(header.value.as_str()) {
                return Err(Error::ResponseHeaderValueDidNotMatch(format!(
                    "Expected value of header '{}' to be '{}', but got '{}'",
                    header.name,
                    header.value,
                    actual.unwrap_or("<missing>")
                )));
            }
        }

        for cookie in &expected.cookies {
            let actual = response.cookies.get(&cookie.name).map(String::as_str);
            if actual != Some(cookie.value.as_str()) {
                return Err(Error::ResponseCookieValueDidNotMatch(format!(
                    "Expected value of cookie '{}' to be '{}', but got '{}'",
                    cookie.name,
                    cookie.value,
                    actual.unwrap_or("<missing>")
                )));
            }
        }

        if expected.json_schema.is_some() || !expected.json_data.is_empty() {
            let body = response.json().map_err(|e| {
                Error::JsonBodyParse(format!("Unable to parse response body as JSON: {e}"))
            })?;

            if let Some(reference) = &expected.json_schema {
                let schema = load_response_schema(source, reference).await?;
                let violations = validate_instance(&schema, &body).map_err(|e| {
                    Error::ResponseJsonSchemaValidation(format!("Invalid response JSON schema: {e}"))
                })?;
                if !violations.is_empty() {
                    return Err(Error::ResponseJsonSchemaValidation(format!(
                        "Response body does not match the JSON schema \n{}",
                        format_violations(&violations)
                    )));
                }
            }

            for assertion in &expected.json_data {
                let pointer = json_pointer(&assertion.path)?;
                let actual = body.pointer(&pointer).unwrap_or(&Value::Null);
                if actual != &assertion.value {
                    return Err(Error::ResponseJsonDataMismatch(format!(
                        "Value at path '{}' did not match, expected {} but got {}",
                        assertion.path, assertion.value, actual
                    )));
                }
            }
        }

        if let Some(validator) = &expected.custom_validator {
            self.toolkit
                .functions
                .invoke(validator, &source.locator, ctx)
                .await
                .map_err(|err| {
                    wrap_user(&err, "running the custom response validator", Error::CustomResponseValidation)
                })?;
        }

        Ok(())
    }
}

/// Runs specs by name on behalf of hooks and other specs.
///
/// The suite's own specs are searched first, then each dependency in
/// declaration order. A dependency spec runs against its own suite's target
/// and common headers. Suite `before_each`/`after_each` hooks do not apply,
/// and its log entries are tagged [`RunKind::Dependency`].
#[derive(Clone)]
pub struct SpecRunner {
    scope: ExecutionScope,
}

impl SpecRunner {
    pub fn find(&self, name: &str) -> Option<(Arc<SpecSource>, SpecDefinition)> {
        std::iter::once(&self.scope.own)
            .chain(self.scope.dependencies.iter())
            .find_map(|source| source.spec(name).map(|spec| (source.clone(), spec.clone())))
    }

    pub fn run(
        &self,
        name: String,
        overrides: SpecOverrides,
    ) -> BoxFuture<'static, Result<Arc<HttpResponse>>> {
        let scope = self.scope.clone();
        let found = self.find(&name);
        Box::pin(async move {
            let (source, spec) = found.ok_or_else(|| {
                Error::NoSpecFoundMatchingName(format!("No matching spec found with name '{name}'"))
            })?;
            debug!("Running dependency spec '{}' from {}", name, source.file.display());
            scope
                .execute_in(&source, &spec, None, overrides, RunKind::Dependency)
                .await
        })
    }
}

fn decode_patch(patch: Value) -> Result<SpecOverrides> {
    match patch {
        Value::Null => Ok(SpecOverrides::default()),
        value => serde_json::from_value(value).map_err(|e| {
            Error::BeforeTestHook(occurred_while(
                "InvalidSpecificationSchemaError",
                "reading the before test hook result",
                e,
            ))
        }),
    }
}

/// Resolve a response schema reference into the schema document
async fn load_response_schema(source: &SpecSource, reference: &JsonSchemaRef) -> Result<Value> {
    match reference {
        JsonSchemaRef::Inline {
            schema: Value::String(text),
        } => serde_json::from_str(text).map_err(|e| {
            Error::ResponseJsonSchemaValidation(format!("Unable to parse inline JSON schema: {e}"))
        }),
        JsonSchemaRef::Inline { schema } => Ok(schema.clone()),
        JsonSchemaRef::File { path } => {
            let file = source.locator.resolve(path);
            let text = tokio::fs::read_to_string(&file).await.map_err(|e| {
                Error::ResponseJsonSchemaValidation(format!(
                    "Unable to read JSON schema file '{}': {e}",
                    file.display()
                ))
            })?;
            serde_json::from_str(&text).map_err(|e| {
                Error::ResponseJsonSchemaValidation(format!(
                    "Unable to parse JSON schema file '{}': {e}",
                    file.display()
                ))
            })
        }
    }
}

/// Pairs from `base` then `extra`; a later name replaces an earlier value in place
fn layered(base: &[NameValue], extra: &[NameValue]) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for pair in base.iter().chain(extra) {
        match out.iter_mut().find(|(name, _)| name == &pair.name) {
            Some(existing) => existing.1 = pair.value.clone(),
            None => out.push((pair.name.clone(), pair.value.clone())),
        }
    }
    out
}

/// Build the request for `spec`, with `overrides` layered on top
pub fn build_request(
    source: &SpecSource,
    spec: &SpecDefinition,
    overrides: &SpecOverrides,
) -> Result<HttpRequest> {
    let mut target = source.target.clone();
    if let Some(scheme) = &overrides.scheme {
        target.scheme = scheme.clone();
    }
    if let Some(host) = &overrides.host {
        target.host = host.clone();
    }
    if overrides.port.is_some() {
        target.port = overrides.port;
    }

    let request = &spec.request;

    let path_params: BTreeMap<&str, &str> = request
        .path_params
        .iter()
        .chain(&overrides.path_params)
        .map(|p| (p.name.as_str(), p.value.as_str()))
        .collect();
    let mut path = request.path.clone();
    for (name, value) in path_params {
        path = path.replace(&format!("{{{name}}}"), value);
    }

    let mut url = reqwest::Url::parse(&format!("{}{}", target.root_url(), path)).map_err(|e| {
        Error::InvalidRequestSpecification(format!(
            "Invalid request URL for spec '{}': {e}",
            spec.name
        ))
    })?;

    let query = layered(&request.query_params, &overrides.query_params);
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query.iter());
    }

    let mut headers: BTreeMap<String, String> = source.common_headers.clone();
    for header in request.headers.iter().chain(&overrides.headers) {
        headers.insert(header.name.to_ascii_lowercase(), header.value.clone());
    }

    let cookies = layered(&request.cookies, &overrides.cookies);
    if !cookies.is_empty() {
        let cookie = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        headers.insert("cookie".into(), cookie);
    }

    let payload = overrides
        .payload()
        .or_else(|| request.payload.clone())
        .filter(|_| request.method.allows_body());
    let body = match payload {
        Some(payload) => build_body(source, spec, &payload, &mut headers)?,
        None => None,
    };

    let timeout = overrides
        .read_timeout
        .or(request.read_timeout)
        .unwrap_or(target.read_timeout);

    Ok(HttpRequest {
        method: request.method,
        url: url.to_string(),
        headers,
        body,
        timeout: Duration::from_millis(timeout),
    })
}

fn build_body(
    source: &SpecSource,
    spec: &SpecDefinition,
    payload: &Payload,
    headers: &mut BTreeMap<String, String>,
) -> Result<Option<RequestBody>> {
    if payload.kinds() > 1 {
        return Err(Error::RequestBodyBuilder(format!(
            "Spec '{}' sets more than one of body, form and form_data",
            spec.name
        )));
    }

    if let Some(body) = &payload.body {
        return match body {
            Body::Json(content) => {
                headers
                    .entry("content-type".into())
                    .or_insert_with(|| "application/json".into());
                let text = serde_json::to_string(content).map_err(|e| {
                    Error::RequestBodyBuilder(format!("Invalid JSON body: {e}"))
                })?;
                Ok(Some(RequestBody::Text(text)))
            }
            Body::Text(content) => Ok(Some(RequestBody::Text(content.clone()))),
        };
    }

    if let Some(fields) = &payload.form {
        let fields = fields
            .iter()
            .map(|field| (field.name.clone(), field.value.clone()))
            .collect();
        return Ok(Some(RequestBody::Form(fields)));
    }

    if let Some(fields) = &payload.form_data {
        let mut parts = Vec::with_capacity(fields.len());
        for field in fields {
            let part = match (&field.value, &field.file) {
                (Some(value), None) => MultipartField::Text {
                    name: field.name.clone(),
                    value: value.clone(),
                },
                (None, Some(file)) => {
                    let path = source.locator.resolve(file);
                    assert_file_validity(&path, "form_data")
                        .map_err(|err| wrap(&err, "building the form_data body", Error::RequestBodyBuilder))?;
                    MultipartField::File {
                        name: field.name.clone(),
                        path,
                        content_type: field.content_type.clone(),
                    }
                }
                _ => {
                    return Err(Error::RequestBodyBuilder(format!(
                        "form_data field '{}' needs exactly one of value and file",
                        field.name
                    )))
                }
            };
            parts.push(part);
        }
        return Ok(Some(RequestBody::Multipart(parts)));
    }

    Ok(None)
}

/// Convert `$.a.b[0]` into the JSON pointer `/a/b/0`
pub fn json_pointer(path: &str) -> Result<String> {
    let invalid = || Error::InvalidSpecificationSchema(format!("Invalid JSON path '{path}'"));

    let rest = path.strip_prefix('$').ok_or_else(invalid)?;
    let mut pointer = String::new();
    let mut chars = rest.chars().peekable();

    while let Some(c) = chars.next() {
        let token = match c {
            '.' => {
                let mut key = String::new();
                while let Some(&next) = chars.peek() {
                    if next == '.' || next == '[' {
                        break;
                    }
                    key.push(next);
                    chars.next();
                }
                key
            }
            '[' => {
                let mut index = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(ch) => index.push(ch),
                        None => return Err(invalid()),
                    }
                }
                index.trim_matches(|c| c == '\'' || c == '"').to_string()
            }
            _ => return Err(invalid()),
        };
        if token.is_empty() {
            return Err(invalid());
        }
        pointer.push('/');
        pointer.push_str(&token.replace('~', "~0").replace('/', "~1"));
    }

    Ok(pointer)
}
