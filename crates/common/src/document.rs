//! Suite document model
//!
//! Typed form of a suite file once it has been loaded and passed schema
//! validation. Documents are immutable after loading.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::{self, Display};

/// Default read timeout applied when a suite does not declare one
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 60_000;

/// A complete suite document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteDocument {
    pub meta: SuiteMeta,

    pub configuration: ConfigurationSection,

    /// Suite files whose specs may be borrowed by name
    #[serde(default)]
    pub spec_dependencies: Vec<String>,

    #[serde(default)]
    pub hooks: SuiteHooks,

    #[serde(default)]
    pub specs: Vec<SpecDefinition>,
}

impl SuiteDocument {
    /// Find a spec definition by exact name
    pub fn spec(&self, name: &str) -> Option<&SpecDefinition> {
        self.specs.iter().find(|spec| spec.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteMeta {
    pub name: String,

    #[serde(default)]
    pub enabled: Option<bool>,

    /// Resolve referenced files against the suite's own directory
    #[serde(default)]
    pub locate_files_relative: bool,
}

impl SuiteMeta {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

/// Static target configuration as written in the document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigurationSection {
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub base_path: Option<String>,
    #[serde(default)]
    pub read_timeout: Option<u64>,

    /// Routine producing dynamic configuration values
    #[serde(default)]
    pub custom_configuration: Option<FunctionRef>,

    #[serde(default)]
    pub common_headers: Vec<NameValue>,
}

/// Resolved target of a suite, after custom configuration and defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfiguration {
    pub scheme: String,
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub base_path: String,
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
}

fn default_read_timeout() -> u64 {
    DEFAULT_READ_TIMEOUT_MS
}

impl TargetConfiguration {
    /// `scheme://host[:port]base_path`
    pub fn root_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{}{}", self.scheme, self.host, port, self.base_path),
            None => format!("{}://{}{}", self.scheme, self.host, self.base_path),
        }
    }
}

/// Reference to a user function: an inline registered name or a module export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "run_type", rename_all = "snake_case")]
pub enum FunctionRef {
    Inline { inline: InlineFunction },
    Module { module: ModuleFunction },
}

impl FunctionRef {
    pub fn inline(name: impl Into<String>) -> Self {
        FunctionRef::Inline {
            inline: InlineFunction {
                function: name.into(),
            },
        }
    }

    pub fn module(path: impl Into<String>, function: impl Into<String>) -> Self {
        FunctionRef::Module {
            module: ModuleFunction {
                module_path: path.into(),
                function_name: function.into(),
            },
        }
    }
}

impl Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionRef::Inline { inline } => write!(f, "inline:{}", inline.function),
            FunctionRef::Module { module } => {
                write!(f, "module:{}#{}", module.module_path, module.function_name)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineFunction {
    pub function: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFunction {
    pub module_path: String,
    pub function_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteHooks {
    #[serde(default)]
    pub before_all: Option<FunctionRef>,
    #[serde(default)]
    pub after_all: Option<FunctionRef>,
    /// Runs before every own spec execution, loop iterations included
    #[serde(default)]
    pub before_each: Option<FunctionRef>,
    #[serde(default)]
    pub after_each: Option<FunctionRef>,
}

/// A named key/value pair; scalar values are kept as strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameValue {
    pub name: String,
    #[serde(deserialize_with = "scalar_string")]
    pub value: String,
}

impl NameValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Bool(b) => Ok(b.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a scalar value, found {other}"
        ))),
    }
}

fn optional_scalar_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => scalar_string(value).map(Some).map_err(serde::de::Error::custom),
    }
}

/// One spec of a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecDefinition {
    pub name: String,

    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub before_test: Option<FunctionRef>,

    #[serde(default)]
    pub after_test: Option<FunctionRef>,

    #[serde(default, rename = "loop")]
    pub loop_spec: Option<LoopSpec>,

    pub request: RequestSpecification,

    #[serde(default)]
    pub response: Option<ResponseExpectation>,
}

/// Source of loop items for a spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopSpec {
    Static {
        #[serde(rename = "static")]
        items: serde_json::Value,
    },
    Dynamic {
        dynamic: FunctionRef,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Whether a request body may be attached
    pub fn allows_body(self) -> bool {
        !matches!(self, HttpMethod::Get | HttpMethod::Head | HttpMethod::Options)
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestSpecification {
    pub path: String,

    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default)]
    pub headers: Vec<NameValue>,

    #[serde(default)]
    pub path_params: Vec<NameValue>,

    #[serde(default)]
    pub query_params: Vec<NameValue>,

    /// Sent as one `Cookie` header
    #[serde(default)]
    pub cookies: Vec<NameValue>,

    #[serde(default)]
    pub payload: Option<Payload>,

    /// Overrides the suite read timeout (ms)
    #[serde(default)]
    pub read_timeout: Option<u64>,
}

/// Request payload; at most one of `body`, `form` and `form_data` is set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub body: Option<Body>,
    /// `application/x-www-form-urlencoded` fields
    #[serde(default)]
    pub form: Option<Vec<NameValue>>,
    /// `multipart/form-data` fields
    #[serde(default)]
    pub form_data: Option<Vec<FormField>>,
}

impl Payload {
    pub fn body(body: Body) -> Self {
        Self {
            body: Some(body),
            ..Default::default()
        }
    }

    /// Number of body kinds present
    pub fn kinds(&self) -> usize {
        [self.body.is_some(), self.form.is_some(), self.form_data.is_some()]
            .iter()
            .filter(|set| **set)
            .count()
    }
}

/// One multipart field: either a scalar `value` or a `file` to upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub value: Option<String>,
    /// Path resolved with the suite's file-location rule
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum Body {
    Json(serde_json::Value),
    Text(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseExpectation {
    #[serde(default)]
    pub status_code: Option<u16>,

    #[serde(default)]
    pub headers: Vec<NameValue>,

    #[serde(default)]
    pub cookies: Vec<NameValue>,

    #[serde(default)]
    pub json_schema: Option<JsonSchemaRef>,

    #[serde(default)]
    pub json_data: Vec<JsonDataExpectation>,

    #[serde(default)]
    pub custom_validator: Option<FunctionRef>,
}

/// JSON Schema the response body must satisfy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonSchemaRef {
    /// Schema given in place, as an object or as JSON text
    Inline {
        #[serde(rename = "$ref")]
        schema: serde_json::Value,
    },
    /// Schema read from a JSON file
    File {
        #[serde(rename = "$ref")]
        path: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDataExpectation {
    /// `$.a.b[0]` style path into the response body
    pub path: String,
    pub value: serde_json::Value,
}

/// Values layered over a spec definition for one execution.
///
/// Used both for dependency-spec calls and for patches returned by a
/// `before_test` hook. Set fields win over the definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecOverrides {
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub headers: Vec<NameValue>,
    #[serde(default)]
    pub path_params: Vec<NameValue>,
    #[serde(default)]
    pub query_params: Vec<NameValue>,
    #[serde(default)]
    pub cookies: Vec<NameValue>,
    #[serde(default)]
    pub body: Option<Body>,
    #[serde(default)]
    pub form: Option<Vec<NameValue>>,
    #[serde(default)]
    pub form_data: Option<Vec<FormField>>,
    #[serde(default)]
    pub read_timeout: Option<u64>,
    #[serde(default)]
    pub validate_response: Option<bool>,
}

impl SpecOverrides {
    /// Replacement payload, if any body kind is set
    pub fn payload(&self) -> Option<Payload> {
        let payload = Payload {
            body: self.body.clone(),
            form: self.form.clone(),
            form_data: self.form_data.clone(),
        };
        (payload.kinds() > 0).then_some(payload)
    }

    /// Layer `other` on top of `self`; `other` wins on conflicts.
    pub fn merged_with(mut self, other: SpecOverrides) -> SpecOverrides {
        let other_has_payload = other.payload().is_some();
        self.scheme = other.scheme.or(self.scheme);
        self.host = other.host.or(self.host);
        self.port = other.port.or(self.port);
        self.headers.extend(other.headers);
        self.path_params.extend(other.path_params);
        self.query_params.extend(other.query_params);
        self.cookies.extend(other.cookies);
        if other_has_payload {
            self.body = other.body;
            self.form = other.form;
            self.form_data = other.form_data;
        }
        self.read_timeout = other.read_timeout.or(self.read_timeout);
        self.validate_response = other.validate_response.or(self.validate_response);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_document() {
        let yaml = r#"
meta:
  name: users
  locate_files_relative: true
configuration:
  scheme: http
  host: localhost
  port: 3000
  common_headers:
    - name: X-Retry
      value: 3
hooks:
  before_all:
    run_type: module
    module:
      module_path: hooks/setup
      function_name: seed
specs:
  - name: list users
    loop:
      type: static
      static: [1, 2]
    request:
      path: /users/{id}
      method: post
      payload:
        body:
          type: json
          content: { name: alice }
    response:
      status_code: 201
      json_data:
        - path: $.name
          value: alice
"#;
        let doc: SuiteDocument = serde_yaml::from_str(yaml).unwrap();
        assert!(doc.meta.is_enabled());
        assert!(doc.meta.locate_files_relative);
        assert_eq!(doc.configuration.common_headers[0].value, "3");
        assert_eq!(
            doc.hooks.before_all,
            Some(FunctionRef::module("hooks/setup", "seed"))
        );

        let spec = doc.spec("list users").unwrap();
        assert_eq!(spec.request.method, HttpMethod::Post);
        assert!(matches!(spec.loop_spec, Some(LoopSpec::Static { .. })));
        assert_eq!(
            spec.request.payload.as_ref().and_then(|p| p.body.as_ref()),
            Some(&Body::Json(serde_json::json!({ "name": "alice" })))
        );
        assert_eq!(spec.response.as_ref().unwrap().status_code, Some(201));
    }

    #[test]
    fn test_root_url() {
        let target = TargetConfiguration {
            scheme: "https".into(),
            host: "api.example.com".into(),
            port: None,
            base_path: "/v1".into(),
            read_timeout: DEFAULT_READ_TIMEOUT_MS,
        };
        assert_eq!(target.root_url(), "https://api.example.com/v1");

        let target = TargetConfiguration {
            port: Some(8080),
            ..target
        };
        assert_eq!(target.root_url(), "https://api.example.com:8080/v1");
    }

    #[test]
    fn test_overrides_later_wins() {
        let base = SpecOverrides {
            host: Some("a".into()),
            read_timeout: Some(10),
            ..Default::default()
        };
        let merged = base.merged_with(SpecOverrides {
            host: Some("b".into()),
            validate_response: Some(false),
            ..Default::default()
        });
        assert_eq!(merged.host.as_deref(), Some("b"));
        assert_eq!(merged.read_timeout, Some(10));
        assert_eq!(merged.validate_response, Some(false));
    }

    #[test]
    fn test_override_payload_replaces_every_body_kind() {
        let base = SpecOverrides {
            body: Some(Body::Text("raw".into())),
            ..Default::default()
        };
        let merged = base.merged_with(SpecOverrides {
            form: Some(vec![NameValue::new("user", "alice")]),
            ..Default::default()
        });
        assert!(merged.body.is_none());
        assert_eq!(merged.payload().unwrap().kinds(), 1);
    }

    #[test]
    fn test_parse_forms_cookies_and_schema() {
        let yaml = r#"
name: upload
request:
  path: /avatars
  method: post
  cookies:
    - { name: session, value: abc }
  payload:
    form_data:
      - { name: user, value: 7 }
      - { name: avatar, file: img/a.png, content_type: image/png }
response:
  cookies:
    - { name: session, value: abc }
  json_schema:
    type: file
    $ref: schemas/avatar.json
"#;
        let spec: SpecDefinition = serde_yaml::from_str(yaml).unwrap();
        let fields = spec.request.payload.unwrap().form_data.unwrap();
        assert_eq!(fields[0].value.as_deref(), Some("7"));
        assert_eq!(fields[1].file.as_deref(), Some("img/a.png"));
        assert_eq!(spec.request.cookies[0].name, "session");

        let response = spec.response.unwrap();
        assert_eq!(
            response.json_schema,
            Some(JsonSchemaRef::File {
                path: "schemas/avatar.json".into()
            })
        );
    }
}
