//! Target configuration resolution
//!
//! Static values from the document are overlaid with the output of an
//! optional custom configuration function, defaulted, then validated.

use serde_json::{Map, Value};
use specline_common::document::{
    ConfigurationSection, NameValue, TargetConfiguration, DEFAULT_READ_TIMEOUT_MS,
};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::context::Toolkit;
use crate::error::{kind_of, occurred_while, Error, Result};
use crate::functions::{HookContext, UserContext};
use crate::loader::FileLocator;
use crate::schema::{format_violations, Schema};

/// Resolve the target of the suite at `file`
pub async fn resolve_target(
    toolkit: &Toolkit,
    file: &Path,
    section: &ConfigurationSection,
    locator: &FileLocator,
) -> Result<TargetConfiguration> {
    let mut resolved = static_values(section);

    if let Some(custom) = &section.custom_configuration {
        debug!("Running custom configuration {} for {}", custom, file.display());

        let scratch = UserContext::new();
        let output = toolkit
            .functions
            .invoke(custom, locator, HookContext::new(scratch.clone()))
            .await
            .map_err(|err| match kind_of(&err) {
                "InvalidYAMLSuiteSchemaError" => crate::error::from_user(err, Error::InvalidSuiteDocument),
                kind => Error::SuiteCustomConfiguration(occurred_while(
                    kind,
                    "running the custom configuration function",
                    format!("{err:#}"),
                )),
            })?;

        resolved.extend(scratch.snapshot());
        if let Value::Object(values) = output {
            resolved.extend(values);
        }
    }

    apply_defaults(&mut resolved);

    let resolved = Value::Object(resolved);
    let violations = toolkit
        .validator
        .validate(&resolved, Schema::TargetConfiguration);
    if !violations.is_empty() {
        return Err(Error::InvalidSuiteConfiguration(format!(
            "Invalid Suite configuration : {} \n {}",
            file.display(),
            format_violations(&violations)
        )));
    }

    serde_json::from_value(resolved).map_err(|e| {
        Error::InvalidSuiteConfiguration(format!(
            "Invalid Suite configuration : {} \n {e}",
            file.display()
        ))
    })
}

fn static_values(section: &ConfigurationSection) -> Map<String, Value> {
    let mut values = Map::new();
    if let Some(scheme) = &section.scheme {
        values.insert("scheme".into(), Value::from(scheme.clone()));
    }
    if let Some(host) = &section.host {
        values.insert("host".into(), Value::from(host.clone()));
    }
    if let Some(port) = section.port {
        values.insert("port".into(), Value::from(port));
    }
    if let Some(base_path) = &section.base_path {
        values.insert("base_path".into(), Value::from(base_path.clone()));
    }
    if let Some(read_timeout) = section.read_timeout {
        values.insert("read_timeout".into(), Value::from(read_timeout));
    }
    values
}

fn apply_defaults(values: &mut Map<String, Value>) {
    if matches!(values.get("base_path"), None | Some(Value::Null)) {
        values.insert("base_path".into(), Value::from(""));
    }
    if matches!(values.get("read_timeout"), None | Some(Value::Null)) {
        values.insert("read_timeout".into(), Value::from(DEFAULT_READ_TIMEOUT_MS));
    }
    if matches!(values.get("port"), Some(Value::Null)) {
        values.remove("port");
    }
}

/// Lowercased header map; a later duplicate overwrites an earlier one
pub fn header_map<'a>(headers: impl IntoIterator<Item = &'a NameValue>) -> BTreeMap<String, String> {
    headers
        .into_iter()
        .map(|h| (h.name.to_ascii_lowercase(), h.value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{FunctionRegistry, ModuleRegistry};
    use crate::transport::{HttpRequest, HttpResponse, Transport};
    use async_trait::async_trait;
    use serde_json::json;
    use specline_common::document::FunctionRef;
    use std::sync::Arc;

    struct NoTransport;

    #[async_trait]
    impl Transport for NoTransport {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse> {
            Err(Error::Request("offline".into()))
        }
    }

    fn toolkit() -> Toolkit {
        let mut inline = FunctionRegistry::new();
        inline
            .register("staging", |ctx: HookContext| async move {
                ctx.suite.set("host", json!("staging.local"));
                Ok(json!({ "port": 8443, "scheme": "https" }))
            })
            .register("broken", |_ctx| async { Err(anyhow::anyhow!("no target")) })
            .register("bad_schema", |_ctx| async {
                Err(anyhow::Error::new(Error::InvalidSuiteDocument(
                    "custom_configuration.run_type should be either inline or module".into(),
                )))
            });
        Toolkit::with_transport(Arc::new(NoTransport)).functions(inline, ModuleRegistry::isolated())
    }

    fn section() -> ConfigurationSection {
        ConfigurationSection {
            scheme: Some("http".into()),
            host: Some("localhost".into()),
            port: Some(3000),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_static_with_defaults() {
        let target = resolve_target(&toolkit(), Path::new("s.yaml"), &section(), &FileLocator::cwd())
            .await
            .unwrap();
        assert_eq!(target.base_path, "");
        assert_eq!(target.read_timeout, 60_000);
        assert_eq!(target.root_url(), "http://localhost:3000");
    }

    #[tokio::test]
    async fn test_dynamic_values_win() {
        let section = ConfigurationSection {
            custom_configuration: Some(FunctionRef::inline("staging")),
            ..section()
        };
        let target = resolve_target(&toolkit(), Path::new("s.yaml"), &section, &FileLocator::cwd())
            .await
            .unwrap();
        assert_eq!(target.root_url(), "https://staging.local:8443");
    }

    #[tokio::test]
    async fn test_resolution_is_repeatable() {
        let section = ConfigurationSection {
            custom_configuration: Some(FunctionRef::inline("staging")),
            ..section()
        };
        let toolkit = toolkit();
        let first = resolve_target(&toolkit, Path::new("s.yaml"), &section, &FileLocator::cwd())
            .await
            .unwrap();
        let second = resolve_target(&toolkit, Path::new("s.yaml"), &section, &FileLocator::cwd())
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_custom_configuration_failure_is_wrapped() {
        let section = ConfigurationSection {
            custom_configuration: Some(FunctionRef::inline("broken")),
            ..section()
        };
        let err = resolve_target(&toolkit(), Path::new("s.yaml"), &section, &FileLocator::cwd())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "SuiteCustomConfigurationError");
        assert!(err.to_string().contains("no target"));
    }

    #[tokio::test]
    async fn test_schema_error_propagates_unwrapped() {
        let section = ConfigurationSection {
            custom_configuration: Some(FunctionRef::inline("bad_schema")),
            ..section()
        };
        let err = resolve_target(&toolkit(), Path::new("s.yaml"), &section, &FileLocator::cwd())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidYAMLSuiteSchemaError");
    }

    #[tokio::test]
    async fn test_invalid_resolved_configuration() {
        let section = ConfigurationSection {
            host: None,
            ..section()
        };
        let err = resolve_target(&toolkit(), Path::new("s.yaml"), &section, &FileLocator::cwd())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidSuiteConfigurationError");
        assert!(err.to_string().contains("instance.host"));
    }

    #[test]
    fn test_header_map_later_wins() {
        let headers = vec![
            NameValue::new("Accept", "text/plain"),
            NameValue::new("accept", "application/json"),
        ];
        let map = header_map(&headers);
        assert_eq!(map.len(), 1);
        assert_eq!(map["accept"], "application/json");
    }
}
