//! User function dispatch
//!
//! Hooks, custom configuration, loop generators and custom validators are all
//! referenced through a [`FunctionRef`]. Inline references name a function in
//! the [`FunctionRegistry`]; module references name an export of a module
//! obtained from a [`ModuleResolver`]. Either way the caller ends up with a
//! [`Callable`] taking a [`HookContext`].

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use specline_common::document::{FunctionRef, SpecOverrides};
use specline_common::result::LoopItem;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{Error, Result};
use crate::loader::{assert_file_validity, FileLocator};
use crate::spec::SpecRunner;
use crate::transport::HttpResponse;

/// Uniform signature of every user function
pub type Callable =
    Arc<dyn Fn(HookContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Wrap an async closure as a [`Callable`]
pub fn callable<F, Fut>(f: F) -> Callable
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Mutable key/value map owned by one suite and shared with its own hooks
/// and specs only.
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl UserContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.inner.lock().insert(key.into(), value);
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner.lock().clone()
    }

    pub fn replace(&self, map: Map<String, Value>) {
        *self.inner.lock() = map;
    }
}

/// What a user function gets to see
#[derive(Clone)]
pub struct HookContext {
    pub suite: UserContext,
    /// Name of the spec being run, for spec-level functions
    pub spec: Option<String>,
    pub item: Option<LoopItem>,
    /// Set for `after_test` hooks and custom validators
    pub response: Option<Arc<HttpResponse>>,
    runner: Option<SpecRunner>,
}

impl HookContext {
    pub fn new(suite: UserContext) -> Self {
        Self {
            suite,
            spec: None,
            item: None,
            response: None,
            runner: None,
        }
    }

    pub fn with_runner(mut self, runner: SpecRunner) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn for_spec(mut self, name: impl Into<String>, item: Option<LoopItem>) -> Self {
        self.spec = Some(name.into());
        self.item = item;
        self
    }

    pub fn with_response(mut self, response: Arc<HttpResponse>) -> Self {
        self.response = Some(response);
        self
    }

    /// Run a spec by name from this suite or one of its dependencies.
    pub async fn run_spec(&self, name: &str, overrides: SpecOverrides) -> Result<Arc<HttpResponse>> {
        match &self.runner {
            Some(runner) => runner.run(name.to_string(), overrides).await,
            None => Err(Error::NoSpecFoundMatchingName(format!(
                "No matching spec found with name '{name}'"
            ))),
        }
    }

    /// JSON view handed to out-of-process modules
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("suite".into(), Value::Object(self.suite.snapshot()));
        if let Some(spec) = &self.spec {
            out.insert("spec".into(), Value::String(spec.clone()));
        }
        if let Some(item) = &self.item {
            out.insert(
                "item".into(),
                serde_json::json!({ "index": item.index, "value": item.value }),
            );
        }
        if let Some(response) = &self.response {
            out.insert(
                "response".into(),
                serde_json::to_value(response.as_ref()).unwrap_or(Value::Null),
            );
        }
        Value::Object(out)
    }
}

/// Named inline functions
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Callable>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.functions.insert(name.into(), callable(f));
        self
    }

    pub fn get(&self, name: &str) -> Option<Callable> {
        self.functions.get(name).cloned()
    }
}

/// An item exported by a module
#[derive(Clone)]
pub enum Export {
    Function(Callable),
    Value(Value),
}

/// A table of named exports
pub trait Module: Send + Sync {
    fn export(&self, name: &str) -> Option<Export>;
}

/// Turns a module path into a module
#[async_trait]
pub trait ModuleResolver: Send + Sync {
    async fn resolve(&self, path: &Path) -> Result<Arc<dyn Module>>;
}

/// Module built in-process from Rust closures
#[derive(Clone, Default)]
pub struct StaticModule {
    exports: HashMap<String, Export>,
}

impl StaticModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.exports.insert(name.into(), Export::Function(callable(f)));
        self
    }

    pub fn value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.exports.insert(name.into(), Export::Value(value));
        self
    }
}

impl Module for StaticModule {
    fn export(&self, name: &str) -> Option<Export> {
        self.exports.get(name).cloned()
    }
}

/// Registered in-process modules, falling back to another resolver for
/// unregistered paths.
#[derive(Clone)]
pub struct ModuleRegistry {
    modules: Vec<(PathBuf, Arc<dyn Module>)>,
    fallback: Option<Arc<dyn ModuleResolver>>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
            fallback: Some(Arc::new(CommandModuleResolver)),
        }
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that only knows its registered modules
    pub fn isolated() -> Self {
        Self {
            modules: Vec::new(),
            fallback: None,
        }
    }

    /// Register a module under `path`. A resolved path matches when it equals
    /// the key or ends with it.
    pub fn register(&mut self, path: impl Into<PathBuf>, module: impl Module + 'static) -> &mut Self {
        self.modules.push((path.into(), Arc::new(module)));
        self
    }

    fn lookup(&self, path: &Path) -> Option<Arc<dyn Module>> {
        self.modules
            .iter()
            .find(|(key, _)| key == path)
            .or_else(|| self.modules.iter().find(|(key, _)| path.ends_with(key)))
            .map(|(_, module)| module.clone())
    }
}

#[async_trait]
impl ModuleResolver for ModuleRegistry {
    async fn resolve(&self, path: &Path) -> Result<Arc<dyn Module>> {
        if let Some(module) = self.lookup(path) {
            return Ok(module);
        }
        match &self.fallback {
            Some(fallback) => fallback.resolve(path).await,
            None => Err(Error::FileDoesNotExist(format!(
                "Module file at '{}' does not exist, provide a valid path",
                path.display()
            ))),
        }
    }
}

/// Treats a module path as an executable.
///
/// Each call runs the file with the function name as its only argument and
/// the [`HookContext`] as JSON on stdin. Stdout may hold
/// `{"result": <value>, "suite": {...}}`; a returned `suite` object replaces
/// the user context.
#[derive(Debug, Clone, Default)]
pub struct CommandModuleResolver;

#[async_trait]
impl ModuleResolver for CommandModuleResolver {
    async fn resolve(&self, path: &Path) -> Result<Arc<dyn Module>> {
        assert_file_validity(path, "Module")?;
        Ok(Arc::new(CommandModule {
            path: path.to_path_buf(),
        }))
    }
}

struct CommandModule {
    path: PathBuf,
}

impl Module for CommandModule {
    fn export(&self, name: &str) -> Option<Export> {
        let path = self.path.clone();
        let function = name.to_string();
        Some(Export::Function(callable(move |ctx| {
            run_command(path.clone(), function.clone(), ctx)
        })))
    }
}

async fn run_command(path: PathBuf, function: String, ctx: HookContext) -> anyhow::Result<Value> {
    debug!("Running module command {} {}", path.display(), function);

    let mut child = tokio::process::Command::new(&path)
        .arg(&function)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            Error::ModuleLoading(format!("Failed to run module '{}': {e}", path.display()))
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        let input = serde_json::to_vec(&ctx.to_json())?;
        stdin.write_all(&input).await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        anyhow::bail!(
            "module '{}' function '{}' exited with {}: {}",
            path.display(),
            function,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    if stdout.trim().is_empty() {
        return Ok(Value::Null);
    }

    let mut reply: Value = serde_json::from_str(stdout.trim())?;
    if let Some(Value::Object(suite)) = reply.get_mut("suite").map(Value::take) {
        ctx.suite.replace(suite);
    }
    Ok(reply.get_mut("result").map(Value::take).unwrap_or(Value::Null))
}

/// Resolves [`FunctionRef`]s to callables
#[derive(Clone)]
pub struct FunctionResolver {
    inline: Arc<FunctionRegistry>,
    modules: Arc<dyn ModuleResolver>,
}

impl FunctionResolver {
    pub fn new(inline: FunctionRegistry, modules: Arc<dyn ModuleResolver>) -> Self {
        Self {
            inline: Arc::new(inline),
            modules,
        }
    }

    pub async fn resolve(&self, function: &FunctionRef, locator: &FileLocator) -> Result<Callable> {
        match function {
            FunctionRef::Inline { inline } => self.inline.get(&inline.function).ok_or_else(|| {
                Error::NotAFunction(format!(
                    "inline function '{}' is not registered",
                    inline.function
                ))
            }),
            FunctionRef::Module { module } => {
                let path = locator.resolve(&module.module_path);
                let resolved = self.modules.resolve(&path).await?;
                match resolved.export(&module.function_name) {
                    Some(Export::Function(f)) => Ok(f),
                    Some(Export::Value(_)) => Err(Error::NotAFunction(format!(
                        "'{}' is not a function in module '{}'",
                        module.function_name,
                        path.display()
                    ))),
                    None => Err(Error::CustomFunctionNotFoundInModule(format!(
                        "'{}' function not found in module",
                        module.function_name
                    ))),
                }
            }
        }
    }

    /// Resolve and call in one step; resolution errors surface as call errors.
    pub async fn invoke(
        &self,
        function: &FunctionRef,
        locator: &FileLocator,
        ctx: HookContext,
    ) -> anyhow::Result<Value> {
        let f = self.resolve(function, locator).await?;
        f(ctx).await
    }
}

impl Default for FunctionResolver {
    fn default() -> Self {
        Self::new(FunctionRegistry::new(), Arc::new(ModuleRegistry::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver() -> FunctionResolver {
        let mut inline = FunctionRegistry::new();
        inline.register("answer", |_ctx| async { Ok(json!(42)) });

        let mut modules = ModuleRegistry::isolated();
        modules.register(
            "hooks/db",
            StaticModule::new()
                .function("seed", |ctx: HookContext| async move {
                    ctx.suite.set("seeded", json!(true));
                    Ok(Value::Null)
                })
                .value("version", json!("1")),
        );

        FunctionResolver::new(inline, Arc::new(modules))
    }

    #[tokio::test]
    async fn test_inline_function() {
        let value = resolver()
            .invoke(
                &FunctionRef::inline("answer"),
                &FileLocator::cwd(),
                HookContext::new(UserContext::new()),
            )
            .await
            .unwrap();
        assert_eq!(value, json!(42));
    }

    #[tokio::test]
    async fn test_unknown_inline_function() {
        let err = resolver()
            .resolve(&FunctionRef::inline("missing"), &FileLocator::cwd())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "NotAFunctionError");
    }

    #[tokio::test]
    async fn test_module_function_mutates_user_context() {
        let ctx = UserContext::new();
        resolver()
            .invoke(
                &FunctionRef::module("hooks/db", "seed"),
                &FileLocator::cwd(),
                HookContext::new(ctx.clone()),
            )
            .await
            .unwrap();
        assert_eq!(ctx.get("seeded"), Some(json!(true)));
    }

    #[tokio::test]
    async fn test_module_contract_violations() {
        let resolver = resolver();

        let err = resolver
            .resolve(&FunctionRef::module("hooks/db", "drop"), &FileLocator::cwd())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "CustomFunctionNotFoundInModuleError");
        assert_eq!(err.to_string(), "'drop' function not found in module");

        let err = resolver
            .resolve(&FunctionRef::module("hooks/db", "version"), &FileLocator::cwd())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "NotAFunctionError");

        let err = resolver
            .resolve(&FunctionRef::module("hooks/none", "seed"), &FileLocator::cwd())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "FileDoesNotExist");
    }

    #[tokio::test]
    async fn test_command_module_missing_file() {
        let err = CommandModuleResolver
            .resolve(Path::new("/no/such/module"))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), "FileDoesNotExist");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_module_round_trip() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("module.sh");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(file, "cat > /dev/null").unwrap();
        writeln!(file, "echo '{{\"result\": [\"'$1'\"], \"suite\": {{\"token\": \"abc\"}}}}'").unwrap();
        drop(file);
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        let ctx = UserContext::new();
        let module = CommandModuleResolver.resolve(&path).await.unwrap();
        let Some(Export::Function(f)) = module.export("items") else {
            panic!("command modules export every name");
        };
        let value = f(HookContext::new(ctx.clone())).await.unwrap();

        assert_eq!(value, json!(["items"]));
        assert_eq!(ctx.get("token"), Some(json!("abc")));
    }
}
