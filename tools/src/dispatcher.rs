//! Tool dispatch: the boundary where every outcome becomes a [`ToolResult`].
//!
//! Lookup, schema validation and panic capture happen here so executors can
//! use `?` freely and the caller only ever sees data.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tether_types::{ToolDefinition, ToolResult};
use tokio::task::JoinHandle;

use crate::context::ToolContext;
use crate::{ToolError, ToolExecutor, ToolMode, ToolRegistry, validate_args};

pub struct Dispatcher {
    registry: ToolRegistry,
    ctx: ToolContext,
}

impl Dispatcher {
    /// Registration is finished before dispatch starts; the registry is read-only from here.
    #[must_use]
    pub fn new(registry: ToolRegistry, ctx: ToolContext) -> Self {
        Self { registry, ctx }
    }

    #[must_use]
    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Every registered tool's definition, sorted by name.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// Run a tool synchronously. Async-only tools fail without running.
    pub fn execute(&self, name: &str, input: Value) -> ToolResult {
        let tool = match self.prepare(name, &input) {
            Ok(tool) => tool,
            Err(err) => return finish(name, Err(err)),
        };
        let outcome = if tool.mode().has_sync() {
            catch_unwind(AssertUnwindSafe(|| tool.execute(input, &self.ctx)))
                .unwrap_or_else(|payload| Err(panicked(&payload)))
        } else {
            Err(ToolError::AsyncOnly {
                tool: name.to_string(),
            })
        };
        finish(name, outcome)
    }

    /// Run a tool through its async executor.
    ///
    /// Sync-only tools run after yielding once, so the caller's current turn
    /// completes before the executor starts.
    pub async fn call(&self, name: &str, input: Value) -> ToolResult {
        let tool = match self.prepare(name, &input) {
            Ok(tool) => tool,
            Err(err) => return finish(name, Err(err)),
        };

        let outcome = if tool.mode() == ToolMode::Sync {
            tokio::task::yield_now().await;
            catch_unwind(AssertUnwindSafe(|| tool.execute(input, &self.ctx)))
                .unwrap_or_else(|payload| Err(panicked(&payload)))
        } else {
            match catch_unwind(AssertUnwindSafe(|| tool.execute_async(input, &self.ctx))) {
                Ok(Some(fut)) => AssertUnwindSafe(fut)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(panicked(&payload))),
                Ok(None) => Err(ToolError::execution(name, "no async executor provided")),
                Err(payload) => Err(panicked(&payload)),
            }
        };
        finish(name, outcome)
    }

    /// Start a call in the background and hand its result to `callback`.
    ///
    /// The callback runs exactly once, on a spawned task, and never before this
    /// function has returned. Callbacks fire in completion order.
    pub fn execute_async<F>(
        self: &Arc<Self>,
        name: &str,
        input: Value,
        callback: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(ToolResult) + Send + 'static,
    {
        let this = Arc::clone(self);
        let name = name.to_string();
        tokio::spawn(async move {
            let result = this.call(&name, input).await;
            callback(result);
        })
    }

    fn prepare(&self, name: &str, input: &Value) -> Result<&dyn ToolExecutor, ToolError> {
        let tool = self.registry.lookup(name)?;
        validate_args(&tool.schema(), input)?;
        tracing::debug!(
            tool = name,
            side_effecting = tool.is_side_effecting(),
            requires_approval = tool.requires_approval(),
            "Dispatching tool"
        );
        Ok(tool)
    }
}

fn finish(name: &str, outcome: Result<ToolResult, ToolError>) -> ToolResult {
    match outcome {
        Ok(result) => {
            tracing::debug!(tool = name, success = result.is_success(), "Tool finished");
            result
        }
        Err(err) => {
            tracing::debug!(tool = name, error = %err, "Tool failed");
            err.into_result()
        }
    }
}

fn panicked(payload: &Box<dyn Any + Send>) -> ToolError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    tracing::warn!("Tool panicked: {message}");
    ToolError::Panicked { message }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use serde_json::json;

    use crate::ToolFut;
    use crate::context::test_support::context;

    struct SyncEcho;

    impl ToolExecutor for SyncEcho {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo text back"
        }
        fn schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        fn mode(&self) -> ToolMode {
            ToolMode::Sync
        }
        fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolResult, ToolError> {
            let text = args["text"].as_str().unwrap_or_default();
            if text == "boom" {
                panic!("echo exploded");
            }
            Ok(ToolResult::ok(text))
        }
    }

    struct AsyncCounter {
        runs: Arc<AtomicUsize>,
    }

    impl ToolExecutor for AsyncCounter {
        fn name(&self) -> &'static str {
            "counter"
        }
        fn description(&self) -> &str {
            "Count invocations"
        }
        fn schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn mode(&self) -> ToolMode {
            ToolMode::AsyncOnly
        }
        fn execute_async<'a>(&'a self, args: Value, _ctx: &'a ToolContext) -> Option<ToolFut<'a>> {
            Some(Box::pin(async move {
                tokio::task::yield_now().await;
                if args.get("panic").is_some() {
                    panic!("{}", String::from("async boom"));
                }
                let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(ToolResult::ok(format!("run {n}")))
            }))
        }
    }

    fn dispatcher(dir: &std::path::Path) -> (Arc<Dispatcher>, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::default();
        registry.register(Box::new(SyncEcho));
        registry.register(Box::new(AsyncCounter {
            runs: Arc::clone(&runs),
        }));
        (Arc::new(Dispatcher::new(registry, context(dir))), runs)
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failure_result() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, runs) = dispatcher(dir.path());
        let result = dispatcher.execute("nope", json!({}));
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("Unknown tool: nope"));
        let result = dispatcher.call("nope", json!({})).await;
        assert_eq!(result.error(), Some("Unknown tool: nope"));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sync_execute_runs_sync_tools() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, _) = dispatcher(dir.path());
        let result = dispatcher.execute("echo", json!({ "text": "hi" }));
        assert!(result.is_success());
        assert_eq!(result.message(), Some("hi"));
    }

    #[tokio::test]
    async fn schema_violations_never_reach_the_executor() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, _) = dispatcher(dir.path());
        let result = dispatcher.execute("echo", json!({ "text": 5 }));
        assert!(result.error().unwrap().starts_with("Bad tool args:"));
    }

    #[tokio::test]
    async fn panics_become_failure_results() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, _) = dispatcher(dir.path());
        let result = dispatcher.execute("echo", json!({ "text": "boom" }));
        assert_eq!(result.error(), Some("Tool panicked: echo exploded"));

        let result = dispatcher.call("counter", json!({ "panic": true })).await;
        assert_eq!(result.error(), Some("Tool panicked: async boom"));
    }

    #[tokio::test]
    async fn async_only_tools_refuse_sync_execution() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, runs) = dispatcher(dir.path());
        let result = dispatcher.execute("counter", json!({}));
        assert!(result.error().unwrap().contains("async-only"));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn callback_never_fires_before_execute_async_returns() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, _) = dispatcher(dir.path());
        let returned = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&returned);
        let handle = dispatcher.execute_async("echo", json!({ "text": "later" }), move |result| {
            assert!(seen.load(Ordering::SeqCst), "callback ran before caller returned");
            assert_eq!(result.message(), Some("later"));
        });
        returned.store(true, Ordering::SeqCst);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn callback_fires_exactly_once_per_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, runs) = dispatcher(dir.path());
        let results = Arc::new(Mutex::new(Vec::new()));
        for _ in 0..3 {
            let sink = Arc::clone(&results);
            dispatcher
                .execute_async("counter", json!({}), move |result| {
                    sink.lock().unwrap().push(result.message().map(str::to_string));
                })
                .await
                .unwrap();
        }
        let results = results.lock().unwrap().clone();
        assert_eq!(
            results,
            [Some("run 1".to_string()), Some("run 2".to_string()), Some("run 3".to_string())]
        );
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unknown_tool_through_callback() {
        let dir = tempfile::tempdir().unwrap();
        let (dispatcher, _) = dispatcher(dir.path());
        let (tx, rx) = tokio::sync::oneshot::channel();
        dispatcher.execute_async("missing", json!({}), move |result| {
            let _ = tx.send(result);
        });
        let result = rx.await.unwrap();
        assert_eq!(result.error(), Some("Unknown tool: missing"));
    }
}
