//! Sandboxed execution host - runs a synthetic document in a fresh V8 isolate.
//!
//! Provides only the browser-shaped APIs a preview needs:
//! - console.log/info/warn/error/debug (captured, not printed)
//! - window, self, parent.postMessage (the telemetry channel)
//! - addEventListener for `error` and `unhandledrejection`
//! - setTimeout, setInterval and their clear functions
//! - crypto.randomUUID, crypto.getRandomValues, atob, btoa
//! - No DOM, no module imports, no fs, net, env, or other system access
//!
//! Each [`SandboxHost::load`] discards the previous isolate, so timers,
//! promises and globals never leak from one preview cycle into the next.

use crate::bridge::{ContextId, Envelope};
use crate::compositor::SyntheticDocument;
use crate::loader::PreviewLoader;
use crate::ops::{preview_host, NativeConsole, NativeLine, SandboxPort};
use anyhow::Error;
use deno_core::{v8, JsRuntime, PollEventLoopOptions, RuntimeOptions};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Event-loop failures tolerated per cycle before the host stops polling.
const MAX_EVENT_LOOP_RESTARTS: usize = 32;

/// The watchdog trails the cycle deadline so an idle event loop ends first.
const WATCHDOG_GRACE: Duration = Duration::from_millis(50);

/// Configuration for the preview sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Maximum heap size in bytes (default: 64MB, None = unlimited)
    pub max_heap_size: Option<usize>,
    /// Maximum wall time of one preview cycle in milliseconds
    /// (default: 5000ms, None = unlimited)
    pub timeout_ms: Option<u64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_heap_size: Some(64 * 1024 * 1024), // 64MB default
            timeout_ms: Some(5_000),
        }
    }
}

/// What happened while a document was loaded.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub context: ContextId,
    /// Inline scripts evaluated, in document order.
    pub scripts_run: usize,
    /// Exceptions and rejections that reached the host uncaught.
    pub uncaught_errors: usize,
    /// Library stylesheets and scripts referenced by the document. The
    /// sandbox has no network, so these are never fetched.
    pub skipped_resources: Vec<String>,
    /// Script execution was terminated at the time limit.
    pub timed_out: bool,
    /// Script execution was terminated near the heap limit.
    pub out_of_memory: bool,
    /// Timers were still pending when the cycle ended.
    pub unsettled: bool,
    /// Output of the sandbox's own console.
    pub native_console: Vec<NativeLine>,
}

impl CycleReport {
    fn new(context: ContextId, skipped_resources: Vec<String>) -> Self {
        Self {
            context,
            scripts_run: 0,
            uncaught_errors: 0,
            skipped_resources,
            timed_out: false,
            out_of_memory: false,
            unsettled: false,
            native_console: Vec::new(),
        }
    }

    /// Execution was cut short by a resource limit.
    pub fn interrupted(&self) -> bool {
        self.timed_out || self.out_of_memory
    }
}

/// Window events the host raises inside the sandbox.
#[derive(Debug, Clone, Copy)]
enum HostEvent {
    ScriptError,
    UnhandledRejection,
}

impl HostEvent {
    fn hook(self) -> &'static str {
        match self {
            HostEvent::ScriptError => "scriptError",
            HostEvent::UnhandledRejection => "unhandledRejection",
        }
    }
}

/// Flags raised when the host forcibly stops script execution.
#[derive(Debug, Clone, Default)]
struct Interrupts {
    timed_out: Arc<AtomicBool>,
    out_of_memory: Arc<AtomicBool>,
}

impl Interrupts {
    fn any(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst) || self.out_of_memory.load(Ordering::SeqCst)
    }
}

/// Terminates execution in the isolate once the time limit passes.
///
/// Runs on its own thread so a synchronous busy loop cannot starve it.
struct Watchdog {
    cancel: Option<std::sync::mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    fn arm(isolate: v8::IsolateHandle, limit: Duration, fired: Arc<AtomicBool>) -> Self {
        let (cancel, cancelled) = std::sync::mpsc::channel::<()>();
        let thread = std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(limit) {
                fired.store(true, Ordering::SeqCst);
                isolate.terminate_execution();
            }
        });
        Self {
            cancel: Some(cancel),
            thread: Some(thread),
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        drop(self.cancel.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct Embedded {
    context: ContextId,
    _runtime: JsRuntime,
}

/// Owns the embedded sandbox context and the boundary channel out of it.
pub struct SandboxHost {
    config: SandboxConfig,
    outbox: UnboundedSender<Envelope>,
    embedded: Option<Embedded>,
}

impl SandboxHost {
    /// Create a host and the receiving end of its boundary channel.
    pub fn new(config: SandboxConfig) -> (Self, UnboundedReceiver<Envelope>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let host = Self {
            config,
            outbox,
            embedded: None,
        };
        (host, inbox)
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Sender for boundary messages; anything with a channel handle can post.
    pub fn outbox(&self) -> UnboundedSender<Envelope> {
        self.outbox.clone()
    }

    /// Context of the currently embedded document, if any.
    pub fn current_context(&self) -> Option<ContextId> {
        self.embedded.as_ref().map(|embedded| embedded.context)
    }

    /// Discard the embedded context.
    pub fn unload(&mut self) {
        self.embedded = None;
    }

    /// Replace the embedded context with `document`, running it to completion
    /// or until a resource limit stops it.
    pub async fn load(
        &mut self,
        context: ContextId,
        document: &SyntheticDocument,
    ) -> Result<CycleReport, Error> {
        // The old isolate must go before a new one is created on this thread
        self.unload();

        let interrupts = Interrupts::default();
        let mut runtime = create_runtime(
            &self.config,
            SandboxPort {
                context,
                outbox: self.outbox.clone(),
            },
            &interrupts,
        );

        let limit = self.config.timeout_ms.map(Duration::from_millis);
        let deadline = limit.map(|limit| tokio::time::Instant::now() + limit);
        let watchdog = limit.map(|limit| {
            Watchdog::arm(
                runtime.v8_isolate().thread_safe_handle(),
                limit + WATCHDOG_GRACE,
                interrupts.timed_out.clone(),
            )
        });

        let skipped = document.external_resources();
        for href in &skipped {
            tracing::debug!(%context, href = %href, "External resource not loaded in sandbox");
        }
        let mut report = CycleReport::new(context, skipped);

        for script in document.inline_scripts() {
            let outcome = runtime.execute_script("<preview>", script.to_string());
            if interrupts.any() {
                break;
            }
            report.scripts_run += 1;
            if let Err(err) = outcome {
                report.uncaught_errors += 1;
                dispatch_host_event(&mut runtime, HostEvent::ScriptError, &exception_message(&err));
            }
        }

        if !interrupts.any() {
            settle(&mut runtime, deadline, &interrupts, &mut report).await;
        }
        drop(watchdog);

        report.timed_out = interrupts.timed_out.load(Ordering::SeqCst);
        report.out_of_memory = interrupts.out_of_memory.load(Ordering::SeqCst);
        report.native_console = runtime
            .op_state()
            .borrow()
            .try_borrow::<NativeConsole>()
            .map(|console| console.lines.clone())
            .unwrap_or_default();

        if report.interrupted() {
            tracing::warn!(
                %context,
                timed_out = report.timed_out,
                out_of_memory = report.out_of_memory,
                "Preview execution was terminated"
            );
        }

        self.embedded = Some(Embedded {
            context,
            _runtime: runtime,
        });
        Ok(report)
    }
}

/// Create a sandboxed JS runtime for one preview cycle
fn create_runtime(config: &SandboxConfig, port: SandboxPort, interrupts: &Interrupts) -> JsRuntime {
    // Configure V8 heap limits if specified
    let create_params = config
        .max_heap_size
        .map(|max_bytes| v8::Isolate::create_params().heap_limits(0, max_bytes));

    let mut runtime = JsRuntime::new(RuntimeOptions {
        module_loader: Some(Rc::new(PreviewLoader)),
        extensions: vec![preview_host::init_ops_and_esm()],
        create_params,
        ..Default::default()
    });

    if config.max_heap_size.is_some() {
        let isolate = runtime.v8_isolate().thread_safe_handle();
        let exhausted = interrupts.out_of_memory.clone();
        runtime.add_near_heap_limit_callback(move |current, initial| {
            tracing::warn!(
                current_mb = current / (1024 * 1024),
                initial_mb = initial / (1024 * 1024),
                "Preview near heap limit, terminating"
            );
            exhausted.store(true, Ordering::SeqCst);
            isolate.terminate_execution();
            // Headroom for the termination to unwind
            current * 2
        });
    }

    {
        let state = runtime.op_state();
        let mut state = state.borrow_mut();
        state.put(NativeConsole::default());
        state.put(port);
    }

    runtime
}

/// Drive timers and promises until the loop is idle or the deadline passes.
async fn settle(
    runtime: &mut JsRuntime,
    deadline: Option<tokio::time::Instant>,
    interrupts: &Interrupts,
    report: &mut CycleReport,
) {
    for _ in 0..MAX_EVENT_LOOP_RESTARTS {
        let polled = match deadline {
            Some(deadline) => {
                let event_loop = runtime.run_event_loop(PollEventLoopOptions::default());
                match tokio::time::timeout_at(deadline, event_loop).await {
                    Ok(result) => result,
                    Err(_) => {
                        report.unsettled = true;
                        tracing::debug!(context = %report.context, "Preview still had pending work at the deadline");
                        return;
                    }
                }
            }
            None => runtime.run_event_loop(PollEventLoopOptions::default()).await,
        };

        match polled {
            Ok(()) => return,
            Err(_) if interrupts.any() => return,
            Err(err) => {
                // A rejection nobody handled; surface it in the sandbox and keep polling
                report.uncaught_errors += 1;
                dispatch_host_event(runtime, HostEvent::UnhandledRejection, &exception_message(&err));
            }
        }
    }
    tracing::warn!(context = %report.context, "Preview event loop kept failing, giving up");
}

fn dispatch_host_event(runtime: &mut JsRuntime, event: HostEvent, message: &str) {
    let payload = serde_json::Value::from(message);
    let code = format!("globalThis.__liveMarkupHost.{}({})", event.hook(), payload);
    if let Err(err) = runtime.execute_script("<host>", code) {
        tracing::warn!(error = %err, hook = event.hook(), "Failed to raise event in sandbox");
    }
}

fn exception_message(err: &Error) -> String {
    err.downcast_ref::<deno_core::error::JsError>()
        .map(|js| js.exception_message.clone())
        .unwrap_or_else(|| err.to_string())
}
