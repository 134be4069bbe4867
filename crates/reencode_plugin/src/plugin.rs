//! The plugin facade.
//!
//! Translates JS-style calls into coordinator operations. The engine is
//! created on the first `reencodeVideo` call; if that fails, the failure is
//! reported to that caller and every later call is rejected with
//! "engine unavailable".

use std::sync::Arc;

use parking_lot::Mutex;
use reencode_core::abi::EngineApi;
use reencode_core::background::{BackgroundScheduler, ThreadScheduler};
use reencode_core::config::Settings;
use reencode_core::coordinator::{CoordinatorOptions, CoordinatorResult, EventListener, JobCoordinator};
use reencode_core::dispatch::UiContext;
use reencode_core::engine::EngineHandle;
use reencode_core::models::{ProgressEvent, PROGRESS_EVENT};
use serde_json::{json, Value};

use crate::call::PluginCall;
use crate::errors::{PluginError, PluginResult};
use crate::listeners::{Listener, ListenerHandle, ListenerRegistry};
use crate::options::parse_reencode_options;

/// Version reported by `getPluginVersion`.
pub const PLUGIN_VERSION: &str = "0.0.7";

/// Name the plugin is registered under on the JS side.
pub const JS_NAME: &str = "CapacitorFFmpeg";

pub const REENCODE_VIDEO: &str = "reencodeVideo";
pub const GET_PLUGIN_VERSION: &str = "getPluginVersion";
pub const CANCEL_REENCODE: &str = "cancelReencode";

enum EngineSlot {
    Uninitialized,
    Ready(Arc<JobCoordinator>),
    Failed,
}

pub struct ReencodePlugin {
    api: EngineApi,
    scheduler: Arc<dyn BackgroundScheduler>,
    ui: UiContext,
    options: CoordinatorOptions,
    listeners: Arc<ListenerRegistry>,
    engine: Mutex<EngineSlot>,
}

impl ReencodePlugin {
    /// Plugin backed by the bundled ffmpeg engine and a thread scheduler.
    pub fn from_settings(settings: &Settings) -> PluginResult<Self> {
        let scheduler = Arc::new(ThreadScheduler::from_budget_secs(settings.background.budget_secs));
        let ui = UiContext::new("plugin-ui").map_err(PluginError::UiContext)?;
        Ok(Self::new(
            reencode_engine::engine_api(),
            scheduler,
            ui,
            CoordinatorOptions::from_settings(settings),
        ))
    }

    pub fn new(
        api: EngineApi,
        scheduler: Arc<dyn BackgroundScheduler>,
        ui: UiContext,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            api,
            scheduler,
            ui,
            options,
            listeners: ListenerRegistry::new(),
            engine: Mutex::new(EngineSlot::Uninitialized),
        }
    }

    /// The context events and settlements are delivered on.
    pub fn ui(&self) -> &UiContext {
        &self.ui
    }

    /// Dispatch a call by method name.
    pub fn call(&self, call: PluginCall) {
        let method = call.method().to_string();
        match method.as_str() {
            REENCODE_VIDEO => self.reencode_video(call),
            GET_PLUGIN_VERSION => self.get_plugin_version(call),
            CANCEL_REENCODE => self.cancel_reencode(call),
            _ => call.reject_with(&PluginError::NotImplemented(method)),
        }
    }

    /// Start a re-encode. The call settles on the UI context once the job
    /// finishes, after its last progress event.
    pub fn reencode_video(&self, call: PluginCall) {
        let request = match parse_reencode_options(call.options()) {
            Ok(request) => request,
            Err(err) => return call.reject_with(&err),
        };
        let coordinator = match self.coordinator() {
            Ok(coordinator) => coordinator,
            Err(err) => return call.reject_with(&err),
        };

        // Shared so a refused submission can still answer the call itself
        let pending = Arc::new(Mutex::new(Some(call)));
        let on_settle = {
            let pending = Arc::clone(&pending);
            Box::new(move |outcome: CoordinatorResult<()>| {
                let Some(call) = pending.lock().take() else {
                    return;
                };
                match outcome {
                    Ok(()) => call.resolve_empty(),
                    Err(err) => call.reject_with(&PluginError::from(err)),
                }
            })
        };

        match coordinator.submit_with(request, on_settle) {
            Ok(job_id) => tracing::debug!(%job_id, "reencodeVideo accepted"),
            Err(err) => {
                if let Some(call) = pending.lock().take() {
                    call.reject_with(&PluginError::from(err));
                }
            }
        }
    }

    pub fn get_plugin_version(&self, call: PluginCall) {
        call.resolve(json!({ "version": PLUGIN_VERSION }));
    }

    /// Ask the running job to stop. Resolves with `{"cancelled": bool}`,
    /// false when nothing was running.
    pub fn cancel_reencode(&self, call: PluginCall) {
        let cancelled = match &*self.engine.lock() {
            EngineSlot::Ready(coordinator) => coordinator.cancel(),
            _ => false,
        };
        call.resolve(json!({ "cancelled": cancelled }));
    }

    /// Register a listener for `event`. Only `"progress"` is emitted.
    pub fn add_listener(&self, event: &str, listener: Listener) -> PluginResult<ListenerHandle> {
        if event != PROGRESS_EVENT {
            return Err(PluginError::UnknownEvent(event.to_string()));
        }
        Ok(self.listeners.add(event, listener))
    }

    pub fn remove_all_listeners(&self) {
        self.listeners.remove_all();
    }

    /// Whether a job is registered or running.
    pub fn is_busy(&self) -> bool {
        match &*self.engine.lock() {
            EngineSlot::Ready(coordinator) => coordinator.is_busy(),
            _ => false,
        }
    }

    fn coordinator(&self) -> PluginResult<Arc<JobCoordinator>> {
        let mut slot = self.engine.lock();
        match &*slot {
            EngineSlot::Ready(coordinator) => return Ok(Arc::clone(coordinator)),
            EngineSlot::Failed => return Err(PluginError::EngineUnavailable),
            EngineSlot::Uninitialized => {}
        }

        match EngineHandle::initialize(self.api) {
            Ok(engine) => {
                let coordinator = Arc::new(JobCoordinator::new(
                    engine,
                    Arc::clone(&self.scheduler),
                    self.ui.clone(),
                    self.event_listener(),
                    self.options.clone(),
                ));
                tracing::info!("Engine ready");
                *slot = EngineSlot::Ready(Arc::clone(&coordinator));
                Ok(coordinator)
            }
            Err(err) => {
                tracing::error!("Engine initialization failed: {}", err);
                *slot = EngineSlot::Failed;
                Err(PluginError::Initialization(err))
            }
        }
    }

    fn event_listener(&self) -> EventListener {
        let listeners = Arc::clone(&self.listeners);
        Arc::new(move |event: &ProgressEvent| match serde_json::to_value(event) {
            Ok(data) => listeners.notify(PROGRESS_EVENT, &data),
            Err(err) => tracing::warn!("Cannot serialize progress event: {}", err),
        })
    }
}

/// Build a call and dispatch it; convenience for hosts passing raw JSON.
pub fn invoke(plugin: &ReencodePlugin, method: &str, options: Value) -> crate::call::CallHandle {
    let (call, handle) = PluginCall::new(method, options);
    plugin.call(call);
    handle
}
