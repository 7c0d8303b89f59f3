//! Child-side re-entry
//!
//! A host binary launched by the supervisor finds the re-entry variables in
//! its environment, runs exactly one registered exit-test body, and exits.
//! Everything the body records goes to the back channel file, never to
//! stdout or stderr.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::OpenOptions;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Configuration;
use crate::error::{is_control_flow, ExitTestError};
use crate::events::{abi, fallback};
use crate::executor::TestContext;
use crate::models::Issue;

use super::{CapturedValues, ExitTestId, ABI_VERSION_VAR, BACKCHANNEL_VAR, CAPTURES_VAR, ID_VAR};

/// Body of an exit test, given the values its caller captured
pub type ExitTestBody = Arc<dyn Fn(CapturedValues) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Exit-test bodies a host binary can run when re-entered
#[derive(Clone, Default)]
pub struct ExitTestRegistry {
    bodies: BTreeMap<ExitTestId, ExitTestBody>,
}

impl ExitTestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `body` under `id`; a later registration replaces an earlier one
    pub fn with<F, Fut>(mut self, id: impl Into<ExitTestId>, body: F) -> Self
    where
        F: Fn(CapturedValues) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let body: ExitTestBody = Arc::new(move |captures| body(captures).boxed());
        self.bodies.insert(id.into(), body);
        self
    }

    pub fn get(&self, id: &ExitTestId) -> Option<&ExitTestBody> {
        self.bodies.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &ExitTestId> {
        self.bodies.keys()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }
}

impl fmt::Debug for ExitTestRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.bodies.keys()).finish()
    }
}

/// Instructions a re-entered child received from its parent
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReentryRequest {
    pub id: ExitTestId,
    pub captures_path: PathBuf,
    pub backchannel_path: PathBuf,
    pub abi_version: u32,
}

impl ReentryRequest {
    /// The request in this process's environment, if it was launched as a child
    pub fn from_env() -> Option<Self> {
        let id = std::env::var(ID_VAR).ok().filter(|id| !id.is_empty())?;
        Some(Self {
            id: ExitTestId::new(id),
            captures_path: std::env::var_os(CAPTURES_VAR).map(PathBuf::from).unwrap_or_default(),
            backchannel_path: std::env::var_os(BACKCHANNEL_VAR).map(PathBuf::from).unwrap_or_default(),
            abi_version: std::env::var(ABI_VERSION_VAR)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(abi::CURRENT_VERSION),
        })
    }

    /// Run the requested body and return the process exit code.
    ///
    /// A body that returns normally exits 0, one that fails exits 1. Panics
    /// and explicit exits inside the body end the process on their own.
    pub async fn run(self, registry: &ExitTestRegistry) -> i32 {
        let backchannel = match OpenOptions::new().append(true).create(true).open(&self.backchannel_path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("exit test {}: cannot open back channel: {e}", self.id);
                return 1;
            }
        };
        let handler = match abi::abi_handler(backchannel, self.abi_version) {
            Ok(handler) => handler,
            Err(e) => {
                eprintln!("exit test {}: {e}", self.id);
                return 1;
            }
        };
        fallback::install(handler.clone());

        let context = Arc::new(TestContext::detached(
            Configuration::new().with_event_handler(handler),
        ));

        let body = match self.body(registry) {
            Ok(body) => body,
            Err(e) => {
                context.record(Issue::system(e.to_string()));
                return 1;
            }
        };

        match context.clone().scope(body).await {
            Ok(()) => 0,
            Err(error) => {
                if !is_control_flow(&error) {
                    context.record(Issue::error_caught(&error, None));
                }
                1
            }
        }
    }

    fn body(&self, registry: &ExitTestRegistry) -> Result<BoxFuture<'static, anyhow::Result<()>>, ExitTestError> {
        let body = registry
            .get(&self.id)
            .ok_or_else(|| ExitTestError::NotFound(self.id.to_string()))?;
        let blob = std::fs::read(&self.captures_path)?;
        let captures = CapturedValues::decode(&blob)?;
        Ok(body(captures))
    }
}
