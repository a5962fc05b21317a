//! Capability-routed request processing.
//!
//! The router knows nothing about concrete profile types. For each request
//! it walks the registered processors in registration order, asks each one
//! whether it can serve the target, and hands the request to the first that
//! says yes. Later processors are never consulted once one matched.
//!
//! Processors written against a concrete profile implement
//! [`TypedProcessor`] and are registered through [`ProfileProcessor`], which
//! checks the target's profile kind before exposing the typed view.

use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::capability::{downcast_profile, CapabilityRegistry, Profile, ProfileKind, ProfileType};
use crate::error::{BusError, ProcessorError, Result};
use crate::space::{BusObject, ObjectId};

/// Request verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    Get,
    Put,
    Post,
    Patch,
    Delete,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether the verb asks for a state change.
    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Get)
    }
}

impl FromStr for Verb {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "PUT" => Ok(Self::Put),
            "POST" => Ok(Self::Post),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(BusError::NoHandler {
                verb: other.to_string(),
                path: String::new(),
                object: String::new(),
            }),
        }
    }
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound request after the web layer stripped the object prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub verb: Verb,
    pub path: Vec<String>,
    pub body: Option<serde_json::Value>,
}

impl Request {
    /// Build a request from a slash-separated path; empty segments are dropped.
    pub fn new(verb: Verb, path: &str) -> Self {
        Self {
            verb,
            path: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            body: None,
        }
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn segment(&self, index: usize) -> Option<&str> {
        self.path.get(index).map(String::as_str)
    }

    /// Whether the path is exactly `segments`.
    pub fn path_is(&self, segments: &[&str]) -> bool {
        self.path.len() == segments.len() && self.path.iter().zip(segments).all(|(a, b)| a == b)
    }

    pub fn path_str(&self) -> String {
        self.path.join("/")
    }
}

/// Resolved request target: a bus object and the profiles it carries.
#[derive(Clone)]
pub struct Target {
    object: BusObject,
    profiles: Vec<Arc<dyn Profile>>,
}

impl Target {
    pub fn new(object: BusObject, profiles: Vec<Arc<dyn Profile>>) -> Self {
        Self { object, profiles }
    }

    pub fn object(&self) -> &BusObject {
        &self.object
    }

    pub fn profiles(&self) -> &[Arc<dyn Profile>] {
        &self.profiles
    }

    pub fn has_kind(&self, kind: &ProfileKind) -> bool {
        self.profiles.iter().any(|p| &p.kind() == kind)
    }

    /// Typed views of every profile of kind `P::KIND`, in attachment order.
    pub fn typed<P: ProfileType>(&self) -> impl Iterator<Item = Arc<P>> + '_ {
        self.profiles.iter().filter_map(downcast_profile::<P>)
    }
}

/// Successful routing outcome.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    /// Name of the processor that served the request.
    pub processor: String,
    pub body: serde_json::Value,
}

/// Untyped request processor.
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    fn name(&self) -> &str;

    /// Capability this processor serves, for listings.
    fn profile_kind(&self) -> ProfileKind;

    /// Cheap, side-effect-free probe. Must check the target's capability
    /// before looking at anything else.
    fn can_process(&self, request: &Request, target: &Target) -> bool;

    async fn process(
        &self,
        request: &Request,
        target: &Target,
    ) -> std::result::Result<serde_json::Value, ProcessorError>;
}

/// Processor written against a concrete profile type.
#[async_trait]
pub trait TypedProcessor: Send + Sync + 'static {
    type Profile: ProfileType;

    fn name(&self) -> &str;

    fn can_process_typed(&self, request: &Request, profile: &Self::Profile) -> bool;

    async fn process_typed(
        &self,
        request: &Request,
        profile: Arc<Self::Profile>,
    ) -> std::result::Result<serde_json::Value, ProcessorError>;
}

/// Adapts a [`TypedProcessor`] to the untyped router.
pub struct ProfileProcessor<T> {
    inner: T,
}

impl<T: TypedProcessor> ProfileProcessor<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    fn select(&self, request: &Request, target: &Target) -> Option<Arc<T::Profile>> {
        target
            .typed::<T::Profile>()
            .find(|profile| self.inner.can_process_typed(request, profile))
    }
}

#[async_trait]
impl<T: TypedProcessor> RequestProcessor for ProfileProcessor<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn profile_kind(&self) -> ProfileKind {
        <T::Profile as ProfileType>::KIND
    }

    fn can_process(&self, request: &Request, target: &Target) -> bool {
        target.has_kind(&<T::Profile as ProfileType>::KIND) && self.select(request, target).is_some()
    }

    async fn process(
        &self,
        request: &Request,
        target: &Target,
    ) -> std::result::Result<serde_json::Value, ProcessorError> {
        let profile = self.select(request, target).ok_or_else(|| {
            ProcessorError::internal(format!(
                "target '{}' no longer offers {}",
                target.object().id,
                <T::Profile as ProfileType>::KIND
            ))
        })?;
        self.inner.process_typed(request, profile).await
    }
}

/// Registration listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessorInfo {
    pub position: usize,
    pub name: String,
    pub profile_kind: ProfileKind,
}

pub struct RequestRouter {
    registry: Arc<CapabilityRegistry>,
    processors: RwLock<Vec<Arc<dyn RequestProcessor>>>,
}

impl RequestRouter {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            processors: RwLock::new(Vec::new()),
        }
    }

    /// Append a processor. Earlier registrations take priority.
    pub fn register(&self, processor: Arc<dyn RequestProcessor>) {
        tracing::debug!(processor = %processor.name(), kind = %processor.profile_kind(), "Processor registered");
        self.processors.write().push(processor);
    }

    pub fn register_typed<T: TypedProcessor>(&self, processor: T) {
        self.register(Arc::new(ProfileProcessor::new(processor)));
    }

    pub fn len(&self) -> usize {
        self.processors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registrations in consideration order.
    pub fn describe(&self) -> Vec<ProcessorInfo> {
        self.processors
            .read()
            .iter()
            .enumerate()
            .map(|(position, p)| ProcessorInfo {
                position,
                name: p.name().to_string(),
                profile_kind: p.profile_kind(),
            })
            .collect()
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn resolve_target(&self, object_id: &ObjectId) -> Result<Target> {
        let (object, profiles) = self
            .registry
            .lookup(object_id)
            .ok_or_else(|| BusError::ObjectNotFound(object_id.to_string()))?;
        Ok(Target::new(object, profiles))
    }

    /// Resolve `object_id` through the registry and route the request to it.
    pub async fn route(&self, request: &Request, object_id: &ObjectId) -> Result<Response> {
        let target = self.resolve_target(object_id)?;
        self.dispatch(request, &target).await
    }

    /// First-match-wins dispatch against an already resolved target.
    ///
    /// Processor failures, including panics, come back as
    /// [`BusError::ProcessorFailure`]; the router itself stays usable.
    pub async fn dispatch(&self, request: &Request, target: &Target) -> Result<Response> {
        // Snapshot so no lock is held across a processor's await points.
        let processors: Vec<Arc<dyn RequestProcessor>> = self.processors.read().clone();

        for processor in processors {
            let probe =
                std::panic::catch_unwind(AssertUnwindSafe(|| processor.can_process(request, target)));
            match probe {
                Ok(true) => {}
                Ok(false) => continue,
                Err(panic) => {
                    tracing::warn!(
                        processor = %processor.name(),
                        reason = %panic_message(panic.as_ref()),
                        "Processor probe panicked; treating as no match"
                    );
                    continue;
                }
            }

            let name = processor.name().to_string();
            tracing::debug!(
                processor = %name,
                verb = %request.verb,
                path = %request.path_str(),
                object = %target.object().id,
                "Routing request"
            );

            let outcome = AssertUnwindSafe(processor.process(request, target))
                .catch_unwind()
                .await;

            return match outcome {
                Ok(Ok(body)) => Ok(Response {
                    processor: name,
                    body,
                }),
                Ok(Err(source)) => {
                    tracing::warn!(processor = %name, error = %source, "Processor failed");
                    Err(BusError::ProcessorFailure {
                        processor: name,
                        source,
                    })
                }
                Err(panic) => {
                    let reason = panic_message(panic.as_ref());
                    tracing::error!(processor = %name, reason = %reason, "Processor panicked");
                    Err(BusError::ProcessorFailure {
                        processor: name,
                        source: ProcessorError::internal(format!("processor panicked: {}", reason)),
                    })
                }
            };
        }

        Err(BusError::NoHandler {
            verb: request.verb.to_string(),
            path: request.path_str(),
            object: target.object().id.to_string(),
        })
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
