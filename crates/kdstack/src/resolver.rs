use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::frame::{FrameDescriptor, MethodId};
use crate::wire::SEPARATOR;

/// Substituted for any frame the resolver cannot name.
pub const FALLBACK_FRAME_NAME: &str = "[unknown]";

/// Written in place of `SEPARATOR` inside resolved names.
pub const SEPARATOR_REPLACEMENT: &str = "_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("no name registered for method {0:?}")]
    UnknownMethod(MethodId),
    #[error("resolver unavailable: {0}")]
    Unavailable(String),
}

/// Maps frame descriptors to human-readable names.
///
/// Only ever called from the drain path, so implementations may allocate,
/// take locks or cache internally.
///
/// The wire format has no escaping: `name_or_fallback` replaces any
/// `SEPARATOR` in a returned name with `SEPARATOR_REPLACEMENT`.
pub trait FrameResolver: Send + Sync {
    fn name(&self, frame: &FrameDescriptor) -> Result<String, ResolveError>;
}

/// Resolves a frame, falling back to `FALLBACK_FRAME_NAME` so that one bad
/// frame never drops the rest of the sample.
pub fn name_or_fallback(resolver: &dyn FrameResolver, frame: &FrameDescriptor) -> String {
    match resolver.name(frame) {
        Ok(name) if name.contains(SEPARATOR) => name.replace(SEPARATOR, SEPARATOR_REPLACEMENT),
        Ok(name) => name,
        Err(err) => {
            log::debug!("Failed to resolve frame {:?}: {}", frame, err);
            FALLBACK_FRAME_NAME.to_owned()
        }
    }
}

/// A resolver backed by a table of registered method names.
///
/// Registration may happen from any thread while the drain thread resolves.
#[derive(Debug, Default)]
pub struct MethodTable {
    names: RwLock<HashMap<MethodId, String>>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, method_id: MethodId, name: impl Into<String>) {
        match self.names.write() {
            Ok(mut names) => {
                names.insert(method_id, name.into());
            }
            Err(_) => {
                log::warn!("register: Method table lock poisoned. Dropping {:?}.", method_id);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.names.read().map_or(0, |names| names.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FrameResolver for MethodTable {
    fn name(&self, frame: &FrameDescriptor) -> Result<String, ResolveError> {
        let names = self
            .names
            .read()
            .map_err(|_| ResolveError::Unavailable("method table lock poisoned".to_owned()))?;
        names
            .get(&frame.method_id)
            .cloned()
            .ok_or(ResolveError::UnknownMethod(frame.method_id))
    }
}

impl<F> FrameResolver for F
where
    F: Fn(&FrameDescriptor) -> Result<String, ResolveError> + Send + Sync,
{
    fn name(&self, frame: &FrameDescriptor) -> Result<String, ResolveError> {
        self(frame)
    }
}
