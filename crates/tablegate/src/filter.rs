//! The pre-processing filter chain.
//!
//! Filters run between session attach and packet dispatch, in the exact
//! order configuration lists them. Each filter is one implementation of a
//! single capability — [`Filter::apply`] — polymorphic over three outcomes:
//!
//! - **Continue**: the filter may have annotated the shared request
//!   context; the chain moves on, and ultimately so does default dispatch.
//! - **Abort**: the chain stops and the pipeline writes an error response
//!   (same framing as a packet-logic failure); game logic never runs.
//! - **Finish**: the filter wrote its own response; nothing else runs —
//!   no later filters, no default dispatch, no extra response bytes.
//!
//! Filters observe and mutate one shared [`DispatchContext`]; there is no
//! per-filter request wrapping.

use std::collections::HashMap;

use tablegate_protocol::Packet;

use crate::request::{QueryArgs, ResponseTransport, write_response};

// ---------------------------------------------------------------------------
// DispatchContext
// ---------------------------------------------------------------------------

/// The mutable view of a request that filters operate on.
pub struct DispatchContext<'a> {
    /// The parsed inbound packet.
    pub packet: &'a Packet,
    /// The request's query arguments.
    pub args: &'a QueryArgs,
    /// Free-form annotations; later filters and post-dispatch inspection
    /// see what earlier filters wrote here.
    pub annotations: &'a mut HashMap<String, String>,
    pub(crate) transport: &'a dyn ResponseTransport,
    pub(crate) head_written: &'a mut bool,
}

impl DispatchContext<'_> {
    /// Adds an annotation to the request.
    pub fn annotate(&mut self, key: &str, value: &str) {
        self.annotations.insert(key.to_string(), value.to_string());
    }

    /// Reads an annotation left by an earlier filter.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    /// Writes a complete response on behalf of the request. A filter that
    /// calls this must return [`FilterOutcome::Finish`] so the pipeline
    /// writes nothing further.
    pub fn finish_with(&mut self, content_type: &str, body: &str) {
        write_response(self.transport, self.head_written, content_type, body);
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// How a filter left the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Keep going: next filter, then default dispatch.
    Continue,
    /// Stop; the pipeline writes an error response with this text.
    Abort(String),
    /// Stop; the filter already wrote the response itself.
    Finish,
}

/// A configured pre-processing interceptor.
pub trait Filter: Send + Sync + 'static {
    /// Inspects (and possibly completes) the request before dispatch.
    fn apply(&self, ctx: &mut DispatchContext<'_>) -> FilterOutcome;
}

/// The built-in pass-through filter; useful as a chain placeholder and in
/// tests.
pub struct NullFilter;

impl Filter for NullFilter {
    fn apply(&self, _ctx: &mut DispatchContext<'_>) -> FilterOutcome {
        FilterOutcome::Continue
    }
}

// ---------------------------------------------------------------------------
// FilterChain
// ---------------------------------------------------------------------------

/// An ordered list of filters, applied first-to-last with short-circuit.
pub struct FilterChain {
    filters: Vec<(String, Box<dyn Filter>)>,
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field(
                "filters",
                &self.filters.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl FilterChain {
    /// A chain with no filters (every request passes straight through).
    pub fn empty() -> Self {
        Self { filters: Vec::new() }
    }

    /// Builds a chain from the configured identifier list.
    ///
    /// # Errors
    /// [`FilterError::Unknown`] for an identifier the registry can't
    /// resolve — a misconfigured chain fails at construction, not at
    /// request time.
    pub fn from_config(
        names: &[String],
        registry: &FilterRegistry,
    ) -> Result<Self, FilterError> {
        let mut chain = Self::empty();
        for name in names {
            let filter = registry
                .build(name)
                .ok_or_else(|| FilterError::Unknown(name.clone()))?;
            chain.filters.push((name.clone(), filter));
        }
        Ok(chain)
    }

    /// Appends a filter to the end of the chain.
    pub fn push(&mut self, name: &str, filter: Box<dyn Filter>) {
        self.filters.push((name.to_string(), filter));
    }

    /// Runs the chain in configured order. The first filter that aborts
    /// or finishes short-circuits all later filters.
    pub fn apply(&self, ctx: &mut DispatchContext<'_>) -> FilterOutcome {
        for (name, filter) in &self.filters {
            match filter.apply(ctx) {
                FilterOutcome::Continue => {}
                outcome => {
                    tracing::debug!(
                        filter = %name,
                        ?outcome,
                        "filter short-circuited dispatch"
                    );
                    return outcome;
                }
            }
        }
        FilterOutcome::Continue
    }

    /// Number of configured filters.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Returns `true` if the chain has no filters.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

// ---------------------------------------------------------------------------
// FilterRegistry
// ---------------------------------------------------------------------------

type FilterCtor = Box<dyn Fn() -> Box<dyn Filter> + Send + Sync>;

/// Maps filter identifiers (as they appear in configuration) to
/// constructors. Embedders register their filters here before building
/// the site.
pub struct FilterRegistry {
    constructors: HashMap<String, FilterCtor>,
}

impl FilterRegistry {
    /// A registry with the built-in filters (`"null"`).
    pub fn builtin() -> Self {
        let mut registry =
            Self { constructors: HashMap::new() };
        registry.register("null", || Box::new(NullFilter));
        registry
    }

    /// Registers a filter constructor under `name`, replacing any
    /// previous registration.
    pub fn register(
        &mut self,
        name: &str,
        ctor: impl Fn() -> Box<dyn Filter> + Send + Sync + 'static,
    ) {
        self.constructors.insert(name.to_string(), Box::new(ctor));
    }

    fn build(&self, name: &str) -> Option<Box<dyn Filter>> {
        self.constructors.get(name).map(|ctor| ctor())
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Filter-chain configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// The configuration named a filter no registry entry resolves.
    #[error("unknown filter identifier: {0}")]
    Unknown(String),
}

// =========================================================================
// Tests
// =========================================================================
