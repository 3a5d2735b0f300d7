//! Accepts or rejects a `StatSummary` request and normalizes it into the
//! form the Planner and Topology View consume (spec §4.4).

use crate::error::CoreError;
use crate::resource::{Kind, ResourceId};
use crate::wire;

/// The scope peer of a validated request, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    None,
    From(ResourceId),
    To(ResourceId),
}

impl Scope {
    pub fn peer(&self) -> Option<&ResourceId> {
        match self {
            Scope::None => None,
            Scope::From(r) | Scope::To(r) => Some(r),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub selector: ResourceId,
    pub time_window: String,
    pub scope: Scope,
}

fn canonicalize_resource(wire: &wire::WireResource) -> Result<ResourceId, CoreError> {
    let kind = Kind::canonicalize(&wire.kind)?;
    Ok(ResourceId::new(kind, wire.namespace.clone(), wire.name.clone()))
}

/// Normalize the time window, defaulting to `default_window` when the
/// request omits one and rejecting anything that doesn't parse as a
/// positive duration (spec §4.4 rule 3).
fn normalize_time_window(raw: &str, default_window: &str) -> Result<String, CoreError> {
    if raw.is_empty() {
        return Ok(default_window.to_string());
    }
    match humantime::parse_duration(raw) {
        Ok(d) if !d.is_zero() => Ok(raw.to_string()),
        Ok(_) => Err(CoreError::InvalidTimeWindow(format!(
            "time window must be positive: {raw}"
        ))),
        Err(_) => Err(CoreError::InvalidTimeWindow(format!(
            "could not parse time window: {raw}"
        ))),
    }
}

/// Validate and normalize a wire request per spec §4.4. `default_window`
/// is substituted for an omitted `time_window` (`Config::default_time_window`).
pub fn validate(
    req: &wire::StatSummaryRequest,
    default_window: &str,
) -> Result<ValidatedRequest, CoreError> {
    let selector_wire = req
        .selector
        .as_ref()
        .map(|s| &s.resource)
        .ok_or_else(|| CoreError::InvalidScope("missing selector".to_string()))?;

    // Kind canonicalization happens first and unconditionally: an unknown
    // kind anywhere in the request is a protocol violation, independent
    // of whatever else is wrong with the request.
    let selector = canonicalize_resource(selector_wire)?;
    let to_peer = req.to_resource.as_ref().map(canonicalize_resource).transpose()?;
    let from_peer = req
        .from_resource
        .as_ref()
        .map(canonicalize_resource)
        .transpose()?;

    if to_peer.is_some() && from_peer.is_some() {
        return Err(CoreError::InvalidScope(
            "toResource and fromResource are mutually exclusive".to_string(),
        ));
    }

    // Service may appear only as a destination, never as a source (spec
    // rule 2). A bare `service` selector with no scope is fine, but a
    // service selector is never valid once a scope peer is present.
    if let Some(peer) = &from_peer {
        if peer.kind == Kind::Service {
            return Err(CoreError::InvalidScope(
                "service cannot be used as fromResource: services do not originate traffic"
                    .to_string(),
            ));
        }
    }

    if selector.kind == Kind::Service && (to_peer.is_some() || from_peer.is_some()) {
        return Err(CoreError::InvalidScope(
            "service selector cannot be scoped by fromResource or toResource".to_string(),
        ));
    }

    let scope = match (to_peer, from_peer) {
        (Some(to), None) => Scope::To(to),
        (None, Some(from)) => Scope::From(from),
        (None, None) => Scope::None,
        (Some(_), Some(_)) => unreachable!("checked above"),
    };

    let time_window = normalize_time_window(&req.time_window, default_window)?;

    Ok(ValidatedRequest {
        selector,
        time_window,
        scope,
    })
}
