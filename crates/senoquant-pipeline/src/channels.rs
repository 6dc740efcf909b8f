//! Channel resolution: bind raw planes to senescent / quiescent / nuclear
//! roles.
//!
//! Two modes are supported. [`ChannelMode::Indices`] takes fixed plane
//! positions. [`ChannelMode::Names`] matches per-channel metadata names
//! against an alias set for each role.
//!
//! Name matching runs in two phases: every channel is scanned and
//! matched first, and only after the full scan is a single fallback
//! decision made. When any role is left unresolved the default order
//! (senescent 0, quiescent 1, nuclear 2) is used for *all* roles and a
//! [`ResolutionWarning`] is returned so the caller can surface it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ChannelTriple, PipelineError, Plane, Role};

/// Number of channels every image must provide.
pub const CHANNEL_COUNT: usize = 3;

/// Fixed plane index for each role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelIndices {
    /// Plane index of the senescence marker.
    pub senescent: usize,
    /// Plane index of the quiescence marker.
    pub quiescent: usize,
    /// Plane index of the nuclear stain.
    pub nuclear: usize,
}

impl ChannelIndices {
    /// Index assigned to `role`.
    #[must_use]
    pub const fn get(&self, role: Role) -> usize {
        match role {
            Role::Senescent => self.senescent,
            Role::Quiescent => self.quiescent,
            Role::Nuclear => self.nuclear,
        }
    }
}

impl Default for ChannelIndices {
    fn default() -> Self {
        Self {
            senescent: Role::Senescent.index(),
            quiescent: Role::Quiescent.index(),
            nuclear: Role::Nuclear.index(),
        }
    }
}

/// Channel-name aliases for each role.
///
/// Aliases are compared after [`normalize_name`], so `"  DAPI "` and
/// `"dapi"` are equivalent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelAliases {
    /// Names identifying the senescence marker.
    pub senescent: Vec<String>,
    /// Names identifying the quiescence marker.
    pub quiescent: Vec<String>,
    /// Names identifying the nuclear stain.
    pub nuclear: Vec<String>,
}

impl ChannelAliases {
    /// Aliases configured for `role`.
    #[must_use]
    pub fn get(&self, role: Role) -> &[String] {
        match role {
            Role::Senescent => &self.senescent,
            Role::Quiescent => &self.quiescent,
            Role::Nuclear => &self.nuclear,
        }
    }

    /// Whether an already-normalized channel name is an alias of `role`.
    #[must_use]
    pub fn matches(&self, role: Role, normalized: &str) -> bool {
        self.get(role)
            .iter()
            .any(|alias| normalize_name(alias) == normalized)
    }
}

impl Default for ChannelAliases {
    fn default() -> Self {
        let owned = |names: &[&str]| names.iter().map(ToString::to_string).collect();
        Self {
            senescent: owned(&["red", "mcherry", "rfp", "tritc", "cy3", "texas red"]),
            quiescent: owned(&["green", "gfp", "egfp", "fitc", "alexa 488"]),
            nuclear: owned(&["blue", "dapi", "hoechst", "hoechst 33342"]),
        }
    }
}

/// How channel roles are determined for each image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChannelMode {
    /// Fixed plane positions.
    Indices(ChannelIndices),
    /// Match channel metadata names against aliases.
    Names(ChannelAliases),
}

impl Default for ChannelMode {
    fn default() -> Self {
        Self::Indices(ChannelIndices::default())
    }
}

impl ChannelMode {
    /// Bind `planes` to roles according to this mode.
    ///
    /// `names` holds one metadata name per plane (missing entries are
    /// treated as unmatched). It is ignored in index mode.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidChannels`] if the plane count is
    /// not three or the indices are out of range or repeated, and
    /// [`PipelineError::DimensionMismatch`] if the planes differ in size.
    pub fn resolve(&self, planes: Vec<Plane>, names: &[String]) -> Result<Resolved, PipelineError> {
        match self {
            Self::Indices(indices) => Ok(Resolved {
                triple: resolve_by_index(planes, *indices)?,
                warning: None,
            }),
            Self::Names(aliases) => resolve_by_name(planes, names, aliases),
        }
    }
}

/// Raised when name matching left a role unresolved and the default
/// order was applied instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionWarning {
    /// Roles that no channel name matched.
    pub unresolved: Vec<Role>,
    /// The normalized names that were scanned.
    pub names: Vec<String>,
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let roles: Vec<String> = self.unresolved.iter().map(ToString::to_string).collect();
        write!(
            f,
            "could not match channel names {:?} for role(s) {}; using default order \
             (senescent=0, quiescent=1, nuclear=2)",
            self.names,
            roles.join(", "),
        )
    }
}

/// A resolved channel triple plus any fallback warning.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// Planes bound to roles.
    pub triple: ChannelTriple,
    /// Present when the default order was applied.
    pub warning: Option<ResolutionWarning>,
}

/// Normalize a channel name: trim, collapse internal whitespace, and
/// lowercase.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Bind planes to roles by fixed index.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidChannels`] if there are not exactly
/// three planes or the indices are out of range or repeated.
pub fn resolve_by_index(
    planes: Vec<Plane>,
    indices: ChannelIndices,
) -> Result<ChannelTriple, PipelineError> {
    let planes = exactly_three(planes)?;

    let picked = Role::ALL.map(|role| indices.get(role));
    for (i, &index) in picked.iter().enumerate() {
        if index >= CHANNEL_COUNT {
            return Err(PipelineError::InvalidChannels(format!(
                "{} channel index {index} is out of range 0..{CHANNEL_COUNT}",
                Role::ALL[i],
            )));
        }
        if picked[..i].contains(&index) {
            return Err(PipelineError::InvalidChannels(format!(
                "channel index {index} is assigned to more than one role",
            )));
        }
    }

    let mut slots = planes.map(Some);
    let mut take = |role: Role| {
        slots[indices.get(role)].take().ok_or_else(|| {
            PipelineError::InvalidChannels(format!("{role} channel was already taken"))
        })
    };
    let senescent = take(Role::Senescent)?;
    let quiescent = take(Role::Quiescent)?;
    let nuclear = take(Role::Nuclear)?;
    ChannelTriple::new(senescent, quiescent, nuclear)
}

/// Bind planes to roles by matching channel names against aliases.
///
/// When any role is unmatched, every role falls back to the default
/// order and the returned [`Resolved::warning`] says why; nothing is
/// logged here.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidChannels`] if there are not exactly
/// three planes, and [`PipelineError::DimensionMismatch`] if they differ
/// in size.
pub fn resolve_by_name(
    planes: Vec<Plane>,
    names: &[String],
    aliases: &ChannelAliases,
) -> Result<Resolved, PipelineError> {
    let normalized: Vec<String> = names
        .iter()
        .take(planes.len())
        .map(|n| normalize_name(n))
        .collect();

    // Phase 1: scan every channel; first matching unclaimed role wins.
    let mut matched: [Option<usize>; CHANNEL_COUNT] = [None; CHANNEL_COUNT];
    for (channel, name) in normalized.iter().enumerate() {
        let role = Role::ALL
            .into_iter()
            .find(|&role| matched[role.index()].is_none() && aliases.matches(role, name));
        if let Some(role) = role {
            matched[role.index()] = Some(channel);
        }
    }

    // Phase 2: one fallback decision for the whole image.
    let unresolved: Vec<Role> = Role::ALL
        .into_iter()
        .filter(|role| matched[role.index()].is_none())
        .collect();

    if let [Some(senescent), Some(quiescent), Some(nuclear)] = matched {
        let indices = ChannelIndices {
            senescent,
            quiescent,
            nuclear,
        };
        tracing::debug!(?indices, "resolved channels by name");
        return Ok(Resolved {
            triple: resolve_by_index(planes, indices)?,
            warning: None,
        });
    }

    let warning = ResolutionWarning {
        unresolved,
        names: normalized,
    };
    Ok(Resolved {
        triple: resolve_by_index(planes, ChannelIndices::default())?,
        warning: Some(warning),
    })
}

/// Require exactly three planes.
fn exactly_three(planes: Vec<Plane>) -> Result<[Plane; CHANNEL_COUNT], PipelineError> {
    <[Plane; CHANNEL_COUNT]>::try_from(planes).map_err(|planes| {
        PipelineError::InvalidChannels(format!(
            "expected {CHANNEL_COUNT} channels, found {}",
            planes.len(),
        ))
    })
}
