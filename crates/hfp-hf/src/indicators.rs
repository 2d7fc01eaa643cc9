//! AG and HF indicator tables.
//!
//! AG indicators are announced by `+CIND: (...)` and afterwards addressed
//! only by their 1-based position in that announcement. `+CIEV: <n>,<v>`
//! updates the indicator whose ordinal equals `n`; names are used solely
//! to classify an indicator once, when the table is built.

use hfp_at_protocol::{IndicatorSpec, HF_INDICATOR_BATTERY_LEVEL, HF_INDICATOR_DRIVER_SAFETY};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{HfError, Result};

/// Classification of an AG indicator by its announced name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgIndicatorKind {
    Service,
    Call,
    CallSetup,
    CallHeld,
    Signal,
    Roam,
    Battery,
    Other,
}

impl AgIndicatorKind {
    /// Classify an announced indicator name.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "service" => AgIndicatorKind::Service,
            "call" => AgIndicatorKind::Call,
            "callsetup" | "call_setup" => AgIndicatorKind::CallSetup,
            "callheld" => AgIndicatorKind::CallHeld,
            "signal" => AgIndicatorKind::Signal,
            "roam" => AgIndicatorKind::Roam,
            "battchg" => AgIndicatorKind::Battery,
            _ => AgIndicatorKind::Other,
        }
    }

    /// Whether a change of this indicator can change the call list.
    pub fn is_call_related(&self) -> bool {
        matches!(
            self,
            AgIndicatorKind::Call | AgIndicatorKind::CallSetup | AgIndicatorKind::CallHeld
        )
    }

    /// Indicators the AG must keep reporting regardless of `AT+BIA`.
    fn is_mandatory(&self) -> bool {
        self.is_call_related()
    }
}

impl fmt::Display for AgIndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgIndicatorKind::Service => "service",
            AgIndicatorKind::Call => "call",
            AgIndicatorKind::CallSetup => "callsetup",
            AgIndicatorKind::CallHeld => "callheld",
            AgIndicatorKind::Signal => "signal",
            AgIndicatorKind::Roam => "roam",
            AgIndicatorKind::Battery => "battchg",
            AgIndicatorKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// One indicator of the AG, as announced by `+CIND: (...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgIndicator {
    pub name: String,
    pub kind: AgIndicatorKind,
    /// 1-based position in the announcement.
    pub ordinal: u8,
    pub min: i32,
    pub max: i32,
    pub value: i32,
    pub enabled: bool,
}

/// The AG indicators of one connection, in announce order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgIndicatorTable {
    indicators: Vec<AgIndicator>,
}

impl AgIndicatorTable {
    /// Build the table from a `+CIND: (...)` announcement.
    pub fn from_specs(specs: &[IndicatorSpec]) -> Self {
        let indicators = specs
            .iter()
            .zip(1u8..=u8::MAX)
            .map(|(spec, ordinal)| AgIndicator {
                name: spec.name.clone(),
                kind: AgIndicatorKind::from_name(&spec.name),
                ordinal,
                min: spec.min,
                max: spec.max,
                value: spec.min,
                enabled: true,
            })
            .collect();
        AgIndicatorTable { indicators }
    }

    pub fn len(&self) -> usize {
        self.indicators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgIndicator> {
        self.indicators.iter()
    }

    /// Look up an indicator by ordinal.
    pub fn get(&self, ordinal: u8) -> Option<&AgIndicator> {
        usize::from(ordinal)
            .checked_sub(1)
            .and_then(|i| self.indicators.get(i))
    }

    /// First indicator of the given kind.
    pub fn by_kind(&self, kind: AgIndicatorKind) -> Option<&AgIndicator> {
        self.indicators.iter().find(|i| i.kind == kind)
    }

    /// Apply a `+CIND: v1,v2,...` reply positionally. Returns the indicators
    /// that took a value, skipping values out of range.
    pub fn apply_values(&mut self, values: &[i32]) -> Vec<(AgIndicatorKind, i32)> {
        let mut applied = Vec::new();
        for (indicator, &value) in self.indicators.iter_mut().zip(values) {
            if value < indicator.min || value > indicator.max {
                tracing::debug!(
                    "AgIndicatorTable: {} value {} out of range {}-{}",
                    indicator.name,
                    value,
                    indicator.min,
                    indicator.max
                );
                continue;
            }
            indicator.value = value;
            applied.push((indicator.kind, value));
        }
        applied
    }

    /// Apply a `+CIEV: <ordinal>,<value>` update. Returns `None` when the
    /// ordinal is not in the table or the value is out of range.
    pub fn update(&mut self, ordinal: u8, value: i32) -> Option<(AgIndicatorKind, i32)> {
        let index = usize::from(ordinal).checked_sub(1)?;
        let indicator = self.indicators.get_mut(index)?;
        if value < indicator.min || value > indicator.max {
            return None;
        }
        indicator.value = value;
        Some((indicator.kind, value))
    }

    /// `AT+BIA` activation flags, in announce order. Call indicators stay
    /// active whatever the preference says.
    pub fn activation_mask(&mut self, deactivated: &[String]) -> Vec<bool> {
        for indicator in self.indicators.iter_mut() {
            indicator.enabled = indicator.kind.is_mandatory()
                || !deactivated
                    .iter()
                    .any(|name| name.eq_ignore_ascii_case(&indicator.name));
        }
        self.indicators.iter().map(|i| i.enabled).collect()
    }
}

/// One locally supported HF indicator and its current value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HfIndicator {
    pub anum: u16,
    pub min: u32,
    pub max: u32,
    pub value: u32,
}

impl HfIndicator {
    fn new(anum: u16) -> Self {
        let (min, max) = match anum {
            HF_INDICATOR_DRIVER_SAFETY => (0, 1),
            HF_INDICATOR_BATTERY_LEVEL => (0, 100),
            _ => (0, u32::MAX),
        };
        HfIndicator {
            anum,
            min,
            max,
            value: min,
        }
    }
}

/// The HF indicators negotiated with one AG.
///
/// Local indicators and the AG's list are kept apart; an indicator is
/// reported only when it is in both and the AG has enabled it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HfIndicatorSet {
    local: BTreeMap<u16, HfIndicator>,
    /// AG indicators from `+BIND: (...)` and `+BIND: <anum>,<state>`, keyed by anum.
    remote: BTreeMap<u16, bool>,
}

impl HfIndicatorSet {
    /// Create the set from the locally supported indicators.
    pub fn new(local: &[u16]) -> Self {
        let local = local.iter().map(|&a| (a, HfIndicator::new(a))).collect();
        HfIndicatorSet {
            local,
            remote: BTreeMap::new(),
        }
    }

    pub fn get(&self, anum: u16) -> Option<&HfIndicator> {
        self.local.get(&anum)
    }

    /// Indicators the AG announced, with their enabled state.
    pub fn remote(&self) -> &BTreeMap<u16, bool> {
        &self.remote
    }

    /// Record the `+BIND: (...)` list.
    pub fn set_remote_supported(&mut self, anums: &[u16]) {
        self.remote = anums
            .iter()
            .map(|&anum| (anum, self.remote.get(&anum).copied().unwrap_or(false)))
            .collect();
    }

    /// Record a `+BIND: <anum>,<state>` report. Returns whether a locally
    /// supported indicator changed state.
    pub fn set_remote_enabled(&mut self, anum: u16, enabled: bool) -> bool {
        let was_enabled = self.remote.insert(anum, enabled).unwrap_or(false);
        was_enabled != enabled && self.local.contains_key(&anum)
    }

    /// Whether a value for this indicator can be reported with `AT+BIEV`.
    pub fn is_remote_enabled(&self, anum: u16) -> bool {
        self.local.contains_key(&anum) && self.remote.get(&anum).copied().unwrap_or(false)
    }

    /// Validate and store a local value before it is reported with `AT+BIEV`.
    pub fn set_value(&mut self, anum: u16, value: u32) -> Result<()> {
        let indicator = self
            .local
            .get_mut(&anum)
            .ok_or_else(|| HfError::Unsupported(format!("HF indicator {} not supported locally", anum)))?;
        if value < indicator.min || value > indicator.max {
            return Err(HfError::InvalidArgument(format!(
                "HF indicator {} value {} out of range {}-{}",
                anum, value, indicator.min, indicator.max
            )));
        }
        indicator.value = value;
        Ok(())
    }

    /// Forget everything learned from the AG.
    pub fn clear_remote(&mut self) {
        self.remote.clear();
    }
}
