//! Trust between project members, folded from start/stop-trusting entries.

use crate::entry::{LogAction, LogEntry, Subject, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How much one member trusts another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    /// Trust was withdrawn.
    NoTrust,
    /// Accept the member's changes.
    Trust,
    /// Also follow the member's own trust decisions when adding or removing
    /// members.
    AutoAddRemove,
}

impl TrustLevel {
    /// `true` for every level except [`TrustLevel::NoTrust`].
    pub fn is_trusted(self) -> bool {
        match self {
            TrustLevel::NoTrust => false,
            TrustLevel::Trust | TrustLevel::AutoAddRemove => true,
        }
    }
}

/// Trust relations as of some point in the log.
///
/// Built by folding [`trust_reducer`] over entries in log order. The project
/// creator trusts itself from the moment the project exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustView {
    creator: Option<UserId>,
    levels: BTreeMap<UserId, BTreeMap<UserId, TrustLevel>>,
}

/// Fold one entry into the trust view. Entries must arrive in log order.
///
/// # Examples
///
/// ```
/// use projectfold::{reduce, trust_reducer, LogEntry, TrustLevel, TrustView};
///
/// let entries = vec![
///     LogEntry::start_trusting("me", "bob", TrustLevel::Trust).unwrap(),
///     LogEntry::stop_trusting("me", "bob").unwrap(),
/// ];
/// let view = reduce::fold(TrustView::default(), &entries, trust_reducer);
/// assert!(!view.trusts(&"me".into(), &"bob".into()));
/// assert_eq!(view.level(&"me".into(), &"bob".into()), Some(TrustLevel::NoTrust));
/// ```
pub fn trust_reducer(mut state: TrustView, entry: &LogEntry) -> TrustView {
    match entry.action() {
        LogAction::ProjectCreated => {
            if state.creator.is_none() {
                let creator = entry.actor().clone();
                state
                    .levels
                    .entry(creator.clone())
                    .or_default()
                    .insert(creator.clone(), TrustLevel::Trust);
                state.creator = Some(creator);
            }
        }
        LogAction::StartTrustingMember | LogAction::StopTrustingMember => {
            if let (Subject::Member(trustee), Some(level)) = (entry.subject(), entry.trust_level()) {
                state
                    .levels
                    .entry(entry.actor().clone())
                    .or_default()
                    .insert(trustee.clone(), level);
            }
        }
        LogAction::ObjectNewVersion
        | LogAction::ObjectDelete
        | LogAction::ObjectLock
        | LogAction::ObjectUnlock
        | LogAction::TagAdd
        | LogAction::TagRemove => {}
    }
    state
}

impl TrustView {
    /// The actor of the project-created entry, once seen.
    pub fn creator(&self) -> Option<&UserId> {
        self.creator.as_ref()
    }

    /// Last trust level set by `truster` for `trustee`; `None` without history.
    pub fn level(&self, truster: &UserId, trustee: &UserId) -> Option<TrustLevel> {
        self.levels.get(truster)?.get(trustee).copied()
    }

    /// Whether `truster` currently trusts `trustee`.
    pub fn trusts(&self, truster: &UserId, trustee: &UserId) -> bool {
        self.level(truster, trustee)
            .is_some_and(TrustLevel::is_trusted)
    }

    /// Every member `truster` currently trusts.
    pub fn trusted_by(&self, truster: &UserId) -> BTreeSet<UserId> {
        self.levels
            .get(truster)
            .map(live_trustees)
            .unwrap_or_default()
    }

    /// Last level `truster` set for each member, withdrawn trust included.
    pub fn levels_of(&self, truster: &UserId) -> BTreeMap<UserId, TrustLevel> {
        self.levels.get(truster).cloned().unwrap_or_default()
    }

    /// truster → trusted members.
    ///
    /// Trusters whose every edge was withdrawn stay in the map with an empty
    /// set.
    pub fn graph(&self) -> BTreeMap<UserId, BTreeSet<UserId>> {
        self.levels
            .iter()
            .map(|(truster, trustees)| (truster.clone(), live_trustees(trustees)))
            .collect()
    }

    /// truster → (trustee → last level), withdrawn trust included.
    pub fn extended(&self) -> &BTreeMap<UserId, BTreeMap<UserId, TrustLevel>> {
        &self.levels
    }

    /// Everyone trusted by at least one member, plus the creator.
    ///
    /// Trust is not transitive here: a member trusted only by someone nobody
    /// trusts still counts.
    pub fn members(&self) -> BTreeSet<UserId> {
        let mut members: BTreeSet<UserId> = self.levels.values().flat_map(live_trustees).collect();
        if let Some(creator) = &self.creator {
            members.insert(creator.clone());
        }
        members
    }
}

fn live_trustees(trustees: &BTreeMap<UserId, TrustLevel>) -> BTreeSet<UserId> {
    trustees
        .iter()
        .filter(|(_, level)| level.is_trusted())
        .map(|(trustee, _)| trustee.clone())
        .collect()
}
