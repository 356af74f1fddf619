//! Focus resolution for node-free selections

use crate::scoring::FocusPreference;
use crate::tracker::{ConceptState, ConceptTracker};
use std::cmp::Reverse;

/// Concept picked by `preference`, or `None` when it names nothing
pub fn by_preference(tracker: &ConceptTracker, preference: FocusPreference) -> Option<String> {
    let pick = match preference {
        FocusPreference::Current => tracker.previous_focus().and_then(|id| tracker.get(id)),
        FocusPreference::Shallowest => tracker
            .states()
            .min_by_key(|s| (s.depth, s.focus_count, s.concept_id.as_str())),
        FocusPreference::Recent => most_recent(tracker),
        FocusPreference::LeastExplored => tracker.states().min_by_key(|s| {
            (
                s.focus_count,
                Reverse(s.turns_since_last_focus),
                s.concept_id.as_str(),
            )
        }),
    };
    pick.map(|s| s.concept_id.clone())
}

/// Most recently created concept, ties broken by smallest id
fn most_recent(tracker: &ConceptTracker) -> Option<&ConceptState> {
    tracker
        .states()
        .min_by_key(|s| (Reverse(s.created_turn), s.concept_id.as_str()))
}

/// Preference first, then the most recently created concept.
///
/// The flag is `true` when the preference resolved nothing but the fallback
/// did.
pub fn resolve(tracker: &ConceptTracker, preference: FocusPreference) -> (Option<String>, bool) {
    match by_preference(tracker, preference) {
        Some(id) => (Some(id), false),
        None => match most_recent(tracker) {
            Some(s) => (Some(s.concept_id.clone()), true),
            None => (None, false),
        },
    }
}
