//! Per-device multi-selection.

use horizon_dim_core::logging::targets;

use crate::event::DropSubject;
use crate::widget::{WidgetKey, WidgetKind};

/// Result of adding a widget to a selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionChange {
    /// Members dropped because the new widget is of another kind.
    pub deselected: Vec<WidgetKey>,
    /// Whether the widget was newly added.
    pub added: bool,
}

/// The set of widgets one device has selected.
///
/// Only one widget kind is selected at a time. Selecting a widget of a
/// different kind first empties the set, so a group drag never mixes app
/// windows with thumbnails.
///
/// The set only tracks membership. The dispatcher mirrors it onto each
/// widget's selected flag and into the display gateway.
#[derive(Debug, Clone, Default)]
pub struct MultiSelect {
    members: Vec<WidgetKey>,
    kind: Option<WidgetKind>,
}

impl MultiSelect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(&self) -> &[WidgetKey] {
        &self.members
    }

    /// Kind of the current members, if any.
    pub fn kind(&self) -> Option<&WidgetKind> {
        self.kind.as_ref()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[inline]
    pub fn contains(&self, key: WidgetKey) -> bool {
        self.members.contains(&key)
    }

    /// Add `key`, clearing the set first if `kind` differs from the current kind.
    pub fn select(&mut self, key: WidgetKey, kind: &WidgetKind) -> SelectionChange {
        let mut change = SelectionChange::default();
        if self.kind.as_ref().is_some_and(|k| k != kind) {
            change.deselected = self.clear();
            tracing::debug!(
                target: targets::SELECT,
                dropped = change.deselected.len(),
                ?kind,
                "selection kind changed"
            );
        }
        if !self.contains(key) {
            self.members.push(key);
            change.added = true;
        }
        self.kind = Some(kind.clone());
        change
    }

    /// Remove `key`. Returns whether it was a member.
    pub fn deselect(&mut self, key: WidgetKey) -> bool {
        let before = self.members.len();
        self.members.retain(|&k| k != key);
        if self.members.is_empty() {
            self.kind = None;
        }
        before != self.members.len()
    }

    /// Empty the set, returning the former members.
    pub fn clear(&mut self) -> Vec<WidgetKey> {
        self.kind = None;
        std::mem::take(&mut self.members)
    }

    /// The selection as a drop payload.
    pub fn subject(&self) -> DropSubject {
        DropSubject::Selection {
            members: self.members.clone(),
            kind: self.kind.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn keys(n: usize) -> Vec<WidgetKey> {
        let mut map: SlotMap<WidgetKey, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_select_same_kind_accumulates() {
        let k = keys(3);
        let mut sel = MultiSelect::new();
        assert!(sel.select(k[0], &WidgetKind::App).added);
        assert!(sel.select(k[1], &WidgetKind::App).added);
        assert!(!sel.select(k[1], &WidgetKind::App).added);
        assert_eq!(sel.members(), &[k[0], k[1]]);
        assert_eq!(sel.kind(), Some(&WidgetKind::App));
    }

    #[test]
    fn test_select_other_kind_clears_first() {
        let k = keys(3);
        let mut sel = MultiSelect::new();
        sel.select(k[0], &WidgetKind::App);
        sel.select(k[1], &WidgetKind::App);
        let change = sel.select(k[2], &WidgetKind::Thumbnail);
        assert_eq!(change.deselected, vec![k[0], k[1]]);
        assert!(change.added);
        assert_eq!(sel.members(), &[k[2]]);
        assert_eq!(sel.kind(), Some(&WidgetKind::Thumbnail));
    }

    #[test]
    fn test_deselect_last_member_resets_kind() {
        let k = keys(1);
        let mut sel = MultiSelect::new();
        sel.select(k[0], &WidgetKind::Icon);
        assert!(sel.deselect(k[0]));
        assert!(!sel.deselect(k[0]));
        assert!(sel.is_empty());
        assert_eq!(sel.kind(), None);
    }

    #[test]
    fn test_subject_carries_members() {
        let k = keys(2);
        let mut sel = MultiSelect::new();
        sel.select(k[0], &WidgetKind::App);
        sel.select(k[1], &WidgetKind::App);
        match sel.subject() {
            DropSubject::Selection { members, kind } => {
                assert_eq!(members, vec![k[0], k[1]]);
                assert_eq!(kind, Some(WidgetKind::App));
            }
            other => panic!("unexpected subject {other:?}"),
        }
    }
}
