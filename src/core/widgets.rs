//! Purpose: Infer the widget slots a flexible document needs from its field names.
//! Exports: `WidgetKind`, `WidgetSlot`, `classify_key`, `infer_widget_slots`.
//! Role: Best-effort pattern matching over free-form keys, not a declared schema.
//! Invariants: Keys matching no pattern are ignored.
//! Invariants: Every matching key yields exactly one slot; collisions probe forward
//! to the next free index.
//! Invariants: Slots are returned in ascending index order.
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum WidgetKind {
    AttachedFile,
    Link,
    TextImage,
}

impl WidgetKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WidgetKind::AttachedFile => "attachedFile",
            WidgetKind::Link => "link",
            WidgetKind::TextImage => "textimage",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WidgetSlot {
    pub index: usize,
    pub kind: WidgetKind,
}

const PATTERNS: [(&str, WidgetKind); 3] = [
    ("attachedFile", WidgetKind::AttachedFile),
    ("link_href", WidgetKind::Link),
    ("content", WidgetKind::TextImage),
];

/// Widget kind and requested slot index encoded in a field name.
///
/// Accepted suffixes after the prefix: `_N`, `_fN`, `_N_fM` (slot `N`); text
/// widgets may put `_left` or `_right` before them, e.g. `content_left_2`.
pub fn classify_key(key: &str) -> Option<(WidgetKind, usize)> {
    PATTERNS.iter().find_map(|(prefix, kind)| {
        let rest = key.strip_prefix(prefix)?.strip_prefix('_')?;
        let mut tokens: Vec<&str> = rest.split('_').collect();
        if *kind == WidgetKind::TextImage && matches!(tokens.first(), Some(&"left" | &"right")) {
            tokens.remove(0);
        }
        let index = match tokens.as_slice() {
            [n] => digits(n).or_else(|| n.strip_prefix('f').and_then(digits)),
            [n, field] => {
                field.strip_prefix('f').and_then(digits)?;
                digits(n)
            }
            _ => None,
        }?;
        Some((*kind, index))
    })
}

/// Slots implied by `keys`, in ascending index order.
///
/// Keys are processed in the order given. A key whose index is already taken
/// moves to the next free index, whatever kind holds the taken one.
pub fn infer_widget_slots<'a, I>(keys: I) -> Vec<WidgetSlot>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut slots: BTreeMap<usize, WidgetKind> = BTreeMap::new();
    for key in keys {
        let Some((kind, mut index)) = classify_key(key) else {
            continue;
        };
        while slots.contains_key(&index) {
            index += 1;
        }
        slots.insert(index, kind);
    }
    slots
        .into_iter()
        .map(|(index, kind)| WidgetSlot { index, kind })
        .collect()
}

fn digits(token: &str) -> Option<usize> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
