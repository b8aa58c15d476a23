use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::prefs::Preferences;

/// Bitmask of search behaviors. Without `RESTRICT` the source bits
/// (history, bookmark, tag, typed, openpage) are alternatives; with it they
/// are all required.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Behavior(u32);

impl Behavior {
    pub const NONE: Behavior = Behavior(0);
    pub const HISTORY: Behavior = Behavior(1 << 0);
    pub const BOOKMARK: Behavior = Behavior(1 << 1);
    pub const TAG: Behavior = Behavior(1 << 2);
    pub const TITLE: Behavior = Behavior(1 << 3);
    pub const URL: Behavior = Behavior(1 << 4);
    pub const TYPED: Behavior = Behavior(1 << 5);
    pub const JAVASCRIPT: Behavior = Behavior(1 << 6);
    pub const OPENPAGE: Behavior = Behavior(1 << 7);
    pub const RESTRICT: Behavior = Behavior(1 << 8);

    const NAMES: [(Behavior, &'static str); 9] = [
        (Self::HISTORY, "history"),
        (Self::BOOKMARK, "bookmark"),
        (Self::TAG, "tag"),
        (Self::TITLE, "title"),
        (Self::URL, "url"),
        (Self::TYPED, "typed"),
        (Self::JAVASCRIPT, "javascript"),
        (Self::OPENPAGE, "openpage"),
        (Self::RESTRICT, "restrict"),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Behavior) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Behavior) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Behavior) {
        self.0 &= !other.0;
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Behavior {
    type Output = Behavior;

    fn bitor(self, rhs: Behavior) -> Behavior {
        Behavior(self.0 | rhs.0)
    }
}

impl BitOrAssign for Behavior {
    fn bitor_assign(&mut self, rhs: Behavior) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Behavior({:#x}: {})", self.0, names.join("|"))
    }
}

/// Strips recognized restriction and match tokens from `tokens` and returns
/// the behavior for the remaining search text.
pub fn resolve_behavior(
    tokens: &mut Vec<String>,
    prefs: &Preferences,
    enable_actions: bool,
) -> Behavior {
    let mut flags = Vec::new();
    let mut index = tokens.len();
    while index > 0 {
        index -= 1;
        let Some(flag) = restriction_for(&tokens[index], prefs, enable_actions) else {
            continue;
        };
        flags.push(flag);
        tokens.remove(index);
    }

    let mut behavior = if tokens.is_empty() {
        prefs.empty_search_default_behavior()
    } else {
        prefs.default_behavior()
    };

    if !flags.is_empty() {
        behavior = Behavior::RESTRICT;
        for flag in flags {
            behavior |= flag;
        }
    }

    if !prefs.filter_javascript {
        behavior |= Behavior::JAVASCRIPT;
    }

    behavior
}

fn restriction_for(token: &str, prefs: &Preferences, enable_actions: bool) -> Option<Behavior> {
    let tokens = &prefs.restrict_tokens;
    if token == tokens.history {
        Some(Behavior::HISTORY)
    } else if token == tokens.bookmark {
        Some(Behavior::BOOKMARK)
    } else if token == tokens.tag {
        Some(Behavior::TAG)
    } else if token == tokens.openpage {
        enable_actions.then_some(Behavior::OPENPAGE)
    } else if token == tokens.title {
        Some(Behavior::TITLE)
    } else if token == tokens.url {
        Some(Behavior::URL)
    } else if token == tokens.typed {
        Some(Behavior::TYPED)
    } else {
        None
    }
}
