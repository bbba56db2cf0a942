use std::collections::HashMap;

use crate::command::Source;

/// Static permission tables, loaded from config and replaced wholesale on
/// reload. Read-only between reloads.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct AccessTables {
    /// Operations anyone may invoke, regardless of identity.
    #[serde(default)]
    pub default_access: HashMap<String, bool>,

    /// Named access levels, each mapping operation -> allow.
    #[serde(default)]
    pub access_levels: HashMap<String, HashMap<String, bool>>,

    /// Qualified identity (`console:name` / `chat:name`) -> ordered list of
    /// access levels the identity belongs to.
    #[serde(default)]
    pub members: HashMap<String, Vec<String>>,
}

/// Pure allow/deny decision for one (sender, operation, source) triple.
///
/// Precedence: a default-allowed operation short-circuits to allow; after
/// that the sender's levels are checked in membership order and the first
/// explicit allow wins. Explicit `false` entries are ignored rather than
/// treated as vetoes, so there is no deny-overrides ambiguity. Absence of
/// any allow is a deny.
pub fn allowed(tables: &AccessTables, sender: &str, op: &str, source: Source) -> bool {
    if tables.default_access.get(op).copied().unwrap_or(false) {
        return true;
    }

    let qualified = source.qualify(sender);
    let Some(levels) = tables.members.get(&qualified) else {
        return false;
    };

    for level in levels {
        if let Some(ops) = tables.access_levels.get(level)
            && ops.get(op).copied().unwrap_or(false)
        {
            return true;
        }
    }

    false
}
