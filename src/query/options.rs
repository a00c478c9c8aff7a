//! Structured query options as a bit set, and the denial-mask resolution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct QueryOptions(u16);

impl QueryOptions {
    pub const NONE: QueryOptions = QueryOptions(0);
    pub const FILTER: QueryOptions = QueryOptions(1 << 0);
    pub const ORDER_BY: QueryOptions = QueryOptions(1 << 1);
    pub const TOP: QueryOptions = QueryOptions(1 << 2);
    pub const SKIP: QueryOptions = QueryOptions(1 << 3);
    pub const SELECT: QueryOptions = QueryOptions(1 << 4);
    pub const EXPAND: QueryOptions = QueryOptions(1 << 5);
    pub const COUNT: QueryOptions = QueryOptions(1 << 6);
    pub const SKIP_TOKEN: QueryOptions = QueryOptions(1 << 7);
    pub const ALL: QueryOptions = QueryOptions((1 << 8) - 1);

    const NAMES: [(QueryOptions, &'static str); 8] = [
        (QueryOptions::FILTER, "$filter"),
        (QueryOptions::ORDER_BY, "$orderby"),
        (QueryOptions::TOP, "$top"),
        (QueryOptions::SKIP, "$skip"),
        (QueryOptions::SELECT, "$select"),
        (QueryOptions::EXPAND, "$expand"),
        (QueryOptions::COUNT, "$count"),
        (QueryOptions::SKIP_TOKEN, "$skiptoken"),
    ];

    pub fn contains(self, other: QueryOptions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: QueryOptions) -> bool {
        self.0 & other.0 != 0
    }

    pub fn remove(&mut self, other: QueryOptions) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Option for a query-string parameter name such as `$top` (the `$` is optional).
    pub fn from_name(name: &str) -> Option<QueryOptions> {
        let lower = name.trim().to_ascii_lowercase();
        let wanted = if lower.starts_with('$') {
            lower
        } else {
            format!("${}", lower)
        };
        Self::NAMES
            .iter()
            .find(|(_, n)| *n == wanted)
            .map(|(o, _)| *o)
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(o, _)| self.contains(*o))
            .map(|(_, n)| *n)
            .collect()
    }
}

impl BitOr for QueryOptions {
    type Output = QueryOptions;
    fn bitor(self, rhs: QueryOptions) -> QueryOptions {
        QueryOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for QueryOptions {
    fn bitor_assign(&mut self, rhs: QueryOptions) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for QueryOptions {
    type Output = QueryOptions;
    fn bitand(self, rhs: QueryOptions) -> QueryOptions {
        QueryOptions(self.0 & rhs.0)
    }
}

/// Complement within `ALL`.
impl Not for QueryOptions {
    type Output = QueryOptions;
    fn not(self) -> QueryOptions {
        QueryOptions(!self.0 & QueryOptions::ALL.0)
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryOptions({})", self.names().join(" | "))
    }
}

impl TryFrom<Vec<String>> for QueryOptions {
    type Error = String;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        let mut options = QueryOptions::NONE;
        for name in names {
            if name.eq_ignore_ascii_case("all") {
                options |= QueryOptions::ALL;
                continue;
            }
            options |= QueryOptions::from_name(&name).ok_or_else(|| format!("unknown query option '{}'", name))?;
        }
        Ok(options)
    }
}

impl From<QueryOptions> for Vec<String> {
    fn from(options: QueryOptions) -> Self {
        options.names().into_iter().map(String::from).collect()
    }
}

/// Process-wide query toggles.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryDefaults {
    pub enable_count: bool,
    pub enable_expand: bool,
    pub enable_filter: bool,
    pub enable_order_by: bool,
    pub enable_select: bool,
    pub enable_skip_token: bool,
    pub enable_top: bool,
    pub max_top: Option<u32>,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        QueryDefaults {
            enable_count: true,
            enable_expand: true,
            enable_filter: true,
            enable_order_by: true,
            enable_select: true,
            enable_skip_token: true,
            enable_top: true,
            max_top: None,
        }
    }
}

/// Denial mask for one entity: an entity override wins, then the container default,
/// then every globally disabled toggle is denied.
pub fn resolve_denied(
    entity_override: Option<QueryOptions>,
    container_default: Option<QueryOptions>,
    global: &QueryDefaults,
) -> QueryOptions {
    if let Some(allowed) = entity_override.or(container_default) {
        return !allowed;
    }
    let mut allowed = QueryOptions::ALL;
    for (enabled, option) in [
        (global.enable_count, QueryOptions::COUNT),
        (global.enable_expand, QueryOptions::EXPAND),
        (global.enable_filter, QueryOptions::FILTER),
        (global.enable_order_by, QueryOptions::ORDER_BY),
        (global.enable_select, QueryOptions::SELECT),
        (global.enable_skip_token, QueryOptions::SKIP_TOKEN),
        (global.enable_top, QueryOptions::TOP),
    ] {
        if !enabled {
            allowed.remove(option);
        }
    }
    !allowed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_global_count_denies_only_count() {
        let global = QueryDefaults {
            enable_count: false,
            ..Default::default()
        };
        assert_eq!(resolve_denied(None, None, &global), QueryOptions::COUNT);
    }

    #[test]
    fn entity_override_allowing_filter_denies_the_rest() {
        let denied = resolve_denied(Some(QueryOptions::FILTER), None, &QueryDefaults::default());
        assert!(!denied.intersects(QueryOptions::FILTER));
        assert_eq!(denied, QueryOptions::ALL & !QueryOptions::FILTER);
        assert!(denied.contains(QueryOptions::TOP | QueryOptions::COUNT | QueryOptions::SKIP));
    }

    #[test]
    fn container_default_applies_without_override() {
        let global = QueryDefaults {
            enable_filter: false,
            ..Default::default()
        };
        let denied = resolve_denied(None, Some(QueryOptions::FILTER | QueryOptions::TOP), &global);
        assert!(!denied.intersects(QueryOptions::FILTER | QueryOptions::TOP));
        let entity = resolve_denied(Some(QueryOptions::ALL), Some(QueryOptions::TOP), &global);
        assert!(entity.is_empty());
    }

    #[test]
    fn skip_has_no_global_toggle() {
        let global = QueryDefaults {
            enable_count: false,
            enable_expand: false,
            enable_filter: false,
            enable_order_by: false,
            enable_select: false,
            enable_skip_token: false,
            enable_top: false,
            max_top: None,
        };
        assert_eq!(resolve_denied(None, None, &global), !QueryOptions::SKIP);
    }

    #[test]
    fn deserializes_from_option_names() {
        let o: QueryOptions = serde_json::from_str(r#"["$filter", "top", "$OrderBy"]"#).unwrap();
        assert_eq!(o, QueryOptions::FILTER | QueryOptions::TOP | QueryOptions::ORDER_BY);
        assert!(serde_json::from_str::<QueryOptions>(r#"["$search"]"#).is_err());
        assert_eq!(serde_json::to_value(QueryOptions::COUNT).unwrap(), serde_json::json!(["$count"]));
    }
}
