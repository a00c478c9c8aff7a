//! Parse `$`-prefixed query-string options against an entity's query feature.

use super::filter::{parse_filter, FilterExpr};
use super::options::QueryOptions;
use crate::metadata::QueryFeature;
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub property: String,
    pub descending: bool,
}

/// A validated query: schema names only, denied options already dropped.
#[derive(Clone, Debug, Default)]
pub struct QueryRequest {
    pub filter: Option<FilterExpr>,
    pub order_by: Vec<OrderBy>,
    pub top: Option<u64>,
    pub skip: Option<u64>,
    pub select: Option<Vec<String>>,
    /// Navigation name paths, outermost first.
    pub expand: Vec<Vec<String>>,
    pub count: bool,
}

impl QueryRequest {
    /// Options in `feature.denied` are ignored, not rejected. Unknown parameters are ignored.
    pub fn parse(params: &HashMap<String, String>, feature: &QueryFeature) -> Result<Self, String> {
        let mut q = QueryRequest::default();
        let mut skip_token: Option<u64> = None;
        for (name, raw) in params {
            if !name.starts_with('$') {
                continue;
            }
            let Some(option) = QueryOptions::from_name(name) else {
                continue;
            };
            if feature.denied.contains(option) {
                tracing::debug!(option = %name, "query option denied; ignoring");
                continue;
            }
            match option {
                QueryOptions::FILTER => {
                    let resolve = |wire: &str| {
                        feature
                            .property(wire)
                            .map(|p| (p.name.clone(), p.scalar_type))
                    };
                    q.filter = Some(parse_filter(raw, &resolve).map_err(|e| format!("$filter: {}", e))?);
                }
                QueryOptions::ORDER_BY => q.order_by = parse_order_by(raw, feature)?,
                QueryOptions::TOP => q.top = Some(parse_count("$top", raw)?),
                QueryOptions::SKIP => q.skip = Some(parse_count("$skip", raw)?),
                QueryOptions::SKIP_TOKEN => skip_token = Some(parse_count("$skiptoken", raw)?),
                QueryOptions::SELECT => q.select = Some(parse_select(raw, feature)?),
                QueryOptions::EXPAND => q.expand = parse_expand(raw, feature)?,
                QueryOptions::COUNT => {
                    q.count = match raw.trim().to_ascii_lowercase().as_str() {
                        "true" => true,
                        "false" => false,
                        other => return Err(format!("$count: expected true or false, got '{}'", other)),
                    }
                }
                _ => {}
            }
        }
        if let Some(token) = skip_token {
            q.skip = Some(
                q.skip
                    .unwrap_or(0)
                    .checked_add(token)
                    .ok_or_else(|| "$skiptoken: out of range".to_string())?,
            );
        }
        if let Some(max) = feature.max_top {
            q.top = Some(q.top.map_or(max as u64, |t| t.min(max as u64)));
        }
        Ok(q)
    }
}

fn parse_count(option: &str, raw: &str) -> Result<u64, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("{}: '{}' is not a non-negative integer", option, raw))
}

fn parse_order_by(raw: &str, feature: &QueryFeature) -> Result<Vec<OrderBy>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|item| {
            let mut parts = item.split_whitespace();
            let name = parts.next().unwrap_or_default();
            let descending = match parts.next().map(str::to_ascii_lowercase).as_deref() {
                None | Some("asc") => false,
                Some("desc") => true,
                Some(other) => return Err(format!("$orderby: unknown direction '{}'", other)),
            };
            let property = feature
                .property(name)
                .ok_or_else(|| format!("$orderby: unknown property '{}'", name))?;
            Ok(OrderBy {
                property: property.name.clone(),
                descending,
            })
        })
        .collect()
}

fn parse_select(raw: &str, feature: &QueryFeature) -> Result<Vec<String>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            feature
                .property(name)
                .map(|p| p.name.clone())
                .ok_or_else(|| format!("$select: unknown property '{}'", name))
        })
        .collect()
}

fn parse_expand(raw: &str, feature: &QueryFeature) -> Result<Vec<Vec<String>>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|path| {
            feature
                .expand_path(path)
                .map(<[String]>::to_vec)
                .ok_or_else(|| format!("$expand: '{}' is not an expandable navigation", path))
        })
        .collect()
}
