//! Auto-generated type filters for SQL data sources.
//!
//! When enabled, the PostGIS table/subquery is wrapped in a `SELECT`
//! restricted to the attribute values the style actually matches on, so
//! the database only returns features a rule can apply to.

use mss::{CompOp, Filter, Rule, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Collect `field = 'value'` string equalities per field. `None` when
/// any rule is unfiltered (or matches without a string equality), since
/// that rule needs every feature.
fn filter_items(rules: &[Rule]) -> Option<BTreeMap<String, BTreeSet<String>>> {
    let mut result: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for rule in rules {
        if rule.filters.is_empty() {
            return None;
        }
        let mut found = false;
        for filter in &rule.filters {
            if filter.op != CompOp::Eq {
                continue;
            }
            let Value::Str(value) = &filter.value else {
                continue;
            };
            found = true;
            result.entry(filter.field.clone()).or_default().insert(value.clone());
        }
        if !found {
            return None;
        }
    }
    Some(result)
}

/// A `("field" IN (...) OR ...)` condition covering the rules' string
/// equalities; empty when no restriction is possible.
pub fn filter_string(rules: &[Rule]) -> String {
    let Some(items) = filter_items(rules) else {
        return String::new();
    };
    if items.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = items
        .iter()
        .map(|(field, values)| {
            let vals: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
            format!("\"{field}\" IN ({})", vals.join(", "))
        })
        .collect();
    format!("({})", parts.join(" OR "))
}

/// Wrap `query` in a filtered subselect; identity when `where_` is empty.
pub fn wrap_where(query: &str, where_: &str) -> String {
    if where_.is_empty() {
        return query.to_string();
    }
    format!("(SELECT * FROM {query} WHERE {where_}) as filtered")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mss::Decoder;

    fn rules(src: &str) -> Vec<Rule> {
        let mut decoder = Decoder::new();
        decoder.parse_string(src).unwrap();
        let mss = decoder.evaluate().unwrap();
        mss.layer_rules("r", &["r".to_string()], &[])
    }

    #[test]
    fn harvests_string_equalities() {
        let rules = rules(
            "#r[highway='motorway'] { line-width: 2; } \
             #r[highway='trunk'] { line-width: 1; }",
        );
        assert_eq!(
            filter_string(&rules),
            "(\"highway\" IN ('motorway', 'trunk'))"
        );
    }

    #[test]
    fn unfiltered_rule_disables_restriction() {
        let rules = rules(
            "#r[highway='motorway'] { line-width: 2; } #r { line-width: 1; }",
        );
        assert_eq!(filter_string(&rules), "");
    }

    #[test]
    fn non_string_filters_do_not_count() {
        let rules = rules("#r[lanes>=2] { line-width: 2; }");
        assert_eq!(filter_string(&rules), "");
    }

    #[test]
    fn wrapping() {
        assert_eq!(wrap_where("planet_osm_line", ""), "planet_osm_line");
        assert_eq!(
            wrap_where("planet_osm_line", "(\"highway\" IN ('motorway'))"),
            "(SELECT * FROM planet_osm_line WHERE (\"highway\" IN ('motorway'))) as filtered"
        );
    }
}
