use mss::{Decoder, Rule, Value, ZoomRange};

fn resolve(src: &str, layer: &str, css_ids: &[&str], classes: &[&str]) -> Vec<Rule> {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut decoder = Decoder::new();
    decoder.parse_string(src).expect("parse");
    let mss = decoder.evaluate().expect("evaluate");
    let ids: Vec<String> = css_ids.iter().map(|s| s.to_string()).collect();
    let cls: Vec<String> = classes.iter().map(|s| s.to_string()).collect();
    mss.layer_rules(layer, &ids, &cls)
}

fn fingerprint(rules: &[Rule]) -> Vec<String> {
    rules
        .iter()
        .map(|r| {
            let props: Vec<String> = r
                .properties
                .entries()
                .iter()
                .map(|(k, v)| format!("{}/{}={v}", k.instance, k.name))
                .collect();
            format!(
                "{}|{}|{}|{}|{:?}|{}",
                r.layer,
                r.attachment,
                r.class,
                r.zoom,
                r.filters.iter().map(ToString::to_string).collect::<Vec<_>>(),
                props.join(",")
            )
        })
        .collect()
}

#[test]
fn simplest_rule() {
    let rules = resolve(
        "#roads { line-width: 2; line-color: #f00; }",
        "roads",
        &["roads"],
        &[],
    );
    assert_eq!(rules.len(), 1);
    let rule = &rules[0];
    assert_eq!(rule.layer, "roads");
    assert_eq!(rule.zoom, ZoomRange::ALL);
    assert_eq!(rule.properties.get_float("line-width"), Some(2.0));
    let color = rule.properties.get_color("line-color").unwrap();
    assert_eq!(color.to_string(), "rgba(255,0,0,1)");
}

#[test]
fn class_specificity_and_merge() {
    let src = "#r { line-width: 1; } #r.major { line-width: 4; }";
    let rules = resolve(src, "r", &["r"], &["major"]);
    // the classless fallback merges into the .major rule, which wins
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].class, "major");
    assert_eq!(rules[0].properties.get_float("line-width"), Some(4.0));
}

#[test]
fn class_rule_sorts_first_without_merge() {
    let src = "#r { line-width: 1; line-cap: round; } #r.major { line-width: 4; }";
    let rules = resolve(src, "r", &["r"], &["major"]);
    assert_eq!(rules.len(), 1);
    // the fallback's other property propagated into the winner
    assert_eq!(rules[0].properties.get_string("line-cap"), Some("round".to_string()));
    assert_eq!(rules[0].properties.get_float("line-width"), Some(4.0));
}

#[test]
fn zoom_intersection_creates_combined_rule() {
    let src = "#r[zoom>=5][zoom<=10] { line-width: 1; } #r[zoom>=8] { line-width: 2; }";
    let rules = resolve(src, "r", &["r"], &[]);
    assert_eq!(rules.len(), 3);

    // the combined overlap rule comes first and adopts the more specific width
    assert_eq!(rules[0].zoom.to_string(), "8-10");
    assert_eq!(rules[0].properties.get_float("line-width"), Some(2.0));

    // first-match-wins leaves zoom 5..=7 to the wider rule with width 1
    assert_eq!(rules[1].zoom.to_string(), "5-10");
    assert_eq!(rules[1].properties.get_float("line-width"), Some(1.0));
    assert_eq!(rules[2].zoom.to_string(), "8-22");
    assert_eq!(rules[2].properties.get_float("line-width"), Some(2.0));
}

#[test]
fn filter_containment_propagates_properties() {
    let src = "#r[type='primary'] { line-color: #00f; } \
               #r[type='primary'][lanes>=2] { line-width: 3; }";
    let rules = resolve(src, "r", &["r"], &[]);
    assert_eq!(rules.len(), 2);

    // narrower rule first, with the wider rule's color filled in
    assert_eq!(rules[0].filters.len(), 2);
    assert_eq!(rules[0].properties.get_float("line-width"), Some(3.0));
    let color = rules[0].properties.get_color("line-color").unwrap();
    assert_eq!(color.to_string(), "rgba(0,0,255,1)");

    assert_eq!(rules[1].filters.len(), 1);
    assert_eq!(rules[1].properties.get_float("line-width"), None);
}

#[test]
fn unreachable_zoom_drops_subtree() {
    let rules = resolve("#r[zoom>=10][zoom<=5] { line-width: 1; }", "r", &["r"], &[]);
    assert!(rules.is_empty());
}

#[test]
fn incompatible_filters_drop_subtree() {
    let src = "#r[type='a'] { [type='b'] { line-width: 1; } }";
    let rules = resolve(src, "r", &["r"], &[]);
    assert!(rules.is_empty());
}

#[test]
fn strict_bounds_reduce_to_inclusive() {
    // nested same-direction bounds intersect on the integer domain
    let src = "#r[lanes>2] { [lanes>4] { line-width: 1; } }";
    let rules = resolve(src, "r", &["r"], &[]);
    assert_eq!(rules.len(), 1);
    let filters = &rules[0].filters;
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].to_string(), "lanes >= 5");

    // opposite directions are rejected by the merge and drop the subtree
    let src = "#r[lanes>2] { [lanes<6] { line-width: 1; } }";
    assert!(resolve(src, "r", &["r"], &[]).is_empty());

    // within one selector both bounds survive as separate filters
    let src = "#r[lanes>=3][lanes<6] { line-width: 1; }";
    let rules = resolve(src, "r", &["r"], &[]);
    assert_eq!(rules[0].filters.len(), 2);
}

#[test]
fn nested_blocks_inherit_layer_and_zoom() {
    let src = "#r { line-width: 1; [zoom>=10] { line-width: 2; } }";
    let rules = resolve(src, "r", &["r"], &[]);
    assert_eq!(rules.len(), 2);
    assert_eq!(rules[0].zoom.to_string(), "10-22");
    assert_eq!(rules[0].properties.get_float("line-width"), Some(2.0));
    assert_eq!(rules[1].zoom, ZoomRange::ALL);
}

#[test]
fn attachments_emit_separate_rules() {
    let src = "#r::casing { line-width: 6; } #r { line-width: 2; }";
    let rules = resolve(src, "r", &["r"], &[]);
    assert_eq!(rules.len(), 2);
    // the attachment-less rule sorts first, the casing pass after it
    assert_eq!(rules[0].attachment, "");
    assert_eq!(rules[1].attachment, "casing");
    assert_eq!(rules[1].properties.get_float("line-width"), Some(6.0));
}

#[test]
fn universal_selector_applies_to_queried_layer() {
    let src = "* { line-width: 1; } #roads { line-color: #f00; }";
    let rules = resolve(src, "roads", &["roads"], &[]);
    assert_eq!(rules.len(), 2);
    assert!(rules.iter().all(|r| r.layer == "roads"));
    // the layer rule inherits the universal width
    assert_eq!(rules[0].properties.get_float("line-width"), Some(1.0));
    assert!(rules[0].properties.get_color("line-color").is_some());
}

#[test]
fn other_layers_are_skipped() {
    let src = "#roads { line-width: 1; } #rails { line-width: 9; }";
    let rules = resolve(src, "roads", &["roads"], &[]);
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].properties.get_float("line-width"), Some(1.0));
}

#[test]
fn css_ids_allow_aliases() {
    let src = "#roads-base { line-width: 1; }";
    let rules = resolve(src, "roads", &["roads", "roads-base"], &[]);
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].layer, "roads-base");
}

#[test]
fn class_outside_query_contributes_nothing() {
    let src = "#r.major { line-width: 4; } #r.minor { line-width: 2; }";
    let rules = resolve(src, "r", &["r"], &["major"]);
    assert!(rules.iter().all(|r| r.class.is_empty() || r.class == "major"));
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].properties.get_float("line-width"), Some(4.0));

    let none = resolve("#r.major { line-width: 4; }", "r", &["r"], &[]);
    assert!(none.is_empty());
}

#[test]
fn class_priority_follows_query_order() {
    let src = "#r.major { line-width: 4; } #r.minor { line-width: 2; line-cap: round; }";
    let rules = resolve(src, "r", &["r"], &["minor", "major"]);
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].class, "minor");
    assert_eq!(rules[0].properties.get_float("line-width"), Some(2.0));
    // the loser's missing properties fold in
    assert_eq!(rules[0].properties.get_string("line-cap"), Some("round".to_string()));
}

#[test]
fn outer_zoom_restricts_queries() {
    let src = "#r[zoom>=5] { line-width: 1; }";
    let mut decoder = Decoder::new();
    decoder.parse_string(src).unwrap();
    let mss = decoder.evaluate().unwrap();
    let ids = vec!["r".to_string()];

    let narrow = mss.layer_zoom_rules(
        "r",
        &ids,
        ZoomRange::from_comparison(mss::CompOp::Lte, 3.0),
        &[],
    );
    assert!(narrow.is_empty());

    let wide = mss.layer_zoom_rules(
        "r",
        &ids,
        ZoomRange::from_comparison(mss::CompOp::Lte, 8.0),
        &[],
    );
    assert_eq!(wide.len(), 1);
    assert_eq!(wide[0].zoom.to_string(), "5-8");
}

#[test]
fn resolver_is_deterministic() {
    let src = "@w: 2;\n\
        #r { line-width: @w; [zoom>=8] { line-width: @w * 2; } }\n\
        #r[type='x'] { line-color: #123456; }\n\
        #r::casing { line-width: 8; }\n\
        #r.major[zoom>=5] { line-cap: round; }";
    let first = fingerprint(&resolve(src, "r", &["r"], &["major"]));
    for _ in 0..5 {
        let again = fingerprint(&resolve(src, "r", &["r"], &["major"]));
        assert_eq!(first, again);
    }
}

#[test]
fn filters_stay_sorted_and_zoom_nonempty() {
    let src = "#r[type='x'][lanes>=2] { line-width: 1; }\n\
        #r[zoom>=4][zoom<=12] { line-width: 2; }\n\
        #r[surface='paved'][zoom>=6] { line-width: 3; }";
    let rules = resolve(src, "r", &["r"], &[]);
    assert!(!rules.is_empty());
    for rule in &rules {
        assert!(rule.zoom.levels() > 0, "empty zoom emitted: {rule}");
        for pair in rule.filters.windows(2) {
            assert!(pair[0].field <= pair[1].field, "unsorted filters: {rule}");
        }
    }
}

#[test]
fn property_conservation() {
    let src = "#r { line-width: 1; }\n\
        #r[zoom>=9] { line-color: #0f0; }\n\
        #r::halo { text-size: 12; }";
    let rules = resolve(src, "r", &["r"], &[]);
    for name in ["line-width", "line-color", "text-size"] {
        assert!(
            rules.iter().any(|r| r
                .properties
                .entries()
                .iter()
                .any(|(k, _)| k.name == name)),
            "{name} lost in cascade"
        );
    }
}

#[test]
fn instance_qualifiers_survive_resolution() {
    let src = "#r { a/line-width: 1; b/line-width: 2; line-color: #000; }";
    let rules = resolve(src, "r", &["r"], &[]);
    assert_eq!(rules.len(), 1);
    let entries = rules[0].properties.entries();
    let instances: Vec<&str> = entries.iter().map(|(k, _)| k.instance.as_str()).collect();
    assert_eq!(instances, vec!["a", "b", ""]);
}

#[test]
fn imports_are_recorded() {
    let mut decoder = Decoder::new();
    decoder
        .parse_string("@import 'base.mss';\n#r { line-width: 1; }")
        .unwrap();
    assert_eq!(decoder.imports(), vec!["base.mss"]);
}

#[test]
fn layers_listing() {
    let src = "#a { x: 1; } #b, #a { y: 2; } .c { z: 3; }";
    let mut decoder = Decoder::new();
    decoder.parse_string(src).unwrap();
    let mss = decoder.evaluate().unwrap();
    assert_eq!(mss.layers(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn values_survive_into_filter_output() {
    let src = "#r[lanes=2] { line-width: 1; } #r[name='Main St'] { line-width: 2; }";
    let rules = resolve(src, "r", &["r"], &[]);
    let all: Vec<String> = rules
        .iter()
        .flat_map(|r| r.filters.iter().map(ToString::to_string))
        .collect();
    assert!(all.contains(&"lanes = 2".to_string()));
    assert!(all.contains(&"name = Main St".to_string()));
    let _ = rules
        .iter()
        .flat_map(|r| r.filters.iter())
        .find(|f| matches!(f.value, Value::Num(n) if n == 2.0))
        .expect("numeric filter value");
}
