//! Selector and rule types plus the cascade resolver.
//!
//! The resolver flattens the evaluated block tree into independent rules:
//! it merges selectors along each root-to-leaf path, sorts the emitted
//! rules by specificity, propagates properties from more-general rules
//! into overlapping specific ones, and deduplicates with class-priority
//! semantics.

use crate::properties::{combine_properties, Properties, Specificity};
use crate::value::Value;
use crate::zoom::ZoomRange;
use crate::{Block, Mss};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Filter comparators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Regex,
}

impl CompOp {
    pub fn parse(s: &str) -> Option<CompOp> {
        match s {
            "=" => Some(CompOp::Eq),
            "!=" => Some(CompOp::Neq),
            "<" => Some(CompOp::Lt),
            "<=" => Some(CompOp::Lte),
            ">" => Some(CompOp::Gt),
            ">=" => Some(CompOp::Gte),
            "=~" => Some(CompOp::Regex),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompOp::Eq => "=",
            CompOp::Neq => "!=",
            CompOp::Lt => "<",
            CompOp::Lte => "<=",
            CompOp::Gt => ">",
            CompOp::Gte => ">=",
            CompOp::Regex => "=~",
        }
    }
}

impl fmt::Display for CompOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `[field op value]` predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: CompOp,
    pub value: Value,
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.value)
    }
}

/// One selector of a block: layer/class/attachment references plus zoom
/// and field predicates. All parts are optional; an absent part inherits
/// from the enclosing block during resolution.
#[derive(Clone, Debug, Default)]
pub struct Selector {
    pub layer: String,
    pub class: String,
    pub attachment: String,
    pub zoom: Option<ZoomRange>,
    pub filters: Vec<Filter>,
}

/// A flattened style rule: the result of merging the selectors on one
/// root-to-leaf path through the block tree.
#[derive(Clone, Debug)]
pub struct Rule {
    pub layer: String,
    pub attachment: String,
    pub class: String,
    pub filters: Vec<Filter>,
    pub zoom: ZoomRange,
    pub properties: Properties,
    pub(crate) order: u32,
}

impl Default for Rule {
    fn default() -> Rule {
        Rule {
            layer: String::new(),
            attachment: String::new(),
            class: String::new(),
            filters: Vec::new(),
            zoom: ZoomRange::ALL,
            properties: Properties::new(),
            order: 0,
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rule{{#{} ::{} .{} zoom={} filters=[",
            self.layer, self.attachment, self.class, self.zoom
        )?;
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{filter}")?;
        }
        write!(f, "] props={}}}", self.properties.len())
    }
}

impl Rule {
    pub(crate) fn specificity(&self) -> Specificity {
        let mut s = Specificity::default();
        if !self.layer.is_empty() {
            s.layer += 1;
        }
        if !self.class.is_empty() {
            s.class += 1;
        }
        s.filters = self.filters.len() as u16;
        if self.zoom != ZoomRange::ALL {
            s.filters += 1;
        }
        s
    }

    /// Content hash over everything except the properties, used for
    /// deduplication.
    fn dedup_key(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.layer.hash(&mut h);
        self.attachment.hash(&mut h);
        self.class.hash(&mut h);
        self.zoom.bits().hash(&mut h);
        for filter in &self.filters {
            filter.to_string().hash(&mut h);
        }
        h.finish()
    }

    /// Identical selector axes: layer, attachment, class, zoom, filters.
    pub(crate) fn same(&self, other: &Rule) -> bool {
        self.layer == other.layer
            && self.attachment == other.attachment
            && self.class == other.class
            && self.zoom == other.zoom
            && filter_equal(&self.filters, &other.filters)
    }

    fn same_except_class(&self, other: &Rule) -> bool {
        self.layer == other.layer
            && self.attachment == other.attachment
            && self.zoom == other.zoom
            && filter_equal(&self.filters, &other.filters)
    }

    /// `self` is at least as specific as `other` on every axis: equal or
    /// stricter layer/attachment/class, a zoom subset, and a filter list
    /// that contains `other`'s under comparator containment.
    pub(crate) fn child_of(&self, other: &Rule) -> bool {
        if !(self.layer == other.layer || other.layer.is_empty()) {
            return false;
        }
        if !(self.attachment == other.attachment || other.attachment.is_empty()) {
            return false;
        }
        if !(self.class == other.class || other.class.is_empty()) {
            return false;
        }
        if !(self.zoom.combine(other.zoom) == self.zoom || other.zoom == ZoomRange::ALL) {
            return false;
        }
        filter_is_subset(&other.filters, &self.filters)
    }

    /// Rules that can apply to the same features: same layer and
    /// attachment, intersecting zoom, and pairwise-equal filters where
    /// fields coincide.
    pub(crate) fn overlaps(&self, other: &Rule) -> bool {
        if !(self.layer == other.layer || other.layer.is_empty()) {
            return false;
        }
        if !(self.attachment == other.attachment || other.attachment.is_empty()) {
            return false;
        }
        if !(self.zoom.combine(other.zoom).levels() > 0 || self.zoom == other.zoom) {
            return false;
        }
        filter_overlap(&other.filters, &self.filters)
    }
}

// Filter algebra --------------------------------------------------------------

fn filter_equal(a: &[Filter], b: &[Filter]) -> bool {
    a == b
}

/// Does every filter in `a` appear in `b`, either verbatim or implied by a
/// tighter filter (`x = 5` is contained in `x > 0`)? Both lists must be
/// sorted by field.
fn filter_is_subset(a: &[Filter], b: &[Filter]) -> bool {
    if a.len() > b.len() {
        return false;
    }
    let mut ib = 0;
    for fa in a {
        let mut found = false;
        while ib < b.len() {
            let fb = &b[ib];
            if fa.field > fb.field {
                ib += 1;
                continue;
            }
            if fa.field < fb.field {
                return false;
            }
            if fa.op == fb.op && fa.value == fb.value {
                found = true;
                break;
            }
            if filter_contains(fa, fb) {
                found = true;
                break;
            }
            return false;
        }
        if !found {
            return false;
        }
    }
    true
}

/// Is `b` within the range admitted by `a`? Only numeric range
/// comparators participate.
fn filter_contains(a: &Filter, b: &Filter) -> bool {
    let (Some(av), Some(bv)) = (a.value.as_num(), b.value.as_num()) else {
        return false;
    };
    match a.op {
        CompOp::Gt => match b.op {
            CompOp::Eq => bv > av,
            CompOp::Gt | CompOp::Gte => bv >= av,
            _ => false,
        },
        CompOp::Gte => match b.op {
            CompOp::Eq | CompOp::Gt | CompOp::Gte => bv >= av,
            _ => false,
        },
        CompOp::Lt => match b.op {
            CompOp::Eq => bv < av,
            CompOp::Lt | CompOp::Lte => bv <= av,
            _ => false,
        },
        CompOp::Lte => match b.op {
            CompOp::Eq | CompOp::Lt | CompOp::Lte => bv <= av,
            _ => false,
        },
        _ => false,
    }
}

/// Filters overlap unless a shared field carries different predicates.
fn filter_overlap(a: &[Filter], b: &[Filter]) -> bool {
    for fa in a {
        for fb in b {
            if fa.field != fb.field {
                continue;
            }
            if fa.op != fb.op || fa.value != fb.value {
                return false;
            }
            break;
        }
    }
    true
}

/// Merge two sorted filter lists. Shared fields are intersected with
/// `merge_filter`; `None` means the combination is unsatisfiable and the
/// selector subtree is unreachable.
pub(crate) fn merge_filters(a: &[Filter], b: &[Filter]) -> Option<Vec<Filter>> {
    let mut result = Vec::with_capacity(a.len() + b.len());
    let (mut ai, mut bi) = (0, 0);
    while ai < a.len() && bi < b.len() {
        if a[ai].field < b[bi].field {
            result.push(a[ai].clone());
            ai += 1;
        } else if b[bi].field < a[ai].field {
            result.push(b[bi].clone());
            bi += 1;
        } else {
            result.push(merge_filter(&a[ai], &b[bi])?);
            ai += 1;
            bi += 1;
        }
    }
    result.extend_from_slice(&a[ai..]);
    result.extend_from_slice(&b[bi..]);
    Some(result)
}

/// Intersect two filters on the same field. Strict bounds are first
/// reduced to inclusive bounds on the integer domain (`< v` becomes
/// `<= v-1`), then same-direction bounds keep the tighter value.
fn merge_filter(a: &Filter, b: &Filter) -> Option<Filter> {
    if a.field != b.field {
        return None;
    }
    if a.op == b.op && a.value == b.value {
        return Some(a.clone());
    }

    let relax = |f: &Filter| -> Option<(CompOp, f64)> {
        let v = f.value.as_num()?;
        match f.op {
            CompOp::Lt => Some((CompOp::Lte, v - 1.0)),
            CompOp::Gt => Some((CompOp::Gte, v + 1.0)),
            op => Some((op, v)),
        }
    };
    let (aop, av) = relax(a)?;
    let (bop, bv) = relax(b)?;

    match (aop, bop) {
        (CompOp::Lte, CompOp::Lte) => Some(Filter {
            field: a.field.clone(),
            op: CompOp::Lte,
            value: Value::Num(av.min(bv)),
        }),
        (CompOp::Gte, CompOp::Gte) => Some(Filter {
            field: a.field.clone(),
            op: CompOp::Gte,
            value: Value::Num(av.max(bv)),
        }),
        _ => None,
    }
}

/// Union of two filter lists on disjoint fields; `a` wins where a field
/// appears in both. The result is sorted by field.
fn combine_filters(a: &[Filter], b: &[Filter]) -> Vec<Filter> {
    let mut combined: Vec<Filter> = a.to_vec();
    'next: for f in b {
        for c in &combined {
            if f.field == c.field {
                continue 'next;
            }
        }
        combined.push(f.clone());
    }
    combined.sort_by(|x, y| x.field.cmp(&y.field));
    combined
}

fn combine_rules(a: &Rule, b: &Rule) -> Rule {
    let mut r = Rule {
        layer: a.layer.clone(),
        class: a.class.clone(),
        attachment: a.attachment.clone(),
        zoom: a.zoom.combine(b.zoom),
        ..Rule::default()
    };
    r.filters = combine_filters(&a.filters, &b.filters);
    r.properties = combine_properties(&a.properties, &b.properties);
    log::trace!(target: "mss::cascade", "combined {a} + {b} = {r}");
    r
}

// Property propagation ---------------------------------------------------------

/// One propagation step for `base` against the rules after `pos`.
///
/// `same` and `child_of` rules donate their missing properties directly;
/// `overlaps` pairs synthesize a combined rule covering the intersection.
/// Combined rules equal to an existing rule merge into it, the rest are
/// returned for insertion.
fn fill_properties(base: &mut Rule, sub: &mut [Rule]) -> Vec<Rule> {
    let mut new_rules: Vec<Rule> = Vec::new();
    for i in 0..sub.len() {
        if base.same(&sub[i]) {
            base.properties.update_missing(&sub[i].properties);
            continue;
        } else if base.child_of(&sub[i]) {
            base.properties.update_missing(&sub[i].properties);
        } else if base.overlaps(&sub[i]) {
            let new_rule = combine_rules(base, &sub[i]);
            if sub[i].same(&new_rule) {
                sub[i].properties.update_missing(&new_rule.properties);
            } else if base.same(&new_rule) {
                base.properties.update_missing(&new_rule.properties);
            } else {
                let mut dup = false;
                for nr in new_rules.iter_mut() {
                    if new_rule.same(nr) {
                        nr.properties.update_missing(&new_rule.properties);
                        dup = true;
                        break;
                    }
                }
                if !dup {
                    for other in sub.iter_mut() {
                        if new_rule.same(other) {
                            other.properties.update_missing(&new_rule.properties);
                            dup = true;
                            break;
                        }
                    }
                }
                if !dup {
                    new_rules.push(new_rule);
                }
            }
        }
    }
    new_rules
}

/// Extend `base` (logically at `pos`) with properties from the rules
/// after it, splicing any synthesized combined rules in before it.
/// Returns the number of inserted rules.
///
/// Terminates because every combined rule has a strictly smaller zoom
/// mask or more filters than its parents.
fn extend_rule(rules: &mut Vec<Rule>, base: &mut Rule, pos: usize) -> usize {
    let mut new_rules = fill_properties(base, &mut rules[pos + 1..]);
    if new_rules.is_empty() {
        return 0;
    }
    let mut added_total = 0;
    for r in new_rules.iter_mut() {
        added_total += extend_rule(rules, r, pos);
    }
    let count = new_rules.len();
    let at = pos + added_total;
    rules.splice(at..at, new_rules);
    added_total + count
}

// Sorting and deduplication ----------------------------------------------------

/// Ascending sort key; the caller reverses the list afterwards so the
/// most specific rule ends up first.
fn compare_rules(
    a: &Rule,
    b: &Rule,
    attachments: &HashMap<String, u32>,
) -> std::cmp::Ordering {
    let att = |r: &Rule| attachments.get(&r.attachment).copied().unwrap_or(0);
    a.layer
        .cmp(&b.layer)
        .then_with(|| {
            if a.attachment != b.attachment {
                // later-seen attachments sort earlier after the reversal
                att(b).cmp(&att(a))
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .then(a.filters.len().cmp(&b.filters.len()))
        .then_with(|| {
            if a.zoom != b.zoom {
                if a.zoom.levels() != b.zoom.levels() {
                    // wider zoom ranges sort earlier after the reversal
                    b.zoom.levels().cmp(&a.zoom.levels())
                } else {
                    a.zoom.bits().cmp(&b.zoom.bits())
                }
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .then(a.order.cmp(&b.order))
}

fn sorted_rules(
    mut rules: Vec<Rule>,
    attachments: &HashMap<String, u32>,
    classes: &[String],
) -> Vec<Rule> {
    if rules.is_empty() {
        return rules;
    }
    rules.sort_by(|a, b| compare_rules(a, b, attachments));
    rules.reverse();

    let mut pos = 0;
    while pos < rules.len() {
        let mut base = rules[pos].clone();
        let added = extend_rule(&mut rules, &mut base, pos);
        rules[pos + added] = base;
        pos += added + 1;
    }

    if !classes.is_empty() {
        dedup_merge_classes(rules, classes)
    } else {
        dedup(rules)
    }
}

fn dedup(rules: Vec<Rule>) -> Vec<Rule> {
    let mut seen = HashSet::with_capacity(rules.len());
    let mut result = Vec::with_capacity(rules.len());
    for rule in rules {
        if seen.insert(rule.dedup_key()) {
            result.push(rule);
        }
    }
    result
}

/// Collapse rules that differ only in class. The rule whose class comes
/// first in `classes` wins and absorbs the loser's missing properties;
/// classless rules have the lowest priority.
fn dedup_merge_classes(rules: Vec<Rule>, classes: &[String]) -> Vec<Rule> {
    let class_idx = |class: &str| -> usize {
        if class.is_empty() {
            return usize::MAX;
        }
        classes.iter().position(|c| c == class).unwrap_or(usize::MAX)
    };

    let mut result: Vec<Rule> = Vec::new();
    for rule in rules {
        let mut found = false;
        for existing in result.iter_mut() {
            if rule.same_except_class(existing) {
                let rule_idx = class_idx(&rule.class);
                let existing_idx = class_idx(&existing.class);
                if rule_idx < existing_idx {
                    let mut winner = rule.clone();
                    winner.properties.update_missing(&existing.properties);
                    *existing = winner;
                } else if existing_idx < rule_idx {
                    existing.properties.update_missing(&rule.properties);
                }
                found = true;
                break;
            }
        }
        if !found {
            result.push(rule);
        }
    }
    result
}

// Traversal ---------------------------------------------------------------------

struct Collector<'a> {
    css_ids: &'a [String],
    classes: &'a [String],
    attachments: HashMap<String, u32>,
    rules: Vec<Rule>,
    order: u32,
}

impl Collector<'_> {
    fn collect(&mut self, node: &Block, parent: &Rule) {
        if node.selectors.is_empty() {
            for child in &node.blocks {
                self.collect(child, parent);
            }
        }

        for selector in &node.selectors {
            let mut current = Rule {
                layer: parent.layer.clone(),
                class: parent.class.clone(),
                attachment: parent.attachment.clone(),
                filters: parent.filters.clone(),
                zoom: parent.zoom,
                ..Rule::default()
            };

            if !selector.layer.is_empty() {
                if !self.css_ids.iter().any(|id| *id == selector.layer) {
                    continue;
                }
                current.layer = selector.layer.clone();
            }
            if !selector.class.is_empty() {
                if !self.classes.iter().any(|c| *c == selector.class) {
                    continue;
                }
                current.class = selector.class.clone();
            }
            if !selector.attachment.is_empty() {
                let order = self.order;
                self.attachments
                    .entry(selector.attachment.clone())
                    .or_insert(order);
                current.attachment = selector.attachment.clone();
            }
            if !selector.filters.is_empty() {
                match merge_filters(&current.filters, &selector.filters) {
                    Some(merged) => current.filters = merged,
                    None => continue,
                }
            }
            if let Some(zoom) = selector.zoom {
                current.zoom = current.zoom.combine(zoom);
                if current.zoom.is_empty() {
                    continue;
                }
            }

            if !node.properties.is_empty() {
                self.order += 1;
                let mut rule = current.clone();
                rule.properties = node.properties.clone();
                rule.order = self.order;
                let spec = rule.specificity();
                for key in rule.properties.keys() {
                    rule.properties.set_specificity(&key, spec);
                }
                self.rules.push(rule);
            }
            for child in &node.blocks {
                self.collect(child, &current);
            }
        }
    }
}

impl Mss {
    /// Layer names referenced by top-level selectors, in source order.
    pub fn layers(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        for block in &self.root.blocks {
            for selector in &block.selectors {
                if !selector.layer.is_empty() && seen.insert(selector.layer.clone()) {
                    names.push(selector.layer.clone());
                }
            }
        }
        names
    }

    /// Resolve the rules applying to a layer, unrestricted by zoom.
    pub fn layer_rules(&self, layer: &str, css_ids: &[String], classes: &[String]) -> Vec<Rule> {
        self.layer_zoom_rules(layer, css_ids, ZoomRange::ALL, classes)
    }

    /// Resolve the rules applying to a layer within `zoom`. The output
    /// is ordered most-specific first (the renderer evaluates rules with
    /// first-match-wins semantics).
    pub fn layer_zoom_rules(
        &self,
        layer: &str,
        css_ids: &[String],
        zoom: ZoomRange,
        classes: &[String],
    ) -> Vec<Rule> {
        let mut collector = Collector {
            css_ids,
            classes,
            attachments: HashMap::new(),
            rules: Vec::new(),
            order: 1,
        };
        let root_rule = Rule { zoom, ..Rule::default() };
        collector.collect(&self.root, &root_rule);

        let mut rules = sorted_rules(collector.rules, &collector.attachments, classes);
        // rules from universal or class-only selector chains carry no
        // layer of their own; they apply to the queried layer
        for rule in rules.iter_mut() {
            if rule.layer.is_empty() {
                rule.layer = layer.to_string();
            }
        }
        rules
    }
}
