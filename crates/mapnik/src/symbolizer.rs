//! Symbolizer records: one builder per property prefix, each gated on
//! the property that makes the symbolizer meaningful.

use crate::xml::Element;
use crate::{Map, RuleDef};
use config::Locator;
use mss::color::Color;
use mss::{CompOp, Filter, Properties, Value};

/// Prefixes grouping declarations into symbolizer records, in dispatch
/// order. `sorted_prefixes` orders the actual emission by declaration
/// position.
pub(crate) const SYMBOLIZER_PREFIXES: [&str; 12] = [
    "line-",
    "polygon-",
    "fill-",
    "polygon-pattern-",
    "text-",
    "shield-",
    "marker-",
    "point-",
    "building-",
    "dot-",
    "raster-",
    "line-pattern-",
];

pub(crate) fn fmt_float(v: f64) -> String {
    format!("{v}")
}

fn fmt_bool(v: bool) -> String {
    v.to_string()
}

pub(crate) fn fmt_color(color: Color) -> String {
    color.to_string()
}

/// Join a field expression list: attribute references verbatim, string
/// members single-quoted.
fn fmt_field(values: &[Value]) -> String {
    let parts: Vec<String> = values
        .iter()
        .filter_map(|value| match value {
            Value::Field(f) => Some(f.clone()),
            Value::Str(s) => Some(format!("'{s}'")),
            _ => None,
        })
        .collect();
    parts.join(" + ")
}

fn fmt_pattern(values: &[f64], scale: f64) -> String {
    let parts: Vec<String> = values.iter().map(|v| fmt_float(v * scale)).collect();
    parts.join(", ")
}

/// Filter expression text (wrapped in CDATA by the serializer). Fields
/// are unquoted in brackets, strings single-quoted, `=~` rendered as a
/// regex match call, the rest infix.
pub(crate) fn fmt_filters(filters: &[Filter]) -> String {
    let mut parts = Vec::with_capacity(filters.len());
    for filter in filters {
        let value = match &filter.value {
            Value::Null => "null".to_string(),
            Value::Str(s) => format!("'{s}'"),
            Value::Num(v) => fmt_float(*v),
            Value::Bool(b) => b.to_string(),
            other => {
                log::warn!(target: "mapnik", "unsupported filter value: {other}");
                String::new()
            }
        };
        let field = filter.field.trim_matches('"');
        if filter.op == CompOp::Regex {
            parts.push(format!("([{field}].match({value}))"));
        } else {
            parts.push(format!("([{field}] {} {value})", filter.op));
        }
    }
    parts.join(" and ")
}

/// Color properties accept either a color value or a passthrough
/// string (e.g. a named color the renderer resolves itself).
fn color_or_string(props: &Properties, name: &str) -> Option<String> {
    if let Some(color) = props.get_color(name) {
        return Some(fmt_color(color));
    }
    props.get_string(name)
}

fn float_prop(props: &Properties, name: &str, scale: f64) -> Option<String> {
    props.get_float(name).map(|v| fmt_float(v * scale))
}

fn float_attr(props: &Properties, name: &str) -> Option<String> {
    props.get_float(name).map(fmt_float)
}

fn bool_attr(props: &Properties, name: &str) -> Option<String> {
    props.get_bool(name).map(fmt_bool)
}

impl Map {
    pub(crate) fn add_line_symbolizer(&mut self, rule: &mut RuleDef, p: &Properties) {
        let Some(width) = p.get_float("line-width") else {
            return;
        };
        if width == 0.0 {
            return;
        }
        let mut e = Element::new("LineSymbolizer");
        e.set("stroke-width", fmt_float(width * self.scale_factor));
        e.set_opt("stroke", color_or_string(p, "line-color"));
        e.set_opt("clip", bool_attr(p, "line-clip"));
        if let Some(dashes) = p.get_float_list("line-dasharray") {
            e.set("stroke-dasharray", fmt_pattern(&dashes, self.scale_factor));
        }
        if let Some(offsets) = p.get_float_list("line-dash-offset") {
            e.set("stroke-dashoffset", fmt_pattern(&offsets, self.scale_factor));
        }
        e.set_opt("stroke-gamma", float_attr(p, "line-gamma"));
        e.set_opt("stroke-gamma-method", p.get_string("line-gamma-method"));
        e.set_opt("stroke-linecap", p.get_string("line-cap"));
        e.set_opt("stroke-miterlimit", float_prop(p, "line-miterlimit", self.scale_factor));
        e.set_opt("stroke-linejoin", p.get_string("line-join"));
        e.set_opt("offset", float_prop(p, "line-offset", self.scale_factor));
        e.set_opt("stroke-opacity", float_attr(p, "line-opacity"));
        e.set_opt("rasterizer", p.get_string("line-rasterizer"));
        e.set_opt("simplify", float_attr(p, "line-simplify"));
        e.set_opt("simplify-algorithm", p.get_string("line-simplify-algorithm"));
        e.set_opt("smooth", float_attr(p, "line-smooth"));
        e.set_opt("comp-op", p.get_string("line-comp-op"));
        e.set_opt("geometry-transform", p.get_string("line-geometry-transform"));
        rule.symbolizers.push(e);
    }

    pub(crate) fn add_line_pattern_symbolizer(&mut self, rule: &mut RuleDef, p: &Properties) {
        let Some(file) = p.get_string("line-pattern-file") else {
            return;
        };
        let mut e = Element::new("LinePatternSymbolizer");
        let fname = self.locator.borrow_mut().image(&file);
        e.set("file", fname);
        e.set_opt("offset", float_prop(p, "line-pattern-offset", self.scale_factor));
        e.set_opt("clip", bool_attr(p, "line-pattern-clip"));
        e.set_opt("simplify", float_attr(p, "line-pattern-simplify"));
        e.set_opt("simplify-algorithm", p.get_string("line-pattern-simplify-algorithm"));
        e.set_opt("smooth", float_attr(p, "line-pattern-smooth"));
        e.set_opt("geometry-transform", p.get_string("line-pattern-geometry-transform"));
        e.set_opt("comp-op", p.get_string("line-pattern-comp-op"));
        if !self.mapnik2 {
            e.set_opt("opacity", float_attr(p, "line-pattern-opacity"));
        }
        rule.symbolizers.push(e);
    }

    pub(crate) fn add_polygon_symbolizer(&mut self, rule: &mut RuleDef, p: &Properties) {
        let Some(fill) = color_or_string(p, "polygon-fill") else {
            return;
        };
        let mut e = Element::new("PolygonSymbolizer");
        e.set("fill", fill);
        let opacity = p
            .get_float("fill-opacity")
            .or_else(|| p.get_float("polygon-opacity"));
        e.set_opt("fill-opacity", opacity.map(fmt_float));
        e.set_opt("gamma", float_attr(p, "polygon-gamma"));
        e.set_opt("gamma-method", p.get_string("polygon-gamma-method"));
        e.set_opt("clip", bool_attr(p, "polygon-clip"));
        e.set_opt("simplify", float_attr(p, "polygon-simplify"));
        e.set_opt("simplify-algorithm", p.get_string("polygon-simplify-algorithm"));
        e.set_opt("smooth", float_attr(p, "polygon-smooth"));
        e.set_opt("geometry-transform", p.get_string("polygon-geometry-transform"));
        e.set_opt("comp-op", p.get_string("polygon-comp-op"));
        rule.symbolizers.push(e);
    }

    pub(crate) fn add_polygon_pattern_symbolizer(&mut self, rule: &mut RuleDef, p: &Properties) {
        let Some(file) = p.get_string("polygon-pattern-file") else {
            return;
        };
        let mut e = Element::new("PolygonPatternSymbolizer");
        let fname = self.locator.borrow_mut().image(&file);
        e.set("file", fname);
        e.set_opt("alignment", p.get_string("polygon-pattern-alignment"));
        e.set_opt("gamma", float_attr(p, "polygon-pattern-gamma"));
        e.set_opt("opacity", float_attr(p, "polygon-pattern-opacity"));
        e.set_opt("clip", bool_attr(p, "polygon-pattern-clip"));
        e.set_opt("simplify", float_attr(p, "polygon-pattern-simplify"));
        e.set_opt("simplify-algorithm", p.get_string("polygon-pattern-simplify-algorithm"));
        e.set_opt("smooth", float_attr(p, "polygon-pattern-smooth"));
        e.set_opt("geometry-transform", p.get_string("polygon-pattern-geometry-transform"));
        e.set_opt("comp-op", p.get_string("polygon-pattern-comp-op"));
        rule.symbolizers.push(e);
    }

    pub(crate) fn add_text_symbolizer(&mut self, rule: &mut RuleDef, p: &Properties) {
        let Some(name) = p.get_field_list("text-name").map(|f| fmt_field(&f)) else {
            return;
        };
        if name.is_empty() {
            return;
        }
        let mut e = Element::new("TextSymbolizer");
        e.set_opt("size", float_prop(p, "text-size", self.scale_factor));
        e.set_opt("fill", color_or_string(p, "text-fill"));
        e.set_opt("avoid-edges", bool_attr(p, "text-avoid-edges"));
        e.set_opt("halo-fill", color_or_string(p, "text-halo-fill"));
        e.set_opt("halo-radius", float_prop(p, "text-halo-radius", self.scale_factor));
        e.set_opt("halo-rasterizer", p.get_string("text-halo-rasterizer"));
        e.set_opt("opacity", float_attr(p, "text-opacity"));
        e.set_opt("wrap-character", p.get_string("text-wrap-character"));
        e.set_opt("wrap-before", p.get_string("text-wrap-before"));
        e.set_opt("wrap-width", float_prop(p, "text-wrap-width", self.scale_factor));
        e.set_opt("text-ratio", float_attr(p, "text-ratio"));
        e.set_opt("max-char-angle-delta", float_attr(p, "text-max-char-angle-delta"));
        e.set_opt("placement", p.get_string("text-placement"));
        e.set_opt("placement-type", p.get_string("text-placement-type"));
        e.set_opt("placements", p.get_string("text-placements"));
        e.set_opt(
            "label-position-tolerance",
            float_prop(p, "text-label-position-tolerance", self.scale_factor),
        );
        e.set_opt("vertical-alignment", p.get_string("text-vertical-alignment"));
        e.set_opt("horizontal-alignment", p.get_string("text-horizontal-alignment"));
        e.set_opt("justify-alignment", p.get_string("text-justify-alignment"));
        e.set_opt("comp-op", p.get_string("text-comp-op"));
        e.set_opt("dx", float_prop(p, "text-dx", self.scale_factor));
        e.set_opt("dy", float_prop(p, "text-dy", self.scale_factor));
        if let Some(orientation) = p.get_float("text-orientation") {
            e.set("orientation", fmt_float(orientation));
        } else if let Some(fields) = p.get_field_list("text-orientation") {
            e.set("orientation", fmt_field(&fields));
        }
        e.set_opt(
            "character-spacing",
            float_prop(p, "text-character-spacing", self.scale_factor),
        );
        e.set_opt("line-spacing", float_prop(p, "text-line-spacing", self.scale_factor));
        e.set_opt("allow-overlap", bool_attr(p, "text-allow-overlap"));
        // spacing between repeated labels
        e.set_opt("spacing", float_prop(p, "text-spacing", self.scale_factor));
        // min distance to other labels, does not work with placement-line
        e.set_opt(
            "minimum-distance",
            float_prop(p, "text-min-distance", self.scale_factor),
        );
        e.set_opt("minimum-padding", float_prop(p, "text-min-padding", self.scale_factor));
        e.set_opt(
            "minimum-path-length",
            float_prop(p, "text-min-path-length", self.scale_factor),
        );
        e.set_opt("clip", bool_attr(p, "text-clip"));
        e.set_opt("text-transform", p.get_string("text-transform"));
        if let Some(faces) = p.get_string_list("text-face-name") {
            let fontset = self.font_set_name(&faces);
            e.set("fontset-name", fontset);
        }
        if !self.mapnik2 {
            e.set_opt("halo-opacity", float_attr(p, "text-halo-opacity"));
            e.set_opt("halo-transform", p.get_string("text-halo-transform"));
            e.set_opt("halo-comp-op", p.get_string("text-halo-comp-op"));
            e.set_opt("repeat-wrap-character", bool_attr(p, "text-repeat-wrap-character"));
            e.set_opt("margin", float_prop(p, "text-margin", self.scale_factor));
            e.set_opt("simplify", float_attr(p, "text-simplify"));
            e.set_opt("simplify-algorithm", p.get_string("text-simplify-algorithm"));
            e.set_opt("smooth", float_attr(p, "text-smooth"));
            e.set_opt("rotate-displacement", bool_attr(p, "text-rotate-displacement"));
            e.set_opt("upright", p.get_string("text-upright"));
            e.set_opt("font-feature-settings", p.get_string("font-feature-settings"));
            e.set_opt("largest-bbox-only", bool_attr(p, "text-largest-bbox-only"));
            e.set_opt(
                "repeat-distance",
                float_prop(p, "text-repeat-distance", self.scale_factor),
            );
        }
        e.add_text(&name);
        rule.symbolizers.push(e);
    }

    pub(crate) fn add_shield_symbolizer(&mut self, rule: &mut RuleDef, p: &Properties) {
        let Some(file) = p.get_string("shield-file") else {
            return;
        };
        let mut e = Element::new("ShieldSymbolizer");
        let fname = self.locator.borrow_mut().image(&file);
        e.set("file", fname);
        e.set_opt("size", float_prop(p, "shield-size", self.scale_factor));
        e.set_opt("fill", color_or_string(p, "shield-fill"));
        e.set_opt("text-opacity", float_attr(p, "shield-text-opacity"));
        e.set_opt("opacity", float_attr(p, "shield-opacity"));
        e.set_opt("transform", p.get_string("shield-transform"));
        e.set_opt("comp-op", p.get_string("shield-comp-op"));
        e.set_opt("placement", p.get_string("shield-placement"));
        e.set_opt("placement-type", p.get_string("shield-placement-type"));
        e.set_opt("placements", p.get_string("shield-placements"));
        e.set_opt("unlock-image", bool_attr(p, "shield-unlock-image"));
        e.set_opt("horizontal-alignment", p.get_string("shield-horizontal-alignment"));
        e.set_opt("vertical-alignment", p.get_string("shield-vertical-alignment"));
        e.set_opt("justify-alignment", p.get_string("shield-justify-alignment"));
        e.set_opt("clip", bool_attr(p, "shield-clip"));
        e.set_opt("allow-overlap", bool_attr(p, "shield-allow-overlap"));
        e.set_opt("avoid-edges", bool_attr(p, "shield-avoid-edges"));
        e.set_opt("halo-fill", color_or_string(p, "shield-halo-fill"));
        e.set_opt("halo-radius", float_prop(p, "shield-halo-radius", self.scale_factor));
        e.set_opt("halo-rasterizer", p.get_string("shield-halo-rasterizer"));
        e.set_opt(
            "character-spacing",
            float_prop(p, "shield-character-spacing", self.scale_factor),
        );
        e.set_opt("wrap-character", p.get_string("shield-wrap-character"));
        e.set_opt("wrap-before", bool_attr(p, "shield-wrap-before"));
        e.set_opt("wrap-width", float_prop(p, "shield-wrap-width", self.scale_factor));
        e.set_opt("line-spacing", float_prop(p, "shield-line-spacing", self.scale_factor));
        e.set_opt("dx", float_prop(p, "shield-dx", self.scale_factor));
        e.set_opt("dy", float_prop(p, "shield-dy", self.scale_factor));
        e.set_opt("shield-dx", float_prop(p, "shield-text-dx", self.scale_factor));
        e.set_opt("shield-dy", float_prop(p, "shield-text-dy", self.scale_factor));
        e.set_opt("text-transform", p.get_string("shield-text-transform"));
        e.set_opt("spacing", float_prop(p, "shield-spacing", self.scale_factor));
        e.set_opt(
            "minimum-distance",
            float_prop(p, "shield-min-distance", self.scale_factor),
        );
        e.set_opt(
            "minimum-padding",
            float_prop(p, "shield-min-padding", self.scale_factor),
        );
        if let Some(faces) = p.get_string_list("shield-face-name") {
            let fontset = self.font_set_name(&faces);
            e.set("fontset-name", fontset);
        }
        if !self.mapnik2 {
            e.set_opt("halo-transform", p.get_string("shield-halo-transform"));
            e.set_opt("halo-comp-op", p.get_string("shield-halo-comp-op"));
            e.set_opt("halo-opacity", float_attr(p, "shield-halo-opacity"));
            e.set_opt(
                "label-position-tolerance",
                float_prop(p, "shield-label-position-tolerance", self.scale_factor),
            );
            e.set_opt("margin", float_prop(p, "shield-margin", self.scale_factor));
            e.set_opt(
                "repeat-distance",
                float_prop(p, "shield-repeat-distance", self.scale_factor),
            );
            e.set_opt("simplify", float_attr(p, "shield-simplify"));
            e.set_opt("simplify-algorithm", p.get_string("shield-simplify-algorithm"));
            e.set_opt("smooth", float_attr(p, "shield-smooth"));
        }
        if let Some(name) = p.get_field_list("shield-name").map(|f| fmt_field(&f)) {
            if !name.is_empty() {
                e.add_text(&name);
            }
        }
        rule.symbolizers.push(e);
    }

    pub(crate) fn add_marker_symbolizer(&mut self, rule: &mut RuleDef, p: &Properties) {
        let mut e = Element::new("MarkersSymbolizer");
        e.set_opt("width", float_prop(p, "marker-width", self.scale_factor));
        e.set_opt("height", float_prop(p, "marker-height", self.scale_factor));
        let fill = color_or_string(p, "marker-fill");
        e.set_opt("fill", fill.clone());
        e.set_opt("fill-opacity", float_attr(p, "marker-fill-opacity"));
        e.set_opt("opacity", float_attr(p, "marker-opacity"));
        e.set_opt("placement", p.get_string("marker-placement"));
        e.set_opt("transform", p.get_string("marker-transform"));
        e.set_opt("geometry-transform", p.get_string("marker-geometry-transform"));
        e.set_opt("spacing", float_prop(p, "marker-spacing", self.scale_factor));
        let stroke = color_or_string(p, "marker-line-fill");
        e.set_opt("stroke", stroke.clone());
        e.set_opt("stroke-opacity", float_attr(p, "marker-line-opacity"));
        let stroke_width = float_prop(p, "marker-line-width", self.scale_factor);
        e.set_opt("stroke-width", stroke_width.clone());
        e.set_opt("allow-overlap", bool_attr(p, "marker-allow-overlap"));
        e.set_opt("multi-policy", p.get_string("marker-multi-policy"));
        e.set_opt("ignore-placement", bool_attr(p, "marker-ignore-placement"));
        e.set_opt("max-error", float_prop(p, "marker-max-error", self.scale_factor));
        e.set_opt("clip", bool_attr(p, "marker-clip"));
        e.set_opt("smooth", float_attr(p, "marker-smooth"));
        e.set_opt("comp-op", p.get_string("marker-comp-op"));

        if let Some(file) = p.get_string("marker-file") {
            let fname = self.locator.borrow_mut().image(&file);
            e.set("file", fname);
        } else {
            match p.get_string("marker-type") {
                Some(marker_type) => e.set("marker-type", marker_type),
                None => {
                    // ellipse is the implied default; it needs at least a
                    // fill, stroke or stroke width to be visible
                    if fill.is_none() && stroke.is_none() && stroke_width.is_none() {
                        return;
                    }
                    e.set("marker-type", "ellipse");
                }
            }
        }

        if !self.mapnik2 {
            e.set_opt("avoid-edges", bool_attr(p, "marker-avoid-edges"));
            e.set_opt("simplify", float_attr(p, "marker-simplify"));
            e.set_opt("simplify-algorithm", p.get_string("marker-simplify-algorithm"));
            e.set_opt("offset", float_prop(p, "marker-offset", self.scale_factor));
            e.set_opt("direction", p.get_string("marker-direction"));
        }
        rule.symbolizers.push(e);
    }

    pub(crate) fn add_point_symbolizer(&mut self, rule: &mut RuleDef, p: &Properties) {
        let Some(file) = p.get_string("point-file") else {
            return;
        };
        let mut e = Element::new("PointSymbolizer");
        let fname = self.locator.borrow_mut().image(&file);
        e.set("file", fname);
        e.set_opt("allow-overlap", bool_attr(p, "point-allow-overlap"));
        e.set_opt("opacity", float_attr(p, "point-opacity"));
        e.set_opt("transform", p.get_string("point-transform"));
        e.set_opt("ignore-placement", bool_attr(p, "point-ignore-placement"));
        e.set_opt("placement", p.get_string("point-placement"));
        e.set_opt("comp-op", p.get_string("point-comp-op"));
        rule.symbolizers.push(e);
    }

    pub(crate) fn add_building_symbolizer(&mut self, rule: &mut RuleDef, p: &Properties) {
        let Some(fill) = color_or_string(p, "building-fill") else {
            return;
        };
        let mut e = Element::new("BuildingSymbolizer");
        e.set("fill", fill);
        e.set_opt("fill-opacity", float_attr(p, "building-fill-opacity"));
        e.set_opt("height", float_prop(p, "building-height", self.scale_factor));
        rule.symbolizers.push(e);
    }

    pub(crate) fn add_dot_symbolizer(&mut self, rule: &mut RuleDef, p: &Properties) {
        if self.mapnik2 {
            return;
        }
        let Some(fill) = color_or_string(p, "dot-fill") else {
            return;
        };
        let mut e = Element::new("DotSymbolizer");
        e.set("fill", fill);
        e.set_opt("opacity", float_attr(p, "dot-opacity"));
        e.set_opt("width", float_prop(p, "dot-width", self.scale_factor));
        e.set_opt("height", float_prop(p, "dot-height", self.scale_factor));
        e.set_opt("comp-op", p.get_string("dot-comp-op"));
        rule.symbolizers.push(e);
    }

    pub(crate) fn add_raster_symbolizer(&mut self, rule: &mut RuleDef, p: &Properties) {
        if p.get_float("raster-opacity") == Some(0.0) {
            return;
        }
        let mut e = Element::new("RasterSymbolizer");
        e.set_opt("opacity", float_attr(p, "raster-opacity"));
        e.set_opt("mesh-size", float_attr(p, "raster-mesh-size"));
        e.set_opt("filter-factor", float_attr(p, "raster-filter-factor"));
        e.set_opt("comp-op", p.get_string("raster-comp-op"));
        e.set_opt("scaling", p.get_string("raster-scaling"));

        let stops = p.get_stop_list("raster-colorizer-stops");
        let default_mode = p.get_string("raster-colorizer-default-mode");
        let default_color = color_or_string(p, "raster-colorizer-default-color");
        let epsilon = float_attr(p, "raster-colorizer-epsilon");
        if stops.is_some() || default_mode.is_some() || default_color.is_some() {
            let mut colorizer = Element::new("RasterColorizer");
            colorizer.set_opt("default-mode", default_mode);
            colorizer.set_opt("default-color", default_color);
            colorizer.set_opt("epsilon", epsilon);
            for stop in stops.unwrap_or_default() {
                let mut stop_el = Element::new("stop");
                stop_el.set("value", fmt_float(stop.value));
                stop_el.set("color", fmt_color(stop.color));
                colorizer.add(stop_el);
            }
            e.add(colorizer);
        }
        rule.symbolizers.push(e);
    }
}
