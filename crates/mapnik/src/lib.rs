//! Mapnik XML emitter.
//!
//! Consumes resolved rules per layer and assembles the legacy XML style
//! document: map parameters, font sets, styles with filter and
//! scale-denominator bounds, symbolizer records grouped by property
//! prefix, and data-source parameter blocks.

mod sql;
mod symbolizer;
mod xml;

pub use sql::{filter_string, wrap_where};

use xml::Element;

use builder::SharedLocator;
use config::Locator;
use mss::color::Color;
use mss::ZoomRange;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

/// Scale denominators per zoom level for the web-mercator tiling scheme.
pub const WEBMERC_ZOOM_SCALES: [u32; 23] = [
    500_000_000,
    200_000_000,
    100_000_000,
    50_000_000,
    25_000_000,
    12_500_000,
    6_500_000,
    3_000_000,
    1_500_000,
    750_000,
    400_000,
    200_000,
    100_000,
    50_000,
    25_000,
    12_500,
    5_000,
    2_500,
    1_500,
    750,
    500,
    250,
    100,
];

/// Builds a [`Map`] writer per compile; `Maker2` targets the Mapnik 2
/// schema (layer zoom attributes), `Maker3` the current one.
pub struct Maker {
    mapnik2: bool,
}

pub const MAKER2: Maker = Maker { mapnik2: true };
pub const MAKER3: Maker = Maker { mapnik2: false };

impl builder::MapMaker for Maker {
    fn new_map(&self, locator: SharedLocator) -> Box<dyn builder::MapWriter> {
        let mut map = Map::new(locator);
        map.set_mapnik2(self.mapnik2);
        Box::new(map)
    }

    fn kind(&self) -> &'static str {
        "mapnik"
    }

    fn file_suffix(&self) -> &'static str {
        ".xml"
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct RuleDef {
    pub max_scale: Option<u32>,
    pub min_scale: Option<u32>,
    pub filter: Option<String>,
    pub symbolizers: Vec<Element>,
}

#[derive(Clone, Debug, Default)]
struct StyleDef {
    name: String,
    comp_op: Option<String>,
    opacity: Option<f64>,
    rules: Vec<RuleDef>,
}

#[derive(Clone, Debug, Default)]
struct LayerDef {
    name: String,
    srs: Option<String>,
    status_off: bool,
    group_by: String,
    clear_label_cache: bool,
    cache_features: bool,
    max_scale: Option<u32>,
    min_scale: Option<u32>,
    max_zoom: Option<u32>,
    min_zoom: Option<u32>,
    style_names: Vec<String>,
    datasource: Vec<(String, String)>,
}

/// Assembles and serializes one output document.
pub struct Map {
    bg_color: Option<String>,
    srs: String,
    parameters: Vec<(String, String)>,
    font_sets: Vec<(String, Vec<String>)>,
    font_set_index: HashMap<String, String>,
    styles: Vec<StyleDef>,
    layers: Vec<LayerDef>,
    pub(crate) locator: SharedLocator,
    pub(crate) scale_factor: f64,
    auto_type_filter: bool,
    pub(crate) mapnik2: bool,
    zoom_scales: Vec<u32>,
}

impl Map {
    pub fn new(locator: SharedLocator) -> Map {
        Map {
            bg_color: None,
            srs: "+init=epsg:3857".to_string(),
            parameters: Vec::new(),
            font_sets: Vec::new(),
            font_set_index: HashMap::new(),
            styles: Vec::new(),
            layers: Vec::new(),
            locator,
            scale_factor: 1.0,
            auto_type_filter: false,
            mapnik2: false,
            zoom_scales: WEBMERC_ZOOM_SCALES.to_vec(),
        }
    }

    pub fn set_mapnik2(&mut self, enable: bool) {
        self.mapnik2 = enable;
    }

    /// Wrap SQL sources in a subquery restricted to the attribute
    /// values the style matches on.
    pub fn set_auto_type_filter(&mut self, enable: bool) {
        self.auto_type_filter = enable;
    }

    pub fn set_zoom_scales(&mut self, scales: Vec<u32>) {
        self.zoom_scales = scales;
    }

    fn max_scale_for_first(&self, first: u32) -> Option<u32> {
        if first == 0 {
            return None;
        }
        let idx = (first as usize).min(self.zoom_scales.len());
        Some(self.zoom_scales[idx - 1])
    }

    /// Every constrained range whose highest level fits the table gets
    /// a lower bound, so `[zoom>=N]`-only rules bottom out at the last
    /// table entry.
    fn min_scale_for_last(&self, last: u32) -> Option<u32> {
        let idx = last as usize;
        if idx >= self.zoom_scales.len() {
            return None;
        }
        Some(self.zoom_scales[idx])
    }

    fn new_style(&mut self, name: &str, rules: &[mss::Rule]) -> StyleDef {
        let mut style = StyleDef {
            name: name.to_string(),
            ..StyleDef::default()
        };
        for rule in rules {
            if let Some(comp_op) = rule.properties.get_string("comp-op") {
                style.comp_op = Some(comp_op);
            }
            if let Some(opacity) = rule.properties.get_float("opacity") {
                style.opacity = Some(opacity);
            }
            let rule_def = self.new_rule(rule);
            style.rules.push(rule_def);
        }
        style
    }

    fn new_rule(&mut self, rule: &mss::Rule) -> RuleDef {
        let mut out = RuleDef::default();
        if rule.zoom != ZoomRange::ALL {
            if let Some(first) = rule.zoom.first() {
                out.max_scale = self.max_scale_for_first(first);
            }
            if let Some(last) = rule.zoom.last() {
                out.min_scale = self.min_scale_for_last(last);
            }
        }
        let filter = symbolizer::fmt_filters(&rule.filters);
        if !filter.is_empty() {
            out.filter = Some(filter);
        }

        let mut props = rule.properties.clone();
        for prefix in props.sorted_prefixes(&symbolizer::SYMBOLIZER_PREFIXES) {
            props.set_default_instance(&prefix.instance);
            match prefix.name.as_str() {
                "line-" => self.add_line_symbolizer(&mut out, &props),
                "line-pattern-" => self.add_line_pattern_symbolizer(&mut out, &props),
                "polygon-" | "fill-" => self.add_polygon_symbolizer(&mut out, &props),
                "polygon-pattern-" => self.add_polygon_pattern_symbolizer(&mut out, &props),
                "text-" => self.add_text_symbolizer(&mut out, &props),
                "shield-" => self.add_shield_symbolizer(&mut out, &props),
                "marker-" => self.add_marker_symbolizer(&mut out, &props),
                "point-" => self.add_point_symbolizer(&mut out, &props),
                "building-" => self.add_building_symbolizer(&mut out, &props),
                "dot-" => self.add_dot_symbolizer(&mut out, &props),
                "raster-" => self.add_raster_symbolizer(&mut out, &props),
                other => log::warn!(target: "mapnik", "invalid symbolizer prefix {other}"),
            }
        }
        out
    }

    /// Font-set name for a face list, interning new combinations.
    pub(crate) fn font_set_name(&mut self, faces: &[String]) -> String {
        let key = faces.join("|");
        if let Some(name) = self.font_set_index.get(&key) {
            return name.clone();
        }
        let name = format!("fontset-{}", self.font_sets.len() + 1);
        self.font_set_index.insert(key, name.clone());
        self.font_sets.push((name.clone(), faces.to_vec()));
        name
    }

    fn new_datasource(
        &mut self,
        datasource: &mml::Datasource,
        rules: &[mss::Rule],
    ) -> Vec<(String, String)> {
        use mml::Datasource::*;
        let params: Vec<(&str, String)> = match datasource {
            PostGis(ds) => {
                let ds = self.locator.borrow().postgis(ds.clone());
                vec![
                    ("host", ds.host),
                    ("port", ds.port),
                    ("geometry_field", ds.geometry_field),
                    ("dbname", ds.database),
                    ("user", ds.username),
                    ("password", ds.password),
                    ("extent", ds.extent),
                    ("table", pq_select_string(&ds.query, rules, self.auto_type_filter)),
                    ("srid", ds.srid),
                    ("type", "postgis".to_string()),
                ]
            }
            Shapefile(ds) => {
                let file = self.locator.borrow_mut().shape(&ds.filename);
                vec![("file", file), ("type", "shape".to_string())]
            }
            Sqlite(ds) => {
                let file = self.locator.borrow_mut().sqlite(&ds.filename);
                vec![
                    ("file", file),
                    ("srid", ds.srid.clone()),
                    ("extent", ds.extent.clone()),
                    ("geometry_field", ds.geometry_field.clone()),
                    ("table", ds.query.clone()),
                    ("type", "sqlite".to_string()),
                ]
            }
            Ogr(ds) => {
                let file = if is_ogr_connection(&ds.filename) {
                    ds.filename.clone()
                } else {
                    self.locator.borrow_mut().data(&ds.filename)
                };
                vec![
                    ("file", file),
                    ("srid", ds.srid.clone()),
                    ("extent", ds.extent.clone()),
                    ("layer", ds.layer.clone()),
                    ("layer_by_sql", ds.query.clone()),
                    ("type", "ogr".to_string()),
                ]
            }
            Gdal(ds) => {
                let file = self.locator.borrow_mut().data(&ds.filename);
                vec![
                    ("file", file),
                    ("srid", ds.srid.clone()),
                    ("extent", ds.extent.clone()),
                    ("band", ds.band.clone()),
                    ("type", "gdal".to_string()),
                ]
            }
            GeoJson(ds) => {
                let file = self.locator.borrow_mut().shape(&ds.filename);
                vec![("file", file), ("type", "geojson".to_string())]
            }
            Dataset(ds) => vec![
                ("id", ds.id.clone()),
                ("type", ds.kind.clone()),
                ("name", ds.name.clone()),
            ],
            DatasetRaster(ds) => vec![
                ("id", ds.id.clone()),
                ("name", ds.name.clone()),
                ("type", ds.kind.clone()),
                ("multi", ds.multi.to_string()),
                ("lox", ds.lox.to_string()),
                ("loy", ds.loy.to_string()),
                ("hix", ds.hix.to_string()),
                ("hiy", ds.hiy.to_string()),
                ("tilesize", ds.tilesize.to_string()),
                ("tile_stride", ds.tile_stride.to_string()),
            ],
        };
        // empty-valued parameters are dropped
        params
            .into_iter()
            .filter(|(_, value)| !value.is_empty())
            .map(|(name, value)| (name.to_string(), value))
            .collect()
    }

    fn write_document(&self, out: &mut dyn io::Write) -> io::Result<()> {
        let mut map = Element::new("Map");
        map.set_opt("background-color", self.bg_color.clone());
        map.set("srs", self.srs.clone());

        if !self.parameters.is_empty() {
            let mut parameters = Element::new("Parameters");
            for (name, value) in &self.parameters {
                let mut parameter = Element::new("Parameter");
                parameter.set("name", name.clone());
                parameter.add_text(value);
                parameters.add(parameter);
            }
            map.add(parameters);
        }

        for (name, faces) in &self.font_sets {
            let mut font_set = Element::new("FontSet");
            font_set.set("name", name.clone());
            for face in faces {
                let mut font = Element::new("Font");
                font.set("face-name", face.clone());
                font_set.add(font);
            }
            map.add(font_set);
        }

        for style in &self.styles {
            let mut style_el = Element::new("Style");
            style_el.set("name", style.name.clone());
            style_el.set("filter-mode", "first");
            style_el.set_opt("comp-op", style.comp_op.clone());
            style_el.set_opt("opacity", style.opacity.map(|v| v.to_string()));
            for rule in &style.rules {
                let mut rule_el = Element::new("Rule");
                if let Some(max_scale) = rule.max_scale {
                    let mut e = Element::new("MaxScaleDenominator");
                    e.add_text(&max_scale.to_string());
                    rule_el.add(e);
                }
                if let Some(min_scale) = rule.min_scale {
                    let mut e = Element::new("MinScaleDenominator");
                    e.add_text(&min_scale.to_string());
                    rule_el.add(e);
                }
                if let Some(filter) = &rule.filter {
                    let mut e = Element::new("Filter");
                    e.add_cdata(filter);
                    rule_el.add(e);
                }
                for symbolizer in &rule.symbolizers {
                    rule_el.add(symbolizer.clone());
                }
                style_el.add(rule_el);
            }
            map.add(style_el);
        }

        for layer in &self.layers {
            let mut layer_el = Element::new("Layer");
            layer_el.set("name", layer.name.clone());
            layer_el.set_opt("srs", layer.srs.clone());
            if layer.status_off {
                layer_el.set("status", "off");
            }
            if !layer.group_by.is_empty() {
                layer_el.set("group-by", layer.group_by.clone());
            }
            if layer.clear_label_cache {
                layer_el.set("clear-label-cache", "on");
            }
            if layer.cache_features {
                layer_el.set("cache-features", "true");
            }
            if self.mapnik2 {
                layer_el.set_opt("maxzoom", layer.max_zoom.map(|v| v.to_string()));
                layer_el.set_opt("minzoom", layer.min_zoom.map(|v| v.to_string()));
            } else {
                layer_el.set_opt(
                    "maximum-scale-denominator",
                    layer.max_scale.map(|v| v.to_string()),
                );
                layer_el.set_opt(
                    "minimum-scale-denominator",
                    layer.min_scale.map(|v| v.to_string()),
                );
            }
            for style_name in &layer.style_names {
                let mut e = Element::new("StyleName");
                e.add_text(style_name);
                layer_el.add(e);
            }
            if !layer.datasource.is_empty() {
                let mut datasource = Element::new("Datasource");
                for (name, value) in &layer.datasource {
                    let mut parameter = Element::new("Parameter");
                    parameter.set("name", name.clone());
                    parameter.add_text(value);
                    datasource.add(parameter);
                }
                layer_el.add(datasource);
            }
            map.add(layer_el);
        }

        map.write(out)
    }
}

impl builder::Map for Map {
    fn add_layer(&mut self, layer: &mml::Layer, rules: &[mss::Rule]) {
        let prev_scale_factor = self.scale_factor;
        if layer.scale_factor != 0.0 {
            self.scale_factor = layer.scale_factor;
        }

        let mut out = LayerDef {
            name: layer.id.clone(),
            srs: layer.srs.clone(),
            status_off: !layer.active,
            group_by: layer.group_by.clone(),
            clear_label_cache: layer.clear_label_cache,
            cache_features: layer.cache_features,
            ..LayerDef::default()
        };

        if !rules.is_empty() {
            let style = self.new_style(&layer.id, rules);
            out.style_names.push(style.name.clone());
            self.styles.push(style);

            // layer-level zoom bounds act as an override when the map
            // document sets them
            if self.mapnik2 {
                if layer.maxzoom > 0 {
                    out.max_zoom = Some(layer.maxzoom);
                }
                if layer.minzoom > 0 {
                    out.min_zoom = Some(layer.minzoom);
                }
            } else {
                if layer.minzoom > 0 {
                    out.max_scale = self.max_scale_for_first(layer.minzoom);
                }
                if layer.maxzoom > 0 {
                    out.min_scale = self.min_scale_for_last(layer.maxzoom);
                }
            }

            if let Some(datasource) = &layer.datasource {
                out.datasource = self.new_datasource(datasource, rules);
            }
        }
        self.layers.push(out);
        self.scale_factor = prev_scale_factor;
    }

    fn add_parameters(&mut self, mml: &mml::Mml) {
        if let Some(srs) = &mml.srs {
            self.srs = srs.clone();
        }
        if let Some(bounds) = mml.bounds {
            self.parameters.push((
                "bounds".to_string(),
                format!("{},{},{},{}", bounds[0], bounds[1], bounds[2], bounds[3]),
            ));
        }
        if let Some(center) = mml.center {
            self.parameters.push((
                "center".to_string(),
                format!("{},{},{}", center[0], center[1], center[2]),
            ));
        }
        if mml.scale != 0 {
            self.parameters.push(("scale".to_string(), mml.scale.to_string()));
        }
        if mml.minzoom != 0 {
            self.parameters.push(("minzoom".to_string(), mml.minzoom.to_string()));
        }
        if mml.maxzoom != 0 {
            self.parameters.push(("maxzoom".to_string(), mml.maxzoom.to_string()));
        }
        self.parameters
            .push(("interactivity".to_string(), mml.interactivity.to_string()));
    }

    fn set_background_color(&mut self, color: Color) {
        self.bg_color = Some(symbolizer::fmt_color(color));
    }
}

impl builder::Writer for Map {
    fn write(&self, writer: &mut dyn io::Write) -> io::Result<()> {
        self.write_document(writer)
    }

    fn write_file(&self, path: &Path) -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        self.write_document(&mut file)
    }
}

impl builder::MapWriter for Map {}

fn pq_select_string(query: &str, rules: &[mss::Rule], auto_type_filter: bool) -> String {
    if !auto_type_filter {
        return query.to_string();
    }
    wrap_where(query, &filter_string(rules))
}

/// Whether a string is an OGR connection (`PG:...`) rather than a
/// filename.
fn is_ogr_connection(s: &str) -> bool {
    match s.find(':') {
        Some(idx) if idx >= 2 => s[..idx].bytes().all(|b| b.is_ascii_alphabetic()),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ogr_connection_detection() {
        assert!(is_ogr_connection("PG:dbname=gis"));
        assert!(is_ogr_connection("MySQL:db"));
        assert!(!is_ogr_connection("C:file.gpkg"));
        assert!(!is_ogr_connection("data.gpkg"));
        assert!(!is_ogr_connection("dir/data.gpkg"));
    }
}
