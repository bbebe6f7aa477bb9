//! Map document (MML) parsing.
//!
//! An MML document is YAML naming the map (stylesheets, projection,
//! bounds) and its layers; each layer carries classes, css ids, a
//! geometry type, free-form properties, and a data-source descriptor.

mod datasource;

pub use datasource::{
    Dataset, DatasetRaster, Datasource, Gdal, GeoJson, Ogr, PostGis, Shapefile, Sqlite,
};

use serde::Deserialize;
use std::io::Read;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid map document: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryType {
    Unknown,
    LineString,
    Polygon,
    Point,
    Raster,
}

impl GeometryType {
    fn parse(s: &str) -> GeometryType {
        match s {
            "polygon" => GeometryType::Polygon,
            "linestring" => GeometryType::LineString,
            "point" => GeometryType::Point,
            "raster" => GeometryType::Raster,
            _ => GeometryType::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Layer {
    pub id: String,
    /// Layer ids the stylesheet may address this layer by.
    pub css_ids: Vec<String>,
    pub classes: Vec<String>,
    pub srs: Option<String>,
    pub datasource: Option<Datasource>,
    pub geometry: GeometryType,
    pub active: bool,
    pub group_by: String,
    pub clear_label_cache: bool,
    pub cache_features: bool,
    pub scale_factor: f64,
    pub maxzoom: u32,
    pub minzoom: u32,
}

impl Layer {
    /// A bare line layer, addressed by its own id. Used when styles are
    /// compiled without a map document.
    pub fn with_id(id: &str) -> Layer {
        Layer {
            id: id.to_string(),
            css_ids: vec![id.to_string()],
            classes: Vec::new(),
            srs: None,
            datasource: None,
            geometry: GeometryType::LineString,
            active: true,
            group_by: String::new(),
            clear_label_cache: false,
            cache_features: false,
            scale_factor: 0.0,
            maxzoom: 0,
            minzoom: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Mml {
    pub name: String,
    pub layers: Vec<Layer>,
    pub stylesheets: Vec<String>,
    pub srs: Option<String>,
    pub bounds: Option<[f64; 4]>,
    pub scale: u32,
    pub center: Option<[f64; 3]>,
    pub minzoom: u32,
    pub maxzoom: u32,
    pub interactivity: bool,
}

#[derive(Debug, Deserialize)]
struct AuxMml {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Stylesheet", default)]
    stylesheets: Vec<String>,
    #[serde(rename = "Layer", default)]
    layers: Vec<AuxLayer>,
    #[serde(default)]
    srs: Option<String>,
    #[serde(default)]
    bounds: Option<[f64; 4]>,
    #[serde(default)]
    scale: u32,
    #[serde(default)]
    center: Option<[f64; 3]>,
    #[serde(default)]
    minzoom: u32,
    #[serde(default)]
    maxzoom: u32,
    #[serde(default)]
    interactivity: bool,
}

#[derive(Debug, Deserialize)]
struct AuxLayer {
    #[serde(default)]
    datasource: Option<serde_yaml::Mapping>,
    #[serde(default)]
    geometry: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    class: String,
    #[serde(default)]
    css_ids: String,
    #[serde(default)]
    srs: Option<String>,
    #[serde(default)]
    status: String,
    #[serde(default)]
    properties: Option<serde_yaml::Mapping>,
}

fn layer_from_aux(aux: AuxLayer) -> Layer {
    let datasource = aux.datasource.as_ref().and_then(datasource::from_mapping);

    let classes: Vec<String> = aux.class.split_whitespace().map(str::to_string).collect();
    let mut css_ids: Vec<String> = aux.css_ids.split_whitespace().map(str::to_string).collect();
    if css_ids.is_empty() {
        // stylesheets address the layer by its id unless told otherwise
        css_ids.push(aux.id.clone());
    }

    let mut layer = Layer {
        id: aux.id,
        css_ids,
        classes,
        srs: aux.srs,
        datasource,
        geometry: GeometryType::parse(&aux.geometry),
        active: aux.status != "off",
        group_by: String::new(),
        clear_label_cache: false,
        cache_features: false,
        scale_factor: 0.0,
        maxzoom: 0,
        minzoom: 0,
    };

    if let Some(properties) = &aux.properties {
        for (key, value) in properties {
            let Some(name) = key.as_str() else { continue };
            match name {
                "group-by" => {
                    layer.group_by = value.as_str().unwrap_or_default().to_string();
                }
                "clear-label-cache" => {
                    layer.clear_label_cache = value.as_str() == Some("on");
                }
                "cache-features" => {
                    layer.cache_features = value.as_str() == Some("on");
                }
                "scale-factor" => {
                    layer.scale_factor = value.as_f64().unwrap_or(0.0);
                }
                "maxzoom" => {
                    layer.maxzoom = value.as_u64().unwrap_or(0) as u32;
                }
                "minzoom" => {
                    layer.minzoom = value.as_u64().unwrap_or(0) as u32;
                }
                _ => {}
            }
        }
    }
    layer
}

/// Parse a map document from a reader.
pub fn parse(mut reader: impl Read) -> Result<Mml, Error> {
    let mut input = String::new();
    reader.read_to_string(&mut input)?;
    parse_str(&input)
}

/// Parse a map document from a string.
pub fn parse_str(input: &str) -> Result<Mml, Error> {
    let aux: AuxMml = serde_yaml::from_str(input)?;
    Ok(Mml {
        name: aux.name,
        layers: aux.layers.into_iter().map(layer_from_aux).collect(),
        stylesheets: aux.stylesheets,
        srs: aux.srs,
        bounds: aux.bounds,
        scale: aux.scale,
        center: aux.center,
        minzoom: aux.minzoom,
        maxzoom: aux.maxzoom,
        interactivity: aux.interactivity,
    })
}
