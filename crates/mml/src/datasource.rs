//! Data-source descriptors attached to map layers.
//!
//! Map documents describe sources duck-typed as a mapping with a `type`
//! key; [`from_mapping`] coerces that into the tagged variants below.

use serde_yaml::{Mapping, Value};
use std::collections::HashMap;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PostGis {
    pub host: String,
    pub port: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// The table name or subquery.
    pub query: String,
    pub srid: String,
    pub geometry_field: String,
    pub extent: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Shapefile {
    pub filename: String,
    pub srid: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sqlite {
    pub filename: String,
    pub srid: String,
    pub query: String,
    pub geometry_field: String,
    pub extent: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Ogr {
    pub filename: String,
    pub srid: String,
    pub layer: String,
    pub query: String,
    pub extent: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Gdal {
    pub filename: String,
    pub srid: String,
    pub extent: String,
    pub band: String,
    pub processing: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GeoJson {
    pub filename: String,
}

/// Passthrough source resolved by the hosting application.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub kind: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatasetRaster {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub multi: bool,
    pub lox: f64,
    pub loy: f64,
    pub hix: f64,
    pub hiy: f64,
    pub tilesize: u32,
    pub tile_stride: u32,
    pub zoom: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Datasource {
    PostGis(PostGis),
    Shapefile(Shapefile),
    Sqlite(Sqlite),
    Ogr(Ogr),
    Gdal(Gdal),
    GeoJson(GeoJson),
    Dataset(Dataset),
    DatasetRaster(DatasetRaster),
}

fn scalar_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Coerce a duck-typed datasource mapping into a tagged variant.
/// Unknown or empty types yield `None`; the layer then has no source.
pub(crate) fn from_mapping(mapping: &Mapping) -> Option<Datasource> {
    let mut d: HashMap<String, String> = HashMap::new();
    let mut processing = Vec::new();
    for (key, value) in mapping {
        let Value::String(name) = key else { continue };
        if name == "processing" {
            if let Value::Sequence(seq) = value {
                processing = seq.iter().map(scalar_string).collect();
            }
            continue;
        }
        d.insert(name.clone(), scalar_string(value));
    }
    let get = |name: &str| d.get(name).cloned().unwrap_or_default();
    let kind = get("type");

    if kind == "postgis" {
        Some(Datasource::PostGis(PostGis {
            host: get("host"),
            port: get("port"),
            database: get("dbname"),
            username: get("user"),
            password: get("password"),
            query: get("table"),
            srid: get("srid"),
            geometry_field: get("geometry_field"),
            extent: get("extent"),
        }))
    } else if !get("file").is_empty() && (kind == "shape" || kind.is_empty()) {
        Some(Datasource::Shapefile(Shapefile {
            filename: get("file"),
            srid: get("srid"),
        }))
    } else if kind == "sqlite" {
        Some(Datasource::Sqlite(Sqlite {
            filename: get("file"),
            srid: get("srid"),
            query: get("table"),
            geometry_field: get("geometry_field"),
            extent: get("extent"),
        }))
    } else if kind == "ogr" {
        Some(Datasource::Ogr(Ogr {
            filename: get("file"),
            srid: get("srid"),
            layer: get("layer"),
            query: get("layer_by_sql"),
            extent: get("extent"),
        }))
    } else if kind == "gdal" {
        Some(Datasource::Gdal(Gdal {
            filename: get("file"),
            srid: get("srid"),
            extent: get("extent"),
            band: get("band"),
            processing,
        }))
    } else if kind == "geojson" {
        Some(Datasource::GeoJson(GeoJson { filename: get("file") }))
    } else if kind == "dataset" {
        Some(Datasource::Dataset(Dataset {
            id: get("id"),
            name: get("name"),
            kind,
        }))
    } else if kind == "dataset_raster" {
        let num = |name: &str| get(name).parse::<f64>().unwrap_or_default();
        let int = |name: &str| get(name).parse::<u32>().unwrap_or_default();
        Some(Datasource::DatasetRaster(DatasetRaster {
            id: get("id"),
            name: get("name"),
            multi: get("multi") == "true",
            lox: num("lox"),
            loy: num("loy"),
            hix: num("hix"),
            hiy: num("hiy"),
            tilesize: int("tilesize"),
            tile_stride: int("tile_stride"),
            zoom: int("zoom"),
            kind,
        }))
    } else {
        None
    }
}
