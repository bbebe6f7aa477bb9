//! Build orchestration: parse the map document, compile the
//! stylesheets, resolve rules per layer, and hand everything to an
//! output writer.

mod cache;

pub use cache::{Cache, FilesMissingError, MapMaker};

use anyhow::{Context, Result};
use config::Locator;
use mss::color::Color;
use std::cell::RefCell;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Receives the compiled map: parameters first, then one call per layer
/// with its resolved rules.
pub trait Map {
    fn add_layer(&mut self, layer: &mml::Layer, rules: &[mss::Rule]);
    fn add_parameters(&mut self, mml: &mml::Mml);
    /// Stylesheet `Map { background-color: ... }`; ignored by writers
    /// without a document background.
    fn set_background_color(&mut self, _color: Color) {}
}

/// Serializes the assembled map.
pub trait Writer {
    fn write(&self, writer: &mut dyn io::Write) -> io::Result<()>;
    fn write_file(&self, path: &Path) -> io::Result<()>;
}

pub trait MapWriter: Map + Writer {}

impl Map for Box<dyn MapWriter> {
    fn add_layer(&mut self, layer: &mml::Layer, rules: &[mss::Rule]) {
        (**self).add_layer(layer, rules);
    }

    fn add_parameters(&mut self, mml: &mml::Mml) {
        (**self).add_parameters(mml);
    }

    fn set_background_color(&mut self, color: Color) {
        (**self).set_background_color(color);
    }
}

/// Compiles one map (MML document and/or MSS stylesheets) into `dst`.
pub struct Builder<'a> {
    dst: &'a mut dyn Map,
    mss_files: Vec<PathBuf>,
    mml_file: Option<PathBuf>,
    dump_rules: Option<Box<dyn io::Write + 'a>>,
    include_inactive: bool,
}

impl<'a> Builder<'a> {
    pub fn new(dst: &'a mut dyn Map) -> Builder<'a> {
        Builder {
            dst,
            mss_files: Vec::new(),
            mml_file: None,
            dump_rules: None,
            include_inactive: true,
        }
    }

    pub fn add_mss(&mut self, path: impl Into<PathBuf>) {
        self.mss_files.push(path.into());
    }

    pub fn set_mml(&mut self, path: impl Into<PathBuf>) {
        self.mml_file = Some(path.into());
    }

    /// Stream resolved rules to `sink` for debugging.
    pub fn set_dump_rules(&mut self, sink: Box<dyn io::Write + 'a>) {
        self.dump_rules = Some(sink);
    }

    pub fn set_include_inactive(&mut self, include: bool) {
        self.include_inactive = include;
    }

    pub fn build(&mut self) -> Result<()> {
        let mut layers: Vec<mml::Layer> = Vec::new();
        let mut mml_doc = None;

        if let Some(mml_file) = &self.mml_file {
            let file = fs::File::open(mml_file)
                .with_context(|| format!("opening map document {}", mml_file.display()))?;
            let doc = mml::parse(file)?;
            if self.mss_files.is_empty() {
                let dir = mml_file.parent().unwrap_or(Path::new("."));
                for sheet in &doc.stylesheets {
                    self.mss_files.push(dir.join(sheet));
                }
            }
            layers.extend(doc.layers.iter().cloned());
            mml_doc = Some(doc);
        }

        let mut decoder = mss::Decoder::new();
        for mss_file in &self.mss_files {
            decoder
                .parse_file(mss_file)
                .with_context(|| format!("parsing stylesheet {}", mss_file.display()))?;
        }
        let style = decoder.evaluate()?;

        if mml_doc.is_none() {
            // without a map document every referenced layer becomes a
            // bare line layer
            for id in style.layers() {
                layers.push(mml::Layer::with_id(&id));
            }
        }

        if let Some(doc) = &mml_doc {
            self.dst.add_parameters(doc);
        }

        for layer in &layers {
            let rules = style.layer_rules(&layer.id, &layer.css_ids, &layer.classes);
            if let Some(sink) = &mut self.dump_rules {
                for rule in &rules {
                    writeln!(sink, "{rule}")?;
                }
            }
            if layer.active || self.include_inactive {
                self.dst.add_layer(layer, &rules);
            }
        }

        if let Some(bg) = style.map_properties().get_color("background-color") {
            self.dst.set_background_color(bg);
        }
        Ok(())
    }
}

/// Compile an already-parsed map document plus a stylesheet string.
pub fn build_map_from_string(dst: &mut dyn Map, mml: &mml::Mml, style: &str) -> Result<()> {
    let mut decoder = mss::Decoder::new();
    decoder.parse_string(style)?;
    let style = decoder.evaluate()?;

    dst.add_parameters(mml);
    for layer in &mml.layers {
        let rules = style.layer_rules(&layer.id, &layer.css_ids, &layer.classes);
        if layer.active {
            dst.add_layer(layer, &rules);
        }
    }
    if let Some(bg) = style.map_properties().get_color("background-color") {
        dst.set_background_color(bg);
    }
    Ok(())
}

/// Shared handle to a locator, created per build and read for missing
/// files once the build finished.
pub type SharedLocator = Rc<RefCell<dyn Locator>>;

pub fn shared_locator(locator: config::LookupLocator) -> SharedLocator {
    Rc::new(RefCell::new(locator))
}
