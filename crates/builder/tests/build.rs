use builder::{Builder, Cache, FilesMissingError, Map, MapMaker, MapWriter, SharedLocator, Writer};
use config::Locator;
use mss::color::Color;
use std::cell::RefCell;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Minimal writer capturing what the builder hands it.
#[derive(Default)]
struct Recorder {
    layers: Vec<(String, usize)>,
    got_parameters: bool,
    background: Option<String>,
    locator: Option<SharedLocator>,
}

type SharedRecorder = Rc<RefCell<Recorder>>;

struct RecorderMap(SharedRecorder);

impl Map for RecorderMap {
    fn add_layer(&mut self, layer: &mml::Layer, rules: &[mss::Rule]) {
        let mut state = self.0.borrow_mut();
        // resolve file-backed sources like a real writer would
        if let (Some(mml::Datasource::Shapefile(shp)), Some(locator)) =
            (&layer.datasource, &state.locator)
        {
            locator.borrow_mut().shape(&shp.filename);
        }
        state.layers.push((layer.id.clone(), rules.len()));
    }

    fn add_parameters(&mut self, _mml: &mml::Mml) {
        self.0.borrow_mut().got_parameters = true;
    }

    fn set_background_color(&mut self, color: Color) {
        self.0.borrow_mut().background = Some(color.to_string());
    }
}

impl Writer for RecorderMap {
    fn write(&self, writer: &mut dyn io::Write) -> io::Result<()> {
        for (id, count) in &self.0.borrow().layers {
            writeln!(writer, "{id} {count}")?;
        }
        Ok(())
    }

    fn write_file(&self, path: &Path) -> io::Result<()> {
        let mut file = fs::File::create(path)?;
        self.write(&mut file)
    }
}

impl MapWriter for RecorderMap {}

struct RecorderMaker(SharedRecorder);

impl MapMaker for RecorderMaker {
    fn new_map(&self, locator: SharedLocator) -> Box<dyn MapWriter> {
        self.0.borrow_mut().locator = Some(locator);
        Box::new(RecorderMap(self.0.clone()))
    }

    fn kind(&self) -> &'static str {
        "recorder"
    }

    fn file_suffix(&self) -> &'static str {
        ".txt"
    }
}

fn write_fixture(dir: &Path, shapefile: &str, water_status: &str) -> PathBuf {
    fs::write(
        dir.join("style.mss"),
        "Map { background-color: #112233; }\n\
         #roads { line-width: 1; [zoom>=10] { line-width: 2; } }\n\
         #water { polygon-fill: #0000ff; }",
    )
    .unwrap();
    let mml = dir.join("map.mml");
    fs::write(
        &mml,
        format!(
            "Name: fixture\n\
             Stylesheet: [style.mss]\n\
             Layer:\n\
             - id: roads\n\
             \x20 geometry: linestring\n\
             - id: water\n\
             \x20 geometry: polygon\n\
             \x20 status: \"{water_status}\"\n\
             \x20 datasource:\n\
             \x20\x20\x20 file: {shapefile}\n"
        ),
    )
    .unwrap();
    mml
}

#[test]
fn builds_from_mml_and_stylesheets() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("water.shp"), b"x").unwrap();
    let mml = write_fixture(dir.path(), "water.shp", "off");

    let state = SharedRecorder::default();
    let mut map = RecorderMap(state.clone());
    let mut dump = Vec::new();
    {
        let mut builder = Builder::new(&mut map);
        builder.set_mml(&mml);
        builder.set_dump_rules(Box::new(&mut dump));
        builder.build().unwrap();
    }

    let state = state.borrow();
    assert!(state.got_parameters);
    assert_eq!(state.background.as_deref(), Some("rgba(17,34,51,1)"));
    // inactive layers are included by default
    assert_eq!(
        state.layers,
        vec![("roads".to_string(), 2), ("water".to_string(), 1)]
    );
    let dump = String::from_utf8(dump).unwrap();
    assert_eq!(dump.lines().count(), 3);
    assert!(dump.contains("#roads"));
}

#[test]
fn skips_inactive_layers_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("water.shp"), b"x").unwrap();
    let mml = write_fixture(dir.path(), "water.shp", "off");

    let state = SharedRecorder::default();
    let mut map = RecorderMap(state.clone());
    let mut builder = Builder::new(&mut map);
    builder.set_mml(&mml);
    builder.set_include_inactive(false);
    builder.build().unwrap();
    drop(builder);

    assert_eq!(state.borrow().layers, vec![("roads".to_string(), 2)]);
}

#[test]
fn builds_without_mml_from_stylesheet_layers() {
    let dir = tempfile::tempdir().unwrap();
    let mss = dir.path().join("style.mss");
    fs::write(&mss, "#a { line-width: 1; }\n#b { line-width: 2; }").unwrap();

    let state = SharedRecorder::default();
    let mut map = RecorderMap(state.clone());
    let mut builder = Builder::new(&mut map);
    builder.add_mss(&mss);
    builder.build().unwrap();
    drop(builder);

    let state = state.borrow();
    assert!(!state.got_parameters);
    assert_eq!(
        state.layers,
        vec![("a".to_string(), 1), ("b".to_string(), 1)]
    );
}

#[test]
fn cache_reuses_fresh_artifacts() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("water.shp"), b"x").unwrap();
    let mml = write_fixture(dir.path(), "water.shp", "off");
    let out = tempfile::tempdir().unwrap();

    let state = SharedRecorder::default();
    let maker = RecorderMaker(state.clone());
    let base = dir.path().to_path_buf();
    let cache = Cache::new(Box::new(move || {
        let mut locator = config::LookupLocator::new(&base);
        locator.add_shape_dir(&base);
        locator
    }));
    cache.set_destination(out.path());

    let first = cache.style_file(&maker, &mml, &[]).unwrap();
    assert!(first.exists());
    assert!(first.file_name().unwrap().to_string_lossy().ends_with(".txt"));
    let built_layers = state.borrow().layers.len();
    // only active layers are built by the cache
    assert_eq!(built_layers, 1);

    let second = cache.style_file(&maker, &mml, &[]).unwrap();
    assert_eq!(first, second);
    // fresh artifact, no rebuild
    assert_eq!(state.borrow().layers.len(), built_layers);

    // a missing artifact is stale and triggers a rebuild
    fs::remove_file(&first).unwrap();
    let third = cache.style_file(&maker, &mml, &[]).unwrap();
    assert_eq!(first, third);
    assert!(state.borrow().layers.len() > built_layers);
}

#[test]
fn cache_surfaces_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    // the water layer stays active so its broken source is built too
    let mml = write_fixture(dir.path(), "no-such.shp", "on");
    let out = tempfile::tempdir().unwrap();

    let state = SharedRecorder::default();
    let maker = RecorderMaker(state.clone());
    let base = dir.path().to_path_buf();
    let cache = Cache::new(Box::new(move || config::LookupLocator::new(&base)));
    cache.set_destination(out.path());

    let err = cache.style_file(&maker, &mml, &[]).unwrap_err();
    let missing = err.downcast_ref::<FilesMissingError>().expect("missing files error");
    assert_eq!(missing.files, vec!["no-such.shp".to_string()]);
}

#[test]
fn clear_till_removes_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("water.shp"), b"x").unwrap();
    let mml = write_fixture(dir.path(), "water.shp", "off");
    let out = tempfile::tempdir().unwrap();

    let state = SharedRecorder::default();
    let maker = RecorderMaker(state.clone());
    let base = dir.path().to_path_buf();
    let cache = Cache::new(Box::new(move || {
        let mut locator = config::LookupLocator::new(&base);
        locator.add_shape_dir(&base);
        locator
    }));
    cache.set_destination(out.path());

    let file = cache.style_file(&maker, &mml, &[]).unwrap();
    assert!(file.exists());
    cache.clear_all().unwrap();
    assert!(!file.exists());
}
