//! Asset lookup: resolves logical names (fonts, images, tabular data)
//! to filesystem paths and records what could not be found.

use crate::PostGis;
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Resolves asset references for the emitter. Implementations record
/// missing names; the builder surfaces them once after a build.
pub trait Locator {
    /// Resolve a font face name, trying filename variations. `None`
    /// when no variation exists in the font directories.
    fn font(&mut self, name: &str) -> Option<String>;
    fn sqlite(&mut self, name: &str) -> String;
    fn shape(&mut self, name: &str) -> String;
    fn image(&mut self, name: &str) -> String;
    fn data(&mut self, name: &str) -> String;
    /// Overlay configured connection defaults onto a PostGIS source.
    fn postgis(&self, ds: mml::PostGis) -> mml::PostGis;
    fn set_base_dir(&mut self, dir: &Path);
    fn set_out_dir(&mut self, dir: &Path);
    fn use_rel_paths(&mut self, rel: bool);
    /// Names that could not be resolved, sorted.
    fn missing_files(&self) -> Vec<String>;
}

/// Directory-list based [`Locator`].
#[derive(Debug, Default)]
pub struct LookupLocator {
    font_dirs: Vec<PathBuf>,
    sqlite_dirs: Vec<PathBuf>,
    shape_dirs: Vec<PathBuf>,
    image_dirs: Vec<PathBuf>,
    data_dirs: Vec<PathBuf>,
    pg_config: Option<PostGis>,
    base_dir: PathBuf,
    out_dir: PathBuf,
    relative: bool,
    missing: BTreeSet<String>,
}

impl LookupLocator {
    pub fn new(base_dir: impl AsRef<Path>) -> LookupLocator {
        LookupLocator {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..LookupLocator::default()
        }
    }

    pub fn add_font_dir(&mut self, dir: impl Into<PathBuf>) {
        self.font_dirs.push(dir.into());
    }

    pub fn add_sqlite_dir(&mut self, dir: impl Into<PathBuf>) {
        self.sqlite_dirs.push(dir.into());
    }

    pub fn add_shape_dir(&mut self, dir: impl Into<PathBuf>) {
        self.shape_dirs.push(dir.into());
    }

    pub fn add_image_dir(&mut self, dir: impl Into<PathBuf>) {
        self.image_dirs.push(dir.into());
    }

    pub fn add_data_dir(&mut self, dir: impl Into<PathBuf>) {
        self.data_dirs.push(dir.into());
    }

    pub fn set_pg_config(&mut self, config: PostGis) {
        self.pg_config = Some(config);
    }

    /// Try each directory in order, then the generic data directories,
    /// then the base directory. Absolute names bypass the search.
    /// Unresolved names are recorded and returned as-is; resolved
    /// relative results may be rewritten relative to the out directory.
    fn find(&mut self, basename: &str, kind_dirs: &[PathBuf]) -> (String, bool) {
        let base = Path::new(basename);
        let found: Option<PathBuf> = if base.is_absolute() {
            base.exists().then(|| base.to_path_buf())
        } else {
            kind_dirs
                .iter()
                .chain(self.data_dirs.iter())
                .chain(std::iter::once(&self.base_dir))
                .map(|dir| dir.join(base))
                .find(|candidate| candidate.exists())
        };

        let ok = found.is_some();
        let mut fname = match found {
            Some(path) => std::fs::canonicalize(&path).unwrap_or(path),
            None => {
                self.missing.insert(basename.to_string());
                PathBuf::from(basename)
            }
        };

        if self.relative {
            if let Some(rel) = relative_to(&self.out_dir, &fname) {
                fname = rel;
            }
        } else if fname.is_relative() {
            fname = self.out_dir.join(fname);
        }
        (fname.to_string_lossy().into_owned(), ok)
    }
}

impl Locator for LookupLocator {
    fn font(&mut self, name: &str) -> Option<String> {
        for variation in font_variations(name, ".ttf") {
            let (file, ok) = self.find(&variation, &self.font_dirs.clone());
            if ok {
                return Some(file);
            }
            self.missing.remove(&variation);
        }
        self.missing.insert(name.to_string());
        None
    }

    fn sqlite(&mut self, name: &str) -> String {
        self.find(name, &self.sqlite_dirs.clone()).0
    }

    fn shape(&mut self, name: &str) -> String {
        self.find(name, &self.shape_dirs.clone()).0
    }

    fn image(&mut self, name: &str) -> String {
        self.find(name, &self.image_dirs.clone()).0
    }

    fn data(&mut self, name: &str) -> String {
        self.find(name, &[]).0
    }

    fn postgis(&self, mut ds: mml::PostGis) -> mml::PostGis {
        let Some(config) = &self.pg_config else {
            return ds;
        };
        if !config.host.is_empty() {
            ds.host = config.host.clone();
        }
        if !config.port.is_empty() {
            ds.port = config.port.clone();
        }
        if !config.database.is_empty() {
            ds.database = config.database.clone();
        }
        if !config.username.is_empty() {
            ds.username = config.username.clone();
        }
        if !config.password.is_empty() {
            ds.password = config.password.clone();
        }
        if !config.srid.is_empty() {
            ds.srid = config.srid.clone();
        }
        ds
    }

    fn set_base_dir(&mut self, dir: &Path) {
        self.base_dir = dir.to_path_buf();
    }

    fn set_out_dir(&mut self, dir: &Path) {
        self.out_dir = dir.to_path_buf();
    }

    fn use_rel_paths(&mut self, rel: bool) {
        self.relative = rel;
    }

    fn missing_files(&self) -> Vec<String> {
        self.missing.iter().cloned().collect()
    }
}

/// Express `target` relative to `base`. Both must be absolute; `None`
/// keeps the path unchanged.
fn relative_to(base: &Path, target: &Path) -> Option<PathBuf> {
    if !base.is_absolute() || !target.is_absolute() {
        return None;
    }
    let base_parts: Vec<Component> = base.components().collect();
    let target_parts: Vec<Component> = target.components().collect();
    let common = base_parts
        .iter()
        .zip(target_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut out = PathBuf::new();
    for _ in common..base_parts.len() {
        out.push("..");
    }
    for part in &target_parts[common..] {
        out.push(part.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    Some(out)
}

/// Filename variations tried for a font face name:
/// `"Noto Sans Regular"` yields `NotoSansRegular.ttf`,
/// `Noto-SansRegular.ttf`, `NotoSans-Regular.ttf`, `NotoSans.ttf`.
pub fn font_variations(font: &str, suffix: &str) -> Vec<String> {
    let parts: Vec<&str> = font.split(' ').collect();
    let mut result = Vec::new();
    result.push(format!("{}{}", parts.concat(), suffix));
    for i in 1..parts.len() {
        result.push(format!(
            "{}-{}{}",
            parts[..i].concat(),
            parts[i..].concat(),
            suffix
        ));
    }
    if parts.len() > 1 {
        result.push(format!("{}{}", parts[..parts.len() - 1].concat(), suffix));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn font_variation_order() {
        assert_eq!(
            font_variations("Noto Sans Regular", ".ttf"),
            vec![
                "NotoSansRegular.ttf",
                "Noto-SansRegular.ttf",
                "NotoSans-Regular.ttf",
                "NotoSans.ttf",
            ]
        );
        assert_eq!(font_variations("Mono", ".ttf"), vec!["Mono.ttf"]);
    }

    #[test]
    fn absolute_paths_bypass_search() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("data.shp");
        fs::write(&file, b"x").unwrap();

        let mut locator = LookupLocator::new(dir.path());
        let resolved = locator.shape(file.to_str().unwrap());
        assert_eq!(
            fs::canonicalize(&resolved).unwrap(),
            fs::canonicalize(&file).unwrap()
        );
        assert!(locator.missing_files().is_empty());
    }

    #[test]
    fn search_order_and_missing() {
        let base = tempfile::tempdir().unwrap();
        let shapes = tempfile::tempdir().unwrap();
        fs::write(shapes.path().join("roads.shp"), b"x").unwrap();

        let mut locator = LookupLocator::new(base.path());
        locator.add_shape_dir(shapes.path());
        let found = locator.shape("roads.shp");
        assert!(found.ends_with("roads.shp"));
        assert!(locator.missing_files().is_empty());

        let missing = locator.shape("absent.shp");
        assert!(missing.ends_with("absent.shp"));
        assert_eq!(locator.missing_files(), vec!["absent.shp".to_string()]);
    }

    #[test]
    fn relative_paths_round_trip_through_out_dir() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("img");
        fs::create_dir(&images).unwrap();
        let file = images.join("fill.png");
        fs::write(&file, b"x").unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let mut locator = LookupLocator::new(dir.path());
        locator.add_image_dir(&images);
        locator.set_out_dir(&out);
        locator.use_rel_paths(true);

        let rel = locator.image("fill.png");
        let rel_path = Path::new(&rel);
        assert!(rel_path.is_relative());
        assert_eq!(
            fs::canonicalize(out.join(rel_path)).unwrap(),
            fs::canonicalize(&file).unwrap()
        );
    }

    #[test]
    fn font_lookup_uses_variations() {
        let fonts = tempfile::tempdir().unwrap();
        fs::write(fonts.path().join("NotoSans-Regular.ttf"), b"x").unwrap();

        let mut locator = LookupLocator::new(fonts.path());
        locator.add_font_dir(fonts.path());
        let found = locator.font("Noto Sans Regular").unwrap();
        assert!(found.ends_with("NotoSans-Regular.ttf"));
        // failed variations must not linger as missing
        assert!(locator.missing_files().is_empty());

        assert!(locator.font("No Such Font").is_none());
        assert_eq!(locator.missing_files(), vec!["No Such Font".to_string()]);
    }

    #[test]
    fn postgis_overlay() {
        let mut locator = LookupLocator::new(".");
        locator.set_pg_config(PostGis {
            host: "db.local".into(),
            port: String::new(),
            database: "gis".into(),
            username: String::new(),
            password: String::new(),
            srid: String::new(),
        });
        let ds = locator.postgis(mml::PostGis {
            host: "ignored".into(),
            port: "5432".into(),
            ..mml::PostGis::default()
        });
        assert_eq!(ds.host, "db.local");
        assert_eq!(ds.database, "gis");
        assert_eq!(ds.port, "5432");
    }
}
