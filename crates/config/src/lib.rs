//! Compiler configuration: search directories for assets and defaults
//! for data-source connections, loaded from a TOML file.

mod locator;

pub use locator::{font_variations, Locator, LookupLocator};

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid configuration: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mapnik: Mapnik,
    pub styles_dir: PathBuf,
    pub out_dir: PathBuf,
    pub datasources: Datasources,
    pub postgis: PostGis,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Mapnik {
    pub plugin_dirs: Vec<PathBuf>,
    pub font_dirs: Vec<PathBuf>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Datasources {
    pub shapefile_dirs: Vec<PathBuf>,
    pub sqlite_dirs: Vec<PathBuf>,
    pub image_dirs: Vec<PathBuf>,
    pub data_dirs: Vec<PathBuf>,
    pub font_dirs: Vec<PathBuf>,
}

/// Connection defaults overlayed onto PostGIS sources from the map
/// document.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PostGis {
    pub host: String,
    pub port: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub srid: String,
}

impl Config {
    /// Load a configuration file. Relative directories are anchored at
    /// the file's location.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, Error> {
        let path = path.as_ref();
        let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let input = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&input)?;
        config.base_dir = base_dir;
        if config.styles_dir.is_relative() {
            config.styles_dir = config.base_dir.join(&config.styles_dir);
        }
        if config.out_dir.is_relative() {
            config.out_dir = config.base_dir.join(&config.out_dir);
        }
        Ok(config)
    }

    /// Build a locator with this configuration's search directories.
    pub fn locator(&self) -> LookupLocator {
        let anchor = |dir: &PathBuf| -> PathBuf {
            if dir.is_relative() {
                self.base_dir.join(dir)
            } else {
                dir.clone()
            }
        };
        let mut locator = LookupLocator::new(&self.base_dir);
        for dir in &self.datasources.sqlite_dirs {
            locator.add_sqlite_dir(anchor(dir));
        }
        for dir in &self.datasources.image_dirs {
            locator.add_image_dir(anchor(dir));
        }
        for dir in &self.datasources.shapefile_dirs {
            locator.add_shape_dir(anchor(dir));
        }
        for dir in &self.datasources.data_dirs {
            locator.add_data_dir(anchor(dir));
        }
        for dir in self.mapnik.font_dirs.iter().chain(&self.datasources.font_dirs) {
            locator.add_font_dir(anchor(dir));
        }
        locator.set_pg_config(self.postgis.clone());
        locator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_anchors_relative_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carta.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            "styles_dir = \"styles\"\nout_dir = \"/tmp/out\"\n\n\
             [datasources]\nshapefile_dirs = [\"shp\"]\n\n\
             [postgis]\nhost = \"db.local\"\n"
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.styles_dir, dir.path().join("styles"));
        assert_eq!(config.out_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.postgis.host, "db.local");
        assert_eq!(config.datasources.shapefile_dirs, vec![PathBuf::from("shp")]);

        // the locator inherits the connection defaults
        let locator = config.locator();
        let ds = locator.postgis(mml::PostGis::default());
        assert_eq!(ds.host, "db.local");
    }
}
