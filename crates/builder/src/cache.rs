//! Artifact cache: maps (writer kind, map document, stylesheets) to a
//! built style file, rebuilding when any source is newer than the
//! artifact. A process-wide mutex serializes rebuilds.

use crate::{shared_locator, Builder, MapWriter, SharedLocator, Writer};
use anyhow::{Context, Result};
use config::Locator;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// Creates writers for one output dialect.
pub trait MapMaker {
    fn new_map(&self, locator: SharedLocator) -> Box<dyn MapWriter>;
    /// Cache-key discriminator, e.g. `"mapnik"`.
    fn kind(&self) -> &'static str;
    fn file_suffix(&self) -> &'static str;
}

/// Assets referenced by the stylesheets that could not be resolved.
/// Non-fatal for the build itself but surfaced to the caller.
#[derive(Debug, thiserror::Error)]
#[error("missing files: {files:?}")]
pub struct FilesMissingError {
    pub files: Vec<String>,
}

const STYLE_PREFIX: &str = "carta-style-";

struct StyleEntry {
    mml: PathBuf,
    mss: Vec<PathBuf>,
    file: PathBuf,
}

impl StyleEntry {
    fn is_stale(&self) -> bool {
        let Ok(artifact) = mtime(&self.file) else {
            return true;
        };
        is_newer(&self.mml, artifact) || self.mss.iter().any(|f| is_newer(f, artifact))
    }
}

fn mtime(path: &Path) -> std::io::Result<SystemTime> {
    fs::metadata(path)?.modified()
}

fn is_newer(path: &Path, than: SystemTime) -> bool {
    match mtime(path) {
        Ok(t) => t > than,
        Err(_) => true,
    }
}

fn style_hash(kind: &str, mml: &Path, mss: &[PathBuf]) -> u64 {
    let mut h = DefaultHasher::new();
    kind.hash(&mut h);
    mml.hash(&mut h);
    for path in mss {
        path.hash(&mut h);
    }
    h.finish()
}

type LocatorFactory = Box<dyn Fn() -> config::LookupLocator + Send + Sync>;

pub struct Cache {
    new_locator: LocatorFactory,
    state: Mutex<CacheState>,
}

#[derive(Default)]
struct CacheState {
    styles: HashMap<u64, StyleEntry>,
    dest_dir: Option<PathBuf>,
}

impl Cache {
    pub fn new(new_locator: LocatorFactory) -> Cache {
        Cache {
            new_locator,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Write built artifacts into `dest` instead of temp directories.
    pub fn set_destination(&self, dest: impl Into<PathBuf>) {
        self.state.lock().unwrap().dest_dir = Some(dest.into());
    }

    pub fn clear_all(&self) -> Result<()> {
        self.clear_till(SystemTime::now())
    }

    /// Drop cache entries and delete artifacts older than `till`.
    pub fn clear_till(&self, till: SystemTime) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(dest) = &state.dest_dir {
            for entry in fs::read_dir(dest).context("cache cleanup")? {
                let entry = entry?;
                let name = entry.file_name();
                if !name.to_string_lossy().starts_with(STYLE_PREFIX) {
                    continue;
                }
                if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                    if modified < till {
                        if let Err(err) = fs::remove_file(entry.path()) {
                            log::warn!(target: "builder::cache", "cleanup error: {err}");
                        }
                    }
                }
            }
        } else {
            for style in state.styles.values() {
                if let Ok(modified) = mtime(&style.file) {
                    if modified < till {
                        if let Some(dir) = style.file.parent() {
                            if let Err(err) = fs::remove_dir_all(dir) {
                                log::warn!(target: "builder::cache", "cleanup error: {err}");
                            }
                        }
                    }
                }
            }
        }
        state.styles.clear();
        Ok(())
    }

    /// Path of the built style for this input combination, rebuilding
    /// first if the cached artifact is stale or absent.
    pub fn style_file(
        &self,
        maker: &dyn MapMaker,
        mml: impl AsRef<Path>,
        mss: &[PathBuf],
    ) -> Result<PathBuf> {
        let mml = mml.as_ref();
        let hash = style_hash(maker.kind(), mml, mss);
        let mut state = self.state.lock().unwrap();

        if let Some(entry) = state.styles.get(&hash) {
            if !entry.is_stale() {
                return Ok(entry.file.clone());
            }
        }

        let mss = if mss.is_empty() {
            mss_files_from_mml(mml)?
        } else {
            mss.to_vec()
        };
        let entry = self.build(&state, maker, mml, &mss, hash)?;
        let file = entry.file.clone();
        state.styles.insert(hash, entry);
        Ok(file)
    }

    fn build(
        &self,
        state: &CacheState,
        maker: &dyn MapMaker,
        mml: &Path,
        mss: &[PathBuf],
        hash: u64,
    ) -> Result<StyleEntry> {
        let locator = {
            let mut locator = (self.new_locator)();
            locator.set_base_dir(mml.parent().unwrap_or(Path::new(".")));
            if let Some(dest) = &state.dest_dir {
                locator.set_out_dir(dest);
            }
            locator.use_rel_paths(false);
            shared_locator(locator)
        };

        let mut map = maker.new_map(locator.clone());
        {
            let mut builder = Builder::new(&mut map);
            builder.set_include_inactive(false);
            builder.set_mml(mml);
            for mss_file in mss {
                builder.add_mss(mss_file);
            }
            builder.build()?;
        }

        let missing = locator.borrow().missing_files();
        if !missing.is_empty() {
            return Err(FilesMissingError { files: missing }.into());
        }

        let style_file = match &state.dest_dir {
            Some(dest) => dest.join(format!("{STYLE_PREFIX}{hash}{}", maker.file_suffix())),
            None => {
                let tmp = tempfile::Builder::new()
                    .prefix("carta-style")
                    .tempdir()
                    .context("creating style directory")?;
                tmp.into_path().join(format!("style{}", maker.file_suffix()))
            }
        };
        map.write_file(&style_file)
            .with_context(|| format!("writing style {}", style_file.display()))?;
        log::info!(
            target: "builder::cache",
            "rebuilt style {} as {} with {:?}",
            mml.display(),
            style_file.display(),
            mss
        );
        Ok(StyleEntry { mml: mml.to_path_buf(), mss: mss.to_vec(), file: style_file })
    }
}

/// Stylesheet paths referenced by a map document, relative to it.
fn mss_files_from_mml(mml_file: &Path) -> Result<Vec<PathBuf>> {
    let file = fs::File::open(mml_file)
        .with_context(|| format!("opening map document {}", mml_file.display()))?;
    let doc = mml::parse(file)?;
    let dir = mml_file.parent().unwrap_or(Path::new("."));
    Ok(doc.stylesheets.iter().map(|s| dir.join(s)).collect())
}
