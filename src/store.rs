/*!
 # Presets and nicknames

 Two small JSON documents kept next to the user's home directory:
 named colors (`{"Warm White": {"r": 255, "g": 147, "b": 41}}`) and
 address nicknames (`{"BE:60:4D:00:58:37": "Living room"}`).
 Missing or unreadable files never fail startup.
*/

use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::command::ColorValue;
use crate::Result;

const PRESETS_FILE: &str = ".ks_led_presets.json";
const NICKNAMES_FILE: &str = ".ks_led_devices.json";

/// Presets a fresh install starts with
pub const DEFAULT_PRESETS: &[(&str, ColorValue)] = &[
    ("Warm White", ColorValue::rgb(255, 147, 41)),
    ("Cool White", ColorValue::rgb(201, 226, 255)),
    ("Daylight", ColorValue::rgb(255, 250, 244)),
    ("Red", ColorValue::rgb(255, 0, 0)),
    ("Green", ColorValue::rgb(0, 255, 0)),
    ("Blue", ColorValue::rgb(0, 0, 255)),
    ("Purple", ColorValue::rgb(128, 0, 128)),
    ("Cyan", ColorValue::rgb(0, 255, 255)),
    ("Yellow", ColorValue::rgb(255, 255, 0)),
    ("Orange", ColorValue::rgb(255, 165, 0)),
];

/// Default location of the presets file, `~/.ks_led_presets.json`
pub fn default_presets_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(PRESETS_FILE))
}

/// Default location of the nicknames file, `~/.ks_led_devices.json`
pub fn default_nicknames_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(NICKNAMES_FILE))
}

/// Reads a JSON map; `Ok(None)` when the file does not exist, `Err` with a
/// warning message when it cannot be parsed
fn read_map<V: DeserializeOwned>(path: &Path) -> std::result::Result<Option<BTreeMap<String, V>>, String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| format!("could not parse {} ({}), using defaults", path.display(), e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(format!("could not read {} ({}), using defaults", path.display(), e)),
    }
}

/// Writes a JSON map through a temp file so a crash never leaves half a document
fn write_map<V: Serialize>(path: &Path, map: &BTreeMap<String, V>) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let contents = serde_json::to_string_pretty(map)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, &contents)?;
    if std::fs::rename(&tmp, path).is_err() {
        // rename can fail across filesystems
        let result = std::fs::write(path, &contents);
        let _ = std::fs::remove_file(&tmp);
        result?;
    }
    debug!("Saved {}", path.display());
    Ok(())
}

/// Named colors
#[derive(Debug, Clone)]
pub struct PresetStore {
    path: PathBuf,
    presets: BTreeMap<String, ColorValue>,
}

impl PresetStore {
    /// Loads presets from `path`, falling back to the defaults when the file
    /// is missing or corrupt. Returns any warnings encountered.
    pub fn load(path: impl Into<PathBuf>) -> (Self, Vec<String>) {
        let path = path.into();
        let (presets, warnings) = match read_map(&path) {
            Ok(Some(presets)) => (presets, vec![]),
            Ok(None) => (defaults(), vec![]),
            Err(warning) => {
                warn!("{}", warning);
                (defaults(), vec![warning])
            }
        };
        (Self { path, presets }, warnings)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, name: &str) -> Option<ColorValue> {
        self.presets.get(name).copied()
    }

    /// Finds a preset ignoring case
    pub fn find(&self, name: &str) -> Option<(&str, ColorValue)> {
        self.presets
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(k, v)| (k.as_str(), *v))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ColorValue)> {
        self.presets.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Adds or replaces a preset and saves
    pub fn insert(&mut self, name: &str, color: ColorValue) -> Result<()> {
        self.presets.insert(name.to_string(), color);
        self.save()
    }

    /// Removes a preset and saves; returns whether it existed
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        let removed = self.presets.remove(name).is_some();
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    /// Replaces every preset with the defaults and saves
    pub fn reset(&mut self) -> Result<()> {
        self.presets = defaults();
        self.save()
    }

    pub fn save(&self) -> Result<()> {
        write_map(&self.path, &self.presets)
    }
}

fn defaults() -> BTreeMap<String, ColorValue> {
    DEFAULT_PRESETS
        .iter()
        .map(|(name, color)| (name.to_string(), *color))
        .collect()
}

/// Address nicknames
#[derive(Debug, Clone)]
pub struct NicknameStore {
    path: PathBuf,
    nicknames: BTreeMap<String, String>,
}

impl NicknameStore {
    /// Loads nicknames from `path`; missing or corrupt files give an empty set
    pub fn load(path: impl Into<PathBuf>) -> (Self, Vec<String>) {
        let path = path.into();
        let (nicknames, warnings) = match read_map(&path) {
            Ok(Some(nicknames)) => (nicknames, vec![]),
            Ok(None) => (BTreeMap::new(), vec![]),
            Err(warning) => {
                warn!("{}", warning);
                (BTreeMap::new(), vec![warning])
            }
        };
        (Self { path, nicknames }, warnings)
    }

    pub fn get(&self, address: &str) -> Option<&str> {
        self.nicknames
            .get(address)
            .map(String::as_str)
            .filter(|n| !n.is_empty())
    }

    /// Sets a nickname and saves; an empty nickname removes it.
    /// Returns whether anything changed.
    pub fn set(&mut self, address: &str, nickname: &str) -> Result<bool> {
        let nickname = nickname.trim();
        let changed = if nickname.is_empty() {
            self.nicknames.remove(address).is_some()
        } else {
            self.nicknames.insert(address.to_string(), nickname.to_string())
                != Some(nickname.to_string())
        };
        if changed {
            write_map(&self.path, &self.nicknames)?;
        }
        Ok(changed)
    }

    /// `"nickname (name)"` when a nickname is set, otherwise `name`
    pub fn display_name(&self, address: &str, name: &str) -> String {
        match self.get(address) {
            Some(nickname) => format!("{} ({})", nickname, name),
            None => name.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_presets_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (store, warnings) = PresetStore::load(dir.path().join("presets.json"));
        assert!(warnings.is_empty());
        assert_eq!(store.len(), 10);
        assert_eq!(store.get("Warm White"), Some(ColorValue::rgb(255, 147, 41)));
    }

    #[test]
    fn corrupt_presets_file_gives_defaults_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        std::fs::write(&path, "{ not json").unwrap();

        let (store, warnings) = PresetStore::load(&path);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("could not parse"));
        assert_eq!(store.len(), DEFAULT_PRESETS.len());
    }

    #[test]
    fn out_of_range_preset_is_treated_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        std::fs::write(&path, r#"{"Bad": {"r": 300, "g": 0, "b": 0}}"#).unwrap();

        let (store, warnings) = PresetStore::load(&path);
        assert_eq!(warnings.len(), 1);
        assert!(store.get("Bad").is_none());
    }

    #[test]
    fn presets_persist_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");

        let (mut store, _) = PresetStore::load(&path);
        store.insert("Sunset", ColorValue::rgb(250, 94, 83)).unwrap();
        assert!(store.remove("Red").unwrap());
        assert!(!store.remove("Red").unwrap());

        let (reloaded, warnings) = PresetStore::load(&path);
        assert!(warnings.is_empty());
        assert_eq!(reloaded.get("Sunset"), Some(ColorValue::rgb(250, 94, 83)));
        assert!(reloaded.get("Red").is_none());
        assert_eq!(reloaded.find("sunset").map(|(n, _)| n), Some("Sunset"));

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains(r#""r": 250"#));
        assert!(!dir.path().join("presets.json.tmp").exists());
    }

    #[test]
    fn reset_restores_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presets.json");
        std::fs::write(&path, r#"{"Only": {"r": 1, "g": 2, "b": 3}}"#).unwrap();

        let (mut store, _) = PresetStore::load(&path);
        assert_eq!(store.len(), 1);
        store.reset().unwrap();

        let (reloaded, _) = PresetStore::load(&path);
        assert_eq!(reloaded.len(), DEFAULT_PRESETS.len());
        assert!(reloaded.get("Only").is_none());
    }

    #[test]
    fn nicknames_set_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");

        let (mut store, warnings) = NicknameStore::load(&path);
        assert!(warnings.is_empty());
        assert_eq!(store.display_name("AA", "KS03~370058"), "KS03~370058");

        assert!(store.set("AA", "Living room").unwrap());
        assert!(!store.set("AA", "Living room").unwrap());
        assert_eq!(
            store.display_name("AA", "KS03~370058"),
            "Living room (KS03~370058)"
        );

        let (reloaded, _) = NicknameStore::load(&path);
        assert_eq!(reloaded.get("AA"), Some("Living room"));

        let mut reloaded = reloaded;
        assert!(reloaded.set("AA", "  ").unwrap());
        assert!(!reloaded.set("AA", "").unwrap());
        assert_eq!(NicknameStore::load(&path).0.get("AA"), None);
    }

    #[test]
    fn corrupt_nicknames_file_gives_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let (store, warnings) = NicknameStore::load(&path);
        assert_eq!(warnings.len(), 1);
        assert_eq!(store.get("anything"), None);
    }
}
