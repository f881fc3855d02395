use neurite_core::{NeuriteError, NeuriteResult};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Load a JSON configuration file into `T`. Missing fields fall back to
/// `T`'s serde defaults.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> NeuriteResult<T> {
    let json = fs::read_to_string(path).map_err(|e| NeuriteError::io(path.display().to_string(), e))?;
    serde_json::from_str(&json).map_err(|e| NeuriteError::Json(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(default)]
    struct Settings {
        rate: f64,
        name: String,
    }

    impl Default for Settings {
        fn default() -> Self {
            Settings { rate: 0.5, name: "net".into() }
        }
    }

    #[test]
    fn test_load_with_defaults() {
        let path = std::env::temp_dir().join("neurite_io_config.json");
        std::fs::write(&path, r#"{ "rate": 0.01 }"#).unwrap();
        let s: Settings = load_json(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(s, Settings { rate: 0.01, name: "net".into() });
    }

    #[test]
    fn test_bad_json() {
        let path = std::env::temp_dir().join("neurite_io_config_bad.json");
        std::fs::write(&path, "{ rate: ").unwrap();
        let err = load_json::<Settings>(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, NeuriteError::Json(_)));
    }
}
