use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::error::{JusticeError, Result};

/// Compiler defaults of one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePreset {
  pub name: &'static str,
  pub compiler: &'static str,
  pub standard: &'static str,
  pub extension: &'static str,
}

lazy_static! {
  static ref DETECT_LANGUAGE_MAP: HashMap<&'static str, &'static str> = {
    let mut map = HashMap::new();
    map.insert("c", "c");
    map.insert("cc", "cpp");
    map.insert("cxx", "cpp");
    map.insert("c++", "cpp");
    map.insert("cpp", "cpp");
    map
  };

  static ref LANGUAGE_PRESETS: HashMap<&'static str, LanguagePreset> = {
    let mut map = HashMap::new();
    map.insert(
      "c",
      LanguagePreset {
        name: "c",
        compiler: "gcc",
        standard: "gnu11",
        extension: "c",
      },
    );
    map.insert(
      "cpp",
      LanguagePreset {
        name: "cpp",
        compiler: "g++",
        standard: "gnu++11",
        extension: "cpp",
      },
    );
    map
  };
}

/// Resolve a language name, or guess it from the submission's extension.
pub fn detect_language(language: &Option<String>, submission: &str) -> Option<String> {
  if let Some(language) = language {
    let language = language.to_lowercase();
    return match DETECT_LANGUAGE_MAP.get(language.as_str()) {
      Some(language) => Some(language.to_string()),
      None => Some(language),
    };
  }

  let (_, ext) = submission.rsplit_once('.')?;
  DETECT_LANGUAGE_MAP
    .get(ext.to_lowercase().as_str())
    .map(|v| v.to_string())
}

pub fn find_preset(language: &str) -> Result<&'static LanguagePreset> {
  LANGUAGE_PRESETS
    .get(language)
    .ok_or(JusticeError::cli(format!("Unsupported language {}", language)))
}
