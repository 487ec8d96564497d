//! Translation lookup
//!
//! Bundles are nested JSON objects flattened to dotted keys
//! (`chat.newChat`). Lookups fall back from the active locale to the
//! default locale and finally to the key itself, so a missing translation
//! never blanks out the UI. Entity names and descriptions fall back to the
//! raw value stored on the server.

use crate::error::{ClientError, Result};
use std::collections::HashMap;

/// Locale used when nothing else matches
pub const DEFAULT_LOCALE: &str = "en";

const BUILTIN_BUNDLES: [(&str, &str); 2] = [
    ("en", include_str!("../locales/en.json")),
    ("zh-CN", include_str!("../locales/zh-CN.json")),
];

/// Locale-aware string lookup
#[derive(Debug, Clone)]
pub struct Translator {
    locale: String,
    bundles: HashMap<String, HashMap<String, String>>,
}

impl Default for Translator {
    fn default() -> Self {
        Self::builtin(DEFAULT_LOCALE)
    }
}

impl Translator {
    /// Empty translator with no bundles
    pub fn empty(locale: &str) -> Self {
        Self {
            locale: locale.to_string(),
            bundles: HashMap::new(),
        }
    }

    /// Translator preloaded with the bundled `en` and `zh-CN` strings
    pub fn builtin(locale: &str) -> Self {
        let mut translator = Self::empty(DEFAULT_LOCALE);
        for (name, json) in BUILTIN_BUNDLES {
            if let Err(e) = translator.load_json(name, json) {
                tracing::error!(locale = name, error = %e, "Invalid built-in locale bundle");
            }
        }
        translator.set_locale(locale);
        translator
    }

    /// Load (or merge into) a locale bundle from nested JSON
    pub fn load_json(&mut self, locale: &str, json: &str) -> Result<usize> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(ClientError::Config(format!(
                "Locale bundle '{}' must be a JSON object",
                locale
            )));
        }

        let bundle = self.bundles.entry(locale.to_string()).or_default();
        let before = bundle.len();
        flatten("", &value, bundle);
        Ok(bundle.len() - before)
    }

    /// Switch the active locale
    ///
    /// Accepts loose tags (`zh`, `zh_CN`, `en-US`); unknown locales fall
    /// back to the default.
    pub fn set_locale(&mut self, tag: &str) {
        self.locale = self.resolve_locale(tag);
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn available_locales(&self) -> Vec<&str> {
        let mut locales: Vec<&str> = self.bundles.keys().map(String::as_str).collect();
        locales.sort_unstable();
        locales
    }

    fn resolve_locale(&self, tag: &str) -> String {
        let normalized = tag.trim().replace('_', "-");
        if self.bundles.contains_key(&normalized) {
            return normalized;
        }
        let language = normalized.split('-').next().unwrap_or_default().to_ascii_lowercase();
        self.bundles
            .keys()
            .filter(|k| k.split('-').next().map(str::to_ascii_lowercase) == Some(language.clone()))
            .min()
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string())
    }

    /// Look up a key, falling back to the default locale, then the key
    pub fn t(&self, key: &str) -> String {
        self.lookup(key).unwrap_or(key).to_string()
    }

    /// Look up a key and substitute `{name}` placeholders
    pub fn t_with(&self, key: &str, args: &[(&str, &str)]) -> String {
        let mut text = self.t(key);
        for (name, value) in args {
            text = text.replace(&format!("{{{}}}", name), value);
        }
        text
    }

    /// Translation if one exists in the active or default locale
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.bundles
            .get(&self.locale)
            .and_then(|b| b.get(key))
            .or_else(|| self.bundles.get(DEFAULT_LOCALE).and_then(|b| b.get(key)))
            .map(String::as_str)
    }

    /// Display name of a stored entity (skill, agent, tool), or the raw name
    pub fn display_name<'a>(&'a self, kind: &str, id: &str, raw: &'a str) -> &'a str {
        self.lookup(&format!("{}.{}.name", kind, id)).unwrap_or(raw)
    }

    /// Display description of a stored entity, or the raw description
    pub fn display_description<'a>(&'a self, kind: &str, id: &str, raw: &'a str) -> &'a str {
        self.lookup(&format!("{}.{}.description", kind, id))
            .unwrap_or(raw)
    }
}

fn flatten(prefix: &str, value: &serde_json::Value, out: &mut HashMap<String, String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten(&key, v, out);
            }
        }
        serde_json::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        serde_json::Value::Null => {}
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}
