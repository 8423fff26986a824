//! Extension to content-type mapping
//!
//! Keys are stored lowercase without the leading dot, so `.Symbols.JSON` and
//! `symbols.json` register the same entry. Lookups try every dotted suffix of
//! the file name from longest to shortest.

use std::collections::HashMap;
use std::path::Path;

/// Content type used when no entry matches
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

const BASE_TYPES: &[(&str, &str)] = &[
    // Documents
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "text/javascript; charset=utf-8"),
    ("mjs", "text/javascript; charset=utf-8"),
    ("json", "application/json"),
    ("map", "application/json"),
    ("txt", "text/plain; charset=utf-8"),
    ("xml", "application/xml"),
    ("webmanifest", "application/manifest+json"),
    // Code and binaries
    ("wasm", "application/wasm"),
    // Images
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("bmp", "image/bmp"),
    ("ktx2", "image/ktx2"),
    // Audio / video
    ("mp3", "audio/mpeg"),
    ("ogg", "audio/ogg"),
    ("wav", "audio/wav"),
    ("m4a", "audio/mp4"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    // Fonts
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    // 3D
    ("gltf", "model/gltf+json"),
    ("glb", "model/gltf-binary"),
];

/// Overrides the game player registers on top of the base table
pub fn game_overrides() -> Vec<(String, String)> {
    vec![
        (".wasm".to_string(), "application/wasm".to_string()),
        (".data".to_string(), "application/octet-stream".to_string()),
        (".bin".to_string(), "application/octet-stream".to_string()),
        (".symbols.json".to_string(), "application/json".to_string()),
    ]
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Case-insensitive, longest-suffix extension lookup
#[derive(Debug, Clone)]
pub struct MimeTable {
    entries: HashMap<String, String>,
}

impl MimeTable {
    /// Table seeded with the base entries only
    pub fn new() -> Self {
        let entries = BASE_TYPES
            .iter()
            .map(|(ext, ty)| (ext.to_string(), ty.to_string()))
            .collect();
        Self { entries }
    }

    /// Base table merged with `overrides`; an override replaces a base entry
    pub fn with_overrides<I, E, T>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (E, T)>,
        E: AsRef<str>,
        T: Into<String>,
    {
        let mut table = Self::new();
        for (extension, content_type) in overrides {
            table.insert(extension.as_ref(), content_type);
        }
        table
    }

    /// Register or replace a mapping. Empty extensions are ignored.
    pub fn insert(&mut self, extension: &str, content_type: impl Into<String>) {
        let key = normalize_extension(extension);
        if key.is_empty() {
            return;
        }
        self.entries.insert(key, content_type.into());
    }

    /// Content type for a file name, if any suffix is registered
    pub fn get(&self, file_name: &str) -> Option<&str> {
        let lower = file_name.to_ascii_lowercase();
        // Each '.' starts a candidate suffix; the leftmost one is the longest
        lower
            .match_indices('.')
            .map(|(idx, _)| &lower[idx + 1..])
            .filter(|suffix| !suffix.is_empty())
            .find_map(|suffix| self.entries.get(suffix))
            .map(String::as_str)
    }

    /// Content type for a path, falling back to [`FALLBACK_CONTENT_TYPE`]
    pub fn lookup(&self, path: &Path) -> &str {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| self.get(name))
            .unwrap_or(FALLBACK_CONTENT_TYPE)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MimeTable {
    fn default() -> Self {
        Self::new()
    }
}
