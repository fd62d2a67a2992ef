//! Build-hook contract
//!
//! The host pipeline calls the hook once per candidate file with
//! `(source, file id)` and gets back either "unchanged" or rewritten source.
//! The hook never fails: parse errors are logged and the file passes through.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cache::TransformCache;
use crate::codegen::{synthesize, INSTRUMENTED_MARKER};
use crate::config::{BuildMode, PluginConfig};
use crate::directive::has_skip_marker;
use crate::discovery::analyze_source_in;
use crate::error::TransformError;

lazy_static! {
    static ref CANDIDATE_EXT_RE: Regex = Regex::new(r"\.m?[jt]sx?$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "code", rename_all = "lowercase")]
pub enum TransformOutcome {
    Unchanged,
    Rewritten(String),
}

impl TransformOutcome {
    pub fn code(&self) -> Option<&str> {
        match self {
            TransformOutcome::Unchanged => None,
            TransformOutcome::Rewritten(code) => Some(code),
        }
    }

    pub fn into_code(self) -> Option<String> {
        match self {
            TransformOutcome::Unchanged => None,
            TransformOutcome::Rewritten(code) => Some(code),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE FILTERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Translates a glob (`*`, `**`, `?`) into an anchored regex that matches the
/// whole id or any `/`-separated suffix of it.
pub fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let pattern = pattern.trim_start_matches("./");
    let mut re = String::from("(?:^|/)");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    re.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    re.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    re.push('$');
    Regex::new(&re).ok()
}

pub struct ExcludeMatcher {
    patterns: Vec<Regex>,
}

impl ExcludeMatcher {
    pub fn new(globs: &[String]) -> Self {
        let patterns = globs
            .iter()
            .filter_map(|g| {
                let re = glob_to_regex(g);
                if re.is_none() {
                    log::warn!("[tsl-uniform-gui] ignoring invalid exclude pattern {}", g);
                }
                re
            })
            .collect();
        ExcludeMatcher { patterns }
    }

    pub fn is_excluded(&self, file_id: &str) -> bool {
        let path = file_id.replace('\\', "/");
        self.patterns.iter().any(|re| re.is_match(&path))
    }
}

/// Strips the query/hash Vite appends to module ids.
fn clean_id(file_id: &str) -> &str {
    file_id.split(['?', '#']).next().unwrap_or(file_id)
}

pub fn has_candidate_extension(file_id: &str) -> bool {
    CANDIDATE_EXT_RE.is_match(clean_id(file_id))
}

// ═══════════════════════════════════════════════════════════════════════════════
// SINGLE-FILE PASS
// ═══════════════════════════════════════════════════════════════════════════════

/// Analyse and rewrite one file. Pure: no I/O, safe to call repeatedly.
pub fn transform_source(
    source: &str,
    file_id: &str,
    config: &PluginConfig,
) -> Result<TransformOutcome, TransformError> {
    if source.contains(INSTRUMENTED_MARKER) {
        log::debug!("[tsl-uniform-gui] {} is already instrumented", file_id);
        return Ok(TransformOutcome::Unchanged);
    }
    if has_skip_marker(source) {
        log::debug!("[tsl-uniform-gui] {} opted out with @uniforms-ignore", file_id);
        return Ok(TransformOutcome::Unchanged);
    }

    let analysis = analyze_source_in(source, file_id, config.root.as_deref())?;
    if analysis.declarations.is_empty() {
        log::debug!("[tsl-uniform-gui] no uniforms found in {}", file_id);
        return Ok(TransformOutcome::Unchanged);
    }

    Ok(match synthesize(source, &analysis, config) {
        Some(code) => {
            log::debug!("[tsl-uniform-gui] instrumented {}", file_id);
            TransformOutcome::Rewritten(code)
        }
        None => TransformOutcome::Unchanged,
    })
}

/// The build hook bound to one pipeline configuration.
pub struct Transformer {
    config: PluginConfig,
    mode: BuildMode,
    exclude: ExcludeMatcher,
    cache: TransformCache,
}

impl Transformer {
    pub fn new(config: PluginConfig, mode: BuildMode) -> Self {
        let exclude = ExcludeMatcher::new(&config.exclude);
        Transformer {
            config,
            mode,
            exclude,
            cache: TransformCache::new(),
        }
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    /// Whether the hook handles `file_id` at all under this configuration.
    pub fn is_candidate(&self, file_id: &str) -> bool {
        if self.config.dev_only && self.mode != BuildMode::Serve {
            return false;
        }
        if file_id.starts_with('\0') || !has_candidate_extension(file_id) {
            return false;
        }
        !self.exclude.is_excluded(clean_id(file_id))
    }

    pub fn transform(&self, source: &str, file_id: &str) -> TransformOutcome {
        if !self.is_candidate(file_id) {
            return TransformOutcome::Unchanged;
        }
        if let Some(hit) = self.cache.get(file_id, source) {
            return hit;
        }

        log::debug!("[tsl-uniform-gui] processing {}", file_id);
        let outcome = match transform_source(source, file_id, &self.config) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("[tsl-uniform-gui] error processing {}: {}", file_id, e);
                TransformOutcome::Unchanged
            }
        };
        self.cache.set(file_id, source, outcome.clone());
        outcome
    }

    pub fn cached_files(&self) -> usize {
        self.cache.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI BINDINGS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
lazy_static! {
    /// One transformer per (options, mode) pair so the cache survives between calls.
    static ref TRANSFORMERS: std::sync::Mutex<std::collections::HashMap<String, std::sync::Arc<Transformer>>> =
        std::sync::Mutex::new(std::collections::HashMap::new());
}

/// Build hook entry for the bundler plugin. `None` means "unchanged".
#[cfg(feature = "napi")]
#[napi_derive::napi]
pub fn transform_native(
    code: String,
    id: String,
    options: Option<String>,
    mode: Option<String>,
) -> napi::Result<Option<String>> {
    let options = options.unwrap_or_else(|| "{}".to_string());
    let mode = match mode.as_deref() {
        Some("build") => BuildMode::Build,
        _ => BuildMode::Serve,
    };
    let key = format!("{:?}:{}", mode, options);

    let transformer = {
        let mut registry = TRANSFORMERS
            .lock()
            .map_err(|e| napi::Error::from_reason(e.to_string()))?;
        match registry.get(&key) {
            Some(t) => t.clone(),
            None => {
                let config = PluginConfig::from_json(&options)
                    .map_err(|e| napi::Error::from_reason(e.to_string()))?;
                let t = std::sync::Arc::new(Transformer::new(config, mode));
                registry.insert(key, t.clone());
                t
            }
        }
    };
    Ok(transformer.transform(&code, &id).into_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_extensions() {
        assert!(has_candidate_extension("/src/a.ts"));
        assert!(has_candidate_extension("/src/a.tsx?t=1"));
        assert!(has_candidate_extension("/src/a.mjs"));
        assert!(!has_candidate_extension("/src/a.css"));
        assert!(!has_candidate_extension("/src/a.json"));
    }

    #[test]
    fn test_commonjs_modules_are_not_candidates() {
        assert!(!has_candidate_extension("/src/a.cjs"));
        assert!(!has_candidate_extension("/src/a.cts"));
        let t = Transformer::new(PluginConfig::default(), BuildMode::Serve);
        assert_eq!(
            t.transform("const a = uniform(1);", "/src/legacy.cjs"),
            TransformOutcome::Unchanged
        );
    }

    #[test]
    fn test_glob_patterns() {
        let matcher = ExcludeMatcher::new(&[
            "**/node_modules/**".to_string(),
            "src/legacy/*.ts".to_string(),
            "*.test.ts".to_string(),
        ]);
        assert!(matcher.is_excluded("/app/node_modules/three/build/three.module.js"));
        assert!(matcher.is_excluded("/app/src/legacy/old.ts"));
        assert!(!matcher.is_excluded("/app/src/legacy/deep/old.ts"));
        assert!(matcher.is_excluded("/app/src/math.test.ts"));
        assert!(!matcher.is_excluded("/app/src/experience.ts"));
    }

    #[test]
    fn test_dev_only_restricts_to_serve() {
        let build = Transformer::new(PluginConfig::default(), BuildMode::Build);
        assert!(!build.is_candidate("/src/a.ts"));

        let config = PluginConfig {
            dev_only: false,
            ..PluginConfig::default()
        };
        let build = Transformer::new(config, BuildMode::Build);
        assert!(build.is_candidate("/src/a.ts"));
    }

    #[test]
    fn test_virtual_modules_are_skipped() {
        let t = Transformer::new(PluginConfig::default(), BuildMode::Serve);
        assert!(!t.is_candidate("\0virtual:thing.ts"));
    }
}
