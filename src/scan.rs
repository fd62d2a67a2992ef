//! Dry run over a source tree: which files the hook would instrument and with
//! what.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::classify::ParamKind;
use crate::config::PluginConfig;
use crate::directive::has_skip_marker;
use crate::discovery::{analyze_source_in, group_name_for};
use crate::transform::{has_candidate_extension, ExcludeMatcher};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterReport {
    pub name: String,
    pub kind: ParamKind,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: f64,
    /// False for kinds that get no control (matrices).
    pub has_control: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub path: String,
    pub group: String,
    pub skipped: bool,
    pub parameters: Vec<ParameterReport>,
    pub error: Option<String>,
}

/// Recursively find candidate script files under `root`, honouring `exclude`.
fn find_candidate_files(root: &Path, exclude: &ExcludeMatcher) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true).into_iter().flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let id = path.to_string_lossy().replace('\\', "/");
        if has_candidate_extension(&id) && !exclude.is_excluded(&id) {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    files
}

fn scan_file(path: &Path, group_root: Option<&str>) -> FileReport {
    let id = path.to_string_lossy().to_string();
    let mut report = FileReport {
        path: id.clone(),
        group: group_name_for(&id, group_root),
        skipped: false,
        parameters: Vec::new(),
        error: None,
    };

    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(e) => {
            report.error = Some(format!("failed to read file: {}", e));
            return report;
        }
    };
    if has_skip_marker(&source) {
        report.skipped = true;
        return report;
    }

    match analyze_source_in(&source, &id, group_root) {
        Ok(analysis) => {
            // analysis is back-to-front; report in source order
            report.parameters = analysis
                .declarations
                .iter()
                .rev()
                .map(|d| {
                    let range = d.directive.range_or_default();
                    ParameterReport {
                        name: d.name.clone(),
                        kind: d.kind,
                        min: range.min,
                        max: range.max,
                        step: range.step,
                        has_control: d.kind.has_control(),
                    }
                })
                .collect();
        }
        Err(e) => {
            log::error!("[tsl-uniform-gui] {}", e);
            report.error = Some(e.to_string());
        }
    }
    report
}

/// Analyse every candidate file under `root` in parallel. Files without any
/// parameter are left out unless they failed or opted out.
pub fn scan_directory(root: &Path, config: &PluginConfig) -> Vec<FileReport> {
    if !root.exists() {
        return Vec::new();
    }
    let exclude = ExcludeMatcher::new(&config.exclude);
    let files = find_candidate_files(root, &exclude);
    log::debug!("[tsl-uniform-gui] scanning {} files under {:?}", files.len(), root);

    files
        .par_iter()
        .map(|path| scan_file(path, config.root.as_deref()))
        .filter(|r| r.skipped || r.error.is_some() || !r.parameters.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "tsl-uniform-gui-scan-{}-{}",
            name,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::create_dir_all(dir.join("node_modules/pkg")).unwrap();
        dir
    }

    #[test]
    fn test_scan_reports_parameters_in_source_order() {
        let root = temp_root("order");
        fs::write(
            root.join("src/experience.ts"),
            "import { uniform } from 'three/tsl';\nconst a = uniform(1);\nconst b = uniform(true);\n",
        )
        .unwrap();
        fs::write(root.join("src/plain.ts"), "export const x = 1;\n").unwrap();
        fs::write(root.join("src/style.css"), "body {}\n").unwrap();
        fs::write(
            root.join("node_modules/pkg/index.js"),
            "const c = uniform(1);\n",
        )
        .unwrap();

        let reports = scan_directory(&root, &PluginConfig::default());
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.group, "experience");
        let names: Vec<&str> = report.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(report.parameters[1].kind, ParamKind::Boolean);

        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_scan_groups_relative_to_configured_root() {
        let root = temp_root("groups");
        fs::create_dir_all(root.join("src/water")).unwrap();
        fs::create_dir_all(root.join("src/sky")).unwrap();
        fs::write(root.join("src/water/index.ts"), "const waveHeight = uniform(1);\n").unwrap();
        fs::write(root.join("src/sky/index.ts"), "const sunAngle = uniform(0.5);\n").unwrap();

        let config = PluginConfig {
            root: Some(root.join("src").to_string_lossy().to_string()),
            ..PluginConfig::default()
        };
        let mut groups: Vec<String> = scan_directory(&root, &config)
            .into_iter()
            .map(|r| r.group)
            .collect();
        groups.sort();
        assert_eq!(groups, vec!["sky/index", "water/index"]);
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_scan_marks_skipped_files() {
        let root = temp_root("skip");
        fs::write(
            root.join("src/ignored.js"),
            "// @uniforms-ignore\nconst a = uniform(1);\n",
        )
        .unwrap();
        let reports = scan_directory(&root, &PluginConfig::default());
        assert_eq!(reports.len(), 1);
        assert!(reports[0].skipped);
        assert!(reports[0].parameters.is_empty());
        let _ = fs::remove_dir_all(&root);
    }

    #[test]
    fn test_missing_root() {
        assert!(scan_directory(Path::new("/definitely/not/here"), &PluginConfig::default()).is_empty());
    }
}
