//! Code Synthesizer
//!
//! Emits one binding-registration block per discovered declaration and one
//! bootstrap block per file, and splices them into the original text.
//!
//! Nothing is re-printed. Every change is an [`Edit`] (an offset plus the
//! text to insert) and edits are applied back-to-front. Bytes outside the
//! insertion points are untouched, and an insertion never moves an offset
//! that has not been consumed yet.

use crate::classify::ParamKind;
use crate::config::PluginConfig;
use crate::directive::RangeDirective;
use crate::discovery::{FileAnalysis, ImportInfo, ParameterDeclaration};
use crate::runtime::value::json_number;

/// Marker left in instrumented output; a file carrying it is not instrumented again.
pub const INSTRUMENTED_MARKER: &str = "/* @tsl-uniform-gui:instrumented */";

/// Name exported by the runtime module.
pub const RUNTIME_ACCESSOR: &str = "uniformGui";

/// Per-file function that lazily reaches the controller singleton.
pub const CONTROLLER_FN: &str = "__tslUniformGui";

const RUNTIME_ACCESSOR_ALIAS: &str = "__uniformGui";
const TEXTURE_LOADER_ALIAS: &str = "__TextureLoader";
const THREE_MODULES: &[&str] = &["three", "three/webgpu"];

// ═══════════════════════════════════════════════════════════════════════════════
// TEXT EDITS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub offset: usize,
    pub text: String,
}

impl Edit {
    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Edit {
            offset,
            text: text.into(),
        }
    }
}

/// Applies insertions from the highest offset down.
///
/// Edits sharing an offset are inserted in list order, so a later edit lands
/// in front of an earlier one.
pub fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by(|a, b| b.offset.cmp(&a.offset));

    let extra: usize = edits.iter().map(|e| e.text.len()).sum();
    let mut result = String::with_capacity(source.len() + extra);
    result.push_str(source);
    for edit in edits {
        let offset = edit.offset.min(source.len());
        result.replace_range(offset..offset, &edit.text);
    }
    result
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAME RESOLUTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifiers the generated code refers to, reusing existing imports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedNames {
    pub accessor: String,
    pub texture_loader: String,
    /// Import statements that must be prepended.
    pub imports: Vec<String>,
}

pub fn resolve_names(
    imports: &[ImportInfo],
    config: &PluginConfig,
    needs_texture_loader: bool,
) -> GeneratedNames {
    let mut prepend = Vec::new();

    let accessor = imports
        .iter()
        .filter(|i| i.source == config.runtime_module)
        .find_map(|i| i.local_for(RUNTIME_ACCESSOR))
        .map(str::to_string)
        .unwrap_or_else(|| {
            prepend.push(format!(
                "import {{ {} as {} }} from {};\n",
                RUNTIME_ACCESSOR,
                RUNTIME_ACCESSOR_ALIAS,
                js_string(&config.runtime_module)
            ));
            RUNTIME_ACCESSOR_ALIAS.to_string()
        });

    let three: Vec<&ImportInfo> = imports
        .iter()
        .filter(|i| THREE_MODULES.contains(&i.source.as_str()))
        .collect();
    let existing_loader = three
        .iter()
        .find_map(|i| i.local_for("TextureLoader"))
        .map(str::to_string)
        .or_else(|| {
            three
                .iter()
                .find_map(|i| i.namespace())
                .map(|ns| format!("{}.TextureLoader", ns))
        });
    let texture_loader = match existing_loader {
        Some(loader) => loader,
        None => {
            if needs_texture_loader {
                prepend.push(format!(
                    "import {{ TextureLoader as {} }} from \"three\";\n",
                    TEXTURE_LOADER_ALIAS
                ));
            }
            TEXTURE_LOADER_ALIAS.to_string()
        }
    };

    GeneratedNames {
        accessor,
        texture_loader,
        imports: prepend,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK GENERATION
// ═══════════════════════════════════════════════════════════════════════════════

/// JS string literal for `value`.
pub fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

fn js_number(value: f64) -> String {
    if value.is_finite() {
        json_number(value)
    } else {
        "0".to_string()
    }
}

/// Slider settings as a JS object literal; keys without a value are left out.
fn range_literal(range: &RangeDirective) -> String {
    let mut fields = Vec::new();
    if let Some(min) = range.min {
        fields.push(format!("min: {}", js_number(min)));
    }
    if let Some(max) = range.max {
        fields.push(format!("max: {}", js_number(max)));
    }
    fields.push(format!("step: {}", js_number(range.step)));
    format!("{{ {} }}", fields.join(", "))
}

/// `group, name, component` as passed to every runtime call; a whole value
/// has a `null` component.
fn key_args(group: &str, name: &str, component: Option<&str>) -> String {
    format!(
        "{}, {}, {}",
        js_string(group),
        js_string(name),
        component.map_or_else(|| "null".to_string(), js_string)
    )
}

/// Capture, seed-or-baseline lines for one scalar-like target.
///
/// `read` is the expression producing the serialized value, `write` turns
/// `__seed` back into an assignment.
fn seed_lines(key: &str, read: &str, write: &str) -> String {
    format!(
        "  __gui.captureInitialValue({key}, {read});\n\
         \x20 {{\n\
         \x20   const __seed = __gui.seedValue({key});\n\
         \x20   if (__seed !== undefined) {{\n\
         \x20     {write}\n\
         \x20   }} else {{\n\
         \x20     __gui.captureBaseline({key}, {read});\n\
         \x20   }}\n\
         \x20 }}\n",
        key = key,
        read = read,
        write = write
    )
}

/// The registration block for one declaration, or `None` for kinds without a control.
///
/// The block talks to the runtime only through the methods of the object
/// `uniformGui(options)` returns; the runtime builds the widgets.
pub fn binding_block(decl: &ParameterDeclaration, names: &GeneratedNames) -> Option<String> {
    if !decl.kind.has_control() {
        return None;
    }

    let group = js_string(&decl.group);
    let label = js_string(&decl.name);
    let name = decl.name.as_str();
    let kind = js_string(decl.kind.as_str());
    let range = decl.directive.range_or_default();

    let mut body = String::new();
    body.push_str(&format!("  const __gui = {}();\n", CONTROLLER_FN));

    match decl.kind {
        ParamKind::Boolean | ParamKind::Number | ParamKind::Color => {
            let key = key_args(&decl.group, name, None);
            body.push_str(&format!("  __gui.disposeBinding({});\n", key));
            let (read, write) = if decl.kind == ParamKind::Color {
                (
                    format!(
                        "JSON.stringify({{ r: {n}.value.r, g: {n}.value.g, b: {n}.value.b }})",
                        n = name
                    ),
                    format!(
                        "const __rgb = JSON.parse(__seed); {n}.value.r = __rgb.r; {n}.value.g = __rgb.g; {n}.value.b = __rgb.b;",
                        n = name
                    ),
                )
            } else {
                (format!("{}.value", name), format!("{}.value = __seed;", name))
            };
            let slider = match decl.kind {
                ParamKind::Number => range_literal(&range),
                _ => "null".to_string(),
            };
            body.push_str(&seed_lines(&key, &read, &write));
            body.push_str(&format!(
                "  __gui.storeBinding({}, {}, {}, {});\n",
                key, kind, name, slider
            ));
        }
        ParamKind::Vector2 | ParamKind::Vector3 | ParamKind::Vector4 => {
            for axis in decl.kind.axes() {
                body.push_str(&format!(
                    "  __gui.disposeBinding({});\n",
                    key_args(&decl.group, name, Some(axis))
                ));
            }
            body.push_str(&format!(
                "  __gui.disposeBinding({});\n",
                key_args(&decl.group, name, None)
            ));
            body.push_str(&format!("  __gui.storeFolder({}, {});\n", group, label));
            for axis in decl.kind.axes() {
                let key = key_args(&decl.group, name, Some(axis));
                let read = format!("{}.value.{}", name, axis);
                let write = format!("{}.value.{} = __seed;", name, axis);
                body.push_str(&seed_lines(&key, &read, &write));
                body.push_str(&format!(
                    "  __gui.storeBinding({}, {}, {}, {});\n",
                    key,
                    kind,
                    name,
                    range_literal(&range)
                ));
            }
        }
        ParamKind::Texture => {
            body.push_str(&format!(
                "  __gui.disposeBinding({});\n",
                key_args(&decl.group, name, None)
            ));
            body.push_str(&format!("  __gui.storeFolder({}, {});\n", group, label));
            body.push_str(&format!(
                "  __gui.storeTexture({g}, {l}, (__url) => {{\n\
                 \x20   {n}.value = new {loader}().load(__url);\n\
                 \x20 }});\n",
                g = group,
                l = label,
                n = name,
                loader = names.texture_loader
            ));
        }
        ParamKind::Matrix3 | ParamKind::Matrix4 => return None,
    }

    Some(format!(";\n{{\n{}}}\n", body))
}

/// File-level bootstrap: controller accessor, hot-reload hook, and the claim
/// of the file's group under its module id.
pub fn bootstrap_block(
    group: &str,
    file: &str,
    names: &GeneratedNames,
    config: &PluginConfig,
) -> String {
    let options = serde_json::to_string(&config.runtime_options())
        .unwrap_or_else(|_| "{}".to_string());
    format!(
        "\n{marker}\n\
         function {ctl}() {{\n\
         \x20 return {accessor}({options});\n\
         }}\n\
         if (import.meta.hot) {{\n\
         \x20 import.meta.hot.on(\"vite:afterUpdate\", () => {ctl}().onHotReload());\n\
         }}\n\
         {ctl}().ensureGroup({group}, {file});\n",
        marker = INSTRUMENTED_MARKER,
        ctl = CONTROLLER_FN,
        accessor = names.accessor,
        options = options,
        group = js_string(group),
        file = js_string(file)
    )
}

/// Where prepended imports go: the top, or after a hashbang line.
fn prologue_offset(source: &str) -> usize {
    if source.starts_with("#!") {
        source.find('\n').map_or(source.len(), |i| i + 1)
    } else {
        0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYNTHESIS
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewrites `source` with every binding block and the bootstrap block.
/// Returns `None` when no declaration yields a control.
pub fn synthesize(source: &str, analysis: &FileAnalysis, config: &PluginConfig) -> Option<String> {
    let needs_texture_loader = analysis
        .declarations
        .iter()
        .any(|d| d.kind == ParamKind::Texture);
    let names = resolve_names(&analysis.imports, config, needs_texture_loader);

    let mut edits = Vec::new();
    for decl in &analysis.declarations {
        match binding_block(decl, &names) {
            Some(block) => edits.push(Edit::insert(decl.insert_offset, block)),
            None => log::debug!(
                "[tsl-uniform-gui] {} is a {} and has no control",
                decl.name,
                decl.kind.as_str()
            ),
        }
    }
    if edits.is_empty() {
        return None;
    }

    let prologue = prologue_offset(source);
    let bootstrap_at = analysis.last_import_end.max(prologue);
    edits.push(Edit::insert(
        bootstrap_at,
        bootstrap_block(&analysis.group, &analysis.file, &names, config),
    ));
    if !names.imports.is_empty() {
        edits.push(Edit::insert(prologue, names.imports.concat()));
    }

    Some(apply_edits(source, edits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_edits_descending_keeps_offsets_valid() {
        let source = "aaa;bbb;ccc;";
        let edits = vec![
            Edit::insert(4, "<1>"),
            Edit::insert(8, "<2>"),
            Edit::insert(12, "<3>"),
        ];
        assert_eq!(apply_edits(source, edits), "aaa;<1>bbb;<2>ccc;<3>");
    }

    #[test]
    fn test_apply_edits_shared_offset_later_lands_first() {
        let out = apply_edits("xy", vec![Edit::insert(1, "A"), Edit::insert(1, "B")]);
        assert_eq!(out, "xBAy");
    }

    #[test]
    fn test_range_literal_leaves_out_open_bounds() {
        let range = RangeDirective {
            min: Some(-5.0),
            max: None,
            step: 0.1,
        };
        assert_eq!(range_literal(&range), "{ min: -5, step: 0.1 }");
        assert_eq!(range_literal(&RangeDirective::default()), "{ step: 0.01 }");
    }

    #[test]
    fn test_key_args_whole_value_has_null_component() {
        assert_eq!(key_args("g", "n", None), "\"g\", \"n\", null");
        assert_eq!(key_args("g", "n", Some("x")), "\"g\", \"n\", \"x\"");
    }

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_prologue_after_hashbang() {
        assert_eq!(prologue_offset("#!/usr/bin/env node\nimport a from 'a';"), 20);
        assert_eq!(prologue_offset("import a from 'a';"), 0);
    }

    #[test]
    fn test_resolve_names_reuses_existing_imports() {
        let config = PluginConfig::default();
        let imports = vec![
            ImportInfo {
                source: config.runtime_module.clone(),
                end: 10,
                bindings: vec![crate::discovery::ImportBinding::Named {
                    imported: RUNTIME_ACCESSOR.to_string(),
                    local: "gui".to_string(),
                }],
            },
            ImportInfo {
                source: "three/webgpu".to_string(),
                end: 20,
                bindings: vec![crate::discovery::ImportBinding::Namespace {
                    local: "THREE".to_string(),
                }],
            },
        ];
        let names = resolve_names(&imports, &config, true);
        assert_eq!(names.accessor, "gui");
        assert_eq!(names.texture_loader, "THREE.TextureLoader");
        assert!(names.imports.is_empty());
    }

    #[test]
    fn test_resolve_names_prepends_missing_imports() {
        let names = resolve_names(&[], &PluginConfig::default(), true);
        assert_eq!(names.accessor, RUNTIME_ACCESSOR_ALIAS);
        assert_eq!(names.imports.len(), 2);
        assert!(names.imports[0].contains("tsl-uniform-gui/runtime"));
        assert!(names.imports[1].contains("TextureLoader"));

        let names = resolve_names(&[], &PluginConfig::default(), false);
        assert_eq!(names.imports.len(), 1);
    }
}
