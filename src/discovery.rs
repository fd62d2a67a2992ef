//! Parameter Discovery
//!
//! Parses one source file with oxc and produces the ordered list of
//! parameter declarations to instrument, together with the import facts the
//! code synthesizer needs.
//!
//! A single walk does both jobs. [`DeclarationCollector`] keeps a stack of
//! lexical scopes holding the shape-only kind of every local initializer seen
//! so far, which feeds the single indirection hop of the classifier, and
//! records `uniform(...)` / `texture(...)` declarations in statement position
//! together with their directives.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingIdentifier, BindingPattern, Declaration, Expression, ImportDeclarationSpecifier,
    ModuleExportName, Statement, VariableDeclaration, VariableDeclarator,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_span::SourceType;
use oxc_syntax::scope::{ScopeFlags, ScopeId};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Component, Path};

use crate::classify::{classify_arguments, classify_value, ParamKind};
use crate::directive::{
    directive_text, file_directives, parse_directive, CommentRange, Directive, FileDirectives,
    InclusionMode,
};
use crate::error::TransformError;

/// Callee recognised as a parameter constructor.
pub const PARAMETER_CONSTRUCTOR: &str = "uniform";

/// Callee recognised as a texture loader.
pub const TEXTURE_LOADER: &str = "texture";

/// Runtime group reserved for the preset controls.
pub const RESERVED_PRESETS_GROUP: &str = "Presets";

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSIS TYPES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDeclaration {
    pub name: String,
    pub kind: ParamKind,
    /// Byte offset right after the enclosing statement.
    pub insert_offset: usize,
    /// Byte offset of the declarator itself.
    pub start: usize,
    pub directive: Directive,
    pub group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ImportBinding {
    Named { imported: String, local: String },
    Default { local: String },
    Namespace { local: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportInfo {
    pub source: String,
    pub end: usize,
    pub bindings: Vec<ImportBinding>,
}

impl ImportInfo {
    /// Local name under which `name` is imported by this declaration.
    pub fn local_for(&self, name: &str) -> Option<&str> {
        self.bindings.iter().find_map(|b| match b {
            ImportBinding::Named { imported, local } if imported == name => Some(local.as_str()),
            _ => None,
        })
    }

    pub fn namespace(&self) -> Option<&str> {
        self.bindings.iter().find_map(|b| match b {
            ImportBinding::Namespace { local } => Some(local.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct FileAnalysis {
    /// Module id without its query; owns the bindings the file registers.
    pub file: String,
    pub group: String,
    pub directives: FileDirectives,
    /// Sorted by descending `insert_offset`, ties by descending `start`.
    pub declarations: Vec<ParameterDeclaration>,
    pub imports: Vec<ImportInfo>,
    /// End of the last top-level import, 0 when there is none.
    pub last_import_end: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// FILE HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn strip_query(file_id: &str) -> &str {
    file_id.split(['?', '#']).next().unwrap_or(file_id)
}

/// Parser mode for a module id, from its extension.
pub fn source_type_for(file_id: &str) -> SourceType {
    let path = strip_query(file_id);
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let source_type = SourceType::default().with_module(true);
    match ext.as_str() {
        "ts" | "mts" => source_type.with_typescript(true),
        "tsx" => source_type.with_typescript(true).with_jsx(true),
        _ => source_type.with_jsx(true),
    }
}

/// Runtime group for a file, kept clear of the reserved group.
///
/// Under `root` it is the root-relative module path without extension
/// (`water/index`), so two `index` files in different folders stay apart.
/// Outside a root it falls back to the file stem.
pub fn group_name_for(file_id: &str, root: Option<&str>) -> String {
    let path = Path::new(strip_query(file_id));
    let relative = root
        .and_then(|root| path.strip_prefix(root).ok())
        .map(|rel| {
            rel.with_extension("")
                .components()
                .filter_map(|c| match c {
                    Component::Normal(part) => part.to_str(),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/")
        })
        .filter(|rel| !rel.is_empty());
    let name = relative.unwrap_or_else(|| {
        path.file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("uniforms")
            .to_string()
    });
    if name == RESERVED_PRESETS_GROUP {
        format!("{}_", name)
    } else {
        name
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VISITOR
// ═══════════════════════════════════════════════════════════════════════════════

struct DeclarationCollector<'s> {
    source: &'s str,
    comments: &'s [CommentRange],
    mode: InclusionMode,
    group: &'s str,
    /// Innermost scope last. `None` is a binding whose initializer has no
    /// recognisable shape; it still shadows outer bindings of the same name.
    scopes: Vec<HashMap<String, Option<ParamKind>>>,
    found: Vec<ParameterDeclaration>,
}

impl<'s> DeclarationCollector<'s> {
    fn bind(&mut self, name: &str, kind: Option<ParamKind>) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), kind);
        }
    }

    /// Kind of the nearest visible binding of `name`.
    fn resolve(&self, name: &str) -> Option<ParamKind> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .copied()
            .flatten()
    }

    fn collect_statement(
        &mut self,
        decl: &VariableDeclaration,
        outer_start: Option<u32>,
        insert_offset: u32,
    ) {
        for declarator in &decl.declarations {
            let BindingPattern::BindingIdentifier(id) = &declarator.id else {
                continue;
            };
            let Some(Expression::CallExpression(call)) = &declarator.init else {
                continue;
            };
            let Expression::Identifier(callee) = &call.callee else {
                continue;
            };

            let kind = match callee.name.as_str() {
                PARAMETER_CONSTRUCTOR => {
                    classify_arguments(&call.arguments, |name| self.resolve(name))
                }
                TEXTURE_LOADER => Some(ParamKind::Texture),
                _ => None,
            };
            let Some(kind) = kind else {
                continue;
            };

            let mut anchors = vec![declarator.span.start as usize, decl.span.start as usize];
            if let Some(outer) = outer_start {
                anchors.push(outer as usize);
            }
            let text = directive_text(self.source, self.comments, &anchors);
            let directive = parse_directive(&text, self.mode);
            if !directive.is_included() {
                continue;
            }

            self.found.push(ParameterDeclaration {
                name: id.name.to_string(),
                kind,
                insert_offset: insert_offset as usize,
                start: declarator.span.start as usize,
                directive,
                group: self.group.to_string(),
            });
        }
    }
}

impl<'a, 's> Visit<'a> for DeclarationCollector<'s> {
    fn enter_scope(&mut self, _flags: ScopeFlags, _scope_id: &Cell<Option<ScopeId>>) {
        self.scopes.push(HashMap::new());
    }

    fn leave_scope(&mut self) {
        self.scopes.pop();
    }

    fn visit_binding_identifier(&mut self, id: &BindingIdentifier<'a>) {
        // Parameters, catch clauses, imports, destructuring: shape unknown.
        if let Some(scope) = self.scopes.last_mut() {
            scope.entry(id.name.to_string()).or_insert(None);
        }
    }

    fn visit_variable_declarator(&mut self, declarator: &VariableDeclarator<'a>) {
        if let BindingPattern::BindingIdentifier(id) = &declarator.id {
            let kind = declarator.init.as_ref().and_then(classify_value);
            self.bind(id.name.as_str(), kind);
        }
        walk::walk_variable_declarator(self, declarator);
    }

    fn visit_statement(&mut self, stmt: &Statement<'a>) {
        // Bind first so `const v = ..., u = uniform(v)` sees `v`.
        walk::walk_statement(self, stmt);
        match stmt {
            Statement::VariableDeclaration(decl) => {
                self.collect_statement(decl, None, decl.span.end);
            }
            Statement::ExportNamedDeclaration(export) => {
                if let Some(Declaration::VariableDeclaration(decl)) = &export.declaration {
                    self.collect_statement(decl, Some(export.span.start), export.span.end);
                }
            }
            _ => {}
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRY POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// Analyse one file. Unclassifiable declarations are skipped; only a parse
/// failure is an error.
pub fn analyze_source(source: &str, file_id: &str) -> Result<FileAnalysis, TransformError> {
    analyze_source_in(source, file_id, None)
}

/// [`analyze_source`] with the group named relative to a project root.
pub fn analyze_source_in(
    source: &str,
    file_id: &str,
    root: Option<&str>,
) -> Result<FileAnalysis, TransformError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type_for(file_id)).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(TransformError::Parse {
            file: file_id.to_string(),
            messages: ret.errors.iter().map(|e| e.to_string()).collect(),
        });
    }
    let program = ret.program;

    let comments: Vec<CommentRange> = program
        .comments
        .iter()
        .map(|c| CommentRange::from_span(source, c.span.start, c.span.end))
        .collect();
    let directives = file_directives(source, &comments);
    let group = group_name_for(file_id, root);

    let mut imports = Vec::new();
    for stmt in &program.body {
        if let Statement::ImportDeclaration(import) = stmt {
            let mut bindings = Vec::new();
            if let Some(specifiers) = &import.specifiers {
                for specifier in specifiers {
                    bindings.push(match specifier {
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            let imported = match &s.imported {
                                ModuleExportName::IdentifierName(id) => id.name.to_string(),
                                ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
                                _ => s.local.name.to_string(),
                            };
                            ImportBinding::Named {
                                imported,
                                local: s.local.name.to_string(),
                            }
                        }
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            ImportBinding::Default {
                                local: s.local.name.to_string(),
                            }
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            ImportBinding::Namespace {
                                local: s.local.name.to_string(),
                            }
                        }
                    });
                }
            }
            imports.push(ImportInfo {
                source: import.source.value.to_string(),
                end: import.span.end as usize,
                bindings,
            });
        }
    }
    let last_import_end = imports.iter().map(|i| i.end).max().unwrap_or(0);

    let mut collector = DeclarationCollector {
        source,
        comments: &comments,
        mode: directives.mode,
        group: &group,
        scopes: Vec::new(),
        found: Vec::new(),
    };
    collector.visit_program(&program);

    let mut declarations = collector.found;
    declarations.sort_by(|a, b| {
        b.insert_offset
            .cmp(&a.insert_offset)
            .then(b.start.cmp(&a.start))
    });

    log::debug!(
        "[tsl-uniform-gui] {}: {} parameter declaration(s)",
        file_id,
        declarations.len()
    );

    Ok(FileAnalysis {
        file: strip_query(file_id).to_string(),
        group,
        directives,
        declarations,
        imports,
        last_import_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_name_from_file_stem() {
        assert_eq!(group_name_for("/src/experience.ts", None), "experience");
        assert_eq!(group_name_for("/src/App.tsx?v=123", None), "App");
        assert_eq!(group_name_for("/src/Presets.ts", None), "Presets_");
    }

    #[test]
    fn test_group_name_relative_to_root() {
        let water = group_name_for("/app/src/water/index.ts", Some("/app/src"));
        let sky = group_name_for("/app/src/sky/index.ts?t=9", Some("/app/src"));
        assert_eq!(water, "water/index");
        assert_eq!(sky, "sky/index");
        assert_eq!(group_name_for("/app/src/Presets.ts", Some("/app/src")), "Presets_");
        // outside the root
        assert_eq!(group_name_for("/lib/shared/fog.ts", Some("/app/src")), "fog");
    }

    fn kinds(source: &str) -> Vec<(String, ParamKind)> {
        let mut out: Vec<_> = analyze_source(source, "/src/a.js")
            .unwrap()
            .declarations
            .into_iter()
            .map(|d| (d.name, d.kind))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    #[test]
    fn test_indirection_respects_shadowing() {
        let source = "const v = new Vector3();\n\
                      function f() { const v = 1; return v; }\n\
                      const u = uniform(v);";
        assert_eq!(kinds(source), vec![("u".to_string(), ParamKind::Vector3)]);

        let source = "const v = new Color();\n\
                      function f(v) { const u = uniform(v); }";
        assert!(kinds(source).is_empty());

        let source = "const v = 2;\n\
                      { const v = new Vector2(); const u = uniform(v); }";
        assert_eq!(kinds(source), vec![("u".to_string(), ParamKind::Vector2)]);
    }

    #[test]
    fn test_indirection_within_one_statement() {
        let source = "const v = new Vector4(), u = uniform(v);";
        assert_eq!(kinds(source), vec![("u".to_string(), ParamKind::Vector4)]);
    }

    #[test]
    fn test_source_type_by_extension() {
        assert!(source_type_for("a.ts").is_typescript());
        assert!(!source_type_for("a.ts").is_jsx());
        assert!(source_type_for("a.tsx").is_jsx());
        assert!(source_type_for("a.js").is_javascript());
    }
}
