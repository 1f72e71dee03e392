//! Source analyzer (spec.md §4.1, component C1).
//!
//! Parses a guest-language module with a full parser (swc's ECMAScript
//! grammar, the same family the teacher wraps through `deno_ast`) and
//! extracts import/export/dynamic-import descriptors with precise byte
//! ranges into the original source - ranges that [`crate::patcher`] later
//! splices against, and that [`crate::replize`] builds the REPL rewrite
//! from.

use std::ops::Range;

use swc_common::comments::SingleThreadedComments;
use swc_common::{BytePos, FileName, SourceMap, Span, Spanned};
use swc_ecma_ast as ast;
use swc_ecma_parser::{lexer::Lexer, EsSyntax, Parser, StringInput, Syntax};
use swc_ecma_visit::{Visit, VisitWith};

use crate::error::{ReplError, SourcePos};

/// One clause's set of local bindings introduced by an import declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportNames {
    /// `{ a, b as c }` - pairs of (exported name in the source module, local
    /// binding name).
    Named(Vec<NamedBinding>),
    /// `* as ns`
    Namespace(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedBinding {
    pub imported: String,
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// The full range of the `import ...;` statement.
    pub range: Range<usize>,
    /// The range of just the specifier string literal, including quotes -
    /// what [`crate::server`] rewrites in place when projecting a module's
    /// specifiers, as distinct from [`ImportEntry::range`] which
    /// [`crate::replize`] blanks out entirely.
    pub specifier_range: Range<usize>,
    pub specifier: String,
    pub default_name: Option<String>,
    pub names: Option<ImportNames>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportEntry {
    /// `export default <expr>` - `head_range` spans from the statement start
    /// up to (not including) the payload expression, so replize can replace
    /// just `export default ` with `default_export = `.
    Default { head_range: Range<usize> },
    /// `export const/let/var/function/class ...` - `head_range` spans just
    /// the `export ` keyword, so the wrapped declaration survives intact for
    /// the top-level var/function/class rewrite in [`crate::replize`].
    NamedDecl { head_range: Range<usize> },
    /// `export { a, b };` or `export { a, b } from "...";` - no local
    /// declaration is attached, so the whole statement is elided.
    NamedList { range: Range<usize> },
    /// `export * from "...";`; elided entirely.
    ReexportAll { range: Range<usize> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicKind {
    Import,
    MetaResolve,
    UrlMeta,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicEntry {
    pub kind: DynamicKind,
    pub value: String,
    /// Range to replace when the output will be evaluated as a module.
    pub module_range: Range<usize>,
    /// Range to replace when the output will be evaluated as a script.
    /// Differs from `module_range` only for the `new URL(.., meta_url)` form.
    pub script_range: Range<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    pub imports: Vec<ImportEntry>,
    pub exports: Vec<ExportEntry>,
    pub dynamics: Vec<DynamicEntry>,
}

impl Analysis {
    /// The specifier set of the module (spec.md §3): the union of every
    /// import specifier and dynamic-import value, in source order.
    pub fn specifier_set(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.imports.iter().map(|i| i.specifier.as_str()).collect();
        out.extend(self.dynamics.iter().map(|d| d.value.as_str()));
        out
    }
}

pub(crate) fn to_range(span: Span, start_pos: BytePos) -> Range<usize> {
    let lo = (span.lo.0 - start_pos.0) as usize;
    let hi = (span.hi.0 - start_pos.0) as usize;
    lo..hi
}

pub(crate) fn span_start(span: Span, start_pos: BytePos) -> usize {
    (span.lo.0 - start_pos.0) as usize
}

/// Parse `source` (treated as if it lived at `locator`, used only for
/// diagnostics), returning the AST plus the `BytePos` that byte offset 0 of
/// `source` corresponds to. Shared with [`crate::replize`], which needs a
/// second look at the AST to find top-level declarations C1 doesn't record.
pub fn parse_module(locator: &str, source: &str) -> Result<(ast::Module, BytePos), ReplError> {
    let source_map = SourceMap::default();
    let source_file =
        source_map.new_source_file(FileName::Custom(locator.to_string()).into(), source.to_string());
    let start_pos = source_file.start_pos;

    let comments = SingleThreadedComments::default();
    let syntax = Syntax::Es(EsSyntax {
        import_attributes: true,
        ..Default::default()
    });
    let lexer = Lexer::new(
        syntax,
        Default::default(),
        StringInput::from(&*source_file),
        Some(&comments),
    );
    let mut parser = Parser::new_from(lexer);
    let module = parser.parse_module().map_err(|err| {
        let loc = source_map.lookup_char_pos(err.span().lo);
        ReplError::Parse {
            locator: locator.to_string(),
            message: format!("{:?}", err.into_kind()),
            pos: SourcePos {
                line: loc.line,
                column: loc.col_display,
            },
        }
    })?;
    Ok((module, start_pos))
}

/// Parse `source` and extract its analysis record.
pub fn analyze(locator: &str, source: &str) -> Result<Analysis, ReplError> {
    let (module, start_pos) = parse_module(locator, source)?;

    let mut imports = Vec::new();
    let mut exports = Vec::new();

    for item in &module.body {
        match item {
            ast::ModuleItem::ModuleDecl(ast::ModuleDecl::Import(decl)) => {
                imports.push(analyze_import(decl, start_pos));
            }
            ast::ModuleItem::ModuleDecl(ast::ModuleDecl::ExportDefaultExpr(expr)) => {
                let head_range =
                    span_start(expr.span, start_pos)..span_start(expr.expr.span(), start_pos);
                exports.push(ExportEntry::Default { head_range });
            }
            ast::ModuleItem::ModuleDecl(ast::ModuleDecl::ExportDefaultDecl(decl)) => {
                let payload_start = span_start(default_decl_span(&decl.decl), start_pos);
                let head_range = span_start(decl.span, start_pos)..payload_start;
                exports.push(ExportEntry::Default { head_range });
            }
            ast::ModuleItem::ModuleDecl(ast::ModuleDecl::ExportDecl(decl)) => {
                let head_range =
                    span_start(decl.span, start_pos)..span_start(decl.decl.span(), start_pos);
                exports.push(ExportEntry::NamedDecl { head_range });
            }
            ast::ModuleItem::ModuleDecl(ast::ModuleDecl::ExportNamed(decl)) => {
                exports.push(ExportEntry::NamedList {
                    range: to_range(decl.span, start_pos),
                });
            }
            ast::ModuleItem::ModuleDecl(ast::ModuleDecl::ExportAll(decl)) => {
                exports.push(ExportEntry::ReexportAll {
                    range: to_range(decl.span, start_pos),
                });
            }
            _ => {}
        }
    }

    let mut dyn_visitor = DynamicVisitor {
        start_pos,
        dynamics: Vec::new(),
    };
    module.visit_with(&mut dyn_visitor);

    Ok(Analysis {
        imports,
        exports,
        dynamics: dyn_visitor.dynamics,
    })
}

fn default_decl_span(decl: &ast::DefaultDecl) -> Span {
    match decl {
        ast::DefaultDecl::Class(c) => c.class.span,
        ast::DefaultDecl::Fn(f) => f.function.span,
        ast::DefaultDecl::TsInterfaceDecl(i) => i.span,
    }
}

fn analyze_import(decl: &ast::ImportDecl, start_pos: BytePos) -> ImportEntry {
    let mut default_name = None;
    let mut named = Vec::new();
    let mut namespace = None;

    for specifier in &decl.specifiers {
        match specifier {
            ast::ImportSpecifier::Default(s) => {
                default_name = Some(s.local.sym.to_string());
            }
            ast::ImportSpecifier::Named(s) => {
                let local = s.local.sym.to_string();
                let imported = match &s.imported {
                    Some(ast::ModuleExportName::Ident(id)) => id.sym.to_string(),
                    Some(ast::ModuleExportName::Str(str_)) => str_.value.to_string(),
                    None => local.clone(),
                };
                named.push(NamedBinding { imported, local });
            }
            ast::ImportSpecifier::Namespace(s) => {
                namespace = Some(s.local.sym.to_string());
            }
        }
    }

    let names = if let Some(ns) = namespace {
        Some(ImportNames::Namespace(ns))
    } else if !named.is_empty() {
        Some(ImportNames::Named(named))
    } else {
        None
    };

    ImportEntry {
        range: to_range(decl.span, start_pos),
        specifier_range: to_range(decl.src.span, start_pos),
        specifier: decl.src.value.to_string(),
        default_name,
        names,
    }
}

struct DynamicVisitor {
    start_pos: BytePos,
    dynamics: Vec<DynamicEntry>,
}

impl Visit for DynamicVisitor {
    fn visit_call_expr(&mut self, call: &ast::CallExpr) {
        if let ast::Callee::Import(_) = call.callee {
            if let Some(arg) = call.args.first() {
                if let ast::Expr::Lit(ast::Lit::Str(s)) = &*arg.expr {
                    let literal_range = to_range(s.span, self.start_pos);
                    self.dynamics.push(DynamicEntry {
                        kind: DynamicKind::Import,
                        value: s.value.to_string(),
                        module_range: literal_range.clone(),
                        script_range: literal_range,
                    });
                    return;
                }
            }
        }

        if is_meta_resolve_callee(&call.callee) {
            if let Some(arg) = call.args.first() {
                if let ast::Expr::Lit(ast::Lit::Str(s)) = &*arg.expr {
                    self.dynamics.push(DynamicEntry {
                        kind: DynamicKind::MetaResolve,
                        value: s.value.to_string(),
                        module_range: to_range(call.span, self.start_pos),
                        script_range: to_range(call.span, self.start_pos),
                    });
                }
            }
        }

        call.visit_children_with(self);
    }

    fn visit_new_expr(&mut self, new_expr: &ast::NewExpr) {
        let is_url_ctor = matches!(&*new_expr.callee, ast::Expr::Ident(id) if &*id.sym == "URL");
        if is_url_ctor {
            if let Some(args) = &new_expr.args {
                if args.len() >= 2 {
                    if let ast::Expr::Lit(ast::Lit::Str(lit)) = &*args[0].expr {
                        let value = lit.value.to_string();
                        if value.starts_with("./") || value.starts_with("../") {
                            let module_range = to_range(lit.span, self.start_pos);
                            let script_range = span_start(lit.span, self.start_pos)
                                ..to_range(args[1].span(), self.start_pos).end;
                            self.dynamics.push(DynamicEntry {
                                kind: DynamicKind::UrlMeta,
                                value,
                                module_range,
                                script_range,
                            });
                        }
                    }
                }
            }
        }
        new_expr.visit_children_with(self);
    }
}

fn is_meta_resolve_callee(callee: &ast::Callee) -> bool {
    let expr = match callee {
        ast::Callee::Expr(e) => e,
        _ => return false,
    };
    let member = match &**expr {
        ast::Expr::Member(m) => m,
        _ => return false,
    };
    let prop_is_resolve =
        matches!(&member.prop, ast::MemberProp::Ident(id) if &*id.sym == "resolve");
    if !prop_is_resolve {
        return false;
    }
    matches!(
        &*member.obj,
        ast::Expr::MetaProp(meta) if meta.kind == ast::MetaPropKind::ImportMeta
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyzes_default_import_and_named() {
        let src = r#"import d, { a, b as c } from "./mod.js";"#;
        let analysis = analyze("file:///x.js", src).unwrap();
        assert_eq!(analysis.imports.len(), 1);
        let entry = &analysis.imports[0];
        assert_eq!(entry.specifier, "./mod.js");
        assert_eq!(entry.default_name.as_deref(), Some("d"));
        match entry.names.as_ref().unwrap() {
            ImportNames::Named(names) => {
                assert_eq!(
                    names[0],
                    NamedBinding {
                        imported: "a".into(),
                        local: "a".into()
                    }
                );
                assert_eq!(
                    names[1],
                    NamedBinding {
                        imported: "b".into(),
                        local: "c".into()
                    }
                );
            }
            _ => panic!("expected named bindings"),
        }
    }

    #[test]
    fn analyzes_namespace_import() {
        let src = r#"import * as ns from "./mod.js";"#;
        let analysis = analyze("file:///x.js", src).unwrap();
        match analysis.imports[0].names.as_ref().unwrap() {
            ImportNames::Namespace(name) => assert_eq!(name, "ns"),
            _ => panic!("expected namespace import"),
        }
    }

    #[test]
    fn analyzes_export_default_expr() {
        let src = "export default 1;";
        let analysis = analyze("file:///x.js", src).unwrap();
        match &analysis.exports[0] {
            ExportEntry::Default { head_range } => {
                assert_eq!(&src[head_range.clone()], "export default ");
            }
            _ => panic!("expected default export"),
        }
    }

    #[test]
    fn analyzes_named_export_and_reexport_all() {
        let src = "export const x = 1;\nexport * from \"./other.js\";\n";
        let analysis = analyze("file:///x.js", src).unwrap();
        assert!(matches!(analysis.exports[0], ExportEntry::NamedDecl { .. }));
        assert!(matches!(analysis.exports[1], ExportEntry::ReexportAll { .. }));
    }

    #[test]
    fn named_export_list_is_elided_whole() {
        let src = "const a = 1;\nexport { a };\n";
        let analysis = analyze("file:///x.js", src).unwrap();
        match &analysis.exports[0] {
            ExportEntry::NamedList { range } => {
                assert_eq!(&src[range.clone()], "export { a };")
            }
            other => panic!("expected NamedList, got {other:?}"),
        }
    }

    #[test]
    fn analyzes_dynamic_import() {
        let src = r#"const m = await import("./a.js");"#;
        let analysis = analyze("file:///x.js", src).unwrap();
        assert_eq!(analysis.dynamics.len(), 1);
        assert_eq!(analysis.dynamics[0].kind, DynamicKind::Import);
        assert_eq!(analysis.dynamics[0].value, "./a.js");
        assert_eq!(
            analysis.dynamics[0].module_range,
            analysis.dynamics[0].script_range
        );
        // the ranges cover just the literal, not the surrounding import(...)
        // call, so rewriting them leaves the dynamic import intact.
        assert_eq!(&src[analysis.dynamics[0].module_range.clone()], "\"./a.js\"");
    }

    #[test]
    fn analyzes_meta_resolve() {
        let src = r#"const p = import.meta.resolve("./a.js");"#;
        let analysis = analyze("file:///x.js", src).unwrap();
        assert_eq!(analysis.dynamics[0].kind, DynamicKind::MetaResolve);
        assert_eq!(analysis.dynamics[0].value, "./a.js");
    }

    #[test]
    fn analyzes_new_url_meta() {
        let src = r#"fetch(new URL("./a.bin", import.meta.url));"#;
        let analysis = analyze("file:///x.js", src).unwrap();
        let entry = &analysis.dynamics[0];
        assert_eq!(entry.kind, DynamicKind::UrlMeta);
        assert_eq!(entry.value, "./a.bin");
        assert!(entry.module_range.len() < entry.script_range.len());
        assert_eq!(&src[entry.module_range.clone()], "\"./a.bin\"");
        assert_eq!(&src[entry.script_range.clone()], "\"./a.bin\", import.meta.url");
    }

    #[test]
    fn ignores_non_literal_dynamic_specifier() {
        let src = r#"const spec = "./a.js"; import(spec);"#;
        let analysis = analyze("file:///x.js", src).unwrap();
        assert!(analysis.dynamics.is_empty());
    }

    #[test]
    fn surfaces_parse_errors_with_position() {
        let src = "const x = ;";
        let err = analyze("file:///x.js", src).unwrap_err();
        match err {
            ReplError::Parse { pos, .. } => assert_eq!(pos.line, 1),
            other => panic!("expected parse error, got {other:?}"),
        }
    }
}
