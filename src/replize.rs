//! Replize transform (spec.md §4.3, component C3).
//!
//! Turns a module's source into a self-contained script that replays as a
//! REPL entry: top-level bindings are projected onto a persistent,
//! per-scope record instead of a fresh module environment, so that a
//! variable declared in one evaluation is visible (and redeclarable) in the
//! next.
//!
//! Unlike the teacher's AST-to-AST fold-and-reprint approach, this module
//! edits the original source textually via [`crate::patcher`]: every
//! elided range is replaced by blank lines rather than removed outright, so
//! line numbers in the output match the input one for one and stack traces
//! stay meaningful.

use swc_common::BytePos;
use swc_ecma_ast as ast;

use crate::analyzer::{self, span_start, to_range, Analysis, ExportEntry, ImportNames};
use crate::error::ReplError;
use crate::patcher::{self, Edit};

/// One identifier the harness must (re)initialize before the payload runs.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum IdentifierInit {
    /// A plain top-level `var`/`let`/`const`, function or class binding:
    /// initialize to `undefined` (functions and classes self-assign when
    /// their declaration runs).
    Var { name: String },
    /// Projected from the default export of `imports[from]`.
    Default { name: String, from: usize },
    /// Projected as the whole namespace object `imports[from]`.
    Namespace { name: String, from: usize },
    /// Projected as `imports[from][imported]`.
    Named {
        name: String,
        from: usize,
        imported: String,
    },
}

impl IdentifierInit {
    fn name(&self) -> &str {
        match self {
            IdentifierInit::Var { name }
            | IdentifierInit::Default { name, .. }
            | IdentifierInit::Namespace { name, .. }
            | IdentifierInit::Named { name, .. } => name,
        }
    }
}

/// The result of [`replize`]: a self-contained script plus the plain list
/// of identifier names the harness now owns in `scope_name`'s record.
#[derive(Debug, Clone)]
pub struct Replized {
    pub script: String,
    pub identifiers: Vec<String>,
}

/// Outer harness template (spec.md §4.3, §9). `%%SCOPE%%`, `%%IDENTIFIERS%%`
/// and `%%PAYLOAD%%` are substituted with JSON-encoded literals before the
/// result is handed to an evaluator. The outer script stays non-strict so
/// the `with` statement is legal; the payload itself opts into strict mode
/// via its own `"use strict";` prologue once it is inside the `with` block,
/// which does not disturb free-variable resolution through `scope`.
const HARNESS_TEMPLATE: &str = r#"(function () {
  const root = globalThis;
  if (!root.__replete_scopes__) {
    root.__replete_scopes__ = Object.create(null);
  }
  const scopes = root.__replete_scopes__;
  const scopeName = %%SCOPE%%;
  let scope = scopes[scopeName];
  if (!scope) {
    scope = { default_export: undefined, last_value: undefined };
    scopes[scopeName] = scope;
  }
  const identifiers = %%IDENTIFIERS%%;
  for (let i = 0; i < identifiers.length; i++) {
    const entry = identifiers[i];
    if (entry.kind === "var") {
      scope[entry.name] = undefined;
    } else if (entry.kind === "default") {
      scope[entry.name] = imports[entry.from].default;
    } else if (entry.kind === "namespace") {
      scope[entry.name] = imports[entry.from];
    } else if (entry.kind === "named") {
      scope[entry.name] = imports[entry.from][entry.imported];
    }
  }
  with (scope) {
    scope.last_value = eval(%%PAYLOAD%%);
  }
})();
"#;

/// Rewrite `source` into a self-contained script that replays inside
/// `scope_name`'s persistent record. `dynamic_specifiers_resolved` must
/// have one entry per `analysis.dynamics` entry, in the same order (the
/// resolved, host-visible locator each dynamic form should see at runtime).
pub fn replize(
    source: &str,
    analysis: &Analysis,
    dynamic_specifiers_resolved: &[String],
    scope_name: &str,
) -> Result<Replized, ReplError> {
    debug_assert_eq!(dynamic_specifiers_resolved.len(), analysis.dynamics.len());

    let (module, start_pos) = analyzer::parse_module(scope_name, source)?;

    let mut edits = Vec::new();
    let mut identifiers = Vec::new();

    for (idx, import) in analysis.imports.iter().enumerate() {
        edits.push(Edit::new(
            import.range.clone(),
            patcher::blanks(source, import.range.clone()),
        ));
        if let Some(name) = &import.default_name {
            identifiers.push(IdentifierInit::Default {
                name: name.clone(),
                from: idx,
            });
        }
        match &import.names {
            Some(ImportNames::Namespace(name)) => identifiers.push(IdentifierInit::Namespace {
                name: name.clone(),
                from: idx,
            }),
            Some(ImportNames::Named(bindings)) => {
                for binding in bindings {
                    identifiers.push(IdentifierInit::Named {
                        name: binding.local.clone(),
                        from: idx,
                        imported: binding.imported.clone(),
                    });
                }
            }
            None => {}
        }
    }

    for export in &analysis.exports {
        match export {
            ExportEntry::Default { head_range } => {
                edits.push(Edit::new(head_range.clone(), "default_export = "));
            }
            ExportEntry::NamedDecl { head_range } => {
                edits.push(Edit::new(
                    head_range.clone(),
                    patcher::blanks(source, head_range.clone()),
                ));
            }
            ExportEntry::NamedList { range } => {
                edits.push(Edit::new(range.clone(), patcher::blanks(source, range.clone())));
            }
            ExportEntry::ReexportAll { range } => {
                edits.push(Edit::new(range.clone(), patcher::blanks(source, range.clone())));
            }
        }
    }

    for (dynamic, resolved) in analysis.dynamics.iter().zip(dynamic_specifiers_resolved) {
        let literal = serde_json::to_string(resolved)?;
        let pad = patcher::blanks(source, dynamic.script_range.clone());
        edits.push(Edit::new(
            dynamic.script_range.clone(),
            format!("{pad}{literal}"),
        ));
    }

    for item in &module.body {
        let decl = match item {
            ast::ModuleItem::Stmt(ast::Stmt::Decl(decl)) => Some(decl),
            ast::ModuleItem::ModuleDecl(ast::ModuleDecl::ExportDecl(export_decl)) => {
                Some(&export_decl.decl)
            }
            _ => None,
        };
        let Some(decl) = decl else { continue };

        match decl {
            ast::Decl::Var(var_decl) => {
                handle_var_decl(var_decl, start_pos, source, &mut edits, &mut identifiers)
            }
            ast::Decl::Fn(fn_decl) => handle_fn_decl(fn_decl, start_pos, &mut edits, &mut identifiers),
            ast::Decl::Class(class_decl) => {
                handle_class_decl(class_decl, start_pos, &mut edits, &mut identifiers)
            }
            _ => {}
        }
    }

    let inner_payload = patcher::apply(source, &edits);
    let payload_with_prologue = format!("\"use strict\";\n{inner_payload}");

    let rendered = HARNESS_TEMPLATE
        .replace("%%SCOPE%%", &serde_json::to_string(scope_name)?)
        .replace("%%IDENTIFIERS%%", &serde_json::to_string(&identifiers)?)
        .replace("%%PAYLOAD%%", &serde_json::to_string(&payload_with_prologue)?);

    Ok(Replized {
        script: rendered,
        identifiers: identifiers.iter().map(|i| i.name().to_string()).collect(),
    })
}

/// `var`/`let`/`const` at top level: drop the keyword so the declaration
/// becomes an assignment expression resolved through the enclosing `with`
/// scope; wrap object-destructuring declarators in parens so the statement
/// doesn't get misparsed as a block; give uninitialized declarators an
/// explicit `= undefined`.
fn handle_var_decl(
    var_decl: &ast::VarDecl,
    start_pos: BytePos,
    source: &str,
    edits: &mut Vec<Edit>,
    identifiers: &mut Vec<IdentifierInit>,
) {
    let Some(first) = var_decl.decls.first() else {
        return;
    };
    let kind_start = span_start(var_decl.span, start_pos);
    let kind_end = span_start(first.span, start_pos);
    edits.push(Edit::new(kind_start..kind_end, ""));

    for decl in &var_decl.decls {
        collect_pat_identifiers(&decl.name, identifiers);

        let decl_range = to_range(decl.span, start_pos);
        if decl.init.is_none() {
            edits.push(Edit::new(decl_range.end..decl_range.end, " = undefined"));
        }
        if matches!(&decl.name, ast::Pat::Object(_)) {
            edits.push(Edit::new(decl_range.start..decl_range.start, "("));
            edits.push(Edit::new(decl_range.end..decl_range.end, ")"));
        }
    }
}

fn collect_pat_identifiers(pat: &ast::Pat, identifiers: &mut Vec<IdentifierInit>) {
    match pat {
        ast::Pat::Ident(binding) => identifiers.push(IdentifierInit::Var {
            name: binding.id.sym.to_string(),
        }),
        ast::Pat::Array(arr) => {
            for elem in arr.elems.iter().flatten() {
                collect_pat_identifiers(elem, identifiers);
            }
        }
        ast::Pat::Object(obj) => {
            for prop in &obj.props {
                match prop {
                    ast::ObjectPatProp::KeyValue(kv) => collect_pat_identifiers(&kv.value, identifiers),
                    ast::ObjectPatProp::Assign(assign) => identifiers.push(IdentifierInit::Var {
                        name: assign.key.sym.to_string(),
                    }),
                    ast::ObjectPatProp::Rest(rest) => collect_pat_identifiers(&rest.arg, identifiers),
                }
            }
        }
        ast::Pat::Assign(assign) => collect_pat_identifiers(&assign.left, identifiers),
        ast::Pat::Rest(rest) => collect_pat_identifiers(&rest.arg, identifiers),
        ast::Pat::Expr(_) | ast::Pat::Invalid(_) => {}
    }
}

/// Top-level function declarations are renamed to `$name` at their
/// declaration site and re-bound through an assignment prepended at offset
/// zero (no inserted newline, so later line numbers are untouched). Bare
/// references to `name` elsewhere in the module are left alone: they keep
/// resolving through the enclosing `with` scope, so a later redefinition
/// transparently updates what earlier-defined functions see when they call
/// it.
fn handle_fn_decl(
    fn_decl: &ast::FnDecl,
    start_pos: BytePos,
    edits: &mut Vec<Edit>,
    identifiers: &mut Vec<IdentifierInit>,
) {
    let name = fn_decl.ident.sym.to_string();
    let ident_range = to_range(fn_decl.ident.span, start_pos);
    edits.push(Edit::new(ident_range, format!("${name}")));
    edits.push(Edit::new(0..0, format!("{name} = ${name};")));
    identifiers.push(IdentifierInit::Var { name });
}

/// Top-level classes can't be redeclared by a second `class Name {}` in the
/// same scope, so they're turned into `name = class Name {};` instead.
fn handle_class_decl(
    class_decl: &ast::ClassDecl,
    start_pos: BytePos,
    edits: &mut Vec<Edit>,
    identifiers: &mut Vec<IdentifierInit>,
) {
    let name = class_decl.ident.sym.to_string();
    let range = to_range(class_decl.class.span, start_pos);
    edits.push(Edit::new(range.start..range.start, format!("{name} = ")));
    edits.push(Edit::new(range.end..range.end, ";"));
    identifiers.push(IdentifierInit::Var { name });
}
