//! # weft-digest
//!
//! Condenses a generated source file to its public surface: type, interface,
//! enum, class, function, and variable declarations reduced to signatures
//! with no bodies. Dependent tasks see this digest instead of the full
//! artifact, which bounds prompt context and hides implementation detail
//! that could mislead the model.
//!
//! The scanner targets the TypeScript/JavaScript shapes the Builder emits.
//! It is line-oriented and counts brace depth outside strings and comments;
//! it does not attempt to be a full parser.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Kind of a surfaced declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Type,
    Interface,
    Enum,
    Class,
    Function,
    Variable,
}

impl SymbolKind {
    /// Output ordering: downstream prompts read top-down, shapes first
    pub const ORDER: [SymbolKind; 6] = [
        SymbolKind::Type,
        SymbolKind::Interface,
        SymbolKind::Enum,
        SymbolKind::Class,
        SymbolKind::Function,
        SymbolKind::Variable,
    ];

    fn heading(&self) -> &'static str {
        match self {
            Self::Type => "Types",
            Self::Interface => "Interfaces",
            Self::Enum => "Enums",
            Self::Class => "Classes",
            Self::Function => "Functions",
            Self::Variable => "Variables",
        }
    }
}

/// A single extracted declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Declaration text with bodies removed
    pub signature: String,
    pub exported: bool,
}

/// Options for [`digest`]
#[derive(Debug, Clone, Default)]
pub struct DigestOptions {
    /// Include non-exported declarations and private members
    pub include_private: bool,
}

/// Produce the grouped public-surface summary of a source file
pub fn digest(source: &str, options: &DigestOptions) -> String {
    let symbols = digest_symbols(source);
    let mut out = String::new();

    for kind in SymbolKind::ORDER {
        let group: Vec<&Symbol> = symbols
            .iter()
            .filter(|s| s.kind == kind && (s.exported || options.include_private))
            .collect();
        if group.is_empty() {
            continue;
        }

        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format!("// {}\n", kind.heading()));
        for symbol in group {
            out.push_str(symbol.signature.trim_end());
            out.push('\n');
        }
    }

    if out.is_empty() {
        out.push_str("// No public declarations\n");
    }
    out
}

/// Extract every top-level declaration, exported or not
pub fn digest_symbols(source: &str) -> Vec<Symbol> {
    let lines: Vec<&str> = source.lines().collect();
    let mut symbols = Vec::new();
    let mut state = ScanState::default();
    let mut i = 0;

    while i < lines.len() {
        // Peek with a copy: extract() re-reads the line from the original
        // comment/template state
        let mut peek = state;
        let code = peek.code_only(lines[i]);
        if let Some(start) = DeclStart::parse(&code) {
            let (symbol, consumed) = extract(&lines, i, &start, &mut state);
            if let Some(symbol) = symbol {
                symbols.push(symbol);
            }
            i += consumed.max(1);
        } else {
            state = peek;
            i += 1;
        }
    }

    symbols
}

/// Strip-state carried across lines: block comments and template strings
#[derive(Default, Clone, Copy)]
struct ScanState {
    in_block_comment: bool,
    in_template: bool,
}

impl ScanState {
    /// Return the line with comments and string contents removed, updating
    /// multi-line state. Only structural characters survive, which keeps
    /// brace counting honest.
    fn code_only(&mut self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut chars = line.chars().peekable();
        let mut in_string: Option<char> = None;

        while let Some(c) = chars.next() {
            if self.in_block_comment {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    self.in_block_comment = false;
                }
                continue;
            }
            if self.in_template {
                if c == '\\' {
                    chars.next();
                } else if c == '`' {
                    self.in_template = false;
                }
                continue;
            }
            if let Some(quote) = in_string {
                if c == '\\' {
                    chars.next();
                } else if c == quote {
                    in_string = None;
                }
                continue;
            }

            match c {
                '/' if chars.peek() == Some(&'/') => break,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    self.in_block_comment = true;
                }
                '\'' | '"' => in_string = Some(c),
                '`' => self.in_template = true,
                _ => out.push(c),
            }
        }

        out
    }
}

struct DeclStart {
    kind: SymbolKind,
    name: String,
    exported: bool,
}

fn decl_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?(?:async\s+)?(type|interface|const\s+enum|enum|class|function\*?|const|let|var)\s+([A-Za-z_$][A-Za-z0-9_$]*)?",
        )
        .expect("invalid declaration pattern")
    })
}

impl DeclStart {
    fn parse(code_line: &str) -> Option<Self> {
        let caps = decl_regex().captures(code_line)?;
        let keyword = caps.get(2)?.as_str();
        let kind = match keyword {
            "type" => SymbolKind::Type,
            "interface" => SymbolKind::Interface,
            "enum" => SymbolKind::Enum,
            k if k.starts_with("const") && k.ends_with("enum") => SymbolKind::Enum,
            "class" => SymbolKind::Class,
            k if k.starts_with("function") => SymbolKind::Function,
            "const" | "let" | "var" => SymbolKind::Variable,
            _ => return None,
        };
        let name = caps
            .get(3)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| "default".to_string());

        Some(Self {
            kind,
            name,
            exported: caps.get(1).is_some(),
        })
    }
}

/// Extract one declaration starting at `lines[start]`
///
/// Returns the symbol (None for unnamed noise) and how many lines were
/// consumed, including any skipped bodies.
fn extract(
    lines: &[&str],
    start: usize,
    decl: &DeclStart,
    state: &mut ScanState,
) -> (Option<Symbol>, usize) {
    match decl.kind {
        SymbolKind::Interface | SymbolKind::Enum => extract_block(lines, start, decl, state),
        SymbolKind::Class => extract_class(lines, start, decl, state),
        SymbolKind::Function => extract_function(lines, start, decl, state),
        SymbolKind::Type | SymbolKind::Variable => extract_statement(lines, start, decl, state),
    }
}

/// Interfaces and enums keep their whole block: members are signatures
fn extract_block(
    lines: &[&str],
    start: usize,
    decl: &DeclStart,
    state: &mut ScanState,
) -> (Option<Symbol>, usize) {
    let mut depth = 0i32;
    let mut opened = false;
    let mut text = String::new();
    let mut j = start;

    while j < lines.len() {
        let code = state.code_only(lines[j]);
        text.push_str(lines[j]);
        text.push('\n');
        for c in code.chars() {
            match c {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        j += 1;
        if opened && depth <= 0 {
            break;
        }
        if !opened && code.trim_end().ends_with(';') {
            break;
        }
    }

    (
        Some(Symbol {
            name: decl.name.clone(),
            kind: decl.kind,
            signature: text,
            exported: decl.exported,
        }),
        j - start,
    )
}

/// Type aliases and variables: consume to the end of the statement, keep
/// everything left of the initializer for variables
fn extract_statement(
    lines: &[&str],
    start: usize,
    decl: &DeclStart,
    state: &mut ScanState,
) -> (Option<Symbol>, usize) {
    let mut depth = 0i32;
    let mut text = String::new();
    let mut j = start;

    while j < lines.len() {
        let code = state.code_only(lines[j]);
        text.push_str(lines[j]);
        text.push('\n');
        for c in code.chars() {
            match c {
                '{' | '(' | '[' => depth += 1,
                '}' | ')' | ']' => depth -= 1,
                _ => {}
            }
        }
        j += 1;
        if depth <= 0 && code.trim_end().ends_with(';') {
            break;
        }
        // Statements without a trailing semicolon end at the declaration line
        if depth <= 0 && decl.kind == SymbolKind::Variable {
            break;
        }
    }

    let signature = if decl.kind == SymbolKind::Variable {
        // Drop the initializer; the declared name and type are the surface
        let head = text
            .split_once('=')
            .map(|(left, _)| left.trim_end().to_string())
            .unwrap_or_else(|| text.trim_end().trim_end_matches(';').to_string());
        format!("{};\n", head)
    } else {
        text
    };

    (
        Some(Symbol {
            name: decl.name.clone(),
            kind: decl.kind,
            signature,
            exported: decl.exported,
        }),
        j - start,
    )
}

/// Functions keep the header up to the body brace
fn extract_function(
    lines: &[&str],
    start: usize,
    decl: &DeclStart,
    state: &mut ScanState,
) -> (Option<Symbol>, usize) {
    let mut depth = 0i32;
    let mut opened = false;
    let mut header = String::new();
    let mut j = start;

    while j < lines.len() {
        let code = state.code_only(lines[j]);
        if !opened {
            if let Some(pos) = lines[j].find('{') {
                // Only treat it as the body brace if the stripped line
                // agrees a brace is present
                if code.contains('{') {
                    header.push_str(lines[j][..pos].trim_end());
                    opened = true;
                } else {
                    header.push_str(lines[j]);
                    header.push('\n');
                }
            } else {
                header.push_str(lines[j]);
                header.push('\n');
                if code.trim_end().ends_with(';') {
                    // Ambient declaration with no body
                    j += 1;
                    break;
                }
            }
        }
        for c in code.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
        j += 1;
        if opened && depth <= 0 {
            break;
        }
    }

    let signature = format!("{};\n", header.trim_end().trim_end_matches(';'));
    (
        Some(Symbol {
            name: decl.name.clone(),
            kind: SymbolKind::Function,
            signature,
            exported: decl.exported,
        }),
        j - start,
    )
}

/// Classes keep the header and member signatures; method bodies are skipped
/// and private members dropped
fn extract_class(
    lines: &[&str],
    start: usize,
    decl: &DeclStart,
    state: &mut ScanState,
) -> (Option<Symbol>, usize) {
    let mut depth = 0i32;
    let mut opened = false;
    let mut signature = String::new();
    let mut skipping_body = false;
    let mut j = start;

    while j < lines.len() {
        let raw = lines[j];
        let code = state.code_only(raw);
        let depth_before = depth;
        for c in code.chars() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
        let opens = code.matches('{').count() as i32;

        if !opened {
            // Class header, through the opening brace
            signature.push_str(raw);
            signature.push('\n');
            if depth > 0 {
                opened = true;
            }
        } else if skipping_body {
            if depth <= 1 {
                skipping_body = false;
            }
        } else if depth_before == 1 {
            let trimmed = raw.trim();
            let private = trimmed.starts_with("private ") || trimmed.starts_with('#');
            if opens > 0 {
                // Member with a body: keep the head, drop the body
                if !private {
                    if let Some(pos) = raw.find('{') {
                        signature.push_str(raw[..pos].trim_end());
                        signature.push_str(";\n");
                    }
                }
                if depth > 1 {
                    skipping_body = true;
                }
            } else if !trimmed.is_empty() && !private && depth >= 1 {
                signature.push_str(raw);
                signature.push('\n');
            }
        }

        j += 1;
        if opened && depth <= 0 {
            signature.push_str("}\n");
            break;
        }
    }

    (
        Some(Symbol {
            name: decl.name.clone(),
            kind: SymbolKind::Class,
            signature,
            exported: decl.exported,
        }),
        j - start,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
import { thing } from "./thing";

export type UserId = string;

type Hidden = number;

export interface User {
  id: UserId;
  name: string;
  greet(formal: boolean): string;
}

export enum Role {
  Admin,
  Member,
}

export class UserStore {
  private cache: Map<UserId, User> = new Map();

  constructor(private readonly seed: User[]) {
    for (const user of seed) {
      this.cache.set(user.id, user);
    }
  }

  get(id: UserId): User | undefined {
    return this.cache.get(id);
  }

  private evict(id: UserId): void {
    this.cache.delete(id);
  }
}

export function formatUser(user: User): string {
  const label = `${user.name}`;
  return label;
}

function helper(): void {
  console.log("internal");
}

export const DEFAULT_ROLE: Role = Role.Member;

const SECRET = "do not leak";
"#;

    #[test]
    fn test_symbols_cover_all_kinds() {
        let symbols = digest_symbols(SAMPLE);
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();

        assert!(names.contains(&"UserId"));
        assert!(names.contains(&"Hidden"));
        assert!(names.contains(&"User"));
        assert!(names.contains(&"Role"));
        assert!(names.contains(&"UserStore"));
        assert!(names.contains(&"formatUser"));
        assert!(names.contains(&"helper"));
        assert!(names.contains(&"DEFAULT_ROLE"));
        assert!(names.contains(&"SECRET"));
    }

    #[test]
    fn test_exported_flag() {
        let symbols = digest_symbols(SAMPLE);
        let by_name = |name: &str| symbols.iter().find(|s| s.name == name).unwrap();

        assert!(by_name("UserId").exported);
        assert!(!by_name("Hidden").exported);
        assert!(by_name("formatUser").exported);
        assert!(!by_name("helper").exported);
        assert!(!by_name("SECRET").exported);
    }

    #[test]
    fn test_digest_omits_private_by_default() {
        let summary = digest(SAMPLE, &DigestOptions::default());

        assert!(summary.contains("UserId"));
        assert!(summary.contains("formatUser"));
        assert!(!summary.contains("Hidden"));
        assert!(!summary.contains("helper"));
        assert!(!summary.contains("SECRET"));
    }

    #[test]
    fn test_digest_groups_in_reading_order() {
        let summary = digest(SAMPLE, &DigestOptions::default());

        let types = summary.find("// Types").unwrap();
        let interfaces = summary.find("// Interfaces").unwrap();
        let enums = summary.find("// Enums").unwrap();
        let classes = summary.find("// Classes").unwrap();
        let functions = summary.find("// Functions").unwrap();
        let variables = summary.find("// Variables").unwrap();

        assert!(types < interfaces);
        assert!(interfaces < enums);
        assert!(enums < classes);
        assert!(classes < functions);
        assert!(functions < variables);
    }

    #[test]
    fn test_function_bodies_are_dropped() {
        let summary = digest(SAMPLE, &DigestOptions::default());

        assert!(summary.contains("export function formatUser(user: User): string;"));
        assert!(!summary.contains("return label"));
    }

    #[test]
    fn test_class_method_bodies_and_private_members_dropped() {
        let summary = digest(SAMPLE, &DigestOptions::default());

        assert!(summary.contains("get(id: UserId): User | undefined;"));
        assert!(!summary.contains("this.cache.get"));
        assert!(!summary.contains("evict"));
        assert!(!summary.contains("private cache"));
    }

    #[test]
    fn test_interface_members_survive() {
        let summary = digest(SAMPLE, &DigestOptions::default());
        assert!(summary.contains("greet(formal: boolean): string;"));
    }

    #[test]
    fn test_variable_initializer_dropped() {
        let summary = digest(SAMPLE, &DigestOptions::default());
        assert!(summary.contains("export const DEFAULT_ROLE: Role;"));
        assert!(!summary.contains("Role.Member;"));
    }

    #[test]
    fn test_include_private_option() {
        let summary = digest(
            SAMPLE,
            &DigestOptions {
                include_private: true,
            },
        );
        assert!(summary.contains("Hidden"));
        assert!(summary.contains("helper"));
    }

    #[test]
    fn test_empty_source() {
        let summary = digest("", &DigestOptions::default());
        assert!(summary.contains("No public declarations"));
        assert!(digest_symbols("").is_empty());
    }

    #[test]
    fn test_braces_in_strings_do_not_confuse_depth() {
        let source = r#"
export function render(): string {
  const open = "{";
  return open + "}";
}

export const AFTER = 1;
"#;
        let symbols = digest_symbols(source);
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"render"));
        assert!(names.contains(&"AFTER"));
    }

    #[test]
    fn test_multiline_type_alias() {
        let source = "export type Wide = {\n  a: number;\n  b: string;\n};\n\nexport const X = 1;\n";
        let symbols = digest_symbols(source);
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols[0].name, "Wide");
        assert!(symbols[0].signature.contains("b: string;"));
        assert_eq!(symbols[1].name, "X");
    }
}
