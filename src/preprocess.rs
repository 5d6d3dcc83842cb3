//! Text preprocessor
//!
//! Runs before lexing and hands the parser a single, fully expanded string:
//!
//! 1. `;` line comments are stripped (quote-aware).
//! 2. `!define NAME value` lines are removed and every later identifier
//!    occurrence of NAME (outside strings) is replaced by the value.
//! 3. `!import name` directives inline other source files. Imported files
//!    are preprocessed in isolation, their outer `{ }` block is stripped,
//!    and imports written before the main block land just inside the main
//!    block's opening brace. A visited set breaks import cycles.
//!
//! File access goes through a caller-supplied loader so the pass works
//! against any source of files (the CLI passes a filesystem loader).

use std::collections::{HashMap, HashSet};

/// Resolves an import name to file contents, or `None` if unavailable
pub trait ImportLoader {
    fn load(&mut self, filename: &str) -> Option<String>;
}

impl<F> ImportLoader for F
where
    F: FnMut(&str) -> Option<String>,
{
    fn load(&mut self, filename: &str) -> Option<String> {
        self(filename)
    }
}

/// Preprocess a single source string: comments and defines, no imports.
pub fn preprocess(source: &str) -> String {
    expand_defines(&strip_comments(source))
}

/// Full preprocessing: imports first (each file expanded in isolation),
/// then comments and defines over the main file.
pub fn preprocess_with_imports(source: &str, loader: &mut dyn ImportLoader) -> String {
    let mut imported = HashSet::new();
    let with_imports = process_imports(source, loader, &mut imported);
    preprocess(&with_imports)
}

/// Strip `;` comments outside string literals, keeping newlines so line
/// positions survive.
fn strip_comments(source: &str) -> String {
    let mut result = String::with_capacity(source.len());
    let mut in_string = false;
    let mut chars = source.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '"' {
            in_string = !in_string;
            result.push(c);
        } else if c == ';' && !in_string {
            while let Some(&next) = chars.peek() {
                if next == '\n' {
                    break;
                }
                chars.next();
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Collect `!define NAME value` lines, then substitute whole identifiers
/// outside string literals.
fn expand_defines(source: &str) -> String {
    let mut defines: HashMap<String, String> = HashMap::new();
    let mut body = String::with_capacity(source.len());

    for line in source.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("!define") {
            let rest = rest.trim_start();
            if let Some((name, value)) = rest.split_once(char::is_whitespace) {
                defines.insert(name.to_string(), value.trim().to_string());
            }
            body.push('\n');
        } else {
            body.push_str(line);
            body.push('\n');
        }
    }

    if defines.is_empty() {
        return body;
    }

    let mut expanded = String::with_capacity(body.len());
    let mut in_string = false;
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '"' {
            in_string = !in_string;
            expanded.push(c);
            i += 1;
        } else if !in_string && (c.is_alphabetic() || c == '_') {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            match defines.get(&ident) {
                Some(value) => expanded.push_str(value),
                None => expanded.push_str(&ident),
            }
        } else {
            expanded.push(c);
            i += 1;
        }
    }
    expanded
}

/// Return the contents of the outermost `{ }` block, or the input when no
/// balanced block is found.
fn strip_outer_block(source: &str) -> &str {
    let Some(open) = source.find('{') else {
        return source;
    };

    let mut depth = 0i32;
    let mut in_string = false;
    for (offset, c) in source[open..].char_indices() {
        match c {
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return &source[open + 1..open + offset];
                }
            }
            _ => {}
        }
    }
    source
}

fn import_filename(name: &str) -> String {
    if name.ends_with(".purr") {
        name.to_string()
    } else {
        format!("{}.purr", name)
    }
}

/// Inline every `!import` directive. Imports before the main `{ }` block
/// are gathered and injected just inside the opening brace; imports inside
/// the block are replaced in place.
fn process_imports(
    source: &str,
    loader: &mut dyn ImportLoader,
    imported: &mut HashSet<String>,
) -> String {
    let mut load_import = |name: &str, imported: &mut HashSet<String>| -> Option<String> {
        let filename = import_filename(name);
        if !imported.insert(filename.clone()) {
            return None; // cycle or duplicate
        }
        let contents = loader.load(&filename)?;
        let inlined = process_imports(&contents, &mut *loader, imported);
        let expanded = preprocess(&inlined);
        Some(strip_outer_block(&expanded).to_string())
    };

    // Split off imports written before the main block
    let mut early_content = String::new();
    let mut remaining = String::new();
    let mut before_block = true;

    for line in source.lines() {
        let trimmed = line.trim_start();
        if before_block && trimmed.starts_with('{') {
            before_block = false;
        }
        if before_block {
            if let Some(rest) = trimmed.strip_prefix("!import") {
                if let Some(content) = load_import(rest.trim(), imported) {
                    early_content.push_str(&content);
                    early_content.push('\n');
                }
                remaining.push('\n');
                continue;
            }
        }
        remaining.push_str(line);
        remaining.push('\n');
    }

    // Inject early imports just inside the main block's opening brace
    let mut result = if early_content.is_empty() {
        remaining
    } else {
        match remaining.find('{') {
            Some(open) => format!(
                "{}\n{}{}",
                &remaining[..open + 1],
                early_content,
                &remaining[open + 1..]
            ),
            None => remaining,
        }
    };

    // Imports inside the block are replaced in place
    if result.contains("!import") {
        let mut rewritten = String::with_capacity(result.len());
        for line in result.lines() {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix("!import") {
                if let Some(content) = load_import(rest.trim(), imported) {
                    rewritten.push_str(&content);
                }
                rewritten.push('\n');
            } else {
                rewritten.push_str(line);
                rewritten.push('\n');
            }
        }
        result = rewritten;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_loader(files: &[(&str, &str)]) -> impl FnMut(&str) -> Option<String> {
        let files: HashMap<String, String> = files
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| files.get(name).cloned()
    }

    #[test]
    fn test_comments_stripped_outside_strings() {
        let out = preprocess("(meow \"a;b\") ; trailing\n(+ 1 2)\n");
        assert!(out.contains("a;b"));
        assert!(!out.contains("trailing"));
        assert!(out.contains("(+ 1 2)"));
    }

    #[test]
    fn test_define_substitutes_whole_identifiers() {
        let out = preprocess("!define SPEED 42\n(def Int:x SPEED)\n(def Int:SPEEDY 1)\n");
        assert!(out.contains("(def Int:x 42)"));
        // SPEEDY is a different identifier and must survive
        assert!(out.contains("SPEEDY"));
    }

    #[test]
    fn test_define_does_not_touch_strings() {
        let out = preprocess("!define NAME bob\n(meow \"NAME\")\n(meow NAME)\n");
        assert!(out.contains("\"NAME\""));
        assert!(out.contains("(meow bob)"));
    }

    #[test]
    fn test_import_before_block_lands_inside() {
        let mut loader = map_loader(&[("lib.purr", "{ (def Int:shared 1) }")]);
        let out = preprocess_with_imports("!import lib\n{ (meow \"hi\") }\n", &mut loader);

        let shared = out.find("(def Int:shared 1)").unwrap();
        let open = out.find('{').unwrap();
        let main_form = out.find("(meow").unwrap();
        assert!(open < shared && shared < main_form);
    }

    #[test]
    fn test_import_adds_extension() {
        let mut loader = map_loader(&[("util.purr", "{ (def Int:u 1) }")]);
        let out = preprocess_with_imports("!import util\n{ }\n", &mut loader);
        assert!(out.contains("(def Int:u 1)"));
    }

    #[test]
    fn test_import_cycle_is_broken() {
        let mut loader = map_loader(&[
            ("a.purr", "!import b\n{ (def Int:a 1) }"),
            ("b.purr", "!import a\n{ (def Int:b 2) }"),
        ]);
        let out = preprocess_with_imports("!import a\n{ }\n", &mut loader);
        assert!(out.contains("(def Int:a 1)"));
        assert!(out.contains("(def Int:b 2)"));
        // each file inlined exactly once
        assert_eq!(out.matches("(def Int:a 1)").count(), 1);
    }

    #[test]
    fn test_strip_outer_block() {
        assert_eq!(strip_outer_block("{ (+ 1 2) }").trim(), "(+ 1 2)");
        assert_eq!(strip_outer_block("no block"), "no block");
    }
}
