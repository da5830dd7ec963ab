//! Highlighting and quick sanity checks for code cells.
//!
//! Not a parser: tokens are found with one combined regex per language and
//! the checks are line heuristics (missing colons, semicolons, unbalanced
//! brackets). Good enough to flag typos in a note.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Language {
    #[default]
    Python,
    JavaScript,
    C,
    Cpp,
    Java,
    Html,
    Css,
}

impl Language {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Some(Language::Python),
            "javascript" | "js" => Some(Language::JavaScript),
            "c" => Some(Language::C),
            "cpp" | "c++" => Some(Language::Cpp),
            "java" => Some(Language::Java),
            "html" => Some(Language::Html),
            "css" => Some(Language::Css),
            _ => None,
        }
    }

    fn is_c_family(self) -> bool {
        matches!(
            self,
            Language::JavaScript | Language::C | Language::Cpp | Language::Java
        )
    }

    fn comment_pattern(self) -> &'static str {
        match self {
            Language::Python => r"#.*",
            Language::JavaScript | Language::C | Language::Cpp | Language::Java => r"//.*|/\*.*?\*/",
            Language::Html => r"&lt;!--.*?--&gt;",
            Language::Css => r"/\*.*?\*/",
        }
    }

    // Comments as they appear in unescaped source, across lines.
    fn source_comment_pattern(self) -> &'static str {
        match self {
            Language::Python => r"#.*",
            Language::JavaScript | Language::C | Language::Cpp | Language::Java => r"(?s)//[^\n]*|/\*.*?\*/",
            Language::Html => r"(?s)<!--.*?-->",
            Language::Css => r"(?s)/\*.*?\*/",
        }
    }
}

struct TokenRules {
    keywords: &'static [&'static str],
    builtins: &'static [&'static str],
    regex: Regex,
}

const PYTHON_KEYWORDS: &[&str] = &[
    "and", "as", "assert", "break", "class", "continue", "def", "del", "elif", "else", "except",
    "False", "finally", "for", "from", "global", "if", "import", "in", "is", "lambda", "None",
    "nonlocal", "not", "or", "pass", "raise", "return", "True", "try", "while", "with", "yield",
];

const PYTHON_BUILTINS: &[&str] = &[
    "print", "len", "range", "type", "int", "str", "float", "list", "dict", "set", "tuple", "sum",
    "min", "max", "abs", "round", "input",
];

const C_FAMILY_KEYWORDS: &[&str] = &[
    "break", "case", "catch", "char", "class", "const", "continue", "default", "do", "double",
    "else", "enum", "extends", "false", "final", "float", "for", "function", "if", "import",
    "int", "let", "long", "new", "null", "private", "protected", "public", "return", "short",
    "static", "struct", "switch", "this", "throw", "true", "try", "typedef", "var", "void",
    "while",
];

const C_FAMILY_BUILTINS: &[&str] = &[
    "console", "printf", "scanf", "malloc", "free", "std", "cout", "cin", "System", "String",
    "Math", "JSON", "document", "window",
];

fn token_regex(language: Language) -> Regex {
    Regex::new(&format!(
        r#"(?P<comment>{})|(?P<string>"(?:\\.|[^"\\\n])*"|'(?:\\.|[^'\\\n])*')|(?P<number>\b(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?\b)|(?P<ident>\b[A-Za-z_]\w*)|(?P<operator>\*\*=?|==|!=|&lt;=?|&gt;=?|[-+*/%]=?|=)"#,
        language.comment_pattern()
    ))
    .unwrap()
}

fn token_rules(language: Language) -> Option<&'static TokenRules> {
    static PYTHON: OnceLock<TokenRules> = OnceLock::new();
    static C_FAMILY: OnceLock<TokenRules> = OnceLock::new();

    if language == Language::Python {
        return Some(PYTHON.get_or_init(|| TokenRules {
            keywords: PYTHON_KEYWORDS,
            builtins: PYTHON_BUILTINS,
            regex: token_regex(Language::Python),
        }));
    }
    if language.is_c_family() {
        return Some(C_FAMILY.get_or_init(|| TokenRules {
            keywords: C_FAMILY_KEYWORDS,
            builtins: C_FAMILY_BUILTINS,
            regex: token_regex(Language::JavaScript),
        }));
    }
    None
}

fn escape_html(code: &str) -> String {
    code.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn token(kind: &str, text: &str) -> String {
    format!("<span class=\"token {kind}\">{text}</span>")
}

/// Escapes `code` and wraps recognised tokens in `<span class="token KIND">`.
pub fn highlight(code: &str, language: Language) -> String {
    let escaped = escape_html(code);
    let Some(rules) = token_rules(language) else {
        return escaped;
    };

    rules
        .regex
        .replace_all(&escaped, |cap: &Captures| {
            let whole = &cap[0];
            if cap.name("comment").is_some() {
                return token("comment", whole);
            }
            if cap.name("string").is_some() {
                return token("string", whole);
            }
            if cap.name("number").is_some() {
                return token("number", whole);
            }
            if let Some(ident) = cap.name("ident") {
                let word = ident.as_str();
                if rules.keywords.contains(&word) {
                    return token("keyword", word);
                }
                if rules.builtins.contains(&word) {
                    return token("builtin", word);
                }
                if escaped[ident.end()..].trim_start().starts_with('(') {
                    return token("function", word);
                }
                return word.to_string();
            }
            token("operator", whole)
        })
        .into_owned()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub message: String,
    /// 1-based; 0 when the issue concerns the snippet as a whole.
    pub line: usize,
    pub column: usize,
}

impl SyntaxIssue {
    fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

pub fn check_syntax(code: &str, language: Language) -> Vec<SyntaxIssue> {
    let mut issues = match language {
        Language::Python => check_python(code),
        Language::Html => check_html(code),
        Language::Css => check_css(code),
        _ => check_c_style(code),
    };
    issues.extend(check_brackets(code, language));
    issues
}

const COLON_KEYWORDS: &[&str] = &["def", "class", "if", "else", "elif", "for", "while"];

fn starts_with_word(line: &str, word: &str) -> bool {
    line.strip_prefix(word)
        .is_some_and(|rest| !rest.starts_with(|c: char| c.is_alphanumeric() || c == '_'))
}

fn check_python(code: &str) -> Vec<SyntaxIssue> {
    let mut issues = Vec::new();
    for (index, line) in code.split('\n').enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let indent = line.chars().count() - line.trim_start().chars().count();
        if indent % 4 != 0 {
            issues.push(SyntaxIssue::new(
                "Inconsistent indentation (should be multiples of 4 spaces)",
                index + 1,
                0,
            ));
        }
        let needs_colon = COLON_KEYWORDS.iter().any(|kw| starts_with_word(trimmed, kw));
        if needs_colon && !trimmed.ends_with(':') {
            issues.push(SyntaxIssue::new(
                "Missing colon after control structure or definition",
                index + 1,
                line.len(),
            ));
        }
    }
    issues
}

fn check_c_style(code: &str) -> Vec<SyntaxIssue> {
    code.split('\n')
        .enumerate()
        .filter_map(|(index, line)| {
            let trimmed = line.trim();
            let terminated = trimmed.is_empty()
                || [";", "{", "}"].iter().any(|end| trimmed.ends_with(end))
                || ["//", "/*", "*"].iter().any(|start| trimmed.starts_with(start));
            (!terminated).then(|| SyntaxIssue::new("Missing semicolon", index + 1, line.len()))
        })
        .collect()
}

const VOID_TAGS: &[&str] = &["br", "img", "input", "hr", "meta", "link"];

fn check_html(code: &str) -> Vec<SyntaxIssue> {
    static TAG: OnceLock<Regex> = OnceLock::new();
    let tag_re = TAG.get_or_init(|| Regex::new(r"<(/?)([A-Za-z][\w-]*)[^<>]*?(/?)>").unwrap());

    let mut issues = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let lines: Vec<&str> = code.split('\n').collect();

    for (index, line) in lines.iter().enumerate() {
        for cap in tag_re.captures_iter(line) {
            let name = cap[2].to_ascii_lowercase();
            let closing = !cap[1].is_empty();
            let self_closing = !cap[3].is_empty();
            if self_closing || VOID_TAGS.contains(&name.as_str()) {
                continue;
            }
            if !closing {
                open.push(name);
            } else if open.last() == Some(&name) {
                open.pop();
            } else {
                let column = cap.get(0).map_or(0, |m| m.start());
                issues.push(SyntaxIssue::new(
                    format!("Unexpected or mismatched closing tag: {name}"),
                    index + 1,
                    column,
                ));
            }
        }
    }

    if !open.is_empty() {
        issues.push(SyntaxIssue::new(
            format!("Unclosed HTML tags: {}", open.join(", ")),
            lines.len(),
            lines.last().map_or(0, |line| line.len()),
        ));
    }
    issues
}

fn check_css(code: &str) -> Vec<SyntaxIssue> {
    let mut issues = Vec::new();
    let mut in_block = false;

    for (index, line) in code.split('\n').enumerate() {
        let trimmed = line.trim();
        if let Some(column) = line.find('{') {
            if in_block {
                issues.push(SyntaxIssue::new("Unexpected opening brace", index + 1, column));
            }
            in_block = true;
        }
        if let Some(column) = line.find('}') {
            if !in_block {
                issues.push(SyntaxIssue::new("Unexpected closing brace", index + 1, column));
            }
            in_block = false;
        }
        if in_block
            && trimmed.contains(':')
            && ![";", "{", "}"].iter().any(|end| trimmed.ends_with(end))
        {
            issues.push(SyntaxIssue::new(
                "Missing semicolon in CSS property",
                index + 1,
                line.len(),
            ));
        }
    }
    issues
}

fn comment_regex(language: Language) -> &'static Regex {
    static HASH: OnceLock<Regex> = OnceLock::new();
    static SLASH: OnceLock<Regex> = OnceLock::new();
    static MARKUP: OnceLock<Regex> = OnceLock::new();
    static BLOCK: OnceLock<Regex> = OnceLock::new();
    let cell = match language {
        Language::Python => &HASH,
        Language::JavaScript | Language::C | Language::Cpp | Language::Java => &SLASH,
        Language::Html => &MARKUP,
        Language::Css => &BLOCK,
    };
    cell.get_or_init(|| Regex::new(language.source_comment_pattern()).unwrap())
}

fn check_brackets(code: &str, language: Language) -> Vec<SyntaxIssue> {
    let clean = comment_regex(language).replace_all(code, "");

    let mut issues = Vec::new();
    let mut depth: BTreeMap<char, usize> = [('(', 0), ('[', 0), ('{', 0)].into_iter().collect();
    for c in clean.chars() {
        let open = match c {
            '(' | '[' | '{' => {
                *depth.entry(c).or_default() += 1;
                continue;
            }
            ')' => '(',
            ']' => '[',
            '}' => '{',
            _ => continue,
        };
        match depth.get_mut(&open) {
            Some(count) if *count > 0 => *count -= 1,
            _ => issues.push(SyntaxIssue::new(format!("Unbalanced {c} bracket"), 0, 0)),
        }
    }
    for (bracket, count) in depth {
        if count > 0 {
            issues.push(SyntaxIssue::new(format!("Unclosed {bracket} bracket"), 0, 0));
        }
    }
    issues
}

/// Highlighted code with every line that has an issue wrapped in an
/// `error` span carrying the messages as a tooltip.
pub fn render_code_cell(code: &str, language: Language) -> String {
    let mut messages: BTreeMap<usize, Vec<String>> = BTreeMap::new();
    for issue in check_syntax(code, language) {
        if issue.line > 0 {
            messages.entry(issue.line).or_default().push(issue.message);
        }
    }

    let highlighted = highlight(code, language);
    highlighted
        .split('\n')
        .enumerate()
        .map(|(index, line)| match messages.get(&(index + 1)) {
            Some(msgs) => {
                let body = line.trim_start();
                let indent = &line[..line.len() - body.len()];
                format!(
                    "{indent}<span class=\"error\" data-tooltip=\"{}\">{body}</span>",
                    msgs.join("; ")
                )
            }
            None => line.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
