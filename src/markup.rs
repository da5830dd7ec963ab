//! Markdown-flavoured text to HTML.
//!
//! Rendering is two stages. A line-oriented pass turns headings and `- `
//! bullet lists (nested by indentation) into tags, then an ordered list of
//! rules rewrites inline syntax, fenced code, rules and line breaks. Order
//! matters: bold runs before italic, and line breaks are placed before links
//! are expanded. The output is not sanitized.
//!
//! The line pass only sees headings in the first column. Indented headings
//! are left to the substitution rules, which keep the indentation in front
//! of the tag. A `---` line directly after a heading or a list lands on the
//! same output line as the closing tag, so it has its own rule.

use std::borrow::Cow;
use std::sync::{Arc, OnceLock};

use regex::Regex;

/// A regex and its replacement (`${1}`-style group references).
#[derive(Clone, Debug)]
pub struct Substitution {
    pattern: Regex,
    replacement: String,
}

impl Substitution {
    pub fn new(pattern: &str, replacement: impl Into<String>) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    fn apply<'t>(&self, text: &'t str) -> Cow<'t, str> {
        self.pattern.replace_all(text, self.replacement.as_str())
    }
}

#[derive(Clone, Debug)]
pub enum Rule {
    Substitute(Substitution),
    /// Every newline becomes `<br />`, except one that directly follows one
    /// of these closing tags, which is dropped.
    LineBreaks { block_closers: Vec<String> },
}

/// The rule set a [`MarkupTransformer`] renders with. Built once and shared.
#[derive(Clone, Debug)]
pub struct MarkupRules {
    heading_line: Regex,
    list_item: Regex,
    rules: Vec<Rule>,
}

impl MarkupRules {
    pub fn standard() -> Self {
        let sub = |pattern: &str, replacement: &str| {
            Rule::Substitute(Substitution::new(pattern, replacement).unwrap())
        };

        let mut rules: Vec<Rule> = (1..=6)
            .rev()
            .map(|level| {
                sub(
                    &format!(r"(?m)^([ \t]+)#{{{level}}} (.*?)(?:\n|$)"),
                    &format!("${{1}}<h{level}>${{2}}</h{level}>"),
                )
            })
            .collect();
        rules.extend([
            sub(r"\*\*(.*?)\*\*", "<strong>${1}</strong>"),
            sub(r"\*(.*?)\*", "<em>${1}</em>"),
            sub(r"~~(.*?)~~", "<del>${1}</del>"),
            sub(r"(?s)```(.*?)```", "<pre><code>${1}</code></pre>"),
            sub(r"(</h[1-6]><br />|</ul>)---\n", "${1}<hr />\n"),
            sub(r"(?m)\n?\n?^---\n", "\n<hr />\n"),
            Rule::LineBreaks {
                block_closers: ["</li>", "</ul>", "</ol>", "</h1>", "</h2>", "</h3>", "</h4>", "</h5>", "</h6>", "</pre>"]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            },
            sub(
                r"\[([^\]]+)\]\((https?://[^\s)]+|\S+)\)",
                r#"<a href="${2}" target="_blank" rel="noopener noreferrer">${1}</a>"#,
            ),
        ]);

        Self {
            heading_line: Regex::new(r"^(#{1,6})\s+(.*)").unwrap(),
            list_item: Regex::new(r"^(\s*)-\s+(.*)").unwrap(),
            rules,
        }
    }

    /// Appends a rule that runs after the standard ones.
    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

fn shared_rules() -> Arc<MarkupRules> {
    static STANDARD: OnceLock<Arc<MarkupRules>> = OnceLock::new();
    Arc::clone(STANDARD.get_or_init(|| Arc::new(MarkupRules::standard())))
}

#[derive(Clone, Debug)]
pub struct MarkupTransformer {
    rules: Arc<MarkupRules>,
}

impl Default for MarkupTransformer {
    fn default() -> Self {
        Self {
            rules: shared_rules(),
        }
    }
}

impl MarkupTransformer {
    pub fn new(rules: MarkupRules) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    pub fn render(&self, markdown: &str) -> String {
        let mut html = self.block_pass(markdown);
        for rule in &self.rules.rules {
            html = match rule {
                Rule::Substitute(sub) => sub.apply(&html).into_owned(),
                Rule::LineBreaks { block_closers } => break_lines(&html, block_closers),
            };
        }
        html
    }

    fn block_pass(&self, markdown: &str) -> String {
        let mut html = String::new();
        let mut open_lists: Vec<usize> = Vec::new();

        for line in markdown.split('\n') {
            if let Some(cap) = self.rules.heading_line.captures(line) {
                let level = cap[1].len();
                close_lists(&mut html, &mut open_lists, None);
                html.push_str(&format!("<h{level}>{}</h{level}><br />", &cap[2]));
            } else if let Some(cap) = self.rules.list_item.captures(line) {
                let indent = cap[1].chars().count();
                close_lists(&mut html, &mut open_lists, Some(indent));
                if open_lists.last().map_or(true, |&top| top < indent) {
                    html.push_str("<ul>");
                    open_lists.push(indent);
                }
                html.push_str(&format!("<li>{}</li>", &cap[2]));
            } else {
                close_lists(&mut html, &mut open_lists, None);
                html.push_str(line);
                html.push('\n');
            }
        }
        close_lists(&mut html, &mut open_lists, None);
        html
    }
}

// Pops open lists indented deeper than `keep`; `None` closes them all.
fn close_lists(html: &mut String, open_lists: &mut Vec<usize>, keep: Option<usize>) {
    while let Some(&top) = open_lists.last() {
        if keep.is_some_and(|indent| top <= indent) {
            break;
        }
        html.push_str("</ul>");
        open_lists.pop();
    }
}

fn break_lines(text: &str, block_closers: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, segment) in text.split('\n').enumerate() {
        if i > 0 && !block_closers.iter().any(|closer| out.ends_with(closer.as_str())) {
            out.push_str("<br />");
        }
        out.push_str(segment);
    }
    out
}

/// Renders with the standard rules.
pub fn render(markdown: &str) -> String {
    MarkupTransformer::default().render(markdown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_a_single_break() {
        assert_eq!(render(""), "<br />");
    }

    #[test]
    fn headings() {
        assert_eq!(render("# Title"), "<h1>Title</h1><br />");
        assert_eq!(render("## Header 2"), "<h2>Header 2</h2><br />");
        assert_eq!(render("###### Header 6"), "<h6>Header 6</h6><br />");
        assert_eq!(render("# Header 1\n"), "<h1>Header 1</h1><br /><br />");
    }

    #[test]
    fn seven_hashes_is_not_a_heading() {
        assert_eq!(render("####### x"), "####### x<br />");
    }

    #[test]
    fn bold_is_resolved_before_italic() {
        assert_eq!(
            render("**bold** and *italic*"),
            "<strong>bold</strong> and <em>italic</em><br />"
        );
        assert_eq!(render("**bold**"), "<strong>bold</strong><br />");
        assert_eq!(render("*italic*"), "<em>italic</em><br />");
    }

    #[test]
    fn strikethrough() {
        assert_eq!(render("~~gone~~"), "<del>gone</del><br />");
    }

    #[test]
    fn flat_list_has_no_breaks_between_items() {
        assert_eq!(render("- a\n- b"), "<ul><li>a</li><li>b</li></ul>");
    }

    #[test]
    fn nested_lists_open_and_close_by_indent() {
        assert_eq!(
            render("- a\n  - b\n    - c\n- d"),
            "<ul><li>a</li><ul><li>b</li><ul><li>c</li></ul></ul><li>d</li></ul>"
        );
    }

    #[test]
    fn heading_and_text_close_open_lists() {
        assert_eq!(render("- a\n# T"), "<ul><li>a</li></ul><h1>T</h1><br />");
        assert_eq!(render("- a\nafter"), "<ul><li>a</li></ul>after<br />");
        assert_eq!(
            render("intro\n- a"),
            "intro<br /><ul><li>a</li></ul>"
        );
    }

    #[test]
    fn fenced_code_gets_no_trailing_break() {
        assert_eq!(render("```x```"), "<pre><code>x</code></pre>");
        assert_eq!(
            render("```x```\ntext"),
            "<pre><code>x</code></pre>text<br />"
        );
    }

    #[test]
    fn line_breaks() {
        assert_eq!(render("line 1\nline 2"), "line 1<br />line 2<br />");
    }

    #[test]
    fn horizontal_rule() {
        assert_eq!(render("a\n---"), "a<br /><hr /><br />");
        assert_eq!(render("a\n\n---\nb"), "a<br /><hr /><br />b<br />");
    }

    #[test]
    fn horizontal_rule_after_block_elements() {
        assert_eq!(render("# T\n---"), "<h1>T</h1><br /><hr /><br />");
        assert_eq!(render("- a\n---\nb"), "<ul><li>a</li></ul><hr /><br />b<br />");
        assert_eq!(
            render("- a\n  - b\n---"),
            "<ul><li>a</li><ul><li>b</li></ul></ul><hr /><br />"
        );
        assert_eq!(render("```x```\n---"), "<pre><code>x</code></pre><hr /><br />");
        assert_eq!(render("# T\n\n---"), "<h1>T</h1><br /><br /><hr /><br />");
    }

    #[test]
    fn inline_markdown_inside_headings() {
        assert_eq!(render("# **T**"), "<h1><strong>T</strong></h1><br />");
        assert_eq!(render("## a *b* ~~c~~"), "<h2>a <em>b</em> <del>c</del></h2><br />");
    }

    #[test]
    fn indented_headings_go_through_the_substitution_rules() {
        assert_eq!(render("  # T\nx"), "  <h1>T</h1>x<br />");
        assert_eq!(render("\t### Deep"), "\t<h3>Deep</h3>");
        assert_eq!(render("  #x"), "  #x<br />");
    }

    #[test]
    fn dashes_inside_a_line_stay_literal() {
        assert_eq!(render("a---b"), "a---b<br />");
    }

    #[test]
    fn links_with_urls_and_bare_targets() {
        assert_eq!(
            render("[alt text](https://example.com)"),
            "<a href=\"https://example.com\" target=\"_blank\" rel=\"noopener noreferrer\">alt text</a><br />"
        );
        assert_eq!(
            render("see [docs](guide.html)"),
            "see <a href=\"guide.html\" target=\"_blank\" rel=\"noopener noreferrer\">docs</a><br />"
        );
    }

    #[test]
    fn unmatched_syntax_passes_through() {
        assert_eq!(render("[not a link]"), "[not a link]<br />");
        assert_eq!(render("~~open"), "~~open<br />");
    }

    #[test]
    fn rendering_is_pure() {
        let input = "# T\n- a\n  - b\n**x** *y* ~~z~~\n```c```\n[l](u)";
        assert_eq!(render(input), render(input));
        let transformer = MarkupTransformer::default();
        assert_eq!(transformer.render(input), transformer.render(input));
    }

    #[test]
    fn custom_rule_sets_are_independent() {
        let highlight = Substitution::new(r"==(.*?)==", "<mark>${1}</mark>").unwrap();
        let custom = MarkupTransformer::new(MarkupRules::standard().with_rule(Rule::Substitute(highlight)));
        assert_eq!(custom.render("==hi=="), "<mark>hi</mark><br />");
        assert_eq!(render("==hi=="), "==hi==<br />");
    }
}
