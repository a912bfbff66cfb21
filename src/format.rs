//! Code formatter for the active buffer.
//!
//! Re-indents source by nesting depth. CSS and JS are tracked through their
//! brackets, HTML through its element tree. Input that does not nest cleanly
//! is rejected so the caller can leave the buffer untouched.

use crate::buffer::SourceKind;
use thiserror::Error;

/// Maximum nesting depth accepted by the formatter
pub const MAX_DEPTH: usize = 64;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is kept exactly as written.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "pre", "textarea"];

/// Elements whose end tag may be omitted.
const OPTIONAL_END_TAG: &[&str] = &[
    "p", "li", "dt", "dd", "option", "optgroup", "tr", "td", "th", "thead", "tbody", "tfoot",
    "colgroup", "rt", "rp",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("line {line}: unexpected '{found}'")]
    UnexpectedClose { line: usize, found: char },
    #[error("line {line}: '{found}' does not close '{open}'")]
    MismatchedClose { line: usize, open: char, found: char },
    #[error("'{open}' opened on line {line} is never closed")]
    Unclosed { line: usize, open: char },
    #[error("unterminated {what} starting on line {line}")]
    Unterminated { what: &'static str, line: usize },
    #[error("line {line}: </{found}> does not close <{open}>")]
    MismatchedTag {
        line: usize,
        open: String,
        found: String,
    },
    #[error("line {line}: unexpected </{found}>")]
    UnexpectedTag { line: usize, found: String },
    #[error("<{tag}> opened on line {line} is never closed")]
    UnclosedTag { line: usize, tag: String },
    #[error("line {line}: nesting deeper than 64 levels")]
    TooDeep { line: usize },
}

/// Re-indent `text` using `tab_width` spaces per level.
pub fn format_source(kind: SourceKind, text: &str, tab_width: u8) -> Result<String, FormatError> {
    let lines = match kind {
        SourceKind::Html => reindent_markup(text)?,
        SourceKind::Css => reindent_brackets(text, Syntax::Css)?,
        SourceKind::Js => reindent_brackets(text, Syntax::Js)?,
    };
    Ok(assemble(&lines, tab_width as usize))
}

enum Line {
    Indented { depth: usize, text: String },
    Verbatim(String),
    Blank,
}

/// Join lines, collapsing runs of blank lines and dropping leading/trailing ones.
fn assemble(lines: &[Line], tab_width: usize) -> String {
    let mut out = String::new();
    let mut pending_blank = false;

    for line in lines {
        let rendered = match line {
            Line::Blank => {
                pending_blank = !out.is_empty();
                continue;
            }
            Line::Verbatim(text) => text.clone(),
            Line::Indented { depth, text } => {
                format!("{}{}", " ".repeat(depth * tab_width), text.trim_end())
            }
        };
        if pending_blank {
            out.push('\n');
            pending_blank = false;
        }
        out.push_str(&rendered);
        out.push('\n');
    }

    out
}

// ============================================================================
// CSS / JS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Syntax {
    Css,
    Js,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    BlockComment,
    Template,
    Str(char),
}

/// What the last significant JS token was, for telling `/` apart from a regex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Operand,
    Operator,
    Keyword,
}

/// Keywords after which an expression, and so a regex literal, may start.
const REGEX_PREFIX_KEYWORDS: [&str; 14] = [
    "await", "case", "delete", "do", "else", "in", "instanceof", "new", "of", "return",
    "throw", "typeof", "void", "yield",
];

struct BracketScanner {
    syntax: Syntax,
    mode: Mode,
    mode_line: usize,
    stack: Vec<(char, usize)>,
    prev: Token,
}

fn reindent_brackets(text: &str, syntax: Syntax) -> Result<Vec<Line>, FormatError> {
    let mut scanner = BracketScanner {
        syntax,
        mode: Mode::Code,
        mode_line: 0,
        stack: Vec::new(),
        prev: Token::Operator,
    };
    let mut lines = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let starts_in = scanner.mode;

        if matches!(starts_in, Mode::Template | Mode::Str(_)) {
            scanner.scan_line(raw, line_no)?;
            lines.push(Line::Verbatim(raw.to_string()));
            continue;
        }

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            lines.push(Line::Blank);
            continue;
        }

        let depth_before = scanner.stack.len();
        let leading_closers = if starts_in == Mode::Code {
            trimmed
                .chars()
                .take_while(|&c| matches!(c, '}' | ')' | ']'))
                .count()
        } else {
            0
        };
        scanner.scan_line(trimmed, line_no)?;

        let text = if starts_in == Mode::BlockComment && trimmed.starts_with('*') {
            format!(" {}", trimmed)
        } else {
            trimmed.to_string()
        };
        lines.push(Line::Indented {
            depth: depth_before.saturating_sub(leading_closers),
            text,
        });
    }

    scanner.finish()?;
    Ok(lines)
}

impl BracketScanner {
    fn scan_line(&mut self, line: &str, line_no: usize) -> Result<(), FormatError> {
        let chars: Vec<char> = line.chars().collect();
        let js = self.syntax == Syntax::Js;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            match self.mode {
                Mode::BlockComment => {
                    if c == '*' && next == Some('/') {
                        self.mode = Mode::Code;
                        i += 2;
                        continue;
                    }
                }
                Mode::Str(_) | Mode::Template if c == '\\' => {
                    i += 2;
                    continue;
                }
                Mode::Str(quote) => {
                    if c == quote {
                        self.mode = Mode::Code;
                        self.prev = Token::Operand;
                    }
                }
                Mode::Template => {
                    if c == '`' {
                        self.mode = Mode::Code;
                        self.prev = Token::Operand;
                    }
                }
                Mode::Code => {
                    match c {
                        '/' if next == Some('*') => {
                            self.mode = Mode::BlockComment;
                            self.mode_line = line_no;
                            i += 2;
                            continue;
                        }
                        // Line comment: nothing after it counts
                        '/' if js && next == Some('/') => break,
                        '/' if js && self.regex_allowed() => {
                            i = skip_regex(&chars, i, line_no)?;
                            self.prev = Token::Operand;
                            continue;
                        }
                        c if is_word_char(c) => {
                            let end = chars[i..]
                                .iter()
                                .position(|&w| !is_word_char(w))
                                .map_or(chars.len(), |n| i + n);
                            let word: String = chars[i..end].iter().collect();
                            let member = i > 0 && chars[i - 1] == '.';
                            self.prev = if !member && REGEX_PREFIX_KEYWORDS.contains(&word.as_str()) {
                                Token::Keyword
                            } else {
                                Token::Operand
                            };
                            i = end;
                            continue;
                        }
                        '+' | '-' if next == Some(c) => {
                            // Postfix `i++` still ends an operand
                            if self.prev != Token::Operand {
                                self.prev = Token::Operator;
                            }
                            i += 2;
                            continue;
                        }
                        '"' | '\'' => {
                            self.mode = Mode::Str(c);
                            self.mode_line = line_no;
                        }
                        '`' if js => {
                            self.mode = Mode::Template;
                            self.mode_line = line_no;
                        }
                        '{' | '(' | '[' => {
                            self.stack.push((c, line_no));
                            if self.stack.len() > MAX_DEPTH {
                                return Err(FormatError::TooDeep { line: line_no });
                            }
                        }
                        '}' | ')' | ']' => {
                            let expected = match c {
                                '}' => '{',
                                ')' => '(',
                                _ => '[',
                            };
                            match self.stack.pop() {
                                Some((open, _)) if open == expected => {}
                                Some((open, _)) => {
                                    return Err(FormatError::MismatchedClose {
                                        line: line_no,
                                        open,
                                        found: c,
                                    })
                                }
                                None => {
                                    return Err(FormatError::UnexpectedClose {
                                        line: line_no,
                                        found: c,
                                    })
                                }
                            }
                        }
                        _ => {}
                    }
                    match c {
                        ')' | ']' | '.' | '"' | '\'' | '`' => self.prev = Token::Operand,
                        c if c.is_whitespace() => {}
                        _ => self.prev = Token::Operator,
                    }
                }
            }
            i += 1;
        }

        // Only a trailing backslash lets a quoted string continue on the next line
        if let Mode::Str(_) = self.mode {
            if !line.ends_with('\\') {
                return Err(FormatError::Unterminated {
                    what: "string",
                    line: self.mode_line,
                });
            }
        }
        Ok(())
    }

    /// A `/` starts a regex literal unless it follows an operand.
    fn regex_allowed(&self) -> bool {
        matches!(self.prev, Token::Operator | Token::Keyword)
    }

    fn finish(self) -> Result<(), FormatError> {
        let what = match self.mode {
            Mode::Code => None,
            Mode::BlockComment => Some("comment"),
            Mode::Template => Some("template literal"),
            Mode::Str(_) => Some("string"),
        };
        if let Some(what) = what {
            return Err(FormatError::Unterminated {
                what,
                line: self.mode_line,
            });
        }
        match self.stack.last() {
            Some(&(open, line)) => Err(FormatError::Unclosed { line, open }),
            None => Ok(()),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Skip a regex literal starting at `start`; returns the index after its closing `/`.
fn skip_regex(chars: &[char], start: usize, line_no: usize) -> Result<usize, FormatError> {
    let mut i = start + 1;
    let mut in_class = false;
    while let Some(&c) = chars.get(i) {
        match c {
            '\\' => i += 1,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => return Ok(i + 1),
            _ => {}
        }
        i += 1;
    }
    Err(FormatError::Unterminated {
        what: "regular expression",
        line: line_no,
    })
}

// ============================================================================
// HTML
// ============================================================================

enum MarkupMode {
    Content,
    Comment { line: usize },
    Declaration,
    Tag(PendingTag),
    Raw { name: String, line: usize },
}

struct PendingTag {
    name: String,
    closing: bool,
    quote: Option<char>,
    last: Option<char>,
}

struct MarkupScanner {
    mode: MarkupMode,
    stack: Vec<(String, usize)>,
}

fn reindent_markup(text: &str) -> Result<Vec<Line>, FormatError> {
    let mut scanner = MarkupScanner {
        mode: MarkupMode::Content,
        stack: Vec::new(),
    };
    let mut lines = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw.trim();

        if let MarkupMode::Raw { name, .. } = &scanner.mode {
            let closes_here = trimmed
                .to_ascii_lowercase()
                .starts_with(&format!("</{}", name));
            if !closes_here {
                scanner.scan_line(raw, line_no)?;
                lines.push(Line::Verbatim(raw.to_string()));
                continue;
            }
        }

        if trimmed.is_empty() {
            lines.push(Line::Blank);
            continue;
        }

        let starts_in_tag = matches!(scanner.mode, MarkupMode::Tag(_));
        let depth_before = scanner.stack.len();
        let leading_depth = scanner.scan_line(trimmed, line_no)?;
        let depth = if starts_in_tag {
            // Continuation of a multi-line opening tag
            depth_before + 1
        } else {
            leading_depth
        };
        lines.push(Line::Indented {
            depth,
            text: trimmed.to_string(),
        });
    }

    scanner.finish()?;
    Ok(lines)
}

fn read_name(chars: &[char], start: usize) -> (String, usize) {
    let mut end = start;
    while chars
        .get(end)
        .is_some_and(|&c| c.is_ascii_alphanumeric() || matches!(c, '-' | ':' | '_'))
    {
        end += 1;
    }
    let name: String = chars[start..end].iter().collect();
    (name.to_ascii_lowercase(), end)
}

impl MarkupScanner {
    /// Scan one line. Returns the depth after any closing tags that open the line.
    fn scan_line(&mut self, line: &str, line_no: usize) -> Result<usize, FormatError> {
        let chars: Vec<char> = line.chars().collect();
        let mut leading = true;
        let mut leading_depth = self.stack.len();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            match &mut self.mode {
                MarkupMode::Content => {
                    if c == '<' {
                        let next = chars.get(i + 1).copied();
                        let after = chars.get(i + 2).copied();
                        if next == Some('!') && after == Some('-') && chars.get(i + 3) == Some(&'-')
                        {
                            self.mode = MarkupMode::Comment { line: line_no };
                            leading = false;
                            i += 4;
                            continue;
                        }
                        if matches!(next, Some('!' | '?')) {
                            self.mode = MarkupMode::Declaration;
                            leading = false;
                            i += 2;
                            continue;
                        }
                        if next == Some('/') && after.is_some_and(|a| a.is_ascii_alphabetic()) {
                            let (name, end) = read_name(&chars, i + 2);
                            self.mode = MarkupMode::Tag(PendingTag {
                                name,
                                closing: true,
                                quote: None,
                                last: None,
                            });
                            i = end;
                            continue;
                        }
                        if next.is_some_and(|n| n.is_ascii_alphabetic()) {
                            let (name, end) = read_name(&chars, i + 1);
                            self.mode = MarkupMode::Tag(PendingTag {
                                name,
                                closing: false,
                                quote: None,
                                last: None,
                            });
                            leading = false;
                            i = end;
                            continue;
                        }
                    }
                    if !c.is_whitespace() {
                        leading = false;
                    }
                }
                MarkupMode::Comment { .. } => {
                    if c == '-' && chars.get(i + 1) == Some(&'-') && chars.get(i + 2) == Some(&'>')
                    {
                        self.mode = MarkupMode::Content;
                        i += 3;
                        continue;
                    }
                }
                MarkupMode::Declaration => {
                    if c == '>' {
                        self.mode = MarkupMode::Content;
                    }
                }
                MarkupMode::Tag(tag) => {
                    if let Some(quote) = tag.quote {
                        if c == quote {
                            tag.quote = None;
                        }
                    } else if c == '"' || c == '\'' {
                        tag.quote = Some(c);
                    } else if c == '>' {
                        let self_closing = tag.last == Some('/');
                        let name = std::mem::take(&mut tag.name);
                        let closing = tag.closing;
                        self.mode = MarkupMode::Content;
                        if closing {
                            self.close(name, line_no)?;
                            if leading {
                                leading_depth = self.stack.len();
                            }
                        } else {
                            self.open(name, self_closing, line_no)?;
                        }
                        i += 1;
                        continue;
                    }
                    if !c.is_whitespace() {
                        tag.last = Some(c);
                    }
                }
                MarkupMode::Raw { name, .. } => {
                    if c == '<' && chars.get(i + 1) == Some(&'/') {
                        let (candidate, end) = read_name(&chars, i + 2);
                        if candidate == *name {
                            self.mode = MarkupMode::Tag(PendingTag {
                                name: candidate,
                                closing: true,
                                quote: None,
                                last: None,
                            });
                            i = end;
                            continue;
                        }
                    }
                }
            }
            i += 1;
        }

        Ok(leading_depth)
    }

    fn open(&mut self, name: String, self_closing: bool, line_no: usize) -> Result<(), FormatError> {
        if self_closing || VOID_ELEMENTS.contains(&name.as_str()) {
            return Ok(());
        }
        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            self.mode = MarkupMode::Raw {
                name: name.clone(),
                line: line_no,
            };
        }
        self.stack.push((name, line_no));
        if self.stack.len() > MAX_DEPTH {
            return Err(FormatError::TooDeep { line: line_no });
        }
        Ok(())
    }

    fn close(&mut self, name: String, line_no: usize) -> Result<(), FormatError> {
        let Some(pos) = self.stack.iter().rposition(|(open, _)| *open == name) else {
            return Err(FormatError::UnexpectedTag {
                line: line_no,
                found: name,
            });
        };
        // Anything still open above the match must allow an implied end tag
        if let Some((open, _)) = self.stack[pos + 1..]
            .iter()
            .find(|(open, _)| !OPTIONAL_END_TAG.contains(&open.as_str()))
        {
            return Err(FormatError::MismatchedTag {
                line: line_no,
                open: open.clone(),
                found: name,
            });
        }
        self.stack.truncate(pos);
        Ok(())
    }

    fn finish(self) -> Result<(), FormatError> {
        match self.mode {
            MarkupMode::Content => {}
            MarkupMode::Comment { line } => {
                return Err(FormatError::Unterminated {
                    what: "comment",
                    line,
                })
            }
            MarkupMode::Declaration | MarkupMode::Tag(_) => {
                return Err(FormatError::Unterminated {
                    what: "tag",
                    line: self.stack.last().map_or(1, |(_, l)| *l),
                })
            }
            MarkupMode::Raw { name, line } => {
                return Err(FormatError::UnclosedTag { line, tag: name })
            }
        }
        match self
            .stack
            .into_iter()
            .find(|(open, _)| !OPTIONAL_END_TAG.contains(&open.as_str()))
        {
            Some((tag, line)) => Err(FormatError::UnclosedTag { line, tag }),
            None => Ok(()),
        }
    }
}
