//! Best-effort repair of near-valid JSON emitted by language models.
//!
//! ## What goes wrong
//!
//! Even when told to "respond strictly in valid JSON", models regularly:
//!
//! - wrap the object in prose ("Here is the extracted data: { ... } Hope
//!   this helps!")
//! - leave a trailing comma before `}` or `]`
//! - stop mid-object when they hit the token limit
//! - use single quotes, bare keys, Python literals (`None`, `True`) or
//!   `//` comments
//! - forget the comma between two members written on separate lines
//! - emit an HS code with a leading zero (`0303.79`) as a bare number
//!
//! ## How
//!
//! A single left-to-right pass over the text with a bracket stack. Each frame
//! tracks what it expects next (key, colon, value, comma-or-close), so the
//! pass can insert a missing `,` or `:`, drop a stray one, and on truncation
//! fill a dangling member with `null` and close every open bracket in order.
//! Valid JSON passes through unchanged. The output is *not* guaranteed to be
//! valid; the caller still parses it and reports failure.

/// Repair `input` as far as the rules allow.
///
/// Text before the first `{` or `[` is dropped, as is anything after the
/// matching close of that first bracket. Input without any bracket is
/// returned trimmed so scalar JSON still parses and prose still fails.
pub fn repair_json(input: &str) -> String {
    let Some(start) = input.find(['{', '[']) else {
        return input.trim().to_string();
    };
    let chars: Vec<char> = input[start..].chars().collect();
    let mut repairer = Repairer::with_capacity(input.len());
    repairer.run(&chars);
    repairer.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Key,
    Colon,
    Value,
    CommaOrClose,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    kind: Kind,
    expect: Expect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Key,
    Value,
}

struct Repairer {
    out: String,
    stack: Vec<Frame>,
    done: bool,
}

impl Repairer {
    fn with_capacity(n: usize) -> Self {
        Self {
            out: String::with_capacity(n + 16),
            stack: Vec::new(),
            done: false,
        }
    }

    fn run(&mut self, chars: &[char]) {
        let mut i = 0;
        while i < chars.len() && !self.done {
            let c = chars[i];
            let next = chars.get(i + 1).copied();
            i = match c {
                c if c.is_whitespace() => {
                    self.out.push(c);
                    i + 1
                }
                '/' if next == Some('/') => skip_line_comment(chars, i),
                '/' if next == Some('*') => skip_block_comment(chars, i),
                '{' | '[' => {
                    self.open(c);
                    i + 1
                }
                '}' | ']' => {
                    self.close(c);
                    i + 1
                }
                ',' => {
                    self.comma();
                    i + 1
                }
                ':' => {
                    self.colon();
                    i + 1
                }
                '"' | '\'' | '\u{201C}' | '\u{201D}' | '\u{2018}' | '\u{2019}' => self.string(chars, i),
                '-' | '+' | '.' | '0'..='9' => self.number(chars, i),
                _ => self.word(chars, i),
            };
        }
    }

    fn finish(mut self) -> String {
        while !self.stack.is_empty() {
            self.close_top();
        }
        self.out.trim_end().to_string()
    }

    // ── State transitions ────────────────────────────────────────────────

    /// What the next token will be, without changing state.
    fn next_role(&self) -> Role {
        match self.stack.last() {
            Some(Frame {
                kind: Kind::Object,
                expect: Expect::Key | Expect::CommaOrClose,
            }) => Role::Key,
            _ => Role::Value,
        }
    }

    /// Prepare for a token, inserting a missing `,` or `:` if needed.
    fn begin_token(&mut self) -> Role {
        let Some(top) = self.stack.last_mut() else {
            return Role::Value;
        };
        match (top.kind, top.expect) {
            (Kind::Object, Expect::Key) => Role::Key,
            (Kind::Object, Expect::Colon) => {
                self.out.push(':');
                top.expect = Expect::Value;
                Role::Value
            }
            (Kind::Object, Expect::CommaOrClose) => {
                self.out.push(',');
                top.expect = Expect::Key;
                Role::Key
            }
            (_, Expect::CommaOrClose) => {
                self.out.push(',');
                top.expect = Expect::Value;
                Role::Value
            }
            _ => Role::Value,
        }
    }

    fn end_token(&mut self, role: Role) {
        if let Some(top) = self.stack.last_mut() {
            top.expect = match role {
                Role::Key => Expect::Colon,
                Role::Value => Expect::CommaOrClose,
            };
        }
    }

    fn open(&mut self, c: char) {
        // A container where a key belongs is left as-is; there is no key to
        // recover and the parse will fail.
        self.begin_token();
        self.end_token(Role::Value);
        self.out.push(c);
        self.stack.push(match c {
            '{' => Frame {
                kind: Kind::Object,
                expect: Expect::Key,
            },
            _ => Frame {
                kind: Kind::Array,
                expect: Expect::Value,
            },
        });
    }

    fn close(&mut self, c: char) {
        let wanted = if c == '}' { Kind::Object } else { Kind::Array };
        let Some(depth) = self.stack.iter().rposition(|f| f.kind == wanted) else {
            // Stray closer with nothing to match.
            return;
        };
        while self.stack.len() > depth {
            self.close_top();
        }
    }

    /// Close the innermost frame, completing a dangling member first.
    fn close_top(&mut self) {
        self.trim_trailing_comma();
        let Some(frame) = self.stack.pop() else {
            return;
        };
        match (frame.kind, frame.expect) {
            (Kind::Object, Expect::Colon) => self.out.push_str(": null"),
            (Kind::Object, Expect::Value) => self.out.push_str(" null"),
            _ => {}
        }
        self.out.push(match frame.kind {
            Kind::Object => '}',
            Kind::Array => ']',
        });
        if self.stack.is_empty() {
            self.done = true;
        }
    }

    fn comma(&mut self) {
        let Some(top) = self.stack.last_mut() else {
            return;
        };
        match (top.kind, top.expect) {
            (Kind::Object, Expect::CommaOrClose) => {
                self.out.push(',');
                top.expect = Expect::Key;
            }
            (Kind::Object, Expect::Colon) => {
                self.out.push_str(": null,");
                top.expect = Expect::Key;
            }
            (Kind::Object, Expect::Value) => {
                self.out.push_str(" null,");
                top.expect = Expect::Key;
            }
            (Kind::Array, Expect::CommaOrClose) => {
                self.out.push(',');
                top.expect = Expect::Value;
            }
            // Leading or doubled comma.
            _ => {}
        }
    }

    fn colon(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            if top.kind == Kind::Object && top.expect == Expect::Colon {
                self.out.push(':');
                top.expect = Expect::Value;
            }
        }
    }

    fn trim_trailing_comma(&mut self) {
        let trimmed = self.out.trim_end().len();
        if self.out[..trimmed].ends_with(',') {
            self.out.truncate(trimmed - 1);
        }
    }

    // ── Tokens ───────────────────────────────────────────────────────────

    /// Copy a quoted string as a double-quoted JSON string.
    ///
    /// A closing quote only ends the string when followed by a structural
    /// character, a line break or the end of input; otherwise it is taken as
    /// an unescaped quote inside the text. An unterminated string is closed.
    fn string(&mut self, chars: &[char], start: usize) -> usize {
        let open = chars[start];
        let closers: &[char] = match open {
            '"' => &['"'],
            '\'' => &['\''],
            '\u{201C}' | '\u{201D}' => &['\u{201D}', '\u{201C}', '"'],
            _ => &['\u{2019}', '\u{2018}', '\''],
        };

        let role = self.begin_token();
        self.out.push('"');

        let mut i = start + 1;
        while i < chars.len() {
            let c = chars[i];
            if c == '\\' {
                match chars.get(i + 1).copied() {
                    Some(e @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u')) => {
                        self.out.push('\\');
                        self.out.push(e);
                        i += 2;
                    }
                    Some('\'') => {
                        self.out.push('\'');
                        i += 2;
                    }
                    _ => {
                        self.out.push_str("\\\\");
                        i += 1;
                    }
                }
                continue;
            }
            if closers.contains(&c) && ends_string(chars, i + 1) {
                i += 1;
                self.out.push('"');
                self.end_token(role);
                return i;
            }
            match c {
                '"' => self.out.push_str("\\\""),
                '\n' => self.out.push_str("\\n"),
                '\r' => self.out.push_str("\\r"),
                '\t' => self.out.push_str("\\t"),
                c if c.is_control() => {}
                c => self.out.push(c),
            }
            i += 1;
        }

        // Truncated inside a string.
        self.out.push('"');
        self.end_token(role);
        i
    }

    fn number(&mut self, chars: &[char], start: usize) -> usize {
        let mut end = start;
        while end < chars.len() && matches!(chars[end], '0'..='9' | '-' | '+' | '.' | 'e' | 'E') {
            end += 1;
        }
        // `12kg`, `4x20ft`: not a number after all.
        if end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
            return self.word(chars, start);
        }

        let raw: String = chars[start..end].iter().collect();
        let role = self.begin_token();
        match role {
            Role::Key => self.push_quoted(&raw),
            Role::Value => match fix_number(&raw) {
                Some(n) => self.out.push_str(&n),
                None => self.push_quoted(&raw),
            },
        }
        self.end_token(role);
        end
    }

    /// Bare text: a key before `:`, or a literal/unquoted value.
    fn word(&mut self, chars: &[char], start: usize) -> usize {
        let role = self.next_role();
        let stops: &[char] = match role {
            Role::Key => &[':', '{', '}', '[', ']', ',', '"', '\n'],
            Role::Value => &['}', ']', ',', '\n'],
        };
        let mut end = start;
        while end < chars.len() && !stops.contains(&chars[end]) {
            end += 1;
        }
        let raw: String = chars[start..end].iter().collect();
        let text = raw.trim();
        if text.is_empty() {
            return start + 1;
        }

        let role = self.begin_token();
        match role {
            Role::Key => self.push_quoted(text),
            Role::Value => match literal(text, end >= chars.len()) {
                Some(lit) => self.out.push_str(lit),
                None => self.push_quoted(text),
            },
        }
        self.end_token(role);
        end
    }

    fn push_quoted(&mut self, text: &str) {
        match serde_json::to_string(text) {
            Ok(quoted) => self.out.push_str(&quoted),
            Err(_) => {
                self.out.push('"');
                self.out.push_str(&text.replace('\\', "\\\\").replace('"', "\\\""));
                self.out.push('"');
            }
        }
    }
}

fn ends_string(chars: &[char], from: usize) -> bool {
    let mut i = from;
    while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
        i += 1;
    }
    match chars.get(i) {
        None => true,
        Some(c) => matches!(c, ',' | '}' | ']' | ':' | '\n' | '\r'),
    }
}

fn skip_line_comment(chars: &[char], start: usize) -> usize {
    let mut i = start;
    while i < chars.len() && chars[i] != '\n' {
        i += 1;
    }
    i
}

fn skip_block_comment(chars: &[char], start: usize) -> usize {
    let mut i = start + 2;
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return i + 2;
        }
        i += 1;
    }
    chars.len()
}

/// Map a bare word to a JSON literal. At end of input a prefix of a literal
/// (`tru`, `nul`) is taken as truncation of that literal.
fn literal(word: &str, at_end: bool) -> Option<&'static str> {
    match word {
        "true" | "True" | "TRUE" => return Some("true"),
        "false" | "False" | "FALSE" => return Some("false"),
        "null" | "Null" | "NULL" | "None" | "none" | "undefined" | "NaN" | "nil" => {
            return Some("null")
        }
        _ => {}
    }
    if at_end {
        for lit in ["true", "false", "null"] {
            if lit.starts_with(word) {
                return Some(lit);
            }
        }
    }
    None
}

/// Normalise a bare numeric token, or `None` if it should become a string.
///
/// Leading zeros (`0303.79`, an HS code) are preserved by quoting rather than
/// silently stripped.
fn fix_number(raw: &str) -> Option<String> {
    let (sign, digits) = match raw.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", raw.strip_prefix('+').unwrap_or(raw)),
    };
    if digits.is_empty() {
        return None;
    }
    let bytes = digits.as_bytes();
    if bytes.len() > 1 && bytes[0] == b'0' && bytes[1].is_ascii_digit() {
        return None;
    }
    let mut fixed = String::with_capacity(raw.len() + 2);
    fixed.push_str(sign);
    if digits.starts_with('.') {
        fixed.push('0');
    }
    fixed.push_str(digits);
    if fixed.ends_with('.') {
        fixed.push('0');
    }
    if fixed.ends_with(['e', 'E', '-', '+']) {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(&fixed) {
        Ok(serde_json::Value::Number(_)) => Some(fixed),
        _ => None,
    }
}
