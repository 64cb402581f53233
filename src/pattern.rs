use regex::Regex;

/// A compiled Redis-style glob (`*`, `?`, `[...]`, backslash escapes).
///
/// The whole candidate must match, the same way `SCAN ... MATCH` treats its
/// pattern on the server, so a client-side check never admits an item the
/// server would have filtered out.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&glob_to_regex(pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }
}

impl PartialEq for GlobPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for GlobPattern {}

/// One-shot match. An invalid pattern (e.g. a reversed `[z-a]` range) matches nothing.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    GlobPattern::new(pattern)
        .map(|glob| glob.is_match(candidate))
        .unwrap_or(false)
}

fn glob_to_regex(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 8);
    out.push_str("^(?s:");

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() && matches!(chars[i + 1], '*' | '?' | '[' | ']') => {
                push_literal(&mut out, chars[i + 1]);
                i += 2;
            }
            '*' => {
                out.push_str(".*");
                i += 1;
            }
            '?' => {
                out.push('.');
                i += 1;
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push('[');
                    let mut j = i + 1;
                    while j < end {
                        let ch = chars[j];
                        if ch == '\\' && j + 1 < end {
                            out.push('\\');
                            out.push(chars[j + 1]);
                            j += 2;
                            continue;
                        }
                        // `[`, `&&` and `~~` are nested classes or set
                        // operations to the regex engine.
                        if matches!(ch, '[' | '&' | '~') {
                            out.push('\\');
                        }
                        out.push(ch);
                        j += 1;
                    }
                    out.push(']');
                    i = end + 1;
                }
                None => {
                    push_literal(&mut out, '[');
                    i += 1;
                }
            },
            ch => {
                push_literal(&mut out, ch);
                i += 1;
            }
        }
    }

    out.push_str(")$");
    out
}

/// Index of the `]` closing the class opened at `start`, if any.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut i = start + 1;
    // A leading `]` (after an optional `^`) is a literal member of the class.
    if chars.get(i) == Some(&'^') {
        i += 1;
    }
    if chars.get(i) == Some(&']') {
        i += 1;
    }
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            ']' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

fn push_literal(out: &mut String, ch: char) {
    let mut buf = [0u8; 4];
    out.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
}
