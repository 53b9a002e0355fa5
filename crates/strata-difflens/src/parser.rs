use std::fmt;

use strata_core::{LineEvent, LineKind, StrataError};

/// Which side of the diff text is the later point in time.
///
/// The miner asks the backend for `diff(commit, previous)`, so in the text
/// it receives a `+` line exists only in the *previous* commit and a `-`
/// line only in the current one. [`Orientation::Reversed`] maps those back
/// to forward time.
///
/// # Examples
///
/// ```
/// use strata_difflens::parser::{parse_hunks, Orientation};
/// use strata_core::LineKind;
///
/// let diff = "@@ -1 +1 @@\n-new\n+old\n";
/// let parsed = parse_hunks(diff, Orientation::Reversed).unwrap();
/// assert_eq!(parsed.events[0].kind, LineKind::Added);
/// assert_eq!(parsed.events[0].text, "new");
/// assert_eq!(parsed.events[1].kind, LineKind::Deleted);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// Text compares previous → current (`+` means added).
    Forward,
    /// Text compares current → previous (`+` means deleted).
    Reversed,
}

/// Errors raised for malformed unified-diff text.
///
/// Line numbers are 1-based positions within the diff text itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffParseError {
    /// A `@@` line that does not follow `@@ -a[,b] +c[,d] @@`.
    #[error("line {line}: malformed hunk header: {reason}")]
    MalformedHeader {
        /// Position of the header in the diff text.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// A line inside a hunk without a recognised prefix.
    #[error("line {line}: unexpected line in hunk: {content:?}")]
    UnexpectedLine {
        /// Position of the offending line.
        line: usize,
        /// The offending line.
        content: String,
    },

    /// The hunk body disagrees with the counts in its header.
    #[error(
        "hunk at line {line} declares -{old_count} +{new_count} lines but has -{old_seen} +{new_seen}"
    )]
    CountMismatch {
        /// Position of the hunk header.
        line: usize,
        /// Declared old-side line count.
        old_count: u32,
        /// Declared new-side line count.
        new_count: u32,
        /// Old-side lines actually present.
        old_seen: u32,
        /// New-side lines actually present.
        new_seen: u32,
    },
}

impl From<DiffParseError> for StrataError {
    fn from(err: DiffParseError) -> Self {
        StrataError::Parse(err.to_string())
    }
}

/// A parsed `@@ -oldStart,oldCount +newStart,newCount @@` header.
///
/// # Examples
///
/// ```
/// use strata_difflens::parser::HunkHeader;
///
/// let header = HunkHeader::parse("@@ -12,5 +12,7 @@ fn main() {", 1).unwrap();
/// assert_eq!((header.old_start, header.old_count), (12, 5));
/// assert_eq!((header.new_start, header.new_count), (12, 7));
///
/// let short = HunkHeader::parse("@@ -3 +4 @@", 1).unwrap();
/// assert_eq!((short.old_count, short.new_count), (1, 1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    /// First line of the hunk on the old side.
    pub old_start: u32,
    /// Lines on the old side (defaults to 1).
    pub old_count: u32,
    /// First line of the hunk on the new side.
    pub new_start: u32,
    /// Lines on the new side (defaults to 1).
    pub new_count: u32,
}

/// Line numbers the next content line of a hunk will occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkCursor {
    /// Next old-side line number.
    pub old: u32,
    /// Next new-side line number.
    pub new: u32,
}

impl HunkHeader {
    /// Parse a header line. `line_no` is used for error reporting only.
    ///
    /// # Errors
    ///
    /// Returns [`DiffParseError::MalformedHeader`] on any deviation from the
    /// header grammar, including non-numeric fields.
    pub fn parse(line: &str, line_no: usize) -> Result<Self, DiffParseError> {
        let tokens = lex_header(line).map_err(|reason| DiffParseError::MalformedHeader {
            line: line_no,
            reason,
        })?;
        HeaderGrammar::new(&tokens)
            .header()
            .map_err(|reason| DiffParseError::MalformedHeader {
                line: line_no,
                reason,
            })
    }

    /// Cursor positioned at the first content line of the hunk.
    pub fn cursor(&self) -> HunkCursor {
        HunkCursor {
            old: self.old_start,
            new: self.new_start,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Marker,
    Minus,
    Plus,
    Comma,
    Number(u32),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Marker => write!(f, "`@@`"),
            Token::Minus => write!(f, "`-`"),
            Token::Plus => write!(f, "`+`"),
            Token::Comma => write!(f, "`,`"),
            Token::Number(n) => write!(f, "number {n}"),
        }
    }
}

/// Tokenize a header up to and including its closing `@@`. Anything after
/// the closing marker is the section heading and is not tokenized.
fn lex_header(line: &str) -> Result<Vec<Token>, String> {
    let bytes = line.as_bytes();
    let mut tokens = Vec::new();
    let mut markers = 0;
    let mut i = 0;

    while i < bytes.len() && markers < 2 {
        match bytes[i] {
            b' ' | b'\t' => i += 1,
            b'@' if bytes.get(i + 1) == Some(&b'@') => {
                tokens.push(Token::Marker);
                markers += 1;
                i += 2;
            }
            b'-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            b'+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            b',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            b'0'..=b'9' => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                let digits = &line[start..i];
                let value = digits
                    .parse()
                    .map_err(|_| format!("number out of range: {digits}"))?;
                tokens.push(Token::Number(value));
            }
            _ => {
                let rest: String = line[i..].chars().take(12).collect();
                return Err(format!("unexpected input {rest:?}"));
            }
        }
    }

    if markers < 2 {
        return Err("missing closing `@@`".into());
    }
    Ok(tokens)
}

struct HeaderGrammar<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> HeaderGrammar<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn header(mut self) -> Result<HunkHeader, String> {
        self.expect(Token::Marker)?;
        self.expect(Token::Minus)?;
        let (old_start, old_count) = self.range()?;
        self.expect(Token::Plus)?;
        let (new_start, new_count) = self.range()?;
        self.expect(Token::Marker)?;
        Ok(HunkHeader {
            old_start,
            old_count,
            new_start,
            new_count,
        })
    }

    fn range(&mut self) -> Result<(u32, u32), String> {
        let start = self.number()?;
        let count = if self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            self.number()?
        } else {
            1
        };
        // the cursor can step one past the range before the count check
        if start.checked_add(count).and_then(|end| end.checked_add(1)).is_none() {
            return Err(format!("range {start},{count} runs past the last line number"));
        }
        Ok((start, count))
    }

    fn number(&mut self) -> Result<u32, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(*n),
            Some(other) => Err(format!("expected number, found {other}")),
            None => Err("expected number, found end of header".into()),
        }
    }

    fn expect(&mut self, want: Token) -> Result<(), String> {
        match self.next() {
            Some(tok) if *tok == want => Ok(()),
            Some(other) => Err(format!("expected {want}, found {other}")),
            None => Err(format!("expected {want}, found end of header")),
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        self.pos += 1;
        tok
    }
}

/// Line-level content of one file's diff text.
///
/// # Examples
///
/// ```
/// use strata_difflens::parser::{parse_hunks, Orientation};
///
/// let parsed = parse_hunks("Binary files a/logo.png and b/logo.png differ\n", Orientation::Reversed).unwrap();
/// assert!(parsed.is_binary);
/// assert!(parsed.events.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDiff {
    /// Changed lines in text order.
    pub events: Vec<LineEvent>,
    /// Number of hunks consumed.
    pub hunks: usize,
    /// Whether the text announced a binary file.
    pub is_binary: bool,
}

impl ParsedDiff {
    /// Number of forward-time added lines.
    pub fn lines_added(&self) -> u64 {
        self.count(LineKind::Added)
    }

    /// Number of forward-time deleted lines.
    pub fn lines_deleted(&self) -> u64 {
        self.count(LineKind::Deleted)
    }

    fn count(&self, kind: LineKind) -> u64 {
        self.events.iter().filter(|e| e.kind == kind).count() as u64
    }
}

struct OpenHunk {
    header_line: usize,
    header: HunkHeader,
    cursor: HunkCursor,
    old_seen: u32,
    new_seen: u32,
}

impl OpenHunk {
    fn is_complete(&self) -> bool {
        self.old_seen == self.header.old_count && self.new_seen == self.header.new_count
    }

    fn overflowed(&self) -> bool {
        self.old_seen > self.header.old_count || self.new_seen > self.header.new_count
    }

    fn mismatch(&self) -> DiffParseError {
        DiffParseError::CountMismatch {
            line: self.header_line,
            old_count: self.header.old_count,
            new_count: self.header.new_count,
            old_seen: self.old_seen,
            new_seen: self.new_seen,
        }
    }
}

/// Parse the diff text of a single file into ordered line events.
///
/// Lines before the first `@@` header (`diff --git`, `index`, `---`/`+++`,
/// mode and rename lines) are ignored. Inside a hunk, `+` lines sit at the
/// new-side cursor, `-` lines at the old-side cursor, and context lines
/// (a leading space, or an empty line) advance both. `\ No newline at end
/// of file` markers are skipped. Binary and mode-only diffs yield no events.
///
/// # Errors
///
/// Returns [`DiffParseError`] for a malformed header, an unrecognised line
/// inside a hunk, or a hunk whose body does not match its declared counts.
///
/// # Examples
///
/// ```
/// use strata_difflens::parser::{parse_hunks, Orientation};
/// use strata_core::LineKind;
///
/// let diff = "\
/// --- a/hello.py
/// +++ b/hello.py
/// @@ -1,2 +1,3 @@
///  import sys
/// +import os
///  print(sys.argv)
/// ";
/// let parsed = parse_hunks(diff, Orientation::Forward).unwrap();
/// assert_eq!(parsed.events.len(), 1);
/// assert_eq!(parsed.events[0].number, 2);
/// assert_eq!(parsed.events[0].kind, LineKind::Added);
/// ```
pub fn parse_hunks(text: &str, orientation: Orientation) -> Result<ParsedDiff, DiffParseError> {
    let mut parsed = ParsedDiff::default();
    let mut open: Option<OpenHunk> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;

        if line.starts_with("@@") {
            if let Some(hunk) = open.take() {
                if !hunk.is_complete() {
                    return Err(hunk.mismatch());
                }
            }
            let header = HunkHeader::parse(line, line_no)?;
            parsed.hunks += 1;
            let hunk = OpenHunk {
                header_line: line_no,
                header,
                cursor: header.cursor(),
                old_seen: 0,
                new_seen: 0,
            };
            // `@@ -0,0 +0,0 @@` has no body at all
            open = if hunk.is_complete() { None } else { Some(hunk) };
            continue;
        }

        let Some(hunk) = open.as_mut() else {
            if parsed.hunks == 0 && is_binary_marker(line) {
                parsed.is_binary = true;
            } else if parsed.hunks > 0 && !is_between_hunks(line) {
                return Err(DiffParseError::UnexpectedLine {
                    line: line_no,
                    content: line.to_string(),
                });
            }
            continue;
        };

        match line.as_bytes().first() {
            Some(b'+') => {
                let kind = match orientation {
                    Orientation::Forward => LineKind::Added,
                    Orientation::Reversed => LineKind::Deleted,
                };
                parsed.events.push(LineEvent {
                    number: hunk.cursor.new,
                    kind,
                    text: line[1..].to_string(),
                });
                hunk.cursor.new += 1;
                hunk.new_seen += 1;
            }
            Some(b'-') => {
                let kind = match orientation {
                    Orientation::Forward => LineKind::Deleted,
                    Orientation::Reversed => LineKind::Added,
                };
                parsed.events.push(LineEvent {
                    number: hunk.cursor.old,
                    kind,
                    text: line[1..].to_string(),
                });
                hunk.cursor.old += 1;
                hunk.old_seen += 1;
            }
            Some(b' ') | None => {
                hunk.cursor.old += 1;
                hunk.cursor.new += 1;
                hunk.old_seen += 1;
                hunk.new_seen += 1;
            }
            Some(b'\\') => continue,
            Some(_) => {
                return Err(DiffParseError::UnexpectedLine {
                    line: line_no,
                    content: line.to_string(),
                });
            }
        }

        if hunk.overflowed() {
            return Err(hunk.mismatch());
        }
        if hunk.is_complete() {
            open = None;
        }
    }

    if let Some(hunk) = open {
        return Err(hunk.mismatch());
    }

    Ok(parsed)
}

fn is_binary_marker(line: &str) -> bool {
    (line.starts_with("Binary files ") && line.ends_with(" differ"))
        || line.starts_with("GIT binary patch")
}

/// Lines that may legitimately follow a finished hunk before the next `@@`.
fn is_between_hunks(line: &str) -> bool {
    const PREFIXES: [&str; 12] = [
        "\\",
        "diff ",
        "index ",
        "--- ",
        "+++ ",
        "new file mode",
        "deleted file mode",
        "old mode",
        "new mode",
        "similarity index",
        "rename from ",
        "rename to ",
    ];
    line.trim().is_empty() || PREFIXES.iter().any(|p| line.starts_with(p))
}
