//! AT response parsing: terminator search and unsolicited line extraction.
//!
//! Pure functions over the port's receive buffer. Nothing here touches a
//! descriptor or a queue.

/// Final result codes that end an answer, in match priority order.
pub const TERMINATORS: [&str; 10] = [
    "OK",
    "CONNECT",
    "NO CARRIER",
    "ERROR",
    "+CME ERROR:",
    "NO DIALTONE",
    "BUSY",
    "NO ANSWER",
    "+CMS ERROR:",
    "^SYSSTART",
];

/// The final result line of an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultCode {
    /// `OK`
    Ok,
    /// `CONNECT`, with any trailing text (e.g. a baud rate).
    Connect(String),
    /// `NO CARRIER`
    NoCarrier,
    /// `ERROR`
    Error,
    /// `+CME ERROR: <detail>`
    CmeError(String),
    /// `NO DIALTONE`
    NoDialtone,
    /// `BUSY`
    Busy,
    /// `NO ANSWER`
    NoAnswer,
    /// `+CMS ERROR: <detail>`
    CmsError(String),
    /// `^SYSSTART`
    SysStart,
}

impl ResultCode {
    /// Parse a terminator line (without its line ending).
    pub fn parse(line: &str) -> Option<Self> {
        let rest = |prefix: &str| line[prefix.len()..].trim().to_string();
        let code = match TERMINATORS.iter().find(|t| line.starts_with(*t))? {
            &"OK" => Self::Ok,
            &"CONNECT" => Self::Connect(rest("CONNECT")),
            &"NO CARRIER" => Self::NoCarrier,
            &"ERROR" => Self::Error,
            &"+CME ERROR:" => Self::CmeError(rest("+CME ERROR:")),
            &"NO DIALTONE" => Self::NoDialtone,
            &"BUSY" => Self::Busy,
            &"NO ANSWER" => Self::NoAnswer,
            &"+CMS ERROR:" => Self::CmsError(rest("+CMS ERROR:")),
            _ => Self::SysStart,
        };
        Some(code)
    }

    /// `OK` or `CONNECT`.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Connect(_))
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => f.write_str("OK"),
            Self::Connect(rest) if rest.is_empty() => f.write_str("CONNECT"),
            Self::Connect(rest) => write!(f, "CONNECT {rest}"),
            Self::NoCarrier => f.write_str("NO CARRIER"),
            Self::Error => f.write_str("ERROR"),
            Self::CmeError(detail) => write!(f, "+CME ERROR: {detail}"),
            Self::NoDialtone => f.write_str("NO DIALTONE"),
            Self::Busy => f.write_str("BUSY"),
            Self::NoAnswer => f.write_str("NO ANSWER"),
            Self::CmsError(detail) => write!(f, "+CMS ERROR: {detail}"),
            Self::SysStart => f.write_str("^SYSSTART"),
        }
    }
}

/// A complete answer to an AT command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtAnswer {
    /// Information text before the final result, CR/LF trimmed at both ends.
    pub body: String,
    /// The final result.
    pub result: ResultCode,
}

/// An answer found in a receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    /// The parsed answer.
    pub answer: AtAnswer,
    /// Bytes up to and including the terminator line's newline.
    pub consumed: usize,
}

fn trim_line_endings(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !matches!(b, b'\r' | b'\n'))
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !matches!(b, b'\r' | b'\n'))
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

/// Look for a complete answer at the front of `buf`.
///
/// Lines are examined starting after the first newline; the first one that
/// begins with a terminator and is itself newline-terminated ends the
/// answer. Returns `None` while the answer is still incomplete.
pub fn find_answer(buf: &[u8]) -> Option<Found> {
    let mut start = buf.iter().position(|&b| b == b'\n')? + 1;

    while start < buf.len() {
        let newline = buf[start..].iter().position(|&b| b == b'\n').map(|i| start + i);
        let line = &buf[start..newline.unwrap_or(buf.len())];

        if TERMINATORS.iter().any(|t| line.starts_with(t.as_bytes())) {
            let end = newline?;
            let line = String::from_utf8_lossy(trim_line_endings(line));
            let result = ResultCode::parse(&line)?;
            let body = String::from_utf8_lossy(trim_line_endings(&buf[..start])).into_owned();
            return Some(Found {
                answer: AtAnswer { body, result },
                consumed: end + 1,
            });
        }

        start = newline? + 1;
    }
    None
}

/// Split complete lines off the front of `buf`, skipping blank ones.
///
/// Returns the lines (line endings stripped) and how many bytes they and
/// any blank lines around them took. A trailing partial line is left.
pub fn take_lines(buf: &[u8]) -> (Vec<String>, usize) {
    let mut lines = Vec::new();
    let mut pos = 0;
    loop {
        while pos < buf.len() && matches!(buf[pos], b'\r' | b'\n') {
            pos += 1;
        }
        let Some(len) = buf[pos..].iter().position(|&b| b == b'\n') else {
            break;
        };
        lines.push(String::from_utf8_lossy(trim_line_endings(&buf[pos..pos + len])).into_owned());
        pos += len + 1;
    }
    (lines, pos)
}

/// Wire form of `command`: trailing line endings replaced by one `\r`.
pub fn normalize_command(command: &str) -> Vec<u8> {
    let mut bytes = command.trim_end_matches(['\r', '\n']).as_bytes().to_vec();
    bytes.push(b'\r');
    bytes
}
