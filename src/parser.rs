// Slice-based frame parser (produces owned values from input slices)
use crate::frame::{Frame, Headers};

/// Outcome of parsing one frame from a byte slice.
///
/// - `Ok(Some((frame, consumed)))` when a full frame was parsed.
/// - `Ok(None)` when more bytes are required.
/// - `Err(reason)` when the bytes cannot form a valid frame.
pub type ParseResult = Result<Option<(Frame, usize)>, String>;

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

fn strip_cr(line: &[u8]) -> &[u8] {
    match line.split_last() {
        Some((b'\r', rest)) => rest,
        _ => line,
    }
}

fn as_text<'a>(bytes: &'a [u8], what: &str) -> Result<&'a str, String> {
    std::str::from_utf8(bytes).map_err(|e| format!("invalid utf8 in {}: {}", what, e))
}

/// Number of leading bytes made up of complete blank (whitespace-only)
/// lines. Brokers pad between frames with LFs; those lines carry nothing.
pub fn skip_blank_lines(input: &[u8]) -> usize {
    let mut pos = 0usize;
    while let Some(rel) = input[pos..].iter().position(|&b| b == b'\n') {
        if !is_blank(&input[pos..pos + rel]) {
            break;
        }
        pos += rel + 1;
    }
    pos
}

/// Whether `input` holds nothing but whitespace, i.e. ending the stream
/// here loses no frame.
pub fn is_only_whitespace(input: &[u8]) -> bool {
    is_blank(input)
}

/// Extract the optional content-length value from a header list.
///
/// Returns:
/// - Ok(Some(n)) when a valid content-length header is present and parsed.
/// - Ok(None) when no content-length header is present.
/// - Err(String) when content-length is present but not a valid unsigned integer.
fn get_content_length(headers: &Headers) -> Result<Option<usize>, String> {
    for (k, v) in headers {
        if k.eq_ignore_ascii_case("content-length") {
            if v.is_empty() {
                return Err("empty content-length".to_string());
            }
            return match v.parse::<usize>() {
                Ok(n) => Ok(Some(n)),
                Err(e) => Err(format!("invalid content-length '{}': {}", v, e)),
            };
        }
    }
    Ok(None)
}

/// Parse a single frame from a raw byte slice.
///
/// Blank lines before the command are skipped. Header lines are split at
/// the first colon and both halves trimmed. With a `content-length` header
/// exactly that many body bytes are taken and the next byte must be NUL;
/// without one the body runs up to the first NUL.
pub fn parse_frame_slice(input: &[u8]) -> ParseResult {
    let len = input.len();
    let mut pos = skip_blank_lines(input);

    let cmd_end_rel = match input[pos..].iter().position(|&b| b == b'\n') {
        Some(i) => i,
        None => return Ok(None),
    };
    let command = as_text(strip_cr(&input[pos..pos + cmd_end_rel]), "command")?
        .trim()
        .to_string();
    pos += cmd_end_rel + 1;

    // headers run until an empty line
    let mut headers: Headers = Vec::new();
    loop {
        let line_end_rel = match input[pos..].iter().position(|&b| b == b'\n') {
            Some(i) => i,
            None => return Ok(None),
        };
        let line = strip_cr(&input[pos..pos + line_end_rel]);
        pos += line_end_rel + 1;
        if line.is_empty() {
            break;
        }
        let line = as_text(line, "header")?;
        match line.split_once(':') {
            Some((k, v)) => headers.push((k.trim().to_string(), v.trim().to_string())),
            None => return Err(format!("malformed header line: {:?}", line)),
        }
    }

    let body = match get_content_length(&headers)? {
        Some(content_len) => {
            // need content_len bytes plus the terminating NUL
            let end = pos
                .checked_add(content_len)
                .and_then(|n| n.checked_add(1))
                .ok_or_else(|| format!("content-length too large: {}", content_len))?;
            if end > len {
                return Ok(None);
            }
            if input[pos + content_len] != 0 {
                return Err("missing NUL terminator after content-length body".to_string());
            }
            let body = input[pos..pos + content_len].to_vec();
            pos += content_len + 1;
            body
        }
        None => match input[pos..].iter().position(|&b| b == 0) {
            Some(nul_rel) => {
                let body = input[pos..pos + nul_rel].to_vec();
                pos += nul_rel + 1;
                body
            }
            None => return Ok(None),
        },
    };

    Ok(Some((
        Frame {
            command,
            headers,
            body,
        },
        pos,
    )))
}
