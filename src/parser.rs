// Slice-based STOMP frame parser. Works on whatever bytes the codec has
// buffered so far and reports how much of the input a complete frame used.

/// A frame as it appears on the wire: raw command, raw (still escaped)
/// headers and body.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RawFrame {
    pub command: Vec<u8>,
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
    pub body: Vec<u8>,
}

/// Outcome of [`parse_frame_slice`]: the frame and the number of bytes it
/// occupied, or `None` when the input ends before the frame does.
pub type ParseResult = Result<Option<(RawFrame, usize)>, String>;

/// Find the next LF at or after `from`, returning the line without a
/// trailing CR and the index just past the LF.
fn next_line(input: &[u8], from: usize) -> Option<(&[u8], usize)> {
    let rel = input[from..].iter().position(|&b| b == b'\n')?;
    let mut line = &input[from..from + rel];
    if let [rest @ .., b'\r'] = line {
        line = rest;
    }
    Some((line, from + rel + 1))
}

fn content_length(headers: &[(Vec<u8>, Vec<u8>)]) -> Result<Option<usize>, String> {
    // STOMP gives the first occurrence of a repeated header precedence.
    let Some((_, v)) = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(b"content-length"))
    else {
        return Ok(None);
    };
    let s = std::str::from_utf8(v).map_err(|e| format!("content-length not utf8: {}", e))?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err("empty content-length".to_string());
    }
    trimmed
        .parse::<usize>()
        .map(Some)
        .map_err(|e| format!("invalid content-length '{}': {}", trimmed, e))
}

/// Skip the optional EOL that may follow the NUL terminator.
fn skip_trailing_eol(input: &[u8], mut pos: usize) -> usize {
    if input.get(pos) == Some(&b'\r') && input.get(pos + 1) == Some(&b'\n') {
        pos += 2;
    } else if input.get(pos) == Some(&b'\n') {
        pos += 1;
    }
    pos
}

/// Parse a single STOMP frame from a raw byte slice.
///
/// Leading EOLs (heartbeats) are skipped. Returns `Ok(None)` when more bytes
/// are required and `Err` on protocol violations such as a header line
/// without a colon or a `content-length` body missing its NUL terminator.
pub fn parse_frame_slice(input: &[u8]) -> ParseResult {
    let mut pos = input
        .iter()
        .position(|&b| b != b'\n' && b != b'\r')
        .unwrap_or(input.len());
    if pos == input.len() {
        return Ok(None);
    }

    let Some((command, after_cmd)) = next_line(input, pos) else {
        return Ok(None);
    };
    let mut frame = RawFrame {
        command: command.to_vec(),
        ..RawFrame::default()
    };
    pos = after_cmd;

    loop {
        let Some((line, next)) = next_line(input, pos) else {
            return Ok(None);
        };
        pos = next;
        if line.is_empty() {
            break;
        }
        let colon = line.iter().position(|&b| b == b':').ok_or_else(|| {
            format!(
                "malformed header line: {:?}",
                String::from_utf8_lossy(line)
            )
        })?;
        frame
            .headers
            .push((line[..colon].to_vec(), line[colon + 1..].to_vec()));
    }

    match content_length(&frame.headers)? {
        Some(len) => {
            let Some(end) = pos.checked_add(len).and_then(|n| n.checked_add(1)) else {
                return Err(format!("content-length {} exceeds addressable size", len));
            };
            if input.len() < end {
                return Ok(None);
            }
            frame.body = input[pos..pos + len].to_vec();
            pos += len;
            if input[pos] != 0 {
                return Err("missing NUL terminator after content-length body".to_string());
            }
            pos += 1;
        }
        None => {
            let Some(nul) = input[pos..].iter().position(|&b| b == 0) else {
                return Ok(None);
            };
            frame.body = input[pos..pos + nul].to_vec();
            pos += nul + 1;
        }
    }

    Ok(Some((frame, skip_trailing_eol(input, pos))))
}

/// Reverse the STOMP 1.2 header escaping (`\\`, `\r`, `\n`, `\c`).
///
/// Any other escape sequence, or a trailing lone backslash, is an error.
pub fn unescape_header_value(raw: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter();
    while let Some(&b) = bytes.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(b'\\') => out.push(b'\\'),
            Some(b'r') => out.push(b'\r'),
            Some(b'n') => out.push(b'\n'),
            Some(b'c') => out.push(b':'),
            Some(other) => return Err(format!("undefined escape sequence '\\{}'", *other as char)),
            None => return Err("dangling backslash at end of header".to_string()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nul_terminated_frame() {
        let input = b"MESSAGE\ndestination:/queue/a\nack:42\n\nhello\0";
        let (frame, used) = parse_frame_slice(input).unwrap().unwrap();
        assert_eq!(frame.command, b"MESSAGE");
        assert_eq!(frame.headers.len(), 2);
        assert_eq!(frame.body, b"hello");
        assert_eq!(used, input.len());
    }

    #[test]
    fn incomplete_input_needs_more() {
        assert_eq!(parse_frame_slice(b"MESSAGE\nack:1\n").unwrap(), None);
        assert_eq!(parse_frame_slice(b"MESSAGE\nack:1\n\nbody").unwrap(), None);
        assert_eq!(parse_frame_slice(b"\n\n").unwrap(), None);
    }

    #[test]
    fn content_length_body_may_contain_nul() {
        let input = b"MESSAGE\ncontent-length:3\n\na\0b\0\n";
        let (frame, used) = parse_frame_slice(input).unwrap().unwrap();
        assert_eq!(frame.body, b"a\0b");
        assert_eq!(used, input.len());
    }

    #[test]
    fn content_length_without_terminator_is_error() {
        let input = b"MESSAGE\ncontent-length:1\n\nab\0";
        assert!(parse_frame_slice(input).is_err());
    }

    #[test]
    fn oversized_content_length_is_error() {
        let input = b"MESSAGE\ncontent-length:18446744073709551615\n\nx";
        assert!(parse_frame_slice(input).is_err());
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let input = b"RECEIPT\r\nreceipt-id:r-1\r\n\r\n\0\r\n";
        let (frame, used) = parse_frame_slice(input).unwrap().unwrap();
        assert_eq!(frame.command, b"RECEIPT");
        assert_eq!(frame.headers[0], (b"receipt-id".to_vec(), b"r-1".to_vec()));
        assert_eq!(used, input.len());
    }

    #[test]
    fn header_without_colon_is_error() {
        assert!(parse_frame_slice(b"SEND\nbogus\n\n\0").is_err());
    }

    #[test]
    fn unescape_handles_defined_sequences() {
        assert_eq!(
            unescape_header_value(b"a\\cb\\nc\\\\d\\r").unwrap(),
            b"a:b\nc\\d\r".to_vec()
        );
        assert!(unescape_header_value(b"bad\\t").is_err());
        assert!(unescape_header_value(b"trailing\\").is_err());
    }
}
