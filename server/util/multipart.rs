/// One uploaded file from a multipart/form-data body.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    /// Form field name (`name="..."`).
    pub field: Option<String>,
    pub filename: Option<String>,
    /// The part's own Content-Type header, if the client sent one.
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Returns the index of the first occurrence of `needle` in `haystack`.
pub fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Splits `haystack` on every occurrence of `needle`, returning the pieces
/// between occurrences (excluding the needle itself).
pub fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut result = Vec::new();
    let mut start = 0;
    while start <= haystack.len() {
        if let Some(pos) = find_subsequence(&haystack[start..], needle) {
            result.push(&haystack[start..start + pos]);
            start += pos + needle.len();
        } else {
            result.push(&haystack[start..]);
            break;
        }
    }
    result
}

/// Extracts the boundary token from a Content-Type header value like
/// `multipart/form-data; boundary=----WebKitFormBoundaryXXX`.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .map(|s| s.trim())
        .find(|s| s.starts_with("boundary="))
        .map(|s| s["boundary=".len()..].trim_matches('"').to_owned())
        .filter(|s| !s.is_empty())
}

/// Value of `key="..."` inside a header line, e.g. `filename` in a
/// Content-Disposition header. Matches whole parameter names only.
fn header_param(line: &str, key: &str) -> Option<String> {
    line.split(';').map(str::trim).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case(key) {
            Some(value.trim().trim_matches('"').to_owned())
        } else {
            None
        }
    })
}

fn header_value<'a>(headers: &'a str, name: &str) -> Option<&'a str> {
    headers.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

/// Extracts the first file part (one with a `filename` parameter) from a
/// multipart/form-data body.
pub fn extract_file_part(body: &[u8], boundary: &str) -> Option<FilePart> {
    let delimiter = format!("--{}", boundary);
    let parts = split_on(body, delimiter.as_bytes());
    let sep = b"\r\n\r\n";

    for part in parts {
        let Some(sep_pos) = find_subsequence(part, sep) else {
            continue;
        };
        let headers = String::from_utf8_lossy(&part[..sep_pos]);
        let Some(disposition) = header_value(&headers, "Content-Disposition") else {
            continue;
        };
        let Some(filename) = header_param(disposition, "filename") else {
            continue;
        };

        let raw = &part[sep_pos + sep.len()..];
        let data = raw.strip_suffix(b"\r\n").unwrap_or(raw).to_vec();
        return Some(FilePart {
            field: header_param(disposition, "name"),
            filename: Some(filename).filter(|f| !f.is_empty()),
            content_type: header_value(&headers, "Content-Type").map(str::to_owned),
            data,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(boundary: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n");
        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(
            b"Content-Disposition: form-data; name=\"file\"; filename=\"cell.png\"\r\nContent-Type: image/png\r\n\r\n",
        );
        body.extend_from_slice(&[0x89, b'P', b'N', b'G', 0x00, 0x0d, 0x0a]);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
        body
    }

    #[test]
    fn boundary_is_read_from_content_type() {
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=\"abc123\"").as_deref(),
            Some("abc123")
        );
        assert_eq!(extract_boundary("application/json"), None);
    }

    #[test]
    fn file_part_carries_name_type_and_bytes() {
        let part = extract_file_part(&body("XyZ"), "XyZ").unwrap();
        assert_eq!(part.field.as_deref(), Some("file"));
        assert_eq!(part.filename.as_deref(), Some("cell.png"));
        assert_eq!(part.content_type.as_deref(), Some("image/png"));
        assert_eq!(part.data, vec![0x89, b'P', b'N', b'G', 0x00, 0x0d, 0x0a]);
    }

    #[test]
    fn text_only_body_has_no_file() {
        let body = b"--b\r\nContent-Disposition: form-data; name=\"filename_hint\"\r\n\r\nx\r\n--b--\r\n";
        assert_eq!(extract_file_part(body, "b"), None);
    }
}
