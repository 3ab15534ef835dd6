//! Marker scanner for `[speakerId]:` markers.
//!
//! Works on raw bytes: every delimiter of the grammar (`[`, `]`, `:`, space,
//! newline) is ASCII and can never occur inside a multi-byte UTF-8 sequence,
//! so every offset returned here is a valid `str` boundary.

/// A complete marker found in the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    /// Offset of the opening `[`.
    pub open: usize,
    /// Parsed speaker id.
    pub speaker_id: String,
    /// Offset where the message text begins (after `]:` and one optional space).
    pub body: usize,
}

/// Result of scanning a buffer from a resume offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scan {
    /// First complete marker at or after the resume offset.
    Marker(Marker),
    /// A candidate starting at `open` runs to the end of the buffer and may
    /// still turn into a marker once more text arrives.
    Partial { open: usize },
    /// Nothing at or after the resume offset can start a marker.
    Clear,
}

/// Outcome of examining a single `[`.
enum Candidate {
    Marker(Marker),
    Incomplete,
    Rejected { resume: usize },
}

/// Scans `buf[from..]` for the first marker.
///
/// Bytes before `from` are assumed to have been proven marker-free by an
/// earlier call, so repeated calls over a growing buffer stay linear.
pub fn scan(buf: &str, from: usize, max_id_len: usize) -> Scan {
    let bytes = buf.as_bytes();
    let mut pos = from.min(bytes.len());

    while let Some(rel) = bytes[pos..].iter().position(|&b| b == b'[') {
        let open = pos + rel;
        match candidate(bytes, open, max_id_len) {
            Candidate::Marker(marker) => return Scan::Marker(marker),
            Candidate::Incomplete => return Scan::Partial { open },
            Candidate::Rejected { resume } => pos = resume,
        }
    }

    Scan::Clear
}

fn candidate(bytes: &[u8], open: usize, max_id_len: usize) -> Candidate {
    let id_start = open + 1;
    let mut i = id_start;

    loop {
        if i - id_start > max_id_len {
            return Candidate::Rejected { resume: i };
        }
        let Some(&b) = bytes.get(i) else {
            return Candidate::Incomplete;
        };
        match b {
            // A nested bracket restarts the candidate there.
            b'[' => return Candidate::Rejected { resume: i },
            b'\n' => return Candidate::Rejected { resume: i + 1 },
            b']' => break,
            _ => i += 1,
        }
    }

    let close = i;
    if close == id_start {
        return Candidate::Rejected { resume: close + 1 };
    }
    match bytes.get(close + 1) {
        None => Candidate::Incomplete,
        Some(b':') => {
            let colon = close + 1;
            // The optional space after the colon is not known yet.
            let body = match bytes.get(colon + 1) {
                None => return Candidate::Incomplete,
                Some(b' ') => colon + 2,
                Some(_) => colon + 1,
            };
            Candidate::Marker(Marker {
                open,
                speaker_id: String::from_utf8_lossy(&bytes[id_start..close]).into_owned(),
                body,
            })
        }
        Some(_) => Candidate::Rejected { resume: close + 1 },
    }
}
