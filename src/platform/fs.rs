// LogMedic - platform/fs.rs
//
// Filesystem helpers for the log watcher: positioned reads for the live
// tail, file identity for rotation detection, and backward chunked reads for
// "last N lines" retrieval without loading whole files.

use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

/// Read up to `limit` bytes from `path` starting at byte position `offset`.
///
/// Returns fewer bytes than `limit` if the file ends before `limit` is reached.
pub fn read_bytes_at(path: &Path, offset: u64, limit: usize) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = Vec::with_capacity(limit);
    file.take(limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Identity of the file behind a path, used to notice rotation
/// (the path now names a different file).
///
/// Inode number on Unix; `None` elsewhere, where rotation is only noticed
/// through truncation.
pub fn file_identity(meta: &Metadata) -> Option<u64> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Some(meta.ino())
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        None
    }
}

/// Read the last `max_lines` non-empty lines of `path`, oldest first.
///
/// Scans backwards from end-of-file in `chunk_size` blocks and stops as soon
/// as enough complete lines are buffered or the start of the file is reached,
/// so memory use is bounded by the lines requested rather than the file size.
/// Lines are decoded as lossy UTF-8 with any trailing `\r` removed.
pub fn read_last_lines(path: &Path, max_lines: usize, chunk_size: usize) -> io::Result<Vec<String>> {
    if max_lines == 0 {
        return Ok(Vec::new());
    }

    let mut file = File::open(path)?;
    let mut pos = file.metadata()?.len();
    let mut chunk = vec![0u8; chunk_size.max(1)];
    let mut buf: Vec<u8> = Vec::new();

    while pos > 0 && count_complete_lines(&buf) < max_lines {
        let read_len = chunk.len().min(usize::try_from(pos).unwrap_or(usize::MAX));
        pos -= read_len as u64;
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(&mut chunk[..read_len])?;

        let mut merged = Vec::with_capacity(read_len + buf.len());
        merged.extend_from_slice(&chunk[..read_len]);
        merged.extend_from_slice(&buf);
        buf = merged;
    }

    let text = String::from_utf8_lossy(&buf);
    let mut segments = text.split('\n');
    if pos > 0 {
        // Everything before the first newline belongs to a line that starts
        // in the unread part of the file.
        segments.next();
    }
    let lines: Vec<String> = segments
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .filter(|l| !l.trim().is_empty())
        .map(str::to_owned)
        .collect();

    let skip = lines.len().saturating_sub(max_lines);
    Ok(lines.into_iter().skip(skip).collect())
}

/// Length of an unfinished multi-byte UTF-8 sequence at the end of `buf`,
/// or 0 when the buffer ends on a character boundary (or in bytes that are
/// invalid whatever follows).
pub fn incomplete_utf8_suffix(buf: &[u8]) -> usize {
    for back in 1..=buf.len().min(3) {
        if let Err(e) = std::str::from_utf8(&buf[buf.len() - back..]) {
            if e.valid_up_to() == 0 && e.error_len().is_none() {
                return back;
            }
        }
    }
    0
}

/// Count non-empty lines in `buf` that are known to be complete, i.e. that
/// are preceded by a newline inside the buffer. The first segment may be cut
/// off by the chunk boundary, so it never counts.
fn count_complete_lines(buf: &[u8]) -> usize {
    buf.split(|&b| b == b'\n')
        .skip(1)
        .filter(|seg| !seg.iter().all(u8::is_ascii_whitespace))
        .count()
}
