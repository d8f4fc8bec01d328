//! DATA-phase body transforms: dot-unstuffing and 8BIT→7BIT downgrade.
//!
//! The wire buffer accumulated by [`crate::session::io`] still carries the dot-stuffing
//! and the `\r\n.\r\n` terminator; this module turns that into the bytes that actually get
//! spooled.

/// Reverses dot-stuffing and drops the terminating `.` line.
///
/// For any line `L` whose first byte is `.`, the body receives `L[1..]`; the line that is
/// exactly `.` ends the body and is not included in the output. Lines are rejoined with
/// `\r\n`. If `data` doesn't end with a CRLF-terminated `.` line (malformed input), the
/// remainder is copied through unchanged rather than dropped.
#[must_use]
pub fn unstuff(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut start = 0;

    while start < data.len() {
        match find_crlf(&data[start..]) {
            Some(rel) => {
                let line_end = start + rel;
                let line = &data[start..line_end];

                if line == b"." {
                    return out;
                }

                let line = line.strip_prefix(b".").unwrap_or(line);
                out.extend_from_slice(line);
                out.extend_from_slice(b"\r\n");
                start = line_end + 2;
            }
            None => {
                out.extend_from_slice(&data[start..]);
                break;
            }
        }
    }

    out
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Masks the high bit of every byte, downgrading an 8BITMIME body to 7BIT.
///
/// Called whenever the transaction's `MAIL FROM` didn't declare `BODY=8BITMIME`; clients
/// that send 8-bit data anyway get it silently downgraded rather than rejected, matching
/// traditional sendmail-family behaviour.
pub fn downgrade_8bit(data: &mut [u8]) {
    for byte in data {
        *byte &= 0x7F;
    }
}
