//! Message-ID validation and generation.
//!
//! A Message-ID is the system-wide uniqueness key and also becomes an
//! on-disk filename, so validation doubles as path-traversal hardening.

use rand::Rng;

/// Upper bound on Message-ID length.
pub const MAX_MESSAGE_ID_LEN: usize = 250;

/// Check a Message-ID: `<token@host>`, printable ASCII, bounded length,
/// and safe to use as a filename.
pub fn valid_message_id(id: &str) -> bool {
    if id.len() < 5 || id.len() > MAX_MESSAGE_ID_LEN {
        return false;
    }
    if !id.starts_with('<') || !id.ends_with('>') {
        return false;
    }
    if !id.contains('@') {
        return false;
    }
    if id.contains("..") {
        return false;
    }
    for b in id.bytes() {
        if b <= b' ' || b == 0x7f || b == b'/' || b == b'\\' || b == 0 {
            return false;
        }
    }
    true
}

/// Generate a fresh Message-ID for this instance.
pub fn gen_message_id(instance: &str) -> String {
    let mut rng = rand::thread_rng();
    let token: String = (0..16)
        .map(|_| {
            let n: u8 = rng.gen_range(0..36);
            if n < 10 {
                (b'0' + n) as char
            } else {
                (b'a' + n - 10) as char
            }
        })
        .collect();
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("<{}.{}@{}>", secs, token, instance)
}
