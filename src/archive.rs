//! Single-entry tar (ustar) encoder
//!
//! Docker's upload API takes a tar archive, so source injection builds one
//! in memory: one 512-byte header, content padded to a 512-byte boundary,
//! then two all-zero blocks as end-of-archive. Layout:
//! <https://www.gnu.org/software/tar/manual/html_node/Standard.html>

use crate::error::{Error, Result};

/// Tar block size
const BLOCK: usize = 512;

/// Maximum filename length the ustar name field holds
const NAME_MAX: usize = 100;

/// File mode for the injected entry
const ENTRY_MODE: u64 = 0o644;

/// uid:gid matching the non-root container user
const ENTRY_ID: u64 = 1000;

/// Build a single-file ustar archive for a regular file
pub fn create_tar(filename: &str, content: &[u8]) -> Result<Vec<u8>> {
    if filename.as_bytes().len() > NAME_MAX {
        return Err(Error::InvalidInput(format!(
            "archive filename exceeds {} bytes: {:?}",
            NAME_MAX, filename
        )));
    }

    let padded_len = content.len().div_ceil(BLOCK) * BLOCK;
    let mut archive = Vec::with_capacity(BLOCK + padded_len + 2 * BLOCK);

    archive.extend_from_slice(&ustar_header(filename, content.len()));
    archive.extend_from_slice(content);
    archive.resize(BLOCK + padded_len, 0);
    // two zero blocks mark end-of-archive
    archive.resize(BLOCK + padded_len + 2 * BLOCK, 0);

    Ok(archive)
}

fn ustar_header(filename: &str, size: usize) -> [u8; BLOCK] {
    let mut h = [0u8; BLOCK];

    // name (0, 100)
    h[..filename.len()].copy_from_slice(filename.as_bytes());
    // mode (100, 8)
    write_octal(&mut h, 100, 8, ENTRY_MODE);
    // uid (108, 8)
    write_octal(&mut h, 108, 8, ENTRY_ID);
    // gid (116, 8)
    write_octal(&mut h, 116, 8, ENTRY_ID);
    // size (124, 12)
    write_octal(&mut h, 124, 12, size as u64);
    // mtime (136, 12)
    write_octal(&mut h, 136, 12, unix_now());
    // typeflag (156, 1) - '0' = regular file
    h[156] = b'0';
    // magic (257, 6) + version (263, 2)
    h[257..263].copy_from_slice(b"ustar\0");
    h[263..265].copy_from_slice(b"00");
    // uname (265, 32) / gname (297, 32)
    h[265..272].copy_from_slice(b"runuser");
    h[297..304].copy_from_slice(b"runuser");

    // checksum (148, 8): computed over the header with the field space-filled,
    // stored as six octal digits, NUL, space
    h[148..156].fill(b' ');
    let sum: u32 = h.iter().map(|&b| u32::from(b)).sum();
    let digits = format!("{:06o}", sum);
    h[148..154].copy_from_slice(digits.as_bytes());
    h[154] = 0;
    h[155] = b' ';

    h
}

/// Write an ASCII octal field: zero-padded digits followed by a NUL
fn write_octal(buf: &mut [u8], offset: usize, width: usize, value: u64) {
    let digits = format!("{:0>width$o}", value, width = width - 1);
    buf[offset..offset + width - 1].copy_from_slice(digits.as_bytes());
    buf[offset + width - 1] = 0;
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_octal(buf: &[u8], offset: usize, width: usize) -> u64 {
        let field = &buf[offset..offset + width];
        let text: String = field
            .iter()
            .take_while(|&&b| b != 0 && b != b' ')
            .map(|&b| b as char)
            .collect();
        u64::from_str_radix(&text, 8).unwrap()
    }

    #[test]
    fn test_round_trip_fields() {
        let content = b"int main() { return 0; }";
        let tar = create_tar("main.cpp", content).unwrap();

        // name
        let name_end = tar[..100].iter().position(|&b| b == 0).unwrap();
        assert_eq!(&tar[..name_end], b"main.cpp");
        // size and content
        assert_eq!(read_octal(&tar, 124, 12), content.len() as u64);
        assert_eq!(&tar[BLOCK..BLOCK + content.len()], content);
        // regular file, ustar magic
        assert_eq!(tar[156], b'0');
        assert_eq!(&tar[257..263], b"ustar\0");
        assert_eq!(&tar[263..265], b"00");
    }

    #[test]
    fn test_length_is_block_multiple_with_zero_trailer() {
        for content_len in [0usize, 1, 511, 512, 513, 4096] {
            let tar = create_tar("a.txt", &vec![b'x'; content_len]).unwrap();
            assert_eq!(tar.len() % BLOCK, 0, "content_len={}", content_len);
            let trailer = &tar[tar.len() - 2 * BLOCK..];
            assert!(trailer.iter().all(|&b| b == 0), "content_len={}", content_len);
        }
    }

    #[test]
    fn test_content_padding_is_zeroed() {
        let tar = create_tar("a.txt", b"hi").unwrap();
        assert!(tar[BLOCK + 2..2 * BLOCK].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_checksum_law() {
        let tar = create_tar("main.cpp", b"#include <iostream>").unwrap();
        let stored = read_octal(&tar, 148, 8);

        let mut header = [0u8; BLOCK];
        header.copy_from_slice(&tar[..BLOCK]);
        header[148..156].fill(b' ');
        let recomputed: u32 = header.iter().map(|&b| u32::from(b)).sum();

        assert_eq!(u64::from(recomputed), stored);
        assert_eq!(tar[154], 0);
        assert_eq!(tar[155], b' ');
    }

    #[test]
    fn test_name_too_long_rejected() {
        let name = "x".repeat(101);
        assert!(create_tar(&name, b"").is_err());
        let name = "x".repeat(100);
        assert!(create_tar(&name, b"").is_ok());
    }
}
