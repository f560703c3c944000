//! File partitioning and placement: the content-hash placement key, part
//! ranges, the on-disk part naming convention, and the XOR obfuscation mask.
//!
//! Every file splits into four contiguous parts. Part `i`'s primary server
//! is `(i + offset) % 4` where `offset` is derived from an MD5 digest of the
//! whole file; the primary for part `i` also stores part `(i + 1) % 4`, so
//! every server holds two consecutive parts and every part lives on exactly
//! two servers.

use crate::protocol::{NUM_PARTS, NUM_SERVERS};
use std::ops::Range;

/// Placement key in `[0, 4)`: an MD5 digest folded byte-by-byte.
pub fn placement_offset(file: &[u8]) -> usize {
    let digest = md5::compute(file);
    let mut offset = 0usize;
    for &byte in digest.iter() {
        offset = (offset * 16 + byte as usize) % NUM_SERVERS;
    }
    offset
}

/// Primary server index for a part under a given placement offset.
pub fn primary_server(part: usize, offset: usize) -> usize {
    (part + offset) % NUM_SERVERS
}

/// Byte range of part `i`. Parts 0-2 are `len/4` bytes; part 3 absorbs the
/// remainder so concatenation is exact for any length.
pub fn part_range(len: usize, part: usize) -> Range<usize> {
    debug_assert!(part < NUM_PARTS);
    let quarter = len / 4;
    let start = quarter * part;
    let end = if part == NUM_PARTS - 1 {
        len
    } else {
        start + quarter
    };
    start..end
}

pub fn part_slice(file: &[u8], part: usize) -> &[u8] {
    &file[part_range(file.len(), part)]
}

fn split_basename(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx + 1], &path[idx + 1..]),
        None => ("", path),
    }
}

/// On-disk part path: the basename gains a leading dot and a `.<index>`
/// suffix (`dir/report.txt` part 2 -> `dir/.report.txt.2`).
pub fn part_path(path: &str, part: usize) -> String {
    debug_assert!(part < NUM_PARTS);
    let (dir, base) = split_basename(path);
    format!("{dir}.{base}.{part}")
}

/// Inverse of [`part_path`] for a bare directory entry name. Returns the
/// logical filename and part index, or `None` when the name does not follow
/// the part convention.
pub fn parse_part_name(name: &str) -> Option<(String, usize)> {
    let rest = name.strip_prefix('.')?;
    let (logical, index) = rest.rsplit_once('.')?;
    if logical.is_empty() {
        return None;
    }
    let part: usize = index.parse().ok()?;
    if part >= NUM_PARTS {
        return None;
    }
    Some((logical.to_string(), part))
}

/// Local output name for a reconstructed file: basename plus `.received`.
pub fn received_name(path: &str) -> String {
    let (_, base) = split_basename(path);
    format!("{base}.received")
}

/// Single-byte XOR key: the password's byte sum, reduced mod 256.
pub fn make_mask(password: &str) -> u8 {
    password
        .bytes()
        .fold(0u8, |sum, byte| sum.wrapping_add(byte))
}

/// XOR every byte with the mask. Self-inverse.
pub fn apply_mask(file: &mut [u8], mask: u8) {
    for byte in file.iter_mut() {
        *byte ^= mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_is_self_inverse() {
        let original: Vec<u8> = (0..=255).collect();
        let mask = make_mask("hunter2");
        let mut masked = original.clone();
        apply_mask(&mut masked, mask);
        assert_ne!(masked, original);
        apply_mask(&mut masked, mask);
        assert_eq!(masked, original);
    }

    #[test]
    fn mask_is_password_byte_sum() {
        assert_eq!(make_mask("abc"), (b'a' as u32 + b'b' as u32 + b'c' as u32) as u8);
        assert_eq!(make_mask(""), 0);
    }

    #[test]
    fn parts_reassemble_exactly() {
        // Lengths around the 4-divisibility boundary, plus degenerate sizes.
        for len in [0usize, 1, 2, 3, 4, 5, 7, 4000, 4001, 4002, 4003] {
            let file: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut rebuilt = Vec::new();
            for part in 0..NUM_PARTS {
                rebuilt.extend_from_slice(part_slice(&file, part));
            }
            assert_eq!(rebuilt, file, "len {}", len);
        }
    }

    #[test]
    fn part_sizes_4001() {
        let sizes: Vec<usize> = (0..NUM_PARTS)
            .map(|p| part_range(4001, p).len())
            .collect();
        assert_eq!(sizes, vec![1000, 1000, 1000, 1001]);
    }

    #[test]
    fn placement_is_deterministic_and_in_range() {
        let file = b"some file content";
        let offset = placement_offset(file);
        assert!(offset < NUM_SERVERS);
        assert_eq!(offset, placement_offset(file));
    }

    #[test]
    fn every_part_has_exactly_two_homes() {
        for offset in 0..NUM_SERVERS {
            let mut homes = vec![Vec::new(); NUM_PARTS];
            for i in 0..NUM_PARTS {
                let server = primary_server(i, offset);
                homes[i].push(server);
                homes[(i + 1) % NUM_PARTS].push(server);
            }
            for (part, servers) in homes.iter().enumerate() {
                assert_eq!(servers.len(), 2, "part {} offset {}", part, offset);
                assert_ne!(servers[0], servers[1]);
            }
            // Server s holds its primary part (s-offset) mod 4 and that
            // part's successor (s-offset+1) mod 4.
            for s in 0..NUM_SERVERS {
                let expect_a = (s + NUM_SERVERS - offset) % NUM_SERVERS;
                let expect_b = (expect_a + 1) % NUM_SERVERS;
                for (part, servers) in homes.iter().enumerate() {
                    let held = servers.contains(&s);
                    assert_eq!(held, part == expect_a || part == expect_b);
                }
            }
        }
    }

    #[test]
    fn part_paths_follow_the_dot_convention() {
        assert_eq!(part_path("report.txt", 2), ".report.txt.2");
        assert_eq!(part_path("docs/report.txt", 0), "docs/.report.txt.0");
        assert_eq!(part_path("a/b/c.bin", 3), "a/b/.c.bin.3");
    }

    #[test]
    fn part_names_parse_back() {
        assert_eq!(
            parse_part_name(".report.txt.2"),
            Some(("report.txt".to_string(), 2))
        );
        assert_eq!(parse_part_name(".a.0"), Some(("a".to_string(), 0)));
        // Not part files: no leading dot, bad index, no suffix.
        assert_eq!(parse_part_name("report.txt"), None);
        assert_eq!(parse_part_name(".report.txt.7"), None);
        assert_eq!(parse_part_name(".report"), None);
        assert_eq!(parse_part_name("."), None);
    }

    #[test]
    fn received_name_drops_directories() {
        assert_eq!(received_name("docs/report.txt"), "report.txt.received");
        assert_eq!(received_name("report.txt"), "report.txt.received");
    }
}
