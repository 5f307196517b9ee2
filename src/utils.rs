use crc::{Crc, CRC_32_CKSUM};

pub fn compute_crc32(data: &[u8]) -> u32 {
    let crc = Crc::<u32>::new(&CRC_32_CKSUM);
    let mut digest = crc.digest();
    digest.update(data);
    return digest.finalize();
}

/// Segment name that won't collide with other tests running in parallel.
#[cfg(test)]
pub fn unique_name(tag: &str) -> String {
    return format!(
        "/shm_capture_{}_{}_{:08x}",
        tag,
        std::process::id(),
        rand::random::<u32>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_changes_with_content() {
        let a = compute_crc32(b"frame one");
        let b = compute_crc32(b"frame two");
        assert_ne!(a, b);
        assert_eq!(a, compute_crc32(b"frame one"));
    }
}
