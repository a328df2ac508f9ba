//! Persisted generation-id handling, §6.4. The generation id is carried in
//! neighbor probes so peers can detect a restart; it must increase across
//! process restarts even when the wall clock hasn't advanced, which is why
//! it's saved to disk rather than just derived from the current time.

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const DEFAULT_GENID_PATH: &str = "/var/run/dvmrpd.genid";

/// Load the saved generation id (if any), compute a fresh one from the
/// current time, bump it past the saved value if they'd collide, and
/// persist the new value back to disk.
pub fn load_and_advance(path: &Path, now_epoch_secs: u32) -> io::Result<u32> {
    let saved = read_saved(path)?;
    let mut genid = now_epoch_secs;
    if let Some(saved) = saved {
        if genid <= saved {
            genid = saved + 1;
        }
    }
    write_saved(path, genid)?;
    Ok(genid)
}

pub fn default_path() -> &'static Path {
    Path::new(DEFAULT_GENID_PATH)
}

fn read_saved(path: &Path) -> io::Result<Option<u32>> {
    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut contents = String::new();
            f.read_to_string(&mut contents)?;
            Ok(contents.trim().parse::<u32>().ok())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn write_saved(path: &Path, genid: u32) -> io::Result<()> {
    let mut f = std::fs::File::create(path)?;
    write!(f, "{genid}")
}

/// Current wall-clock time as a `u32` seconds-since-epoch, saturating on
/// overflow rather than panicking (only relevant past year 2106).
pub fn now_epoch_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_saved_file_uses_current_time() {
        let dir = std::env::temp_dir().join("dvmrpd_genid_test_fresh");
        let _ = std::fs::remove_file(&dir);
        let genid = load_and_advance(&dir, 1_000_000).unwrap();
        assert_eq!(genid, 1_000_000);
        std::fs::remove_file(&dir).unwrap();
    }

    #[test]
    fn test_collision_increments_past_saved_value() {
        let dir = std::env::temp_dir().join("dvmrpd_genid_test_collision");
        std::fs::write(&dir, "1000000").unwrap();
        let genid = load_and_advance(&dir, 1_000_000).unwrap();
        assert_eq!(genid, 1_000_001);
        std::fs::remove_file(&dir).unwrap();
    }

    #[test]
    fn test_saved_value_in_past_is_not_reused() {
        let dir = std::env::temp_dir().join("dvmrpd_genid_test_past");
        std::fs::write(&dir, "500").unwrap();
        let genid = load_and_advance(&dir, 1_000_000).unwrap();
        assert_eq!(genid, 1_000_000);
        std::fs::remove_file(&dir).unwrap();
    }
}
