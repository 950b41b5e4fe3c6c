//! Output file naming

use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::path::{Path, PathBuf};

/// Recording file extension
pub const OUTPUT_EXTENSION: &str = "mp4";

/// Create the output directory if it does not exist yet
pub fn ensure_output_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        tracing::debug!("Created output directory {:?}", dir);
    }
    Ok(())
}

/// `video_<YYYY_MM_DD_HH_MM_SS>` for the given instant
pub fn output_stem<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("video_{}", now.format("%Y_%m_%d_%H_%M_%S"))
}

/// Pick a path in `dir` that does not exist yet
///
/// Two starts within the same second get `_1`, `_2`, … appended instead of
/// overwriting the earlier file.
pub fn next_output_path<Tz>(dir: &Path, now: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let stem = output_stem(now);
    let candidate = dir.join(format!("{stem}.{OUTPUT_EXTENSION}"));
    if !candidate.exists() {
        return candidate;
    }

    let mut suffix = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}_{suffix}.{OUTPUT_EXTENSION}"));
        if !candidate.exists() {
            return candidate;
        }
        suffix += 1;
    }
}
