//! Audio and text file discovery.
//!
//! Audio discovery yields a deterministic, naturally-sorted file list.
//! Text discovery resolves a script directory's "which file actually
//! wins" rules: a `used/` subdirectory is preferred over its parent,
//! `_snapshot`-suffixed files are excluded, and `copy`/`копия` duplicate
//! variants are resolved by newest-mtime, then size, then extension rank.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::AlignError;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "flac", "ogg", "aac"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "srt", "vtt"];

/// List every audio file directly or indirectly under `dir`, naturally
/// sorted by filename so re-running on an unchanged directory always
/// yields the same order.
pub fn discover_audio_files(dir: &Path) -> crate::Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Err(AlignError::InvalidInput(format!(
            "audio directory does not exist: {dir:?}"
        )));
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_extension(path, AUDIO_EXTENSIONS))
        .collect();

    files.sort_by(|a, b| natural_key(a).cmp(&natural_key(b)));
    Ok(files)
}

/// Discover the UTF-8 text blocks that make up the script: reads every
/// `.txt`/`.srt`/`.vtt` file under `dir` (preferring a `used/` subdirectory
/// when present), excluding `_snapshot` variants and resolving
/// `copy`/`копия` duplicates to a single winner per logical name.
pub fn discover_text_blocks(
    dir: &Path,
    explicit_filename: Option<&str>,
) -> crate::Result<Vec<String>> {
    if let Some(name) = explicit_filename {
        let path = dir.join(name);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| AlignError::InvalidInput(format!("failed to read {path:?}: {e}")))?;
        return Ok(vec![content]);
    }

    let search_root = {
        let used = dir.join("used");
        if used.is_dir() {
            used
        } else {
            dir.to_path_buf()
        }
    };

    let mut candidates: Vec<PathBuf> = WalkDir::new(&search_root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| has_extension(path, TEXT_EXTENSIONS))
        .filter(|path| !is_snapshot(path))
        .collect();
    candidates.sort_by(|a, b| natural_key(a).cmp(&natural_key(b)));

    let winners = resolve_copy_variants(candidates)?;

    winners
        .into_iter()
        .map(|path| {
            std::fs::read_to_string(&path)
                .map_err(|e| AlignError::InvalidInput(format!("failed to read {path:?}: {e}")))
        })
        .collect()
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|ext| ext.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn is_snapshot(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.ends_with("_snapshot"))
        .unwrap_or(false)
}

/// Strip a trailing `copy`/`копия`/`(n)` duplicate marker from a file stem,
/// yielding the logical name duplicates should be grouped under.
fn logical_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let lower = stem.to_lowercase();
    for marker in ["copy", "копия"] {
        if let Some(pos) = lower.rfind(marker) {
            let candidate = stem[..pos].trim_end_matches([' ', '-', '_', '(']).to_string();
            if !candidate.is_empty() {
                return candidate;
            }
        }
    }
    stem.to_string()
}

fn extension_rank(path: &Path) -> usize {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();
    TEXT_EXTENSIONS
        .iter()
        .position(|e| *e == ext)
        .unwrap_or(TEXT_EXTENSIONS.len())
}

fn resolve_copy_variants(candidates: Vec<PathBuf>) -> crate::Result<Vec<PathBuf>> {
    use std::collections::HashMap;

    let mut groups: HashMap<String, Vec<PathBuf>> = HashMap::new();
    for path in candidates {
        groups.entry(logical_name(&path)).or_default().push(path);
    }

    let mut winners: Vec<(String, PathBuf)> = Vec::new();
    for (name, mut variants) in groups {
        variants.sort_by(|a, b| {
            let meta_a = std::fs::metadata(a).ok();
            let meta_b = std::fs::metadata(b).ok();
            let mtime_a = meta_a.as_ref().and_then(|m| m.modified().ok());
            let mtime_b = meta_b.as_ref().and_then(|m| m.modified().ok());
            mtime_b
                .cmp(&mtime_a)
                .then_with(|| {
                    let size_a = meta_a.as_ref().map(|m| m.len()).unwrap_or(0);
                    let size_b = meta_b.as_ref().map(|m| m.len()).unwrap_or(0);
                    size_b.cmp(&size_a)
                })
                .then_with(|| extension_rank(a).cmp(&extension_rank(b)))
        });
        if let Some(winner) = variants.into_iter().next() {
            winners.push((name, winner));
        }
    }
    winners.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(winners.into_iter().map(|(_, path)| path).collect())
}

/// Natural-sort key: splits a filename into alternating digit/non-digit
/// runs so `"file2"` sorts before `"file10"`.
fn natural_key(path: &Path) -> Vec<NaturalSegment> {
    let name = path.to_string_lossy().to_string();
    let mut segments = Vec::new();
    let mut chars = name.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut digits = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    digits.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let value: u64 = digits.parse().unwrap_or(0);
            segments.push(NaturalSegment::Number(value));
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    break;
                }
                text.push(c);
                chars.next();
            }
            segments.push(NaturalSegment::Text(text));
        }
    }
    segments
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NaturalSegment {
    Text(String),
    Number(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_key_orders_numeric_runs_by_value() {
        let a = natural_key(Path::new("file2.wav"));
        let b = natural_key(Path::new("file10.wav"));
        assert!(a < b);
    }

    #[test]
    fn logical_name_strips_copy_marker() {
        assert_eq!(logical_name(Path::new("script copy.txt")), "script");
        assert_eq!(logical_name(Path::new("script копия.txt")), "script");
        assert_eq!(logical_name(Path::new("script.txt")), "script");
    }

    #[test]
    fn is_snapshot_detects_suffix() {
        assert!(is_snapshot(Path::new("a_snapshot.txt")));
        assert!(!is_snapshot(Path::new("a.txt")));
    }

    #[test]
    fn discover_audio_files_sorts_naturally() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["file10.wav", "file2.wav", "file1.wav"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let files = discover_audio_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["file1.wav", "file2.wav", "file10.wav"]);
    }

    #[test]
    fn discover_text_blocks_prefers_used_subdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "outer").unwrap();
        std::fs::create_dir(dir.path().join("used")).unwrap();
        std::fs::write(dir.path().join("used").join("a.txt"), "inner").unwrap();

        let blocks = discover_text_blocks(dir.path(), None).unwrap();
        assert_eq!(blocks, vec!["inner".to_string()]);
    }

    #[test]
    fn discover_text_blocks_excludes_snapshot_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "real").unwrap();
        std::fs::write(dir.path().join("a_snapshot.txt"), "stale").unwrap();

        let blocks = discover_text_blocks(dir.path(), None).unwrap();
        assert_eq!(blocks, vec!["real".to_string()]);
    }
}
