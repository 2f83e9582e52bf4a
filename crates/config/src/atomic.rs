// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-then-rename atomicity, generalized from the backup-rotation
//! pattern in `oj-daemon::storage::snapshot` (`rotate_bak_path` /
//! `fs::rename`) into a single "replace this file atomically" helper.

use std::io::Write as _;
use std::path::Path;

/// Write `contents` to a temporary file in the same directory as `path`,
/// then atomically rename it into place. A reader never observes a torn
/// file: it sees either the old contents or the new ones.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp_path = sibling_tmp_path(path);
    {
        let mut tmp = std::fs::File::create(&tmp_path)?;
        tmp.write_all(contents)?;
        tmp.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)
}

fn sibling_tmp_path(path: &Path) -> std::path::PathBuf {
    let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("fragment");
    let tmp_name = format!(".{file_name}.tmp-{}", std::process::id());
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => std::path::PathBuf::from(tmp_name),
    }
}
