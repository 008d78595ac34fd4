// Copyright 2026 The ibctest Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use ibctest_error::{Code, Error, ResultExt, make_err, make_input_err};

/// Mode of generated configuration files.
pub const CONFIG_FILE_MODE: u32 = 0o600;

#[derive(Debug, Clone)]
struct ArchiveEntry {
    path: String,
    content: Bytes,
}

/// Builds small in-memory tar archives for copying into containers.
///
/// Entries carry an explicit owner name, mode and the build time as mtime.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    owner: String,
    mode: u32,
    entries: Vec<ArchiveEntry>,
}

impl ArchiveBuilder {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            mode: CONFIG_FILE_MODE,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub const fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Adds a file at `path`, relative to the directory the archive is
    /// extracted into.
    pub fn file(mut self, path: impl Into<String>, content: impl Into<Bytes>) -> Result<Self, Error> {
        let path = path.into();
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() || trimmed.split('/').any(|part| part == "..") {
            return Err(make_input_err!("invalid archive entry path {path:?}"));
        }
        self.entries.push(ArchiveEntry {
            path: trimmed.to_string(),
            content: content.into(),
        });
        Ok(self)
    }

    pub fn build(self) -> Result<Bytes, Error> {
        let mtime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        let mut builder = tar::Builder::new(Vec::new());
        for entry in &self.entries {
            let mut header = tar::Header::new_ustar();
            header
                .set_path(&entry.path)
                .err_tip(|| format!("while setting archive path {}", entry.path))?;
            header.set_size(entry.content.len() as u64);
            header.set_mode(self.mode);
            header.set_mtime(mtime);
            header.set_entry_type(tar::EntryType::Regular);
            header
                .set_username(&self.owner)
                .err_tip(|| format!("while setting archive owner {}", self.owner))?;
            header.set_cksum();
            builder
                .append(&header, entry.content.as_ref())
                .err_tip(|| format!("while appending {} to archive", entry.path))?;
        }
        let bytes = builder
            .into_inner()
            .err_tip(|| "while finishing archive")?;
        Ok(Bytes::from(bytes))
    }
}

/// Reads the first regular file from a tar archive.
///
/// The runtime returns single-file copies as a one-entry archive named
/// after the file.
pub fn first_file_content(archive: &[u8]) -> Result<Bytes, Error> {
    let mut archive = tar::Archive::new(archive);
    let entries = archive
        .entries()
        .err_tip(|| "while reading archive entries")?;
    for entry in entries {
        let mut entry = entry.err_tip(|| "while reading archive entry")?;
        if entry.header().entry_type() != tar::EntryType::Regular {
            continue;
        }
        let mut content = Vec::new();
        entry
            .read_to_end(&mut content)
            .err_tip(|| "while reading archive file content")?;
        return Ok(Bytes::from(content));
    }
    Err(make_err!(Code::NotFound, "archive contains no regular file"))
}
