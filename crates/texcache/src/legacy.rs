//! Reading legacy texture atlas cache files.
//!
//! A cache file is a sequence of fixed size little endian records. The first record names
//! the image file of the atlas. Every following record names an image that is contained in
//! the atlas, together with the rectangle it occupies:
//!
//! | offset | size | field                         |
//! |--------|------|-------------------------------|
//! | 0      | 256  | file name, NUL padded UTF-8   |
//! | 256    | 4    | width (`i32`)                 |
//! | 260    | 4    | height (`i32`)                |
//! | 264    | 4    | x position (`i32`), -1: whole |
//! | 268    | 4    | y position (`i32`)            |
//! | 272    | 16   | unused                        |

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use serde::Serialize;

use crate::caching::CacheEntry;

/// The size of a single record in bytes.
pub const RECORD_SIZE: usize = 288;

const FILENAME_SIZE: usize = 256;

/// A single record of a legacy cache file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyRecord {
    pub filename: String,
    pub width: i32,
    pub height: i32,
    pub pos_x: i32,
    pub pos_y: i32,
}

/// The part of the atlas a [`LegacyRecord`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRegion {
    /// The whole atlas texture.
    Whole,
    Rect {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },
    /// Negative coordinates or sizes.
    Invalid,
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    let mut field = [0; 4];
    field.copy_from_slice(&bytes[offset..offset + 4]);
    i32::from_le_bytes(field)
}

impl LegacyRecord {
    pub fn parse(bytes: &[u8; RECORD_SIZE]) -> Self {
        let name = &bytes[..FILENAME_SIZE];
        let len = name.iter().position(|b| *b == 0).unwrap_or(FILENAME_SIZE);
        Self {
            filename: String::from_utf8_lossy(&name[..len]).into_owned(),
            width: read_i32(bytes, FILENAME_SIZE),
            height: read_i32(bytes, FILENAME_SIZE + 4),
            pos_x: read_i32(bytes, FILENAME_SIZE + 8),
            pos_y: read_i32(bytes, FILENAME_SIZE + 12),
        }
    }

    /// Serializes the record. File names longer than the field are truncated.
    pub fn encode(&self) -> [u8; RECORD_SIZE] {
        let mut bytes = [0; RECORD_SIZE];
        let name = self.filename.as_bytes();
        let len = name.len().min(FILENAME_SIZE - 1);
        bytes[..len].copy_from_slice(&name[..len]);

        let fields = [self.width, self.height, self.pos_x, self.pos_y];
        for (i, value) in fields.into_iter().enumerate() {
            let offset = FILENAME_SIZE + i * 4;
            bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
        bytes
    }

    pub fn region(&self) -> RecordRegion {
        if self.pos_x == -1 {
            return RecordRegion::Whole;
        }
        let rect = (
            u32::try_from(self.pos_x),
            u32::try_from(self.pos_y),
            u32::try_from(self.width),
            u32::try_from(self.height),
        );
        match rect {
            (Ok(x), Ok(y), Ok(width), Ok(height)) => RecordRegion::Rect {
                x,
                y,
                width,
                height,
            },
            _ => RecordRegion::Invalid,
        }
    }
}

/// Reads all complete records from `reader`.
///
/// A trailing partial record is dropped.
pub fn read_records(mut reader: impl Read) -> CacheEntry<Vec<LegacyRecord>> {
    let mut records = Vec::new();
    let mut buf = [0; RECORD_SIZE];
    loop {
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        if filled < RECORD_SIZE {
            if filled > 0 {
                tracing::debug!(
                    records = records.len(),
                    trailing = filled,
                    "legacy cache file ends with a truncated record"
                );
            }
            return Ok(records);
        }
        records.push(LegacyRecord::parse(&buf));
    }
}

/// Reads the records of the cache file at `path`.
///
/// A missing file yields no records.
pub fn read_cache_file(path: &Path) -> CacheEntry<Vec<LegacyRecord>> {
    match File::open(path) {
        Ok(file) => read_records(io::BufReader::new(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}
