//! Resolving named icons to image files.

use std::path::{Path, PathBuf};

/// Maps icon names to the files that render them.
pub trait IconTheme: Send + Sync {
    /// The file best suited to show `name` at `size` pixels.
    fn lookup_icon(&self, name: &str, size: u32) -> Option<PathBuf>;
}

/// An [`IconTheme`] backed by a list of theme directories.
///
/// Within every directory, `<size>x<size>/<name>.png` is preferred over the unsized
/// `<name>.png`. Directories are searched in order.
#[derive(Debug, Clone, Default)]
pub struct DirectoryIconTheme {
    dirs: Vec<PathBuf>,
}

impl DirectoryIconTheme {
    pub fn new(dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            dirs: dirs.into_iter().collect(),
        }
    }
}

impl IconTheme for DirectoryIconTheme {
    fn lookup_icon(&self, name: &str, size: u32) -> Option<PathBuf> {
        // names come from callers and must not escape the theme
        if name.is_empty() || Path::new(name).components().count() != 1 {
            return None;
        }
        let file = format!("{name}.png");
        self.dirs.iter().find_map(|dir| {
            [dir.join(format!("{size}x{size}")).join(&file), dir.join(&file)]
                .into_iter()
                .find(|candidate| candidate.is_file())
        })
    }
}
