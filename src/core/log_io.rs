use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Incremental reader over an append-only line file.
///
/// Only complete (newline-terminated) lines are returned; a trailing partial
/// line stays unread until its newline lands. A file that shrinks is treated
/// as rewritten and read again from the start. Lines that are not UTF-8 are
/// skipped with a warning and never block the lines after them.
pub struct LogTailer {
    file: File,
    position: u64,
    path: PathBuf,
}

impl LogTailer {
    /// Open positioned at the start, so existing lines are read first.
    pub fn open_at_start(path: impl AsRef<Path>) -> io::Result<Self> {
        let path_ref = path.as_ref();
        let file = File::open(path_ref)?;
        Ok(Self {
            file,
            position: 0,
            path: path_ref.to_path_buf(),
        })
    }

    pub fn read_new_lines(&mut self) -> io::Result<Vec<String>> {
        let len = self.file.metadata()?.len();
        if len < self.position {
            log::debug!("{:?} shrank, reading from start", self.path);
            self.position = 0;
        }

        let mut lines = Vec::new();
        self.file.seek(SeekFrom::Start(self.position))?;
        let mut reader = BufReader::new(&self.file);
        let mut buffer = Vec::new();

        loop {
            buffer.clear();
            let bytes_read = reader.read_until(b'\n', &mut buffer)?;
            if bytes_read == 0 || buffer.last() != Some(&b'\n') {
                break;
            }
            self.position += bytes_read as u64;
            match std::str::from_utf8(&buffer) {
                Ok(line) => lines.push(line.trim_end_matches(&['\r', '\n'][..]).to_string()),
                Err(e) => log::warn!(
                    "Skipping non-UTF-8 line at byte {} of {:?}: {}",
                    self.position - bytes_read as u64,
                    self.path,
                    e
                ),
            }
        }

        Ok(lines)
    }
}
