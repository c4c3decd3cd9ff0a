#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

/// Directory holding the eleven-table sample dataset.
pub fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join("ecommerce")
}

/// Scratch directory with a private copy of the sample dataset under `data/`
/// and an `output/` path that does not exist yet.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = tempdir().expect("temp dir");
        let data = temp_dir.path().join("data");
        fs::create_dir(&data).expect("create data dir");
        for entry in fs::read_dir(fixture_dir()).expect("read fixtures") {
            let path = entry.expect("fixture entry").path();
            fs::copy(&path, data.join(path.file_name().expect("file name"))).expect("copy fixture");
        }
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.path().join("data")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("output")
    }

    /// Replaces the source file for `table` with `contents`.
    pub fn write_source(&self, table: &str, contents: &str) -> PathBuf {
        let path = self.data_dir().join(format!("ecommerce_{table}.csv"));
        fs::write(&path, contents).expect("write source");
        path
    }

    pub fn append_source(&self, table: &str, line: &str) {
        let path = self.data_dir().join(format!("ecommerce_{table}.csv"));
        let mut contents = fs::read_to_string(&path).expect("read source");
        contents.push_str(line);
        contents.push('\n');
        fs::write(&path, contents).expect("write source");
    }

    pub fn remove_source(&self, table: &str) {
        fs::remove_file(self.data_dir().join(format!("ecommerce_{table}.csv")))
            .expect("remove source");
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path().join(name);
        fs::write(&path, contents).expect("write file");
        path
    }
}
