use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, Result};
use crate::format::{Table, DDL_FILE};

pub const MANIFEST_VERSION: u32 = 1;

/// Build summary stored next to the table files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub created_at: String,
    pub documents: u64,
    pub tokens: u64,
    pub postings: u64,
    pub rows_per_statement: u64,
    pub max_file_bytes: u64,
    /// File names per table, in write order
    pub files: BTreeMap<String, Vec<String>>,
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn ddl(&self) -> PathBuf { self.root.join(DDL_FILE) }
    pub fn manifest(&self) -> PathBuf { self.root.join("manifest.json") }
    pub fn table_file(&self, table: Table, number: u32) -> PathBuf { self.root.join(table.file_name(number)) }
}

/// Index files found in a directory, grouped by table and sorted by name.
#[derive(Debug, Default)]
pub struct IndexFiles {
    pub documents: Vec<PathBuf>,
    pub tokens: Vec<PathBuf>,
    pub intersections: Vec<PathBuf>,
}

impl IndexFiles {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.tokens.is_empty() && self.intersections.is_empty()
    }
}

/// Lists the data files of an index directory (not recursive). The schema
/// file is skipped.
pub fn discover(paths: &IndexPaths) -> Result<IndexFiles> {
    let mut found = IndexFiles::default();
    for entry in fs::read_dir(&paths.root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(table) = name.to_str().and_then(Table::classify) else { continue };
        tracing::debug!(file = ?name, ?table, "found index file");
        match table {
            Table::Documents => found.documents.push(entry.path()),
            Table::Tokens => found.tokens.push(entry.path()),
            Table::Intersection => found.intersections.push(entry.path()),
        }
    }
    for list in [&mut found.documents, &mut found.tokens, &mut found.intersections] {
        list.sort_by_key(|p| file_number(p));
    }
    Ok(found)
}

/// Rollover number in `<stem>-<n>.sql`, so `-10` sorts after `-9`.
fn file_number(path: &Path) -> (u32, String) {
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let number = name
        .rsplit_once('-')
        .and_then(|(_, rest)| rest.split('.').next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);
    (number, name)
}

pub fn write_ddl(paths: &IndexPaths) -> Result<()> {
    let path = paths.ddl();
    let mut f = File::create(&path).map_err(|source| IndexError::Setup { path: path.clone(), source })?;
    for table in Table::ALL {
        writeln!(f, "{}\n", table.ddl())?;
    }
    Ok(())
}

pub fn save_manifest(paths: &IndexPaths, manifest: &Manifest) -> Result<()> {
    fs::create_dir_all(&paths.root)?;
    let mut f = File::create(paths.manifest())?;
    let json = serde_json::to_string_pretty(manifest)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

/// Reads the manifest if the directory has one.
pub fn load_manifest(paths: &IndexPaths) -> Result<Option<Manifest>> {
    let mut f = match File::open(paths.manifest()) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let manifest: Manifest = serde_json::from_str(&buf)?;
    Ok(Some(manifest))
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
